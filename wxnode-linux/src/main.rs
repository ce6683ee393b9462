// wxnode Linux host: simulated radio over UDP, tick loop, sensor and weather scheduling.

mod config;
mod radio;
mod schedule;
mod sensor;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wxnode_core::SlaveNode;

use crate::config::{Config, RadioConfig};
use crate::radio::UdpRadio;
use crate::schedule::{Due, Schedule};
use crate::sensor::{SensorSource, SimulatedSensor};

const VERSION: &str = env!("CARGO_PKG_VERSION");

type Node = SlaveNode<Arc<UdpRadio>>;

fn main() -> anyhow::Result<()> {
    let mut config_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("wxnode-linux {}", VERSION);
                return Ok(());
            }
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let cfg = config::load(config_path.as_deref())?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cfg))
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    let (radio, mut reports) = UdpRadio::bind(
        cfg.radio.bind_addr,
        cfg.radio.base_port,
        cfg.link.min_channel,
        cfg.link.max_channel,
    )
    .await
    .context("binding radio sockets")?;
    let radio = Arc::new(radio);

    let node = Arc::new(SlaveNode::new(radio.clone(), cfg.link.clone()));
    node.initialize(cfg.link.initial_channel)
        .context("initializing link")?;
    info!(
        device = %cfg.link.device_name,
        channel = node.channel(),
        addr = ?radio.local_addr(node.channel()),
        "wxnode-linux {} up",
        VERSION
    );

    let mut tasks = radio::spawn_receivers(radio, node.clone());
    let status_node = node.clone();
    tasks.push(tokio::spawn(async move {
        while let Some((peer, status)) = reports.recv().await {
            status_node.on_send_complete(peer, status);
        }
    }));
    tasks.push(tokio::spawn(control_loop(node, cfg.radio)));

    shutdown_signal().await?;
    info!("shutting down");
    for task in tasks {
        task.abort();
    }
    Ok(())
}

/// Drive the node's clock and the periodic sends.
async fn control_loop(node: Arc<Node>, radio_cfg: RadioConfig) {
    let mut sensor = SimulatedSensor::from_entropy();
    let mut schedule = Schedule::new(
        radio_cfg.sensor_interval(),
        radio_cfg.weather_request_interval(),
    );
    let mut ticker = tokio::time::interval(radio_cfg.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        node.tick();
        for due in schedule.poll(node.is_master_linked(), Instant::now()) {
            match due {
                Due::Bootstrap => {
                    info!(master = ?node.master(), "master linked, sending bootstrap");
                    let _ = node.send_weather_proxy_request();
                }
                Due::SensorReading => match sensor.read() {
                    Some(r) => {
                        let _ = node.send_sensor_reading(r.temperature_c, r.humidity_percent);
                    }
                    None => warn!("sensor read failed"),
                },
                Due::WeatherRequest => {
                    let _ = node.send_proxy_request();
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
