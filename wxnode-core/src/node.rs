//! Slave node: channel discovery, master binding and frame dispatch.
//!
//! The host drives the node: it calls [`SlaveNode::tick`] periodically and
//! [`SlaveNode::on_receive`] for every inbound frame. The node never blocks on
//! the radio; it sends through [`Transport`] and reacts to what arrives.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::LinkConfig;
use crate::pipeline::WeatherCommandPipeline;
use crate::protocol::{is_master_beacon, PacketType, PeerAddress, SLAVE_ONLINE};
use crate::state::{
    FeaturesState, HttpMethod, IdentityRequest, IdentityState, MasterNetworkState,
    ProxyRequestState, SensorState, SlaveAliveState, TypedMessage, WeatherSyncRequest,
};
use crate::transport::{SendStatus, Transport, TransportError};
use crate::weather::WeatherStateSink;
use crate::wire::{decode_frame, encode_frame};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("link not started")]
    NotStarted,
    #[error("master not known")]
    MasterUnknown,
    #[error("empty payload")]
    EmptyPayload,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Binding state guarded by one lock.
#[derive(Debug)]
struct Binding {
    started: bool,
    master: Option<PeerAddress>,
    /// Channel being scanned, or the master's channel once bound.
    channel: u8,
    last_hello: Instant,
    last_scan: Instant,
    last_master_seen: Option<Instant>,
}

/// Radio plus binding: everything needed to put a frame in front of the
/// master. Shared between the node and the weather sink.
pub struct MasterLink<T> {
    transport: T,
    binding: Mutex<Binding>,
    sequence: AtomicU16,
    epoch: Instant,
}

impl<T: Transport> MasterLink<T> {
    fn new(transport: T, channel: u8) -> Self {
        let now = Instant::now();
        Self {
            transport,
            binding: Mutex::new(Binding {
                started: false,
                master: None,
                channel,
                last_hello: now,
                last_scan: now,
                last_master_seen: None,
            }),
            sequence: AtomicU16::new(0),
            epoch: now,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Binding> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn master(&self) -> Option<PeerAddress> {
        self.lock().master
    }

    pub fn channel(&self) -> u8 {
        self.lock().channel
    }

    /// Frame and send. Sequence numbers wrap; timestamps are ms since the
    /// link was created, truncated to 32 bits.
    fn transmit(
        &self,
        peer: PeerAddress,
        packet_type: PacketType,
        payload: &[u8],
        now: Instant,
    ) -> Result<(), LinkError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let timestamp_ms = now.saturating_duration_since(self.epoch).as_millis() as u32;
        let frame = encode_frame(packet_type, sequence, timestamp_ms, payload);
        self.transport.send(peer, &frame).map_err(|err| {
            warn!(%peer, ?packet_type, error = %err, "send to master failed");
            LinkError::Transport(err)
        })
    }

    fn send_to_master_at(
        &self,
        packet_type: PacketType,
        payload: &[u8],
        now: Instant,
    ) -> Result<(), LinkError> {
        let master = {
            let binding = self.lock();
            if !binding.started {
                return Err(LinkError::NotStarted);
            }
            binding.master.ok_or(LinkError::MasterUnknown)?
        };
        self.transmit(master, packet_type, payload, now)
    }

    pub fn send_to_master(&self, packet_type: PacketType, payload: &[u8]) -> Result<(), LinkError> {
        self.send_to_master_at(packet_type, payload, Instant::now())
    }

    /// Send a STATE frame to the master.
    pub fn send_state(&self, payload: &[u8]) -> Result<(), LinkError> {
        if payload.is_empty() {
            return Err(LinkError::EmptyPayload);
        }
        self.send_to_master(PacketType::State, payload)
    }
}

/// A weather sensor node bound (or trying to bind) to one master.
pub struct SlaveNode<T> {
    link: Arc<MasterLink<T>>,
    pipeline: WeatherCommandPipeline,
    config: LinkConfig,
}

impl<T: Transport + 'static> SlaveNode<T> {
    pub fn new(transport: T, config: LinkConfig) -> Self {
        let link = Arc::new(MasterLink::new(transport, config.initial_channel));
        let sink = Arc::new(WeatherStateSink::new(link.clone()));
        let pipeline =
            WeatherCommandPipeline::new(sink, config.queue_depth, config.max_assembled_bytes);
        Self {
            link,
            pipeline,
            config,
        }
    }

    pub fn link(&self) -> &Arc<MasterLink<T>> {
        &self.link
    }

    pub fn is_started(&self) -> bool {
        self.link.lock().started
    }

    pub fn is_master_linked(&self) -> bool {
        let binding = self.link.lock();
        binding.started && binding.master.is_some()
    }

    pub fn master(&self) -> Option<PeerAddress> {
        self.link.master()
    }

    pub fn channel(&self) -> u8 {
        self.link.channel()
    }

    /// Bring the radio up on `channel` (0 selects the first scan channel) and
    /// start the weather pipeline. Calling again after success does nothing.
    pub fn initialize(&self, channel: u8) -> Result<(), LinkError> {
        let mut binding = self.link.lock();
        if binding.started {
            return Ok(());
        }

        let channel = if channel == 0 {
            self.config.min_channel
        } else {
            channel
        };
        if let Err(err) = self.link.transport.set_channel(channel) {
            warn!(channel, error = %err, "initial channel not applied");
        }
        binding.channel = channel;

        if let Err(err) = self.link.transport.init() {
            error!(error = %err, "radio init failed");
            return Err(err.into());
        }

        let now = Instant::now();
        binding.started = true;
        binding.master = None;
        binding.last_hello = now;
        binding.last_scan = now;
        binding.last_master_seen = None;
        drop(binding);

        if let Err(err) = self.pipeline.start() {
            warn!(error = %err, "weather pipeline not started");
        }
        info!(channel, "slave link ready, scanning for master");
        Ok(())
    }

    pub fn tick(&self) {
        self.tick_at(Instant::now());
    }

    /// Timeout check, channel scan and periodic hello, evaluated at `now`.
    pub fn tick_at(&self, now: Instant) {
        let hello_to = {
            let mut binding = self.link.lock();
            if !binding.started {
                return;
            }

            if let (Some(master), Some(seen)) = (binding.master, binding.last_master_seen) {
                if now.saturating_duration_since(seen) > self.config.master_timeout() {
                    binding.master = None;
                    binding.last_master_seen = None;
                    warn!(%master, "master beacon timeout, back to channel scan");
                }
            }

            if binding.master.is_none()
                && now.saturating_duration_since(binding.last_scan) >= self.config.scan_interval()
            {
                self.scan_next_channel(&mut binding);
                binding.last_scan = now;
            }

            match binding.master {
                Some(master)
                    if now.saturating_duration_since(binding.last_hello)
                        >= self.config.hello_interval() =>
                {
                    binding.last_hello = now;
                    Some(master)
                }
                _ => None,
            }
        };

        if let Some(master) = hello_to {
            debug!(%master, "hello");
            let _ = self.link.transmit(master, PacketType::Hello, SLAVE_ONLINE, now);
        }
    }

    fn scan_next_channel(&self, binding: &mut Binding) {
        let (min, max) = (self.config.min_channel, self.config.max_channel);
        let next = if binding.channel < min || binding.channel >= max {
            min
        } else {
            binding.channel + 1
        };
        match self.link.transport.set_channel(next) {
            Ok(()) => {
                binding.channel = next;
                debug!(channel = next, "scanning channel");
            }
            Err(err) => warn!(channel = next, error = %err, "channel switch failed"),
        }
    }

    pub fn on_receive(&self, sender: PeerAddress, bytes: &[u8]) {
        self.receive(sender, bytes, None, Instant::now());
    }

    /// Handle one inbound frame from `sender`, as if received at `now`.
    pub fn on_receive_at(&self, sender: PeerAddress, bytes: &[u8], now: Instant) {
        self.receive(sender, bytes, None, now);
    }

    /// Handle a frame the radio heard on `channel`. A beacon pins the link to
    /// that channel even if a scan step has retuned the radio since.
    pub fn on_channel_receive(&self, sender: PeerAddress, bytes: &[u8], channel: u8) {
        self.receive(sender, bytes, Some(channel), Instant::now());
    }

    fn receive(&self, sender: PeerAddress, bytes: &[u8], heard_on: Option<u8>, now: Instant) {
        let frame = match decode_frame(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%sender, error = %err, "invalid frame dropped");
                return;
            }
        };
        let beacon = frame.packet_type.is_keepalive() && is_master_beacon(&frame.payload);

        {
            let mut binding = self.link.lock();
            if !binding.started {
                debug!(%sender, "frame before init ignored");
                return;
            }
            if binding.master != Some(sender) {
                if !beacon {
                    debug!(
                        %sender,
                        packet_type = ?frame.packet_type,
                        "frame from unknown sender ignored"
                    );
                    return;
                }
                if let Err(err) = self.link.transport.register_peer(sender) {
                    warn!(%sender, error = %err, "failed to add master peer");
                    return;
                }
                binding.master = Some(sender);
                info!(master = %sender, "master beacon matched, locked to master");
            }
            if beacon {
                binding.last_master_seen = Some(now);
                let tuned = self.link.transport.channel();
                let heard = heard_on.unwrap_or(tuned);
                if heard != tuned {
                    if let Err(err) = self.link.transport.set_channel(heard) {
                        warn!(channel = heard, error = %err, "cannot retune to master channel");
                    }
                }
                binding.channel = heard;
            }
        }

        match frame.packet_type {
            PacketType::Hello => {
                let _ = self
                    .link
                    .send_to_master_at(PacketType::Hello, SLAVE_ONLINE, now);
            }
            PacketType::Heartbeat => {
                let _ = self.link.send_to_master_at(
                    PacketType::State,
                    &SlaveAliveState.encode(),
                    now,
                );
            }
            PacketType::Command => self.dispatch_command(&frame.payload),
            PacketType::State => observe_master_state(&frame.payload),
        }
    }

    fn dispatch_command(&self, payload: &[u8]) {
        if payload.is_empty() {
            info!("empty command received");
            return;
        }
        if IdentityRequest::matches(payload) {
            info!("identity requested by master");
            self.announce();
            return;
        }
        if let Some(request) = WeatherSyncRequest::decode(payload) {
            info!(force = request.force, "weather sync requested by master");
            let _ = self.send_weather_proxy_request();
            return;
        }
        if let Err(err) = self.pipeline.submit_command(payload) {
            warn!(error = %err, "command not queued");
        }
    }

    /// Radio's report on an earlier send.
    pub fn on_send_complete(&self, peer: PeerAddress, status: SendStatus) {
        match status {
            SendStatus::Delivered => debug!(%peer, "tx delivered"),
            SendStatus::Failed => debug!(%peer, "tx failed"),
        }
    }

    pub fn send_state(&self, payload: &[u8]) -> Result<(), LinkError> {
        self.link.send_state(payload)
    }

    /// Send `text` as a STATE payload, UTF-8 bytes only.
    pub fn send_state_text(&self, text: &str) -> Result<(), LinkError> {
        self.send_state(text.as_bytes())
    }

    pub fn send_identity(&self) -> Result<(), LinkError> {
        let identity = IdentityState {
            id: self.config.device_name.clone(),
        };
        self.send_state(&identity.encode())
            .inspect_err(|err| warn!(error = %err, "identity not sent"))
    }

    pub fn send_features(&self) -> Result<(), LinkError> {
        self.send_state(&FeaturesState::node_default().encode())
            .inspect_err(|err| warn!(error = %err, "features not sent"))
    }

    /// Identity then features; either may fail independently.
    fn announce(&self) {
        let _ = self.send_identity();
        let _ = self.send_features();
    }

    /// Announce, then ask the master to fetch current weather for the
    /// configured location.
    pub fn send_weather_proxy_request(&self) -> Result<(), LinkError> {
        self.announce();
        self.send_proxy_request()
    }

    /// Ask for current weather without re-announcing.
    pub fn send_proxy_request(&self) -> Result<(), LinkError> {
        let request = ProxyRequestState {
            method: HttpMethod::Get,
            url: self.config.weather_url(),
        };
        self.send_state(&request.encode())
            .inspect(|_| info!("weather proxy request sent"))
            .inspect_err(|err| warn!(error = %err, "weather proxy request not sent"))
    }

    pub fn send_sensor_reading(
        &self,
        temperature_c: f32,
        humidity_percent: f32,
    ) -> Result<(), LinkError> {
        let reading = SensorState::from_reading(temperature_c, humidity_percent);
        self.send_state(&reading.encode())
            .inspect(|_| debug!(temperature_c, humidity_percent, "sensor reading sent"))
    }

    /// Text status line for debugging masters that log STATE text.
    pub fn send_status_text(&self) -> Result<(), LinkError> {
        let channel = self.channel().to_string();
        let text = codec::build_payload(&[
            ("state", "status"),
            ("device", &self.config.device_name),
            ("channel", &channel),
        ]);
        self.send_state_text(&text)
    }
}

fn observe_master_state(payload: &[u8]) {
    match MasterNetworkState::decode(payload) {
        Some(network) => info!(
            online = network.online,
            channel = network.channel,
            "master network state"
        ),
        None => debug!(len = payload.len(), "state frame from master"),
    }
}
