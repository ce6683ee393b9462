//! Weather command pipeline.
//!
//! Command payloads from the master are queued (bounded, non-blocking on the
//! producer side) and drained by one worker thread. The worker reassembles
//! proxy response chunks, pulls the weather fields out of the JSON body and
//! hands a `state=weather` text record to a [`StateSink`].

use std::io;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::chunk::{ChunkAssembler, ChunkReceiveResult, CompletedResponse};
use crate::codec;
use crate::extract;
use crate::node::LinkError;
use crate::protocol::MAX_PAYLOAD_SIZE;
use crate::state::{ProxyResponseChunk, TypedMessage};

/// Queued commands before submissions start failing.
pub const DEFAULT_QUEUE_DEPTH: usize = 10;

const WORKER_NAME: &str = "weather-pipe";

/// Where finished weather records go.
pub trait StateSink: Send + Sync {
    fn publish_state(&self, payload: &str) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("payload is not a weather state")]
    NotWeather,
    #[error("weather state is missing required fields")]
    Incomplete,
    #[error(transparent)]
    Link(#[from] LinkError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("empty command payload")]
    Empty,
    #[error("command payload too large: {0} bytes")]
    TooLarge(usize),
    #[error("pipeline not started")]
    NotStarted,
    #[error("command queue full")]
    QueueFull,
    #[error("command queue closed")]
    Closed,
}

/// What the worker did with one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Not a proxy response chunk.
    Ignored,
    /// Chunk accepted, response not complete yet.
    Buffered,
    /// Chunk or completed response discarded.
    Dropped,
    Published,
    PublishFailed,
}

/// Worker-side state: the chunk assembler and the sink it reports to.
pub struct CommandProcessor {
    assembler: ChunkAssembler,
    sink: Arc<dyn StateSink>,
}

impl CommandProcessor {
    pub fn new(sink: Arc<dyn StateSink>, max_assembled_bytes: usize) -> Self {
        Self {
            assembler: ChunkAssembler::new(max_assembled_bytes),
            sink,
        }
    }

    pub fn handle_command(&mut self, payload: &[u8]) -> CommandOutcome {
        let Some(chunk) = ProxyResponseChunk::decode(payload) else {
            warn!(len = payload.len(), "invalid command struct, ignored");
            return CommandOutcome::Ignored;
        };
        debug!(
            request_id = chunk.request_id,
            index = chunk.index,
            total = chunk.total,
            "proxy chunk"
        );
        match self.assembler.on_chunk(&chunk) {
            ChunkReceiveResult::Complete(response) => self.handle_proxy_payload(response),
            ChunkReceiveResult::InProgress => CommandOutcome::Buffered,
            ChunkReceiveResult::InvalidFields
            | ChunkReceiveResult::OutOfOrder { .. }
            | ChunkReceiveResult::Overflow => CommandOutcome::Dropped,
        }
    }

    fn handle_proxy_payload(&self, response: CompletedResponse) -> CommandOutcome {
        info!(
            request_id = response.request_id,
            chunks = response.chunks,
            ok = response.ok,
            code = response.status_code,
            bytes = response.body.len(),
            "proxy result"
        );
        let body = String::from_utf8_lossy(&response.body);
        let Some(fields) = extract::parse_weather_fields(&body) else {
            warn!("no current_weather fields in proxy body");
            return CommandOutcome::Dropped;
        };
        let (Some(time), Some(temperature), Some(windspeed), Some(winddirection)) = (
            fields.time.as_deref(),
            fields.temperature.as_deref(),
            fields.windspeed.as_deref(),
            fields.winddirection.as_deref(),
        ) else {
            warn!(?fields, "incomplete weather fields, not forwarding");
            return CommandOutcome::Dropped;
        };

        let ok = response.ok.to_string();
        let text = codec::build_payload(&[
            ("state", "weather"),
            ("ok", &ok),
            ("code", fields.code.as_deref().unwrap_or_default()),
            ("time", time),
            ("temperature", temperature),
            ("windspeed", windspeed),
            ("winddirection", winddirection),
        ]);
        match self.sink.publish_state(&text) {
            Ok(()) => {
                info!(time, temperature, windspeed, "weather forwarded to master");
                CommandOutcome::Published
            }
            Err(err) => {
                warn!(error = %err, "weather forward failed");
                CommandOutcome::PublishFailed
            }
        }
    }
}

/// Bounded command queue plus its worker thread. Started once; later starts
/// are no-ops. The worker exits when the pipeline is dropped.
pub struct WeatherCommandPipeline {
    sink: Arc<dyn StateSink>,
    queue_depth: usize,
    max_assembled_bytes: usize,
    queue: OnceLock<mpsc::Sender<Vec<u8>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WeatherCommandPipeline {
    pub fn new(sink: Arc<dyn StateSink>, queue_depth: usize, max_assembled_bytes: usize) -> Self {
        Self {
            sink,
            queue_depth: queue_depth.max(1),
            max_assembled_bytes,
            queue: OnceLock::new(),
            worker: Mutex::new(None),
        }
    }

    pub fn start(&self) -> io::Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(self.queue_depth);
        let mut processor = CommandProcessor::new(self.sink.clone(), self.max_assembled_bytes);
        let handle = std::thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || {
                while let Some(payload) = rx.blocking_recv() {
                    processor.handle_command(&payload);
                }
                debug!("weather pipeline stopped");
            })?;

        if self.queue.set(tx).is_err() {
            debug!("weather pipeline queue already set");
        }
        *worker = Some(handle);
        info!(depth = self.queue_depth, "weather pipeline ready");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.queue.get().is_some_and(|tx| !tx.is_closed())
    }

    /// Copy `payload` into the queue without blocking.
    pub fn submit_command(&self, payload: &[u8]) -> Result<(), SubmitError> {
        if payload.is_empty() {
            return Err(SubmitError::Empty);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(SubmitError::TooLarge(payload.len()));
        }
        let tx = self.queue.get().ok_or(SubmitError::NotStarted)?;
        tx.try_send(payload.to_vec()).map_err(|err| match err {
            TrySendError::Full(_) => {
                warn!("command queue full, payload dropped");
                SubmitError::QueueFull
            }
            TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    const BODY: &str = r#"{"current_weather":{"time":"2024-05-01T10:00","temperature":25.1,"windspeed":4.2,"winddirection":180,"weathercode":3}}"#;

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<String>>,
        fail: bool,
    }

    impl StateSink for RecordingSink {
        fn publish_state(&self, payload: &str) -> Result<(), PublishError> {
            self.published.lock().unwrap().push(payload.to_string());
            if self.fail {
                Err(PublishError::Link(LinkError::MasterUnknown))
            } else {
                Ok(())
            }
        }
    }

    struct ChannelSink(Mutex<std_mpsc::Sender<String>>);

    impl StateSink for ChannelSink {
        fn publish_state(&self, payload: &str) -> Result<(), PublishError> {
            let _ = self.0.lock().unwrap().send(payload.to_string());
            Ok(())
        }
    }

    fn chunks(request_id: u16, body: &[u8], size: usize) -> Vec<Vec<u8>> {
        let parts: Vec<&[u8]> = body.chunks(size).collect();
        let total = parts.len() as u16;
        parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                ProxyResponseChunk {
                    request_id,
                    index: i as u16 + 1,
                    total,
                    ok: 1,
                    status_code: 200,
                    data: part.to_vec(),
                }
                .encode()
            })
            .collect()
    }

    #[test]
    fn chunked_body_publishes_weather_text() {
        let sink = Arc::new(RecordingSink::default());
        let mut processor = CommandProcessor::new(sink.clone(), 1024);
        let encoded = chunks(42, BODY.as_bytes(), 50);
        assert!(encoded.len() > 1);

        let outcomes: Vec<_> = encoded.iter().map(|c| processor.handle_command(c)).collect();
        let (last, rest) = outcomes.split_last().unwrap();
        assert!(rest.iter().all(|o| *o == CommandOutcome::Buffered));
        assert_eq!(*last, CommandOutcome::Published);

        let published = sink.published.lock().unwrap();
        assert_eq!(
            published.as_slice(),
            ["state=weather|---|ok=1|---|code=3|---|time=2024-05-01T10:00|---|temperature=25.1|---|windspeed=4.2|---|winddirection=180"]
        );
    }

    #[test]
    fn missing_code_is_left_out() {
        let sink = Arc::new(RecordingSink::default());
        let mut processor = CommandProcessor::new(sink.clone(), 1024);
        let body = BODY.replace(r#","weathercode":3"#, "");
        for c in chunks(1, body.as_bytes(), 160) {
            processor.handle_command(&c);
        }
        let published = sink.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert!(!published[0].contains("code="));
    }

    #[test]
    fn incomplete_weather_not_published() {
        let sink = Arc::new(RecordingSink::default());
        let mut processor = CommandProcessor::new(sink.clone(), 1024);
        let body = r#"{"current_weather":{"time":"2024-05-01T10:00","temperature":25.1}}"#;
        let outcome = chunks(2, body.as_bytes(), 160)
            .iter()
            .map(|c| processor.handle_command(c))
            .last();
        assert_eq!(outcome, Some(CommandOutcome::Dropped));
        assert!(sink.published.lock().unwrap().is_empty());
    }

    #[test]
    fn non_chunk_commands_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let mut processor = CommandProcessor::new(sink.clone(), 1024);
        assert_eq!(processor.handle_command(b"reboot"), CommandOutcome::Ignored);
        assert!(sink.published.lock().unwrap().is_empty());
    }

    #[test]
    fn sink_failure_reported() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let mut processor = CommandProcessor::new(sink, 1024);
        let outcome = chunks(3, BODY.as_bytes(), 160)
            .iter()
            .map(|c| processor.handle_command(c))
            .last();
        assert_eq!(outcome, Some(CommandOutcome::PublishFailed));
    }

    #[test]
    fn submit_validates_before_start() {
        let pipeline = WeatherCommandPipeline::new(Arc::new(RecordingSink::default()), 10, 1024);
        assert_eq!(pipeline.submit_command(&[]), Err(SubmitError::Empty));
        assert_eq!(
            pipeline.submit_command(&[0u8; MAX_PAYLOAD_SIZE + 1]),
            Err(SubmitError::TooLarge(MAX_PAYLOAD_SIZE + 1))
        );
        assert_eq!(pipeline.submit_command(b"x"), Err(SubmitError::NotStarted));
        assert!(!pipeline.is_running());
    }

    #[test]
    fn worker_drains_queue_in_order() {
        let (tx, rx) = std_mpsc::channel();
        let pipeline =
            WeatherCommandPipeline::new(Arc::new(ChannelSink(Mutex::new(tx))), 10, 1024);
        pipeline.start().unwrap();
        pipeline.start().unwrap();
        assert!(pipeline.is_running());

        for c in chunks(77, BODY.as_bytes(), 40) {
            pipeline.submit_command(&c).unwrap();
        }
        let text = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(text.starts_with("state=weather|---|ok=1"));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
