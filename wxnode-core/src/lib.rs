//! Weather sensor node link.
//! Host-driven: the host owns the radio and the clock, calls `tick` and
//! `on_receive`; the node sends through a `Transport`.

pub mod protocol;
pub mod state;
pub mod wire;

pub use config::LinkConfig;
pub use node::{LinkError, MasterLink, SlaveNode};
pub use pipeline::{PublishError, StateSink, SubmitError, WeatherCommandPipeline};
pub use protocol::{PacketType, PeerAddress, PROTOCOL_VERSION};
pub use state::TypedMessage;
pub use transport::{SendStatus, Transport, TransportError};
pub use wire::{decode_frame, encode_frame, Frame, FrameDecodeError};

pub mod chunk;
pub mod codec;
pub mod config;
pub mod extract;
pub mod node;
pub mod pipeline;
pub mod transport;
pub mod weather;
