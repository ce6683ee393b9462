//! Radio transport seam. The host owns the radio and delivers inbound frames
//! to the node (`SlaveNode::on_receive`); the node drives the radio through
//! this trait.

use std::sync::Arc;

use crate::protocol::PeerAddress;

/// Vendor radio layer: whole-frame delivery keyed by a 6-byte peer address,
/// one channel active at a time. Every call must return without waiting for
/// delivery.
pub trait Transport: Send + Sync {
    /// Bring the radio layer up.
    fn init(&self) -> Result<(), TransportError>;

    /// Switch the active radio channel.
    fn set_channel(&self, channel: u8) -> Result<(), TransportError>;

    /// Channel the radio is currently on.
    fn channel(&self) -> u8;

    /// Register `peer` for unicast. Registering a known peer succeeds.
    fn register_peer(&self, peer: PeerAddress) -> Result<(), TransportError>;

    /// Queue one frame for `peer`.
    fn send(&self, peer: PeerAddress, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn init(&self) -> Result<(), TransportError> {
        (**self).init()
    }

    fn set_channel(&self, channel: u8) -> Result<(), TransportError> {
        (**self).set_channel(channel)
    }

    fn channel(&self) -> u8 {
        (**self).channel()
    }

    fn register_peer(&self, peer: PeerAddress) -> Result<(), TransportError> {
        (**self).register_peer(peer)
    }

    fn send(&self, peer: PeerAddress, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(peer, bytes)
    }
}

/// Asynchronous outcome of a send, reported by the radio after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("radio init failed: {0}")]
    Init(String),
    #[error("cannot switch to channel {channel}: {reason}")]
    Channel { channel: u8, reason: String },
    #[error("peer {peer} rejected: {reason}")]
    Peer { peer: PeerAddress, reason: String },
    #[error("send to {peer} failed: {reason}")]
    Send { peer: PeerAddress, reason: String },
}
