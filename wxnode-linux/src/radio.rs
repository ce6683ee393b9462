//! Radio simulation over UDP: one socket per channel, peers addressed by
//! IPv4 + port packed into the 6-byte peer address.
//!
//! Only frames arriving on the socket of the currently tuned channel are
//! delivered; the rest are dropped, as a real radio would never hear them.

use std::collections::HashSet;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use wxnode_core::wire::MAX_FRAME_LEN;
use wxnode_core::{PeerAddress, SendStatus, SlaveNode, Transport, TransportError};

pub type SendReport = (PeerAddress, SendStatus);

pub fn peer_from_socket(addr: SocketAddrV4) -> PeerAddress {
    let [a, b, c, d] = addr.ip().octets();
    let [hi, lo] = addr.port().to_be_bytes();
    PeerAddress::new([a, b, c, d, hi, lo])
}

pub fn socket_from_peer(peer: PeerAddress) -> SocketAddrV4 {
    let [a, b, c, d, hi, lo] = *peer.as_bytes();
    SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), u16::from_be_bytes([hi, lo]))
}

pub struct UdpRadio {
    sockets: Vec<Arc<UdpSocket>>,
    min_channel: u8,
    channel: AtomicU8,
    ready: AtomicBool,
    peers: Mutex<HashSet<PeerAddress>>,
    reports: mpsc::UnboundedSender<SendReport>,
}

impl UdpRadio {
    /// Bind channels `min..=max` on `ip`. Channel N uses `base_port + N`, or an
    /// ephemeral port when `base_port` is 0.
    pub async fn bind(
        ip: Ipv4Addr,
        base_port: u16,
        min_channel: u8,
        max_channel: u8,
    ) -> io::Result<(Self, mpsc::UnboundedReceiver<SendReport>)> {
        if min_channel == 0 || min_channel > max_channel {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bad channel range {min_channel}..={max_channel}"),
            ));
        }
        let mut sockets = Vec::new();
        for ch in min_channel..=max_channel {
            let port = if base_port == 0 {
                0
            } else {
                base_port.checked_add(u16::from(ch)).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "channel port out of range")
                })?
            };
            let socket = UdpSocket::bind(SocketAddrV4::new(ip, port)).await?;
            // try_send_to reports WouldBlock until the socket's write readiness is known.
            socket.writable().await?;
            debug!(channel = ch, addr = %socket.local_addr()?, "channel socket bound");
            sockets.push(Arc::new(socket));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let radio = Self {
            sockets,
            min_channel,
            channel: AtomicU8::new(min_channel),
            ready: AtomicBool::new(false),
            peers: Mutex::new(HashSet::new()),
            reports: tx,
        };
        Ok((radio, rx))
    }

    fn socket(&self, channel: u8) -> Option<&Arc<UdpSocket>> {
        let index = channel.checked_sub(self.min_channel)?;
        self.sockets.get(usize::from(index))
    }

    /// Address this radio listens on for `channel`.
    pub fn local_addr(&self, channel: u8) -> Option<SocketAddr> {
        self.socket(channel)?.local_addr().ok()
    }

    pub fn is_registered(&self, peer: PeerAddress) -> bool {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&peer)
    }

    fn report(&self, peer: PeerAddress, status: SendStatus) {
        let _ = self.reports.send((peer, status));
    }
}

impl Transport for UdpRadio {
    fn init(&self) -> Result<(), TransportError> {
        if self.sockets.is_empty() {
            return Err(TransportError::Init("no channel sockets".into()));
        }
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    fn set_channel(&self, channel: u8) -> Result<(), TransportError> {
        if self.socket(channel).is_none() {
            return Err(TransportError::Channel {
                channel,
                reason: "no socket for channel".into(),
            });
        }
        self.channel.store(channel, Ordering::Release);
        Ok(())
    }

    fn channel(&self) -> u8 {
        self.channel.load(Ordering::Acquire)
    }

    fn register_peer(&self, peer: PeerAddress) -> Result<(), TransportError> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer);
        Ok(())
    }

    fn send(&self, peer: PeerAddress, bytes: &[u8]) -> Result<(), TransportError> {
        let fail = |reason: &str| TransportError::Send {
            peer,
            reason: reason.to_string(),
        };
        if !self.ready.load(Ordering::Acquire) {
            return Err(fail("radio not initialized"));
        }
        if !self.is_registered(peer) {
            return Err(fail("peer not registered"));
        }
        let socket = self
            .socket(self.channel())
            .ok_or_else(|| fail("no socket for channel"))?;
        match socket.try_send_to(bytes, SocketAddr::V4(socket_from_peer(peer))) {
            Ok(_) => {
                self.report(peer, SendStatus::Delivered);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(fail("socket busy")),
            Err(err) => {
                self.report(peer, SendStatus::Failed);
                Err(fail(&err.to_string()))
            }
        }
    }
}

/// Spawn one receive task per channel socket feeding `node`.
pub fn spawn_receivers(
    radio: Arc<UdpRadio>,
    node: Arc<SlaveNode<Arc<UdpRadio>>>,
) -> Vec<JoinHandle<()>> {
    (0..radio.sockets.len())
        .map(|i| {
            let radio = radio.clone();
            let node = node.clone();
            let socket = radio.sockets[i].clone();
            let channel = radio.min_channel + i as u8;
            tokio::spawn(async move {
                let mut buf = vec![0u8; MAX_FRAME_LEN + 64];
                loop {
                    let (n, from) = match socket.recv_from(&mut buf).await {
                        Ok(r) => r,
                        Err(err) => {
                            warn!(channel, error = %err, "radio receive failed");
                            continue;
                        }
                    };
                    if radio.channel() != channel {
                        trace!(channel, %from, "off-channel frame dropped");
                        continue;
                    }
                    let SocketAddr::V4(from) = from else {
                        trace!(%from, "non-IPv4 sender dropped");
                        continue;
                    };
                    node.on_channel_receive(peer_from_socket(from), &buf[..n], channel);
                }
            })
        })
        .collect()
}
