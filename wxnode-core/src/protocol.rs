//! Link protocol: packet types, radio constants and peer addressing.

use std::fmt;

/// Frame protocol version. Frames carrying any other version are rejected.
pub const PROTOCOL_VERSION: u8 = 1;

/// Channel the node starts on when the host does not pick one.
pub const DEFAULT_CHANNEL: u8 = 1;

/// Lowest radio channel visited while scanning for a master.
pub const MIN_SCAN_CHANNEL: u8 = 1;

/// Highest radio channel visited while scanning for a master.
pub const MAX_SCAN_CHANNEL: u8 = 13;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_SIZE: usize = 200;

/// Token a master broadcasts as the whole payload of its Hello/Heartbeat frames.
pub const MASTER_BEACON_ID: &[u8] = b"PIO_MASTER_V1";

/// Payload of the Hello this node sends to its master.
pub const SLAVE_ONLINE: &[u8] = b"slave-online";

/// Outer frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Hello = 1,
    Heartbeat = 2,
    Command = 3,
    State = 4,
}

impl PacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(PacketType::Hello),
            2 => Some(PacketType::Heartbeat),
            3 => Some(PacketType::Command),
            4 => Some(PacketType::State),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Hello and Heartbeat are the only frames a master may use to announce itself.
    pub fn is_keepalive(self) -> bool {
        matches!(self, PacketType::Hello | PacketType::Heartbeat)
    }
}

/// 6-byte radio peer address (MAC style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeerAddress([u8; 6]);

impl PeerAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        PeerAddress(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<[u8; 6]> for PeerAddress {
    fn from(bytes: [u8; 6]) -> Self {
        PeerAddress(bytes)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// True when `payload` is exactly the master beacon token.
pub fn is_master_beacon(payload: &[u8]) -> bool {
    payload == MASTER_BEACON_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_bytes() {
        for t in [
            PacketType::Hello,
            PacketType::Heartbeat,
            PacketType::Command,
            PacketType::State,
        ] {
            assert_eq!(PacketType::from_byte(t.to_byte()), Some(t));
        }
        assert_eq!(PacketType::from_byte(0), None);
        assert_eq!(PacketType::from_byte(5), None);
    }

    #[test]
    fn keepalive_types() {
        assert!(PacketType::Hello.is_keepalive());
        assert!(PacketType::Heartbeat.is_keepalive());
        assert!(!PacketType::Command.is_keepalive());
        assert!(!PacketType::State.is_keepalive());
    }

    #[test]
    fn beacon_must_match_exactly() {
        assert!(is_master_beacon(b"PIO_MASTER_V1"));
        assert!(!is_master_beacon(b"PIO_MASTER_V1\0"));
        assert!(!is_master_beacon(b"PIO_MASTER_V"));
        assert!(!is_master_beacon(b"pio_master_v1"));
        assert!(!is_master_beacon(b""));
    }

    #[test]
    fn peer_address_display() {
        let addr = PeerAddress::new([0x24, 0x6f, 0x28, 0x00, 0xab, 0x01]);
        assert_eq!(addr.to_string(), "24:6F:28:00:AB:01");
    }
}
