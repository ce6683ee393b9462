//! Typed state/command records carried inside frame payloads.
//!
//! Every record starts with a 4-byte header `[magic][version][type][reserved]`
//! followed by fixed-width fields. Layouts are packed (no padding) and every
//! multi-byte integer is little-endian. Text fields are NUL-padded to their
//! fixed width and always keep at least one trailing NUL.
//!
//! A payload is a given record only if magic, version, type tag and exact
//! length all match; anything else is "not this type", not an error.

use bytes::{Buf, BufMut, BytesMut};

/// First header byte of every typed record.
pub const MAGIC: u8 = 0xB1;

/// Schema version of the typed records.
pub const SCHEMA_VERSION: u8 = 1;

pub const HEADER_SIZE: usize = 4;

/// Bytes of response body a single proxy chunk can carry.
pub const PROXY_CHUNK_DATA_BYTES: usize = 160;

const IDENTITY_ID_BYTES: usize = 24;
const PROXY_URL_BYTES: usize = 140;
const WEATHER_TIME_BYTES: usize = 20;

/// Contract version advertised in the Features record.
pub const CONTRACT_VERSION: u16 = 1;

pub const FEATURE_IDENTITY: u32 = 1 << 0;
pub const FEATURE_SENSOR: u32 = 1 << 1;
pub const FEATURE_WEATHER: u32 = 1 << 2;
pub const FEATURE_PROXY_CLIENT: u32 = 1 << 3;
pub const FEATURE_CAMERA_JPEG: u32 = 1 << 4;
pub const FEATURE_CAMERA_STREAM: u32 = 1 << 5;
pub const FEATURE_CONTROL_BASIC: u32 = 1 << 6;

/// Record type tag (third header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Identity = 1,
    Sensor = 2,
    ProxyRequest = 3,
    Weather = 4,
    MasterNetwork = 5,
    SlaveAlive = 6,
    ProxyResponseChunk = 7,
    WeatherSyncRequest = 8,
    Features = 9,
    IdentityRequest = 10,
}

/// True if `bytes` carries a typed header with the right magic and version.
pub fn has_valid_header(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_SIZE && bytes[0] == MAGIC && bytes[1] == SCHEMA_VERSION
}

/// True only if magic, version, type tag and exact length all match.
pub fn matches(bytes: &[u8], message_type: MessageType, exact_size: usize) -> bool {
    has_valid_header(bytes) && bytes.len() == exact_size && bytes[2] == message_type as u8
}

/// A fixed-layout typed record.
pub trait TypedMessage: Sized {
    const TYPE: MessageType;
    /// Full encoded size including the header.
    const SIZE: usize;

    fn write_body(&self, out: &mut BytesMut);

    /// Read the body. `body` is exactly `SIZE - HEADER_SIZE` bytes.
    fn read_body(body: &mut &[u8]) -> Option<Self>;

    fn encode(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(Self::SIZE);
        out.put_u8(MAGIC);
        out.put_u8(SCHEMA_VERSION);
        out.put_u8(Self::TYPE as u8);
        out.put_u8(0);
        self.write_body(&mut out);
        debug_assert_eq!(out.len(), Self::SIZE);
        out.to_vec()
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if !matches(bytes, Self::TYPE, Self::SIZE) {
            return None;
        }
        let mut body = &bytes[HEADER_SIZE..];
        Self::read_body(&mut body)
    }

    fn matches(bytes: &[u8]) -> bool {
        matches(bytes, Self::TYPE, Self::SIZE)
    }
}

/// Write `text` into a NUL-padded field of `width` bytes, keeping a trailing NUL.
fn put_fixed_str(out: &mut BytesMut, text: &str, width: usize) {
    let mut n = text.len().min(width - 1);
    while !text.is_char_boundary(n) {
        n -= 1;
    }
    out.put_slice(&text.as_bytes()[..n]);
    out.put_bytes(0, width - n);
}

fn get_fixed_str(body: &mut &[u8], width: usize) -> String {
    let raw = &body[..width];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
    let text = String::from_utf8_lossy(&raw[..end]).into_owned();
    body.advance(width);
    text
}

/// Node identity (device name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityState {
    pub id: String,
}

impl TypedMessage for IdentityState {
    const TYPE: MessageType = MessageType::Identity;
    const SIZE: usize = HEADER_SIZE + IDENTITY_ID_BYTES;

    fn write_body(&self, out: &mut BytesMut) {
        put_fixed_str(out, &self.id, IDENTITY_ID_BYTES);
    }

    fn read_body(body: &mut &[u8]) -> Option<Self> {
        Some(Self {
            id: get_fixed_str(body, IDENTITY_ID_BYTES),
        })
    }
}

/// Local temperature/humidity reading, both scaled by 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorState {
    pub temperature10: i16,
    pub humidity10: u16,
}

impl SensorState {
    pub fn from_reading(temperature_c: f32, humidity_percent: f32) -> Self {
        Self {
            temperature10: (temperature_c * 10.0) as i16,
            humidity10: (humidity_percent * 10.0) as u16,
        }
    }
}

impl TypedMessage for SensorState {
    const TYPE: MessageType = MessageType::Sensor;
    const SIZE: usize = HEADER_SIZE + 4;

    fn write_body(&self, out: &mut BytesMut) {
        out.put_i16_le(self.temperature10);
        out.put_u16_le(self.humidity10);
    }

    fn read_body(body: &mut &[u8]) -> Option<Self> {
        Some(Self {
            temperature10: body.get_i16_le(),
            humidity10: body.get_u16_le(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HttpMethod {
    Get = 1,
    Post = 2,
    Patch = 3,
}

impl HttpMethod {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(HttpMethod::Get),
            2 => Some(HttpMethod::Post),
            3 => Some(HttpMethod::Patch),
            _ => None,
        }
    }
}

/// Ask the master to perform an HTTP request on the node's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequestState {
    pub method: HttpMethod,
    pub url: String,
}

impl TypedMessage for ProxyRequestState {
    const TYPE: MessageType = MessageType::ProxyRequest;
    const SIZE: usize = HEADER_SIZE + 1 + PROXY_URL_BYTES;

    fn write_body(&self, out: &mut BytesMut) {
        out.put_u8(self.method as u8);
        put_fixed_str(out, &self.url, PROXY_URL_BYTES);
    }

    fn read_body(body: &mut &[u8]) -> Option<Self> {
        let method = HttpMethod::from_byte(body.get_u8())?;
        Some(Self {
            method,
            url: get_fixed_str(body, PROXY_URL_BYTES),
        })
    }
}

/// Current weather as reported back to the master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherState {
    pub ok: bool,
    pub code: i16,
    pub time: String,
    pub temperature10: i16,
    pub windspeed10: i16,
    pub winddirection: u16,
}

impl TypedMessage for WeatherState {
    const TYPE: MessageType = MessageType::Weather;
    const SIZE: usize = HEADER_SIZE + 1 + 2 + WEATHER_TIME_BYTES + 2 + 2 + 2;

    fn write_body(&self, out: &mut BytesMut) {
        out.put_u8(self.ok as u8);
        out.put_i16_le(self.code);
        put_fixed_str(out, &self.time, WEATHER_TIME_BYTES);
        out.put_i16_le(self.temperature10);
        out.put_i16_le(self.windspeed10);
        out.put_u16_le(self.winddirection);
    }

    fn read_body(body: &mut &[u8]) -> Option<Self> {
        let ok = body.get_u8() != 0;
        let code = body.get_i16_le();
        let time = get_fixed_str(body, WEATHER_TIME_BYTES);
        Some(Self {
            ok,
            code,
            time,
            temperature10: body.get_i16_le(),
            windspeed10: body.get_i16_le(),
            winddirection: body.get_u16_le(),
        })
    }
}

/// Master's upstream connectivity and radio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterNetworkState {
    pub online: bool,
    pub channel: u8,
}

impl TypedMessage for MasterNetworkState {
    const TYPE: MessageType = MessageType::MasterNetwork;
    const SIZE: usize = HEADER_SIZE + 2;

    fn write_body(&self, out: &mut BytesMut) {
        out.put_u8(self.online as u8);
        out.put_u8(self.channel);
    }

    fn read_body(body: &mut &[u8]) -> Option<Self> {
        Some(Self {
            online: body.get_u8() == 1,
            channel: body.get_u8(),
        })
    }
}

/// Reply to a master Heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveAliveState;

impl TypedMessage for SlaveAliveState {
    const TYPE: MessageType = MessageType::SlaveAlive;
    const SIZE: usize = HEADER_SIZE;

    fn write_body(&self, _out: &mut BytesMut) {}

    fn read_body(_body: &mut &[u8]) -> Option<Self> {
        Some(SlaveAliveState)
    }
}

/// Capability bitmask (`FEATURE_*`) and contract version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeaturesState {
    pub feature_bits: u32,
    pub contract_version: u16,
}

impl FeaturesState {
    /// What this node supports.
    pub fn node_default() -> Self {
        Self {
            feature_bits: FEATURE_IDENTITY
                | FEATURE_SENSOR
                | FEATURE_WEATHER
                | FEATURE_PROXY_CLIENT,
            contract_version: CONTRACT_VERSION,
        }
    }

    pub fn has(&self, feature: u32) -> bool {
        self.feature_bits & feature == feature
    }
}

impl TypedMessage for FeaturesState {
    const TYPE: MessageType = MessageType::Features;
    const SIZE: usize = HEADER_SIZE + 4 + 2 + 2;

    fn write_body(&self, out: &mut BytesMut) {
        out.put_u32_le(self.feature_bits);
        out.put_u16_le(self.contract_version);
        out.put_u16_le(0);
    }

    fn read_body(body: &mut &[u8]) -> Option<Self> {
        let feature_bits = body.get_u32_le();
        let contract_version = body.get_u16_le();
        body.advance(2);
        Some(Self {
            feature_bits,
            contract_version,
        })
    }
}

/// One slice of a proxied HTTP response. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponseChunk {
    pub request_id: u16,
    pub index: u16,
    pub total: u16,
    pub ok: u8,
    pub status_code: i16,
    /// At most `PROXY_CHUNK_DATA_BYTES`; longer data is cut on encode.
    pub data: Vec<u8>,
}

impl TypedMessage for ProxyResponseChunk {
    const TYPE: MessageType = MessageType::ProxyResponseChunk;
    const SIZE: usize = HEADER_SIZE + 2 + 2 + 2 + 1 + 2 + 1 + PROXY_CHUNK_DATA_BYTES;

    fn write_body(&self, out: &mut BytesMut) {
        let len = self.data.len().min(PROXY_CHUNK_DATA_BYTES);
        out.put_u16_le(self.request_id);
        out.put_u16_le(self.index);
        out.put_u16_le(self.total);
        out.put_u8(self.ok);
        out.put_i16_le(self.status_code);
        out.put_u8(len as u8);
        out.put_slice(&self.data[..len]);
        out.put_bytes(0, PROXY_CHUNK_DATA_BYTES - len);
    }

    fn read_body(body: &mut &[u8]) -> Option<Self> {
        let request_id = body.get_u16_le();
        let index = body.get_u16_le();
        let total = body.get_u16_le();
        let ok = body.get_u8();
        let status_code = body.get_i16_le();
        let len = body.get_u8() as usize;
        if len > PROXY_CHUNK_DATA_BYTES {
            return None;
        }
        Some(Self {
            request_id,
            index,
            total,
            ok,
            status_code,
            data: body[..len].to_vec(),
        })
    }
}

/// Master asks the node to (re)request the weather.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherSyncRequest {
    pub force: bool,
}

impl TypedMessage for WeatherSyncRequest {
    const TYPE: MessageType = MessageType::WeatherSyncRequest;
    const SIZE: usize = HEADER_SIZE + 1;

    fn write_body(&self, out: &mut BytesMut) {
        out.put_u8(self.force as u8);
    }

    fn read_body(body: &mut &[u8]) -> Option<Self> {
        Some(Self {
            force: body.get_u8() != 0,
        })
    }
}

/// Master asks the node to announce identity and features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRequest;

impl TypedMessage for IdentityRequest {
    const TYPE: MessageType = MessageType::IdentityRequest;
    const SIZE: usize = HEADER_SIZE;

    fn write_body(&self, _out: &mut BytesMut) {}

    fn read_body(_body: &mut &[u8]) -> Option<Self> {
        Some(IdentityRequest)
    }
}
