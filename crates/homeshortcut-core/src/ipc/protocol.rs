//! Binary wire format for shortcut requests and acknowledgements.
//!
//! Every packet starts with a fixed 32-byte header in native byte order.
//! Client and server always run on the same host, so no endianness
//! conversion is done.
//!
//! ```text
//! offset  size  field
//!      0     4  sequence       u32
//!      4     4  kind           i32  (0 = error, 1 = request, 2 = ack)
//!      8     4  payload_size   u32
//!     12    20  body
//!               request: package_len, name_len, content_len, icon_len (u32 each),
//!                        shortcut_type (u32)
//!               ack:     result (i32), 16 zero bytes
//! ```
//!
//! A request payload is the four fields back to back, each NUL-terminated,
//! followed by an 8-byte `f64` refresh period when the widget flag is set in
//! `shortcut_type`. A field length of zero means the field is absent; empty
//! strings are sent as absent.

use crate::config::IpcConfig;
use crate::error::{Result, ShortcutError};

/// Size of the fixed packet header.
pub const HEADER_SIZE: usize = 32;
/// Size of the trailing period of a widget request.
pub const PERIOD_SIZE: usize = std::mem::size_of::<f64>();

/// Low nibble of `shortcut_type`: how the shortcut is launched.
pub const LAUNCH_KIND_MASK: u32 = 0x0000_000F;
/// Set in `shortcut_type` when the request is a periodic widget.
pub const WIDGET_FLAG: u32 = 0x1000_0000;
/// Period handed to handlers of requests that are not periodic.
pub const NOT_PERIODIC: f64 = -1.0;

const SEQUENCE_OFFSET: usize = 0;
const KIND_OFFSET: usize = 4;
const PAYLOAD_SIZE_OFFSET: usize = 8;
const BODY_OFFSET: usize = 12;
const SHORTCUT_TYPE_OFFSET: usize = BODY_OFFSET + 16;

/// Packet discriminant as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PacketKind {
    Error = 0,
    Request = 1,
    Ack = 2,
}

impl PacketKind {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(PacketKind::Error),
            1 => Some(PacketKind::Request),
            2 => Some(PacketKind::Ack),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// How the home screen launches the shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchKind {
    /// Launch the application by package name.
    Package,
    /// Open the URI carried in the content field.
    Uri,
}

impl LaunchKind {
    pub fn as_raw(self) -> u32 {
        match self {
            LaunchKind::Package => 0,
            LaunchKind::Uri => 1,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw & LAUNCH_KIND_MASK {
            0 => Some(LaunchKind::Package),
            1 => Some(LaunchKind::Uri),
            _ => None,
        }
    }
}

/// Encoded byte lengths of the four payload fields, NUL included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldLengths {
    pub package: u32,
    pub name: u32,
    pub content: u32,
    pub icon: u32,
}

impl FieldLengths {
    fn as_array(&self) -> [u32; 4] {
        [self.package, self.name, self.content, self.icon]
    }

    fn from_array(lengths: [u32; 4]) -> Self {
        Self {
            package: lengths[0],
            name: lengths[1],
            content: lengths[2],
            icon: lengths[3],
        }
    }

    /// Sum of the four lengths, `None` on overflow.
    pub fn total(&self) -> Option<u32> {
        self.as_array()
            .iter()
            .try_fold(0u32, |acc, len| acc.checked_add(*len))
    }
}

/// Kind-specific part of the header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeaderBody {
    Error,
    Request {
        lengths: FieldLengths,
        shortcut_type: u32,
    },
    Ack {
        result: i32,
    },
}

/// A decoded fixed-size packet header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketHeader {
    pub sequence: u32,
    pub payload_size: u32,
    pub body: HeaderBody,
}

impl PacketHeader {
    pub fn kind(&self) -> PacketKind {
        match self.body {
            HeaderBody::Error => PacketKind::Error,
            HeaderBody::Request { .. } => PacketKind::Request,
            HeaderBody::Ack { .. } => PacketKind::Ack,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload_size as usize
    }

    /// Serialize the header into its wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        put_u32(&mut buf, SEQUENCE_OFFSET, self.sequence);
        put_i32(&mut buf, KIND_OFFSET, self.kind().as_raw());
        put_u32(&mut buf, PAYLOAD_SIZE_OFFSET, self.payload_size);

        match self.body {
            HeaderBody::Error => {}
            HeaderBody::Request {
                lengths,
                shortcut_type,
            } => {
                for (i, len) in lengths.as_array().iter().enumerate() {
                    put_u32(&mut buf, BODY_OFFSET + i * 4, *len);
                }
                put_u32(&mut buf, SHORTCUT_TYPE_OFFSET, shortcut_type);
            }
            HeaderBody::Ack { result } => put_i32(&mut buf, BODY_OFFSET, result),
        }

        buf
    }
}

/// A shortcut (or periodic widget) request.
///
/// Text fields are `None` when absent; an empty string is treated the same
/// as an absent field on both ends of the connection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShortcutRequest {
    pub package: Option<String>,
    pub name: Option<String>,
    /// Launch kind in the low nibble. Decoded requests carry only the low
    /// nibble; the widget flag is reflected by `period`.
    pub shortcut_type: u32,
    pub content: Option<String>,
    pub icon: Option<String>,
    /// Refresh period in seconds for widget requests.
    pub period: Option<f64>,
}

impl ShortcutRequest {
    pub fn new(package: impl Into<String>, name: impl Into<String>, launch: LaunchKind) -> Self {
        Self {
            package: non_empty(package),
            name: non_empty(name),
            shortcut_type: launch.as_raw(),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = non_empty(content);
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = non_empty(icon);
        self
    }

    /// Turn the request into a periodic widget request.
    pub fn with_period(mut self, period: f64) -> Self {
        self.period = Some(period);
        self
    }

    pub fn launch_kind(&self) -> Option<LaunchKind> {
        LaunchKind::from_raw(self.shortcut_type)
    }

    pub fn is_widget(&self) -> bool {
        self.period.is_some()
    }

    /// Period in seconds, or `NOT_PERIODIC` for plain shortcuts.
    pub fn period_or_sentinel(&self) -> f64 {
        self.period.unwrap_or(NOT_PERIODIC)
    }

    pub fn package(&self) -> &str {
        self.package.as_deref().unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn icon(&self) -> &str {
        self.icon.as_deref().unwrap_or("")
    }

    fn wire_type(&self) -> u32 {
        let base = self.shortcut_type & !WIDGET_FLAG;
        if self.period.is_some() {
            base | WIDGET_FLAG
        } else {
            base
        }
    }
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.is_empty()).then_some(value)
}

/// Build a complete request packet (header followed by payload).
pub fn encode_request(sequence: u32, request: &ShortcutRequest) -> Result<Vec<u8>> {
    let fields = [
        request.package.as_deref(),
        request.name.as_deref(),
        request.content.as_deref(),
        request.icon.as_deref(),
    ];

    let mut lengths = [0u32; 4];
    for (slot, field) in lengths.iter_mut().zip(fields.iter()) {
        *slot = encoded_field_len(*field)?;
    }
    let lengths = FieldLengths::from_array(lengths);

    let period_len = if request.period.is_some() {
        PERIOD_SIZE as u32
    } else {
        0
    };
    let payload_size = lengths
        .total()
        .and_then(|total| total.checked_add(period_len))
        .filter(|size| (*size as usize) <= IpcConfig::MAX_PAYLOAD_SIZE)
        .ok_or_else(|| {
            ShortcutError::invalid(format!(
                "request payload exceeds {} bytes",
                IpcConfig::MAX_PAYLOAD_SIZE
            ))
        })?;

    let header = PacketHeader {
        sequence,
        payload_size,
        body: HeaderBody::Request {
            lengths,
            shortcut_type: request.wire_type(),
        },
    };

    let mut packet = Vec::with_capacity(HEADER_SIZE + payload_size as usize);
    packet.extend_from_slice(&header.encode());
    for field in fields.iter().flatten().filter(|f| !f.is_empty()) {
        packet.extend_from_slice(field.as_bytes());
        packet.push(0);
    }
    if let Some(period) = request.period {
        packet.extend_from_slice(&period.to_ne_bytes());
    }

    Ok(packet)
}

fn encoded_field_len(field: Option<&str>) -> Result<u32> {
    match field {
        None | Some("") => Ok(0),
        Some(value) => {
            if value.as_bytes().contains(&0) {
                return Err(ShortcutError::invalid("field contains an interior NUL byte"));
            }
            u32::try_from(value.len() + 1)
                .map_err(|_| ShortcutError::invalid("field length does not fit the header"))
        }
    }
}

/// Build an acknowledgement packet carrying the handler's result code.
pub fn encode_ack(sequence: u32, result: i32) -> [u8; HEADER_SIZE] {
    PacketHeader {
        sequence,
        payload_size: 0,
        body: HeaderBody::Ack { result },
    }
    .encode()
}

/// Parse and validate a fixed-size header.
///
/// Rejects unknown kinds, payloads above the size limit and request headers
/// whose `payload_size` disagrees with the declared field lengths.
pub fn decode_header(bytes: &[u8]) -> Result<PacketHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(ShortcutError::invalid(format!(
            "header needs {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let sequence = get_u32(bytes, SEQUENCE_OFFSET);
    let raw_kind = get_i32(bytes, KIND_OFFSET);
    let payload_size = get_u32(bytes, PAYLOAD_SIZE_OFFSET);

    let kind = PacketKind::from_raw(raw_kind)
        .ok_or_else(|| ShortcutError::invalid(format!("unknown packet kind {}", raw_kind)))?;

    if payload_size as usize > IpcConfig::MAX_PAYLOAD_SIZE {
        return Err(ShortcutError::invalid(format!(
            "payload size {} exceeds maximum {}",
            payload_size,
            IpcConfig::MAX_PAYLOAD_SIZE
        )));
    }

    let body = match kind {
        PacketKind::Error => HeaderBody::Error,
        PacketKind::Ack => HeaderBody::Ack {
            result: get_i32(bytes, BODY_OFFSET),
        },
        PacketKind::Request => {
            let mut lengths = [0u32; 4];
            for (i, slot) in lengths.iter_mut().enumerate() {
                *slot = get_u32(bytes, BODY_OFFSET + i * 4);
            }
            let lengths = FieldLengths::from_array(lengths);
            let shortcut_type = get_u32(bytes, SHORTCUT_TYPE_OFFSET);

            if expected_payload_size(&lengths, shortcut_type) != Some(payload_size) {
                return Err(ShortcutError::invalid(format!(
                    "payload size {} does not match field lengths {:?}",
                    payload_size, lengths
                )));
            }

            HeaderBody::Request {
                lengths,
                shortcut_type,
            }
        }
    };

    Ok(PacketHeader {
        sequence,
        payload_size,
        body,
    })
}

/// Slice a request payload into its fields.
pub fn decode_request(header: &PacketHeader, payload: &[u8]) -> Result<ShortcutRequest> {
    let HeaderBody::Request {
        lengths,
        shortcut_type,
    } = header.body
    else {
        return Err(ShortcutError::invalid(format!(
            "expected a request packet, got {:?}",
            header.kind()
        )));
    };

    if expected_payload_size(&lengths, shortcut_type) != Some(header.payload_size) {
        return Err(ShortcutError::invalid(format!(
            "payload size {} does not match field lengths {:?}",
            header.payload_size, lengths
        )));
    }
    if payload.len() != header.payload_len() {
        return Err(ShortcutError::invalid(format!(
            "payload is {} bytes, header declares {}",
            payload.len(),
            header.payload_size
        )));
    }

    let mut offset = 0usize;
    let mut fields: [Option<String>; 4] = Default::default();
    for (slot, len) in fields.iter_mut().zip(lengths.as_array()) {
        let end = offset + len as usize;
        *slot = decode_field(&payload[offset..end])?;
        offset = end;
    }
    let [package, name, content, icon] = fields;

    let period = if shortcut_type & WIDGET_FLAG != 0 {
        let mut raw = [0u8; PERIOD_SIZE];
        raw.copy_from_slice(&payload[offset..offset + PERIOD_SIZE]);
        Some(f64::from_ne_bytes(raw))
    } else {
        None
    };

    Ok(ShortcutRequest {
        package,
        name,
        shortcut_type: shortcut_type & LAUNCH_KIND_MASK,
        content,
        icon,
        period,
    })
}

/// Payload size implied by the field lengths and the widget flag.
fn expected_payload_size(lengths: &FieldLengths, shortcut_type: u32) -> Option<u32> {
    let period_len = if shortcut_type & WIDGET_FLAG != 0 {
        PERIOD_SIZE as u32
    } else {
        0
    };
    lengths.total()?.checked_add(period_len)
}

fn decode_field(raw: &[u8]) -> Result<Option<String>> {
    let Some((&last, text)) = raw.split_last() else {
        return Ok(None);
    };
    if last != 0 {
        return Err(ShortcutError::invalid("field is not NUL-terminated"));
    }
    if text.contains(&0) {
        return Err(ShortcutError::invalid("field contains an interior NUL byte"));
    }
    let text = std::str::from_utf8(text)
        .map_err(|e| ShortcutError::invalid(format!("field is not valid UTF-8: {}", e)))?;
    Ok(non_empty(text))
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_ne_bytes(raw)
}

fn get_i32(buf: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_ne_bytes(raw)
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}
