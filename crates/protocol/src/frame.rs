//! Binary source frame codec
//!
//! Request layout (big-endian):
//!
//! ```text
//! tag(1) sequence(2) source_id(8) status(1) field_count(1)
//!     [field_name(8) field_value(4)] x field_count
//! checksum(1)
//! ```
//!
//! The checksum is the XOR of every byte from the tag through the last field
//! record. Responses are `tag || body || checksum` with the same XOR rule.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::FrameError;

/// Fixed header: tag, sequence, source id, status, field count
pub const HEADER_LEN: usize = 13;
/// One field record: 8-byte name + u32 value
pub const FIELD_LEN: usize = 12;
pub const ACK_TAG: u8 = 0x11;
pub const NAK_TAG: u8 = 0x12;
/// Field count is carried in a single byte
pub const MAX_FIELDS: usize = u8::MAX as usize;

const NAME_LEN: usize = 8;

/// Longitudinal redundancy check: running XOR of all bytes.
#[inline]
pub fn lrc(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Build a response frame: `tag || body || lrc(tag || body)`.
pub fn encode_response(tag: u8, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + 2);
    buf.put_u8(tag);
    buf.put_slice(body);
    let checksum = lrc(&buf);
    buf.put_u8(checksum);
    buf.freeze()
}

macro_rules! ascii_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; NAME_LEN]);

        impl $name {
            /// Accepts exactly 8 ASCII bytes.
            pub fn from_bytes(bytes: [u8; NAME_LEN]) -> Result<Self, FrameError> {
                if bytes.is_ascii() {
                    Ok(Self(bytes))
                } else {
                    Err(FrameError::NonAsciiIdentifier(bytes))
                }
            }

            pub fn as_bytes(&self) -> &[u8; NAME_LEN] {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = FrameError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                let bytes: [u8; NAME_LEN] = value
                    .as_bytes()
                    .try_into()
                    .map_err(|_| FrameError::IdentifierLength(value.to_string()))?;
                Self::from_bytes(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                use fmt::Write;
                self.0.iter().try_for_each(|&b| f.write_char(b as char))
            }
        }
    };
}

ascii_name!(
    /// 8-character source identifier, unique per reporting device
    SourceId
);

ascii_name!(
    /// 8-character field name carried in a field record
    FieldName
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SourceStatus {
    Idle = 1,
    Active = 2,
    Recharge = 3,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Idle => "IDLE",
            SourceStatus::Active => "ACTIVE",
            SourceStatus::Recharge => "RECHARGE",
        }
    }
}

impl TryFrom<u8> for SourceStatus {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(SourceStatus::Idle),
            2 => Ok(SourceStatus::Active),
            3 => Ok(SourceStatus::Recharge),
            other => Err(FrameError::UnknownStatus(other)),
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named value reported alongside a frame. Never stored, only broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldReport {
    pub name: FieldName,
    pub value: u32,
}

impl FieldReport {
    pub fn new(name: FieldName, value: u32) -> Self {
        Self { name, value }
    }
}

/// One validated status frame from a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Reserved for protocol extension; not used for routing
    pub tag: u8,
    pub sequence: u16,
    pub source_id: SourceId,
    pub status: SourceStatus,
    pub fields: Vec<FieldReport>,
}

impl Frame {
    /// Parse the checksummed region (header plus field records).
    ///
    /// Caller has already verified the length and checksum.
    fn parse(raw: &[u8]) -> Result<Self, FrameError> {
        let mut buf = raw;
        let tag = buf.get_u8();
        let sequence = buf.get_u16();
        let mut id = [0u8; NAME_LEN];
        buf.copy_to_slice(&mut id);
        let status_code = buf.get_u8();
        let count = buf.get_u8() as usize;

        let status = SourceStatus::try_from(status_code)?;
        let source_id = SourceId::from_bytes(id)?;

        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let mut name = [0u8; NAME_LEN];
            buf.copy_to_slice(&mut name);
            let value = buf.get_u32();
            fields.push(FieldReport::new(FieldName::from_bytes(name)?, value));
        }

        Ok(Frame {
            tag,
            sequence,
            source_id,
            status,
            fields,
        })
    }

    /// Encode as a request frame with a correct trailing checksum.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        if self.fields.len() > MAX_FIELDS {
            return Err(FrameError::TooManyFields(self.fields.len()));
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.tag);
        buf.put_u16(self.sequence);
        buf.put_slice(self.source_id.as_bytes());
        buf.put_u8(self.status as u8);
        buf.put_u8(self.fields.len() as u8);
        for field in &self.fields {
            buf.put_slice(field.name.as_bytes());
            buf.put_u32(field.value);
        }
        let checksum = lrc(&buf);
        buf.put_u8(checksum);
        Ok(buf.freeze())
    }

    /// Total size on the wire, checksum included
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.fields.len() * FIELD_LEN + 1
    }
}

/// Response sent back to a source after each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ack { sequence: u16 },
    Nak,
}

impl Response {
    pub fn encode(&self) -> Bytes {
        match self {
            Response::Ack { sequence } => encode_response(ACK_TAG, &sequence.to_be_bytes()),
            Response::Nak => encode_response(NAK_TAG, &[0x00]),
        }
    }
}

/// Read until `buf` is full or the stream ends. Returns bytes read.
async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Read and validate one frame.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary. The
/// whole frame, checksum byte included, is consumed before any validation so
/// a rejected frame leaves the stream positioned at the next one.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = BytesMut::zeroed(HEADER_LEN);
    let received = fill(reader, &mut raw).await?;
    if received == 0 {
        return Ok(None);
    }
    if received < HEADER_LEN {
        return Err(FrameError::Truncated {
            expected: HEADER_LEN,
            received,
        });
    }

    let body_len = raw[HEADER_LEN - 1] as usize * FIELD_LEN;
    let total = HEADER_LEN + body_len + 1;
    if body_len > 0 {
        raw.resize(HEADER_LEN + body_len, 0);
        let received = fill(reader, &mut raw[HEADER_LEN..]).await?;
        if received < body_len {
            return Err(FrameError::Truncated {
                expected: total,
                received: HEADER_LEN + received,
            });
        }
    }

    let mut trailer = [0u8; 1];
    if fill(reader, &mut trailer).await? == 0 {
        return Err(FrameError::Truncated {
            expected: total,
            received: total - 1,
        });
    }

    let expected = lrc(&raw);
    if trailer[0] != expected {
        return Err(FrameError::ChecksumMismatch {
            expected,
            actual: trailer[0],
        });
    }

    Frame::parse(&raw).map(Some)
}
