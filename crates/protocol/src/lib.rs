//! telerelay-protocol: Source frame codec and listener feed formatting
//!
//! Sources push fixed-layout binary status frames guarded by an XOR checksum;
//! listeners receive the same data as `\r\n` terminated text lines.

pub mod error;
pub mod feed;
pub mod frame;

pub use error::FrameError;
pub use feed::{field_line, render_fields, snapshot_line};
pub use frame::{
    encode_response, lrc, read_frame, FieldName, FieldReport, Frame, Response, SourceId,
    SourceStatus, ACK_TAG, FIELD_LEN, HEADER_LEN, MAX_FIELDS, NAK_TAG,
};
