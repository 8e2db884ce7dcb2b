//! Listener feed lines
//!
//! Snapshot: `[<id>] <seq> | <STATUS> | <age>\r\n`
//! Update:   `[<id>] <field_name> | <field_value>\r\n`

use std::fmt::Write;

use bytes::Bytes;

use crate::frame::{FieldReport, SourceId, SourceStatus};

/// One snapshot line for a known source.
///
/// `age` is in hundredths of a second. It is omitted when unknown.
pub fn snapshot_line(
    id: &SourceId,
    sequence: u16,
    status: SourceStatus,
    age: Option<u64>,
) -> String {
    match age {
        Some(age) => format!("[{}] {} | {} | {}\r\n", id, sequence, status, age),
        None => format!("[{}] {} | {}\r\n", id, sequence, status),
    }
}

pub fn field_line(id: &SourceId, report: &FieldReport) -> String {
    format!("[{}] {} | {}\r\n", id, report.name, report.value)
}

/// All update lines for one frame, in field order.
pub fn render_fields(id: &SourceId, fields: &[FieldReport]) -> Bytes {
    let mut out = String::with_capacity(fields.len() * 32);
    for report in fields {
        // Writing to a String cannot fail
        let _ = write!(out, "[{}] {} | {}\r\n", id, report.name, report.value);
    }
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FieldName;

    fn id() -> SourceId {
        SourceId::try_from("SOURCE01").unwrap()
    }

    #[test]
    fn test_snapshot_line() {
        let line = snapshot_line(&id(), 7, SourceStatus::Active, Some(1250));
        assert_eq!(line, "[SOURCE01] 7 | ACTIVE | 1250\r\n");
    }

    #[test]
    fn test_snapshot_line_without_age() {
        let line = snapshot_line(&id(), 0, SourceStatus::Idle, None);
        assert_eq!(line, "[SOURCE01] 0 | IDLE\r\n");
    }

    #[test]
    fn test_field_line() {
        let report = FieldReport::new(FieldName::try_from("TEMP0001").unwrap(), 42);
        assert_eq!(field_line(&id(), &report), "[SOURCE01] TEMP0001 | 42\r\n");
    }

    #[test]
    fn test_render_fields_preserves_order() {
        let fields = vec![
            FieldReport::new(FieldName::try_from("TEMP0001").unwrap(), 42),
            FieldReport::new(FieldName::try_from("VOLT0002").unwrap(), u32::MAX),
        ];
        let rendered = render_fields(&id(), &fields);
        assert_eq!(
            rendered,
            Bytes::from("[SOURCE01] TEMP0001 | 42\r\n[SOURCE01] VOLT0002 | 4294967295\r\n")
        );
        let joined: String = fields.iter().map(|f| field_line(&id(), f)).collect();
        assert_eq!(rendered, Bytes::from(joined));
    }

    #[test]
    fn test_render_no_fields() {
        assert!(render_fields(&id(), &[]).is_empty());
    }
}
