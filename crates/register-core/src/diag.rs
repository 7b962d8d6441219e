//! Advisory diagnostics for writes that touch undeclared register bits.
//!
//! The engine never rejects such writes; it reports them through the sink
//! the owning peripheral supplied at construction, at warning severity.

use crate::bits;

/// Sink for advisory warnings emitted by a register's write handling.
///
/// The owning peripheral supplies an implementation when constructing a
/// register. Registers built without a sink drop their diagnostics.
pub trait DiagnosticSink {
    /// Delivers one warning-severity diagnostic message.
    fn warning(&self, message: &str);
}

/// Sink forwarding diagnostics to the `log` facade at warning level.
#[derive(Debug, Clone)]
pub struct LogSink {
    owner: String,
}

impl LogSink {
    /// Creates a sink labeling every message with the owning peripheral's
    /// name.
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }
}

impl DiagnosticSink for LogSink {
    fn warning(&self, message: &str) {
        log::warn!("{}: {message}", self.owner);
    }
}

/// Formats the unhandled-write message: the diagnosed offset, the raw
/// written value, the undeclared bit positions that changed, and every tag
/// overlapping them together with its share of the unhandled bits.
pub(crate) fn unhandled_write_message(
    offset: u64,
    value: u32,
    unhandled: u32,
    tag_hits: &[(String, u32)],
) -> String {
    let positions = bits::set_bit_positions(unhandled)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let mut message = format!(
        "unhandled write to offset {offset:#x}: value {value:#x} touches undeclared bits [{positions}]"
    );
    if !tag_hits.is_empty() {
        let rendered = tag_hits
            .iter()
            .map(|(name, contribution)| format!("{name} ({contribution:#x})"))
            .collect::<Vec<_>>()
            .join(", ");
        message.push_str("; tags: ");
        message.push_str(&rendered);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::unhandled_write_message;

    #[test]
    fn message_lists_offset_value_and_bit_positions() {
        let message = unhandled_write_message(0x48, 0xF0, 0xF0, &[]);
        assert_eq!(
            message,
            "unhandled write to offset 0x48: value 0xf0 touches undeclared bits [4, 5, 6, 7]"
        );
    }

    #[test]
    fn message_appends_tag_contributions_when_present() {
        let hits = vec![
            (String::from("reserved"), 0x3_u32),
            (String::from("not-implemented"), 0x1_u32),
        ];
        let message = unhandled_write_message(0x10, 0x7, 0x7, &hits);
        assert!(message.ends_with("tags: reserved (0x3), not-implemented (0x1)"));
    }
}
