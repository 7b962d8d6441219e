//! Error taxonomy for register definition and raw field access.

use thiserror::Error;

use crate::FieldMode;

/// Errors raised while defining fields or tags on a register.
///
/// Every variant is detected synchronously at the offending call.
/// Validation precedes insertion, so a rejected definition leaves the
/// register byte-for-byte unchanged and otherwise usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// Textual bit range does not parse as `"hi:lo"` or a single bit index.
    #[error("{field}: range `{range}` has wrong syntax, expected `hi:lo` or a single bit index like `22`")]
    MalformedRange {
        /// Label of the offending field or tag.
        field: String,
        /// The rejected range text.
        range: String,
    },
    /// The range must cover at least one bit.
    #[error("{field} has to be at least one bit wide")]
    ZeroWidth {
        /// Label of the offending field or tag.
        field: String,
    },
    /// The range extends past the register's declared width.
    #[error("{field} does not fit in a {register_width}-bit register")]
    OutOfBounds {
        /// Label of the offending field or tag.
        field: String,
        /// Width of the register being defined against.
        register_width: u8,
    },
    /// The range intersects an already defined field or tag.
    #[error("{field} intersects an already defined field or tag")]
    Overlap {
        /// Label of the offending field or tag.
        field: String,
    },
    /// More than one write semantic was requested for a single field.
    #[error("{field} selects more than one write semantic ({mode})")]
    InvalidMode {
        /// Label of the offending field.
        field: String,
        /// The rejected flag combination.
        mode: FieldMode,
    },
    /// Two enumeration members map to the same bit pattern.
    #[error("{field} maps two enumeration members to pattern {pattern:#x}")]
    DuplicateEnumPattern {
        /// Label of the offending field.
        field: String,
        /// The pattern claimed twice.
        pattern: u32,
    },
    /// An enumeration member's bit pattern does not fit the declared width.
    #[error("{field}: member `{member}` ({pattern:#x}) does not fit in {width} bits")]
    EnumPatternTooWide {
        /// Label of the offending field.
        field: String,
        /// Name of the oversized member.
        member: String,
        /// The member's bit pattern.
        pattern: u32,
        /// Declared width of the field.
        width: u8,
    },
}

/// Runtime error from the raw field value setter.
///
/// Raised when the assigned value needs more bits than the field provides;
/// the underlying register state is left unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("value {value:#x} exceeds the capacity of a {width}-bit field")]
pub struct ValueOverflow {
    /// The rejected value.
    pub value: u32,
    /// Width of the field in bits.
    pub width: u8,
}
