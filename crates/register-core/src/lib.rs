//! Bit-exact modeling of memory-mapped peripheral registers for
//! full-system hardware simulation.
//!
//! A peripheral declares which bit ranges of a fixed-width register carry
//! which semantics and which access discipline governs each range, then
//! forwards bus-level reads and writes to the register. The engine masks
//! unreadable bits, applies clear-on-read and clear-on-write semantics,
//! invokes callbacks in a well-defined order, and reports writes that
//! touch undeclared bits.

/// Bit-range arithmetic over the engine's native representation.
pub mod bits;
pub use bits::{
    and_not_range, any_bit_set, clear_range, extract, merge_range, merge_shifted, range_mask,
    set_bit_positions, set_range, xor_range, NATIVE_BITS,
};

/// Access-mode policy flags and the write-semantic selection.
pub mod access;
pub use access::{FieldMode, WriteSemantic};

/// Error taxonomy for definition and raw field access.
pub mod error;
pub use error::{DefinitionError, ValueOverflow};

/// Advisory diagnostics sink and the unhandled-write message contract.
pub mod diag;
pub use diag::{DiagnosticSink, LogSink};

/// Typed field views, handles and definition builders.
pub mod field;
pub use field::{
    EnumField, EnumFieldBuilder, FieldEnum, FlagField, FlagFieldBuilder, ValueField,
    ValueFieldBuilder,
};

/// The width-parameterized register engine.
pub mod register;
pub use register::Register;

/// Width adapters narrowing the engine to 8, 16 or 32 bits.
pub mod width;
pub use width::{ByteRegister, DoubleWordRegister, RegisterWidth, WordRegister};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
