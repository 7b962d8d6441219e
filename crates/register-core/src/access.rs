//! Access-mode policy describing which operations are legal for a field.

use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// Set of access disciplines granted to one field's bit range.
    ///
    /// The five write semantics (`WRITE`, `SET`, `TOGGLE`,
    /// `WRITE_ONE_TO_CLEAR`, `WRITE_ZERO_TO_CLEAR`) are mutually exclusive;
    /// `READ` and `READ_TO_CLEAR` combine freely with each other, with any
    /// single write semantic, or with nothing at all. Read-only, write-only
    /// and no-op fields are all legal. A field with no write semantic
    /// ignores bus writes to its range while its write callbacks still fire.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldMode: u8 {
        /// Reads observe this field's bits; otherwise they read as zero.
        const READ = 1 << 0;
        /// Written bits replace the field's range.
        const WRITE = 1 << 1;
        /// Writing `1` bits sets the matching field bits.
        const SET = 1 << 2;
        /// Writing `1` bits inverts the matching field bits.
        const TOGGLE = 1 << 3;
        /// Writing `1` bits clears the matching field bits.
        const WRITE_ONE_TO_CLEAR = 1 << 4;
        /// Writing `0` bits clears the matching field bits.
        const WRITE_ZERO_TO_CLEAR = 1 << 5;
        /// A read clears the field's range after the value is sampled.
        const READ_TO_CLEAR = 1 << 6;
    }
}

/// The single write discipline selected for a field, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteSemantic {
    /// Written bits replace the field's range.
    Write,
    /// Writing `1` bits sets the matching field bits.
    Set,
    /// Writing `1` bits inverts the matching field bits.
    Toggle,
    /// Writing `1` bits clears the matching field bits.
    WriteOneToClear,
    /// Writing `0` bits clears the matching field bits.
    WriteZeroToClear,
}

impl FieldMode {
    /// Union of the five mutually exclusive write semantics.
    pub const WRITE_SEMANTICS: Self = Self::WRITE
        .union(Self::SET)
        .union(Self::TOGGLE)
        .union(Self::WRITE_ONE_TO_CLEAR)
        .union(Self::WRITE_ZERO_TO_CLEAR);

    /// Returns true when bus reads may observe this field's bits.
    #[must_use]
    pub const fn is_readable(self) -> bool {
        self.contains(Self::READ)
    }

    /// Returns the write semantic selected for this field.
    ///
    /// Only meaningful for validated modes, which carry at most one.
    #[must_use]
    pub const fn write_semantic(self) -> Option<WriteSemantic> {
        if self.contains(Self::WRITE) {
            Some(WriteSemantic::Write)
        } else if self.contains(Self::SET) {
            Some(WriteSemantic::Set)
        } else if self.contains(Self::TOGGLE) {
            Some(WriteSemantic::Toggle)
        } else if self.contains(Self::WRITE_ONE_TO_CLEAR) {
            Some(WriteSemantic::WriteOneToClear)
        } else if self.contains(Self::WRITE_ZERO_TO_CLEAR) {
            Some(WriteSemantic::WriteZeroToClear)
        } else {
            None
        }
    }

    /// Returns true when at most one write semantic is selected.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.intersection(Self::WRITE_SEMANTICS).bits().count_ones() <= 1
    }
}

impl fmt::Display for FieldMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(FieldMode, &str); 7] = [
            (FieldMode::READ, "Read"),
            (FieldMode::WRITE, "Write"),
            (FieldMode::SET, "Set"),
            (FieldMode::TOGGLE, "Toggle"),
            (FieldMode::WRITE_ONE_TO_CLEAR, "WriteOneToClear"),
            (FieldMode::WRITE_ZERO_TO_CLEAR, "WriteZeroToClear"),
            (FieldMode::READ_TO_CLEAR, "ReadToClear"),
        ];

        if self.is_empty() {
            return f.write_str("None");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldMode, WriteSemantic};

    #[test]
    fn every_single_write_semantic_is_valid() {
        for mode in [
            FieldMode::WRITE,
            FieldMode::SET,
            FieldMode::TOGGLE,
            FieldMode::WRITE_ONE_TO_CLEAR,
            FieldMode::WRITE_ZERO_TO_CLEAR,
        ] {
            assert!(mode.is_valid());
            assert!(mode.union(FieldMode::READ).is_valid());
            assert!(mode.union(FieldMode::READ_TO_CLEAR).is_valid());
        }
    }

    #[test]
    fn every_pair_of_write_semantics_is_invalid() {
        let semantics = [
            FieldMode::WRITE,
            FieldMode::SET,
            FieldMode::TOGGLE,
            FieldMode::WRITE_ONE_TO_CLEAR,
            FieldMode::WRITE_ZERO_TO_CLEAR,
        ];
        for (index, first) in semantics.iter().enumerate() {
            for second in &semantics[index + 1..] {
                assert!(!first.union(*second).is_valid());
                assert!(!first.union(*second).union(FieldMode::READ).is_valid());
            }
        }
    }

    #[test]
    fn read_only_and_empty_modes_are_valid() {
        assert!(FieldMode::READ.is_valid());
        assert!(FieldMode::READ.union(FieldMode::READ_TO_CLEAR).is_valid());
        assert!(FieldMode::empty().is_valid());
    }

    #[test]
    fn write_semantic_selection_matches_the_flag() {
        assert_eq!(
            FieldMode::WRITE.write_semantic(),
            Some(WriteSemantic::Write)
        );
        assert_eq!(FieldMode::SET.write_semantic(), Some(WriteSemantic::Set));
        assert_eq!(
            FieldMode::TOGGLE.write_semantic(),
            Some(WriteSemantic::Toggle)
        );
        assert_eq!(
            FieldMode::WRITE_ONE_TO_CLEAR.write_semantic(),
            Some(WriteSemantic::WriteOneToClear)
        );
        assert_eq!(
            FieldMode::WRITE_ZERO_TO_CLEAR.write_semantic(),
            Some(WriteSemantic::WriteZeroToClear)
        );
        assert_eq!(FieldMode::READ.write_semantic(), None);
        assert_eq!(FieldMode::empty().write_semantic(), None);
    }

    #[test]
    fn readability_ignores_write_flags() {
        assert!(FieldMode::READ.is_readable());
        assert!(!FieldMode::WRITE.is_readable());
        assert!(!FieldMode::READ_TO_CLEAR.is_readable());
    }

    #[test]
    fn display_joins_flag_names_in_declaration_order() {
        let mode = FieldMode::READ | FieldMode::WRITE;
        assert_eq!(mode.to_string(), "Read|Write");
        assert_eq!(FieldMode::empty().to_string(), "None");
        assert_eq!(
            FieldMode::READ_TO_CLEAR.to_string(),
            "ReadToClear"
        );
    }
}
