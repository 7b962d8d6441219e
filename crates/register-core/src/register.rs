//! The width-parameterized register engine: definition surface, the
//! read/write orchestration algorithms, reset, and introspection.

use std::cell::Cell;
use std::fmt::Write as _;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::bits;
use crate::diag::{self, DiagnosticSink};
use crate::field::{
    field_label, Backing, EnumFieldBuilder, FieldEntry, FieldEnum, FlagFieldBuilder, RawCallback,
    ValueFieldBuilder,
};
use crate::{DefinitionError, FieldMode, RegisterWidth, WriteSemantic};

/// A documentary bit range: named, overlap-checked, reported by the
/// unhandled-write diagnostic, but carrying no value and no callbacks.
struct Tag {
    name: String,
    position: u8,
    width: u8,
}

/// How a definition call addressed its bit range.
pub(crate) enum RangeSpec {
    /// Explicit `(position, width)` pair.
    Explicit {
        /// Position of the least significant bit.
        position: u8,
        /// Width in bits.
        width: u8,
    },
    /// Textual `"hi:lo"` span or single bit index, parsed at definition.
    Text(String),
}

/// Parses `"hi:lo"` or a single bit index into `(position, width)`.
///
/// An inverted span like `"1:5"` parses into a zero width so the dimension
/// check rejects it, keeping syntax errors and shape errors distinct.
fn parse_bit_range(text: &str) -> Option<(u8, u8)> {
    let text = text.trim();
    if let Some((high, low)) = text.split_once(':') {
        let high: u8 = high.trim().parse().ok()?;
        let low: u8 = low.trim().parse().ok()?;
        let width = (i16::from(high) - i16::from(low) + 1).max(0);
        Some((low, u8::try_from(width).unwrap_or(u8::MAX)))
    } else {
        let bit: u8 = text.parse().ok()?;
        Some((bit, 1))
    }
}

/// Resolves a range specification into `(position, width)`.
pub(crate) fn resolve_spec(
    spec: &RangeSpec,
    name: Option<&str>,
) -> Result<(u8, u8), DefinitionError> {
    match spec {
        RangeSpec::Explicit { position, width } => Ok((*position, *width)),
        RangeSpec::Text(text) => {
            parse_bit_range(text).ok_or_else(|| DefinitionError::MalformedRange {
                field: field_label(name, None),
                range: text.clone(),
            })
        }
    }
}

/// A fixed-width peripheral register holding declared fields and tags.
///
/// A register is built once per owning peripheral, populated with fields
/// and tags during the peripheral's setup phase, and only then exposed to
/// bus traffic. Definitions are append-only; there is no removal.
///
/// Execution is single-threaded and synchronous: [`read`](Self::read),
/// [`write`](Self::write) and [`reset`](Self::reset) run to completion on
/// the calling thread and every callback fires inline before the
/// triggering call returns. Callbacks may access other registers, but
/// re-entering `read` or `write` on the same register from one of its own
/// callbacks is not supported.
pub struct Register<W: RegisterWidth> {
    reset_value: u32,
    underlying: Backing,
    fields: Vec<FieldEntry>,
    tags: Vec<Tag>,
    defined_fields_mask: u32,
    read_callbacks: Vec<RawCallback>,
    write_callbacks: Vec<RawCallback>,
    change_callbacks: Vec<RawCallback>,
    sink: Option<Rc<dyn DiagnosticSink>>,
    width_marker: PhantomData<W>,
}

impl<W: RegisterWidth> Register<W> {
    /// Creates a register with the given reset value and no diagnostic
    /// sink. Unhandled-write diagnostics are dropped.
    #[must_use]
    pub fn new(reset_value: W) -> Self {
        Self::build(reset_value, None)
    }

    /// Creates a register whose unhandled-write diagnostics go to `sink`,
    /// normally the owning peripheral's logger.
    #[must_use]
    pub fn with_sink(reset_value: W, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self::build(reset_value, Some(sink))
    }

    /// Creates an ad-hoc register with a single full-width `READ | WRITE`
    /// value field and no sink.
    #[must_use]
    pub fn read_write(reset_value: W) -> Self {
        let mut register = Self::new(reset_value);
        // A full-width field on an empty register cannot fail validation.
        let _ = register.value_field(0, W::BITS).define();
        register
    }

    fn build(reset_value: W, sink: Option<Rc<dyn DiagnosticSink>>) -> Self {
        let reset_value = reset_value.widen();
        Self {
            reset_value,
            underlying: Rc::new(Cell::new(reset_value)),
            fields: Vec::new(),
            tags: Vec::new(),
            defined_fields_mask: 0,
            read_callbacks: Vec::new(),
            write_callbacks: Vec::new(),
            change_callbacks: Vec::new(),
            sink,
            width_marker: PhantomData,
        }
    }

    /// Starts the definition of a numeric value field over an explicit
    /// `(position, width)` range.
    pub fn value_field(&mut self, position: u8, width: u8) -> ValueFieldBuilder<'_, W> {
        ValueFieldBuilder::new(self, RangeSpec::Explicit { position, width })
    }

    /// Starts the definition of a numeric value field over a textual
    /// `"hi:lo"` span or single bit index.
    pub fn value_field_range(&mut self, range: &str) -> ValueFieldBuilder<'_, W> {
        ValueFieldBuilder::new(self, RangeSpec::Text(range.to_owned()))
    }

    /// Starts the definition of a boolean flag field at `position`.
    pub fn flag_field(&mut self, position: u8) -> FlagFieldBuilder<'_, W> {
        FlagFieldBuilder::new(self, RangeSpec::Explicit { position, width: 1 })
    }

    /// Starts the definition of a boolean flag field at a textual single
    /// bit index.
    pub fn flag_field_range(&mut self, range: &str) -> FlagFieldBuilder<'_, W> {
        FlagFieldBuilder::new(self, RangeSpec::Text(range.to_owned()))
    }

    /// Starts the definition of an enumerated field over an explicit
    /// `(position, width)` range.
    pub fn enum_field<E: FieldEnum>(
        &mut self,
        position: u8,
        width: u8,
    ) -> EnumFieldBuilder<'_, W, E> {
        EnumFieldBuilder::new(self, RangeSpec::Explicit { position, width })
    }

    /// Starts the definition of an enumerated field over a textual
    /// `"hi:lo"` span or single bit index.
    pub fn enum_field_range<E: FieldEnum>(&mut self, range: &str) -> EnumFieldBuilder<'_, W, E> {
        EnumFieldBuilder::new(self, RangeSpec::Text(range.to_owned()))
    }

    /// Declares a documentary tag over an unimplemented bit range so
    /// writes there are reported by name.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] when the range is empty, leaves the
    /// register bounds, or intersects an existing field or tag. The
    /// register is unchanged on error.
    pub fn tag(&mut self, name: &str, position: u8, width: u8) -> Result<(), DefinitionError> {
        self.check_range(position, width, &format!("tag `{name}`"))?;
        self.tags.push(Tag {
            name: name.to_owned(),
            position,
            width,
        });
        Ok(())
    }

    /// Declares a documentary tag over a textual `"hi:lo"` span or single
    /// bit index.
    ///
    /// # Errors
    ///
    /// As [`tag`](Self::tag), plus [`DefinitionError::MalformedRange`]
    /// when the text does not parse.
    pub fn tag_range(&mut self, name: &str, range: &str) -> Result<(), DefinitionError> {
        let (position, width) =
            parse_bit_range(range).ok_or_else(|| DefinitionError::MalformedRange {
                field: format!("tag `{name}`"),
                range: range.to_owned(),
            })?;
        self.tag(name, position, width)
    }

    /// Appends a register-level callback fired once per read, after all
    /// field-level read callbacks, with the register's `(before, after)`
    /// values. Fires for unreadable registers too.
    pub fn add_read_callback(&mut self, mut callback: impl FnMut(W, W) + 'static) {
        self.read_callbacks.push(Box::new(move |old, new| {
            callback(W::truncate(old), W::truncate(new));
        }));
    }

    /// Appends a register-level callback fired once per write with the
    /// value before the write and the raw written value. Fires for
    /// unwritable registers too.
    pub fn add_write_callback(&mut self, mut callback: impl FnMut(W, W) + 'static) {
        self.write_callbacks.push(Box::new(move |old, new| {
            callback(W::truncate(old), W::truncate(new));
        }));
    }

    /// Appends a register-level callback fired when a read or write
    /// changed any field, with the `(before, after)` register values.
    pub fn add_change_callback(&mut self, mut callback: impl FnMut(W, W) + 'static) {
        self.change_callbacks.push(Box::new(move |old, new| {
            callback(W::truncate(old), W::truncate(new));
        }));
    }

    /// Reads the register.
    ///
    /// Value providers run first, in definition order, each merged into
    /// the underlying value immediately so later providers observe it.
    /// Unreadable fields read as zero; fields with `READ_TO_CLEAR` drop
    /// their set bits from the stored value after sampling. The returned
    /// value reflects the pre-clear content, so a readable clear-on-read
    /// field yields its value on the read that clears it.
    pub fn read(&mut self) -> W {
        W::truncate(self.read_raw())
    }

    /// Writes `value` against every field's write semantic and fires the
    /// write/change callbacks. `offset` does not participate in routing;
    /// it only labels the unhandled-write diagnostic.
    ///
    /// A write that changes bits outside every declared field and tag
    /// emits one advisory warning through the sink; the warning never
    /// blocks the write.
    pub fn write(&mut self, offset: u64, value: W) {
        self.write_raw(offset, value.widen());
    }

    /// Restores the underlying value to the reset value. Field and tag
    /// declarations are untouched; no callbacks fire.
    pub fn reset(&mut self) {
        self.underlying.set(self.reset_value);
    }

    /// Raw underlying bit pattern, without any masking or reaction.
    #[must_use]
    pub fn underlying_value(&self) -> W {
        W::truncate(self.underlying.get())
    }

    /// Union of every declared field's bit range.
    #[must_use]
    pub const fn defined_fields_mask(&self) -> u32 {
        self.defined_fields_mask
    }

    /// Human-readable dump of every declared field, its shape, access mode
    /// and name, the legal members of enumerated fields, and a trailer
    /// listing all tags. Meant for operators and tooling, not parsing.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for field in &self.fields {
            let _ = writeln!(
                out,
                "offset {}, width {}, access {}, name: {}",
                field.position,
                field.width,
                field.mode,
                field.name.as_deref().unwrap_or("-")
            );
            if let Some(members) = field.enum_members {
                for (pattern, member) in members {
                    let _ = writeln!(out, "  ({pattern:#x}) {member}");
                }
            }
        }
        let _ = writeln!(out, "unimplemented/reserved ranges:");
        for tag in &self.tags {
            let _ = writeln!(
                out,
                "offset {}, width {}, name: {}",
                tag.position, tag.width, tag.name
            );
        }
        out
    }

    pub(crate) fn validate_field(
        &self,
        position: u8,
        width: u8,
        mode: FieldMode,
        label: &str,
    ) -> Result<(), DefinitionError> {
        if !mode.is_valid() {
            return Err(DefinitionError::InvalidMode {
                field: label.to_owned(),
                mode,
            });
        }
        self.check_range(position, width, label)
    }

    pub(crate) fn attach_field(&mut self, entry: FieldEntry) -> Backing {
        self.fields.push(entry);
        self.recalculate_defined_mask();
        Rc::clone(&self.underlying)
    }

    fn check_range(&self, position: u8, width: u8, label: &str) -> Result<(), DefinitionError> {
        if width == 0 {
            return Err(DefinitionError::ZeroWidth {
                field: label.to_owned(),
            });
        }
        let end = u16::from(position) + u16::from(width);
        if end > u16::from(W::BITS) {
            return Err(DefinitionError::OutOfBounds {
                field: label.to_owned(),
                register_width: W::BITS,
            });
        }
        let occupied = self
            .fields
            .iter()
            .map(|field| (field.position, field.width))
            .chain(self.tags.iter().map(|tag| (tag.position, tag.width)));
        for (other_position, other_width) in occupied {
            let other_end = u16::from(other_position) + u16::from(other_width);
            if end.min(other_end) > u16::from(position.max(other_position)) {
                return Err(DefinitionError::Overlap {
                    field: label.to_owned(),
                });
            }
        }
        Ok(())
    }

    fn recalculate_defined_mask(&mut self) {
        let mut mask = 0_u32;
        for field in &self.fields {
            mask |= bits::range_mask(field.position, field.width);
        }
        self.defined_fields_mask = mask;
    }

    fn read_raw(&mut self) -> u32 {
        for field in &mut self.fields {
            let merged = field.apply_value_provider(self.underlying.get());
            self.underlying.set(merged);
        }

        let base = self.underlying.get();
        let mut to_return = base;
        let mut changed = vec![false; self.fields.len()];
        for (index, field) in self.fields.iter().enumerate() {
            if !field.mode.is_readable() {
                to_return = bits::clear_range(to_return, field.position, field.width);
            }
            if field.mode.contains(FieldMode::READ_TO_CLEAR)
                && bits::any_bit_set(self.underlying.get(), field.position, field.width)
            {
                self.underlying.set(bits::clear_range(
                    self.underlying.get(),
                    field.position,
                    field.width,
                ));
                changed[index] = true;
            }
        }

        for field in &mut self.fields {
            let current = self.underlying.get();
            field.notify_read(base, current);
        }
        for (index, field) in self.fields.iter_mut().enumerate() {
            if changed[index] {
                let current = self.underlying.get();
                field.notify_change(base, current);
            }
        }
        for callback in &mut self.read_callbacks {
            callback(base, self.underlying.get());
        }
        if changed.contains(&true) {
            for callback in &mut self.change_callbacks {
                callback(base, self.underlying.get());
            }
        }
        to_return
    }

    fn write_raw(&mut self, offset: u64, value: u32) {
        let base = self.underlying.get();
        let difference = base ^ value;
        let newly_set = value & !base;

        let mut changed = vec![false; self.fields.len()];
        for (index, field) in self.fields.iter().enumerate() {
            let Some(semantic) = field.mode.write_semantic() else {
                continue;
            };
            let (position, width) = (field.position, field.width);
            let current = self.underlying.get();
            // The triggering condition is a bit test on the incoming value,
            // not a before/after comparison: setting already-set bits of a
            // SET field is a no-op and must not report a change.
            let updated = match semantic {
                WriteSemantic::Write => bits::any_bit_set(difference, position, width)
                    .then(|| bits::merge_range(current, value, position, width)),
                WriteSemantic::Set => bits::any_bit_set(newly_set, position, width)
                    .then(|| bits::set_range(current, newly_set, position, width)),
                WriteSemantic::Toggle => bits::any_bit_set(value, position, width)
                    .then(|| bits::xor_range(current, value, position, width)),
                WriteSemantic::WriteOneToClear => bits::any_bit_set(value, position, width)
                    .then(|| bits::and_not_range(current, value, position, width)),
                WriteSemantic::WriteZeroToClear => bits::any_bit_set(!value, position, width)
                    .then(|| bits::and_not_range(current, !value, position, width)),
            };
            if let Some(new_value) = updated {
                self.underlying.set(new_value);
                changed[index] = true;
            }
        }

        for field in &mut self.fields {
            field.notify_write(base, value);
        }
        for (index, field) in self.fields.iter_mut().enumerate() {
            if changed[index] {
                let current = self.underlying.get();
                field.notify_change(base, current);
            }
        }
        for callback in &mut self.write_callbacks {
            callback(base, value);
        }
        if changed.contains(&true) {
            for callback in &mut self.change_callbacks {
                callback(base, self.underlying.get());
            }
        }

        // Bits changed outside every field are unhandled. Ranges covered by
        // a tag are known-unimplemented and stay silent on their own; the
        // diagnostic fires once the write also strays past all tags, and
        // then reports the full unhandled set with tag names attached.
        let unhandled = difference & !self.defined_fields_mask;
        if unhandled & !self.tagged_mask() != 0 {
            self.report_unhandled_write(offset, value, unhandled);
        }
    }

    fn tagged_mask(&self) -> u32 {
        self.tags
            .iter()
            .fold(0, |mask, tag| mask | bits::range_mask(tag.position, tag.width))
    }

    fn report_unhandled_write(&self, offset: u64, value: u32, unhandled: u32) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        let tag_hits: Vec<(String, u32)> = self
            .tags
            .iter()
            .filter_map(|tag| {
                let contribution = bits::extract(unhandled, tag.position, tag.width);
                (contribution != 0).then(|| (tag.name.clone(), contribution))
            })
            .collect();
        sink.warning(&diag::unhandled_write_message(
            offset, value, unhandled, &tag_hits,
        ));
    }
}
