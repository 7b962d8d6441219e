//! Typed field views over a register's bit ranges.
//!
//! A field is declared once during peripheral setup and never reshaped
//! afterwards. Its value lives inside the owning register's underlying bit
//! pattern; the handles returned by the definition surface share that
//! storage and give the peripheral raw access to it, bypassing access-mode
//! checks and callbacks.

use std::cell::Cell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::bits;
use crate::register::{resolve_spec, RangeSpec, Register};
use crate::{DefinitionError, FieldMode, RegisterWidth, ValueOverflow};

/// Shared storage for a register's raw bit pattern.
pub(crate) type Backing = Rc<Cell<u32>>;

/// Callback over a `(before, after)` pair in the native representation.
pub(crate) type RawCallback = Box<dyn FnMut(u32, u32)>;

/// Callback that replaces a field's apparent value at the start of a read.
pub(crate) type RawProvider = Box<dyn FnMut(u32) -> u32>;

/// Closed enumeration stored in a register field.
///
/// Implementations carry an explicit table between members and their bit
/// patterns. The table must be injective; it is validated against the
/// declared field width when the field is defined. `from_bits` returns
/// `None` for patterns outside the table, which a register can legitimately
/// hold when its raw bits were written past the enumeration.
pub trait FieldEnum: Copy + 'static {
    /// Every legal member as a `(bit pattern, member name)` pair.
    const MEMBERS: &'static [(u32, &'static str)];

    /// Encodes this member into its bit pattern.
    fn to_bits(self) -> u32;

    /// Decodes a bit pattern into a member, when one is mapped to it.
    fn from_bits(bits: u32) -> Option<Self>;
}

/// One declared field inside a register: its shape, its access mode and its
/// registered callbacks. Values pass through here already converted to the
/// engine's native representation.
pub(crate) struct FieldEntry {
    pub(crate) position: u8,
    pub(crate) width: u8,
    pub(crate) mode: FieldMode,
    pub(crate) name: Option<String>,
    pub(crate) enum_members: Option<&'static [(u32, &'static str)]>,
    read_callbacks: Vec<RawCallback>,
    write_callbacks: Vec<RawCallback>,
    change_callbacks: Vec<RawCallback>,
    value_provider: Option<RawProvider>,
}

impl FieldEntry {
    pub(crate) fn notify_read(&mut self, old: u32, new: u32) {
        let old = bits::extract(old, self.position, self.width);
        let new = bits::extract(new, self.position, self.width);
        for callback in &mut self.read_callbacks {
            callback(old, new);
        }
    }

    pub(crate) fn notify_write(&mut self, old: u32, new: u32) {
        let old = bits::extract(old, self.position, self.width);
        let new = bits::extract(new, self.position, self.width);
        for callback in &mut self.write_callbacks {
            callback(old, new);
        }
    }

    pub(crate) fn notify_change(&mut self, old: u32, new: u32) {
        let old = bits::extract(old, self.position, self.width);
        let new = bits::extract(new, self.position, self.width);
        for callback in &mut self.change_callbacks {
            callback(old, new);
        }
    }

    /// Runs the value provider against `current` and returns the full
    /// register value with the provider's replacement merged in. Without a
    /// provider, `current` comes back untouched.
    pub(crate) fn apply_value_provider(&mut self, current: u32) -> u32 {
        let (position, width) = (self.position, self.width);
        self.value_provider.as_mut().map_or(current, |provider| {
            let replacement = provider(bits::extract(current, position, width));
            bits::merge_shifted(current, replacement, position, width)
        })
    }
}

/// Builds the label used by definition errors for a field.
pub(crate) fn field_label(name: Option<&str>, range: Option<(u8, u8)>) -> String {
    name.map_or_else(
        || match range {
            Some((position, width)) => format!("field at bit {position}, {width} bits wide"),
            None => String::from("field"),
        },
        |name| format!("field `{name}`"),
    )
}

/// Handle to a plain numeric field.
///
/// Reads and writes through the handle go straight to the underlying bit
/// pattern: no access-mode check runs and no callback fires. This is the
/// accessor peripherals use from inside their own logic, as opposed to the
/// bus-facing `read`/`write` on the register.
#[derive(Clone)]
pub struct ValueField {
    backing: Backing,
    position: u8,
    width: u8,
}

impl ValueField {
    pub(crate) const fn new(backing: Backing, position: u8, width: u8) -> Self {
        Self {
            backing,
            position,
            width,
        }
    }

    /// Current value of the field, filtered out of the register.
    #[must_use]
    pub fn value(&self) -> u32 {
        bits::extract(self.backing.get(), self.position, self.width)
    }

    /// Overwrites the field's bits directly.
    ///
    /// # Errors
    ///
    /// Returns [`ValueOverflow`] when `value` needs more bits than the
    /// field width; the register is left unmodified.
    pub fn set_value(&self, value: u32) -> Result<(), ValueOverflow> {
        if value & !bits::range_mask(0, self.width) != 0 {
            return Err(ValueOverflow {
                value,
                width: self.width,
            });
        }
        self.backing.set(bits::merge_shifted(
            self.backing.get(),
            value,
            self.position,
            self.width,
        ));
        Ok(())
    }

    /// Position of the field's least significant bit.
    #[must_use]
    pub const fn position(&self) -> u8 {
        self.position
    }

    /// Width of the field in bits.
    #[must_use]
    pub const fn width(&self) -> u8 {
        self.width
    }
}

/// Handle to a single-bit boolean flag field.
#[derive(Clone)]
pub struct FlagField {
    backing: Backing,
    position: u8,
}

impl FlagField {
    pub(crate) const fn new(backing: Backing, position: u8) -> Self {
        Self { backing, position }
    }

    /// Current state of the flag.
    #[must_use]
    pub fn value(&self) -> bool {
        bits::any_bit_set(self.backing.get(), self.position, 1)
    }

    /// Sets or clears the flag directly, bypassing callbacks and access
    /// modes.
    pub fn set_value(&self, value: bool) {
        self.backing.set(bits::merge_shifted(
            self.backing.get(),
            u32::from(value),
            self.position,
            1,
        ));
    }

    /// Position of the flag bit.
    #[must_use]
    pub const fn position(&self) -> u8 {
        self.position
    }
}

/// Handle to an enumerated field.
#[derive(Clone)]
pub struct EnumField<E: FieldEnum> {
    backing: Backing,
    position: u8,
    width: u8,
    member: PhantomData<E>,
}

impl<E: FieldEnum> EnumField<E> {
    pub(crate) const fn new(backing: Backing, position: u8, width: u8) -> Self {
        Self {
            backing,
            position,
            width,
            member: PhantomData,
        }
    }

    /// Current member, when the stored pattern maps to one.
    #[must_use]
    pub fn value(&self) -> Option<E> {
        E::from_bits(self.raw())
    }

    /// Raw stored pattern of the field's range, mapped or not.
    #[must_use]
    pub fn raw(&self) -> u32 {
        bits::extract(self.backing.get(), self.position, self.width)
    }

    /// Overwrites the field's bits with the member's pattern directly,
    /// bypassing callbacks and access modes. Member patterns were checked
    /// against the field width at definition time, so this cannot overflow.
    pub fn set_value(&self, value: E) {
        self.backing.set(bits::merge_shifted(
            self.backing.get(),
            value.to_bits(),
            self.position,
            self.width,
        ));
    }
}

/// Staged definition of a numeric value field.
///
/// Finish with [`define`](Self::define); nothing is inserted into the
/// register until then.
#[must_use]
pub struct ValueFieldBuilder<'a, W: RegisterWidth> {
    register: &'a mut Register<W>,
    range: RangeSpec,
    mode: FieldMode,
    name: Option<String>,
    read_callbacks: Vec<RawCallback>,
    write_callbacks: Vec<RawCallback>,
    change_callbacks: Vec<RawCallback>,
    value_provider: Option<RawProvider>,
}

impl<'a, W: RegisterWidth> ValueFieldBuilder<'a, W> {
    pub(crate) fn new(register: &'a mut Register<W>, range: RangeSpec) -> Self {
        Self {
            register,
            range,
            mode: FieldMode::READ.union(FieldMode::WRITE),
            name: None,
            read_callbacks: Vec::new(),
            write_callbacks: Vec::new(),
            change_callbacks: Vec::new(),
            value_provider: None,
        }
    }

    /// Replaces the default `READ | WRITE` access mode.
    pub fn mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attaches a descriptive name, used by error messages and the
    /// introspection dump.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Appends a callback invoked on every register read with the field's
    /// `(before, after)` values. Fires for unreadable fields too.
    pub fn on_read(mut self, callback: impl FnMut(u32, u32) + 'static) -> Self {
        self.read_callbacks.push(Box::new(callback));
        self
    }

    /// Appends a callback invoked on every register write with the field's
    /// value before the write and the written bits for its range. Fires
    /// even when the field has no write semantic.
    pub fn on_write(mut self, callback: impl FnMut(u32, u32) + 'static) -> Self {
        self.write_callbacks.push(Box::new(callback));
        self
    }

    /// Appends a callback invoked when a read or write changes the field's
    /// bits, with the `(before, after)` values.
    pub fn on_change(mut self, callback: impl FnMut(u32, u32) + 'static) -> Self {
        self.change_callbacks.push(Box::new(callback));
        self
    }

    /// Installs the provider consulted at the start of every read. Its
    /// return value replaces the field's apparent value before any masking
    /// or clearing happens.
    pub fn value_provider(mut self, provider: impl FnMut(u32) -> u32 + 'static) -> Self {
        self.value_provider = Some(Box::new(provider));
        self
    }

    /// Validates the definition and inserts the field.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] for a malformed textual range, a zero
    /// or out-of-bounds width, an overlap with an existing field or tag, or
    /// an access mode selecting more than one write semantic. The register
    /// is unchanged on error.
    pub fn define(self) -> Result<ValueField, DefinitionError> {
        let (position, width) = resolve_spec(&self.range, self.name.as_deref())?;
        let label = field_label(self.name.as_deref(), Some((position, width)));
        self.register
            .validate_field(position, width, self.mode, &label)?;
        let backing = self.register.attach_field(FieldEntry {
            position,
            width,
            mode: self.mode,
            name: self.name,
            enum_members: None,
            read_callbacks: self.read_callbacks,
            write_callbacks: self.write_callbacks,
            change_callbacks: self.change_callbacks,
            value_provider: self.value_provider,
        });
        Ok(ValueField::new(backing, position, width))
    }
}

/// Staged definition of a single-bit boolean flag field.
#[must_use]
pub struct FlagFieldBuilder<'a, W: RegisterWidth> {
    register: &'a mut Register<W>,
    range: RangeSpec,
    mode: FieldMode,
    name: Option<String>,
    read_callbacks: Vec<RawCallback>,
    write_callbacks: Vec<RawCallback>,
    change_callbacks: Vec<RawCallback>,
    value_provider: Option<RawProvider>,
}

impl<'a, W: RegisterWidth> FlagFieldBuilder<'a, W> {
    pub(crate) fn new(register: &'a mut Register<W>, range: RangeSpec) -> Self {
        Self {
            register,
            range,
            mode: FieldMode::READ.union(FieldMode::WRITE),
            name: None,
            read_callbacks: Vec::new(),
            write_callbacks: Vec::new(),
            change_callbacks: Vec::new(),
            value_provider: None,
        }
    }

    /// Replaces the default `READ | WRITE` access mode.
    pub fn mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attaches a descriptive name, used by error messages and the
    /// introspection dump.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Appends a callback invoked on every register read with the flag's
    /// `(before, after)` states. Fires for unreadable fields too.
    pub fn on_read(mut self, mut callback: impl FnMut(bool, bool) + 'static) -> Self {
        self.read_callbacks
            .push(Box::new(move |old, new| callback(old != 0, new != 0)));
        self
    }

    /// Appends a callback invoked on every register write with the flag's
    /// state before the write and the written bit.
    pub fn on_write(mut self, mut callback: impl FnMut(bool, bool) + 'static) -> Self {
        self.write_callbacks
            .push(Box::new(move |old, new| callback(old != 0, new != 0)));
        self
    }

    /// Appends a callback invoked when a read or write changes the flag.
    pub fn on_change(mut self, mut callback: impl FnMut(bool, bool) + 'static) -> Self {
        self.change_callbacks
            .push(Box::new(move |old, new| callback(old != 0, new != 0)));
        self
    }

    /// Installs the provider consulted at the start of every read.
    pub fn value_provider(mut self, mut provider: impl FnMut(bool) -> bool + 'static) -> Self {
        self.value_provider = Some(Box::new(move |current| {
            u32::from(provider(current != 0))
        }));
        self
    }

    /// Validates the definition and inserts the flag.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] for a malformed textual range, a
    /// textual range spanning more than one bit, an out-of-bounds position,
    /// an overlap, or an invalid access mode. The register is unchanged on
    /// error.
    pub fn define(self) -> Result<FlagField, DefinitionError> {
        let range_text = match &self.range {
            RangeSpec::Text(text) => Some(text.clone()),
            RangeSpec::Explicit { .. } => None,
        };
        let (position, width) = resolve_spec(&self.range, self.name.as_deref())?;
        if width != 1 {
            return Err(DefinitionError::MalformedRange {
                field: field_label(self.name.as_deref(), Some((position, width))),
                range: range_text.unwrap_or_default(),
            });
        }
        let label = field_label(self.name.as_deref(), Some((position, 1)));
        self.register.validate_field(position, 1, self.mode, &label)?;
        let backing = self.register.attach_field(FieldEntry {
            position,
            width: 1,
            mode: self.mode,
            name: self.name,
            enum_members: None,
            read_callbacks: self.read_callbacks,
            write_callbacks: self.write_callbacks,
            change_callbacks: self.change_callbacks,
            value_provider: self.value_provider,
        });
        Ok(FlagField::new(backing, position))
    }
}

/// Staged definition of an enumerated field.
#[must_use]
pub struct EnumFieldBuilder<'a, W: RegisterWidth, E: FieldEnum> {
    register: &'a mut Register<W>,
    range: RangeSpec,
    mode: FieldMode,
    name: Option<String>,
    read_callbacks: Vec<RawCallback>,
    write_callbacks: Vec<RawCallback>,
    change_callbacks: Vec<RawCallback>,
    value_provider: Option<RawProvider>,
    member: PhantomData<E>,
}

impl<'a, W: RegisterWidth, E: FieldEnum> EnumFieldBuilder<'a, W, E> {
    pub(crate) fn new(register: &'a mut Register<W>, range: RangeSpec) -> Self {
        Self {
            register,
            range,
            mode: FieldMode::READ.union(FieldMode::WRITE),
            name: None,
            read_callbacks: Vec::new(),
            write_callbacks: Vec::new(),
            change_callbacks: Vec::new(),
            value_provider: None,
            member: PhantomData,
        }
    }

    /// Replaces the default `READ | WRITE` access mode.
    pub fn mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attaches a descriptive name, used by error messages and the
    /// introspection dump.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Appends a callback invoked on every register read with the field's
    /// `(before, after)` members. A side carries `None` when the raw
    /// pattern maps to no member.
    pub fn on_read(mut self, mut callback: impl FnMut(Option<E>, Option<E>) + 'static) -> Self {
        self.read_callbacks.push(Box::new(move |old, new| {
            callback(E::from_bits(old), E::from_bits(new));
        }));
        self
    }

    /// Appends a callback invoked on every register write with the member
    /// before the write and the member the written bits select.
    pub fn on_write(mut self, mut callback: impl FnMut(Option<E>, Option<E>) + 'static) -> Self {
        self.write_callbacks.push(Box::new(move |old, new| {
            callback(E::from_bits(old), E::from_bits(new));
        }));
        self
    }

    /// Appends a callback invoked when a read or write changes the field.
    pub fn on_change(mut self, mut callback: impl FnMut(Option<E>, Option<E>) + 'static) -> Self {
        self.change_callbacks.push(Box::new(move |old, new| {
            callback(E::from_bits(old), E::from_bits(new));
        }));
        self
    }

    /// Installs the provider consulted at the start of every read. It sees
    /// the currently stored member (or `None` for an unmapped pattern) and
    /// must answer with the member to present.
    pub fn value_provider(mut self, mut provider: impl FnMut(Option<E>) -> E + 'static) -> Self {
        self.value_provider = Some(Box::new(move |current| {
            provider(E::from_bits(current)).to_bits()
        }));
        self
    }

    /// Validates the definition, including the enumeration's member table,
    /// and inserts the field.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] for a malformed textual range, invalid
    /// dimensions, an overlap, an invalid access mode, a member pattern
    /// wider than the field, or two members sharing a pattern. The register
    /// is unchanged on error.
    pub fn define(self) -> Result<EnumField<E>, DefinitionError> {
        let (position, width) = resolve_spec(&self.range, self.name.as_deref())?;
        let label = field_label(self.name.as_deref(), Some((position, width)));
        self.register
            .validate_field(position, width, self.mode, &label)?;
        let mask = bits::range_mask(0, width);
        for (index, &(pattern, member)) in E::MEMBERS.iter().enumerate() {
            if pattern & !mask != 0 {
                return Err(DefinitionError::EnumPatternTooWide {
                    field: label,
                    member: member.to_owned(),
                    pattern,
                    width,
                });
            }
            if E::MEMBERS[..index].iter().any(|&(other, _)| other == pattern) {
                return Err(DefinitionError::DuplicateEnumPattern {
                    field: label,
                    pattern,
                });
            }
        }
        let backing = self.register.attach_field(FieldEntry {
            position,
            width,
            mode: self.mode,
            name: self.name,
            enum_members: Some(E::MEMBERS),
            read_callbacks: self.read_callbacks,
            write_callbacks: self.write_callbacks,
            change_callbacks: self.change_callbacks,
            value_provider: self.value_provider,
        });
        Ok(EnumField::new(backing, position, width))
    }
}
