//! Peripheral-style scenarios: a boot remap controller and its consumers
//! built on top of the register engine, with routing state shared through
//! an explicit handle instead of a global.

#![allow(
    clippy::pedantic,
    clippy::nursery,
    clippy::similar_names,
    clippy::too_many_lines
)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use register_core::{DiagnosticSink, DoubleWordRegister, FieldEnum, FieldMode, LogSink};

use bitflags as _;
use log as _;
use proptest as _;
use rstest as _;
use thiserror as _;

const SRAM_LOW_BANK: u64 = 0x2000_0000;
const SRAM_HIGH_BANK: u64 = 0x2000_8000;
const FLASH_BASE: u64 = 0x6000_0000;
const BANK_SPAN: u64 = 0x8000;

const SRAM_CTRL_OFFSET: u64 = 0x0;
const FLASH_CTRL_OFFSET: u64 = 0x8;
const DEVICE_VERSION_OFFSET: u64 = 0x14C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemapMode {
    Disabled,
    Enabled,
}

impl FieldEnum for RemapMode {
    const MEMBERS: &'static [(u32, &'static str)] = &[(0, "Disabled"), (1, "Enabled")];

    fn to_bits(self) -> u32 {
        match self {
            Self::Disabled => 0,
            Self::Enabled => 1,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Disabled),
            1 => Some(Self::Enabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BankOrder {
    Straight,
    Swapped,
}

impl FieldEnum for BankOrder {
    const MEMBERS: &'static [(u32, &'static str)] = &[(0, "Straight"), (1, "Swapped")];

    fn to_bits(self) -> u32 {
        match self {
            Self::Straight => 0,
            Self::Swapped => 1,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Straight),
            1 => Some(Self::Swapped),
            _ => None,
        }
    }
}

/// Boot window routing state shared between the controller and every
/// translator that consults it. `None` marks a configuration the hardware
/// leaves unspecified (no target enabled, or more than one).
type BootWindow = Rc<Cell<Option<(u64, u64)>>>;

struct RemapControl {
    sram_ctrl: DoubleWordRegister,
    flash_ctrl: DoubleWordRegister,
    device_version: DoubleWordRegister,
    window: BootWindow,
}

impl RemapControl {
    fn new(sink: Rc<dyn DiagnosticSink>) -> Self {
        let window: BootWindow = Rc::new(Cell::new(Some((SRAM_LOW_BANK, SRAM_HIGH_BANK))));

        let mut sram_ctrl = DoubleWordRegister::with_sink(0, Rc::clone(&sink));
        sram_ctrl
            .tag_range("reserved", "31:2")
            .expect("tag fits the control register");
        let bank_order = sram_ctrl
            .enum_field_range::<BankOrder>("1")
            .name("bank ordering while remapped")
            .define()
            .expect("bank order field fits");
        let sram_remap = sram_ctrl
            .enum_field_range::<RemapMode>("0")
            .name("route the boot window to SRAM")
            .define()
            .expect("sram remap field fits");

        let mut flash_ctrl = DoubleWordRegister::with_sink(0, Rc::clone(&sink));
        flash_ctrl
            .tag_range("reserved", "31:19")
            .expect("tag fits the control register");
        let flash_offset = flash_ctrl
            .value_field_range("18:1")
            .name("offset inside the flash region")
            .define()
            .expect("offset field fits");
        let flash_remap = flash_ctrl
            .enum_field_range::<RemapMode>("0")
            .name("route the boot window to flash")
            .define()
            .expect("flash remap field fits");

        let recompute = {
            let window = Rc::clone(&window);
            move || {
                let sram = sram_remap.value();
                let flash = flash_remap.value();
                let next = match (sram, flash) {
                    (Some(RemapMode::Enabled), Some(RemapMode::Disabled)) => {
                        match bank_order.value() {
                            Some(BankOrder::Swapped) => Some((SRAM_HIGH_BANK, SRAM_LOW_BANK)),
                            _ => Some((SRAM_LOW_BANK, SRAM_HIGH_BANK)),
                        }
                    }
                    (Some(RemapMode::Disabled), Some(RemapMode::Enabled)) => {
                        let offset = u64::from(flash_offset.value()) << 1;
                        Some((FLASH_BASE + offset, FLASH_BASE + BANK_SPAN + offset))
                    }
                    _ => None,
                };
                window.set(next);
            }
        };
        let recompute_on_sram = recompute.clone();
        let recompute_on_flash = recompute;
        sram_ctrl.add_write_callback(move |_, _| recompute_on_sram());
        flash_ctrl.add_write_callback(move |_, _| recompute_on_flash());

        let mut device_version = DoubleWordRegister::with_sink(0x0002_4801, Rc::clone(&sink));
        device_version
            .tag_range("reserved", "31:20")
            .expect("tag fits the version register");
        device_version
            .value_field_range("19:16")
            .mode(FieldMode::READ)
            .name("silicon revision")
            .define()
            .expect("revision field fits");
        device_version
            .value_field_range("15:0")
            .mode(FieldMode::READ)
            .name("product identifier")
            .define()
            .expect("product field fits");

        Self {
            sram_ctrl,
            flash_ctrl,
            device_version,
            window,
        }
    }

    fn read(&mut self, offset: u64) -> u32 {
        match offset {
            SRAM_CTRL_OFFSET => self.sram_ctrl.read(),
            FLASH_CTRL_OFFSET => self.flash_ctrl.read(),
            DEVICE_VERSION_OFFSET => self.device_version.read(),
            _ => 0,
        }
    }

    fn write(&mut self, offset: u64, value: u32) {
        match offset {
            SRAM_CTRL_OFFSET => self.sram_ctrl.write(offset, value),
            FLASH_CTRL_OFFSET => self.flash_ctrl.write(offset, value),
            DEVICE_VERSION_OFFSET => self.device_version.write(offset, value),
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.sram_ctrl.reset();
        self.flash_ctrl.reset();
        self.device_version.reset();
        self.window.set(Some((SRAM_LOW_BANK, SRAM_HIGH_BANK)));
    }

    fn window_handle(&self) -> BootWindow {
        Rc::clone(&self.window)
    }
}

/// Consumer of the shared routing state, standing in for the alias region
/// that forwards boot-window accesses to their remapped target.
struct BootWindowTranslator {
    window: BootWindow,
}

impl BootWindowTranslator {
    fn translate(&self, address: u64) -> u64 {
        let (low, high) = self
            .window
            .get()
            .unwrap_or((SRAM_LOW_BANK, SRAM_HIGH_BANK));
        if address < BANK_SPAN {
            low + address
        } else {
            high + address
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: RefCell<Vec<String>>,
}

impl DiagnosticSink for RecordingSink {
    fn warning(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_owned());
    }
}

#[test]
fn default_window_routes_into_sram() {
    let sink = Rc::new(RecordingSink::default());
    let control = RemapControl::new(sink);
    let translator = BootWindowTranslator {
        window: control.window_handle(),
    };
    assert_eq!(translator.translate(0x0100), SRAM_LOW_BANK + 0x0100);
    assert_eq!(translator.translate(0x8100), SRAM_HIGH_BANK + 0x8100);
}

#[test]
fn enabling_sram_remap_with_swapped_banks_flips_the_window() {
    let sink = Rc::new(RecordingSink::default());
    let mut control = RemapControl::new(Rc::clone(&sink) as Rc<dyn DiagnosticSink>);
    let translator = BootWindowTranslator {
        window: control.window_handle(),
    };

    control.write(SRAM_CTRL_OFFSET, 0b11);
    assert_eq!(translator.translate(0x0000), SRAM_HIGH_BANK);
    assert_eq!(translator.translate(0x8000), SRAM_LOW_BANK + 0x8000);
    assert!(sink.messages.borrow().is_empty());
}

#[test]
fn enabling_flash_remap_applies_the_configured_offset() {
    let sink = Rc::new(RecordingSink::default());
    let mut control = RemapControl::new(sink);
    let translator = BootWindowTranslator {
        window: control.window_handle(),
    };

    // Offset field covers bits 18:1; an offset of 0x40 lands at bit 1.
    control.write(FLASH_CTRL_OFFSET, (0x40 << 1) | 1);
    assert_eq!(translator.translate(0x0000), FLASH_BASE + 0x80);
    assert_eq!(
        translator.translate(0x8000),
        FLASH_BASE + BANK_SPAN + 0x80 + 0x8000
    );
}

#[test]
fn conflicting_remap_targets_leave_the_window_unspecified() {
    let sink = Rc::new(RecordingSink::default());
    let mut control = RemapControl::new(sink);

    control.write(SRAM_CTRL_OFFSET, 0b01);
    control.write(FLASH_CTRL_OFFSET, 0b01);
    assert_eq!(control.window.get(), None);

    // The translator falls back to the straight SRAM mapping.
    let translator = BootWindowTranslator {
        window: control.window_handle(),
    };
    assert_eq!(translator.translate(0x10), SRAM_LOW_BANK + 0x10);
}

#[test]
fn reset_restores_registers_and_the_shared_window() {
    let sink = Rc::new(RecordingSink::default());
    let mut control = RemapControl::new(sink);

    control.write(SRAM_CTRL_OFFSET, 0b11);
    control.write(FLASH_CTRL_OFFSET, 0x55);
    control.reset();

    assert_eq!(control.read(SRAM_CTRL_OFFSET), 0);
    assert_eq!(control.read(FLASH_CTRL_OFFSET), 0);
    assert_eq!(
        control.window.get(),
        Some((SRAM_LOW_BANK, SRAM_HIGH_BANK))
    );
}

#[test]
fn read_only_version_register_ignores_writes() {
    let sink = Rc::new(RecordingSink::default());
    let mut control = RemapControl::new(Rc::clone(&sink) as Rc<dyn DiagnosticSink>);

    assert_eq!(control.read(DEVICE_VERSION_OFFSET), 0x0002_4801);
    control.write(DEVICE_VERSION_OFFSET, 0x000F_FFFF);
    assert_eq!(control.read(DEVICE_VERSION_OFFSET), 0x0002_4801);
    // All written bits fall inside declared fields or the reserved tag.
    assert!(sink.messages.borrow().is_empty());
}

#[test]
fn reserved_bits_stay_silent_until_a_write_leaves_them() {
    let sink = Rc::new(RecordingSink::default());
    let mut control = RemapControl::new(Rc::clone(&sink) as Rc<dyn DiagnosticSink>);

    // Reserved bits are tagged: no diagnostic.
    control.write(SRAM_CTRL_OFFSET, 0xFFFF_FFFC);
    assert!(sink.messages.borrow().is_empty());
}

#[test]
fn dump_lists_fields_enum_members_and_reserved_ranges() {
    let sink = Rc::new(RecordingSink::default());
    let control = RemapControl::new(sink);

    let dump = control.sram_ctrl.describe();
    assert!(dump.contains("access Read|Write"));
    assert!(dump.contains("route the boot window to SRAM"));
    assert!(dump.contains("(0x0) Disabled"));
    assert!(dump.contains("(0x1) Enabled"));
    assert!(dump.contains("(0x0) Straight"));
    assert!(dump.contains("(0x1) Swapped"));
    assert!(dump.contains("unimplemented/reserved ranges:"));
    assert!(dump.contains("offset 2, width 30, name: reserved"));
}

#[test]
fn peripheral_raised_status_clears_on_read() {
    let mut status = DoubleWordRegister::new(0);
    let ready = status
        .flag_field(0)
        .mode(FieldMode::READ | FieldMode::READ_TO_CLEAR)
        .name("transfer complete")
        .define()
        .expect("flag fits");

    // Device logic latches the event through the raw handle.
    ready.set_value(true);
    assert!(ready.value());

    // The driving software observes it once; the stored bit is gone after.
    assert_eq!(status.read(), 1);
    assert_eq!(status.read(), 0);
    assert!(!ready.value());
}

#[test]
fn log_backed_sink_is_usable_as_an_owner() {
    let sink = Rc::new(LogSink::new("REMAP_CTRL"));
    let mut register = DoubleWordRegister::with_sink(0, sink);
    register
        .value_field(0, 4)
        .define()
        .expect("field fits");
    // The warning goes through the log facade; nothing to observe here
    // beyond the write completing normally.
    register.write(0, 0xF0);
    assert_eq!(register.underlying_value(), 0);
}
