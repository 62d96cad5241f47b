//! Microdisc-style drive interface.
//!
//! The drive board sits between the bus and the WD1793. Offsets 0-3 go
//! straight to the controller; offset 4 is the control register and
//! doubles as the IRQ status byte on read; offset 8 reads the DRQ
//! status byte and clears the data request on write.
//!
//! Control register bits:
//!
//! ```text
//! bit 0    controller interrupts enabled
//! bit 1    BASIC ROM overlay enabled
//! bit 2    data separator clock divisor
//! bit 3    density
//! bit 4    side select
//! bits 5-6 drive number
//! bit 7    disk ROM disable (active low enable)
//! ```

use crate::disk::DiskImage;
use crate::fdc::{Fdc, FdcEvents};

// Control register bits
const CTRL_IRQ_ENABLE: u8 = 0x01;
const CTRL_BASIC_ROM: u8 = 0x02;
const CTRL_SIDE: u8 = 0x10;
const CTRL_DRIVE: u8 = 0x60;
const CTRL_ROM_DISABLE: u8 = 0x80;

/// Side effects of a drive access for the scheduler to apply.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DriveEffects {
    pub basic_rom_enabled: Option<bool>,
    pub disk_rom_enabled: Option<bool>,
    pub irq_assert: bool,
    pub irq_release: bool,
}

/// The drive board: controller, control register and disk inventory.
pub(crate) struct Drive {
    pub(crate) fdc: Fdc,
    /// Last value written to the control register
    pub(crate) control: u8,
    /// IRQ status byte: 0x80 = interrupt not pending
    pub(crate) interrupt_request: u8,
    /// DRQ status byte: 0x80 = no data request
    pub(crate) data_request: u8,
    /// Up to four disk images, selected by the control register
    disks: [Option<DiskImage>; 4],
    pub(crate) selected: u8,
}

impl Drive {
    pub fn new() -> Self {
        Self {
            fdc: Fdc::new(),
            control: 0,
            interrupt_request: 0x80,
            data_request: 0x80,
            disks: [None, None, None, None],
            selected: 0,
        }
    }

    pub fn reset(&mut self) {
        self.fdc.reset();
        self.control = 0;
        self.interrupt_request = 0x80;
        self.data_request = 0x80;
        self.selected = 0;
    }

    /// Put a disk image in a drive slot.
    pub fn insert_disk(&mut self, slot: u8, image: DiskImage) {
        log::info!("drive {}: disk inserted", slot & 3);
        self.disks[(slot & 3) as usize] = Some(image);
    }

    pub fn has_disk(&self) -> bool {
        self.disks.iter().any(|d| d.is_some())
    }

    /// Advance the controller timers one batch of cycles.
    pub fn tick(&mut self, cycles: u32) -> DriveEffects {
        let events = self.fdc.tick(cycles);
        self.route(events)
    }

    pub fn read_byte(&mut self, offset: u16) -> (u8, DriveEffects) {
        if offset == 0x4 {
            return (self.interrupt_request | 0x7F, DriveEffects::default());
        }

        if offset == 0x8 {
            return (self.data_request | 0x7F, DriveEffects::default());
        }

        let disk = self.disks[self.selected as usize].as_ref();
        let (value, events) = self.fdc.read(offset, disk);
        (value, self.route(events))
    }

    pub fn write_byte(&mut self, offset: u16, value: u8) -> DriveEffects {
        if offset == 0x4 {
            self.control = value;

            self.fdc.set_side((value & CTRL_SIDE) >> 4);
            self.selected = (value & CTRL_DRIVE) >> 5;

            let mut effects = DriveEffects {
                basic_rom_enabled: Some(value & CTRL_BASIC_ROM != 0),
                disk_rom_enabled: Some(value & CTRL_ROM_DISABLE == 0),
                ..DriveEffects::default()
            };

            // Enabling interrupts with one already pending surfaces it
            if value & CTRL_IRQ_ENABLE != 0 && self.interrupt_request == 0x00 {
                effects.irq_assert = true;
            }
            return effects;
        }

        if offset == 0x8 {
            self.data_request = 0x80;
            return DriveEffects::default();
        }

        let disk = self.disks[self.selected as usize].as_mut();
        let events = self.fdc.write(offset, value, disk);
        self.route(events)
    }

    /// Map controller line changes onto the status bytes and CPU IRQ.
    fn route(&mut self, events: FdcEvents) -> DriveEffects {
        let mut effects = DriveEffects::default();

        if events.drq_set {
            self.data_request = 0x00;
        }
        if events.drq_clear {
            self.data_request = 0x80;
        }

        if events.irq_set {
            self.interrupt_request = 0x00;
            if self.control & CTRL_IRQ_ENABLE != 0 {
                effects.irq_assert = true;
            }
        }
        if events.irq_clear {
            self.interrupt_request = 0x80;
            effects.irq_release = true;
        }

        effects
    }
}

impl Default for Drive {
    fn default() -> Self {
        Self::new()
    }
}
