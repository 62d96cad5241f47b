//! WD1793 floppy disk controller.
//!
//! Commands decode from the top bits of the command byte into one of
//! four types: positioning (restore/seek/step), sector transfer
//! (read/write), whole-track and address operations, and force
//! interrupt. Each transfer command parks the chip in a *current
//! operation*; the data register then behaves according to that
//! operation until the transfer wraps, at which point an end-of-job
//! interrupt is scheduled carrying the final status, committed when the
//! countdown fires.
//!
//! A command issued while another is in progress simply replaces it,
//! as the hardware does.

use crate::disk::DiskImage;

// Status register bits. Bits 2 and 5 are dual-purpose on the real chip:
// track-0 / lost-data and head-loaded / record-type depending on the
// command class.
pub const STATUS_BUSY: u8 = 0x01;
pub const STATUS_DATA_REQUEST: u8 = 0x02;
pub const STATUS_TRACK0: u8 = 0x04;
pub const STATUS_RECORD_NOT_FOUND: u8 = 0x10;
pub const STATUS_HEAD_LOADED: u8 = 0x20;
pub const STATUS_RECORD_TYPE: u8 = 0x20;
pub const STATUS_WRITE_PROTECT: u8 = 0x40;

/// Cycles from end-of-transfer to the completion interrupt.
const END_OF_JOB_DELAY: i32 = 32;

/// Cycles from a positioning command to its completion interrupt.
const SEEK_DELAY: i32 = 100;

/// Cycles before the first data request of a read.
const READ_DRQ_DELAY: i32 = 60;

/// Cycles before the first data request of a write.
const WRITE_DRQ_DELAY: i32 = 500;

/// Cycles between data requests while a transfer runs.
const BYTE_DRQ_DELAY: i32 = 32;

/// What the data register is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Idle,
    ReadSector { multiple: bool },
    WriteSector { multiple: bool },
    ReadAddress,
    ReadTrack,
    WriteTrack,
}

/// Line changes for the drive glue to route.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FdcEvents {
    pub irq_set: bool,
    pub irq_clear: bool,
    pub drq_set: bool,
    pub drq_clear: bool,
}

impl FdcEvents {
    fn merge(&mut self, other: FdcEvents) {
        self.irq_set |= other.irq_set;
        self.irq_clear |= other.irq_clear;
        self.drq_set |= other.drq_set;
        self.drq_clear |= other.drq_clear;
    }
}

/// WD1793 state.
#[derive(Clone)]
pub(crate) struct Fdc {
    pub(crate) data: u8,
    pub(crate) side: u8,
    pub(crate) track: u8,
    pub(crate) sector: u8,
    pub(crate) command: u8,
    pub(crate) status: u8,

    pub(crate) operation: Operation,
    /// Byte offset into the current sector or track
    pub(crate) offset: usize,
    /// Position in the six ID bytes of a read-address
    pub(crate) id_offset: u8,
    /// Last step direction, +1 towards the hub
    pub(crate) step_direction: i8,

    /// Countdown to the completion interrupt; 0 = none pending
    pub(crate) interrupt_counter: i32,
    /// Status value committed when the interrupt fires
    pub(crate) pending_status: Option<u8>,
    /// Countdown to the next data request; 0 = none pending
    pub(crate) data_request_counter: i32,
}

impl Fdc {
    pub fn new() -> Self {
        Self {
            data: 0,
            side: 0,
            track: 0,
            sector: 0,
            command: 0,
            status: 0,
            operation: Operation::Idle,
            offset: 0,
            id_offset: 0,
            step_direction: 1,
            interrupt_counter: 0,
            pending_status: None,
            data_request_counter: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn set_side(&mut self, side: u8) {
        self.side = side;
    }

    /// Advance the IRQ/DRQ countdown timers.
    pub fn tick(&mut self, cycles: u32) -> FdcEvents {
        let mut events = FdcEvents::default();

        if self.interrupt_counter > 0 {
            self.interrupt_counter -= cycles as i32;
            if self.interrupt_counter <= 0 {
                self.interrupt_counter = 0;
                if let Some(status) = self.pending_status.take() {
                    self.status = status;
                }
                events.irq_set = true;
            }
        }

        if self.data_request_counter > 0 {
            self.data_request_counter -= cycles as i32;
            if self.data_request_counter <= 0 {
                self.data_request_counter = 0;
                self.status |= STATUS_DATA_REQUEST;
                events.drq_set = true;
            }
        }

        events
    }

    /// Read a register. Offset 0 status, 1 track, 2 sector, 3 data.
    pub fn read(&mut self, offset: u16, disk: Option<&DiskImage>) -> (u8, FdcEvents) {
        let mut events = FdcEvents::default();

        let value = match offset {
            0x0 => {
                events.irq_clear = true;
                self.status
            }
            0x1 => self.track,
            0x2 => self.sector,
            0x3 => {
                let (value, ev) = self.read_data(disk);
                events.merge(ev);
                value
            }
            _ => 0,
        };

        (value, events)
    }

    /// Write a register.
    pub fn write(&mut self, offset: u16, value: u8, disk: Option<&mut DiskImage>) -> FdcEvents {
        match offset {
            0x0 => {
                let mut events = FdcEvents {
                    irq_clear: true,
                    ..FdcEvents::default()
                };
                events.merge(self.do_command(value));
                events
            }
            0x1 => {
                self.track = value;
                FdcEvents::default()
            }
            0x2 => {
                self.sector = value;
                FdcEvents::default()
            }
            0x3 => {
                self.data = value;
                self.write_data(disk)
            }
            _ => FdcEvents::default(),
        }
    }

    fn do_command(&mut self, command: u8) -> FdcEvents {
        self.command = command;
        let mut events = FdcEvents::default();

        match command & 0xE0 {
            0x00 => {
                if command & 0x10 != 0 {
                    // Seek [type I]: 0 0 0 1 h V r1 r0
                    log::debug!("fdc: seek to {}", self.data);
                    self.track = self.data;
                    self.begin_positioning(command);
                } else {
                    // Restore [type I]: 0 0 0 0 h V r1 r0
                    log::debug!("fdc: restore");
                    self.track = 0;
                    self.begin_positioning(command);
                }
            }
            0x20 => {
                // Step [type I]: 0 0 1 u h V r1 r0
                log::debug!("fdc: step {}", self.step_direction);
                self.track = self.track.wrapping_add_signed(self.step_direction);
                self.begin_positioning(command);
            }
            0x40 => {
                // Step in [type I]: 0 1 0 u h V r1 r0
                log::debug!("fdc: step in");
                self.step_direction = 1;
                self.track = self.track.wrapping_add(1);
                self.begin_positioning(command);
            }
            0x60 => {
                // Step out [type I]: 0 1 1 u h V r1 r0
                log::debug!("fdc: step out");
                self.step_direction = -1;
                self.track = self.track.saturating_sub(1);
                self.begin_positioning(command);
            }
            0x80 => {
                // Read sector [type II]: 1 0 0 m F2 E F1 0
                log::debug!("fdc: read sector {} (track {})", self.sector, self.track);
                self.operation = Operation::ReadSector {
                    multiple: command & 0x10 != 0,
                };
                self.offset = 0;
                self.status = STATUS_BUSY;
                self.data_request_counter = READ_DRQ_DELAY;
            }
            0xA0 => {
                // Write sector [type II]: 1 0 1 m F2 E F1 a0
                log::debug!("fdc: write sector {} (track {})", self.sector, self.track);
                self.operation = Operation::WriteSector {
                    multiple: command & 0x10 != 0,
                };
                self.offset = 0;
                self.status = STATUS_BUSY;
                self.data_request_counter = WRITE_DRQ_DELAY;
            }
            0xC0 => {
                if command & 0x10 != 0 {
                    // Force interrupt [type IV]: 1 1 0 1 i3 i2 i1 i0
                    log::debug!("fdc: force interrupt");
                    self.operation = Operation::Idle;
                    self.status = 0;
                    self.interrupt_counter = 0;
                    self.pending_status = None;
                    self.data_request_counter = 0;
                    events.drq_clear = true;
                    events.irq_set = true;
                } else {
                    // Read address [type III]: 1 1 0 0 0 E 0 0
                    log::debug!("fdc: read address");
                    self.operation = Operation::ReadAddress;
                    self.id_offset = 0;
                    self.status = STATUS_BUSY;
                    self.data_request_counter = READ_DRQ_DELAY;
                }
            }
            0xE0 => {
                if command & 0x10 != 0 {
                    // Write track [type III]: 1 1 1 1 0 E 0 0
                    log::debug!("fdc: write track");
                    self.operation = Operation::WriteTrack;
                    self.offset = 0;
                    self.status = STATUS_BUSY;
                    self.data_request_counter = WRITE_DRQ_DELAY;
                } else {
                    // Read track [type III]: 1 1 1 0 0 E 0 0
                    log::debug!("fdc: read track");
                    self.operation = Operation::ReadTrack;
                    self.offset = 0;
                    self.status = STATUS_BUSY;
                    self.data_request_counter = READ_DRQ_DELAY;
                }
            }
            _ => unreachable!(),
        }

        events
    }

    /// Common completion path for the positioning commands.
    fn begin_positioning(&mut self, command: u8) {
        self.operation = Operation::Idle;
        self.status = STATUS_BUSY;

        let mut done = 0;
        if command & 0x08 != 0 {
            self.status |= STATUS_HEAD_LOADED;
            done |= STATUS_HEAD_LOADED;
        }
        if self.track == 0 {
            done |= STATUS_TRACK0;
        }

        self.pending_status = Some(done);
        self.interrupt_counter = SEEK_DELAY;
    }

    /// Schedule the end-of-transfer interrupt with its final status.
    fn finish_transfer(&mut self, extra_status: u8) {
        self.operation = Operation::Idle;
        self.pending_status = Some((self.status & !(STATUS_BUSY | STATUS_DATA_REQUEST)) | extra_status);
        self.interrupt_counter = END_OF_JOB_DELAY;
    }

    /// Abandon the transfer: no sector under the head.
    fn record_not_found(&mut self) -> u8 {
        log::debug!("fdc: record not found");
        self.operation = Operation::Idle;
        self.status = (self.status & !STATUS_BUSY) | STATUS_RECORD_NOT_FOUND;
        self.data
    }

    fn read_data(&mut self, disk: Option<&DiskImage>) -> (u8, FdcEvents) {
        let mut events = FdcEvents::default();

        match self.operation {
            Operation::Idle => (self.data, events),

            Operation::ReadSector { multiple } => {
                let sector = disk
                    .and_then(|d| d.track(self.side, self.track))
                    .and_then(|t| t.sector(self.sector));

                let Some(sector) = sector else {
                    return (self.record_not_found(), events);
                };

                let value = sector.data.get(self.offset).copied().unwrap_or(0);
                self.offset += 1;

                self.status &= !STATUS_DATA_REQUEST;
                events.drq_clear = true;

                if self.offset >= sector.data.len() {
                    let deleted = sector.is_deleted();
                    if multiple {
                        // Advance to the next sector and keep streaming
                        self.sector = self.sector.wrapping_add(1);
                        self.offset = 0;
                        let more = disk
                            .and_then(|d| d.track(self.side, self.track))
                            .and_then(|t| t.sector(self.sector))
                            .is_some();
                        if more {
                            self.data_request_counter = BYTE_DRQ_DELAY;
                        } else {
                            self.finish_transfer(if deleted { STATUS_RECORD_TYPE } else { 0 });
                        }
                    } else {
                        self.finish_transfer(if deleted { STATUS_RECORD_TYPE } else { 0 });
                    }
                } else {
                    self.data_request_counter = BYTE_DRQ_DELAY;
                }

                (value, events)
            }

            Operation::ReadAddress => {
                let sector = disk
                    .and_then(|d| d.track(self.side, self.track))
                    .and_then(|t| t.sectors.first());

                let Some(sector) = sector else {
                    return (self.record_not_found(), events);
                };

                let size_code = (sector.data.len() / 128).trailing_zeros() as u8;
                let id = [
                    self.track,
                    self.side,
                    sector.number,
                    size_code,
                    0, // CRC bytes are not retained in the image
                    0,
                ];

                let value = id[self.id_offset as usize];
                self.id_offset += 1;

                self.status &= !STATUS_DATA_REQUEST;
                events.drq_clear = true;

                if self.id_offset as usize >= id.len() {
                    // The ID track number lands in the sector register
                    self.sector = self.track;
                    self.finish_transfer(0);
                } else {
                    self.data_request_counter = BYTE_DRQ_DELAY;
                }

                (value, events)
            }

            Operation::ReadTrack => {
                let track = disk.and_then(|d| d.track(self.side, self.track));

                let Some(track) = track else {
                    return (self.record_not_found(), events);
                };

                let value = track.raw.get(self.offset).copied().unwrap_or(0);
                self.offset += 1;

                self.status &= !STATUS_DATA_REQUEST;
                events.drq_clear = true;

                if self.offset >= track.raw.len() {
                    self.finish_transfer(0);
                } else {
                    self.data_request_counter = BYTE_DRQ_DELAY;
                }

                (value, events)
            }

            // Write operations ignore data reads
            Operation::WriteSector { .. } | Operation::WriteTrack => (self.data, events),
        }
    }

    fn write_data(&mut self, disk: Option<&mut DiskImage>) -> FdcEvents {
        let mut events = FdcEvents::default();

        match self.operation {
            Operation::WriteSector { multiple } => {
                let sector = disk
                    .and_then(|d| d.track_mut(self.side, self.track))
                    .and_then(|t| t.sector_mut(self.sector));

                let Some(sector) = sector else {
                    self.record_not_found();
                    return events;
                };

                if let Some(slot) = sector.data.get_mut(self.offset) {
                    *slot = self.data;
                }
                self.offset += 1;

                self.status &= !STATUS_DATA_REQUEST;
                events.drq_clear = true;

                if self.offset >= sector.data.len() {
                    if multiple {
                        self.sector = self.sector.wrapping_add(1);
                        self.offset = 0;
                        self.data_request_counter = BYTE_DRQ_DELAY;
                    } else {
                        self.finish_transfer(0);
                    }
                } else {
                    self.data_request_counter = BYTE_DRQ_DELAY;
                }

                events
            }

            Operation::WriteTrack => {
                let track = disk.and_then(|d| d.track_mut(self.side, self.track));

                let Some(track) = track else {
                    self.record_not_found();
                    return events;
                };

                if let Some(slot) = track.raw.get_mut(self.offset) {
                    *slot = self.data;
                }
                self.offset += 1;

                self.status &= !STATUS_DATA_REQUEST;
                events.drq_clear = true;

                if self.offset >= track.raw.len() {
                    self.finish_transfer(0);
                } else {
                    self.data_request_counter = BYTE_DRQ_DELAY;
                }

                events
            }

            // Reads and positioning just latch the data register
            _ => events,
        }
    }
}

impl Default for Fdc {
    fn default() -> Self {
        Self::new()
    }
}
