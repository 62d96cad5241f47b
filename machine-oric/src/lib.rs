//! Oric-class home computer emulator.
//!
//! This crate provides the complete machine emulation:
//! - 6502 CPU at 1 MHz (via the cpu-6502 crate)
//! - 64KB RAM with BASIC and disk ROM overlays
//! - VIA 6522 peripheral controller (timers, shift register, control lines)
//! - AY-3-8912 sound generator with deferred register-change log
//! - ULA raster video (240x224 visible, 312 lines at 50 Hz)
//! - WD1793 floppy controller behind a Microdisc-style drive interface
//! - TAP tape transport pulsing the VIA CB1 input
//!
//! # ROMs Required
//!
//! Place in `roms/`:
//! - `basic11b.rom` (16KB) - BASIC 1.1 ROM (or `basic10.rom` for BASIC 1.0)
//! - `microdis.rom` (8KB) - disk controller ROM, only needed for disk use
//!
//! # File Formats
//!
//! - `.tap` - tape images (sync leader + descriptor + program bytes)
//! - `.dsk` - MFM_DISK floppy images

mod config;
mod disk;
mod drive;
mod fdc;
mod input;
mod memory;
mod oric;
mod psg;
mod snapshot;
mod tape;
mod ula;
mod via;

pub use config::{MachineConfig, RomVariant};
pub use disk::DiskImage;
pub use oric::Oric;
pub use psg::PsgAudio;
pub use snapshot::Snapshot;
