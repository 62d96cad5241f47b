//! The machine itself: one cycle counter binding the chip ensemble.
//!
//! Every CPU bus access first advances the peripherals by one cycle in
//! a fixed order: tape pulser, VIA, PSG register-log clock, then the
//! drive's controller timers. The CPU therefore always observes chip
//! state of the current cycle. Every 64 cycles the ULA paints one
//! raster line; 312 lines make a frame.

use cpu_6502::Mos6502;
use emu_core::{AudioConfig, Bus, Cpu, KeyCode, Machine, VideoConfig};

use crate::config::{
    CYCLES_PER_RASTER, FRAMES_PER_SECOND, MachineConfig, RASTERS_PER_FRAME, SAMPLE_RATE,
};
use crate::disk::DiskImage;
use crate::drive::{Drive, DriveEffects};
use crate::input;
use crate::memory::Memory;
use crate::psg::{self, Psg, PsgAudio};
use crate::snapshot::Snapshot;
use crate::tape::Tape;
use crate::ula::{TEXTURE_HEIGHT, TEXTURE_WIDTH, Ula};
use crate::via::{Via, ViaObserver};

/// Everything on the bus side of the CPU.
pub(crate) struct Board {
    pub(crate) memory: Memory,
    pub(crate) via: Via,
    pub(crate) psg: Psg,
    pub(crate) tape: Tape,
    pub(crate) drive: Drive,
    /// Keyboard matrix, one bit per column; set = key down
    pub(crate) key_rows: [u8; 8],
    /// VIA's contribution to the CPU IRQ line
    pub(crate) irq_via: bool,
    /// Drive controller's contribution to the CPU IRQ line
    pub(crate) irq_drive: bool,
    /// Running cycle count
    pub(crate) cycles: u32,
}

/// VIA side effects forwarded to their peers: CA2 is the PSG BC1 line,
/// CB2 the PSG BDIR line, ORB bit 6 the tape motor, and ORA the PSG
/// data bus.
struct ViaGlue<'a> {
    psg: &'a mut Psg,
    tape: &'a mut Tape,
    irq: &'a mut bool,
}

impl ViaObserver for ViaGlue<'_> {
    fn on_ca2_changed(&mut self, level: bool) {
        self.psg.set_bc1(level);
    }

    fn on_cb2_changed(&mut self, level: bool) {
        self.psg.set_bdir(level);
    }

    fn on_orb_changed(&mut self, orb: u8) {
        self.tape.set_motor(orb & 0x40 != 0);
    }

    fn on_psg_strobe(&mut self, port_a: u8) {
        self.psg.update_bus(port_a);
    }

    fn on_irq_raise(&mut self) {
        *self.irq = true;
    }

    fn on_irq_clear(&mut self) {
        *self.irq = false;
    }
}

impl Board {
    fn new() -> Self {
        Self {
            memory: Memory::new(),
            via: Via::new(),
            psg: Psg::new(),
            tape: Tape::new(),
            drive: Drive::new(),
            key_rows: [0; 8],
            irq_via: false,
            irq_drive: false,
            cycles: 0,
        }
    }

    /// Advance the chip ensemble one cycle: tape, VIA, PSG log clock,
    /// drive timers, in that order.
    fn tick_chips(&mut self) {
        let Board {
            via,
            psg,
            tape,
            drive,
            memory,
            irq_via,
            irq_drive,
            cycles,
            ..
        } = self;

        if let Some(level) = tape.tick() {
            let mut glue = ViaGlue {
                psg: &mut *psg,
                tape: &mut *tape,
                irq: &mut *irq_via,
            };
            via.write_cb1(level, &mut glue);
        }

        {
            let mut glue = ViaGlue {
                psg: &mut *psg,
                tape: &mut *tape,
                irq: &mut *irq_via,
            };
            via.tick(&mut glue);
        }

        psg.tick(1);

        let effects = drive.tick(1);
        apply_drive_effects(effects, memory, irq_drive);

        *cycles = cycles.wrapping_add(1);
    }

    fn io_read(&mut self, address: u16) -> u8 {
        let offset = address & 0x00FF;

        if (0x10..=0x1F).contains(&offset) {
            let Board {
                drive,
                memory,
                irq_drive,
                ..
            } = self;
            let (value, effects) = drive.read_byte(offset - 0x10);
            apply_drive_effects(effects, memory, irq_drive);
            value
        } else {
            let Board {
                via,
                psg,
                tape,
                irq_via,
                ..
            } = self;
            let mut glue = ViaGlue {
                psg,
                tape,
                irq: irq_via,
            };
            via.read(offset & 0x0F, &mut glue)
        }
    }

    fn io_write(&mut self, address: u16, value: u8) {
        let offset = address & 0x00FF;

        if (0x10..=0x1F).contains(&offset) {
            let Board {
                drive,
                memory,
                irq_drive,
                ..
            } = self;
            let effects = drive.write_byte(offset - 0x10, value);
            apply_drive_effects(effects, memory, irq_drive);
        } else {
            let Board {
                via,
                psg,
                tape,
                irq_via,
                ..
            } = self;
            let mut glue = ViaGlue {
                psg,
                tape,
                irq: irq_via,
            };
            via.write(offset & 0x0F, value, &mut glue);
        }
    }

    /// Recompute the keyboard sense line (PB3): the selected row's keys
    /// against the PSG port A column mask, gated on port A being driven.
    fn update_key_output(&mut self) {
        let row = (self.via.orb() & 0x07) as usize;

        let sense = self.psg.register(psg::ENABLE) & 0x40 != 0
            && self.key_rows[row] & (self.psg.register(psg::IO_PORT_A) ^ 0xFF) != 0;

        let Board {
            via,
            psg,
            tape,
            irq_via,
            ..
        } = self;
        let mut glue = ViaGlue {
            psg,
            tape,
            irq: irq_via,
        };
        via.set_irb_bit(3, sense, &mut glue);
    }

    fn irq_line(&self) -> bool {
        self.irq_via || self.irq_drive
    }
}

fn apply_drive_effects(effects: DriveEffects, memory: &mut Memory, irq_drive: &mut bool) {
    if let Some(enabled) = effects.basic_rom_enabled {
        memory.set_basic_rom_enabled(enabled);
    }
    if let Some(enabled) = effects.disk_rom_enabled {
        memory.set_disk_rom_enabled(enabled);
    }
    if effects.irq_assert {
        *irq_drive = true;
    }
    if effects.irq_release {
        *irq_drive = false;
    }
}

impl Bus for Board {
    fn read(&mut self, address: u16) -> u8 {
        self.tick(1);
        if address & 0xFF00 == 0x0300 {
            self.io_read(address)
        } else {
            self.memory.read(address)
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        self.tick(1);
        if address & 0xFF00 == 0x0300 {
            self.io_write(address, value);
        } else {
            self.memory.write(address, value);
        }
    }

    fn tick(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.tick_chips();
        }
    }
}

/// The whole machine.
pub struct Oric {
    config: MachineConfig,
    cpu: Mos6502,
    pub(crate) board: Board,
    ula: Ula,
    /// Cycles left in the current raster slot; may run negative when an
    /// instruction overshoots
    cycle_budget: i32,
    warp: bool,
    frame_presented: bool,
    break_requested: bool,
}

impl Oric {
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Self {
            config,
            cpu: Mos6502::new(),
            board: Board::new(),
            ula: Ula::new(),
            cycle_budget: 0,
            warp: false,
            frame_presented: false,
            break_requested: false,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Load the BASIC ROM image.
    pub fn load_basic(&mut self, data: &[u8]) {
        self.board.memory.load_basic(data);
    }

    /// Load the disk controller ROM image.
    pub fn load_disk_rom(&mut self, data: &[u8]) {
        self.board.memory.load_disk_rom(data);
    }

    /// Load a TAP image into the tape transport.
    pub fn insert_tape(&mut self, data: Vec<u8>) {
        self.board.tape.load(data);
    }

    /// Parse and insert a disk image into a drive slot.
    pub fn insert_disk(&mut self, slot: u8, data: &[u8]) -> Result<(), &'static str> {
        let image = DiskImage::parse(data)?;
        self.board.drive.insert_disk(slot, image);
        Ok(())
    }

    /// Toggle warp mode: no frame pacing, no audio, present every 25th
    /// frame only.
    pub fn set_warp(&mut self, warp: bool) {
        self.warp = warp;
        self.board.psg.set_warp(warp);
        log::info!("warp mode: {}", if warp { "on" } else { "off" });
    }

    pub fn warp(&self) -> bool {
        self.warp
    }

    /// Handle for the audio collaborator's pull callback.
    pub fn audio_handle(&self) -> PsgAudio {
        self.board.psg.audio_handle()
    }

    /// Whether the frame finished by the last `run_frame` should be
    /// presented (false for skipped warp frames).
    pub fn frame_presented(&self) -> bool {
        self.frame_presented
    }

    /// Arm the BRK break hook (monitor attached).
    pub fn set_break_hook(&mut self, enabled: bool) {
        self.cpu.set_break_hook(enabled);
    }

    /// A break was requested since the last check.
    pub fn take_break(&mut self) -> bool {
        std::mem::take(&mut self.break_requested)
    }

    /// Capture the complete machine state.
    pub fn save_state(&self) -> Snapshot {
        Snapshot::capture(self)
    }

    /// Restore machine state from a snapshot, atomically.
    pub fn load_state(&mut self, snapshot: &Snapshot) {
        snapshot.restore(self);
    }

    pub(crate) fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    pub(crate) fn cpu_mut(&mut self) -> &mut Mos6502 {
        &mut self.cpu
    }

    /// Read memory for inspection (no side effects, no overlays).
    pub fn peek(&self, addr: u16) -> u8 {
        self.board.memory.ram[addr as usize]
    }

    fn run_frame_internal(&mut self) {
        self.frame_presented = false;

        for _ in 0..RASTERS_PER_FRAME {
            self.cycle_budget += CYCLES_PER_RASTER as i32;

            while self.cycle_budget > 0 {
                let before = self.board.cycles;
                self.cpu.step(&mut self.board);
                let spent = self.board.cycles.wrapping_sub(before).max(1);
                self.cycle_budget -= spent as i32;

                self.board.update_key_output();

                if self.board.irq_line() {
                    self.cpu.irq_assert();
                } else {
                    self.cpu.irq_release();
                }

                if self.cpu.take_break() {
                    self.break_requested = true;
                    return;
                }
            }

            if self.ula.paint_raster(&self.board.memory.ram, self.warp) {
                self.frame_presented = true;
            }
        }
    }
}

impl Default for Oric {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for Oric {
    fn video_config(&self) -> VideoConfig {
        VideoConfig {
            width: TEXTURE_WIDTH as u32,
            height: TEXTURE_HEIGHT as u32,
            fps: FRAMES_PER_SECOND,
        }
    }

    fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            sample_rate: SAMPLE_RATE,
            samples_per_frame: self.config.samples_per_frame(),
        }
    }

    fn run_frame(&mut self) {
        self.run_frame_internal();
    }

    fn render(&mut self, buffer: &mut [u8]) {
        self.ula.render_into(buffer);
    }

    fn generate_audio(&mut self, buffer: &mut [f32]) {
        self.board.psg.audio_handle().fill_mono_f32(buffer);
    }

    fn key_down(&mut self, key: KeyCode) {
        if let Some((row, col)) = input::map_key(key) {
            self.board.key_rows[row as usize] |= 1 << col;
        }
    }

    fn key_up(&mut self, key: KeyCode) {
        if let Some((row, col)) = input::map_key(key) {
            self.board.key_rows[row as usize] &= !(1 << col);
        }
    }

    fn reset(&mut self) {
        self.board.memory.reset();
        self.board.via.reset();
        self.board.psg.reset();
        self.board.tape.rewind();
        self.board.drive.reset();
        self.board.key_rows = [0; 8];
        self.board.irq_via = false;
        self.board.irq_drive = false;
        self.ula.reset();
        self.cycle_budget = 0;
        self.break_requested = false;
        self.cpu.reset(&mut self.board);
    }

    fn load_file(&mut self, path: &str, data: &[u8]) -> Result<(), String> {
        let lower = path.to_lowercase();

        if lower.ends_with(".tap") {
            self.insert_tape(data.to_vec());
            Ok(())
        } else if lower.ends_with(".dsk") {
            self.insert_disk(0, data).map_err(|e| e.to_string())
        } else if lower.ends_with("microdis.rom") {
            self.load_disk_rom(data);
            Ok(())
        } else if lower.ends_with(".rom") {
            self.load_basic(data);
            Ok(())
        } else {
            Err(format!("Unknown file type: {}", path))
        }
    }
}
