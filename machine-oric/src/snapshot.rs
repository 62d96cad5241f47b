//! Save state (snapshot) support.
//!
//! A snapshot captures the complete core state: CPU, memory (with its
//! overlay flags), VIA, PSG (including the pending register-change
//! log), floppy controller (including its current operation) and drive
//! glue. Restoring puts the machine back atomically; a save/load round
//! trip is bit-identical.

use crate::fdc::{Fdc, Operation};
use crate::oric::Oric;
use crate::psg::{AudioState, Channel, Envelope, Noise, NUM_REGS, PsgState, RegisterChange};
use crate::via::Via;

/// Magic bytes for snapshot identification.
const SNAPSHOT_MAGIC: &[u8; 4] = b"ORXS";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u8 = 1;

/// Complete machine state snapshot.
#[derive(Clone)]
pub struct Snapshot {
    cpu: CpuState,
    irq_via: bool,
    irq_drive: bool,
    ram: Box<[u8; 65536]>,
    basic_rom_enabled: bool,
    disk_rom_enabled: bool,
    via: Via,
    psg: PsgState,
    fdc: Fdc,
    drive: DriveState,
}

/// CPU register state.
#[derive(Clone)]
struct CpuState {
    a: u8,
    x: u8,
    y: u8,
    sp: u8,
    pc: u16,
    status: u8,
    irq_line: bool,
}

/// Drive glue state (the disk media itself is not part of a snapshot).
#[derive(Clone)]
struct DriveState {
    control: u8,
    interrupt_request: u8,
    data_request: u8,
    selected: u8,
}

impl Snapshot {
    /// Capture the current machine state.
    pub(crate) fn capture(oric: &Oric) -> Self {
        let cpu = oric.cpu();
        let board = &oric.board;

        let mut ram = Box::new([0u8; 65536]);
        ram.copy_from_slice(board.memory.ram.as_ref());

        Self {
            cpu: CpuState {
                a: cpu.a(),
                x: cpu.x(),
                y: cpu.y(),
                sp: cpu.sp(),
                pc: cpu.pc(),
                status: cpu.status(),
                irq_line: cpu.irq_line(),
            },
            irq_via: board.irq_via,
            irq_drive: board.irq_drive,
            ram,
            basic_rom_enabled: board.memory.basic_rom_enabled,
            disk_rom_enabled: board.memory.disk_rom_enabled,
            via: board.via.clone(),
            psg: board.psg.snapshot_state(),
            fdc: board.drive.fdc.clone(),
            drive: DriveState {
                control: board.drive.control,
                interrupt_request: board.drive.interrupt_request,
                data_request: board.drive.data_request,
                selected: board.drive.selected,
            },
        }
    }

    /// Restore this snapshot into a machine.
    pub(crate) fn restore(&self, oric: &mut Oric) {
        let cpu = oric.cpu_mut();
        cpu.set_a(self.cpu.a);
        cpu.set_x(self.cpu.x);
        cpu.set_y(self.cpu.y);
        cpu.set_sp(self.cpu.sp);
        cpu.set_pc(self.cpu.pc);
        cpu.set_status(self.cpu.status);
        cpu.set_irq_line(self.cpu.irq_line);

        let board = &mut oric.board;
        board.irq_via = self.irq_via;
        board.irq_drive = self.irq_drive;

        board.memory.ram.copy_from_slice(self.ram.as_ref());
        board.memory.basic_rom_enabled = self.basic_rom_enabled;
        board.memory.disk_rom_enabled = self.disk_rom_enabled;

        board.via = self.via.clone();
        board.psg.restore_state(&self.psg);

        board.drive.fdc = self.fdc.clone();
        board.drive.control = self.drive.control;
        board.drive.interrupt_request = self.drive.interrupt_request;
        board.drive.data_request = self.drive.data_request;
        board.drive.selected = self.drive.selected;
    }

    /// Serialize to a stable byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(66 * 1024);

        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.push(SNAPSHOT_VERSION);

        // CPU
        out.push(self.cpu.a);
        out.push(self.cpu.x);
        out.push(self.cpu.y);
        out.push(self.cpu.sp);
        out.extend_from_slice(&self.cpu.pc.to_le_bytes());
        out.push(self.cpu.status);
        out.push(self.cpu.irq_line as u8);
        out.push(self.irq_via as u8);
        out.push(self.irq_drive as u8);

        // Memory
        out.extend_from_slice(self.ram.as_ref());
        out.push(self.basic_rom_enabled as u8);
        out.push(self.disk_rom_enabled as u8);

        // VIA
        let via = &self.via;
        out.push(via.ca1 as u8);
        out.push(via.ca2 as u8);
        out.push(via.ca2_do_pulse as u8);
        out.push(via.cb1 as u8);
        out.push(via.cb2 as u8);
        out.push(via.cb2_do_pulse as u8);
        out.push(via.ira);
        out.push(via.ira_latch);
        out.push(via.ora);
        out.push(via.ddra);
        out.push(via.irb);
        out.push(via.irb_latch);
        out.push(via.orb);
        out.push(via.ddrb);
        out.push(via.t1_latch_low);
        out.push(via.t1_latch_high);
        out.extend_from_slice(&via.t1_counter.to_le_bytes());
        out.push(via.t1_run as u8);
        out.push(via.t1_reload);
        out.push(via.t2_latch_low);
        out.push(via.t2_latch_high);
        out.extend_from_slice(&via.t2_counter.to_le_bytes());
        out.push(via.t2_run as u8);
        out.push(via.t2_reload as u8);
        out.push(via.sr);
        out.push(via.sr_counter);
        out.extend_from_slice(&via.sr_timer.to_le_bytes());
        out.push(via.sr_run as u8);
        out.push(via.sr_out_started as u8);
        out.push(via.sr_out_gap_pending as u8);
        out.push(via.sr_first as u8);
        out.push(via.acr);
        out.push(via.pcr);
        out.push(via.ifr);
        out.push(via.ier);

        // PSG bus side
        let psg = &self.psg;
        out.push(psg.bdir as u8);
        out.push(psg.bc1 as u8);
        out.push(psg.bc2 as u8);
        out.push(psg.current_register);
        out.extend_from_slice(&psg.registers);
        out.extend_from_slice(&psg.log_cycle.to_le_bytes());
        out.extend_from_slice(&psg.pending_cycles.to_le_bytes());

        // PSG audio side
        let audio = &psg.audio;
        out.extend_from_slice(&audio.audio_registers);
        for channel in &audio.channels {
            out.extend_from_slice(&channel.volume.to_le_bytes());
            out.extend_from_slice(&channel.tone_period.to_le_bytes());
            out.extend_from_slice(&channel.counter.to_le_bytes());
            out.extend_from_slice(&channel.value.to_le_bytes());
            out.extend_from_slice(&channel.output_bit.to_le_bytes());
            out.push(channel.disabled);
            out.push(channel.noise_disabled);
            out.push(channel.use_envelope as u8);
        }
        out.extend_from_slice(&audio.noise.output_bit.to_le_bytes());
        out.extend_from_slice(&audio.noise.period.to_le_bytes());
        out.extend_from_slice(&audio.noise.counter.to_le_bytes());
        out.extend_from_slice(&audio.noise.rng.to_le_bytes());
        out.push(audio.envelope.shape);
        out.push(audio.envelope.shape_counter);
        out.extend_from_slice(&audio.envelope.period.to_le_bytes());
        out.extend_from_slice(&audio.envelope.counter.to_le_bytes());
        out.extend_from_slice(&audio.audio_out.to_le_bytes());
        out.extend_from_slice(&audio.cycles_per_sample.to_le_bytes());
        out.extend_from_slice(&audio.cycle_count.to_le_bytes());
        out.extend_from_slice(&audio.last_cycle.to_le_bytes());
        out.extend_from_slice(&audio.new_log_cycle.to_le_bytes());
        out.push(audio.update_log_cycle as u8);
        out.push(audio.warp as u8);

        out.extend_from_slice(&(audio.changes.len() as u32).to_le_bytes());
        for change in &audio.changes {
            out.extend_from_slice(&change.cycle.to_le_bytes());
            out.push(change.register);
            out.push(change.value);
        }

        // FDC
        let fdc = &self.fdc;
        out.push(fdc.data);
        out.push(fdc.side);
        out.push(fdc.track);
        out.push(fdc.sector);
        out.push(fdc.command);
        out.push(fdc.status);
        let (op_tag, op_multiple) = match fdc.operation {
            Operation::Idle => (0u8, false),
            Operation::ReadSector { multiple } => (1, multiple),
            Operation::WriteSector { multiple } => (2, multiple),
            Operation::ReadAddress => (3, false),
            Operation::ReadTrack => (4, false),
            Operation::WriteTrack => (5, false),
        };
        out.push(op_tag);
        out.push(op_multiple as u8);
        out.extend_from_slice(&(fdc.offset as u32).to_le_bytes());
        out.push(fdc.id_offset);
        out.push(fdc.step_direction as u8);
        out.extend_from_slice(&fdc.interrupt_counter.to_le_bytes());
        out.push(fdc.pending_status.is_some() as u8);
        out.push(fdc.pending_status.unwrap_or(0));
        out.extend_from_slice(&fdc.data_request_counter.to_le_bytes());

        // Drive glue
        out.push(self.drive.control);
        out.push(self.drive.interrupt_request);
        out.push(self.drive.data_request);
        out.push(self.drive.selected);

        out
    }

    /// Deserialize from bytes written by `to_bytes`.
    pub fn from_bytes(data: &[u8]) -> Result<Self, &'static str> {
        let mut r = Reader { data, pos: 0 };

        let magic = r.bytes(4)?;
        if magic != SNAPSHOT_MAGIC {
            return Err("invalid snapshot magic");
        }
        if r.u8()? != SNAPSHOT_VERSION {
            return Err("unsupported snapshot version");
        }

        let cpu = CpuState {
            a: r.u8()?,
            x: r.u8()?,
            y: r.u8()?,
            sp: r.u8()?,
            pc: r.u16()?,
            status: r.u8()?,
            irq_line: r.bool()?,
        };
        let irq_via = r.bool()?;
        let irq_drive = r.bool()?;

        let mut ram = Box::new([0u8; 65536]);
        ram.copy_from_slice(r.bytes(65536)?);
        let basic_rom_enabled = r.bool()?;
        let disk_rom_enabled = r.bool()?;

        let via = Via {
            ca1: r.bool()?,
            ca2: r.bool()?,
            ca2_do_pulse: r.bool()?,
            cb1: r.bool()?,
            cb2: r.bool()?,
            cb2_do_pulse: r.bool()?,
            ira: r.u8()?,
            ira_latch: r.u8()?,
            ora: r.u8()?,
            ddra: r.u8()?,
            irb: r.u8()?,
            irb_latch: r.u8()?,
            orb: r.u8()?,
            ddrb: r.u8()?,
            t1_latch_low: r.u8()?,
            t1_latch_high: r.u8()?,
            t1_counter: r.u16()?,
            t1_run: r.bool()?,
            t1_reload: r.u8()?,
            t2_latch_low: r.u8()?,
            t2_latch_high: r.u8()?,
            t2_counter: r.u16()?,
            t2_run: r.bool()?,
            t2_reload: r.bool()?,
            sr: r.u8()?,
            sr_counter: r.u8()?,
            sr_timer: r.u16()?,
            sr_run: r.bool()?,
            sr_out_started: r.bool()?,
            sr_out_gap_pending: r.bool()?,
            sr_first: r.bool()?,
            acr: r.u8()?,
            pcr: r.u8()?,
            ifr: r.u8()?,
            ier: r.u8()?,
        };

        let bdir = r.bool()?;
        let bc1 = r.bool()?;
        let bc2 = r.bool()?;
        let current_register = r.u8()?;
        let mut registers = [0u8; NUM_REGS];
        registers.copy_from_slice(r.bytes(NUM_REGS)?);
        let log_cycle = r.u32()?;
        let pending_cycles = r.u32()?;

        let mut audio_registers = [0u8; NUM_REGS];
        audio_registers.copy_from_slice(r.bytes(NUM_REGS)?);

        let mut channels = Vec::with_capacity(3);
        for _ in 0..3 {
            channels.push(Channel {
                volume: r.u16()?,
                tone_period: r.u32()?,
                counter: r.u32()?,
                value: r.u16()?,
                output_bit: r.u16()?,
                disabled: r.u8()?,
                noise_disabled: r.u8()?,
                use_envelope: r.bool()?,
            });
        }
        let channels: [Channel; 3] = channels.try_into().map_err(|_| "bad channel count")?;

        let noise = Noise {
            output_bit: r.u16()?,
            period: r.u16()?,
            counter: r.u16()?,
            rng: r.u32()?,
        };
        let envelope = Envelope {
            shape: r.u8()?,
            shape_counter: r.u8()?,
            period: r.u32()?,
            counter: r.u32()?,
        };
        let audio_out = r.u16()? as i16;
        let cycles_per_sample = r.u32()?;
        let cycle_count = r.u32()?;
        let last_cycle = r.u32()?;
        let new_log_cycle = r.u32()?;
        let update_log_cycle = r.bool()?;
        let warp = r.bool()?;

        let change_count = r.u32()? as usize;
        if change_count > 32768 {
            return Err("snapshot register log too large");
        }
        let mut changes = std::collections::VecDeque::with_capacity(change_count);
        for _ in 0..change_count {
            changes.push_back(RegisterChange {
                cycle: r.u32()?,
                register: r.u8()?,
                value: r.u8()?,
            });
        }

        let audio = AudioState {
            audio_registers,
            changes,
            new_log_cycle,
            update_log_cycle,
            channels,
            noise,
            envelope,
            audio_out,
            cycles_per_sample,
            cycle_count,
            last_cycle,
            warp,
        };

        let psg = PsgState {
            bdir,
            bc1,
            bc2,
            current_register,
            registers,
            log_cycle,
            pending_cycles,
            audio,
        };

        let data_reg = r.u8()?;
        let side = r.u8()?;
        let track = r.u8()?;
        let sector = r.u8()?;
        let command = r.u8()?;
        let status = r.u8()?;
        let op_tag = r.u8()?;
        let op_multiple = r.bool()?;
        let operation = match op_tag {
            0 => Operation::Idle,
            1 => Operation::ReadSector {
                multiple: op_multiple,
            },
            2 => Operation::WriteSector {
                multiple: op_multiple,
            },
            3 => Operation::ReadAddress,
            4 => Operation::ReadTrack,
            5 => Operation::WriteTrack,
            _ => return Err("unknown FDC operation tag"),
        };
        let offset = r.u32()? as usize;
        let id_offset = r.u8()?;
        let step_direction = r.u8()? as i8;
        let interrupt_counter = r.u32()? as i32;
        let has_pending = r.bool()?;
        let pending_value = r.u8()?;
        let data_request_counter = r.u32()? as i32;

        let fdc = Fdc {
            data: data_reg,
            side,
            track,
            sector,
            command,
            status,
            operation,
            offset,
            id_offset,
            step_direction,
            interrupt_counter,
            pending_status: if has_pending { Some(pending_value) } else { None },
            data_request_counter,
        };

        let drive = DriveState {
            control: r.u8()?,
            interrupt_request: r.u8()?,
            data_request: r.u8()?,
            selected: r.u8()?,
        };

        Ok(Self {
            cpu,
            irq_via,
            irq_drive,
            ram,
            basic_rom_enabled,
            disk_rom_enabled,
            via,
            psg,
            fdc,
            drive,
        })
    }

    /// One-line CPU state dump for logs.
    pub fn dump_cpu(&self) -> String {
        format!(
            "A={:02X} X={:02X} Y={:02X} SP={:02X} PC={:04X} P={:02X}",
            self.cpu.a, self.cpu.x, self.cpu.y, self.cpu.sp, self.cpu.pc, self.cpu.status,
        )
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8], &'static str> {
        if self.pos + n > self.data.len() {
            return Err("snapshot truncated");
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, &'static str> {
        Ok(self.bytes(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, &'static str> {
        Ok(self.u8()? != 0)
    }

    fn u16(&mut self) -> Result<u16, &'static str> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, &'static str> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
