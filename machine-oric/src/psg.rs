//! AY-3-8912 programmable sound generator.
//!
//! The chip sits behind the VIA: port A is its data bus, CA2 drives BC1
//! and CB2 drives BDIR (BC2 is tied high). Register writes land twice:
//! in the bus-side register file immediately (the CPU can read port A
//! back through the VIA), and as a `{cycle, register, value}` record in
//! a bounded change log consumed by the audio thread.
//!
//! The audio side runs at 44.1 kHz against the 998.4 kHz chip clock; a
//! fixed-point cycle counter (`cycle << 12`) tracks the fractional
//! cycles per sample. The mixer state lives behind a mutex shared with
//! the audio callback; the emulation thread takes that lock only for
//! the duration of an enqueue.
//!
//! Register map:
//!
//! ```text
//!  0, 1 | channel A tone period (12 bits)
//!  2, 3 | channel B tone period
//!  4, 5 | channel C tone period
//!     6 | noise period (5 bits)
//!     7 | enables: bit 6 = port A in/out,
//!       |          bits 5,4,3 = ~noise C B A, bits 2,1,0 = ~tone C B A
//!  8- A | amplitudes: bit 4 = envelope mode, bits 3-0 = fixed level
//!  B, C | envelope period fine/coarse
//!     D | envelope shape (CONT ATT ALT HOLD)
//!     E | I/O port A (keyboard columns on this machine)
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::config::{CPU_CLOCK, SAMPLE_RATE};

// Register indices
pub const CH_A_PERIOD_LOW: u8 = 0;
pub const CH_A_PERIOD_HIGH: u8 = 1;
pub const CH_B_PERIOD_LOW: u8 = 2;
pub const CH_B_PERIOD_HIGH: u8 = 3;
pub const CH_C_PERIOD_LOW: u8 = 4;
pub const CH_C_PERIOD_HIGH: u8 = 5;
pub const NOISE_PERIOD: u8 = 6;
pub const ENABLE: u8 = 7;
pub const CH_A_AMPLITUDE: u8 = 8;
pub const CH_B_AMPLITUDE: u8 = 9;
pub const CH_C_AMPLITUDE: u8 = 10;
pub const ENV_DURATION_LOW: u8 = 11;
pub const ENV_DURATION_HIGH: u8 = 12;
pub const ENV_SHAPE: u8 = 13;
pub const IO_PORT_A: u8 = 14;
pub const NUM_REGS: usize = 15;

/// Register-change log capacity.
const REGISTER_LOG_CAPACITY: usize = 32768;

/// Above this many queued changes the log is applied en masse (lossy).
const LOG_HIGH_WATERMARK: usize = 200;

/// Fixed-point shift for the audio-side cycle counter.
const CYCLE_SHIFT: u32 = 12;

/// Output levels for the 16 amplitude steps.
const VOLUME_TABLE: [u16; 16] = [
    0,
    513 / 4,
    828 / 4,
    1239 / 4,
    1923 / 4,
    3238 / 4,
    4926 / 4,
    9110 / 4,
    10344 / 4,
    17876 / 4,
    24682 / 4,
    30442 / 4,
    38844 / 4,
    47270 / 4,
    56402 / 4,
    65535 / 4,
];

/// Sentinel marking a goto entry in an envelope shape table; the low
/// bits carry the index to continue from.
const ENV_GOTO: u8 = 0x80;

/// The 16 canonical envelope waveforms, one per shape register value.
/// Each table ends in a goto sentinel. Bits: CONTINUE ATTACK ALTERNATE HOLD.
static ENVELOPE_SHAPES: [&[u8]; 16] = [
    // 0 0 x x
    &[15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, ENV_GOTO | 0xF],
    &[15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, ENV_GOTO | 0xF],
    &[15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, ENV_GOTO | 0xF],
    &[15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, ENV_GOTO | 0xF],
    // 0 1 x x
    &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 0, ENV_GOTO | 0x10],
    &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 0, ENV_GOTO | 0x10],
    &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 0, ENV_GOTO | 0x10],
    &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 0, ENV_GOTO | 0x10],
    // 1 0 0 0
    &[15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, ENV_GOTO],
    // 1 0 0 1
    &[15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, ENV_GOTO | 0xF],
    // 1 0 1 0
    &[
        15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10,
        11, 12, 13, 14, 15, ENV_GOTO,
    ],
    // 1 0 1 1
    &[15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 15, ENV_GOTO | 0x10],
    // 1 1 0 0
    &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, ENV_GOTO],
    // 1 1 0 1
    &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, ENV_GOTO | 0xF],
    // 1 1 1 0
    &[
        0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 15, 14, 13, 12, 11, 10, 9, 8, 7, 6,
        5, 4, 3, 2, 1, 0, ENV_GOTO,
    ],
    // 1 1 1 1
    &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 0, ENV_GOTO | 0x10],
];

/// One tone channel.
#[derive(Clone)]
pub(crate) struct Channel {
    pub(crate) volume: u16,
    pub(crate) tone_period: u32,
    pub(crate) counter: u32,
    pub(crate) value: u16,
    pub(crate) output_bit: u16,
    pub(crate) disabled: u8,
    pub(crate) noise_disabled: u8,
    pub(crate) use_envelope: bool,
}

impl Channel {
    fn new() -> Self {
        Self {
            volume: 0,
            tone_period: 0,
            counter: 0,
            value: 0,
            output_bit: 0,
            disabled: 1,
            noise_disabled: 1,
            use_envelope: false,
        }
    }

    fn exec_cycle(&mut self) {
        if self.tone_period == 0 {
            self.output_bit = 1;
            return;
        }

        self.counter += 1;
        if self.counter >= self.tone_period {
            self.counter = 0;
            self.output_bit ^= 1;
        }
    }
}

/// The noise generator: a 17-bit LFSR with taps at bits 0 and 2.
#[derive(Clone)]
pub(crate) struct Noise {
    pub(crate) output_bit: u16,
    pub(crate) period: u16,
    pub(crate) counter: u16,
    pub(crate) rng: u32,
}

impl Noise {
    fn new() -> Self {
        Self {
            output_bit: 0,
            period: 0,
            counter: 0,
            rng: 1,
        }
    }

    fn exec_cycle(&mut self) {
        self.counter += 1;
        if self.counter >= self.period {
            self.counter = 0;

            let right_bit = (self.rng & 1) ^ ((self.rng >> 2) & 1);
            self.rng = (self.rng >> 1) | (right_bit << 16);
            self.output_bit ^= right_bit as u16;
        }
    }
}

/// The envelope generator walking one of the 16 shape tables.
#[derive(Clone)]
pub(crate) struct Envelope {
    pub(crate) shape: u8,
    pub(crate) shape_counter: u8,
    pub(crate) period: u32,
    pub(crate) counter: u32,
}

impl Envelope {
    fn new() -> Self {
        Self {
            shape: 0,
            shape_counter: 0,
            period: 0,
            counter: 0,
        }
    }

    /// Returns true when the shape position advanced.
    fn exec_cycle(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.period {
            self.counter = 0;

            self.shape_counter += 1;
            let entry = ENVELOPE_SHAPES[self.shape as usize][self.shape_counter as usize];
            if entry & ENV_GOTO != 0 {
                self.shape_counter = entry & 0x7F;
            }
            return true;
        }
        false
    }

    fn set_shape(&mut self, shape: u8) {
        self.shape = shape;
        self.counter = 0;
        self.shape_counter = 0;
    }

    fn level(&self) -> u8 {
        ENVELOPE_SHAPES[self.shape as usize][self.shape_counter as usize]
    }
}

/// A logged register write with its producing cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RegisterChange {
    pub(crate) cycle: u32,
    pub(crate) register: u8,
    pub(crate) value: u8,
}

/// The mixer state shared with the audio thread.
#[derive(Clone)]
pub(crate) struct AudioState {
    /// Registers as the audio side has applied them
    pub(crate) audio_registers: [u8; NUM_REGS],
    /// Queued register changes in append (cycle) order
    pub(crate) changes: VecDeque<RegisterChange>,
    /// Rebased log position for the producer, set after each mix pass
    pub(crate) new_log_cycle: u32,
    pub(crate) update_log_cycle: bool,

    pub(crate) channels: [Channel; 3],
    pub(crate) noise: Noise,
    pub(crate) envelope: Envelope,

    pub(crate) audio_out: i16,
    pub(crate) cycles_per_sample: u32,
    pub(crate) cycle_count: u32,
    pub(crate) last_cycle: u32,

    /// Warp mode: the callback emits silence
    pub(crate) warp: bool,
}

impl AudioState {
    fn new() -> Self {
        Self {
            audio_registers: [0; NUM_REGS],
            changes: VecDeque::with_capacity(REGISTER_LOG_CAPACITY),
            new_log_cycle: 0,
            update_log_cycle: false,
            channels: [Channel::new(), Channel::new(), Channel::new()],
            noise: Noise::new(),
            envelope: Envelope::new(),
            audio_out: 0,
            cycles_per_sample: (CPU_CLOCK << CYCLE_SHIFT) / SAMPLE_RATE,
            cycle_count: 0,
            last_cycle: 0,
            warp: false,
        }
    }

    fn push_change(&mut self, change: RegisterChange) {
        if self.changes.len() == REGISTER_LOG_CAPACITY {
            self.changes.pop_front();
        }
        self.changes.push_back(change);
    }

    /// Apply all queued changes with `change.cycle <= cycle`.
    pub(crate) fn exec_register_changes(&mut self, cycle: u32) {
        while let Some(&change) = self.changes.front() {
            if change.cycle > cycle {
                break;
            }
            self.changes.pop_front();
            self.exec_register_change(change);
        }
    }

    /// Apply one register change to the mixer state.
    pub(crate) fn exec_register_change(&mut self, change: RegisterChange) {
        match change.register {
            CH_A_PERIOD_LOW | CH_A_PERIOD_HIGH => {
                self.audio_registers[change.register as usize] = change.value;
                self.set_tone_period(0, CH_A_PERIOD_LOW, CH_A_PERIOD_HIGH);
            }
            CH_B_PERIOD_LOW | CH_B_PERIOD_HIGH => {
                self.audio_registers[change.register as usize] = change.value;
                self.set_tone_period(1, CH_B_PERIOD_LOW, CH_B_PERIOD_HIGH);
            }
            CH_C_PERIOD_LOW | CH_C_PERIOD_HIGH => {
                self.audio_registers[change.register as usize] = change.value;
                self.set_tone_period(2, CH_C_PERIOD_LOW, CH_C_PERIOD_HIGH);
            }
            NOISE_PERIOD => {
                self.audio_registers[change.register as usize] = change.value;
                self.noise.period = (change.value as u16 & 0x1F) * 8;
            }
            ENABLE => {
                self.audio_registers[change.register as usize] = change.value;
                self.channels[0].disabled = (change.value & 0x01 != 0) as u8;
                self.channels[1].disabled = (change.value & 0x02 != 0) as u8;
                self.channels[2].disabled = (change.value & 0x04 != 0) as u8;
                self.channels[0].noise_disabled = (change.value & 0x08 != 0) as u8;
                self.channels[1].noise_disabled = (change.value & 0x10 != 0) as u8;
                self.channels[2].noise_disabled = (change.value & 0x20 != 0) as u8;
            }
            CH_A_AMPLITUDE | CH_B_AMPLITUDE | CH_C_AMPLITUDE => {
                self.audio_registers[change.register as usize] = change.value;
                let use_envelope = change.value & 0x10 != 0;
                let volume = if use_envelope {
                    VOLUME_TABLE[self.envelope.level() as usize]
                } else {
                    VOLUME_TABLE[(change.value & 0x0F) as usize]
                };
                let channel = &mut self.channels[(change.register - CH_A_AMPLITUDE) as usize];
                channel.use_envelope = use_envelope;
                channel.volume = volume;
            }
            ENV_DURATION_LOW | ENV_DURATION_HIGH => {
                self.audio_registers[change.register as usize] = change.value;
                let period = ((self.audio_registers[ENV_DURATION_HIGH as usize] as u32) << 8)
                    + self.audio_registers[ENV_DURATION_LOW as usize] as u32;
                self.envelope.period = period * 16;
            }
            ENV_SHAPE => {
                // Writing 0xFF is a firmware idiom meaning "leave alone"
                if change.value == 0xFF {
                    return;
                }
                self.audio_registers[change.register as usize] = change.value;
                self.envelope.set_shape(change.value & 0x0F);

                let level = self.envelope.level();
                for channel in &mut self.channels {
                    if channel.use_envelope {
                        channel.volume = VOLUME_TABLE[level as usize];
                    }
                }
            }
            _ => {}
        }
    }

    fn set_tone_period(&mut self, ch: usize, low: u8, high: u8) {
        let period = (((self.audio_registers[high as usize] as u32 & 0x0F) << 8)
            + self.audio_registers[low as usize] as u32)
            * 8;
        self.channels[ch].tone_period = period.max(1);
    }

    /// Run the tone/noise/envelope generators up to `cycle` and produce
    /// one averaged output sample.
    pub(crate) fn exec_audio(&mut self, cycle: u32) {
        if cycle <= self.last_cycle {
            return;
        }

        let cycles = cycle - self.last_cycle;
        let mut out: i32 = 0;

        for _ in 0..cycles {
            self.channels[0].exec_cycle();
            self.channels[1].exec_cycle();
            self.channels[2].exec_cycle();
            self.noise.exec_cycle();

            if self.envelope.exec_cycle() {
                let level = self.envelope.level();
                for channel in &mut self.channels {
                    if channel.use_envelope {
                        channel.volume = VOLUME_TABLE[level as usize];
                    }
                }
            }

            for channel in &mut self.channels {
                let tone_gate = channel.output_bit | channel.disabled as u16;
                let noise_gate = self.noise.output_bit | channel.noise_disabled as u16;
                channel.value = if tone_gate & noise_gate != 0 {
                    channel.volume
                } else {
                    0
                };
                out += channel.value as i32;
            }
        }

        out /= cycles as i32;
        self.audio_out = out.min(32767) as i16;

        self.last_cycle = cycle;
    }

    /// Rebase queued change cycles after a mix pass and flush the log if
    /// it grew past the high watermark (lossy, intentional).
    pub(crate) fn trim_register_changes(&mut self) {
        for change in &mut self.changes {
            change.cycle = change.cycle.saturating_sub(self.last_cycle);
        }

        if self.changes.len() > LOG_HIGH_WATERMARK {
            while let Some(change) = self.changes.pop_front() {
                self.exec_register_change(change);
            }
        }
    }
}

/// AY-3-8912 bus-side state plus the shared mixer.
pub struct Psg {
    bdir: bool,
    bc1: bool,
    bc2: bool,
    current_register: u8,
    registers: [u8; NUM_REGS],
    /// Producer-side log position, rebased after each audio pass
    log_cycle: u32,
    /// Cycles ticked since the last enqueue folded them in
    pending_cycles: u32,
    /// Warp mode suppresses enqueues
    warp: bool,
    audio: Arc<Mutex<AudioState>>,
}

/// Handle given to the audio collaborator; pulls PCM through the mixer
/// lock.
#[derive(Clone)]
pub struct PsgAudio {
    state: Arc<Mutex<AudioState>>,
}

/// Complete PSG state as captured in a snapshot.
#[derive(Clone)]
pub(crate) struct PsgState {
    pub(crate) bdir: bool,
    pub(crate) bc1: bool,
    pub(crate) bc2: bool,
    pub(crate) current_register: u8,
    pub(crate) registers: [u8; NUM_REGS],
    pub(crate) log_cycle: u32,
    pub(crate) pending_cycles: u32,
    pub(crate) audio: AudioState,
}

impl Psg {
    pub fn new() -> Self {
        Self {
            bdir: false,
            bc1: false,
            bc2: true, // tied high on this board
            current_register: 0,
            registers: [0; NUM_REGS],
            log_cycle: 0,
            pending_cycles: 0,
            warp: false,
            audio: Arc::new(Mutex::new(AudioState::new())),
        }
    }

    pub fn reset(&mut self) {
        self.bdir = false;
        self.bc1 = false;
        self.current_register = 0;
        self.registers = [0; NUM_REGS];
        self.log_cycle = 0;
        self.pending_cycles = 0;
        *self.audio.lock().unwrap() = AudioState::new();
    }

    /// Advance the register-log clock.
    pub fn tick(&mut self, cycles: u32) {
        self.pending_cycles += cycles;
    }

    pub fn set_bdir(&mut self, value: bool) {
        self.bdir = value;
    }

    pub fn set_bc1(&mut self, value: bool) {
        self.bc1 = value;
    }

    pub fn set_bc2(&mut self, value: bool) {
        self.bc2 = value;
    }

    /// Current value of a register as last written over the bus.
    pub fn register(&self, reg: u8) -> u8 {
        self.registers[reg as usize]
    }

    pub fn set_warp(&mut self, warp: bool) {
        self.warp = warp;
        self.audio.lock().unwrap().warp = warp;
    }

    /// Get a handle for the audio collaborator.
    pub fn audio_handle(&self) -> PsgAudio {
        PsgAudio {
            state: Arc::clone(&self.audio),
        }
    }

    /// Act on the current BDIR/BC1 strobe state with `data` on the bus
    /// (the VIA's port A output).
    ///
    /// BDIR BC1: 0 0 inactive, 0 1 read, 1 0 write, 1 1 latch address.
    pub fn update_bus(&mut self, data: u8) {
        if self.bdir {
            if self.bc1 {
                // Latch address from the data bus
                if (data as usize) < NUM_REGS {
                    self.current_register = data;
                }
            } else {
                // Write data to the current register
                let reg = self.current_register;
                self.registers[reg as usize] = data;

                match reg {
                    CH_A_PERIOD_LOW..=ENV_SHAPE => {
                        if !self.warp {
                            self.enqueue_change(reg, data);
                        }
                    }
                    _ => {}
                }
            }
        }
        // Read from PSG (BDIR=0, BC1=1) is not wired on this machine.
    }

    /// Append an audio-affecting write to the change log, under the
    /// audio lock.
    fn enqueue_change(&mut self, register: u8, value: u8) {
        let mut audio = self.audio.lock().unwrap();

        if audio.update_log_cycle {
            // The mixer rebased its timeline after the last buffer
            self.log_cycle = audio.new_log_cycle;
            audio.update_log_cycle = false;
        } else {
            self.log_cycle += self.pending_cycles;
        }
        self.pending_cycles = 0;

        audio.push_change(RegisterChange {
            cycle: self.log_cycle,
            register,
            value,
        });
    }

    pub(crate) fn audio_state(&self) -> std::sync::MutexGuard<'_, AudioState> {
        self.audio.lock().unwrap()
    }

    /// Capture bus-side and mixer state for a snapshot.
    pub(crate) fn snapshot_state(&self) -> PsgState {
        PsgState {
            bdir: self.bdir,
            bc1: self.bc1,
            bc2: self.bc2,
            current_register: self.current_register,
            registers: self.registers,
            log_cycle: self.log_cycle,
            pending_cycles: self.pending_cycles,
            audio: self.audio.lock().unwrap().clone(),
        }
    }

    /// Restore state captured by `snapshot_state`.
    pub(crate) fn restore_state(&mut self, state: &PsgState) {
        self.bdir = state.bdir;
        self.bc1 = state.bc1;
        self.bc2 = state.bc2;
        self.current_register = state.current_register;
        self.registers = state.registers;
        self.log_cycle = state.log_cycle;
        self.pending_cycles = state.pending_cycles;
        *self.audio.lock().unwrap() = state.audio.clone();
    }

    /// Dump generator state, mirroring the VIA's debug print.
    pub fn log_status(&self) {
        let audio = self.audio.lock().unwrap();
        for (i, channel) in audio.channels.iter().enumerate() {
            log::debug!(
                "PSG channel {}: period={} volume={} disabled={} noise_disabled={} envelope={}",
                i,
                channel.tone_period,
                channel.volume,
                channel.disabled,
                channel.noise_disabled,
                channel.use_envelope
            );
        }
        log::debug!(
            "PSG noise: period={} rng={:05x}",
            audio.noise.period,
            audio.noise.rng
        );
    }
}

impl Default for Psg {
    fn default() -> Self {
        Self::new()
    }
}

impl PsgAudio {
    /// Fill an interleaved 16-bit stereo buffer at the output rate.
    ///
    /// This is the whole per-buffer mixing pass and holds the audio lock
    /// for its duration.
    pub fn fill(&self, buffer: &mut [i16]) {
        let mut st = self.state.lock().unwrap();

        if st.warp {
            buffer.fill(0);
            return;
        }

        for frame in buffer.chunks_exact_mut(2) {
            let current_cycle = st.cycle_count >> CYCLE_SHIFT;

            st.exec_register_changes(current_cycle);
            st.exec_audio(current_cycle);

            frame[0] = st.audio_out;
            frame[1] = st.audio_out;

            st.cycle_count += st.cycles_per_sample;
        }

        st.trim_register_changes();

        // Keep cycle values in a small range: rebase the stream position
        // and tell the producer where to continue stamping from.
        st.cycle_count -= st.last_cycle << CYCLE_SHIFT;
        st.last_cycle = 0;

        st.new_log_cycle = st.cycle_count >> CYCLE_SHIFT;
        st.update_log_cycle = true;
    }

    /// Fill a mono `f32` buffer (frame-sized path used by `Machine`).
    pub fn fill_mono_f32(&self, buffer: &mut [f32]) {
        let mut st = self.state.lock().unwrap();

        if st.warp {
            buffer.fill(0.0);
            return;
        }

        for sample in buffer.iter_mut() {
            let current_cycle = st.cycle_count >> CYCLE_SHIFT;

            st.exec_register_changes(current_cycle);
            st.exec_audio(current_cycle);

            *sample = st.audio_out as f32 / 32768.0;

            st.cycle_count += st.cycles_per_sample;
        }

        st.trim_register_changes();

        st.cycle_count -= st.last_cycle << CYCLE_SHIFT;
        st.last_cycle = 0;

        st.new_log_cycle = st.cycle_count >> CYCLE_SHIFT;
        st.update_log_cycle = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive a latch-address / write-data pair the way the VIA does it.
    fn write_reg(psg: &mut Psg, reg: u8, value: u8) {
        psg.set_bdir(true);
        psg.set_bc1(true);
        psg.update_bus(reg);
        psg.set_bc1(false);
        psg.update_bus(value);
        psg.set_bdir(false);
    }

    #[test]
    fn latch_then_write_stores_register() {
        let mut psg = Psg::new();

        write_reg(&mut psg, ENABLE, 0x38);
        assert_eq!(psg.register(ENABLE), 0x38);
    }

    #[test]
    fn out_of_range_address_is_ignored() {
        let mut psg = Psg::new();

        psg.set_bdir(true);
        psg.set_bc1(true);
        psg.update_bus(0x20); // no such register
        psg.set_bc1(false);
        psg.update_bus(0x55);

        assert_eq!(psg.register(0), 0x55); // still targeting register 0
    }

    #[test]
    fn tone_period_scales_by_eight() {
        let mut psg = Psg::new();

        // Spec scenario: reg0 = 0x08, reg1 = 0x00 -> period 64
        write_reg(&mut psg, CH_A_PERIOD_LOW, 0x08);
        write_reg(&mut psg, CH_A_PERIOD_HIGH, 0x00);

        let mut st = psg.audio_state();
        st.exec_register_changes(u32::MAX);
        assert_eq!(st.channels[0].tone_period, 64);

        // 128 cycles toggle the output bit exactly twice
        let start = st.channels[0].output_bit;
        st.last_cycle = 0;
        st.exec_audio(64);
        assert_eq!(st.channels[0].output_bit, start ^ 1);
        st.exec_audio(128);
        assert_eq!(st.channels[0].output_bit, start);
    }

    #[test]
    fn zero_tone_period_clamps_to_one() {
        let mut psg = Psg::new();

        write_reg(&mut psg, CH_B_PERIOD_LOW, 0x00);
        let mut st = psg.audio_state();
        st.exec_register_changes(u32::MAX);
        assert_eq!(st.channels[1].tone_period, 1);
    }

    #[test]
    fn noise_period_uses_five_bits() {
        let mut psg = Psg::new();

        write_reg(&mut psg, NOISE_PERIOD, 0xFF);
        let mut st = psg.audio_state();
        st.exec_register_changes(u32::MAX);
        assert_eq!(st.noise.period, 0x1F * 8);
    }

    #[test]
    fn enable_bits_gate_channels() {
        let mut psg = Psg::new();

        write_reg(&mut psg, ENABLE, 0b0010_1001); // tone A off, noise C off
        let mut st = psg.audio_state();
        st.exec_register_changes(u32::MAX);

        assert_eq!(st.channels[0].disabled, 1);
        assert_eq!(st.channels[1].disabled, 0);
        assert_eq!(st.channels[2].disabled, 0);
        assert_eq!(st.channels[0].noise_disabled, 1);
        assert_eq!(st.channels[1].noise_disabled, 0);
        assert_eq!(st.channels[2].noise_disabled, 1);
    }

    #[test]
    fn envelope_mode_volume_ignores_level_bits() {
        let mut psg = Psg::new();

        // Rising envelope shape, then amplitude with the envelope bit set:
        // the channel volume must equal the envelope table entry no matter
        // what the low 4 bits say.
        write_reg(&mut psg, ENV_SHAPE, 0x0D);
        for low_bits in [0x00, 0x07, 0x0F] {
            write_reg(&mut psg, CH_A_AMPLITUDE, 0x10 | low_bits);
        }

        let mut st = psg.audio_state();
        st.exec_register_changes(u32::MAX);

        assert!(st.channels[0].use_envelope);
        let expected = VOLUME_TABLE[st.envelope.level() as usize];
        assert_eq!(st.channels[0].volume, expected);
    }

    #[test]
    fn fixed_volume_comes_from_table() {
        let mut psg = Psg::new();

        write_reg(&mut psg, CH_C_AMPLITUDE, 0x0F);
        let mut st = psg.audio_state();
        st.exec_register_changes(u32::MAX);

        assert!(!st.channels[2].use_envelope);
        assert_eq!(st.channels[2].volume, VOLUME_TABLE[15]);
    }

    #[test]
    fn envelope_shape_ff_is_ignored() {
        let mut psg = Psg::new();

        write_reg(&mut psg, ENV_SHAPE, 0x0B);
        write_reg(&mut psg, ENV_SHAPE, 0xFF);

        let mut st = psg.audio_state();
        st.exec_register_changes(u32::MAX);
        assert_eq!(st.envelope.shape, 0x0B);
    }

    #[test]
    fn envelope_hold_shapes_stay_at_final_level() {
        let mut st = AudioState::new();

        // Shape 0: single decay, then hold at 0
        st.exec_register_change(RegisterChange {
            cycle: 0,
            register: ENV_SHAPE,
            value: 0x00,
        });
        st.envelope.period = 1;

        for _ in 0..100 {
            st.envelope.exec_cycle();
        }
        assert_eq!(st.envelope.level(), 0);

        // Shape 0xB: decay then hold at 15
        st.exec_register_change(RegisterChange {
            cycle: 0,
            register: ENV_SHAPE,
            value: 0x0B,
        });
        st.envelope.period = 1;

        for _ in 0..100 {
            st.envelope.exec_cycle();
        }
        assert_eq!(st.envelope.level(), 15);
    }

    #[test]
    fn changes_apply_in_cycle_order() {
        let mut psg = Psg::new();

        psg.tick(10);
        write_reg(&mut psg, CH_A_AMPLITUDE, 0x05);
        psg.tick(10);
        write_reg(&mut psg, CH_A_AMPLITUDE, 0x0A);

        let mut st = psg.audio_state();
        assert_eq!(st.changes.len(), 2);
        assert!(st.changes[0].cycle < st.changes[1].cycle);

        // Applying up to the first change's cycle leaves the second queued
        let first_cycle = st.changes[0].cycle;
        st.exec_register_changes(first_cycle);
        assert_eq!(st.changes.len(), 1);
        assert_eq!(st.channels[0].volume, VOLUME_TABLE[5]);
    }

    #[test]
    fn log_overflow_applies_everything() {
        let mut psg = Psg::new();

        for i in 0..(LOG_HIGH_WATERMARK + 20) {
            psg.tick(1);
            write_reg(&mut psg, CH_A_AMPLITUDE, (i % 16) as u8);
        }

        let mut st = psg.audio_state();
        assert!(st.changes.len() > LOG_HIGH_WATERMARK);
        st.trim_register_changes();
        assert!(st.changes.is_empty());
    }

    #[test]
    fn warp_suppresses_enqueues_and_silences_output() {
        let mut psg = Psg::new();
        psg.set_warp(true);

        write_reg(&mut psg, CH_A_AMPLITUDE, 0x0F);
        assert!(psg.audio_state().changes.is_empty());
        // Bus-side register still updated
        assert_eq!(psg.register(CH_A_AMPLITUDE), 0x0F);

        let handle = psg.audio_handle();
        let mut buffer = [1i16; 32];
        handle.fill(&mut buffer);
        assert!(buffer.iter().all(|&s| s == 0));
    }

    #[test]
    fn mix_pass_rebases_the_log_clock() {
        let mut psg = Psg::new();

        psg.tick(1000);
        write_reg(&mut psg, CH_A_AMPLITUDE, 0x0F);

        let handle = psg.audio_handle();
        let mut buffer = [0i16; 2 * 64];
        handle.fill(&mut buffer);

        let st = psg.audio_state();
        assert!(st.update_log_cycle);
        assert_eq!(st.last_cycle, 0);
    }

    #[test]
    fn silent_machine_mixes_to_silence() {
        let psg = Psg::new();
        let handle = psg.audio_handle();

        let mut buffer = [999i16; 2 * 128];
        handle.fill(&mut buffer);
        // All channels disabled at reset: gates pass but volume is zero
        assert!(buffer.iter().all(|&s| s == 0));
    }
}
