//! TAP tape transport.
//!
//! A TAP file is the byte stream of an original cassette: an arbitrary
//! run of `0x16` sync bytes, a `0x24` end-of-sync marker, two reserved
//! bytes, a file-type byte, an auto-run flag, big-endian end and start
//! addresses, one reserved byte, a NUL-terminated name, then
//! `end - start + 1` body bytes.
//!
//! Playback is bit-level: each byte becomes a frame of sub-bits (start,
//! a zero, eight data bits LSB first, parity, two stop bits and a final
//! stop), and every bit is two half-waves on the VIA CB1 pin. The first
//! half is always short; the second half is short for a 1 and long for
//! a 0. If the file's own sync run is shorter than the loader wants,
//! synthetic `0x16` frames are inserted until the count is met.
//!
//! Tape output is a delicate thing on this machine. The below is not
//! exactly what the ROM routines expect, but many games use their own
//! loader routines with slightly different timings, and this pattern
//! works for both.

/// Half-wave length of a 1 bit (and of every first half), in cycles.
const PULSE_ONE: u32 = 208;

/// Half-wave length of the second half of a 0 bit, in cycles.
const PULSE_ZERO: u32 = 416;

/// Synthetic leader target for BASIC programs.
const LEADER_BASIC: usize = 192;

/// Synthetic leader target for everything else.
const LEADER_OTHER: usize = 112;

/// Parse/playback phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TapeState {
    Idle,
    ParseHeader,
    Leader,
    Header,
    Gap,
    Body,
    EndOfBlock,
    Fail,
}

/// Tape transport state.
pub struct Tape {
    /// Raw TAP bytes
    data: Vec<u8>,
    pub(crate) state: TapeState,
    motor_running: bool,
    /// Position one past the file's own sync run
    sync_end: usize,
    /// Position of the first body byte
    body_start: usize,
    /// Body bytes left to pulse out
    body_remaining: u32,
    /// Gap bits left to emit between header and body
    gap_bits_remaining: u32,
    /// Motor stopped with a partial byte in flight
    stopped_mid_byte: bool,
    /// Synthetic leader frames still owed
    leader_count: usize,
    /// Current byte offset in the file
    pub(crate) pos: usize,
    /// Sub-bit position within the current frame
    pub(crate) bit_index: u8,
    pub(crate) current_byte: u8,
    current_bit: u8,
    parity: u8,
    /// Cycles until the next output edge
    cycle_counter: u32,
    /// Current output line level
    line_out: bool,
}

impl Tape {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            state: TapeState::Idle,
            motor_running: false,
            sync_end: 0,
            body_start: 0,
            body_remaining: 0,
            gap_bits_remaining: 0,
            stopped_mid_byte: false,
            leader_count: 0,
            pos: 0,
            bit_index: 0,
            current_byte: 0,
            current_bit: 0,
            parity: 0,
            cycle_counter: 0,
            line_out: false,
        }
    }

    /// Load TAP data, rewinding the transport.
    pub fn load(&mut self, data: Vec<u8>) {
        self.data = data;
        self.rewind();
    }

    pub fn rewind(&mut self) {
        self.state = TapeState::Idle;
        self.motor_running = false;
        self.sync_end = 0;
        self.body_start = 0;
        self.body_remaining = 0;
        self.gap_bits_remaining = 0;
        self.stopped_mid_byte = false;
        self.leader_count = 0;
        self.pos = 0;
        self.bit_index = 0;
        self.current_byte = 0;
        self.current_bit = 0;
        self.parity = 0;
        self.cycle_counter = 0;
        self.line_out = false;
    }

    pub fn is_loaded(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn is_motor_running(&self) -> bool {
        self.motor_running
    }

    /// Motor control from the VIA PB6 line.
    pub fn set_motor(&mut self, motor_on: bool) {
        if motor_on == self.motor_running {
            return;
        }
        log::debug!("tape: motor {}", if motor_on { "on" } else { "off" });

        self.motor_running = motor_on;

        if motor_on {
            if self.stopped_mid_byte {
                // Drop the byte that was in flight when the motor stopped
                self.pos += 1;
                self.stopped_mid_byte = false;
            }
            self.state = TapeState::ParseHeader;
        } else if self.bit_index > 0 {
            log::debug!("tape: stopped mid-byte at {}", self.pos);
            self.stopped_mid_byte = true;
            self.bit_index = 0;
        }
    }

    /// Advance one cycle. Returns the new CB1 level whenever the output
    /// line is (re)driven.
    pub fn tick(&mut self) -> Option<bool> {
        if !self.motor_running {
            return None;
        }

        if self.state == TapeState::Idle || self.state == TapeState::Fail {
            return None;
        }

        if self.state == TapeState::ParseHeader {
            if !self.parse_header() {
                log::warn!("tape: failed to read header, stopping");
                self.motor_running = false;
                self.state = TapeState::Fail;
                return None;
            }
            self.line_out = true;
            self.state = TapeState::Leader;
            return Some(true);
        }

        // End-of-block: hold the line idle high
        if self.state == TapeState::EndOfBlock {
            self.line_out = true;
            self.cycle_counter = PULSE_ONE;
            return Some(true);
        }

        // Count the current half-wave down
        if self.cycle_counter > 1 {
            self.cycle_counter -= 1;
            return None;
        }

        // Half-wave finished: toggle the output line
        self.line_out = !self.line_out;

        // In the gap we emit a run of 1 bits so the reader routine can
        // catch up between header and body.
        if self.state == TapeState::Gap {
            self.cycle_counter = PULSE_ONE;
            if !self.line_out {
                self.gap_bits_remaining -= 1;
                if self.gap_bits_remaining == 0 {
                    self.state = TapeState::Body;
                }
            }
            return Some(self.line_out);
        }

        if self.line_out {
            // Start of a bit: pulse up
            if self.bit_index == 0 {
                self.current_byte = match self.state {
                    TapeState::Leader => 0x16,
                    TapeState::Header | TapeState::Body => {
                        self.data.get(self.pos).copied().unwrap_or(0xFF)
                    }
                    _ => 0xFF,
                };
            }

            self.current_bit = self.next_bit();
            self.cycle_counter = PULSE_ONE;

            // The frame wrapped: consume the byte and maybe switch state
            if self.bit_index == 0 {
                match self.state {
                    TapeState::Leader => {
                        if self.pos < self.sync_end {
                            // consumed one real 0x16 from the file
                            self.pos += 1;
                        } else if self.leader_count > 0 {
                            // emitted a synthetic 0x16; file position holds
                            self.leader_count -= 1;
                        }

                        if self.pos >= self.sync_end && self.leader_count == 0 {
                            self.state = TapeState::Header;
                        }
                    }
                    TapeState::Header => {
                        self.pos += 1; // consumed one header/filename byte
                        if self.pos == self.body_start {
                            // emit 10 full 1 bits before the body
                            self.gap_bits_remaining = 10;
                            self.state = TapeState::Gap;
                        }
                    }
                    TapeState::Body => {
                        self.pos += 1; // consumed one body byte
                        self.body_remaining = self.body_remaining.saturating_sub(1);
                        if self.body_remaining == 0 {
                            // Body done: idle high until the next motor cycle
                            self.state = TapeState::EndOfBlock;
                        }
                    }
                    _ => {}
                }
            }
        } else {
            // Second half of the bit: the length encodes the value
            self.cycle_counter = if self.current_bit != 0 {
                PULSE_ONE
            } else {
                PULSE_ZERO
            };
        }

        Some(self.line_out)
    }

    /// Parse the block descriptor at the current position.
    fn parse_header(&mut self) -> bool {
        let mut i = 0usize;

        loop {
            if self.pos + i >= self.data.len() {
                return false;
            }
            if self.data[self.pos + i] != 0x16 {
                break;
            }
            i += 1;
        }

        log::debug!("tape: found {} sync bytes (0x16)", i);
        let sync_len = i;
        self.sync_end = self.pos + i;

        if i < 3 {
            log::warn!("tape: too few sync bytes, failing");
            return false;
        }

        if self.data[self.pos + i] != 0x24 {
            log::warn!("tape: missing end of sync marker (0x24), failing");
            return false;
        }
        i += 1;

        if self.pos + i + 9 >= self.data.len() {
            log::warn!("tape: descriptor truncated");
            return false;
        }

        // Skip reserved bytes.
        i += 2;

        let file_type = self.data[self.pos + i];
        match file_type {
            0x00 => log::debug!("tape: file is BASIC"),
            0x80 => log::debug!("tape: file is machine code"),
            _ => log::debug!("tape: file type is unknown"),
        }
        i += 1;

        let auto_flag = self.data[self.pos + i];
        match auto_flag {
            0x80 => log::debug!("tape: runs automatically as BASIC"),
            0xC7 => log::debug!("tape: runs automatically as machine code"),
            _ => log::debug!("tape: does not run automatically"),
        }
        i += 1;

        let basic_mode = file_type == 0x00 || auto_flag == 0x80;
        let desired_sync = if basic_mode { LEADER_BASIC } else { LEADER_OTHER };

        let end_address =
            u16::from_be_bytes([self.data[self.pos + i], self.data[self.pos + i + 1]]);
        i += 2;

        let start_address =
            u16::from_be_bytes([self.data[self.pos + i], self.data[self.pos + i + 1]]);
        i += 2;

        log::debug!("tape: start address ${:04x}", start_address);
        log::debug!("tape:   end address ${:04x}", end_address);

        // Skip one reserved byte.
        i += 1;

        let mut name = String::new();
        loop {
            if self.pos + i >= self.data.len() {
                return false;
            }
            if self.data[self.pos + i] == 0x00 {
                break;
            }
            name.push(self.data[self.pos + i] as char);
            i += 1;
        }
        log::info!("tape: file name '{}'", name);

        // Where the body starts, to allow the gap after the header.
        self.body_start = self.pos + i + 1;
        self.body_remaining = (end_address as u32)
            .wrapping_sub(start_address as u32)
            .wrapping_add(1);

        self.leader_count = desired_sync.saturating_sub(sync_len);

        true
    }

    /// Next sub-bit of the current frame. Frame layout: start, a zero,
    /// eight data bits LSB first, parity (XOR of the data bits with 1),
    /// two stop bits and a final stop that wraps the frame.
    fn next_bit(&mut self) -> u8 {
        match self.bit_index {
            0 => {
                self.parity = 1;
                self.bit_index = 1;
                1
            }
            1 => {
                self.bit_index = 2;
                0
            }
            2..=9 => {
                let b = (self.current_byte >> (self.bit_index - 2)) & 0x01;
                self.parity ^= b;
                self.bit_index += 1;
                b
            }
            10 => {
                self.bit_index = 11;
                self.parity
            }
            11 => {
                self.bit_index = 12;
                1
            }
            12 => {
                self.bit_index = 13;
                1
            }
            _ => {
                self.bit_index = 0;
                1 // last stop bit; the next call starts a new frame
            }
        }
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal valid TAP: 3 sync bytes, marker, descriptor, name "AB",
    /// one body byte.
    fn minimal_tap() -> Vec<u8> {
        vec![
            0x16, 0x16, 0x16, // sync
            0x24, // marker
            0x00, 0x00, // reserved
            0x80, // file type: machine code
            0x00, // no autorun
            0x00, 0x00, // end address (BE)
            0x00, 0x00, // start address (BE)
            0x00, // reserved
            b'A', b'B', 0x00, // name
            0x5A, // body (end - start + 1 = 1 byte)
        ]
    }

    /// Run the transport through one full bit frame, returning the
    /// emitted bit values in order. Each bit starts at a rising edge;
    /// the frame is complete when the bit index wraps to zero.
    fn collect_frame(tape: &mut Tape) -> Vec<u8> {
        let mut bits = Vec::new();
        loop {
            while tape.tick() != Some(true) {}
            bits.push(tape.current_bit);
            if tape.bit_index == 0 {
                return bits;
            }
        }
    }

    #[test]
    fn motor_on_enters_leader_after_parse() {
        let mut tape = Tape::new();
        tape.load(minimal_tap());

        tape.set_motor(true);
        assert_eq!(tape.state, TapeState::ParseHeader);

        // The first tick parses the header and drives CB1 high
        assert_eq!(tape.tick(), Some(true));
        assert_eq!(tape.state, TapeState::Leader);
    }

    #[test]
    fn too_few_sync_bytes_fails() {
        let mut tape = Tape::new();
        tape.load(vec![0x16, 0x16, 0x24, 0x00]);

        tape.set_motor(true);
        assert_eq!(tape.tick(), None);
        assert_eq!(tape.state, TapeState::Fail);
        assert!(!tape.is_motor_running());
    }

    #[test]
    fn missing_marker_fails() {
        let mut tape = Tape::new();
        tape.load(vec![0x16, 0x16, 0x16, 0x55]);

        tape.set_motor(true);
        tape.tick();
        assert_eq!(tape.state, TapeState::Fail);
    }

    #[test]
    fn machine_code_leader_is_padded_to_112_frames() {
        let mut tape = Tape::new();
        tape.load(minimal_tap());
        tape.set_motor(true);
        tape.tick(); // parse

        // 3 sync bytes from the file plus synthetic padding
        let mut frames = 0;
        while tape.state == TapeState::Leader {
            collect_frame(&mut tape);
            frames += 1;
            assert!(frames < 1000, "leader never ended");
        }
        assert_eq!(frames, 112);
    }

    #[test]
    fn basic_leader_is_padded_to_192_frames() {
        let mut tap = minimal_tap();
        tap[6] = 0x00; // file type: BASIC
        let mut tape = Tape::new();
        tape.load(tap);
        tape.set_motor(true);
        tape.tick();

        let mut frames = 0;
        while tape.state == TapeState::Leader {
            collect_frame(&mut tape);
            frames += 1;
            assert!(frames < 1000, "leader never ended");
        }
        assert_eq!(frames, 192);
    }

    #[test]
    fn frame_layout_and_parity() {
        let mut tape = Tape::new();
        tape.load(minimal_tap());
        tape.set_motor(true);
        tape.tick();

        let bits = collect_frame(&mut tape);
        assert_eq!(bits.len(), 14);
        assert_eq!(tape.current_byte, 0x16);

        // start, zero, data LSB first
        assert_eq!(bits[0], 1);
        assert_eq!(bits[1], 0);
        for (i, &bit) in bits[2..10].iter().enumerate() {
            assert_eq!(bit, (0x16 >> i) & 1);
        }

        // The 10th sub-bit carries odd parity over the data bits
        let data_parity = bits[2..10].iter().fold(1u8, |acc, &b| acc ^ b);
        assert_eq!(bits[10], data_parity);

        // Stop bits
        assert_eq!(&bits[11..], &[1, 1, 1]);
    }

    #[test]
    fn zero_bit_half_wave_is_twice_as_long() {
        let mut tape = Tape::new();
        tape.load(minimal_tap());
        tape.set_motor(true);
        tape.tick();

        // First bit of the first leader frame is the start bit (a 1):
        // drive to the rising edge, then measure the low half.
        while tape.tick() != Some(true) {}
        assert_eq!(tape.current_bit, 1);
        let mut cycles = 1;
        while tape.tick() != Some(false) {
            cycles += 1;
        }
        assert_eq!(cycles, PULSE_ONE);

        // The second sub-bit of a frame is always 0: its low half is long
        while tape.tick() != Some(true) {}
        assert_eq!(tape.current_bit, 0);
        // Skip the high half, then measure the low half
        while tape.tick() != Some(false) {}
        let mut low_cycles = 1;
        while tape.tick() != Some(true) {
            low_cycles += 1;
        }
        assert_eq!(low_cycles, PULSE_ZERO);
    }

    #[test]
    fn body_end_holds_line_high() {
        let mut tape = Tape::new();
        tape.load(minimal_tap());
        tape.set_motor(true);
        tape.tick();

        let mut guard = 0;
        while tape.state != TapeState::EndOfBlock {
            tape.tick();
            guard += 1;
            assert!(guard < 3_000_000, "never reached end of block");
        }

        assert_eq!(tape.tick(), Some(true));
        assert_eq!(tape.tick(), Some(true));
    }

    #[test]
    fn motor_off_mid_byte_drops_the_byte_on_resume() {
        let mut tape = Tape::new();
        tape.load(minimal_tap());
        tape.set_motor(true);
        tape.tick();

        // Get into the middle of a frame
        while tape.tick() != Some(true) {}
        while tape.bit_index < 4 {
            tape.tick();
        }
        let pos_before = tape.pos;

        tape.set_motor(false);
        assert_eq!(tape.bit_index, 0);

        tape.set_motor(true);
        assert_eq!(tape.pos, pos_before + 1);
        assert_eq!(tape.state, TapeState::ParseHeader);
    }
}
