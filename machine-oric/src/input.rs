//! Keyboard matrix mapping.
//!
//! The keyboard is an 8x8 switch matrix. The VIA selects a row on PB0-2,
//! the PSG's I/O port A masks the columns, and PB3 senses whether any
//! selected key is down. This module maps host key codes to (row,
//! column) positions in the matrix.

use emu_core::KeyCode;

/// Map a host key to its matrix position.
pub(crate) fn map_key(key: KeyCode) -> Option<(u8, u8)> {
    let pos = match key {
        // Row 0
        KeyCode::Digit3 => (0, 0),
        KeyCode::KeyX => (0, 1),
        KeyCode::Digit1 => (0, 2),
        KeyCode::KeyV => (0, 4),
        KeyCode::Digit5 => (0, 5),
        KeyCode::KeyN => (0, 6),
        KeyCode::Digit7 => (0, 7),

        // Row 1
        KeyCode::KeyD => (1, 0),
        KeyCode::KeyQ => (1, 1),
        KeyCode::Escape => (1, 2),
        KeyCode::KeyF => (1, 4),
        KeyCode::KeyR => (1, 5),
        KeyCode::KeyT => (1, 6),
        KeyCode::KeyJ => (1, 7),

        // Row 2
        KeyCode::KeyC => (2, 0),
        KeyCode::Digit2 => (2, 1),
        KeyCode::KeyZ => (2, 2),
        KeyCode::ControlLeft | KeyCode::ControlRight => (2, 3),
        KeyCode::Digit4 => (2, 4),
        KeyCode::KeyB => (2, 5),
        KeyCode::Digit6 => (2, 6),
        KeyCode::KeyM => (2, 7),

        // Row 3
        KeyCode::Quote => (3, 0),
        KeyCode::Backslash => (3, 1),
        KeyCode::Minus => (3, 4),
        KeyCode::Semicolon => (3, 5),
        KeyCode::Digit9 => (3, 6),
        KeyCode::KeyK => (3, 7),

        // Row 4
        KeyCode::ArrowRight => (4, 0),
        KeyCode::ArrowDown => (4, 1),
        KeyCode::ArrowLeft => (4, 2),
        KeyCode::ShiftLeft => (4, 3),
        KeyCode::ArrowUp => (4, 4),
        KeyCode::Period => (4, 5),
        KeyCode::Comma => (4, 6),
        KeyCode::Space => (4, 7),

        // Row 5
        KeyCode::BracketLeft => (5, 0),
        KeyCode::BracketRight => (5, 1),
        KeyCode::Backspace => (5, 2),
        KeyCode::AltLeft | KeyCode::AltRight => (5, 3), // FUNCT
        KeyCode::KeyP => (5, 4),
        KeyCode::KeyO => (5, 5),
        KeyCode::KeyI => (5, 6),
        KeyCode::KeyU => (5, 7),

        // Row 6
        KeyCode::KeyW => (6, 0),
        KeyCode::KeyS => (6, 1),
        KeyCode::KeyA => (6, 2),
        KeyCode::KeyE => (6, 4),
        KeyCode::KeyG => (6, 5),
        KeyCode::KeyH => (6, 6),
        KeyCode::KeyY => (6, 7),

        // Row 7
        KeyCode::Equal => (7, 0),
        KeyCode::Enter => (7, 2),
        KeyCode::ShiftRight => (7, 3),
        KeyCode::Slash => (7, 4),
        KeyCode::Digit0 => (7, 5),
        KeyCode::KeyL => (7, 6),
        KeyCode::Digit8 => (7, 7),

        _ => return None,
    };

    Some(pos)
}
