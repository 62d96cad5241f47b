//! Core traits for retro computer emulation.

mod bus;
mod cpu;
mod machine;

pub use bus::Bus;
pub use cpu::Cpu;
pub use machine::{AudioConfig, KeyCode, Machine, VideoConfig};
