//! Command ingestion and execution-state core for a motion controller.
//!
//! Each input source (serial console, network, file playback) gets a
//! [`GCodeBuffer`]: an incremental line parser fed one byte at a time, a
//! decoder with typed parameter getters, and a stack of [`MachineState`]
//! frames drawn from a [`StatePool`] shared by every channel.

// --- LOGGING ---
#[cfg(target_arch = "wasm32")]
pub(crate) fn log(s: &str) {
    web_sys::console::log_1(&s.into());
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn log(_s: &str) {}

macro_rules! console_log {
    ($($t:tt)*) => ($crate::log(&format!($($t)*)))
}

pub mod binary;
pub mod bridge;
pub mod config;
pub mod decode;
pub mod error;
pub mod gcode_buffer;
pub mod gcode_state;
pub mod machine_state;
pub mod pool;
pub mod resources;
pub mod scan;
pub mod stack;

pub use bridge::CommandChannel;
pub use config::{ChannelConfig, ChecksumKind, MessageType, GCODE_LENGTH};
pub use decode::ArrayElement;
pub use error::{GCodeError, Result};
pub use gcode_buffer::{BufferState, BufferStatus, ChecksumStatus, Command, GCodeBuffer};
pub use gcode_state::{GCodeState, Procedure};
pub use machine_state::{AckOutcome, Acknowledgement, FileReplay, MachineState, MachineStateSnapshot};
pub use pool::StatePool;
pub use resources::{Resource, ResourceBitmap};
pub use stack::MachineStateStack;
