//! JavaScript-facing wrapper around one channel.

use wasm_bindgen::prelude::*;

use crate::config::ChannelConfig;
use crate::gcode_buffer::{BufferStatus, GCodeBuffer};
use crate::pool::StatePool;

#[wasm_bindgen]
pub struct CommandChannel {
    buffer: GCodeBuffer,
}

impl CommandChannel {
    pub fn with_config(config: ChannelConfig) -> Self {
        Self { buffer: GCodeBuffer::new(config, StatePool::global()) }
    }

    pub fn buffer(&self) -> &GCodeBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut GCodeBuffer {
        &mut self.buffer
    }

    pub fn status(&self) -> BufferStatus {
        self.buffer.status()
    }
}

#[wasm_bindgen]
impl CommandChannel {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Self {
        let config: ChannelConfig = serde_wasm_bindgen::from_value(config).unwrap_or_default();
        Self::with_config(config)
    }

    // --- INPUT ---

    /// Feed one byte; true once a line is ready.
    pub fn put(&mut self, c: u8) -> bool {
        match self.buffer.put(c) {
            Ok(ready) => ready,
            Err(e) => {
                console_log!("{}: {}", self.buffer.identity(), e);
                false
            }
        }
    }

    pub fn put_line(&mut self, line: String) -> bool {
        match self.buffer.put_line(&line) {
            Ok(ready) => ready,
            Err(e) => {
                console_log!("{}: {}", self.buffer.identity(), e);
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.buffer.is_ready()
    }

    /// True if the ready line passed its checksum checks.
    pub fn line_ok(&self) -> bool {
        self.buffer.check_line().is_ok()
    }

    pub fn set_finished(&mut self, finished: bool) {
        self.buffer.set_finished(finished);
    }

    // --- DECODING ---

    /// Printable command, e.g. "G1" or "G0.1"; empty if none.
    pub fn command(&self) -> String {
        self.buffer.command().map(|c| c.to_string()).unwrap_or_default()
    }

    pub fn seen(&mut self, letter: char) -> bool {
        self.buffer.seen(letter)
    }

    pub fn get_float(&mut self) -> Option<f64> {
        self.buffer.get_f_value().ok()
    }

    pub fn get_int(&mut self) -> Option<i32> {
        self.buffer.get_i_value().ok()
    }

    pub fn get_uint(&mut self) -> Option<u32> {
        self.buffer.get_ui_value().ok()
    }

    pub fn get_string(&mut self) -> Option<String> {
        self.buffer.get_possibly_quoted_string(true).ok()
    }

    // --- MACHINE STATE ---

    pub fn push_state(&mut self) -> bool {
        self.buffer.push_state().is_ok()
    }

    pub fn pop_state(&mut self) -> bool {
        self.buffer.pop_state().is_ok()
    }

    pub fn advance_state(&mut self) -> bool {
        self.buffer.advance_state().is_ok()
    }

    pub fn state_name(&self) -> String {
        format!("{:?}", self.buffer.state())
    }

    pub fn acknowledge(&self, cancelled: bool) -> u32 {
        self.buffer.message_acknowledged(cancelled) as u32
    }

    pub fn diagnostics(&self) -> String {
        self.buffer.diagnostics()
    }

    pub fn get_status(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.status()).unwrap_or(JsValue::NULL)
    }
}
