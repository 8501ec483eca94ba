//! One input channel: byte-at-a-time line parser plus the channel's machine
//! state stack.

use std::fmt;
use std::sync::Arc;

use heapless::Vec as LineVec;
use serde::Serialize;

use crate::binary::BinaryTransfer;
use crate::config::{ChannelConfig, ChecksumKind, GCODE_LENGTH, MessageType};
use crate::error::{GCodeError, Result};
use crate::gcode_state::GCodeState;
use crate::machine_state::{MachineState, MachineStateSnapshot};
use crate::pool::StatePool;
use crate::resources::ResourceBitmap;
use crate::stack::MachineStateStack;

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferState {
    #[default]
    ParseNotStarted,
    ParsingLineNumber,
    ParsingWhitespace,
    ParsingGCode,
    ParsingBracketedComment,
    ParsingQuotedString,
    ParsingChecksum,
    Discarding,
    Ready,
    Executing,
}

/// Checksum verdict of the current line.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// No checksum declared and none required.
    #[default]
    Unchecked,
    Valid,
    Mismatch { declared: u32, computed: u8 },
    Missing,
}

/// The command at the head of the current line, e.g. `G0.1` or `T-1`.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    pub letter: char,
    pub number: Option<i32>,
    pub fraction: Option<u8>,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter)?;
        if let Some(n) = self.number {
            write!(f, "{n}")?;
        }
        if let Some(frac) = self.fraction {
            write!(f, ".{frac}")?;
        }
        Ok(())
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct BufferStatus {
    pub identity: String,
    pub buffer_state: BufferState,
    pub line: String,
    pub command: Option<String>,
    pub checksum: ChecksumStatus,
    pub stack_depth: usize,
    pub machine_state: MachineStateSnapshot,
    pub writing_binary: bool,
    pub pool_in_use: usize,
    pub pool_allocated: usize,
}

pub struct GCodeBuffer {
    identity: String,
    response_type: MessageType,
    checksum_required: bool,
    checksum_kind: ChecksumKind,
    queue_codes: bool,

    pub(crate) buffer: LineVec<u8, GCODE_LENGTH>,
    buffer_state: BufferState,
    pub(crate) command_start: usize,
    pub(crate) parameter_start: usize,
    pub(crate) command_end: usize,
    command_length: usize,
    pub(crate) read_pointer: Option<usize>,
    line_number: Option<u32>,
    declared_checksum: Option<u32>,
    computed_checksum: u8,
    checksum_status: ChecksumStatus,
    pub(crate) command: Option<Command>,

    writing_file_directory: Option<String>,
    tool_number_adjust: i32,
    binary: BinaryTransfer,
    stack: MachineStateStack,

    /// When the dispatcher started waiting (its own clock, in ms).
    pub when_timer_started: u32,
    pub timer_running: bool,
}

impl GCodeBuffer {
    pub fn new(config: ChannelConfig, pool: Arc<StatePool>) -> Self {
        console_log!("G-code channel '{}' ready", config.identity);
        Self {
            identity: config.identity,
            response_type: config.response_type,
            checksum_required: config.checksum_required,
            checksum_kind: config.checksum_kind,
            queue_codes: config.queue_codes,
            buffer: LineVec::new(),
            buffer_state: BufferState::ParseNotStarted,
            command_start: 0,
            parameter_start: 0,
            command_end: 0,
            command_length: 0,
            read_pointer: None,
            line_number: None,
            declared_checksum: None,
            computed_checksum: 0,
            checksum_status: ChecksumStatus::Unchecked,
            command: None,
            writing_file_directory: None,
            tool_number_adjust: 0,
            binary: BinaryTransfer::default(),
            stack: MachineStateStack::new(pool),
            when_timer_started: 0,
            timer_running: false,
        }
    }

    /// Back to start-up state: every nested frame is popped and the parser
    /// re-initialised. Returns the locks the popped frames still held.
    pub fn reset(&mut self) -> ResourceBitmap {
        let held = self.stack.unwind();
        self.init();
        self.timer_running = false;
        held
    }

    /// Get ready to parse the next line. The machine state stack is not
    /// touched.
    pub fn init(&mut self) {
        self.buffer.clear();
        self.buffer_state = BufferState::ParseNotStarted;
        self.command_start = 0;
        self.parameter_start = 0;
        self.command_end = 0;
        self.command_length = 0;
        self.read_pointer = None;
        self.line_number = None;
        self.declared_checksum = None;
        self.computed_checksum = 0;
        self.checksum_status = ChecksumStatus::Unchecked;
        self.command = None;
    }

    // --- CHARACTER PARSER ---

    /// Add one received byte. Returns `Ok(true)` when a complete line is
    /// ready; no further bytes may be fed until it has been finished.
    ///
    /// In binary mode the byte only feeds the CRC and `Ok(false)` comes back.
    pub fn put(&mut self, c: u8) -> Result<bool> {
        if self.binary.is_writing() {
            self.binary.update(&[c])?;
            return Ok(false);
        }
        if matches!(self.buffer_state, BufferState::Ready | BufferState::Executing) {
            console_log!("'{}' byte {:#04x} fed while a line is pending", self.identity, c);
            return Err(GCodeError::LinePending);
        }

        if c != 0 {
            self.command_length += 1;
        }
        match c {
            0 | b'\n' => return Ok(self.line_finished()),
            b'\r' => return Ok(false),
            _ => {}
        }

        let mut state = self.buffer_state;
        loop {
            match state {
                BufferState::ParseNotStarted => match c {
                    b'N' | b'n' => {
                        self.add_to_checksum(c);
                        self.line_number = Some(0);
                        self.buffer_state = BufferState::ParsingLineNumber;
                    }
                    b' ' | b'\t' => self.add_to_checksum(c),
                    _ => {
                        state = BufferState::ParsingGCode;
                        continue;
                    }
                },
                BufferState::ParsingLineNumber => {
                    if c.is_ascii_digit() {
                        self.add_to_checksum(c);
                        let n = self.line_number.unwrap_or(0);
                        self.line_number = Some(n.saturating_mul(10).saturating_add(u32::from(c - b'0')));
                    } else {
                        state = BufferState::ParsingWhitespace;
                        continue;
                    }
                }
                BufferState::ParsingWhitespace => match c {
                    b' ' | b'\t' => {
                        self.add_to_checksum(c);
                        self.buffer_state = BufferState::ParsingWhitespace;
                    }
                    _ => {
                        state = BufferState::ParsingGCode;
                        continue;
                    }
                },
                BufferState::ParsingGCode => {
                    self.buffer_state = match c {
                        b'*' => {
                            self.declared_checksum = Some(0);
                            BufferState::ParsingChecksum
                        }
                        b';' => {
                            self.add_to_checksum(c);
                            BufferState::Discarding
                        }
                        b'(' => {
                            self.add_to_checksum(c);
                            BufferState::ParsingBracketedComment
                        }
                        b'"' => {
                            self.store_and_add_to_checksum(c)?;
                            BufferState::ParsingQuotedString
                        }
                        _ => {
                            self.store_and_add_to_checksum(c)?;
                            BufferState::ParsingGCode
                        }
                    };
                }
                BufferState::ParsingBracketedComment => {
                    self.add_to_checksum(c);
                    if c == b')' {
                        self.buffer_state = BufferState::ParsingGCode;
                    }
                }
                BufferState::ParsingQuotedString => {
                    // A doubled quote closes and immediately reopens, so it
                    // lands in the buffer as `""` and is unescaped on decode.
                    self.store_and_add_to_checksum(c)?;
                    if c == b'"' {
                        self.buffer_state = BufferState::ParsingGCode;
                    }
                }
                BufferState::ParsingChecksum => {
                    if c.is_ascii_digit() {
                        let n = self.declared_checksum.unwrap_or(0);
                        self.declared_checksum = Some(n.saturating_mul(10).saturating_add(u32::from(c - b'0')));
                    } else {
                        self.buffer_state = BufferState::Discarding;
                    }
                }
                BufferState::Discarding => {
                    if self.declared_checksum.is_none() {
                        self.add_to_checksum(c);
                    }
                }
                BufferState::Ready | BufferState::Executing => {}
            }
            break;
        }
        Ok(false)
    }

    /// Replace whatever was accumulated with a complete line handed over in
    /// one piece. A missing terminator is supplied.
    pub fn put_line(&mut self, line: &str) -> Result<bool> {
        self.init();
        for &c in line.as_bytes() {
            if self.put(c)? {
                return Ok(true);
            }
        }
        self.put(b'\n')
    }

    fn add_to_checksum(&mut self, c: u8) {
        self.computed_checksum = self.checksum_kind.combine(self.computed_checksum, c);
    }

    fn store_and_add_to_checksum(&mut self, c: u8) -> Result<()> {
        self.add_to_checksum(c);
        if self.buffer.push(c).is_err() {
            console_log!("G-code buffer '{}' length overflow", self.identity);
            self.init();
            return Err(GCodeError::Overflow(GCODE_LENGTH));
        }
        Ok(())
    }

    fn line_finished(&mut self) -> bool {
        if self.buffer.iter().all(|b| b.is_ascii_whitespace()) {
            self.init();
            return false;
        }

        self.checksum_status = match self.declared_checksum {
            Some(declared) if declared == u32::from(self.computed_checksum) => ChecksumStatus::Valid,
            Some(declared) => ChecksumStatus::Mismatch { declared, computed: self.computed_checksum },
            // Lines replayed from macro files never carry checksums.
            None if self.checksum_required && self.stack.depth() == 0 => ChecksumStatus::Missing,
            None => ChecksumStatus::Unchecked,
        };
        if let ChecksumStatus::Mismatch { declared, computed } = self.checksum_status {
            console_log!(
                "'{}' line {:?} checksum mismatch: declared {}, computed {}",
                self.identity,
                self.line_number,
                declared,
                computed
            );
        }

        self.buffer_state = BufferState::Ready;
        self.command_start = 0;
        self.decode_command();
        true
    }

    // --- LINE STATUS ---

    pub fn checksum_status(&self) -> ChecksumStatus {
        self.checksum_status
    }

    /// `Err` if the ready line must not be executed as received.
    pub fn check_line(&self) -> Result<()> {
        if !self.is_ready() && !self.is_executing() {
            return Err(GCodeError::NotReady);
        }
        match self.checksum_status {
            ChecksumStatus::Mismatch { declared, computed } => {
                Err(GCodeError::ChecksumFailed { declared, computed })
            }
            ChecksumStatus::Missing => Err(GCodeError::ChecksumMissing),
            ChecksumStatus::Unchecked | ChecksumStatus::Valid => {
                if self.command.is_some() { Ok(()) } else { Err(GCodeError::NoCommand) }
            }
        }
    }

    /// Line number to ask the sender to resend, after a checksum failure
    /// on a numbered line.
    pub fn resend_request(&self) -> Option<u32> {
        match self.checksum_status {
            ChecksumStatus::Mismatch { .. } | ChecksumStatus::Missing => self.line_number,
            _ => None,
        }
    }

    pub fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    /// Stored command text of the current line.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_state(&self) -> BufferState {
        self.buffer_state
    }

    pub fn is_idle(&self) -> bool {
        !matches!(self.buffer_state, BufferState::Ready | BufferState::Executing)
    }

    pub fn is_completely_idle(&self) -> bool {
        self.state() == GCodeState::Normal && self.is_idle()
    }

    pub fn is_ready(&self) -> bool {
        self.buffer_state == BufferState::Ready
    }

    pub fn is_executing(&self) -> bool {
        self.buffer_state == BufferState::Executing
    }

    pub fn starting_new_code(&self) -> bool {
        self.buffer.is_empty()
    }

    /// `false` marks the ready command as started. `true` moves on to the
    /// next command on the same line, or to the next line if none is left.
    pub fn set_finished(&mut self, finished: bool) {
        if !finished {
            self.buffer_state = BufferState::Executing;
        } else if self.command_end < self.buffer.len() {
            self.command_start = self.command_end;
            self.decode_command();
            self.buffer_state = BufferState::Ready;
        } else {
            self.init();
        }
    }

    // --- CHANNEL PROPERTIES ---

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn response_type(&self) -> MessageType {
        self.response_type
    }

    pub fn checksum_required(&self) -> bool {
        self.checksum_required
    }

    /// Bit 0 of `bits` selects whether lines must carry a checksum.
    pub fn set_comms_properties(&mut self, bits: u32) {
        self.checksum_required = bits & 1 != 0;
    }

    pub fn can_queue_codes(&self) -> bool {
        self.queue_codes || self.is_doing_file_macro()
    }

    pub fn tool_number_adjust(&self) -> i32 {
        self.tool_number_adjust
    }

    pub fn set_tool_number_adjust(&mut self, adjust: i32) {
        self.tool_number_adjust = adjust;
    }

    pub fn writing_file_directory(&self) -> Option<&str> {
        self.writing_file_directory.as_deref()
    }

    pub fn set_writing_file_directory(&mut self, dir: Option<String>) {
        self.writing_file_directory = dir;
    }

    /// File offset where the current command started, given how many bytes
    /// the file reader has read ahead. Later commands on the same line sit
    /// `command_start` bytes past the start of the line.
    pub fn file_position(&self, bytes_cached: u64) -> Option<u64> {
        let file = self.machine_state().file_state?;
        let consumed = bytes_cached + self.command_length as u64;
        file.position.checked_sub(consumed).map(|line_start| line_start + self.command_start as u64)
    }

    // --- BINARY TRANSFER ---

    pub fn is_writing_binary(&self) -> bool {
        self.binary.is_writing()
    }

    pub fn set_binary_writing(&mut self, writing: bool) {
        self.binary.set_writing(writing);
    }

    pub fn put_binary(&mut self, data: &[u8]) -> Result<()> {
        self.binary.update(data)
    }

    pub fn crc32(&self) -> u32 {
        self.binary.crc32()
    }

    pub fn set_expected_crc32(&mut self, crc: u32) {
        self.binary.set_expected_crc32(crc);
    }

    pub fn finish_binary(&mut self) -> Result<u32> {
        self.binary.finish()
    }

    // --- MACHINE STATE STACK ---

    pub fn machine_state(&self) -> &MachineState {
        self.stack.top()
    }

    pub fn machine_state_mut(&mut self) -> &mut MachineState {
        self.stack.top_mut()
    }

    pub fn original_machine_state(&self) -> &MachineState {
        self.stack.bottom()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn push_state(&mut self) -> Result<()> {
        self.stack.push()
    }

    pub fn pop_state(&mut self) -> Result<()> {
        self.stack.pop()
    }

    pub fn is_doing_file_macro(&self) -> bool {
        self.machine_state().doing_file_macro
    }

    pub fn state(&self) -> GCodeState {
        self.machine_state().state
    }

    pub fn set_state(&mut self, state: GCodeState) {
        self.machine_state_mut().state = state;
    }

    /// Move the top frame to the next step of its procedure.
    pub fn advance_state(&mut self) -> Result<GCodeState> {
        let current = self.state();
        let Some(next) = current.successor() else {
            console_log!("'{}': no step follows {:?}", self.identity, current);
            return Err(GCodeError::StepOutOfSequence(current));
        };
        self.set_state(next);
        Ok(next)
    }

    /// Answer every frame that is waiting for the user. Returns how many
    /// frames were waiting.
    pub fn message_acknowledged(&self, cancelled: bool) -> usize {
        self.stack.frames().filter(|ms| ms.ack().acknowledge(cancelled)).count()
    }

    // --- DIAGNOSTICS ---

    pub fn status(&self) -> BufferStatus {
        BufferStatus {
            identity: self.identity.clone(),
            buffer_state: self.buffer_state,
            line: String::from_utf8_lossy(&self.buffer).into_owned(),
            command: self.command.map(|c| c.to_string()),
            checksum: self.checksum_status,
            stack_depth: self.stack.depth(),
            machine_state: self.machine_state().snapshot(),
            writing_binary: self.binary.is_writing(),
            pool_in_use: self.stack.pool().num_in_use(),
            pool_allocated: self.stack.pool().num_allocated(),
        }
    }

    pub fn diagnostics(&self) -> String {
        let pool = self.stack.pool();
        let report = format!(
            "{}: buffer {:?}, state {:?}, depth {}, pool {}/{} in use, {} released with locks",
            self.identity,
            self.buffer_state,
            self.state(),
            self.stack.depth(),
            pool.num_in_use(),
            pool.num_allocated(),
            pool.released_with_locks()
        );
        console_log!("{}", report);
        report
    }
}
