use thiserror::Error;

use crate::gcode_state::GCodeState;
use crate::resources::Resource;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GCodeError {
    #[error("G-code buffer length overflow (capacity {0} bytes)")]
    Overflow(usize),

    #[error("checksum mismatch: declared {declared}, computed {computed}")]
    ChecksumFailed { declared: u32, computed: u8 },

    #[error("checksum required but missing")]
    ChecksumMissing,

    #[error("line contains no command letter")]
    NoCommand,

    #[error("no complete line available")]
    NotReady,

    #[error("previous line not yet consumed")]
    LinePending,

    #[error("no parameter selected")]
    NoParameter,

    #[error("malformed parameter: {0}")]
    MalformedParameter(&'static str),

    #[error("too many values, at most {max} allowed")]
    TooManyValues { max: usize },

    #[error("wrong number of values after '{letter}', expected {expected} got {got}")]
    WrongValueCount { letter: char, expected: usize, got: usize },

    #[error("machine state pool exhausted ({0} records)")]
    ResourceExhausted(usize),

    #[error("resource {0} out of range")]
    ResourceOutOfRange(Resource),

    #[error("machine state stack underflow")]
    Underflow,

    #[error("state {0:?} has no successor step")]
    StepOutOfSequence(GCodeState),

    #[error("binary transfer not active")]
    NotWritingBinary,

    #[error("CRC mismatch: expected {expected:08x}, computed {computed:08x}")]
    CrcMismatch { expected: u32, computed: u32 },
}

pub type Result<T> = std::result::Result<T, GCodeError>;
