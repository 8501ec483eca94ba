use serde::{Deserialize, Serialize};

/// Raw line capacity of one channel, in stored bytes.
pub const GCODE_LENGTH: usize = 201;

/// Separator between the elements of an array parameter, e.g. `X1:2:3`.
pub const LIST_SEPARATOR: u8 = b':';

/// Feedrate a fresh machine state starts with (mm/min).
pub const DEFAULT_FEEDRATE: f64 = 3000.0;

/// Number of nested machine states the shared pool hands out.
pub const DEFAULT_POOL_CAPACITY: usize = 16;

/// Opaque tag telling the response layer where replies for a channel go.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageType(pub u32);

/// How bytes of a line are combined into its checksum.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChecksumKind {
    #[default]
    Xor,
    Additive,
}

impl ChecksumKind {
    pub fn combine(self, acc: u8, byte: u8) -> u8 {
        match self {
            ChecksumKind::Xor => acc ^ byte,
            ChecksumKind::Additive => acc.wrapping_add(byte),
        }
    }

    /// Checksum of a complete byte run, starting from zero.
    pub fn of(self, bytes: &[u8]) -> u8 {
        bytes.iter().fold(0, |acc, &b| self.combine(acc, b))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    pub identity: String,
    pub response_type: MessageType,
    pub checksum_required: bool,
    pub checksum_kind: ChecksumKind,
    pub queue_codes: bool,
}

impl ChannelConfig {
    pub fn new(identity: impl Into<String>) -> Self {
        Self { identity: identity.into(), ..Self::default() }
    }

    pub fn with_checksum_required(mut self, required: bool) -> Self {
        self.checksum_required = required;
        self
    }

    pub fn with_checksum_kind(mut self, kind: ChecksumKind) -> Self {
        self.checksum_kind = kind;
        self
    }

    pub fn with_response_type(mut self, response_type: MessageType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_queue_codes(mut self, queue_codes: bool) -> Self {
        self.queue_codes = queue_codes;
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            identity: "unnamed".to_string(),
            response_type: MessageType::default(),
            checksum_required: false,
            checksum_kind: ChecksumKind::Xor,
            queue_codes: false,
        }
    }
}
