use core::fmt;

/// Failure to lay out a frame in the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EncodeError {
    BufferTooSmall,
    /// An integer does not fit its wire field.
    ValueOutOfRange,
    /// A length-prefixed field (user name, digest, serial) exceeds 255 bytes.
    FieldTooLong,
    /// Payload length disagrees with the length the header or address declares.
    InvalidLength,
    /// A ReadData request must carry between 1 and 64 addresses.
    VariableCount(usize),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => f.write_str("buffer too small"),
            Self::ValueOutOfRange => f.write_str("value out of range"),
            Self::FieldTooLong => f.write_str("length-prefixed field too long"),
            Self::InvalidLength => f.write_str("data length does not match declared length"),
            Self::VariableCount(n) => write!(f, "invalid variable count {n}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

/// Failure to parse a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecodeError {
    UnexpectedEof,
    /// A reply status where a request function code was expected.
    InvalidFunctionCode,
    InvalidLength,
    VariableCount(usize),
    /// Data flags byte other than the plain-address form.
    UnsupportedFlags(u8),
    /// Bytes left over after a complete body.
    TrailingData(usize),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => f.write_str("unexpected end of input"),
            Self::InvalidFunctionCode => f.write_str("invalid function code"),
            Self::InvalidLength => f.write_str("invalid length"),
            Self::VariableCount(n) => write!(f, "invalid variable count {n}"),
            Self::UnsupportedFlags(flags) => write!(f, "unsupported data flags {flags:#04x}"),
            Self::TrailingData(n) => write!(f, "{n} trailing bytes"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// Errors raised when converting a requested value into a variable's raw bytes.
#[cfg(feature = "std")]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("variable is read-only: {uid}")]
    ReadOnly { uid: u32 },
    #[error("variable has no current value: {uid}")]
    NoCurrentValue { uid: u32 },
    #[error("unknown state or next state: {uid}")]
    UnknownState { uid: u32 },
    #[error("invalid value for {uid}: {value}")]
    InvalidValue { uid: u32, value: String },
    #[error("value does not fit in {length} bytes: {uid}")]
    OutOfRange { uid: u32, length: u32 },
    #[error("raw block for {uid} is {got} bytes, expected {expected}")]
    LengthMismatch { uid: u32, expected: u32, got: usize },
}

/// Errors raised by the schedule codecs.
#[cfg(feature = "std")]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("schedule length {length} is not a multiple of {slot_len}")]
    LengthNotMultiple { length: usize, slot_len: usize },
    #[error("schedule block is {got} bytes, expected {expected}")]
    BlockLength { expected: usize, got: usize },
    #[error("multiple schedule on values: {first:#06x} and {second:#06x}")]
    MultipleOnStates { first: u16, second: u16 },
    #[error("event end must not be before its start")]
    InvalidRange,
    #[error("event crosses the weekly boundary")]
    CrossesWeekBoundary,
    #[error("no matching event in schedule")]
    EventNotFound,
    #[error("year {0} cannot be encoded")]
    YearOutOfRange(i32),
    #[error("schedule slot count mismatch: expected {expected}, got {got}")]
    SlotCountMismatch { expected: usize, got: usize },
}
