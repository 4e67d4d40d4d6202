use crate::encoding::{Reader, Writer};
use crate::{DecodeError, EncodeError};

/// Error codes carried by a failed ReadData/WriteData reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorCode {
    NoSuchVariable,
    WriteFailed,
    DataTooLong,
    VariableCountLimitExceeded,
    SizeMismatch,
    Unknown(u16),
}

impl ErrorCode {
    pub const fn from_u16(value: u16) -> Self {
        match value {
            0x0103 => Self::NoSuchVariable,
            0x010A => Self::WriteFailed,
            0x010D => Self::DataTooLong,
            0x0110 => Self::VariableCountLimitExceeded,
            0x0112 => Self::SizeMismatch,
            other => Self::Unknown(other),
        }
    }

    pub const fn as_u16(self) -> u16 {
        match self {
            Self::NoSuchVariable => 0x0103,
            Self::WriteFailed => 0x010A,
            Self::DataTooLong => 0x010D,
            Self::VariableCountLimitExceeded => 0x0110,
            Self::SizeMismatch => 0x0112,
            Self::Unknown(raw) => raw,
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoSuchVariable => f.write_str("NoSuchVariable"),
            Self::WriteFailed => f.write_str("WriteFailed"),
            Self::DataTooLong => f.write_str("DataTooLong"),
            Self::VariableCountLimitExceeded => f.write_str("VariableCountLimitExceeded"),
            Self::SizeMismatch => f.write_str("SizeMismatch"),
            Self::Unknown(raw) => write!(f, "{raw:#06x}"),
        }
    }
}

/// Payload of a failed data reply: `[2B error code][8B bitmask]`.
///
/// Bit `i` of the mask (least significant first) flags the `i`-th variable
/// of the request. Write replies may omit the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub failed: Option<u64>,
}

impl ErrorResponse {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_be_u16(self.code.as_u16())?;
        if let Some(mask) = self.failed {
            w.write_be_u64(mask)?;
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let code = ErrorCode::from_u16(r.read_be_u16()?);
        let failed = if r.remaining() >= 8 {
            Some(r.read_be_u64()?)
        } else {
            None
        };
        Ok(Self { code, failed })
    }

    pub fn is_failed(&self, index: usize) -> bool {
        match self.failed {
            Some(mask) if index < 64 => mask & (1u64 << index) != 0,
            _ => false,
        }
    }
}
