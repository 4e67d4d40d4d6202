use crate::DecodeError;

/// Reply status bit set on every reply to a request.
pub const REPLY_BIT: u16 = 0x8000;
/// Reply status bits marking a failed request.
pub const ERROR_BITS: u16 = 0xC000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FunctionCode {
    GetInfo,
    Login,
    Logout,
    ReadData,
    WriteData,
    Custom(u16),
}

impl FunctionCode {
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::GetInfo => 0x0000,
            Self::Login => 0x0100,
            Self::Logout => 0x0101,
            Self::ReadData => 0x0500,
            Self::WriteData => 0x0510,
            Self::Custom(code) => code,
        }
    }

    pub fn from_u16(value: u16) -> Result<Self, DecodeError> {
        if Self::is_reply(value) {
            return Err(DecodeError::InvalidFunctionCode);
        }
        match value {
            0x0000 => Ok(Self::GetInfo),
            0x0100 => Ok(Self::Login),
            0x0101 => Ok(Self::Logout),
            0x0500 => Ok(Self::ReadData),
            0x0510 => Ok(Self::WriteData),
            _ => Ok(Self::Custom(value)),
        }
    }

    /// Status word of a successful reply, e.g. `0x8500` for ReadData.
    pub const fn success_status(self) -> u16 {
        self.as_u16() | REPLY_BIT
    }

    /// Status word the simulator uses for a failed reply.
    pub const fn error_status(self) -> u16 {
        self.as_u16() | ERROR_BITS
    }

    pub const fn is_reply(value: u16) -> bool {
        (value & REPLY_BIT) != 0
    }
}
