use crate::encoding::{Reader, Writer};
use crate::pdu::FunctionCode;
use crate::{DecodeError, EncodeError};

/// Protocol version offered at login and in info requests.
pub const PROTOCOL_VERSION: u8 = 0x01;
/// Flag byte selecting the `uid + offset + length` addressing mode.
pub const DATA_FLAGS: u8 = 0x80;
/// Maximum variables the PLC accepts in a single data request.
pub const MAX_VARIABLES: usize = 64;
/// Encoded size of one `[uid][offset][length]` triple.
pub const VARIABLE_ADDRESS_LEN: usize = 12;
/// Length of an MD5 credential digest.
pub const DIGEST_LEN: usize = 16;

fn validate_count(count: usize) -> Result<(), EncodeError> {
    if count == 0 || count > MAX_VARIABLES {
        return Err(EncodeError::VariableCount(count));
    }
    Ok(())
}

fn validate_count_decode(count: usize) -> Result<(), DecodeError> {
    if count == 0 || count > MAX_VARIABLES {
        return Err(DecodeError::VariableCount(count));
    }
    Ok(())
}

fn validate_digest(digest: &[u8]) -> Result<(), EncodeError> {
    if digest.len() != DIGEST_LEN {
        return Err(EncodeError::InvalidLength);
    }
    Ok(())
}

/// Location of one PLC variable: block uid, byte offset and byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableAddress {
    pub uid: u32,
    pub offset: u32,
    pub length: u32,
}

impl VariableAddress {
    pub const fn new(uid: u32, offset: u32, length: u32) -> Self {
        Self {
            uid,
            offset,
            length,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_be_u32(self.uid)?;
        w.write_be_u32(self.offset)?;
        w.write_be_u32(self.length)?;
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            uid: r.read_be_u32()?,
            offset: r.read_be_u32()?,
            length: r.read_be_u32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginRequest<'a> {
    pub protocol_version: u8,
    /// Largest reply data length this client accepts.
    pub max_receive: u16,
    pub username: &'a [u8],
    pub digest: &'a [u8],
}

impl<'a> LoginRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_digest(self.digest)?;
        w.write_u8(self.protocol_version)?;
        w.write_be_u16(self.max_receive)?;
        w.write_len_prefixed(self.username)?;
        w.write_len_prefixed(self.digest)?;
        Ok(())
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let protocol_version = r.read_u8()?;
        let max_receive = r.read_be_u16()?;
        let username = r.read_len_prefixed()?;
        let digest = r.read_len_prefixed()?;
        if digest.len() != DIGEST_LEN {
            return Err(DecodeError::InvalidLength);
        }
        Ok(Self {
            protocol_version,
            max_receive,
            username,
            digest,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoRequest<'a> {
    pub protocol_version: u8,
    /// Non-zero asks the PLC to include its serial number.
    pub serial_flag: u8,
    pub username: &'a [u8],
    pub digest: &'a [u8],
    pub offset: u16,
    pub size: u16,
}

impl<'a> InfoRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_digest(self.digest)?;
        w.write_u8(self.protocol_version)?;
        w.write_u8(self.serial_flag)?;
        w.write_len_prefixed(self.username)?;
        w.write_len_prefixed(self.digest)?;
        w.write_be_u16(self.offset)?;
        w.write_be_u16(self.size)?;
        Ok(())
    }

    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        Ok(Self {
            protocol_version: r.read_u8()?,
            serial_flag: r.read_u8()?,
            username: r.read_len_prefixed()?,
            digest: r.read_len_prefixed()?,
            offset: r.read_be_u16()?,
            size: r.read_be_u16()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDataRequest<'a> {
    pub variables: &'a [VariableAddress],
}

impl<'a> ReadDataRequest<'a> {
    /// Data length of a read request carrying `count` variables.
    pub const fn encoded_len(count: usize) -> usize {
        1 + count * VARIABLE_ADDRESS_LEN
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_count(self.variables.len())?;
        w.write_u8(DATA_FLAGS)?;
        for variable in self.variables {
            variable.encode(w)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteDataRequest<'a> {
    pub variable: VariableAddress,
    pub data: &'a [u8],
}

impl<'a> WriteDataRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        if usize::try_from(self.variable.length).ok() != Some(self.data.len()) {
            return Err(EncodeError::InvalidLength);
        }
        w.write_u8(DATA_FLAGS)?;
        w.write_u8(1)?;
        self.variable.encode(w)?;
        w.write_all(self.data)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    GetInfo(InfoRequest<'a>),
    Login(LoginRequest<'a>),
    Logout,
    ReadData(ReadDataRequest<'a>),
    WriteData(WriteDataRequest<'a>),
}

impl<'a> Request<'a> {
    /// Exact length of the request data produced by [`Request::encode`].
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::GetInfo(req) => 2 + 1 + req.username.len() + 1 + req.digest.len() + 4,
            Self::Login(req) => 3 + 1 + req.username.len() + 1 + req.digest.len(),
            Self::Logout => 0,
            Self::ReadData(req) => ReadDataRequest::encoded_len(req.variables.len()),
            Self::WriteData(req) => 2 + VARIABLE_ADDRESS_LEN + req.data.len(),
        }
    }

    /// Encode the request data (everything after the frame header).
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        match self {
            Self::GetInfo(req) => req.encode(w),
            Self::Login(req) => req.encode(w),
            Self::Logout => Ok(()),
            Self::ReadData(req) => req.encode(w),
            Self::WriteData(req) => req.encode(w),
        }
    }

    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::GetInfo(_) => FunctionCode::GetInfo,
            Self::Login(_) => FunctionCode::Login,
            Self::Logout => FunctionCode::Logout,
            Self::ReadData(_) => FunctionCode::ReadData,
            Self::WriteData(_) => FunctionCode::WriteData,
        }
    }
}

/// Borrowed view over the address triples of a decoded read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDataRequestData<'a> {
    addresses: &'a [u8],
}

impl<'a> ReadDataRequestData<'a> {
    pub fn len(&self) -> usize {
        self.addresses.len() / VARIABLE_ADDRESS_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<VariableAddress> {
        let start = index.checked_mul(VARIABLE_ADDRESS_LEN)?;
        let bytes = self.addresses.get(start..start + VARIABLE_ADDRESS_LEN)?;
        VariableAddress::decode(&mut Reader::new(bytes)).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = VariableAddress> + 'a {
        self.addresses
            .chunks_exact(VARIABLE_ADDRESS_LEN)
            .filter_map(|chunk| VariableAddress::decode(&mut Reader::new(chunk)).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteDataRequestData<'a> {
    pub variable: VariableAddress,
    pub data: &'a [u8],
}

/// Decoded request model used by simulator/server implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedRequest<'a> {
    GetInfo(InfoRequest<'a>),
    Login(LoginRequest<'a>),
    Logout,
    ReadData(ReadDataRequestData<'a>),
    WriteData(WriteDataRequestData<'a>),
    Custom { function: u16, data: &'a [u8] },
}

impl<'a> DecodedRequest<'a> {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::GetInfo(_) => FunctionCode::GetInfo,
            Self::Login(_) => FunctionCode::Login,
            Self::Logout => FunctionCode::Logout,
            Self::ReadData(_) => FunctionCode::ReadData,
            Self::WriteData(_) => FunctionCode::WriteData,
            Self::Custom { function, .. } => FunctionCode::Custom(*function),
        }
    }

    /// Decode request data for `function` (as carried in the frame header).
    pub fn decode(function: u16, data: &'a [u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let request = match FunctionCode::from_u16(function)? {
            FunctionCode::GetInfo => Self::GetInfo(InfoRequest::decode(&mut r)?),
            FunctionCode::Login => Self::Login(LoginRequest::decode(&mut r)?),
            FunctionCode::Logout => Self::Logout,
            FunctionCode::ReadData => {
                let flags = r.read_u8()?;
                if flags != DATA_FLAGS {
                    return Err(DecodeError::UnsupportedFlags(flags));
                }
                let addresses = r.read_exact(r.remaining())?;
                if addresses.len() % VARIABLE_ADDRESS_LEN != 0 {
                    return Err(DecodeError::InvalidLength);
                }
                let items = ReadDataRequestData { addresses };
                validate_count_decode(items.len())?;
                Self::ReadData(items)
            }
            FunctionCode::WriteData => {
                let flags = r.read_u8()?;
                if flags != DATA_FLAGS {
                    return Err(DecodeError::UnsupportedFlags(flags));
                }
                let count = usize::from(r.read_u8()?);
                if count != 1 {
                    return Err(DecodeError::VariableCount(count));
                }
                let variable = VariableAddress::decode(&mut r)?;
                let len =
                    usize::try_from(variable.length).map_err(|_| DecodeError::InvalidLength)?;
                let data = r.read_exact(len)?;
                Self::WriteData(WriteDataRequestData { variable, data })
            }
            FunctionCode::Custom(function) => {
                return Ok(Self::Custom { function, data });
            }
        };
        if !r.is_empty() {
            return Err(DecodeError::TrailingData(r.remaining()));
        }
        Ok(request)
    }
}
