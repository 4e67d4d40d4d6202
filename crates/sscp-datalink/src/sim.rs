use crate::{ServiceError, SessionState, SscpService};
use md5::{Digest, Md5};
use sscp_core::encoding::Writer;
use sscp_core::frame::HEADER_LEN;
use sscp_core::pdu::{
    DecodedRequest, ErrorCode, InfoResponse, LoginResponse, VariableAddress, IMAGE_GUID_LEN,
    PROTOCOL_VERSION,
};
use sscp_core::EncodeError;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
struct User {
    digest: [u8; 16],
    group: u8,
}

/// Variable storage of the simulated PLC, one byte block per UID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryVariableModel {
    blocks: HashMap<u32, Vec<u8>>,
    read_only: HashSet<u32>,
}

impl InMemoryVariableModel {
    pub fn block(&self, uid: u32) -> Option<&[u8]> {
        self.blocks.get(&uid).map(Vec::as_slice)
    }

    fn check(&self, address: &VariableAddress) -> Result<std::ops::Range<usize>, ErrorCode> {
        let block = self.blocks.get(&address.uid).ok_or(ErrorCode::NoSuchVariable)?;
        checked_range(address.offset, address.length, block.len()).ok_or(ErrorCode::SizeMismatch)
    }
}

/// A PLC stand-in answering login, info, read and write requests from memory.
#[derive(Debug)]
pub struct InMemorySscpService {
    model: RwLock<InMemoryVariableModel>,
    users: HashMap<String, User>,
    max_data: u16,
    image_guid: [u8; IMAGE_GUID_LEN],
    serial: Vec<u8>,
    platform_id: [u8; 4],
    runtime_version: Vec<u8>,
}

impl Default for InMemorySscpService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySscpService {
    pub fn new() -> Self {
        Self {
            model: RwLock::new(InMemoryVariableModel::default()),
            users: HashMap::new(),
            max_data: 1024,
            image_guid: [0u8; IMAGE_GUID_LEN],
            serial: b"SIM-0001".to_vec(),
            platform_id: [0, 0, 0, 1],
            runtime_version: b"sscp-sim".to_vec(),
        }
    }

    pub fn with_user(self, name: &str, password: &str, group: u8) -> Self {
        let digest: [u8; 16] = Md5::digest(password.as_bytes()).into();
        self.with_user_digest(name, digest, group)
    }

    pub fn with_user_digest(mut self, name: &str, digest: [u8; 16], group: u8) -> Self {
        self.users.insert(name.to_owned(), User { digest, group });
        self
    }

    /// Largest request data length announced at login.
    pub fn with_max_data(mut self, max_data: u16) -> Self {
        self.max_data = max_data;
        self
    }

    pub fn with_image_guid(mut self, image_guid: [u8; IMAGE_GUID_LEN]) -> Self {
        self.image_guid = image_guid;
        self
    }

    pub fn with_serial(mut self, serial: &str) -> Self {
        self.serial = serial.as_bytes().to_vec();
        self
    }

    pub fn with_platform_id(mut self, platform_id: [u8; 4]) -> Self {
        self.platform_id = platform_id;
        self
    }

    pub fn with_runtime_version(mut self, runtime_version: &str) -> Self {
        self.runtime_version = runtime_version.as_bytes().to_vec();
        self
    }

    pub fn with_block(self, uid: u32, data: impl Into<Vec<u8>>) -> Self {
        self.set_block(uid, data);
        self
    }

    pub fn with_read_only(self, uid: u32) -> Self {
        self.model
            .write()
            .expect("in-memory variable model lock poisoned")
            .read_only
            .insert(uid);
        self
    }

    pub fn set_block(&self, uid: u32, data: impl Into<Vec<u8>>) {
        self.model
            .write()
            .expect("in-memory variable model lock poisoned")
            .blocks
            .insert(uid, data.into());
    }

    pub fn block(&self, uid: u32) -> Option<Vec<u8>> {
        self.model
            .read()
            .expect("in-memory variable model lock poisoned")
            .block(uid)
            .map(<[u8]>::to_vec)
    }

    /// Bytes a read of `address` would return.
    pub fn read(&self, address: VariableAddress) -> Option<Vec<u8>> {
        let model = self
            .model
            .read()
            .expect("in-memory variable model lock poisoned");
        let range = model.check(&address).ok()?;
        model.block(address.uid).map(|block| block[range].to_vec())
    }

    pub fn snapshot(&self) -> InMemoryVariableModel {
        self.model
            .read()
            .expect("in-memory variable model lock poisoned")
            .clone()
    }

    fn authenticate(&self, username: &[u8], digest: &[u8]) -> Result<(String, u8), ServiceError> {
        let name = std::str::from_utf8(username).map_err(|_| ServiceError::Unauthorized)?;
        match self.users.get(name) {
            Some(user) if user.digest.as_slice() == digest => Ok((name.to_owned(), user.group)),
            _ => Err(ServiceError::Unauthorized),
        }
    }
}

impl SscpService for InMemorySscpService {
    fn handle(
        &self,
        session: &mut SessionState,
        request: DecodedRequest<'_>,
        response: &mut [u8],
    ) -> Result<usize, ServiceError> {
        let mut w = Writer::new(response);

        match request {
            DecodedRequest::Login(req) => {
                let (user, group) = self.authenticate(req.username, req.digest)?;
                *session = SessionState {
                    user: Some(user),
                    max_receive: req.max_receive,
                    group,
                };
                LoginResponse {
                    protocol_version: PROTOCOL_VERSION,
                    max_data: self.max_data,
                    group,
                    image_guid: self.image_guid,
                    optional: &[],
                }
                .encode(&mut w)
                .map_err(map_encode)?;
            }
            DecodedRequest::GetInfo(req) => {
                self.authenticate(req.username, req.digest)?;
                let serial: &[u8] = if req.serial_flag != 0 {
                    &self.serial
                } else {
                    &[]
                };
                InfoResponse {
                    reserved: 0,
                    serial,
                    endianness: 0,
                    platform_id: self.platform_id,
                    runtime_version: &self.runtime_version,
                    information: &[],
                }
                .encode(&mut w)
                .map_err(map_encode)?;
            }
            DecodedRequest::Logout => {
                *session = SessionState::default();
            }
            DecodedRequest::ReadData(items) => {
                if !session.is_logged_in() {
                    return Err(ServiceError::NotLoggedIn);
                }
                let model = self
                    .model
                    .read()
                    .expect("in-memory variable model lock poisoned");

                let mut first_error = None;
                let mut failed = 0u64;
                let mut total = 0usize;
                for (i, address) in items.iter().enumerate() {
                    match model.check(&address) {
                        Ok(range) => total += range.len(),
                        Err(code) => {
                            first_error.get_or_insert(code);
                            failed |= 1u64 << i;
                        }
                    }
                }
                if let Some(code) = first_error {
                    return Err(ServiceError::sscp(code, Some(failed)));
                }
                if total + HEADER_LEN > usize::from(session.max_receive) {
                    return Err(ServiceError::sscp(ErrorCode::DataTooLong, None));
                }

                for address in items.iter() {
                    let range = model
                        .check(&address)
                        .map_err(|_| ServiceError::Internal("variable vanished during read"))?;
                    let block = model
                        .block(address.uid)
                        .ok_or(ServiceError::Internal("variable vanished during read"))?;
                    w.write_all(&block[range]).map_err(map_encode)?;
                }
            }
            DecodedRequest::WriteData(req) => {
                if !session.is_logged_in() {
                    return Err(ServiceError::NotLoggedIn);
                }
                let mut model = self
                    .model
                    .write()
                    .expect("in-memory variable model lock poisoned");
                let range = model
                    .check(&req.variable)
                    .map_err(|code| ServiceError::sscp(code, None))?;
                if model.read_only.contains(&req.variable.uid) {
                    return Err(ServiceError::sscp(ErrorCode::WriteFailed, None));
                }
                let block = model
                    .blocks
                    .get_mut(&req.variable.uid)
                    .ok_or(ServiceError::sscp(ErrorCode::NoSuchVariable, None))?;
                block[range].copy_from_slice(req.data);
            }
            DecodedRequest::Custom { .. } => {
                return Err(ServiceError::InvalidRequest("unsupported function"));
            }
        }

        Ok(w.position())
    }
}

fn checked_range(offset: u32, length: u32, len: usize) -> Option<std::ops::Range<usize>> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(length).ok()?)?;
    if length == 0 || end > len {
        return None;
    }
    Some(start..end)
}

fn map_encode(err: EncodeError) -> ServiceError {
    let msg = match err {
        EncodeError::BufferTooSmall => "response buffer too small",
        EncodeError::ValueOutOfRange => "response value out of range",
        EncodeError::FieldTooLong => "response field too long",
        EncodeError::InvalidLength => "response length invalid",
        EncodeError::VariableCount(_) => "response variable count invalid",
    };
    ServiceError::Internal(msg)
}
