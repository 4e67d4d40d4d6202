//! High-level SSCP client crate.

#![forbid(unsafe_code)]

pub mod batch;
pub mod sync;

pub use batch::{plan_reads, PlannerConfig, ReadBatch};
pub use sync::{SyncClientError, SyncSscpTcpClient};

use md5::{Digest, Md5};
use sscp_core::encoding::{Reader, Writer};
use sscp_core::frame::HEADER_LEN;
use sscp_core::pdu::{
    ErrorCode, ErrorResponse, FunctionCode, InfoRequest, InfoResponse, LoginRequest,
    LoginResponse, ReadDataRequest, Request, VariableAddress, WriteDataRequest, DIGEST_LEN,
    IMAGE_GUID_LEN, MAX_VARIABLES, PROTOCOL_VERSION,
};
use sscp_core::variable::{NewValue, Value, Variable};
use sscp_core::{CodecError, DecodeError, EncodeError};
use sscp_datalink::{DataLink, DataLinkError, SscpTcpTransport, TransportConfig};
use thiserror::Error;
use tokio::net::ToSocketAddrs;
use tracing::{debug, error, warn};

#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "metrics")]
use std::sync::Arc;

/// Reply buffer for login and info exchanges.
const CONTROL_REPLY_LEN: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// PLC sub-address placed in every request header.
    pub plc_address: u8,
    /// Largest reply frame this client accepts, declared at login.
    pub max_receive: u16,
    pub max_variables: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            plc_address: 1,
            max_receive: 2048,
            max_variables: MAX_VARIABLES,
        }
    }
}

impl ClientConfig {
    pub fn with_plc_address(mut self, plc_address: u8) -> Self {
        self.plc_address = plc_address;
        self
    }

    pub fn with_max_receive(mut self, max_receive: u16) -> Self {
        self.max_receive = max_receive;
        self
    }

    pub fn with_max_variables(mut self, max_variables: usize) -> Self {
        self.max_variables = max_variables.clamp(1, MAX_VARIABLES);
        self
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("datalink error: {0}")]
    DataLink(#[from] DataLinkError),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("invalid md5 digest: {0}")]
    InvalidDigest(#[from] hex::FromHexError),
    #[error("not logged in")]
    NotLoggedIn,
    #[error("unexpected reply status {status:#06x} to function {function:#06x}")]
    UnexpectedStatus { function: u16, status: u16 },
    #[error("write of variable {uid} failed (status {status:#06x}, code {code:?})")]
    WriteFailed {
        uid: u32,
        status: u16,
        code: Option<ErrorCode>,
    },
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),
}

/// Username and MD5 digest of the password, as sent at login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    digest: [u8; DIGEST_LEN],
}

impl Credentials {
    pub fn from_password(username: impl Into<String>, password: &str) -> Self {
        Self {
            username: username.into(),
            digest: Md5::digest(password.as_bytes()).into(),
        }
    }

    /// Build from a pre-computed digest given as 32 hex characters.
    pub fn from_md5_hex(username: impl Into<String>, digest: &str) -> Result<Self, ClientError> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(digest.trim(), &mut bytes)?;
        Ok(Self {
            username: username.into(),
            digest: bytes,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Parameters the PLC returned at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub protocol_version: u8,
    /// Largest request data length the PLC accepts.
    pub max_data: u16,
    pub group: u8,
    pub image_guid: [u8; IMAGE_GUID_LEN],
}

impl Session {
    pub fn image_guid_hex(&self) -> String {
        hex::encode(self.image_guid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Serial number as sent by the PLC; binary, not text.
    pub serial: Vec<u8>,
    pub endianness: u8,
    pub platform_id: [u8; 4],
    pub runtime_version: String,
    pub information: Vec<u8>,
}

impl DeviceInfo {
    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial)
    }
}

/// One successfully read variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub raw: Vec<u8>,
    pub value: Value,
}

/// Per-variable read failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableError {
    pub uid: u32,
    pub code: ErrorCode,
}

/// Result of [`SscpClient::read_variables`].
///
/// `readings` is parallel to the input list; a variable either has a reading
/// or an entry in `errors`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOutcome {
    pub readings: Vec<Option<Reading>>,
    pub errors: Vec<VariableError>,
}

impl ReadOutcome {
    pub fn failed_uids(&self) -> Vec<u32> {
        self.errors.iter().map(|e| e.uid).collect()
    }

    pub fn error_codes(&self) -> Vec<ErrorCode> {
        self.errors.iter().map(|e| e.code).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Decoded values keyed by `uid-offset-length`.
    pub fn values<'a>(
        &'a self,
        variables: &'a [Variable],
    ) -> impl Iterator<Item = (String, &'a Value)> + 'a {
        variables
            .iter()
            .zip(&self.readings)
            .filter_map(|(var, reading)| reading.as_ref().map(|r| (var.key(), &r.value)))
    }

    fn fail(&mut self, variables: &[Variable], index: usize, code: ErrorCode) {
        self.errors.push(VariableError {
            uid: variables[index].uid,
            code,
        });
    }
}

#[cfg(feature = "metrics")]
#[derive(Debug, Default)]
pub struct ClientMetrics {
    requests_total: AtomicU64,
    batches_total: AtomicU64,
    variable_errors_total: AtomicU64,
    desyncs_total: AtomicU64,
    write_failures_total: AtomicU64,
}

#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientMetricsSnapshot {
    pub requests_total: u64,
    pub batches_total: u64,
    pub variable_errors_total: u64,
    pub desyncs_total: u64,
    pub write_failures_total: u64,
}

#[cfg(feature = "metrics")]
impl ClientMetrics {
    fn snapshot(&self) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            batches_total: self.batches_total.load(Ordering::Relaxed),
            variable_errors_total: self.variable_errors_total.load(Ordering::Relaxed),
            desyncs_total: self.desyncs_total.load(Ordering::Relaxed),
            write_failures_total: self.write_failures_total.load(Ordering::Relaxed),
        }
    }
}

/// One login session against a PLC.
///
/// A logged-out or failed client is not reused; open a new one per login.
pub struct SscpClient<D: DataLink> {
    datalink: D,
    config: ClientConfig,
    credentials: Credentials,
    session: Option<Session>,
    #[cfg(feature = "metrics")]
    metrics: Arc<ClientMetrics>,
}

impl SscpClient<SscpTcpTransport> {
    /// Open a TCP session with default transport settings. Does not log in.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        credentials: Credentials,
    ) -> Result<Self, ClientError> {
        Self::connect_with_config(
            addr,
            credentials,
            ClientConfig::default(),
            TransportConfig::default(),
        )
        .await
    }

    pub async fn connect_with_config<A: ToSocketAddrs>(
        addr: A,
        credentials: Credentials,
        config: ClientConfig,
        transport: TransportConfig,
    ) -> Result<Self, ClientError> {
        let link = SscpTcpTransport::connect_with_config(addr, transport).await?;
        Ok(Self::with_config(link, credentials, config))
    }
}

impl<D: DataLink> SscpClient<D> {
    pub fn new(datalink: D, credentials: Credentials) -> Self {
        Self::with_config(datalink, credentials, ClientConfig::default())
    }

    pub fn with_config(datalink: D, credentials: Credentials, config: ClientConfig) -> Self {
        Self {
            datalink,
            config,
            credentials,
            session: None,
            #[cfg(feature = "metrics")]
            metrics: Arc::new(ClientMetrics::default()),
        }
    }

    pub fn config(&self) -> ClientConfig {
        self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[cfg(feature = "metrics")]
    pub fn metrics_snapshot(&self) -> ClientMetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn send_request(
        &self,
        request: &Request<'_>,
        response: &mut [u8],
    ) -> Result<(u16, usize), ClientError> {
        let mut req_buf = vec![0u8; request.encoded_len()];
        let mut writer = Writer::new(&mut req_buf);
        request.encode(&mut writer)?;
        let function = request.function_code().as_u16();

        debug!(
            address = self.config.plc_address,
            function,
            len = writer.as_written().len(),
            "dispatching sscp request"
        );

        #[cfg(feature = "metrics")]
        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

        let reply = self
            .datalink
            .exchange(
                self.config.plc_address,
                function,
                writer.as_written(),
                response,
            )
            .await?;
        Ok((reply.status, reply.len))
    }

    fn require_session(&self) -> Result<&Session, ClientError> {
        self.session.as_ref().ok_or(ClientError::NotLoggedIn)
    }

    /// Authenticate and record the session limits announced by the PLC.
    pub async fn login(&mut self) -> Result<&Session, ClientError> {
        let request = Request::Login(LoginRequest {
            protocol_version: PROTOCOL_VERSION,
            max_receive: self.config.max_receive,
            username: self.credentials.username.as_bytes(),
            digest: &self.credentials.digest,
        });
        let mut response = vec![0u8; CONTROL_REPLY_LEN];
        let (status, len) = self.send_request(&request, &mut response).await?;
        if status != FunctionCode::Login.success_status() {
            return Err(ClientError::UnexpectedStatus {
                function: FunctionCode::Login.as_u16(),
                status,
            });
        }

        let reply = LoginResponse::decode(&mut Reader::new(&response[..len]))?;
        let session = Session {
            protocol_version: reply.protocol_version,
            max_data: reply.max_data,
            group: reply.group,
            image_guid: reply.image_guid,
        };
        debug!(
            user = %self.credentials.username,
            version = session.protocol_version,
            max_data = session.max_data,
            group = session.group,
            guid = %session.image_guid_hex(),
            "sscp login succeeded"
        );
        Ok(self.session.insert(session))
    }

    /// Send the logout frame and drop the connection. Never fails.
    pub async fn logout(&mut self) {
        self.session = None;
        self.datalink
            .send_and_close(self.config.plc_address, FunctionCode::Logout.as_u16(), &[])
            .await;
        debug!("sscp logout sent");
    }

    /// Ask the PLC for its identity. Credentials travel with the request.
    pub async fn get_info(&self, with_serial: bool) -> Result<DeviceInfo, ClientError> {
        let request = Request::GetInfo(InfoRequest {
            protocol_version: PROTOCOL_VERSION,
            serial_flag: u8::from(with_serial),
            username: self.credentials.username.as_bytes(),
            digest: &self.credentials.digest,
            offset: 0,
            size: 0,
        });
        let mut response = vec![0u8; CONTROL_REPLY_LEN];
        let (status, len) = self.send_request(&request, &mut response).await?;
        if status != FunctionCode::GetInfo.success_status() {
            return Err(ClientError::UnexpectedStatus {
                function: FunctionCode::GetInfo.as_u16(),
                status,
            });
        }

        let reply = InfoResponse::decode(&mut Reader::new(&response[..len]))?;
        let info = DeviceInfo {
            serial: reply.serial.to_vec(),
            endianness: reply.endianness,
            platform_id: reply.platform_id,
            runtime_version: String::from_utf8_lossy(reply.runtime_version).into_owned(),
            information: reply.information.to_vec(),
        };
        debug!(?info, "sscp info received");
        Ok(info)
    }

    /// Read `variables` in as few requests as the session limits allow.
    ///
    /// Variables the PLC rejects are reported in [`ReadOutcome::errors`] and the
    /// rest of their batch is re-requested without them.
    pub async fn read_variables(&self, variables: &[Variable]) -> Result<ReadOutcome, ClientError> {
        let mut outcome = ReadOutcome {
            readings: vec![None; variables.len()],
            errors: Vec::new(),
        };
        if variables.is_empty() {
            return Ok(outcome);
        }
        let session = self.require_session()?;

        let addresses: Vec<VariableAddress> = variables.iter().map(Variable::address).collect();
        let planner = PlannerConfig::new(
            session.max_data,
            self.config.max_receive,
            self.config.max_variables,
        );
        let batches = plan_reads(&addresses, &planner);
        let mut response = vec![0u8; usize::from(self.config.max_receive).max(HEADER_LEN)];

        for (batch_no, batch) in batches.iter().enumerate() {
            #[cfg(feature = "metrics")]
            self.metrics.batches_total.fetch_add(1, Ordering::Relaxed);

            let mut remaining = batch.indices.clone();
            while !remaining.is_empty() {
                let request_vars: Vec<VariableAddress> =
                    remaining.iter().map(|&i| addresses[i]).collect();
                let request = Request::ReadData(ReadDataRequest {
                    variables: &request_vars,
                });
                let (status, len) = self.send_request(&request, &mut response).await?;

                if status != FunctionCode::ReadData.success_status() {
                    let err = ErrorResponse::decode(&mut Reader::new(&response[..len]))
                        .map_err(|_| ClientError::UnexpectedStatus {
                            function: FunctionCode::ReadData.as_u16(),
                            status,
                        })?;
                    let (failed, kept): (Vec<_>, Vec<_>) = remaining
                        .iter()
                        .enumerate()
                        .partition(|(pos, _)| err.is_failed(*pos));
                    let (failed, kept): (Vec<usize>, Vec<usize>) = if failed.is_empty() {
                        // Mask names nothing we sent: the whole request failed.
                        (remaining.clone(), Vec::new())
                    } else {
                        (
                            failed.into_iter().map(|(_, &i)| i).collect(),
                            kept.into_iter().map(|(_, &i)| i).collect(),
                        )
                    };
                    for &index in &failed {
                        warn!(
                            uid = variables[index].uid,
                            key = %variables[index].key(),
                            code = %err.code,
                            "sscp variable read failed"
                        );
                        outcome.fail(variables, index, err.code);
                    }
                    #[cfg(feature = "metrics")]
                    self.metrics
                        .variable_errors_total
                        .fetch_add(failed.len() as u64, Ordering::Relaxed);
                    remaining = kept;
                    continue;
                }

                let expected: usize = request_vars
                    .iter()
                    .map(|v| usize::try_from(v.length).unwrap_or(usize::MAX))
                    .sum();
                if len != expected {
                    error!(
                        expected,
                        got = len,
                        "sscp read reply length mismatch, abandoning remaining variables"
                    );
                    #[cfg(feature = "metrics")]
                    self.metrics.desyncs_total.fetch_add(1, Ordering::Relaxed);
                    let rest = remaining
                        .iter()
                        .copied()
                        .chain(batches[batch_no + 1..].iter().flat_map(|b| b.indices.iter().copied()));
                    for index in rest {
                        outcome.fail(variables, index, ErrorCode::SizeMismatch);
                    }
                    return Ok(outcome);
                }

                let mut reader = Reader::new(&response[..len]);
                for &index in &remaining {
                    let var = &variables[index];
                    let raw = reader
                        .read_exact(usize::try_from(var.length).unwrap_or(usize::MAX))?
                        .to_vec();
                    let value = var.decode(&raw);
                    debug!(key = %var.key(), %value, "sscp variable read");
                    outcome.readings[index] = Some(Reading { raw, value });
                }
                break;
            }
        }

        Ok(outcome)
    }

    /// Encode `new` for `variable` and write it. Returns the bytes written.
    ///
    /// `previous` is the last known value, needed for `+`/`-` steps.
    pub async fn write_variable(
        &self,
        variable: &Variable,
        new: &NewValue,
        previous: Option<&Value>,
    ) -> Result<Vec<u8>, ClientError> {
        self.require_session()?;
        let data = variable.encode(new, previous)?;
        self.write_raw(variable, &data).await?;
        Ok(data)
    }

    /// Write already-encoded bytes to `variable`.
    pub async fn write_raw(&self, variable: &Variable, data: &[u8]) -> Result<(), ClientError> {
        self.require_session()?;
        let request = Request::WriteData(WriteDataRequest {
            variable: variable.address(),
            data,
        });
        let mut response = [0u8; 64];
        let (status, len) = self.send_request(&request, &mut response).await?;
        if status != FunctionCode::WriteData.success_status() {
            #[cfg(feature = "metrics")]
            self.metrics
                .write_failures_total
                .fetch_add(1, Ordering::Relaxed);
            let code = ErrorResponse::decode(&mut Reader::new(&response[..len]))
                .ok()
                .map(|e| e.code);
            warn!(uid = variable.uid, status, ?code, "sscp write failed");
            return Err(ClientError::WriteFailed {
                uid: variable.uid,
                status,
                code,
            });
        }
        debug!(key = %variable.key(), len = data.len(), "sscp variable written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientConfig, ClientError, Credentials, SscpClient};
    use async_trait::async_trait;
    use sscp_core::pdu::ErrorCode;
    use sscp_core::variable::{NewValue, State, Value, VarType, Variable};
    use sscp_datalink::{DataLink, DataLinkError, Reply};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type MockQueue = VecDeque<Result<(u16, Vec<u8>), DataLinkError>>;

    #[derive(Clone, Default)]
    struct MockLink {
        responses: Arc<Mutex<MockQueue>>,
        requests: Arc<Mutex<Vec<(u16, Vec<u8>)>>>,
        calls: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl MockLink {
        fn with_responses(responses: Vec<Result<(u16, Vec<u8>), DataLinkError>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses.into())),
                ..Self::default()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }

        async fn requests(&self) -> Vec<(u16, Vec<u8>)> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl DataLink for MockLink {
        async fn exchange(
            &self,
            _address: u8,
            function: u16,
            request: &[u8],
            response: &mut [u8],
        ) -> Result<Reply, DataLinkError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.requests.lock().await.push((function, request.to_vec()));
            let mut guard = self.responses.lock().await;
            let (status, bytes) = guard.pop_front().ok_or(DataLinkError::ConnectionClosed)??;
            if bytes.len() > response.len() {
                return Err(DataLinkError::ResponseBufferTooSmall {
                    needed: bytes.len(),
                    available: response.len(),
                });
            }
            response[..bytes.len()].copy_from_slice(&bytes);
            Ok(Reply {
                status,
                len: bytes.len(),
            })
        }

        async fn send_and_close(&self, _address: u8, function: u16, request: &[u8]) {
            self.requests.lock().await.push((function, request.to_vec()));
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn login_reply(max_data: u16) -> Result<(u16, Vec<u8>), DataLinkError> {
        let mut data = vec![1];
        data.extend_from_slice(&max_data.to_be_bytes());
        data.push(2);
        data.extend_from_slice(&[0xAB; 16]);
        Ok((0x8100, data))
    }

    fn error_reply(status: u16, code: u16, mask: u64) -> Result<(u16, Vec<u8>), DataLinkError> {
        let mut data = code.to_be_bytes().to_vec();
        data.extend_from_slice(&mask.to_be_bytes());
        Ok((status, data))
    }

    fn credentials() -> Credentials {
        Credentials::from_password("admin", "rw")
    }

    fn scenario_variables() -> Vec<Variable> {
        vec![
            Variable::new(100, 0, 4, VarType::Float32),
            Variable::new(200, 0, 1, VarType::Bool),
            Variable::new(300, 0, 2, VarType::Int16)
                .with_states(vec![State::new(1, "Heat"), State::new(2, "Cool")]),
        ]
    }

    async fn logged_in(link: MockLink) -> SscpClient<MockLink> {
        let mut client = SscpClient::new(link, credentials());
        client.login().await.unwrap();
        client
    }

    #[test]
    fn credentials_from_hex_digest() {
        let creds =
            Credentials::from_md5_hex("admin", "21232f297a57a5a743894a0e4a801fc3").unwrap();
        assert_eq!(creds, Credentials::from_password("admin", "admin"));
        assert!(matches!(
            Credentials::from_md5_hex("admin", "abc"),
            Err(ClientError::InvalidDigest(_))
        ));
    }

    #[tokio::test]
    async fn login_records_session_limits() {
        let link = MockLink::with_responses(vec![login_reply(512)]);
        let seen = link.clone();
        let mut client = SscpClient::new(link, credentials());

        let session = client.login().await.unwrap();
        assert_eq!(session.max_data, 512);
        assert_eq!(session.group, 2);
        assert_eq!(session.image_guid_hex(), "ab".repeat(16));

        let requests = seen.requests().await;
        assert_eq!(requests[0].0, 0x0100);
        assert_eq!(&requests[0].1[..6], &[0x01, 0x08, 0x00, 0x05, b'a', b'd']);
    }

    #[tokio::test]
    async fn login_rejection_is_an_error() {
        let link = MockLink::with_responses(vec![Ok((0xC100, Vec::new()))]);
        let mut client = SscpClient::new(link, credentials());
        let err = client.login().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnexpectedStatus {
                function: 0x0100,
                status: 0xC100
            }
        ));
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn reads_require_login_but_empty_reads_do_not() {
        let link = MockLink::default();
        let seen = link.clone();
        let client = SscpClient::new(link, credentials());

        let outcome = client.read_variables(&[]).await.unwrap();
        assert!(outcome.readings.is_empty());
        assert!(outcome.errors.is_empty());
        assert_eq!(seen.call_count(), 0);

        let err = client
            .read_variables(&scenario_variables())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotLoggedIn));
    }

    #[tokio::test]
    async fn end_to_end_read_decodes_all_types() {
        let link = MockLink::with_responses(vec![
            login_reply(1024),
            Ok((0x8500, vec![0x41, 0xAC, 0x00, 0x00, 0x01, 0x00, 0x02])),
        ]);
        let client = logged_in(link).await;
        let variables = scenario_variables();

        let outcome = client.read_variables(&variables).await.unwrap();
        assert!(outcome.failed_uids().is_empty());
        assert!(outcome.error_codes().is_empty());

        let values: Vec<(String, String)> = outcome
            .values(&variables)
            .zip(&variables)
            .map(|((key, value), var)| (key, var.describe(value)))
            .collect();
        assert_eq!(
            values,
            vec![
                ("100-0-4".to_string(), "21.5".to_string()),
                ("200-0-1".to_string(), "1".to_string()),
                ("300-0-2".to_string(), "Cool".to_string()),
            ]
        );
        assert_eq!(
            outcome.readings[0].as_ref().map(|r| &r.value),
            Some(&Value::Float(21.5))
        );
    }

    #[tokio::test]
    async fn reads_are_split_across_batches() {
        // 1 + 12 * 2 = 25 request bytes fit, so at most two variables per request.
        let variables: Vec<Variable> = (1..=5)
            .map(|uid| Variable::new(uid, 0, 1, VarType::Bool))
            .collect();
        let link = MockLink::with_responses(vec![
            login_reply(30),
            Ok((0x8500, vec![1, 0])),
            Ok((0x8500, vec![1, 1])),
            Ok((0x8500, vec![0])),
        ]);
        let seen = link.clone();
        let client = logged_in(link).await;

        let outcome = client.read_variables(&variables).await.unwrap();
        assert!(outcome.is_complete());
        let values: Vec<_> = outcome
            .readings
            .iter()
            .map(|r| r.as_ref().map(|r| r.value.clone()))
            .collect();
        assert_eq!(
            values,
            vec![
                Some(Value::Integer(1)),
                Some(Value::Integer(0)),
                Some(Value::Integer(1)),
                Some(Value::Integer(1)),
                Some(Value::Integer(0)),
            ]
        );
        assert_eq!(seen.call_count(), 4);
    }

    #[tokio::test]
    async fn failing_variables_are_dropped_and_batch_retried() {
        let link = MockLink::with_responses(vec![
            login_reply(1024),
            error_reply(0xC500, 0x0103, 0b010),
            Ok((0x8500, vec![0x41, 0xAC, 0x00, 0x00, 0x00, 0x01])),
        ]);
        let seen = link.clone();
        let client = logged_in(link).await;
        let variables = scenario_variables();

        let outcome = client.read_variables(&variables).await.unwrap();
        assert_eq!(outcome.failed_uids(), vec![200]);
        assert_eq!(outcome.error_codes(), vec![ErrorCode::NoSuchVariable]);
        assert!(outcome.readings[1].is_none());
        assert_eq!(
            outcome.readings[2].as_ref().map(|r| variables[2].describe(&r.value)),
            Some("Heat".to_string())
        );

        let requests = seen.requests().await;
        // Retry carries only the surviving two variables.
        assert_eq!(requests[2].1.len(), 1 + 2 * 12);
        assert_eq!(seen.call_count(), 3);
    }

    #[tokio::test]
    async fn retry_loop_terminates_when_every_variable_fails() {
        let link = MockLink::with_responses(vec![
            login_reply(1024),
            error_reply(0xC500, 0x0112, 0b001),
            error_reply(0xC500, 0x0112, 0b001),
            error_reply(0xC500, 0x0112, 0b001),
        ]);
        let seen = link.clone();
        let client = logged_in(link).await;

        let outcome = client.read_variables(&scenario_variables()).await.unwrap();
        assert_eq!(outcome.failed_uids(), vec![100, 200, 300]);
        assert!(outcome.readings.iter().all(Option::is_none));
        assert_eq!(seen.call_count(), 4);
    }

    #[tokio::test]
    async fn mask_naming_nothing_fails_whole_batch() {
        let link = MockLink::with_responses(vec![
            login_reply(1024),
            error_reply(0xC500, 0x0110, 1 << 40),
        ]);
        let seen = link.clone();
        let client = logged_in(link).await;

        let outcome = client.read_variables(&scenario_variables()).await.unwrap();
        assert_eq!(
            outcome.error_codes(),
            vec![ErrorCode::VariableCountLimitExceeded; 3]
        );
        assert_eq!(seen.call_count(), 2);
    }

    #[tokio::test]
    async fn length_mismatch_abandons_remaining_batches() {
        let variables: Vec<Variable> = (1..=5)
            .map(|uid| Variable::new(uid, 0, 1, VarType::Bool))
            .collect();
        let link = MockLink::with_responses(vec![
            login_reply(30),
            Ok((0x8500, vec![1, 0])),
            Ok((0x8500, vec![1])),
            Ok((0x8500, vec![0])),
        ]);
        let seen = link.clone();
        let client = logged_in(link).await;

        let outcome = client.read_variables(&variables).await.unwrap();
        assert_eq!(outcome.failed_uids(), vec![3, 4, 5]);
        assert!(outcome
            .error_codes()
            .iter()
            .all(|&code| code == ErrorCode::SizeMismatch));
        assert!(outcome.readings[0].is_some());
        assert!(outcome.readings[1].is_some());
        assert_eq!(seen.call_count(), 3);
    }

    #[tokio::test]
    async fn write_encodes_value_into_request() {
        let link = MockLink::with_responses(vec![login_reply(1024), Ok((0x8510, Vec::new()))]);
        let seen = link.clone();
        let client = logged_in(link).await;
        let variable = Variable::new(100, 0, 4, VarType::Float32).writable();

        let written = client
            .write_variable(&variable, &NewValue::Float(21.5), None)
            .await
            .unwrap();
        assert_eq!(written, vec![0x41, 0xAC, 0x00, 0x00]);

        let requests = seen.requests().await;
        assert_eq!(requests[1].0, 0x0510);
        assert_eq!(
            requests[1].1,
            vec![0x80, 0x01, 0, 0, 0, 100, 0, 0, 0, 0, 0, 0, 0, 4, 0x41, 0xAC, 0x00, 0x00]
        );
    }

    #[tokio::test]
    async fn large_block_write_is_not_truncated() {
        let link = MockLink::with_responses(vec![login_reply(8192), Ok((0x8510, Vec::new()))]);
        let seen = link.clone();
        let client = logged_in(link).await;
        let block = Variable::new(500, 0, 4000, VarType::Schedule).writable();
        let data = vec![0x5A; 4000];

        client.write_raw(&block, &data).await.unwrap();

        let requests = seen.requests().await;
        assert_eq!(requests[1].0, 0x0510);
        assert_eq!(requests[1].1.len(), 2 + 12 + 4000);
        assert_eq!(&requests[1].1[14..], data.as_slice());
    }

    #[tokio::test]
    async fn write_rejection_carries_uid_and_code() {
        let link = MockLink::with_responses(vec![
            login_reply(1024),
            Ok((0xC510, 0x010Au16.to_be_bytes().to_vec())),
        ]);
        let client = logged_in(link).await;
        let variable = Variable::new(200, 0, 1, VarType::Bool).writable();

        let err = client
            .write_variable(&variable, &NewValue::Integer(1), None)
            .await
            .unwrap_err();
        match err {
            ClientError::WriteFailed { uid, status, code } => {
                assert_eq!(uid, 200);
                assert_eq!(status, 0xC510);
                assert_eq!(code, Some(ErrorCode::WriteFailed));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_only_variable_is_not_sent() {
        let link = MockLink::with_responses(vec![login_reply(1024)]);
        let seen = link.clone();
        let client = logged_in(link).await;
        let variable = Variable::new(200, 0, 1, VarType::Bool);

        let err = client
            .write_variable(&variable, &NewValue::Integer(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Codec(_)));
        assert_eq!(seen.call_count(), 1);
    }

    #[tokio::test]
    async fn logout_sends_frame_and_forgets_session() {
        let link = MockLink::with_responses(vec![login_reply(1024)]);
        let seen = link.clone();
        let mut client = SscpClient::with_config(
            link,
            credentials(),
            ClientConfig::default().with_plc_address(3),
        );
        client.login().await.unwrap();
        client.logout().await;

        assert!(client.session().is_none());
        assert_eq!(seen.closed.load(Ordering::Relaxed), 1);
        let requests = seen.requests().await;
        assert_eq!(requests.last(), Some(&(0x0101, Vec::new())));
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let link = MockLink::with_responses(vec![login_reply(1024), Err(DataLinkError::Timeout)]);
        let client = logged_in(link).await;
        let err = client
            .read_variables(&scenario_variables())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::DataLink(DataLinkError::Timeout)));
    }

    #[tokio::test]
    async fn info_reply_is_parsed() {
        let mut data = vec![0x00, 0x00, 4, b'S', b'N', b'-', b'1', 0x01, 0, 0, 0, 7, 3];
        data.extend_from_slice(b"1.2");
        let link = MockLink::with_responses(vec![Ok((0x8000, data))]);
        let client = SscpClient::new(link, credentials());

        let info = client.get_info(true).await.unwrap();
        assert_eq!(info.serial, b"SN-1");
        assert_eq!(info.serial_hex(), "534e2d31");
        assert_eq!(info.endianness, 1);
        assert_eq!(info.platform_id, [0, 0, 0, 7]);
        assert_eq!(info.runtime_version, "1.2");
        assert!(info.information.is_empty());
    }

    #[tokio::test]
    async fn binary_serial_is_kept_verbatim() {
        let mut data = vec![0x00, 0x00, 3, 0xFF, 0x00, 0xC3, 0x00, 0, 0, 0, 1, 0];
        let link = MockLink::with_responses(vec![Ok((0x8000, data))]);
        let client = SscpClient::new(link, credentials());

        let info = client.get_info(true).await.unwrap();
        assert_eq!(info.serial, vec![0xFF, 0x00, 0xC3]);
        assert_eq!(info.serial_hex(), "ff00c3");
        assert_eq!(info.endianness, 0);
        assert_eq!(info.platform_id, [0, 0, 0, 1]);
    }

    #[cfg(feature = "metrics")]
    #[tokio::test]
    async fn metrics_count_batches_and_errors() {
        let link = MockLink::with_responses(vec![
            login_reply(1024),
            error_reply(0xC500, 0x0103, 0b100),
            Ok((0x8500, vec![0x41, 0xAC, 0x00, 0x00, 0x01])),
        ]);
        let client = logged_in(link).await;
        client.read_variables(&scenario_variables()).await.unwrap();

        let metrics = client.metrics_snapshot();
        assert_eq!(metrics.requests_total, 3);
        assert_eq!(metrics.batches_total, 1);
        assert_eq!(metrics.variable_errors_total, 1);
        assert_eq!(metrics.desyncs_total, 0);
    }
}
