use crate::{ClientConfig, ClientError, Credentials, DeviceInfo, ReadOutcome, Session, SscpClient};
use sscp_core::variable::{NewValue, Value, Variable};
use sscp_datalink::{DataLinkError, SscpTcpTransport, TransportConfig};
use thiserror::Error;
use tokio::runtime::Runtime;

#[derive(Debug, Error)]
pub enum SyncClientError {
    #[error("runtime init error: {0}")]
    RuntimeInit(std::io::Error),
    #[error("datalink error: {0}")]
    DataLink(#[from] DataLinkError),
    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

/// Blocking facade over [`SscpClient`] with its own tokio runtime.
pub struct SyncSscpTcpClient {
    runtime: Runtime,
    client: SscpClient<SscpTcpTransport>,
}

impl SyncSscpTcpClient {
    pub fn connect(addr: &str, credentials: Credentials) -> Result<Self, SyncClientError> {
        Self::connect_with_config(
            addr,
            credentials,
            ClientConfig::default(),
            TransportConfig::default(),
        )
    }

    pub fn connect_with_config(
        addr: &str,
        credentials: Credentials,
        config: ClientConfig,
        transport: TransportConfig,
    ) -> Result<Self, SyncClientError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(SyncClientError::RuntimeInit)?;
        let link = runtime.block_on(SscpTcpTransport::connect_with_config(addr, transport))?;
        let client = SscpClient::with_config(link, credentials, config);
        Ok(Self { runtime, client })
    }

    pub fn config(&self) -> ClientConfig {
        self.client.config()
    }

    pub fn login(&mut self) -> Result<Session, SyncClientError> {
        self.runtime
            .block_on(self.client.login())
            .cloned()
            .map_err(SyncClientError::Client)
    }

    pub fn logout(&mut self) {
        self.runtime.block_on(self.client.logout());
    }

    pub fn get_info(&self, with_serial: bool) -> Result<DeviceInfo, SyncClientError> {
        self.runtime
            .block_on(self.client.get_info(with_serial))
            .map_err(SyncClientError::Client)
    }

    pub fn read_variables(&self, variables: &[Variable]) -> Result<ReadOutcome, SyncClientError> {
        self.runtime
            .block_on(self.client.read_variables(variables))
            .map_err(SyncClientError::Client)
    }

    pub fn write_variable(
        &self,
        variable: &Variable,
        new: &NewValue,
        previous: Option<&Value>,
    ) -> Result<Vec<u8>, SyncClientError> {
        self.runtime
            .block_on(self.client.write_variable(variable, new, previous))
            .map_err(SyncClientError::Client)
    }
}
