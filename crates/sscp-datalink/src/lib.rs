//! Async SSCP transport abstraction layer.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use sscp_core::encoding::{Reader, Writer};
use sscp_core::frame;
use sscp_core::{DecodeError, EncodeError};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace};

pub mod server;
pub mod sim;
pub use server::{ServiceError, SessionState, SscpService, SscpTcpServer};
pub use sim::InMemorySscpService;

/// Default TCP port of the SSCP service on Domat PLCs.
pub const DEFAULT_PORT: u16 = 12346;
/// Largest reply data length accepted by default.
pub const DEFAULT_MAX_REPLY_LEN: usize = 2048;

#[derive(Debug, Error)]
pub enum DataLinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("not connected")]
    NotConnected,
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("request timed out")]
    Timeout,
    #[error("unexpected reply length {len} (max {max})")]
    UnexpectedLength { len: usize, max: usize },
    #[error("response buffer too small (needed {needed}, available {available})")]
    ResponseBufferTooSmall { needed: usize, available: usize },
}

/// Header fields of a received reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    /// Reply data length written to the response buffer.
    pub len: usize,
}

#[async_trait]
pub trait DataLink: Send + Sync {
    /// Send one request frame and write the reply data into `response`.
    async fn exchange(
        &self,
        address: u8,
        function: u16,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<Reply, DataLinkError>;

    /// Send one request frame without waiting for a reply, then close the link.
    ///
    /// Never fails; delivery is best effort.
    async fn send_and_close(&self, address: u8, function: u16, request: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Bound on each phase of a reply (header, then data).
    pub data_timeout: Duration,
    pub max_reply_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            data_timeout: Duration::from_secs(10),
            max_reply_len: DEFAULT_MAX_REPLY_LEN,
        }
    }
}

impl TransportConfig {
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_data_timeout(mut self, data_timeout: Duration) -> Self {
        self.data_timeout = data_timeout;
        self
    }

    pub fn with_max_reply_len(mut self, max_reply_len: usize) -> Self {
        self.max_reply_len = max_reply_len;
        self
    }
}

/// One TCP session to a PLC. Any I/O failure drops the socket for good.
#[derive(Debug)]
pub struct SscpTcpTransport {
    stream: Mutex<Option<TcpStream>>,
    config: TransportConfig,
}

impl SscpTcpTransport {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, DataLinkError> {
        Self::connect_with_config(addr, TransportConfig::default()).await
    }

    pub async fn connect_with_config<A: ToSocketAddrs>(
        addr: A,
        config: TransportConfig,
    ) -> Result<Self, DataLinkError> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| DataLinkError::ConnectTimeout)??;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream, config))
    }

    pub fn from_stream(stream: TcpStream, config: TransportConfig) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
            config,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    pub async fn close(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
    }
}

fn encode_frame(address: u8, function: u16, request: &[u8]) -> Result<Vec<u8>, DataLinkError> {
    let mut req_frame = vec![0u8; frame::HEADER_LEN + request.len()];
    let mut writer = Writer::new(&mut req_frame);
    frame::encode_request(&mut writer, address, function, request)?;
    Ok(req_frame)
}

async fn read_exact_or_connection_closed(
    stream: &mut TcpStream,
    buf: &mut [u8],
) -> Result<(), DataLinkError> {
    if let Err(err) = stream.read_exact(buf).await {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(DataLinkError::ConnectionClosed);
        }
        return Err(DataLinkError::Io(err));
    }
    Ok(())
}

async fn exchange_on(
    stream: &mut TcpStream,
    config: &TransportConfig,
    req_frame: &[u8],
    response: &mut [u8],
) -> Result<Reply, DataLinkError> {
    timeout(config.data_timeout, stream.write_all(req_frame))
        .await
        .map_err(|_| DataLinkError::Timeout)??;

    let mut header = [0u8; frame::HEADER_LEN];
    timeout(
        config.data_timeout,
        read_exact_or_connection_closed(stream, &mut header),
    )
    .await
    .map_err(|_| DataLinkError::Timeout)??;
    let header = frame::ReplyHeader::decode(&mut Reader::new(&header))?;

    let len = usize::from(header.length);
    if len > config.max_reply_len {
        return Err(DataLinkError::UnexpectedLength {
            len,
            max: config.max_reply_len,
        });
    }
    if len > response.len() {
        return Err(DataLinkError::ResponseBufferTooSmall {
            needed: len,
            available: response.len(),
        });
    }

    timeout(
        config.data_timeout,
        read_exact_or_connection_closed(stream, &mut response[..len]),
    )
    .await
    .map_err(|_| DataLinkError::Timeout)??;

    trace!(
        echo = header.echo,
        status = header.status,
        len,
        "received sscp reply"
    );
    Ok(Reply {
        status: header.status,
        len,
    })
}

#[async_trait]
impl DataLink for SscpTcpTransport {
    async fn exchange(
        &self,
        address: u8,
        function: u16,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<Reply, DataLinkError> {
        let req_frame = encode_frame(address, function, request)?;

        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(DataLinkError::NotConnected)?;
        trace!(
            address,
            function,
            len = request.len(),
            "sending sscp request"
        );
        let result = exchange_on(stream, &self.config, &req_frame, response).await;
        if let Err(err) = &result {
            debug!(function, error = %err, "closing sscp connection after failed exchange");
            *guard = None;
        }
        result
    }

    async fn send_and_close(&self, address: u8, function: u16, request: &[u8]) {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return;
        };
        match encode_frame(address, function, request) {
            Ok(req_frame) => {
                let sent = timeout(self.config.data_timeout, stream.write_all(&req_frame)).await;
                if !matches!(sent, Ok(Ok(()))) {
                    debug!(function, "request before close was not delivered");
                }
            }
            Err(err) => debug!(function, error = %err, "failed to encode request before close"),
        }
        let _ = stream.shutdown().await;
    }
}
