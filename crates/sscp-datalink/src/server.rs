use crate::DataLinkError;
use sscp_core::encoding::{Reader, Writer};
use sscp_core::frame;
use sscp_core::pdu::{DecodedRequest, ErrorCode, ErrorResponse, FunctionCode};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};

const DEFAULT_MAX_REQUEST_LEN: usize = 2048;
const DEFAULT_MAX_REPLY_LEN: usize = 2048;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("sscp error {code}")]
    Sscp {
        code: ErrorCode,
        failed: Option<u64>,
    },
    #[error("bad credentials")]
    Unauthorized,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl ServiceError {
    pub fn sscp(code: ErrorCode, failed: Option<u64>) -> Self {
        Self::Sscp { code, failed }
    }
}

/// Per-connection login state handed to the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<String>,
    /// Largest reply data length the client announced at login.
    pub max_receive: u16,
    pub group: u8,
}

impl SessionState {
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }
}

pub trait SscpService: Send + Sync + 'static {
    /// Handle a decoded request and write the reply data into `response`.
    ///
    /// Return the number of bytes written, excluding the frame header.
    fn handle(
        &self,
        session: &mut SessionState,
        request: DecodedRequest<'_>,
        response: &mut [u8],
    ) -> Result<usize, ServiceError>;
}

impl<T> SscpService for Arc<T>
where
    T: SscpService + ?Sized,
{
    fn handle(
        &self,
        session: &mut SessionState,
        request: DecodedRequest<'_>,
        response: &mut [u8],
    ) -> Result<usize, ServiceError> {
        (**self).handle(session, request, response)
    }
}

#[cfg(feature = "metrics")]
#[derive(Debug, Default)]
pub struct ServerMetrics {
    requests_total: AtomicU64,
    responses_ok: AtomicU64,
    errors_sent: AtomicU64,
    decode_errors: AtomicU64,
}

#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerMetricsSnapshot {
    pub requests_total: u64,
    pub responses_ok: u64,
    pub errors_sent: u64,
    pub decode_errors: u64,
}

#[cfg(feature = "metrics")]
impl ServerMetrics {
    fn snapshot(&self) -> ServerMetricsSnapshot {
        ServerMetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            responses_ok: self.responses_ok.load(Ordering::Relaxed),
            errors_sent: self.errors_sent.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// TCP listener answering SSCP requests with an [`SscpService`].
pub struct SscpTcpServer<S> {
    listener: TcpListener,
    service: Arc<S>,
    max_request_len: usize,
    max_reply_len: usize,
    #[cfg(feature = "metrics")]
    metrics: Arc<ServerMetrics>,
}

impl<S: SscpService> SscpTcpServer<S> {
    pub async fn bind<A: ToSocketAddrs>(addr: A, service: S) -> Result<Self, DataLinkError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, service))
    }

    pub fn from_listener(listener: TcpListener, service: S) -> Self {
        Self {
            listener,
            service: Arc::new(service),
            max_request_len: DEFAULT_MAX_REQUEST_LEN,
            max_reply_len: DEFAULT_MAX_REPLY_LEN,
            #[cfg(feature = "metrics")]
            metrics: Arc::new(ServerMetrics::default()),
        }
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, DataLinkError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn with_max_request_len(mut self, max_request_len: usize) -> Self {
        self.max_request_len = max_request_len;
        self
    }

    pub fn with_max_reply_len(mut self, max_reply_len: usize) -> Self {
        self.max_reply_len = max_reply_len;
        self
    }

    #[cfg(feature = "metrics")]
    pub fn metrics_handle(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    #[cfg(feature = "metrics")]
    pub fn metrics_snapshot(&self) -> ServerMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn run(self) -> Result<(), DataLinkError> {
        loop {
            let (socket, peer) = self.listener.accept().await?;
            let service = Arc::clone(&self.service);
            let limits = (self.max_request_len, self.max_reply_len);
            #[cfg(feature = "metrics")]
            let metrics = Arc::clone(&self.metrics);

            tokio::spawn(async move {
                if let Err(err) = handle_connection(
                    socket,
                    service,
                    limits,
                    #[cfg(feature = "metrics")]
                    metrics,
                )
                .await
                {
                    warn!(%peer, error = %err, "sscp tcp server connection ended with error");
                }
            });
        }
    }
}

async fn handle_connection<S: SscpService>(
    mut socket: TcpStream,
    service: Arc<S>,
    (max_request_len, max_reply_len): (usize, usize),
    #[cfg(feature = "metrics")] metrics: Arc<ServerMetrics>,
) -> Result<(), DataLinkError> {
    let mut session = SessionState::default();

    loop {
        let mut header = [0u8; frame::HEADER_LEN];
        if let Err(err) = socket.read_exact(&mut header).await {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                return Ok(());
            }
            return Err(DataLinkError::Io(err));
        }

        let header = frame::RequestHeader::decode(&mut Reader::new(&header))?;
        let len = usize::from(header.length);
        if len > max_request_len {
            return Err(DataLinkError::UnexpectedLength {
                len,
                max: max_request_len,
            });
        }

        let mut request = vec![0u8; len];
        socket.read_exact(&mut request).await?;

        #[cfg(feature = "metrics")]
        metrics.requests_total.fetch_add(1, Ordering::Relaxed);

        let decoded = match DecodedRequest::decode(header.function, &request) {
            Ok(req) => req,
            Err(err) => {
                #[cfg(feature = "metrics")]
                {
                    metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                    metrics.errors_sent.fetch_add(1, Ordering::Relaxed);
                }
                debug!(function = header.function, error = %err, "undecodable sscp request");
                let status = header.function | sscp_core::pdu::function_code::ERROR_BITS;
                send_reply(&mut socket, header.address, status, &[]).await?;
                continue;
            }
        };

        let function = decoded.function_code();
        debug!(
            address = header.address,
            function = function.as_u16(),
            len,
            "received sscp request"
        );

        let mut response = vec![0u8; max_reply_len];
        let result = service.handle(&mut session, decoded, &mut response);

        if function == FunctionCode::Logout {
            // Logout is never answered.
            return Ok(());
        }

        match result {
            Ok(response_len) if response_len <= max_reply_len => {
                #[cfg(feature = "metrics")]
                metrics.responses_ok.fetch_add(1, Ordering::Relaxed);

                send_reply(
                    &mut socket,
                    header.address,
                    function.success_status(),
                    &response[..response_len],
                )
                .await?;
            }
            Ok(_) => {
                #[cfg(feature = "metrics")]
                metrics.errors_sent.fetch_add(1, Ordering::Relaxed);
                send_error(
                    &mut socket,
                    header.address,
                    function,
                    ErrorResponse {
                        code: ErrorCode::DataTooLong,
                        failed: None,
                    },
                )
                .await?;
            }
            Err(ServiceError::Sscp { code, failed }) => {
                #[cfg(feature = "metrics")]
                metrics.errors_sent.fetch_add(1, Ordering::Relaxed);
                send_error(
                    &mut socket,
                    header.address,
                    function,
                    ErrorResponse { code, failed },
                )
                .await?;
            }
            Err(err) => {
                #[cfg(feature = "metrics")]
                metrics.errors_sent.fetch_add(1, Ordering::Relaxed);
                debug!(function = function.as_u16(), error = %err, "sscp request rejected");
                send_reply(&mut socket, header.address, function.error_status(), &[]).await?;
            }
        }
    }
}

async fn send_error(
    socket: &mut TcpStream,
    address: u8,
    function: FunctionCode,
    error: ErrorResponse,
) -> Result<(), DataLinkError> {
    let mut data = [0u8; 10];
    let mut w = Writer::new(&mut data);
    error.encode(&mut w)?;
    let len = w.position();
    send_reply(socket, address, function.error_status(), &data[..len]).await
}

async fn send_reply(
    socket: &mut TcpStream,
    echo: u8,
    status: u16,
    data: &[u8],
) -> Result<(), DataLinkError> {
    let mut out = vec![0u8; frame::HEADER_LEN + data.len()];
    let mut w = Writer::new(&mut out);
    frame::encode_reply(&mut w, echo, status, data)?;
    socket.write_all(&out).await?;
    Ok(())
}
