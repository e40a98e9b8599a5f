use std::time::Duration;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::Error;
use crate::tls::{self, TlsPolicy};

/// Upper bound on a login reply body. DSM answers with a few hundred bytes.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Reply body of one call. Owned by that call and zeroed when dropped.
pub type ResponseBuffer = Zeroizing<Vec<u8>>;

/// Network-level failure of a single login request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The HTTP client could not be set up.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// DNS resolution or TCP connect failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The deadline passed before the reply was complete.
    #[error("request timed out")]
    Timeout,

    /// The caller cancelled the call.
    #[error("request cancelled")]
    Cancelled,

    /// The server answered with an HTTP error status.
    #[error("server returned HTTP {0}")]
    Status(u16),

    /// The reply body exceeded [`MAX_RESPONSE_BYTES`].
    #[error("response body larger than {0} bytes")]
    BodyTooLarge(usize),

    /// Any other protocol or TLS failure.
    #[error("request failed: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Stable numeric code for operator logs.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::Client(_) => 2,
            Self::Connect(_) => 7,
            Self::Status(_) => 22,
            Self::Timeout => 28,
            Self::Protocol(_) => 35,
            Self::Cancelled => 42,
            Self::BodyTooLarge(_) => 63,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(error_chain(err))
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else if err.is_builder() {
            Self::Client(error_chain(err))
        } else {
            Self::Protocol(error_chain(err))
        }
    }
}

/// Render an error with its sources, without the request URL.
///
/// The URL carries the password in its query string and must not reach
/// the logs.
fn error_chain(err: reqwest::Error) -> String {
    use std::error::Error as _;

    let err = err.without_url();
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Performs the single GET of a verification attempt.
///
/// Implementations must not retain anything between calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url` and return the complete reply body.
    async fn fetch(&self, url: &str) -> Result<ResponseBuffer, TransportError>;
}

/// HTTPS transport backed by `reqwest` and rustls.
///
/// A fresh client is built for every call and dropped when the call ends,
/// so no connection or TLS session is reused between attempts.
#[derive(Debug, Clone)]
pub struct HttpsTransport {
    policy: TlsPolicy,
    timeout: Duration,
}

impl HttpsTransport {
    /// Create a transport, checking the trust material up front.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrustAnchors`] if a CA file is configured but unusable.
    pub fn new(policy: TlsPolicy, timeout: Duration) -> Result<Self, Error> {
        match &policy {
            TlsPolicy::CaFile(path) => {
                tls::client_config_from_ca_file(path)?;
            }
            TlsPolicy::Insecure => {
                tracing::warn!("TLS certificate and hostname verification are DISABLED");
            }
            TlsPolicy::SystemRoots => {}
        }
        Ok(Self { policy, timeout })
    }

    fn client(&self) -> Result<reqwest::Client, TransportError> {
        let builder = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .http1_only();

        let builder = match &self.policy {
            TlsPolicy::SystemRoots => builder,
            TlsPolicy::CaFile(path) => {
                let config = tls::client_config_from_ca_file(path)
                    .map_err(|e| TransportError::Client(e.to_string()))?;
                builder.use_preconfigured_tls(config)
            }
            TlsPolicy::Insecure => {
                tracing::warn!("Sending credentials without verifying the NAS certificate");
                builder.danger_accept_invalid_certs(true)
            }
        };

        builder
            .build()
            .map_err(TransportError::from_reqwest)
    }
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn fetch(&self, url: &str) -> Result<ResponseBuffer, TransportError> {
        let client = self.client()?;

        let mut response = client
            .get(url)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let mut body = ResponseBuffer::new(Vec::new());
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(TransportError::from_reqwest)?
        {
            if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(TransportError::BodyTooLarge(MAX_RESPONSE_BYTES));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(status = status.as_u16(), len = body.len(), "Login reply received");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let all = [
            TransportError::Client(String::new()),
            TransportError::Connect(String::new()),
            TransportError::Timeout,
            TransportError::Cancelled,
            TransportError::Status(500),
            TransportError::BodyTooLarge(1),
            TransportError::Protocol(String::new()),
        ];
        let mut codes: Vec<u32> = all.iter().map(TransportError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
        assert!(codes.iter().all(|&c| c != 0));
    }

    #[test]
    fn bad_ca_file_fails_early() {
        let err = HttpsTransport::new(
            TlsPolicy::CaFile("/nonexistent/ca.pem".into()),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, Error::TrustAnchors { .. }));
    }

    /// Answer exactly one request on a loopback port with `response`.
    async fn serve_once(response: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/webapi/auth.cgi?api=SYNO.API.Auth")
    }

    fn http_response(status: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn plain_transport() -> HttpsTransport {
        HttpsTransport::new(TlsPolicy::SystemRoots, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn reply_body_is_returned() {
        let url = serve_once(http_response("200 OK", br#"{"success":true}"#)).await;
        let body = plain_transport().fetch(&url).await.unwrap();
        assert_eq!(body.as_slice(), br#"{"success":true}"#);
    }

    #[tokio::test]
    async fn error_status_is_a_transport_error() {
        let url = serve_once(http_response("403 Forbidden", b"denied")).await;
        let err = plain_transport().fetch(&url).await.unwrap_err();
        assert_eq!(err, TransportError::Status(403));
        assert_eq!(err.code(), 22);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let body = vec![b'x'; MAX_RESPONSE_BYTES + 1];
        let url = serve_once(http_response("200 OK", &body)).await;
        let err = plain_transport().fetch(&url).await.unwrap_err();
        assert_eq!(err, TransportError::BodyTooLarge(MAX_RESPONSE_BYTES));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        // Port 9 on loopback: nothing listens, the connect is refused.
        let transport =
            HttpsTransport::new(TlsPolicy::SystemRoots, Duration::from_secs(2)).unwrap();
        let err = transport
            .fetch("https://127.0.0.1:9/webapi/auth.cgi")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connect(_) | TransportError::Timeout | TransportError::Protocol(_)
        ));
        assert_ne!(err.code(), 0);
    }
}
