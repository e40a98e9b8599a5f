use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::Url;

use crate::config::{ResponseCheck, VerifierConfig, DEFAULT_TIMEOUT_SECS};
use crate::credential::{Credential, WipeOnDrop};
use crate::error::Error;
use crate::login;
use crate::tls::TlsPolicy;
use crate::transport::{HttpsTransport, ResponseBuffer, Transport, TransportError};

/// Result of one login attempt against the NAS.
///
/// Only [`VerificationOutcome::Success`] means the credentials are good.
/// The other variants tell operators which stage rejected the attempt and
/// must not be shown to the end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The NAS accepted the credentials.
    Success,
    /// The request went through but the reply had no body.
    EmptyResponse,
    /// The reply did not report success.
    Denied,
    /// The request did not complete.
    TransportError(TransportError),
}

impl VerificationOutcome {
    /// True for [`VerificationOutcome::Success`] only.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Diagnostic code: 0 for success, 1 for an empty reply, 2 for a
    /// denial, the transport code otherwise.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::Success => 0,
            Self::EmptyResponse => 1,
            Self::Denied => 2,
            Self::TransportError(e) => e.code(),
        }
    }

    /// Reduce a fetch result to an outcome.
    ///
    /// Transport failure first, then empty body, then the success check.
    #[must_use]
    pub fn classify(result: &Result<ResponseBuffer, TransportError>, check: ResponseCheck) -> Self {
        match result {
            Err(e) => Self::TransportError(e.clone()),
            Ok(body) if body.is_empty() => Self::EmptyResponse,
            Ok(body) if !login::is_success(body, check) => Self::Denied,
            Ok(_) => Self::Success,
        }
    }
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::EmptyResponse => write!(f, "empty response"),
            Self::Denied => write!(f, "denied"),
            Self::TransportError(e) => write!(f, "transport error {}: {e}", e.code()),
        }
    }
}

/// Checks credentials against one NAS.
///
/// Holds only immutable settings, so a single verifier can serve
/// concurrent calls; each call owns its own reply buffer.
#[derive(Debug, Clone)]
pub struct Verifier<T = HttpsTransport> {
    base_url: Url,
    check: ResponseCheck,
    transport: T,
}

impl Verifier<HttpsTransport> {
    /// Build a verifier that talks HTTPS as described by `config`.
    ///
    /// # Errors
    ///
    /// Fails without touching the network if the URL is missing or
    /// invalid, the timeout is zero, or the CA file is unusable.
    pub fn from_config(config: &VerifierConfig) -> Result<Self, Error> {
        config.validate()?;
        let policy = TlsPolicy::from_options(config.cafile.as_deref(), config.insecure);
        let transport = HttpsTransport::new(policy, config.timeout())?;
        Self::with_transport(&config.url, transport).map(|v| v.with_check(config.response_check))
    }
}

impl<T: Transport> Verifier<T> {
    /// Build a verifier around an arbitrary transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfiguration`] for an empty base URL and
    /// [`Error::InvalidConfiguration`] for an unusable one.
    pub fn with_transport(base_url: &str, transport: T) -> Result<Self, Error> {
        Ok(Self {
            base_url: login::parse_base_url(base_url)?,
            check: ResponseCheck::Marker,
            transport,
        })
    }

    /// Use a different reply classification mode.
    #[must_use]
    pub fn with_check(mut self, check: ResponseCheck) -> Self {
        self.check = check;
        self
    }

    /// Base address of the NAS.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Run one login attempt.
    ///
    /// The credential's secret is wiped before this returns, whatever the
    /// outcome.
    pub async fn verify(&self, credential: &mut Credential) -> VerificationOutcome {
        self.verify_until(credential, std::future::pending::<()>())
            .await
    }

    /// Run one login attempt, giving up when `cancel` completes.
    ///
    /// Cancellation yields [`TransportError::Cancelled`]. The secret is
    /// wiped on every path, including cancellation.
    pub async fn verify_until<F>(&self, credential: &mut Credential, cancel: F) -> VerificationOutcome
    where
        F: Future<Output = ()>,
    {
        let credential = WipeOnDrop::new(credential);
        let username = credential.username().to_string();

        let result = {
            let url = login::login_url(&self.base_url, credential.username(), credential.secret());
            drop(credential);

            tokio::select! {
                result = self.transport.fetch(&url) => result,
                () = cancel => Err(TransportError::Cancelled),
            }
        };

        let outcome = VerificationOutcome::classify(&result, self.check);
        self.log_outcome(&username, &result, &outcome);
        outcome
    }

    /// Run one login attempt on a current-thread runtime created for it.
    ///
    /// Intended for synchronous hosts such as PAM. When the caller already
    /// sits inside a tokio runtime (for example a `spawn_blocking` task),
    /// the attempt runs on a scoped helper thread instead.
    pub fn verify_blocking(&self, credential: &mut Credential) -> VerificationOutcome {
        if tokio::runtime::Handle::try_current().is_err() {
            return self.run_to_completion(credential);
        }

        let joined = std::thread::scope(|scope| {
            scope
                .spawn(|| self.run_to_completion(&mut *credential))
                .join()
        });
        joined.unwrap_or_else(|_| {
            credential.wipe();
            tracing::error!("Verification thread panicked");
            VerificationOutcome::TransportError(TransportError::Client(
                "verification thread panicked".to_string(),
            ))
        })
    }

    fn run_to_completion(&self, credential: &mut Credential) -> VerificationOutcome {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                credential.wipe();
                tracing::error!("Failed to start runtime for verification: {e}");
                return VerificationOutcome::TransportError(TransportError::Client(e.to_string()));
            }
        };

        runtime.block_on(self.verify(credential))
    }

    fn log_outcome(
        &self,
        username: &str,
        result: &Result<ResponseBuffer, TransportError>,
        outcome: &VerificationOutcome,
    ) {
        let nas = self.base_url.as_str();
        match (outcome, result) {
            (VerificationOutcome::Success, _) => {
                tracing::info!(username, nas, "NAS accepted credentials");
            }
            (VerificationOutcome::EmptyResponse, _) => {
                tracing::warn!(username, nas, code = outcome.code(), "NAS returned an empty reply");
            }
            (VerificationOutcome::Denied, Ok(body)) => match login::api_error_code(body) {
                Some(api_code) => tracing::info!(
                    username,
                    nas,
                    api_code,
                    reason = login::describe_api_error(api_code),
                    "NAS denied credentials"
                ),
                None => tracing::info!(username, nas, "NAS denied credentials"),
            },
            (VerificationOutcome::TransportError(e), _) => {
                tracing::warn!(username, nas, code = e.code(), "Login request failed: {e}");
            }
            (VerificationOutcome::Denied, Err(_)) => {}
        }
    }
}

/// One-shot verification with default settings.
///
/// Builds an HTTPS verifier for `base_url` (trusting only `ca_file` when
/// given), runs a single attempt and wipes the secret.
///
/// # Errors
///
/// Returns a configuration error, before any network I/O, if `base_url` is
/// empty or invalid or `ca_file` is unusable. The secret is wiped in that
/// case too.
pub fn verify(
    base_url: &str,
    credential: &mut Credential,
    ca_file: Option<&Path>,
) -> Result<VerificationOutcome, Error> {
    let verifier = if base_url.is_empty() {
        Err(Error::MissingConfiguration("url"))
    } else {
        let policy = TlsPolicy::from_options(ca_file, false);
        HttpsTransport::new(policy, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .and_then(|transport| Verifier::with_transport(base_url, transport))
    };

    match verifier {
        Ok(verifier) => Ok(verifier.verify_blocking(credential)),
        Err(e) => {
            credential.wipe();
            Err(e)
        }
    }
}
