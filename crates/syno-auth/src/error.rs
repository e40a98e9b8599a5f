use std::path::PathBuf;

/// Errors raised before any network activity takes place.
///
/// Network-level failures are never surfaced through this type; they are
/// folded into [`crate::VerificationOutcome::TransportError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required module argument or config key is absent or empty.
    #[error("missing required setting `{0}`")]
    MissingConfiguration(&'static str),

    /// A setting is present but unusable.
    #[error("invalid setting `{key}`: {reason}")]
    InvalidConfiguration { key: &'static str, reason: String },

    /// The CA bundle could not be turned into trust anchors.
    #[error("failed to load trust anchors from {}: {reason}", path.display())]
    TrustAnchors { path: PathBuf, reason: String },

    /// The host could not supply the secret (no conversation, no answer).
    #[error("host conversation failed: {0}")]
    HostConversationFailure(String),
}

impl Error {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            key,
            reason: reason.into(),
        }
    }
}
