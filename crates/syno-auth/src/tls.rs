use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};

use crate::error::Error;

/// How the server certificate is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Verify against the bundled web PKI roots.
    SystemRoots,
    /// Verify against the certificates in this PEM file only.
    CaFile(PathBuf),
    /// No certificate or hostname verification at all.
    Insecure,
}

impl TlsPolicy {
    /// Pick the policy for a `cafile` / `insecure` pair.
    ///
    /// `insecure` wins over `cafile`; the CA file is then ignored with a
    /// warning.
    #[must_use]
    pub fn from_options(cafile: Option<&Path>, insecure: bool) -> Self {
        match (cafile, insecure) {
            (Some(path), true) => {
                tracing::warn!(?path, "`insecure` is set, ignoring the CA file");
                Self::Insecure
            }
            (None, true) => Self::Insecure,
            (Some(path), false) => Self::CaFile(path.to_path_buf()),
            (None, false) => Self::SystemRoots,
        }
    }
}

/// Read every certificate from a PEM bundle.
///
/// # Errors
///
/// Returns [`Error::TrustAnchors`] if the file cannot be read, is not PEM,
/// or holds no certificate.
pub fn load_ca_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let trust_err = |reason: String| Error::TrustAnchors {
        path: path.to_path_buf(),
        reason,
    };

    let pem = std::fs::read(path).map_err(|e| trust_err(e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| trust_err(format!("malformed PEM: {e}")))?;

    if certs.is_empty() {
        return Err(trust_err("no certificates found".to_string()));
    }

    tracing::debug!(?path, count = certs.len(), "Loaded CA certificates");
    Ok(certs)
}

/// Build a rustls client config that trusts only the given CA bundle.
///
/// # Errors
///
/// Returns [`Error::TrustAnchors`] if the bundle cannot be loaded or none of
/// its certificates is a usable trust anchor.
pub fn client_config_from_ca_file(path: &Path) -> Result<ClientConfig, Error> {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(load_ca_certs(path)?);
    if added == 0 {
        return Err(Error::TrustAnchors {
            path: path.to_path_buf(),
            reason: format!("none of the {ignored} certificates is a valid trust anchor"),
        });
    }
    if ignored > 0 {
        tracing::warn!(?path, ignored, "Some CA certificates could not be parsed");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::TrustAnchors {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(config)
}
