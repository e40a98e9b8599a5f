use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::args::{flag, resolve};
use crate::error::Error;

/// Default config directory under `$XDG_CONFIG_HOME`.
const CONFIG_DIR: &str = "syno-auth";
/// Default config file name.
const CONFIG_FILE: &str = "config.toml";

/// Default whole-request deadline in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// How a login reply is judged once it has arrived with a non-empty body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseCheck {
    /// Accept when the raw body contains `"success":true`.
    #[default]
    Marker,
    /// Accept when the body is a JSON object whose `success` field is `true`.
    Json,
}

impl std::str::FromStr for ResponseCheck {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "marker" => Ok(Self::Marker),
            "json" => Ok(Self::Json),
            other => Err(format!("expected `marker` or `json`, got `{other}`")),
        }
    }
}

/// Verifier settings, loaded from TOML or from PAM module arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// NAS base address, e.g. `https://nas.local:5001`.
    pub url: String,

    /// PEM bundle used as the only trust anchors. System roots if absent.
    pub cafile: Option<PathBuf>,

    /// Skip certificate and hostname verification.
    pub insecure: bool,

    /// Deadline for the whole request (connect, TLS, headers and body).
    pub timeout_secs: u64,

    /// Reply classification mode.
    pub response_check: ResponseCheck,

    /// Emit debug-level diagnostics.
    pub verbose: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            cafile: None,
            insecure: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            response_check: ResponseCheck::Marker,
            verbose: false,
        }
    }
}

impl VerifierConfig {
    /// Build the settings from a PAM-style `key=value` argument list.
    ///
    /// `url` is required. `cafile`, `timeout` and `check` take values;
    /// `insecure`, `debug` and `verbose` are flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfiguration`] if `url` is absent or empty
    /// and [`Error::InvalidConfiguration`] for unparsable values.
    pub fn from_module_args<S: AsRef<str>>(args: &[S]) -> Result<Self, Error> {
        let url = resolve("url", args)
            .filter(|url| !url.is_empty())
            .ok_or(Error::MissingConfiguration("url"))?;

        let timeout_secs = match resolve("timeout", args) {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| Error::invalid("timeout", format!("`{raw}`: {e}")))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let response_check = match resolve("check", args) {
            Some(raw) => raw.parse().map_err(|e| Error::invalid("check", e))?,
            None => ResponseCheck::Marker,
        };

        for arg in args {
            let key = arg.as_ref().split('=').next().unwrap_or_default();
            if !KNOWN_ARGS.contains(&key) {
                tracing::debug!(argument = key, "Ignoring unknown module argument");
            }
        }

        let config = Self {
            url: url.to_string(),
            cafile: resolve("cafile", args)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            insecure: flag("insecure", args),
            timeout_secs,
            response_check,
            verbose: flag("debug", args) || flag("verbose", args),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that cannot be expressed through types alone.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty `url` or a zero timeout.
    pub fn validate(&self) -> Result<(), Error> {
        if self.url.is_empty() {
            return Err(Error::MissingConfiguration("url"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::invalid("timeout", "must be at least one second"));
        }
        Ok(())
    }

    /// Request deadline as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

const KNOWN_ARGS: &[&str] = &[
    "url", "cafile", "timeout", "check", "insecure", "debug", "verbose",
];

/// Resolve the default config file path.
///
/// Returns `$XDG_CONFIG_HOME/syno-auth/config.toml` or
/// `~/.config/syno-auth/config.toml`.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

/// Load verifier settings from a TOML file.
///
/// If `path` is `None`, reads from the default location.
/// Returns the default configuration if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load(path: Option<&Path>) -> Result<VerifierConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    if !path.exists() {
        tracing::debug!(?path, "Config file not found, using defaults");
        return Ok(VerifierConfig::default());
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;

    let config: VerifierConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config: {}", path.display()))?;

    tracing::info!(?path, "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_args_minimal() {
        let cfg = VerifierConfig::from_module_args(&["url=https://nas:5001"]).unwrap();
        assert_eq!(cfg.url, "https://nas:5001");
        assert_eq!(cfg.cafile, None);
        assert!(!cfg.insecure);
        assert!(!cfg.verbose);
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.response_check, ResponseCheck::Marker);
    }

    #[test]
    fn module_args_full() {
        let cfg = VerifierConfig::from_module_args(&[
            "debug",
            "url=https://nas:5001",
            "cafile=/etc/ssl/nas.pem",
            "timeout=12",
            "check=json",
            "insecure=yes",
            "something=else",
        ])
        .unwrap();
        assert_eq!(cfg.cafile, Some(PathBuf::from("/etc/ssl/nas.pem")));
        assert_eq!(cfg.timeout(), Duration::from_secs(12));
        assert_eq!(cfg.response_check, ResponseCheck::Json);
        assert!(cfg.insecure);
        assert!(cfg.verbose);
    }

    #[test]
    fn missing_url_is_rejected() {
        let err = VerifierConfig::from_module_args(&["cafile=/x.pem"]).unwrap_err();
        assert!(matches!(err, Error::MissingConfiguration("url")));

        let err = VerifierConfig::from_module_args(&["url="]).unwrap_err();
        assert!(matches!(err, Error::MissingConfiguration("url")));
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = VerifierConfig::from_module_args(&["url=https://nas", "timeout=soon"])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidConfiguration { key: "timeout", .. }
        ));

        let err = VerifierConfig::from_module_args(&["url=https://nas", "timeout=0"])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidConfiguration { key: "timeout", .. }
        ));

        let err =
            VerifierConfig::from_module_args(&["url=https://nas", "check=regex"]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { key: "check", .. }));
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg, VerifierConfig::default());
    }

    #[test]
    fn load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "url = \"https://nas.lan:5001\"\ncafile = \"/etc/nas-ca.pem\"\nresponse_check = \"json\"\n",
        )
        .unwrap();

        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.url, "https://nas.lan:5001");
        assert_eq!(cfg.cafile, Some(PathBuf::from("/etc/nas-ca.pem")));
        assert_eq!(cfg.response_check, ResponseCheck::Json);
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timeout_secs = \"five\"").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
