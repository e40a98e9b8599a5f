use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use syno_auth::{config, Credential, ResponseCheck, Verifier, VerifierConfig, PASSWORD_PROMPT};

mod prompt;

/// Check a username and password against a Synology NAS.
///
/// Performs exactly one `SYNO.API.Auth` login, the same request the PAM
/// module makes, and prints how it ended. Exit status is 0 when the NAS
/// accepts the credentials, 1 when it does not and 2 when the settings
/// are unusable.
#[derive(Parser, Debug)]
#[command(name = "syno-auth-check", version, about)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// NAS base URL, e.g. `https://nas.local:5001`.
    #[arg(long)]
    url: Option<String>,

    /// PEM bundle to trust instead of the built-in roots.
    #[arg(long)]
    cafile: Option<PathBuf>,

    /// Skip certificate and hostname verification.
    #[arg(long)]
    insecure: bool,

    /// Request deadline in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Reply classification: `marker` or `json`.
    #[arg(long)]
    check: Option<ResponseCheck>,

    /// Account to log in as.
    #[arg(long, short)]
    user: String,

    /// Log at debug level.
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    /// Overlay command-line flags on the file configuration.
    fn apply(&self, mut cfg: VerifierConfig) -> VerifierConfig {
        if let Some(url) = &self.url {
            cfg.url.clone_from(url);
        }
        if let Some(cafile) = &self.cafile {
            cfg.cafile = Some(cafile.clone());
        }
        if let Some(timeout) = self.timeout {
            cfg.timeout_secs = timeout;
        }
        if let Some(check) = self.check {
            cfg.response_check = check;
        }
        cfg.insecure |= self.insecure;
        cfg.verbose |= self.verbose;
        cfg
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = match config::load(cli.config.as_deref()) {
        Ok(cfg) => cli.apply(cfg),
        Err(e) => {
            tracing::error!("{e:#}");
            return Ok(ExitCode::from(2));
        }
    };

    let verifier = match Verifier::from_config(&cfg) {
        Ok(verifier) => verifier,
        Err(e) => {
            tracing::error!("{e}");
            return Ok(ExitCode::from(2));
        }
    };

    tracing::info!(
        url = %verifier.base_url(),
        user = %cli.user,
        insecure = cfg.insecure,
        timeout = cfg.timeout_secs,
        "Checking credentials"
    );

    let mut secret = prompt::read_secret(PASSWORD_PROMPT)?;
    let mut credential = Credential::new(cli.user.as_str(), std::mem::take(&mut *secret));

    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        tracing::info!("Received SIGINT, cancelling");
    };
    let outcome = verifier.verify_until(&mut credential, cancel).await;

    println!("{outcome}");
    let code = if outcome.is_accepted() { 0 } else { 1 };
    Ok(ExitCode::from(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_file_settings() {
        let cli = Cli::try_parse_from([
            "syno-auth-check",
            "--url",
            "https://other:5001",
            "--timeout",
            "9",
            "--check",
            "json",
            "--insecure",
            "-u",
            "alice",
        ])
        .unwrap();

        let file = VerifierConfig {
            url: "https://nas:5001".to_string(),
            cafile: Some(PathBuf::from("/etc/nas.pem")),
            ..VerifierConfig::default()
        };
        let cfg = cli.apply(file);

        assert_eq!(cfg.url, "https://other:5001");
        assert_eq!(cfg.cafile, Some(PathBuf::from("/etc/nas.pem")));
        assert_eq!(cfg.timeout_secs, 9);
        assert_eq!(cfg.response_check, ResponseCheck::Json);
        assert!(cfg.insecure);
        assert!(!cfg.verbose);
    }

    #[test]
    fn user_is_required() {
        assert!(Cli::try_parse_from(["syno-auth-check", "--url", "https://nas"]).is_err());
    }

    #[test]
    fn unknown_check_mode_is_rejected() {
        assert!(Cli::try_parse_from(["syno-auth-check", "-u", "a", "--check", "regex"]).is_err());
    }
}
