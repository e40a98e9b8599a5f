//! Linux-PAM service module that checks passwords against a Synology NAS.
//!
//! ```text
//! auth required pam_synology.so url=https://nas.local:5001 cafile=/etc/ssl/nas-ca.pem
//! ```
//!
//! Only `pam_sm_authenticate` does real work. The account, credential and
//! session hooks succeed without doing anything so the module can sit in
//! every management group of a service file.

#[cfg(not(target_os = "linux"))]
compile_error!("pam_synology is a Linux-PAM module and only builds for Linux targets");

mod handle;
mod sys;

use std::ffi::CStr;
use std::panic::{catch_unwind, AssertUnwindSafe};

use nix::libc::{c_char, c_int};
use syno_auth::{Credential, VerificationOutcome, Verifier, VerifierConfig, PASSWORD_PROMPT};

use handle::{Handle, SessionContext};

/// Why `pam_sm_authenticate` refused a user.
#[derive(Debug, thiserror::Error)]
enum AuthFailure {
    #[error("could not determine the user (PAM status {0})")]
    User(c_int),

    #[error("module configuration: {0}")]
    Config(#[source] syno_auth::Error),

    #[error("password prompt: {0}")]
    Conversation(#[source] syno_auth::Error),

    #[error("empty password not allowed")]
    NullAuthtok,

    #[error("NAS rejected the attempt: {0}")]
    Rejected(VerificationOutcome),
}

impl AuthFailure {
    fn pam_code(&self) -> c_int {
        match self {
            Self::User(rc) => *rc,
            Self::Config(_) => sys::PAM_AUTHINFO_UNAVAIL,
            Self::Conversation(_) => sys::PAM_CONV_ERR,
            Self::NullAuthtok | Self::Rejected(_) => sys::PAM_AUTH_ERR,
        }
    }
}

/// Copy the module arguments out of the C `argv` array.
///
/// # Safety
///
/// `argv` must point to `argc` valid NUL-terminated strings (or be null).
unsafe fn module_args(argc: c_int, argv: *const *const c_char) -> Vec<String> {
    let Ok(argc) = usize::try_from(argc) else {
        return Vec::new();
    };
    if argv.is_null() || argc == 0 {
        return Vec::new();
    }
    unsafe { std::slice::from_raw_parts(argv, argc) }
        .iter()
        .filter(|arg| !arg.is_null())
        .map(|&arg| unsafe { CStr::from_ptr(arg) }.to_string_lossy().into_owned())
        .collect()
}

/// Install a stderr subscriber once per process.
fn init_logging(flags: c_int, args: &[String]) {
    if flags & sys::PAM_SILENT != 0 {
        return;
    }
    let level = if syno_auth::flag("debug", args) || syno_auth::flag("verbose", args) {
        "debug"
    } else {
        "warn"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

fn authenticate(handle: &Handle, flags: c_int, args: &[String]) -> Result<(), AuthFailure> {
    let username = handle.user().map_err(AuthFailure::User)?;
    tracing::debug!(username = %username, "Authenticating");

    let config = VerifierConfig::from_module_args(args).map_err(AuthFailure::Config)?;
    tracing::debug!(url = %config.url, cafile = ?config.cafile, "Module configuration");

    if let Err(rc) = handle.set_context(SessionContext {
        verbose: config.verbose,
    }) {
        tracing::error!(rc, "Failed to store the session context");
    }

    let verifier = Verifier::from_config(&config).map_err(AuthFailure::Config)?;

    let secret = handle
        .prompt_secret(PASSWORD_PROMPT)
        .map_err(AuthFailure::Conversation)?;
    let mut credential = Credential::new(username, secret);

    if flags & sys::PAM_DISALLOW_NULL_AUTHTOK != 0 && credential.secret().is_empty() {
        return Err(AuthFailure::NullAuthtok);
    }

    match verifier.verify_blocking(&mut credential) {
        VerificationOutcome::Success => Ok(()),
        outcome => Err(AuthFailure::Rejected(outcome)),
    }
}

/// Shared body of the hooks that have nothing to do.
fn advisory(pamh: *mut sys::PamHandle, hook: &str) -> c_int {
    // SAFETY: `pamh` comes straight from PAM for the current hook call.
    let Some(handle) = (unsafe { Handle::from_raw(pamh) }) else {
        return sys::PAM_SYSTEM_ERR;
    };
    match handle.context() {
        None => tracing::warn!(hook, "Called without a session context"),
        Some(ctx) if ctx.verbose => tracing::info!(hook, "Called but not implemented"),
        Some(_) => {}
    }
    sys::PAM_SUCCESS
}

/// Authenticate the PAM user against the NAS named by `url=`.
///
/// # Safety
///
/// Must only be called by libpam with a live handle and argument vector.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_authenticate(
    pamh: *mut sys::PamHandle,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    let args = unsafe { module_args(argc, argv) };
    init_logging(flags, &args);

    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `pamh` comes straight from PAM for this hook call.
        let Some(handle) = (unsafe { Handle::from_raw(pamh) }) else {
            return sys::PAM_SYSTEM_ERR;
        };
        match authenticate(&handle, flags, &args) {
            Ok(()) => sys::PAM_SUCCESS,
            Err(failure) => {
                tracing::warn!(code = failure.pam_code(), "Authentication failed: {failure}");
                failure.pam_code()
            }
        }
    }));

    result.unwrap_or_else(|_| {
        tracing::error!("pam_sm_authenticate panicked");
        sys::PAM_AUTH_ERR
    })
}

/// # Safety
///
/// Must only be called by libpam with a live handle.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_setcred(
    pamh: *mut sys::PamHandle,
    _flags: c_int,
    _argc: c_int,
    _argv: *const *const c_char,
) -> c_int {
    advisory(pamh, "setcred")
}

/// # Safety
///
/// Must only be called by libpam with a live handle.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_acct_mgmt(
    pamh: *mut sys::PamHandle,
    _flags: c_int,
    _argc: c_int,
    _argv: *const *const c_char,
) -> c_int {
    advisory(pamh, "acct_mgmt")
}

/// # Safety
///
/// Must only be called by libpam with a live handle.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_open_session(
    pamh: *mut sys::PamHandle,
    _flags: c_int,
    _argc: c_int,
    _argv: *const *const c_char,
) -> c_int {
    advisory(pamh, "open_session")
}

/// # Safety
///
/// Must only be called by libpam with a live handle.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_close_session(
    pamh: *mut sys::PamHandle,
    _flags: c_int,
    _argc: c_int,
    _argv: *const *const c_char,
) -> c_int {
    advisory(pamh, "close_session")
}
