//! Credential verification against the Synology DSM web login API.
//!
//! A username/password pair is checked by issuing a single
//! `SYNO.API.Auth` login request against the NAS and inspecting the reply.
//! Nothing is cached and no session token is kept: every call is one
//! independent HTTPS round trip.
//!
//! - [`args`]: `name=value` module argument lookup
//! - [`config`]: verifier settings (TOML file or module arguments)
//! - [`credential`]: username + secret that wipes itself after use
//! - [`login`]: login URL construction and response inspection
//! - [`tls`]: trust anchor loading for the `cafile` option
//! - [`transport`]: the HTTP seam and its HTTPS implementation
//! - [`verifier`]: request → outcome classification

pub mod args;
pub mod config;
pub mod credential;
pub mod error;
pub mod login;
pub mod tls;
pub mod transport;
pub mod verifier;

pub use args::{flag, resolve};
pub use config::{ResponseCheck, VerifierConfig};
pub use credential::Credential;
pub use error::Error;
pub use login::PASSWORD_PROMPT;
pub use transport::{HttpsTransport, Transport, TransportError};
pub use verifier::{verify, VerificationOutcome, Verifier};
