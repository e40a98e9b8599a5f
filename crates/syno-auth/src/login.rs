use reqwest::Url;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::config::ResponseCheck;
use crate::error::Error;

/// Prompt shown by the host when asking for the NAS password.
pub const PASSWORD_PROMPT: &str = "Synology password: ";

/// Path of the DSM authentication CGI, relative to the base URL.
const AUTH_PATH: &str = "webapi/auth.cgi";

/// Marker looked for in [`ResponseCheck::Marker`] mode.
const SUCCESS_MARKER: &str = "\"success\":true";

/// Validate a configured base address.
///
/// # Errors
///
/// Returns [`Error::MissingConfiguration`] for an empty string and
/// [`Error::InvalidConfiguration`] for anything that is not an absolute
/// `http`/`https` URL.
pub fn parse_base_url(raw: &str) -> Result<Url, Error> {
    if raw.is_empty() {
        return Err(Error::MissingConfiguration("url"));
    }

    let url = Url::parse(raw).map_err(|e| Error::invalid("url", format!("`{raw}`: {e}")))?;

    match url.scheme() {
        "https" => {}
        "http" => {
            tracing::warn!(url = %url, "NAS URL is plain http, the password crosses the network in cleartext");
        }
        other => {
            return Err(Error::invalid(
                "url",
                format!("unsupported scheme `{other}`"),
            ))
        }
    }

    if url.host_str().is_none() {
        return Err(Error::invalid("url", format!("`{raw}` has no host")));
    }

    Ok(url)
}

/// Build the `SYNO.API.Auth` login URL for one attempt.
///
/// The query is
/// `api=SYNO.API.Auth&version=3&method=login&account=..&passwd=..&session=FileStation&format=cookie`.
/// Account and password are form-urlencoded so that characters such as `&`
/// or `#` in a password cannot change the shape of the query. Any query or
/// fragment on the base address is dropped; a path prefix is kept.
///
/// The result contains the secret and is zeroed when dropped.
#[must_use]
pub fn login_url(base: &Url, username: &str, secret: &str) -> Zeroizing<String> {
    let mut url = base.clone();
    let path = format!("{}/{AUTH_PATH}", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);

    url.query_pairs_mut()
        .append_pair("api", "SYNO.API.Auth")
        .append_pair("version", "3")
        .append_pair("method", "login")
        .append_pair("account", username)
        .append_pair("passwd", secret)
        .append_pair("session", "FileStation")
        .append_pair("format", "cookie");

    Zeroizing::new(url.into())
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: u32,
}

/// Decide whether a non-empty reply body reports a successful login.
#[must_use]
pub fn is_success(body: &[u8], check: ResponseCheck) -> bool {
    match check {
        ResponseCheck::Marker => String::from_utf8_lossy(body).contains(SUCCESS_MARKER),
        ResponseCheck::Json => serde_json::from_slice::<LoginReply>(body)
            .map(|reply| reply.success)
            .unwrap_or(false),
    }
}

/// Extract `error.code` from a DSM reply, if the body is JSON and has one.
#[must_use]
pub fn api_error_code(body: &[u8]) -> Option<u32> {
    serde_json::from_slice::<LoginReply>(body)
        .ok()?
        .error
        .map(|e| e.code)
}

/// Human readable meaning of a `SYNO.API.Auth` error code.
#[must_use]
pub fn describe_api_error(code: u32) -> &'static str {
    match code {
        400 => "no such account or incorrect password",
        401 => "account disabled",
        402 => "permission denied",
        403 => "2-step verification code required",
        404 => "failed to authenticate 2-step verification code",
        406 => "2-step verification is enforced",
        407 => "blocked IP source",
        408 => "expired password, cannot change",
        409 => "expired password",
        410 => "password must be changed",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(raw: &str) -> Url {
        parse_base_url(raw).unwrap()
    }

    #[test]
    fn login_url_layout() {
        let url = login_url(&base("https://nas.local:5001"), "alice", "s3cret");
        assert_eq!(
            url.as_str(),
            "https://nas.local:5001/webapi/auth.cgi?api=SYNO.API.Auth&version=3&method=login\
             &account=alice&passwd=s3cret&session=FileStation&format=cookie"
        );
    }

    #[test]
    fn login_url_trailing_slash_and_prefix() {
        let url = login_url(&base("https://nas.local:5001/"), "a", "b");
        assert!(url.starts_with("https://nas.local:5001/webapi/auth.cgi?"));

        let url = login_url(&base("https://gw.example/dsm/?junk=1#frag"), "a", "b");
        assert!(url.starts_with("https://gw.example/dsm/webapi/auth.cgi?api="));
        assert!(!url.contains("junk"));
        assert!(!url.contains("frag"));
    }

    #[test]
    fn login_url_encodes_credentials() {
        let url = login_url(&base("https://nas"), "dom\\user", "p&ss word#1=");
        assert!(url.contains("&account=dom%5Cuser&"));
        assert!(url.contains("&passwd=p%26ss+word%231%3D&"));
    }

    #[test]
    fn base_url_validation() {
        assert!(matches!(
            parse_base_url(""),
            Err(Error::MissingConfiguration("url"))
        ));
        assert!(matches!(
            parse_base_url("nas.local:5001"),
            Err(Error::InvalidConfiguration { key: "url", .. })
        ));
        assert!(matches!(
            parse_base_url("ftp://nas.local"),
            Err(Error::InvalidConfiguration { key: "url", .. })
        ));
        assert!(parse_base_url("http://10.0.0.2:5000").is_ok());
    }

    #[test]
    fn marker_check() {
        assert!(is_success(
            br#"{"data":{"sid":"x"},"success":true}"#,
            ResponseCheck::Marker
        ));
        assert!(!is_success(
            br#"{"error":{"code":400},"success":false}"#,
            ResponseCheck::Marker
        ));
        // Whitespace defeats the literal marker.
        assert!(!is_success(br#"{"success": true}"#, ResponseCheck::Marker));
    }

    #[test]
    fn json_check() {
        assert!(is_success(br#"{"success": true}"#, ResponseCheck::Json));
        assert!(!is_success(
            br#"{"data":{"success":true},"success":false}"#,
            ResponseCheck::Json
        ));
        assert!(!is_success(b"<html>\"success\":true</html>", ResponseCheck::Json));
    }

    #[test]
    fn error_codes() {
        assert_eq!(
            api_error_code(br#"{"error":{"code":400},"success":false}"#),
            Some(400)
        );
        assert_eq!(api_error_code(br#"{"error":{"code":407}}"#), Some(407));
        assert_eq!(api_error_code(br#"{"success":true}"#), None);
        assert_eq!(api_error_code(b"not json"), None);
        assert_eq!(describe_api_error(401), "account disabled");
        assert_eq!(describe_api_error(999), "unknown error");
    }
}
