use std::ops::Deref;

use zeroize::Zeroize;

/// A username and the secret typed for it.
///
/// The secret is wiped when the credential is dropped, and
/// [`crate::Verifier`] wipes it as soon as a verification call is done with
/// it, whatever the outcome. `Debug` never prints it.
pub struct Credential {
    username: String,
    secret: String,
}

impl Credential {
    #[must_use]
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Overwrite the secret bytes with zeros and empty it.
    pub fn wipe(&mut self) {
        self.secret.zeroize();
    }

    /// True once [`Credential::wipe`] ran (or the secret was empty).
    #[must_use]
    pub fn is_wiped(&self) -> bool {
        self.secret.is_empty()
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Borrow of a credential that wipes the secret when it goes out of scope.
///
/// Holding this across an `.await` makes sure the secret is cleared on
/// completion, on early return and when the future is dropped mid-flight.
pub(crate) struct WipeOnDrop<'a>(&'a mut Credential);

impl<'a> WipeOnDrop<'a> {
    pub(crate) fn new(credential: &'a mut Credential) -> Self {
        Self(credential)
    }
}

impl Deref for WipeOnDrop<'_> {
    type Target = Credential;

    fn deref(&self) -> &Credential {
        self.0
    }
}

impl Drop for WipeOnDrop<'_> {
    fn drop(&mut self) {
        self.0.wipe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let cred = Credential::new("alice", "hunter2");
        let shown = format!("{cred:?}");
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn wipe_clears_secret() {
        let mut cred = Credential::new("alice", "hunter2");
        assert!(!cred.is_wiped());
        cred.wipe();
        assert!(cred.is_wiped());
        assert_eq!(cred.secret(), "");
        assert_eq!(cred.username(), "alice");
    }

    #[test]
    fn guard_wipes_on_scope_exit() {
        let mut cred = Credential::new("bob", "pa55");
        {
            let guard = WipeOnDrop::new(&mut cred);
            assert_eq!(guard.secret(), "pa55");
        }
        assert!(cred.is_wiped());
    }
}
