/// Look up the value of a `name=value` module argument.
///
/// Entries are scanned in order and the first one that starts with exactly
/// `name` followed by `=` wins. Everything after that first `=` is returned,
/// so `url=https://nas/?a=b` yields `https://nas/?a=b`. Matching is
/// case-sensitive and `urlx=1` does not match `url`.
///
/// Returns `None` when no entry matches. Optional arguments such as
/// `cafile` are expected to be absent most of the time.
#[must_use]
pub fn resolve<'a, S: AsRef<str>>(name: &str, args: &'a [S]) -> Option<&'a str> {
    args.iter()
        .find_map(|arg| arg.as_ref().strip_prefix(name)?.strip_prefix('='))
}

/// Check whether a boolean module argument is switched on.
///
/// Accepts the bare word (`debug`) as well as `debug=1`, `debug=true`,
/// `debug=yes` and `debug=on`. Any other value, or no entry at all, is off.
#[must_use]
pub fn flag<S: AsRef<str>>(name: &str, args: &[S]) -> bool {
    if args.iter().any(|arg| arg.as_ref() == name) {
        return true;
    }
    resolve(name, args).is_some_and(|value| {
        matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        let args = ["foo=1", "url=http://h", "url=http://other"];
        assert_eq!(resolve("url", &args), Some("http://h"));
    }

    #[test]
    fn prefix_must_be_followed_by_equals() {
        assert_eq!(resolve("url", &["urlx=1"]), None);
        assert_eq!(resolve("url", &["urlfoo=x", "url"]), None);
    }

    #[test]
    fn missing_argument_is_none() {
        let args: [&str; 0] = [];
        assert_eq!(resolve("cafile", &args), None);
        assert_eq!(resolve("cafile", &["url=https://nas"]), None);
    }

    #[test]
    fn value_keeps_later_equals_signs() {
        let args = vec!["url=https://nas:5001/?x=y".to_string()];
        assert_eq!(resolve("url", &args), Some("https://nas:5001/?x=y"));
    }

    #[test]
    fn empty_value_is_present() {
        assert_eq!(resolve("url", &["url="]), Some(""));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(resolve("url", &["URL=https://nas"]), None);
    }

    #[test]
    fn flags() {
        assert!(flag("debug", &["url=x", "debug"]));
        assert!(flag("insecure", &["insecure=true"]));
        assert!(flag("insecure", &["insecure=YES"]));
        assert!(!flag("insecure", &["insecure=0"]));
        assert!(!flag("insecure", &["insecurely"]));
        assert!(!flag("debug", &["url=x"]));
    }
}
