//! URL helpers shared by the provider clients, candidate materialization and
//! the prober

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static SENSITIVE_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([?&](?:username|password|user|pass|pwd|passwd)=)[^&]*")
        .expect("sensitive query pattern is a valid regex")
});

// Xtream stream paths embed credentials: /live/{user}/{pass}/{id}.ts
static XTREAM_PATH_CREDENTIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(live|movie|series|timeshift)/[^/]+/[^/]+/")
        .expect("xtream path pattern is a valid regex")
});

/// Mask credentials in a URL before it is logged
pub fn obfuscate_credentials(url: &str) -> String {
    let mut obfuscated = url.to_string();

    if let Ok(parsed) = Url::parse(url) {
        if !parsed.username().is_empty() || parsed.password().is_some() {
            let mut masked = parsed.clone();
            let _ = masked.set_username("****");
            let _ = masked.set_password(Some("****"));
            obfuscated = masked.to_string();
        }
    }

    let obfuscated = SENSITIVE_QUERY.replace_all(&obfuscated, "${1}****");
    XTREAM_PATH_CREDENTIALS
        .replace_all(&obfuscated, "/$1/****/****/")
        .into_owned()
}

/// Whether a source URL is absolute (has an http(s) scheme)
pub fn is_absolute(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Join a provider base URL with a root-relative source path
///
/// Trailing slashes on the base are normalised so `http://a/` + `/x` and
/// `http://a` + `/x` both give `http://a/x`.
pub fn join_base(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Resolve a redirect `Location` header against the URL that produced it
pub fn resolve_location(current: &Url, location: &str) -> Option<Url> {
    current.join(location.trim()).ok()
}
