//! Cookie import from an exported cookie file
//!
//! Two formats are accepted:
//! - Netscape `cookies.txt` (tab-separated, as written by browser export extensions)
//! - A flat JSON object of cookie name to value
//!
//! Imported cookies are loaded into a `CookieStore` scoped to the API base URL,
//! the same jar a password login fills from `Set-Cookie` headers.

use crate::AuthError;
use cookie_store::{CookieStore, RawCookie};
use reqwest::header::HeaderValue;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

/// Cookies that must be present for an imported session to be usable
pub const REQUIRED_COOKIES: [&str; 3] = ["sessionid", "csrftoken", "ds_user_id"];

/// Cookie jar shared by a session and the HTTP client it sends through
///
/// The client reads it for every request and stores every `Set-Cookie`
/// header it receives.
#[derive(Debug, Default)]
pub struct SessionJar(RwLock<CookieStore>);

impl SessionJar {
    pub fn new(store: CookieStore) -> Self {
        Self(RwLock::new(store))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, CookieStore> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, CookieStore> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl reqwest::cookie::CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let cookies: Vec<RawCookie<'static>> = cookie_headers
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| RawCookie::parse(value.to_string()).ok())
            .collect();
        self.write().store_response_cookies(cookies.into_iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .read()
            .get_request_values(url)
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }
}

/// Reads a cookie file and returns the cookies set for `domain`
///
/// # Arguments
///
/// * `path` - Path to the exported cookie file
/// * `domain` - Cookie domain to keep (subdomains included), e.g. `instagram.com`
pub fn load_cookie_file(path: &Path, domain: &str) -> Result<BTreeMap<String, String>, AuthError> {
    let content = std::fs::read_to_string(path).map_err(|e| AuthError::CookieFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    parse_cookies(&content, domain).map_err(|message| AuthError::CookieFile {
        path: path.display().to_string(),
        message,
    })
}

/// Parses cookie file content in either supported format
pub fn parse_cookies(content: &str, domain: &str) -> Result<BTreeMap<String, String>, String> {
    if content.trim_start().starts_with('{') {
        return serde_json::from_str(content).map_err(|e| format!("invalid JSON cookies: {}", e));
    }

    let mut cookies = BTreeMap::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        // "#HttpOnly_" prefixes real cookies; any other '#' line is a comment
        let line = match line.strip_prefix("#HttpOnly_") {
            Some(rest) => rest,
            None if line.trim().is_empty() || line.starts_with('#') => continue,
            None => line,
        };

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            return Err(format!(
                "line {}: expected 7 tab-separated fields, got {}",
                number + 1,
                fields.len()
            ));
        }

        if !domain_matches(fields[0], domain) {
            continue;
        }
        cookies.insert(fields[5].to_string(), fields[6].to_string());
    }

    Ok(cookies)
}

/// Builds a cookie jar holding `cookies` for requests to `url`
pub fn cookie_jar(cookies: &BTreeMap<String, String>, url: &Url) -> Result<CookieStore, AuthError> {
    let mut store = CookieStore::default();
    for (name, value) in cookies {
        store
            .parse(&format!("{}={}; Path=/", name, value), url)
            .map_err(|e| AuthError::Unexpected(format!("cookie {} rejected: {}", name, e)))?;
    }
    Ok(store)
}

/// Returns the value of cookie `name` as it would be sent to `url`
pub fn cookie_value(store: &CookieStore, url: &Url, name: &str) -> Option<String> {
    store
        .get_request_values(url)
        .find(|(cookie, _)| *cookie == name)
        .map(|(_, value)| value.to_string())
}

/// Lists the required cookies the jar would not send to `url`
pub fn missing_cookies(store: &CookieStore, url: &Url) -> Vec<String> {
    REQUIRED_COOKIES
        .iter()
        .filter(|name| cookie_value(store, url, name).map_or(true, |v| v.is_empty()))
        .map(|name| name.to_string())
        .collect()
}

fn domain_matches(cookie_domain: &str, domain: &str) -> bool {
    let cookie_domain = cookie_domain.trim_start_matches('.');
    cookie_domain == domain || cookie_domain.ends_with(&format!(".{}", domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETSCAPE: &str = "# Netscape HTTP Cookie File\n\
        \n\
        .instagram.com\tTRUE\t/\tTRUE\t1999999999\tcsrftoken\ttok\n\
        #HttpOnly_.instagram.com\tTRUE\t/\tTRUE\t1999999999\tsessionid\tabc%3A1\n\
        www.instagram.com\tFALSE\t/\tTRUE\t1999999999\tds_user_id\t42\n\
        .example.com\tTRUE\t/\tFALSE\t1999999999\tsessionid\tother\n";

    #[test]
    fn test_parse_netscape() {
        let cookies = parse_cookies(NETSCAPE, "instagram.com").unwrap();
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies["sessionid"], "abc%3A1");
        assert_eq!(cookies["csrftoken"], "tok");
        assert_eq!(cookies["ds_user_id"], "42");
    }

    #[test]
    fn test_parse_json() {
        let cookies =
            parse_cookies(r#"{"sessionid":"abc","csrftoken":"tok"}"#, "instagram.com").unwrap();
        assert_eq!(cookies["sessionid"], "abc");
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_parse_malformed_line() {
        let err = parse_cookies(".instagram.com\tTRUE\tsessionid\n", "instagram.com").unwrap_err();
        assert!(err.contains("line 1"));
    }

    #[test]
    fn test_domain_matches() {
        assert!(domain_matches(".instagram.com", "instagram.com"));
        assert!(domain_matches("i.instagram.com", "instagram.com"));
        assert!(!domain_matches("notinstagram.com", "instagram.com"));
    }

    #[test]
    fn test_cookie_jar_scoped_to_base_url() {
        let base = Url::parse("https://api.example.com/v1/").unwrap();
        let cookies = parse_cookies(r#"{"sessionid":"abc","csrftoken":"tok"}"#, "example.com").unwrap();
        let store = cookie_jar(&cookies, &base).unwrap();

        let feed = base.join("tags/food/feed/").unwrap();
        assert_eq!(cookie_value(&store, &feed, "sessionid").as_deref(), Some("abc"));
        assert_eq!(missing_cookies(&store, &feed), vec!["ds_user_id".to_string()]);

        let elsewhere = Url::parse("https://other.example.org/").unwrap();
        assert_eq!(cookie_value(&store, &elsewhere, "sessionid"), None);
    }

    #[test]
    fn test_jar_stores_response_cookies() {
        use reqwest::cookie::CookieStore as _;

        let url = Url::parse("https://api.example.com/v1/accounts/login/").unwrap();
        let jar = SessionJar::default();
        assert!(jar.cookies(&url).is_none());

        let headers = [
            HeaderValue::from_static("sessionid=abc; Path=/; HttpOnly"),
            HeaderValue::from_static("csrftoken=tok; Path=/"),
            HeaderValue::from_static("old=gone; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT"),
        ];
        jar.set_cookies(&mut headers.iter(), &url);

        let feed = Url::parse("https://api.example.com/v1/tags/food/feed/").unwrap();
        let sent = jar.cookies(&feed).unwrap();
        let sent = sent.to_str().unwrap();
        assert!(sent.contains("sessionid=abc"));
        assert!(sent.contains("csrftoken=tok"));
        assert!(!sent.contains("old="));
    }

    #[test]
    fn test_missing_file() {
        let result = load_cookie_file(Path::new("/nonexistent/cookies.txt"), "instagram.com");
        assert!(matches!(result, Err(AuthError::CookieFile { .. })));
    }
}
