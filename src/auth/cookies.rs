//! Session cookies: Netscape cookie-file parsing and reqwest jar loading.
//!
//! Storefront sessions are carried entirely in cookies. The browser export
//! formats are parsed into [`SessionCookie`] values, which are then loaded into
//! a `reqwest::cookie::Jar` so the right subset is attached to each request.

use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use reqwest::cookie::Jar;
use tracing::{debug, instrument, warn};

/// A single storefront cookie.
///
/// The value is redacted in Debug output; session cookies are bearer
/// credentials for the account.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// The domain the cookie belongs to (e.g., `store.steampowered.com`).
    pub domain: String,
    /// Whether subdomains should match.
    pub tailmatch: bool,
    /// The URL path scope for the cookie.
    pub path: String,
    /// Whether the cookie should only be sent over HTTPS.
    pub secure: bool,
    /// Unix timestamp for expiry (0 = session cookie).
    pub expires: u64,
    /// Cookie name.
    pub name: String,
    value: String,
}

impl SessionCookie {
    /// Creates a new cookie entry.
    #[must_use]
    pub fn new(
        domain: String,
        tailmatch: bool,
        path: String,
        secure: bool,
        expires: u64,
        name: String,
        value: String,
    ) -> Self {
        Self {
            domain,
            tailmatch,
            path,
            secure,
            expires,
            name,
            value,
        }
    }

    /// Returns the cookie value. Never log it.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true when this cookie would be sent to `host`.
    ///
    /// Host-only cookies match exactly; tailmatch cookies also match any
    /// subdomain of their domain.
    #[must_use]
    pub fn applies_to_host(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        if domain.eq_ignore_ascii_case(host) {
            return true;
        }
        self.tailmatch
            && host
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("domain", &self.domain)
            .field("tailmatch", &self.tailmatch)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors that can occur while parsing a Netscape cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// A line in the cookie file has an invalid format.
    #[error("line {line_number}: {reason} (got: {content})")]
    InvalidLine {
        /// 1-based line number in the cookie file.
        line_number: usize,
        /// The offending line content, value redacted.
        content: String,
        /// Description of what was wrong.
        reason: String,
    },

    /// I/O error reading the cookie file.
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// No valid cookies found in a non-empty file.
    #[error("no valid cookies found in file ({malformed_count} lines failed to parse)")]
    NoCookiesFound {
        /// Number of malformed lines encountered.
        malformed_count: usize,
    },
}

/// Parsed cookies plus per-line warnings for lines that were skipped.
#[derive(Debug)]
pub struct ParseResult {
    /// Successfully parsed cookies.
    pub cookies: Vec<SessionCookie>,
    /// Warnings for malformed lines (line number and reason).
    pub warnings: Vec<(usize, String)>,
}

/// Parses a Netscape-format cookie file.
///
/// Each data line holds 7 TAB-separated fields:
/// `domain`, `tailmatch`, `path`, `secure`, `expires`, `name`, `value`.
/// Comment lines (`#`) and blank lines are ignored. Browsers prefix HttpOnly
/// cookies with `#HttpOnly_`; those are data lines, not comments, and the
/// storefront's login cookie is always HttpOnly.
///
/// # Errors
///
/// Returns [`CookieError::Io`] on read failure, or
/// [`CookieError::NoCookiesFound`] when data lines exist but none parse.
#[instrument(level = "debug", skip(reader))]
pub fn parse_netscape_cookies(reader: impl BufRead) -> Result<ParseResult, CookieError> {
    let mut cookies = Vec::new();
    let mut warnings = Vec::new();
    let mut data_lines = 0;

    for (idx, line_result) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line_result?;
        let line = line.trim_end();

        if line.is_empty() {
            continue;
        }

        let line = match line.strip_prefix("#HttpOnly_") {
            Some(rest) => rest,
            None if line.starts_with('#') => continue,
            None => line,
        };

        data_lines += 1;

        match parse_cookie_line(line, line_number) {
            Ok(cookie) => {
                debug!(line = line_number, domain = %cookie.domain, name = %cookie.name, "parsed cookie");
                cookies.push(cookie);
            }
            Err(e) => {
                warn!(line = line_number, reason = %e, "skipping malformed cookie line");
                warnings.push((line_number, e.to_string()));
            }
        }
    }

    if cookies.is_empty() && data_lines > 0 {
        return Err(CookieError::NoCookiesFound {
            malformed_count: warnings.len(),
        });
    }

    Ok(ParseResult { cookies, warnings })
}

fn parse_cookie_line(line: &str, line_number: usize) -> Result<SessionCookie, CookieError> {
    let invalid = |reason: String| CookieError::InvalidLine {
        line_number,
        content: redact_line_for_error(line),
        reason,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    let [domain, tailmatch, path, secure, expires, name, value] = fields[..] else {
        return Err(invalid(format!(
            "expected 7 TAB-separated fields, found {}",
            fields.len()
        )));
    };

    if domain.is_empty() {
        return Err(invalid("domain field is empty".to_string()));
    }
    if name.is_empty() {
        return Err(invalid("cookie name field is empty".to_string()));
    }

    let tailmatch = parse_bool_field(tailmatch).ok_or_else(|| {
        invalid(format!("tailmatch field must be TRUE or FALSE, got '{tailmatch}'"))
    })?;
    let secure = parse_bool_field(secure)
        .ok_or_else(|| invalid(format!("secure field must be TRUE or FALSE, got '{secure}'")))?;
    let expires = expires.parse::<u64>().map_err(|_| {
        invalid(format!(
            "expires field must be a non-negative integer, got '{expires}'"
        ))
    })?;

    Ok(SessionCookie::new(
        domain.to_string(),
        tailmatch,
        path.to_string(),
        secure,
        expires,
        name.to_string(),
        value.to_string(),
    ))
}

fn parse_bool_field(value: &str) -> Option<bool> {
    match value {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

/// Replaces the value field with `[REDACTED]` so errors can quote the line.
fn redact_line_for_error(line: &str) -> String {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() >= 7 {
        let mut redacted = fields[..6].join("\t");
        redacted.push_str("\t[REDACTED]");
        redacted
    } else {
        line.to_string()
    }
}

/// Loads cookies into a `reqwest::cookie::Jar`.
///
/// Each cookie becomes a `Set-Cookie` string added against an origin URL built
/// from its domain, so the jar applies normal domain/path/secure matching.
#[instrument(level = "debug", skip(cookies), fields(count = cookies.len()))]
pub fn load_cookies_into_jar(cookies: &[SessionCookie]) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());

    for cookie in cookies {
        let set_cookie = build_set_cookie_string(cookie);
        match build_origin_url(cookie).parse::<url::Url>() {
            Ok(url) => jar.add_cookie_str(&set_cookie, &url),
            Err(_) => warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                "skipping cookie with unparseable domain"
            ),
        }
    }

    jar
}

fn build_set_cookie_string(cookie: &SessionCookie) -> String {
    let mut parts = vec![format!("{}={}", cookie.name, cookie.value())];
    // Without a Domain attribute the jar keeps the cookie host-only.
    if cookie.tailmatch {
        parts.push(format!("Domain={}", cookie.domain));
    }
    parts.push(format!("Path={}", cookie.path));

    if cookie.secure {
        parts.push("Secure".to_string());
    }

    if cookie.expires > 0 {
        match unix_to_http_date(cookie.expires) {
            Some(expires) => parts.push(format!("Expires={expires}")),
            None => warn!(
                name = %cookie.name,
                expires = cookie.expires,
                "cookie expiry overflows SystemTime; treating as session cookie"
            ),
        }
    }

    parts.join("; ")
}

fn build_origin_url(cookie: &SessionCookie) -> String {
    let scheme = if cookie.secure { "https" } else { "http" };
    let domain = cookie.domain.trim_start_matches('.');
    format!("{scheme}://{domain}{}", cookie.path)
}

fn unix_to_http_date(timestamp: u64) -> Option<String> {
    use std::time::{Duration, UNIX_EPOCH};

    let time = UNIX_EPOCH.checked_add(Duration::from_secs(timestamp))?;
    Some(httpdate::fmt_http_date(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;
    use std::io::Cursor;

    fn store_cookie(name: &str, value: &str) -> SessionCookie {
        SessionCookie::new(
            "store.steampowered.com".to_string(),
            false,
            "/".to_string(),
            true,
            0,
            name.to_string(),
            value.to_string(),
        )
    }

    #[test]
    fn test_parse_netscape_cookies_storefront_export() {
        let input = "\
# Netscape HTTP Cookie File
store.steampowered.com\tFALSE\t/\tTRUE\t0\tsessionid\tabc123
#HttpOnly_store.steampowered.com\tFALSE\t/\tTRUE\t4102444800\tsteamLoginSecure\t7656%7C%7Ctoken
";
        let result = parse_netscape_cookies(Cursor::new(input)).unwrap();
        assert_eq!(result.cookies.len(), 2);
        assert!(result.warnings.is_empty());
        assert_eq!(result.cookies[0].name, "sessionid");
        assert_eq!(result.cookies[0].value(), "abc123");
        assert_eq!(result.cookies[1].name, "steamLoginSecure");
        assert_eq!(result.cookies[1].expires, 4_102_444_800);
        assert!(result.cookies[1].secure);
    }

    #[test]
    fn test_parse_netscape_cookies_reports_malformed_line_numbers() {
        let input = "\
# header
store.steampowered.com\tFALSE\t/\tTRUE\t0\tsessionid\tabc
not a cookie
";
        let result = parse_netscape_cookies(Cursor::new(input)).unwrap();
        assert_eq!(result.cookies.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].0, 3);
        assert!(result.warnings[0].1.contains("7 TAB-separated fields"));
    }

    #[test]
    fn test_parse_netscape_cookies_only_malformed_is_error() {
        let input = "garbage\n.example.com\tYES\t/\tFALSE\t0\tname\tvalue\n";
        let err = parse_netscape_cookies(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, CookieError::NoCookiesFound { malformed_count: 2 }));
    }

    #[test]
    fn test_parse_netscape_cookies_empty_input_is_ok() {
        let result = parse_netscape_cookies(Cursor::new("")).unwrap();
        assert!(result.cookies.is_empty());
    }

    #[test]
    fn test_parse_netscape_cookies_crlf() {
        let input = "store.steampowered.com\tFALSE\t/\tTRUE\t0\tsessionid\tabc\r\n";
        let result = parse_netscape_cookies(Cursor::new(input)).unwrap();
        assert_eq!(result.cookies[0].value(), "abc");
    }

    #[test]
    fn test_session_cookie_debug_redacts_value() {
        let debug = format!("{:?}", store_cookie("sessionid", "super_secret"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret"));
    }

    #[test]
    fn test_redact_line_for_error_hides_value() {
        let redacted = redact_line_for_error(".a.com\tTRUE\t/\tFALSE\t0\tname\tsecret");
        assert!(!redacted.contains("secret"));
        assert!(redacted.ends_with("[REDACTED]"));
    }

    #[test]
    fn test_applies_to_host_host_only() {
        let cookie = store_cookie("sessionid", "x");
        assert!(cookie.applies_to_host("store.steampowered.com"));
        assert!(!cookie.applies_to_host("help.steampowered.com"));
        assert!(!cookie.applies_to_host("evilstore.steampowered.com"));
    }

    #[test]
    fn test_applies_to_host_tailmatch() {
        let cookie = SessionCookie::new(
            ".steampowered.com".to_string(),
            true,
            "/".to_string(),
            true,
            0,
            "browserid".to_string(),
            "1".to_string(),
        );
        assert!(cookie.applies_to_host("store.steampowered.com"));
        assert!(cookie.applies_to_host("steampowered.com"));
        assert!(!cookie.applies_to_host("notsteampowered.com"));
    }

    #[test]
    fn test_load_cookies_into_jar_attaches_to_storefront_only() {
        let jar = load_cookies_into_jar(&[store_cookie("sessionid", "abc123")]);

        let store = "https://store.steampowered.com/account/registerkey"
            .parse::<url::Url>()
            .unwrap();
        let header = jar.cookies(&store).expect("cookie for storefront");
        assert!(header.to_str().unwrap().contains("sessionid=abc123"));

        let other = "https://example.com/".parse::<url::Url>().unwrap();
        assert!(jar.cookies(&other).is_none());
    }

    #[test]
    fn test_build_set_cookie_string_includes_attributes() {
        let mut cookie = store_cookie("steamLoginSecure", "tok");
        cookie.expires = 1_700_000_000;
        let s = build_set_cookie_string(&cookie);
        assert!(s.starts_with("steamLoginSecure=tok"));
        assert!(!s.contains("Domain="), "host-only cookie: {s}");
        assert!(s.contains("Path=/"));
        assert!(s.contains("Secure"));
        assert!(s.contains("Expires="));

        cookie.tailmatch = true;
        cookie.domain = ".steampowered.com".to_string();
        assert!(build_set_cookie_string(&cookie).contains("Domain=.steampowered.com"));
    }

    #[test]
    fn test_build_origin_url_strips_leading_dot() {
        let mut cookie = store_cookie("n", "v");
        cookie.domain = ".steampowered.com".to_string();
        cookie.secure = false;
        assert_eq!(build_origin_url(&cookie), "http://steampowered.com/");
    }
}
