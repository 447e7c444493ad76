//! Browser cookie capture parsing and validation.
//!
//! The interactive login hands the operator's browser session over to the
//! redeemer as an exported cookie file. Two export shapes are accepted:
//! - Netscape HTTP Cookie File format
//! - JSON cookie exports (array or `{ "cookies": [...] }`)

use std::io::BufReader;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::instrument;

use super::{CookieError, SessionCookie, parse_netscape_cookies};

/// Cookie payload format detected during capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturedCookieFormat {
    /// Netscape HTTP Cookie File format.
    Netscape,
    /// JSON export format.
    Json,
}

/// Parsed and validated cookies captured from operator input.
#[derive(Debug)]
pub struct CapturedCookies {
    /// Valid cookies after parsing and validation.
    pub cookies: Vec<SessionCookie>,
    /// Non-fatal warnings encountered while parsing/validating.
    pub warnings: Vec<String>,
    /// Input format that was parsed.
    pub format: CapturedCookieFormat,
}

/// Errors that can occur while parsing captured cookies.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Input was empty.
    #[error("cookie input is empty")]
    EmptyInput,
    /// Netscape-format parser failed.
    #[error(transparent)]
    Netscape(#[from] CookieError),
    /// JSON parser failed.
    #[error("invalid cookie JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// No valid cookies remained after validation.
    #[error("no valid cookies found after validation")]
    NoValidCookies,
    /// Cookies were valid but none belong to the storefront host.
    #[error("no cookies for {host} found in the export; export cookies while on the storefront site")]
    NoStorefrontCookies {
        /// Storefront host the cookies were filtered against.
        host: String,
    },
}

/// Parses and validates captured cookies in either Netscape or JSON format.
///
/// # Errors
///
/// Returns [`CaptureError`] when input is empty, parsing fails, or every
/// cookie is invalid or expired.
#[instrument(level = "debug", skip(input))]
pub fn parse_captured_cookies(input: &str) -> Result<CapturedCookies, CaptureError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CaptureError::EmptyInput);
    }

    let (cookies, mut warnings, format) = if trimmed.starts_with('[') || trimmed.starts_with('{')
    {
        let (cookies, warnings) = parse_json_cookies(trimmed)?;
        (cookies, warnings, CapturedCookieFormat::Json)
    } else {
        let result = parse_netscape_cookies(BufReader::new(trimmed.as_bytes()))?;
        let warnings = result
            .warnings
            .iter()
            .map(|(line, reason)| format!("line {line}: {reason}"))
            .collect::<Vec<_>>();
        (result.cookies, warnings, CapturedCookieFormat::Netscape)
    };

    let (valid, validation_warnings) = validate_cookies(cookies, unix_now());
    warnings.extend(validation_warnings);

    if valid.is_empty() {
        return Err(CaptureError::NoValidCookies);
    }

    Ok(CapturedCookies {
        cookies: valid,
        warnings,
        format,
    })
}

impl CapturedCookies {
    /// Keeps only the cookies the storefront host would receive.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoStorefrontCookies`] when nothing applies.
    pub fn retain_for_host(mut self, host: &str) -> Result<Self, CaptureError> {
        let before = self.cookies.len();
        self.cookies.retain(|cookie| cookie.applies_to_host(host));
        let dropped = before - self.cookies.len();
        if dropped > 0 {
            self.warnings
                .push(format!("ignored {dropped} cookies for other sites"));
        }
        if self.cookies.is_empty() {
            return Err(CaptureError::NoStorefrontCookies {
                host: host.to_string(),
            });
        }
        Ok(self)
    }
}

fn validate_cookies(cookies: Vec<SessionCookie>, now: u64) -> (Vec<SessionCookie>, Vec<String>) {
    let mut valid = Vec::new();
    let mut warnings = Vec::new();

    for mut cookie in cookies {
        if cookie.value().is_empty() {
            warnings.push(format!("skipped cookie '{}' with empty value", cookie.name));
            continue;
        }
        if cookie.expires > 0 && cookie.expires <= now {
            warnings.push(format!("skipped expired cookie '{}'", cookie.name));
            continue;
        }
        if cookie.path.trim().is_empty() {
            cookie.path = "/".to_string();
        }
        valid.push(cookie);
    }

    (valid, warnings)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

fn parse_json_cookies(input: &str) -> Result<(Vec<SessionCookie>, Vec<String>), CaptureError> {
    let entries = match serde_json::from_str::<JsonCookiePayload>(input)? {
        JsonCookiePayload::Array(entries) | JsonCookiePayload::Wrapped { cookies: entries } => {
            entries
        }
    };

    let mut cookies = Vec::new();
    let mut warnings = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        match convert_json_cookie(entry) {
            Ok(cookie) => cookies.push(cookie),
            Err(reason) => warnings.push(format!("entry {}: {reason}", index + 1)),
        }
    }

    Ok((cookies, warnings))
}

fn convert_json_cookie(entry: JsonCookieEntry) -> Result<SessionCookie, String> {
    let raw_domain = entry.domain.or(entry.host).unwrap_or_default();
    let raw_domain = raw_domain.trim();
    let raw_domain = raw_domain
        .strip_prefix("https://")
        .or_else(|| raw_domain.strip_prefix("http://"))
        .unwrap_or(raw_domain);
    let host = raw_domain.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err("missing required field: domain".to_string());
    }

    let tailmatch = entry.host_only.map_or_else(|| host.starts_with('.'), |only| !only);
    let domain = if tailmatch {
        format!(".{}", host.trim_start_matches('.'))
    } else {
        host.trim_start_matches('.').to_string()
    };

    let name = entry.name.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err("missing required field: name".to_string());
    }

    let path = match entry.path {
        Some(path) if path.starts_with('/') => path,
        Some(path) if !path.trim().is_empty() => format!("/{path}"),
        _ => "/".to_string(),
    };

    let expires = entry
        .expiration_date
        .or(entry.expires)
        .map_or(0, normalized_expiry);

    Ok(SessionCookie::new(
        domain,
        tailmatch,
        path,
        entry.secure.unwrap_or(false),
        expires,
        name,
        entry.value.unwrap_or_default(),
    ))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn normalized_expiry(raw_expiry: f64) -> u64 {
    if !raw_expiry.is_finite() || raw_expiry <= 0.0 {
        return 0;
    }
    // `as` saturates for floats past u64::MAX.
    raw_expiry.floor() as u64
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonCookiePayload {
    Array(Vec<JsonCookieEntry>),
    Wrapped { cookies: Vec<JsonCookieEntry> },
}

#[derive(Debug, Deserialize)]
struct JsonCookieEntry {
    domain: Option<String>,
    host: Option<String>,
    #[serde(rename = "hostOnly")]
    host_only: Option<bool>,
    path: Option<String>,
    secure: Option<bool>,
    name: Option<String>,
    value: Option<String>,
    #[serde(rename = "expirationDate")]
    expiration_date: Option<f64>,
    expires: Option<f64>,
}
