//! Interactive login by browser cookie hand-off.
//!
//! The storefront's password and second-factor prompts are completed in the
//! operator's own browser. The operator then exports the storefront cookies
//! (Netscape `cookies.txt` or JSON) and pastes the export, or its file path,
//! at the prompt.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, info, warn};
use url::Url;

use super::{
    AuthError, CaptureError, CapturedCookieFormat, SESSION_ID_COOKIE, Session,
    parse_captured_cookies,
};

/// Produces a fresh, not yet verified session from operator interaction.
pub trait LoginFlow: Send + Sync {
    /// Runs the login prompts.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::LoginCancelled`] on empty input or end of input,
    /// and [`AuthError::Capture`] when the cookie export is unusable.
    fn login(&self) -> Result<Session, AuthError>;
}

/// [`LoginFlow`] that reads a username and a browser cookie export.
///
/// The account name never reaches the storefront; it only labels the saved
/// session and the log. The storefront authenticates the browser, and the
/// exported cookies carry that login over. An export without a `sessionid`
/// cookie for the storefront host is rejected.
pub struct BrowserCookieLogin {
    storefront: Url,
    username: Option<String>,
    input: Mutex<Box<dyn BufRead + Send>>,
}

impl BrowserCookieLogin {
    /// Creates a login flow that prompts on the terminal.
    #[must_use]
    pub fn new(storefront: Url, username: Option<String>) -> Self {
        Self::with_reader(storefront, username, BufReader::new(io::stdin()))
    }

    /// Creates a login flow reading operator input from `reader`.
    #[must_use]
    pub fn with_reader(
        storefront: Url,
        username: Option<String>,
        reader: impl BufRead + Send + 'static,
    ) -> Self {
        let username = username
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        Self {
            storefront,
            username,
            input: Mutex::new(Box::new(reader)),
        }
    }

    fn storefront_host(&self) -> &str {
        self.storefront.host_str().unwrap_or_default()
    }

    fn read_username(&self, input: &mut dyn BufRead) -> Result<String, AuthError> {
        if let Some(name) = &self.username {
            return Ok(name.clone());
        }

        prompt("Storefront account name: ")?;
        let Some(line) = read_trimmed_line(input)? else {
            return Err(AuthError::cancelled("end of input at account prompt"));
        };
        if line.is_empty() {
            return Err(AuthError::cancelled("no account name entered"));
        }
        Ok(line)
    }

    fn print_instructions(&self, account: &str) {
        let login_url = self
            .storefront
            .join("login/")
            .map_or_else(|_| self.storefront.to_string(), String::from);
        info!("Log in as '{account}' at {login_url} in your browser.");
        info!("Complete the second-factor (Steam Guard) challenge there if asked.");
        info!(
            "Export cookies for {} (Netscape cookies.txt or JSON).",
            self.storefront_host()
        );
        info!("Paste the export file path, or paste the export and finish with an empty line:");
    }
}

impl LoginFlow for BrowserCookieLogin {
    fn login(&self) -> Result<Session, AuthError> {
        let mut guard = self
            .input
            .lock()
            .map_err(|_| io::Error::other("login input lock poisoned"))?;
        let input: &mut dyn BufRead = &mut **guard;

        let account = self.read_username(input)?;
        self.print_instructions(&account);

        let raw = read_cookie_export(input)?;
        let captured = match parse_captured_cookies(&raw) {
            Ok(captured) => captured,
            Err(CaptureError::EmptyInput) => {
                return Err(AuthError::cancelled("no cookie input provided"));
            }
            Err(error) => return Err(error.into()),
        };
        let captured = captured.retain_for_host(self.storefront_host())?;
        if !captured
            .cookies
            .iter()
            .any(|cookie| cookie.name == SESSION_ID_COOKIE && !cookie.value().is_empty())
        {
            return Err(AuthError::rejected(format!(
                "the cookie export has no {SESSION_ID_COOKIE} cookie for {}",
                self.storefront_host()
            )));
        }

        for warning in &captured.warnings {
            warn!("{warning}");
        }

        let format = match captured.format {
            CapturedCookieFormat::Netscape => "netscape",
            CapturedCookieFormat::Json => "json",
        };
        debug!(
            format,
            cookies = captured.cookies.len(),
            "captured storefront cookies"
        );

        Ok(Session::new(captured.cookies, Some(account)))
    }
}

fn prompt(text: &str) -> io::Result<()> {
    let mut stderr = io::stderr().lock();
    stderr.write_all(text.as_bytes())?;
    stderr.flush()
}

fn read_trimmed_line(input: &mut dyn BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Reads either a cookie file path or an inline export.
///
/// Inline exports end at the first blank line after a cookie line, or at end
/// of input.
fn read_cookie_export(input: &mut dyn BufRead) -> Result<String, AuthError> {
    let Some(first) = read_trimmed_line(input)? else {
        return Err(AuthError::cancelled("end of input at cookie prompt"));
    };
    if first.is_empty() {
        return Err(AuthError::cancelled("no cookie input provided"));
    }

    let path = Path::new(&first);
    if path.is_file() {
        return Ok(fs::read_to_string(path)?);
    }

    let mut seen_data = is_cookie_line(&first);
    let mut collected = first;
    loop {
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            if seen_data {
                break;
            }
            continue;
        }
        seen_data |= is_cookie_line(trimmed);
        collected.push('\n');
        collected.push_str(trimmed);
    }
    Ok(collected)
}

fn is_cookie_line(line: &str) -> bool {
    !line.starts_with('#') || line.starts_with("#HttpOnly_")
}
