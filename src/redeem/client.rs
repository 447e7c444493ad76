//! HTTP client for the storefront's key registration API.
//!
//! [`StorefrontClient`] performs exactly one request per call: a key
//! registration attempt, or the logged-in check used to verify sessions.
//! Redirects are never followed; the storefront answers an expired session
//! with a redirect to its login page.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{
    CONNECT_TIMEOUT_SECS, REDEEM_ACCEPT, REGISTER_KEY_API_PATH, REGISTER_KEY_PAGE_PATH,
    REQUEST_TIMEOUT_SECS,
};
use super::error::RedeemError;
use super::key::RedemptionKey;
use super::response::{RedemptionResult, RegisterKeyResponse};
use crate::auth::{Session, SessionVerifier};
use crate::user_agent;

/// Performs single redemption attempts.
#[async_trait]
pub trait Redeemer: Send + Sync {
    /// Submits one key with the given session.
    ///
    /// # Errors
    ///
    /// Returns [`RedeemError::SessionInvalid`] when the session is rejected and
    /// a transport error for anything else that prevented a parsed answer.
    async fn attempt(
        &self,
        session: &Session,
        key: &RedemptionKey,
    ) -> Result<RedemptionResult, RedeemError>;
}

/// Storefront HTTP client.
#[derive(Debug, Clone)]
pub struct StorefrontClient {
    client: Client,
    base: Url,
}

impl StorefrontClient {
    /// Creates a client for `base` with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`RedeemError::Client`] if the HTTP client cannot be built.
    pub fn new(base: Url) -> Result<Self, RedeemError> {
        Self::with_timeouts(
            base,
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Creates a client with explicit connect and whole-request timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`RedeemError::Client`] if the HTTP client cannot be built.
    pub fn with_timeouts(
        base: Url,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, RedeemError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .redirect(Policy::none())
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(RedeemError::Client)?;
        Ok(Self {
            client,
            base: normalize_base(base),
        })
    }

    /// Storefront base URL, always ending in `/`.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, RedeemError> {
        self.base
            .join(path)
            .map_err(|error| RedeemError::malformed(self.base.as_str(), error.to_string()))
    }

    /// Asks the storefront whether `session` is logged in.
    ///
    /// A 301/302 from the key page means the session is not authenticated;
    /// any other status means it is.
    ///
    /// # Errors
    ///
    /// Returns a transport [`RedeemError`] if the check cannot complete.
    #[instrument(skip(self, session), fields(account = ?session.account()))]
    pub async fn verify_session(&self, session: &Session) -> Result<bool, RedeemError> {
        let url = self.endpoint(REGISTER_KEY_PAGE_PATH)?;
        let response = self
            .client
            .get(url.clone())
            .headers(cookie_headers(session, &url))
            .send()
            .await
            .map_err(|error| RedeemError::from_send(url.as_str(), error))?;

        let status = response.status();
        let logged_in = !matches!(
            status,
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND
        );
        debug!(status = status.as_u16(), logged_in, "session check finished");
        Ok(logged_in)
    }

    async fn parse_redeem_response(
        url: &Url,
        response: Response,
    ) -> Result<RedemptionResult, RedeemError> {
        let status = response.status();
        if matches!(
            status,
            StatusCode::MOVED_PERMANENTLY
                | StatusCode::FOUND
                | StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
        ) {
            return Err(RedeemError::session_invalid(format!(
                "HTTP {} from key registration",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(RedeemError::http_status(url.as_str(), status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|error| RedeemError::from_send(url.as_str(), error))?;
        let parsed = serde_json::from_str::<RegisterKeyResponse>(&body)
            .map_err(|error| RedeemError::malformed(url.as_str(), error.to_string()))?;
        Ok(parsed.into_result())
    }
}

#[async_trait]
impl Redeemer for StorefrontClient {
    #[instrument(skip(self, session, key), fields(key = %key.masked()))]
    async fn attempt(
        &self,
        session: &Session,
        key: &RedemptionKey,
    ) -> Result<RedemptionResult, RedeemError> {
        let Some(session_id) = session.session_id() else {
            return Err(RedeemError::session_invalid(
                "session has no sessionid cookie",
            ));
        };

        let url = self.endpoint(REGISTER_KEY_API_PATH)?;
        let mut headers = cookie_headers(session, &url);
        headers.insert(ACCEPT, HeaderValue::from_static(REDEEM_ACCEPT));

        let response = self
            .client
            .post(url.clone())
            .headers(headers)
            .form(&[("product_key", key.as_str()), ("sessionid", session_id)])
            .send()
            .await
            .map_err(|error| RedeemError::from_send(url.as_str(), error))?;

        let result = Self::parse_redeem_response(&url, response).await?;
        debug!(
            succeeded = result.succeeded,
            error_code = ?result.error_code,
            items = result.items_granted.len(),
            "redemption attempt finished"
        );
        Ok(result)
    }
}

#[async_trait]
impl SessionVerifier for StorefrontClient {
    async fn verify(&self, session: &Session) -> Result<bool, RedeemError> {
        self.verify_session(session).await
    }
}

fn cookie_headers(session: &Session, url: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = session.cookie_header(url) {
        headers.insert(COOKIE, cookie);
    }
    headers
}

fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}
