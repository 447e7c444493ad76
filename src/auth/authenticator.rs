//! Session establishment: restore, verify, or log in.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::{AuthError, LoginFlow, Session, SessionStore};
use crate::redeem::RedeemError;

/// Hands out verified sessions to the redemption engine.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns a session the storefront currently accepts.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when no verified session can be established.
    async fn authenticate(&self) -> Result<Session, AuthError>;

    /// Replaces a session the storefront has just rejected.
    ///
    /// Implementations must not hand back the rejected session; the default
    /// defers to [`Authenticator::authenticate`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when no verified session can be established.
    async fn reauthenticate(&self) -> Result<Session, AuthError> {
        self.authenticate().await
    }
}

/// Checks whether the storefront still accepts a session.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    /// Returns `Ok(false)` when the storefront bounces the session to login.
    ///
    /// # Errors
    ///
    /// Returns [`RedeemError`] when the storefront cannot be reached.
    async fn verify(&self, session: &Session) -> Result<bool, RedeemError>;
}

/// [`Authenticator`] backed by a session store and an interactive login.
pub struct SessionAuthenticator {
    store: Arc<dyn SessionStore>,
    login: Arc<dyn LoginFlow>,
    verifier: Arc<dyn SessionVerifier>,
    persist: bool,
}

impl SessionAuthenticator {
    /// Creates an authenticator that persists fresh sessions.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        login: Arc<dyn LoginFlow>,
        verifier: Arc<dyn SessionVerifier>,
    ) -> Self {
        Self {
            store,
            login,
            verifier,
            persist: true,
        }
    }

    /// Enables or disables saving fresh sessions to the store.
    #[must_use]
    pub fn with_persistence(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    async fn restore(&self) -> Option<Session> {
        let session = self.store.load()?;
        if session.session_id().is_none() {
            info!("saved session has no sessionid cookie; logging in again");
            return None;
        }
        match self.verifier.verify(&session).await {
            Ok(true) => {
                info!(account = ?session.account(), "reusing saved session");
                Some(session.into_verified())
            }
            Ok(false) => {
                info!("saved session expired; logging in again");
                None
            }
            Err(error) => {
                warn!(error = %error, "could not verify saved session; logging in again");
                None
            }
        }
    }

    async fn login_fresh(&self) -> Result<Session, AuthError> {
        let fresh = self.login.login()?;
        let accepted = self
            .verifier
            .verify(&fresh)
            .await
            .map_err(AuthError::Verification)?;
        if !accepted {
            return Err(AuthError::rejected(
                "the storefront redirected the captured session to its login page",
            ));
        }

        let session = fresh.into_verified();
        info!(account = ?session.account(), "logged in");
        if self.persist {
            self.store.save(&session);
        } else {
            debug!("session persistence disabled");
        }
        Ok(session)
    }
}

#[async_trait]
impl Authenticator for SessionAuthenticator {
    #[instrument(level = "debug", skip(self))]
    async fn authenticate(&self) -> Result<Session, AuthError> {
        if let Some(session) = self.restore().await {
            return Ok(session);
        }
        self.login_fresh().await
    }

    /// Skips the store: the saved session is the one just rejected.
    #[instrument(level = "debug", skip(self))]
    async fn reauthenticate(&self) -> Result<Session, AuthError> {
        self.login_fresh().await
    }
}
