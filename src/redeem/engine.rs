//! Redemption engine: drives keys through the client one at a time.
//!
//! Each key moves through `Pending -> Attempting -> (RateLimited ->)* Resolved`.
//! Terminal results and transport failures resolve the key and the run
//! continues; only authentication failures abort it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::client::Redeemer;
use super::error::RedeemError;
use super::key::RedemptionKey;
use super::retry::{RetryState, Sleeper, TokioSleeper, WaitSchedule, WaitStep};
use super::taxonomy::ErrorTaxonomyEntry;
use crate::auth::{AuthError, Authenticator, Session};

/// Receives per-key outcomes as the engine produces them.
///
/// Messages for failed keys come from the [`ErrorTaxonomyEntry`]; reporters
/// should not invent their own wording.
pub trait RedemptionReporter {
    /// A blank entry at `index` was skipped without contacting the storefront.
    fn key_skipped(&self, index: usize);
    /// The key was redeemed and granted `items`.
    fn redeemed(&self, key: &RedemptionKey, items: &[String]);
    /// The key failed with a terminal result code.
    fn rejected(&self, key: &RedemptionKey, entry: &ErrorTaxonomyEntry);
    /// The storefront throttled the account; a wait begins.
    fn rate_limited(&self, key: &RedemptionKey, entry: &ErrorTaxonomyEntry);
    /// One wait tick is about to elapse.
    fn waiting(&self, key: &RedemptionKey, frame: char, elapsed: Duration);
    /// The wait for `key` is over, whatever the outcome.
    fn wait_finished(&self, key: &RedemptionKey);
    /// The attempt did not produce an answer from the storefront.
    fn transport_failed(&self, key: &RedemptionKey, error: &RedeemError);
    /// A new session was established while processing `key`.
    fn reauthenticated(&self, key: &RedemptionKey);
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedemptionStats {
    redeemed: usize,
    failed: usize,
    skipped: usize,
    rate_limit_retries: usize,
    reauthentications: usize,
}

impl RedemptionStats {
    /// Keys redeemed successfully.
    #[must_use]
    pub fn redeemed(&self) -> usize {
        self.redeemed
    }

    /// Keys resolved with a terminal code or a transport failure.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Blank entries skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Quiet re-submissions made while rate limited.
    #[must_use]
    pub fn rate_limit_retries(&self) -> usize {
        self.rate_limit_retries
    }

    /// Sessions re-established mid-run.
    #[must_use]
    pub fn reauthentications(&self) -> usize {
        self.reauthentications
    }

    /// Keys that reached a final outcome (redeemed or failed).
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.redeemed + self.failed
    }
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A new session could not be established.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A freshly established session was rejected for the same key.
    #[error("[AUTH] the storefront rejected a fresh session while redeeming {key}")]
    SessionRejected {
        /// Masked key being processed.
        key: String,
    },
}

/// Sequential redemption driver.
pub struct RedemptionEngine {
    redeemer: Arc<dyn Redeemer>,
    authenticator: Arc<dyn Authenticator>,
    sleeper: Arc<dyn Sleeper>,
    schedule: WaitSchedule,
}

impl RedemptionEngine {
    /// Creates an engine with the tokio timer and default wait schedule.
    #[must_use]
    pub fn new(redeemer: Arc<dyn Redeemer>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            redeemer,
            authenticator,
            sleeper: Arc::new(TokioSleeper),
            schedule: WaitSchedule::default(),
        }
    }

    /// Replaces the sleeper used for wait ticks.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replaces the wait schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: WaitSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Redeems `keys` in order with `session`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the session cannot be re-established.
    /// Per-key failures never abort the run.
    #[instrument(skip_all, fields(keys = keys.len()))]
    pub async fn run(
        &self,
        session: Session,
        keys: &[String],
        reporter: &dyn RedemptionReporter,
    ) -> Result<RedemptionStats, EngineError> {
        let mut session = session;
        let mut stats = RedemptionStats::default();

        for (index, raw) in keys.iter().enumerate() {
            let Some(key) = RedemptionKey::parse(raw) else {
                debug!(index, "skipping blank key entry");
                stats.skipped += 1;
                reporter.key_skipped(index);
                continue;
            };
            self.redeem_key(&mut session, &key, reporter, &mut stats)
                .await?;
        }

        info!(
            redeemed = stats.redeemed,
            failed = stats.failed,
            skipped = stats.skipped,
            "redemption run finished"
        );
        Ok(stats)
    }

    async fn redeem_key(
        &self,
        session: &mut Session,
        key: &RedemptionKey,
        reporter: &dyn RedemptionReporter,
        stats: &mut RedemptionStats,
    ) -> Result<(), EngineError> {
        let mut wait: Option<RetryState> = None;
        let mut reauthenticated = false;

        loop {
            let outcome = self.redeemer.attempt(session, key).await;

            if !matches!(&outcome, Err(error) if error.is_session_invalid()) {
                // The replacement session got an answer; a later expiry starts over.
                reauthenticated = false;
            }

            let result = match outcome {
                Ok(result) => result,
                Err(error) if error.is_session_invalid() => {
                    if reauthenticated {
                        return Err(EngineError::SessionRejected { key: key.masked() });
                    }
                    warn!(key = %key.masked(), error = %error, "session rejected; re-authenticating");
                    *session = self.authenticator.reauthenticate().await?;
                    reauthenticated = true;
                    stats.reauthentications += 1;
                    reporter.reauthenticated(key);
                    continue;
                }
                Err(error) => {
                    finish_wait(&mut wait, key, reporter);
                    warn!(key = %key.masked(), error = %error, "redemption attempt failed");
                    stats.failed += 1;
                    reporter.transport_failed(key, &error);
                    return Ok(());
                }
            };

            let Some(entry) = result.error_entry() else {
                finish_wait(&mut wait, key, reporter);
                stats.redeemed += 1;
                reporter.redeemed(key, &result.items_granted);
                return Ok(());
            };

            if entry.is_rate_limited() {
                if wait.is_none() {
                    info!(key = %key.masked(), "rate limited; waiting");
                    reporter.rate_limited(key, &entry);
                }
                let state = wait.get_or_insert_with(RetryState::new);
                self.wait_for_retry(key, state, reporter).await;
                stats.rate_limit_retries += 1;
                continue;
            }

            finish_wait(&mut wait, key, reporter);
            debug!(key = %key.masked(), code = entry.code, "key rejected");
            stats.failed += 1;
            reporter.rejected(key, &entry);
            return Ok(());
        }
    }

    async fn wait_for_retry(
        &self,
        key: &RedemptionKey,
        state: &mut RetryState,
        reporter: &dyn RedemptionReporter,
    ) {
        loop {
            reporter.waiting(key, state.animation_frame(), state.elapsed());
            self.sleeper.sleep(self.schedule.tick()).await;
            if state.advance(&self.schedule) == WaitStep::Retry {
                debug!(
                    key = %key.masked(),
                    elapsed_secs = state.elapsed().as_secs(),
                    "probing rate limit"
                );
                return;
            }
        }
    }
}

fn finish_wait(
    wait: &mut Option<RetryState>,
    key: &RedemptionKey,
    reporter: &dyn RedemptionReporter,
) {
    if let Some(state) = wait.take() {
        debug!(
            key = %key.masked(),
            waited_secs = state.elapsed().as_secs(),
            retries = state.retries(),
            "rate-limit wait over"
        );
        reporter.wait_finished(key);
    }
}
