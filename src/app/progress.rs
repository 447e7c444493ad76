//! Console reporting for redemption runs.

use std::cell::RefCell;
use std::io::{self, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use redeemer_core::redeem::{
    ErrorTaxonomyEntry, RedeemError, RedemptionKey, RedemptionReporter, RedemptionStats,
};
use tracing::{debug, warn};

const WAIT_MESSAGE: &str = "Waiting for rate limit to go away (takes an hour after first key insert)";

/// Prints per-key outcomes and shows a spinner while rate limited.
pub(crate) struct ConsoleReporter<W: Write> {
    out: RefCell<W>,
    use_spinner: bool,
    spinner: RefCell<Option<ProgressBar>>,
}

impl ConsoleReporter<io::Stdout> {
    pub(crate) fn stdout(use_spinner: bool) -> Self {
        Self::with_writer(io::stdout(), use_spinner)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub(crate) fn with_writer(out: W, use_spinner: bool) -> Self {
        Self {
            out: RefCell::new(out),
            use_spinner,
            spinner: RefCell::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn line(&self, text: &str) {
        let result = match self.spinner.borrow().as_ref() {
            Some(spinner) => spinner.suspend(|| write_line(&mut *self.out.borrow_mut(), text)),
            None => write_line(&mut *self.out.borrow_mut(), text),
        };
        if let Err(error) = result {
            warn!(error = %error, "failed to write to console");
        }
    }

    fn spinner(&self) -> ProgressBar {
        self.spinner
            .borrow_mut()
            .get_or_insert_with(|| {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template("{msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner
            })
            .clone()
    }
}

impl<W: Write> RedemptionReporter for ConsoleReporter<W> {
    fn key_skipped(&self, index: usize) {
        debug!(line = index + 1, "skipped blank key entry");
    }

    fn redeemed(&self, key: &RedemptionKey, items: &[String]) {
        if items.is_empty() {
            self.line(&format!("Redeemed {key}"));
        }
        for item in items {
            self.line(&format!("Redeemed {item}"));
        }
    }

    fn rejected(&self, key: &RedemptionKey, entry: &ErrorTaxonomyEntry) {
        self.line(&format!("{key}: {}", entry.message));
    }

    fn rate_limited(&self, key: &RedemptionKey, entry: &ErrorTaxonomyEntry) {
        self.line(&format!("{key}: {}", entry.message));
    }

    fn waiting(&self, _key: &RedemptionKey, frame: char, elapsed: Duration) {
        if !self.use_spinner {
            return;
        }
        let secs = elapsed.as_secs();
        self.spinner().set_message(format!(
            "{WAIT_MESSAGE} {frame} [{:02}:{:02}]",
            secs / 60,
            secs % 60
        ));
    }

    fn wait_finished(&self, _key: &RedemptionKey) {
        if let Some(spinner) = self.spinner.borrow_mut().take() {
            spinner.finish_and_clear();
        }
    }

    fn transport_failed(&self, key: &RedemptionKey, error: &RedeemError) {
        self.line(&format!("{key}: could not reach the storefront ({error})"));
    }

    fn reauthenticated(&self, _key: &RedemptionKey) {
        self.line("Session expired; signed in again.");
    }
}

fn write_line(out: &mut impl Write, text: &str) -> io::Result<()> {
    writeln!(out, "{text}")?;
    out.flush()
}

/// One-line run summary.
pub(crate) fn summary_line(stats: &RedemptionStats) -> String {
    let mut line = format!(
        "Done: {} redeemed, {} failed",
        stats.redeemed(),
        stats.failed()
    );
    if stats.skipped() > 0 {
        line.push_str(&format!(", {} blank skipped", stats.skipped()));
    }
    if stats.rate_limit_retries() > 0 {
        line.push_str(&format!(", {} rate-limit retries", stats.rate_limit_retries()));
    }
    line
}
