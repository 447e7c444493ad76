use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use redeemer_core::auth::{
    Authenticator, BrowserCookieLogin, EncryptedSessionStore, SessionAuthenticator,
};
use redeemer_core::redeem::{
    DEFAULT_STOREFRONT_URL, RedemptionEngine, StorefrontClient, WaitSchedule,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::ProcessExit;
use crate::app::config::{self, HttpTimeouts};
use crate::app::input::KeySource;
use crate::app::progress::{ConsoleReporter, summary_line};
use crate::app::{exit_handler, terminal};
use crate::cli::Args;

pub(crate) async fn run_redeemer() -> Result<ProcessExit> {
    let (cli_args, cli_sources) = config::parse_cli_with_sources();
    let file_config = config::load_default_file_config()?;
    let args = config::apply_config_defaults(cli_args, &cli_sources, file_config.as_ref());
    let timeouts = config::resolve_http_timeouts(file_config.as_ref());

    let default_level = terminal::resolve_default_log_level(&args);
    let force_cli_log_level = config::should_force_cli_log_level(&cli_sources);
    terminal::init_tracing(
        default_level,
        force_cli_log_level,
        terminal::is_no_color_requested(&args),
    );
    debug!(
        config_file = file_config.is_some(),
        retry_interval = args.retry_interval,
        tick_ms = args.tick_ms,
        "CLI arguments resolved"
    );

    let store = session_store(&args)?;
    if args.logout {
        return logout(&store);
    }

    let source = KeySource::from_args(&args);
    let keys = source.read_keys()?;
    if keys.is_empty() {
        info!("No keys to redeem");
        return Ok(ProcessExit::Success);
    }
    info!(keys = keys.len(), "Loaded keys");

    redeem_all(&args, timeouts, store, &source, &keys).await
}

async fn redeem_all(
    args: &Args,
    timeouts: HttpTimeouts,
    store: EncryptedSessionStore,
    source: &KeySource,
    keys: &[String],
) -> Result<ProcessExit> {
    let storefront = match &args.storefront_url {
        Some(url) => url.clone(),
        None => Url::parse(DEFAULT_STOREFRONT_URL).context("Invalid default storefront URL")?,
    };
    let client = Arc::new(StorefrontClient::with_timeouts(
        storefront.clone(),
        timeouts.connect,
        timeouts.request,
    )?);

    if source.reads_stdin() {
        warn!("Keys were read from standard input; a login prompt will not be able to read input");
    }
    let login = Arc::new(BrowserCookieLogin::new(
        storefront.clone(),
        args.username.clone(),
    ));
    let authenticator = Arc::new(
        SessionAuthenticator::new(Arc::new(store), login, client.clone())
            .with_persistence(!args.no_save_session),
    );

    let session = authenticator
        .authenticate()
        .await
        .context("Could not sign in to the storefront")?;
    info!(
        account = session.account().unwrap_or("unknown"),
        "Signed in to {}",
        storefront.host_str().unwrap_or("the storefront")
    );

    let schedule = WaitSchedule::new(
        Duration::from_millis(args.tick_ms),
        Duration::from_secs(args.retry_interval),
    );
    let engine = RedemptionEngine::new(client, authenticator).with_schedule(schedule);

    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let reporter = ConsoleReporter::stdout(use_spinner);
    let stats = engine.run(session, keys, &reporter).await?;

    info!("{}", summary_line(&stats));
    Ok(exit_handler::determine_exit_outcome(
        stats.redeemed(),
        stats.failed(),
    ))
}

fn session_store(args: &Args) -> Result<EncryptedSessionStore> {
    match &args.session_file {
        Some(path) => Ok(EncryptedSessionStore::new(path)),
        None => EncryptedSessionStore::at_default_location()
            .context("Cannot locate a directory for the saved session; pass --session-file"),
    }
}

fn logout(store: &EncryptedSessionStore) -> Result<ProcessExit> {
    let removed = store
        .clear()
        .with_context(|| format!("Failed to remove saved session '{}'", store.path().display()))?;
    if removed {
        info!(path = %store.path().display(), "Removed saved session");
    } else {
        info!("No saved session found");
    }
    Ok(ProcessExit::Success)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use redeemer_core::auth::SessionStore;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_session_store_honors_session_file() {
        let args = Args::try_parse_from(["redeemer", "--session-file", "/tmp/x/session.enc"])
            .unwrap();
        let store = session_store(&args).unwrap();
        assert_eq!(store.path(), std::path::Path::new("/tmp/x/session.enc"));
    }

    #[test]
    fn test_logout_without_saved_session_succeeds() {
        let dir = TempDir::new().unwrap();
        let store = EncryptedSessionStore::with_key_material(dir.path().join("s.enc"), "k");
        assert!(store.load().is_none());
        assert_eq!(logout(&store).unwrap(), ProcessExit::Success);
    }
}
