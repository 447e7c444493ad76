//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Default key list file, read from the working directory.
pub const DEFAULT_KEYS_FILE: &str = "keys.txt";

/// Redeem a batch of product keys on a storefront account.
///
/// Keys are redeemed one at a time in file order. When the storefront
/// rate-limits the account, the run waits and retries the same key until
/// the limit lifts.
#[derive(Parser, Debug, Clone)]
#[command(name = "redeemer")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Key list file, one key per line ("-" reads standard input)
    #[arg(short = 'k', long, default_value = DEFAULT_KEYS_FILE)]
    pub keys: PathBuf,

    /// Keys to redeem instead of reading the key list file
    #[arg(value_name = "KEY")]
    pub key_args: Vec<String>,

    /// Storefront account name (skips the login prompt)
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Storefront base URL
    #[arg(long, value_parser = parse_storefront_url)]
    pub storefront_url: Option<Url>,

    /// Encrypted session file location
    #[arg(long)]
    pub session_file: Option<PathBuf>,

    /// Do not save a freshly captured session for later runs
    #[arg(long)]
    pub no_save_session: bool,

    /// Delete the saved session and exit
    #[arg(long)]
    pub logout: bool,

    /// Seconds of rate-limit wait between retries of the same key (1-3600)
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub retry_interval: u64,

    /// Wait indicator tick in milliseconds (10-60000)
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(10..=60000))]
    pub tick_ms: u64,

    /// Disable colored log output
    #[arg(long)]
    pub no_color: bool,
}

fn parse_storefront_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|error| format!("invalid URL '{raw}': {error}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("storefront URL must use http or https, got '{raw}'"));
    }
    if url.host_str().is_none() {
        return Err(format!("storefront URL has no host: '{raw}'"));
    }
    Ok(url)
}
