//! Config file loading and merging with CLI flags.
//!
//! The config file is a flat `key = value` list at
//! `$XDG_CONFIG_HOME/redeemer/config.toml` (or `$HOME/.config/redeemer/config.toml`).
//! Values given explicitly on the command line always win.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use redeemer_core::redeem::constants::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};
use url::Url;

use crate::cli::Args;

/// File configuration for redeemer defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FileConfig {
    /// Default key list file.
    pub(crate) keys_file: Option<PathBuf>,
    /// Default storefront account name.
    pub(crate) username: Option<String>,
    /// Storefront base URL.
    pub(crate) storefront_url: Option<Url>,
    /// Encrypted session file location.
    pub(crate) session_file: Option<PathBuf>,
    /// Whether fresh sessions are saved.
    pub(crate) save_session: Option<bool>,
    /// Seconds between rate-limit retries.
    pub(crate) retry_interval_secs: Option<u64>,
    /// Wait indicator tick in milliseconds.
    pub(crate) tick_ms: Option<u64>,
    /// HTTP connect timeout in seconds.
    pub(crate) connect_timeout_secs: Option<u64>,
    /// Whole-request timeout in seconds.
    pub(crate) request_timeout_secs: Option<u64>,
    /// Default verbosity mode.
    pub(crate) verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against the CLI constraints.
    pub(crate) fn validate(&self) -> Result<()> {
        validate_range("retry_interval_secs", self.retry_interval_secs, 1, 3600)?;
        validate_range("tick_ms", self.tick_ms, 10, 60_000)?;
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600)?;
        validate_range("request_timeout_secs", self.request_timeout_secs, 1, 3600)?;
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
}

/// Which arguments the operator typed on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) keys: bool,
    pub(crate) storefront_url: bool,
    pub(crate) session_file: bool,
    pub(crate) no_save_session: bool,
    pub(crate) retry_interval: bool,
    pub(crate) tick_ms: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

/// Effective HTTP timeouts after config merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HttpTimeouts {
    pub(crate) connect: Duration,
    pub(crate) request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Parses process arguments and records which came from the command line.
pub(crate) fn parse_cli_with_sources() -> (Args, CliValueSources) {
    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    (args, cli_sources(&matches))
}

fn cli_sources(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        keys: is_commandline_value(matches, "keys"),
        storefront_url: is_commandline_value(matches, "storefront_url"),
        session_file: is_commandline_value(matches, "session_file"),
        no_save_session: is_commandline_value(matches, "no_save_session"),
        retry_interval: is_commandline_value(matches, "retry_interval"),
        tick_ms: is_commandline_value(matches, "tick_ms"),
        verbose: is_commandline_value(matches, "verbose"),
        quiet: is_commandline_value(matches, "quiet"),
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Fills arguments the operator did not type from the config file.
pub(crate) fn apply_config_defaults(
    mut args: Args,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Args {
    let Some(file_config) = file_config else {
        return args;
    };

    if !cli_sources.keys
        && let Some(keys_file) = &file_config.keys_file
    {
        args.keys.clone_from(keys_file);
    }

    if args.username.is_none() {
        args.username.clone_from(&file_config.username);
    }

    if !cli_sources.storefront_url
        && let Some(url) = &file_config.storefront_url
    {
        args.storefront_url = Some(url.clone());
    }

    if !cli_sources.session_file
        && let Some(path) = &file_config.session_file
    {
        args.session_file = Some(path.clone());
    }

    if !cli_sources.no_save_session
        && let Some(save) = file_config.save_session
    {
        args.no_save_session = !save;
    }

    if !cli_sources.retry_interval
        && let Some(secs) = file_config.retry_interval_secs
    {
        args.retry_interval = secs;
    }

    if !cli_sources.tick_ms
        && let Some(tick_ms) = file_config.tick_ms
    {
        args.tick_ms = tick_ms;
    }

    if !cli_sources.verbose
        && !cli_sources.quiet
        && let Some(verbosity) = file_config.verbosity
    {
        match verbosity {
            VerbositySetting::Default => {
                args.quiet = false;
                args.verbose = 0;
            }
            VerbositySetting::Verbose => {
                args.quiet = false;
                args.verbose = 1;
            }
            VerbositySetting::Quiet => {
                args.quiet = true;
                args.verbose = 0;
            }
        }
    }

    args
}

/// Resolves HTTP timeouts from the config file.
pub(crate) fn resolve_http_timeouts(file_config: Option<&FileConfig>) -> HttpTimeouts {
    let mut timeouts = HttpTimeouts::default();
    let Some(file_config) = file_config else {
        return timeouts;
    };
    if let Some(secs) = file_config.connect_timeout_secs {
        timeouts.connect = Duration::from_secs(secs);
    }
    if let Some(secs) = file_config.request_timeout_secs {
        timeouts.request = Duration::from_secs(secs);
    }
    timeouts
}

/// Returns true when a verbosity flag was typed and should override `RUST_LOG`.
pub(crate) fn should_force_cli_log_level(cli_sources: &CliValueSources) -> bool {
    cli_sources.verbose || cli_sources.quiet
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/redeemer/config.toml`
/// 2. `$HOME/.config/redeemer/config.toml`
#[must_use]
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("redeemer")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("redeemer")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub(crate) fn load_default_file_config() -> Result<Option<FileConfig>> {
    let Some(path) = resolve_default_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    load_file_config(&path).map(Some)
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "keys_file" => {
                cfg.keys_file = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "username" => {
                cfg.username = Some(parse_string_literal(value).with_context(context)?);
            }
            "storefront_url" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.storefront_url = Some(Url::parse(&parsed).with_context(context)?);
            }
            "session_file" => {
                cfg.session_file = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "save_session" => {
                cfg.save_session = Some(parse_boolean(value).with_context(context)?);
            }
            "retry_interval_secs" => {
                cfg.retry_interval_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "tick_ms" => {
                cfg.tick_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "request_timeout_secs" => {
                cfg.request_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    let Some(inner) = raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        bail!("Expected double-quoted string");
    };
    Ok(inner.to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        _ => bail!("Expected one of: default, verbose, quiet"),
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
