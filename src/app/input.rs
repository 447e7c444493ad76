//! Key list input: positional arguments, a key file, or standard input.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cli::Args;

/// Where the run's keys come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KeySource {
    Arguments(Vec<String>),
    Stdin,
    File(PathBuf),
}

impl KeySource {
    /// Positional keys win over the key file; `-` means standard input.
    pub(crate) fn from_args(args: &Args) -> Self {
        if !args.key_args.is_empty() {
            return Self::Arguments(args.key_args.clone());
        }
        if args.keys == Path::new("-") {
            return Self::Stdin;
        }
        Self::File(args.keys.clone())
    }

    /// Returns true when login prompts would compete with key input for stdin.
    pub(crate) fn reads_stdin(&self) -> bool {
        matches!(self, Self::Stdin)
    }

    /// Reads the keys, one per line, in order.
    pub(crate) fn read_keys(&self) -> Result<Vec<String>> {
        match self {
            Self::Arguments(keys) => Ok(parse_key_lines(&keys.join("\n"))),
            Self::Stdin => {
                let mut buffer = String::new();
                io::stdin()
                    .read_to_string(&mut buffer)
                    .context("Failed to read keys from standard input")?;
                Ok(parse_key_lines(&buffer))
            }
            Self::File(path) => {
                let raw = fs::read_to_string(path).with_context(|| {
                    format!("Cannot read key file '{}'", path.display())
                })?;
                Ok(parse_key_lines(&raw))
            }
        }
    }
}

/// Splits raw text into trimmed keys, dropping blank lines and `#` comments.
pub(crate) fn parse_key_lines(raw: &str) -> Vec<String> {
    raw.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
