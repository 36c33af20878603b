//! Endpoint and run configuration
//!
//! Credentials and every other run parameter arrive as plain values
//! built by the CLI layer (see `src/bin/imap-replicate.rs`); this
//! module carries no environment-variable or config-file loading
//! (out of scope for the engine, per design).

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// One of the four encryption modes a side can be opened under.
///
/// `Ssl` and `Tls` are synonyms for implicit TLS: the TCP connection
/// is wrapped in TLS before any IMAP command is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    Ssl,
    Tls,
    StartTls,
    None,
}

impl Encryption {
    /// The conventional default port for this encryption mode: 993
    /// for implicit TLS, 143 for STARTTLS or plaintext.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Ssl | Self::Tls => 993,
            Self::StartTls | Self::None => 143,
        }
    }

    #[must_use]
    pub const fn is_implicit_tls(self) -> bool {
        matches!(self, Self::Ssl | Self::Tls)
    }
}

impl FromStr for Encryption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ssl" => Ok(Self::Ssl),
            "tls" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            "none" => Ok(Self::None),
            other => Err(Error::Config(format!(
                "unknown encryption mode {other:?}, expected one of ssl, tls, starttls, none"
            ))),
        }
    }
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ssl => "ssl",
            Self::Tls => "tls",
            Self::StartTls => "starttls",
            Self::None => "none",
        })
    }
}

/// Connection parameters for one side (source or destination).
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    pub encryption: Encryption,
    pub tls_verify: bool,
    pub username: String,
    pub password: String,
    pub root: Option<String>,
}

impl EndpointConfig {
    /// Resolve the port to use: the user's explicit choice if given,
    /// otherwise the conventional default for `encryption`.
    ///
    /// This is the fix for the historical port-defaulting bug: the
    /// default is only ever applied when the caller did not supply an
    /// explicit port, never via a conditional that silently fails to
    /// trigger.
    #[must_use]
    pub fn resolve_port(explicit: Option<u16>, encryption: Encryption) -> u16 {
        explicit.unwrap_or_else(|| encryption.default_port())
    }
}

/// Source-side options beyond the shared `EndpointConfig`.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Whitelist of source folder names (`--source-mailbox`, repeatable).
    /// Empty means "no filter, enumerate everything".
    pub mailboxes: Vec<String>,
}

/// Destination-side options beyond the shared `EndpointConfig`.
#[derive(Debug, Clone, Default)]
pub struct DestinationOptions {
    /// Suppress the destination-root prefix when the rewritten name
    /// already equals or starts with it.
    pub root_merge: bool,
    /// Skip SUBSCRIBE after a successful CREATE.
    pub no_subscribe: bool,
}

/// A user-supplied `SRC:DST` folder redirection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRule {
    pub src: String,
    pub dst: String,
    pub wildcard: bool,
}

impl RedirectRule {
    /// Parse a single `--redirect` argument.
    ///
    /// A rule with no `:` separator is a clean configuration error —
    /// not a panic, not a reference to an undefined value.
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((src, dst)) = raw.split_once(':') else {
            return Err(Error::Config(format!(
                "redirect rule {raw:?} is missing a ':' separator (expected SRC:DST)"
            )));
        };
        if src.is_empty() || dst.is_empty() {
            return Err(Error::Config(format!(
                "redirect rule {raw:?} has an empty SRC or DST"
            )));
        }
        let wildcard = src.ends_with('*');
        let src = if wildcard {
            src[..src.len() - 1].to_string()
        } else {
            src.to_string()
        };
        Ok(Self {
            src,
            dst: dst.to_string(),
            wildcard,
        })
    }
}

/// Parameters controlling how the run behaves, independent of the
/// two endpoints.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub list_only: bool,
    pub incremental: bool,
    pub abort_on_error: bool,
    pub buffer_size: usize,
    /// Extra denied-flag tokens (already lowercased, without the
    /// leading backslash); `\recent` is always included by the
    /// engine regardless of this list.
    pub denied_flags: Vec<String>,
    pub redirects: Vec<RedirectRule>,
    pub ignore_quota: bool,
    pub ignore_folder_flags: bool,
    pub max_line_length: Option<usize>,
    pub max_mail_size: Option<u64>,
    pub colors: bool,
    pub skip_empty_folders: bool,
    pub idle_refresh_interval: u64,
    /// Print the end-of-run summary as JSON instead of the
    /// human-readable report.
    pub output_json: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            list_only: false,
            incremental: false,
            abort_on_error: false,
            buffer_size: 50,
            denied_flags: Vec::new(),
            redirects: Vec::new(),
            ignore_quota: false,
            ignore_folder_flags: false,
            max_line_length: None,
            max_mail_size: None,
            colors: true,
            skip_empty_folders: false,
            idle_refresh_interval: 10_000,
            output_json: false,
        }
    }
}
