//! IMAP message flags
//!
//! Provides a strongly-typed enum for IMAP flags instead of raw
//! strings. Standard system flags have dedicated variants; arbitrary
//! keyword flags use the `Keyword` variant.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

/// An IMAP message flag.
///
/// System flags (prefixed with `\` in the IMAP protocol) have
/// dedicated variants. User-defined keyword flags use [`Flag::Keyword`].
///
/// # Examples
///
/// ```
/// use imap_replicate::Flag;
///
/// let seen = Flag::Seen;
/// assert_eq!(seen.as_imap_str(), "\\Seen");
///
/// let kw = Flag::Keyword("$Important".to_string());
/// assert_eq!(kw.as_imap_str(), "$Important");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
    /// Session-only flag reported by the server, never set by a client
    /// (`\Recent`). Always rejected on APPEND.
    Recent,
    /// A user-defined keyword flag (no `\` prefix).
    Keyword(String),
}

impl Flag {
    /// The IMAP wire representation of this flag.
    ///
    /// System flags include the leading backslash (e.g. `\Seen`).
    /// Keyword flags are returned as-is.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(kw) => kw,
        }
    }

    /// Convert from the flag type `async-imap` hands back on FETCH.
    #[must_use]
    pub fn from_async(flag: &async_imap::types::Flag<'_>) -> Self {
        match flag {
            async_imap::types::Flag::Seen => Self::Seen,
            async_imap::types::Flag::Answered => Self::Answered,
            async_imap::types::Flag::Flagged => Self::Flagged,
            async_imap::types::Flag::Deleted => Self::Deleted,
            async_imap::types::Flag::Draft => Self::Draft,
            async_imap::types::Flag::Recent => Self::Recent,
            async_imap::types::Flag::MayCreate => Self::Keyword("\\*".to_string()),
            async_imap::types::Flag::Custom(c) => Self::Keyword(c.to_string()),
            other => Self::Keyword(format!("{other:?}")),
        }
    }

    /// Convert to the flag type `async-imap` expects when building a
    /// STORE or APPEND command.
    #[must_use]
    pub fn to_async(&self) -> async_imap::types::Flag<'static> {
        match self {
            Self::Seen => async_imap::types::Flag::Seen,
            Self::Answered => async_imap::types::Flag::Answered,
            Self::Flagged => async_imap::types::Flag::Flagged,
            Self::Deleted => async_imap::types::Flag::Deleted,
            Self::Draft => async_imap::types::Flag::Draft,
            Self::Recent => async_imap::types::Flag::Recent,
            Self::Keyword(kw) => async_imap::types::Flag::Custom(Cow::Owned(kw.clone())),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

/// The set of flag tokens that must never be copied to the
/// destination, case-insensitively compared.
///
/// `\Recent` is always denied: it is assigned by the server on
/// delivery and rejected by every compliant server if sent on APPEND.
#[derive(Debug, Clone)]
pub struct DeniedFlags {
    tokens: HashSet<String>,
}

impl DeniedFlags {
    /// Build the denied set from the base `\recent` entry plus any
    /// user-supplied extra tokens (`--denied-flags`).
    #[must_use]
    pub fn new(extra: &[String]) -> Self {
        let mut tokens: HashSet<String> = HashSet::new();
        tokens.insert("\\recent".to_string());
        for tok in extra {
            let lower = tok.to_ascii_lowercase();
            let token = if lower.starts_with('\\') { lower } else { format!("\\{lower}") };
            tokens.insert(token);
        }
        Self { tokens }
    }

    #[must_use]
    pub fn is_denied(&self, flag: &Flag) -> bool {
        self.tokens.contains(&flag.as_imap_str().to_ascii_lowercase())
    }

    /// Return only the flags that are not denied, preserving order.
    #[must_use]
    pub fn filter(&self, flags: &[Flag]) -> Vec<Flag> {
        flags
            .iter()
            .filter(|f| !self.is_denied(f))
            .cloned()
            .collect()
    }
}
