//! QUOTA extension (RFC 2087) support
//!
//! `async-imap` has no typed wrapper for GETQUOTAROOT, so we issue it
//! as a raw command the same way the connection layer issues
//! STARTTLS, and parse the `* QUOTA` response line ourselves. A
//! server that doesn't support the extension (or denies the command)
//! is treated as "no quota information available", not a hard error:
//! the engine then proceeds with the quota gate skipped and a notice
//! printed.

use crate::connection::ImapSession;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static QUOTA_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\* QUOTA\s+"[^"]*"\s+\(STORAGE\s+(\d+)\s+(\d+)\)"#).unwrap());

/// Usage and limit for one quota root, in kilobytes (the unit the
/// STORAGE resource is always reported in).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub usage_kb: u64,
    pub limit_kb: u64,
}

impl Quota {
    #[must_use]
    pub fn free_kb(self) -> u64 {
        self.limit_kb.saturating_sub(self.usage_kb)
    }
}

/// Query the quota root for `mailbox_root` (conventionally the empty
/// string, meaning "the default quota root"). Returns `None` when the
/// server doesn't support QUOTA or the command otherwise fails.
pub async fn get_quota(session: &mut ImapSession, mailbox_root: &str) -> Option<Quota> {
    let command = format!("GETQUOTAROOT \"{mailbox_root}\"");
    let response = match session.run_command_and_read_response(&command).await {
        Ok(resp) => resp,
        Err(e) => {
            debug!("GETQUOTAROOT failed, treating as unsupported: {e}");
            return None;
        }
    };
    let text = String::from_utf8_lossy(&response);
    parse_quota_response(&text)
}

fn parse_quota_response(text: &str) -> Option<Quota> {
    let caps = QUOTA_LINE_RE.captures(text)?;
    let usage_kb = caps.get(1)?.as_str().parse().ok()?;
    let limit_kb = caps.get(2)?.as_str().parse().ok()?;
    Some(Quota { usage_kb, limit_kb })
}
