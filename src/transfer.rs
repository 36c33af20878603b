//! Per-folder transfer driver: folder creation, buffered FETCH, the
//! skip ladder, and APPEND.

use crate::connection::ImapSession;
use crate::error::{Error, Result};
use crate::flag::{DeniedFlags, Flag};
use crate::manifest::FolderManifest;
use crate::stats::{Counters, MailSkipReason, UNKNOWN_FIELD};
use async_imap::types::Fetch;
use chrono::{DateTime, FixedOffset};
use futures::TryStreamExt;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Whether CREATE failed because the folder is already there. The
/// check is deliberately loose (substring, case-insensitive) because
/// servers word this differently.
#[must_use]
pub fn is_already_exists_failure(message: &str) -> bool {
    message.to_ascii_lowercase().contains("alreadyexists")
}

/// Whether an APPEND response should be read as success. Kept behind
/// one predicate so the recognized-token list can grow without
/// touching call sites.
#[must_use]
pub fn is_recognized_append_success(response: &str) -> bool {
    let lower = response.to_ascii_lowercase();
    lower.contains("append completed") || lower.contains("(success)")
}

/// Result of the CREATE step for one destination folder.
pub enum CreateOutcome {
    AlreadyExisted,
    Created,
    AlreadyExistsRace,
}

/// Ensure `dest_name` exists on the destination, creating and
/// subscribing it if needed. Returns which branch of §4.F step 3 was
/// taken.
pub async fn ensure_destination_folder(
    dest_session: &mut ImapSession,
    dest_name: &str,
    already_exists: bool,
    no_subscribe: bool,
) -> Result<CreateOutcome> {
    if already_exists {
        return Ok(CreateOutcome::AlreadyExisted);
    }
    match dest_session.create(dest_name).await {
        Ok(()) => {
            if !no_subscribe {
                if let Err(e) = dest_session.subscribe(dest_name).await {
                    warn!("SUBSCRIBE failed for {dest_name:?}: {e}");
                }
            }
            Ok(CreateOutcome::Created)
        }
        Err(e) => {
            let message = e.to_string();
            if is_already_exists_failure(&message) {
                Ok(CreateOutcome::AlreadyExistsRace)
            } else {
                Err(Error::CreateFolder {
                    folder: dest_name.to_string(),
                    message,
                })
            }
        }
    }
}

/// One FETCHed source message plus the fields the skip ladder and
/// APPEND need.
struct FetchedMessage {
    uid: u32,
    flags: Vec<Flag>,
    raw: Vec<u8>,
    internal_date: Option<DateTime<FixedOffset>>,
}

fn extract_fetched(fetch: &Fetch) -> Option<FetchedMessage> {
    let uid = fetch.uid?;
    let raw = fetch.body()?.to_vec();
    let flags = fetch.flags().map(|f| Flag::from_async(&f)).collect();
    let internal_date = fetch.internal_date();
    Some(FetchedMessage {
        uid,
        flags,
        raw,
        internal_date,
    })
}

/// Transfer one buffer's worth of UIDs from `src_manifest`'s folder
/// (already selected on `src_session`) to `dest_name` on
/// `dest_session` (already selected/created). Applies the skip ladder
/// from §4.F and updates `counters` accordingly. Returns `Ok(true)`
/// if the caller should keep going, `Ok(false)` if an abort-on-error
/// condition was hit.
pub async fn transfer_buffer(
    src_session: &mut ImapSession,
    dest_session: &mut ImapSession,
    src_manifest: &FolderManifest,
    dest_name: &str,
    uids: &[u32],
    dest_message_ids: Option<&HashSet<Vec<u8>>>,
    denied: &DeniedFlags,
    max_mail_size: Option<u64>,
    max_line_length: Option<usize>,
    abort_on_error: bool,
    counters: &mut Counters,
) -> Result<bool> {
    if uids.is_empty() {
        return Ok(true);
    }
    let uid_set = uids.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
    let fetches = src_session
        .uid_fetch(&uid_set, "(FLAGS RFC822 INTERNALDATE)")
        .await
        .map_err(|e| Error::Imap(format!("FETCH failed on {:?}: {e}", src_manifest.name)))?;
    let fetches: Vec<_> = fetches
        .try_collect()
        .await
        .map_err(|e| Error::Imap(format!("FETCH failed while reading response on {:?}: {e}", src_manifest.name)))?;

    for fetch in &fetches {
        let Some(msg) = extract_fetched(fetch) else {
            counters.record_error(
                &src_manifest.name,
                fetch.uid.unwrap_or(0),
                UNKNOWN_FIELD,
                "metadata lookup failure: message missing from manifest",
            );
            continue;
        };

        let Some(meta) = src_manifest.messages.get(&msg.uid) else {
            counters.record_error(&src_manifest.name, msg.uid, UNKNOWN_FIELD, "metadata lookup failure");
            continue;
        };

        if meta.size == 0 {
            counters.record_skip(MailSkipReason::ZeroSize);
            continue;
        }

        if let Some(limit) = max_mail_size {
            if meta.size > limit {
                counters.record_skip(MailSkipReason::MaxSize);
                continue;
            }
        }

        if let Some(dest_ids) = dest_message_ids {
            if !meta.message_id.is_empty() && dest_ids.contains(&meta.message_id) {
                counters.record_skip(MailSkipReason::AlreadyExists);
                continue;
            }
        }

        if let Some(limit) = max_line_length {
            let too_long = msg.raw.split(|&b| b == b'\n').any(|line| line.len() > limit);
            if too_long {
                counters.record_skip(MailSkipReason::MaxLineLength);
                continue;
            }
        }

        let flags = denied.filter(&msg.flags);
        let append_result = append_message(dest_session, dest_name, &flags, msg.internal_date, &msg.raw).await;
        match append_result {
            Ok(()) => counters.record_transferred(meta.size),
            Err(e) => {
                counters.record_error(&src_manifest.name, msg.uid, meta.subject.as_str(), e.to_string());
                if abort_on_error {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

async fn append_message(
    dest_session: &mut ImapSession,
    dest_name: &str,
    flags: &[Flag],
    internal_date: Option<DateTime<FixedOffset>>,
    raw: &[u8],
) -> Result<()> {
    let async_flags: Vec<async_imap::types::Flag<'static>> = flags.iter().map(Flag::to_async).collect();
    let mut append_cmd = dest_session.append(dest_name, raw);
    if let Some(date) = internal_date {
        append_cmd = append_cmd.internal_date(date);
    }
    if !async_flags.is_empty() {
        append_cmd = append_cmd.flags(async_flags);
    }
    let response = append_cmd
        .finish()
        .await
        .map_err(|e| Error::Imap(format!("APPEND failed: {e}")))?;
    let response_text = String::from_utf8_lossy(&response).into_owned();
    if is_recognized_append_success(&response_text) {
        Ok(())
    } else {
        debug!("unrecognized APPEND response: {response_text}");
        Err(Error::Imap(format!("unknown success message: {response_text}")))
    }
}
