//! Folder enumeration: LIST, then per-folder SELECT/SEARCH/FETCH of
//! message metadata, without downloading any bodies.

use crate::connection::ImapSession;
use crate::error::{Error, Result};
use crate::idle::IdleKeeper;
use crate::manifest::{partition_into_buffers, FolderManifest, MessageMeta, SpecialUse};
use crate::mime::{decode_mime_header, NO_SUBJECT};
use futures::TryStreamExt;
use tracing::debug;

/// One LIST'd mailbox: its name, hierarchy delimiter, and special-use
/// attributes, before anything inside it has been enumerated.
#[derive(Debug, Clone)]
pub struct MailboxEntry {
    pub name: String,
    pub delimiter: Option<char>,
    pub special_use: Vec<SpecialUse>,
}

/// Recognize a special-use attribute regardless of the exact `Debug`
/// shape `async-imap`'s `NameAttribute` prints it in (base IMAP
/// attributes have dedicated variants; RFC 6154 special-use ones
/// typically surface as a `Custom` wrapping the literal flag name).
fn special_use_from_debug(text: &str) -> Option<SpecialUse> {
    let lower = text.to_ascii_lowercase();
    if lower.contains("archive") {
        Some(SpecialUse::Archive)
    } else if lower.contains("junk") {
        Some(SpecialUse::Junk)
    } else if lower.contains("drafts") {
        Some(SpecialUse::Drafts)
    } else if lower.contains("trash") {
        Some(SpecialUse::Trash)
    } else if lower.contains("sent") {
        Some(SpecialUse::Sent)
    } else {
        None
    }
}

/// LIST every mailbox under `root` (the configured `--source-root` /
/// `--destination-root`, if any). Source-mailbox filtering (when in
/// effect) is applied by the caller, which also needs to account for
/// the filtered-out names in the reported counters.
pub async fn list_mailboxes(session: &mut ImapSession, root: Option<&str>) -> Result<Vec<MailboxEntry>> {
    let names = session
        .list(root, Some("*"))
        .await
        .map_err(|e| Error::Imap(format!("LIST failed: {e}")))?;
    let names: Vec<_> = names
        .try_collect()
        .await
        .map_err(|e| Error::Imap(format!("LIST failed while reading response: {e}")))?;

    let mut entries = Vec::new();
    for name in names {
        let mailbox_name = name.name().to_string();
        let delimiter = name.delimiter().and_then(|d| d.chars().next());
        let special_use = name
            .attributes()
            .iter()
            .filter_map(|attr| special_use_from_debug(&format!("{attr:?}")))
            .collect();
        entries.push(MailboxEntry {
            name: mailbox_name,
            delimiter,
            special_use,
        });
    }
    Ok(entries)
}

/// SELECT a folder and pull UID + size + subject + message-id for
/// every message in it (or, in incremental mode, every message not
/// already known to the destination — filtering on that is the
/// caller's job, this just fetches everything present).
///
/// UIDs are FETCHed `buffer_size` at a time rather than in one giant
/// command, so a folder with hundreds of thousands of messages doesn't
/// tie up the working session for one unbroken round trip.
/// After each buffer, `idle` (the keeper parked on the *other* side, if
/// any) is ticked with the rows just processed and transparently
/// refreshed once its interval is crossed.
pub async fn enumerate_folder(
    session: &mut ImapSession,
    entry: &MailboxEntry,
    buffer_size: usize,
    idle: &mut Option<IdleKeeper>,
) -> Result<FolderManifest> {
    session
        .select(&entry.name)
        .await
        .map_err(|e| Error::Imap(format!("failed to select {:?}: {e}", entry.name)))?;

    let uids = session
        .uid_search("ALL")
        .await
        .map_err(|e| Error::Imap(format!("SEARCH failed on {:?}: {e}", entry.name)))?;
    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable();

    let mut manifest = FolderManifest::new(
        entry.name.clone(),
        entry.delimiter,
        entry.special_use.clone(),
    );
    if uids.is_empty() {
        return Ok(manifest);
    }

    for buffer in partition_into_buffers(&uids, buffer_size) {
        let uid_set = buffer
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let fetches = session
            .uid_fetch(&uid_set, "(UID RFC822.SIZE ENVELOPE)")
            .await
            .map_err(|e| Error::Imap(format!("FETCH failed on {:?}: {e}", entry.name)))?;
        let fetches: Vec<_> = fetches
            .try_collect()
            .await
            .map_err(|e| Error::Imap(format!("FETCH failed while reading response on {:?}: {e}", entry.name)))?;

        for fetch in &fetches {
            let Some(uid) = fetch.uid else { continue };
            let size = u64::from(fetch.size.unwrap_or(0));
            let Some(envelope) = fetch.envelope() else {
                manifest.no_envelope += 1;
                continue;
            };
            let subject = envelope
                .subject
                .as_ref()
                .map(|s| decode_mime_header(&String::from_utf8_lossy(s)))
                .unwrap_or_else(|| NO_SUBJECT.to_string());
            let message_id = envelope
                .message_id
                .as_ref()
                .map(std::vec::Vec::from)
                .unwrap_or_default();
            manifest.push(
                uid,
                MessageMeta {
                    size,
                    subject,
                    message_id,
                },
            );
        }

        IdleKeeper::tick_and_refresh(idle, fetches.len() as u64).await?;
    }

    if manifest.no_envelope > 0 {
        debug!(
            "{} of {} messages in {:?} had no parseable ENVELOPE",
            manifest.no_envelope,
            manifest.uids.len() as u64 + manifest.no_envelope,
            entry.name
        );
    }
    Ok(manifest)
}
