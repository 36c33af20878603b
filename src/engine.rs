//! Top-level orchestration: connect both sides, gate on quota, run
//! the three-phase enumerate-source/enumerate-destination/transfer
//! pipeline, and report.

use crate::config::{DestinationOptions, EndpointConfig, RunOptions, SourceOptions};
use crate::connection::{self, ImapSession};
use crate::enumerate::{self, MailboxEntry};
use crate::error::{Error, Result};
use crate::flag::DeniedFlags;
use crate::format::beautysized;
use crate::idle::IdleKeeper;
use crate::manifest::{partition_into_buffers, FolderManifest};
use crate::mapper::FolderMapper;
use crate::quota;
use crate::stats::{Counters, FolderSkipReason, Reporter};
use crate::transfer;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{info, warn};

/// Runs one end-to-end migration and returns the accumulated counters.
pub struct Engine {
    pub source: EndpointConfig,
    pub destination: EndpointConfig,
    pub source_opts: SourceOptions,
    pub destination_opts: DestinationOptions,
    pub run_opts: RunOptions,
}

impl Engine {
    #[must_use]
    pub fn new(
        source: EndpointConfig,
        destination: EndpointConfig,
        source_opts: SourceOptions,
        destination_opts: DestinationOptions,
        run_opts: RunOptions,
    ) -> Self {
        Self {
            source,
            destination,
            source_opts,
            destination_opts,
            run_opts,
        }
    }

    pub async fn run(self) -> Result<Counters> {
        let start = Instant::now();
        let (mut src_session, src_encrypted) = connection::connect(&self.source).await?;
        let (mut dst_session, dst_encrypted) = connection::connect(&self.destination).await?;
        info!("source encrypted: {src_encrypted}, destination encrypted: {dst_encrypted}");

        if !self.run_opts.ignore_quota {
            self.check_quota(&mut src_session, &mut dst_session).await?;
        }

        let all_src_entries = enumerate::list_mailboxes(&mut src_session, self.source.root.as_deref()).await?;
        let dst_entries = enumerate::list_mailboxes(&mut dst_session, self.destination.root.as_deref()).await?;

        let mut counters = Counters::default();
        let src_entries = self.filter_by_mailbox(all_src_entries, &mut counters);

        let src_names: Vec<String> = src_entries.iter().map(|e| e.name.clone()).collect();
        let redirects = &self.run_opts.redirects;
        let dst_special_use: Vec<_> = if self.run_opts.ignore_folder_flags {
            Vec::new()
        } else {
            dst_entries
                .iter()
                .flat_map(|e| e.special_use.iter().map(move |su| (*su, e.name.clone())))
                .collect()
        };

        let src_delimiter = src_entries.first().and_then(|e| e.delimiter).unwrap_or('/');
        let dst_delimiter = dst_entries.first().and_then(|e| e.delimiter).unwrap_or('/');

        let mapper = FolderMapper::new(
            src_delimiter,
            dst_delimiter,
            self.destination.root.as_deref(),
            self.destination_opts.root_merge,
            redirects,
            &dst_special_use,
        );
        mapper.check_redirects_matched(&src_names)?;

        let dst_names_lower: HashSet<String> = dst_entries
            .iter()
            .map(|e| e.name.to_ascii_lowercase())
            .collect();

        // Three phases alternate which side idles and which is
        // actively driven: destination idles while every source
        // folder is fully enumerated, then the two swap so destination
        // can be enumerated in turn, and only then does transfer begin
        // with both sides live. Each transition pairs a `stop` on the
        // previously-idle side with a `start` on the now-idle side.

        // Phase 1: source enumeration, destination idling.
        let has_dst_folders = !dst_entries.is_empty();
        let mut dst_live: Option<ImapSession> = None;
        let mut idle: Option<IdleKeeper> = None;
        if has_dst_folders {
            match IdleKeeper::start_on(dst_session, first_folder_name(&dst_entries), self.run_opts.idle_refresh_interval).await {
                Ok(keeper) => idle = Some(keeper),
                Err(e) => {
                    warn!("destination idle keeper unavailable, continuing without keepalive: {e}");
                    dst_live = Some(connection::connect(&self.destination).await?.0);
                }
            }
        } else {
            dst_live = Some(dst_session);
        }

        let mut source_manifests = Vec::new();
        for entry in &src_entries {
            let manifest = enumerate::enumerate_folder(&mut src_session, entry, self.run_opts.buffer_size, &mut idle).await?;
            counters.skipped_mails.no_envelope += manifest.no_envelope;
            source_manifests.push((entry.clone(), manifest));
        }

        // Hand idle back from destination to source.
        let mut dst_session = match idle.take() {
            Some(keeper) => keeper.stop().await?,
            None => dst_live.expect("set when idle was never started"),
        };

        let has_src_folders = !src_entries.is_empty();
        let mut src_live: Option<ImapSession> = None;
        let mut idle: Option<IdleKeeper> = None;
        if has_src_folders {
            match IdleKeeper::start_on(src_session, first_folder_name(&src_entries), self.run_opts.idle_refresh_interval).await {
                Ok(keeper) => idle = Some(keeper),
                Err(e) => {
                    warn!("source idle keeper unavailable, continuing without keepalive: {e}");
                    src_live = Some(connection::connect(&self.source).await?.0);
                }
            }
        } else {
            src_live = Some(src_session);
        }

        // Phase 2: destination enumeration, source idling. Every
        // destination folder is enumerated into a full manifest here,
        // not just LIST'd by name — both for `--list`'s mail
        // counts/sizes and so incremental dedup never needs its own
        // unprotected fetch mid-transfer.
        let mut dest_manifests = Vec::new();
        for entry in &dst_entries {
            let manifest = enumerate::enumerate_folder(&mut dst_session, entry, self.run_opts.buffer_size, &mut idle).await?;
            dest_manifests.push((entry.clone(), manifest));
        }

        // Both sides leave IDLE before the transfer phase begins.
        let mut src_session = match idle.take() {
            Some(keeper) => keeper.stop().await?,
            None => src_live.expect("set when idle was never started"),
        };

        if self.run_opts.list_only {
            print_listing("source", &source_manifests);
            print_listing("destination", &dest_manifests);
            let _ = src_session.logout().await;
            let _ = dst_session.logout().await;
            return Ok(Counters::default());
        }

        let dst_manifests_by_name: HashMap<String, FolderManifest> = dest_manifests
            .into_iter()
            .map(|(entry, manifest)| (entry.name.to_ascii_lowercase(), manifest))
            .collect();

        let mut sorted: Vec<_> = source_manifests.iter().collect();
        sorted.sort_by_key(|(entry, _)| entry.name.to_ascii_lowercase());

        let denied = DeniedFlags::new(&self.run_opts.denied_flags);

        'folders: for (entry, manifest) in sorted {
            let dest_name = mapper.resolve(&entry.name, &entry.special_use);
            let already_exists = dst_names_lower.contains(&dest_name.to_ascii_lowercase());

            if self.run_opts.dry_run {
                info!("dry-run: would map {:?} -> {:?}", entry.name, dest_name);
                continue;
            }

            if !already_exists && self.run_opts.skip_empty_folders && manifest.is_empty() {
                counters.record_skipped_folder(FolderSkipReason::Empty);
                continue;
            }

            if !already_exists {
                match transfer::ensure_destination_folder(
                    &mut dst_session,
                    &dest_name,
                    already_exists,
                    self.destination_opts.no_subscribe,
                )
                .await
                {
                    Ok(transfer::CreateOutcome::Created) => counters.folders_created += 1,
                    Ok(transfer::CreateOutcome::AlreadyExistsRace) => {
                        counters.record_skipped_folder(FolderSkipReason::AlreadyExists);
                    }
                    Ok(transfer::CreateOutcome::AlreadyExisted) => {}
                    Err(e) => {
                        warn!("failed to create {dest_name:?}: {e}");
                        if self.run_opts.abort_on_error {
                            return Err(e);
                        }
                        continue;
                    }
                }
            }

            let dest_message_ids = if self.run_opts.incremental {
                Some(message_ids_for(&dst_manifests_by_name, &dest_name))
            } else {
                None
            };

            let buffers = partition_into_buffers(&manifest.uids, self.run_opts.buffer_size);
            connection::select(&mut src_session, &entry.name).await?;
            for buffer in buffers {
                let transfer_fut = transfer::transfer_buffer(
                    &mut src_session,
                    &mut dst_session,
                    manifest,
                    &dest_name,
                    &buffer,
                    dest_message_ids.as_ref(),
                    &denied,
                    self.run_opts.max_mail_size,
                    self.run_opts.max_line_length,
                    self.run_opts.abort_on_error,
                    &mut counters,
                );
                let keep_going = tokio::select! {
                    result = transfer_fut => result?,
                    _ = tokio::signal::ctrl_c() => {
                        warn!("interrupted; aborting current folder and proceeding to teardown");
                        break 'folders;
                    }
                };
                if !keep_going {
                    break 'folders;
                }
            }
        }

        if let Err(e) = src_session.logout().await {
            warn!("source logout failed: {e}");
        }
        if let Err(e) = dst_session.logout().await {
            warn!("destination logout failed: {e}");
        }

        counters.elapsed = start.elapsed();
        if self.run_opts.output_json {
            Reporter::print_json(&counters);
        } else {
            Reporter::new(self.run_opts.colors).print(&counters);
        }
        Ok(counters)
    }

    /// Apply the `--source-mailbox` whitelist (if any), counting
    /// filtered-out names under `skipped_folders.by_mailbox`.
    fn filter_by_mailbox(&self, entries: Vec<MailboxEntry>, counters: &mut Counters) -> Vec<MailboxEntry> {
        if self.source_opts.mailboxes.is_empty() {
            return entries;
        }
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            if self.source_opts.mailboxes.iter().any(|m| m == &entry.name) {
                kept.push(entry);
            } else {
                counters.record_skipped_folder(FolderSkipReason::ByMailbox);
            }
        }
        kept
    }

    async fn check_quota(&self, src_session: &mut ImapSession, dst_session: &mut ImapSession) -> Result<()> {
        let source_quota = quota::get_quota(src_session, "").await;
        let dest_quota = quota::get_quota(dst_session, "").await;
        match (source_quota, dest_quota) {
            (Some(src), Some(dst)) => {
                let dest_free = dst.free_kb();
                if dest_free < src.usage_kb {
                    return Err(Error::InsufficientQuota {
                        dest_free_kb: dest_free,
                        source_usage_kb: src.usage_kb,
                    });
                }
            }
            _ => {
                info!("QUOTA not supported by one or both endpoints; skipping pre-check");
            }
        }
        Ok(())
    }
}

fn first_folder_name(entries: &[MailboxEntry]) -> &str {
    entries.first().map_or("INBOX", |e| e.name.as_str())
}

/// Look up the message-IDs already present in a destination folder's
/// precomputed manifest (empty if the folder doesn't exist yet on the
/// destination, or has no usable envelopes).
fn message_ids_for(manifests: &HashMap<String, FolderManifest>, dest_name: &str) -> HashSet<Vec<u8>> {
    manifests.get(&dest_name.to_ascii_lowercase()).map_or_else(HashSet::new, |manifest| {
        manifest
            .messages
            .values()
            .filter(|m| !m.message_id.is_empty())
            .map(|m| m.message_id.clone())
            .collect()
    })
}

/// Print one line per folder as `name (N mails, SIZE)`, sorted
/// case-insensitively.
fn print_listing(label: &str, manifests: &[(MailboxEntry, FolderManifest)]) {
    let mut rows: Vec<(&str, usize, u64)> = manifests
        .iter()
        .map(|(entry, manifest)| (entry.name.as_str(), manifest.uids.len(), manifest.total_size))
        .collect();
    rows.sort_by_key(|(name, ..)| name.to_ascii_lowercase());
    println!("{label} folders:");
    for (name, count, size) in rows {
        println!("  {name} ({count} mails, {})", beautysized(size / 1024));
    }
}
