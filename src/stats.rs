//! Run counters and the end-of-run human-readable report.

use crate::format::{beautysized, colorize, CYAN, GREEN, RED, YELLOW};
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;

/// Placeholder for every field of a manifest-lookup-miss error record
/// whose real value is unknown (size, subject, message-id, ...).
pub const UNKNOWN_FIELD: &str = "(unknown)";

/// A single per-message failure recorded during transfer. Kept as
/// structured data, not an `Error`: one failing message must never
/// abort the whole run unless `--abort-on-error` was passed.
#[derive(Debug, Clone, Serialize)]
pub struct TransferError {
    pub folder: String,
    pub uid: u32,
    pub subject: String,
    pub reason: String,
}

/// Per-reason counts for folders that were not created on the
/// destination.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SkippedFolders {
    pub empty: u64,
    pub by_mailbox: u64,
    pub already_exists: u64,
}

impl SkippedFolders {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.empty + self.by_mailbox + self.already_exists
    }
}

/// Per-reason counts for messages that were never APPENDed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SkippedMails {
    pub zero_size: u64,
    pub max_size: u64,
    pub no_envelope: u64,
    pub max_line_length: u64,
    pub already_exists: u64,
}

impl SkippedMails {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.zero_size + self.max_size + self.no_envelope + self.max_line_length + self.already_exists
    }
}

/// The skip reason for one message, as produced by the transfer skip
/// ladder (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailSkipReason {
    ZeroSize,
    MaxSize,
    NoEnvelope,
    MaxLineLength,
    AlreadyExists,
}

/// The skip reason for one folder, as produced by the transfer driver
/// (§4.F step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderSkipReason {
    Empty,
    ByMailbox,
    AlreadyExists,
}

/// Running totals for one migration, accumulated as folders and
/// messages are processed.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub folders_created: u64,
    pub messages_transferred: u64,
    pub bytes_transferred: u64,
    pub errors: u64,
    pub skipped_folders: SkippedFolders,
    pub skipped_mails: SkippedMails,
    pub transfer_errors: Vec<TransferError>,
    pub elapsed: Duration,
}

impl Counters {
    pub fn record_transferred(&mut self, size: u64) {
        self.messages_transferred += 1;
        self.bytes_transferred += size;
    }

    pub fn record_skip(&mut self, reason: MailSkipReason) {
        match reason {
            MailSkipReason::ZeroSize => self.skipped_mails.zero_size += 1,
            MailSkipReason::MaxSize => self.skipped_mails.max_size += 1,
            MailSkipReason::NoEnvelope => self.skipped_mails.no_envelope += 1,
            MailSkipReason::MaxLineLength => self.skipped_mails.max_line_length += 1,
            MailSkipReason::AlreadyExists => self.skipped_mails.already_exists += 1,
        }
    }

    pub fn record_error(&mut self, folder: &str, uid: u32, subject: impl Into<String>, reason: impl Into<String>) {
        self.errors += 1;
        self.transfer_errors.push(TransferError {
            folder: folder.to_string(),
            uid,
            subject: subject.into(),
            reason: reason.into(),
        });
    }

    pub fn record_skipped_folder(&mut self, reason: FolderSkipReason) {
        match reason {
            FolderSkipReason::Empty => self.skipped_folders.empty += 1,
            FolderSkipReason::ByMailbox => self.skipped_folders.by_mailbox += 1,
            FolderSkipReason::AlreadyExists => self.skipped_folders.already_exists += 1,
        }
    }

    #[must_use]
    pub fn messages_skipped(&self) -> u64 {
        self.skipped_mails.total()
    }
}

/// Renders a [`Counters`] as the colorized (or plain) end-of-run
/// summary.
pub struct Reporter {
    colors: bool,
}

impl Reporter {
    #[must_use]
    pub fn new(colors: bool) -> Self {
        Self { colors }
    }

    #[must_use]
    pub fn render(&self, counters: &Counters) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", colorize("Migration summary", CYAN, self.colors));
        let _ = writeln!(out, "  folders created:      {}", counters.folders_created);
        let _ = writeln!(
            out,
            "  messages transferred: {} ({})",
            colorize(&counters.messages_transferred.to_string(), GREEN, self.colors),
            beautysized(counters.bytes_transferred / 1024)
        );
        let _ = writeln!(out, "  elapsed:               {:.1}s", counters.elapsed.as_secs_f64());

        let skipped_mails = counters.messages_skipped();
        if skipped_mails > 0 {
            let _ = writeln!(
                out,
                "  messages skipped:     {}",
                colorize(&skipped_mails.to_string(), YELLOW, self.colors)
            );
            let m = &counters.skipped_mails;
            let _ = writeln!(
                out,
                "    zero_size={} max_size={} no_envelope={} max_line_length={} already_exists={}",
                m.zero_size, m.max_size, m.no_envelope, m.max_line_length, m.already_exists
            );
        }
        if counters.errors > 0 {
            let _ = writeln!(
                out,
                "  errors:               {}",
                colorize(&counters.errors.to_string(), RED, self.colors)
            );
            for err in &counters.transfer_errors {
                let _ = writeln!(
                    out,
                    "    [{}] uid {} {:?}: {}",
                    err.folder, err.uid, err.subject, err.reason
                );
            }
        }
        let skipped_folders = counters.skipped_folders.total();
        if skipped_folders > 0 {
            let f = &counters.skipped_folders;
            let _ = writeln!(
                out,
                "  folders skipped:      {}",
                colorize(&skipped_folders.to_string(), YELLOW, self.colors)
            );
            let _ = writeln!(
                out,
                "    empty={} by_mailbox={} already_exists={}",
                f.empty, f.by_mailbox, f.already_exists
            );
        }
        out
    }

    pub fn print(&self, counters: &Counters) {
        print!("{}", self.render(counters));
    }

    /// Print the JSON rendering of `counters` to stdout (`--json`).
    pub fn print_json(counters: &Counters) {
        match serde_json::to_string_pretty(&Summary::from(counters)) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("failed to render JSON summary: {e}"),
        }
    }
}

/// JSON-serializable projection of [`Counters`], for `--json` output.
/// Mirrors the plain-text summary field-for-field so scripts consuming
/// one can be ported to the other without surprises. A dedicated type
/// rather than deriving `Serialize` on `Counters` itself, since
/// `Duration` has no canonical JSON shape — here it becomes a plain
/// `elapsed_secs: f64`.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub folders_created: u64,
    pub messages_transferred: u64,
    pub bytes_transferred: u64,
    pub elapsed_secs: f64,
    pub errors: u64,
    pub skipped_folders: SkippedFolders,
    pub skipped_mails: SkippedMails,
    pub transfer_errors: Vec<TransferError>,
}

impl From<&Counters> for Summary {
    fn from(counters: &Counters) -> Self {
        Self {
            folders_created: counters.folders_created,
            messages_transferred: counters.messages_transferred,
            bytes_transferred: counters.bytes_transferred,
            elapsed_secs: counters.elapsed.as_secs_f64(),
            errors: counters.errors,
            skipped_folders: counters.skipped_folders,
            skipped_mails: counters.skipped_mails,
            transfer_errors: counters.transfer_errors.clone(),
        }
    }
}
