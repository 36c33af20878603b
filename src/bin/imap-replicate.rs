#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for the one-shot IMAP mailbox replicator

use clap::Parser;
use imap_replicate::{
    DestinationOptions, Encryption, EndpointConfig, Engine, RedirectRule, RunOptions, SourceOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imap-replicate")]
#[command(about = "One-shot IMAP mailbox replicator for account migrations and backups")]
struct Args {
    /// Source account username
    #[arg(long = "source-user", short = 'u')]
    source_user: String,
    /// Source account password
    #[arg(long = "source-pass", short = 'p')]
    source_pass: String,
    /// Source IMAP server hostname
    #[arg(long = "source-server", short = 's')]
    source_server: String,
    /// Source IMAP port (default: 993 for ssl/tls, 143 for starttls/none)
    #[arg(long = "source-port")]
    source_port: Option<u16>,
    /// Source encryption mode
    #[arg(long = "source-encryption", short = 'e', default_value = "ssl")]
    source_encryption: Encryption,
    /// Restrict source enumeration to this root folder
    #[arg(long = "source-root")]
    source_root: Option<String>,
    /// Whitelist specific source folder names (repeatable)
    #[arg(long = "source-mailbox")]
    source_mailbox: Vec<String>,

    /// Destination account username
    #[arg(long = "destination-user", short = 'U')]
    destination_user: String,
    /// Destination account password
    #[arg(long = "destination-pass", short = 'P')]
    destination_pass: String,
    /// Destination IMAP server hostname
    #[arg(long = "destination-server", short = 'S')]
    destination_server: String,
    /// Destination IMAP port (default: 993 for ssl/tls, 143 for starttls/none)
    #[arg(long = "destination-port")]
    destination_port: Option<u16>,
    /// Destination encryption mode
    #[arg(long = "destination-encryption", short = 'E', default_value = "ssl")]
    destination_encryption: Encryption,
    /// Prefix destination folders under this root
    #[arg(long = "destination-root")]
    destination_root: Option<String>,
    /// Suppress the destination-root prefix when the rewritten name already has it
    #[arg(long = "destination-root-merge")]
    destination_root_merge: bool,
    /// Do not SUBSCRIBE created destination folders
    #[arg(long = "destination-no-subscribe")]
    destination_no_subscribe: bool,

    /// Enumerate only; no CREATE, no APPEND
    #[arg(long = "dry-run", short = 'd')]
    dry_run: bool,
    /// Print source and destination folder listings, then exit
    #[arg(long = "list", short = 'l')]
    list: bool,
    /// Skip messages whose Message-ID already exists in the mapped destination folder
    #[arg(long = "incremental", short = 'i')]
    incremental: bool,
    /// Stop at the first APPEND/CREATE failure
    #[arg(long = "abort-on-error")]
    abort_on_error: bool,
    /// FETCH batch size
    #[arg(long = "buffer-size", short = 'b', default_value_t = 50)]
    buffer_size: usize,
    /// Comma list of extra flag tokens to strip before APPEND
    #[arg(long = "denied-flags", value_delimiter = ',')]
    denied_flags: Vec<String>,
    /// Literal or `SRC*` wildcard folder redirection (repeatable)
    #[arg(long = "redirect")]
    redirect: Vec<String>,
    /// Skip the quota pre-check
    #[arg(long = "ignore-quota")]
    ignore_quota: bool,
    /// Disable special-use folder linking
    #[arg(long = "ignore-folder-flags")]
    ignore_folder_flags: bool,
    /// Skip messages with any line longer than N bytes
    #[arg(long = "max-line-length")]
    max_line_length: Option<usize>,
    /// Skip messages larger than N bytes
    #[arg(long = "max-mail-size")]
    max_mail_size: Option<u64>,
    /// Disable ANSI styling in the summary report
    #[arg(long = "no-colors")]
    no_colors: bool,
    /// Print the end-of-run summary as JSON instead of plain text
    #[arg(long = "json")]
    json: bool,
    /// Drop empty folders from enumeration and creation
    #[arg(long = "skip-empty-folders")]
    skip_empty_folders: bool,
    /// Accept any TLS certificate on either side
    #[arg(long = "ssl-no-verify")]
    ssl_no_verify: bool,
    /// Metadata rows between idle-keeper refreshes during enumeration
    #[arg(long = "idle-refresh-interval", default_value_t = 10_000)]
    idle_refresh_interval: u64,

    /// Raise log verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn install_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let args = Args::parse();
    install_tracing(args.verbose);

    let redirects = args
        .redirect
        .iter()
        .map(|raw| RedirectRule::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let source = EndpointConfig {
        host: args.source_server,
        port: EndpointConfig::resolve_port(args.source_port, args.source_encryption),
        encryption: args.source_encryption,
        tls_verify: !args.ssl_no_verify,
        username: args.source_user,
        password: args.source_pass,
        root: args.source_root,
    };
    let destination = EndpointConfig {
        host: args.destination_server,
        port: EndpointConfig::resolve_port(args.destination_port, args.destination_encryption),
        encryption: args.destination_encryption,
        tls_verify: !args.ssl_no_verify,
        username: args.destination_user,
        password: args.destination_pass,
        root: args.destination_root,
    };
    let source_opts = SourceOptions {
        mailboxes: args.source_mailbox,
    };
    let destination_opts = DestinationOptions {
        root_merge: args.destination_root_merge,
        no_subscribe: args.destination_no_subscribe,
    };
    let run_opts = RunOptions {
        dry_run: args.dry_run,
        list_only: args.list,
        incremental: args.incremental,
        abort_on_error: args.abort_on_error,
        buffer_size: args.buffer_size,
        denied_flags: args.denied_flags,
        redirects,
        ignore_quota: args.ignore_quota,
        ignore_folder_flags: args.ignore_folder_flags,
        max_line_length: args.max_line_length,
        max_mail_size: args.max_mail_size,
        colors: !args.no_colors,
        skip_empty_folders: args.skip_empty_folders,
        idle_refresh_interval: args.idle_refresh_interval,
        output_json: args.json,
    };

    let engine = Engine::new(source, destination, source_opts, destination_opts, run_opts);
    let counters = engine.run().await?;
    if counters.errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}
