//! Error types for imap-replicate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("login failed: {0}")]
    Login(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("quota check failed: destination free space ({dest_free_kb} KB) is less than source usage ({source_usage_kb} KB)")]
    InsufficientQuota {
        dest_free_kb: u64,
        source_usage_kb: u64,
    },

    #[error("unresolved folder redirection rule(s): {0:?}")]
    UnresolvedRedirect(Vec<String>),

    #[error("folder creation failed for {folder:?}: {message}")]
    CreateFolder { folder: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
