//! Error types for dataplugin-sync.

use std::path::PathBuf;

use thiserror::Error;

use dataplugin_archive::ArchiveError;
use dataplugin_core::{ContentHash, LedgerError};

/// All errors that can end an orchestrated action.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the archive writer, reader, or hasher.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// An error from the signature ledger.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No ledger file was found or given.
    #[error("No ini file configured.")]
    LedgerMissing,

    /// The ledger has no line to record a new signature on.
    #[error("Signature not found in ini file {}", path.display())]
    SignatureMissing { path: PathBuf },

    /// No transport is registered for the location's scheme.
    #[error("unsupported location '{location}': no transport for scheme '{scheme}'")]
    UnsupportedLocation { location: String, scheme: String },

    /// The working archive does not match the recorded signature.
    #[error("archive hash {actual} does not match signature '{expected}'")]
    HashMismatch {
        expected: String,
        actual: ContentHash,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
