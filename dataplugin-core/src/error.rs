//! Error types for dataplugin-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building the [`Settings`](crate::Settings) record.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The ledger file exists but could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The signature pattern failed to compile.
    #[error("invalid signature pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The archive location has no usable file name component.
    #[error("archive location '{location}' has no file name")]
    InvalidLocation { location: String },
}

/// Errors raised by the signature ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No line in the ledger matches the signature pattern.
    #[error("Signature not found in config {path}")]
    SignatureNotFound { path: PathBuf },
}

/// A string could not be parsed as a [`ContentHash`](crate::ContentHash).
#[derive(Debug, Error, PartialEq)]
pub enum HashParseError {
    #[error("invalid hex digest: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("digest is {len} bytes, expected 20")]
    Length { len: usize },
}

pub(crate) fn config_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn ledger_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.into(),
        source,
    }
}
