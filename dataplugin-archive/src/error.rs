//! Error types for dataplugin-archive.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while packing, unpacking, or hashing archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The directory to archive does not exist.
    #[error("directory does not exist: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// The archive is missing or is not a readable gzip/tar stream.
    #[error("cannot open archive {path}: {source}")]
    ArchiveOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An extracted file or directory could not be created.
    #[error("cannot extract to {path}: {source}")]
    ExtractIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An entry path would escape the extraction directory.
    #[error("refusing to extract unsafe entry path '{path}'")]
    UnsafeEntryPath { path: PathBuf },

    /// Any other I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`ArchiveError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn open_err(path: impl Into<PathBuf>, source: std::io::Error) -> ArchiveError {
    ArchiveError::ArchiveOpen {
        path: path.into(),
        source,
    }
}

pub(crate) fn extract_err(path: impl Into<PathBuf>, source: std::io::Error) -> ArchiveError {
    ArchiveError::ExtractIo {
        path: path.into(),
        source,
    }
}
