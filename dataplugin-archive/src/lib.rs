//! # dataplugin-archive
//!
//! Reproducible gzip-compressed tar archives of a fixture directory.
//!
//! Call [`create_archive`] to pack a directory and get its [`ContentHash`],
//! [`extract_archive`] to unpack one, and [`hash_file`] to fingerprint any
//! file with the same digest.
//!
//! [`ContentHash`]: dataplugin_core::ContentHash

pub mod error;
pub mod hasher;
pub mod reader;
pub mod writer;

pub use error::ArchiveError;
pub use hasher::{copy_chunked, hash_file, hash_reader, CHUNK_SIZE};
pub use reader::{extract_archive, list_entries, ArchiveReader};
pub use writer::{create_archive, ArchiveWriter};
