//! Byte transport between the working archive and the configured location.
//!
//! The local filesystem backend is always available. Other backends are
//! registered per URL scheme on a [`Transports`] set; a location whose scheme
//! has no backend fails with [`SyncError::UnsupportedLocation`].

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use dataplugin_archive::copy_chunked;
use dataplugin_core::Location;

use crate::error::{io_err, SyncError};

/// A byte sink whose contents only become visible on [`commit`](ArchiveSink::commit).
pub trait ArchiveSink: Write {
    /// Flush and publish everything written so far.
    fn commit(self: Box<Self>) -> io::Result<()>;
}

/// One storage backend.
pub trait Transport {
    fn open_read(&self, location: &Location) -> Result<Box<dyn Read>, SyncError>;
    fn open_write(&self, location: &Location) -> Result<Box<dyn ArchiveSink>, SyncError>;
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

impl LocalTransport {
    fn local_path(location: &Location) -> Result<&Path, SyncError> {
        match location {
            Location::Local(path) => Ok(path),
            Location::Remote { scheme, url } => Err(SyncError::UnsupportedLocation {
                location: url.clone(),
                scheme: scheme.clone(),
            }),
        }
    }
}

impl Transport for LocalTransport {
    fn open_read(&self, location: &Location) -> Result<Box<dyn Read>, SyncError> {
        let path = Self::local_path(location)?;
        let file = File::open(path).map_err(|e| io_err(path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self, location: &Location) -> Result<Box<dyn ArchiveSink>, SyncError> {
        let path = Self::local_path(location)?;
        Ok(Box::new(LocalSink::create(path)?))
    }
}

/// Writes to `.<name>.partial` and renames over `<name>` on commit.
struct LocalSink {
    target: PathBuf,
    partial: PathBuf,
    file: Option<BufWriter<File>>,
}

impl LocalSink {
    fn create(target: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial = target.with_file_name(format!(".{name}.partial"));
        let file = File::create(&partial).map_err(|e| io_err(&partial, e))?;
        Ok(Self {
            target: target.to_path_buf(),
            partial,
            file: Some(BufWriter::new(file)),
        })
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("sink already committed"))
    }
}

impl Write for LocalSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl ArchiveSink for LocalSink {
    fn commit(mut self: Box<Self>) -> io::Result<()> {
        let writer = self
            .file
            .take()
            .ok_or_else(|| io::Error::other("sink already committed"))?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.partial, &self.target)?;
        tracing::info!("stored {}", self.target.display());
        Ok(())
    }
}

impl Drop for LocalSink {
    fn drop(&mut self) {
        self.file.take();
        match fs::remove_file(&self.partial) {
            Ok(()) => tracing::warn!("discarded partial transfer {}", self.partial.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("could not remove {}: {e}", self.partial.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// The set of available backends, keyed by URL scheme.
#[derive(Default)]
pub struct Transports {
    local: LocalTransport,
    remote: BTreeMap<String, Box<dyn Transport>>,
}

impl Transports {
    /// Only the local filesystem backend.
    pub fn local_only() -> Self {
        Self::default()
    }

    /// Register `transport` for locations with `scheme` (case-insensitive).
    pub fn register(&mut self, scheme: &str, transport: Box<dyn Transport>) {
        self.remote.insert(scheme.to_ascii_lowercase(), transport);
    }

    pub fn with(mut self, scheme: &str, transport: Box<dyn Transport>) -> Self {
        self.register(scheme, transport);
        self
    }

    /// The backend responsible for `location`.
    pub fn resolve(&self, location: &Location) -> Result<&dyn Transport, SyncError> {
        match location {
            Location::Local(_) => Ok(&self.local as &dyn Transport),
            Location::Remote { scheme, url } => self
                .remote
                .get(scheme)
                .map(|t| t.as_ref())
                .ok_or_else(|| SyncError::UnsupportedLocation {
                    location: url.clone(),
                    scheme: scheme.clone(),
                }),
        }
    }
}

/// Stream `reader` into `sink` in fixed-size chunks, then commit.
///
/// An error before commit drops the sink, which discards partial output.
pub fn transfer(reader: &mut dyn Read, mut sink: Box<dyn ArchiveSink>) -> io::Result<u64> {
    let copied = copy_chunked(reader, &mut sink)?;
    sink.commit()?;
    Ok(copied)
}
