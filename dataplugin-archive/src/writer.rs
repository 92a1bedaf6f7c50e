//! Reproducible archive writer.
//!
//! ## `finish` — publish protocol
//!
//! 1. Entries are appended to `.<name>.tar` (uncompressed staging file).
//! 2. The tar trailer is written and the container padded to a whole record.
//! 3. The container is gzip-compressed into `.<name>.partial` with a fixed
//!    header (mtime from the sentinel, OS byte 255, FNAME = `<name>` minus `.gz`).
//! 4. `.<name>.partial` is renamed to `<name>` (atomic on POSIX).
//! 5. The staging file is removed and the published file is hashed.
//!
//! Every entry is a GNU tar header carrying [`EntryMetadata::sentinel`]
//! instead of filesystem ownership and time, with the checksum field laid
//! out as `%06o\0 `. Directories are visited files-first in name order and
//! the writer never archives its own output or staging files, so identical
//! trees give identical bytes.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use dataplugin_core::{ContentHash, EntryMetadata};
use flate2::{Compression, GzBuilder};
use tar::{EntryType, Header};

use crate::error::{io_err, ArchiveError};
use crate::hasher::{copy_chunked, hash_file};

/// Tar record size; the uncompressed container is padded to a multiple of it.
const RECORD_SIZE: u64 = 10 * 1024;

/// gzip OS byte for "unknown", so the header does not depend on the host.
const GZIP_OS_UNKNOWN: u8 = 255;

/// Width of the header name field; longer paths get a GNU long-name record.
const NAME_FIELD_LEN: usize = 100;

const LONG_NAME_MARKER: &[u8] = b"././@LongLink";

pub struct ArchiveWriter {
    output: PathBuf,
    staging: PathBuf,
    partial: PathBuf,
    builder: Option<tar::Builder<BufWriter<File>>>,
    metadata: EntryMetadata,
    entries: usize,
    /// Canonical output, staging and partial paths; never archived.
    own_files: Vec<PathBuf>,
}

impl ArchiveWriter {
    /// Start an archive that will be published at `output`.
    pub fn create(output: &Path) -> Result<Self, ArchiveError> {
        Self::with_metadata(output, EntryMetadata::sentinel())
    }

    /// Like [`ArchiveWriter::create`] with a caller-chosen metadata record.
    pub fn with_metadata(output: &Path, metadata: EntryMetadata) -> Result<Self, ArchiveError> {
        let staging = hidden_sibling(output, ".tar");
        let partial = hidden_sibling(output, ".partial");
        let own_files =
            canonical_siblings(output, &[staging.as_path(), partial.as_path(), output])?;
        let file = File::create(&staging).map_err(|e| io_err(&staging, e))?;
        let builder = tar::Builder::new(BufWriter::new(file));
        Ok(Self {
            output: output.to_path_buf(),
            staging,
            partial,
            builder: Some(builder),
            metadata,
            entries: 0,
            own_files,
        })
    }

    /// Number of entries appended so far.
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Append every file under `root`, with paths relative to `root`.
    pub fn add_directory(&mut self, root: &Path) -> Result<(), ArchiveError> {
        if !root.is_dir() {
            return Err(ArchiveError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }
        let root = fs::canonicalize(root).map_err(|e| io_err(root, e))?;
        self.add_level(&root, &root)
    }

    /// Files of `dir` in name order, then each subdirectory in name order.
    fn add_level(&mut self, root: &Path, dir: &Path) -> Result<(), ArchiveError> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
            let entry = entry.map_err(|e| io_err(dir, e))?;
            let path = entry.path();
            if self.own_files.contains(&path) {
                tracing::debug!("skipping own output {}", path.display());
                continue;
            }
            // Follow symlinks: a link to a file is archived as that file.
            let meta = fs::metadata(&path).map_err(|e| io_err(&path, e))?;
            if meta.is_dir() {
                dirs.push(entry.file_name());
            } else if meta.is_file() {
                files.push(entry.file_name());
            } else {
                tracing::debug!("skipping special file {}", path.display());
            }
        }
        files.sort();
        dirs.sort();

        for name in files {
            self.add_file(root, &dir.join(name))?;
        }
        for name in dirs {
            self.add_level(root, &dir.join(name))?;
        }
        Ok(())
    }

    fn add_file(&mut self, root: &Path, path: &Path) -> Result<(), ArchiveError> {
        let rel = archive_path(root, path);
        let file = File::open(path).map_err(|e| io_err(path, e))?;
        let meta = file.metadata().map_err(|e| io_err(path, e))?;

        let Some(builder) = self.builder.as_mut() else {
            return Err(io_err(
                &self.staging,
                std::io::Error::other("archive already finished"),
            ));
        };

        let name = rel.as_bytes();
        if name.len() > NAME_FIELD_LEN {
            let long = long_name_header(name.len() as u64 + 1).map_err(|e| io_err(path, e))?;
            let mut data = name.to_vec();
            data.push(0);
            builder
                .append(&long, data.as_slice())
                .map_err(|e| io_err(path, e))?;
        }

        let mut header = Header::new_gnu();
        let keep = name.len().min(NAME_FIELD_LEN);
        header.as_old_mut().name[..keep].copy_from_slice(&name[..keep]);
        header.set_entry_type(EntryType::Regular);
        header.set_size(meta.len());
        header.set_mode(file_mode(&meta));
        apply_metadata(&mut header, &self.metadata).map_err(|e| io_err(path, e))?;
        finalize_cksum(&mut header).map_err(|e| io_err(path, e))?;

        builder
            .append(&header, BufReader::new(file))
            .map_err(|e| io_err(path, e))?;
        self.entries += 1;
        tracing::debug!("archived {rel}");
        Ok(())
    }

    /// Close the container, compress, publish under the output name, and
    /// return the hash of the published file.
    pub fn finish(mut self) -> Result<ContentHash, ArchiveError> {
        let Some(builder) = self.builder.take() else {
            return Err(io_err(
                &self.staging,
                std::io::Error::other("archive already finished"),
            ));
        };

        let mut staged = builder.into_inner().map_err(|e| io_err(&self.staging, e))?;
        pad_to_record(&mut staged).map_err(|e| io_err(&self.staging, e))?;
        let file = staged
            .into_inner()
            .map_err(|e| io_err(&self.staging, e.into_error()))?;
        file.sync_all().map_err(|e| io_err(&self.staging, e))?;
        drop(file);

        self.compress()?;

        fs::rename(&self.partial, &self.output).map_err(|e| io_err(&self.output, e))?;
        fs::remove_file(&self.staging).map_err(|e| io_err(&self.staging, e))?;

        let hash = hash_file(&self.output)?;
        tracing::info!(
            "published {} ({} entries, hash {hash})",
            self.output.display(),
            self.entries
        );
        Ok(hash)
    }

    fn compress(&self) -> Result<(), ArchiveError> {
        let mut src = File::open(&self.staging).map_err(|e| io_err(&self.staging, e))?;
        let dst = File::create(&self.partial).map_err(|e| io_err(&self.partial, e))?;

        let mut encoder = GzBuilder::new()
            .filename(gzip_name(&self.output))
            .mtime(u32::try_from(self.metadata.mtime).unwrap_or(0))
            .operating_system(GZIP_OS_UNKNOWN)
            .write(BufWriter::new(dst), Compression::best());
        copy_chunked(&mut src, &mut encoder).map_err(|e| io_err(&self.partial, e))?;

        let out = encoder.finish().map_err(|e| io_err(&self.partial, e))?;
        let file = out
            .into_inner()
            .map_err(|e| io_err(&self.partial, e.into_error()))?;
        file.sync_all().map_err(|e| io_err(&self.partial, e))?;
        Ok(())
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        // The builder must be closed before its file can be removed.
        self.builder.take();
        for path in [&self.staging, &self.partial] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("could not remove {}: {e}", path.display()),
            }
        }
    }
}

/// Pack `source` into a gzip-compressed tar at `output` and return its hash.
///
/// Nothing is created when `source` is not a directory.
pub fn create_archive(output: &Path, source: &Path) -> Result<ContentHash, ArchiveError> {
    if !source.is_dir() {
        return Err(ArchiveError::DirectoryNotFound {
            path: source.to_path_buf(),
        });
    }
    let mut writer = ArchiveWriter::create(output)?;
    writer.add_directory(source)?;
    writer.finish()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `<dir>/.<name><suffix>`
fn hidden_sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}{suffix}"))
}

/// The gzip FNAME field: the output basename without a trailing `.gz`.
fn gzip_name(output: &Path) -> Vec<u8> {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(".gz").unwrap_or(&name).as_bytes().to_vec()
}

/// POSIX-style path of `path` relative to `root`.
fn archive_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical forms of `paths`, all of which are siblings of `output`.
fn canonical_siblings(output: &Path, paths: &[&Path]) -> Result<Vec<PathBuf>, ArchiveError> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = fs::canonicalize(parent).map_err(|e| io_err(parent, e))?;
    Ok(paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|name| parent.join(name))
        .collect())
}

/// Header of the record carrying a path longer than the name field.
fn long_name_header(size: u64) -> std::io::Result<Header> {
    let mut header = Header::new_gnu();
    header.as_old_mut().name[..LONG_NAME_MARKER.len()].copy_from_slice(LONG_NAME_MARKER);
    header.set_entry_type(EntryType::GNULongName);
    header.set_size(size);
    header.set_mode(0);
    apply_metadata(&mut header, &EntryMetadata::sentinel())?;
    finalize_cksum(&mut header)?;
    Ok(header)
}

/// Write the checksum as six octal digits, NUL, space.
///
/// The value is the same one `set_cksum` computes; only the field layout
/// differs from the tar crate's seven-digit form.
fn finalize_cksum(header: &mut Header) -> std::io::Result<()> {
    header.set_cksum();
    let sum = header.cksum()?;
    let field = format!("{sum:06o}\0 ");
    header.as_old_mut().cksum.copy_from_slice(field.as_bytes());
    Ok(())
}

fn apply_metadata(header: &mut Header, meta: &EntryMetadata) -> std::io::Result<()> {
    header.set_mtime(meta.mtime);
    header.set_uid(meta.uid);
    header.set_gid(meta.gid);
    header.set_username(&meta.uname)?;
    header.set_groupname(&meta.gname)?;
    Ok(())
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> u32 {
    0o644
}

fn pad_to_record<W: Write + Seek>(out: &mut W) -> std::io::Result<()> {
    let len = out.stream_position()?;
    let pad = (RECORD_SIZE - len % RECORD_SIZE) % RECORD_SIZE;
    if pad > 0 {
        out.write_all(&vec![0u8; pad as usize])?;
    }
    out.flush()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
