//! Consistent archive reader.
//!
//! Extraction writes entry contents only: the recorded mtime and permission
//! bits are never applied, so extracted files carry the destination
//! filesystem's defaults on every platform. Full relative paths are kept.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

use dataplugin_core::{ArchiveEntry, ContentHash, EntryMetadata};
use flate2::read::GzDecoder;
use tar::{Archive, EntryType, Header};

use crate::error::{extract_err, open_err, ArchiveError};
use crate::hasher::{hash_file, CHUNK_SIZE};

type GzArchive = Archive<GzDecoder<BufReader<File>>>;

pub struct ArchiveReader {
    path: PathBuf,
    archive: GzArchive,
}

impl ArchiveReader {
    /// Open `path` for streaming decompression.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path).map_err(|e| open_err(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive: Archive::new(GzDecoder::new(BufReader::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash of the compressed archive bytes, computed in a separate pass.
    pub fn content_hash(&self) -> Result<ContentHash, ArchiveError> {
        hash_file(&self.path)
    }

    /// Enumerate entries in stored order without extracting anything.
    pub fn entries(mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let path = self.path.clone();
        let mut out = Vec::new();
        for entry in self.archive.entries().map_err(|e| open_err(&path, e))? {
            let entry = entry.map_err(|e| open_err(&path, e))?;
            let entry_path = entry.path().map_err(|e| open_err(&path, e))?;
            let header = entry.header();
            out.push(ArchiveEntry {
                path: posix_path(&entry_path),
                size: header.size().map_err(|e| open_err(&path, e))?,
                mode: header.mode().map_err(|e| open_err(&path, e))?,
                metadata: read_metadata(header).map_err(|e| open_err(&path, e))?,
            });
        }
        Ok(out)
    }

    /// Write every entry under `root`, creating directories as needed.
    ///
    /// Returns the number of files written.
    pub fn extract_to(mut self, root: &Path) -> Result<usize, ArchiveError> {
        fs::create_dir_all(root).map_err(|e| extract_err(root, e))?;

        let path = self.path.clone();
        let mut written = 0;
        for entry in self.archive.entries().map_err(|e| open_err(&path, e))? {
            let mut entry = entry.map_err(|e| open_err(&path, e))?;
            let raw = entry
                .path()
                .map_err(|e| open_err(&path, e))?
                .into_owned();
            let dest = root.join(safe_relative(&raw)?);
            let kind = entry.header().entry_type();

            match kind {
                EntryType::Directory => {
                    fs::create_dir_all(&dest).map_err(|e| extract_err(&dest, e))?;
                }
                _ if kind.is_file() => {
                    if let Some(parent) = dest.parent() {
                        fs::create_dir_all(parent).map_err(|e| extract_err(parent, e))?;
                    }
                    write_entry(&mut entry, &dest, &path)?;
                    written += 1;
                    tracing::debug!("extracted {}", dest.display());
                }
                other => {
                    tracing::debug!("skipping {other:?} entry {}", raw.display());
                }
            }
        }
        Ok(written)
    }
}

/// Extract `archive` into `target` and return the archive's hash.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<ContentHash, ArchiveError> {
    let reader = ArchiveReader::open(archive)?;
    let hash = reader.content_hash()?;
    let written = reader.extract_to(target)?;
    tracing::info!(
        "extracted {written} files from {} into {}",
        archive.display(),
        target.display()
    );
    Ok(hash)
}

/// Entries of the archive at `path`, in stored order.
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    ArchiveReader::open(path)?.entries()
}

/// Stream one entry's contents to `dest`.
///
/// Failures reading the entry are blamed on the archive, failures writing
/// on the destination. A file left incomplete by either is removed.
fn write_entry<R: Read>(entry: &mut R, dest: &Path, archive: &Path) -> Result<(), ArchiveError> {
    let file = File::create(dest).map_err(|e| extract_err(dest, e))?;
    let result = copy_entry(entry, BufWriter::new(file), dest, archive);
    if result.is_err() {
        if let Err(e) = fs::remove_file(dest) {
            tracing::warn!("could not remove {}: {e}", dest.display());
        }
    }
    result
}

fn copy_entry<R: Read>(
    entry: &mut R,
    mut out: BufWriter<File>,
    dest: &Path,
    archive: &Path,
) -> Result<(), ArchiveError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match entry.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(open_err(archive, e)),
        };
        out.write_all(&buf[..n]).map_err(|e| extract_err(dest, e))?;
    }
    out.flush().map_err(|e| extract_err(dest, e))
}

/// Reject absolute paths and parent components; drop `.` components.
fn safe_relative(raw: &Path) -> Result<PathBuf, ArchiveError> {
    let mut rel = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafeEntryPath {
                    path: raw.to_path_buf(),
                })
            }
        }
    }
    if rel.as_os_str().is_empty() {
        return Err(ArchiveError::UnsafeEntryPath {
            path: raw.to_path_buf(),
        });
    }
    Ok(rel)
}

fn posix_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_metadata(header: &Header) -> std::io::Result<EntryMetadata> {
    let name = |field: Result<Option<&str>, std::str::Utf8Error>| {
        field.ok().flatten().unwrap_or_default().to_string()
    };
    Ok(EntryMetadata {
        mtime: header.mtime()?,
        uid: header.uid()?,
        uname: name(header.username()),
        gid: header.gid()?,
        gname: name(header.groupname()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::create_archive;
    use tempfile::TempDir;

    fn fixture(root: &Path) -> PathBuf {
        let src = root.join("data");
        fs::create_dir_all(src.join("nested/deeper")).unwrap();
        fs::write(src.join("top.txt"), "top").unwrap();
        fs::write(src.join("nested/same.txt"), "nested").unwrap();
        fs::write(src.join("nested/deeper/same.txt"), "deeper").unwrap();
        src
    }

    #[test]
    fn extract_preserves_nested_paths() {
        let tmp = TempDir::new().unwrap();
        let src = fixture(tmp.path());
        let archive = tmp.path().join("a.tar.gz");
        create_archive(&archive, &src).unwrap();

        let out = tmp.path().join("out");
        extract_archive(&archive, &out).unwrap();

        assert_eq!(fs::read_to_string(out.join("top.txt")).unwrap(), "top");
        assert_eq!(
            fs::read_to_string(out.join("nested/same.txt")).unwrap(),
            "nested"
        );
        assert_eq!(
            fs::read_to_string(out.join("nested/deeper/same.txt")).unwrap(),
            "deeper"
        );
    }

    #[test]
    fn extract_reports_archive_hash() {
        let tmp = TempDir::new().unwrap();
        let src = fixture(tmp.path());
        let archive = tmp.path().join("a.tar.gz");
        let created = create_archive(&archive, &src).unwrap();
        let extracted = extract_archive(&archive, &tmp.path().join("out")).unwrap();
        assert_eq!(created, extracted);
    }

    #[test]
    fn missing_archive_is_open_error() {
        let tmp = TempDir::new().unwrap();
        let err = extract_archive(&tmp.path().join("absent.tar.gz"), tmp.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::ArchiveOpen { .. }), "got: {err}");
    }

    #[test]
    fn garbage_is_open_error() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bad.tar.gz");
        fs::write(&archive, "this is not a gzip stream").unwrap();
        let err = extract_archive(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, ArchiveError::ArchiveOpen { .. }), "got: {err}");
    }

    #[test]
    #[cfg(unix)]
    fn extracted_files_do_not_inherit_recorded_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("data");
        fs::create_dir_all(&src).unwrap();
        let script = src.join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let archive = tmp.path().join("a.tar.gz");
        create_archive(&archive, &src).unwrap();
        assert_eq!(list_entries(&archive).unwrap()[0].mode, 0o755);

        let out = tmp.path().join("out");
        extract_archive(&archive, &out).unwrap();
        let mode = fs::metadata(out.join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0, "execute bits must not be restored");
    }

    #[test]
    fn safe_relative_rejects_escapes() {
        assert!(safe_relative(Path::new("../evil")).is_err());
        assert!(safe_relative(Path::new("/etc/passwd")).is_err());
        assert!(safe_relative(Path::new("a/../../b")).is_err());
        assert!(safe_relative(Path::new(".")).is_err());
        assert_eq!(
            safe_relative(Path::new("./a/b.txt")).unwrap(),
            PathBuf::from("a/b.txt")
        );
    }
}
