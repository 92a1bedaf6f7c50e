//! Streaming SHA-1 over files and readers, plus the chunked copy loop
//! shared by compression and transfer.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use dataplugin_core::ContentHash;
use sha1::{Digest, Sha1};

use crate::error::{io_err, ArchiveError};

/// Fixed buffer size for every streaming pass (hashing, compression, copy).
pub const CHUNK_SIZE: usize = 100 * 1024;

/// Hash everything `reader` yields, `CHUNK_SIZE` bytes at a time.
pub fn hash_reader<R: Read>(reader: &mut R) -> std::io::Result<ContentHash> {
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(digest_to_hash(&hasher.finalize()))
}

fn digest_to_hash(digest: &[u8]) -> ContentHash {
    let mut bytes = [0u8; ContentHash::LEN];
    bytes.copy_from_slice(digest);
    ContentHash::from_bytes(bytes)
}

/// Copy `reader` into `writer` through a `CHUNK_SIZE` buffer.
///
/// Returns the number of bytes copied.
pub fn copy_chunked<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}

/// Hash the file at `path`.
pub fn hash_file(path: &Path) -> Result<ContentHash, ArchiveError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    hash_reader(&mut file).map_err(|e| io_err(path, e))
}
