//! Domain types shared by the archive and sync crates.
//!
//! Filesystem paths are always `PathBuf`; archive entry paths are POSIX-style
//! `String`s because they are part of the archive bytes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::HashParseError;

// ---------------------------------------------------------------------------
// ContentHash
// ---------------------------------------------------------------------------

/// A 160-bit SHA-1 digest, rendered as 40 lowercase hex characters.
///
/// Used both as an integrity check and as the version identifier of an
/// archive ("signature").
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; ContentHash::LEN]);

impl ContentHash {
    /// Digest length in bytes.
    pub const LEN: usize = 20;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True when `signature` (as recorded in a ledger) names this digest.
    ///
    /// The comparison is on digest bytes, not on the recorded text: an
    /// uppercase or whitespace-padded signature still matches, although
    /// the ledger only ever records trimmed lowercase hex. An empty or
    /// malformed signature never matches.
    pub fn matches(&self, signature: &str) -> bool {
        signature
            .parse::<ContentHash>()
            .map(|recorded| recorded == *self)
            .unwrap_or(false)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        let len = bytes.len();
        let array: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| HashParseError::Length { len })?;
        Ok(Self(array))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Entry metadata
// ---------------------------------------------------------------------------

/// Ownership and time fields stored on every archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryMetadata {
    pub mtime: u64,
    pub uid: u64,
    pub uname: String,
    pub gid: u64,
    pub gname: String,
}

impl EntryMetadata {
    /// The fixed record written onto every entry in place of filesystem
    /// metadata. Its `mtime` doubles as the gzip header timestamp.
    pub fn sentinel() -> Self {
        Self {
            mtime: 0,
            uid: 0,
            uname: String::new(),
            gid: 0,
            gname: String::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }
}

impl Default for EntryMetadata {
    fn default() -> Self {
        Self::sentinel()
    }
}

/// One file recorded inside an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    /// POSIX-style path relative to the archived directory, no leading `/`.
    pub path: String,
    pub size: u64,
    pub mode: u32,
    pub metadata: EntryMetadata,
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Where the canonical archive lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A filesystem path (plain path or `file://` URL).
    Local(PathBuf),
    /// Any other URL; reached only through a pluggable transport.
    Remote { scheme: String, url: String },
}

impl Location {
    /// Classify `raw`, resolving relative local paths against `root`.
    ///
    /// A single-letter "scheme" is a Windows drive letter, not a URL.
    pub fn parse(raw: &str, root: &Path) -> Self {
        match url_scheme(raw) {
            Some(scheme) if scheme.eq_ignore_ascii_case("file") => {
                let rest = &raw[scheme.len() + 1..];
                let path = rest.strip_prefix("//").unwrap_or(rest);
                Location::Local(root.join(path))
            }
            Some(scheme) => Location::Remote {
                scheme: scheme.to_ascii_lowercase(),
                url: raw.to_string(),
            },
            None => Location::Local(root.join(raw)),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Remote { .. })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote { url, .. } => f.write_str(url),
        }
    }
}

fn url_scheme(raw: &str) -> Option<&str> {
    let (scheme, _) = raw.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    (valid && scheme.len() > 1).then_some(scheme)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
