//! Signature ledger — the `dataplugin-signature = <hash>` line of the ini file.
//!
//! ## `update_signature` protocol
//!
//! 1. Stream the ledger line by line into `.<name>` in the same directory.
//! 2. Replace the first matching line with `dataplugin-signature = <hash>`;
//!    every other line is copied byte for byte, terminators included.
//! 3. No match → delete the temporary file, leave the ledger untouched.
//! 4. Match → rename the temporary file over the ledger.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{ledger_io_err, LedgerError};
use crate::types::ContentHash;

/// True when `line` (terminator excluded) matches `pattern`.
fn line_matches(pattern: &Regex, line: &str) -> bool {
    pattern.is_match(line.trim_end_matches(['\n', '\r']))
}

/// `<dir>/.<name>` — the staging sibling used while rewriting `path`.
pub fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}"))
}

/// Whether any line of the ledger matches `pattern`. Stops at the first match.
pub fn find_signature(path: &Path, pattern: &Regex) -> Result<bool, LedgerError> {
    let file = File::open(path).map_err(|e| ledger_io_err(path, e))?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| ledger_io_err(path, e))?;
        if n == 0 {
            return Ok(false);
        }
        if line_matches(pattern, &line) {
            return Ok(true);
        }
    }
}

/// Rewrite the first signature line of the ledger to name `signature`.
///
/// Fails with [`LedgerError::SignatureNotFound`] when no line matches; the
/// ledger is then left exactly as it was.
pub fn update_signature(
    signature: &ContentHash,
    path: &Path,
    pattern: &Regex,
) -> Result<(), LedgerError> {
    let tmp = staging_path(path);
    let replaced = match rewrite(signature, path, &tmp, pattern) {
        Ok(replaced) => replaced,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
    };

    if !replaced {
        std::fs::remove_file(&tmp).map_err(|e| ledger_io_err(&tmp, e))?;
        return Err(LedgerError::SignatureNotFound {
            path: path.to_path_buf(),
        });
    }

    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(ledger_io_err(path, e));
    }
    tracing::info!("signature {signature} written to {}", path.display());
    Ok(())
}

fn rewrite(
    signature: &ContentHash,
    path: &Path,
    tmp: &Path,
    pattern: &Regex,
) -> Result<bool, LedgerError> {
    let src = File::open(path).map_err(|e| ledger_io_err(path, e))?;
    let dst = File::create(tmp).map_err(|e| ledger_io_err(tmp, e))?;
    let mut reader = BufReader::new(src);
    let mut writer = BufWriter::new(dst);

    let mut replaced = false;
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| ledger_io_err(path, e))?;
        if n == 0 {
            break;
        }
        if !replaced && line_matches(pattern, &line) {
            let ending = if line.ends_with("\r\n") { "\r\n" } else { "\n" };
            line = format!("dataplugin-signature = {signature}{ending}");
            replaced = true;
        }
        writer
            .write_all(line.as_bytes())
            .map_err(|e| ledger_io_err(tmp, e))?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| ledger_io_err(tmp, e.into_error()))?;
    file.sync_all().map_err(|e| ledger_io_err(tmp, e))?;
    Ok(replaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SIGNATURE_PATTERN;
    use std::fs;
    use tempfile::TempDir;

    const HASH: &str = "2479d9203e1f4a326fd2cb49c66ab0904ebbd54c";

    fn pattern() -> Regex {
        Regex::new(SIGNATURE_PATTERN).unwrap()
    }

    fn hash() -> ContentHash {
        HASH.parse().unwrap()
    }

    #[test]
    fn finds_signature_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pytest.ini");
        fs::write(&path, "[pytest]\ndataplugin-signature =\n").unwrap();
        assert!(find_signature(&path, &pattern()).unwrap());
    }

    #[test]
    fn missing_signature_line_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pytest.ini");
        fs::write(&path, "[pytest]\naddopts = -q\n").unwrap();
        assert!(!find_signature(&path, &pattern()).unwrap());
    }

    #[test]
    fn update_replaces_only_the_signature_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pytest.ini");
        fs::write(
            &path,
            "[pytest]\naddopts = -q\ndataplugin-signature = old\n  # trailing\n",
        )
        .unwrap();

        update_signature(&hash(), &path, &pattern()).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("[pytest]\naddopts = -q\ndataplugin-signature = {HASH}\n  # trailing\n")
        );
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn update_without_match_leaves_file_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pytest.ini");
        let original = "[pytest]\naddopts = -q";
        fs::write(&path, original).unwrap();

        let err = update_signature(&hash(), &path, &pattern()).unwrap_err();
        assert!(matches!(err, LedgerError::SignatureNotFound { .. }), "got: {err}");
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert!(!staging_path(&path).exists(), "staging file must be discarded");
    }

    #[test]
    fn crlf_lines_keep_their_terminators() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("setup.cfg");
        fs::write(&path, "[tool:pytest]\r\ndataplugin-signature = x\r\nk = v\r\n").unwrap();

        update_signature(&hash(), &path, &pattern()).unwrap();

        assert_eq!(
            fs::read(&path).unwrap(),
            format!("[tool:pytest]\r\ndataplugin-signature = {HASH}\r\nk = v\r\n").into_bytes()
        );
    }

    #[test]
    fn only_first_match_is_rewritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pytest.ini");
        fs::write(&path, "dataplugin-signature = a\ndataplugin-signature = b\n").unwrap();

        update_signature(&hash(), &path, &pattern()).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("dataplugin-signature = {HASH}\ndataplugin-signature = b\n")
        );
    }

    #[test]
    fn staging_path_is_dot_prefixed_sibling() {
        assert_eq!(
            staging_path(Path::new("/repo/pytest.ini")),
            PathBuf::from("/repo/.pytest.ini")
        );
    }
}
