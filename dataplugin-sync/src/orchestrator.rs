//! Action orchestration.
//!
//! Each action runs once to completion. Expected conditions (missing data
//! directory, missing ledger or signature line, hash mismatch) and any
//! unexpected I/O failure all end at the same boundary in [`Orchestrator::run`]:
//! one failure line plus status code 1.

use std::fs::File;
use std::io::BufReader;

use dataplugin_archive::{create_archive, extract_archive, hash_file, ArchiveError};
use dataplugin_core::{ledger, Location, Settings};

use crate::action::Action;
use crate::error::{io_err, SyncError};
use crate::status::{failure_text, Outcome, StatusLine};
use crate::transport::{transfer, LocalTransport, Transport, Transports};

pub struct Orchestrator<'a> {
    settings: &'a Settings,
    transports: Transports,
}

impl<'a> Orchestrator<'a> {
    /// An orchestrator with only the local filesystem backend.
    pub fn new(settings: &'a Settings) -> Self {
        Self::with_transports(settings, Transports::local_only())
    }

    pub fn with_transports(settings: &'a Settings, transports: Transports) -> Self {
        Self {
            settings,
            transports,
        }
    }

    /// Run `action` and collect its status lines.
    pub fn run(&self, action: Action) -> Outcome {
        let mut lines = Vec::new();
        let result = match action {
            Action::Noop => Ok(()),
            Action::Create => self.create(&mut lines),
            Action::Extract => self.extract(&mut lines),
            Action::Upload => self.upload(&mut lines),
            Action::Download => self.download(&mut lines),
            Action::Verify => self.verify(&mut lines),
        };

        let code = match result {
            Ok(()) => 0,
            Err(err) => {
                tracing::debug!("{action} failed: {err:?}");
                lines.push(StatusLine::failure(failure_text(action, &err)));
                1
            }
        };
        Outcome {
            action,
            code,
            lines,
        }
    }

    fn create(&self, lines: &mut Vec<StatusLine>) -> Result<(), SyncError> {
        let s = self.settings;
        if !s.directory.is_dir() {
            return Err(ArchiveError::DirectoryNotFound {
                path: s.directory.clone(),
            }
            .into());
        }
        lines.push(StatusLine::info(format!(
            "Creating archive {} from directory {}",
            s.filename,
            s.directory.display()
        )));
        let hash = create_archive(&s.working_archive(), &s.directory)?;
        lines.push(StatusLine::success(format!(
            "Archive created, name is {} and hash is {hash}",
            s.filename
        )));
        Ok(())
    }

    fn extract(&self, lines: &mut Vec<StatusLine>) -> Result<(), SyncError> {
        let s = self.settings;
        let hash = extract_archive(&s.working_archive(), &s.directory)?;
        lines.push(StatusLine::success(format!(
            "Extracted archive {} with hash {hash}",
            s.filename
        )));
        Ok(())
    }

    fn upload(&self, lines: &mut Vec<StatusLine>) -> Result<(), SyncError> {
        let s = self.settings;
        let ini = self.require_signature_line()?;
        let target = s.target();
        let transport = self.transports.resolve(&target)?;

        lines.push(StatusLine::info(storing_line(&target, &s.location)));
        let working = s.working_archive();
        let mut src = BufReader::new(File::open(&working).map_err(|e| io_err(&working, e))?);
        let sink = transport.open_write(&target)?;
        let copied = transfer(&mut src, sink).map_err(|e| io_err(target.to_string(), e))?;
        tracing::info!("uploaded {copied} bytes to {target}");

        let hash = hash_file(&working)?;
        lines.push(StatusLine::success(format!(
            "Uploaded archive {} with hash {hash}",
            s.filename
        )));

        ledger::update_signature(&hash, &ini, &s.signature_pattern)?;
        let ini_name = ini
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        lines.push(StatusLine::success(format!(
            "Signature updated, you may want to commit the changes too: {ini_name}"
        )));
        Ok(())
    }

    fn download(&self, lines: &mut Vec<StatusLine>) -> Result<(), SyncError> {
        let s = self.settings;
        self.require_signature_line()?;
        let target = s.target();
        let transport = self.transports.resolve(&target)?;

        lines.push(StatusLine::info(storing_line(&target, &s.location)));
        let mut src = transport.open_read(&target)?;
        let working = Location::Local(s.working_archive());
        let sink = LocalTransport.open_write(&working)?;
        let copied = transfer(&mut src, sink).map_err(|e| io_err(s.working_archive(), e))?;
        tracing::info!("downloaded {copied} bytes from {target}");

        lines.push(StatusLine::success("file downloaded"));
        Ok(())
    }

    fn verify(&self, lines: &mut Vec<StatusLine>) -> Result<(), SyncError> {
        let s = self.settings;
        let actual = hash_file(&s.working_archive())?;
        let expected = s.signature.as_deref().unwrap_or_default();
        if !actual.matches(expected) {
            tracing::warn!("working archive hash {actual} differs from signature '{expected}'");
            return Err(SyncError::HashMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        lines.push(StatusLine::success("Archive passed verification :)"));
        Ok(())
    }

    /// Upload and download both need a ledger with a signature line.
    fn require_signature_line(&self) -> Result<std::path::PathBuf, SyncError> {
        let s = self.settings;
        let ini = s.ledger.clone().ok_or(SyncError::LedgerMissing)?;
        if !ledger::find_signature(&ini, &s.signature_pattern)? {
            return Err(SyncError::SignatureMissing { path: ini });
        }
        Ok(ini)
    }
}

fn storing_line(target: &Location, location: &str) -> String {
    if target.is_remote() {
        format!("Transferring archive: {location}")
    } else {
        format!("Storing local archive: {location}")
    }
}

/// Run `action` against `settings` with the local backend only.
pub fn run(action: Action, settings: &Settings) -> Outcome {
    Orchestrator::new(settings).run(action)
}
