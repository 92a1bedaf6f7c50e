//! The per-invocation settings record.
//!
//! Built once at startup by [`Settings::load_at`], optionally adjusted with
//! the `with_*` overrides, then passed by reference to every operation.
//!
//! # Ledger discovery
//!
//! ```text
//! <root>/pytest.ini   [pytest]        used whenever present
//! <root>/tox.ini      [pytest]        used only if the section exists
//! <root>/setup.cfg    [tool:pytest]   used only if the section exists
//! ```

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::ConfigError;
use crate::ini::IniDocument;
use crate::types::Location;

/// Lines of this shape hold the trusted signature.
pub const SIGNATURE_PATTERN: &str = r"^.*dataplugin-signature.*=.*$";

/// Archive location used when the ledger does not name one.
pub const DEFAULT_LOCATION: &str = "test-data.tar.gz";

/// Data directory (relative to root) used when the ledger does not name one.
pub const DEFAULT_DIRECTORY: &str = "data";

pub const KEY_DIRECTORY: &str = "dataplugin-directory";
pub const KEY_LOCATION: &str = "dataplugin-location";
pub const KEY_SIGNATURE: &str = "dataplugin-signature";

/// (file name, section, used even when the section is missing)
const LEDGER_CANDIDATES: &[(&str, &str, bool)] = &[
    ("pytest.ini", "pytest", true),
    ("tox.ini", "pytest", false),
    ("setup.cfg", "tool:pytest", false),
];

#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory that relative paths and the working archive resolve against.
    pub root: PathBuf,
    /// Directory packed by create and populated by extract.
    pub directory: PathBuf,
    /// Where the canonical archive lives, as configured.
    pub location: String,
    /// Basename of `location`.
    pub filename: String,
    /// Trusted signature recorded in the ledger, if any.
    pub signature: Option<String>,
    /// The ledger (ini) file, if one was found or given.
    pub ledger: Option<PathBuf>,
    pub signature_pattern: Regex,
}

impl Settings {
    /// Settings with every default and no ledger.
    pub fn defaults_at(root: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            root: root.to_path_buf(),
            directory: root.join(DEFAULT_DIRECTORY),
            location: DEFAULT_LOCATION.to_string(),
            filename: location_basename(DEFAULT_LOCATION)?,
            signature: None,
            ledger: None,
            signature_pattern: Regex::new(SIGNATURE_PATTERN)?,
        })
    }

    /// Build settings for `root`, reading `ini` if given, otherwise the first
    /// discovered ledger file.
    pub fn load_at(root: &Path, ini: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = Self::defaults_at(root)?;

        let found = match ini {
            Some(path) => {
                let path = root.join(path);
                let doc = IniDocument::load(&path)?;
                let section = section_for(&path);
                Some((path, doc, section))
            }
            None => discover_ledger(root)?,
        };

        let Some((path, doc, section)) = found else {
            tracing::debug!("no ledger file under {}", root.display());
            return Ok(settings);
        };
        tracing::debug!("using ledger {} [{section}]", path.display());

        if let Some(dir) = doc.get(section, KEY_DIRECTORY) {
            settings = settings.with_directory(dir);
        }
        if let Some(location) = doc.get(section, KEY_LOCATION) {
            settings = settings.with_location(location)?;
        }
        settings.signature = doc.get(section, KEY_SIGNATURE).map(str::to_string);
        settings.ledger = Some(path);
        Ok(settings)
    }

    /// Override the data directory; relative paths resolve against `root`.
    pub fn with_directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.directory = self.root.join(directory);
        self
    }

    /// Override the archive location and re-derive `filename`.
    pub fn with_location(mut self, location: impl Into<String>) -> Result<Self, ConfigError> {
        let location = location.into();
        self.filename = location_basename(&location)?;
        self.location = location;
        Ok(self)
    }

    /// The local working copy: `<root>/.<filename>`.
    pub fn working_archive(&self) -> PathBuf {
        self.root.join(format!(".{}", self.filename))
    }

    /// The classified archive location.
    pub fn target(&self) -> Location {
        Location::parse(&self.location, &self.root)
    }
}

/// First ledger candidate present in `root`, with the section to read.
pub fn discover_ledger(
    root: &Path,
) -> Result<Option<(PathBuf, IniDocument, &'static str)>, ConfigError> {
    for (name, section, always) in LEDGER_CANDIDATES {
        let path = root.join(name);
        if !path.is_file() {
            continue;
        }
        let doc = IniDocument::load(&path)?;
        if *always || doc.has_section(section) {
            return Ok(Some((path, doc, section)));
        }
    }
    Ok(None)
}

fn section_for(path: &Path) -> &'static str {
    match path.file_name().and_then(|n| n.to_str()) {
        Some("setup.cfg") => "tool:pytest",
        _ => "pytest",
    }
}

fn location_basename(location: &str) -> Result<String, ConfigError> {
    let name = location.rsplit(['/', '\\']).next().unwrap_or_default();
    if name.is_empty() {
        return Err(ConfigError::InvalidLocation {
            location: location.to_string(),
        });
    }
    Ok(name.to_string())
}
