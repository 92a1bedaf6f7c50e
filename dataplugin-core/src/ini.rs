//! Minimal reader for the ini-style ledger file.
//!
//! Supports `[section]` headers, `key = value` and `key: value` pairs,
//! `#` / `;` comment lines, and indented continuation lines. Values are
//! trimmed; keys are kept verbatim. Nothing here ever writes the file; the
//! ledger rewrites it line by line so unknown content survives untouched.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{config_io_err, ConfigError};

/// Key/value pairs of one section, in key order.
pub type Section = BTreeMap<String, String>;

/// A parsed ini document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: BTreeMap<String, Section>,
}

impl IniDocument {
    /// Parse ini text. Malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut sections: BTreeMap<String, Section> = BTreeMap::new();
        let mut current = String::new();
        let mut last_key: Option<String> = None;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if line.starts_with(char::is_whitespace) {
                if let Some(key) = &last_key {
                    if let Some(value) = sections.get_mut(&current).and_then(|s| s.get_mut(key)) {
                        if !value.is_empty() {
                            value.push('\n');
                        }
                        value.push_str(trimmed);
                        continue;
                    }
                }
            }

            if let Some(name) = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            {
                current = name.trim().to_string();
                sections.entry(current.clone()).or_default();
                last_key = None;
                continue;
            }

            let Some(split) = trimmed.find(['=', ':']) else {
                tracing::debug!("ini: skipping line without separator: {trimmed}");
                continue;
            };
            let key = trimmed[..split].trim().to_string();
            let value = trimmed[split + 1..].trim().to_string();
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.clone(), value);
            last_key = Some(key);
        }

        Self { sections }
    }

    /// Read and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| config_io_err(path, e))?;
        Ok(Self::parse(&text))
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }
}
