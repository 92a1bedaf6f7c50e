//! dataplugin core library — domain types, settings, and the signature ledger.
//!
//! Public API surface:
//! - [`types`] — [`ContentHash`], [`EntryMetadata`], [`ArchiveEntry`], [`Location`]
//! - [`settings`] — the [`Settings`] record built once per invocation
//! - [`ini`] — minimal reader for the ini-style ledger file
//! - [`ledger`] — find / rewrite the `dataplugin-signature` line
//! - [`error`] — [`ConfigError`], [`LedgerError`], [`HashParseError`]

pub mod error;
pub mod ini;
pub mod ledger;
pub mod settings;
pub mod types;

pub use error::{ConfigError, HashParseError, LedgerError};
pub use settings::Settings;
pub use types::{ArchiveEntry, ContentHash, EntryMetadata, Location};
