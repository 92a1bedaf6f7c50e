//! # dataplugin-sync
//!
//! Create / extract / upload / download / verify orchestration over the
//! archive and ledger primitives.
//!
//! Build a [`Settings`](dataplugin_core::Settings) once, pick an [`Action`],
//! and call [`run`] (or [`Orchestrator::run`] with extra transports). The
//! returned [`Outcome`] carries the status lines and the final status code.

pub mod action;
pub mod error;
pub mod orchestrator;
pub mod status;
pub mod transport;

pub use action::{Action, ActionFlags};
pub use error::SyncError;
pub use orchestrator::{run, Orchestrator};
pub use status::{Outcome, StatusLine, Tone};
pub use transport::{transfer, ArchiveSink, LocalTransport, Transport, Transports};
