//! dataplugin — deterministic test-data archives with a signature ledger.
//!
//! # Usage
//!
//! ```text
//! dataplugin --create   [--directory DIR]
//! dataplugin --extract  [--directory DIR]
//! dataplugin --upload   [--location LOC]
//! dataplugin --download [--location LOC]
//! dataplugin --verify
//!
//! common: [--rootdir DIR] [-c/--ini FILE] [--json]
//! ```
//!
//! Without an action flag nothing happens and the exit code is 0.

mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use dataplugin_core::Settings;
use dataplugin_sync::{Action, ActionFlags};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dataplugin",
    version,
    about = "Create, publish, fetch and verify test-data archives",
    long_about = None,
)]
struct Cli {
    /// Create the working archive from the data directory.
    #[arg(long)]
    create: bool,

    /// Extract the working archive into the data directory.
    #[arg(long)]
    extract: bool,

    /// Publish the working archive and record its signature.
    #[arg(long)]
    upload: bool,

    /// Fetch the published archive into the working archive.
    #[arg(long)]
    download: bool,

    /// Check the working archive against the recorded signature.
    #[arg(long)]
    verify: bool,

    /// Project root; defaults to the current directory.
    #[arg(long, value_name = "DIR")]
    rootdir: Option<PathBuf>,

    /// Ledger file to use instead of discovering one under the root.
    #[arg(short = 'c', long = "ini", value_name = "FILE")]
    ini: Option<PathBuf>,

    /// Data directory, overriding the ledger.
    #[arg(long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Archive location, overriding the ledger.
    #[arg(long, value_name = "LOC")]
    location: Option<String>,

    /// Print the outcome as JSON on stdout.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn action(&self) -> Action {
        Action::from_flags(&ActionFlags {
            create: self.create,
            extract: self.extract,
            upload: self.upload,
            download: self.download,
            verify: self.verify,
        })
    }

    fn settings(&self) -> Result<Settings> {
        let root = match &self.rootdir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("could not determine current directory")?,
        };
        let root = root
            .canonicalize()
            .with_context(|| format!("root directory {} is not accessible", root.display()))?;

        let mut settings = Settings::load_at(&root, self.ini.as_deref())
            .with_context(|| format!("failed to load settings under {}", root.display()))?;
        if let Some(dir) = &self.directory {
            settings = settings.with_directory(dir);
        }
        if let Some(location) = &self.location {
            settings = settings
                .with_location(location.as_str())
                .with_context(|| format!("invalid location '{location}'"))?;
        }
        Ok(settings)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let action = cli.action();
    if action.is_noop() {
        tracing::debug!("no action requested");
        return Ok(ExitCode::SUCCESS);
    }

    let settings = cli.settings()?;
    tracing::debug!("running {action} with {settings:?}");
    let outcome = dataplugin_sync::run(action, &settings);

    report::print_lines(&outcome);
    if cli.json {
        report::print_json(&outcome)?;
    }
    Ok(ExitCode::from(outcome.code))
}

/// Log to stderr; `RUST_LOG` overrides the default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
