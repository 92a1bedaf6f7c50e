//! Terminal rendering of an action outcome.

use anyhow::{Context, Result};
use colored::Colorize;

use dataplugin_sync::{Outcome, StatusLine, Tone};

/// Status lines go to stderr so `--json` output on stdout stays clean.
pub fn print_lines(outcome: &Outcome) {
    for line in &outcome.lines {
        eprintln!("{}", styled(line));
    }
}

pub fn print_json(outcome: &Outcome) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome).context("failed to serialize outcome")?;
    println!("{json}");
    Ok(())
}

fn styled(line: &StatusLine) -> colored::ColoredString {
    match line.tone {
        Tone::Info => line.text.bold(),
        Tone::Success => line.text.green(),
        Tone::Failure => line.text.red(),
    }
}
