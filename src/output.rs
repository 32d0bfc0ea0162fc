use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CleanupStatus, Level, LibraryStatus, ProgressEvent, ProgressSink, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

/// Forwards pipeline events to `tracing`.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.level {
            Level::Debug => tracing::debug!("{}", event.message),
            Level::Info => tracing::info!("{}", event.message),
            Level::Warning => tracing::warn!("{}", event.message),
            Level::Error => tracing::error!("{}", event.message),
            Level::Critical => tracing::error!(critical = true, "{}", event.message),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        Self::write_report(&mut stdout, report)
    }

    pub fn write_report<W: Write>(out: &mut W, report: &RunReport) -> io::Result<()> {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        writeln!(
            out,
            "{cyan}IMGT scrape summary: {} {} ({}){reset}",
            report.species, report.sequence_type, report.frame_selection
        )?;
        writeln!(out, "  requested: {}", report.requested)?;
        writeln!(
            out,
            "{green}  fetched:   {} ({} downloaded, {} reused){reset}",
            report.fetched.len(),
            report.downloaded(),
            report.reused()
        )?;
        let failed_color = if report.failed.is_empty() { green } else { yellow };
        writeln!(out, "{failed_color}  failed:    {}{reset}", report.failed.len())?;
        for failed in &report.failed {
            writeln!(out, "{yellow}    - {}: {}{reset}", failed.segment_name, failed.reason)?;
        }

        match &report.library {
            LibraryStatus::NotRequested => {}
            LibraryStatus::Existing { path } => {
                writeln!(out, "{cyan}  library:   {path} (already present){reset}")?;
            }
            LibraryStatus::Built(outcome) => {
                let color = if outcome.records == 0 { yellow } else { green };
                writeln!(
                    out,
                    "{color}  library:   {} ({} records from {} files){reset}",
                    outcome.path, outcome.records, outcome.files_used
                )?;
                for skipped in &outcome.skipped {
                    writeln!(out, "{yellow}    skipped {}: {}{reset}", skipped.path, skipped.reason)?;
                }
                if !outcome.duplicate_ids.is_empty() {
                    writeln!(
                        out,
                        "{yellow}    duplicated ids kept: {}{reset}",
                        outcome.duplicate_ids.join(", ")
                    )?;
                }
            }
            LibraryStatus::Failed { path, reason } => {
                writeln!(out, "{red}  library:   {path} failed: {reason}{reset}")?;
            }
        }

        match &report.cleanup {
            CleanupStatus::NotRequested => {}
            CleanupStatus::Skipped { reason } => {
                writeln!(out, "{yellow}  cleanup:   skipped ({reason}){reset}")?;
            }
            CleanupStatus::Done(outcome) => {
                writeln!(out, "{green}  cleanup:   {} files deleted{reset}", outcome.deleted)?;
                for warning in &outcome.warnings {
                    writeln!(out, "{yellow}    {warning}{reset}")?;
                }
            }
        }
        Ok(())
    }
}
