use std::io::Write;
use std::path::Path;

use discopub_core::{
    AttemptOutcome, BatchReport, MANIFEST_FILE_NAME, ProgressEvent, ResolutionStatus,
    UnfetchedReason,
};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the batch header before any work starts.
pub fn print_batch_header(
    w: &mut dyn Write,
    total: usize,
    max_attempts: u32,
    workers: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    let msg = format!(
        "Fetching {} article(s), up to {} lookup attempt(s) each, {} worker(s)",
        total, max_attempts, workers
    );
    if color.enabled() {
        writeln!(w, "{}", msg.bold())?;
    } else {
        writeln!(w, "{}", msg)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Resolving { index, total, pmid } => {
            writeln!(w, "[{}/{}] Resolving PMID {}", index + 1, total, pmid)?;
        }
        ProgressEvent::Attempt {
            index,
            total,
            attempt,
        } => {
            let detail = match &attempt.outcome {
                // Successful lookups show up in the result line.
                AttemptOutcome::Success { .. } => return Ok(()),
                AttemptOutcome::HttpError(status) => format!("HTTP {}", status),
                AttemptOutcome::ConnectionError(e) => truncate(e, 80),
            };
            let msg = format!(
                "lookup attempt {}/{} failed: {}",
                attempt.attempt, attempt.max_attempts, detail
            );
            if color.enabled() {
                writeln!(w, "[{}/{}]    {}", index + 1, total, msg.dimmed())?;
            } else {
                writeln!(w, "[{}/{}]    {}", index + 1, total, msg)?;
            }
        }
        ProgressEvent::Result {
            index,
            total,
            result,
        } => {
            let idx = index + 1;
            match &result.status {
                ResolutionStatus::Saved { strategy, .. } => {
                    if color.enabled() {
                        writeln!(w, "[{}/{}] -> {} ({})", idx, total, "SAVED".green(), strategy)?;
                    } else {
                        writeln!(w, "[{}/{}] -> SAVED ({})", idx, total, strategy)?;
                    }
                }
                ResolutionStatus::Unfetched(UnfetchedReason::Cancelled) => {
                    if color.enabled() {
                        writeln!(w, "[{}/{}] -> {}", idx, total, "CANCELLED".yellow())?;
                    } else {
                        writeln!(w, "[{}/{}] -> CANCELLED", idx, total)?;
                    }
                }
                ResolutionStatus::Unfetched(reason) => {
                    if color.enabled() {
                        writeln!(w, "[{}/{}] -> {} ({})", idx, total, "UNFETCHED".red(), reason)?;
                    } else {
                        writeln!(w, "[{}/{}] -> UNFETCHED ({})", idx, total, reason)?;
                    }
                }
            }
        }
        ProgressEvent::Finished { .. } => {
            // Covered by the summary
        }
    }
    Ok(())
}

/// Print the identifiers that could not be fetched and why.
pub fn print_unfetched(
    w: &mut dyn Write,
    report: &BatchReport,
    color: ColorMode,
) -> std::io::Result<()> {
    if report.unfetched.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", "Unfetched articles:".red().bold())?;
    } else {
        writeln!(w, "Unfetched articles:")?;
    }
    for entry in &report.unfetched {
        writeln!(w, "  {:<12} {}", entry.pmid.as_str(), entry.reason)?;
    }
    Ok(())
}

/// Print the final summary.
pub fn print_summary(
    w: &mut dyn Write,
    report: &BatchReport,
    out_dir: Option<&Path>,
    archive: Option<&Path>,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "SUMMARY".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "SUMMARY")?;
        writeln!(w, "{}", sep)?;
    }

    writeln!(w, "  Articles requested: {}", report.total())?;
    if color.enabled() {
        writeln!(w, "  {} {}", "Saved:".green(), report.saved.len())?;
    } else {
        writeln!(w, "  Saved: {}", report.saved.len())?;
    }
    if !report.unfetched.is_empty() {
        let cancelled = report
            .unfetched
            .iter()
            .filter(|u| u.reason == UnfetchedReason::Cancelled)
            .count();
        if color.enabled() {
            writeln!(w, "  {} {}", "Unfetched:".red(), report.unfetched.len())?;
        } else {
            writeln!(w, "  Unfetched: {}", report.unfetched.len())?;
        }
        if cancelled > 0 {
            let msg = format!("(of which cancelled: {})", cancelled);
            if color.enabled() {
                writeln!(w, "  {}", msg.yellow())?;
            } else {
                writeln!(w, "  {}", msg)?;
            }
        }
    }
    writeln!(w)?;

    if let Some(dir) = out_dir {
        writeln!(w, "  Output directory: {}", dir.display())?;
        if !report.unfetched.is_empty() {
            writeln!(
                w,
                "  Unfetched list:   {}",
                dir.join(MANIFEST_FILE_NAME).display()
            )?;
        }
    }
    if let Some(path) = archive {
        if color.enabled() {
            writeln!(w, "  Archive:          {}", path.display().bold())?;
        } else {
            writeln!(w, "  Archive:          {}", path.display())?;
        }
    }

    writeln!(w)?;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}
