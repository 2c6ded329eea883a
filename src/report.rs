//! Console rendering of run results and the process exit status

use std::io::{self, Write};

use crate::sync::{PlannedAction, PlannedSync, RunReport};

/// Fatal pre-run errors and listing authentication failures
pub const EXIT_FATAL: u8 = 1;
/// At least one repository failed, or the listing stopped early
pub const EXIT_PARTIAL_FAILURE: u8 = 2;

pub struct Reporter;

impl Reporter {
    /// Write the final summary of a run
    pub fn render<W: Write>(report: &RunReport, out: &mut W) -> io::Result<()> {
        let summary = &report.summary;

        writeln!(out, "\n🎉 Synchronization Complete!")?;
        writeln!(out, "   📊 Total processed: {}", summary.total_processed)?;
        writeln!(out, "   ✅ Successful: {}", summary.succeeded())?;
        if summary.skipped > 0 {
            writeln!(out, "   ⏭️  Skipped: {}", summary.skipped)?;
        }
        writeln!(out, "   ⏱️  Duration: {:.2}s", report.duration.as_secs_f64())?;

        if summary.has_failures() {
            writeln!(out, "\n🔍 Failed repositories ({}):", summary.failures.len())?;
            for failure in &summary.failures {
                writeln!(
                    out,
                    "   ❌ {}: {} (exit code {})",
                    failure.name, failure.cause, failure.exit_code
                )?;
            }
        }

        Ok(())
    }

    /// Write the run-level error, if any. Meant for stderr.
    pub fn render_errors<W: Write>(report: &RunReport, err: &mut W) -> io::Result<()> {
        if let Some(e) = &report.listing_error {
            writeln!(err, "❌ Listing stopped early: {}", e)?;
        }
        Ok(())
    }

    /// Write what a dry run would do
    pub fn render_plan<W: Write>(plan: &[PlannedSync], out: &mut W) -> io::Result<()> {
        writeln!(out, "🔍 Dry run mode - analyzing repository states")?;

        let mut clones = 0;
        let mut updates = 0;
        let mut skips = 0;
        for entry in plan {
            match entry.action {
                PlannedAction::Clone => {
                    clones += 1;
                    writeln!(out, "   📥 Clone needed: {}", entry.target.display())?;
                }
                PlannedAction::Update => {
                    updates += 1;
                    writeln!(out, "   🔄 Pull needed: {}", entry.target.display())?;
                }
                PlannedAction::Skip => {
                    skips += 1;
                    writeln!(out, "   ⏭️  Excluded: {}", entry.name)?;
                }
            }
        }

        writeln!(out, "\n📈 Summary:")?;
        writeln!(out, "   📥 Repositories to clone: {}", clones)?;
        writeln!(out, "   🔄 Repositories to pull: {}", updates)?;
        if skips > 0 {
            writeln!(out, "   ⏭️  Repositories excluded: {}", skips)?;
        }
        Ok(())
    }

    pub fn exit_code(report: &RunReport) -> u8 {
        match &report.listing_error {
            Some(err) if err.is_fatal() => EXIT_FATAL,
            Some(_) => EXIT_PARTIAL_FAILURE,
            None if report.summary.has_failures() => EXIT_PARTIAL_FAILURE,
            None => 0,
        }
    }
}
