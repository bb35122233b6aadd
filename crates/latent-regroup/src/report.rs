//! Run results and reporting
//!
//! [`ConversionReport`] is the value a run returns. Rendering it is the job
//! of a [`Reporter`]: [`TextReporter`] prints the line-per-group console log,
//! [`JsonReporter`] prints the final report as JSON.

use crate::archive::ARCHIVE_EXTENSION;
use crate::config::ConvertConfig;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::PathBuf;

/// What happened to one group's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Archive written
    Written,
    /// Dry run: archive would have been written
    Planned,
    /// Output already existed and overwrite was off
    Skipped,
}

impl Outcome {
    /// Console tag for this outcome
    #[inline]
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Written => "ok",
            Self::Planned => "plan",
            Self::Skipped => "skip",
        }
    }
}

/// Outcome for one base identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOutcome {
    /// Base identifier
    pub base: String,
    /// Destination archive
    pub output: PathBuf,
    /// Decision taken
    pub outcome: Outcome,
}

/// Result of a whole conversion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    /// Absolute source directory
    pub src: PathBuf,
    /// Absolute destination directory
    pub dst: PathBuf,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Number of groups found
    pub groups: usize,
    /// Per-group outcomes, in processing order
    pub outcomes: Vec<GroupOutcome>,
}

impl ConversionReport {
    /// Create empty report for a run
    #[must_use]
    pub fn new(config: &ConvertConfig, groups: usize) -> Self {
        Self {
            src: config.src.clone(),
            dst: config.dst.clone(),
            dry_run: config.dry_run,
            groups,
            outcomes: Vec::new(),
        }
    }

    /// Record one group's outcome
    #[inline]
    pub fn push(&mut self, outcome: GroupOutcome) {
        self.outcomes.push(outcome);
    }

    /// Count outcomes of one kind
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }

    /// Archives written, or planned on a dry run
    #[inline]
    #[must_use]
    pub fn produced(&self) -> usize {
        self.count(Outcome::Written) + self.count(Outcome::Planned)
    }

    /// Outputs skipped because they already existed
    #[inline]
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(Outcome::Skipped)
    }

    /// Check if no source files were found
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups == 0
    }

    /// Final summary line
    #[must_use]
    pub fn summary_line(&self) -> String {
        let action = if self.dry_run { "planned" } else { "written" };
        format!(
            "Done. groups={} {action}={} skipped_existing={} src={} dst={}",
            self.groups,
            self.produced(),
            self.skipped(),
            self.src.display(),
            self.dst.display()
        )
    }
}

/// Renders run progress and results
pub trait Reporter {
    /// Called once per group, in processing order
    ///
    /// # Errors
    /// Returns error if output cannot be written.
    fn group(&mut self, outcome: &GroupOutcome) -> io::Result<()>;

    /// Called once when the run completes
    ///
    /// # Errors
    /// Returns error if output cannot be written.
    fn finished(&mut self, report: &ConversionReport) -> io::Result<()>;
}

/// Plain-text console log: `[ok] <path>` lines and a summary
#[derive(Debug)]
pub struct TextReporter<W> {
    out: W,
}

impl<W: Write> TextReporter<W> {
    /// Report into `out`
    #[inline]
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume, returning the writer
    #[inline]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TextReporter<io::Stdout> {
    /// Report to standard output
    #[inline]
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn group(&mut self, outcome: &GroupOutcome) -> io::Result<()> {
        writeln!(
            self.out,
            "[{}] {}",
            outcome.outcome.tag(),
            outcome.output.display()
        )
    }

    fn finished(&mut self, report: &ConversionReport) -> io::Result<()> {
        if report.is_empty() {
            writeln!(
                self.out,
                "No source .{ARCHIVE_EXTENSION} files found in {}",
                report.src.display()
            )
        } else {
            writeln!(self.out, "{}", report.summary_line())
        }
    }
}

/// Prints only the final report, as pretty JSON
#[derive(Debug)]
pub struct JsonReporter<W> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    /// Report into `out`
    #[inline]
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume, returning the writer
    #[inline]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl JsonReporter<io::Stdout> {
    /// Report to standard output
    #[inline]
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn group(&mut self, _outcome: &GroupOutcome) -> io::Result<()> {
        Ok(())
    }

    fn finished(&mut self, report: &ConversionReport) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, report)?;
        writeln!(self.out)
    }
}
