//! Output writing
//!
//! Decides per merged record whether to skip, plan or write its archive.

use crate::archive::{write_archive, OriginalSize, ARCHIVE_EXTENSION};
use crate::config::ConvertConfig;
use crate::error::{ConvertError, Result};
use crate::merge::MergedRecord;
use crate::report::{GroupOutcome, Outcome};
use std::path::{Path, PathBuf};

/// Merged archive file name: `<base>_<OW:04>x<OH:04>_sdxl.npz`
#[must_use]
pub fn output_name(base: &str, original_size: OriginalSize) -> String {
    format!(
        "{base}_{:04}x{:04}_sdxl.{ARCHIVE_EXTENSION}",
        original_size.width, original_size.height
    )
}

/// Writes merged records into the destination directory
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dst: PathBuf,
    overwrite: bool,
    dry_run: bool,
}

impl OutputWriter {
    /// Create writer for `dst`
    #[inline]
    #[must_use]
    pub fn new(dst: impl Into<PathBuf>) -> Self {
        Self {
            dst: dst.into(),
            overwrite: false,
            dry_run: false,
        }
    }

    /// Create writer from the destination and modes of `config`
    #[inline]
    #[must_use]
    pub fn from_config(config: &ConvertConfig) -> Self {
        Self::new(config.dst.clone())
            .with_overwrite(config.overwrite)
            .with_dry_run(config.dry_run)
    }

    /// Allow replacing existing outputs
    #[inline]
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Plan outputs without touching the filesystem
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Destination directory
    #[inline]
    #[must_use]
    pub fn dst(&self) -> &Path {
        &self.dst
    }

    /// Destination path for a record
    #[must_use]
    pub fn output_path(&self, record: &MergedRecord) -> PathBuf {
        self.dst
            .join(output_name(record.base(), record.original_size()))
    }

    /// Skip, plan or write one record
    ///
    /// Rules, in order: an existing output without overwrite is skipped;
    /// dry-run plans; otherwise the archive is written.
    ///
    /// # Errors
    /// Returns error if the destination cannot be inspected or written.
    pub fn emit(&self, record: &MergedRecord) -> Result<GroupOutcome> {
        let output = self.output_path(record);
        let exists = output
            .try_exists()
            .map_err(|e| ConvertError::io(&output, e))?;

        let outcome = if exists && !self.overwrite {
            tracing::info!("Output exists, skipping: {}", output.display());
            Outcome::Skipped
        } else if self.dry_run {
            tracing::info!("Planned {} ({} arrays)", output.display(), record.len());
            Outcome::Planned
        } else {
            write_archive(
                &output,
                record.arrays().iter().map(|(key, array)| (key.as_str(), array)),
            )?;
            tracing::info!("Wrote {} ({} arrays)", output.display(), record.len());
            Outcome::Written
        };

        Ok(GroupOutcome {
            base: record.base().to_string(),
            output,
            outcome,
        })
    }
}
