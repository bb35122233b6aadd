//! Run configuration

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{self, PathBuf};

/// Conversion run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Directory of legacy `<base>_<w>x<h>.npz` archives
    pub src: PathBuf,
    /// Directory merged archives are written to
    pub dst: PathBuf,
    /// Replace existing outputs instead of skipping them
    pub overwrite: bool,
    /// Report planned outputs without writing
    pub dry_run: bool,
}

impl ConvertConfig {
    /// Create configuration with overwrite and dry-run off
    #[inline]
    #[must_use]
    pub fn new(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            overwrite: false,
            dry_run: false,
        }
    }

    /// With overwrite mode
    #[inline]
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// With dry-run mode
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Same configuration with `src` and `dst` made absolute
    ///
    /// Relative paths are joined onto the current directory; nothing is
    /// required to exist yet.
    ///
    /// # Errors
    /// Returns error if the current directory cannot be determined.
    pub fn absolute(&self) -> io::Result<Self> {
        Ok(Self {
            src: path::absolute(&self.src)?,
            dst: path::absolute(&self.dst)?,
            ..self.clone()
        })
    }
}
