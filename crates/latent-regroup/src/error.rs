//! Error types for latent-regroup
//!
//! Every variant is fatal: the run aborts on the first error. Pre-existing
//! outputs are not errors; they surface as [`Outcome::Skipped`] in the report.
//!
//! [`Outcome::Skipped`]: crate::report::Outcome::Skipped

use crate::archive::{OriginalSize, REQUIRED_KEYS};
use std::path::PathBuf;

/// Result alias used across the crate
pub type Result<T, E = ConvertError> = std::result::Result<T, E>;

/// Main conversion error type
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Source filename does not follow `<base>_<w>x<h>.npz`
    #[error("unexpected source filename format: {file}")]
    Format {
        /// Offending file name
        file: String,
    },

    /// Source directory does not exist
    #[error("source directory does not exist: {}", path.display())]
    NotFound {
        /// Directory that was looked up
        path: PathBuf,
    },

    /// A required array is absent from a legacy archive
    #[error(
        "missing required keys in {}; required: {}",
        path.display(),
        REQUIRED_KEYS.join(", ")
    )]
    MissingKey {
        /// Archive lacking the key
        path: PathBuf,
    },

    /// Two files of one base disagree on the original image size
    #[error("inconsistent original_size for '{base}': {expected} vs {found} ({})", path.display())]
    InconsistentOriginalSize {
        /// Base identifier
        base: String,
        /// Size adopted from the first file
        expected: OriginalSize,
        /// Size reported by `path`
        found: OriginalSize,
        /// Archive that disagreed
        path: PathBuf,
    },

    /// `original_size` is not a 1-D array of two numbers
    #[error("invalid original_size in {}: {reason}", path.display())]
    InvalidOriginalSize {
        /// Offending archive
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// `latents` has fewer than two dimensions
    #[error("invalid latents shape in {}: {shape:?}", path.display())]
    InvalidShape {
        /// Offending archive
        path: PathBuf,
        /// Shape found
        shape: Vec<u64>,
    },

    /// Two files of one base map to the same suffixed key
    #[error("duplicate merged key '{key}' for base '{base}'")]
    DuplicateKey {
        /// Suffixed key
        key: String,
        /// Base identifier
        base: String,
    },

    /// A group resolved to zero files
    #[error("no input files found for base '{base}'")]
    EmptyGroup {
        /// Base identifier
        base: String,
    },

    /// Filesystem failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Container could not be read or written
    #[error("archive error in {}: {source}", path.display())]
    Archive {
        /// Archive path
        path: PathBuf,
        /// Underlying zip error
        #[source]
        source: zip::result::ZipError,
    },

    /// An entry is not a readable `.npy` array
    #[error("malformed array '{key}' in {}: {source}", path.display())]
    Npy {
        /// Archive path
        path: PathBuf,
        /// Array key
        key: String,
        /// Underlying decode error
        #[source]
        source: std::io::Error,
    },

    /// Reporter failed to emit output
    #[error("failed to write report: {0}")]
    Report(#[source] std::io::Error),
}

impl ConvertError {
    /// Wrap an I/O error with the path it occurred on
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a zip error with the archive it occurred on
    #[inline]
    pub fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }

    /// Check if error stems from the input data rather than the environment
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Format { .. }
                | Self::MissingKey { .. }
                | Self::InconsistentOriginalSize { .. }
                | Self::InvalidOriginalSize { .. }
                | Self::InvalidShape { .. }
                | Self::DuplicateKey { .. }
                | Self::EmptyGroup { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_lists_required_set() {
        let err = ConvertError::MissingKey {
            path: PathBuf::from("/cache/a_64x64.npz"),
        };
        assert_eq!(
            err.to_string(),
            "missing required keys in /cache/a_64x64.npz; required: latents, original_size, crop_ltrb"
        );
    }

    #[test]
    fn inconsistency_names_both_sizes() {
        let err = ConvertError::InconsistentOriginalSize {
            base: "img".to_string(),
            expected: OriginalSize::new(1024, 1536),
            found: OriginalSize::new(1024, 1024),
            path: PathBuf::from("img_64x64.npz"),
        };
        let msg = err.to_string();
        assert!(msg.contains("(1024, 1536) vs (1024, 1024)"));
        assert!(msg.contains("img_64x64.npz"));
    }

    #[test]
    fn validation_classification() {
        assert!(ConvertError::EmptyGroup { base: "x".into() }.is_validation());
        assert!(ConvertError::DuplicateKey {
            key: "latents_8x8".into(),
            base: "x".into()
        }
        .is_validation());
        assert!(!ConvertError::NotFound { path: "/nope".into() }.is_validation());
        assert!(!ConvertError::io("/x", std::io::Error::other("boom")).is_validation());
    }
}
