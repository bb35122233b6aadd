//! Per-group merge
//!
//! Folds every legacy archive of one base identifier into a single
//! [`MergedRecord`], renaming each array to `<key_base>_<h>x<w>`.

use crate::archive::{LatentCache, NpyArray, OriginalSize};
use crate::error::{ConvertError, Result};
use indexmap::IndexMap;
use std::path::PathBuf;

/// Merged multi-resolution arrays for one base identifier
#[derive(Debug, Clone)]
pub struct MergedRecord {
    base: String,
    original_size: OriginalSize,
    arrays: IndexMap<String, NpyArray>,
}

impl MergedRecord {
    /// Base identifier
    #[inline]
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Original size shared by every source file of the group
    #[inline]
    #[must_use]
    pub fn original_size(&self) -> OriginalSize {
        self.original_size
    }

    /// Suffixed arrays, in the order they were merged
    #[inline]
    #[must_use]
    pub fn arrays(&self) -> &IndexMap<String, NpyArray> {
        &self.arrays
    }

    /// Suffixed keys, in the order they were merged
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    /// Number of merged arrays
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// Check if no arrays were merged
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// Merge all archives of `base` into one record
///
/// Paths are visited in lexicographic order of their full path string so
/// that duplicate detection is reproducible. Only one archive is held open
/// at a time.
///
/// # Errors
/// - [`ConvertError::MissingKey`] / [`ConvertError::InvalidOriginalSize`] from loading
/// - [`ConvertError::InconsistentOriginalSize`] if files disagree on the original size
/// - [`ConvertError::InvalidShape`] if `latents` has fewer than two dims
/// - [`ConvertError::DuplicateKey`] if two files map to the same suffixed key
/// - [`ConvertError::EmptyGroup`] if `paths` is empty
pub fn merge_group(base: &str, paths: &[PathBuf]) -> Result<MergedRecord> {
    let mut ordered: Vec<&PathBuf> = paths.iter().collect();
    ordered.sort_by_cached_key(|p| p.to_string_lossy().into_owned());

    let mut arrays: IndexMap<String, NpyArray> = IndexMap::new();
    let mut original_size: Option<OriginalSize> = None;

    for path in ordered {
        let cache = LatentCache::load(path)?;

        let this_size = cache.original_size();
        match original_size {
            None => original_size = Some(this_size),
            Some(expected) if expected != this_size => {
                return Err(ConvertError::InconsistentOriginalSize {
                    base: base.to_string(),
                    expected,
                    found: this_size,
                    path: path.clone(),
                });
            }
            Some(_) => {}
        }

        let resolution = cache.resolution()?;
        tracing::debug!("Merging {} at {resolution}", path.display());

        for (key_base, array) in cache.into_arrays() {
            let key = key_base.suffixed(resolution);
            if arrays.contains_key(&key) {
                return Err(ConvertError::DuplicateKey {
                    key,
                    base: base.to_string(),
                });
            }
            arrays.insert(key, array);
        }
    }

    let original_size = original_size.ok_or_else(|| ConvertError::EmptyGroup {
        base: base.to_string(),
    })?;

    Ok(MergedRecord {
        base: base.to_string(),
        original_size,
        arrays,
    })
}
