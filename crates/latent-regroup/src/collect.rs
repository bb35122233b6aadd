//! Source discovery and grouping
//!
//! Provides [`SourceFile`] (one parsed legacy filename) and [`collect_groups`],
//! which buckets a directory's archives by base identifier.

use crate::archive::ARCHIVE_EXTENSION;
use crate::error::{ConvertError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

// Greedy base: the rightmost `_<w>x<h>` before the extension is the one split off.
static SOURCE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.+)_(?P<w>\d+)x(?P<h>\d+)\.npz$").expect("static pattern is valid")
});

/// Archives grouped by base identifier, iterated in sorted base order
pub type Groups = BTreeMap<String, Vec<PathBuf>>;

/// One legacy per-resolution cache file
///
/// The width and height come from the filename and only gate its format;
/// merged keys use the latent tensor's shape instead.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceFile {
    path: PathBuf,
    base: String,
    width: u64,
    height: u64,
}

impl SourceFile {
    /// Parse a path whose file name is `<base>_<w>x<h>.npz`
    ///
    /// # Errors
    /// Returns [`ConvertError::Format`] if the name does not match.
    pub fn parse(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let format_error = || ConvertError::Format { file: name.clone() };

        let caps = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| SOURCE_NAME_RE.captures(n))
            .ok_or_else(format_error)?;
        let width = caps["w"].parse().map_err(|_| format_error())?;
        let height = caps["h"].parse().map_err(|_| format_error())?;
        let base = caps["base"].to_string();

        Ok(Self {
            path,
            base,
            width,
            height,
        })
    }

    /// Full path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base identifier shared by all resolutions of one image
    #[inline]
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Scale width from the filename
    #[inline]
    #[must_use]
    pub fn width(&self) -> u64 {
        self.width
    }

    /// Scale height from the filename
    #[inline]
    #[must_use]
    pub fn height(&self) -> u64 {
        self.height
    }
}

/// List archive files directly inside `dir` (non-recursive)
///
/// Hidden entries (leading `.`) and non-files are ignored, matching a
/// `*.npz` shell glob.
///
/// # Errors
/// Returns error if the directory cannot be read.
pub fn list_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let suffix = format!(".{ARCHIVE_EXTENSION}");
    let mut found = Vec::new();

    for entry in fs::read_dir(dir).map_err(|e| ConvertError::io(dir, e))? {
        let entry = entry.map_err(|e| ConvertError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || !name.ends_with(&suffix) {
            continue;
        }
        let path = entry.path();
        if path.is_file() {
            found.push(path);
        }
    }
    Ok(found)
}

/// Bucket every archive in `src_dir` by its base identifier
///
/// An empty directory yields an empty map.
///
/// # Errors
/// - [`ConvertError::Format`] on the first non-conforming file name
/// - I/O failure listing the directory
pub fn collect_groups(src_dir: &Path) -> Result<Groups> {
    let mut groups = Groups::new();
    for path in list_archives(src_dir)? {
        let source = SourceFile::parse(path)?;
        tracing::debug!(
            "Found {} (base '{}', scale {}x{})",
            source.path().display(),
            source.base(),
            source.width(),
            source.height()
        );
        groups.entry(source.base).or_default().push(source.path);
    }
    tracing::debug!("Collected {} groups from {}", groups.len(), src_dir.display());
    Ok(groups)
}
