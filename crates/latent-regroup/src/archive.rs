//! `.npz` archive access
//!
//! Provides [`LatentCache`], the typed view of one legacy single-resolution
//! cache file, and [`write_archive`] for emitting merged archives.
//!
//! Arrays are carried as raw `.npy` payloads ([`NpyArray`]). Only headers are
//! parsed, plus the two values of `original_size`; tensor data is copied
//! through untouched.

use crate::error::{ConvertError, Result};
use npyz::{DType, NpyFile, TypeChar};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// File extension of cache archives (without the dot)
pub const ARCHIVE_EXTENSION: &str = "npz";

/// Suffix numpy gives each array entry inside an archive
pub const NPY_SUFFIX: &str = ".npy";

/// Keys every legacy archive must carry
pub const REQUIRED_KEYS: [&str; 3] = ["latents", "original_size", "crop_ltrb"];

/// Array names carried over into merged archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyBase {
    /// Encoded latent tensor
    Latents,
    /// Full-resolution (width, height) before scaling
    OriginalSize,
    /// Crop box, left/top/right/bottom
    CropLtrb,
    /// Latents of the horizontally flipped image
    LatentsFlipped,
    /// Per-pixel alpha mask
    AlphaMask,
}

impl KeyBase {
    /// All recognised key bases, in merge order
    pub const ALL: [Self; 5] = [
        Self::Latents,
        Self::OriginalSize,
        Self::CropLtrb,
        Self::LatentsFlipped,
        Self::AlphaMask,
    ];

    /// Array name as stored in the archive
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Latents => "latents",
            Self::OriginalSize => "original_size",
            Self::CropLtrb => "crop_ltrb",
            Self::LatentsFlipped => "latents_flipped",
            Self::AlphaMask => "alpha_mask",
        }
    }

    /// Whether legacy archives must contain this key
    #[inline]
    #[must_use]
    pub const fn is_required(self) -> bool {
        matches!(self, Self::Latents | Self::OriginalSize | Self::CropLtrb)
    }

    /// Look up a key base by its array name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    /// Merged key for this base at `resolution`, e.g. `latents_32x48`
    #[inline]
    #[must_use]
    pub fn suffixed(self, resolution: LatentResolution) -> String {
        format!("{}{}", self.as_str(), resolution.suffix())
    }
}

impl Display for KeyBase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full-resolution size of the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginalSize {
    /// Width in pixels
    pub width: i64,
    /// Height in pixels
    pub height: i64,
}

impl OriginalSize {
    /// Create new size
    #[inline]
    #[must_use]
    pub const fn new(width: i64, height: i64) -> Self {
        Self { width, height }
    }

    /// Decode from an `original_size` array
    ///
    /// # Errors
    /// Returns a description of the problem if the array is not 1-D with
    /// exactly two numeric elements.
    pub fn from_array(array: &NpyArray) -> Result<Self, String> {
        if array.shape() != [2] {
            return Err(format!("expected shape [2], found {:?}", array.shape()));
        }
        let values = decode_integers(array).map_err(|e| e.to_string())?;
        match values[..] {
            [width, height] => Ok(Self::new(width, height)),
            _ => Err(format!("expected 2 values, found {}", values.len())),
        }
    }
}

impl Display for OriginalSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.width, self.height)
    }
}

/// Spatial size of one latent grid, taken from the last two dims of `latents`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LatentResolution {
    /// Latent rows
    pub height: u64,
    /// Latent columns
    pub width: u64,
}

impl LatentResolution {
    /// Read the resolution off a tensor shape (`None` if fewer than 2 dims)
    #[must_use]
    pub fn from_shape(shape: &[u64]) -> Option<Self> {
        match shape {
            [.., height, width] => Some(Self {
                height: *height,
                width: *width,
            }),
            _ => None,
        }
    }

    /// Key suffix, `_<height>x<width>`
    #[inline]
    #[must_use]
    pub fn suffix(&self) -> String {
        format!("_{}x{}", self.height, self.width)
    }
}

impl Display for LatentResolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// One `.npy` payload with its parsed header
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    data: Vec<u8>,
    shape: Vec<u64>,
    dtype: DType,
}

impl NpyArray {
    /// Parse the header of a raw `.npy` payload
    ///
    /// # Errors
    /// Returns error if the bytes do not start with a valid `.npy` header.
    pub fn from_bytes(data: Vec<u8>) -> io::Result<Self> {
        let (shape, dtype) = {
            let npy = NpyFile::new(&data[..])?;
            (npy.shape().to_vec(), npy.dtype())
        };
        Ok(Self { data, shape, dtype })
    }

    /// Array shape
    #[inline]
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Element type
    #[inline]
    #[must_use]
    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    /// Raw `.npy` bytes, header included
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn decode_integers(array: &NpyArray) -> io::Result<Vec<i64>> {
    let npy = NpyFile::new(array.as_bytes())?;
    let DType::Plain(type_str) = npy.dtype() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "structured dtype is not numeric",
        ));
    };
    match (type_str.type_char(), type_str.size_field()) {
        (TypeChar::Int, 1) => widen(npy.into_vec::<i8>()?),
        (TypeChar::Int, 2) => widen(npy.into_vec::<i16>()?),
        (TypeChar::Int, 4) => widen(npy.into_vec::<i32>()?),
        (TypeChar::Int, 8) => npy.into_vec::<i64>(),
        (TypeChar::Uint, 1) => widen(npy.into_vec::<u8>()?),
        (TypeChar::Uint, 2) => widen(npy.into_vec::<u16>()?),
        (TypeChar::Uint, 4) => widen(npy.into_vec::<u32>()?),
        (TypeChar::Uint, 8) => npy
            .into_vec::<u64>()?
            .into_iter()
            .map(|v| {
                i64::try_from(v).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            })
            .collect(),
        (TypeChar::Float, 4) => truncate(npy.into_vec::<f32>()?.into_iter().map(f64::from)),
        (TypeChar::Float, 8) => truncate(npy.into_vec::<f64>()?),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported dtype {type_str}"),
        )),
    }
}

fn widen<T: Into<i64>>(values: Vec<T>) -> io::Result<Vec<i64>> {
    Ok(values.into_iter().map(Into::into).collect())
}

// Integer cast semantics: truncate toward zero, reject non-finite values.
#[allow(clippy::cast_possible_truncation)]
fn truncate(values: impl IntoIterator<Item = f64>) -> io::Result<Vec<i64>> {
    values
        .into_iter()
        .map(|v| {
            if v.is_finite() {
                Ok(v.trunc() as i64)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("cannot convert {v} to an integer"),
                ))
            }
        })
        .collect()
}

/// Typed view of one legacy single-resolution cache archive
///
/// Required arrays are plain fields, optional arrays are `Option`s. Presence
/// and the `original_size` value are validated once, in [`LatentCache::load`].
#[derive(Debug, Clone)]
pub struct LatentCache {
    path: PathBuf,
    original_size: OriginalSize,
    /// Latent tensor; the last two dims are the latent grid
    pub latents: NpyArray,
    /// Raw `original_size` array, carried over as-is
    pub original_size_array: NpyArray,
    /// Crop box
    pub crop_ltrb: NpyArray,
    /// Flipped latents, if cached
    pub latents_flipped: Option<NpyArray>,
    /// Alpha mask, if cached
    pub alpha_mask: Option<NpyArray>,
}

impl LatentCache {
    /// Load a legacy archive
    ///
    /// The file is opened, the recognised entries are read into memory and
    /// the handle is dropped before returning.
    ///
    /// # Errors
    /// - [`ConvertError::MissingKey`] if a required array is absent
    /// - [`ConvertError::InvalidOriginalSize`] if `original_size` is not two numbers
    /// - I/O, zip or `.npy` header failures
    pub fn load(path: &Path) -> Result<Self> {
        let mut raw = read_entries(path)?;

        if REQUIRED_KEYS
            .iter()
            .filter_map(|name| KeyBase::parse(name))
            .any(|key| !raw.contains_key(&key))
        {
            return Err(ConvertError::MissingKey {
                path: path.to_path_buf(),
            });
        }

        let mut take = |key: KeyBase| -> Result<Option<NpyArray>> {
            raw.remove(&key)
                .map(|data| {
                    NpyArray::from_bytes(data).map_err(|source| ConvertError::Npy {
                        path: path.to_path_buf(),
                        key: key.as_str().to_string(),
                        source,
                    })
                })
                .transpose()
        };
        let missing = || ConvertError::MissingKey {
            path: path.to_path_buf(),
        };

        let original_size_array = take(KeyBase::OriginalSize)?.ok_or_else(missing)?;
        let original_size = OriginalSize::from_array(&original_size_array).map_err(|reason| {
            ConvertError::InvalidOriginalSize {
                path: path.to_path_buf(),
                reason,
            }
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            original_size,
            latents: take(KeyBase::Latents)?.ok_or_else(missing)?,
            original_size_array,
            crop_ltrb: take(KeyBase::CropLtrb)?.ok_or_else(missing)?,
            latents_flipped: take(KeyBase::LatentsFlipped)?,
            alpha_mask: take(KeyBase::AlphaMask)?,
        })
    }

    /// Archive this cache was loaded from
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decoded `original_size`
    #[inline]
    #[must_use]
    pub fn original_size(&self) -> OriginalSize {
        self.original_size
    }

    /// Latent grid size from the last two dims of `latents`
    ///
    /// # Errors
    /// Returns [`ConvertError::InvalidShape`] if `latents` has fewer than 2 dims.
    pub fn resolution(&self) -> Result<LatentResolution> {
        LatentResolution::from_shape(self.latents.shape()).ok_or_else(|| {
            ConvertError::InvalidShape {
                path: self.path.clone(),
                shape: self.latents.shape().to_vec(),
            }
        })
    }

    /// Consume into the present arrays, in [`KeyBase::ALL`] order
    #[must_use]
    pub fn into_arrays(self) -> Vec<(KeyBase, NpyArray)> {
        let mut arrays = vec![
            (KeyBase::Latents, self.latents),
            (KeyBase::OriginalSize, self.original_size_array),
            (KeyBase::CropLtrb, self.crop_ltrb),
        ];
        arrays.extend(self.latents_flipped.map(|a| (KeyBase::LatentsFlipped, a)));
        arrays.extend(self.alpha_mask.map(|a| (KeyBase::AlphaMask, a)));
        arrays
    }
}

fn read_entries(path: &Path) -> Result<HashMap<KeyBase, Vec<u8>>> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| ConvertError::archive(path, e))?;

    let mut raw = HashMap::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ConvertError::archive(path, e))?;
        let Some(key) = entry.name().strip_suffix(NPY_SUFFIX).and_then(KeyBase::parse) else {
            continue;
        };
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| ConvertError::io(path, e))?;
        raw.insert(key, data);
    }
    tracing::debug!("Read {} arrays from {}", raw.len(), path.display());
    Ok(raw)
}

/// Write arrays as a new `.npz` at `path`, creating or truncating it
///
/// Entries are stored uncompressed as `<key>.npy`, in iteration order, with
/// a fixed timestamp so identical input yields identical bytes.
///
/// # Errors
/// Returns error on any I/O or zip failure.
pub fn write_archive<'a>(
    path: &Path,
    arrays: impl IntoIterator<Item = (&'a str, &'a NpyArray)>,
) -> Result<()> {
    let file = File::create(path).map_err(|e| ConvertError::io(path, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    for (key, array) in arrays {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(DateTime::default())
            .large_file(array.len() as u64 >= u64::from(u32::MAX));
        zip.start_file(format!("{key}{NPY_SUFFIX}"), options)
            .map_err(|e| ConvertError::archive(path, e))?;
        zip.write_all(array.as_bytes())
            .map_err(|e| ConvertError::io(path, e))?;
    }

    let mut inner = zip.finish().map_err(|e| ConvertError::archive(path, e))?;
    inner.flush().map_err(|e| ConvertError::io(path, e))
}
