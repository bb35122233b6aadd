//! Testing utilities for the latent-regroup workspace
//!
//! Builders for `.npy` payloads and `.npz` archives shaped like legacy
//! single-resolution latent caches, plus readers for inspecting outputs.

#![allow(missing_docs)]

use npyz::WriterBuilder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub fn npy_f32(shape: &[u64], values: &[f32]) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut writer = npyz::WriteOptions::new()
        .default_dtype()
        .shape(shape)
        .writer(&mut buffer)
        .begin_nd()
        .unwrap();
    writer.extend(values.iter().copied()).unwrap();
    writer.finish().unwrap();
    buffer
}

pub fn npy_i64(shape: &[u64], values: &[i64]) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut writer = npyz::WriteOptions::new()
        .default_dtype()
        .shape(shape)
        .writer(&mut buffer)
        .begin_nd()
        .unwrap();
    writer.extend(values.iter().copied()).unwrap();
    writer.finish().unwrap();
    buffer
}

/// Hand-built `.npy` payload for dtypes the typed writers don't cover
///
/// `descr` is the numpy type string (`"<u8"`, `"|b1"`, ...) and `data` the
/// raw little-endian element bytes.
pub fn npy_raw(descr: &str, shape: &[u64], data: &[u8]) -> Vec<u8> {
    let dims = match shape {
        [n] => format!("({n},)"),
        _ => format!(
            "({})",
            shape.iter().map(u64::to_string).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut header = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {dims}, }}");
    // magic(6) + version(2) + length(2) + header, padded to 64 with a trailing newline
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut buffer = b"\x93NUMPY\x01\x00".to_vec();
    buffer.extend_from_slice(&u16::try_from(header.len()).unwrap().to_le_bytes());
    buffer.extend_from_slice(header.as_bytes());
    buffer.extend_from_slice(data);
    buffer
}

/// Shape recorded in a `.npy` payload's header
pub fn npy_shape(bytes: &[u8]) -> Vec<u64> {
    npyz::NpyFile::new(bytes).unwrap().shape().to_vec()
}

/// Write `entries` as `<name>.npy` members of a new archive
pub fn write_npz(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, bytes) in entries {
        zip.start_file(format!("{name}.npy"), options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// Like [`write_npz`], but every member's central-directory record claims an
/// uncompressed size of `claimed` bytes
pub fn write_npz_claiming_size(path: &Path, entries: &[(&str, Vec<u8>)], claimed: u64) {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    for (name, bytes) in entries {
        zip.start_file(format!("{name}.npy"), options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    let mut bytes = zip.finish().unwrap().into_inner();

    let u16_at = |b: &[u8], at: usize| usize::from(u16::from_le_bytes([b[at], b[at + 1]]));
    let eocd = bytes
        .windows(4)
        .rposition(|w| w == [0x50, 0x4b, 0x05, 0x06])
        .unwrap();
    let count = u16_at(&bytes, eocd + 10);
    let mut at = usize::try_from(u32::from_le_bytes(
        bytes[eocd + 16..eocd + 20].try_into().unwrap(),
    ))
    .unwrap();

    for _ in 0..count {
        assert_eq!(bytes[at..at + 4], [0x50, 0x4b, 0x01, 0x02]);
        let name_len = u16_at(&bytes, at + 28);
        let extra_len = u16_at(&bytes, at + 30);
        let comment_len = u16_at(&bytes, at + 32);

        // ZIP64 extra block: id 0x0001, then the u64 uncompressed size
        let mut field = at + 46 + name_len;
        let extra_end = field + extra_len;
        while field + 4 <= extra_end {
            let id = u16_at(&bytes, field);
            let len = u16_at(&bytes, field + 2);
            if id == 0x0001 {
                bytes[field + 4..field + 12].copy_from_slice(&claimed.to_le_bytes());
                break;
            }
            field += 4 + len;
        }
        at = extra_end + comment_len;
    }

    std::fs::write(path, bytes).unwrap();
}

/// Read every member of an archive, keyed by name without `.npy`
pub fn read_npz(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entries = BTreeMap::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).unwrap();
        let name = entry.name().trim_end_matches(".npy").to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        entries.insert(name, data);
    }
    entries
}

/// Member names of an archive in stored order
pub fn npz_member_names(path: &Path) -> Vec<String> {
    let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    archive.file_names().map(str::to_string).collect()
}

/// Sorted file names in a directory
pub fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Builder for one legacy `<base>_<w>x<h>.npz` cache file
#[derive(Debug, Clone)]
pub struct LegacyCache {
    base: String,
    original_size: (i64, i64),
    latent_hw: (u64, u64),
    scale: (u64, u64),
    latents_shape: Option<Vec<u64>>,
    flipped: bool,
    alpha_mask: bool,
    omitted: Vec<&'static str>,
    replaced: Vec<(&'static str, Vec<u8>)>,
}

impl LegacyCache {
    /// `original_size` is (width, height); `latent_hw` is (height, width).
    /// The filename scale defaults to the latent grid times 8.
    pub fn new(base: &str, original_size: (i64, i64), latent_hw: (u64, u64)) -> Self {
        Self {
            base: base.to_string(),
            original_size,
            latent_hw,
            scale: (latent_hw.1 * 8, latent_hw.0 * 8),
            latents_shape: None,
            flipped: false,
            alpha_mask: false,
            omitted: Vec::new(),
            replaced: Vec::new(),
        }
    }

    pub fn with_scale(mut self, width: u64, height: u64) -> Self {
        self.scale = (width, height);
        self
    }

    pub fn with_latents_shape(mut self, shape: &[u64]) -> Self {
        self.latents_shape = Some(shape.to_vec());
        self
    }

    pub fn with_flipped(mut self) -> Self {
        self.flipped = true;
        self
    }

    pub fn with_alpha_mask(mut self) -> Self {
        self.alpha_mask = true;
        self
    }

    pub fn without(mut self, key: &'static str) -> Self {
        self.omitted.push(key);
        self
    }

    /// Store `bytes` under `key`, replacing the generated payload if any
    pub fn with_entry(mut self, key: &'static str, bytes: Vec<u8>) -> Self {
        self.replaced.push((key, bytes));
        self
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}x{}.npz", self.base, self.scale.0, self.scale.1)
    }

    pub fn latents_shape(&self) -> Vec<u64> {
        self.latents_shape
            .clone()
            .unwrap_or_else(|| vec![4, self.latent_hw.0, self.latent_hw.1])
    }

    /// Array payloads in the order they are stored
    pub fn entries(&self) -> Vec<(&'static str, Vec<u8>)> {
        let (h, w) = self.latent_hw;
        let shape = self.latents_shape();
        let count: u64 = shape.iter().product();
        let latents: Vec<f32> = (0..count).map(|i| (i % 251) as f32 * 0.25).collect();

        let mut entries = vec![
            ("latents", npy_f32(&shape, &latents)),
            (
                "original_size",
                npy_i64(&[2], &[self.original_size.0, self.original_size.1]),
            ),
            (
                "crop_ltrb",
                npy_i64(&[4], &[0, 0, (w * 8) as i64, (h * 8) as i64]),
            ),
        ];
        if self.flipped {
            let flipped: Vec<f32> = latents.iter().rev().copied().collect();
            entries.push(("latents_flipped", npy_f32(&shape, &flipped)));
        }
        if self.alpha_mask {
            entries.push(("alpha_mask", npy_f32(&[h, w], &vec![1.0; (h * w) as usize])));
        }
        for (key, bytes) in &self.replaced {
            match entries.iter_mut().find(|(name, _)| name == key) {
                Some(entry) => entry.1 = bytes.clone(),
                None => entries.push((*key, bytes.clone())),
            }
        }
        entries.retain(|(name, _)| !self.omitted.contains(name));
        entries
    }

    /// Write into `dir`, returning the archive path
    pub fn write(&self, dir: &Path) -> PathBuf {
        let path = dir.join(self.file_name());
        write_npz(&path, &self.entries());
        path
    }
}

/// Fresh source and destination scratch directories
pub fn scratch_dirs() -> (tempfile::TempDir, tempfile::TempDir) {
    (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap())
}
