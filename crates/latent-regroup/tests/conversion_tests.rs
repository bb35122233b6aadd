//! End-to-end conversion runs over scratch directories

use latent_regroup::prelude::*;
use latent_regroup_test_utils::{
    dir_listing, npy_f32, npy_shape, npz_member_names, read_npz, scratch_dirs, LegacyCache,
};
use pretty_assertions::assert_eq;
use std::path::Path;

fn quiet_run(config: &ConvertConfig) -> Result<ConversionReport, ConvertError> {
    run(config, &mut TextReporter::new(Vec::new()))
}

fn seed_img(src: &Path) {
    LegacyCache::new("img", (1024, 1536), (32, 48)).write(src);
    LegacyCache::new("img", (1024, 1536), (64, 96))
        .with_flipped()
        .with_alpha_mask()
        .write(src);
}

#[test]
fn test_merges_resolutions_into_sdxl_archive() {
    let (src, dst) = scratch_dirs();
    seed_img(src.path());

    let report = quiet_run(&ConvertConfig::new(src.path(), dst.path())).unwrap();
    assert_eq!(report.groups, 1);
    assert_eq!(report.count(Outcome::Written), 1);

    let output = dst.path().join("img_1024x1536_sdxl.npz");
    assert_eq!(report.outcomes[0].output, output);
    assert_eq!(
        npz_member_names(&output),
        vec![
            "latents_32x48.npy",
            "original_size_32x48.npy",
            "crop_ltrb_32x48.npy",
            "latents_64x96.npy",
            "original_size_64x96.npy",
            "crop_ltrb_64x96.npy",
            "latents_flipped_64x96.npy",
            "alpha_mask_64x96.npy",
        ]
    );

    let merged = read_npz(&output);
    assert_eq!(npy_shape(&merged["latents_64x96"]), vec![4, 64, 96]);
    assert_eq!(npy_shape(&merged["alpha_mask_64x96"]), vec![64, 96]);
}

#[test]
fn test_array_payloads_copied_verbatim() {
    let (src, dst) = scratch_dirs();
    let source = LegacyCache::new("cat", (800, 600), (75, 100)).with_flipped();
    source.write(src.path());

    quiet_run(&ConvertConfig::new(src.path(), dst.path())).unwrap();

    let merged = read_npz(&dst.path().join("cat_0800x0600_sdxl.npz"));
    for (key, bytes) in source.entries() {
        assert_eq!(merged[&format!("{key}_75x100")], bytes, "{key}");
    }
}

#[test]
fn test_rerun_with_overwrite_is_identical() {
    let (src, dst) = scratch_dirs();
    seed_img(src.path());
    LegacyCache::new("dog", (640, 640), (80, 80)).write(src.path());
    let config = ConvertConfig::new(src.path(), dst.path()).with_overwrite(true);

    quiet_run(&config).unwrap();
    let first: Vec<_> = dir_listing(dst.path())
        .iter()
        .map(|name| read_npz(&dst.path().join(name)))
        .collect();

    let report = quiet_run(&config).unwrap();
    assert_eq!(report.count(Outcome::Written), 2);
    let second: Vec<_> = dir_listing(dst.path())
        .iter()
        .map(|name| read_npz(&dst.path().join(name)))
        .collect();

    assert_eq!(first, second);
}

#[test]
fn test_rerun_without_overwrite_skips_everything() {
    let (src, dst) = scratch_dirs();
    seed_img(src.path());
    LegacyCache::new("dog", (640, 640), (80, 80)).write(src.path());
    let config = ConvertConfig::new(src.path(), dst.path());

    quiet_run(&config).unwrap();
    let output = dst.path().join("img_1024x1536_sdxl.npz");
    let before = std::fs::read(&output).unwrap();
    let modified = std::fs::metadata(&output).unwrap().modified().unwrap();

    let report = quiet_run(&config).unwrap();
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.produced(), 0);
    assert_eq!(std::fs::read(&output).unwrap(), before);
    assert_eq!(std::fs::metadata(&output).unwrap().modified().unwrap(), modified);
}

#[test]
fn test_dry_run_plans_what_a_real_run_writes() {
    let (src, dst) = scratch_dirs();
    seed_img(src.path());
    LegacyCache::new("dog", (640, 640), (80, 80)).write(src.path());

    for overwrite in [false, true] {
        let config = ConvertConfig::new(src.path(), dst.path())
            .with_dry_run(true)
            .with_overwrite(overwrite);
        let report = quiet_run(&config).unwrap();
        assert_eq!(report.count(Outcome::Planned), 2);
        assert!(dir_listing(dst.path()).is_empty());
    }

    let planned: Vec<_> = quiet_run(&ConvertConfig::new(src.path(), dst.path()).with_dry_run(true))
        .unwrap()
        .outcomes
        .into_iter()
        .map(|o| o.output)
        .collect();
    let written: Vec<_> = quiet_run(&ConvertConfig::new(src.path(), dst.path()))
        .unwrap()
        .outcomes
        .into_iter()
        .map(|o| o.output)
        .collect();
    assert_eq!(planned, written);
    assert_eq!(
        dir_listing(dst.path()),
        vec!["dog_0640x0640_sdxl.npz", "img_1024x1536_sdxl.npz"]
    );
}

#[test]
fn test_dry_run_creates_destination_directory() {
    let (src, scratch) = scratch_dirs();
    seed_img(src.path());
    let dst = scratch.path().join("nested").join("out");

    quiet_run(&ConvertConfig::new(src.path(), &dst).with_dry_run(true)).unwrap();
    assert!(dst.is_dir());
    assert!(dir_listing(&dst).is_empty());
}

#[test]
fn test_empty_source_reports_no_files() {
    let (src, scratch) = scratch_dirs();
    let dst = scratch.path().join("out");
    let mut reporter = TextReporter::new(Vec::new());

    let report = run(&ConvertConfig::new(src.path(), &dst), &mut reporter).unwrap();
    assert!(report.is_empty());
    assert!(report.outcomes.is_empty());
    assert!(dst.is_dir());
    assert!(dir_listing(&dst).is_empty());

    let text = String::from_utf8(reporter.into_inner()).unwrap();
    assert_eq!(
        text,
        format!("No source .npz files found in {}\n", src.path().display())
    );
}

#[test]
fn test_inconsistent_group_aborts_before_its_output_and_later_bases() {
    let (src, dst) = scratch_dirs();
    LegacyCache::new("aaa", (512, 512), (64, 64)).write(src.path());
    LegacyCache::new("mmm", (512, 512), (64, 64)).write(src.path());
    LegacyCache::new("mmm", (512, 768), (32, 32)).write(src.path());
    LegacyCache::new("zzz", (512, 512), (64, 64)).write(src.path());

    let err = quiet_run(&ConvertConfig::new(src.path(), dst.path())).unwrap_err();
    assert!(matches!(err, ConvertError::InconsistentOriginalSize { ref base, .. } if base == "mmm"));
    assert_eq!(dir_listing(dst.path()), vec!["aaa_0512x0512_sdxl.npz"]);
}

#[test]
fn test_duplicate_latent_shape_fails() {
    let (src, dst) = scratch_dirs();
    LegacyCache::new("img", (512, 512), (64, 64))
        .with_scale(512, 512)
        .write(src.path());
    LegacyCache::new("img", (512, 512), (64, 64))
        .with_scale(520, 520)
        .write(src.path());

    let err = quiet_run(&ConvertConfig::new(src.path(), dst.path())).unwrap_err();
    assert!(matches!(err, ConvertError::DuplicateKey { ref key, .. } if key == "latents_64x64"));
    assert!(dir_listing(dst.path()).is_empty());
}

#[test]
fn test_missing_crop_box_fails() {
    let (src, dst) = scratch_dirs();
    let path = LegacyCache::new("img", (512, 512), (64, 64))
        .without("crop_ltrb")
        .write(src.path());

    let err = quiet_run(&ConvertConfig::new(src.path(), dst.path())).unwrap_err();
    assert!(matches!(err, ConvertError::MissingKey { path: ref p } if p == &path));
}

#[test]
fn test_non_finite_original_size_fails_without_output() {
    let (src, dst) = scratch_dirs();
    let path = LegacyCache::new("img", (512, 512), (64, 64))
        .with_entry("original_size", npy_f32(&[2], &[f32::NAN, 512.0]))
        .write(src.path());

    let err = quiet_run(&ConvertConfig::new(src.path(), dst.path())).unwrap_err();
    assert!(matches!(err, ConvertError::InvalidOriginalSize { path: ref p, .. } if p == &path));
    assert!(dir_listing(dst.path()).is_empty());
}

#[test]
fn test_bad_filename_fails_whole_run() {
    let (src, dst) = scratch_dirs();
    seed_img(src.path());
    std::fs::write(src.path().join("stray.npz"), b"").unwrap();

    let err = quiet_run(&ConvertConfig::new(src.path(), dst.path())).unwrap_err();
    assert!(matches!(err, ConvertError::Format { ref file } if file == "stray.npz"));
    assert!(err.is_validation());
    assert!(dir_listing(dst.path()).is_empty());
}

#[test]
fn test_json_reporter_emits_report() {
    let (src, dst) = scratch_dirs();
    seed_img(src.path());
    let mut reporter = JsonReporter::new(Vec::new());

    let report = run(&ConvertConfig::new(src.path(), dst.path()), &mut reporter).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&reporter.into_inner()).unwrap();
    assert_eq!(json["groups"], 1);
    assert_eq!(json["outcomes"][0]["outcome"], "written");
    assert_eq!(json["outcomes"][0]["base"], "img");
    assert_eq!(report.produced(), 1);
}
