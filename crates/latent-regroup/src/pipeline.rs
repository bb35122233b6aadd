//! Batch conversion driver
//!
//! Collector → (each group, sorted by base) → Merger → Writer, strictly in
//! sequence. The first error aborts the run.

use crate::collect::collect_groups;
use crate::config::ConvertConfig;
use crate::error::{ConvertError, Result};
use crate::merge::merge_group;
use crate::report::{ConversionReport, Reporter};
use crate::writer::OutputWriter;
use std::fs;

/// Convert every group in `config.src` into `config.dst`
///
/// The destination directory is created up front, dry run included.
/// Returns the run's [`ConversionReport`]; `reporter` sees each outcome as it
/// happens and the final report once.
///
/// # Errors
/// - [`ConvertError::NotFound`] if the source directory does not exist
/// - any collection, merge or write error; earlier outputs stay on disk
pub fn run<R>(config: &ConvertConfig, reporter: &mut R) -> Result<ConversionReport>
where
    R: Reporter + ?Sized,
{
    let config = config
        .absolute()
        .map_err(|e| ConvertError::io(&config.src, e))?;

    if !config.src.is_dir() {
        return Err(ConvertError::NotFound { path: config.src });
    }
    fs::create_dir_all(&config.dst).map_err(|e| ConvertError::io(&config.dst, e))?;

    let groups = collect_groups(&config.src)?;
    tracing::info!(
        "Converting {} groups from {} into {}",
        groups.len(),
        config.src.display(),
        config.dst.display()
    );

    let writer = OutputWriter::from_config(&config);
    let mut report = ConversionReport::new(&config, groups.len());

    for (base, paths) in &groups {
        let record = merge_group(base, paths)?;
        let outcome = writer.emit(&record)?;
        reporter.group(&outcome).map_err(ConvertError::Report)?;
        report.push(outcome);
    }

    reporter.finished(&report).map_err(ConvertError::Report)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Outcome, TextReporter};
    use latent_regroup_test_utils::LegacyCache;

    #[test]
    fn missing_source_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ConvertConfig::new(tmp.path().join("absent"), tmp.path().join("out"));

        let err = run(&config, &mut TextReporter::new(Vec::new())).unwrap_err();
        assert!(matches!(err, ConvertError::NotFound { .. }));
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn groups_processed_in_base_order() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        for base in ["zebra", "apple", "mango"] {
            LegacyCache::new(base, (512, 512), (64, 64)).write(src.path());
        }

        let mut reporter = TextReporter::new(Vec::new());
        let report = run(&ConvertConfig::new(src.path(), dst.path()), &mut reporter).unwrap();

        let bases: Vec<_> = report.outcomes.iter().map(|o| o.base.as_str()).collect();
        assert_eq!(bases, vec!["apple", "mango", "zebra"]);
        assert_eq!(report.count(Outcome::Written), 3);

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(text.lines().next().unwrap().starts_with("[ok] "));
        assert!(text.ends_with(&format!("{}\n", report.summary_line())));
    }
}
