//! latent-regroup - multi-resolution latent cache migration
//!
//! Regroups a directory of single-resolution latent caches
//! (`<base>_<w>x<h>.npz`) into merged SDXL caches
//! (`<base>_<OW>x<OH>_sdxl.npz`) whose arrays are suffixed with their latent
//! resolution, e.g. `latents_64x96`.
//!
//! Pipeline:
//! 1. **Collect**: bucket source archives by base identifier
//! 2. **Merge**: validate each group and rename its arrays
//! 3. **Write**: skip, plan or write the merged archive
//!
//! # Example
//!
//! ```rust,ignore
//! use latent_regroup::prelude::*;
//!
//! let config = ConvertConfig::new("cache/old", "cache/sdxl").with_dry_run(true);
//! let report = run(&config, &mut TextReporter::stdout())?;
//! println!("{} planned", report.produced());
//! ```

// Core modules
pub mod archive;
pub mod collect;
pub mod config;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod report;
pub mod writer;

// Re-exports
pub use archive::{KeyBase, LatentCache, LatentResolution, NpyArray, OriginalSize};
pub use collect::{collect_groups, Groups, SourceFile};
pub use config::ConvertConfig;
pub use error::{ConvertError, Result};
pub use merge::{merge_group, MergedRecord};
pub use pipeline::run;
pub use report::{ConversionReport, GroupOutcome, JsonReporter, Outcome, Reporter, TextReporter};
pub use writer::{output_name, OutputWriter};

/// Common imports for running conversions
pub mod prelude {
    pub use crate::{
        run, ConversionReport, ConvertConfig, ConvertError, JsonReporter, Outcome, Reporter,
        TextReporter,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
