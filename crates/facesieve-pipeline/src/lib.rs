//! facesieve-pipeline — filesystem stages of dataset preparation.
//!
//! Walks a `<root>/<category>/<image>` tree, runs the face extractor and both
//! deduplication stages per category, writes the surviving crops, and fans
//! them out into augmented variants.

pub mod augment;
pub mod config;
pub mod dataset;
pub mod error;
pub mod preprocess;
pub mod summary;
pub mod writer;

pub use augment::{augment_tree, variant_name, AugmentOptions, AugmentReport};
pub use config::{Config, ConfigError};
pub use error::PipelineError;
pub use preprocess::{CategoryStats, PreprocessReport, Preprocessor};
pub use summary::{summarize_tree, DatasetSummary};
pub use writer::{output_name, write_manifest, Writer};
