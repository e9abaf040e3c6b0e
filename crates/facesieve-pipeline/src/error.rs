use std::path::PathBuf;
use thiserror::Error;

/// Run-level failures. Anything reported here aborts the whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("detector error: {0}")]
    Detector(#[from] facesieve_core::DetectorError),
    #[error("augmentation error: {0}")]
    Augment(#[from] facesieve_core::AugmentError),
    #[error("cannot write manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode manifest: {0}")]
    ManifestEncode(#[from] serde_json::Error),
}
