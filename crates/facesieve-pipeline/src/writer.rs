use crate::dataset::create_dir;
use crate::error::PipelineError;
use facesieve_core::{FaceCrop, ProcessedRecord};
use std::path::{Path, PathBuf};

/// `processed_<index>_<original>`.
pub fn output_name(index: usize, original: &str) -> String {
    format!("processed_{index}_{original}")
}

/// Persists deduplicated crops under `<output_root>/<category>/`.
///
/// Names derive from position in the filtered sequence, so existing files
/// with the same name are overwritten and files left by an earlier, larger
/// run stay behind.
#[derive(Debug, Clone)]
pub struct Writer {
    output_root: PathBuf,
}

impl Writer {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.output_root.join(category)
    }

    /// Write `crops` for one category, returning a record per file written.
    ///
    /// Failing to create the category directory aborts; failing to encode a
    /// single crop is logged and that crop is omitted.
    pub fn write_category(
        &self,
        category: &str,
        crops: &[FaceCrop],
    ) -> Result<Vec<ProcessedRecord>, PipelineError> {
        let dir = self.category_dir(category);
        create_dir(&dir)?;

        let mut records = Vec::with_capacity(crops.len());
        for (index, crop) in crops.iter().enumerate() {
            let path = dir.join(output_name(index, &crop.file_name));
            if let Err(e) = crop.pixels.save(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to write face crop");
                continue;
            }
            records.push(ProcessedRecord {
                category: category.to_string(),
                path,
                original: crop.file_name.clone(),
            });
        }
        Ok(records)
    }
}

/// Persist `records` as pretty-printed JSON.
pub fn write_manifest(path: &Path, records: &[ProcessedRecord]) -> Result<(), PipelineError> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json).map_err(|source| PipelineError::Manifest {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), records = records.len(), "manifest written");
    Ok(())
}
