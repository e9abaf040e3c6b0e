//! Scanning of `<root>/<category>/<file>` dataset trees.
//!
//! Entries are returned sorted by file name so a run visits categories and
//! images in the same order on every platform.

use crate::error::PipelineError;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A category directory and its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub path: PathBuf,
}

/// Subdirectories of `root`; plain files at the top level are ignored.
pub fn list_categories(root: &Path) -> Result<Vec<Category>, PipelineError> {
    let mut categories: Vec<Category> = read_dir_sorted(root)?
        .into_iter()
        .filter(|p| p.is_dir())
        .map(|path| Category {
            name: file_name(&path),
            path,
        })
        .collect();
    categories.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(categories)
}

/// Regular files in `dir` with a png/jpg/jpeg extension, any case.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    Ok(list_files(dir)?
        .into_iter()
        .filter(|p| has_image_extension(p))
        .collect())
}

/// Every regular file in `dir`.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    Ok(read_dir_sorted(dir)?
        .into_iter()
        .filter(|p| p.is_file())
        .collect())
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn create_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path).map_err(|source| PipelineError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let read_err = |source| PipelineError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        paths.push(entry.map_err(read_err)?.path());
    }
    paths.sort();
    Ok(paths)
}
