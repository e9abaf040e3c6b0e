use crate::dataset;
use crate::error::PipelineError;
use std::fmt;
use std::path::Path;

/// File counts of a `<root>/<category>/` tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSummary {
    /// `(category, file count)` in category order.
    pub categories: Vec<(String, usize)>,
}

impl DatasetSummary {
    pub fn total(&self) -> usize {
        self.categories.iter().map(|(_, n)| n).sum()
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, count) in &self.categories {
            writeln!(f, "{name}: {count} images")?;
        }
        write!(f, "total: {} images", self.total())
    }
}

pub fn summarize_tree(root: &Path) -> Result<DatasetSummary, PipelineError> {
    let mut summary = DatasetSummary::default();
    for category in dataset::list_categories(root)? {
        let count = dataset::list_files(&category.path)?.len();
        summary.categories.push((category.name, count));
    }
    Ok(summary)
}
