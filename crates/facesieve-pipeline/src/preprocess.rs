//! The staged preprocessing run: extract → hash-dedup → cluster-dedup → write.

use crate::config::Config;
use crate::dataset::{self, Category};
use crate::error::PipelineError;
use crate::writer::Writer;
use facesieve_core::{
    Clusterer, Dbscan, DetectorProvider, DuplicateFilter, ExtractOutcome, FaceCrop, FaceExtractor,
    NearDuplicateClusterer, ProcessedRecord, SkipReason,
};
use std::path::Path;

/// Per-category counters for one preprocessing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub name: String,
    /// Image files found in the category directory.
    pub scanned: usize,
    pub unreadable: usize,
    pub no_face: usize,
    pub invalid_box: usize,
    /// Per-image failures other than the above (logged with their path).
    pub failed: usize,
    pub hash_duplicates: usize,
    pub near_duplicates: usize,
    pub written: usize,
}

impl CategoryStats {
    fn record_skip(&mut self, reason: &SkipReason) {
        match reason {
            SkipReason::Unreadable => self.unreadable += 1,
            SkipReason::NoFace => self.no_face += 1,
            SkipReason::InvalidBox => self.invalid_box += 1,
            SkipReason::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreprocessReport {
    pub records: Vec<ProcessedRecord>,
    pub categories: Vec<CategoryStats>,
}

impl PreprocessReport {
    pub fn total_written(&self) -> usize {
        self.records.len()
    }
}

/// Runs every category of a dataset tree through the preprocessing stages.
pub struct Preprocessor<P, C = Dbscan> {
    provider: P,
    extractor: FaceExtractor,
    clusterer: NearDuplicateClusterer<C>,
}

impl<P: DetectorProvider> Preprocessor<P, Dbscan> {
    /// Extractor and DBSCAN clusterer parameterized from `config`.
    pub fn from_config(provider: P, config: &Config) -> Self {
        Self::new(
            provider,
            FaceExtractor::new(config.target_size),
            NearDuplicateClusterer::new(Dbscan::new(
                config.cluster_eps,
                config.cluster_min_samples,
            )),
        )
    }
}

impl<P: DetectorProvider, C: Clusterer> Preprocessor<P, C> {
    pub fn new(provider: P, extractor: FaceExtractor, clusterer: NearDuplicateClusterer<C>) -> Self {
        Self {
            provider,
            extractor,
            clusterer,
        }
    }

    /// Process `dataset_root/<category>/*` into `output_root/<category>/`.
    ///
    /// Fails only on run-level problems: an unreadable root or category
    /// directory, an uncreatable output directory, or a detector that cannot
    /// be loaded. Problems with individual images are counted and skipped.
    pub fn run(
        &self,
        dataset_root: &Path,
        output_root: &Path,
    ) -> Result<PreprocessReport, PipelineError> {
        let categories = dataset::list_categories(dataset_root)?;
        dataset::create_dir(output_root)?;
        let writer = Writer::new(output_root);

        let mut report = PreprocessReport::default();
        for category in categories {
            let (records, stats) = self.process_category(&category, &writer)?;
            tracing::info!(
                category = %stats.name,
                scanned = stats.scanned,
                no_face = stats.no_face,
                hash_duplicates = stats.hash_duplicates,
                near_duplicates = stats.near_duplicates,
                written = stats.written,
                "category processed"
            );
            report.records.extend(records);
            report.categories.push(stats);
        }

        tracing::info!(
            categories = report.categories.len(),
            written = report.total_written(),
            "preprocessing complete"
        );
        Ok(report)
    }

    /// Run one category with its own detector and duplicate filter.
    pub fn process_category(
        &self,
        category: &Category,
        writer: &Writer,
    ) -> Result<(Vec<ProcessedRecord>, CategoryStats), PipelineError> {
        let mut stats = CategoryStats {
            name: category.name.clone(),
            ..CategoryStats::default()
        };
        let images = dataset::list_images(&category.path)?;
        stats.scanned = images.len();

        let unique = {
            // Released at the end of this block, before clustering and writing.
            let mut detector = self.provider.acquire()?;
            tracing::debug!(category = %category.name, images = images.len(), "detector acquired");

            let mut filter = DuplicateFilter::new();
            let mut unique: Vec<FaceCrop> = Vec::new();
            for path in &images {
                match self
                    .extractor
                    .extract_path(path, &category.name, detector.as_mut())
                {
                    ExtractOutcome::Extracted(crop) => {
                        if filter.keep(&crop) {
                            unique.push(crop);
                        } else {
                            tracing::debug!(path = %path.display(), "exact duplicate dropped");
                            stats.hash_duplicates += 1;
                        }
                    }
                    ExtractOutcome::Skipped(reason) => stats.record_skip(&reason),
                }
            }
            unique
        };

        let before = unique.len();
        let representatives = self.clusterer.reduce(unique);
        stats.near_duplicates = before - representatives.len();

        let records = writer.write_category(&category.name, &representatives)?;
        stats.written = records.len();
        Ok((records, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facesieve_core::{Detection, DetectorError, FaceDetector, RelativeBox};
    use image::{Rgb, RgbImage};
    use std::cell::Cell;
    use std::fs;
    use std::path::PathBuf;

    /// Finds one centred face in any image that is not entirely black.
    struct CentreDetector;

    impl FaceDetector for CentreDetector {
        fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
            if image.pixels().all(|p| p.0 == [0, 0, 0]) {
                return Ok(vec![]);
            }
            Ok(vec![Detection {
                bbox: RelativeBox { xmin: 0.1, ymin: 0.1, width: 0.8, height: 0.8 },
                confidence: 0.9,
            }])
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        acquired: Cell<usize>,
    }

    impl DetectorProvider for CountingProvider {
        fn acquire(&self) -> Result<Box<dyn FaceDetector>, DetectorError> {
            self.acquired.set(self.acquired.get() + 1);
            Ok(Box::new(CentreDetector))
        }
    }

    struct MissingModelProvider;

    impl DetectorProvider for MissingModelProvider {
        fn acquire(&self) -> Result<Box<dyn FaceDetector>, DetectorError> {
            Err(DetectorError::ModelNotFound("det_10g.onnx".into()))
        }
    }

    fn preprocessor<P: DetectorProvider>(provider: P) -> Preprocessor<P> {
        let config = Config {
            target_size: 16,
            ..Config::default()
        };
        Preprocessor::from_config(provider, &config)
    }

    fn halves(left: [u8; 3], right: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(40, 40, |x, _| Rgb(if x < 20 { left } else { right }))
    }

    fn checker() -> RgbImage {
        RgbImage::from_fn(40, 40, |x, y| {
            if (x / 5 + y / 5) % 2 == 0 {
                Rgb([240, 240, 240])
            } else {
                Rgb([10, 10, 10])
            }
        })
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn category_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_duplicate_and_faceless_images_leave_one_file() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let alice = category_dir(data.path(), "alice");

        halves([200, 30, 30], [30, 30, 200]).save(alice.join("a.png")).unwrap();
        fs::copy(alice.join("a.png"), alice.join("b.png")).unwrap();
        RgbImage::new(40, 40).save(alice.join("c.png")).unwrap();

        let report = preprocessor(CountingProvider::default())
            .run(data.path(), out.path())
            .unwrap();

        assert_eq!(files_in(&out.path().join("alice")), vec!["processed_0_a.png"]);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].original, "a.png");

        let stats = &report.categories[0];
        assert_eq!(stats.scanned, 3);
        assert_eq!(stats.hash_duplicates, 1);
        assert_eq!(stats.no_face, 1);
        assert_eq!(stats.written, 1);
    }

    #[test]
    fn test_near_duplicates_collapse_to_first() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let bob = category_dir(data.path(), "bob");

        // Same colour histogram, mirrored layout: distinct hashes, one cluster.
        halves([200, 30, 30], [30, 30, 200]).save(bob.join("1.png")).unwrap();
        halves([30, 30, 200], [200, 30, 30]).save(bob.join("2.png")).unwrap();
        checker().save(bob.join("3.png")).unwrap();

        let report = preprocessor(CountingProvider::default())
            .run(data.path(), out.path())
            .unwrap();

        let stats = &report.categories[0];
        assert_eq!(stats.hash_duplicates, 0);
        assert_eq!(stats.near_duplicates, 1);
        assert_eq!(
            files_in(&out.path().join("bob")),
            vec!["processed_0_1.png", "processed_1_3.png"]
        );
    }

    #[test]
    fn test_isolated_crops_survive_larger_min_samples() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let carol = category_dir(data.path(), "carol");

        // Disjoint colours and distinct bright regions: every crop is noise.
        halves([250, 0, 0], [0, 0, 40]).save(carol.join("1.png")).unwrap();
        halves([40, 0, 40], [0, 250, 0]).save(carol.join("2.png")).unwrap();
        RgbImage::from_fn(40, 40, |_, y| {
            Rgb(if y < 20 { [200, 200, 200] } else { [0, 40, 40] })
        })
        .save(carol.join("3.png"))
        .unwrap();

        let config = Config {
            target_size: 16,
            cluster_min_samples: 2,
            ..Config::default()
        };
        let report = Preprocessor::from_config(CountingProvider::default(), &config)
            .run(data.path(), out.path())
            .unwrap();

        assert_eq!(report.categories[0].near_duplicates, 0);
        assert_eq!(
            files_in(&out.path().join("carol")),
            vec!["processed_0_1.png", "processed_1_2.png", "processed_2_3.png"]
        );
    }

    #[test]
    fn test_detector_acquired_once_per_category() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c"] {
            let dir = category_dir(data.path(), name);
            checker().save(dir.join("x.png")).unwrap();
            checker().save(dir.join("y.png")).unwrap();
        }
        fs::write(data.path().join("notes.txt"), b"ignored").unwrap();

        let provider = CountingProvider::default();
        let pre = preprocessor(provider);
        let report = pre.run(data.path(), out.path()).unwrap();

        assert_eq!(pre.provider.acquired.get(), 3);
        assert_eq!(report.categories.len(), 3);
        let names: Vec<&str> = report.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_hash_filter_resets_between_categories() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["alice", "bob"] {
            let dir = category_dir(data.path(), name);
            checker().save(dir.join("same.png")).unwrap();
        }

        let report = preprocessor(CountingProvider::default())
            .run(data.path(), out.path())
            .unwrap();
        assert_eq!(report.total_written(), 2);
    }

    #[test]
    fn test_corrupt_image_is_skipped() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let dir = category_dir(data.path(), "alice");
        fs::write(dir.join("broken.jpg"), b"not an image").unwrap();
        checker().save(dir.join("good.png")).unwrap();

        let report = preprocessor(CountingProvider::default())
            .run(data.path(), out.path())
            .unwrap();
        assert_eq!(report.categories[0].unreadable, 1);
        assert_eq!(report.total_written(), 1);
    }

    #[test]
    fn test_missing_dataset_root_aborts() {
        let out = tempfile::tempdir().unwrap();
        let output = out.path().join("processed");
        let err = preprocessor(CountingProvider::default())
            .run(&out.path().join("missing"), &output)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ReadDir { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_detector_load_failure_aborts() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        category_dir(data.path(), "alice");
        let err = preprocessor(MissingModelProvider)
            .run(data.path(), out.path())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Detector(_)));
    }
}
