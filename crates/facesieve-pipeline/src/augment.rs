//! Fan-out of processed crops into augmented training images.

use crate::config::Config;
use crate::dataset;
use crate::error::PipelineError;
use facesieve_core::extractor::decode_rgb;
use facesieve_core::AugmentPipeline;
use image::ImageFormat;
use rand::Rng;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct AugmentOptions {
    /// Variants generated per source image.
    pub count: usize,
    pub pipeline: AugmentPipeline,
}

impl AugmentOptions {
    pub fn new(count: usize, pipeline: AugmentPipeline) -> Self {
        Self { count, pipeline }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.augmentations_per_image,
            AugmentPipeline::face_recognition(config.normalize_output),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AugmentReport {
    /// Source images copied unchanged.
    pub originals: usize,
    /// All files written: originals plus variants.
    pub total: usize,
}

/// `<base>_aug_<index><ext>`, where `<ext>` keeps its leading dot.
pub fn variant_name(file_name: &str, index: usize) -> String {
    let path = Path::new(file_name);
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{base}_aug_{index}.{}", ext.to_string_lossy()),
        None => format!("{base}_aug_{index}"),
    }
}

/// Copy every image under `processed_root/<category>/` into
/// `augmented_root/<category>/` and add `options.count` random variants of each.
///
/// Files that do not decode as images are skipped. A variant whose name has
/// no recognised image extension is encoded as PNG.
pub fn augment_tree<R: Rng + ?Sized>(
    processed_root: &Path,
    augmented_root: &Path,
    options: &AugmentOptions,
    rng: &mut R,
) -> Result<AugmentReport, PipelineError> {
    options.pipeline.validate()?;
    dataset::create_dir(augmented_root)?;

    let mut report = AugmentReport::default();
    for category in dataset::list_categories(processed_root)? {
        let dest_dir = augmented_root.join(&category.name);
        dataset::create_dir(&dest_dir)?;
        let before = report;

        for source in dataset::list_files(&category.path)? {
            let image = match decode_rgb(&source) {
                Ok(image) => image,
                Err(e) => {
                    tracing::debug!(path = %source.display(), error = %e, "skipping non-image file");
                    continue;
                }
            };

            let file_name = dataset::file_name(&source);
            let dest = dest_dir.join(&file_name);
            if let Err(e) = std::fs::copy(&source, &dest) {
                tracing::warn!(path = %dest.display(), error = %e, "failed to copy original");
                continue;
            }
            report.originals += 1;
            report.total += 1;

            for index in 0..options.count {
                let variant = options.pipeline.apply(&image, rng);
                let path = dest_dir.join(variant_name(&file_name, index));
                let format = ImageFormat::from_path(&path).unwrap_or(ImageFormat::Png);
                match variant.save_with_format(&path, format) {
                    Ok(()) => report.total += 1,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to write variant")
                    }
                }
            }
        }

        tracing::info!(
            category = %category.name,
            originals = report.originals - before.originals,
            written = report.total - before.total,
            "category augmented"
        );
    }

    tracing::info!(
        originals = report.originals,
        total = report.total,
        "augmentation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facesieve_core::augment::{Step, Transform};
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;

    fn face(shade: u8) -> RgbImage {
        RgbImage::from_fn(24, 24, |x, y| Rgb([shade, (x * 10) as u8, (y * 10) as u8]))
    }

    fn options(count: usize) -> AugmentOptions {
        AugmentOptions::new(count, AugmentPipeline::default())
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_variant_name() {
        assert_eq!(variant_name("processed_0_a.png", 3), "processed_0_a_aug_3.png");
        assert_eq!(variant_name("x.tar.jpg", 0), "x.tar_aug_0.jpg");
        assert_eq!(variant_name("noext", 1), "noext_aug_1");
    }

    #[test]
    fn test_nine_variants_give_ten_files() {
        let processed = tempfile::tempdir().unwrap();
        let augmented = tempfile::tempdir().unwrap();
        fs::create_dir(processed.path().join("alice")).unwrap();
        let source = processed.path().join("alice/processed_0_a.png");
        face(120).save(&source).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        let report = augment_tree(processed.path(), augmented.path(), &options(9), &mut rng).unwrap();

        assert_eq!(report, AugmentReport { originals: 1, total: 10 });
        let files = names(&augmented.path().join("alice"));
        assert_eq!(files.len(), 10);
        assert!(files.contains(&"processed_0_a.png".to_string()));
        for i in 0..9 {
            assert!(files.contains(&format!("processed_0_a_aug_{i}.png")));
        }
    }

    #[test]
    fn test_original_is_copied_byte_for_byte() {
        let processed = tempfile::tempdir().unwrap();
        let augmented = tempfile::tempdir().unwrap();
        fs::create_dir(processed.path().join("bob")).unwrap();
        let source = processed.path().join("bob/processed_0_b.jpg");
        face(60).save(&source).unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        augment_tree(processed.path(), augmented.path(), &options(2), &mut rng).unwrap();

        let copied = fs::read(augmented.path().join("bob/processed_0_b.jpg")).unwrap();
        assert_eq!(copied, fs::read(&source).unwrap());
        let variant = image::open(augmented.path().join("bob/processed_0_b_aug_1.jpg")).unwrap();
        assert_eq!((variant.width(), variant.height()), (24, 24));
    }

    #[test]
    fn test_non_images_are_skipped() {
        let processed = tempfile::tempdir().unwrap();
        let augmented = tempfile::tempdir().unwrap();
        let dir = processed.path().join("alice");
        fs::create_dir(&dir).unwrap();
        face(10).save(dir.join("a.png")).unwrap();
        fs::write(dir.join("notes.txt"), b"not an image").unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let report = augment_tree(processed.path(), augmented.path(), &options(1), &mut rng).unwrap();

        assert_eq!(report, AugmentReport { originals: 1, total: 2 });
        assert!(!augmented.path().join("alice/notes.txt").exists());
    }

    #[test]
    fn test_extensionless_image_gets_png_variants() {
        let processed = tempfile::tempdir().unwrap();
        let augmented = tempfile::tempdir().unwrap();
        let dir = processed.path().join("alice");
        fs::create_dir(&dir).unwrap();
        face(90)
            .save_with_format(dir.join("portrait"), ImageFormat::Png)
            .unwrap();

        let mut rng = StdRng::seed_from_u64(2);
        augment_tree(processed.path(), augmented.path(), &options(1), &mut rng).unwrap();

        let variant = augmented.path().join("alice/portrait_aug_0");
        let bytes = fs::read(&variant).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_counts_span_categories() {
        let processed = tempfile::tempdir().unwrap();
        let augmented = tempfile::tempdir().unwrap();
        for (cat, n) in [("alice", 2), ("bob", 1)] {
            let dir = processed.path().join(cat);
            fs::create_dir(&dir).unwrap();
            for i in 0..n {
                face(i as u8 * 50).save(dir.join(format!("processed_{i}_x.png"))).unwrap();
            }
        }

        let mut rng = StdRng::seed_from_u64(3);
        let report = augment_tree(processed.path(), augmented.path(), &options(4), &mut rng).unwrap();
        assert_eq!(report, AugmentReport { originals: 3, total: 15 });
    }

    #[test]
    fn test_same_seed_same_variants() {
        let processed = tempfile::tempdir().unwrap();
        let dir = processed.path().join("alice");
        fs::create_dir(&dir).unwrap();
        face(200).save(dir.join("a.png")).unwrap();

        let run = |seed: u64| {
            let out = tempfile::tempdir().unwrap();
            let opts = AugmentOptions::new(3, AugmentPipeline::face_recognition(false));
            augment_tree(processed.path(), out.path(), &opts, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            fs::read(out.path().join("alice/a_aug_2.png")).unwrap()
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn test_invalid_pipeline_is_rejected() {
        let processed = tempfile::tempdir().unwrap();
        let augmented = tempfile::tempdir().unwrap();
        let bad = AugmentOptions::new(
            1,
            AugmentPipeline::new(vec![Step::new(Transform::HorizontalFlip, -0.1)]),
        );
        let err = augment_tree(processed.path(), augmented.path(), &bad, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Augment(_)));
    }
}
