use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facesieve_core::ScrfdProvider;
use facesieve_pipeline::{
    augment_tree, summarize_tree, write_manifest, AugmentOptions, Config, PreprocessReport,
    Preprocessor,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facesieve", about = "Face dataset preparation: extract, deduplicate, augment")]
struct Cli {
    /// TOML file overriding FACESIEVE_* environment settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the largest face per image and drop duplicates
    Preprocess {
        /// Dataset root containing one directory per category
        #[arg(short, long)]
        input: PathBuf,
        /// Destination for processed crops
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        detect: DetectArgs,
        /// Write a JSON manifest of processed files
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Copy processed crops and add random variants of each
    Augment {
        /// Processed tree to read
        #[arg(short, long)]
        input: PathBuf,
        /// Destination for originals and variants
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        augment: AugmentArgs,
    },
    /// Preprocess, then augment, then print a summary
    Run {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long)]
        processed: PathBuf,
        #[arg(long)]
        augmented: PathBuf,
        #[command(flatten)]
        detect: DetectArgs,
        #[command(flatten)]
        augment: AugmentArgs,
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

#[derive(Args)]
struct DetectArgs {
    /// Side length of the square face crops
    #[arg(long)]
    target_size: Option<u32>,
    /// SCRFD ONNX model
    #[arg(long)]
    model: Option<PathBuf>,
}

#[derive(Args)]
struct AugmentArgs {
    /// Variants per image
    #[arg(long)]
    count: Option<usize>,
    /// RNG seed for reproducible variants
    #[arg(long)]
    seed: Option<u64>,
    /// Skip the final ImageNet normalization step
    #[arg(long)]
    no_normalize: bool,
}

impl DetectArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(size) = self.target_size {
            config.target_size = size;
        }
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
    }
}

impl AugmentArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(count) = self.count {
            config.augmentations_per_image = count;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.no_normalize {
            config.normalize_output = false;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Preprocess {
            input,
            output,
            detect,
            manifest,
        } => {
            detect.apply(&mut config);
            config.validate()?;
            let report = preprocess(&config, &input, &output, manifest.as_deref())?;
            println!("Processed {} unique face images", report.total_written());
        }
        Commands::Augment {
            input,
            output,
            augment: augment_args,
        } => {
            augment_args.apply(&mut config);
            config.validate()?;
            let total = augment(&config, &input, &output)?;
            println!("Total images after augmentation: {total}");
        }
        Commands::Run {
            input,
            processed,
            augmented,
            detect,
            augment: augment_args,
            manifest,
        } => {
            detect.apply(&mut config);
            augment_args.apply(&mut config);
            config.validate()?;

            let report = preprocess(&config, &input, &processed, manifest.as_deref())?;
            let total = augment(&config, &processed, &augmented)?;

            println!("Processed {} unique face images", report.total_written());
            println!("Total images after augmentation: {total}");
            println!();
            println!("Final dataset summary:");
            println!("{}", summarize_tree(&augmented)?);
        }
    }

    Ok(())
}

fn preprocess(
    config: &Config,
    input: &Path,
    output: &Path,
    manifest: Option<&Path>,
) -> Result<PreprocessReport> {
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        model = %config.model_path.display(),
        "preprocessing dataset"
    );
    let provider = ScrfdProvider::new(config.model_path.clone())
        .with_thresholds(config.min_detection_confidence, config.nms_threshold);
    let report = Preprocessor::from_config(provider, config)
        .run(input, output)
        .with_context(|| format!("preprocessing {}", input.display()))?;

    if let Some(path) = manifest {
        write_manifest(path, &report.records)?;
    }
    Ok(report)
}

fn augment(config: &Config, input: &Path, output: &Path) -> Result<usize> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let options = AugmentOptions::from_config(config);
    let report = augment_tree(input, output, &options, &mut rng)
        .with_context(|| format!("augmenting {}", input.display()))?;
    Ok(report.total)
}
