//! Command-line interface for catalog maintenance and mannequin matching.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mannequin::{
    body::OnnxPoseEstimator,
    catalog::{self, Catalog, CatalogGenerator, METADATA_FILE},
    config::{Config, CONFIG_FILE},
    extract::PoseLandmarkExtractor,
    photo::{self, PosePhotos},
    pipeline::{AnalysisPipeline, AnalysisRequest},
    pose::PoseKind,
    selector::MannequinSelector,
    timer::TimerMetadata,
    user::Gender,
};

#[derive(Parser)]
#[command(name = "mannequin")]
#[command(about = "Generate mannequin catalogs and match users to mannequins")]
#[command(version)]
struct Cli {
    /// Configuration file. Defaults apply if it doesn't exist.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the mannequin catalog.
    Generate {
        /// Mannequins per gender.
        #[arg(long)]
        count: Option<usize>,
        /// Only generate this gender.
        #[arg(long)]
        gender: Option<Gender>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        /// JSON body model file (`{gender}` is substituted).
        #[arg(long)]
        model: Option<PathBuf>,
        /// Regenerate even if a catalog already exists.
        #[arg(long)]
        force: bool,
    },
    /// Check whether the catalog is complete.
    Check,
    /// Print catalog statistics.
    Stats,
    /// Remove all generated meshes and metadata.
    Clean {
        /// Confirm the removal.
        #[arg(long)]
        yes: bool,
    },
    /// Select a mannequin from height, weight and gender.
    Select {
        #[command(flatten)]
        user: UserArgs,
    },
    /// Select a mannequin using calibration photos.
    Analyze {
        #[command(flatten)]
        user: UserArgs,
        #[arg(long)]
        front: PathBuf,
        #[arg(long)]
        left: PathBuf,
        #[arg(long)]
        right: PathBuf,
        #[arg(long)]
        back: PathBuf,
        /// Self-timer duration of each photo in seconds, in front,left,right,back order.
        #[arg(long, value_delimiter = ',')]
        timers: Vec<f32>,
        /// Timer consistency label reported by the capture client.
        #[arg(long)]
        consistency: Option<String>,
    },
}

#[derive(clap::Args)]
struct UserArgs {
    /// Height in centimetres.
    #[arg(long)]
    height: f32,
    /// Weight in kilograms.
    #[arg(long)]
    weight: f32,
    /// `male` or `female`.
    #[arg(long)]
    gender: String,
}

impl UserArgs {
    fn request(&self) -> AnalysisRequest {
        AnalysisRequest::new(self.height, self.weight, self.gender.clone())
    }
}

fn main() -> anyhow::Result<()> {
    mannequin::init_logger!();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Generate {
            count,
            gender,
            output_dir,
            seed,
            model,
            force,
        } => {
            let mut catalog_config = config.catalog;
            if let Some(dir) = output_dir {
                catalog_config.output_dir = dir;
            }
            if let Some(count) = count {
                catalog_config.count = count;
            }
            if let Some(seed) = seed {
                catalog_config.seed = seed;
            }
            if model.is_some() {
                catalog_config.model_path = model;
            }

            if catalog_config.output_dir.join(METADATA_FILE).exists() && !force {
                log::info!(
                    "catalog in '{}' already exists, pass --force to regenerate it",
                    catalog_config.output_dir.display()
                );
                return Ok(());
            }

            let genders = match gender {
                Some(gender) => vec![gender],
                None => Gender::ALL.to_vec(),
            };
            let generator = CatalogGenerator::from_config(&catalog_config);
            let catalog = generator.generate_all(&genders, catalog_config.count)?;
            for gender in genders {
                if catalog.entries(gender).len() != catalog_config.count {
                    bail!("failed to generate {gender} mannequins");
                }
            }
            print_json(&catalog.statistics())
        }
        Commands::Check => {
            let status = catalog::check_availability(&config.catalog.output_dir);
            println!("{}", status.message);
            for asset in &status.missing_assets {
                println!("missing: {asset}");
            }
            if !status.available {
                bail!("catalog in '{}' is not usable", config.catalog.output_dir.display());
            }
            Ok(())
        }
        Commands::Stats => {
            let catalog = Catalog::load(&config.catalog.output_dir)?;
            print_json(&catalog.statistics())
        }
        Commands::Clean { yes } => {
            if !yes {
                bail!(
                    "this removes all mannequins in '{}', pass --yes to confirm",
                    config.catalog.output_dir.display()
                );
            }
            let removed = catalog::clean(&config.catalog.output_dir)?;
            println!("removed {removed} files");
            Ok(())
        }
        Commands::Select { user } => {
            let catalog = catalog::ensure_catalog(&config.catalog)?;
            let pipeline = AnalysisPipeline::new(MannequinSelector::new(&catalog));
            print_json(&pipeline.analyze(user.request())?)
        }
        Commands::Analyze {
            user,
            front,
            left,
            right,
            back,
            timers,
            consistency,
        } => {
            let catalog = catalog::ensure_catalog(&config.catalog)?;
            let model_path = config.pose.model_path();
            let estimator =
                OnnxPoseEstimator::load(&model_path, config.pose.min_detection_confidence)?;
            let extractor = PoseLandmarkExtractor::new(estimator);

            let mut photos = PosePhotos::new();
            for (pose, path) in [
                (PoseKind::Front, front),
                (PoseKind::Left, left),
                (PoseKind::Right, right),
                (PoseKind::Back, back),
            ] {
                photos.insert(pose, load_photo(&path)?);
            }

            let mut request = user.request().with_photos(photos);
            if !timers.is_empty() || consistency.is_some() {
                let mut timer = TimerMetadata::from_timers(timers);
                timer.consistency = consistency;
                request = request.with_timer(timer);
            }

            let pipeline = AnalysisPipeline::new(MannequinSelector::new(&catalog))
                .with_extractor(&extractor)
                .with_max_dimension(config.photos.max_dimension);
            print_json(&pipeline.analyze(request)?)
        }
    }
}

fn load_photo(path: &Path) -> anyhow::Result<image::RgbImage> {
    photo::load(path).with_context(|| format!("failed to load photo '{}'", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
