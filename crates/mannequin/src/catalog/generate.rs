//! Offline catalog generation.

use std::{
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use mannequin_mesh::{write_ply, Betas, BodyModel, Physique};

use super::{Catalog, CatalogEntry, SamplingSchedule, METADATA_FILE};
use crate::config::CatalogConfig;
use crate::num::round_to;
use crate::user::{bmi, Gender};

/// Where the generator gets its body models from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// The built-in procedural humanoid of each gender.
    Procedural,
    /// A JSON body model file. A `{gender}` placeholder in the path is replaced with `male` or
    /// `female`, which allows separate models per gender.
    File(PathBuf),
}

impl ModelSource {
    fn load(&self, gender: Gender) -> anyhow::Result<BodyModel> {
        match self {
            Self::Procedural => Ok(BodyModel::procedural(&match gender {
                Gender::Male => Physique::male(),
                Gender::Female => Physique::female(),
            })),
            Self::File(template) => {
                let path = template
                    .to_string_lossy()
                    .replace("{gender}", gender.as_str());
                BodyModel::load(&path)
                    .with_context(|| format!("failed to load {gender} body model"))
            }
        }
    }
}

/// Generates mannequin meshes and their metadata.
#[derive(Debug, Clone)]
pub struct CatalogGenerator {
    output_dir: PathBuf,
    schedule: SamplingSchedule,
    scale_factor: f32,
    model_source: ModelSource,
}

impl CatalogGenerator {
    /// Creates a generator writing into `output_dir`, using the procedural body models and the
    /// default sampling schedule.
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
            schedule: SamplingSchedule::default(),
            scale_factor: 1.0,
            model_source: ModelSource::Procedural,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(&config.output_dir)
            .with_schedule(SamplingSchedule::with_seed(config.seed))
            .with_scale_factor(config.scale_factor)
            .with_model_source(match &config.model_path {
                Some(path) => ModelSource::File(path.clone()),
                None => ModelSource::Procedural,
            })
    }

    pub fn with_schedule(self, schedule: SamplingSchedule) -> Self {
        Self { schedule, ..self }
    }

    /// Sets the factor converting body model units into metres.
    pub fn with_scale_factor(self, scale_factor: f32) -> Self {
        Self {
            scale_factor,
            ..self
        }
    }

    pub fn with_model_source(self, model_source: ModelSource) -> Self {
        Self {
            model_source,
            ..self
        }
    }

    #[inline]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Generates `count` mannequins of `gender` and writes their mesh assets.
    ///
    /// This does not touch the metadata file. Any failure aborts the whole batch. Assets are
    /// staged in a temporary directory inside the output directory and only moved into place once
    /// every mannequin of the batch was generated, so a failed batch leaves the previous assets
    /// untouched.
    pub fn generate(&self, gender: Gender, count: usize) -> anyhow::Result<Vec<CatalogEntry>> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "failed to create output directory '{}'",
                self.output_dir.display()
            )
        })?;
        let model = self.model_source.load(gender)?;
        log::info!("generating {count} {gender} mannequins");

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.output_dir)
            .context("failed to create staging directory")?;
        let entries = self
            .schedule
            .sample(count)
            .iter()
            .enumerate()
            .map(|(id, betas)| self.generate_one(&model, staging.path(), gender, id as u32, betas))
            .collect::<anyhow::Result<Vec<_>>>()?;

        for entry in &entries {
            let path = self.output_dir.join(&entry.filename);
            fs::rename(staging.path().join(&entry.filename), &path).with_context(|| {
                format!("failed to move mesh into place at '{}'", path.display())
            })?;
        }
        Ok(entries)
    }

    fn generate_one(
        &self,
        model: &BodyModel,
        dir: &Path,
        gender: Gender,
        id: u32,
        betas: &Betas,
    ) -> anyhow::Result<CatalogEntry> {
        let mut mesh = model.evaluate(betas);
        mesh.scale(self.scale_factor);
        mesh.place_on_ground();

        let height_m = mesh.vertical_extent();
        if !(height_m.is_finite() && height_m > 0.0) {
            bail!("{gender} mannequin {id} has invalid height {height_m} m");
        }
        let height_cm = height_m * 100.0;
        let weight_kg = (70.0 + 15.0 * betas[0]).max(40.0);
        let bmi = bmi(height_cm, weight_kg);

        let filename = CatalogEntry::asset_file_name(gender, id);
        mesh.scale(100.0);
        let path = dir.join(&filename);
        let file = fs::File::create(&path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;
        write_ply(&mesh, BufWriter::new(file))
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        log::info!("saved {filename}: H={height_cm:.1}cm, W={weight_kg:.1}kg, BMI={bmi:.1}");

        Ok(CatalogEntry {
            id,
            filename,
            gender,
            betas: betas.to_vec(),
            height_cm: round_to(height_cm, 1),
            weight_kg: round_to(weight_kg, 1),
            bmi: round_to(bmi, 1),
            primary_beta: round_to(betas[0], 2),
        })
    }

    /// Generates `count` mannequins of each of `genders` and updates the metadata file.
    ///
    /// Existing metadata is loaded first. After each gender's batch succeeds, its entries replace
    /// the previous ones and the metadata file is rewritten. A gender that fails is logged and
    /// skipped, keeping whatever entries it had before.
    pub fn generate_all(&self, genders: &[Gender], count: usize) -> crate::Result<Catalog> {
        fs::create_dir_all(&self.output_dir)?;
        let mut catalog = Catalog::load(&self.output_dir)?;

        for &gender in genders {
            match self.generate(gender, count) {
                Ok(entries) => {
                    catalog.set_entries(gender, entries);
                    catalog.save(&self.output_dir)?;
                }
                Err(e) => log::error!("error generating {gender} mannequins: {e:#}"),
            }
        }

        log::info!(
            "catalog in '{}' has {} mannequins",
            self.output_dir.display(),
            catalog.len()
        );
        Ok(catalog)
    }
}

/// Loads the catalog described by `config`, generating it first if it has no metadata yet and
/// `auto_generate` is enabled.
pub fn ensure_catalog(config: &CatalogConfig) -> crate::Result<Catalog> {
    if !config.output_dir.join(METADATA_FILE).exists() && config.auto_generate {
        log::info!(
            "no mannequin metadata in '{}', generating catalog",
            config.output_dir.display()
        );
        return CatalogGenerator::from_config(config).generate_all(&Gender::ALL, config.count);
    }
    Catalog::load(&config.output_dir)
}
