//! The precomputed mannequin catalog.
//!
//! A catalog lives in a single directory: one binary PLY mesh per mannequin plus a
//! [`METADATA_FILE`] listing all mannequins per gender. It is written once by the
//! [`CatalogGenerator`] and read-only afterwards.

mod generate;
mod sampling;

pub use generate::{ensure_catalog, CatalogGenerator, ModelSource};
pub use sampling::{SamplingSchedule, SecondaryVariation};

use std::{
    collections::BTreeMap,
    fs,
    io::{BufWriter, ErrorKind, Write},
    path::Path,
};

use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::user::Gender;
use crate::Result;

/// Name of the catalog metadata file inside the catalog directory.
pub const METADATA_FILE: &str = "mannequin_metadata.json";

/// Prefix of all mesh asset file names.
const ASSET_PREFIX: &str = "mannequin_";

/// One precomputed mannequin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Index of the mannequin, unique per gender.
    pub id: u32,
    /// File name of the mesh asset, relative to the catalog directory.
    pub filename: String,
    pub gender: Gender,
    pub betas: Vec<f32>,
    pub height_cm: f32,
    pub weight_kg: f32,
    pub bmi: f32,
    pub primary_beta: f32,
}

impl CatalogEntry {
    /// Returns shape component `index`, treating components missing from the metadata as 0.
    pub fn beta(&self, index: usize) -> f32 {
        self.betas.get(index).copied().unwrap_or(0.0)
    }

    /// Returns the file name of the mesh asset for the mannequin `id` of `gender`.
    pub fn asset_file_name(gender: Gender, id: u32) -> String {
        format!("{ASSET_PREFIX}{gender}_{id:02}.ply")
    }
}

/// All mannequins, grouped by gender.
///
/// Serializes to the metadata file format: a JSON object mapping each gender to its list of
/// entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entries: BTreeMap<Gender, Vec<CatalogEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the catalog stored in `dir`.
    ///
    /// If the directory has no metadata file, a warning is logged and an empty catalog is returned.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(METADATA_FILE);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("metadata file '{}' not found", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let catalog: Self = serde_json::from_str(&data)?;
        log::debug!(
            "loaded {} mannequins from '{}'",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Writes the metadata file into `dir`, atomically replacing any previous one.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(&mut tmp);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(METADATA_FILE))
            .map_err(|e| e.error)?;
        Ok(())
    }

    /// Returns the mannequins of `gender`, in catalog order.
    pub fn entries(&self, gender: Gender) -> &[CatalogEntry] {
        self.entries.get(&gender).map_or(&[], Vec::as_slice)
    }

    /// Replaces all mannequins of `gender`.
    pub fn set_entries(&mut self, gender: Gender, entries: Vec<CatalogEntry>) {
        self.entries.insert(gender, entries);
    }

    pub fn find(&self, gender: Gender, id: u32) -> Option<&CatalogEntry> {
        self.entries(gender).iter().find(|e| e.id == id)
    }

    /// Returns an iterator over all entries of all genders.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> + '_ {
        self.entries.values().flatten()
    }

    /// Total number of mannequins.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn statistics(&self) -> CatalogStatistics {
        let per_gender = Gender::ALL
            .into_iter()
            .map(|gender| {
                let entries = self.entries(gender);
                let stats = GenderStatistics {
                    count: entries.len(),
                    height_cm: ValueRange::of(entries.iter().map(|e| e.height_cm)),
                    weight_kg: ValueRange::of(entries.iter().map(|e| e.weight_kg)),
                    bmi: ValueRange::of(entries.iter().map(|e| e.bmi)),
                };
                (gender, stats)
            })
            .collect();
        CatalogStatistics {
            total: self.len(),
            per_gender,
        }
    }
}

/// Smallest and largest value of some catalog field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    /// Computes the range of `values`, or `0..0` if there are none.
    fn of(values: impl Iterator<Item = f32>) -> Self {
        match values.minmax_by(|a, b| a.total_cmp(b)) {
            MinMaxResult::NoElements => Self::default(),
            MinMaxResult::OneElement(v) => Self { min: v, max: v },
            MinMaxResult::MinMax(min, max) => Self { min, max },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenderStatistics {
    pub count: usize,
    pub height_cm: ValueRange,
    pub weight_kg: ValueRange,
    pub bmi: ValueRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogStatistics {
    pub total: usize,
    pub per_gender: BTreeMap<Gender, GenderStatistics>,
}

/// Result of [`check_availability`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogAvailability {
    pub available: bool,
    pub message: String,
    pub counts: BTreeMap<Gender, usize>,
    /// Mesh assets listed in the metadata that do not exist on disk.
    pub missing_assets: Vec<String>,
}

/// Checks whether the catalog in `dir` can serve requests.
///
/// The catalog is unavailable if its metadata is missing, unreadable or empty, or if any listed
/// mesh asset is missing.
pub fn check_availability<P: AsRef<Path>>(dir: P) -> CatalogAvailability {
    let dir = dir.as_ref();
    let unavailable = |message: String| CatalogAvailability {
        available: false,
        message,
        counts: BTreeMap::new(),
        missing_assets: Vec::new(),
    };

    if !dir.join(METADATA_FILE).is_file() {
        return unavailable("metadata file not found".into());
    }
    let catalog = match Catalog::load(dir) {
        Ok(catalog) => catalog,
        Err(e) => return unavailable(format!("error reading metadata: {e}")),
    };
    let counts: BTreeMap<_, _> = Gender::ALL
        .into_iter()
        .map(|g| (g, catalog.entries(g).len()))
        .collect();
    if catalog.is_empty() {
        return CatalogAvailability {
            counts,
            ..unavailable("no mannequins generated".into())
        };
    }

    let missing_assets: Vec<String> = catalog
        .iter()
        .filter(|e| !dir.join(&e.filename).is_file())
        .map(|e| e.filename.clone())
        .collect();
    let (available, message) = if missing_assets.is_empty() {
        let summary = counts
            .iter()
            .map(|(g, n)| format!("{n} {g}"))
            .join(", ");
        (true, format!("{} mannequins available ({summary})", catalog.len()))
    } else {
        (
            false,
            format!("{} mannequin files missing", missing_assets.len()),
        )
    };
    CatalogAvailability {
        available,
        message,
        counts,
        missing_assets,
    }
}

/// Removes all mesh assets and the metadata file from `dir`.
///
/// Returns the number of removed files. A missing directory counts as already clean.
pub fn clean<P: AsRef<Path>>(dir: P) -> Result<usize> {
    let dir = dir.as_ref();
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in read_dir {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_asset = name.starts_with(ASSET_PREFIX) && name.ends_with(".ply");
        if is_asset || name == METADATA_FILE {
            fs::remove_file(entry.path())?;
            log::debug!("removed '{name}'");
            removed += 1;
        }
    }
    log::info!("removed {removed} catalog files from '{}'", dir.display());
    Ok(removed)
}
