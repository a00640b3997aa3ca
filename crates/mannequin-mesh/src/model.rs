//! Linear blend-shape body models.

use std::{fs, path::Path, sync::Arc};

use anyhow::{bail, Context};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;

use crate::mesh::{Face, Mesh};
use crate::procedural::{self, Physique};

/// Number of shape parameters ("betas") a [`BodyModel`] is driven by.
pub const NUM_BETAS: usize = 10;

/// A shape parameter vector.
///
/// Components 0-3 control overall size, height, torso length and upper/lower body proportion.
/// The remaining components are smaller, local variations.
pub type Betas = [f32; NUM_BETAS];

/// A parametric body model in its neutral standing pose.
///
/// The model deforms a template mesh by adding a weighted sum of per-vertex shape directions:
/// `v = template + Σ betas[i] * shape_dirs[i]`. The face list never changes, so every body
/// evaluated from one model has the same topology. Coordinates are Z-up.
#[derive(Debug, Clone)]
pub struct BodyModel {
    template: Vec<Point3<f32>>,
    shape_dirs: Vec<[Vector3<f32>; NUM_BETAS]>,
    faces: Arc<[Face]>,
}

/// On-disk representation of a [`BodyModel`].
#[derive(Deserialize)]
struct ModelFile {
    template: Vec<[f32; 3]>,
    /// One entry per template vertex, each holding `NUM_BETAS` displacement vectors.
    shape_dirs: Vec<Vec<[f32; 3]>>,
    faces: Vec<Face>,
}

impl BodyModel {
    /// Creates a body model, checking that all parts are consistent with each other.
    pub fn new(
        template: Vec<Point3<f32>>,
        shape_dirs: Vec<[Vector3<f32>; NUM_BETAS]>,
        faces: Arc<[Face]>,
    ) -> anyhow::Result<Self> {
        if template.is_empty() {
            bail!("body model template has no vertices");
        }
        if shape_dirs.len() != template.len() {
            bail!(
                "body model has {} shape direction entries for {} template vertices",
                shape_dirs.len(),
                template.len(),
            );
        }
        if let Some(face) = faces
            .iter()
            .find(|f| f.iter().any(|&i| i as usize >= template.len()))
        {
            bail!("body model face {face:?} refers to a vertex out of range");
        }

        Ok(Self {
            template,
            shape_dirs,
            faces,
        })
    }

    /// Builds the procedural humanoid model for the given [`Physique`].
    pub fn procedural(physique: &Physique) -> Self {
        let (template, faces) = procedural::build(&physique.base);
        let mut shape_dirs = vec![[Vector3::zeros(); NUM_BETAS]; template.len()];

        // Every vertex coordinate is an affine function of the proportions, so the difference to
        // the template body after adding one delta is exactly that component's shape direction.
        for (i, delta) in physique.deltas.iter().enumerate() {
            let mut props = physique.base;
            props.add_scaled(delta, 1.0);
            let (displaced, _) = procedural::build(&props);
            for ((dirs, base), moved) in shape_dirs.iter_mut().zip(&template).zip(&displaced) {
                dirs[i] = moved - base;
            }
        }

        Self {
            template,
            shape_dirs,
            faces: faces.into(),
        }
    }

    /// Loads a body model from a JSON model file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read body model '{}'", path.display()))?;
        let file: ModelFile = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse body model '{}'", path.display()))?;

        let template = file
            .template
            .iter()
            .map(|&[x, y, z]| Point3::new(x, y, z))
            .collect();
        let shape_dirs = file
            .shape_dirs
            .iter()
            .enumerate()
            .map(|(vertex, dirs)| {
                if dirs.len() != NUM_BETAS {
                    bail!(
                        "vertex {vertex} has {} shape directions, expected {NUM_BETAS}",
                        dirs.len()
                    );
                }
                let mut out = [Vector3::zeros(); NUM_BETAS];
                for (o, &[x, y, z]) in out.iter_mut().zip(dirs) {
                    *o = Vector3::new(x, y, z);
                }
                Ok(out)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let model = Self::new(template, shape_dirs, file.faces.into())?;
        log::debug!(
            "loaded body model '{}' ({} vertices, {} faces)",
            path.display(),
            model.vertex_count(),
            model.faces.len(),
        );
        Ok(model)
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.template.len()
    }

    /// Returns the fixed face list shared by all evaluated meshes.
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Evaluates the model for the given shape parameters.
    pub fn evaluate(&self, betas: &Betas) -> Mesh {
        let vertices = self
            .template
            .iter()
            .zip(&self.shape_dirs)
            .map(|(base, dirs)| {
                let mut v = *base;
                for (beta, dir) in betas.iter().zip(dirs) {
                    v += dir * *beta;
                }
                v
            })
            .collect();

        Mesh::new(vertices, self.faces.clone())
    }
}
