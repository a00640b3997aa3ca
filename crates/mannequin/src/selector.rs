//! Nearest-match mannequin selection.

use nalgebra::Vector3;

use crate::analysis::BodyMeasurements;
use crate::catalog::{Catalog, CatalogEntry};
use crate::num::clamp;
use crate::user::UserMeasurements;
use crate::{Error, Result};

/// Photo measurements with a confidence at or below this are ignored for the distance.
const MIN_PHOTO_CONFIDENCE: f32 = 0.3;

/// The mannequin picked for a user.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    pub entry: CatalogEntry,
    /// How close the match is, in `[0, 100]`.
    pub similarity_score: f32,
    /// Photo measurement confidence in percent, or 0 without photo measurements.
    pub analysis_confidence: f32,
    /// Whether photo measurements were passed to the selector.
    pub photo_enhanced: bool,
    /// Blended distance of the chosen entry.
    pub distance: f32,
    /// Set once timer effectiveness has been applied to the score.
    pub timer_effectiveness: Option<f32>,
}

impl SelectionResult {
    #[cfg(test)]
    pub(crate) fn for_test(similarity_score: f32) -> Self {
        Self {
            entry: CatalogEntry {
                id: 0,
                filename: "mannequin_male_00.ply".into(),
                gender: crate::user::Gender::Male,
                betas: vec![0.0; 10],
                height_cm: 175.0,
                weight_kg: 70.0,
                bmi: 22.9,
                primary_beta: 0.0,
            },
            similarity_score,
            analysis_confidence: 0.0,
            photo_enhanced: false,
            distance: 0.0,
            timer_effectiveness: None,
        }
    }
}

/// Picks the catalog entry closest to a user.
///
/// The selector only borrows the catalog, so one catalog can serve any number of concurrent
/// requests.
#[derive(Debug, Clone, Copy)]
pub struct MannequinSelector<'a> {
    catalog: &'a Catalog,
}

impl<'a> MannequinSelector<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    #[inline]
    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Selects the best mannequin for `user`, optionally refined by photo `measurements`.
    ///
    /// Returns [`Error::CatalogMissing`] if the catalog has no entries of the user's gender. Among
    /// equally close entries, the first one in catalog order wins.
    pub fn select(
        &self,
        user: &UserMeasurements,
        measurements: Option<&BodyMeasurements>,
    ) -> Result<SelectionResult> {
        let gender = user.gender();
        let mut entries = self.catalog.entries(gender).iter();
        let first = entries
            .next()
            .ok_or(Error::CatalogMissing { gender })?;

        let distance = |e: &CatalogEntry| match measurements {
            Some(m) => blended_distance(user, m, e),
            None => base_distance(user, e),
        };
        let (entry, distance) = entries.fold((first, distance(first)), |best, e| {
            let d = distance(e);
            if d < best.1 {
                (e, d)
            } else {
                best
            }
        });

        let mut similarity_score = clamp(100.0 - distance * 10.0, 0.0, 100.0);
        let mut analysis_confidence = 0.0;
        if let Some(m) = measurements {
            similarity_score *= 0.7 + 0.3 * m.confidence_score;
            analysis_confidence = m.confidence_score * 100.0;
        }
        let similarity_score = clamp(similarity_score, 0.0, 100.0);

        if measurements.is_some() {
            log::info!(
                "enhanced selection: {} (similarity: {similarity_score:.1}%, confidence: {analysis_confidence:.1}%)",
                entry.filename
            );
        } else {
            log::info!(
                "selected mannequin {} (similarity: {similarity_score:.1}%)",
                entry.filename
            );
        }

        Ok(SelectionResult {
            entry: entry.clone(),
            similarity_score,
            analysis_confidence,
            photo_enhanced: measurements.is_some(),
            distance,
            timer_effectiveness: None,
        })
    }
}

/// Distance between the user's height, weight and BMI and those of `entry`.
///
/// Differences are normalized to 10 cm, 5 kg and 2 BMI units and weighted 1.5, 1.0 and 2.0.
pub fn base_distance(user: &UserMeasurements, entry: &CatalogEntry) -> f32 {
    Vector3::new(
        1.5 * (entry.height_cm - user.height_cm()) / 10.0,
        (entry.weight_kg - user.weight_kg()) / 5.0,
        2.0 * (entry.bmi - user.bmi()) / 2.0,
    )
    .norm()
}

/// Shape parameters implied by photo measurements (components 0 to 2).
pub fn inferred_betas(m: &BodyMeasurements) -> Vector3<f32> {
    Vector3::new(
        (m.shoulder_width_ratio - 0.25) * 4.0,
        (m.torso_leg_ratio - 1.0) * 2.0,
        (0.8 - m.waist_hip_ratio) * 3.0,
    )
}

/// Weighted distance between the shape parameters implied by `m` and those of `entry`.
pub fn shape_distance(m: &BodyMeasurements, entry: &CatalogEntry) -> f32 {
    let actual = Vector3::new(entry.beta(0), entry.beta(1), entry.beta(2));
    (inferred_betas(m) - actual)
        .component_mul(&Vector3::new(2.0, 1.0, 1.5))
        .norm()
}

/// Blends [`base_distance`] and [`shape_distance`] by the measurement confidence.
///
/// The shape distance contributes at most half of the result, and nothing at all if the
/// confidence is too low.
pub fn blended_distance(
    user: &UserMeasurements,
    m: &BodyMeasurements,
    entry: &CatalogEntry,
) -> f32 {
    let base = base_distance(user, entry);
    let confidence = m.confidence_score;
    if confidence > MIN_PHOTO_CONFIDENCE {
        blend(base, shape_distance(m, entry), confidence)
    } else {
        base
    }
}

fn blend(base: f32, shape: f32, confidence: f32) -> f32 {
    base * (1.0 - 0.5 * confidence) + shape * (0.5 * confidence)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::user::Gender;

    fn entry(gender: Gender, id: u32, height_cm: f32, weight_kg: f32, bmi: f32) -> CatalogEntry {
        CatalogEntry {
            id,
            filename: CatalogEntry::asset_file_name(gender, id),
            gender,
            betas: vec![0.0; 10],
            height_cm,
            weight_kg,
            bmi,
            primary_beta: 0.0,
        }
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.set_entries(
            Gender::Male,
            vec![
                entry(Gender::Male, 0, 160.0, 50.0, 19.5),
                entry(Gender::Male, 1, 170.0, 70.0, 24.2),
                entry(Gender::Male, 2, 185.0, 95.0, 27.8),
            ],
        );
        catalog.set_entries(
            Gender::Female,
            vec![
                entry(Gender::Female, 0, 158.0, 52.0, 20.8),
                entry(Gender::Female, 1, 168.0, 64.0, 22.7),
            ],
        );
        catalog
    }

    fn user(h: f32, w: f32, g: Gender) -> UserMeasurements {
        UserMeasurements::new(h, w, g).unwrap()
    }

    #[test]
    fn exact_match() {
        let catalog = catalog();
        let result = MannequinSelector::new(&catalog)
            .select(&user(170.0, 70.0, Gender::Male), None)
            .unwrap();
        assert_eq!(result.entry.id, 1);
        assert!(result.distance < 0.05, "{}", result.distance);
        assert!(result.similarity_score > 99.5);
        assert!(!result.photo_enhanced);
        assert_eq!(result.analysis_confidence, 0.0);
        assert_eq!(result.timer_effectiveness, None);
    }

    #[test]
    fn base_distance_weights() {
        let u = user(170.0, 70.0, Gender::Male);
        let e = entry(Gender::Male, 0, 180.0, 70.0, u.bmi());
        assert_relative_eq!(base_distance(&u, &e), 1.5, epsilon = 1e-5);
        let e = entry(Gender::Male, 0, 170.0, 75.0, u.bmi());
        assert_relative_eq!(base_distance(&u, &e), 1.0, epsilon = 1e-5);
        let e = entry(Gender::Male, 0, 170.0, 70.0, u.bmi() + 2.0);
        assert_relative_eq!(base_distance(&u, &e), 2.0, epsilon = 1e-5);
    }

    #[test]
    fn shape_distance_weights() {
        let mut m = BodyMeasurements::default();
        let mut e = entry(Gender::Male, 0, 170.0, 70.0, 24.2);
        assert_relative_eq!(inferred_betas(&m), Vector3::zeros());
        assert_relative_eq!(shape_distance(&m, &e), 0.0);

        m.shoulder_width_ratio = 0.5;
        assert_relative_eq!(shape_distance(&m, &e), 2.0);
        m.shoulder_width_ratio = 0.25;
        m.waist_hip_ratio = 0.6;
        assert_relative_eq!(shape_distance(&m, &e), 0.9, epsilon = 1e-5);

        // components absent from the metadata count as 0
        e.betas = vec![0.3];
        m.waist_hip_ratio = 0.8;
        m.torso_leg_ratio = 1.15;
        assert_relative_eq!(shape_distance(&m, &e), (0.36f32 + 0.09).sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn low_confidence_ignores_shape() {
        let u = user(175.0, 80.0, Gender::Male);
        let e = entry(Gender::Male, 0, 170.0, 70.0, 24.2);
        let m = BodyMeasurements {
            shoulder_width_ratio: 0.6,
            confidence_score: 0.3,
            ..BodyMeasurements::default()
        };
        assert_eq!(blended_distance(&u, &m, &e), base_distance(&u, &e));
    }

    #[test]
    fn confidence_monotonicity() {
        let u = user(175.0, 80.0, Gender::Male);
        let e = entry(Gender::Male, 0, 170.0, 70.0, 24.2);
        let base = base_distance(&u, &e);
        for shoulder in [0.1, 0.6, 1.5] {
            let mut m = BodyMeasurements {
                shoulder_width_ratio: shoulder,
                ..BodyMeasurements::default()
            };
            let shape = shape_distance(&m, &e);
            assert!(shape > 0.0);

            let mut prev = base;
            for step in 0..=70 {
                m.confidence_score = 0.3 + step as f32 * 0.01;
                let d = blended_distance(&u, &m, &e);
                // moves from `base` toward `shape` without overshooting the midpoint
                assert!((d - prev) * (shape - base) >= -1e-5, "{d} {prev}");
                assert!((d - base).abs() <= (shape - base).abs() * 0.5 + 1e-5);
                prev = d;
            }
            assert_relative_eq!(prev, (base + shape) / 2.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn photo_enhanced_similarity() {
        let catalog = catalog();
        let m = BodyMeasurements {
            confidence_score: 0.5,
            ..BodyMeasurements::default()
        };
        let result = MannequinSelector::new(&catalog)
            .select(&user(170.0, 70.0, Gender::Male), Some(&m))
            .unwrap();
        assert_eq!(result.entry.id, 1);
        assert!(result.photo_enhanced);
        assert_relative_eq!(result.analysis_confidence, 50.0);
        let expected = (100.0 - 10.0 * result.distance) * 0.85;
        assert_relative_eq!(result.similarity_score, expected, epsilon = 1e-3);

        // scaled even when the confidence is too low to affect the distance
        let low = BodyMeasurements::default();
        let result = MannequinSelector::new(&catalog)
            .select(&user(170.0, 70.0, Gender::Male), Some(&low))
            .unwrap();
        assert!(result.photo_enhanced);
        assert_relative_eq!(result.analysis_confidence, 10.0, epsilon = 1e-4);
        assert!(result.similarity_score < 74.0);
    }

    #[test]
    fn ties_keep_first_entry() {
        let mut catalog = Catalog::new();
        catalog.set_entries(
            Gender::Female,
            vec![
                entry(Gender::Female, 4, 165.0, 60.0, 22.0),
                entry(Gender::Female, 2, 165.0, 60.0, 22.0),
            ],
        );
        let selector = MannequinSelector::new(&catalog);
        for _ in 0..3 {
            let result = selector.select(&user(160.0, 55.0, Gender::Female), None).unwrap();
            assert_eq!(result.entry.id, 4);
        }
    }

    #[test]
    fn missing_gender() {
        let mut catalog = catalog();
        catalog.set_entries(Gender::Female, Vec::new());
        let err = MannequinSelector::new(&catalog)
            .select(&user(160.0, 55.0, Gender::Female), None)
            .unwrap_err();
        assert!(matches!(err, Error::CatalogMissing { gender: Gender::Female }));
        let err = MannequinSelector::new(&Catalog::new())
            .select(&user(180.0, 80.0, Gender::Male), None)
            .unwrap_err();
        assert!(matches!(err, Error::CatalogMissing { gender: Gender::Male }));
    }

    #[test]
    fn results_are_in_range() {
        let catalog = catalog();
        let selector = MannequinSelector::new(&catalog);
        let mut rng = fastrand::Rng::with_seed(99);
        for _ in 0..500 {
            let gender = if rng.bool() { Gender::Male } else { Gender::Female };
            let u = user(120.0 + rng.f32() * 100.0, 30.0 + rng.f32() * 170.0, gender);
            let m = BodyMeasurements {
                shoulder_width_ratio: rng.f32() * 2.0,
                waist_hip_ratio: rng.f32() * 3.0,
                torso_leg_ratio: rng.f32() * 3.0,
                confidence_score: rng.f32(),
                ..BodyMeasurements::default()
            };
            let measurements = rng.bool().then_some(&m);
            let result = selector.select(&u, measurements).unwrap();
            assert_eq!(result.entry.gender, gender);
            assert!((0.0..=100.0).contains(&result.similarity_score));
            assert!((0.0..=100.0).contains(&result.analysis_confidence));
        }
    }
}
