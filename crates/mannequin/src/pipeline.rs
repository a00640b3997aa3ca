//! End-to-end processing of a single analysis request.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::{self, BodyMeasurements};
use crate::extract::PoseLandmarkExtractor;
use crate::num::round_to;
use crate::photo::{self, PosePhotos, DEFAULT_MAX_DIMENSION};
use crate::pose::PoseKind;
use crate::selector::{MannequinSelector, SelectionResult};
use crate::timer::{TimerAnalytics, TimerAware, TimerMetadata, DEFAULT_TIMER};
use crate::user::{Gender, UserMeasurements};
use crate::{Error, Result};

/// URL prefix under which mesh assets are served.
pub const ASSET_URL_PREFIX: &str = "/static/mannequins";

/// Unvalidated input of one analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub height_cm: f32,
    pub weight_kg: f32,
    pub gender: String,
    /// Either empty, or one photo for each [`PoseKind`].
    pub photos: PosePhotos,
    pub timer: Option<TimerMetadata>,
}

impl AnalysisRequest {
    /// Creates a request without photos.
    pub fn new(height_cm: f32, weight_kg: f32, gender: impl Into<String>) -> Self {
        Self {
            height_cm,
            weight_kg,
            gender: gender.into(),
            photos: PosePhotos::new(),
            timer: None,
        }
    }

    pub fn with_photos(self, photos: PosePhotos) -> Self {
        Self { photos, ..self }
    }

    pub fn with_timer(self, timer: TimerMetadata) -> Self {
        Self {
            timer: Some(timer),
            ..self
        }
    }

    fn validate(&self) -> Result<UserMeasurements> {
        let gender: Gender = self.gender.parse()?;
        let user = UserMeasurements::new(self.height_cm, self.weight_kg, gender)?;
        if !self.photos.is_empty() {
            let missing: Vec<&str> = PoseKind::ALL
                .into_iter()
                .filter(|pose| !self.photos.contains_key(pose))
                .map(|pose| pose.as_str())
                .collect();
            if !missing.is_empty() {
                return Err(Error::validation(format!(
                    "missing photos for poses: {}",
                    missing.join(", ")
                )));
            }
        }
        Ok(user)
    }
}

/// Kind of analysis that produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Basic,
    Enhanced,
    EnhancedWithTimer,
}

/// The payload returned for an analysis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub analysis_type: AnalysisType,
    pub user_measurements: UserSummary,
    pub mannequin: MannequinSummary,
    pub similarity_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_analysis: Option<PhotoAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer_analytics: Option<TimerAnalytics>,
    pub performance_metrics: StageTimings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub height_cm: f32,
    pub weight_kg: f32,
    pub gender: Gender,
    pub bmi: f32,
}

impl UserSummary {
    fn new(user: &UserMeasurements) -> Self {
        Self {
            height_cm: user.height_cm(),
            weight_kg: user.weight_kg(),
            gender: user.gender(),
            bmi: round_to(user.bmi(), 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MannequinSummary {
    pub mannequin_id: u32,
    pub filename: String,
    pub gender: Gender,
    pub similarity_score: f32,
    pub estimated_height: f32,
    pub estimated_weight: f32,
    pub estimated_bmi: f32,
    pub file_path: String,
    pub photo_enhanced: bool,
    pub analysis_confidence: f32,
    pub timer_enhanced: bool,
}

impl MannequinSummary {
    fn new(result: &SelectionResult) -> Self {
        let entry = &result.entry;
        Self {
            mannequin_id: entry.id,
            filename: entry.filename.clone(),
            gender: entry.gender,
            similarity_score: round_to(result.similarity_score, 1),
            estimated_height: entry.height_cm,
            estimated_weight: entry.weight_kg,
            estimated_bmi: entry.bmi,
            file_path: format!("{ASSET_URL_PREFIX}/{}", entry.filename),
            photo_enhanced: result.photo_enhanced,
            analysis_confidence: round_to(result.analysis_confidence, 1),
            timer_enhanced: result.timer_effectiveness.is_some(),
        }
    }
}

/// Photo measurements, as percentages (scores) or rounded ratios.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoAnalysis {
    pub confidence_score: f32,
    pub shoulder_width_ratio: f32,
    pub waist_hip_ratio: f32,
    pub torso_leg_ratio: f32,
    pub symmetry_score: f32,
    pub pose_quality_scores: BTreeMap<PoseKind, f32>,
}

impl PhotoAnalysis {
    fn new(m: &BodyMeasurements) -> Self {
        let percent = |v: f32| round_to(v * 100.0, 1);
        Self {
            confidence_score: percent(m.confidence_score),
            shoulder_width_ratio: round_to(m.shoulder_width_ratio, 3),
            waist_hip_ratio: round_to(m.waist_hip_ratio, 3),
            torso_leg_ratio: round_to(m.torso_leg_ratio, 3),
            symmetry_score: percent(m.symmetry_score),
            pose_quality_scores: m
                .pose_quality_scores
                .iter()
                .map(|(&pose, &q)| (pose, percent(q)))
                .collect(),
        }
    }
}

/// Time spent in each stage, in seconds. Stages that did not run are absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StageTimings {
    pub total_processing_time: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_processing_time: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_time: Option<f32>,
    pub selection_time: f32,
}

fn seconds(d: Duration) -> f32 {
    round_to(d.as_secs_f32(), 2)
}

/// Runs analysis requests against a catalog.
///
/// The pipeline borrows its collaborators, so a single catalog and pose extractor can back many
/// pipelines and concurrent requests.
#[derive(Clone, Copy)]
pub struct AnalysisPipeline<'a> {
    selector: MannequinSelector<'a>,
    extractor: Option<&'a PoseLandmarkExtractor>,
    max_dimension: u32,
}

impl<'a> AnalysisPipeline<'a> {
    pub fn new(selector: MannequinSelector<'a>) -> Self {
        Self {
            selector,
            extractor: None,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    /// Enables photo analysis.
    pub fn with_extractor(self, extractor: &'a PoseLandmarkExtractor) -> Self {
        Self {
            extractor: Some(extractor),
            ..self
        }
    }

    pub fn with_max_dimension(self, max_dimension: u32) -> Self {
        Self {
            max_dimension,
            ..self
        }
    }

    /// Analyzes a request.
    ///
    /// The user data is validated before anything else happens. Photos are only used if the
    /// pipeline has an extractor.
    pub fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport> {
        let start = Instant::now();
        let user = request.validate()?;
        log::info!(
            "analyzing {} user, {}cm, {}kg ({} photos)",
            user.gender(),
            user.height_cm(),
            user.weight_kg(),
            request.photos.len(),
        );

        let extractor = match self.extractor {
            Some(extractor) if !request.photos.is_empty() => extractor,
            _ => {
                if !request.photos.is_empty() {
                    log::warn!("no pose estimator available, ignoring photos");
                }
                return self.analyze_basic(&user, start);
            }
        };

        let AnalysisRequest { photos, timer, .. } = request;
        let timer = timer.map(TimerAware::new);

        let photo_start = Instant::now();
        let average_timer = timer
            .as_ref()
            .map_or(DEFAULT_TIMER, |t| t.metadata().computed_average());
        let max_dimension = self.max_dimension;
        let photos: PosePhotos = photos
            .into_par_iter()
            .map(|(pose, image)| (pose, photo::prepare(image, max_dimension, average_timer)))
            .collect();
        let observations = extractor.extract_all(&photos);
        let photo_processing_time = photo_start.elapsed();

        let analysis_start = Instant::now();
        let mut measurements = analysis::synthesize(&observations);
        if let Some(timer) = &timer {
            timer.adjust(&mut measurements);
        }
        let analysis_time = analysis_start.elapsed();

        let selection_start = Instant::now();
        let mut result = self.selector.select(&user, Some(&measurements))?;
        if let Some(timer) = &timer {
            timer.apply_to_selection(&mut result, &measurements);
        }
        let selection_time = selection_start.elapsed();

        let report = AnalysisReport {
            analysis_type: if timer.is_some() {
                AnalysisType::EnhancedWithTimer
            } else {
                AnalysisType::Enhanced
            },
            user_measurements: UserSummary::new(&user),
            mannequin: MannequinSummary::new(&result),
            similarity_score: round_to(result.similarity_score, 1),
            photo_analysis: Some(PhotoAnalysis::new(&measurements)),
            timer_analytics: timer.as_ref().map(|t| t.analytics(&measurements)),
            performance_metrics: StageTimings {
                total_processing_time: seconds(start.elapsed()),
                photo_processing_time: Some(seconds(photo_processing_time)),
                analysis_time: Some(seconds(analysis_time)),
                selection_time: seconds(selection_time),
            },
        };
        log::info!(
            "analysis complete: {} (similarity {:.1}%, confidence {:.1}%)",
            report.mannequin.filename,
            report.similarity_score,
            report.mannequin.analysis_confidence,
        );
        Ok(report)
    }

    fn analyze_basic(&self, user: &UserMeasurements, start: Instant) -> Result<AnalysisReport> {
        let selection_start = Instant::now();
        let result = self.selector.select(user, None)?;
        let selection_time = selection_start.elapsed();

        Ok(AnalysisReport {
            analysis_type: AnalysisType::Basic,
            user_measurements: UserSummary::new(user),
            mannequin: MannequinSummary::new(&result),
            similarity_score: round_to(result.similarity_score, 1),
            photo_analysis: None,
            timer_analytics: None,
            performance_metrics: StageTimings {
                total_processing_time: seconds(start.elapsed()),
                selection_time: seconds(selection_time),
                ..StageTimings::default()
            },
        })
    }
}
