//! Body measurement synthesis from pose landmarks.
//!
//! Every pose contributes only the ratios it can observe well: the front view gives widths, the
//! profile views give lengths and depth, the back view confirms the shoulder width. All ratios are
//! dimensionless, so the photo resolution and the distance to the camera do not matter.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::body::{LandmarkIdx, PoseLandmarkSet};
use crate::extract::{PoseObservation, PoseObservations};
use crate::landmark::Landmark;
use crate::num::{clamp01, mean};
use crate::pose::PoseKind;

/// Landmarks whose visibility determines the pose quality.
const KEY_LANDMARKS: [LandmarkIdx; 7] = [
    LandmarkIdx::Nose,
    LandmarkIdx::LeftShoulder,
    LandmarkIdx::RightShoulder,
    LandmarkIdx::LeftHip,
    LandmarkIdx::RightHip,
    LandmarkIdx::LeftAnkle,
    LandmarkIdx::RightAnkle,
];

/// Vertical shoulder offset (in pixels) at which a pose counts as fully tilted.
const SHOULDER_TILT_LIMIT: f32 = 50.0;

/// Shoulder width ratio the back view contributes. It has no height reference of its own.
const BACK_SHOULDER_WIDTH_RATIO: f32 = 0.25;

const DEFAULT_SHOULDER_WIDTH_RATIO: f32 = 0.25;
const DEFAULT_WAIST_HIP_RATIO: f32 = 0.8;
const DEFAULT_TORSO_LEG_RATIO: f32 = 1.0;
const DEFAULT_SYMMETRY: f32 = 0.5;
const FAILURE_CONFIDENCE: f32 = 0.1;

/// Body-shape ratios and confidence derived from the calibration photos.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyMeasurements {
    /// Shoulder width relative to body height.
    pub shoulder_width_ratio: f32,
    /// Shoulder width relative to hip width. There is no waist landmark, so this is not a true
    /// waist measurement.
    pub waist_hip_ratio: f32,
    pub torso_leg_ratio: f32,
    /// Fixed multiple of the shoulder width ratio.
    pub arm_length_ratio: f32,
    /// Fixed multiple of the shoulder width ratio.
    pub chest_width_ratio: f32,
    /// Agreement between the left and right profile views, in `[0, 1]`.
    pub symmetry_score: f32,
    /// Quality of each photo, in `[0, 1]`. Poses without a detected body score 0.
    pub pose_quality_scores: BTreeMap<PoseKind, f32>,
    /// Overall trust in these measurements, in `[0, 1]`.
    pub confidence_score: f32,
}

/// Measurements used when synthesis fails.
impl Default for BodyMeasurements {
    fn default() -> Self {
        Self {
            shoulder_width_ratio: DEFAULT_SHOULDER_WIDTH_RATIO,
            waist_hip_ratio: DEFAULT_WAIST_HIP_RATIO,
            torso_leg_ratio: DEFAULT_TORSO_LEG_RATIO,
            arm_length_ratio: 0.3,
            chest_width_ratio: 0.2,
            symmetry_score: DEFAULT_SYMMETRY,
            pose_quality_scores: PoseKind::ALL.into_iter().map(|p| (p, 0.0)).collect(),
            confidence_score: FAILURE_CONFIDENCE,
        }
    }
}

impl BodyMeasurements {
    /// Mean of all pose quality scores, or [`None`] if there are none.
    pub fn mean_pose_quality(&self) -> Option<f32> {
        mean(self.pose_quality_scores.values().copied())
    }

    fn is_finite(&self) -> bool {
        [
            self.shoulder_width_ratio,
            self.waist_hip_ratio,
            self.torso_leg_ratio,
            self.arm_length_ratio,
            self.chest_width_ratio,
            self.symmetry_score,
            self.confidence_score,
        ]
        .into_iter()
        .chain(self.pose_quality_scores.values().copied())
        .all(f32::is_finite)
    }
}

/// Measurements from a front view. Lengths are in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrontRatios {
    pub shoulder_width: f32,
    pub hip_width: f32,
    pub torso_length: f32,
    /// Nose to ankle midpoint. Negative if the person is upside down.
    pub total_height: f32,
    pub arm_span: f32,
    pub shoulder_width_ratio: f32,
    pub hip_width_ratio: f32,
    pub waist_hip_ratio: f32,
}

/// Measurements from a profile view. Lengths are in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideRatios {
    pub torso_length: f32,
    pub leg_length: f32,
    pub total_height: f32,
    /// Horizontal offset of the shoulder from the image center.
    pub body_depth: f32,
    pub torso_leg_ratio: f32,
    pub body_depth_ratio: f32,
}

/// Measurements from a back view. Lengths are in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackRatios {
    pub shoulder_width: f32,
    pub hip_width: f32,
    pub shoulder_hip_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseRatios {
    Front(FrontRatios),
    Side(SideRatios),
    Back(BackRatios),
}

impl PoseRatios {
    fn values(&self) -> Vec<f32> {
        match self {
            Self::Front(f) => vec![
                f.shoulder_width,
                f.hip_width,
                f.torso_length,
                f.total_height,
                f.arm_span,
                f.shoulder_width_ratio,
                f.hip_width_ratio,
                f.waist_hip_ratio,
            ],
            Self::Side(s) => vec![
                s.torso_length,
                s.leg_length,
                s.total_height,
                s.body_depth,
                s.torso_leg_ratio,
                s.body_depth_ratio,
            ],
            Self::Back(b) => vec![b.shoulder_width, b.hip_width, b.shoulder_hip_ratio],
        }
    }
}

/// Ratios and quality of a single photo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseAnalysis {
    pub ratios: PoseRatios,
    pub quality: f32,
}

fn midpoint_y(a: Landmark, b: Landmark) -> f32 {
    (a.y() + b.y()) / 2.0
}

/// `num / den` if `den` is positive, `fallback` otherwise.
fn ratio_or(num: f32, den: f32, fallback: f32) -> f32 {
    if den > 0.0 {
        num / den
    } else {
        fallback
    }
}

/// Analyzes a single observation, taken in the given pose.
pub fn analyze_pose(pose: PoseKind, observation: &PoseObservation) -> PoseAnalysis {
    let lms = &observation.landmarks;
    let ratios = match pose {
        PoseKind::Front => PoseRatios::Front(front_ratios(lms)),
        PoseKind::Left | PoseKind::Right => {
            PoseRatios::Side(side_ratios(lms, pose, observation.image_width))
        }
        PoseKind::Back => PoseRatios::Back(back_ratios(lms)),
    };
    PoseAnalysis {
        ratios,
        quality: pose_quality(lms),
    }
}

fn front_ratios(lms: &PoseLandmarkSet) -> FrontRatios {
    use LandmarkIdx::*;

    let (ls, rs) = (lms.get(LeftShoulder), lms.get(RightShoulder));
    let (lh, rh) = (lms.get(LeftHip), lms.get(RightHip));
    let shoulder_width = (rs.x() - ls.x()).abs();
    let hip_width = (rh.x() - lh.x()).abs();
    let torso_length = (midpoint_y(ls, rs) - midpoint_y(lh, rh)).abs();
    let total_height = midpoint_y(lms.get(LeftAnkle), lms.get(RightAnkle)) - lms.get(Nose).y();
    let arm_span = (lms.get(RightWrist).x() - lms.get(LeftWrist).x()).abs();

    FrontRatios {
        shoulder_width,
        hip_width,
        torso_length,
        total_height,
        arm_span,
        shoulder_width_ratio: ratio_or(shoulder_width, total_height, 0.0),
        hip_width_ratio: ratio_or(hip_width, total_height, 0.0),
        waist_hip_ratio: ratio_or(shoulder_width, hip_width, 1.0),
    }
}

fn side_ratios(lms: &PoseLandmarkSet, pose: PoseKind, image_width: u32) -> SideRatios {
    use LandmarkIdx::*;

    let (shoulder, hip, ankle) = if pose == PoseKind::Left {
        (LeftShoulder, LeftHip, LeftAnkle)
    } else {
        (RightShoulder, RightHip, RightAnkle)
    };
    let (shoulder, hip, ankle) = (lms.get(shoulder), lms.get(hip), lms.get(ankle));
    let nose = lms.get(Nose);

    let torso_length = (hip.y() - nose.y()).abs();
    let leg_length = (ankle.y() - hip.y()).abs();
    let total_height = (ankle.y() - nose.y()).abs();
    let body_depth = (shoulder.x() - image_width as f32 / 2.0).abs();

    SideRatios {
        torso_length,
        leg_length,
        total_height,
        body_depth,
        torso_leg_ratio: ratio_or(torso_length, leg_length, 1.0),
        body_depth_ratio: ratio_or(body_depth, total_height, 0.0),
    }
}

fn back_ratios(lms: &PoseLandmarkSet) -> BackRatios {
    use LandmarkIdx::*;

    let shoulder_width = (lms.get(RightShoulder).x() - lms.get(LeftShoulder).x()).abs();
    let hip_width = (lms.get(RightHip).x() - lms.get(LeftHip).x()).abs();
    BackRatios {
        shoulder_width,
        hip_width,
        shoulder_hip_ratio: ratio_or(shoulder_width, hip_width, 1.0),
    }
}

/// Rates how usable a photo is, from key landmark visibility and how level the shoulders are.
///
/// Returns a value in `[0, 1]`.
pub fn pose_quality(lms: &PoseLandmarkSet) -> f32 {
    let visibility = mean(KEY_LANDMARKS.iter().map(|&idx| lms.visibility(idx))).unwrap_or(0.0);
    let tilt = (lms.get(LandmarkIdx::LeftShoulder).y() - lms.get(LandmarkIdx::RightShoulder).y())
        .abs();
    let alignment = 1.0 - (tilt / SHOULDER_TILT_LIMIT).min(1.0);
    clamp01(visibility * 0.7 + alignment * 0.3)
}

/// Combines the landmark sets of all observed poses into [`BodyMeasurements`].
///
/// Poses missing from `observations` count as failed detections with quality 0. If any
/// intermediate value turns out non-finite, the default measurements (with a confidence of 0.1)
/// are returned instead.
pub fn synthesize(observations: &PoseObservations) -> BodyMeasurements {
    let analyses: BTreeMap<_, _> = observations
        .iter()
        .map(|(&pose, obs)| (pose, analyze_pose(pose, obs)))
        .collect();
    for (pose, analysis) in &analyses {
        log::debug!("{pose} pose: {analysis:?}");
    }

    let measurements = aggregate(&analyses);
    let per_pose_finite = analyses
        .values()
        .all(|a| a.quality.is_finite() && a.ratios.values().iter().all(|v| v.is_finite()));
    if !per_pose_finite || !measurements.is_finite() {
        log::error!("body measurement synthesis produced non-finite values, using defaults");
        return BodyMeasurements::default();
    }

    log::debug!(
        "synthesized measurements from {} of {} poses (confidence {:.2})",
        analyses.len(),
        PoseKind::ALL.len(),
        measurements.confidence_score,
    );
    measurements
}

/// Aggregates per-pose analyses. Zero-valued ratios are treated as absent.
pub fn aggregate(analyses: &BTreeMap<PoseKind, PoseAnalysis>) -> BodyMeasurements {
    let ratios = |pose: PoseKind| analyses.get(&pose).map(|a| a.ratios);
    let front = match ratios(PoseKind::Front) {
        Some(PoseRatios::Front(f)) => Some(f),
        _ => None,
    };
    let side = |pose: PoseKind| match ratios(pose) {
        Some(PoseRatios::Side(s)) => Some(s),
        _ => None,
    };
    let (left, right) = (side(PoseKind::Left), side(PoseKind::Right));
    let back = match ratios(PoseKind::Back) {
        Some(PoseRatios::Back(b)) => Some(b),
        _ => None,
    };

    let mut shoulder_ratios = Vec::new();
    if let Some(f) = front.filter(|f| f.shoulder_width_ratio > 0.0) {
        shoulder_ratios.push(f.shoulder_width_ratio);
    }
    if back.is_some_and(|b| b.shoulder_width > 0.0) {
        shoulder_ratios.push(BACK_SHOULDER_WIDTH_RATIO);
    }
    let shoulder_width_ratio = mean(shoulder_ratios).unwrap_or(DEFAULT_SHOULDER_WIDTH_RATIO);

    let waist_hip_ratio = front
        .map(|f| f.waist_hip_ratio)
        .filter(|&r| r > 0.0)
        .unwrap_or(DEFAULT_WAIST_HIP_RATIO);

    let torso_leg_ratio = mean(
        [left, right]
            .into_iter()
            .flatten()
            .map(|s| s.torso_leg_ratio)
            .filter(|&r| r > 0.0),
    )
    .unwrap_or(DEFAULT_TORSO_LEG_RATIO);

    let symmetry_score = match (left, right) {
        (Some(l), Some(r)) => symmetry(&l, &r),
        _ => DEFAULT_SYMMETRY,
    };

    let pose_quality_scores: BTreeMap<_, _> = PoseKind::ALL
        .into_iter()
        .map(|pose| (pose, analyses.get(&pose).map_or(0.0, |a| a.quality)))
        .collect();
    let confidence_score = clamp01(mean(pose_quality_scores.values().copied()).unwrap_or(0.0));

    BodyMeasurements {
        shoulder_width_ratio,
        waist_hip_ratio,
        torso_leg_ratio,
        arm_length_ratio: shoulder_width_ratio * 1.2,
        chest_width_ratio: shoulder_width_ratio * 0.8,
        symmetry_score,
        pose_quality_scores,
        confidence_score,
    }
}

/// Mean similarity of the left and right profile ratios.
fn symmetry(left: &SideRatios, right: &SideRatios) -> f32 {
    let similarity = |a: f32, b: f32| (a > 0.0 && b > 0.0).then(|| 1.0 - (a - b).abs() / a.max(b));
    let terms = [
        similarity(left.torso_leg_ratio, right.torso_leg_ratio),
        similarity(left.body_depth_ratio, right.body_depth_ratio),
    ];
    mean(terms.into_iter().flatten()).unwrap_or(DEFAULT_SYMMETRY)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::test::{place, standing_pose};

    fn observe(landmarks: PoseLandmarkSet) -> PoseObservation {
        PoseObservation {
            landmarks,
            image_width: 400,
            image_height: 1000,
        }
    }

    /// A profile view of a 400px wide photo, nose at y=100 and ankle at y=900.
    fn profile(pose: PoseKind, hip_y: f32, shoulder_x: f32) -> PoseLandmarkSet {
        use LandmarkIdx::*;

        let (shoulder, hip, ankle) = if pose == PoseKind::Left {
            (LeftShoulder, LeftHip, LeftAnkle)
        } else {
            (RightShoulder, RightHip, RightAnkle)
        };
        let mut set = standing_pose();
        place(&mut set, shoulder, shoulder_x, 250.0, 0.9);
        place(&mut set, hip, 200.0, hip_y, 0.9);
        place(&mut set, ankle, 200.0, 900.0, 0.9);
        set
    }

    #[test]
    fn front_pose() {
        let analysis = analyze_pose(PoseKind::Front, &observe(standing_pose()));
        let PoseRatios::Front(f) = analysis.ratios else {
            panic!("expected front ratios, got {:?}", analysis.ratios);
        };
        assert_relative_eq!(f.shoulder_width, 120.0);
        assert_relative_eq!(f.hip_width, 80.0);
        assert_relative_eq!(f.torso_length, 250.0);
        assert_relative_eq!(f.total_height, 800.0);
        assert_relative_eq!(f.arm_span, 200.0);
        assert_relative_eq!(f.shoulder_width_ratio, 0.15);
        assert_relative_eq!(f.hip_width_ratio, 0.1);
        assert_relative_eq!(f.waist_hip_ratio, 1.5);
        assert_relative_eq!(analysis.quality, 0.93, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_front_pose() {
        use LandmarkIdx::*;

        let mut set = standing_pose();
        // Upside down: ankles above the nose, no usable height reference.
        place(&mut set, LeftAnkle, 240.0, 50.0, 0.9);
        place(&mut set, RightAnkle, 160.0, 50.0, 0.9);
        place(&mut set, LeftHip, 200.0, 500.0, 0.9);
        place(&mut set, RightHip, 200.0, 500.0, 0.9);
        let PoseRatios::Front(f) = analyze_pose(PoseKind::Front, &observe(set)).ratios else {
            unreachable!()
        };
        assert!(f.total_height < 0.0);
        assert_eq!(f.shoulder_width_ratio, 0.0);
        assert_eq!(f.hip_width_ratio, 0.0);
        assert_eq!(f.waist_hip_ratio, 1.0);
    }

    #[test]
    fn side_pose() {
        let set = profile(PoseKind::Right, 460.0, 240.0);
        let PoseRatios::Side(s) = analyze_pose(PoseKind::Right, &observe(set)).ratios else {
            unreachable!()
        };
        assert_relative_eq!(s.torso_length, 360.0);
        assert_relative_eq!(s.leg_length, 440.0);
        assert_relative_eq!(s.total_height, 800.0);
        assert_relative_eq!(s.body_depth, 40.0);
        assert_relative_eq!(s.torso_leg_ratio, 360.0 / 440.0);
        assert_relative_eq!(s.body_depth_ratio, 0.05);
    }

    #[test]
    fn back_pose() {
        let PoseRatios::Back(b) = analyze_pose(PoseKind::Back, &observe(standing_pose())).ratios
        else {
            unreachable!()
        };
        assert_relative_eq!(b.shoulder_width, 120.0);
        assert_relative_eq!(b.shoulder_hip_ratio, 1.5);
    }

    #[test]
    fn quality_penalizes_tilt_and_occlusion() {
        let level = pose_quality(&standing_pose());

        let mut tilted = standing_pose();
        place(&mut tilted, LandmarkIdx::LeftShoulder, 260.0, 275.0, 0.9);
        assert_relative_eq!(pose_quality(&tilted), level - 0.15, epsilon = 1e-6);

        let mut hidden = standing_pose();
        place(&mut hidden, LandmarkIdx::Nose, 200.0, 100.0, 0.0);
        assert_relative_eq!(pose_quality(&hidden), level - 0.7 * 0.9 / 7.0, epsilon = 1e-6);

        // Nothing visible, but the shoulders are level.
        assert_eq!(pose_quality(&PoseLandmarkSet::default()), 0.3);
    }

    #[test]
    fn all_four_poses() {
        let observations = PoseObservations::from([
            (PoseKind::Front, observe(standing_pose())),
            (PoseKind::Left, observe(profile(PoseKind::Left, 460.0, 240.0))),
            (PoseKind::Right, observe(profile(PoseKind::Right, 460.0, 160.0))),
            (PoseKind::Back, observe(standing_pose())),
        ]);
        let m = synthesize(&observations);
        // front 0.15 and the back view's 0.25
        assert_relative_eq!(m.shoulder_width_ratio, 0.2, epsilon = 1e-6);
        assert_relative_eq!(m.arm_length_ratio, 0.24, epsilon = 1e-6);
        assert_relative_eq!(m.chest_width_ratio, 0.16, epsilon = 1e-6);
        assert_relative_eq!(m.waist_hip_ratio, 1.5);
        assert_relative_eq!(m.torso_leg_ratio, 360.0 / 440.0, epsilon = 1e-6);
        // mirror-image profiles are perfectly symmetric
        assert_relative_eq!(m.symmetry_score, 1.0, epsilon = 1e-6);
        assert_eq!(m.pose_quality_scores.len(), 4);
        assert_relative_eq!(m.confidence_score, 0.93, epsilon = 1e-6);
    }

    #[test]
    fn asymmetric_profiles() {
        let observations = PoseObservations::from([
            (PoseKind::Left, observe(profile(PoseKind::Left, 460.0, 240.0))),
            (PoseKind::Right, observe(profile(PoseKind::Right, 500.0, 280.0))),
        ]);
        let m = synthesize(&observations);
        let (l, r) = (360.0f32 / 440.0, 400.0f32 / 400.0);
        let torso_leg = 1.0 - (l - r).abs() / l.max(r);
        let depth = 1.0 - (0.05f32 - 0.1).abs() / 0.1;
        assert_relative_eq!(m.symmetry_score, (torso_leg + depth) / 2.0, epsilon = 1e-6);
        assert_relative_eq!(m.torso_leg_ratio, (l + r) / 2.0, epsilon = 1e-6);
        assert_eq!(m.pose_quality_scores[&PoseKind::Front], 0.0);
        assert_relative_eq!(m.confidence_score, 0.93 / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn symmetry_needs_both_sides() {
        let observations = PoseObservations::from([
            (PoseKind::Front, observe(standing_pose())),
            (PoseKind::Left, observe(profile(PoseKind::Left, 460.0, 240.0))),
        ]);
        assert_eq!(synthesize(&observations).symmetry_score, 0.5);
    }

    #[test]
    fn nothing_detected() {
        let m = synthesize(&PoseObservations::new());
        assert_eq!(m.shoulder_width_ratio, 0.25);
        assert_eq!(m.waist_hip_ratio, 0.8);
        assert_eq!(m.torso_leg_ratio, 1.0);
        assert_eq!(m.symmetry_score, 0.5);
        assert_eq!(m.confidence_score, 0.0);
        assert!(m.pose_quality_scores.values().all(|&q| q == 0.0));
    }

    #[test]
    fn non_finite_input_yields_defaults() {
        let mut set = standing_pose();
        place(&mut set, LandmarkIdx::Nose, f32::NAN, f32::NAN, 0.9);
        let observations = PoseObservations::from([(PoseKind::Front, observe(set))]);
        let m = synthesize(&observations);
        assert_eq!(m, BodyMeasurements::default());
        assert_eq!(m.confidence_score, 0.1);
    }
}
