//! Self-timer metadata: quality adjustments and effectiveness scoring.
//!
//! Users take the calibration photos with a self-timer. A longer timer gives them time to get into
//! position, so it both changes how much the photos can be trusted and is something worth
//! recommending back to them.

use serde::{Deserialize, Serialize};

use crate::analysis::BodyMeasurements;
use crate::num::{clamp, clamp01, mean};
use crate::pose::PoseKind;
use crate::selector::SelectionResult;

/// Timer duration assumed when the caller did not report one, in seconds.
pub const DEFAULT_TIMER: f32 = 5.0;

/// Timer settings reported by the capture client.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimerMetadata {
    /// Timer duration for each photo, in seconds, in canonical pose order.
    #[serde(default)]
    pub timers_used: Vec<f32>,
    /// Average duration as reported by the client.
    #[serde(default)]
    pub average_timer: Option<f32>,
    /// Client-side consistency label, passed through as-is.
    #[serde(default, rename = "timer_consistency")]
    pub consistency: Option<String>,
}

impl TimerMetadata {
    /// Creates metadata from per-photo durations, with the average computed from them.
    pub fn from_timers(timers_used: Vec<f32>) -> Self {
        let average_timer = mean(timers_used.iter().copied());
        Self {
            timers_used,
            average_timer,
            consistency: None,
        }
    }

    /// Average of the per-photo durations, or [`DEFAULT_TIMER`] if there are none.
    pub fn computed_average(&self) -> f32 {
        mean(self.timers_used.iter().copied()).unwrap_or(DEFAULT_TIMER)
    }

    /// The client-reported average, or [`DEFAULT_TIMER`] if it is absent.
    pub fn reported_average(&self) -> f32 {
        self.average_timer.unwrap_or(DEFAULT_TIMER)
    }

    /// Returns whether at least one duration was reported and all of them are identical.
    pub fn is_consistent(&self) -> bool {
        match self.timers_used.split_first() {
            Some((first, rest)) => rest.iter().all(|t| t == first),
            None => false,
        }
    }

    /// Duration used for the photo of `pose`, if reported.
    pub fn timer_for(&self, pose: PoseKind) -> Option<f32> {
        self.timers_used.get(pose.index()).copied()
    }
}

/// How the timer setting affected photo quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityImpact {
    Excellent,
    Good,
    Moderate,
    NeedsImprovement,
    Unknown,
}

impl QualityImpact {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Moderate => "moderate",
            Self::NeedsImprovement => "needs_improvement",
            Self::Unknown => "unknown",
        }
    }
}

/// Applies timer-based adjustments to body measurements.
///
/// This is composed with the measurement synthesizer and the selector by whoever drives a request
/// (see [`crate::pipeline`]), rather than being part of either.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerAware {
    metadata: TimerMetadata,
}

impl TimerAware {
    pub fn new(metadata: TimerMetadata) -> Self {
        Self { metadata }
    }

    #[inline]
    pub fn metadata(&self) -> &TimerMetadata {
        &self.metadata
    }

    /// Rescales the confidence and pose quality scores of `m` according to the timer durations.
    ///
    /// - A long average timer (≥ 8 s) raises the confidence by 10%, a short one (≤ 4 s) lowers it
    ///   by 10%.
    /// - A photo that is poor (< 0.6) despite a long timer (≥ 8 s) loses 20% quality; one that is
    ///   good (> 0.7) despite a short timer (≤ 5 s) gains 10%.
    ///
    /// All scores stay in `[0, 1]`, whatever the durations.
    pub fn adjust(&self, m: &mut BodyMeasurements) {
        let average = self.metadata.computed_average();
        if average >= 8.0 {
            m.confidence_score *= 1.1;
        } else if average <= 4.0 {
            m.confidence_score *= 0.9;
        }
        m.confidence_score = clamp01(m.confidence_score);

        for (&pose, quality) in m.pose_quality_scores.iter_mut() {
            if let Some(timer) = self.metadata.timer_for(pose) {
                if timer >= 8.0 && *quality < 0.6 {
                    *quality *= 0.8;
                } else if timer <= 5.0 && *quality > 0.7 {
                    *quality *= 1.1;
                }
            }
            *quality = clamp01(*quality);
        }
        log::debug!(
            "timer adjustments (average {average:.1}s): confidence {:.3}",
            m.confidence_score
        );
    }

    /// Rates how well the timer setting worked, from 0 to 100.
    ///
    /// - 40 points scale with the measurement confidence.
    /// - 20 points if every photo used the same duration.
    /// - 20 points for an average of 7-10 s, 10 points for at least 5 s.
    /// - 20 points scale with the mean pose quality.
    pub fn effectiveness(&self, m: &BodyMeasurements) -> f32 {
        let mut score = 40.0 * m.confidence_score;
        if self.metadata.is_consistent() {
            score += 20.0;
        }
        let average = self.metadata.reported_average();
        if (7.0..=10.0).contains(&average) {
            score += 20.0;
        } else if average >= 5.0 {
            score += 10.0;
        }
        score += 20.0 * m.mean_pose_quality().unwrap_or(0.0);
        clamp(score, 0.0, 100.0)
    }

    /// Feeds the timer effectiveness back into a selection result.
    ///
    /// Very effective timer use (> 80) boosts the similarity score by 5%, poor use (< 40) lowers
    /// it by 5%. The effectiveness is recorded in the result.
    pub fn apply_to_selection(&self, result: &mut SelectionResult, m: &BodyMeasurements) {
        let effectiveness = self.effectiveness(m);
        if effectiveness > 80.0 {
            result.similarity_score *= 1.05;
        } else if effectiveness < 40.0 {
            result.similarity_score *= 0.95;
        }
        result.similarity_score = clamp(result.similarity_score, 0.0, 100.0);
        result.timer_effectiveness = Some(effectiveness);
    }

    /// Classifies the effect the timer had on photo quality.
    pub fn quality_impact(&self, m: &BodyMeasurements) -> QualityImpact {
        let Some(quality) = m.mean_pose_quality() else {
            return QualityImpact::Unknown;
        };
        let average = self.metadata.computed_average();
        if quality > 0.8 && average >= 8.0 {
            QualityImpact::Excellent
        } else if quality > 0.6 && average >= 5.0 {
            QualityImpact::Good
        } else if quality > 0.4 {
            QualityImpact::Moderate
        } else {
            QualityImpact::NeedsImprovement
        }
    }

    /// Suggests a timer duration for the next capture session, such as `"7s"`.
    ///
    /// Good results keep the current average; poor results suggest a long timer.
    pub fn recommended_timer(&self, m: &BodyMeasurements) -> String {
        match m.mean_pose_quality() {
            None => "5s".to_string(),
            Some(q) if q > 0.7 => format!("{}s", self.metadata.computed_average().trunc() as i64),
            Some(q) if q < 0.5 => "10s".to_string(),
            Some(_) => "7s".to_string(),
        }
    }

    /// Gathers all timer analytics for a report.
    pub fn analytics(&self, m: &BodyMeasurements) -> TimerAnalytics {
        TimerAnalytics {
            effectiveness_score: self.effectiveness(m),
            timer_usage: self.metadata.timers_used.clone(),
            average_timer: self.metadata.reported_average(),
            consistency: self
                .metadata
                .consistency
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            photo_quality_impact: self.quality_impact(m),
            recommended_timer: self.recommended_timer(m),
        }
    }
}

/// Timer analytics block of an analysis report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerAnalytics {
    pub effectiveness_score: f32,
    pub timer_usage: Vec<f32>,
    pub average_timer: f32,
    pub consistency: String,
    pub photo_quality_impact: QualityImpact,
    pub recommended_timer: String,
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn measurements(confidence: f32, qualities: [f32; 4]) -> BodyMeasurements {
        BodyMeasurements {
            confidence_score: confidence,
            pose_quality_scores: PoseKind::ALL.into_iter().zip(qualities).collect(),
            ..BodyMeasurements::default()
        }
    }

    fn timers(timers: &[f32]) -> TimerAware {
        TimerAware::new(TimerMetadata::from_timers(timers.to_vec()))
    }

    #[test]
    fn long_timer_boosts_confidence() {
        let mut m = measurements(0.5, [0.5, 0.9, 0.65, 0.9]);
        timers(&[10.0, 10.0, 10.0, 10.0]).adjust(&mut m);
        assert_relative_eq!(m.confidence_score, 0.55, epsilon = 1e-6);
        let q = &m.pose_quality_scores;
        // poor despite the long timer
        assert_relative_eq!(q[&PoseKind::Front], 0.4);
        assert_relative_eq!(q[&PoseKind::Left], 0.9);
        assert_relative_eq!(q[&PoseKind::Right], 0.65);
    }

    #[test]
    fn short_timer_rewards_good_photos() {
        let mut m = measurements(0.95, [0.95, 0.5, 0.72, 0.3]);
        timers(&[3.0, 3.0, 3.0, 3.0]).adjust(&mut m);
        assert_relative_eq!(m.confidence_score, 0.855, epsilon = 1e-6);
        let q = &m.pose_quality_scores;
        assert_eq!(q[&PoseKind::Front], 1.0);
        assert_relative_eq!(q[&PoseKind::Left], 0.5);
        assert_relative_eq!(q[&PoseKind::Right], 0.792, epsilon = 1e-6);
        assert_relative_eq!(q[&PoseKind::Back], 0.3);
    }

    #[test]
    fn confidence_upper_clamp() {
        let mut m = measurements(0.95, [0.9; 4]);
        timers(&[9.0]).adjust(&mut m);
        assert_eq!(m.confidence_score, 1.0);
        // only the front photo has a duration
        assert_relative_eq!(m.pose_quality_scores[&PoseKind::Front], 0.9);
    }

    #[test]
    fn scores_stay_in_range() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let extremes = [f32::MIN, -1000.0, -1.0, 0.0, 4.0, 5.0, 8.0, 1e9, f32::MAX, f32::NAN];
        for _ in 0..500 {
            let durations: Vec<f32> = (0..rng.usize(0..6))
                .map(|_| {
                    if rng.bool() {
                        extremes[rng.usize(..extremes.len())]
                    } else {
                        rng.f32() * 40.0 - 20.0
                    }
                })
                .collect();
            let mut m = measurements(rng.f32(), [rng.f32(), rng.f32(), rng.f32(), rng.f32()]);
            timers(&durations).adjust(&mut m);
            assert!((0.0..=1.0).contains(&m.confidence_score), "{durations:?}");
            for q in m.pose_quality_scores.values() {
                assert!((0.0..=1.0).contains(q), "{durations:?}");
            }
        }
    }

    #[test]
    fn effectiveness_maximum() {
        let aware = TimerAware::new(TimerMetadata {
            timers_used: vec![8.0, 8.0, 8.0, 8.0],
            average_timer: Some(8.5),
            consistency: Some("consistent".into()),
        });
        let m = measurements(1.0, [1.0; 4]);
        assert_eq!(aware.effectiveness(&m), 100.0);
    }

    #[test]
    fn effectiveness_components() {
        let m = measurements(0.5, [0.5; 4]);
        // 20 + 0 (mixed) + 10 (≥ 5) + 10
        let mixed = TimerAware::new(TimerMetadata {
            timers_used: vec![5.0, 10.0],
            average_timer: Some(6.0),
            consistency: None,
        });
        assert_relative_eq!(mixed.effectiveness(&m), 40.0);

        // No reported average counts as 5 s. No durations means no consistency bonus.
        let empty = TimerAware::new(TimerMetadata::default());
        assert_relative_eq!(empty.effectiveness(&m), 40.0);

        let short = TimerAware::new(TimerMetadata {
            timers_used: vec![3.0; 4],
            average_timer: Some(3.0),
            consistency: None,
        });
        assert_relative_eq!(short.effectiveness(&m), 50.0);
    }

    #[test]
    fn selection_feedback() {
        let mut result = SelectionResult::for_test(90.0);
        let aware = TimerAware::new(TimerMetadata {
            timers_used: vec![8.0; 4],
            average_timer: Some(8.0),
            consistency: None,
        });
        aware.apply_to_selection(&mut result, &measurements(1.0, [1.0; 4]));
        assert_relative_eq!(result.similarity_score, 94.5, epsilon = 1e-4);
        assert_eq!(result.timer_effectiveness, Some(100.0));

        let mut result = SelectionResult::for_test(99.0);
        aware.apply_to_selection(&mut result, &measurements(1.0, [1.0; 4]));
        assert_eq!(result.similarity_score, 100.0);

        let mut result = SelectionResult::for_test(50.0);
        let poor = TimerAware::new(TimerMetadata::from_timers(vec![2.0, 3.0]));
        poor.apply_to_selection(&mut result, &measurements(0.2, [0.2; 4]));
        assert_relative_eq!(result.similarity_score, 47.5, epsilon = 1e-4);

        let mut result = SelectionResult::for_test(50.0);
        let middling = TimerAware::new(TimerMetadata::from_timers(vec![6.0; 4]));
        middling.apply_to_selection(&mut result, &measurements(0.5, [0.5; 4]));
        assert_relative_eq!(result.similarity_score, 50.0);
    }

    #[test]
    fn quality_impact_labels() {
        let long = timers(&[8.0, 9.0]);
        let short = timers(&[4.0]);
        assert_eq!(
            long.quality_impact(&measurements(1.0, [0.85; 4])),
            QualityImpact::Excellent
        );
        assert_eq!(
            short.quality_impact(&measurements(1.0, [0.85; 4])),
            QualityImpact::Moderate
        );
        assert_eq!(
            timers(&[]).quality_impact(&measurements(1.0, [0.7; 4])),
            QualityImpact::Good
        );
        assert_eq!(
            long.quality_impact(&measurements(1.0, [0.3; 4])),
            QualityImpact::NeedsImprovement
        );

        let mut none = measurements(1.0, [1.0; 4]);
        none.pose_quality_scores.clear();
        assert_eq!(long.quality_impact(&none), QualityImpact::Unknown);
        assert_eq!(
            serde_json::to_string(&QualityImpact::NeedsImprovement).unwrap(),
            "\"needs_improvement\""
        );
    }

    #[test]
    fn recommendations() {
        let aware = timers(&[8.0, 9.0, 9.0, 9.0]);
        assert_eq!(aware.recommended_timer(&measurements(1.0, [0.9; 4])), "8s");
        assert_eq!(aware.recommended_timer(&measurements(1.0, [0.6; 4])), "7s");
        assert_eq!(aware.recommended_timer(&measurements(1.0, [0.2; 4])), "10s");
        assert_eq!(timers(&[]).recommended_timer(&measurements(1.0, [0.9; 4])), "5s");

        let mut none = measurements(1.0, [1.0; 4]);
        none.pose_quality_scores.clear();
        assert_eq!(aware.recommended_timer(&none), "5s");
    }

    #[test]
    fn metadata_json() {
        let meta: TimerMetadata = serde_json::from_str(
            r#"{"timers_used": [5, 5, 10, 5], "average_timer": 6.25, "timer_consistency": "mixed"}"#,
        )
        .unwrap();
        assert_eq!(meta.timers_used, [5.0, 5.0, 10.0, 5.0]);
        assert_eq!(meta.reported_average(), 6.25);
        assert!(!meta.is_consistent());
        assert_eq!(meta.consistency.as_deref(), Some("mixed"));

        let meta: TimerMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(meta, TimerMetadata::default());
        assert_eq!(meta.computed_average(), DEFAULT_TIMER);
    }
}
