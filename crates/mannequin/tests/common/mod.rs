#![allow(dead_code)]

use std::collections::HashMap;

use image::RgbImage;
use mannequin::{
    body::{LandmarkIdx, PoseLandmarkSet},
    extract::PoseEstimator,
    landmark::Landmark,
    photo::PosePhotos,
    pose::PoseKind,
};

/// A frontal standing person in a 400x1000 photo, all key landmarks at visibility 0.9.
pub fn standing_pose() -> PoseLandmarkSet {
    use LandmarkIdx::*;

    let mut set = PoseLandmarkSet::default();
    for (idx, x, y) in [
        (Nose, 200.0, 100.0),
        (LeftShoulder, 260.0, 250.0),
        (RightShoulder, 140.0, 250.0),
        (LeftWrist, 300.0, 550.0),
        (RightWrist, 100.0, 550.0),
        (LeftHip, 240.0, 500.0),
        (RightHip, 160.0, 500.0),
        (LeftKnee, 240.0, 700.0),
        (RightKnee, 160.0, 700.0),
        (LeftAnkle, 240.0, 900.0),
        (RightAnkle, 160.0, 900.0),
    ] {
        set.set(idx, Landmark::new([x, y, 0.0]).with_visibility(0.9));
    }
    set
}

/// Blank photos, one per pose, each with a distinct width so [`ScriptedEstimator`] can tell
/// them apart.
pub fn blank_photos() -> PosePhotos {
    PoseKind::ALL
        .into_iter()
        .map(|pose| (pose, RgbImage::new(photo_width(pose), 120)))
        .collect()
}

pub fn photo_width(pose: PoseKind) -> u32 {
    60 + pose.index() as u32
}

/// Answers with a scripted landmark set per pose (or no detection).
pub struct ScriptedEstimator {
    answers: HashMap<u32, Option<PoseLandmarkSet>>,
}

impl ScriptedEstimator {
    pub fn new(answers: impl IntoIterator<Item = (PoseKind, Option<PoseLandmarkSet>)>) -> Self {
        Self {
            answers: answers
                .into_iter()
                .map(|(pose, set)| (photo_width(pose), set))
                .collect(),
        }
    }

    /// Detects [`standing_pose`] in every photo.
    pub fn everywhere() -> Self {
        Self::new(PoseKind::ALL.map(|pose| (pose, Some(standing_pose()))))
    }
}

impl PoseEstimator for ScriptedEstimator {
    fn estimate(&self, image: &RgbImage) -> mannequin::Result<Option<PoseLandmarkSet>> {
        Ok(self.answers.get(&image.width()).cloned().flatten())
    }
}
