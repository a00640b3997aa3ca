//! Body pose landmark prediction.
//!
//! Uses the BlazePose landmark network layout: 33 pose landmarks followed by 6 auxiliary
//! landmarks, 5 values each, plus a single pose presence flag.

use std::{fmt, path::Path, str::FromStr};

use anyhow::{ensure, Context};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::extract::PoseEstimator;
use crate::landmark::{Landmark, Landmarks};
use crate::nn::{Cnn, ColorMapper, Letterbox, NeuralNetwork, Outputs};
use crate::num::sigmoid;

/// Number of pose landmarks reported per body.
pub const NUM_LANDMARKS: usize = 33;
const NUM_AUX_LANDMARKS: usize = 6;
const VALUES_PER_LANDMARK: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// The 33 pose landmarks of one detected body, in source image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseLandmarkSet {
    landmarks: Landmarks,
}

impl Default for PoseLandmarkSet {
    fn default() -> Self {
        Self {
            landmarks: Landmarks::new(NUM_LANDMARKS),
        }
    }
}

impl PoseLandmarkSet {
    /// Wraps a landmark collection.
    ///
    /// # Panics
    ///
    /// Panics if `landmarks` does not hold exactly [`NUM_LANDMARKS`] entries.
    pub fn new(landmarks: Landmarks) -> Self {
        assert_eq!(
            landmarks.len(),
            NUM_LANDMARKS,
            "pose landmark sets have exactly {NUM_LANDMARKS} landmarks"
        );
        Self { landmarks }
    }

    pub fn get(&self, idx: LandmarkIdx) -> Landmark {
        self.landmarks.get(idx as usize)
    }

    pub fn set(&mut self, idx: LandmarkIdx, landmark: Landmark) {
        self.landmarks.set(idx as usize, landmark);
    }

    /// Visibility of a landmark, treating an unreported visibility as 0.
    pub fn visibility(&self, idx: LandmarkIdx) -> f32 {
        self.get(idx).visibility().unwrap_or(0.0)
    }
}

/// Size of the landmark network. Larger networks are slower but more accurate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Lite,
    Full,
    #[default]
    Heavy,
}

impl Complexity {
    /// The conventional file name of the ONNX model for this complexity.
    pub fn model_file_name(self) -> &'static str {
        match self {
            Self::Lite => "pose_landmark_lite.onnx",
            Self::Full => "pose_landmark_full.onnx",
            Self::Heavy => "pose_landmark_heavy.onnx",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lite => "lite",
            Self::Full => "full",
            Self::Heavy => "heavy",
        })
    }
}

impl FromStr for Complexity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "lite" => Self::Lite,
            "full" => Self::Full,
            "heavy" => Self::Heavy,
            _ => anyhow::bail!("unknown model complexity '{s}' (expected lite, full or heavy)"),
        })
    }
}

/// Single-image pose estimator running a BlazePose landmark network on the CPU.
///
/// The whole photo is treated as the region of interest, so this works best when the body fills
/// most of the frame, as it does in calibration photos.
#[derive(Clone)]
pub struct OnnxPoseEstimator {
    cnn: Cnn,
    min_detection_confidence: f32,
}

impl OnnxPoseEstimator {
    /// Loads the landmark network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P, min_detection_confidence: f32) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref(), min_detection_confidence)
    }

    fn load_impl(path: &Path, min_detection_confidence: f32) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?
            // screen landmarks and pose flag; segmentation, heatmap and world landmarks are unused
            .with_output_selection([0, 1])
            .load()
            .with_context(|| format!("failed to load pose model '{}'", path.display()))?;
        let cnn = Cnn::new(nn, ColorMapper::linear(0.0..=1.0))?;
        log::info!(
            "loaded pose landmark model '{}' ({}x{} input)",
            path.display(),
            cnn.input_resolution().0,
            cnn.input_resolution().1,
        );

        Ok(Self {
            cnn,
            min_detection_confidence,
        })
    }
}

impl PoseEstimator for OnnxPoseEstimator {
    fn estimate(&self, image: &RgbImage) -> crate::Result<Option<PoseLandmarkSet>> {
        let (outputs, letterbox) = self.cnn.estimate(image)?;
        let (presence, landmarks) = extract(&outputs, &letterbox)?;
        log::trace!("pose presence: {presence:.3}");

        if presence < self.min_detection_confidence {
            return Ok(None);
        }
        Ok(Some(landmarks))
    }
}

/// Decodes the network outputs into a presence score and landmarks in source image pixels.
fn extract(outputs: &Outputs, letterbox: &Letterbox) -> anyhow::Result<(f32, PoseLandmarkSet)> {
    ensure!(
        outputs.len() >= 2,
        "pose network produced {} outputs, expected 2",
        outputs.len()
    );
    let screen_landmarks = &outputs[0];
    let pose_flag = &outputs[1];

    let expected = (NUM_LANDMARKS + NUM_AUX_LANDMARKS) * VALUES_PER_LANDMARK;
    ensure!(
        screen_landmarks.as_slice().len() == expected,
        "unexpected landmark output shape {:?}",
        screen_landmarks.shape(),
    );
    ensure!(
        pose_flag.as_slice().len() == 1,
        "unexpected pose flag shape {:?}",
        pose_flag.shape(),
    );

    let presence = pose_flag.as_slice()[0];
    let mut landmarks = Landmarks::new(NUM_LANDMARKS);
    for (i, values) in screen_landmarks
        .as_slice()
        .chunks_exact(VALUES_PER_LANDMARK)
        .take(NUM_LANDMARKS)
        .enumerate()
    {
        let (x, y) = letterbox.to_image(values[0], values[1]);
        // Z uses roughly the same scale as X.
        let z = values[2] * letterbox.scale();
        landmarks.set(
            i,
            Landmark::new([x, y, z])
                .with_visibility(sigmoid(values[3]))
                .with_presence(sigmoid(values[4])),
        );
    }

    Ok((presence, PoseLandmarkSet::new(landmarks)))
}
