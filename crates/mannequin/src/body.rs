//! Full-body pose estimation.

pub mod landmark;

pub use landmark::{Complexity, LandmarkIdx, OnnxPoseEstimator, PoseLandmarkSet};
