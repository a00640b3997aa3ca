//! Pose landmark extraction from calibration photos.

use std::{collections::BTreeMap, sync::Arc};

use image::RgbImage;
use rayon::prelude::*;

use crate::body::PoseLandmarkSet;
use crate::pose::PoseKind;
use crate::{Error, Result};

/// A single-image body pose estimator.
///
/// Implementations must be usable from several threads at once, since the calibration photos of
/// one request are processed in parallel.
pub trait PoseEstimator: Send + Sync {
    /// Estimates the pose landmarks of the most prominent body in `image`.
    ///
    /// Returns `Ok(None)` if no body was detected.
    fn estimate(&self, image: &RgbImage) -> Result<Option<PoseLandmarkSet>>;
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for &E {
    fn estimate(&self, image: &RgbImage) -> Result<Option<PoseLandmarkSet>> {
        (**self).estimate(image)
    }
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for Box<E> {
    fn estimate(&self, image: &RgbImage) -> Result<Option<PoseLandmarkSet>> {
        (**self).estimate(image)
    }
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for Arc<E> {
    fn estimate(&self, image: &RgbImage) -> Result<Option<PoseLandmarkSet>> {
        (**self).estimate(image)
    }
}

/// Landmarks detected in one photo, together with the size of that photo.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseObservation {
    pub landmarks: PoseLandmarkSet,
    pub image_width: u32,
    pub image_height: u32,
}

/// Successful observations, keyed by pose. Poses without a detected body are absent.
pub type PoseObservations = BTreeMap<PoseKind, PoseObservation>;

/// Runs a [`PoseEstimator`] on labeled calibration photos.
pub struct PoseLandmarkExtractor {
    estimator: Box<dyn PoseEstimator>,
}

impl PoseLandmarkExtractor {
    pub fn new<E: PoseEstimator + 'static>(estimator: E) -> Self {
        Self {
            estimator: Box::new(estimator),
        }
    }

    /// Extracts the landmarks from a single photo.
    ///
    /// Detection failures and estimator errors are logged and reported as [`None`]; callers treat
    /// both as missing data for `pose`.
    pub fn extract(&self, photo: &RgbImage, pose: PoseKind) -> Option<PoseObservation> {
        match self.estimator.estimate(photo) {
            Ok(Some(landmarks)) => {
                log::debug!("analyzed {pose} pose");
                Some(PoseObservation {
                    landmarks,
                    image_width: photo.width(),
                    image_height: photo.height(),
                })
            }
            Ok(None) => {
                log::warn!("{}", Error::DetectionFailure { pose });
                None
            }
            Err(e) => {
                log::error!("error analyzing {pose} pose: {e}");
                None
            }
        }
    }

    /// Extracts the landmarks from all `photos` in parallel.
    pub fn extract_all(&self, photos: &BTreeMap<PoseKind, RgbImage>) -> PoseObservations {
        photos
            .par_iter()
            .filter_map(|(&pose, photo)| Some((pose, self.extract(photo, pose)?)))
            .collect()
    }
}
