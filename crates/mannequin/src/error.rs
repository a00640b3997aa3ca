//! Library error type.

use std::io;

use crate::pose::PoseKind;
use crate::user::Gender;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// User-supplied data is out of range or malformed. Reported before any other work is done.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The pose model found no body in a photo.
    #[error("no body detected in {pose} photo")]
    DetectionFailure { pose: PoseKind },

    /// The catalog has no entries for the requested gender (or no metadata at all).
    #[error("no suitable mannequin: catalog has no {gender} entries")]
    CatalogMissing { gender: Gender },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Loading or running a model failed.
    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
