//! The four calibration poses.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which way the user faces in a calibration photo.
///
/// The derived ordering is the canonical photo order (front, left, right, back). Per-photo timer
/// durations are paired with poses in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseKind {
    Front,
    Left,
    Right,
    Back,
}

impl PoseKind {
    pub const ALL: [Self; 4] = [Self::Front, Self::Left, Self::Right, Self::Back];

    /// Position of this pose in the canonical photo order.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Left => "left",
            Self::Right => "right",
            Self::Back => "back",
        }
    }
}

impl fmt::Display for PoseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoseKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|pose| pose.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unknown pose '{s}'")))
    }
}
