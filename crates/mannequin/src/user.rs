//! Self-reported user data.

use std::{fmt, ops::RangeInclusive, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Accepted user heights, in centimetres.
pub const HEIGHT_RANGE_CM: RangeInclusive<f32> = 120.0..=220.0;
/// Accepted user weights, in kilograms.
pub const WEIGHT_RANGE_KG: RangeInclusive<f32> = 30.0..=200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Self; 2] = [Self::Male, Self::Female];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            _ => Err(Error::validation(format!(
                "gender must be 'male' or 'female', got '{s}'"
            ))),
        }
    }
}

/// Validated height, weight and gender of a user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UserMeasurements {
    height_cm: f32,
    weight_kg: f32,
    gender: Gender,
}

impl UserMeasurements {
    /// Creates a new set of user measurements.
    ///
    /// Returns [`Error::Validation`] if the height is outside of [`HEIGHT_RANGE_CM`] or the weight
    /// is outside of [`WEIGHT_RANGE_KG`].
    pub fn new(height_cm: f32, weight_kg: f32, gender: Gender) -> Result<Self> {
        if !HEIGHT_RANGE_CM.contains(&height_cm) {
            return Err(Error::validation(format!(
                "height must be between {} and {} cm, got {height_cm}",
                HEIGHT_RANGE_CM.start(),
                HEIGHT_RANGE_CM.end(),
            )));
        }
        if !WEIGHT_RANGE_KG.contains(&weight_kg) {
            return Err(Error::validation(format!(
                "weight must be between {} and {} kg, got {weight_kg}",
                WEIGHT_RANGE_KG.start(),
                WEIGHT_RANGE_KG.end(),
            )));
        }
        Ok(Self {
            height_cm,
            weight_kg,
            gender,
        })
    }

    #[inline]
    pub fn height_cm(&self) -> f32 {
        self.height_cm
    }

    #[inline]
    pub fn weight_kg(&self) -> f32 {
        self.weight_kg
    }

    #[inline]
    pub fn gender(&self) -> Gender {
        self.gender
    }

    /// Body mass index, `weight / height²` with height in metres.
    pub fn bmi(&self) -> f32 {
        bmi(self.height_cm, self.weight_kg)
    }
}

/// Computes the body mass index from a height in centimetres and a weight in kilograms.
pub fn bmi(height_cm: f32, weight_kg: f32) -> f32 {
    let height_m = height_cm / 100.0;
    weight_kg / (height_m * height_m)
}
