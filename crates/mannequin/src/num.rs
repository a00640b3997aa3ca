//! Utilities for numerics.

/// Applies the standard sigmoid/logistic function to the input.
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Clamps `v` to `[min, max]`, mapping NaN to `min`.
///
/// `f32::clamp` passes NaN through unchanged, which would escape every range check downstream.
pub fn clamp(v: f32, min: f32, max: f32) -> f32 {
    if v.is_nan() {
        min
    } else {
        v.clamp(min, max)
    }
}

/// Clamps `v` to the unit interval `[0, 1]`.
#[inline]
pub fn clamp01(v: f32) -> f32 {
    clamp(v, 0.0, 1.0)
}

/// Rounds `v` to `decimals` decimal places.
pub fn round_to(v: f32, decimals: i32) -> f32 {
    let factor = 10f64.powi(decimals);
    ((v as f64 * factor).round() / factor) as f32
}

/// Returns the arithmetic mean of `values`, or [`None`] if there are none.
pub fn mean<I>(values: I) -> Option<f32>
where
    I: IntoIterator<Item = f32>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f32)
}
