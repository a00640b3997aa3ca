//! Photo decoding and preprocessing.

use std::{collections::BTreeMap, path::Path};

use image::{imageops, RgbImage};

use crate::pose::PoseKind;
use crate::Result;

/// Default limit for the longest side of a prepared photo, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];
/// Weight of the sharpened image when blending it with the original.
const SHARPEN_WEIGHT: f32 = 0.7;
const STABILIZE_SIGMA: f32 = 0.5;

/// One calibration photo per pose.
pub type PosePhotos = BTreeMap<PoseKind, RgbImage>;

/// Decodes an encoded (JPEG or PNG) photo into RGB pixels.
pub fn decode(bytes: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Loads a photo from disk.
pub fn load<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// Shrinks `image` so that its longest side is at most `max_dimension`, keeping the aspect ratio.
///
/// Images that are already small enough are returned unchanged.
pub fn downscale(image: RgbImage, max_dimension: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if longest <= max_dimension {
        return image;
    }

    let scale = max_dimension as f32 / longest as f32;
    let new_w = ((w as f32 * scale) as u32).max(1);
    let new_h = ((h as f32 * scale) as u32).max(1);
    log::trace!("downscaling photo from {w}x{h} to {new_w}x{new_h}");
    imageops::resize(&image, new_w, new_h, imageops::FilterType::Triangle)
}

/// Filter applied to a photo depending on how long the self-timer was.
///
/// A long timer gives the user time to hold still, so fine detail is worth enhancing. A short one
/// likely means motion blur, which is smoothed out slightly instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFilter {
    Sharpen,
    Stabilize,
    None,
}

impl TimerFilter {
    pub fn for_average_timer(average_timer: f32) -> Self {
        if average_timer >= 8.0 {
            Self::Sharpen
        } else if average_timer <= 5.0 {
            Self::Stabilize
        } else {
            Self::None
        }
    }

    pub fn apply(self, image: RgbImage) -> RgbImage {
        match self {
            Self::Sharpen => sharpen(&image),
            Self::Stabilize => imageops::blur(&image, STABILIZE_SIGMA),
            Self::None => image,
        }
    }
}

fn sharpen(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let mut sharpened: RgbImage = imageops::filter3x3(image, &SHARPEN_KERNEL);
    for (x, y, px) in sharpened.enumerate_pixels_mut() {
        let orig = image.get_pixel(x, y);
        // `filter3x3` leaves the outermost pixels unset.
        if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
            *px = *orig;
            continue;
        }
        for (s, &o) in px.0.iter_mut().zip(&orig.0) {
            let blended = SHARPEN_WEIGHT * *s as f32 + (1.0 - SHARPEN_WEIGHT) * o as f32;
            *s = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    sharpened
}

/// Downscales a photo and applies the [`TimerFilter`] for `average_timer`.
pub fn prepare(image: RgbImage, max_dimension: u32, average_timer: f32) -> RgbImage {
    let image = downscale(image, max_dimension);
    TimerFilter::for_average_timer(average_timer).apply(image)
}
