//! Mannequin catalog generation and photo-assisted body matching.
//!
//! The crate is organized leaf-first:
//!
//! - [`catalog`] generates and maintains the precomputed mannequin catalog (meshes + metadata).
//! - [`body`] and [`extract`] run the pose landmark model on calibration photos.
//! - [`analysis`] turns landmark sets into body-shape ratios and a confidence score.
//! - [`timer`] rescales those scores using self-timer metadata and rates how well the timer worked.
//! - [`selector`] picks the closest catalog entry for a user.
//! - [`pipeline`] strings everything together for a single analysis request.
//!
//! # Coordinates
//!
//! Landmarks are reported in source image pixels, with Y pointing *down*. Meshes are Z-up (see
//! [`mannequin_mesh`]).

pub mod analysis;
pub mod body;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod landmark;
pub mod nn;
pub mod num;
pub mod photo;
pub mod pipeline;
pub mod pose;
pub mod selector;
pub mod timer;
pub mod user;


pub use error::{Error, Result};

use log::LevelFilter;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("mannequin_mesh"), log_level)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .filter(Some("tract_core"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this library will log at *trace*
/// level. Otherwise, they will log at *debug* level. Everything else logs at *info*, except for
/// `tract`, which logs at *warn*. `RUST_LOG` overrides all of this.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
