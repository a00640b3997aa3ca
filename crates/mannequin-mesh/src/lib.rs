//! Body mesh geometry for the mannequin catalog.
//!
//! # Coordinates
//!
//! Meshes use a right-handed, Z-up coordinate system: X points to the body's left when seen from
//! the front, Y points towards the back, Z points up. Body models are authored in metres and
//! rest on the `z = 0` plane.

pub mod mesh;
pub mod model;
pub mod ply;
mod procedural;

pub use mesh::{Bounds, Face, Mesh};
pub use model::{Betas, BodyModel, NUM_BETAS};
pub use ply::write_ply;
pub use procedural::{Physique, Proportions};
