//! A procedural humanoid used as the built-in body model.
//!
//! The body is assembled from elliptical tubes (trunk with neck and head, two legs, two arms)
//! whose ring centers and radii are affine functions of a small set of [`Proportions`]. That
//! makes the resulting vertex positions affine in the proportions as well, which is what lets
//! [`BodyModel::procedural`] express shape changes as exact linear blend shapes.
//!
//! [`BodyModel::procedural`]: crate::BodyModel::procedural

use std::f32::consts::TAU;

use nalgebra::{Point3, Vector3};

use crate::mesh::Face;
use crate::model::NUM_BETAS;

/// Number of vertices around every tube ring.
const RING_SEGMENTS: u32 = 16;

/// Abduction of the arms away from the trunk, in degrees.
const ARM_ANGLE_DEG: f32 = 15.0;

macro_rules! proportions {
    ( $( $(#[$attr:meta])* $field:ident, )* ) => {
        /// Body proportions, in metres.
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct Proportions {
            $( $(#[$attr])* pub $field: f32, )*
        }

        impl Proportions {
            pub const ZERO: Self = Self { $( $field: 0.0, )* };

            /// Adds `other * k` to every field.
            pub fn add_scaled(&mut self, other: &Self, k: f32) {
                $( self.$field += other.$field * k; )*
            }
        }
    };
}

proportions! {
    /// Sole to ankle.
    foot_height,
    /// Ankle to knee.
    shin,
    /// Knee to hip joint.
    thigh,
    /// Hip joint to shoulder line.
    torso,
    neck,
    /// Neck top to crown.
    head,
    /// Shoulder to fingertips.
    arm_length,
    shoulder_half_width,
    hip_half_width,
    torso_half_depth,
    neck_radius,
    head_radius,
    thigh_radius,
    calf_radius,
    upper_arm_radius,
    forearm_radius,
}

/// Base proportions plus one displacement per shape parameter.
#[derive(Debug, Clone)]
pub struct Physique {
    pub base: Proportions,
    pub deltas: [Proportions; NUM_BETAS],
}

impl Physique {
    pub fn male() -> Self {
        Self::from_base(Proportions {
            foot_height: 0.08,
            shin: 0.43,
            thigh: 0.42,
            torso: 0.52,
            neck: 0.09,
            head: 0.23,
            arm_length: 0.75,
            shoulder_half_width: 0.20,
            hip_half_width: 0.17,
            torso_half_depth: 0.11,
            neck_radius: 0.06,
            head_radius: 0.095,
            thigh_radius: 0.085,
            calf_radius: 0.055,
            upper_arm_radius: 0.045,
            forearm_radius: 0.035,
        })
    }

    pub fn female() -> Self {
        Self::from_base(Proportions {
            foot_height: 0.075,
            shin: 0.40,
            thigh: 0.39,
            torso: 0.48,
            neck: 0.08,
            head: 0.21,
            arm_length: 0.69,
            shoulder_half_width: 0.18,
            hip_half_width: 0.19,
            torso_half_depth: 0.10,
            neck_radius: 0.05,
            head_radius: 0.09,
            thigh_radius: 0.09,
            calf_radius: 0.052,
            upper_arm_radius: 0.04,
            forearm_radius: 0.03,
        })
    }

    fn from_base(base: Proportions) -> Self {
        let z = Proportions::ZERO;
        let b = &base;

        // 0: overall size. Every girth grows by 12% per unit, with a slight gain in height.
        let size = Proportions {
            thigh: 0.005,
            torso: 0.005,
            shoulder_half_width: 0.12 * b.shoulder_half_width,
            hip_half_width: 0.12 * b.hip_half_width,
            torso_half_depth: 0.12 * b.torso_half_depth,
            neck_radius: 0.12 * b.neck_radius,
            thigh_radius: 0.12 * b.thigh_radius,
            calf_radius: 0.12 * b.calf_radius,
            upper_arm_radius: 0.12 * b.upper_arm_radius,
            forearm_radius: 0.12 * b.forearm_radius,
            ..z
        };
        // 1: height.
        let height = Proportions {
            shin: 0.015,
            thigh: 0.015,
            torso: 0.01,
            neck: 0.003,
            head: 0.003,
            arm_length: 0.02,
            ..z
        };
        // 2: torso length, mostly at the expense of the legs.
        let torso = Proportions {
            torso: 0.025,
            thigh: -0.01,
            shin: -0.005,
            ..z
        };
        // 3: upper vs. lower body.
        let proportion = Proportions {
            shoulder_half_width: 0.015,
            hip_half_width: -0.012,
            thigh_radius: -0.005,
            upper_arm_radius: 0.004,
            ..z
        };

        Self {
            base,
            deltas: [
                size,
                height,
                torso,
                proportion,
                Proportions {
                    arm_length: 0.02,
                    ..z
                },
                Proportions {
                    head: 0.01,
                    head_radius: 0.006,
                    ..z
                },
                Proportions {
                    neck: 0.01,
                    neck_radius: 0.004,
                    ..z
                },
                Proportions {
                    torso_half_depth: 0.01,
                    ..z
                },
                Proportions {
                    thigh_radius: 0.007,
                    ..z
                },
                Proportions {
                    calf_radius: 0.005,
                    ..z
                },
            ],
        }
    }
}

#[derive(Clone, Copy)]
struct Ring {
    center: Point3<f32>,
    /// Half-extent along X.
    rx: f32,
    /// Half-extent along Y.
    ry: f32,
}

impl Ring {
    fn round(center: Point3<f32>, r: f32) -> Self {
        Self { center, rx: r, ry: r }
    }
}

#[derive(Default)]
struct Builder {
    vertices: Vec<Point3<f32>>,
    faces: Vec<Face>,
}

impl Builder {
    fn push(&mut self, p: Point3<f32>) -> u32 {
        self.vertices.push(p);
        (self.vertices.len() - 1) as u32
    }

    /// Adds a closed tube through `rings`, with flat caps at both ends.
    fn tube(&mut self, rings: &[Ring]) {
        let (Some(first), Some(last)) = (rings.first(), rings.last()) else {
            return;
        };
        let first_ring = self.vertices.len() as u32;
        for ring in rings {
            for s in 0..RING_SEGMENTS {
                let angle = s as f32 / RING_SEGMENTS as f32 * TAU;
                let (sin, cos) = angle.sin_cos();
                self.push(ring.center + Vector3::new(ring.rx * cos, ring.ry * sin, 0.0));
            }
        }

        let index = |ring: u32, seg: u32| first_ring + ring * RING_SEGMENTS + seg % RING_SEGMENTS;
        for r in 0..rings.len() as u32 - 1 {
            for s in 0..RING_SEGMENTS {
                let (a, b) = (index(r, s), index(r, s + 1));
                let (c, d) = (index(r + 1, s), index(r + 1, s + 1));
                self.faces.push([a, b, d]);
                self.faces.push([a, d, c]);
            }
        }

        let bottom = self.push(first.center);
        let top = self.push(last.center);
        let last_ring = rings.len() as u32 - 1;
        for s in 0..RING_SEGMENTS {
            self.faces.push([bottom, index(0, s + 1), index(0, s)]);
            self.faces.push([top, index(last_ring, s), index(last_ring, s + 1)]);
        }
    }
}

/// Builds the body's vertices and faces. The face list depends only on the ring layout, never on
/// `p`.
pub(crate) fn build(p: &Proportions) -> (Vec<Point3<f32>>, Vec<Face>) {
    let mut builder = Builder::default();

    let z_knee = p.foot_height + p.shin;
    let z_hip = z_knee + p.thigh;
    let z_shoulder = z_hip + p.torso;
    let z_neck = z_shoulder + p.neck;
    let z_crown = z_neck + p.head;
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let at = |x: f32, z: f32| Point3::new(x, 0.0, z);

    // Trunk, neck and head.
    builder.tube(&[
        Ring {
            center: at(0.0, z_hip),
            rx: p.hip_half_width,
            ry: p.torso_half_depth,
        },
        Ring {
            center: at(0.0, z_hip + 0.4 * p.torso),
            rx: 0.85 * lerp(p.hip_half_width, p.shoulder_half_width, 0.4),
            ry: 0.9 * p.torso_half_depth,
        },
        Ring {
            center: at(0.0, z_hip + 0.75 * p.torso),
            rx: lerp(p.hip_half_width, p.shoulder_half_width, 0.75),
            ry: 1.05 * p.torso_half_depth,
        },
        Ring {
            center: at(0.0, z_shoulder),
            rx: p.shoulder_half_width,
            ry: 0.8 * p.torso_half_depth,
        },
        Ring::round(at(0.0, z_shoulder + 0.1 * p.neck), p.neck_radius),
        Ring::round(at(0.0, z_neck), p.neck_radius),
        Ring::round(at(0.0, z_neck + 0.15 * p.head), 0.75 * p.head_radius),
        Ring::round(at(0.0, z_neck + 0.45 * p.head), p.head_radius),
        Ring::round(at(0.0, z_neck + 0.75 * p.head), 0.9 * p.head_radius),
        Ring::round(at(0.0, z_neck + 0.92 * p.head), 0.55 * p.head_radius),
        Ring::round(at(0.0, z_crown), 0.1 * p.head_radius),
    ]);

    // Legs, from the sole up to the hip joint.
    for side in [-1.0, 1.0] {
        let x = side * 0.55 * p.hip_half_width;
        builder.tube(&[
            Ring {
                center: at(x, 0.0),
                rx: 0.8 * p.calf_radius,
                ry: 1.2 * p.calf_radius,
            },
            Ring::round(at(x, p.foot_height), 0.7 * p.calf_radius),
            Ring::round(at(x, p.foot_height + 0.6 * p.shin), p.calf_radius),
            Ring::round(at(x, z_knee), 0.95 * p.calf_radius),
            Ring::round(at(x, z_knee + 0.5 * p.thigh), 0.9 * p.thigh_radius),
            Ring::round(at(x, z_hip), p.thigh_radius),
        ]);
    }

    // Arms hang slightly away from the trunk.
    let (sin, cos) = ARM_ANGLE_DEG.to_radians().sin_cos();
    for side in [-1.0, 1.0] {
        let shoulder = at(side * p.shoulder_half_width, z_shoulder - 0.03);
        let along = |t: f32| shoulder + Vector3::new(side * sin, 0.0, -cos) * (t * p.arm_length);
        builder.tube(&[
            Ring::round(along(0.0), p.upper_arm_radius),
            Ring::round(along(0.4), 0.85 * p.upper_arm_radius),
            Ring::round(along(0.45), p.forearm_radius),
            Ring::round(along(0.8), 0.8 * p.forearm_radius),
            Ring::round(along(1.0), 0.7 * p.forearm_radius),
        ]);
    }

    (builder.vertices, builder.faces)
}
