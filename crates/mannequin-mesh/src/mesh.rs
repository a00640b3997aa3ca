//! Triangle meshes with a shared, fixed topology.

use std::sync::Arc;

use nalgebra::{Point3, Vector3};

/// A face, as three indices into the vertex list (counter-clockwise when viewed from outside).
pub type Face = [u32; 3];

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Bounds {
    /// Returns the extent of the box along each axis.
    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }
}

/// A triangle mesh.
///
/// All meshes evaluated from the same body model share one face list, so cloning a [`Mesh`] or
/// evaluating many shapes only duplicates vertex data.
#[derive(Debug, Clone)]
pub struct Mesh {
    vertices: Vec<Point3<f32>>,
    faces: Arc<[Face]>,
}

impl Mesh {
    /// Creates a mesh from vertex positions and a face list.
    ///
    /// # Panics
    ///
    /// Panics if any face refers to a vertex index that does not exist.
    pub fn new(vertices: Vec<Point3<f32>>, faces: Arc<[Face]>) -> Self {
        let len = vertices.len();
        assert!(
            faces.iter().flatten().all(|&i| (i as usize) < len),
            "mesh face refers to a vertex out of range (vertex count {len})"
        );
        Self { vertices, faces }
    }

    #[inline]
    pub fn vertices(&self) -> &[Point3<f32>] {
        &self.vertices
    }

    #[inline]
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Returns the shared face list.
    pub fn topology(&self) -> Arc<[Face]> {
        self.faces.clone()
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Computes the axis-aligned bounding box of all vertices.
    ///
    /// Returns [`None`] if the mesh has no vertices.
    pub fn bounds(&self) -> Option<Bounds> {
        let (first, rest) = self.vertices.split_first()?;
        let mut bounds = Bounds {
            min: *first,
            max: *first,
        };
        for v in rest {
            bounds.min = bounds.min.inf(v);
            bounds.max = bounds.max.sup(v);
        }
        Some(bounds)
    }

    /// Uniformly scales the mesh about the origin.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.vertices {
            v.coords *= factor;
        }
    }

    pub fn translate(&mut self, offset: Vector3<f32>) {
        for v in &mut self.vertices {
            *v += offset;
        }
    }

    /// Moves the mesh along Z so that its lowest vertex rests on the `z = 0` plane.
    pub fn place_on_ground(&mut self) {
        if let Some(bounds) = self.bounds() {
            self.translate(Vector3::new(0.0, 0.0, -bounds.min.z));
        }
    }

    /// Returns the extent of the mesh along the (vertical) Z axis, or 0 for an empty mesh.
    pub fn vertical_extent(&self) -> f32 {
        self.bounds().map_or(0.0, |b| b.size().z)
    }
}
