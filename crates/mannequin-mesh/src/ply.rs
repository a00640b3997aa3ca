//! Binary PLY mesh output.

use std::io::{self, Write};

use crate::mesh::Mesh;

/// Writes `mesh` as a binary little-endian PLY file.
///
/// Vertex positions are written as-is, so the caller decides on the unit. Faces are written as
/// triangle lists with `uchar` counts and `int` indices, which is what most viewers expect.
pub fn write_ply<W: Write>(mesh: &Mesh, mut writer: W) -> io::Result<()> {
    write!(
        writer,
        "ply\n\
         format binary_little_endian 1.0\n\
         comment generated by mannequin-mesh\n\
         element vertex {}\n\
         property float x\n\
         property float y\n\
         property float z\n\
         element face {}\n\
         property list uchar int vertex_indices\n\
         end_header\n",
        mesh.vertex_count(),
        mesh.face_count(),
    )?;

    let mut buf = Vec::with_capacity(mesh.vertex_count() * 12 + mesh.face_count() * 13);
    for v in mesh.vertices() {
        for c in [v.x, v.y, v.z] {
            buf.extend_from_slice(&c.to_le_bytes());
        }
    }
    for face in mesh.faces() {
        buf.push(3);
        for &i in face {
            buf.extend_from_slice(&(i as i32).to_le_bytes());
        }
    }
    writer.write_all(&buf)?;
    writer.flush()
}
