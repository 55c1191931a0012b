//! CPU-side triangle meshes
//!
//! The rasterizer draws meshes through [`MeshHandle`]s owned by the asset
//! layer; the path tracer needs the triangles themselves, so scenes keep a
//! [`Mesh`] next to each handle.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::backend::MeshHandle;
use crate::path_tracer::Aabb;

/// Interleaved vertex as uploaded to vertex buffers
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

/// A mesh with vertex and index data
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// GPU copy, when the asset layer uploaded one
    pub handle: Option<MeshHandle>,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Triangles as vertex triples. Triangles with out-of-range indices are skipped.
    pub fn triangles(&self) -> impl Iterator<Item = [Vertex; 3]> + '_ {
        self.indices.chunks_exact(3).filter_map(|tri| {
            Some([
                *self.vertices.get(tri[0] as usize)?,
                *self.vertices.get(tri[1] as usize)?,
                *self.vertices.get(tri[2] as usize)?,
            ])
        })
    }

    pub fn bounds(&self) -> Aabb {
        self.vertices
            .iter()
            .fold(Aabb::EMPTY, |bounds, vertex| bounds.grow(vertex.position))
    }

    /// Unit quad in the XY plane facing +Z, two triangles
    pub fn quad() -> Self {
        let mut mesh = Mesh::new("quad");
        let corners = [
            (Vec3::new(-0.5, -0.5, 0.0), Vec2::new(0.0, 1.0)),
            (Vec3::new(0.5, -0.5, 0.0), Vec2::new(1.0, 1.0)),
            (Vec3::new(0.5, 0.5, 0.0), Vec2::new(1.0, 0.0)),
            (Vec3::new(-0.5, 0.5, 0.0), Vec2::new(0.0, 0.0)),
        ];
        for (position, uv) in corners {
            mesh.vertices.push(Vertex {
                position,
                normal: Vec3::Z,
                uv,
            });
        }
        mesh.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);
        mesh
    }

    /// Unit cube centered at origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");

        for normal in [Vec3::Z, -Vec3::Z, Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y] {
            // right-handed face basis: u x v == normal
            let u = if normal.y.abs() > 0.5 { Vec3::X } else { Vec3::Y.cross(normal) };
            let v = normal.cross(u);
            let center = normal * 0.5;

            let base = mesh.vertices.len() as u32;
            for (du, dv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                mesh.vertices.push(Vertex {
                    position: center + u * du + v * dv,
                    normal,
                    uv: Vec2::new(du + 0.5, 0.5 - dv),
                });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// Plane on the XZ axis facing +Y
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let mut mesh = Mesh::new("plane");
        let subdivisions = subdivisions.max(1);

        let step_x = width / subdivisions as f32;
        let step_z = depth / subdivisions as f32;

        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                mesh.vertices.push(Vertex {
                    position: Vec3::new(
                        -width / 2.0 + x as f32 * step_x,
                        0.0,
                        -depth / 2.0 + z as f32 * step_z,
                    ),
                    normal: Vec3::Y,
                    uv: Vec2::new(x as f32 / subdivisions as f32, z as f32 / subdivisions as f32),
                });
            }
        }

        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let current = z * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;
                mesh.indices
                    .extend_from_slice(&[current, next, current + 1, current + 1, next, next + 1]);
            }
        }

        mesh
    }

    /// UV sphere of diameter one
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let mut mesh = Mesh::new("sphere");

        let segment_angle = std::f32::consts::TAU / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                mesh.vertices.push(Vertex {
                    position: normal * 0.5,
                    normal,
                    uv: Vec2::new(segment as f32 / segments as f32, ring as f32 / rings as f32),
                });
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;
                mesh.indices
                    .extend_from_slice(&[current, next, current + 1, current + 1, next, next + 1]);
            }
        }

        mesh
    }
}
