//! Path tracer scene bake
//!
//! Converts a scene into three structured buffers the path tracer compute
//! pass reads: primitives, the flattened BVH over them, and materials.
//! The bake is all-or-nothing; any scene change invalidates it and the next
//! [`PathTracer::update`] rebuilds everything.

mod bvh;
mod geometry;
mod traversal;

pub use bvh::*;
pub use geometry::*;
pub use traversal::*;

use std::sync::Arc;
use std::time::Instant;

use bytemuck::Pod;
use glam::{Mat3, Mat4, Vec2, Vec3};

use crate::backend::*;
use crate::resources::Material;
use crate::scene::{Scene, SceneLight};

/// Radius of the sphere standing in for an infinite light
pub const INFINITE_LIGHT_RADIUS: f32 = 1000.0;

/// When the path tracer runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathTracerMode {
    #[default]
    None,
    /// Accumulate every frame
    Interactive,
    /// Render tile by tile until the image is done
    Tiled,
}

#[derive(Debug, Clone, Default)]
pub struct PathTracerConfig {
    pub mode: PathTracerMode,
}

/// One mesh in world space, as the bake consumes it
#[derive(Debug, Clone, Default)]
pub struct PathTracerMesh {
    pub positions: Vec<Vec3>,
    /// May be shorter than `positions`; missing or zero normals fall back to the face normal
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    pub transform: Mat4,
    pub material: usize,
}

/// Everything the bake reads
#[derive(Debug, Clone, Default)]
pub struct PathTracerScene {
    pub meshes: Vec<PathTracerMesh>,
    pub materials: Vec<Material>,
    pub lights: Vec<SceneLight>,
}

impl PathTracerScene {
    pub fn from_scene(scene: &Scene) -> Self {
        let meshes = scene
            .instances()
            .iter()
            .filter_map(|instance| {
                let mesh = scene.meshes().get(instance.mesh)?;
                Some(PathTracerMesh {
                    positions: mesh.vertices.iter().map(|v| v.position).collect(),
                    normals: mesh.vertices.iter().map(|v| v.normal).collect(),
                    uvs: mesh.vertices.iter().map(|v| v.uv).collect(),
                    indices: mesh.indices.clone(),
                    transform: instance.transform,
                    material: instance.material,
                })
            })
            .collect();

        Self {
            meshes,
            materials: scene.materials().to_vec(),
            lights: scene.lights().to_vec(),
        }
    }

    /// Flatten into primitives and their materials
    pub fn primitives(&self) -> (Vec<GpuGeometry>, Vec<GpuMaterial>) {
        let mut geometry = Vec::new();
        let mut materials: Vec<GpuMaterial> =
            self.materials.iter().map(GpuMaterial::from).collect();

        for mesh in &self.meshes {
            let normal_matrix = Mat3::from_mat4(mesh.transform).inverse().transpose();
            let material_id = mesh.material as i32;

            for corners in mesh.indices.chunks_exact(3) {
                let Some(positions) = corners
                    .iter()
                    .map(|&i| {
                        let position = mesh.positions.get(i as usize)?;
                        Some(mesh.transform.transform_point3(*position))
                    })
                    .collect::<Option<Vec<_>>>()
                else {
                    log::warn!("Skipping triangle with out of range index in path tracer bake");
                    continue;
                };

                let mut triangle =
                    GpuGeometry::triangle(positions[0], positions[1], positions[2], material_id);
                let normal = |i: u32, flat: Vec3| {
                    mesh.normals
                        .get(i as usize)
                        .map(|&n| (normal_matrix * n).normalize_or_zero())
                        .filter(|n| *n != Vec3::ZERO)
                        .unwrap_or(flat)
                };
                let uv = |i: u32| mesh.uvs.get(i as usize).copied().unwrap_or(Vec2::ZERO);

                triangle.normal1 = normal(corners[0], triangle.normal1);
                triangle.normal2 = normal(corners[1], triangle.normal2);
                triangle.normal3 = normal(corners[2], triangle.normal3);
                triangle.uv1 = uv(corners[0]);
                triangle.uv2 = uv(corners[1]);
                triangle.uv3 = uv(corners[2]);
                geometry.push(triangle);
            }
        }

        for light in &self.lights {
            if let SceneLight::Infinite { direction, color, .. } = light {
                let center = 0.5 * INFINITE_LIGHT_RADIUS * direction.normalize_or_zero();
                materials.push(GpuMaterial::emitter(*color));
                geometry.push(GpuGeometry::sphere(
                    center,
                    INFINITE_LIGHT_RADIUS,
                    materials.len() as i32 - 1,
                ));
            }
        }

        (geometry, materials)
    }
}

/// GPU buffers of the current bake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTracerBuffers {
    pub geometry: BufferHandle,
    pub bvh: BufferHandle,
    pub material: BufferHandle,
    pub geometry_count: u32,
    pub node_count: u32,
    pub material_count: u32,
}

impl PathTracerBuffers {
    pub fn bind(&self, backend: &mut dyn GraphicsBackend) {
        backend.bind_structured_buffer(GEOMETRY_BUFFER_SLOT, self.geometry);
        backend.bind_structured_buffer(BVH_BUFFER_SLOT, self.bvh);
        backend.bind_structured_buffer(MATERIAL_BUFFER_SLOT, self.material);
    }

    pub fn unbind(&self, backend: &mut dyn GraphicsBackend) {
        backend.unbind_structured_buffer(GEOMETRY_BUFFER_SLOT);
        backend.unbind_structured_buffer(BVH_BUFFER_SLOT);
        backend.unbind_structured_buffer(MATERIAL_BUFFER_SLOT);
    }

    fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_buffer(self.geometry);
        backend.destroy_buffer(self.bvh);
        backend.destroy_buffer(self.material);
    }
}

/// Owns the baked buffers and decides when to rebuild them
#[derive(Debug, Default)]
pub struct PathTracer {
    config: PathTracerConfig,
    buffers: Option<PathTracerBuffers>,
    dirty: bool,
}

impl PathTracer {
    pub fn new(config: PathTracerConfig) -> Self {
        Self {
            config,
            buffers: None,
            dirty: true,
        }
    }

    pub fn mode(&self) -> PathTracerMode {
        self.config.mode
    }

    pub fn set_mode(&mut self, mode: PathTracerMode) {
        if self.config.mode != mode {
            self.config.mode = mode;
            self.dirty = true;
        }
    }

    /// Force a rebake on the next update
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// `None` until a bake produced at least one primitive
    pub fn buffers(&self) -> Option<&PathTracerBuffers> {
        self.buffers.as_ref()
    }

    /// Rebake if dirty and enabled; returns whether a bake happened
    pub fn update(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        scene: &PathTracerScene,
    ) -> BackendResult<bool> {
        if self.config.mode == PathTracerMode::None || !self.dirty {
            return Ok(false);
        }
        self.bake(backend, scene)?;
        Ok(true)
    }

    /// Rebuild the BVH and replace the structured buffers
    pub fn bake(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        scene: &PathTracerScene,
    ) -> BackendResult<()> {
        let start = Instant::now();

        if let Some(old) = self.buffers.take() {
            old.destroy(backend);
        }

        let (primitives, mut materials) = scene.primitives();
        let bvh = Bvh::build(&primitives);
        let build_time = start.elapsed();

        if bvh.is_empty() {
            log::info!("Path tracer bake: scene has no geometry");
            self.dirty = false;
            return Ok(());
        }
        if materials.is_empty() {
            materials.push(GpuMaterial::default());
        }

        let geometry = create_structured_buffer(
            backend,
            "pathtracer_geometry",
            GEOMETRY_BUFFER_SLOT,
            &bvh.geometry,
        )?;
        let nodes = match create_structured_buffer(
            backend,
            "pathtracer_bvh",
            BVH_BUFFER_SLOT,
            &bvh.nodes,
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                backend.destroy_buffer(geometry);
                return Err(err);
            }
        };
        let material = match create_structured_buffer(
            backend,
            "pathtracer_material",
            MATERIAL_BUFFER_SLOT,
            &materials,
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                backend.destroy_buffer(geometry);
                backend.destroy_buffer(nodes);
                return Err(err);
            }
        };

        self.buffers = Some(PathTracerBuffers {
            geometry,
            bvh: nodes,
            material,
            geometry_count: bvh.geometry.len() as u32,
            node_count: bvh.node_count() as u32,
            material_count: materials.len() as u32,
        });
        self.dirty = false;

        log::info!(
            "Path tracer bake: {} primitives, {} nodes, {} materials (bvh {:.2?}, total {:.2?})",
            bvh.geometry.len(),
            bvh.node_count(),
            materials.len(),
            build_time,
            start.elapsed()
        );
        Ok(())
    }

    pub fn bind(&self, backend: &mut dyn GraphicsBackend) {
        if let Some(buffers) = &self.buffers {
            buffers.bind(backend);
        }
    }

    pub fn unbind(&self, backend: &mut dyn GraphicsBackend) {
        if let Some(buffers) = &self.buffers {
            buffers.unbind(backend);
        }
    }

    pub fn destroy(mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(buffers) = self.buffers.take() {
            buffers.destroy(backend);
        }
    }
}

fn create_structured_buffer<T: Pod>(
    backend: &mut dyn GraphicsBackend,
    label: &str,
    slot: u32,
    items: &[T],
) -> BackendResult<BufferHandle> {
    backend.create_structured_buffer(&GpuBufferDesc {
        label: Some(label.to_string()),
        buffer_type: GpuBufferType::Structured,
        dynamic: false,
        slot,
        element_size: std::mem::size_of::<T>() as u32,
        element_count: items.len() as u32,
        offset: 0,
        initial_data: Some(Arc::from(bytemuck::cast_slice::<T, u8>(items))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Mesh;
    use crate::scene::MeshInstance;

    fn quad_scene() -> PathTracerScene {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Mesh::quad());
        let material = scene.add_material(Material::plastic(Vec3::ONE));
        scene.add_instance(
            MeshInstance::new(mesh, material).with_transform(Mat4::from_translation(Vec3::Z)),
        );
        scene.add_light(SceneLight::infinite(Vec3::new(0.0, 2.0, 0.0), Vec3::splat(3.0)));
        PathTracerScene::from_scene(&scene)
    }

    #[test]
    fn test_primitives_include_light_sphere() {
        let (geometry, materials) = quad_scene().primitives();
        assert_eq!(geometry.len(), 3);
        assert_eq!(materials.len(), 2);

        let sun = geometry[2];
        assert_eq!(sun.kind(), GeometryKind::Sphere);
        assert_eq!(sun.radius, INFINITE_LIGHT_RADIUS);
        assert_eq!(sun.a, Vec3::new(0.0, 500.0, 0.0));
        assert_eq!(sun.material_id, 1);
        assert_eq!(materials[1].emissive, Vec3::splat(3.0));

        assert_eq!(geometry[0].a.z, 1.0);
        assert_eq!(geometry[0].material_id, 0);
    }

    #[test]
    fn test_missing_normals_use_face_normal() {
        let scene = PathTracerScene {
            meshes: vec![PathTracerMesh {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                normals: vec![Vec3::ZERO],
                indices: vec![0, 1, 2],
                transform: Mat4::IDENTITY,
                ..Default::default()
            }],
            ..Default::default()
        };
        let (geometry, _) = scene.primitives();
        assert_eq!(geometry[0].normal1, Vec3::Z);
        assert_eq!(geometry[0].normal2, Vec3::Z);
        assert_eq!(geometry[0].uv3, Vec2::ZERO);
    }

    #[test]
    fn test_update_bakes_once_until_invalidated() {
        let mut backend = RecordingBackend::new();
        let scene = quad_scene();
        let mut tracer = PathTracer::new(PathTracerConfig::default());

        assert!(!tracer.update(&mut backend, &scene).unwrap());
        assert!(tracer.buffers().is_none());

        tracer.set_mode(PathTracerMode::Interactive);
        assert!(tracer.update(&mut backend, &scene).unwrap());
        assert!(!tracer.update(&mut backend, &scene).unwrap());

        let buffers = *tracer.buffers().unwrap();
        assert_eq!(buffers.geometry_count, 3);
        assert_eq!(buffers.node_count, 5);
        let bytes = backend.buffer_contents(buffers.bvh).unwrap();
        assert_eq!(bytes.len(), 5 * std::mem::size_of::<GpuBvhNode>());
        assert_eq!(backend.live_buffer_count(), 3);

        tracer.invalidate();
        assert!(tracer.update(&mut backend, &scene).unwrap());
        assert_eq!(backend.live_buffer_count(), 3);

        tracer.destroy(&mut backend);
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_bind_uses_fixed_slots() {
        let mut backend = RecordingBackend::new();
        let mut tracer = PathTracer::new(PathTracerConfig {
            mode: PathTracerMode::Tiled,
        });
        tracer.bake(&mut backend, &quad_scene()).unwrap();
        backend.take_commands();

        tracer.bind(&mut backend);
        let slots: Vec<u32> = backend
            .commands()
            .iter()
            .filter_map(|command| match command {
                BackendCommand::BindStructuredBuffer { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![21, 22, 23]);
    }

    #[test]
    fn test_failed_upload_releases_partial_buffers() {
        let mut backend = RecordingBackend::new();
        backend.fail_creation_of("pathtracer_material");
        let mut tracer = PathTracer::new(PathTracerConfig::default());

        let err = tracer.bake(&mut backend, &quad_scene()).unwrap_err();
        assert!(matches!(err, BackendError::StructuredBufferCreationFailed(_)));
        assert!(tracer.buffers().is_none());
        assert_eq!(backend.live_buffer_count(), 0);
    }
}
