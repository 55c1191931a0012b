//! Scene management
//!
//! A [`Scene`] is plain data: meshes, materials, instances placing them,
//! lights, particle emitters and the force fields pushing their particles.
//! The renderer reads it twice per frame: once to extract [`RenderData`] for
//! the raster passes, and once (when it changed) to rebuild the path tracer
//! buffers.

mod camera;
mod light;
mod render_data;

pub use camera::*;
pub use light::*;
pub use render_data::*;

use glam::{Mat4, Vec3};

use crate::path_tracer::Aabb;
use crate::resources::{ForceField, Material, Mesh};

/// A mesh placed in the scene with a material
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    pub mesh: usize,
    pub material: usize,
    pub transform: Mat4,
    pub double_sided: bool,
    pub cast_shadow: bool,
    /// Outlined by the editor highlight pass
    pub selected: bool,
    /// Skinning palette, uploaded as one bone buffer element
    pub bones: Option<Vec<Mat4>>,
}

impl MeshInstance {
    pub fn new(mesh: usize, material: usize) -> Self {
        Self {
            mesh,
            material,
            transform: Mat4::IDENTITY,
            double_sided: false,
            cast_shadow: true,
            selected: false,
            bones: None,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_bones(mut self, bones: Vec<Mat4>) -> Self {
        self.bones = Some(bones);
        self
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }
}

/// GPU particle emitter
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleEmitter {
    pub position: Vec3,
    pub starting_velocity: Vec3,
    pub particles_per_frame: u32,
    pub max_particle_count: u32,
    /// Seconds each particle lives
    pub life_span: f32,
    pub scale: f32,
    pub gravity: bool,
}

impl Default for ParticleEmitter {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            starting_velocity: Vec3::ZERO,
            particles_per_frame: 10,
            max_particle_count: 1000,
            life_span: 3.0,
            scale: 0.01,
            gravity: false,
        }
    }
}

/// The scene containing all renderable content
#[derive(Debug, Clone, Default)]
pub struct Scene {
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    instances: Vec<MeshInstance>,
    lights: Vec<SceneLight>,
    emitters: Vec<ParticleEmitter>,
    force_fields: Vec<ForceField>,
    revision: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.revision += 1;
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self, material: Material) -> usize {
        self.revision += 1;
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_instance(&mut self, instance: MeshInstance) -> usize {
        self.revision += 1;
        self.instances.push(instance);
        self.instances.len() - 1
    }

    pub fn add_light(&mut self, light: SceneLight) {
        self.revision += 1;
        self.lights.push(light);
    }

    pub fn add_emitter(&mut self, emitter: ParticleEmitter) -> usize {
        self.revision += 1;
        self.emitters.push(emitter);
        self.emitters.len() - 1
    }

    /// Point attractor acting on every emitter's particles; negative strength repels
    pub fn add_force_field(&mut self, position: Vec3, strength: f32) {
        self.revision += 1;
        self.force_fields.push(ForceField { position, strength });
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn instances(&self) -> &[MeshInstance] {
        &self.instances
    }

    pub fn lights(&self) -> &[SceneLight] {
        &self.lights
    }

    pub fn emitters(&self) -> &[ParticleEmitter] {
        &self.emitters
    }

    pub fn force_fields(&self) -> &[ForceField] {
        &self.force_fields
    }

    pub fn instance_mut(&mut self, index: usize) -> Option<&mut MeshInstance> {
        self.revision += 1;
        self.instances.get_mut(index)
    }

    /// Bumped by every mutation, so consumers can tell when to rebuild
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// World-space bounds of every instance
    pub fn bounds(&self) -> Aabb {
        self.instances
            .iter()
            .filter_map(|instance| {
                let mesh = self.meshes.get(instance.mesh)?;
                Some(
                    mesh.vertices
                        .iter()
                        .fold(Aabb::EMPTY, |bounds, vertex| {
                            bounds.grow(instance.transform.transform_point3(vertex.position))
                        }),
                )
            })
            .fold(Aabb::EMPTY, |bounds, mesh_bounds| bounds.union(&mesh_bounds))
    }
}
