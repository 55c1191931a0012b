//! Per-frame draw data extracted from a scene

use glam::{Mat4, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{BackendType, MeshHandle, TextureHandle};
use crate::pipeline::postprocess::bloom::{bloom_step, BLOOM_STEP_COUNT};
use crate::render_graph::IBL_MIP_CHAIN_MAX;
use crate::resources::*;
use crate::scene::{cube_face_projection, cube_face_views, Camera, MeshInstance, Scene, SceneLight};

/// Leading per-batch elements owned by the cubemap and bloom passes
///
/// Element `6 * mip + face` holds the view-projection of a cube face; the
/// bloom steps read their mip indices from the same elements.
pub const RESERVED_BATCH_COUNT: usize = 6 * IBL_MIP_CHAIN_MAX as usize;

const POINT_SHADOW_NEAR: f32 = 0.1;

/// One indexed draw and the constant buffer elements it binds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawBatch {
    pub mesh: MeshHandle,
    pub index_count: u32,
    pub index_offset: u32,
    /// Element of the per-batch constant buffer
    pub batch_index: u32,
    pub material_index: u32,
    pub bone_index: Option<u32>,
    pub instance_count: u32,
    /// Tags the stencil so the highlight pass can outline it
    pub selected: bool,
}

/// A texture drawn over the final image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugImage {
    pub texture: TextureHandle,
    /// Per-batch element holding the quad's placement
    pub batch_index: u32,
}

/// Draws of one camera or light pass, split by pipeline state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassDrawList {
    /// Element of the per-pass constant buffer
    pub pass_index: u32,
    pub opaque: Vec<DrawBatch>,
    pub double_sided: Vec<DrawBatch>,
    pub transparent: Vec<DrawBatch>,
}

impl PassDrawList {
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.double_sided.is_empty() && self.transparent.is_empty()
    }

    pub fn len(&self) -> usize {
        self.opaque.len() + self.double_sided.len() + self.transparent.len()
    }
}

/// Everything the raster passes draw in a frame
///
/// The vectors map one to one onto the constant buffers of a
/// [`FrameContext`], which uploads them before the first pass runs.
#[derive(Debug, Clone, Default)]
pub struct RenderData {
    pub batches: Vec<PerBatchConstantBuffer>,
    pub passes: Vec<PerPassConstantBuffer>,
    pub materials: Vec<MaterialConstantBuffer>,
    pub bones: Vec<BoneConstantBuffer>,
    pub emitters: Vec<EmitterConstantBuffer>,
    pub point_shadows: Vec<PointShadowConstantBuffer>,
    pub per_frame: PerFrameConstantBuffer,

    pub main_pass: PassDrawList,
    /// Draws of the main infinite light, when one casts shadows
    pub shadow_pass: Option<PassDrawList>,
    /// Shadow casters rendered into every populated point shadow cube
    pub point_shadow_pass: Option<PassDrawList>,
    /// Batches voxelized into the GI volume, when voxel GI is on
    pub voxel_pass: Option<PassDrawList>,
    pub debug_images: Vec<DebugImage>,
    /// Re-render the environment cubemaps this frame
    pub bake_ibl: bool,
}

impl RenderData {
    /// Extract draw data for every instance whose mesh has been uploaded
    pub fn extract(scene: &Scene, camera: &Camera, backend: BackendType) -> Self {
        let mut data = RenderData::default();
        data.reserve_batches(backend);
        let bounds = scene.bounds();

        data.main_pass.pass_index =
            data.push_pass(camera.view_matrix(), camera.projection_matrix(backend));

        let lights: Vec<Light> = scene
            .lights()
            .iter()
            .map(|light| light.to_gpu(&bounds, backend))
            .collect();
        let shadow_light = scene
            .lights()
            .iter()
            .zip(&lights)
            .find(|(light, _)| matches!(light, SceneLight::Infinite { cast_shadow: true, .. }))
            .map(|(_, gpu)| *gpu);
        if let Some(light) = shadow_light {
            data.shadow_pass = Some(PassDrawList {
                pass_index: data.push_pass(light.view_matrix, light.projection_matrix),
                ..Default::default()
            });
        }

        data.extract_point_shadows(scene, backend);
        data.per_frame.set_lights(&lights);
        data.per_frame.set_force_fields(scene.force_fields());
        data.per_frame.camera_position = camera.position;
        if bounds.is_valid() {
            data.per_frame.world_center = bounds.center();
            data.per_frame.world_size_half = 0.5 * bounds.size().max_element();
        }

        data.materials = scene.materials().iter().map(Material::constant_buffer).collect();

        for instance in scene.instances() {
            let Some(mesh) = scene.meshes().get(instance.mesh) else {
                log::warn!("Instance references missing mesh {}", instance.mesh);
                continue;
            };
            let Some(handle) = mesh.handle else {
                continue;
            };
            let Some(material) = scene.materials().get(instance.material) else {
                log::warn!("Instance references missing material {}", instance.material);
                continue;
            };

            let bone_index = data.push_bones(instance);
            let batch_index = data.batches.len() as u32;
            data.batches.push(PerBatchConstantBuffer {
                world_matrix: instance.transform,
                has_animation: bone_index.is_some() as i32,
                ..Default::default()
            });

            let batch = DrawBatch {
                mesh: handle,
                index_count: mesh.indices.len() as u32,
                index_offset: 0,
                batch_index,
                material_index: instance.material as u32,
                bone_index,
                instance_count: 1,
                selected: instance.selected,
            };

            if material.base_color.w < 1.0 {
                data.main_pass.transparent.push(batch);
            } else if instance.double_sided {
                data.main_pass.double_sided.push(batch);
            } else {
                data.main_pass.opaque.push(batch);
            }

            if instance.cast_shadow {
                let shadow_passes = data
                    .shadow_pass
                    .iter_mut()
                    .chain(data.point_shadow_pass.iter_mut());
                for shadow_pass in shadow_passes {
                    shadow_pass.opaque.push(batch);
                }
            }
        }

        data.extract_emitters(scene);

        log::trace!(
            "Extracted {} batches, {} materials, {} lights, {} emitters",
            data.batches.len(),
            data.materials.len(),
            lights.len(),
            data.emitters.len()
        );
        data
    }

    /// Stamp this frame's timestep and fresh random seeds on every emitter
    pub fn set_frame_time(&mut self, frame_index: u64, timestep: f32) {
        let mut rng = StdRng::seed_from_u64(frame_index);
        for emitter in &mut self.emitters {
            emitter.elapsed_time = timestep;
            emitter.seeds = Vec3::new(rng.gen(), rng.gen(), rng.gen());
        }
    }

    /// Voxelize the main pass batches into a `voxel_size`^3 volume around
    /// the scene bounds. Does nothing for an empty scene.
    pub fn enable_voxel_gi(&mut self, voxel_size: u32) {
        let world_size = 2.0 * self.per_frame.world_size_half;
        if world_size <= 0.0 || voxel_size == 0 {
            log::debug!("Voxel GI skipped: nothing to voxelize");
            return;
        }

        let texel_size = 1.0 / voxel_size as f32;
        self.per_frame.enable_vxgi = 1;
        self.per_frame.texel_size = texel_size;
        self.per_frame.voxel_size = world_size * texel_size;
        self.voxel_pass = Some(self.main_pass.clone());
    }

    /// Draw `texture` over the final image, covering `min..max` in
    /// normalized device coordinates
    pub fn add_debug_image(&mut self, texture: TextureHandle, min: Vec2, max: Vec2) {
        let center = 0.5 * (min + max);
        let half_size = 0.5 * (max - min);
        let batch_index = self.batches.len() as u32;
        self.batches.push(PerBatchConstantBuffer {
            world_matrix: Mat4::from_translation(center.extend(0.0))
                * Mat4::from_scale(half_size.extend(1.0)),
            ..Default::default()
        });
        self.debug_images.push(DebugImage { texture, batch_index });
    }

    fn push_bones(&mut self, instance: &MeshInstance) -> Option<u32> {
        let bones = instance.bones.as_ref()?;
        if self.bones.len() >= FrameContext::BONE_CAPACITY as usize {
            log::warn!(
                "More than {} animated instances, drawing the rest in bind pose",
                FrameContext::BONE_CAPACITY
            );
            return None;
        }
        if bones.len() > MAX_BONE_COUNT {
            log::warn!(
                "{} bones submitted, only the first {} are used",
                bones.len(),
                MAX_BONE_COUNT
            );
        }

        let mut buffer = BoneConstantBuffer::default();
        for (slot, bone) in buffer.bones.iter_mut().zip(bones) {
            *slot = *bone;
        }
        self.bones.push(buffer);
        Some(self.bones.len() as u32 - 1)
    }

    fn extract_emitters(&mut self, scene: &Scene) {
        let capacity = FrameContext::EMITTER_CAPACITY as usize;
        if scene.emitters().len() > capacity {
            log::warn!(
                "{} emitters in the scene, only the first {} are simulated",
                scene.emitters().len(),
                capacity
            );
        }

        self.emitters = scene
            .emitters()
            .iter()
            .take(capacity)
            .map(|emitter| EmitterConstantBuffer {
                life_span: emitter.life_span,
                emitter_scale: emitter.scale,
                emitter_position: emitter.position,
                particles_per_frame: emitter.particles_per_frame as i32,
                emitter_starting_velocity: emitter.starting_velocity,
                emitter_max_particle_count: emitter.max_particle_count.min(i32::MAX as u32) as i32,
                emitter_has_gravity: emitter.gravity as i32,
                ..Default::default()
            })
            .collect();
    }

    /// Fill the leading per-batch elements the cubemap and bloom passes bind
    pub fn reserve_batches(&mut self, backend: BackendType) {
        if self.batches.len() < RESERVED_BATCH_COUNT {
            self.batches.resize(RESERVED_BATCH_COUNT, PerBatchConstantBuffer::default());
        }

        let projection = cube_face_projection(0.1, 10.0, backend);
        let views = cube_face_views(Vec3::ZERO);
        for (index, batch) in self.batches[..RESERVED_BATCH_COUNT].iter_mut().enumerate() {
            batch.world_matrix = projection * views[index % 6];
        }

        for id in 0..BLOOM_STEP_COUNT {
            let step = bloom_step(id);
            let batch = &mut self.batches[step.batch_slot as usize];
            batch.bloom_input_texture_index = step.input.unwrap_or(0) as u32;
            batch.bloom_output_image_index = step.output as u32;
        }
    }

    fn extract_point_shadows(&mut self, scene: &Scene, backend: BackendType) {
        for light in scene.lights() {
            let SceneLight::Point {
                position,
                max_distance,
                cast_shadow: true,
                shadow_map_index: Some(index),
                ..
            } = light
            else {
                continue;
            };

            let index = *index as usize;
            if index >= MAX_POINT_LIGHT_SHADOW_COUNT {
                log::warn!(
                    "Point shadow index {} is out of range, max is {}",
                    index,
                    MAX_POINT_LIGHT_SHADOW_COUNT
                );
                continue;
            }

            let first = 6 * index;
            if self.point_shadows.len() < first + 6 {
                self.point_shadows.resize(first + 6, PointShadowConstantBuffer::default());
            }
            let projection = cube_face_projection(POINT_SHADOW_NEAR, *max_distance, backend);
            for (face, view) in cube_face_views(*position).into_iter().enumerate() {
                self.point_shadows[first + face] = PointShadowConstantBuffer {
                    point_light_matrix: projection * view,
                    point_light_position: *position,
                    point_light_far: *max_distance,
                    ..Default::default()
                };
            }
            self.point_shadow_pass.get_or_insert_with(PassDrawList::default);
        }
    }

    /// Cube array layers of the point lights that cast shadows this frame
    pub fn point_shadow_layers(&self) -> impl Iterator<Item = u32> + '_ {
        self.point_shadows
            .iter()
            .enumerate()
            .filter(|(_, face)| face.point_light_far > 0.0)
            .map(|(layer, _)| layer as u32)
    }

    fn push_pass(&mut self, view_matrix: Mat4, projection_matrix: Mat4) -> u32 {
        self.passes.push(PerPassConstantBuffer {
            view_matrix,
            projection_matrix,
            ..Default::default()
        });
        self.passes.len() as u32 - 1
    }
}
