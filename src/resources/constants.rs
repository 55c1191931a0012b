//! Constant buffer layouts shared with the shaders
//!
//! Every struct here is bit-for-bit the layout the compiled shaders expect:
//! field order and the explicit padding fields must not change. Each size is a
//! multiple of 256 bytes so any element can be bound as a constant buffer range.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

pub const MAX_LIGHT_COUNT: usize = 16;
pub const MAX_BONE_COUNT: usize = 128;
pub const MAX_FORCE_FIELD_COUNT: usize = 64;
pub const MAX_POINT_LIGHT_SHADOW_COUNT: usize = 8;

/// A constant buffer struct bound at a fixed register
pub trait ConstantBuffer: Pod {
    const SLOT: u32;
}

/// Light entry of the per-frame buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Light {
    pub projection_matrix: Mat4,
    pub view_matrix: Mat4,
    pub points: [Vec4; 4],

    pub color: Vec3,
    pub light_type: i32,

    /// Direction for infinite lights
    pub position: Vec3,
    pub cast_shadow: i32,

    pub atten_constant: f32,
    pub atten_linear: f32,

    pub atten_quadratic: f32,
    pub max_distance: f32,

    pub _padding: Vec3,
    pub shadow_map_index: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ForceField {
    pub position: Vec3,
    pub strength: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PerBatchConstantBuffer {
    pub world_matrix: Mat4,

    pub _padding_0: Vec3,
    pub has_animation: i32,

    pub _padding_1: Vec4,
    pub _padding_2: Vec4,

    // bloom passes reuse the per batch buffer
    pub _padding_3: Vec2,
    pub bloom_input_texture_index: u32,
    pub bloom_output_image_index: u32,

    pub _padding_4: Mat4,
    pub _padding_5: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PerPassConstantBuffer {
    pub view_matrix: Mat4,
    pub projection_matrix: Mat4,

    pub _padding_0: Mat4,
    pub _padding_1: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialConstantBuffer {
    pub base_color: Vec4,

    pub metallic: f32,
    pub roughness: f32,
    pub reflect_power: f32,
    pub emissive_power: f32,

    pub has_base_color_map: i32,
    pub has_material_map: i32,
    pub has_normal_map: i32,
    pub has_height_map: i32,

    pub base_color_map_index: u32,
    pub normal_map_index: u32,
    pub material_map_index: u32,
    pub height_map_index: u32,

    // bindless texture handles
    pub base_color_map_handle: u64,
    pub normal_map_handle: u64,
    pub material_map_handle: u64,
    pub height_map_handle: u64,

    pub _padding_1: Vec4,
    pub _padding_2: Vec4,
    pub _padding_3: Mat4,
    pub _padding_4: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BoneConstantBuffer {
    pub bones: [Mat4; MAX_BONE_COUNT],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PointShadowConstantBuffer {
    pub point_light_matrix: Mat4,
    pub point_light_position: Vec3,
    pub point_light_far: f32,

    pub _padding_0: Vec4,
    pub _padding_1: Vec4,
    pub _padding_2: Vec4,

    pub _padding_3: Mat4,
    pub _padding_4: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PerFrameConstantBuffer {
    pub lights: [Light; MAX_LIGHT_COUNT],

    pub light_count: i32,
    pub enable_bloom: i32,
    pub debug_csm: i32,
    pub bloom_threshold: f32,

    pub debug_voxel_id: i32,
    pub no_texture: i32,
    pub enable_vxgi: i32,
    pub texel_size: f32,

    pub camera_position: Vec3,
    pub voxel_size: f32,

    pub world_center: Vec3,
    pub world_size_half: f32,

    pub gbuffer_base_color_map_index: u32,
    pub gbuffer_position_map_index: u32,
    pub gbuffer_normal_map_index: u32,
    pub gbuffer_material_map_index: u32,

    pub gbuffer_depth_index: u32,
    pub point_shadow_array_index: u32,
    pub shadow_map_index: u32,
    pub texture_highlight_select_index: u32,

    pub _padding_1: Vec2,
    pub texture_lighting_index: u32,
    pub force_fields_count: i32,

    pub _padding_2: Vec4,
    pub _padding_3: Mat4,
    pub _padding_4: Mat4,

    pub force_fields: [ForceField; MAX_FORCE_FIELD_COUNT],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct EmitterConstantBuffer {
    pub pre_sim_idx: i32,
    pub post_sim_idx: i32,
    pub elapsed_time: f32,
    pub life_span: f32,

    pub seeds: Vec3,
    pub emitter_scale: f32,
    pub emitter_position: Vec3,
    pub particles_per_frame: i32,
    pub emitter_starting_velocity: Vec3,
    pub emitter_max_particle_count: i32,

    pub _padding_0: Vec3,
    pub emitter_has_gravity: i32,

    pub _padding_1: Vec4,
    pub _padding_2: Vec4,
    pub _padding_3: Vec4,
    pub _padding_4: Mat4,
    pub _padding_5: Mat4,
}

macro_rules! constant_buffer {
    ($name:ty, $slot:expr) => {
        impl ConstantBuffer for $name {
            const SLOT: u32 = $slot;
        }

        impl Default for $name {
            fn default() -> Self {
                Zeroable::zeroed()
            }
        }

        const _: () = assert!(std::mem::size_of::<$name>() % 256 == 0);
    };
}

constant_buffer!(PerBatchConstantBuffer, 0);
constant_buffer!(PerPassConstantBuffer, 1);
constant_buffer!(MaterialConstantBuffer, 2);
constant_buffer!(BoneConstantBuffer, 3);
constant_buffer!(PointShadowConstantBuffer, 4);
constant_buffer!(PerFrameConstantBuffer, 5);
constant_buffer!(EmitterConstantBuffer, 6);

impl Default for Light {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

impl PerFrameConstantBuffer {
    /// Copy lights in, keeping at most `MAX_LIGHT_COUNT`
    pub fn set_lights(&mut self, lights: &[Light]) {
        if lights.len() > MAX_LIGHT_COUNT {
            log::warn!(
                "{} lights submitted, only the first {} are uploaded",
                lights.len(),
                MAX_LIGHT_COUNT
            );
        }

        let count = lights.len().min(MAX_LIGHT_COUNT);
        self.lights[..count].copy_from_slice(&lights[..count]);
        self.light_count = count as i32;
    }

    pub fn set_force_fields(&mut self, force_fields: &[ForceField]) {
        if force_fields.len() > MAX_FORCE_FIELD_COUNT {
            log::warn!(
                "{} force fields submitted, only the first {} are uploaded",
                force_fields.len(),
                MAX_FORCE_FIELD_COUNT
            );
        }

        let count = force_fields.len().min(MAX_FORCE_FIELD_COUNT);
        self.force_fields[..count].copy_from_slice(&force_fields[..count]);
        self.force_fields_count = count as i32;
    }
}
