//! Bounding boxes and the structured-buffer layouts the path tracer uploads

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::resources::Material;

/// Half-extent every flattened node keeps along each axis
pub const BOX_MIN_SIZE: f32 = 0.0001;

/// Spans below this get padded out to `BOX_MIN_SIZE` on both sides
pub const BOX_MIN_SPAN: f32 = 0.01;

/// Structured buffer registers
pub const GEOMETRY_BUFFER_SLOT: u32 = 21;
pub const BVH_BUFFER_SLOT: u32 = 22;
pub const MATERIAL_BUFFER_SLOT: u32 = 23;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// Contains nothing; growing it by a point yields that point
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        points.iter().fold(Self::EMPTY, |bounds, &point| bounds.grow(point))
    }

    #[must_use]
    pub fn grow(self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    #[must_use]
    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Zero for an empty box
    pub fn surface_area(&self) -> f32 {
        if !self.is_valid() {
            return 0.0;
        }
        let d = self.size();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Axis of largest extent; ties go to the lower axis
    pub fn dominant_axis(&self) -> usize {
        let span = self.size();
        let mut axis = 0;
        if span[axis] < span.y {
            axis = 1;
        }
        if span[axis] < span.z {
            axis = 2;
        }
        axis
    }

    /// Padding that survives rounding along `axis`.
    ///
    /// [`BOX_MIN_SIZE`] near the origin, a few ULPs of the coordinate
    /// magnitude further out.
    fn axis_padding(&self, axis: usize) -> f32 {
        let magnitude = self.min[axis].abs().max(self.max[axis].abs());
        BOX_MIN_SIZE.max(magnitude * f32::EPSILON * 4.0)
    }

    fn pad_axis(&mut self, axis: usize) {
        let pad = self.axis_padding(axis);
        self.min[axis] -= pad;
        self.max[axis] += pad;
    }

    /// Give zero-extent axes a tiny thickness
    #[must_use]
    pub fn make_valid(mut self) -> Self {
        for axis in 0..3 {
            if self.max[axis] - self.min[axis] == 0.0 {
                self.pad_axis(axis);
            }
        }
        self
    }

    /// Pad every axis narrower than [`BOX_MIN_SPAN`] on both sides
    #[must_use]
    pub fn pad_thin_axes(mut self) -> Self {
        for axis in 0..3 {
            if (self.max[axis] - self.min[axis]).abs() < BOX_MIN_SPAN {
                self.pad_axis(axis);
            }
        }
        self
    }
}

/// Primitive kind tag stored in [`GpuGeometry::kind`]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Invalid = 0,
    Triangle = 1,
    Sphere = 2,
}

/// A triangle or sphere, laid out for the geometry structured buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuGeometry {
    /// Triangle corner, or sphere center
    pub a: Vec3,
    pub kind: u32,

    pub b: Vec3,
    pub radius: f32,

    pub c: Vec3,
    pub material_id: i32,

    pub uv1: Vec2,
    pub _padding_0: f32,
    pub _padding_1: f32,

    pub uv2: Vec2,
    pub _padding_2: f32,
    pub _padding_3: f32,

    pub uv3: Vec2,
    pub _padding_4: f32,
    pub _padding_5: f32,

    pub normal1: Vec3,
    pub _padding_6: f32,

    pub normal2: Vec3,
    pub _padding_7: f32,

    pub normal3: Vec3,
    pub _padding_8: f32,
}

impl Default for GpuGeometry {
    fn default() -> Self {
        Self {
            material_id: -1,
            ..Zeroable::zeroed()
        }
    }
}

impl GpuGeometry {
    /// Triangle with the flat face normal on all three corners
    pub fn triangle(a: Vec3, b: Vec3, c: Vec3, material_id: i32) -> Self {
        let normal = Self::flat_normal(a, b, c);
        Self {
            a,
            b,
            c,
            kind: GeometryKind::Triangle as u32,
            material_id,
            normal1: normal,
            normal2: normal,
            normal3: normal,
            ..Default::default()
        }
    }

    /// Sphere; the radius is made positive and at least 0.01
    pub fn sphere(center: Vec3, radius: f32, material_id: i32) -> Self {
        Self {
            a: center,
            kind: GeometryKind::Sphere as u32,
            radius: radius.abs().max(0.01),
            material_id,
            ..Default::default()
        }
    }

    pub fn flat_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
        (b - a).normalize().cross((c - a).normalize()).normalize()
    }

    pub fn kind(&self) -> GeometryKind {
        match self.kind {
            1 => GeometryKind::Triangle,
            2 => GeometryKind::Sphere,
            _ => GeometryKind::Invalid,
        }
    }

    /// # Panics
    /// Panics on [`GeometryKind::Invalid`], which the builder never produces.
    pub fn centroid(&self) -> Vec3 {
        match self.kind() {
            GeometryKind::Triangle => (self.a + self.b + self.c) / 3.0,
            GeometryKind::Sphere => self.a,
            GeometryKind::Invalid => unreachable!("centroid of invalid geometry"),
        }
    }

    /// # Panics
    /// Panics on [`GeometryKind::Invalid`], which the builder never produces.
    pub fn bounds(&self) -> Aabb {
        match self.kind() {
            GeometryKind::Triangle => Aabb::from_points(&[self.a, self.b, self.c]).make_valid(),
            GeometryKind::Sphere => {
                let extent = Vec3::splat(self.radius);
                Aabb::new(self.a - extent, self.a + extent)
            }
            GeometryKind::Invalid => unreachable!("bounds of invalid geometry"),
        }
    }
}

/// Flattened BVH node with stackless skip pointers
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuBvhNode {
    pub min: Vec3,
    /// Next node when the ray misses this box, -1 to stop
    pub miss_idx: i32,
    pub max: Vec3,
    /// Next node when the ray hits this box, -1 to stop
    pub hit_idx: i32,

    pub leaf: i32,
    pub geom_idx: i32,
    pub _padding_0: i32,
    pub _padding_1: i32,
}

impl Default for GpuBvhNode {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            miss_idx: -1,
            max: Vec3::ZERO,
            hit_idx: -1,
            leaf: 0,
            geom_idx: -1,
            _padding_0: 0,
            _padding_1: 0,
        }
    }
}

impl GpuBvhNode {
    pub fn is_leaf(&self) -> bool {
        self.leaf != 0
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.min, self.max)
    }
}

/// Material entry of the material structured buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub albedo: Vec3,
    pub reflect_chance: f32,

    pub emissive: Vec3,
    pub roughness: f32,

    pub has_base_color_map: i32,
    pub has_normal_map: i32,
    pub has_material_map: i32,
    pub has_height_map: i32,

    // bindless texture handles
    pub base_color_map_handle: u64,
    pub normal_map_handle: u64,
    pub material_map_handle: u64,
    pub height_map_handle: u64,
}

impl GpuMaterial {
    /// Material that only emits light
    pub fn emitter(emissive: Vec3) -> Self {
        Self {
            emissive,
            ..Default::default()
        }
    }
}

impl From<&Material> for GpuMaterial {
    fn from(material: &Material) -> Self {
        let cb = material.constant_buffer();
        let albedo = material.base_color.truncate();
        Self {
            albedo,
            reflect_chance: material.metallic,
            emissive: albedo * material.emissive_power,
            roughness: material.roughness,
            has_base_color_map: cb.has_base_color_map,
            has_normal_map: cb.has_normal_map,
            has_material_map: cb.has_material_map,
            has_height_map: cb.has_height_map,
            base_color_map_handle: cb.base_color_map_handle,
            normal_map_handle: cb.normal_map_handle,
            material_map_handle: cb.material_map_handle,
            height_map_handle: cb.height_map_handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_layout_sizes() {
        assert_eq!(size_of::<GpuBvhNode>(), 48);
        assert_eq!(size_of::<GpuGeometry>(), 144);
        assert_eq!(size_of::<GpuMaterial>(), 80);
        assert_eq!(offset_of!(GpuGeometry, material_id), 44);
        assert_eq!(offset_of!(GpuGeometry, normal1), 96);
        assert_eq!(offset_of!(GpuBvhNode, leaf), 32);
        assert_eq!(offset_of!(GpuMaterial, base_color_map_handle), 48);
    }

    #[test]
    fn test_triangle_gets_flat_normal() {
        let tri = GpuGeometry::triangle(Vec3::ZERO, Vec3::X, Vec3::Y, 3);
        assert_eq!(tri.kind(), GeometryKind::Triangle);
        assert_eq!(tri.normal1, Vec3::Z);
        assert_eq!(tri.normal3, Vec3::Z);
        assert_eq!(tri.material_id, 3);
        assert!((tri.centroid() - Vec3::new(1.0 / 3.0, 1.0 / 3.0, 0.0)).length() < 1e-6);

        // flat in z, so the box gets thickness there
        let bounds = tri.bounds();
        assert_eq!(bounds.min.z, -BOX_MIN_SIZE);
        assert_eq!(bounds.max.z, BOX_MIN_SIZE);
    }

    #[test]
    fn test_flat_box_far_from_origin_keeps_thickness() {
        let floor = Aabb::new(Vec3::new(-50.0, 10000.0, -50.0), Vec3::new(50.0, 10000.0, 50.0))
            .make_valid();
        assert!(floor.min.y < 10000.0 && floor.max.y > 10000.0);

        let padded = floor.pad_thin_axes();
        assert!(padded.max.y - padded.min.y > floor.max.y - floor.min.y);
    }

    #[test]
    fn test_sphere_radius_is_clamped() {
        assert_eq!(GpuGeometry::sphere(Vec3::ONE, -2.0, 0).radius, 2.0);
        assert_eq!(GpuGeometry::sphere(Vec3::ONE, 0.0, 0).radius, 0.01);
        assert_eq!(GpuGeometry::sphere(Vec3::ONE, 1.0, 0).centroid(), Vec3::ONE);
    }

    #[test]
    #[should_panic(expected = "invalid geometry")]
    fn test_invalid_geometry_centroid_panics() {
        GpuGeometry::default().centroid();
    }

    #[test]
    fn test_bvh_node_defaults() {
        let node = GpuBvhNode::default();
        assert_eq!((node.miss_idx, node.hit_idx, node.geom_idx), (-1, -1, -1));
        assert!(!node.is_leaf());
    }

    #[test]
    fn test_dominant_axis_ties_prefer_lower_axis() {
        assert_eq!(Aabb::new(Vec3::ZERO, Vec3::ONE).dominant_axis(), 0);
        assert_eq!(Aabb::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 2.0)).dominant_axis(), 1);
        assert_eq!(Aabb::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0)).dominant_axis(), 2);
    }

    #[test]
    fn test_empty_box() {
        assert!(!Aabb::EMPTY.is_valid());
        assert_eq!(Aabb::EMPTY.surface_area(), 0.0);
        let grown = Aabb::EMPTY.grow(Vec3::ONE);
        assert_eq!(grown.min, Vec3::ONE);
        assert_eq!(grown.surface_area(), 0.0);
    }

    #[test]
    fn test_material_conversion() {
        let material = Material::emissive(Vec3::new(1.0, 0.5, 0.25), 2.0).with_metallic(0.7);
        let gpu = GpuMaterial::from(&material);
        assert_eq!(gpu.albedo, Vec3::new(1.0, 0.5, 0.25));
        assert_eq!(gpu.emissive, Vec3::new(2.0, 1.0, 0.5));
        assert_eq!(gpu.reflect_chance, 0.7);
    }
}
