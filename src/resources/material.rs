//! Material definitions for PBR rendering

use glam::{Vec3, Vec4};

use crate::backend::TextureHandle;
use crate::resources::constants::MaterialConstantBuffer;

/// PBR material properties
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub reflect_power: f32,
    /// Multiplies the base color into emitted light
    pub emissive_power: f32,

    /// Texture handles (None means use default)
    pub base_color_map: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
    /// Metallic in B, roughness in G
    pub material_map: Option<TextureHandle>,
    pub height_map: Option<TextureHandle>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            reflect_power: 0.0,
            emissive_power: 0.0,
            base_color_map: None,
            normal_map: None,
            material_map: None,
            height_map: None,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_emissive_power(mut self, power: f32) -> Self {
        self.emissive_power = power;
        self
    }

    pub fn is_emissive(&self) -> bool {
        self.emissive_power > 0.0
    }

    /// Emitted radiance
    pub fn emission(&self) -> Vec3 {
        self.base_color.truncate() * self.emissive_power
    }

    /// Per-material constants as the raster shaders see them
    pub fn constant_buffer(&self) -> MaterialConstantBuffer {
        let flag = |map: Option<TextureHandle>| map.is_some() as i32;
        let handle = |map: Option<TextureHandle>| map.map_or(0, |texture| texture.raw());

        MaterialConstantBuffer {
            base_color: self.base_color,
            metallic: self.metallic,
            roughness: self.roughness,
            reflect_power: self.reflect_power,
            emissive_power: self.emissive_power,
            has_base_color_map: flag(self.base_color_map),
            has_material_map: flag(self.material_map),
            has_normal_map: flag(self.normal_map),
            has_height_map: flag(self.height_map),
            base_color_map_handle: handle(self.base_color_map),
            normal_map_handle: handle(self.normal_map),
            material_map_handle: handle(self.material_map),
            height_map_handle: handle(self.height_map),
            ..Default::default()
        }
    }

    // Preset materials

    pub fn plastic(color: Vec3) -> Self {
        Self::new("plastic")
            .with_base_color(color.extend(1.0))
            .with_metallic(0.0)
            .with_roughness(0.4)
    }

    pub fn metal(color: Vec3, roughness: f32) -> Self {
        Self::new("metal")
            .with_base_color(color.extend(1.0))
            .with_metallic(1.0)
            .with_roughness(roughness)
    }

    pub fn gold() -> Self {
        Self::metal(Vec3::new(1.0, 0.766, 0.336), 0.3)
    }

    pub fn emissive(color: Vec3, power: f32) -> Self {
        Self::new("emissive")
            .with_base_color(color.extend(1.0))
            .with_emissive_power(power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_buffer_flags_maps() {
        let mut material = Material::gold();
        material.normal_map = Some(TextureHandle::from_raw(42));

        let cb = material.constant_buffer();
        assert_eq!(cb.metallic, 1.0);
        assert_eq!(cb.has_normal_map, 1);
        assert_eq!(cb.has_base_color_map, 0);
        assert_eq!(cb.normal_map_handle, 42);
        assert_eq!(cb.base_color_map_handle, 0);
    }

    #[test]
    fn test_emissive_scales_base_color() {
        let light = Material::emissive(Vec3::new(1.0, 0.5, 0.0), 4.0);
        assert!(light.is_emissive());
        assert_eq!(light.emission(), Vec3::new(4.0, 2.0, 0.0));
        assert!(!Material::default().is_emissive());
    }
}
