//! Light types for the scene

use glam::{Mat4, Vec3, Vec4};

use crate::backend::BackendType;
use crate::path_tracer::Aabb;
use crate::resources::Light;

/// Light type ids as the shaders see them
pub const LIGHT_TYPE_INFINITE: i32 = 0;
pub const LIGHT_TYPE_POINT: i32 = 1;
pub const LIGHT_TYPE_AREA: i32 = 3;

/// Constant, linear and quadratic falloff of a point light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
        }
    }
}

/// Light placed in a scene
#[derive(Debug, Clone, PartialEq)]
pub enum SceneLight {
    /// Sun-like light at infinity
    Infinite {
        /// Direction the light travels from
        direction: Vec3,
        color: Vec3,
        cast_shadow: bool,
    },
    Point {
        position: Vec3,
        color: Vec3,
        attenuation: Attenuation,
        max_distance: f32,
        cast_shadow: bool,
        /// Layer in the point shadow cube array
        shadow_map_index: Option<u32>,
    },
    /// Unit quad in the XY plane, placed by `transform`
    Area { transform: Mat4, color: Vec3 },
}

impl SceneLight {
    pub fn infinite(direction: Vec3, color: Vec3) -> Self {
        SceneLight::Infinite {
            direction: direction.normalize_or_zero(),
            color,
            cast_shadow: true,
        }
    }

    pub fn point(position: Vec3, color: Vec3, max_distance: f32) -> Self {
        SceneLight::Point {
            position,
            color,
            attenuation: Attenuation::default(),
            max_distance,
            cast_shadow: false,
            shadow_map_index: None,
        }
    }

    pub fn color(&self) -> Vec3 {
        match self {
            SceneLight::Infinite { color, .. }
            | SceneLight::Point { color, .. }
            | SceneLight::Area { color, .. } => *color,
        }
    }

    pub fn casts_shadow(&self) -> bool {
        match self {
            SceneLight::Infinite { cast_shadow, .. } | SceneLight::Point { cast_shadow, .. } => {
                *cast_shadow
            }
            SceneLight::Area { .. } => false,
        }
    }

    /// Convert to the per-frame light layout.
    ///
    /// Infinite lights get an orthographic shadow frustum fitted around
    /// `scene_bounds`.
    pub fn to_gpu(&self, scene_bounds: &Aabb, backend: BackendType) -> Light {
        let mut light = Light {
            color: self.color(),
            cast_shadow: self.casts_shadow() as i32,
            shadow_map_index: -1,
            ..Default::default()
        };

        match self {
            SceneLight::Infinite { direction, .. } => {
                light.light_type = LIGHT_TYPE_INFINITE;
                light.position = *direction;

                let (center, size) = if scene_bounds.is_valid() {
                    (scene_bounds.center(), 0.7 * scene_bounds.size().max_element())
                } else {
                    (Vec3::ZERO, 1.0)
                };
                light.view_matrix = Mat4::look_at_rh(center + *direction * size, center, Vec3::Y);
                light.projection_matrix = match backend {
                    BackendType::OpenGl => {
                        Mat4::orthographic_rh_gl(-size, size, -size, size, -size, 3.0 * size)
                    }
                    _ => Mat4::orthographic_rh(-size, size, -size, size, -size, 3.0 * size),
                };
            }
            SceneLight::Point {
                position,
                attenuation,
                max_distance,
                shadow_map_index,
                cast_shadow,
                ..
            } => {
                light.light_type = LIGHT_TYPE_POINT;
                light.position = *position;
                light.atten_constant = attenuation.constant;
                light.atten_linear = attenuation.linear;
                light.atten_quadratic = attenuation.quadratic;
                light.max_distance = *max_distance;
                if let (true, Some(index)) = (*cast_shadow, shadow_map_index) {
                    light.shadow_map_index = *index as i32;
                }
            }
            SceneLight::Area { transform, .. } => {
                light.light_type = LIGHT_TYPE_AREA;
                let s = 0.5;
                light.points = [
                    *transform * Vec4::new(-s, s, 0.0, 1.0),
                    *transform * Vec4::new(-s, -s, 0.0, 1.0),
                    *transform * Vec4::new(s, -s, 0.0, 1.0),
                    *transform * Vec4::new(s, s, 0.0, 1.0),
                ];
            }
        }

        light
    }
}
