//! Camera system

use glam::{Mat4, Vec3};

use crate::backend::BackendType;

/// Perspective camera for viewing the scene
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// OpenGL clips depth to [-1, 1], every other backend to [0, 1]
    pub fn projection_matrix(&self, backend: BackendType) -> Mat4 {
        match backend {
            BackendType::OpenGl => {
                Mat4::perspective_rh_gl(self.fov_y, self.aspect, self.near, self.far)
            }
            _ => Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far),
        }
    }
}

/// View matrices of the six cube faces around `eye`, in +X, -X, +Y, -Y, +Z, -Z order
pub fn cube_face_views(eye: Vec3) -> [Mat4; 6] {
    [
        Mat4::look_at_rh(eye, eye + Vec3::X, Vec3::NEG_Y),
        Mat4::look_at_rh(eye, eye + Vec3::NEG_X, Vec3::NEG_Y),
        Mat4::look_at_rh(eye, eye + Vec3::Y, Vec3::Z),
        Mat4::look_at_rh(eye, eye + Vec3::NEG_Y, Vec3::NEG_Z),
        Mat4::look_at_rh(eye, eye + Vec3::Z, Vec3::NEG_Y),
        Mat4::look_at_rh(eye, eye + Vec3::NEG_Z, Vec3::NEG_Y),
    ]
}

/// 90 degree square frustum covering one cube face
pub fn cube_face_projection(near: f32, far: f32, backend: BackendType) -> Mat4 {
    let fov = std::f32::consts::FRAC_PI_2;
    match backend {
        BackendType::OpenGl => Mat4::perspective_rh_gl(fov, 1.0, near, far),
        _ => Mat4::perspective_rh(fov, 1.0, near, far),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_matrix_moves_target_in_front() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let target_in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!((target_in_view - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn test_projection_depth_range_depends_on_backend() {
        let camera = Camera::default();
        let near = Vec3::new(0.0, 0.0, -camera.near);
        let d3d = camera.projection_matrix(BackendType::D3d11).project_point3(near);
        let gl = camera.projection_matrix(BackendType::OpenGl).project_point3(near);
        assert!(d3d.z.abs() < 1e-4);
        assert!((gl.z + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_cube_faces_look_down_their_axis() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let axes = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (view, axis) in cube_face_views(eye).iter().zip(axes) {
            let ahead = view.transform_point3(eye + axis);
            assert!((ahead - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5, "{axis:?}: {ahead:?}");
        }
    }
}
