//! CPU reference of the stackless traversal the path tracer shader runs
//!
//! Kept numerically identical to the shader: back faces are culled, hits
//! closer than `EPSILON` are ignored, and the loop only ever follows the
//! flattened hit/miss pointers.

use glam::{Vec2, Vec3};

use super::bvh::Bvh;
use super::geometry::{GeometryKind, GpuBvhNode, GpuGeometry};

pub const EPSILON: f32 = f32::EPSILON;

/// Initial `t` of a fresh ray
pub const RAY_T_MAX: f32 = 999999999.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub inv_direction: Vec3,
    /// Distance to the closest hit so far
    pub t: f32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
            t: RAY_T_MAX,
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Closest intersection found along a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub t: f32,
    /// Index into the geometry array that was traversed
    pub geometry: usize,
    /// Barycentric coordinates for triangles, zero for spheres
    pub uv: Vec2,
}

/// Möller–Trumbore, one-sided
pub fn hit_triangle(ray: &Ray, a: Vec3, b: Vec3, c: Vec3) -> Option<(f32, Vec2)> {
    let e1 = b - a;
    let e2 = c - a;

    let pvec = ray.direction.cross(e2);
    let det = e1.dot(pvec);
    if det < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = ray.origin - a;
    let u = tvec.dot(pvec) * inv_det;
    if u < 0.0 || u > 1.0 {
        return None;
    }

    let qvec = tvec.cross(e1);
    let v = ray.direction.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(qvec) * inv_det;
    if t >= ray.t || t < EPSILON {
        return None;
    }
    Some((t, Vec2::new(u, v)))
}

/// Near intersection of a ray and a sphere; rays starting inside miss.
///
/// Solves the full quadratic, `t = (-half_b - sqrt(d)) / a`, so `t` is in
/// units of `direction` for any direction length. The shader drops the
/// division by `a` and expects unit directions; both agree for those.
pub fn hit_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let a = ray.direction.length_squared();
    let half_b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;

    let discriminant = half_b * half_b - a * c;
    if discriminant < EPSILON {
        return None;
    }

    let t = (-half_b - discriminant.sqrt()) / a;
    if t >= ray.t || t < EPSILON {
        return None;
    }
    Some(t)
}

/// Slab test against a flattened node's box
pub fn hit_aabb(ray: &Ray, node: &GpuBvhNode) -> bool {
    let t0 = (node.min - ray.origin) * ray.inv_direction;
    let t1 = (node.max - ray.origin) * ray.inv_direction;
    let t_min = t0.min(t1).max_element();
    let t_max = t0.max(t1).min_element();
    t_min < t_max && ray.t > t_min
}

/// Intersect one primitive, shrinking `ray.t` on a closer hit
pub fn hit_geometry(ray: &mut Ray, geometry: &GpuGeometry) -> Option<Vec2> {
    let (t, uv) = match geometry.kind() {
        GeometryKind::Triangle => hit_triangle(ray, geometry.a, geometry.b, geometry.c)?,
        GeometryKind::Sphere => (hit_sphere(ray, geometry.a, geometry.radius)?, Vec2::ZERO),
        GeometryKind::Invalid => return None,
    };
    ray.t = t;
    Some(uv)
}

/// Walk the flattened hierarchy without a stack
pub fn hit_scene(bvh: &Bvh, ray: &mut Ray) -> Option<Hit> {
    let mut closest = None;
    let mut index: i32 = if bvh.nodes.is_empty() { -1 } else { 0 };

    while index >= 0 {
        let node = &bvh.nodes[index as usize];
        if hit_aabb(ray, node) {
            if node.is_leaf() && node.geom_idx >= 0 {
                let geometry = node.geom_idx as usize;
                if let Some(uv) = hit_geometry(ray, &bvh.geometry[geometry]) {
                    closest = Some(Hit { t: ray.t, geometry, uv });
                }
            }
            index = node.hit_idx;
        } else {
            index = node.miss_idx;
        }
    }

    closest
}

/// Test every primitive; the yardstick for [`hit_scene`]
pub fn hit_brute_force(geometry: &[GpuGeometry], ray: &mut Ray) -> Option<Hit> {
    let mut closest = None;
    for (index, primitive) in geometry.iter().enumerate() {
        if let Some(uv) = hit_geometry(ray, primitive) {
            closest = Some(Hit {
                t: ray.t,
                geometry: index,
                uv,
            });
        }
    }
    closest
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_vec3(rng: &mut StdRng, range: f32) -> Vec3 {
        Vec3::new(
            rng.gen_range(-range..range),
            rng.gen_range(-range..range),
            rng.gen_range(-range..range),
        )
    }

    #[test]
    fn test_triangle_front_and_back() {
        let (a, b, c) = (Vec3::ZERO, Vec3::X, Vec3::Y);
        let front = Ray::new(Vec3::new(0.25, 0.25, 1.0), Vec3::NEG_Z);
        let (t, uv) = hit_triangle(&front, a, b, c).unwrap();
        assert!((t - 1.0).abs() < 1e-6);
        assert!((uv - Vec2::splat(0.25)).length() < 1e-6);

        let back = Ray::new(Vec3::new(0.25, 0.25, -1.0), Vec3::Z);
        assert!(hit_triangle(&back, a, b, c).is_none());

        let outside = Ray::new(Vec3::new(0.75, 0.75, 1.0), Vec3::NEG_Z);
        assert!(hit_triangle(&outside, a, b, c).is_none());
    }

    #[test]
    fn test_triangle_respects_current_t() {
        let mut ray = Ray::new(Vec3::new(0.25, 0.25, 1.0), Vec3::NEG_Z);
        ray.t = 0.5;
        assert!(hit_triangle(&ray, Vec3::ZERO, Vec3::X, Vec3::Y).is_none());
    }

    #[test]
    fn test_sphere_near_root() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let t = hit_sphere(&ray, Vec3::ZERO, 1.0).unwrap();
        assert!((t - 4.0).abs() < 1e-5);

        let inside = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(hit_sphere(&inside, Vec3::ZERO, 1.0).is_none());

        let away = Ray::new(Vec3::new(0.0, 3.0, -5.0), Vec3::Z);
        assert!(hit_sphere(&away, Vec3::ZERO, 1.0).is_none());
    }

    #[test]
    fn test_sphere_t_scales_with_direction_length() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z * 2.0);
        let t = hit_sphere(&ray, Vec3::ZERO, 1.0).unwrap();
        assert!((t - 2.0).abs() < 1e-5);
        assert!((ray.at(t) - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_aabb_slab() {
        let node = GpuBvhNode {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
            ..Default::default()
        };
        let mut ray = Ray::new(Vec3::new(0.1, 0.2, -5.0), Vec3::Z);
        assert!(hit_aabb(&ray, &node));
        ray.t = 3.0;
        assert!(!hit_aabb(&ray, &node));
        assert!(!hit_aabb(&Ray::new(Vec3::new(3.0, 0.2, -5.0), Vec3::Z), &node));
    }

    #[test]
    fn test_empty_scene_misses() {
        let mut ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(hit_scene(&Bvh::default(), &mut ray).is_none());
        assert_eq!(ray.t, RAY_T_MAX);
    }

    #[test]
    fn test_traversal_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..8 {
            let count = rng.gen_range(1..=64);
            let mut primitives: Vec<GpuGeometry> = (0..count)
                .map(|i| {
                    let a = random_vec3(&mut rng, 4.0);
                    let (b, c) = (random_vec3(&mut rng, 1.5), random_vec3(&mut rng, 1.5));
                    GpuGeometry::triangle(a, a + b, a + c, i)
                })
                .collect();
            primitives.push(GpuGeometry::sphere(random_vec3(&mut rng, 3.0), 0.5, count));

            let bvh = Bvh::build(&primitives);

            for _ in 0..100 {
                let origin = random_vec3(&mut rng, 8.0);
                let target = random_vec3(&mut rng, 3.0);
                let direction = (target - origin).normalize();

                let mut bvh_ray = Ray::new(origin, direction);
                let mut brute_ray = Ray::new(origin, direction);
                let from_bvh = hit_scene(&bvh, &mut bvh_ray);
                let brute = hit_brute_force(&primitives, &mut brute_ray);

                match (from_bvh, brute) {
                    (None, None) => {}
                    (Some(found), Some(expected)) => {
                        assert!((found.t - expected.t).abs() <= 1e-5 * expected.t.max(1.0));
                        assert_eq!(
                            bvh.geometry[found.geometry].material_id,
                            primitives[expected.geometry].material_id
                        );
                    }
                    (found, expected) => panic!("bvh {found:?} vs brute force {expected:?}"),
                }
            }
        }
    }
}
