use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::frustum::{Frustum, Plane};

/// Projection parameters of a [`Camera`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Vertical field of view in degrees.
    Perspective {
        fov_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

/// View + projection with cached world-space frustum.
///
/// Used both for the player camera and for the transient cameras of shadow
/// passes and cascades.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    view: Mat4,
    proj: Mat4,
    projection: Projection,
    world_position: Vec3,
    frustum: Frustum,
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(
            Vec3::new(0.0, 10.0, 15.0),
            Vec3::ZERO,
            Vec3::Y,
            60.0,
            16.0 / 9.0,
            0.1,
            1000.0,
        )
    }
}

impl Camera {
    pub fn perspective(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self::with_projection(
            eye,
            target,
            up,
            Projection::Perspective {
                fov_degrees,
                aspect,
                near,
                far,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn orthographic(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self::with_projection(
            eye,
            target,
            up,
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            },
        )
    }

    pub fn with_projection(eye: Vec3, target: Vec3, up: Vec3, projection: Projection) -> Self {
        let mut cam = Self {
            view: Mat4::look_at_rh(eye, target, up),
            proj: Mat4::IDENTITY,
            projection,
            world_position: eye,
            frustum: Frustum::default(),
        };
        cam.set_projection(projection);
        cam
    }

    /// Replace the projection, keeping the view. Recomputes the frustum.
    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.proj = match projection {
            Projection::Perspective {
                fov_degrees,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh_gl(fov_degrees.to_radians(), aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        };
        self.frustum = Frustum::from_clip_matrix(&self.clip_from_world());
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn proj_matrix(&self) -> Mat4 {
        self.proj
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn clip_from_world(&self) -> Mat4 {
        self.proj * self.view
    }

    pub fn world_position(&self) -> Vec3 {
        self.world_position
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn is_orthographic(&self) -> bool {
        matches!(self.projection, Projection::Orthographic { .. })
    }

    pub fn near(&self) -> f32 {
        match self.projection {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    pub fn far(&self) -> f32 {
        match self.projection {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    /// Unit view direction in world space.
    pub fn forward(&self) -> Vec3 {
        let r = self.view.row(2);
        -Vec3::new(r.x, r.y, r.z)
    }

    /// Same camera with a different depth range. Orthographic cameras keep
    /// their extents.
    pub fn with_depth_range(&self, near: f32, far: f32) -> Camera {
        let mut cam = *self;
        let projection = match self.projection {
            Projection::Perspective {
                fov_degrees,
                aspect,
                ..
            } => Projection::Perspective {
                fov_degrees,
                aspect,
                near,
                far,
            },
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                ..
            } => Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            },
        };
        cam.set_projection(projection);
        cam
    }

    /// Smallest sphere enclosing the view frustum, as `(center, radius)`.
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        let fwd = self.forward();
        match self.projection {
            Projection::Perspective {
                fov_degrees,
                aspect,
                near: n,
                far: f,
            } => {
                let k = (1.0 + 1.0 / (aspect * aspect)).sqrt()
                    * aspect
                    * (0.5 * fov_degrees.to_radians()).tan();
                let k_sqr = k * k;
                if k_sqr >= (f - n) / (f + n) {
                    (self.world_position + fwd * f, f * k)
                } else {
                    let center = self.world_position + fwd * 0.5 * (f + n) * (1.0 + k_sqr);
                    let radius = 0.5
                        * ((f - n) * (f - n)
                            + 2.0 * (f * f + n * n) * k_sqr
                            + (f + n) * (f + n) * k_sqr * k_sqr)
                            .sqrt();
                    (center, radius)
                }
            }
            Projection::Orthographic { .. } => {
                let world_from_clip = self.clip_from_world().inverse();
                let lo = world_from_clip.project_point3(Vec3::splat(-1.0));
                let hi = world_from_clip.project_point3(Vec3::splat(1.0));
                (0.5 * (lo + hi), 0.5 * lo.distance(hi))
            }
        }
    }

    /// Distance of the `k`-th of `slices` exponential depth slices.
    pub fn slice_depth(&self, k: u32, slices: u32) -> f32 {
        let (n, f) = (self.near(), self.far());
        n * (f / n).powf(k as f32 / slices as f32)
    }

    /// Split the frustum into `res_x * res_y * res_z` cells, laid out as
    /// `z * res_x * res_y + y * res_x + x`, row `y = 0` at the bottom.
    ///
    /// Depth slices are exponential. Meaningful for perspective cameras only.
    pub fn extract_sub_frustums(&self, res_x: u32, res_y: u32, res_z: u32, out: &mut Vec<Frustum>) {
        out.clear();
        if res_x == 0 || res_y == 0 || res_z == 0 {
            return;
        }
        let grid = [2.0 / res_x as f32, 2.0 / res_y as f32];
        let world_from_clip = self.clip_from_world().inverse();
        let eye = self.world_position;
        let fwd = self.forward();
        let unproject = |x: f32, y: f32| {
            let p = world_from_clip * Vec4::new(x, y, 0.0, 1.0);
            p.truncate() / p.w
        };

        let eye_depth = fwd.dot(eye);
        let slice_planes = |z: u32| {
            let znear = self.slice_depth(z, res_z);
            let zfar = self.slice_depth(z + 1, res_z);
            (Plane::new(fwd, -(eye_depth + znear)), Plane::new(-fwd, eye_depth + zfar))
        };

        // Slice 0 computes the side planes; deeper slices copy them from it.
        let (near, far) = slice_planes(0);
        let facing = |pl: Plane, inside: Vec3| {
            if pl.distance(inside) < 0.0 {
                pl.flipped()
            } else {
                pl
            }
        };
        for y in 0..res_y {
            let ybot = -1.0 + y as f32 * grid[1];
            let ytop = -1.0 + (y + 1) as f32 * grid[1];
            // Top and bottom are shared by the whole row.
            let (l0, l1) = (unproject(-1.0, ybot), unproject(-1.0, ytop));
            let (r0, r1) = (unproject(1.0, ybot), unproject(1.0, ytop));
            let row_inside = 0.25 * (l0 + l1 + r0 + r1);
            let top = facing(Plane::from_points(eye, l1, r1), row_inside);
            let bottom = facing(Plane::from_points(eye, r0, l0), row_inside);
            for x in 0..res_x {
                let xl = -1.0 + x as f32 * grid[0];
                let xr = -1.0 + (x + 1) as f32 * grid[0];
                let p0 = unproject(xl, ybot);
                let p1 = unproject(xl, ytop);
                let p2 = unproject(xr, ytop);
                let p3 = unproject(xr, ybot);
                let inside = 0.25 * (p0 + p1 + p2 + p3);
                let mut planes = [Plane::default(); 6];
                planes[Frustum::LEFT] = facing(Plane::from_points(eye, p0, p1), inside);
                planes[Frustum::RIGHT] = facing(Plane::from_points(eye, p2, p3), inside);
                planes[Frustum::TOP] = top;
                planes[Frustum::BOTTOM] = bottom;
                planes[Frustum::NEAR] = near;
                planes[Frustum::FAR] = far;
                out.push(Frustum { planes });
            }
        }

        let per_slice = out.len();
        for z in 1..res_z {
            let (near, far) = slice_planes(z);
            for i in 0..per_slice {
                let mut cell = out[i];
                cell.planes[Frustum::NEAR] = near;
                cell.planes[Frustum::FAR] = far;
                out.push(cell);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frustum::VisResult;
    use crate::types::Aabb;

    fn looking_down_neg_z() -> Camera {
        Camera::perspective(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 90.0, 1.0, 1.0, 100.0)
    }

    #[test]
    fn forward_matches_look_direction() {
        let cam = looking_down_neg_z();
        assert!((cam.forward() - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn frustum_sees_object_in_front_only() {
        let cam = looking_down_neg_z();
        let front = Aabb::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        let behind = Aabb::new(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
        assert_eq!(cam.frustum().check_aabb(&front), VisResult::Full);
        assert_eq!(cam.frustum().check_aabb(&behind), VisResult::Invisible);
    }

    #[test]
    fn bounding_sphere_contains_far_corners() {
        let cam = looking_down_neg_z();
        let (center, radius) = cam.bounding_sphere();
        // 90 degree fov, aspect 1: far corners at (+-100, +-100, -100).
        let corner = Vec3::new(100.0, 100.0, -100.0);
        assert!(center.distance(corner) <= radius + 1e-2);
        assert!(center.distance(Vec3::new(0.0, 0.0, -1.0)) <= radius + 1e-2);
    }

    #[test]
    fn sub_frustums_partition_the_view() {
        let cam = looking_down_neg_z();
        let mut cells = Vec::new();
        cam.extract_sub_frustums(4, 2, 3, &mut cells);
        assert_eq!(cells.len(), 4 * 2 * 3);

        // A point slightly right of center, in the bottom half, at depth 2 lands in
        // exactly one cell: x = 2, y = 0, slice 0 (slices end at 100^(1/3) ~ 4.64).
        let p = Vec3::new(0.2, -0.5, -2.0);
        let hits: Vec<usize> = cells
            .iter()
            .enumerate()
            .filter(|(_, f)| f.check_point(p) != VisResult::Invisible)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(hits, vec![2]);
    }

    #[test]
    fn sub_frustums_reuse_the_output_buffer() {
        let cam = looking_down_neg_z();
        let mut cells = Vec::new();
        cam.extract_sub_frustums(4, 2, 3, &mut cells);
        let (ptr, capacity) = (cells.as_ptr(), cells.capacity());
        cam.extract_sub_frustums(4, 2, 3, &mut cells);
        assert_eq!(cells.as_ptr(), ptr);
        assert_eq!(cells.capacity(), capacity);

        // Deeper slices share the side planes of the first one.
        for i in 0..8 {
            for side in [Frustum::LEFT, Frustum::RIGHT, Frustum::TOP, Frustum::BOTTOM] {
                assert_eq!(cells[i].planes[side], cells[16 + i].planes[side]);
            }
            assert_ne!(cells[i].planes[Frustum::FAR], cells[16 + i].planes[Frustum::FAR]);
        }

        cam.extract_sub_frustums(0, 2, 3, &mut cells);
        assert!(cells.is_empty());
    }

    #[test]
    fn slice_depths_are_exponential() {
        let cam = looking_down_neg_z();
        assert!((cam.slice_depth(0, 2) - 1.0).abs() < 1e-5);
        assert!((cam.slice_depth(1, 2) - 10.0).abs() < 1e-3);
        assert!((cam.slice_depth(2, 2) - 100.0).abs() < 1e-2);
    }

    #[test]
    fn depth_range_keeps_view() {
        let cam = looking_down_neg_z();
        let near_part = cam.with_depth_range(1.0, 10.0);
        assert_eq!(near_part.view_matrix(), cam.view_matrix());
        assert!((near_part.far() - 10.0).abs() < 1e-6);
        let far_box = Aabb::new(Vec3::new(-1.0, -1.0, -51.0), Vec3::new(1.0, 1.0, -49.0));
        assert_eq!(near_part.frustum().check_aabb(&far_box), VisResult::Invisible);
    }
}
