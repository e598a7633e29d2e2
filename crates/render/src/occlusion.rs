//! Software depth buffer for occlusion culling.
//!
//! Occluder meshes are rasterized into a small depth-only target before the
//! main traversal. Occludee boxes are then tested against it conservatively:
//! a box is hidden only if every texel its screen rectangle touches already
//! holds something nearer than the box's nearest point.

use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};
use scenecull_common::{Aabb, Camera};

/// Slack added to stored depth before comparing an occludee against it.
pub const DEPTH_BIAS: f32 = 1e-4;

#[derive(Debug, Clone)]
pub struct OcclusionBuffer {
    width: usize,
    height: usize,
    depth: Vec<f32>,
    clip_from_world: Mat4,
    polygon: Vec<Vec4>,
}

/// Screen-space vertex: pixel coordinates plus depth in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    z: f32,
}

impl OcclusionBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            depth: vec![1.0; width * height],
            clip_from_world: Mat4::IDENTITY,
            polygon: Vec::with_capacity(8),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Depth values, row-major with row 0 at the bottom of the screen.
    pub fn depth(&self) -> &[f32] {
        &self.depth
    }

    /// Reset to the far plane and set the view used by later calls.
    pub fn clear(&mut self, clip_from_world: Mat4) {
        self.depth.fill(1.0);
        self.clip_from_world = clip_from_world;
    }

    /// Rasterize an indexed triangle mesh. Returns the triangles that
    /// survived near-plane clipping.
    pub fn rasterize_mesh(&mut self, world_from_object: &Mat4, positions: &[Vec3], indices: &[u32]) -> usize {
        let clip_from_object = self.clip_from_world * *world_from_object;
        let mut drawn = 0;
        for tri in indices.chunks_exact(3) {
            let mut v = [Vec4::ZERO; 3];
            let mut valid = true;
            for (slot, &i) in v.iter_mut().zip(tri) {
                match positions.get(i as usize) {
                    Some(p) => *slot = clip_from_object * p.extend(1.0),
                    None => valid = false,
                }
            }
            if valid && self.rasterize_clip_triangle(v) {
                drawn += 1;
            }
        }
        drawn
    }

    fn rasterize_clip_triangle(&mut self, tri: [Vec4; 3]) -> bool {
        // Sutherland-Hodgman against the near plane z + w >= 0.
        let mut polygon = std::mem::take(&mut self.polygon);
        polygon.clear();
        for i in 0..3 {
            let a = tri[i];
            let b = tri[(i + 1) % 3];
            let da = a.z + a.w;
            let db = b.z + b.w;
            if da >= 0.0 {
                polygon.push(a);
            }
            if (da >= 0.0) != (db >= 0.0) {
                let t = da / (da - db);
                polygon.push(a + (b - a) * t);
            }
        }

        let drawn = polygon.len() >= 3;
        if drawn {
            let first = self.to_screen(polygon[0]);
            for pair in polygon[1..].windows(2) {
                let b = self.to_screen(pair[0]);
                let c = self.to_screen(pair[1]);
                self.fill_triangle(first, b, c);
            }
        }
        self.polygon = polygon;
        drawn
    }

    fn to_screen(&self, clip: Vec4) -> ScreenVertex {
        let w = clip.w.max(f32::EPSILON);
        let ndc = clip.xyz() / w;
        ScreenVertex {
            x: (ndc.x * 0.5 + 0.5) * self.width as f32,
            y: (ndc.y * 0.5 + 0.5) * self.height as f32,
            z: (ndc.z * 0.5 + 0.5).max(0.0),
        }
    }

    fn fill_triangle(&mut self, a: ScreenVertex, b: ScreenVertex, c: ScreenVertex) {
        let edge = |p: ScreenVertex, q: ScreenVertex, x: f32, y: f32| (q.x - p.x) * (y - p.y) - (q.y - p.y) * (x - p.x);
        let area = edge(a, b, c.x, c.y);
        if area.abs() <= f32::EPSILON {
            return;
        }
        let inv_area = 1.0 / area;

        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as usize;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as usize;
        let max_x = (a.x.max(b.x).max(c.x).ceil().max(0.0) as usize).min(self.width);
        let max_y = (a.y.max(b.y).max(c.y).ceil().max(0.0) as usize).min(self.height);

        for py in min_y..max_y {
            let y = py as f32 + 0.5;
            let row = py * self.width;
            for px in min_x..max_x {
                let x = px as f32 + 0.5;
                // Normalized barycentrics; dividing by the signed area
                // accepts either winding.
                let w0 = edge(b, c, x, y) * inv_area;
                let w1 = edge(c, a, x, y) * inv_area;
                let w2 = edge(a, b, x, y) * inv_area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let z = w0 * a.z + w1 * b.z + w2 * c.z;
                let texel = &mut self.depth[row + px];
                if z < *texel {
                    *texel = z;
                }
            }
        }
    }

    /// Conservative occludee query.
    pub fn is_box_visible(&self, bbox: &Aabb) -> bool {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for corner in bbox.corners() {
            let clip = self.clip_from_world * corner.extend(1.0);
            if clip.z + clip.w < 0.0 {
                return true;
            }
            let s = self.to_screen(clip);
            min = min.min(Vec3::new(s.x, s.y, s.z));
            max = max.max(Vec3::new(s.x, s.y, s.z));
        }

        let min_x = min.x.floor().max(0.0) as usize;
        let min_y = min.y.floor().max(0.0) as usize;
        let max_x = (max.x.ceil().max(0.0) as usize).min(self.width);
        let max_y = (max.y.ceil().max(0.0) as usize).min(self.height);
        if min_x >= max_x || min_y >= max_y {
            return true;
        }

        let nearest = min.z;
        (min_y..max_y).any(|py| {
            let row = &self.depth[py * self.width + min_x..py * self.width + max_x];
            row.iter().any(|&d| nearest <= d + DEPTH_BIAS)
        })
    }

    /// Linearized depth as 8-bit grey, 0 at the eye and 255 at the far plane.
    pub fn debug_image(&self, camera: &Camera) -> Vec<u8> {
        let (n, f) = (camera.near(), camera.far());
        let ortho = camera.is_orthographic();
        self.depth
            .iter()
            .map(|&d| {
                let ndc = d * 2.0 - 1.0;
                let linear = if ortho {
                    n + d * (f - n)
                } else {
                    2.0 * n * f / (f + n - ndc * (f - n))
                };
                ((linear / f).clamp(0.0, 1.0) * 255.0) as u8
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenecull_scene::Mesh;

    fn camera() -> Camera {
        Camera::perspective(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 90.0, 1.0, 0.5, 100.0)
    }

    fn wall_buffer() -> OcclusionBuffer {
        let cam = camera();
        let mut buf = OcclusionBuffer::new(64, 64);
        buf.clear(cam.clip_from_world());
        let wall = Aabb::new(Vec3::new(-20.0, -20.0, -11.0), Vec3::new(20.0, 20.0, -10.0));
        let (positions, indices) = Mesh::box_geometry(&wall);
        let drawn = buf.rasterize_mesh(&Mat4::IDENTITY, &positions, &indices);
        assert_eq!(drawn, 12);
        buf
    }

    #[test]
    fn wall_hides_box_behind_it() {
        let buf = wall_buffer();
        let behind = Aabb::new(Vec3::new(-1.0, -1.0, -31.0), Vec3::new(1.0, 1.0, -29.0));
        assert!(!buf.is_box_visible(&behind));
        let in_front = Aabb::new(Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -4.0));
        assert!(buf.is_box_visible(&in_front));
    }

    #[test]
    fn empty_buffer_hides_nothing() {
        let cam = camera();
        let mut buf = OcclusionBuffer::new(32, 32);
        buf.clear(cam.clip_from_world());
        let far = Aabb::new(Vec3::new(-1.0, -1.0, -90.0), Vec3::new(1.0, 1.0, -80.0));
        assert!(buf.is_box_visible(&far));
    }

    #[test]
    fn box_crossing_near_plane_is_visible() {
        let buf = wall_buffer();
        let around_eye = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert!(buf.is_box_visible(&around_eye));
    }

    #[test]
    fn triangle_behind_eye_is_clipped_away() {
        let cam = camera();
        let mut buf = OcclusionBuffer::new(16, 16);
        buf.clear(cam.clip_from_world());
        let positions = [Vec3::new(-1.0, 0.0, 5.0), Vec3::new(1.0, 0.0, 5.0), Vec3::new(0.0, 1.0, 5.0)];
        assert_eq!(buf.rasterize_mesh(&Mat4::IDENTITY, &positions, &[0, 1, 2]), 0);
        assert!(buf.depth().iter().all(|&d| d == 1.0));
    }

    #[test]
    fn debug_image_matches_buffer_size() {
        let buf = wall_buffer();
        let image = buf.debug_image(&camera());
        assert_eq!(image.len(), 64 * 64);
        let center = image[32 * 64 + 32];
        // Wall front face is at 10 of 100 units.
        assert!((20..=30).contains(&center), "center texel {center}");
        // The wall fills the whole view.
        assert!(image.iter().all(|&p| p < 255));
    }
}
