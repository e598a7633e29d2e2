use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::types::Aabb;

/// Tolerance used when classifying points against planes.
pub const VIS_EPSILON: f32 = 0.002;

/// Result of a visibility test against a convex volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisResult {
    Invisible,
    Partial,
    Full,
}

/// Side of a plane a point falls on, with [`VIS_EPSILON`] slack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSide {
    Front,
    OnPlane,
    Back,
}

/// Plane `n·p + d = 0`. Points with positive distance are in front.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub n: Vec3,
    pub d: f32,
}

impl Default for Plane {
    fn default() -> Self {
        Self { n: Vec3::Y, d: 0.0 }
    }
}

impl Plane {
    pub fn new(n: Vec3, d: f32) -> Self {
        Self { n, d }
    }

    /// Plane through three points, normal `(b - a) x (c - a)`.
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let n = (b - a).cross(c - a).normalize_or_zero();
        Self { n, d: -n.dot(a) }
    }

    /// Plane from an unnormalized `(a, b, c, d)` row of a clip matrix.
    fn from_row(v: Vec4) -> Self {
        let len = v.truncate().length();
        if len > 0.0 {
            Self {
                n: v.truncate() / len,
                d: v.w / len,
            }
        } else {
            Self::default()
        }
    }

    pub fn distance(&self, p: Vec3) -> f32 {
        self.n.dot(p) + self.d
    }

    pub fn classify(&self, p: Vec3) -> PlaneSide {
        let dist = self.distance(p);
        if dist > VIS_EPSILON {
            PlaneSide::Front
        } else if dist < -VIS_EPSILON {
            PlaneSide::Back
        } else {
            PlaneSide::OnPlane
        }
    }

    pub fn flipped(&self) -> Self {
        Self {
            n: -self.n,
            d: -self.d,
        }
    }
}

/// Convex volume bounded by six inward-facing planes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;
    pub const TOP: usize = 2;
    pub const BOTTOM: usize = 3;
    pub const NEAR: usize = 4;
    pub const FAR: usize = 5;

    /// Extract planes from a `clip_from_world` matrix (Gribb-Hartmann).
    pub fn from_clip_matrix(m: &Mat4) -> Self {
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        let mut planes = [Plane::default(); 6];
        planes[Self::LEFT] = Plane::from_row(r3 + r0);
        planes[Self::RIGHT] = Plane::from_row(r3 - r0);
        planes[Self::TOP] = Plane::from_row(r3 - r1);
        planes[Self::BOTTOM] = Plane::from_row(r3 + r1);
        planes[Self::NEAR] = Plane::from_row(r3 + r2);
        planes[Self::FAR] = Plane::from_row(r3 - r2);
        Self { planes }
    }

    pub fn check_point(&self, p: Vec3) -> VisResult {
        if self.planes.iter().any(|pl| pl.classify(p) == PlaneSide::Back) {
            VisResult::Invisible
        } else {
            VisResult::Full
        }
    }

    /// Classify a point cloud (typically the 8 corners of a transformed box).
    pub fn check_points(&self, points: &[Vec3]) -> VisResult {
        let mut res = VisResult::Full;
        for plane in &self.planes {
            let in_count = points
                .iter()
                .filter(|&&p| plane.classify(p) != PlaneSide::Back)
                .count();
            if in_count == 0 {
                return VisResult::Invisible;
            }
            if in_count != points.len() {
                res = VisResult::Partial;
            }
        }
        res
    }

    pub fn check_aabb(&self, bbox: &Aabb) -> VisResult {
        let corners = bbox.corners();
        let mut res = VisResult::Full;
        for plane in &self.planes {
            let in_count = corners
                .iter()
                .filter(|&&c| plane.distance(c) >= -VIS_EPSILON)
                .count();
            if in_count == 0 {
                return VisResult::Invisible;
            }
            if in_count != 8 {
                res = VisResult::Partial;
            }
        }
        res
    }

    pub fn check_sphere(&self, center: Vec3, radius: f32) -> VisResult {
        let mut res = VisResult::Full;
        for plane in &self.planes {
            let dist = plane.distance(center);
            if dist < -radius {
                return VisResult::Invisible;
            }
            if dist.abs() < radius {
                res = VisResult::Partial;
            }
        }
        res
    }
}
