//! World-space influence volumes of lights, decals and probes, and their
//! conservative plane tests.

use glam::{Mat4, Vec3};
use scenecull_common::{Aabb, Plane};
use scenecull_scene::{Decal, LightSource, Probe, Transform};

/// Slack on the spot cone cap test.
const CONE_EPSILON: f32 = 0.001;

/// Light sphere, optionally narrowed to a cone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightVolume {
    pub pos: Vec3,
    pub axis: Vec3,
    pub radius: f32,
    pub influence: f32,
    /// Cosine of the cone half-angle; zero or less for omni lights.
    pub spot: f32,
    pub cap_radius: f32,
}

impl LightVolume {
    pub fn new(light: &LightSource, tr: &Transform) -> Self {
        Self {
            pos: tr.world_from_object.transform_point3(light.offset),
            axis: tr.world_from_object.transform_vector3(light.dir).normalize_or_zero(),
            radius: light.radius,
            influence: light.influence,
            spot: light.spot,
            cap_radius: light.cap_radius,
        }
    }

    pub fn is_spot(&self) -> bool {
        self.spot > f32::EPSILON
    }

    /// True if nothing the light reaches is in front of `plane`.
    pub fn outside_plane(&self, plane: &Plane) -> bool {
        let dist = plane.distance(self.pos);
        if dist < -self.influence {
            return true;
        }
        if self.is_spot() && dist < -self.radius {
            // Point of the cone cap furthest along the plane normal.
            let m = self.axis.cross(self.axis.cross(plane.n)).normalize_or_zero();
            let cap = self.pos + self.influence * self.axis - self.cap_radius * m;
            return plane.distance(cap) < -CONE_EPSILON;
        }
        false
    }

    pub fn outside_any(&self, planes: &[Plane]) -> bool {
        planes.iter().any(|p| self.outside_plane(p))
    }

    pub fn bbox(&self) -> Aabb {
        Aabb::new(self.pos - Vec3::splat(self.influence), self.pos + Vec3::splat(self.influence))
    }
}

/// Decal projection box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecalVolume {
    pub corners: [Vec3; 8],
    pub bbox: Aabb,
    /// Decal clip space from world space.
    pub clip_from_world: Mat4,
}

impl DecalVolume {
    pub fn new(decal: &Decal, tr: &Transform) -> Self {
        let clip_from_world = decal.proj * decal.view * tr.object_from_world;
        let world_from_clip = clip_from_world.inverse();
        let corners = Aabb::new(Vec3::splat(-1.0), Vec3::ONE)
            .corners()
            .map(|c| world_from_clip.project_point3(c));
        Self {
            corners,
            bbox: Aabb::from_points(&corners),
            clip_from_world,
        }
    }

    pub fn outside_plane(&self, plane: &Plane) -> bool {
        points_outside_plane(&self.corners, plane)
    }
}

/// Probe influence sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeVolume {
    pub pos: Vec3,
    pub radius: f32,
}

impl ProbeVolume {
    pub fn new(probe: &Probe, tr: &Transform) -> Self {
        Self {
            pos: tr.world_from_object.transform_point3(probe.offset),
            radius: probe.radius,
        }
    }

    pub fn outside_plane(&self, plane: &Plane) -> bool {
        plane.distance(self.pos) < -self.radius
    }

    pub fn bbox(&self) -> Aabb {
        Aabb::new(self.pos - Vec3::splat(self.radius), self.pos + Vec3::splat(self.radius))
    }
}

/// True if no point is on or in front of `plane`.
pub fn points_outside_plane(points: &[Vec3], plane: &Plane) -> bool {
    points.iter().all(|&p| plane.distance(p) < 0.0)
}
