use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};
use scenecull_common::Aabb;
use serde::{Deserialize, Serialize};

use crate::assets::MeshId;

bitflags! {
    /// Which component kinds an object carries, or which of them changed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ComponentMask: u32 {
        const TRANSFORM = 1 << 0;
        const DRAWABLE = 1 << 1;
        const OCCLUDER = 1 << 2;
        const LIGHT_SOURCE = 1 << 3;
        const DECAL = 1 << 4;
        const PROBE = 1 << 5;
        const ANIM_STATE = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DrawableFlags: u32 {
        /// Rendered into shadow maps.
        const VISIBLE_TO_SHADOW = 1 << 0;
    }
}

impl Default for DrawableFlags {
    fn default() -> Self {
        Self::VISIBLE_TO_SHADOW
    }
}

/// Object placement and bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub world_from_object: Mat4,
    pub object_from_world: Mat4,
    /// Bounds in object space.
    pub local_bbox: Aabb,
    /// Tight world-space bounds, derived from `local_bbox`.
    pub world_bbox: Aabb,
}

impl Transform {
    pub fn new(world_from_object: Mat4, local_bbox: Aabb) -> Self {
        let mut tr = Self {
            world_from_object,
            object_from_world: Mat4::IDENTITY,
            local_bbox,
            world_bbox: local_bbox,
        };
        tr.set_matrix(world_from_object);
        tr
    }

    pub fn from_translation(position: Vec3, local_bbox: Aabb) -> Self {
        Self::new(Mat4::from_translation(position), local_bbox)
    }

    /// Replace the matrix and refresh the derived world bounds.
    pub fn set_matrix(&mut self, world_from_object: Mat4) {
        self.world_from_object = world_from_object;
        self.object_from_world = world_from_object.inverse();
        self.world_bbox = self.local_bbox.transformed(&world_from_object);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drawable {
    pub mesh: MeshId,
    pub flags: DrawableFlags,
}

impl Drawable {
    pub fn new(mesh: MeshId) -> Self {
        Self {
            mesh,
            flags: DrawableFlags::default(),
        }
    }
}

/// Point or spot light.
///
/// `spot` is the cosine of the cone half-angle; values at or below zero
/// describe an omni light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightSource {
    /// Position in object space.
    pub offset: Vec3,
    /// Cone axis in object space, pointing where the light shines.
    pub dir: Vec3,
    pub color: Vec3,
    /// Radius of the emitter itself.
    pub radius: f32,
    /// Distance beyond which the light contributes nothing.
    pub influence: f32,
    pub spot: f32,
    /// Radius of the cone's cap at `influence` distance.
    pub cap_radius: f32,
    pub cast_shadow: bool,
}

impl LightSource {
    pub fn point(color: Vec3, radius: f32, influence: f32) -> Self {
        Self {
            offset: Vec3::ZERO,
            dir: Vec3::NEG_Y,
            color,
            radius,
            influence,
            spot: 0.0,
            cap_radius: influence,
            cast_shadow: false,
        }
    }

    pub fn spot(color: Vec3, radius: f32, influence: f32, dir: Vec3, half_angle_deg: f32) -> Self {
        let half = half_angle_deg.to_radians();
        Self {
            offset: Vec3::ZERO,
            dir: dir.normalize_or_zero(),
            color,
            radius,
            influence,
            spot: half.cos(),
            cap_radius: influence * half.tan(),
            cast_shadow: false,
        }
    }

    pub fn with_shadow(mut self) -> Self {
        self.cast_shadow = true;
        self
    }

    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }

    pub fn is_spot(&self) -> bool {
        self.spot > f32::EPSILON
    }
}

/// Projected decal. Its volume is the unit clip cube of `proj * view`,
/// expressed in the owning object's space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decal {
    pub view: Mat4,
    pub proj: Mat4,
    /// Atlas rectangles `(x, y, w, h)` in normalized units.
    pub diffuse: Vec4,
    pub normal: Vec4,
    pub specular: Vec4,
}

impl Decal {
    /// Box decal of half-size `extent`, projecting along the object's -Z.
    pub fn boxed(extent: Vec3) -> Self {
        Self {
            view: Mat4::IDENTITY,
            proj: Mat4::orthographic_rh_gl(
                -extent.x, extent.x, -extent.y, extent.y, -extent.z, extent.z,
            ),
            diffuse: Vec4::ZERO,
            normal: Vec4::ZERO,
            specular: Vec4::ZERO,
        }
    }
}

/// Reflection / irradiance probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub offset: Vec3,
    pub radius: f32,
    /// Layer of the probe cubemap array.
    pub layer: u32,
    /// Second-order spherical harmonics (4 RGB coefficients).
    pub sh_coeffs: [Vec3; 4],
}

impl Probe {
    pub fn new(radius: f32, layer: u32) -> Self {
        Self {
            offset: Vec3::ZERO,
            radius,
            layer,
            sh_coeffs: [Vec3::ZERO; 4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occluder {
    pub mesh: MeshId,
}

/// Current pose of a skinned object: one matrix per bone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimState {
    pub palette: Vec<Mat4>,
}
