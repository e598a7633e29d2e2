//! Shared math: bounding boxes, planes, frusta and cameras.
//!
//! # Invariants
//! - Frustum planes are normalized and point inward (positive distance is inside).
//! - Clip space follows the GL convention (`z` in `[-w, w]`).
//! - Matrices are column-major `glam::Mat4`, right-handed.

mod camera;
mod frustum;
mod types;

pub use camera::{Camera, Projection};
pub use frustum::{Frustum, Plane, PlaneSide, VisResult, VIS_EPSILON};
pub use types::{Aabb, ObjectId};

pub fn crate_info() -> &'static str {
    "scenecull-common v0.1.0"
}
