//! Spatial index: a dynamic bounding volume hierarchy over scene objects.
//!
//! Nodes live in a flat arena addressed by `u32` index, with a free list for
//! reuse. Every leaf owns exactly one object and stores that object's bounds
//! enlarged by a margin, so small motions can be absorbed without touching
//! the tree.
//!
//! # Invariants
//! - Every internal node's box contains both children's boxes.
//! - Parent and child links are symmetric; the root has no parent.
//! - Every arena slot is either reachable from the root or on the free list.
//! - Children of an internal node are ordered along its split axis.

mod build;
mod diagnostics;
mod insert;
mod node;
mod tree;

pub use diagnostics::{TreeInvariantError, TreeStats};
pub use node::{BvhNode, NodeKind};
pub use tree::{Bvh, DEFAULT_MARGIN};

pub fn crate_info() -> &'static str {
    "scenecull-bvh v0.1.0"
}
