use scenecull_common::{Aabb, ObjectId};
use serde::{Deserialize, Serialize};

/// What an arena slot currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Internal { left: u32, right: u32, split_axis: u8 },
    Leaf { object: ObjectId },
    /// Slot is on the free list.
    Free,
}

/// One slot of the BVH arena.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BvhNode {
    pub bbox: Aabb,
    pub parent: Option<u32>,
    pub kind: NodeKind,
}

impl BvhNode {
    pub(crate) fn leaf(object: ObjectId, bbox: Aabb, parent: Option<u32>) -> Self {
        Self {
            bbox,
            parent,
            kind: NodeKind::Leaf { object },
        }
    }

    pub(crate) fn internal(left: u32, right: u32, bbox: Aabb, parent: Option<u32>) -> Self {
        Self {
            bbox,
            parent,
            kind: NodeKind::Internal {
                left,
                right,
                split_axis: 0,
            },
        }
    }

    pub(crate) fn free() -> Self {
        Self {
            bbox: Aabb::EMPTY,
            parent: None,
            kind: NodeKind::Free,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Object owned by this node, if it is a leaf.
    pub fn object(&self) -> Option<ObjectId> {
        match self.kind {
            NodeKind::Leaf { object } => Some(object),
            _ => None,
        }
    }

    /// `(left, right)` if this is an internal node.
    pub fn children(&self) -> Option<(u32, u32)> {
        match self.kind {
            NodeKind::Internal { left, right, .. } => Some((left, right)),
            _ => None,
        }
    }

    pub fn split_axis(&self) -> Option<usize> {
        match self.kind {
            NodeKind::Internal { split_axis, .. } => Some(split_axis as usize),
            _ => None,
        }
    }
}
