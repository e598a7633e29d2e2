use std::collections::BinaryHeap;

use scenecull_common::{Aabb, ObjectId};

use crate::insert::Candidate;
use crate::node::{BvhNode, NodeKind};

/// Fraction of the tight extent added on each side of a leaf box.
pub const DEFAULT_MARGIN: f32 = 0.2;

/// Arena-backed dynamic BVH with one object per leaf.
#[derive(Debug, Clone)]
pub struct Bvh {
    pub(crate) nodes: Vec<BvhNode>,
    pub(crate) root: Option<u32>,
    pub(crate) free_nodes: Vec<u32>,
    margin: f32,
    /// Reused priority queue for the insertion search.
    pub(crate) candidates: BinaryHeap<Candidate>,
}

impl Default for Bvh {
    fn default() -> Self {
        Self::new()
    }
}

impl Bvh {
    pub fn new() -> Self {
        Self::with_margin(DEFAULT_MARGIN)
    }

    pub fn with_margin(margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            free_nodes: Vec::new(),
            margin,
            candidates: BinaryHeap::new(),
        }
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// Drop every node, keeping allocations.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_nodes.clear();
        self.root = None;
    }

    pub fn root(&self) -> Option<u32> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Node at `index`. Panics if the index is outside the arena.
    pub fn node(&self, index: u32) -> &BvhNode {
        &self.nodes[index as usize]
    }

    pub fn get(&self, index: u32) -> Option<&BvhNode> {
        self.nodes.get(index as usize)
    }

    /// The whole arena, free slots included.
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Number of live (non-free) nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_nodes.len()
    }

    /// Bounding box of the whole tree.
    pub fn root_bounds(&self) -> Option<Aabb> {
        self.root.map(|r| self.nodes[r as usize].bbox)
    }

    /// Leaf box stored for an object with the given tight bounds.
    pub fn leaf_bounds(&self, tight: &Aabb) -> Aabb {
        tight.enlarged(self.margin)
    }

    /// True if the tight bounds still fit inside the leaf's enlarged box.
    pub fn fits(&self, leaf: u32, tight: &Aabb) -> bool {
        self.get(leaf)
            .is_some_and(|n| n.is_leaf() && n.bbox.contains(tight))
    }

    /// Iterate `(leaf index, object)` over every live leaf.
    pub fn leaves(&self) -> impl Iterator<Item = (u32, ObjectId)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.object().map(|o| (i as u32, o)))
    }

    /// Remove a leaf. Its sibling takes the parent's place and both the leaf
    /// and the parent go back to the free list.
    pub fn remove(&mut self, leaf: u32) {
        if !self.get(leaf).is_some_and(BvhNode::is_leaf) {
            debug_assert!(false, "remove called on non-leaf node {leaf}");
            return;
        }

        let Some(parent) = self.nodes[leaf as usize].parent else {
            self.root = None;
            self.release(leaf);
            return;
        };

        let sibling = match self.nodes[parent as usize].children() {
            Some((l, r)) if l == leaf => r,
            Some((l, _)) => l,
            None => {
                debug_assert!(false, "leaf {leaf} has a non-internal parent");
                return;
            }
        };

        let grand = self.nodes[parent as usize].parent;
        self.nodes[sibling as usize].parent = grand;
        match grand {
            Some(g) => {
                self.replace_child(g, parent, sibling);
                self.refit_upwards(g);
            }
            None => self.root = Some(sibling),
        }

        self.release(parent);
        self.release(leaf);
        tracing::trace!(leaf, parent, "bvh leaf removed");
    }

    pub(crate) fn alloc(&mut self, node: BvhNode) -> u32 {
        match self.free_nodes.pop() {
            Some(i) => {
                self.nodes[i as usize] = node;
                i
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        }
    }

    pub(crate) fn release(&mut self, index: u32) {
        self.nodes[index as usize] = BvhNode::free();
        self.free_nodes.push(index);
    }

    pub(crate) fn replace_child(&mut self, parent: u32, old: u32, new: u32) {
        if let NodeKind::Internal { left, right, .. } = &mut self.nodes[parent as usize].kind {
            if *left == old {
                *left = new;
            } else if *right == old {
                *right = new;
            }
        }
    }

    /// Recompute an internal node's box from its children.
    pub(crate) fn update_bbox(&mut self, index: u32) {
        if let Some((l, r)) = self.nodes[index as usize].children() {
            let bbox = self.nodes[l as usize]
                .bbox
                .union(&self.nodes[r as usize].bbox);
            self.nodes[index as usize].bbox = bbox;
        }
    }

    /// Pick the split axis from the children's centroids and order them along it.
    pub(crate) fn sort_children(&mut self, index: u32) {
        let Some((l, r)) = self.nodes[index as usize].children() else {
            return;
        };
        let cl = self.nodes[l as usize].bbox.centroid();
        let cr = self.nodes[r as usize].bbox.centroid();
        let axis = Aabb::dominant_axis(cr - cl);
        let swap = cl[axis] > cr[axis];
        if let NodeKind::Internal {
            left,
            right,
            split_axis,
        } = &mut self.nodes[index as usize].kind
        {
            *split_axis = axis as u8;
            if swap {
                std::mem::swap(left, right);
            }
        }
    }

    /// Refit boxes and child order from `start` up to the root.
    pub(crate) fn refit_upwards(&mut self, start: u32) {
        let mut cur = Some(start);
        while let Some(i) = cur {
            self.update_bbox(i);
            self.sort_children(i);
            cur = self.nodes[i as usize].parent;
        }
    }
}
