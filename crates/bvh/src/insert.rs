use std::cmp::Ordering;

use scenecull_common::{Aabb, ObjectId};

use crate::node::BvhNode;
use crate::tree::Bvh;

/// Search-queue entry for the insertion branch-and-bound.
///
/// Ordered so that `BinaryHeap` pops the smallest lower bound first.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    /// Lower bound on the cost of inserting anywhere below `node`.
    lower_bound: f32,
    node: u32,
    /// Area growth of the ancestors if the new leaf lands below `node`.
    inherited: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .lower_bound
            .total_cmp(&self.lower_bound)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl Bvh {
    /// Insert an object and return its leaf index.
    ///
    /// The sibling is chosen by best-first branch-and-bound on total surface
    /// area growth; afterwards boxes are refit and tree rotations applied on
    /// the way up to the root.
    pub fn insert(&mut self, object: ObjectId, tight: &Aabb) -> u32 {
        let bounds = self.leaf_bounds(tight);
        let leaf = self.alloc(BvhNode::leaf(object, bounds, None));

        let Some(root) = self.root else {
            self.root = Some(leaf);
            return leaf;
        };

        let sibling = self.find_best_sibling(root, &bounds);

        let old_parent = self.nodes[sibling as usize].parent;
        let joined = self.nodes[sibling as usize].bbox.union(&bounds);
        let new_parent = self.alloc(BvhNode::internal(sibling, leaf, joined, old_parent));
        self.nodes[sibling as usize].parent = Some(new_parent);
        self.nodes[leaf as usize].parent = Some(new_parent);
        match old_parent {
            Some(p) => self.replace_child(p, sibling, new_parent),
            None => self.root = Some(new_parent),
        }

        let mut cur = Some(new_parent);
        while let Some(i) = cur {
            self.update_bbox(i);
            self.rotate(i);
            self.sort_children(i);
            cur = self.nodes[i as usize].parent;
        }

        leaf
    }

    fn find_best_sibling(&mut self, root: u32, bounds: &Aabb) -> u32 {
        let new_area = bounds.surface_area();
        let mut best = root;
        let mut best_cost = self.nodes[root as usize].bbox.union(bounds).surface_area();

        let mut queue = std::mem::take(&mut self.candidates);
        queue.clear();
        queue.push(Candidate {
            lower_bound: new_area,
            node: root,
            inherited: 0.0,
        });

        while let Some(c) = queue.pop() {
            if c.lower_bound >= best_cost {
                break;
            }
            let node = &self.nodes[c.node as usize];
            let direct = node.bbox.union(bounds).surface_area();
            let cost = direct + c.inherited;
            if cost < best_cost {
                best_cost = cost;
                best = c.node;
            }

            if let Some((l, r)) = node.children() {
                let inherited = c.inherited + direct - node.bbox.surface_area();
                let lower_bound = new_area + inherited;
                if lower_bound < best_cost {
                    for child in [l, r] {
                        queue.push(Candidate {
                            lower_bound,
                            node: child,
                            inherited,
                        });
                    }
                }
            }
        }

        self.candidates = queue;
        best
    }

    /// Try swapping a child with a grandchild on the other side when that
    /// shrinks the intermediate box.
    fn rotate(&mut self, index: u32) {
        let Some((l, r)) = self.nodes[index as usize].children() else {
            return;
        };
        if let Some((rl, rr)) = self.nodes[r as usize].children() {
            let left = self.nodes[l as usize].bbox;
            let base = self.nodes[r as usize].bbox.surface_area();
            let keep_rr = left.union(&self.nodes[rr as usize].bbox).surface_area();
            let keep_rl = left.union(&self.nodes[rl as usize].bbox).surface_area();
            if keep_rr < base && keep_rr <= keep_rl {
                self.swap_with_grandchild(index, l, r, rl);
            } else if keep_rl < base {
                self.swap_with_grandchild(index, l, r, rr);
            }
        }

        let Some((l, r)) = self.nodes[index as usize].children() else {
            return;
        };
        if let Some((ll, lr)) = self.nodes[l as usize].children() {
            let right = self.nodes[r as usize].bbox;
            let base = self.nodes[l as usize].bbox.surface_area();
            let keep_lr = right.union(&self.nodes[lr as usize].bbox).surface_area();
            let keep_ll = right.union(&self.nodes[ll as usize].bbox).surface_area();
            if keep_lr < base && keep_lr <= keep_ll {
                self.swap_with_grandchild(index, r, l, ll);
            } else if keep_ll < base {
                self.swap_with_grandchild(index, r, l, lr);
            }
        }
    }

    /// `child` (under `node`) and `grandchild` (under `via`) trade places.
    fn swap_with_grandchild(&mut self, node: u32, child: u32, via: u32, grandchild: u32) {
        self.replace_child(node, child, grandchild);
        self.replace_child(via, grandchild, child);
        self.nodes[grandchild as usize].parent = Some(node);
        self.nodes[child as usize].parent = Some(via);
        self.update_bbox(via);
        self.sort_children(via);
    }
}
