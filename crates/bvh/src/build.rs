use scenecull_common::{Aabb, ObjectId};

use crate::node::{BvhNode, NodeKind};
use crate::tree::Bvh;

/// Placeholder child index for an internal node whose subtrees are not built yet.
const PENDING: u32 = u32::MAX;

struct BuildTask {
    start: usize,
    end: usize,
    parent: Option<u32>,
    is_left: bool,
}

#[derive(Debug, Clone, Copy)]
struct Split {
    axis: usize,
    /// Number of primitives that go to the first half.
    count: usize,
    cost: f32,
    imbalance: usize,
}

impl Split {
    /// Costs within a relative tolerance count as ties.
    fn better_than(&self, other: &Split) -> bool {
        let tolerance = 1e-5 * other.cost.abs();
        if self.cost < other.cost - tolerance {
            return true;
        }
        (self.cost - other.cost).abs() <= tolerance && self.imbalance < other.imbalance
    }
}

impl Bvh {
    /// Rebuild the tree from scratch with a top-down SAH partition.
    ///
    /// Returns the leaf index of each primitive, in input order.
    pub fn build(&mut self, prims: &[(ObjectId, Aabb)]) -> Vec<u32> {
        let _span = tracing::info_span!("bvh_build", prims = prims.len()).entered();
        self.clear();

        let mut leaves = vec![PENDING; prims.len()];
        if prims.is_empty() {
            return leaves;
        }

        let bounds: Vec<Aabb> = prims.iter().map(|(_, b)| self.leaf_bounds(b)).collect();
        let mut order: Vec<u32> = (0..prims.len() as u32).collect();
        let mut scratch = SplitScratch::default();
        self.nodes.reserve(2 * prims.len() - 1);

        let mut tasks = vec![BuildTask {
            start: 0,
            end: prims.len(),
            parent: None,
            is_left: true,
        }];

        while let Some(task) = tasks.pop() {
            let range = &mut order[task.start..task.end];
            let index = if range.len() == 1 {
                let p = range[0] as usize;
                let leaf = self.alloc(BvhNode::leaf(prims[p].0, bounds[p], task.parent));
                leaves[p] = leaf;
                leaf
            } else {
                let split = scratch.find_split(range, &bounds);
                sort_by_centroid(range, &bounds, split.axis);
                let (lo, hi) = range.split_at(split.count);
                let lo_box = union_of(lo, &bounds);
                let hi_box = union_of(hi, &bounds);

                let axis = Aabb::dominant_axis(hi_box.centroid() - lo_box.centroid());
                let lo_first = lo_box.centroid()[axis] <= hi_box.centroid()[axis];

                let bbox = lo_box.union(&hi_box);
                let mut node = BvhNode::internal(PENDING, PENDING, bbox, task.parent);
                if let NodeKind::Internal { split_axis, .. } = &mut node.kind {
                    *split_axis = axis as u8;
                }
                let index = self.alloc(node);

                let mid = task.start + split.count;
                let (first, second) = if lo_first {
                    ((task.start, mid), (mid, task.end))
                } else {
                    ((mid, task.end), (task.start, mid))
                };
                tasks.push(BuildTask {
                    start: second.0,
                    end: second.1,
                    parent: Some(index),
                    is_left: false,
                });
                tasks.push(BuildTask {
                    start: first.0,
                    end: first.1,
                    parent: Some(index),
                    is_left: true,
                });
                index
            };

            match task.parent {
                Some(p) => self.set_child(p, task.is_left, index),
                None => self.root = Some(index),
            }
        }

        tracing::debug!(nodes = self.nodes.len(), "bvh built");
        leaves
    }

    fn set_child(&mut self, parent: u32, is_left: bool, child: u32) {
        if let NodeKind::Internal { left, right, .. } = &mut self.nodes[parent as usize].kind {
            if is_left {
                *left = child;
            } else {
                *right = child;
            }
        }
    }
}

#[derive(Default)]
struct SplitScratch {
    sorted: Vec<u32>,
    right_areas: Vec<f32>,
}

impl SplitScratch {
    /// Cheapest SAH split over the three axes. Ties go to the most balanced split.
    fn find_split(&mut self, range: &[u32], bounds: &[Aabb]) -> Split {
        let n = range.len();
        let mut best = Split {
            axis: 0,
            count: n / 2,
            cost: f32::INFINITY,
            imbalance: usize::MAX,
        };

        for axis in 0..3 {
            self.sorted.clear();
            self.sorted.extend_from_slice(range);
            sort_by_centroid(&mut self.sorted, bounds, axis);

            self.right_areas.clear();
            self.right_areas.resize(n, 0.0);
            let mut acc = Aabb::EMPTY;
            for i in (1..n).rev() {
                acc = acc.union(&bounds[self.sorted[i] as usize]);
                self.right_areas[i] = acc.surface_area();
            }

            let mut left = Aabb::EMPTY;
            for count in 1..n {
                left = left.union(&bounds[self.sorted[count - 1] as usize]);
                let cost = count as f32 * left.surface_area()
                    + (n - count) as f32 * self.right_areas[count];
                let candidate = Split {
                    axis,
                    count,
                    cost,
                    imbalance: (2 * count).abs_diff(n),
                };
                if candidate.better_than(&best) {
                    best = candidate;
                }
            }
        }
        best
    }
}

fn sort_by_centroid(range: &mut [u32], bounds: &[Aabb], axis: usize) {
    range.sort_by(|&a, &b| {
        let ca = bounds[a as usize].centroid()[axis];
        let cb = bounds[b as usize].centroid()[axis];
        ca.total_cmp(&cb).then(a.cmp(&b))
    });
}

fn union_of(range: &[u32], bounds: &[Aabb]) -> Aabb {
    range
        .iter()
        .fold(Aabb::EMPTY, |acc, &i| acc.union(&bounds[i as usize]))
}
