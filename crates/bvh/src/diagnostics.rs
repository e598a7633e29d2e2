use crate::node::NodeKind;
use crate::tree::Bvh;

/// A structural defect found by [`Bvh::validate`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeInvariantError {
    #[error("root node {0} has a parent")]
    RootHasParent(u32),
    #[error("node {child} should have parent {expected:?}, found {found:?}")]
    BrokenParentLink {
        child: u32,
        expected: Option<u32>,
        found: Option<u32>,
    },
    #[error("node {node} does not contain child {child}")]
    ChildNotContained { node: u32, child: u32 },
    #[error("node {0} is not the union of its children")]
    LooseBounds(u32),
    #[error("node {0} is reachable more than once")]
    Cycle(u32),
    #[error("node {0} is reached from the root but marked free")]
    ReachableFreeNode(u32),
    #[error("node {0} is neither reachable nor on the free list")]
    Orphaned(u32),
    #[error("free list entry {0} is not a free node")]
    LiveNodeOnFreeList(u32),
    #[error("free list contains {0} twice")]
    DuplicateFreeEntry(u32),
    #[error("child index {0} is outside the arena")]
    OutOfBounds(u32),
}

/// Shape summary of a tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    pub free: usize,
    pub depth: usize,
    /// Sum of internal node areas relative to the root area.
    pub sah_cost: f32,
}

impl std::fmt::Display for TreeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BVH: nodes={} leaves={} free={} depth={} sah={:.2}",
            self.nodes, self.leaves, self.free, self.depth, self.sah_cost
        )
    }
}

impl Bvh {
    /// Walk the whole arena and check every structural invariant.
    pub fn validate(&self) -> Result<(), TreeInvariantError> {
        let len = self.nodes.len();
        let mut seen = vec![false; len];

        if let Some(root) = self.root {
            if root as usize >= len {
                return Err(TreeInvariantError::OutOfBounds(root));
            }
            if self.nodes[root as usize].parent.is_some() {
                return Err(TreeInvariantError::RootHasParent(root));
            }
            let mut stack = vec![root];
            while let Some(i) = stack.pop() {
                if seen[i as usize] {
                    return Err(TreeInvariantError::Cycle(i));
                }
                seen[i as usize] = true;
                let node = &self.nodes[i as usize];
                match node.kind {
                    NodeKind::Free => return Err(TreeInvariantError::ReachableFreeNode(i)),
                    NodeKind::Leaf { .. } => {}
                    NodeKind::Internal { left, right, .. } => {
                        for child in [left, right] {
                            let Some(c) = self.nodes.get(child as usize) else {
                                return Err(TreeInvariantError::OutOfBounds(child));
                            };
                            if c.parent != Some(i) {
                                return Err(TreeInvariantError::BrokenParentLink {
                                    child,
                                    expected: Some(i),
                                    found: c.parent,
                                });
                            }
                            if !node.bbox.contains(&c.bbox) {
                                return Err(TreeInvariantError::ChildNotContained {
                                    node: i,
                                    child,
                                });
                            }
                            stack.push(child);
                        }
                        // Leaf boxes already carry the margin, so the union is exact.
                        let union = self.nodes[left as usize].bbox.union(&self.nodes[right as usize].bbox);
                        if node.bbox != union {
                            return Err(TreeInvariantError::LooseBounds(i));
                        }
                    }
                }
            }
        }

        let mut on_free_list = vec![false; len];
        for &f in &self.free_nodes {
            let Some(node) = self.nodes.get(f as usize) else {
                return Err(TreeInvariantError::OutOfBounds(f));
            };
            if on_free_list[f as usize] {
                return Err(TreeInvariantError::DuplicateFreeEntry(f));
            }
            on_free_list[f as usize] = true;
            if node.kind != NodeKind::Free {
                return Err(TreeInvariantError::LiveNodeOnFreeList(f));
            }
        }

        match (0..len).find(|&i| !seen[i] && !on_free_list[i]) {
            Some(i) => Err(TreeInvariantError::Orphaned(i as u32)),
            None => Ok(()),
        }
    }

    /// Number of levels from the root to the deepest leaf (0 for an empty tree).
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 1usize)];
        while let Some((i, level)) = stack.pop() {
            deepest = deepest.max(level);
            if let Some((l, r)) = self.nodes[i as usize].children() {
                stack.push((l, level + 1));
                stack.push((r, level + 1));
            }
        }
        deepest
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    pub fn stats(&self) -> TreeStats {
        let root_area = self
            .root_bounds()
            .map(|b| b.surface_area())
            .unwrap_or_default();
        let internal_area: f32 = self
            .nodes
            .iter()
            .filter(|n| n.children().is_some())
            .map(|n| n.bbox.surface_area())
            .sum();
        TreeStats {
            nodes: self.node_count(),
            leaves: self.leaf_count(),
            free: self.free_count(),
            depth: self.depth(),
            sah_cost: if root_area > 0.0 {
                internal_area / root_area
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BvhNode;
    use glam::Vec3;
    use scenecull_common::{Aabb, ObjectId};

    fn cube(x: f32) -> Aabb {
        Aabb::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn insert_remove_round_trip_restores_node_count() {
        let mut bvh = Bvh::new();
        for i in 0..10 {
            bvh.insert(ObjectId(i), &cube(i as f32 * 4.0));
        }
        let before = bvh.node_count();

        let leaves: Vec<u32> = (0..25)
            .map(|i| bvh.insert(ObjectId(100 + i), &cube(i as f32 * 1.5 - 7.0)))
            .collect();
        bvh.validate().unwrap();
        for leaf in leaves {
            bvh.remove(leaf);
            bvh.validate().unwrap();
        }

        assert_eq!(bvh.node_count(), before);
        assert_eq!(bvh.node_count() + bvh.free_count(), bvh.arena_len());
    }

    #[test]
    fn detects_broken_containment() {
        let mut bvh = Bvh::new();
        let a = bvh.insert(ObjectId(0), &cube(0.0));
        bvh.insert(ObjectId(1), &cube(5.0));
        bvh.nodes[a as usize].bbox = cube(50.0);
        assert!(matches!(
            bvh.validate(),
            Err(TreeInvariantError::ChildNotContained { .. })
        ));
    }

    #[test]
    fn detects_stale_loose_parent() {
        let mut bvh = Bvh::new();
        for i in 0..4 {
            bvh.insert(ObjectId(i), &cube(i as f32 * 3.0));
        }
        bvh.validate().unwrap();

        let root = bvh.root().unwrap();
        let loose = bvh.nodes[root as usize].bbox.enlarged(1.0);
        bvh.nodes[root as usize].bbox = loose;
        assert_eq!(bvh.validate(), Err(TreeInvariantError::LooseBounds(root)));
    }

    #[test]
    fn refit_after_moves_keeps_exact_bounds() {
        let mut bvh = Bvh::new();
        let mut leaves: Vec<u32> = (0..16).map(|i| bvh.insert(ObjectId(i), &cube(i as f32 * 2.0))).collect();
        for (i, leaf) in leaves.iter_mut().enumerate().step_by(3) {
            bvh.remove(*leaf);
            *leaf = bvh.insert(ObjectId(i as u32), &cube(40.0 - i as f32 * 5.0));
            bvh.validate().unwrap();
        }
    }

    #[test]
    fn detects_orphans() {
        let mut bvh = Bvh::new();
        bvh.insert(ObjectId(0), &cube(0.0));
        bvh.nodes.push(BvhNode::free());
        assert_eq!(bvh.validate(), Err(TreeInvariantError::Orphaned(1)));
    }

    #[test]
    fn stats_summary() {
        let mut bvh = Bvh::new();
        for i in 0..4 {
            bvh.insert(ObjectId(i), &cube(i as f32 * 2.0));
        }
        let stats = bvh.stats();
        assert_eq!(stats.nodes, 7);
        assert_eq!(stats.leaves, 4);
        assert!(stats.depth >= 3);
        assert!(stats.sah_cost >= 1.0);
        assert!(stats.to_string().starts_with("BVH: nodes=7"));
    }
}
