use scenecull_bvh::{Bvh, NodeKind};
use scenecull_common::{Aabb, ObjectId, VisResult};

/// Stack entries carrying this bit belong to a subtree already proven fully
/// visible.
pub const SKIP_CHECK_BIT: u32 = 1 << 31;

/// Leaf reached by a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafHit {
    pub object: ObjectId,
    pub node: u32,
    /// The leaf box was fully visible, so per-object tests can be skipped.
    pub skip_check: bool,
}

/// Walk `bvh` with an explicit stack, collecting every leaf `classify` does
/// not reject. Returns the number of nodes classified.
///
/// Subtrees classified [`VisResult::Full`] are descended without further
/// tests.
pub fn collect_leaves(
    bvh: &Bvh,
    stack: &mut Vec<u32>,
    out: &mut Vec<LeafHit>,
    mut classify: impl FnMut(&Aabb) -> VisResult,
) -> usize {
    stack.clear();
    let Some(root) = bvh.root() else {
        return 0;
    };
    stack.push(root);

    let mut tested = 0;
    while let Some(entry) = stack.pop() {
        let skip = entry & SKIP_CHECK_BIT != 0;
        let index = entry & !SKIP_CHECK_BIT;
        let node = bvh.node(index);

        let full = if skip {
            true
        } else {
            tested += 1;
            match classify(&node.bbox) {
                VisResult::Invisible => continue,
                VisResult::Partial => false,
                VisResult::Full => true,
            }
        };

        match node.kind {
            NodeKind::Leaf { object } => out.push(LeafHit {
                object,
                node: index,
                skip_check: full,
            }),
            NodeKind::Internal { left, right, .. } => {
                let bit = if full { SKIP_CHECK_BIT } else { 0 };
                stack.push(right | bit);
                stack.push(left | bit);
            }
            NodeKind::Free => {}
        }
    }
    tested
}
