//! Binary-tree rectangle packer.
//!
//! Each allocation splits a free leaf into an exact-size child and the
//! remainder. Freeing a rectangle merges sibling leaves back together, so a
//! fully freed atlas returns to a single root.

/// Allocated rectangle; `node` identifies it for [`AtlasPacker::free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasRect {
    pub pos: [u32; 2],
    pub size: [u32; 2],
    pub node: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PackNode {
    pos: [u32; 2],
    size: [u32; 2],
    parent: Option<u32>,
    children: Option<[u32; 2]>,
    occupied: bool,
}

impl PackNode {
    fn is_free_leaf(&self) -> bool {
        self.children.is_none() && !self.occupied
    }

    fn fits(&self, w: u32, h: u32) -> bool {
        self.size[0] >= w && self.size[1] >= h
    }
}

#[derive(Debug, Clone)]
pub struct AtlasPacker {
    width: u32,
    height: u32,
    nodes: Vec<PackNode>,
    free_slots: Vec<u32>,
    stack: Vec<u32>,
}

impl AtlasPacker {
    pub fn new(width: u32, height: u32) -> Self {
        let mut packer = Self {
            width,
            height,
            nodes: Vec::new(),
            free_slots: Vec::new(),
            stack: Vec::new(),
        };
        packer.clear();
        packer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Free everything.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_slots.clear();
        self.nodes.push(PackNode {
            pos: [0, 0],
            size: [self.width, self.height],
            parent: None,
            children: None,
            occupied: false,
        });
    }

    /// Find room for a `w` x `h` rectangle, depth first.
    pub fn allocate(&mut self, w: u32, h: u32) -> Option<AtlasRect> {
        if w == 0 || h == 0 {
            return None;
        }

        self.stack.clear();
        self.stack.push(0);
        let mut found = None;
        while let Some(i) = self.stack.pop() {
            let node = self.nodes[i as usize];
            if !node.fits(w, h) || node.occupied {
                continue;
            }
            match node.children {
                Some([a, b]) => {
                    self.stack.push(b);
                    self.stack.push(a);
                }
                None => {
                    found = Some(i);
                    break;
                }
            }
        }

        let mut i = found?;
        loop {
            let node = self.nodes[i as usize];
            if node.size == [w, h] {
                self.nodes[i as usize].occupied = true;
                return Some(AtlasRect {
                    pos: node.pos,
                    size: node.size,
                    node: i,
                });
            }
            let [x, y] = node.pos;
            let [nw, nh] = node.size;
            let (first, second) = if nw - w > nh - h {
                (([x, y], [w, nh]), ([x + w, y], [nw - w, nh]))
            } else {
                (([x, y], [nw, h]), ([x, y + h], [nw, nh - h]))
            };
            let a = self.alloc_node(first.0, first.1, i);
            let b = self.alloc_node(second.0, second.1, i);
            self.nodes[i as usize].children = Some([a, b]);
            i = a;
        }
    }

    /// Release a rectangle returned by `allocate`.
    pub fn free(&mut self, node: u32) {
        let Some(n) = self.nodes.get_mut(node as usize) else {
            return;
        };
        if !n.occupied {
            return;
        }
        n.occupied = false;

        let mut parent = n.parent;
        while let Some(p) = parent {
            let Some([a, b]) = self.nodes[p as usize].children else {
                break;
            };
            if !(self.nodes[a as usize].is_free_leaf() && self.nodes[b as usize].is_free_leaf()) {
                break;
            }
            self.free_slots.push(a);
            self.free_slots.push(b);
            self.nodes[p as usize].children = None;
            parent = self.nodes[p as usize].parent;
        }
    }

    /// Texels currently handed out.
    pub fn used_area(&self) -> u64 {
        self.live_nodes()
            .filter(|n| n.occupied)
            .map(|n| n.size[0] as u64 * n.size[1] as u64)
            .sum()
    }

    /// True when nothing is allocated.
    pub fn is_empty(&self) -> bool {
        self.nodes[0].is_free_leaf()
    }

    fn live_nodes(&self) -> impl Iterator<Item = &PackNode> + '_ {
        // Walk from the root so recycled slots are skipped.
        let mut stack = vec![0u32];
        std::iter::from_fn(move || {
            let i = stack.pop()?;
            let node = &self.nodes[i as usize];
            if let Some([a, b]) = node.children {
                stack.push(b);
                stack.push(a);
            }
            Some(node)
        })
    }

    fn alloc_node(&mut self, pos: [u32; 2], size: [u32; 2], parent: u32) -> u32 {
        let node = PackNode {
            pos,
            size,
            parent: Some(parent),
            children: None,
            occupied: false,
        };
        match self.free_slots.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_allocation_is_at_origin() {
        let mut packer = AtlasPacker::new(1024, 512);
        let r = packer.allocate(256, 256).unwrap();
        assert_eq!(r.pos, [0, 0]);
        assert_eq!(r.size, [256, 256]);
        assert_eq!(packer.used_area(), 256 * 256);
    }

    #[test]
    fn allocations_never_overlap() {
        let mut packer = AtlasPacker::new(512, 512);
        let mut rects = Vec::new();
        for size in [256, 128, 128, 64, 64, 64, 256, 128] {
            rects.push(packer.allocate(size, size).unwrap());
        }
        for (i, a) in rects.iter().enumerate() {
            assert!(a.pos[0] + a.size[0] <= 512 && a.pos[1] + a.size[1] <= 512);
            for b in &rects[i + 1..] {
                let disjoint = a.pos[0] + a.size[0] <= b.pos[0]
                    || b.pos[0] + b.size[0] <= a.pos[0]
                    || a.pos[1] + a.size[1] <= b.pos[1]
                    || b.pos[1] + b.size[1] <= a.pos[1];
                assert!(disjoint, "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn full_atlas_refuses() {
        let mut packer = AtlasPacker::new(256, 256);
        for _ in 0..4 {
            packer.allocate(128, 128).unwrap();
        }
        assert!(packer.allocate(1, 1).is_none());
        assert!(packer.allocate(512, 16).is_none());
        assert!(packer.allocate(0, 16).is_none());
    }

    #[test]
    fn free_merges_back_to_root() {
        let mut packer = AtlasPacker::new(256, 256);
        let rects: Vec<_> = (0..4).map(|_| packer.allocate(128, 128).unwrap()).collect();
        for r in rects.iter().rev() {
            packer.free(r.node);
        }
        assert!(packer.is_empty());
        let whole = packer.allocate(256, 256).unwrap();
        assert_eq!(whole.pos, [0, 0]);
    }

    #[test]
    fn freed_space_is_reused() {
        let mut packer = AtlasPacker::new(256, 256);
        let a = packer.allocate(128, 128).unwrap();
        let _b = packer.allocate(128, 128).unwrap();
        packer.free(a.node);
        packer.free(a.node);
        let c = packer.allocate(128, 128).unwrap();
        assert_eq!(c.pos, a.pos);
    }
}
