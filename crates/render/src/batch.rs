//! Draw batches, their sort keys and instance merging.
//!
//! A batch draws one material group of one mesh for up to [`MAX_BATCH_SIZE`]
//! instances. Batches are emitted with a single instance each; after sorting,
//! neighbours with equal keys over the same geometry are folded together.

use smallvec::SmallVec;

/// Instances a single batch can carry.
pub const MAX_BATCH_SIZE: usize = 8;

pub type InstanceList = SmallVec<[u32; MAX_BATCH_SIZE]>;

/// Sort key fields of a main-pass batch.
///
/// Packed most significant first: blend, test, program, material, camera
/// distance, index offset. Opaque geometry sorts before alpha-tested, and
/// blended geometry last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MainSortKey {
    pub alpha_blend: bool,
    pub alpha_test: bool,
    pub program: u32,
    pub material: u32,
    /// Quantized camera distance, 0 = nearest.
    pub cam_dist: u8,
    pub indices_offset: u32,
}

impl MainSortKey {
    const BLEND_BIT: u32 = 63;
    const TEST_BIT: u32 = 62;
    const PROG_SHIFT: u32 = 53;
    const MAT_SHIFT: u32 = 39;
    const DIST_SHIFT: u32 = 31;
    const OFFSET_SHIFT: u32 = 4;

    pub fn pack(&self) -> u64 {
        ((self.alpha_blend as u64) << Self::BLEND_BIT)
            | ((self.alpha_test as u64) << Self::TEST_BIT)
            | (((self.program & 0xff) as u64) << Self::PROG_SHIFT)
            | (((self.material & 0x3fff) as u64) << Self::MAT_SHIFT)
            | ((self.cam_dist as u64) << Self::DIST_SHIFT)
            | (((self.indices_offset & 0x7ff_ffff) as u64) << Self::OFFSET_SHIFT)
    }

    pub fn unpack(key: u64) -> Self {
        Self {
            alpha_blend: (key >> Self::BLEND_BIT) & 1 != 0,
            alpha_test: (key >> Self::TEST_BIT) & 1 != 0,
            program: ((key >> Self::PROG_SHIFT) & 0xff) as u32,
            material: ((key >> Self::MAT_SHIFT) & 0x3fff) as u32,
            cam_dist: ((key >> Self::DIST_SHIFT) & 0xff) as u8,
            indices_offset: ((key >> Self::OFFSET_SHIFT) & 0x7ff_ffff) as u32,
        }
    }
}

/// Sort key fields of a shadow-pass batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowSortKey {
    pub alpha_test: bool,
    pub material: u32,
    pub indices_offset: u32,
}

impl ShadowSortKey {
    const TEST_BIT: u32 = 46;
    const MAT_SHIFT: u32 = 32;

    pub fn pack(&self) -> u64 {
        ((self.alpha_test as u64) << Self::TEST_BIT)
            | (((self.material & 0x3fff) as u64) << Self::MAT_SHIFT)
            | self.indices_offset as u64
    }

    pub fn unpack(key: u64) -> Self {
        Self {
            alpha_test: (key >> Self::TEST_BIT) & 1 != 0,
            material: ((key >> Self::MAT_SHIFT) & 0x3fff) as u32,
            indices_offset: key as u32,
        }
    }
}

/// Indexed draw of one mesh group for a list of instances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawBatch {
    pub sort_key: u64,
    pub indices_offset: u32,
    pub indices_count: u32,
    pub base_vertex: u32,
    /// Indices into the draw list's instance array.
    pub instance_indices: InstanceList,
}

impl DrawBatch {
    pub fn new(sort_key: u64, indices_offset: u32, indices_count: u32, base_vertex: u32, instance: u32) -> Self {
        let mut instance_indices = InstanceList::new();
        instance_indices.push(instance);
        Self {
            sort_key,
            indices_offset,
            indices_count,
            base_vertex,
            instance_indices,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instance_indices.len()
    }

    /// Same key over the same index range and vertex base.
    fn can_merge(&self, other: &DrawBatch) -> bool {
        self.sort_key == other.sort_key
            && self.base_vertex == other.base_vertex
            && self.indices_offset == other.indices_offset
            && self.indices_count == other.indices_count
            && self.instance_count() + other.instance_count() <= MAX_BATCH_SIZE
    }
}

/// Fold batches that are adjacent in `order` and can share a draw call.
///
/// Absorbed batches keep their slot but end up with no instances. Returns the
/// number of absorbed batches.
pub fn merge_batches(batches: &mut [DrawBatch], order: &[u32]) -> usize {
    let Some((&first, rest)) = order.split_first() else {
        return 0;
    };
    let mut head = first as usize;
    let mut merged = 0;
    for &next in rest {
        let next = next as usize;
        if batches[head].can_merge(&batches[next]) {
            let moved = std::mem::take(&mut batches[next].instance_indices);
            batches[head].instance_indices.extend(moved);
            merged += 1;
        } else {
            head = next;
        }
    }
    merged
}
