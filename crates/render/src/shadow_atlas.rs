//! Shadow atlas context: the rectangle packer, the sun quadrant and the
//! per-light region cache.
//!
//! Owned by the renderer and mutated only from the frontend thread.

use glam::Vec4;
use scenecull_common::ObjectId;

use crate::draw_list::CachedRegion;
use crate::packer::{AtlasPacker, AtlasRect};

/// Atlas space held by one shadow-casting light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowRegion {
    pub light: ObjectId,
    pub pos: [u32; 2],
    pub size: u32,
    node: u32,
    /// Frame its shadow batches were last regenerated; `None` until the
    /// first render into a fresh allocation.
    pub last_update: Option<u64>,
    /// Frame it was last requested. Set on allocation, so a region that is
    /// never rendered into still ages out.
    pub last_visible: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ShadowAtlas {
    packer: AtlasPacker,
    regions: Vec<ShadowRegion>,
    sun: Option<AtlasRect>,
    idle_frames: u64,
    max_regions: usize,
}

impl ShadowAtlas {
    pub fn new(width: u32, height: u32, idle_frames: u64, max_regions: usize) -> Self {
        Self {
            packer: AtlasPacker::new(width, height),
            regions: Vec::new(),
            sun: None,
            idle_frames,
            max_regions,
        }
    }

    pub fn width(&self) -> u32 {
        self.packer.width()
    }

    pub fn height(&self) -> u32 {
        self.packer.height()
    }

    pub fn regions(&self) -> &[ShadowRegion] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> Option<&ShadowRegion> {
        self.regions.get(index)
    }

    pub fn find(&self, light: ObjectId) -> Option<usize> {
        self.regions.iter().position(|r| r.light == light)
    }

    /// Atlas rectangle normalized to `[0, 1]`, as `(x, y, w, h)`.
    pub fn normalized(&self, pos: [u32; 2], size: u32) -> Vec4 {
        let (w, h) = (self.width() as f32, self.height() as f32);
        Vec4::new(
            pos[0] as f32 / w,
            pos[1] as f32 / h,
            size as f32 / w,
            size as f32 / h,
        )
    }

    /// Reserve a `resolution`-sized square for the sun cascades and return
    /// its position. A new reservation resets the whole atlas.
    pub fn reserve_sun(&mut self, resolution: u32) -> Option<[u32; 2]> {
        if let Some(sun) = self.sun
            && sun.size == [resolution, resolution]
        {
            return Some(sun.pos);
        }
        self.packer.clear();
        self.regions.clear();
        self.sun = self.packer.allocate(resolution, resolution);
        tracing::debug!(resolution, reserved = self.sun.is_some(), "shadow atlas reset for sun");
        self.sun.map(|s| s.pos)
    }

    pub fn sun_position(&self) -> Option<[u32; 2]> {
        self.sun.map(|s| s.pos)
    }

    /// Find or allocate the region of `light`.
    ///
    /// Tries `resolutions[res_index]` first and falls back to the smaller
    /// entries after it. Each size gets at most one eviction. Returns the
    /// region index, or `None` when the light gets no shadow this frame.
    pub fn acquire(&mut self, light: ObjectId, resolutions: &[u32], res_index: usize, frame: u64) -> Option<usize> {
        let wanted = *resolutions.get(res_index)?;
        if let Some(i) = self.find(light) {
            if self.regions[i].size == wanted {
                return Some(i);
            }
            let old = self.regions.swap_remove(i);
            self.packer.free(old.node);
        }

        for &size in &resolutions[res_index..] {
            if let Some(rect) = self.allocate(size, frame) {
                self.regions.push(ShadowRegion {
                    light,
                    pos: rect.pos,
                    size,
                    node: rect.node,
                    last_update: None,
                    last_visible: Some(frame),
                });
                return Some(self.regions.len() - 1);
            }
        }
        tracing::debug!(%light, wanted, "no shadow atlas space");
        None
    }

    fn allocate(&mut self, size: u32, frame: u64) -> Option<AtlasRect> {
        if self.regions.len() < self.max_regions
            && let Some(rect) = self.packer.allocate(size, size)
        {
            return Some(rect);
        }
        if !self.evict_oldest(frame) {
            return None;
        }
        self.packer.allocate(size, size)
    }

    /// Free the least recently visible region idle for longer than the
    /// threshold.
    fn evict_oldest(&mut self, frame: u64) -> bool {
        let victim = self
            .regions
            .iter()
            .enumerate()
            .filter_map(|(i, r)| {
                let seen = r.last_visible?;
                (frame.saturating_sub(seen) > self.idle_frames).then_some((i, seen))
            })
            .min_by_key(|&(_, seen)| seen)
            .map(|(i, _)| i);

        let Some(i) = victim else {
            return false;
        };
        let evicted = self.regions.swap_remove(i);
        self.packer.free(evicted.node);
        tracing::debug!(light = %evicted.light, size = evicted.size, frame, "shadow region evicted");
        true
    }

    /// Record that a region was requested this frame, and regenerated if
    /// `updated`.
    pub fn touch(&mut self, index: usize, frame: u64, updated: bool) {
        if let Some(r) = self.regions.get_mut(index) {
            r.last_visible = Some(frame);
            if updated {
                r.last_update = Some(frame);
            }
        }
    }

    /// Regions kept from earlier frames and not requested in `frame`.
    pub fn cached_regions(&self, frame: u64) -> impl Iterator<Item = CachedRegion> + '_ {
        self.regions
            .iter()
            .filter(move |r| r.last_visible != Some(frame))
            .map(|r| CachedRegion {
                light: r.light,
                pos: r.pos,
                size: r.size,
                last_visible: r.last_visible,
            })
    }
}
