//! Packing of cluster data into the layout the shaders read.
//!
//! A cell is two words: the item row offset with the light count in the top
//! byte, then decal and probe counts. Items are rows of one word holding a
//! light index (12 bits), a decal index (12 bits) and a probe index (8 bits);
//! a cell owns `max(lights, decals, probes)` consecutive rows.

use bytemuck::{Pod, Zeroable};

use crate::draw_list::{CellData, ItemRef};

pub const MAX_GPU_ITEM_ROWS: u32 = 1 << 24;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuCell {
    pub offset_and_lights: u32,
    pub decals_and_probes: u32,
}

impl GpuCell {
    pub fn new(offset: u32, lights: u32, decals: u32, probes: u32) -> Self {
        Self {
            offset_and_lights: (offset & 0x00ff_ffff) | ((lights & 0xff) << 24),
            decals_and_probes: (decals & 0xff) | ((probes & 0xff) << 8),
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset_and_lights & 0x00ff_ffff
    }

    pub fn light_count(&self) -> u32 {
        self.offset_and_lights >> 24
    }

    pub fn decal_count(&self) -> u32 {
        self.decals_and_probes & 0xff
    }

    pub fn probe_count(&self) -> u32 {
        (self.decals_and_probes >> 8) & 0xff
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuItem(pub u32);

impl GpuItem {
    pub fn new(light: u32, decal: u32, probe: u32) -> Self {
        Self((light & 0xfff) | ((decal & 0xfff) << 12) | ((probe & 0xff) << 24))
    }

    pub fn light(self) -> u32 {
        self.0 & 0xfff
    }

    pub fn decal(self) -> u32 {
        (self.0 >> 12) & 0xfff
    }

    pub fn probe(self) -> u32 {
        self.0 >> 24
    }
}

/// Convert cells and their tagged items into packed rows. Returns the number
/// of cells truncated by `max_rows`.
pub fn pack_clusters(
    cells: &[CellData],
    items: &[ItemRef],
    max_rows: u32,
    out_cells: &mut Vec<GpuCell>,
    out_items: &mut Vec<GpuItem>,
) -> usize {
    out_cells.clear();
    out_items.clear();
    let max_rows = max_rows.min(MAX_GPU_ITEM_ROWS) as usize;
    let mut truncated = 0;

    for cell in cells {
        let start = (cell.item_offset as usize).min(items.len());
        let end = (start + cell.item_count() as usize).min(items.len());
        let cell_items = &items[start..end];

        let mut lights = cell_items.iter().filter_map(|i| match i {
            ItemRef::Light(l) => Some(*l),
            _ => None,
        });
        let mut decals = cell_items.iter().filter_map(|i| match i {
            ItemRef::Decal(d) => Some(*d),
            _ => None,
        });
        let mut probes = cell_items.iter().filter_map(|i| match i {
            ItemRef::Probe(p) => Some(*p),
            _ => None,
        });

        let wanted = cell.light_count.max(cell.decal_count).max(cell.probe_count) as usize;
        let offset = out_items.len();
        let rows = wanted.min(max_rows - offset);
        if rows < wanted {
            truncated += 1;
        }
        for _ in 0..rows {
            out_items.push(GpuItem::new(
                lights.next().unwrap_or(0),
                decals.next().unwrap_or(0),
                probes.next().unwrap_or(0),
            ));
        }
        let clamp = |n: u32| n.min(rows as u32);
        out_cells.push(GpuCell::new(
            offset as u32,
            clamp(cell.light_count),
            clamp(cell.decal_count),
            clamp(cell.probe_count),
        ));
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_fields_round_trip() {
        let cell = GpuCell::new(0x12_3456, 200, 17, 3);
        assert_eq!(cell.offset(), 0x12_3456);
        assert_eq!(cell.light_count(), 200);
        assert_eq!(cell.decal_count(), 17);
        assert_eq!(cell.probe_count(), 3);
    }

    #[test]
    fn rows_follow_the_largest_count() {
        let items = [
            ItemRef::Light(4),
            ItemRef::Light(9),
            ItemRef::Light(11),
            ItemRef::Decal(2),
            ItemRef::Probe(1),
            ItemRef::Probe(5),
        ];
        let cells = [
            CellData::default(),
            CellData {
                item_offset: 0,
                light_count: 3,
                decal_count: 1,
                probe_count: 2,
            },
        ];
        let (mut gpu_cells, mut gpu_items) = (Vec::new(), Vec::new());
        assert_eq!(pack_clusters(&cells, &items, 1024, &mut gpu_cells, &mut gpu_items), 0);

        assert_eq!(gpu_cells[0], GpuCell::new(0, 0, 0, 0));
        assert_eq!(gpu_cells[1].light_count(), 3);
        assert_eq!(gpu_items.len(), 3);
        assert_eq!((gpu_items[0].light(), gpu_items[0].decal(), gpu_items[0].probe()), (4, 2, 1));
        assert_eq!((gpu_items[2].light(), gpu_items[2].probe()), (11, 0));
        let bytes: &[u8] = bytemuck::cast_slice(&gpu_items);
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn row_capacity_truncates() {
        let items = [ItemRef::Light(0), ItemRef::Light(1), ItemRef::Light(2)];
        let cells = [CellData {
            item_offset: 0,
            light_count: 3,
            ..Default::default()
        }];
        let (mut gpu_cells, mut gpu_items) = (Vec::new(), Vec::new());
        assert_eq!(pack_clusters(&cells, &items, 2, &mut gpu_cells, &mut gpu_items), 1);
        assert_eq!(gpu_items.len(), 2);
        assert_eq!(gpu_cells[0].light_count(), 2);
    }
}
