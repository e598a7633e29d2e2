//! Per-frame output of the frontend.
//!
//! Every array is sized from [`FrontendConfig`] when the list is created and
//! never grows afterwards; pushes past capacity are refused and counted.
//! Records that cross to the GPU are `#[repr(C)]` [`Pod`] structs so the
//! backend can upload them with `bytemuck::cast_slice`.

use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use scenecull_bvh::BvhNode;
use scenecull_common::{Camera, ObjectId};
use scenecull_scene::Environment;

use crate::batch::DrawBatch;
use crate::bounded::BoundedVec;
use crate::config::{FrontendConfig, RenderFlags};

/// First three rows of `m`, the layout shaders read affine transforms in.
pub fn rows_3x4(m: &Mat4) -> [[f32; 4]; 3] {
    [m.row(0).to_array(), m.row(1).to_array(), m.row(2).to_array()]
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model_matrix: [[f32; 4]; 3],
    pub lmap_transform: [f32; 4],
}

impl InstanceData {
    pub fn new(world_from_object: &Mat4) -> Self {
        Self {
            model_matrix: rows_3x4(world_from_object),
            lmap_transform: [0.0, 0.0, 1.0, 1.0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightItem {
    pub pos: [f32; 3],
    pub radius: f32,
    pub col: [f32; 3],
    /// Index into `shadow_regions`, or -1 without a shadow this frame.
    pub shadowreg_index: i32,
    pub dir: [f32; 3],
    pub spot: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DecalItem {
    /// Decal clip space from world space.
    pub mat: [[f32; 4]; 3],
    pub diff: [f32; 4],
    pub norm: [f32; 4],
    pub spec: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ProbeItem {
    pub pos: [f32; 3],
    pub radius: f32,
    pub layer: u32,
    pub _pad: [u32; 3],
    pub sh_coeffs: [[f32; 4]; 4],
}

impl ProbeItem {
    pub fn new(pos: Vec3, radius: f32, layer: u32, sh: &[Vec3; 4]) -> Self {
        Self {
            pos: pos.to_array(),
            radius,
            layer,
            _pad: [0; 3],
            sh_coeffs: sh.map(|c| c.extend(0.0).to_array()),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowMapRegion {
    /// Atlas rectangle `(x, y, w, h)` normalized by the atlas size.
    pub transform: [f32; 4],
    pub clip_from_world: [[f32; 4]; 4],
}

impl ShadowMapRegion {
    pub fn new(transform: Vec4, clip_from_world: &Mat4) -> Self {
        Self {
            transform: transform.to_array(),
            clip_from_world: clip_from_world.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SkinTransform {
    pub rows: [[f32; 4]; 3],
}

/// Vertex range skinned by one compute dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SkinRegion {
    pub in_vtx_offset: u32,
    pub out_vtx_offset: u32,
    pub xform_offset: u32,
    pub vertex_count: u32,
}

/// Item range of one froxel. Lights come first, then decals, then probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellData {
    pub item_offset: u32,
    pub light_count: u32,
    pub decal_count: u32,
    pub probe_count: u32,
}

impl CellData {
    pub fn item_count(&self) -> u32 {
        self.light_count + self.decal_count + self.probe_count
    }
}

/// Entry of a cell's item list, indexing the matching draw list array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemRef {
    Light(u32),
    Decal(u32),
    Probe(u32),
}

/// One shadow-casting camera: a sun cascade or a light's atlas region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowList {
    pub shadow_map_pos: [u32; 2],
    pub shadow_map_size: u32,
    /// Range in `shadow_batch_indices`.
    pub batch_start: u32,
    pub batch_count: u32,
    pub cam_near: f32,
    pub cam_far: f32,
    pub region_index: u32,
    /// False when the cached atlas contents are reused as is.
    pub dirty: bool,
}

/// Phase timings, filled when [`RenderFlags::TIMERS`] is set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrontendInfo {
    pub occluders: Duration,
    pub main_gather: Duration,
    pub shadow_gather: Duration,
    pub sort: Duration,
    pub cluster: Duration,
    pub total: Duration,
}

/// Atlas region that holds a shadow map from an earlier frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedRegion {
    pub light: ObjectId,
    pub pos: [u32; 2],
    pub size: u32,
    pub last_visible: Option<u64>,
}

/// Optional debug payloads, gated by the `DEBUG_*` flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugOutputs {
    pub bvh_nodes: Vec<BvhNode>,
    pub bvh_root: Option<u32>,
    pub cached_shadow_regions: Vec<CachedRegion>,
    /// Linearized occlusion depth, one byte per texel, row 0 at the bottom.
    pub depth_image: Vec<u8>,
    pub depth_width: usize,
    pub depth_height: usize,
}

/// Everything the backend needs to render one frame.
#[derive(Debug, Clone)]
pub struct DrawList {
    pub render_flags: RenderFlags,
    pub frame_index: u64,
    pub camera: Camera,
    pub env: Environment,

    pub instances: BoundedVec<InstanceData>,
    pub main_batches: BoundedVec<DrawBatch>,
    /// Main batches in draw order.
    pub main_batch_indices: Vec<u32>,
    pub shadow_batches: BoundedVec<DrawBatch>,
    /// Shadow batches in draw order, grouped by shadow list.
    pub shadow_batch_indices: Vec<u32>,
    pub shadow_lists: BoundedVec<ShadowList>,
    pub shadow_regions: BoundedVec<ShadowMapRegion>,

    pub lights: BoundedVec<LightItem>,
    pub decals: BoundedVec<DecalItem>,
    pub probes: BoundedVec<ProbeItem>,

    /// One entry per froxel, `z * res_x * res_y + y * res_x + x`.
    pub cells: Vec<CellData>,
    pub items: BoundedVec<ItemRef>,

    pub skin_transforms: BoundedVec<SkinTransform>,
    pub skin_regions: BoundedVec<SkinRegion>,
    pub skin_vertices_count: u32,

    pub info: FrontendInfo,
    pub debug: DebugOutputs,
}

impl DrawList {
    pub fn new(config: &FrontendConfig) -> Self {
        let cap = &config.capacity;
        Self {
            render_flags: config.flags,
            frame_index: 0,
            camera: Camera::default(),
            env: Environment::default(),
            instances: BoundedVec::new(cap.instances),
            main_batches: BoundedVec::new(cap.main_batches),
            main_batch_indices: Vec::with_capacity(cap.main_batches),
            shadow_batches: BoundedVec::new(cap.shadow_batches),
            shadow_batch_indices: Vec::with_capacity(cap.shadow_batches),
            shadow_lists: BoundedVec::new(cap.shadow_lists),
            shadow_regions: BoundedVec::new(cap.shadow_regions),
            lights: BoundedVec::new(cap.lights),
            decals: BoundedVec::new(cap.decals),
            probes: BoundedVec::new(cap.probes),
            cells: vec![CellData::default(); config.cluster.cell_count()],
            items: BoundedVec::new(config.cluster.max_items_total as usize),
            skin_transforms: BoundedVec::new(cap.skin_transforms),
            skin_regions: BoundedVec::new(cap.skin_regions),
            skin_vertices_count: 0,
            info: FrontendInfo::default(),
            debug: DebugOutputs::default(),
        }
    }

    /// Reset every array for a new frame. Capacities are kept.
    pub fn clear(&mut self) {
        self.instances.clear();
        self.main_batches.clear();
        self.main_batch_indices.clear();
        self.shadow_batches.clear();
        self.shadow_batch_indices.clear();
        self.shadow_lists.clear();
        self.shadow_regions.clear();
        self.lights.clear();
        self.decals.clear();
        self.probes.clear();
        self.cells.fill(CellData::default());
        self.items.clear();
        self.skin_transforms.clear();
        self.skin_regions.clear();
        self.skin_vertices_count = 0;
        self.info = FrontendInfo::default();
        self.debug.bvh_nodes.clear();
        self.debug.bvh_root = None;
        self.debug.cached_shadow_regions.clear();
        self.debug.depth_image.clear();
    }

    /// Items of one froxel.
    pub fn cell_items(&self, cell: usize) -> &[ItemRef] {
        let Some(c) = self.cells.get(cell) else {
            return &[];
        };
        let start = (c.item_offset as usize).min(self.items.len());
        let end = (start + c.item_count() as usize).min(self.items.len());
        &self.items[start..end]
    }

    /// Main batches in draw order that still carry instances.
    pub fn main_draws(&self) -> impl Iterator<Item = &DrawBatch> + '_ {
        self.main_batch_indices
            .iter()
            .map(|&i| &self.main_batches[i as usize])
            .filter(|b| !b.instance_indices.is_empty())
    }

    /// Shadow batches of one shadow list in draw order, merged ones skipped.
    pub fn shadow_draws(&self, list: &ShadowList) -> impl Iterator<Item = &DrawBatch> + '_ {
        let start = list.batch_start as usize;
        let end = start + list.batch_count as usize;
        self.shadow_batch_indices[start..end]
            .iter()
            .map(|&i| &self.shadow_batches[i as usize])
            .filter(|b| !b.instance_indices.is_empty())
    }

    /// Pushes refused by any bounded array this frame.
    pub fn dropped_total(&self) -> usize {
        self.instances.dropped()
            + self.main_batches.dropped()
            + self.shadow_batches.dropped()
            + self.shadow_lists.dropped()
            + self.shadow_regions.dropped()
            + self.lights.dropped()
            + self.decals.dropped()
            + self.probes.dropped()
            + self.items.dropped()
            + self.skin_transforms.dropped()
            + self.skin_regions.dropped()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
            && self.main_batches.is_empty()
            && self.shadow_batches.is_empty()
            && self.lights.is_empty()
            && self.decals.is_empty()
            && self.probes.is_empty()
            && self.items.is_empty()
    }
}
