//! Render frontend: turns a scene and a camera into a [`DrawList`] the GPU
//! backend can consume without further CPU work.
//!
//! A frame runs occluder rasterization, the main visibility gather, shadow
//! gathering into a cached atlas, batch sorting and merging, then clustered
//! assignment of lights, decals and probes on the worker pool.
//!
//! # Invariants
//! - Every array in a draw list respects its configured capacity; overflow is
//!   dropped and counted, never reallocated.
//! - An object seen by several passes in one frame has exactly one instance.
//! - Merged batches share key, index range and base vertex, and never exceed
//!   [`MAX_BATCH_SIZE`] instances.
//! - A cell's items are stored lights first, then decals, then probes.
//! - A list handed to the backend is not touched by the frontend until the
//!   backend releases it.

mod batch;
mod bounded;
mod cluster;
mod config;
mod draw_list;
mod exchange;
mod frontend;
mod gather;
mod gpu;
mod occlusion;
mod packer;
mod radix;
mod shadow;
mod shadow_atlas;
mod traversal;
mod volumes;
mod workers;

pub use batch::{DrawBatch, InstanceList, MAX_BATCH_SIZE, MainSortKey, ShadowSortKey, merge_batches};
pub use bounded::BoundedVec;
pub use cluster::{ClusterAssigner, ClusterInput, ClusterStats};
pub use config::{
    CapacityConfig, ClusterConfig, ConfigError, FrontendConfig, OcclusionConfig, RenderFlags, ShadowConfig,
    SkinningConfig,
};
pub use draw_list::{
    CachedRegion, CellData, DebugOutputs, DecalItem, DrawList, FrontendInfo, InstanceData, ItemRef, LightItem,
    ProbeItem, ShadowList, ShadowMapRegion, SkinRegion, SkinTransform,
};
pub use exchange::{BackendSlots, ExchangeError, FrontendSlots, frame_exchange};
pub use frontend::{FrameStats, FrontendError, Renderer};
pub use gather::GatherStats;
pub use gpu::{GpuCell, GpuItem, MAX_GPU_ITEM_ROWS, pack_clusters};
pub use occlusion::OcclusionBuffer;
pub use packer::{AtlasPacker, AtlasRect};
pub use radix::{RadixKey, RadixSorter};
pub use shadow::ShadowStats;
pub use shadow_atlas::{ShadowAtlas, ShadowRegion};
pub use volumes::{DecalVolume, LightVolume, ProbeVolume};
pub use workers::WorkerPool;

pub fn crate_info() -> &'static str {
    "scenecull-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
