use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Features the frontend gathers for a frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct RenderFlags: u32 {
        /// Occlusion culling with the software depth buffer.
        const CULLING = 1 << 0;
        const LIGHTS = 1 << 1;
        const DECALS = 1 << 2;
        const PROBES = 1 << 3;
        const SHADOWS = 1 << 4;
        /// Use lightmapped program variants.
        const LIGHTMAP = 1 << 5;
        const TIMERS = 1 << 6;
        /// Copy BVH nodes into the draw list.
        const DEBUG_BVH = 1 << 7;
        /// List cached shadow regions not visible this frame.
        const DEBUG_SHADOW = 1 << 8;
        /// Export the occlusion depth buffer as an 8-bit image.
        const DEBUG_CULLING = 1 << 9;
    }
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self::CULLING
            | Self::LIGHTS
            | Self::DECALS
            | Self::PROBES
            | Self::SHADOWS
            | Self::LIGHTMAP
    }
}

/// Errors from loading or validating a [`FrontendConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Froxel grid and per-cell limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub res_x: u32,
    pub res_y: u32,
    pub res_z: u32,
    pub max_lights_per_cell: u32,
    pub max_decals_per_cell: u32,
    pub max_probes_per_cell: u32,
    pub max_items_total: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            res_x: 16,
            res_y: 8,
            res_z: 24,
            max_lights_per_cell: 255,
            max_decals_per_cell: 255,
            max_probes_per_cell: 8,
            max_items_total: 65536,
        }
    }
}

impl ClusterConfig {
    pub fn cells_per_slice(&self) -> usize {
        (self.res_x * self.res_y) as usize
    }

    pub fn cell_count(&self) -> usize {
        self.cells_per_slice() * self.res_z as usize
    }
}

/// Fixed capacities of the draw list arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub instances: usize,
    pub main_batches: usize,
    pub shadow_batches: usize,
    pub lights: usize,
    pub decals: usize,
    pub probes: usize,
    pub shadow_lists: usize,
    pub shadow_regions: usize,
    pub skin_transforms: usize,
    pub skin_regions: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            instances: 65536,
            main_batches: 65536,
            shadow_batches: 65536,
            lights: 4096,
            decals: 4096,
            probes: 256,
            shadow_lists: 64,
            shadow_regions: 64,
            skin_transforms: 65536,
            skin_regions: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub atlas_width: u32,
    pub atlas_height: u32,
    /// Side of the square atlas quadrant reserved for the sun cascades.
    pub sun_resolution: u32,
    /// Far distance of each of the four cascades.
    pub cascade_distances: [f32; 4],
    /// Per-light resolutions, best first, picked by camera distance.
    pub light_resolutions: [u32; 4],
    /// Frames a region must go unseen before it may be evicted.
    pub eviction_idle_frames: u64,
    /// Frames a static light keeps re-rendering after its last change.
    pub refresh_frames: u64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            atlas_width: 4096,
            atlas_height: 2048,
            sun_resolution: 2048,
            cascade_distances: [8.0, 24.0, 56.0, 120.0],
            light_resolutions: [512, 256, 128, 64],
            eviction_idle_frames: 10,
            refresh_frames: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    pub width: usize,
    pub height: usize,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinningConfig {
    /// First vertex of the skinned output range in the shared vertex buffer.
    pub output_base_vertex: u32,
    /// Vertices per skinning dispatch region.
    pub region_size: u32,
}

impl Default for SkinningConfig {
    fn default() -> Self {
        Self {
            output_base_vertex: 0,
            region_size: 256,
        }
    }
}

/// Frontend configuration. Every field has a default, so a partial JSON
/// document is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    pub flags: RenderFlags,
    pub cluster: ClusterConfig,
    pub capacity: CapacityConfig,
    pub shadows: ShadowConfig,
    pub occlusion: OcclusionConfig,
    pub skinning: SkinningConfig,
    /// Camera distance mapped to the far end of the 8-bit sort distance.
    pub max_sort_distance: f32,
    /// Worker threads for cluster assignment; 0 lets rayon decide.
    pub worker_threads: usize,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            flags: RenderFlags::default(),
            cluster: ClusterConfig::default(),
            capacity: CapacityConfig::default(),
            shadows: ShadowConfig::default(),
            occlusion: OcclusionConfig::default(),
            skinning: SkinningConfig::default(),
            max_sort_distance: 100.0,
            worker_threads: 0,
        }
    }
}

impl FrontendConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), "frontend config loaded");
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        let c = &self.cluster;
        if c.res_x == 0 || c.res_y == 0 || c.res_z == 0 {
            return invalid("cluster resolution must be non-zero");
        }
        if c.max_lights_per_cell > 255 || c.max_decals_per_cell > 255 || c.max_probes_per_cell > 255 {
            return invalid("per-cell limits must fit in 8 bits");
        }
        if c.max_items_total == 0 || c.max_items_total >= 1 << 24 {
            return invalid("max_items_total must be in 1..2^24");
        }

        let cap = &self.capacity;
        if cap.lights > 4096 || cap.decals > 4096 || cap.probes > 256 {
            return invalid("lights/decals are limited to 4096 and probes to 256");
        }
        if cap.shadow_regions == 0 || cap.shadow_lists < 4 {
            return invalid("shadow lists must hold at least the four sun cascades");
        }

        let s = &self.shadows;
        if s.sun_resolution == 0 || s.sun_resolution > s.atlas_width || s.sun_resolution > s.atlas_height {
            return invalid("sun resolution must fit inside the shadow atlas");
        }
        if s.cascade_distances[0] <= 0.0 || s.cascade_distances.windows(2).any(|w| w[0] >= w[1]) {
            return invalid("cascade distances must be positive and increasing");
        }
        if s.light_resolutions.contains(&0) || s.light_resolutions.windows(2).any(|w| w[0] < w[1]) {
            return invalid("light resolutions must be non-zero and descending");
        }

        if self.occlusion.width == 0 || self.occlusion.height == 0 {
            return invalid("occlusion buffer must be non-empty");
        }
        if self.skinning.region_size == 0 {
            return invalid("skinning region size must be non-zero");
        }
        if self.max_sort_distance <= 0.0 {
            return invalid("max_sort_distance must be positive");
        }
        Ok(())
    }
}
