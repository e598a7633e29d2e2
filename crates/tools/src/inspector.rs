use std::time::Duration;

use scenecull_bvh::TreeStats;
use scenecull_common::ObjectId;
use scenecull_render::{DrawList, FrameStats, ShadowAtlas};
use scenecull_scene::{ComponentMask, SceneData};

/// Read-only queries over scenes and draw lists for debugging and profiling.
pub struct Inspector;

impl Inspector {
    pub fn scene(scene: &SceneData) -> SceneSummary {
        SceneSummary {
            objects: scene.live_object_count(),
            indexed: scene.objects.iter().filter(|o| o.leaf.is_some()).count(),
            drawables: scene.drawables.len(),
            occluders: scene.occluders.len(),
            lights: scene.lights.len(),
            decals: scene.decals.len(),
            probes: scene.probes.len(),
            meshes: scene.assets.mesh_count(),
            materials: scene.assets.material_count(),
            tree: scene.bvh.stats(),
        }
    }

    pub fn frame(list: &DrawList) -> FrameSummary {
        FrameSummary {
            frame: list.frame_index,
            instances: list.instances.len(),
            main_batches: list.main_batches.len(),
            main_draws: list.main_draws().count(),
            shadow_lists: list.shadow_lists.len(),
            dirty_shadow_lists: list.shadow_lists.iter().filter(|l| l.dirty).count(),
            shadow_draws: list.shadow_lists.iter().map(|l| list.shadow_draws(l).count()).sum(),
            lights: list.lights.len(),
            decals: list.decals.len(),
            probes: list.probes.len(),
            items: list.items.len(),
            occupied_cells: list.cells.iter().filter(|c| c.item_count() > 0).count(),
            skinned_vertices: list.skin_vertices_count,
            dropped: list.dropped_total(),
            total: list.info.total,
        }
    }

    /// Lights currently holding an atlas region, with size and position.
    pub fn shadow_regions(atlas: &ShadowAtlas) -> Vec<(ObjectId, u32, [u32; 2])> {
        atlas.regions().iter().map(|r| (r.light, r.size, r.pos)).collect()
    }

    /// Object ids with every component in `mask`.
    pub fn objects_with(scene: &SceneData, mask: ComponentMask) -> Vec<ObjectId> {
        scene
            .objects
            .iter()
            .enumerate()
            .filter(|(_, o)| o.has(mask))
            .map(|(i, _)| ObjectId(i as u32))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneSummary {
    pub objects: usize,
    pub indexed: usize,
    pub drawables: usize,
    pub occluders: usize,
    pub lights: usize,
    pub decals: usize,
    pub probes: usize,
    pub meshes: usize,
    pub materials: usize,
    pub tree: TreeStats,
}

impl std::fmt::Display for SceneSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Scene: objects={} indexed={} drawables={} occluders={} lights={} decals={} probes={} meshes={} materials={}",
            self.objects,
            self.indexed,
            self.drawables,
            self.occluders,
            self.lights,
            self.decals,
            self.probes,
            self.meshes,
            self.materials
        )?;
        write!(f, "{}", self.tree)
    }
}

/// Counts of one prepared draw list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSummary {
    pub frame: u64,
    pub instances: usize,
    pub main_batches: usize,
    /// Batches left after merging.
    pub main_draws: usize,
    pub shadow_lists: usize,
    pub dirty_shadow_lists: usize,
    pub shadow_draws: usize,
    pub lights: usize,
    pub decals: usize,
    pub probes: usize,
    pub items: usize,
    pub occupied_cells: usize,
    pub skinned_vertices: u32,
    pub dropped: usize,
    pub total: Duration,
}

impl std::fmt::Display for FrameSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frame {}: instances={} draws={}/{} shadow_lists={} (dirty {}) shadow_draws={} lights={} decals={} probes={} items={} cells={} skinned={} dropped={}",
            self.frame,
            self.instances,
            self.main_draws,
            self.main_batches,
            self.shadow_lists,
            self.dirty_shadow_lists,
            self.shadow_draws,
            self.lights,
            self.decals,
            self.probes,
            self.items,
            self.occupied_cells,
            self.skinned_vertices,
            self.dropped
        )?;
        if !self.total.is_zero() {
            write!(f, " time={:?}", self.total)?;
        }
        Ok(())
    }
}

/// One line of per-frame counters from the renderer.
pub fn stats_line(stats: &FrameStats) -> String {
    format!(
        "visible={} occluded={} nodes={} cascades={} shadows rendered={} cached={} merged={}+{} cluster requested={} written={}",
        stats.gather.objects_visible,
        stats.gather.occluded,
        stats.gather.nodes_tested,
        stats.shadows.cascades,
        stats.shadows.lights_rendered,
        stats.shadows.lights_cached,
        stats.merged_main,
        stats.merged_shadow,
        stats.cluster.requested,
        stats.cluster.written
    )
}
