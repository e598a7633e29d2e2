//! The renderer frontend: turns a scene and a camera into a [`DrawList`].

use std::time::{Duration, Instant};

use scenecull_common::Camera;
use scenecull_scene::SceneData;

use crate::batch::merge_batches;
use crate::cluster::{ClusterAssigner, ClusterInput, ClusterStats};
use crate::config::{ConfigError, FrontendConfig, RenderFlags};
use crate::draw_list::DrawList;
use crate::gather::{Gather, GatherScratch, GatherStats};
use crate::occlusion::OcclusionBuffer;
use crate::radix::RadixSorter;
use crate::shadow::ShadowStats;
use crate::shadow_atlas::ShadowAtlas;
use crate::workers::WorkerPool;

#[derive(Debug, thiserror::Error)]
pub enum FrontendError {
    #[error("invalid frontend configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to start worker threads: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Counters of the most recent frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub gather: GatherStats,
    pub shadows: ShadowStats,
    pub cluster: ClusterStats,
    pub occluder_triangles: usize,
    pub merged_main: usize,
    pub merged_shadow: usize,
}

/// Long-lived frontend state: worker pool, occlusion buffer, shadow atlas
/// cache, sort and cluster scratch.
///
/// Only the thread that owns the renderer calls
/// [`prepare_draw_list`](Renderer::prepare_draw_list); the lists it fills
/// can be handed to another thread through [`crate::frame_exchange`].
#[derive(Debug)]
pub struct Renderer {
    config: FrontendConfig,
    flags: RenderFlags,
    pool: WorkerPool,
    occlusion: OcclusionBuffer,
    atlas: ShadowAtlas,
    clusters: ClusterAssigner,
    sorter: RadixSorter<u64>,
    scratch: GatherScratch,
    frame: u64,
    last_stats: FrameStats,
}

impl Renderer {
    pub fn new(config: FrontendConfig) -> Result<Self, FrontendError> {
        config.validate()?;
        let pool = WorkerPool::new(config.worker_threads)?;
        let shadows = &config.shadows;
        let atlas = ShadowAtlas::new(
            shadows.atlas_width,
            shadows.atlas_height,
            shadows.eviction_idle_frames,
            config.capacity.shadow_regions,
        );
        tracing::info!(
            cells = config.cluster.cell_count(),
            threads = pool.thread_count(),
            atlas = ?(shadows.atlas_width, shadows.atlas_height),
            "renderer frontend ready"
        );
        Ok(Self {
            flags: config.flags,
            occlusion: OcclusionBuffer::new(config.occlusion.width, config.occlusion.height),
            clusters: ClusterAssigner::new(&config.cluster),
            atlas,
            pool,
            sorter: RadixSorter::new(),
            scratch: GatherScratch::default(),
            frame: 0,
            last_stats: FrameStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    pub fn flags(&self) -> RenderFlags {
        self.flags
    }

    /// Flags used from the next frame on.
    pub fn set_flags(&mut self, flags: RenderFlags) {
        self.flags = flags;
    }

    /// A list sized for this renderer's configuration.
    pub fn new_draw_list(&self) -> DrawList {
        DrawList::new(&self.config)
    }

    pub fn shadow_atlas(&self) -> &ShadowAtlas {
        &self.atlas
    }

    pub fn occlusion_buffer(&self) -> &OcclusionBuffer {
        &self.occlusion
    }

    /// Frames prepared so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn last_stats(&self) -> &FrameStats {
        &self.last_stats
    }

    /// Fill `list` with everything needed to draw `scene` from `camera`.
    pub fn prepare_draw_list(&mut self, scene: &SceneData, camera: &Camera, list: &mut DrawList) {
        let frame = self.frame;
        self.frame += 1;
        let _span = tracing::info_span!("prepare_draw_list", frame).entered();
        let start = Instant::now();
        let flags = self.flags;

        list.clear();
        list.render_flags = flags;
        list.frame_index = frame;
        list.camera = *camera;
        list.env = scene.env;
        let mut stats = FrameStats::default();

        if scene.bvh.is_empty() {
            tracing::debug!("empty scene, nothing to gather");
            self.last_stats = stats;
            if flags.contains(RenderFlags::TIMERS) {
                list.info.total = start.elapsed();
            }
            return;
        }

        self.scratch.begin_frame(scene.object_count());
        let culling = flags.contains(RenderFlags::CULLING);
        let mut gather = Gather {
            scene,
            config: &self.config,
            flags,
            list: &mut *list,
            scratch: &mut self.scratch,
            stamp: frame + 1,
        };

        let occluders = timed(|| {
            if culling {
                let _span = tracing::info_span!("occluder_pass").entered();
                stats.occluder_triangles = gather.occluder_pass(camera, &mut self.occlusion);
            }
        });
        let main_gather = timed(|| {
            let _span = tracing::info_span!("main_gather").entered();
            stats.gather = gather.main_pass(camera, culling.then_some(&self.occlusion));
        });
        let shadow_gather = timed(|| {
            if flags.contains(RenderFlags::SHADOWS) {
                let _span = tracing::info_span!("shadow_gather").entered();
                stats.shadows = gather.shadow_pass(camera, &mut self.atlas, frame);
            }
        });

        if flags.contains(RenderFlags::DEBUG_BVH) {
            list.debug.bvh_nodes.extend_from_slice(scene.bvh.nodes());
            list.debug.bvh_root = scene.bvh.root();
        }
        if flags.contains(RenderFlags::DEBUG_SHADOW) {
            list.debug.cached_shadow_regions.extend(self.atlas.cached_regions(frame));
        }
        if flags.contains(RenderFlags::DEBUG_CULLING) && culling {
            list.debug.depth_image = self.occlusion.debug_image(camera);
            list.debug.depth_width = self.occlusion.width();
            list.debug.depth_height = self.occlusion.height();
        }

        let sort = timed(|| {
            let _span = tracing::info_span!("sort_batches").entered();
            (stats.merged_main, stats.merged_shadow) = self.sort_batches(list);
        });
        let cluster = timed(|| {
            let _span = tracing::info_span!("assign_clusters").entered();
            let input = ClusterInput {
                lights: &self.scratch.light_volumes,
                decals: &self.scratch.decal_volumes,
                probes: &self.scratch.probe_volumes,
            };
            stats.cluster = self
                .clusters
                .assign(&self.pool, camera, &input, &mut list.cells, &mut list.items);
        });

        if flags.contains(RenderFlags::TIMERS) {
            list.info.occluders = occluders;
            list.info.main_gather = main_gather;
            list.info.shadow_gather = shadow_gather;
            list.info.sort = sort;
            list.info.cluster = cluster;
            list.info.total = start.elapsed();
        }

        let dropped = list.dropped_total();
        if dropped > 0 {
            tracing::warn!(dropped, "draw list capacity exceeded");
        }
        tracing::debug!(
            instances = list.instances.len(),
            main_batches = list.main_batches.len(),
            shadow_lists = list.shadow_lists.len(),
            lights = list.lights.len(),
            items = list.items.len(),
            "draw list prepared"
        );
        self.last_stats = stats;
    }

    /// Order main and per-list shadow batches by key, then merge neighbours.
    /// Returns the merged counts.
    fn sort_batches(&mut self, list: &mut DrawList) -> (usize, usize) {
        self.sorter
            .sort_by(&list.main_batches[..], |b| b.sort_key, &mut list.main_batch_indices);
        let merged_main = merge_batches(&mut list.main_batches, &list.main_batch_indices);

        list.shadow_batch_indices.clear();
        let mut merged_shadow = 0;
        for i in 0..list.shadow_lists.len() {
            let shadow_list = list.shadow_lists[i];
            let start = shadow_list.batch_start as usize;
            let range = start..start + shadow_list.batch_count as usize;
            let first = list.shadow_batch_indices.len();
            self.sorter.sort_range_by(
                &list.shadow_batches[..],
                range,
                |b| b.sort_key,
                &mut list.shadow_batch_indices,
            );
            merged_shadow += merge_batches(&mut list.shadow_batches, &list.shadow_batch_indices[first..]);
        }
        (merged_main, merged_shadow)
    }
}

fn timed(f: impl FnOnce()) -> Duration {
    let start = Instant::now();
    f();
    start.elapsed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gather::tests::{builder, camera, cube_at, unit_bounds};
    use glam::{Mat4, Vec3};
    use scenecull_scene::{
        Environment, LightSource, Occluder, ObjectDesc, SceneBuilder, SceneManager, Transform,
    };

    fn renderer() -> Renderer {
        let config = FrontendConfig {
            worker_threads: 2,
            ..Default::default()
        };
        Renderer::new(config).unwrap()
    }

    fn without_sun(b: &mut SceneBuilder) {
        b.set_environment(Environment {
            sun_dir: Vec3::ZERO,
            ..Default::default()
        });
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = FrontendConfig::default();
        config.cluster.res_x = 0;
        assert!(matches!(Renderer::new(config), Err(FrontendError::Config(_))));
    }

    #[test]
    fn empty_scene_gives_empty_list() {
        let mut r = renderer();
        let scene = SceneBuilder::new().build();
        let mut list = r.new_draw_list();
        r.prepare_draw_list(&scene, &camera(), &mut list);
        assert!(list.is_empty());
        assert_eq!(list.frame_index, 0);
        assert_eq!(r.frame(), 1);
    }

    #[test]
    fn camera_facing_away_sees_nothing() {
        let mut b = builder();
        for i in 0..20 {
            cube_at(&mut b, Vec3::new(i as f32 * 2.0, 0.0, 10.0));
        }
        without_sun(&mut b);
        let scene = b.build();
        let mut r = renderer();
        let mut list = r.new_draw_list();
        r.prepare_draw_list(&scene, &camera(), &mut list);
        assert!(list.instances.is_empty());
        assert!(list.main_draws().next().is_none());
        assert!(list.items.is_empty());
    }

    #[test]
    fn identical_cubes_merge_into_instanced_draws() {
        let mut b = builder();
        for i in 0..20 {
            cube_at(&mut b, Vec3::new(i as f32 - 10.0, 0.0, -30.0));
        }
        without_sun(&mut b);
        let scene = b.build();
        let mut r = renderer();
        let mut list = r.new_draw_list();
        r.prepare_draw_list(&scene, &camera(), &mut list);

        assert_eq!(list.instances.len(), 20);
        let draws: Vec<_> = list.main_draws().collect();
        let total: usize = draws.iter().map(|d| d.instance_count()).sum();
        assert_eq!(total, 20);
        assert!(draws.iter().all(|d| d.instance_count() <= 8));
        assert!(draws.len() < 20);
        assert_eq!(r.last_stats().merged_main, 20 - draws.len());
        assert!(draws.windows(2).all(|w| w[0].sort_key <= w[1].sort_key));
    }

    #[test]
    fn occluded_objects_are_culled() {
        let mut b = builder();
        let wall_bounds = unit_bounds();
        let (positions, indices) = scenecull_scene::Mesh::box_geometry(&wall_bounds);
        let wall_mesh = b.add_mesh(scenecull_scene::Mesh::new("wall", 0, 0).with_geometry(positions, indices));
        let wall = Transform::new(
            Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)) * Mat4::from_scale(Vec3::new(60.0, 60.0, 1.0)),
            wall_bounds,
        );
        b.add_object(ObjectDesc::new(wall).with_occluder(Occluder { mesh: wall_mesh }))
            .unwrap();
        cube_at(&mut b, Vec3::new(0.0, 0.0, -40.0));
        cube_at(&mut b, Vec3::new(0.0, 0.0, -5.0));
        without_sun(&mut b);
        let scene = b.build();

        let mut r = renderer();
        let mut list = r.new_draw_list();
        r.prepare_draw_list(&scene, &camera(), &mut list);
        assert_eq!(list.instances.len(), 1);
        assert!(r.last_stats().occluder_triangles > 0);

        r.set_flags(r.flags() - RenderFlags::CULLING);
        r.prepare_draw_list(&scene, &camera(), &mut list);
        assert_eq!(list.instances.len(), 2);
    }

    #[test]
    fn lights_reach_clusters() {
        let mut b = builder();
        let tr = Transform::from_translation(Vec3::new(0.0, 0.0, -6.0), unit_bounds());
        b.add_object(ObjectDesc::new(tr).with_light(LightSource::point(Vec3::ONE, 0.1, 2.0)))
            .unwrap();
        without_sun(&mut b);
        let scene = b.build();

        let mut r = renderer();
        let mut list = r.new_draw_list();
        r.prepare_draw_list(&scene, &camera(), &mut list);
        assert_eq!(list.lights.len(), 1);
        assert!(!list.items.is_empty());
        assert_eq!(r.last_stats().cluster.written as usize, list.items.len());
        assert!(
            (0..list.cells.len())
                .flat_map(|c| list.cell_items(c).iter())
                .all(|item| *item == crate::draw_list::ItemRef::Light(0))
        );
    }

    #[test]
    fn sun_and_spot_shadows_are_sorted_per_list() {
        let mut b = builder();
        for i in 0..6 {
            cube_at(&mut b, Vec3::new(i as f32 - 3.0, -2.0, -8.0));
        }
        let light = LightSource::spot(Vec3::ONE, 0.1, 10.0, Vec3::NEG_Y, 60.0).with_shadow();
        let tr = Transform::from_translation(Vec3::new(0.0, 3.0, -8.0), unit_bounds());
        b.add_object(ObjectDesc::new(tr).with_light(light)).unwrap();
        let scene = b.build();

        let mut r = renderer();
        let mut list = r.new_draw_list();
        r.prepare_draw_list(&scene, &camera(), &mut list);
        assert_eq!(list.shadow_lists.len(), 5);
        assert_eq!(list.lights[0].shadowreg_index, 4);
        let spot = list.shadow_lists[4];
        assert!(spot.dirty);
        let casters: usize = list.shadow_draws(&spot).map(|d| d.instance_count()).sum();
        assert_eq!(casters, 6);
        assert_eq!(list.shadow_batch_indices.len(), list.shadow_batches.len());
    }

    #[test]
    fn timers_and_debug_outputs_follow_flags() {
        let mut b = builder();
        cube_at(&mut b, Vec3::new(0.0, 0.0, -5.0));
        let scene = b.build();
        let mut r = renderer();
        r.set_flags(r.flags() | RenderFlags::TIMERS | RenderFlags::DEBUG_BVH | RenderFlags::DEBUG_CULLING);
        let mut list = r.new_draw_list();
        r.prepare_draw_list(&scene, &camera(), &mut list);
        assert!(list.info.total > Duration::ZERO);
        assert_eq!(list.debug.bvh_nodes.len(), scene.bvh.arena_len());
        assert_eq!(list.debug.bvh_root, scene.bvh.root());
        assert_eq!(list.debug.depth_image.len(), 256 * 128);
    }

    #[test]
    fn moved_object_is_drawn_at_new_place() {
        let mut b = builder();
        let id = cube_at(&mut b, Vec3::new(0.0, 0.0, 20.0));
        without_sun(&mut b);
        let mut manager = SceneManager::new(b.build());
        let mut r = renderer();
        let mut list = r.new_draw_list();

        r.prepare_draw_list(manager.scene(), &camera(), &mut list);
        assert!(list.instances.is_empty());

        manager
            .set_transform(id, Mat4::from_translation(Vec3::new(0.0, 0.0, -20.0)))
            .unwrap();
        manager.update_objects(&[id]);
        r.prepare_draw_list(manager.scene(), &camera(), &mut list);
        assert_eq!(list.instances.len(), 1);
        assert_eq!(list.instances[0].model_matrix[2][3], -20.0);
    }
}
