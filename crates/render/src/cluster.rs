//! Clustered assignment of lights, decals and probes to froxels.
//!
//! The view frustum is cut into `res_x * res_y * res_z` sub-frusta. One job
//! per depth slice tests every volume hierarchically: slice near/far planes,
//! then row top/bottom, then the left/right planes of each cell. Jobs only
//! fill slice-local lists and per-cell counts. After the barrier a serial pass
//! hands out item offsets in cell order, clamps against the total capacity
//! and copies the local lists into place, so the result does not depend on
//! how the jobs were scheduled.

use scenecull_common::{Camera, Frustum, Plane};

use crate::bounded::BoundedVec;
use crate::config::ClusterConfig;
use crate::draw_list::{CellData, ItemRef};
use crate::volumes::{DecalVolume, LightVolume, ProbeVolume};
use crate::workers::WorkerPool;

/// Volumes to distribute, indexed like the draw list's item arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterInput<'a> {
    pub lights: &'a [LightVolume],
    pub decals: &'a [DecalVolume],
    pub probes: &'a [ProbeVolume],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    /// Item slots requested by all cells before clamping.
    pub requested: u32,
    /// Items written.
    pub written: u32,
    /// Cells that lost items to the total capacity.
    pub clamped_cells: u32,
}

/// Per-slice local item lists, `limit` slots per cell.
#[derive(Debug, Default)]
struct SliceScratch {
    lights: Vec<u32>,
    decals: Vec<u32>,
    probes: Vec<u32>,
}

/// What a slice job needs to read.
struct SliceJob<'a> {
    frustums: &'a [Frustum],
    input: &'a ClusterInput<'a>,
    res_x: usize,
    limits: [u32; 3],
}

#[derive(Debug)]
pub struct ClusterAssigner {
    res: [u32; 3],
    limits: [u32; 3],
    sub_frustums: Vec<Frustum>,
    slices: Vec<SliceScratch>,
}

impl ClusterAssigner {
    pub fn new(config: &ClusterConfig) -> Self {
        let per_slice = config.cells_per_slice();
        let limits = [
            config.max_lights_per_cell,
            config.max_decals_per_cell,
            config.max_probes_per_cell,
        ];
        let slices = (0..config.res_z)
            .map(|_| SliceScratch {
                lights: vec![0; per_slice * limits[0] as usize],
                decals: vec![0; per_slice * limits[1] as usize],
                probes: vec![0; per_slice * limits[2] as usize],
            })
            .collect();
        Self {
            res: [config.res_x, config.res_y, config.res_z],
            limits,
            sub_frustums: Vec::with_capacity(config.cell_count()),
            slices,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.res.iter().map(|&r| r as usize).product()
    }

    /// Sub-frusta of the most recent `assign`, in cell order.
    pub fn sub_frustums(&self) -> &[Frustum] {
        &self.sub_frustums
    }

    /// Fill `cells` and `items` for `camera`. `cells` must hold one entry per
    /// froxel.
    pub fn assign(
        &mut self,
        pool: &WorkerPool,
        camera: &Camera,
        input: &ClusterInput<'_>,
        cells: &mut [CellData],
        items: &mut BoundedVec<ItemRef>,
    ) -> ClusterStats {
        let [res_x, res_y, res_z] = self.res;
        let per_slice = (res_x * res_y) as usize;
        items.clear();
        cells.fill(CellData::default());
        if cells.len() != self.cell_count() {
            tracing::warn!(cells = cells.len(), expected = self.cell_count(), "cluster grid mismatch");
            return ClusterStats::default();
        }

        camera.extract_sub_frustums(res_x, res_y, res_z, &mut self.sub_frustums);

        let job = SliceJob {
            frustums: &self.sub_frustums,
            input,
            res_x: res_x as usize,
            limits: self.limits,
        };

        let slices = cells
            .chunks_mut(per_slice)
            .zip(self.slices.iter_mut())
            .enumerate();
        pool.fork_join(slices, |(z, (slice_cells, scratch))| {
            job.run(z, slice_cells, scratch);
        });

        let capacity = items.capacity() as u32;
        let stats = allocate_offsets(cells, capacity);
        items.resize(stats.written as usize, ItemRef::Light(0));
        for (slice_cells, scratch) in cells.chunks(per_slice).zip(&self.slices) {
            scatter(slice_cells, scratch, self.limits, items);
        }

        if stats.clamped_cells > 0 {
            tracing::debug!(
                requested = stats.requested,
                capacity,
                cells = stats.clamped_cells,
                "cluster items clamped"
            );
        }
        stats
    }
}

impl SliceJob<'_> {
    fn run(&self, z: usize, cells: &mut [CellData], scratch: &mut SliceScratch) {
        let per_slice = cells.len();
        let frustums = &self.frustums[z * per_slice..(z + 1) * per_slice];
        let rows = per_slice / self.res_x;

        self.bin(
            frustums,
            rows,
            self.input.lights,
            |v, p| v.outside_plane(p),
            &mut scratch.lights,
            self.limits[0],
            cells,
            |c| &mut c.light_count,
        );
        self.bin(
            frustums,
            rows,
            self.input.decals,
            |v, p| v.outside_plane(p),
            &mut scratch.decals,
            self.limits[1],
            cells,
            |c| &mut c.decal_count,
        );
        self.bin(
            frustums,
            rows,
            self.input.probes,
            |v, p| v.outside_plane(p),
            &mut scratch.probes,
            self.limits[2],
            cells,
            |c| &mut c.probe_count,
        );
    }

    /// Test every volume against the slice, its rows and its cells, keeping
    /// the first `limit` hits per cell.
    #[allow(clippy::too_many_arguments)]
    fn bin<V>(
        &self,
        frustums: &[Frustum],
        rows: usize,
        volumes: &[V],
        outside: impl Fn(&V, &Plane) -> bool,
        local: &mut [u32],
        limit: u32,
        cells: &mut [CellData],
        count_of: impl Fn(&mut CellData) -> &mut u32,
    ) {
        let res_x = self.res_x;
        let slice = &frustums[0].planes;
        for (index, volume) in volumes.iter().enumerate() {
            if outside(volume, &slice[Frustum::NEAR]) || outside(volume, &slice[Frustum::FAR]) {
                continue;
            }
            for y in 0..rows {
                let row = &frustums[y * res_x].planes;
                if outside(volume, &row[Frustum::TOP]) || outside(volume, &row[Frustum::BOTTOM]) {
                    continue;
                }
                for x in 0..res_x {
                    let cell = y * res_x + x;
                    let planes = &frustums[cell].planes;
                    if outside(volume, &planes[Frustum::LEFT]) || outside(volume, &planes[Frustum::RIGHT]) {
                        continue;
                    }
                    let count = count_of(&mut cells[cell]);
                    if *count < limit {
                        local[cell * limit as usize + *count as usize] = index as u32;
                        *count += 1;
                    }
                }
            }
        }
    }
}

/// Give every non-empty cell its item offset, walking cells in index order.
///
/// A cell starting at or past `capacity` is emptied. A cell straddling it
/// keeps its lights first, then decals, then probes.
fn allocate_offsets(cells: &mut [CellData], capacity: u32) -> ClusterStats {
    let mut stats = ClusterStats::default();
    let mut next = 0u32;
    for cell in cells.iter_mut() {
        let wanted = cell.item_count();
        if wanted == 0 {
            continue;
        }
        stats.requested += wanted;
        if next >= capacity {
            *cell = CellData::default();
            stats.clamped_cells += 1;
            continue;
        }
        cell.item_offset = next;
        let mut room = capacity - next;
        if wanted > room {
            for count in [&mut cell.light_count, &mut cell.decal_count, &mut cell.probe_count] {
                *count = (*count).min(room);
                room -= *count;
            }
            stats.clamped_cells += 1;
        }
        next += cell.item_count();
    }
    stats.written = next;
    stats
}

fn scatter(cells: &[CellData], scratch: &SliceScratch, limits: [u32; 3], items: &mut [ItemRef]) {
    for (i, cell) in cells.iter().enumerate() {
        let mut at = cell.item_offset as usize;
        let lists: [(&Vec<u32>, u32, u32, fn(u32) -> ItemRef); 3] = [
            (&scratch.lights, limits[0], cell.light_count, ItemRef::Light),
            (&scratch.decals, limits[1], cell.decal_count, ItemRef::Decal),
            (&scratch.probes, limits[2], cell.probe_count, ItemRef::Probe),
        ];
        for (local, limit, count, make) in lists {
            let start = i * limit as usize;
            for &index in &local[start..start + count as usize] {
                items[at] = make(index);
                at += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use scenecull_common::Aabb;
    use scenecull_scene::{Decal, LightSource, Probe, Transform};

    fn camera() -> Camera {
        Camera::perspective(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 90.0, 1.0, 1.0, 100.0)
    }

    fn small_grid() -> ClusterConfig {
        ClusterConfig {
            res_x: 4,
            res_y: 4,
            res_z: 4,
            ..Default::default()
        }
    }

    fn at(pos: Vec3) -> Transform {
        Transform::from_translation(pos, Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)))
    }

    fn light(pos: Vec3, influence: f32) -> LightVolume {
        LightVolume::new(&LightSource::point(Vec3::ONE, 0.1, influence), &at(pos))
    }

    fn run(config: &ClusterConfig, input: &ClusterInput<'_>) -> (Vec<CellData>, BoundedVec<ItemRef>, ClusterStats, ClusterAssigner) {
        run_with_threads(config, input, 2)
    }

    fn run_with_threads(
        config: &ClusterConfig,
        input: &ClusterInput<'_>,
        threads: usize,
    ) -> (Vec<CellData>, BoundedVec<ItemRef>, ClusterStats, ClusterAssigner) {
        let pool = WorkerPool::new(threads).unwrap();
        let mut assigner = ClusterAssigner::new(config);
        let mut cells = vec![CellData::default(); config.cell_count()];
        let mut items = BoundedVec::new(config.max_items_total as usize);
        let stats = assigner.assign(&pool, &camera(), input, &mut cells, &mut items);
        (cells, items, stats, assigner)
    }

    fn cell_slice<'a>(cells: &[CellData], items: &'a [ItemRef], cell: usize) -> &'a [ItemRef] {
        let c = cells[cell];
        &items[c.item_offset as usize..(c.item_offset + c.item_count()) as usize]
    }

    #[test]
    fn light_behind_camera_lands_nowhere() {
        let lights = [light(Vec3::new(0.0, 0.0, 50.0), 5.0)];
        let input = ClusterInput {
            lights: &lights,
            ..Default::default()
        };
        let (cells, items, stats, _) = run(&small_grid(), &input);
        assert!(cells.iter().all(|c| c.item_count() == 0));
        assert!(items.is_empty());
        assert_eq!(stats.requested, 0);
    }

    #[test]
    fn every_overlapped_cell_lists_the_light() {
        let lights = [
            light(Vec3::new(0.0, 0.0, -10.0), 3.0),
            light(Vec3::new(-20.0, 5.0, -40.0), 8.0),
        ];
        let input = ClusterInput {
            lights: &lights,
            ..Default::default()
        };
        let (cells, items, stats, assigner) = run(&small_grid(), &input);
        assert_eq!(stats.clamped_cells, 0);

        let mut hits = 0;
        for (cell, frustum) in assigner.sub_frustums().iter().enumerate() {
            let listed = cell_slice(&cells, &items, cell);
            for (i, l) in lights.iter().enumerate() {
                let expected = !l.outside_any(&frustum.planes);
                assert_eq!(listed.contains(&ItemRef::Light(i as u32)), expected, "cell {cell} light {i}");
                hits += expected as usize;
            }
        }
        assert!(hits > 0);
        assert_eq!(items.len(), hits);
    }

    #[test]
    fn items_are_ordered_by_kind() {
        let lights = [light(Vec3::new(0.0, 0.0, -10.0), 2.0)];
        let decals = [DecalVolume::new(&Decal::boxed(Vec3::splat(1.0)), &at(Vec3::new(0.0, 0.0, -10.0)))];
        let probes = [ProbeVolume::new(&Probe::new(2.0, 0), &at(Vec3::new(0.0, 0.0, -10.0)))];
        let input = ClusterInput {
            lights: &lights,
            decals: &decals,
            probes: &probes,
        };
        let (cells, items, _, _) = run(&small_grid(), &input);
        let cell = (0..cells.len())
            .find(|&i| cells[i].item_count() == 3)
            .expect("some cell sees all three");
        assert_eq!(
            cell_slice(&cells, &items, cell),
            &[ItemRef::Light(0), ItemRef::Decal(0), ItemRef::Probe(0)]
        );
    }

    #[test]
    fn per_cell_limit_keeps_first_lights() {
        let lights: Vec<_> = (0..5).map(|_| light(Vec3::new(0.0, 0.0, -10.0), 500.0)).collect();
        let config = ClusterConfig {
            max_lights_per_cell: 2,
            ..small_grid()
        };
        let input = ClusterInput {
            lights: &lights,
            ..Default::default()
        };
        let (cells, items, stats, _) = run(&config, &input);
        assert_eq!(stats.requested, 2 * 64);
        for cell in 0..cells.len() {
            assert_eq!(cell_slice(&cells, &items, cell), &[ItemRef::Light(0), ItemRef::Light(1)]);
        }
    }

    #[test]
    fn total_capacity_clamps_cells() {
        let lights: Vec<_> = (0..3).map(|_| light(Vec3::new(0.0, 0.0, -10.0), 500.0)).collect();
        let config = ClusterConfig {
            max_items_total: 10,
            ..small_grid()
        };
        let input = ClusterInput {
            lights: &lights,
            ..Default::default()
        };
        let (cells, items, stats, _) = run(&config, &input);
        assert_eq!(stats.requested, 3 * 64);
        assert_eq!(items.len(), 10);
        let total: u32 = cells.iter().map(CellData::item_count).sum();
        assert_eq!(total, 10);
        assert!(stats.clamped_cells > 0);
        for cell in cells.iter().filter(|c| c.item_count() > 0) {
            assert!(cell.item_offset + cell.item_count() <= 10);
        }
    }

    /// Check that each cell lists exactly the volumes not outside its planes.
    fn assert_complete(
        assigner: &ClusterAssigner,
        cells: &[CellData],
        items: &[ItemRef],
        count: usize,
        item: fn(u32) -> ItemRef,
        outside: impl Fn(usize, &Plane) -> bool,
    ) -> usize {
        let mut hits = 0;
        for (cell, frustum) in assigner.sub_frustums().iter().enumerate() {
            let listed = cell_slice(cells, items, cell);
            for i in 0..count {
                let expected = !frustum.planes.iter().any(|p| outside(i, p));
                assert_eq!(listed.contains(&item(i as u32)), expected, "cell {cell} item {i}");
                hits += expected as usize;
            }
        }
        hits
    }

    #[test]
    fn spot_cone_lists_fewer_cells_than_its_sphere() {
        let pos = Vec3::new(0.0, 0.0, -20.0);
        let spots = [LightVolume::new(&LightSource::spot(Vec3::ONE, 0.1, 30.0, Vec3::X, 15.0), &at(pos))];
        let input = ClusterInput {
            lights: &spots,
            ..Default::default()
        };
        let (cells, items, _, assigner) = run(&small_grid(), &input);
        let spot_hits = assert_complete(&assigner, &cells, &items, 1, ItemRef::Light, |i, p| {
            spots[i].outside_plane(p)
        });

        let spheres = [light(pos, 30.0)];
        let input = ClusterInput {
            lights: &spheres,
            ..Default::default()
        };
        let (cells, items, _, assigner) = run(&small_grid(), &input);
        let sphere_hits = assert_complete(&assigner, &cells, &items, 1, ItemRef::Light, |i, p| {
            spheres[i].outside_plane(p)
        });
        assert!(spot_hits > 0);
        assert!(spot_hits < sphere_hits);
    }

    #[test]
    fn every_overlapped_cell_lists_the_decal() {
        let decals = [
            DecalVolume::new(&Decal::boxed(Vec3::new(2.0, 1.0, 3.0)), &at(Vec3::new(1.0, -1.0, -8.0))),
            DecalVolume::new(&Decal::boxed(Vec3::splat(6.0)), &at(Vec3::new(-15.0, 10.0, -45.0))),
        ];
        let input = ClusterInput {
            decals: &decals,
            ..Default::default()
        };
        let (cells, items, stats, assigner) = run(&small_grid(), &input);
        let hits = assert_complete(&assigner, &cells, &items, decals.len(), ItemRef::Decal, |i, p| {
            decals[i].outside_plane(p)
        });
        assert!(hits > 0);
        assert_eq!(stats.written as usize, hits);
    }

    #[test]
    fn every_overlapped_cell_lists_the_probe() {
        let probes = [
            ProbeVolume::new(&Probe::new(3.0, 0), &at(Vec3::new(0.0, 2.0, -12.0))),
            ProbeVolume::new(&Probe::new(10.0, 1), &at(Vec3::new(30.0, -20.0, -60.0))),
        ];
        let input = ClusterInput {
            probes: &probes,
            ..Default::default()
        };
        let (cells, items, stats, assigner) = run(&small_grid(), &input);
        let hits = assert_complete(&assigner, &cells, &items, probes.len(), ItemRef::Probe, |i, p| {
            probes[i].outside_plane(p)
        });
        assert!(hits > 0);
        assert_eq!(stats.written as usize, hits);
    }

    #[test]
    fn straddling_cell_keeps_lights_then_decals_then_probes() {
        let center = Vec3::new(0.0, 0.0, -50.0);
        let lights: Vec<_> = (0..2).map(|_| light(center, 500.0)).collect();
        let decals: Vec<_> = (0..2)
            .map(|_| DecalVolume::new(&Decal::boxed(Vec3::splat(200.0)), &at(center)))
            .collect();
        let probes: Vec<_> = (0..2)
            .map(|_| ProbeVolume::new(&Probe::new(500.0, 0), &at(center)))
            .collect();
        let config = ClusterConfig {
            max_decals_per_cell: 1,
            max_items_total: 8,
            ..small_grid()
        };
        let input = ClusterInput {
            lights: &lights,
            decals: &decals,
            probes: &probes,
        };
        let (cells, items, stats, _) = run(&config, &input);

        // Every cell wants two lights, one decal (per-cell limit) and two probes.
        assert_eq!(stats.requested, 5 * 64);
        assert_eq!(stats.written, 8);
        assert_eq!(stats.clamped_cells, 63);
        assert_eq!(
            cell_slice(&cells, &items, 0),
            &[ItemRef::Light(0), ItemRef::Light(1), ItemRef::Decal(0), ItemRef::Probe(0), ItemRef::Probe(1)]
        );
        assert_eq!(
            cells[1],
            CellData {
                item_offset: 5,
                light_count: 2,
                decal_count: 1,
                probe_count: 0
            }
        );
        assert!(cells[2..].iter().all(|c| *c == CellData::default()));
    }

    #[test]
    fn clamping_does_not_depend_on_worker_count() {
        let lights: Vec<_> = (0..4)
            .map(|i| light(Vec3::new(i as f32 * 6.0 - 9.0, 0.0, -15.0 - i as f32 * 10.0), 12.0))
            .collect();
        let probes = [ProbeVolume::new(&Probe::new(20.0, 0), &at(Vec3::new(0.0, 0.0, -30.0)))];
        let config = ClusterConfig {
            max_items_total: 9,
            ..small_grid()
        };
        let input = ClusterInput {
            lights: &lights,
            probes: &probes,
            ..Default::default()
        };

        let (cells, items, stats, _) = run_with_threads(&config, &input, 1);
        assert!(stats.clamped_cells > 0);
        for threads in [2, 3, 4, 8] {
            for _ in 0..4 {
                let (c, i, s, _) = run_with_threads(&config, &input, threads);
                assert_eq!(c, cells, "{threads} threads");
                assert_eq!(i.to_vec(), items.to_vec(), "{threads} threads");
                assert_eq!(s, stats);
            }
        }
    }
}
