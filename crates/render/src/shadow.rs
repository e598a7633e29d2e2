//! Shadow gathering: four sun cascades plus one cached atlas region per
//! shadow-casting light.

use glam::Vec3;
use scenecull_common::{Camera, Frustum, VisResult};
use scenecull_scene::ComponentMask;

use crate::draw_list::{ShadowList, ShadowMapRegion};
use crate::gather::Gather;
use crate::shadow_atlas::ShadowAtlas;
use crate::traversal::collect_leaves;

/// Spot cone angles are clamped to this range, in degrees.
const LIGHT_FOV_RANGE: (f32, f32) = (1.0, 160.0);
const LIGHT_NEAR: f32 = 0.1;
/// Camera distance per step down the resolution list.
const RESOLUTION_STEP_DISTANCE: f32 = 100.0;

/// Counters of one shadow gather.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowStats {
    pub cascades: u32,
    pub lights_rendered: u32,
    pub lights_cached: u32,
    pub lights_without_region: u32,
}

/// Orthonormal `(side, up)` pair perpendicular to `dir`, seeded with the
/// world axis least aligned with it.
fn light_basis(dir: Vec3) -> (Vec3, Vec3) {
    let a = dir.abs();
    let seed = if a.x <= a.y && a.x <= a.z {
        Vec3::X
    } else if a.y <= a.z {
        Vec3::Y
    } else {
        Vec3::Z
    };
    let side = dir.cross(seed).normalize();
    (side, side.cross(dir))
}

/// Round `p` to a multiple of `step` along each light axis so cascades move
/// in whole texels.
fn snap_to_texels(p: Vec3, dir: Vec3, side: Vec3, up: Vec3, step: f32) -> Vec3 {
    let snap = |v: f32| (v / step).round() * step;
    snap(p.dot(dir)) * dir + snap(p.dot(side)) * side + snap(p.dot(up)) * up
}

impl Gather<'_> {
    pub fn shadow_pass(&mut self, camera: &Camera, atlas: &mut ShadowAtlas, frame: u64) -> ShadowStats {
        let mut stats = ShadowStats::default();
        self.sun_cascades(camera, atlas, &mut stats);
        self.light_shadows(camera, atlas, frame, &mut stats);
        stats
    }

    fn sun_cascades(&mut self, camera: &Camera, atlas: &mut ShadowAtlas, stats: &mut ShadowStats) {
        let scene = self.scene;
        let config = self.config;
        let shadows = &config.shadows;
        if !scene.env.has_sun() {
            return;
        }
        let Some(root) = scene.bvh.root_bounds() else {
            return;
        };
        let Some(sun_pos) = atlas.reserve_sun(shadows.sun_resolution) else {
            tracing::warn!(resolution = shadows.sun_resolution, "sun cascades do not fit the atlas");
            return;
        };

        let dir = scene.env.sun_dir.normalize();
        let (side, up) = light_basis(dir);
        let max_dist = root.extent().length();
        let half = shadows.sun_resolution / 2;
        let tiles = [[0, 0], [half, 0], [0, half], [half, half]];

        let mut near = camera.near();
        for (tile, &far) in tiles.iter().zip(&shadows.cascade_distances) {
            let (center, radius) = camera.with_depth_range(near, far).bounding_sphere();
            near = far;

            let step = 2.0 * radius / half as f32;
            let target = snap_to_texels(center, dir, side, up, step);
            let eye = target + max_dist * dir;
            let cam_far = max_dist + radius;
            let sun_cam = Camera::orthographic(eye, target, up, -radius, radius, -radius, radius, 0.0, cam_far);

            let pos = [sun_pos[0] + tile[0], sun_pos[1] + tile[1]];
            let region = ShadowMapRegion::new(atlas.normalized(pos, half), &sun_cam.clip_from_world());
            let Some(region_index) = self.list.shadow_regions.push(region) else {
                break;
            };
            let batch_start = self.list.shadow_batches.len() as u32;
            let batch_count = self.shadow_traversal(sun_cam.frustum());
            let list = ShadowList {
                shadow_map_pos: pos,
                shadow_map_size: half,
                batch_start,
                batch_count,
                cam_near: 0.0,
                cam_far,
                region_index,
                dirty: true,
            };
            if self.list.shadow_lists.push(list).is_none() {
                break;
            }
            stats.cascades += 1;
        }
    }

    fn light_shadows(&mut self, camera: &Camera, atlas: &mut ShadowAtlas, frame: u64, stats: &mut ShadowStats) {
        let scene = self.scene;
        let config = self.config;
        let shadows = &config.shadows;
        let eye = camera.world_position();

        for i in 0..self.scratch.light_owners.len() {
            let owner = self.scratch.light_owners[i];
            if !scene.light_of(owner).is_some_and(|l| l.cast_shadow) {
                continue;
            }
            let volume = self.scratch.light_volumes[i];

            let res_index = ((volume.pos.distance(eye) / RESOLUTION_STEP_DISTANCE) as usize)
                .min(shadows.light_resolutions.len() - 1);
            let Some(index) = atlas.acquire(owner, &shadows.light_resolutions, res_index, frame) else {
                stats.lights_without_region += 1;
                continue;
            };
            let Some(region) = atlas.region(index).copied() else {
                continue;
            };

            let axis = if volume.axis == Vec3::ZERO { Vec3::NEG_Y } else { volume.axis };
            let up = if axis.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };
            let fov = (2.0 * volume.spot.clamp(-1.0, 1.0).acos())
                .to_degrees()
                .clamp(LIGHT_FOV_RANGE.0, LIGHT_FOV_RANGE.1);
            let cam_far = volume.influence.max(LIGHT_NEAR * 2.0);
            let light_cam = Camera::perspective(volume.pos, volume.pos + axis, up, fov, 1.0, LIGHT_NEAR, cam_far);
            let frustum = light_cam.frustum();

            // Only moved objects invalidate a cached shadow.
            let sees_dynamic = scene.recently_changed.iter().any(|&id| {
                scene
                    .object(id)
                    .is_some_and(|o| o.last_change_mask.contains(ComponentMask::TRANSFORM))
                    && scene
                        .transform_of(id)
                        .is_some_and(|tr| frustum.check_aabb(&tr.world_bbox) != VisResult::Invisible)
            });
            let cached = !sees_dynamic
                && region
                    .last_update
                    .is_some_and(|updated| frame.saturating_sub(updated) > shadows.refresh_frames);

            let shadow_region = ShadowMapRegion::new(atlas.normalized(region.pos, region.size), &light_cam.clip_from_world());
            let Some(region_index) = self.list.shadow_regions.push(shadow_region) else {
                break;
            };
            let batch_start = self.list.shadow_batches.len() as u32;
            let batch_count = if cached { 0 } else { self.shadow_traversal(frustum) };
            let list = ShadowList {
                shadow_map_pos: region.pos,
                shadow_map_size: region.size,
                batch_start,
                batch_count,
                cam_near: LIGHT_NEAR,
                cam_far,
                region_index,
                dirty: !cached,
            };
            if self.list.shadow_lists.push(list).is_none() {
                break;
            }

            atlas.touch(index, frame, sees_dynamic || region.last_update.is_none());
            if let Some(item) = self.list.lights.get_mut(i) {
                item.shadowreg_index = region_index as i32;
            }
            if cached {
                stats.lights_cached += 1;
            } else {
                stats.lights_rendered += 1;
            }
        }
    }

    /// Push shadow batches for every caster in `frustum`. Returns the number
    /// of batches added.
    fn shadow_traversal(&mut self, frustum: &Frustum) -> u32 {
        let scene = self.scene;
        let start = self.list.shadow_batches.len();

        let mut hits = std::mem::take(&mut self.scratch.hits);
        hits.clear();
        collect_leaves(&scene.bvh, &mut self.scratch.stack, &mut hits, |b| frustum.check_aabb(b));
        for hit in &hits {
            let Some(tr) = scene.transform_of(hit.object) else {
                continue;
            };
            if !hit.skip_check && frustum.check_aabb(&tr.world_bbox) == VisResult::Invisible {
                continue;
            }
            self.push_shadow_batches(hit.object, tr);
        }
        self.scratch.hits = hits;
        (self.list.shadow_batches.len() - start) as u32
    }
}
