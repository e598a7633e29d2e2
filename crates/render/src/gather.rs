//! Occluder rasterization and the main visibility gather.
//!
//! [`Gather`] borrows everything one frame's traversals share: the scene,
//! the output list and the frontend's scratch state. The shadow passes in
//! `shadow.rs` extend it.

use glam::Vec3;
use scenecull_common::{Aabb, Camera, ObjectId, VisResult};
use scenecull_scene::{AnimState, ComponentMask, DrawableFlags, Mesh, SceneData, SkinRange, Transform};

use crate::batch::{DrawBatch, MainSortKey, ShadowSortKey};
use crate::config::{FrontendConfig, RenderFlags};
use crate::draw_list::{DecalItem, DrawList, InstanceData, LightItem, ProbeItem, SkinRegion, SkinTransform, rows_3x4};
use crate::occlusion::OcclusionBuffer;
use crate::traversal::{LeafHit, collect_leaves};
use crate::volumes::{DecalVolume, LightVolume, ProbeVolume};

/// Boxes the camera is this close to are never occlusion tested.
const OCCLUSION_CAMERA_MARGIN: f32 = 0.5;

/// Per-object frame state. An object's instance and skinned vertices are
/// pushed once per frame, whichever pass reaches it first.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ProcessedObject {
    stamp: u64,
    instance: Option<u32>,
    base_vertex: u32,
}

/// Scratch reused across frames.
#[derive(Debug, Default)]
pub(crate) struct GatherScratch {
    pub stack: Vec<u32>,
    pub hits: Vec<LeafHit>,
    pub processed: Vec<ProcessedObject>,
    /// Owner of each entry of the draw list's `lights`.
    pub light_owners: Vec<ObjectId>,
    pub light_volumes: Vec<LightVolume>,
    pub decal_volumes: Vec<DecalVolume>,
    pub probe_volumes: Vec<ProbeVolume>,
}

impl GatherScratch {
    pub fn begin_frame(&mut self, object_count: usize) {
        if self.processed.len() < object_count {
            self.processed.resize(object_count, ProcessedObject::default());
        }
        self.light_owners.clear();
        self.light_volumes.clear();
        self.decal_volumes.clear();
        self.probe_volumes.clear();
    }
}

/// Counters of the main gather.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatherStats {
    pub nodes_tested: usize,
    pub occluded: usize,
    pub objects_visible: usize,
}

pub(crate) struct Gather<'a> {
    pub scene: &'a SceneData,
    pub config: &'a FrontendConfig,
    pub flags: RenderFlags,
    pub list: &'a mut DrawList,
    pub scratch: &'a mut GatherScratch,
    /// Non-zero tag of the current frame in `processed`.
    pub stamp: u64,
}

impl Gather<'_> {
    /// Rasterize every occluder in view into `buffer`. Returns the number of
    /// triangles drawn.
    pub fn occluder_pass(&mut self, camera: &Camera, buffer: &mut OcclusionBuffer) -> usize {
        let scene = self.scene;
        let frustum = camera.frustum();
        buffer.clear(camera.clip_from_world());

        let mut hits = std::mem::take(&mut self.scratch.hits);
        hits.clear();
        collect_leaves(&scene.bvh, &mut self.scratch.stack, &mut hits, |b| frustum.check_aabb(b));

        let mut triangles = 0;
        for hit in &hits {
            let Some(obj) = scene.object(hit.object) else {
                continue;
            };
            if !obj.has(ComponentMask::TRANSFORM | ComponentMask::OCCLUDER) {
                continue;
            }
            let (Some(tr), Some(occluder)) = (scene.transform_of(hit.object), scene.occluder_of(hit.object))
            else {
                continue;
            };
            if !hit.skip_check && frustum.check_aabb(&tr.world_bbox) == VisResult::Invisible {
                continue;
            }
            if let Some(mesh) = scene.assets.mesh(occluder.mesh) {
                triangles += buffer.rasterize_mesh(&tr.world_from_object, &mesh.positions, &mesh.indices);
            }
        }
        self.scratch.hits = hits;
        triangles
    }

    /// Collect instances, main batches, lights, decals and probes visible from
    /// `camera`, culling against `occlusion` when given.
    pub fn main_pass(&mut self, camera: &Camera, occlusion: Option<&OcclusionBuffer>) -> GatherStats {
        let scene = self.scene;
        let flags = self.flags;
        let frustum = camera.frustum();
        let eye = camera.world_position();
        let occluded = |bbox: &Aabb| match occlusion {
            Some(buffer) if !bbox.expanded(OCCLUSION_CAMERA_MARGIN).contains_point(eye) => {
                !buffer.is_box_visible(bbox)
            }
            _ => false,
        };

        let mut stats = GatherStats::default();
        let mut hits = std::mem::take(&mut self.scratch.hits);
        hits.clear();
        stats.nodes_tested = collect_leaves(&scene.bvh, &mut self.scratch.stack, &mut hits, |bbox| {
            let res = frustum.check_aabb(bbox);
            if res != VisResult::Invisible && occluded(bbox) {
                stats.occluded += 1;
                return VisResult::Invisible;
            }
            res
        });

        for hit in &hits {
            let id = hit.object;
            let (Some(obj), Some(tr)) = (scene.object(id), scene.transform_of(id)) else {
                continue;
            };
            if !hit.skip_check {
                if frustum.check_aabb(&tr.world_bbox) == VisResult::Invisible {
                    continue;
                }
                if occluded(&tr.world_bbox) {
                    stats.occluded += 1;
                    continue;
                }
            }
            stats.objects_visible += 1;

            if obj.has(ComponentMask::DRAWABLE) {
                self.push_main_batches(id, tr, eye);
            }
            if flags.contains(RenderFlags::LIGHTS)
                && let Some(light) = scene.light_of(id)
            {
                let volume = LightVolume::new(light, tr);
                if hit.skip_check || !volume.outside_any(&frustum.planes) {
                    let item = LightItem {
                        pos: volume.pos.to_array(),
                        radius: volume.radius,
                        col: light.color.to_array(),
                        shadowreg_index: -1,
                        dir: volume.axis.to_array(),
                        spot: volume.spot,
                    };
                    if self.list.lights.push(item).is_some() {
                        self.scratch.light_owners.push(id);
                        self.scratch.light_volumes.push(volume);
                    }
                }
            }
            if flags.contains(RenderFlags::DECALS)
                && let Some(decal) = scene.decal_of(id)
            {
                let volume = DecalVolume::new(decal, tr);
                if hit.skip_check || frustum.check_points(&volume.corners) != VisResult::Invisible {
                    let item = DecalItem {
                        mat: rows_3x4(&volume.clip_from_world),
                        diff: decal.diffuse.to_array(),
                        norm: decal.normal.to_array(),
                        spec: decal.specular.to_array(),
                    };
                    if self.list.decals.push(item).is_some() {
                        self.scratch.decal_volumes.push(volume);
                    }
                }
            }
            if flags.contains(RenderFlags::PROBES)
                && let Some(probe) = scene.probe_of(id)
            {
                let volume = ProbeVolume::new(probe, tr);
                if hit.skip_check || frustum.check_sphere(volume.pos, volume.radius) != VisResult::Invisible {
                    let item = ProbeItem::new(volume.pos, volume.radius, probe.layer, &probe.sh_coeffs);
                    if self.list.probes.push(item).is_some() {
                        self.scratch.probe_volumes.push(volume);
                    }
                }
            }
        }
        self.scratch.hits = hits;
        stats
    }

    fn push_main_batches(&mut self, id: ObjectId, tr: &Transform, eye: Vec3) {
        let scene = self.scene;
        let Some(mesh) = scene.drawable_of(id).and_then(|d| scene.assets.mesh(d.mesh)) else {
            return;
        };
        let Some((instance, base_vertex)) = self.instance_of(id, tr, mesh) else {
            return;
        };

        let dist = tr.world_bbox.min.distance(eye);
        let cam_dist = (255.0 * dist / self.config.max_sort_distance).min(255.0) as u8;
        let program_slot = if self.flags.contains(RenderFlags::LIGHTMAP) { 0 } else { 1 };

        for group in &mesh.groups {
            let Some(material) = scene.assets.material(group.material) else {
                continue;
            };
            let indices_offset = mesh.index_offset + group.index_offset;
            let key = MainSortKey {
                alpha_blend: material.is_alpha_blend(),
                alpha_test: material.is_alpha_test(),
                program: material.programs[program_slot].0,
                material: group.material.0,
                cam_dist,
                indices_offset,
            };
            let batch = DrawBatch::new(key.pack(), indices_offset, group.index_count, base_vertex, instance);
            if self.list.main_batches.push(batch).is_none() {
                tracing::debug!(%id, "main batch capacity reached");
                break;
            }
        }
    }

    /// Shadow batches of one object. Blended groups and objects hidden from
    /// shadows are skipped. Non-alpha-tested groups share material 0 so they
    /// merge across materials.
    pub(crate) fn push_shadow_batches(&mut self, id: ObjectId, tr: &Transform) {
        let scene = self.scene;
        let Some(drawable) = scene.drawable_of(id) else {
            return;
        };
        if !drawable.flags.contains(DrawableFlags::VISIBLE_TO_SHADOW) {
            return;
        }
        let Some(mesh) = scene.assets.mesh(drawable.mesh) else {
            return;
        };
        let Some((instance, base_vertex)) = self.instance_of(id, tr, mesh) else {
            return;
        };

        for group in &mesh.groups {
            let Some(material) = scene.assets.material(group.material) else {
                continue;
            };
            if material.is_alpha_blend() {
                continue;
            }
            let alpha_test = material.is_alpha_test();
            let indices_offset = mesh.index_offset + group.index_offset;
            let key = ShadowSortKey {
                alpha_test,
                material: if alpha_test { group.material.0 } else { 0 },
                indices_offset,
            };
            let batch = DrawBatch::new(key.pack(), indices_offset, group.index_count, base_vertex, instance);
            if self.list.shadow_batches.push(batch).is_none() {
                break;
            }
        }
    }

    /// Instance index and vertex base of an object, pushing its instance and
    /// skinning data on first use this frame.
    fn instance_of(&mut self, id: ObjectId, tr: &Transform, mesh: &Mesh) -> Option<(u32, u32)> {
        let slot = id.index();
        let cached = *self.scratch.processed.get(slot)?;
        if cached.stamp == self.stamp {
            return cached.instance.map(|i| (i, cached.base_vertex));
        }

        let skinned = match (mesh.skin, self.scene.anim_state_of(id)) {
            (Some(skin), Some(anim)) => self.push_skinned(anim, skin),
            _ => None,
        };
        let base_vertex = skinned.unwrap_or(mesh.base_vertex);
        let instance = self.list.instances.push(InstanceData::new(&tr.world_from_object));
        if instance.is_none() {
            tracing::debug!(%id, "instance capacity reached");
        }
        self.scratch.processed[slot] = ProcessedObject {
            stamp: self.stamp,
            instance,
            base_vertex,
        };
        instance.map(|i| (i, base_vertex))
    }

    /// Queue a skinned mesh for this frame. Returns the first vertex of its
    /// skinned output, or `None` when the skinning arrays are full.
    fn push_skinned(&mut self, anim: &AnimState, skin: SkinRange) -> Option<u32> {
        let skinning = &self.config.skinning;
        let list = &mut *self.list;
        let bones = skin.bone_count as usize;
        let region_count = skin.vertex_count.div_ceil(skinning.region_size) as usize;
        if list.skin_transforms.remaining() < bones || list.skin_regions.remaining() < region_count {
            tracing::debug!(bones, region_count, "skinning capacity reached");
            return None;
        }

        let xform_offset = list.skin_transforms.len() as u32;
        for m in anim.palette.iter().take(bones) {
            list.skin_transforms.push(SkinTransform { rows: rows_3x4(m) });
        }

        let out_base = skinning.output_base_vertex + list.skin_vertices_count;
        let mut start = 0;
        while start < skin.vertex_count {
            let count = skinning.region_size.min(skin.vertex_count - start);
            list.skin_regions.push(SkinRegion {
                in_vtx_offset: skin.vertex_offset + start,
                out_vtx_offset: out_base + start,
                xform_offset,
                vertex_count: count,
            });
            start += count;
        }
        list.skin_vertices_count += skin.vertex_count;
        Some(out_base)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use glam::Mat4;
    use scenecull_scene::{
        Decal, Drawable, LightSource, Material, MaterialFlags, MaterialId, Occluder, ObjectDesc, Probe,
        ProgramId, SceneBuilder,
    };

    pub(crate) fn unit_bounds() -> Aabb {
        Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5))
    }

    pub(crate) fn camera() -> Camera {
        Camera::perspective(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 90.0, 1.0, 0.5, 200.0)
    }

    /// Builder with an opaque material (0), a blended one (1) and a cube
    /// mesh (0) using the opaque material.
    pub(crate) fn builder() -> SceneBuilder {
        let mut b = SceneBuilder::new();
        let opaque = b.add_material(Material::new("opaque", [ProgramId(3), ProgramId(4)]));
        b.add_material(Material::new("glass", [ProgramId(5), ProgramId(6)]).with_flags(MaterialFlags::ALPHA_BLEND));
        let (positions, indices) = Mesh::box_geometry(&unit_bounds());
        b.add_mesh(
            Mesh::new("cube", 0, 0)
                .with_group(0, 36, opaque)
                .with_geometry(positions, indices),
        );
        b
    }

    pub(crate) fn cube_at(b: &mut SceneBuilder, pos: Vec3) -> ObjectId {
        let tr = Transform::from_translation(pos, unit_bounds());
        b.add_object(ObjectDesc::new(tr).with_drawable(Drawable::new(scenecull_scene::MeshId(0))))
            .unwrap()
    }

    struct Harness {
        config: FrontendConfig,
        list: DrawList,
        scratch: GatherScratch,
    }

    impl Harness {
        fn new() -> Self {
            let config = FrontendConfig::default();
            let list = DrawList::new(&config);
            Self {
                config,
                list,
                scratch: GatherScratch::default(),
            }
        }

        fn gather<'a>(&'a mut self, scene: &'a SceneData) -> Gather<'a> {
            self.scratch.begin_frame(scene.object_count());
            Gather {
                scene,
                config: &self.config,
                flags: self.config.flags,
                list: &mut self.list,
                scratch: &mut self.scratch,
                stamp: 1,
            }
        }
    }

    #[test]
    fn visible_cube_emits_instance_and_batch() {
        let mut b = builder();
        cube_at(&mut b, Vec3::new(0.0, 0.0, -10.0));
        cube_at(&mut b, Vec3::new(0.0, 0.0, 10.0));
        let scene = b.build();

        let mut h = Harness::new();
        let stats = h.gather(&scene).main_pass(&camera(), None);
        assert_eq!(stats.objects_visible, 1);
        assert_eq!(h.list.instances.len(), 1);
        assert_eq!(h.list.main_batches.len(), 1);

        let key = MainSortKey::unpack(h.list.main_batches[0].sort_key);
        assert_eq!(key.program, 3);
        assert_eq!(key.material, 0);
        let expected = (255.0 * Vec3::new(-0.5, -0.5, -10.5).length() / 100.0) as u8;
        assert_eq!(key.cam_dist, expected);
    }

    #[test]
    fn instance_is_shared_between_passes() {
        let mut b = builder();
        let id = cube_at(&mut b, Vec3::new(0.0, 0.0, -10.0));
        let scene = b.build();
        let tr = *scene.transform_of(id).unwrap();

        let mut h = Harness::new();
        let mut g = h.gather(&scene);
        g.main_pass(&camera(), None);
        g.push_shadow_batches(id, &tr);
        g.push_shadow_batches(id, &tr);
        assert_eq!(h.list.instances.len(), 1);
        assert_eq!(h.list.shadow_batches.len(), 2);
        assert_eq!(h.list.shadow_batches[1].instance_indices.as_slice(), &[0]);
    }

    #[test]
    fn blended_groups_cast_no_shadow() {
        let mut b = builder();
        let mesh = b.add_mesh(Mesh::new("window", 36, 8).with_group(0, 6, MaterialId(1)));
        let tr = Transform::from_translation(Vec3::new(0.0, 0.0, -5.0), unit_bounds());
        let id = b.add_object(ObjectDesc::new(tr).with_drawable(Drawable::new(mesh))).unwrap();
        let scene = b.build();

        let mut h = Harness::new();
        let mut g = h.gather(&scene);
        g.main_pass(&camera(), None);
        g.push_shadow_batches(id, &tr);
        assert!(h.list.shadow_batches.is_empty());
        let key = MainSortKey::unpack(h.list.main_batches[0].sort_key);
        assert!(key.alpha_blend);
        assert_eq!(key.indices_offset, 36);
        assert_eq!(h.list.main_batches[0].base_vertex, 8);
    }

    #[test]
    fn lights_decals_and_probes_are_collected() {
        let mut b = builder();
        let at = |z: f32| Transform::from_translation(Vec3::new(0.0, 0.0, z), unit_bounds());
        let lit = b
            .add_object(ObjectDesc::new(at(-4.0)).with_light(LightSource::point(Vec3::ONE, 0.1, 3.0)))
            .unwrap();
        b.add_object(ObjectDesc::new(at(-6.0)).with_decal(Decal::boxed(Vec3::ONE))).unwrap();
        b.add_object(ObjectDesc::new(at(-8.0)).with_probe(Probe::new(4.0, 2))).unwrap();
        // Behind the camera.
        b.add_object(ObjectDesc::new(at(40.0)).with_light(LightSource::point(Vec3::ONE, 0.1, 3.0)))
            .unwrap();
        let scene = b.build();

        let mut h = Harness::new();
        h.gather(&scene).main_pass(&camera(), None);
        assert_eq!(h.list.lights.len(), 1);
        assert_eq!(h.list.lights[0].pos, [0.0, 0.0, -4.0]);
        assert_eq!(h.list.lights[0].shadowreg_index, -1);
        assert_eq!(h.scratch.light_owners, vec![lit]);
        assert_eq!(h.list.decals.len(), 1);
        assert_eq!(h.scratch.decal_volumes.len(), 1);
        assert_eq!(h.list.probes.len(), 1);
        assert_eq!(h.list.probes[0].layer, 2);
    }

    #[test]
    fn disabled_features_are_skipped() {
        let mut b = builder();
        let tr = Transform::from_translation(Vec3::new(0.0, 0.0, -4.0), unit_bounds());
        b.add_object(ObjectDesc::new(tr).with_light(LightSource::point(Vec3::ONE, 0.1, 3.0)))
            .unwrap();
        cube_at(&mut b, Vec3::new(0.0, 0.0, -10.0));
        let scene = b.build();

        let mut h = Harness::new();
        h.config.flags.remove(RenderFlags::LIGHTS | RenderFlags::LIGHTMAP);
        h.gather(&scene).main_pass(&camera(), None);
        assert!(h.list.lights.is_empty());
        let key = MainSortKey::unpack(h.list.main_batches[0].sort_key);
        assert_eq!(key.program, 4);
    }

    #[test]
    fn wall_occludes_cube_behind_it() {
        let mut b = builder();
        let wall_bounds = Aabb::new(Vec3::new(-30.0, -30.0, -0.5), Vec3::new(30.0, 30.0, 0.5));
        let (positions, indices) = Mesh::box_geometry(&wall_bounds);
        let wall_mesh = b.add_mesh(Mesh::new("wall", 0, 0).with_geometry(positions, indices));
        let wall = Transform::from_translation(Vec3::new(0.0, 0.0, -10.0), wall_bounds);
        b.add_object(ObjectDesc::new(wall).with_occluder(Occluder { mesh: wall_mesh }))
            .unwrap();
        let hidden = cube_at(&mut b, Vec3::new(0.0, 0.0, -30.0));
        let scene = b.build();

        let cam = camera();
        let mut buffer = OcclusionBuffer::new(64, 64);
        let mut h = Harness::new();
        let mut g = h.gather(&scene);
        assert_eq!(g.occluder_pass(&cam, &mut buffer), 12);
        let stats = g.main_pass(&cam, Some(&buffer));
        assert!(stats.occluded > 0);
        assert!(h.list.instances.is_empty());

        // Without culling the same cube is drawn.
        let mut h = Harness::new();
        h.gather(&scene).main_pass(&cam, None);
        assert_eq!(h.list.instances.len(), 1);
        assert!(scene.object(hidden).is_some());
    }

    #[test]
    fn skinned_mesh_draws_from_output_range() {
        let mut b = builder();
        let rig = b.add_mesh(
            Mesh::new("rig", 100, 50)
                .with_group(0, 30, MaterialId(0))
                .with_skin(SkinRange {
                    vertex_offset: 1000,
                    vertex_count: 600,
                    bone_count: 3,
                }),
        );
        let tr = Transform::from_translation(Vec3::new(0.0, 0.0, -5.0), unit_bounds());
        b.add_object(
            ObjectDesc::new(tr)
                .with_drawable(Drawable::new(rig))
                .with_anim_state(AnimState {
                    palette: vec![Mat4::IDENTITY; 3],
                }),
        )
        .unwrap();
        let scene = b.build();

        let mut h = Harness::new();
        h.config.skinning.output_base_vertex = 4096;
        h.gather(&scene).main_pass(&camera(), None);
        assert_eq!(h.list.skin_transforms.len(), 3);
        let regions: Vec<_> = h.list.skin_regions.iter().map(|r| (r.in_vtx_offset, r.out_vtx_offset, r.vertex_count)).collect();
        assert_eq!(regions, vec![(1000, 4096, 256), (1256, 4352, 256), (1512, 4608, 88)]);
        assert_eq!(h.list.skin_vertices_count, 600);
        assert_eq!(h.list.main_batches[0].base_vertex, 4096);
    }
}
