use glam::{Mat4, Quat, Vec3};
use scenecull_common::{Aabb, Camera, ObjectId};
use scenecull_scene::{
    AnimState, Decal, Drawable, Environment, LightSource, Material, MaterialFlags, Mesh, MeshId, ObjectDesc,
    Occluder, Probe, ProgramId, SceneBuilder, SceneData, SceneError, SceneManager, SkinRange, Transform, UpdateStats,
};

/// Deterministic generator; one splitmix64 step per draw.
#[derive(Debug, Clone)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    pub fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    pub fn chance(&mut self, p: f32) -> bool {
        self.next_f32() < p
    }
}

/// Shape of a generated city-block scene.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoSceneParams {
    pub seed: u64,
    /// Props per side of the square grid.
    pub grid: u32,
    pub spacing: f32,
    pub lights: u32,
    /// Fraction of lights that are shadow-casting spots.
    pub shadow_fraction: f32,
    pub decals: u32,
    pub probes: u32,
    /// Occluding walls between grid rows.
    pub walls: u32,
    pub skinned: u32,
    /// Fraction of props that move in [`animate`].
    pub moving_fraction: f32,
    pub sun: bool,
}

impl Default for DemoSceneParams {
    fn default() -> Self {
        Self {
            seed: 42,
            grid: 24,
            spacing: 4.0,
            lights: 32,
            shadow_fraction: 0.25,
            decals: 16,
            probes: 8,
            walls: 4,
            skinned: 4,
            moving_fraction: 0.05,
            sun: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DemoScene {
    pub scene: SceneData,
    /// Objects moved by [`animate`], with their rest positions.
    pub movers: Vec<(ObjectId, Vec3)>,
    /// Camera at the edge of the grid looking across it.
    pub camera: Camera,
}

const RIG_BONES: u32 = 4;

struct Assets {
    crate_mesh: MeshId,
    bush_mesh: MeshId,
    glass_mesh: MeshId,
    wall_mesh: MeshId,
    rig_mesh: MeshId,
}

fn unit_box() -> Aabb {
    Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5))
}

fn register_assets(b: &mut SceneBuilder) -> Assets {
    let stone = b.add_material(Material::new("stone", [ProgramId(0), ProgramId(1)]));
    let metal = b.add_material(Material::new("metal", [ProgramId(2), ProgramId(3)]));
    let leaves = b.add_material(
        Material::new("leaves", [ProgramId(4), ProgramId(5)]).with_flags(MaterialFlags::ALPHA_TEST),
    );
    let glass = b.add_material(
        Material::new("glass", [ProgramId(6), ProgramId(7)]).with_flags(MaterialFlags::ALPHA_BLEND),
    );

    let (positions, indices) = Mesh::box_geometry(&unit_box());
    let crate_mesh = b.add_mesh(
        Mesh::new("crate", 0, 0)
            .with_group(0, 24, stone)
            .with_group(24, 12, metal),
    );
    let bush_mesh = b.add_mesh(Mesh::new("bush", 36, 24).with_group(0, 36, leaves));
    let glass_mesh = b.add_mesh(Mesh::new("glass_box", 72, 48).with_group(0, 36, glass));
    let wall_mesh = b.add_mesh(
        Mesh::new("wall", 108, 72)
            .with_group(0, 36, stone)
            .with_geometry(positions, indices),
    );
    let rig_mesh = b.add_mesh(
        Mesh::new("walker", 144, 96)
            .with_group(0, 36, metal)
            .with_skin(SkinRange {
                vertex_offset: 96,
                vertex_count: 300,
                bone_count: RIG_BONES,
            }),
    );
    Assets {
        crate_mesh,
        bush_mesh,
        glass_mesh,
        wall_mesh,
        rig_mesh,
    }
}

/// Build a deterministic scene for `params`.
pub fn generate(params: &DemoSceneParams) -> Result<DemoScene, SceneError> {
    let _span = tracing::info_span!("generate_scene", seed = params.seed, grid = params.grid).entered();
    let mut rng = SplitMix64::new(params.seed);
    let mut b = SceneBuilder::new();
    let assets = register_assets(&mut b);
    if !params.sun {
        b.set_environment(Environment {
            sun_dir: Vec3::ZERO,
            ..Default::default()
        });
    }

    let side = params.grid as f32 * params.spacing;
    let mut movers = Vec::new();
    for gz in 0..params.grid {
        for gx in 0..params.grid {
            let pos = Vec3::new(
                gx as f32 * params.spacing + rng.range(-0.5, 0.5),
                0.5,
                -(gz as f32) * params.spacing + rng.range(-0.5, 0.5),
            );
            let mesh = match rng.next_u64() % 10 {
                0 => assets.bush_mesh,
                1 => assets.glass_mesh,
                _ => assets.crate_mesh,
            };
            let rotation = Quat::from_rotation_y(rng.range(0.0, std::f32::consts::TAU));
            let scale = Vec3::splat(rng.range(0.6, 1.6));
            let world = Mat4::from_scale_rotation_translation(scale, rotation, pos);
            let tr = Transform::new(world, unit_box());
            let id = b.add_object(ObjectDesc::new(tr).with_drawable(Drawable::new(mesh)))?;
            if rng.chance(params.moving_fraction) {
                movers.push((id, pos));
            }
        }
    }

    for w in 0..params.walls {
        let z = -((w + 1) as f32) * side / (params.walls + 1) as f32;
        let world = Mat4::from_translation(Vec3::new(0.5 * side, 2.0, z)) * Mat4::from_scale(Vec3::new(0.4 * side, 4.0, 0.5));
        let tr = Transform::new(world, unit_box());
        b.add_object(
            ObjectDesc::new(tr)
                .with_drawable(Drawable::new(assets.wall_mesh))
                .with_occluder(Occluder { mesh: assets.wall_mesh }),
        )?;
    }

    let random_point = |rng: &mut SplitMix64, y: f32| Vec3::new(rng.range(0.0, side), y, -rng.range(0.0, side));

    for _ in 0..params.lights {
        let height = rng.range(2.0, 5.0);
        let pos = random_point(&mut rng, height);
        let color = Vec3::new(rng.range(0.5, 1.0), rng.range(0.5, 1.0), rng.range(0.5, 1.0));
        let light = if rng.chance(params.shadow_fraction) {
            LightSource::spot(color, 0.2, rng.range(8.0, 16.0), Vec3::NEG_Y, rng.range(25.0, 60.0)).with_shadow()
        } else {
            LightSource::point(color, 0.2, rng.range(3.0, 8.0))
        };
        let tr = Transform::from_translation(pos, Aabb::new(Vec3::splat(-0.2), Vec3::splat(0.2)));
        b.add_object(ObjectDesc::new(tr).with_light(light))?;
    }

    for _ in 0..params.decals {
        let pos = random_point(&mut rng, 0.0);
        let extent = Vec3::new(rng.range(0.5, 2.0), rng.range(0.5, 2.0), 0.5);
        let world = Mat4::from_translation(pos) * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let tr = Transform::new(world, Aabb::new(-extent, extent));
        b.add_object(ObjectDesc::new(tr).with_decal(Decal::boxed(extent)))?;
    }

    for layer in 0..params.probes {
        let pos = random_point(&mut rng, 2.0);
        let radius = rng.range(6.0, 12.0);
        let tr = Transform::from_translation(pos, Aabb::new(Vec3::splat(-radius), Vec3::splat(radius)));
        b.add_object(ObjectDesc::new(tr).with_probe(Probe::new(radius, layer)))?;
    }

    for _ in 0..params.skinned {
        let pos = random_point(&mut rng, 0.5);
        let palette = (0..RIG_BONES)
            .map(|i| Mat4::from_rotation_z(0.1 * i as f32))
            .collect();
        let tr = Transform::from_translation(pos, unit_box());
        let id = b.add_object(
            ObjectDesc::new(tr)
                .with_drawable(Drawable::new(assets.rig_mesh))
                .with_anim_state(AnimState { palette }),
        )?;
        movers.push((id, pos));
    }

    let eye = Vec3::new(0.5 * side, 6.0, 10.0);
    let camera = Camera::perspective(eye, Vec3::new(0.5 * side, 0.0, -0.5 * side), Vec3::Y, 70.0, 16.0 / 9.0, 0.1, 500.0);
    let scene = b.build();
    tracing::info!(objects = scene.object_count(), movers = movers.len(), "demo scene generated");
    Ok(DemoScene { scene, movers, camera })
}

/// Move every mover along a small circle around its rest position at time
/// `t` and refit the index.
pub fn animate(manager: &mut SceneManager, movers: &[(ObjectId, Vec3)], t: f32) -> Result<UpdateStats, SceneError> {
    let mut changed = Vec::with_capacity(movers.len());
    for (i, &(id, rest)) in movers.iter().enumerate() {
        let phase = t + i as f32 * 0.7;
        let offset = Vec3::new(phase.cos(), 0.0, phase.sin()) * 1.5;
        manager.set_transform(id, Mat4::from_translation(rest + offset))?;
        changed.push(id);
    }
    Ok(manager.update_objects(&changed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> DemoSceneParams {
        DemoSceneParams {
            grid: 6,
            lights: 5,
            decals: 3,
            probes: 2,
            walls: 1,
            skinned: 2,
            ..Default::default()
        }
    }

    #[test]
    fn splitmix_is_deterministic() {
        let mut a = SplitMix64::new(7);
        let mut b = SplitMix64::new(7);
        let xs: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
        assert_eq!(xs, ys);
        assert!((0..1000).map(|_| a.next_f32()).all(|f| (0.0..1.0).contains(&f)));
    }

    #[test]
    fn generated_scene_has_every_kind() {
        let demo = generate(&small()).unwrap();
        let scene = &demo.scene;
        assert_eq!(scene.object_count(), 36 + 1 + 5 + 3 + 2 + 2);
        assert_eq!(scene.lights.len(), 5);
        assert_eq!(scene.decals.len(), 3);
        assert_eq!(scene.probes.len(), 2);
        assert_eq!(scene.occluders.len(), 1);
        assert_eq!(scene.anim_states.len(), 2);
        assert_eq!(scene.bvh.leaf_count(), scene.object_count());
        scene.bvh.validate().unwrap();
    }

    #[test]
    fn same_seed_same_scene() {
        let a = generate(&small()).unwrap();
        let b = generate(&small()).unwrap();
        let boxes = |d: &DemoScene| d.scene.transforms.iter().map(|t| t.world_bbox).collect::<Vec<_>>();
        assert_eq!(boxes(&a), boxes(&b));
        assert_eq!(a.movers, b.movers);
    }

    #[test]
    fn animation_keeps_tree_valid() {
        let demo = generate(&small()).unwrap();
        let mut manager = SceneManager::new(demo.scene);
        for step in 0..10 {
            animate(&mut manager, &demo.movers, step as f32 * 0.3).unwrap();
            manager.scene().bvh.validate().unwrap();
        }
        assert_eq!(manager.scene().recently_changed.len(), demo.movers.len());
    }
}
