use scenecull_common::{Aabb, ObjectId};

use crate::assets::{Material, MaterialId, Mesh, MeshId};
use crate::components::ComponentMask;
use crate::scene::{Environment, ObjectDesc, SceneData, SceneError};

/// Assembles a scene and bulk-builds its spatial index in one pass.
#[derive(Debug, Default)]
pub struct SceneBuilder {
    scene: SceneData,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.scene.assets.add_material(material)
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.scene.assets.add_mesh(mesh)
    }

    pub fn set_environment(&mut self, env: Environment) -> &mut Self {
        self.scene.env = env;
        self
    }

    pub fn add_object(&mut self, desc: ObjectDesc) -> Result<ObjectId, SceneError> {
        self.scene.insert_object(desc)
    }

    pub fn object_count(&self) -> usize {
        self.scene.object_count()
    }

    /// Build the BVH over every object with a transform and hand the scene over.
    pub fn build(mut self) -> SceneData {
        let _span = tracing::info_span!("scene_build").entered();
        let scene = &mut self.scene;

        let prims: Vec<(ObjectId, Aabb)> = scene
            .objects
            .iter()
            .enumerate()
            .filter_map(|(i, obj)| {
                let tr = scene.transforms.get(obj.components.transform?)?;
                Some((ObjectId(i as u32), tr.world_bbox))
            })
            .collect();

        let leaves = scene.bvh.build(&prims);
        for ((id, _), leaf) in prims.iter().zip(leaves) {
            let obj = &mut scene.objects[id.index()];
            obj.leaf = Some(leaf);
            obj.change_mask.remove(ComponentMask::TRANSFORM);
        }

        tracing::info!(
            objects = scene.objects.len(),
            indexed = prims.len(),
            meshes = scene.assets.mesh_count(),
            materials = scene.assets.material_count(),
            "scene built"
        );
        self.scene
    }
}
