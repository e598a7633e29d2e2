use bitflags::bitflags;
use glam::Vec3;
use scenecull_common::Aabb;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeshId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// Shader program handle. Only the low 8 bits take part in batch sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ProgramId(pub u32);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        const ALPHA_TEST = 1 << 0;
        const ALPHA_BLEND = 1 << 1;
    }
}

/// Range of triangles in a mesh drawn with one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriGroup {
    /// Offset relative to the mesh's own `index_offset`.
    pub index_offset: u32,
    pub index_count: u32,
    pub material: MaterialId,
}

/// Skinned vertex range of a mesh in the shared skinning input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinRange {
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub bone_count: u32,
}

/// Mesh as seen by the frontend: offsets into shared GPU buffers plus
/// optional CPU geometry for occlusion rasterization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub index_offset: u32,
    pub base_vertex: u32,
    pub groups: Vec<TriGroup>,
    pub skin: Option<SkinRange>,
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(name: impl Into<String>, index_offset: u32, base_vertex: u32) -> Self {
        Self {
            name: name.into(),
            index_offset,
            base_vertex,
            ..Default::default()
        }
    }

    pub fn with_group(mut self, index_offset: u32, index_count: u32, material: MaterialId) -> Self {
        self.groups.push(TriGroup {
            index_offset,
            index_count,
            material,
        });
        self
    }

    pub fn with_geometry(mut self, positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        self.positions = positions;
        self.indices = indices;
        self
    }

    pub fn with_skin(mut self, skin: SkinRange) -> Self {
        self.skin = Some(skin);
        self
    }

    /// Closed box mesh over `bbox`, usable as occluder geometry.
    pub fn box_geometry(bbox: &Aabb) -> (Vec<Vec3>, Vec<u32>) {
        let positions = bbox.corners().to_vec();
        // Corner order: bit 0 = x, bit 1 = z, bit 2 = y.
        let indices = vec![
            0, 1, 3, 0, 3, 2, // bottom
            4, 6, 7, 4, 7, 5, // top
            0, 4, 5, 0, 5, 1, // -z
            2, 3, 7, 2, 7, 6, // +z
            0, 2, 6, 0, 6, 4, // -x
            1, 5, 7, 1, 7, 3, // +x
        ];
        (positions, indices)
    }

    pub fn has_geometry(&self) -> bool {
        !self.positions.is_empty() && self.indices.len() >= 3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// `[lightmapped, plain]` program variants.
    pub programs: [ProgramId; 2],
    pub flags: MaterialFlags,
}

impl Material {
    pub fn new(name: impl Into<String>, programs: [ProgramId; 2]) -> Self {
        Self {
            name: name.into(),
            programs,
            flags: MaterialFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: MaterialFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_alpha_blend(&self) -> bool {
        self.flags.contains(MaterialFlags::ALPHA_BLEND)
    }

    pub fn is_alpha_test(&self) -> bool {
        self.flags.contains(MaterialFlags::ALPHA_TEST)
    }
}

/// Meshes and materials referenced by scene objects, addressed by dense ids.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId((self.meshes.len() - 1) as u32)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId((self.materials.len() - 1) as u32)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0 as usize)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }
}
