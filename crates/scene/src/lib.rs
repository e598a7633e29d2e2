//! Scene data: objects as bitmasks over typed component stores, the mesh and
//! material registry, and the scene manager that keeps the spatial index in
//! step with moving objects.
//!
//! # Invariants
//! - Every component other than `Transform` is only attached next to a `Transform`.
//! - Every mesh and material an object references exists; checked when the object is added.
//! - An object with a `Transform` is either indexed by exactly one BVH leaf or
//!   flagged changed and waiting for the next `update_objects`.

mod assets;
mod builder;
mod components;
mod manager;
mod scene;

pub use assets::{
    AssetRegistry, Material, MaterialFlags, MaterialId, Mesh, MeshId, ProgramId, SkinRange,
    TriGroup,
};
pub use builder::SceneBuilder;
pub use components::{
    AnimState, ComponentMask, Decal, Drawable, DrawableFlags, LightSource, Occluder, Probe,
    Transform,
};
pub use manager::{SceneManager, UpdateStats};
pub use scene::{ComponentRefs, ComponentStore, Environment, ObjectDesc, SceneData, SceneError, SceneObject};

pub fn crate_info() -> &'static str {
    "scenecull-scene v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("scene"));
    }
}
