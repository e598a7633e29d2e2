use glam::Vec3;
use scenecull_bvh::Bvh;
use scenecull_common::ObjectId;

use crate::assets::{AssetRegistry, MaterialId, MeshId};
use crate::components::{
    AnimState, ComponentMask, Decal, Drawable, LightSource, Occluder, Probe, Transform,
};

/// Errors raised while adding objects or editing the scene.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("object {0} not found")]
    UnknownObject(ObjectId),
    #[error("object {0}: components other than Transform require a Transform")]
    MissingTransform(ObjectId),
    #[error("object {object}: mesh {mesh:?} not found")]
    MissingMesh { object: ObjectId, mesh: MeshId },
    #[error("mesh {mesh:?}: material {material:?} not found")]
    MissingMaterial { mesh: MeshId, material: MaterialId },
    #[error("object {0}: occluder mesh has no CPU geometry")]
    EmptyOccluder(ObjectId),
    #[error("object {object}: mesh {mesh:?} has no skin range")]
    NotSkinned { object: ObjectId, mesh: MeshId },
    #[error("object {object}: palette has {palette} bones, mesh needs {needed}")]
    PaletteTooShort {
        object: ObjectId,
        palette: usize,
        needed: u32,
    },
}

/// Dense array of one component kind, addressed by the index stored in
/// [`ComponentRefs`]. Released slots are reused by later pushes.
#[derive(Debug, Clone)]
pub struct ComponentStore<T> {
    items: Vec<T>,
    free: Vec<u32>,
}

impl<T> Default for ComponentStore<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> ComponentStore<T> {
    pub fn push(&mut self, item: T) -> u32 {
        if let Some(index) = self.free.pop() {
            self.items[index as usize] = item;
            return index;
        }
        self.items.push(item);
        (self.items.len() - 1) as u32
    }

    /// Mark a slot free. Its old value stays readable until reused.
    pub fn release(&mut self, index: u32) {
        if (index as usize) < self.items.len() && !self.free.contains(&index) {
            self.free.push(index);
        }
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.items.get(index as usize)
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.items.get_mut(index as usize)
    }

    /// Live components.
    pub fn len(&self) -> usize {
        self.items.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated slots, live or released.
    pub fn slot_count(&self) -> usize {
        self.items.len()
    }

    /// Every slot, released ones included.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// Type-erased slot release, so removal can walk every store at once.
trait Release {
    fn release(&mut self, index: u32);
}

impl<T> Release for ComponentStore<T> {
    fn release(&mut self, index: u32) {
        ComponentStore::release(self, index);
    }
}

/// Per-kind component indices of an object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentRefs {
    pub transform: Option<u32>,
    pub drawable: Option<u32>,
    pub occluder: Option<u32>,
    pub light: Option<u32>,
    pub decal: Option<u32>,
    pub probe: Option<u32>,
    pub anim_state: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneObject {
    /// Which components are attached.
    pub mask: ComponentMask,
    pub components: ComponentRefs,
    /// BVH leaf indexing this object; `None` while unindexed.
    pub leaf: Option<u32>,
    /// Components modified since the last `update_objects`.
    pub change_mask: ComponentMask,
    /// Components that changed in the most recent `update_objects`.
    pub last_change_mask: ComponentMask,
}

impl SceneObject {
    pub fn has(&self, mask: ComponentMask) -> bool {
        self.mask.contains(mask)
    }
}

/// Scene-wide lighting environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    /// Unit vector pointing towards the sun. Zero disables the sun.
    pub sun_dir: Vec3,
    pub sun_color: Vec3,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            sun_dir: Vec3::new(0.3, 1.0, 0.2).normalize(),
            sun_color: Vec3::ONE,
        }
    }
}

impl Environment {
    /// True if the sun should cast shadows.
    pub fn has_sun(&self) -> bool {
        self.sun_dir.length_squared() > 0.9 && self.sun_color.length_squared() > f32::EPSILON
    }
}

/// Components of an object to be added.
#[derive(Debug, Clone, Default)]
pub struct ObjectDesc {
    pub transform: Option<Transform>,
    pub drawable: Option<Drawable>,
    pub occluder: Option<Occluder>,
    pub light: Option<LightSource>,
    pub decal: Option<Decal>,
    pub probe: Option<Probe>,
    pub anim_state: Option<AnimState>,
}

impl ObjectDesc {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform: Some(transform),
            ..Default::default()
        }
    }

    pub fn with_drawable(mut self, drawable: Drawable) -> Self {
        self.drawable = Some(drawable);
        self
    }

    pub fn with_occluder(mut self, occluder: Occluder) -> Self {
        self.occluder = Some(occluder);
        self
    }

    pub fn with_light(mut self, light: LightSource) -> Self {
        self.light = Some(light);
        self
    }

    pub fn with_decal(mut self, decal: Decal) -> Self {
        self.decal = Some(decal);
        self
    }

    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_anim_state(mut self, anim_state: AnimState) -> Self {
        self.anim_state = Some(anim_state);
        self
    }
}

/// Everything the frontend reads: objects, their components, assets and the
/// spatial index.
#[derive(Debug, Clone, Default)]
pub struct SceneData {
    pub objects: Vec<SceneObject>,
    pub transforms: ComponentStore<Transform>,
    pub drawables: ComponentStore<Drawable>,
    pub occluders: ComponentStore<Occluder>,
    pub lights: ComponentStore<LightSource>,
    pub decals: ComponentStore<Decal>,
    pub probes: ComponentStore<Probe>,
    pub anim_states: ComponentStore<AnimState>,
    pub assets: AssetRegistry,
    pub bvh: Bvh,
    pub env: Environment,
    /// Incremented once per `update_objects`; drives shadow cache aging.
    pub update_counter: u64,
    /// Objects that changed in the most recent update. Their
    /// `last_change_mask` tells which components.
    pub recently_changed: Vec<ObjectId>,
    /// Removed object slots, reused by `insert_object`.
    pub free_objects: Vec<ObjectId>,
}

impl SceneData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id.index())
    }

    /// Object slots, removed ones included. Every id is below this.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn live_object_count(&self) -> usize {
        self.objects.len() - self.free_objects.len()
    }

    pub fn is_removed(&self, id: ObjectId) -> bool {
        self.free_objects.contains(&id)
    }

    /// Detach an object from the index, release its components and free its
    /// id for reuse.
    pub fn remove_object(&mut self, id: ObjectId) -> Result<(), SceneError> {
        if self.is_removed(id) {
            return Err(SceneError::UnknownObject(id));
        }
        let obj = self
            .objects
            .get_mut(id.index())
            .ok_or(SceneError::UnknownObject(id))?;
        if let Some(leaf) = obj.leaf.take() {
            self.bvh.remove(leaf);
        }
        let refs = std::mem::take(&mut obj.components);
        *obj = SceneObject::default();

        let slots: [(Option<u32>, &mut dyn Release); 7] = [
            (refs.transform, &mut self.transforms),
            (refs.drawable, &mut self.drawables),
            (refs.occluder, &mut self.occluders),
            (refs.light, &mut self.lights),
            (refs.decal, &mut self.decals),
            (refs.probe, &mut self.probes),
            (refs.anim_state, &mut self.anim_states),
        ];
        for (index, store) in slots {
            if let Some(i) = index {
                store.release(i);
            }
        }

        self.recently_changed.retain(|&r| r != id);
        self.free_objects.push(id);
        Ok(())
    }

    pub fn transform_of(&self, id: ObjectId) -> Option<&Transform> {
        self.object(id)?
            .components
            .transform
            .and_then(|i| self.transforms.get(i))
    }

    pub fn drawable_of(&self, id: ObjectId) -> Option<&Drawable> {
        self.object(id)?
            .components
            .drawable
            .and_then(|i| self.drawables.get(i))
    }

    pub fn occluder_of(&self, id: ObjectId) -> Option<&Occluder> {
        self.object(id)?
            .components
            .occluder
            .and_then(|i| self.occluders.get(i))
    }

    pub fn light_of(&self, id: ObjectId) -> Option<&LightSource> {
        self.object(id)?
            .components
            .light
            .and_then(|i| self.lights.get(i))
    }

    pub fn decal_of(&self, id: ObjectId) -> Option<&Decal> {
        self.object(id)?
            .components
            .decal
            .and_then(|i| self.decals.get(i))
    }

    pub fn probe_of(&self, id: ObjectId) -> Option<&Probe> {
        self.object(id)?
            .components
            .probe
            .and_then(|i| self.probes.get(i))
    }

    pub fn anim_state_of(&self, id: ObjectId) -> Option<&AnimState> {
        self.object(id)?
            .components
            .anim_state
            .and_then(|i| self.anim_states.get(i))
    }

    /// Validate and add an object, reusing the most recently removed id if
    /// there is one. It is left unindexed and flagged as
    /// changed, so the next `update_objects` inserts it into the BVH.
    pub fn insert_object(&mut self, desc: ObjectDesc) -> Result<ObjectId, SceneError> {
        let id = self
            .free_objects
            .last()
            .copied()
            .unwrap_or(ObjectId(self.objects.len() as u32));
        self.validate(id, &desc)?;

        let mut obj = SceneObject::default();
        if let Some(tr) = desc.transform {
            obj.components.transform = Some(self.transforms.push(tr));
            obj.mask |= ComponentMask::TRANSFORM;
            obj.change_mask |= ComponentMask::TRANSFORM;
        }
        if let Some(d) = desc.drawable {
            obj.components.drawable = Some(self.drawables.push(d));
            obj.mask |= ComponentMask::DRAWABLE;
        }
        if let Some(o) = desc.occluder {
            obj.components.occluder = Some(self.occluders.push(o));
            obj.mask |= ComponentMask::OCCLUDER;
        }
        if let Some(l) = desc.light {
            obj.components.light = Some(self.lights.push(l));
            obj.mask |= ComponentMask::LIGHT_SOURCE;
        }
        if let Some(d) = desc.decal {
            obj.components.decal = Some(self.decals.push(d));
            obj.mask |= ComponentMask::DECAL;
        }
        if let Some(p) = desc.probe {
            obj.components.probe = Some(self.probes.push(p));
            obj.mask |= ComponentMask::PROBE;
        }
        if let Some(a) = desc.anim_state {
            obj.components.anim_state = Some(self.anim_states.push(a));
            obj.mask |= ComponentMask::ANIM_STATE;
        }

        if self.free_objects.last() == Some(&id)
            && let Some(slot) = self.objects.get_mut(id.index())
        {
            *slot = obj;
            self.free_objects.pop();
        } else {
            self.objects.push(obj);
        }
        tracing::trace!(%id, "object added");
        Ok(id)
    }

    fn validate(&self, id: ObjectId, desc: &ObjectDesc) -> Result<(), SceneError> {
        let has_other = desc.drawable.is_some()
            || desc.occluder.is_some()
            || desc.light.is_some()
            || desc.decal.is_some()
            || desc.probe.is_some()
            || desc.anim_state.is_some();
        if has_other && desc.transform.is_none() {
            return Err(SceneError::MissingTransform(id));
        }

        if let Some(d) = &desc.drawable {
            let mesh = self
                .assets
                .mesh(d.mesh)
                .ok_or(SceneError::MissingMesh { object: id, mesh: d.mesh })?;
            for group in &mesh.groups {
                if self.assets.material(group.material).is_none() {
                    return Err(SceneError::MissingMaterial {
                        mesh: d.mesh,
                        material: group.material,
                    });
                }
            }
            if let Some(anim) = &desc.anim_state {
                let skin = mesh.skin.ok_or(SceneError::NotSkinned {
                    object: id,
                    mesh: d.mesh,
                })?;
                if anim.palette.len() < skin.bone_count as usize {
                    return Err(SceneError::PaletteTooShort {
                        object: id,
                        palette: anim.palette.len(),
                        needed: skin.bone_count,
                    });
                }
            }
        }

        if let Some(o) = &desc.occluder {
            let mesh = self
                .assets
                .mesh(o.mesh)
                .ok_or(SceneError::MissingMesh { object: id, mesh: o.mesh })?;
            if !mesh.has_geometry() {
                return Err(SceneError::EmptyOccluder(id));
            }
        }
        Ok(())
    }
}
