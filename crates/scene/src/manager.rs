use std::time::{Duration, Instant};

use glam::Mat4;
use scenecull_common::ObjectId;

use crate::components::ComponentMask;
use crate::scene::{ObjectDesc, SceneData, SceneError};

/// Counters from one `update_objects` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateStats {
    /// Moved objects still inside their enlarged leaf box.
    pub refit_skipped: usize,
    /// Moved objects removed and reinserted.
    pub reinserted: usize,
    /// Objects indexed for the first time.
    pub inserted: usize,
    pub frame_time: Duration,
}

/// Owns the scene and keeps the BVH consistent with object edits.
#[derive(Debug, Default)]
pub struct SceneManager {
    scene: SceneData,
}

impl SceneManager {
    pub fn new(scene: SceneData) -> Self {
        Self { scene }
    }

    pub fn scene(&self) -> &SceneData {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneData {
        &mut self.scene
    }

    pub fn into_scene(self) -> SceneData {
        self.scene
    }

    /// Move an object. Takes effect in the BVH at the next `update_objects`.
    pub fn set_transform(&mut self, id: ObjectId, world_from_object: Mat4) -> Result<(), SceneError> {
        let tr_index = self
            .scene
            .object(id)
            .and_then(|o| o.components.transform)
            .ok_or(SceneError::UnknownObject(id))?;
        if let Some(tr) = self.scene.transforms.get_mut(tr_index) {
            tr.set_matrix(world_from_object);
        }
        self.mark_changed(id, ComponentMask::TRANSFORM)
    }

    pub fn mark_changed(&mut self, id: ObjectId, mask: ComponentMask) -> Result<(), SceneError> {
        let obj = self
            .scene
            .objects
            .get_mut(id.index())
            .ok_or(SceneError::UnknownObject(id))?;
        obj.change_mask |= mask;
        Ok(())
    }

    /// Add an object at runtime. It is indexed by the next `update_objects`
    /// that lists it.
    pub fn add_object(&mut self, desc: ObjectDesc) -> Result<ObjectId, SceneError> {
        self.scene.insert_object(desc)
    }

    /// Detach an object from the index and free its id and components. The
    /// next `add_object` reuses the id.
    pub fn remove_object(&mut self, id: ObjectId) -> Result<(), SceneError> {
        self.scene.remove_object(id)?;
        tracing::debug!(%id, "object removed");
        Ok(())
    }

    /// Apply pending edits of the listed objects to the spatial index.
    ///
    /// An object whose tight bounds still fit its enlarged leaf box keeps its
    /// leaf; otherwise it is removed and reinserted.
    pub fn update_objects(&mut self, changed: &[ObjectId]) -> UpdateStats {
        let _span = tracing::info_span!("update_objects", changed = changed.len()).entered();
        let start = Instant::now();
        let mut stats = UpdateStats::default();
        let scene = &mut self.scene;

        for id in scene.recently_changed.drain(..) {
            if let Some(obj) = scene.objects.get_mut(id.index()) {
                obj.last_change_mask = ComponentMask::empty();
            }
        }

        for &id in changed {
            let Some(obj) = scene.objects.get_mut(id.index()) else {
                tracing::warn!(%id, "update for unknown object ignored");
                continue;
            };
            let pending = std::mem::take(&mut obj.change_mask);
            obj.last_change_mask |= pending;
            if pending.is_empty() {
                continue;
            }
            scene.recently_changed.push(id);

            if !pending.contains(ComponentMask::TRANSFORM) || !obj.has(ComponentMask::TRANSFORM) {
                continue;
            }
            let Some(tight) = obj
                .components
                .transform
                .and_then(|i| scene.transforms.get(i))
                .map(|tr| tr.world_bbox)
            else {
                continue;
            };

            match obj.leaf {
                Some(leaf) if scene.bvh.fits(leaf, &tight) => stats.refit_skipped += 1,
                Some(leaf) => {
                    scene.bvh.remove(leaf);
                    obj.leaf = Some(scene.bvh.insert(id, &tight));
                    stats.reinserted += 1;
                }
                None => {
                    obj.leaf = Some(scene.bvh.insert(id, &tight));
                    stats.inserted += 1;
                }
            }
        }

        scene.update_counter += 1;
        stats.frame_time = start.elapsed();
        tracing::trace!(
            skipped = stats.refit_skipped,
            reinserted = stats.reinserted,
            inserted = stats.inserted,
            counter = scene.update_counter,
            "update complete"
        );
        stats
    }
}
