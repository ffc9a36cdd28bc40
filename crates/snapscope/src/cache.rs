//! Shared geometry index caches.
//!
//! Entries live in an arena and are addressed by generation-checked
//! handles. Candidates showing the same mesh share one entry; the entry
//! keeps a reference count of those candidates and is freed when it drops
//! to zero. An entry is rebuilt wholesale when it is marked dirty, when the
//! snap mode changes, or when its mesh reports a new generation.

use std::collections::HashMap;
use std::sync::Arc;

use snapscope_core::{CandidateId, IndexArrays, MeshKey, SharedMesh, SnapMode, Vec3};
use snapscope_render::{IdRenderTarget, RenderResult};

/// What a cache entry is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A shared mesh, keyed by its identity token.
    Mesh(MeshKey),
    /// The single-point placeholder of an object without a mesh.
    Point(CandidateId),
}

/// Handle to a live cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheHandle {
    index: u32,
    generation: u32,
}

/// Geometry a build reads from.
#[derive(Clone, Copy)]
pub(crate) enum CacheSource<'a> {
    Mesh(&'a SharedMesh),
    Point,
}

pub(crate) struct CacheEntry<B> {
    pub(crate) key: CacheKey,
    pub(crate) arrays: Arc<IndexArrays>,
    pub(crate) batches: Option<B>,
    pub(crate) ref_count: u32,
    /// Mesh generation the arrays were built from.
    pub(crate) built_from: Option<u64>,
    pub(crate) dirty: bool,
}

impl<B> CacheEntry<B> {
    fn needs_build(&self, source: CacheSource<'_>) -> bool {
        if self.dirty || self.batches.is_none() {
            return true;
        }
        match source {
            CacheSource::Mesh(mesh) => self.built_from != Some(mesh.generation()),
            CacheSource::Point => false,
        }
    }
}

struct Slot<B> {
    generation: u32,
    entry: Option<CacheEntry<B>>,
}

/// Arena of reference-counted geometry index caches.
pub struct GeometryCache<B> {
    slots: Vec<Slot<B>>,
    free: Vec<u32>,
    by_key: HashMap<CacheKey, CacheHandle>,
    builds: u64,
    frees: u64,
}

impl<B> Default for GeometryCache<B> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_key: HashMap::new(),
            builds: 0,
            frees: 0,
        }
    }
}

impl<B> GeometryCache<B> {
    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Returns true if no entry is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Reference count of the entry for `key`, zero if there is none.
    #[must_use]
    pub fn ref_count(&self, key: CacheKey) -> u32 {
        self.by_key
            .get(&key)
            .and_then(|&handle| self.entry(handle))
            .map_or(0, |entry| entry.ref_count)
    }

    /// Total builds so far.
    #[must_use]
    pub fn builds(&self) -> u64 {
        self.builds
    }

    /// Total entries freed so far.
    #[must_use]
    pub fn frees(&self) -> u64 {
        self.frees
    }

    pub(crate) fn entry(&self, handle: CacheHandle) -> Option<&CacheEntry<B>> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, handle: CacheHandle) -> Option<&mut CacheEntry<B>> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Takes a reference on the entry for `key`, creating an unbuilt entry
    /// if none exists.
    pub(crate) fn acquire(&mut self, key: CacheKey) -> CacheHandle {
        if let Some(&handle) = self.by_key.get(&key) {
            if let Some(entry) = self.entry_mut(handle) {
                entry.ref_count += 1;
                return handle;
            }
        }

        let entry = CacheEntry {
            key,
            arrays: Arc::new(IndexArrays::default()),
            batches: None,
            ref_count: 1,
            built_from: None,
            dirty: true,
        };
        let handle = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            CacheHandle {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            CacheHandle {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        };
        self.by_key.insert(key, handle);
        handle
    }

    /// Drops one reference; frees the entry and its batches at zero.
    ///
    /// Returns true if the entry was freed.
    pub(crate) fn release<T>(&mut self, handle: CacheHandle, target: &mut T) -> bool
    where
        T: IdRenderTarget<Batches = B>,
    {
        let Some(entry) = self.entry_mut(handle) else {
            return false;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            return false;
        }

        let slot = &mut self.slots[handle.index as usize];
        let Some(entry) = slot.entry.take() else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.by_key.remove(&entry.key);
        if let Some(batches) = entry.batches {
            target.release(batches);
        }
        self.frees += 1;
        log::debug!("freed geometry cache {:?}", entry.key);
        true
    }

    /// Forces a rebuild of one entry on its next use.
    pub(crate) fn mark_dirty(&mut self, handle: CacheHandle) {
        if let Some(entry) = self.entry_mut(handle) {
            entry.dirty = true;
        }
    }

    /// Releases every entry's batches so all of them rebuild on next use.
    pub(crate) fn invalidate_all<T>(&mut self, target: &mut T)
    where
        T: IdRenderTarget<Batches = B>,
    {
        for entry in self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut()) {
            if let Some(batches) = entry.batches.take() {
                target.release(batches);
            }
            entry.dirty = true;
        }
    }

    /// Rebuilds the entry if it is dirty or out of date.
    ///
    /// Returns true if a build happened.
    pub(crate) fn ensure_built<T>(
        &mut self,
        handle: CacheHandle,
        source: CacheSource<'_>,
        mode: SnapMode,
        target: &mut T,
    ) -> RenderResult<bool>
    where
        T: IdRenderTarget<Batches = B>,
    {
        let Some(entry) = self.entry_mut(handle) else {
            return Ok(false);
        };
        if !entry.needs_build(source) {
            return Ok(false);
        }

        // Read the generation first so a concurrent edit triggers another
        // rebuild rather than being missed.
        let (arrays, built_from) = match source {
            CacheSource::Mesh(mesh) => {
                let generation = mesh.generation();
                let arrays = mesh.read(|topology| IndexArrays::build(topology, mode));
                (arrays, Some(generation))
            }
            CacheSource::Point if mode.is_empty() => (IndexArrays::default(), None),
            CacheSource::Point => (IndexArrays::point(Vec3::ZERO), None),
        };
        let arrays = Arc::new(arrays);
        let batches = target.upload(&arrays)?;

        if let Some(old) = entry.batches.replace(batches) {
            target.release(old);
        }
        log::debug!(
            "built geometry cache {:?}: {} tris, {} edges, {} points",
            entry.key,
            arrays.tris.len(),
            arrays.edges.len(),
            arrays.points.len()
        );
        entry.arrays = arrays;
        entry.built_from = built_from;
        entry.dirty = false;
        self.builds += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapscope_core::Mesh;
    use snapscope_render::SoftwareTarget;

    fn triangle_mesh() -> Arc<SharedMesh> {
        SharedMesh::new(
            Mesh::new(
                vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                vec![vec![0, 1, 2]],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_shared_key_shares_entry() {
        let mut target = SoftwareTarget::new(4, 4).unwrap();
        let mut cache = GeometryCache::default();
        let mesh = triangle_mesh();
        let key = CacheKey::Mesh(mesh.key());

        let a = cache.acquire(key);
        let b = cache.acquire(key);
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.ref_count(key), 2);

        assert!(!cache.release(a, &mut target));
        assert_eq!(cache.ref_count(key), 1);
        assert!(cache.release(b, &mut target));
        assert!(cache.is_empty());
        assert_eq!(cache.frees(), 1);
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let mut target = SoftwareTarget::new(4, 4).unwrap();
        let mut cache: GeometryCache<Arc<IndexArrays>> = GeometryCache::default();
        let old = cache.acquire(CacheKey::Mesh(triangle_mesh().key()));
        cache.release(old, &mut target);

        let new = cache.acquire(CacheKey::Mesh(triangle_mesh().key()));
        assert_eq!(old.index, new.index);
        assert!(cache.entry(old).is_none());
        assert!(cache.entry(new).is_some());
        assert!(!cache.release(old, &mut target));
    }

    #[test]
    fn test_build_is_lazy_and_tracks_generation() {
        let mut target = SoftwareTarget::new(4, 4).unwrap();
        let mut cache = GeometryCache::default();
        let mesh = triangle_mesh();
        let handle = cache.acquire(CacheKey::Mesh(mesh.key()));
        let source = CacheSource::Mesh(&mesh);

        assert!(cache.ensure_built(handle, source, SnapMode::ALL, &mut target).unwrap());
        assert!(!cache.ensure_built(handle, source, SnapMode::ALL, &mut target).unwrap());

        mesh.notify_changed();
        assert!(cache.ensure_built(handle, source, SnapMode::ALL, &mut target).unwrap());

        cache.mark_dirty(handle);
        assert!(cache.ensure_built(handle, source, SnapMode::ALL, &mut target).unwrap());

        cache.invalidate_all(&mut target);
        assert!(cache.entry(handle).unwrap().batches.is_none());
        assert!(cache.ensure_built(handle, source, SnapMode::faces(), &mut target).unwrap());
        assert_eq!(cache.builds(), 4);
        assert!(cache.entry(handle).unwrap().arrays.edges.is_empty());
    }

    #[test]
    fn test_point_placeholder() {
        let mut target = SoftwareTarget::new(4, 4).unwrap();
        let mut cache = GeometryCache::default();
        let id = CandidateId {
            index: 0,
            generation: 0,
        };
        let handle = cache.acquire(CacheKey::Point(id));
        cache
            .ensure_built(handle, CacheSource::Point, SnapMode::faces(), &mut target)
            .unwrap();
        assert_eq!(cache.entry(handle).unwrap().arrays.primitive_count(), 1);
    }
}
