//! Registered snap candidates.

use std::sync::{Arc, Weak};

use snapscope_core::{CandidateId, Mat4, SharedMesh, SnapObject};

use crate::cache::{CacheHandle, CacheKey};

pub(crate) struct Candidate {
    pub(crate) object: Weak<dyn SnapObject>,
    /// World matrix as of the last query.
    pub(crate) world: Mat4,
    /// Cache entry this candidate holds a reference on.
    pub(crate) cache: Option<(CacheKey, CacheHandle)>,
}

impl Candidate {
    pub(crate) fn new(object: &Arc<dyn SnapObject>, world: Mat4) -> Self {
        Self {
            object: Arc::downgrade(object),
            world,
            cache: None,
        }
    }
}

/// Cache key for a candidate's current geometry.
pub(crate) fn cache_key(id: CandidateId, mesh: Option<&Arc<SharedMesh>>) -> CacheKey {
    mesh.map_or(CacheKey::Point(id), |mesh| CacheKey::Mesh(mesh.key()))
}

struct Slot {
    generation: u32,
    candidate: Option<Candidate>,
}

/// Candidates in registration order, addressed by generation-checked ids.
#[derive(Default)]
pub(crate) struct CandidateSet {
    slots: Vec<Slot>,
    free: Vec<u32>,
    order: Vec<CandidateId>,
}

impl CandidateSet {
    pub(crate) fn insert(&mut self, candidate: Candidate) -> CandidateId {
        let id = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.candidate = Some(candidate);
            CandidateId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                candidate: Some(candidate),
            });
            CandidateId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        };
        self.order.push(id);
        id
    }

    pub(crate) fn remove(&mut self, id: CandidateId) -> Option<Candidate> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let candidate = slot.candidate.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.order.retain(|&other| other != id);
        Some(candidate)
    }

    pub(crate) fn get(&self, id: CandidateId) -> Option<&Candidate> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.candidate.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: CandidateId) -> Option<&mut Candidate> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.candidate.as_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Ids in registration order.
    pub(crate) fn ids(&self) -> &[CandidateId] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapscope_core::SceneObject;

    fn object() -> Arc<dyn SnapObject> {
        SceneObject::empty("empty", Mat4::IDENTITY)
    }

    #[test]
    fn test_order_survives_slot_reuse() {
        let obj = object();
        let mut set = CandidateSet::default();
        let a = set.insert(Candidate::new(&obj, Mat4::IDENTITY));
        let b = set.insert(Candidate::new(&obj, Mat4::IDENTITY));
        set.remove(a).unwrap();
        let c = set.insert(Candidate::new(&obj, Mat4::IDENTITY));

        assert_eq!(c.index, a.index);
        assert_ne!(c, a);
        assert_eq!(set.ids(), &[b, c]);
        assert!(set.get(a).is_none());
        assert!(set.remove(a).is_none());
        assert_eq!(set.len(), 2);
    }
}
