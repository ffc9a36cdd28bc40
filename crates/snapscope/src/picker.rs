//! The spiral picker: cull, draw, read back, search, resolve.

use std::sync::{Arc, Weak};

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
use snapscope_core::geometry::min_axis_scale;
use snapscope_core::{
    Aabb, CandidateId, IdRange, IndexArrays, MeshKey, Ray, SharedMesh, SnapError, SnapHit, SnapMode,
    SnapObject, SnapOptions, Viewport,
};
use snapscope_render::{DrawParams, IdBuffer, IdRenderTarget, PassParams};

use crate::cache::{CacheHandle, CacheKey, CacheSource, GeometryCache};
use crate::candidate::{cache_key, Candidate, CandidateSet};
use crate::resolve::ResolveContext;
use crate::spiral::spiral_search;
use crate::Result;

/// Work counters of a picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PickerStats {
    /// Calls to `query`.
    pub queries: u64,
    /// Draw passes performed.
    pub passes: u64,
    /// Queries answered from the previous readback.
    pub reused_passes: u64,
    /// Candidate draws issued to the target.
    pub draw_calls: u64,
    /// Whole-buffer readbacks.
    pub readbacks: u64,
    /// Geometry cache builds.
    pub cache_builds: u64,
    /// Geometry cache entries freed.
    pub cache_frees: u64,
    /// Candidates dropped because their object went away.
    pub stale_dropped: u64,
}

/// A candidate that survived culling this query.
struct Survivor {
    id: CandidateId,
    world: Mat4,
    mesh: Option<Arc<SharedMesh>>,
}

/// A survivor the last pass saw, whether or not it drew anything.
struct Considered {
    id: CandidateId,
    world: Mat4,
    object: Weak<dyn SnapObject>,
    mesh_key: Option<MeshKey>,
    mesh_generation: Option<u64>,
}

impl Considered {
    fn unchanged(&self) -> bool {
        let Some(object) = self.object.upgrade() else {
            return false;
        };
        let mesh = object.mesh();
        object.world_matrix() == self.world
            && mesh.as_ref().map(|m| m.key()) == self.mesh_key
            && mesh.as_ref().map(|m| m.generation()) == self.mesh_generation
    }
}

/// A candidate drawn in the last pass.
struct Drawn {
    id: CandidateId,
    range: IdRange,
    world: Mat4,
    arrays: Arc<IndexArrays>,
}

/// What the current id buffer contents were drawn from.
struct PassRecord {
    view: Mat4,
    projection: Mat4,
    size: UVec2,
    clip_planes: Vec<Vec4>,
    state_generation: u64,
    /// Every survivor of the pass, including those with nothing to draw
    /// and those past the id-space guard.
    considered: Vec<Considered>,
    drawn: Vec<Drawn>,
}

impl PassRecord {
    /// Candidate whose range holds `id`. Ranges ascend in draw order.
    fn lookup(&self, id: u32) -> Option<&Drawn> {
        let index = self.drawn.partition_point(|d| d.range.end() <= id);
        self.drawn.get(index).filter(|d| d.range.contains(id))
    }
}

/// Answers snap queries against registered candidates.
///
/// Every query culls candidates against the cursor ray, draws the
/// survivors into the id target with consecutive id ranges, reads the
/// buffer back once and runs a spiral search around the cursor. When the
/// view and every drawn candidate are unchanged, the previous readback is
/// reused and nothing is drawn.
pub struct SpiralPicker<T: IdRenderTarget> {
    target: T,
    options: SnapOptions,
    cache: GeometryCache<T::Batches>,
    candidates: CandidateSet,
    active: Option<CandidateId>,
    ids: IdBuffer,
    last_pass: Option<PassRecord>,
    /// Bumped by every change that invalidates the last readback.
    state_generation: u64,
    stats: PickerStats,
}

impl<T: IdRenderTarget> SpiralPicker<T> {
    /// Creates a picker drawing into `target`.
    pub fn new(target: T, options: SnapOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            target,
            options,
            cache: GeometryCache::default(),
            candidates: CandidateSet::default(),
            active: None,
            ids: IdBuffer::default(),
            last_pass: None,
            state_generation: 0,
            stats: PickerStats::default(),
        })
    }

    /// Registers an object as a snap candidate.
    ///
    /// The picker keeps only a weak reference; once the object is dropped
    /// the candidate is silently removed on the next query.
    pub fn register(&mut self, object: Arc<dyn SnapObject>, world_matrix: Mat4) -> CandidateId {
        let id = self.candidates.insert(Candidate::new(&object, world_matrix));
        let key = cache_key(id, object.mesh().as_ref());
        let handle = self.cache.acquire(key);
        if let Some(candidate) = self.candidates.get_mut(id) {
            candidate.cache = Some((key, handle));
        }
        self.state_generation += 1;
        log::debug!("registered snap candidate {id:?} ({})", object.name());
        id
    }

    /// Removes a candidate and drops its cache reference.
    pub fn unregister(&mut self, id: CandidateId) -> Result<()> {
        let candidate = self
            .candidates
            .remove(id)
            .ok_or(SnapError::CandidateNotFound(id))?;
        self.drop_candidate(id, candidate);
        Ok(())
    }

    /// Frees the candidate's cache so it is rebuilt on the next query.
    ///
    /// Other candidates sharing the mesh rebuild as well.
    pub fn invalidate(&mut self, id: CandidateId) -> Result<()> {
        let candidate = self
            .candidates
            .get_mut(id)
            .ok_or(SnapError::CandidateNotFound(id))?;
        if let Some((_, handle)) = candidate.cache.take() {
            self.cache.mark_dirty(handle);
            self.cache.release(handle, &mut self.target);
        }
        self.state_generation += 1;
        Ok(())
    }

    /// Changes which primitive kinds are snapped to. Every cache is
    /// rebuilt, since the draw batches differ per mode.
    pub fn set_mode(&mut self, mode: SnapMode) {
        if self.options.mode == mode {
            return;
        }
        self.options.mode = mode;
        self.cache.invalidate_all(&mut self.target);
        self.state_generation += 1;
    }

    /// Sets the search radius in pixels.
    pub fn set_pixel_threshold(&mut self, px: u32) -> Result<()> {
        let options = self.options.clone().with_pixel_threshold(px);
        options.validate()?;
        self.options = options;
        self.state_generation += 1;
        Ok(())
    }

    /// Replaces all options.
    pub fn set_options(&mut self, options: SnapOptions) -> Result<()> {
        options.validate()?;
        if options.mode != self.options.mode {
            self.cache.invalidate_all(&mut self.target);
        }
        self.options = options;
        self.state_generation += 1;
        Ok(())
    }

    /// Marks the candidate being edited; it wins depth ties.
    pub fn set_active(&mut self, active: Option<CandidateId>) {
        if self.active != active {
            self.active = active;
            self.state_generation += 1;
        }
    }

    /// Current options.
    #[must_use]
    pub fn options(&self) -> &SnapOptions {
        &self.options
    }

    /// The id render target.
    #[must_use]
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Work counters.
    #[must_use]
    pub fn stats(&self) -> PickerStats {
        PickerStats {
            cache_builds: self.cache.builds(),
            cache_frees: self.cache.frees(),
            ..self.stats
        }
    }

    /// Number of live geometry caches.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of candidates referencing the cache of `mesh`.
    #[must_use]
    pub fn cache_ref_count(&self, mesh: MeshKey) -> u32 {
        self.cache.ref_count(CacheKey::Mesh(mesh))
    }

    /// Number of registered candidates.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// World matrix snapshot from registration or the last query that
    /// drew the candidate.
    #[must_use]
    pub fn world_matrix(&self, id: CandidateId) -> Option<Mat4> {
        self.candidates.get(id).map(|candidate| candidate.world)
    }

    /// Ids assigned to a candidate in the last draw pass.
    #[must_use]
    pub fn id_range(&self, id: CandidateId) -> Option<IdRange> {
        self.last_pass
            .as_ref()?
            .drawn
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.range)
    }

    /// Finds the snap target nearest to `cursor` (pixels, top-left origin).
    ///
    /// Returns `Ok(None)` when nothing is within the pixel threshold. Only
    /// render target failures are errors.
    pub fn query(&mut self, view: &impl Viewport, cursor: Vec2) -> Result<Option<SnapHit>> {
        self.stats.queries += 1;

        let size = view.size();
        if size.x == 0 || size.y == 0 || self.options.mode.is_empty() {
            return Ok(None);
        }
        if self.target.size() != size {
            log::debug!("resizing snap target to {}x{}", size.x, size.y);
            self.target.resize(size.x, size.y)?;
            self.last_pass = None;
            self.state_generation += 1;
        }
        let Some(ray) = view.ray_from_point(cursor) else {
            return Ok(None);
        };

        let survivors = self.cull(view, cursor, &ray);
        if survivors.is_empty() {
            return Ok(None);
        }

        if self.can_reuse(view, &survivors) {
            self.stats.reused_passes += 1;
        } else {
            self.last_pass = None;
            self.draw_pass(view, &survivors)?;
        }

        Ok(self.search(view, cursor, ray))
    }

    fn drop_candidate(&mut self, id: CandidateId, candidate: Candidate) {
        if let Some((_, handle)) = candidate.cache {
            self.cache.release(handle, &mut self.target);
        }
        if self.active == Some(id) {
            self.active = None;
        }
        self.state_generation += 1;
    }

    /// Refreshes world matrices, drops stale candidates and keeps those
    /// whose bounds can reach the search window.
    fn cull(&mut self, view: &dyn Viewport, cursor: Vec2, ray: &Ray) -> Vec<Survivor> {
        let threshold = self.options.pixel_threshold as f32;
        let mut survivors = Vec::new();
        let mut stale = Vec::new();

        for &id in self.candidates.ids() {
            let Some(candidate) = self.candidates.get(id) else {
                continue;
            };
            let Some(object) = candidate.object.upgrade() else {
                stale.push(id);
                continue;
            };

            let world = object.world_matrix();
            let mesh = object.mesh();
            let bounds = match &mesh {
                Some(mesh) => mesh.bounds(),
                None => Some(Aabb {
                    min: Vec3::ZERO,
                    max: Vec3::ZERO,
                }),
            };
            let Some(bounds) = bounds else {
                log::trace!("cull {id:?}: no visible geometry");
                continue;
            };

            if reaches_cursor(view, &bounds, &world, cursor, ray, threshold) {
                survivors.push(Survivor { id, world, mesh });
            } else {
                log::trace!("cull {id:?}: outside search window");
            }
        }

        for survivor in &survivors {
            if let Some(candidate) = self.candidates.get_mut(survivor.id) {
                candidate.world = survivor.world;
            }
        }

        for id in stale {
            if let Some(candidate) = self.candidates.remove(id) {
                log::warn!("dropping snap candidate {id:?}: object no longer exists");
                self.stats.stale_dropped += 1;
                self.drop_candidate(id, candidate);
            }
        }

        survivors
    }

    /// True if the id buffer still shows exactly what a new pass would draw.
    fn can_reuse(&self, view: &dyn Viewport, survivors: &[Survivor]) -> bool {
        let Some(last) = &self.last_pass else {
            return false;
        };
        if last.state_generation != self.state_generation
            || last.view != view.view_matrix()
            || last.projection != view.projection_matrix()
            || last.size != view.size()
            || last.clip_planes != view.clip_planes()
        {
            return false;
        }

        last.considered.iter().all(Considered::unchanged)
            && survivors
                .iter()
                .all(|s| last.considered.iter().any(|seen| seen.id == s.id))
    }

    /// Makes sure the candidate references the cache entry for `key`.
    fn attach_cache(&mut self, id: CandidateId, key: CacheKey) -> Option<CacheHandle> {
        let current = self.candidates.get(id)?.cache;
        if let Some((held, handle)) = current {
            if held == key && self.cache.entry(handle).is_some() {
                return Some(handle);
            }
            self.cache.release(handle, &mut self.target);
        }
        let handle = self.cache.acquire(key);
        self.candidates.get_mut(id)?.cache = Some((key, handle));
        Some(handle)
    }

    fn draw_pass(&mut self, view: &dyn Viewport, survivors: &[Survivor]) -> Result<()> {
        let mode = self.options.mode;
        let max_ids = self.options.max_primitive_ids;

        self.target.clear();
        self.target.bind(&PassParams {
            view_projection: view.view_projection(),
            clip_planes: view.clip_planes().to_vec(),
        });

        let considered: Vec<Considered> = survivors
            .iter()
            .filter_map(|survivor| {
                let candidate = self.candidates.get(survivor.id)?;
                Some(Considered {
                    id: survivor.id,
                    world: survivor.world,
                    object: candidate.object.clone(),
                    mesh_key: survivor.mesh.as_ref().map(|m| m.key()),
                    mesh_generation: survivor.mesh.as_ref().map(|m| m.generation()),
                })
            })
            .collect();

        let mut next_id: u32 = 0;
        let mut drawn = Vec::with_capacity(survivors.len());

        for survivor in survivors {
            let key = cache_key(survivor.id, survivor.mesh.as_ref());
            let Some(handle) = self.attach_cache(survivor.id, key) else {
                continue;
            };
            let source = survivor
                .mesh
                .as_deref()
                .map_or(CacheSource::Point, CacheSource::Mesh);
            self.cache.ensure_built(handle, source, mode, &mut self.target)?;

            let Some(entry) = self.cache.entry(handle) else {
                continue;
            };
            let Some(batches) = entry.batches.as_ref() else {
                continue;
            };
            let count = entry.arrays.primitive_count();
            if count == 0 {
                continue;
            }
            if u64::from(next_id) + u64::from(count) > u64::from(max_ids) {
                log::warn!(
                    "snap id space exhausted at {next_id} of {max_ids}; skipping remaining candidates"
                );
                break;
            }

            let depth_bias = if self.active == Some(survivor.id) {
                self.options.active_depth_bias
            } else {
                0.0
            };
            let params = DrawParams {
                model: survivor.world,
                id_offset: next_id,
                depth_bias,
                wire_offset: self.options.wire_depth_offset,
            };
            let drawn_count = self.target.draw(batches, &params)?;
            self.stats.draw_calls += 1;

            drawn.push(Drawn {
                id: survivor.id,
                range: IdRange {
                    first: next_id,
                    count: drawn_count,
                },
                world: survivor.world,
                arrays: Arc::clone(&entry.arrays),
            });
            next_id += drawn_count;
        }

        self.target.unbind()?;
        self.target.read_back(&mut self.ids)?;
        self.stats.readbacks += 1;
        self.stats.passes += 1;

        log::debug!(
            "snap pass drew {} of {} candidates, {next_id} primitives",
            drawn.len(),
            survivors.len()
        );

        self.last_pass = Some(PassRecord {
            view: view.view_matrix(),
            projection: view.projection_matrix(),
            size: view.size(),
            clip_planes: view.clip_planes().to_vec(),
            state_generation: self.state_generation,
            considered,
            drawn,
        });
        Ok(())
    }

    fn search(&self, view: &dyn Viewport, cursor: Vec2, ray: Ray) -> Option<SnapHit> {
        let last = self.last_pass.as_ref()?;
        let mode = self.options.mode;

        let classify = |id: u32| {
            let drawn = last.lookup(id)?;
            let local = drawn.range.local(id)?;
            drawn.arrays.classify(local).map(|p| p.kind())
        };
        let center = (cursor.x.floor() as i64, cursor.y.floor() as i64);
        let hit = spiral_search(
            &self.ids,
            center,
            self.options.pixel_threshold,
            mode.face && mode.any_wire(),
            classify,
        )?;

        let drawn = last.lookup(hit.id)?;
        let primitive = drawn.arrays.classify(drawn.range.local(hit.id)?)?;
        let context = ResolveContext {
            view,
            ray,
            cursor,
            options: &self.options,
        };
        let resolved = context.resolve(&drawn.arrays, &drawn.world, primitive)?;

        Some(SnapHit {
            candidate: drawn.id,
            kind: resolved.kind,
            rasterized_kind: primitive.kind(),
            elements: resolved.elements,
            position: resolved.position,
            pixel: hit.pixel,
        })
    }
}

/// Conservative test of whether an object's bounds can cover any pixel of
/// the search window around the cursor.
fn reaches_cursor(
    view: &dyn Viewport,
    local_bounds: &Aabb,
    world: &Mat4,
    cursor: Vec2,
    ray: &Ray,
    threshold: f32,
) -> bool {
    let world_bounds = local_bounds.transformed(world);
    let corners = world_bounds.corners();

    if view
        .clip_planes()
        .iter()
        .any(|plane| corners.iter().all(|&c| plane.truncate().dot(c) + plane.w < 0.0))
    {
        return false;
    }

    // Same square window the spiral search scans.
    if world_bounds.is_point() {
        return view.project_to_screen(world_bounds.center()).is_some_and(|screen| {
            let dx = (screen.x.floor() - cursor.x.floor()).abs();
            let dy = (screen.y.floor() - cursor.y.floor()).abs();
            dx.max(dy) <= threshold
        });
    }

    if world.determinant().abs() < 1e-12 {
        return true;
    }

    let mut world_per_pixel: f32 = 0.0;
    for corner in corners {
        match view.world_per_pixel_at(corner) {
            Some(size) => world_per_pixel = world_per_pixel.max(size),
            // A corner behind the eye: the box may span the whole screen.
            None => return true,
        }
    }

    let scale = min_axis_scale(world);
    if scale < 1e-12 {
        return true;
    }
    let margin = threshold * world_per_pixel / scale;
    let local_ray = ray.transformed(&world.inverse());
    local_bounds.expanded(margin).intersect_ray(&local_ray).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapscope_core::{Mesh, SceneObject, ViewState};
    use snapscope_render::SoftwareTarget;

    fn view() -> ViewState {
        ViewState::perspective(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_4,
            UVec2::new(100, 100),
        )
    }

    fn quad() -> Arc<SharedMesh> {
        SharedMesh::new(
            Mesh::new(
                vec![
                    Vec3::new(-1.0, -1.0, 0.0),
                    Vec3::new(1.0, -1.0, 0.0),
                    Vec3::new(1.0, 1.0, 0.0),
                    Vec3::new(-1.0, 1.0, 0.0),
                ],
                vec![vec![0, 1, 2, 3]],
            )
            .unwrap(),
        )
    }

    fn picker() -> SpiralPicker<SoftwareTarget> {
        SpiralPicker::new(SoftwareTarget::new(1, 1).unwrap(), SnapOptions::default()).unwrap()
    }

    #[test]
    fn test_reaches_cursor_culls_far_boxes() {
        let view = view();
        let cursor = Vec2::new(50.0, 50.0);
        let ray = view.ray_from_point(cursor).unwrap();
        let bounds = Aabb::from_points([Vec3::splat(-0.1), Vec3::splat(0.1)]).unwrap();

        assert!(reaches_cursor(&view, &bounds, &Mat4::IDENTITY, cursor, &ray, 12.0));
        let moved = Mat4::from_translation(Vec3::new(1.5, 0.0, 0.0));
        assert!(!reaches_cursor(&view, &bounds, &moved, cursor, &ray, 12.0));
    }

    #[test]
    fn test_reaches_cursor_point_bounds() {
        let view = view();
        let cursor = Vec2::new(50.0, 50.0);
        let ray = view.ray_from_point(cursor).unwrap();
        let point = Aabb {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        };
        assert!(reaches_cursor(&view, &point, &Mat4::IDENTITY, cursor, &ray, 12.0));
        let far = Vec2::new(80.0, 50.0);
        let far_ray = view.ray_from_point(far).unwrap();
        assert!(!reaches_cursor(&view, &point, &Mat4::IDENTITY, far, &far_ray, 12.0));
    }

    #[test]
    fn test_point_bounds_use_square_window() {
        let view = view();
        let point = Aabb {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        };
        // The origin lands on pixel (50, 50); ring 11 of the window.
        let corner = Vec2::new(39.5, 39.5);
        let ray = view.ray_from_point(corner).unwrap();
        assert!(reaches_cursor(&view, &point, &Mat4::IDENTITY, corner, &ray, 12.0));

        let outside = Vec2::new(37.5, 49.5);
        let ray = view.ray_from_point(outside).unwrap();
        assert!(!reaches_cursor(&view, &point, &Mat4::IDENTITY, outside, &ray, 12.0));
    }

    #[test]
    fn test_clip_plane_culls_whole_box() {
        let view = view().with_clip_plane(Vec4::new(0.0, 0.0, -1.0, -1.0));
        let cursor = Vec2::new(50.0, 50.0);
        let ray = view.ray_from_point(cursor).unwrap();
        let bounds = Aabb::from_points([Vec3::splat(-0.5), Vec3::splat(0.5)]).unwrap();
        assert!(!reaches_cursor(&view, &bounds, &Mat4::IDENTITY, cursor, &ray, 12.0));
    }

    #[test]
    fn test_unknown_candidate_errors() {
        let mut picker = picker();
        let obj = SceneObject::with_mesh("quad", quad(), Mat4::IDENTITY);
        let id = picker.register(obj, Mat4::IDENTITY);
        picker.unregister(id).unwrap();
        assert!(matches!(
            picker.unregister(id),
            Err(SnapError::CandidateNotFound(_))
        ));
        assert!(picker.invalidate(id).is_err());
    }

    #[test]
    fn test_query_resizes_target() {
        let mut picker = picker();
        let obj = SceneObject::with_mesh("quad", quad(), Mat4::IDENTITY);
        picker.register(obj.clone(), Mat4::IDENTITY);
        let hit = picker.query(&view(), Vec2::new(50.0, 50.0)).unwrap();
        assert!(hit.is_some());
        assert_eq!(picker.target().size(), UVec2::new(100, 100));
    }

    #[test]
    fn test_empty_mode_finds_nothing() {
        let mut picker = picker();
        let obj = SceneObject::with_mesh("quad", quad(), Mat4::IDENTITY);
        picker.register(obj.clone(), Mat4::IDENTITY);
        picker.set_mode(SnapMode::new(false, false, false));
        assert!(picker.query(&view(), Vec2::new(50.0, 50.0)).unwrap().is_none());
        assert_eq!(picker.stats().passes, 0);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let mut picker = picker();
        assert!(picker.set_pixel_threshold(0).is_err());
        assert_eq!(picker.options().pixel_threshold, 12);
        picker.set_pixel_threshold(4).unwrap();
        assert_eq!(picker.options().pixel_threshold, 4);
    }
}
