//! End-to-end snap scenarios on the software target.

use std::sync::Arc;

use snapscope::*;

const SIZE: u32 = 200;

fn front_view() -> ViewState {
    ViewState::perspective(
        Vec3::new(0.0, 0.0, 5.0),
        Vec3::ZERO,
        std::f32::consts::FRAC_PI_4,
        UVec2::new(SIZE, SIZE),
    )
}

fn center() -> Vec2 {
    Vec2::splat(SIZE as f32 * 0.5)
}

fn quad_mesh(half: f32, z: f32) -> Mesh {
    Mesh::new(
        vec![
            Vec3::new(-half, -half, z),
            Vec3::new(half, -half, z),
            Vec3::new(half, half, z),
            Vec3::new(-half, half, z),
        ],
        vec![vec![0, 1, 2, 3]],
    )
    .unwrap()
}

/// A single wire edge with no faces.
fn wire_mesh(a: Vec3, b: Vec3) -> Mesh {
    Mesh::new(vec![a, b], Vec::new())
        .unwrap()
        .with_loose_edges(vec![[0, 1]])
        .unwrap()
}

fn picker(options: SnapOptions) -> SpiralPicker<SoftwareTarget> {
    SpiralPicker::new(SoftwareTarget::new(1, 1).unwrap(), options).unwrap()
}

#[test]
fn repeated_query_reuses_readback() {
    let mut picker = picker(SnapOptions::default());
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.0, 0.0)), Mat4::IDENTITY);
    picker.register(quad.clone(), Mat4::IDENTITY);
    let view = front_view();

    let first = picker.query(&view, center()).unwrap();
    let draws = picker.target().stats().draw_calls;
    let second = picker.query(&view, center()).unwrap();

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(picker.target().stats().draw_calls, draws);
    assert_eq!(picker.stats().passes, 1);
    assert_eq!(picker.stats().reused_passes, 1);
    assert_eq!(picker.stats().readbacks, 1);
}

#[test]
fn nothing_to_draw_candidate_does_not_block_reuse() {
    let mut picker = picker(SnapOptions::default().with_mode(SnapMode::faces()));
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.0, 0.0)), Mat4::IDENTITY);
    // Wire-only geometry has no faces to draw in face-only mode.
    let wire = SceneObject::with_mesh(
        "wire",
        SharedMesh::new(wire_mesh(Vec3::new(-0.4, 0.0, 0.5), Vec3::new(0.4, 0.0, 0.5))),
        Mat4::IDENTITY,
    );
    let quad_id = picker.register(quad.clone(), Mat4::IDENTITY);
    let wire_id = picker.register(wire.clone(), Mat4::IDENTITY);
    let view = front_view();

    let first = picker.query(&view, center()).unwrap();
    assert_eq!(picker.id_range(wire_id), None);
    let draws = picker.target().stats().draw_calls;
    let second = picker.query(&view, center()).unwrap();

    assert_eq!(first.as_ref().map(|hit| hit.candidate), Some(quad_id));
    assert_eq!(first, second);
    assert_eq!(picker.target().stats().draw_calls, draws);
    assert_eq!(picker.stats().passes, 1);
    assert_eq!(picker.stats().reused_passes, 1);
}

#[test]
fn id_guard_skipped_candidate_does_not_block_reuse() {
    let options = SnapOptions {
        max_primitive_ids: 3,
        ..SnapOptions::default().with_mode(SnapMode::faces())
    };
    let mut picker = picker(options);
    let near = SceneObject::with_mesh("near", SharedMesh::new(quad_mesh(1.0, 0.0)), Mat4::IDENTITY);
    let far = SceneObject::with_mesh("far", SharedMesh::new(quad_mesh(1.0, -1.0)), Mat4::IDENTITY);
    picker.register(near.clone(), Mat4::IDENTITY);
    let far_id = picker.register(far.clone(), Mat4::IDENTITY);
    let view = front_view();

    let first = picker.query(&view, center()).unwrap();
    assert_eq!(picker.id_range(far_id), None);
    let draws = picker.target().stats().draw_calls;
    let second = picker.query(&view, center()).unwrap();

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(picker.target().stats().draw_calls, draws);
    assert_eq!(picker.stats().reused_passes, 1);

    // Moving the skipped candidate still invalidates the readback.
    far.set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -0.5)));
    picker.query(&view, center()).unwrap();
    assert_eq!(picker.stats().passes, 2);
}

#[test]
fn lone_vertex_in_window_corner_is_found() {
    let options = SnapOptions::default().with_mode(SnapMode::new(true, false, false));
    let mut picker = picker(options);
    let mesh = SharedMesh::new(Mesh::new(vec![Vec3::ZERO], Vec::new()).unwrap());
    let object = SceneObject::with_mesh("vertex", mesh, Mat4::IDENTITY);
    let id = picker.register(object.clone(), Mat4::IDENTITY);
    let view = front_view();

    // The vertex sits on pixel (100, 100), eleven rings out along the diagonal.
    let cursor = center() - Vec2::new(10.5, 10.5);
    let hit = picker.query(&view, cursor).unwrap().expect("vertex in window corner");
    assert_eq!(hit.candidate, id);
    assert_eq!(hit.position, Vec3::ZERO);
    assert_eq!(hit.pixel, UVec2::new(100, 100));
}

#[test]
fn camera_move_forces_redraw() {
    let mut picker = picker(SnapOptions::default());
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.0, 0.0)), Mat4::IDENTITY);
    picker.register(quad.clone(), Mat4::IDENTITY);

    picker.query(&front_view(), center()).unwrap();
    let moved = ViewState::perspective(
        Vec3::new(0.2, 0.0, 5.0),
        Vec3::ZERO,
        std::f32::consts::FRAC_PI_4,
        UVec2::new(SIZE, SIZE),
    );
    picker.query(&moved, center()).unwrap();
    assert_eq!(picker.stats().passes, 2);
}

#[test]
fn id_ranges_partition_the_pass() {
    let mut picker = picker(SnapOptions::default());
    let mesh = SharedMesh::new(quad_mesh(0.5, 0.0));
    let objects: Vec<_> = (0..4)
        .map(|i| {
            let transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -(i as f32) * 0.5));
            SceneObject::with_mesh(format!("quad {i}"), mesh.clone(), transform)
        })
        .collect();
    let wire = SceneObject::with_mesh(
        "wire",
        SharedMesh::new(wire_mesh(Vec3::new(-0.3, 0.1, 0.5), Vec3::new(0.3, 0.1, 0.5))),
        Mat4::IDENTITY,
    );

    let mut ids: Vec<_> = objects
        .iter()
        .map(|o| picker.register(o.clone(), Mat4::IDENTITY))
        .collect();
    ids.push(picker.register(wire.clone(), Mat4::IDENTITY));

    picker.query(&front_view(), center()).unwrap();

    let mut ranges: Vec<IdRange> = ids.iter().filter_map(|&id| picker.id_range(id)).collect();
    assert_eq!(ranges.len(), ids.len());
    ranges.sort_by_key(|r| r.first);
    let mut expected_first = 0;
    for range in &ranges {
        assert_eq!(range.first, expected_first, "ranges must be contiguous and disjoint");
        assert!(range.count > 0);
        expected_first = range.end();
    }
    // Registration order is draw order.
    let in_order: Vec<_> = ids.iter().map(|&id| picker.id_range(id).unwrap().first).collect();
    assert!(in_order.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn face_hit_round_trips_to_cursor() {
    let options = SnapOptions::default().with_mode(SnapMode::faces());
    let mut picker = picker(options.clone());
    let tilted = Mat4::from_rotation_y(0.4) * Mat4::from_rotation_x(-0.3);
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.0, 0.0)), tilted);
    picker.register(quad.clone(), tilted);
    let view = front_view();

    for cursor in [center(), center() + Vec2::new(13.0, -7.0), center() + Vec2::new(-20.5, 18.25)] {
        let hit = picker.query(&view, cursor).unwrap().expect("face under cursor");
        assert_eq!(hit.kind, PrimitiveKind::Face);
        let screen = view.project_to_screen(hit.position).unwrap().truncate();
        assert!(
            screen.distance(cursor) <= options.pixel_threshold as f32,
            "reprojected {screen} too far from {cursor}"
        );
    }
}

#[test]
fn scenario_a_quad_center_face_only() {
    let mut picker = picker(SnapOptions::default().with_mode(SnapMode::faces()));
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.0, 0.0)), Mat4::IDENTITY);
    let id = picker.register(quad.clone(), Mat4::IDENTITY);

    let hit = picker.query(&front_view(), center()).unwrap().expect("face hit");
    assert_eq!(hit.candidate, id);
    assert_eq!(hit.kind, PrimitiveKind::Face);
    assert!(matches!(hit.elements, ElementIndices::Face { polygon: 0, .. }));
    assert!(hit.position.distance(Vec3::ZERO) < 1e-3, "got {}", hit.position);
}

#[test]
fn edge_near_endpoint_promotes_to_vertex() {
    let options = SnapOptions::default().with_mode(SnapMode::new(true, true, false));
    let mut picker = picker(options.clone());
    // A 2 unit edge spans ~96 px here, well over 4x the threshold.
    let wire = SceneObject::with_mesh(
        "wire",
        SharedMesh::new(wire_mesh(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0))),
        Mat4::IDENTITY,
    );
    picker.register(wire.clone(), Mat4::IDENTITY);
    let view = front_view();

    let end = view.project_to_screen(Vec3::new(1.0, 0.0, 0.0)).unwrap().truncate();
    let start = view.project_to_screen(Vec3::new(-1.0, 0.0, 0.0)).unwrap().truncate();
    assert!(end.distance(start) >= 4.0 * options.pixel_threshold as f32);

    let hit = picker
        .query(&view, end + Vec2::new(-0.5, 0.5))
        .unwrap()
        .expect("snap near endpoint");
    assert_eq!(hit.kind, PrimitiveKind::Vertex);
    assert_eq!(hit.rasterized_kind, PrimitiveKind::Edge);
    assert_eq!(hit.elements, ElementIndices::Vertex(1));
    assert_eq!(hit.position, Vec3::new(1.0, 0.0, 0.0));

    let middle = picker
        .query(&view, (start + end) * 0.5)
        .unwrap()
        .expect("snap at middle");
    assert_eq!(middle.kind, PrimitiveKind::Edge);
}

fn priority_scene(wire_first: bool) -> (SnapHit, CandidateId) {
    let mut picker = picker(SnapOptions::default());
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.5, 0.0)), Mat4::IDENTITY);
    // The wire floats in front of the quad, a few pixels above the cursor.
    let wire = SceneObject::with_mesh(
        "wire",
        SharedMesh::new(wire_mesh(Vec3::new(-0.4, 0.12, 0.5), Vec3::new(0.4, 0.12, 0.5))),
        Mat4::IDENTITY,
    );

    let wire_id = if wire_first {
        let id = picker.register(wire.clone(), Mat4::IDENTITY);
        picker.register(quad.clone(), Mat4::IDENTITY);
        id
    } else {
        picker.register(quad.clone(), Mat4::IDENTITY);
        picker.register(wire.clone(), Mat4::IDENTITY)
    };

    let hit = picker.query(&front_view(), center()).unwrap().expect("hit");
    (hit, wire_id)
}

#[test]
fn wire_beats_face_in_either_draw_order() {
    for wire_first in [false, true] {
        let (hit, wire_id) = priority_scene(wire_first);
        assert_eq!(hit.candidate, wire_id, "wire_first = {wire_first}");
        assert_ne!(hit.kind, PrimitiveKind::Face);
    }
}

#[test]
fn occluded_wire_is_not_snapped() {
    let mut picker = picker(SnapOptions::default());
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.5, 0.5)), Mat4::IDENTITY);
    let wire = SceneObject::with_mesh(
        "wire",
        SharedMesh::new(wire_mesh(Vec3::new(-0.4, 0.05, -0.5), Vec3::new(0.4, 0.05, -0.5))),
        Mat4::IDENTITY,
    );
    let quad_id = picker.register(quad.clone(), Mat4::IDENTITY);
    picker.register(wire.clone(), Mat4::IDENTITY);

    let hit = picker.query(&front_view(), center()).unwrap().expect("hit");
    assert_eq!(hit.candidate, quad_id);
    assert_eq!(hit.kind, PrimitiveKind::Face);
}

#[test]
fn scenario_b_shared_mesh_cache() {
    let mut picker = picker(SnapOptions::default());
    let mesh = SharedMesh::new(quad_mesh(1.0, 0.0));
    let a = SceneObject::with_mesh("a", mesh.clone(), Mat4::IDENTITY);
    let b = SceneObject::with_mesh("b", mesh.clone(), Mat4::from_translation(Vec3::new(0.0, 0.0, -1.0)));

    let id_a = picker.register(a.clone(), Mat4::IDENTITY);
    let id_b = picker.register(b.clone(), Mat4::IDENTITY);
    picker.query(&front_view(), center()).unwrap();

    assert_eq!(picker.cache_len(), 1);
    assert_eq!(picker.cache_ref_count(mesh.key()), 2);
    assert_eq!(picker.stats().cache_builds, 1);

    picker.unregister(id_a).unwrap();
    assert_eq!(picker.cache_len(), 1);
    assert_eq!(picker.cache_ref_count(mesh.key()), 1);

    picker.unregister(id_b).unwrap();
    assert_eq!(picker.cache_len(), 0);
    assert_eq!(picker.stats().cache_frees, 1);
}

#[test]
fn scenario_c_resize_reflects_new_dimensions() {
    let mut picker = picker(SnapOptions::default().with_mode(SnapMode::faces()));
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.0, 0.0)), Mat4::IDENTITY);
    picker.register(quad.clone(), Mat4::IDENTITY);

    let small = ViewState::perspective(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 0.8, UVec2::new(800, 600));
    let large = ViewState::perspective(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 0.8, UVec2::new(1600, 1200));

    let hit_small = picker.query(&small, Vec2::new(400.0, 300.0)).unwrap().unwrap();
    assert_eq!(picker.target().size(), UVec2::new(800, 600));

    // A pixel that does not exist in the old buffer.
    let corner = large.project_to_screen(Vec3::new(0.9, -0.9, 0.0)).unwrap().truncate();
    assert!(corner.x > 800.0);
    let hit_large = picker.query(&large, corner).unwrap().expect("hit on resized target");

    assert_eq!(picker.target().size(), UVec2::new(1600, 1200));
    assert_eq!(picker.target().stats().resizes, 2);
    assert!(hit_large.pixel.x > 800);
    assert!(hit_small.position.distance(Vec3::ZERO) < 1e-3);
    assert!(hit_large.position.distance(Vec3::new(0.9, -0.9, 0.0)) < 1e-2);
}

#[test]
fn scenario_d_moved_vertex_after_invalidate() {
    let options = SnapOptions::default().with_mode(SnapMode::new(true, false, false));
    let mut picker = picker(options);
    let mesh = SharedMesh::new(
        Mesh::new(vec![Vec3::ZERO], Vec::new()).unwrap(),
    );
    let object = SceneObject::with_mesh("vertex", mesh.clone(), Mat4::IDENTITY);
    let id = picker.register(object.clone(), Mat4::IDENTITY);
    let view = front_view();

    let before = picker.query(&view, center()).unwrap().expect("vertex");
    assert_eq!(before.position, Vec3::ZERO);

    mesh.modify(|data| data.set_position(0, Vec3::new(0.05, 0.0, 0.0))).unwrap();
    picker.invalidate(id).unwrap();

    let after = picker.query(&view, center()).unwrap().expect("moved vertex");
    assert_eq!(after.position, Vec3::new(0.05, 0.0, 0.0));
    assert_ne!(before.position, after.position);
}

#[test]
fn mesh_edit_is_picked_up_without_invalidate() {
    let mut picker = picker(SnapOptions::default().with_mode(SnapMode::new(true, false, false)));
    let mesh = SharedMesh::new(Mesh::new(vec![Vec3::ZERO], Vec::new()).unwrap());
    let object = SceneObject::with_mesh("vertex", mesh.clone(), Mat4::IDENTITY);
    picker.register(object.clone(), Mat4::IDENTITY);
    let view = front_view();

    picker.query(&view, center()).unwrap().unwrap();
    mesh.modify(|data| data.set_position(0, Vec3::new(0.0, 0.05, 0.0))).unwrap();
    let after = picker.query(&view, center()).unwrap().unwrap();
    assert_eq!(after.position, Vec3::new(0.0, 0.05, 0.0));
    assert_eq!(picker.stats().passes, 2);
}

#[test]
fn dropped_object_is_silently_removed() {
    let mut picker = picker(SnapOptions::default());
    let mesh = SharedMesh::new(quad_mesh(1.0, 0.0));
    let object = SceneObject::with_mesh("quad", mesh.clone(), Mat4::IDENTITY);
    picker.register(object.clone(), Mat4::IDENTITY);
    picker.query(&front_view(), center()).unwrap().unwrap();

    drop(object);
    let hit = picker.query(&front_view(), center()).unwrap();
    assert!(hit.is_none());
    assert_eq!(picker.candidate_count(), 0);
    assert_eq!(picker.cache_len(), 0);
    assert_eq!(picker.stats().stale_dropped, 1);
}

#[test]
fn id_exhaustion_draws_partial_pass() {
    let options = SnapOptions {
        max_primitive_ids: 3,
        ..SnapOptions::default().with_mode(SnapMode::faces())
    };
    let mut picker = picker(options);
    let near = SceneObject::with_mesh("near", SharedMesh::new(quad_mesh(1.0, 0.0)), Mat4::IDENTITY);
    let far = SceneObject::with_mesh("far", SharedMesh::new(quad_mesh(1.0, -1.0)), Mat4::IDENTITY);
    let near_id = picker.register(near.clone(), Mat4::IDENTITY);
    let far_id = picker.register(far.clone(), Mat4::IDENTITY);

    let hit = picker.query(&front_view(), center()).unwrap().expect("partial result");
    assert_eq!(hit.candidate, near_id);
    assert_eq!(picker.id_range(near_id), Some(IdRange { first: 0, count: 2 }));
    assert_eq!(picker.id_range(far_id), None);
}

#[test]
fn point_placeholder_for_meshless_objects() {
    let mut picker = picker(SnapOptions::default());
    let origin = Vec3::new(0.1, -0.1, 0.0);
    let empty = SceneObject::empty("light", Mat4::from_translation(origin));
    let id = picker.register(empty.clone(), Mat4::from_translation(origin));

    let view = front_view();
    let near = view.project_to_screen(origin).unwrap().truncate() + Vec2::new(3.0, 0.0);
    let hit = picker.query(&view, near).unwrap().expect("origin snap");
    assert_eq!(hit.candidate, id);
    assert_eq!(hit.kind, PrimitiveKind::Vertex);
    assert!(hit.position.distance(origin) < 1e-6);

    let far = near + Vec2::new(40.0, 0.0);
    assert!(picker.query(&view, far).unwrap().is_none());
}

#[test]
fn mode_change_rebuilds_caches() {
    let mut picker = picker(SnapOptions::default());
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.0, 0.0)), Mat4::IDENTITY);
    picker.register(quad.clone(), Mat4::IDENTITY);

    picker.query(&front_view(), center()).unwrap();
    picker.set_mode(SnapMode::faces());
    let hit = picker.query(&front_view(), center()).unwrap().unwrap();

    assert_eq!(hit.kind, PrimitiveKind::Face);
    assert_eq!(picker.stats().cache_builds, 2);
    assert_eq!(picker.stats().passes, 2);
}

#[test]
fn active_candidate_wins_coplanar_tie() {
    let mut picker = picker(SnapOptions::default().with_mode(SnapMode::faces()));
    let mesh = SharedMesh::new(quad_mesh(1.0, 0.0));
    let a = SceneObject::with_mesh("a", mesh.clone(), Mat4::IDENTITY);
    let b = SceneObject::with_mesh("b", mesh.clone(), Mat4::IDENTITY);
    let id_a = picker.register(a.clone(), Mat4::IDENTITY);
    let id_b = picker.register(b.clone(), Mat4::IDENTITY);

    let first = picker.query(&front_view(), center()).unwrap().unwrap();
    assert_eq!(first.candidate, id_a);

    picker.set_active(Some(id_b));
    let second = picker.query(&front_view(), center()).unwrap().unwrap();
    assert_eq!(second.candidate, id_b);
}

#[test]
fn clip_plane_hides_geometry() {
    let mut picker = picker(SnapOptions::default().with_mode(SnapMode::faces()));
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.0, 0.0)), Mat4::IDENTITY);
    picker.register(quad.clone(), Mat4::IDENTITY);

    // Keep only x >= 0.5.
    let view = front_view().with_clip_plane(Vec4::new(1.0, 0.0, 0.0, -0.5));
    assert!(picker.query(&view, center()).unwrap().is_none());

    let kept = view.project_to_screen(Vec3::new(0.75, 0.0, 0.0)).unwrap().truncate();
    assert!(picker.query(&view, kept).unwrap().is_some());
}

#[test]
fn hidden_vertices_are_not_snapped() {
    let mut edit = EditMesh::from_mesh(Mesh::new(vec![Vec3::ZERO], Vec::new()).unwrap());
    edit.set_hidden(0, true).unwrap();
    let mesh = SharedMesh::new(edit);
    let object = SceneObject::with_mesh("hidden", mesh, Mat4::IDENTITY);

    let mut picker = picker(SnapOptions::default());
    picker.register(object.clone(), Mat4::IDENTITY);
    assert!(picker.query(&front_view(), center()).unwrap().is_none());
}

#[test]
fn options_round_trip_through_json() {
    let options = SnapOptions::default().with_pixel_threshold(20);
    let json = options.to_json_string().unwrap();
    let parsed = SnapOptions::from_json_str(&json).unwrap();
    assert_eq!(parsed, options);
    let picker = picker(parsed);
    assert_eq!(picker.options().pixel_threshold, 20);
}

#[test]
fn unregistered_candidate_is_not_drawn() {
    let mut picker = picker(SnapOptions::default());
    let quad = SceneObject::with_mesh("quad", SharedMesh::new(quad_mesh(1.0, 0.0)), Mat4::IDENTITY);
    let id = picker.register(quad.clone(), Mat4::IDENTITY);
    picker.query(&front_view(), center()).unwrap().unwrap();
    picker.unregister(id).unwrap();
    assert!(picker.query(&front_view(), center()).unwrap().is_none());
    let _keep_alive: Arc<SceneObject> = quad;
}
