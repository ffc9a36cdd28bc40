#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
//! Demo sweeping a cursor across a small scene and logging snap results.
//!
//! Builds a grid of cubes sharing one mesh, a wire rail floating in front
//! of them and a meshless marker, then moves an orbiting camera around and
//! reports what the cursor snaps to. Runs on the software target so no GPU
//! is needed; pass `--gpu` to use a headless wgpu device instead.
//!
//! Run with `RUST_LOG=debug` to see cache and pass activity.

use std::sync::Arc;

use snapscope::{
    headless, Aabb, Camera, IdRenderTarget, Mat4, Mesh, Result, SceneObject, SharedMesh, SnapHit,
    SnapMode, SnapObject, SnapOptions, SoftwareTarget, SpiralPicker, UVec2, Vec2, Vec3,
    Vec4,
};

/// Unit cube with quad faces.
fn cube() -> Result<Mesh> {
    let positions = vec![
        Vec3::new(-0.5, -0.5, -0.5),
        Vec3::new(0.5, -0.5, -0.5),
        Vec3::new(0.5, 0.5, -0.5),
        Vec3::new(-0.5, 0.5, -0.5),
        Vec3::new(-0.5, -0.5, 0.5),
        Vec3::new(0.5, -0.5, 0.5),
        Vec3::new(0.5, 0.5, 0.5),
        Vec3::new(-0.5, 0.5, 0.5),
    ];
    let faces = vec![
        vec![0, 3, 2, 1],
        vec![4, 5, 6, 7],
        vec![0, 1, 5, 4],
        vec![2, 3, 7, 6],
        vec![1, 2, 6, 5],
        vec![0, 4, 7, 3],
    ];
    Mesh::new(positions, faces)
}

/// Polyline with no faces.
fn rail(points: usize) -> Result<Mesh> {
    let positions: Vec<Vec3> = (0..points)
        .map(|i| {
            let t = i as f32 / (points - 1) as f32;
            Vec3::new(-2.0 + 4.0 * t, 0.8 + 0.2 * (t * 6.0).sin(), 1.2)
        })
        .collect();
    let edges = (0..points as u32 - 1).map(|i| [i, i + 1]).collect();
    Mesh::new(positions, Vec::new())?.with_loose_edges(edges)
}

fn describe(hit: Option<&SnapHit>) -> String {
    match hit {
        Some(hit) => format!(
            "{:?} ({:?} rasterized) of {:?} at ({:.3}, {:.3}, {:.3})",
            hit.kind,
            hit.rasterized_kind,
            hit.candidate,
            hit.position.x,
            hit.position.y,
            hit.position.z
        ),
        None => "nothing".to_string(),
    }
}

fn sweep<T: IdRenderTarget>(picker: &mut SpiralPicker<T>, camera: &mut Camera) -> Result<()> {
    for step in 0..4 {
        let view = camera.view_state();
        let size = view.size;
        for i in 0..5 {
            let cursor = Vec2::new(
                size.x as f32 * (0.2 + 0.15 * i as f32),
                size.y as f32 * 0.45,
            );
            let hit = picker.query(&view, cursor)?;
            log::info!(
                "view {step} cursor ({:.0}, {:.0}): {}",
                cursor.x,
                cursor.y,
                describe(hit.as_ref())
            );
        }
        camera.orbit(0.35, 0.05);
    }
    Ok(())
}

fn run<T: IdRenderTarget>(mut picker: SpiralPicker<T>) -> Result<()> {
    let cube_mesh = SharedMesh::new(cube()?);
    let mut objects: Vec<Arc<SceneObject>> = Vec::new();
    for x in -1..=1 {
        for y in -1..=1 {
            let transform = Mat4::from_translation(Vec3::new(x as f32 * 1.5, y as f32 * 1.5, 0.0));
            objects.push(SceneObject::with_mesh(
                format!("cube {x},{y}"),
                cube_mesh.clone(),
                transform,
            ));
        }
    }
    objects.push(SceneObject::with_mesh(
        "rail",
        SharedMesh::new(rail(12)?),
        Mat4::IDENTITY,
    ));
    objects.push(SceneObject::empty(
        "marker",
        Mat4::from_translation(Vec3::new(0.75, -0.75, 1.0)),
    ));

    for object in &objects {
        picker.register(object.clone(), object.world_matrix());
    }

    let mut camera = Camera::new(UVec2::new(960, 540));
    camera.look_at_box(&Aabb {
        min: Vec3::new(-2.5, -2.5, -0.5),
        max: Vec3::new(2.5, 2.5, 1.5),
    });

    sweep(&mut picker, &mut camera)?;

    log::info!("faces only");
    picker.set_mode(SnapMode::faces());
    sweep(&mut picker, &mut camera)?;

    log::info!("moving a shared cube corner");
    cube_mesh.modify(|data| data.set_position(6, Vec3::new(0.8, 0.8, 0.8)))?;
    picker.set_mode(SnapMode::ALL);
    sweep(&mut picker, &mut camera)?;

    log::info!("window resized and zoomed in");
    camera.set_viewport_size(UVec2::new(1280, 720));
    camera.zoom(2.0);
    sweep(&mut picker, &mut camera)?;

    log::info!("clipping away x < 0");
    camera.add_clip_plane(Vec4::new(1.0, 0.0, 0.0, 0.0));
    sweep(&mut picker, &mut camera)?;

    log::info!(
        "{} candidates, {} cache entries, stats {:?}",
        picker.candidate_count(),
        picker.cache_len(),
        picker.stats()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = SnapOptions::default().with_pixel_threshold(10);
    if std::env::args().any(|arg| arg == "--gpu") {
        run(headless::gpu_picker(options, 960, 540)?)
    } else {
        run(SpiralPicker::new(SoftwareTarget::new(960, 540)?, options)?)
    }
}
