//! Square spiral search over the id buffer.

use snapscope_core::pick::pixel_to_id;
use snapscope_core::{PrimitiveKind, UVec2};
use snapscope_render::IdBuffer;

/// Offsets of Chebyshev ring `ring` around the origin, clockwise from the
/// top-left corner. Ring 0 is the origin alone; ring `r > 0` has `8r`
/// offsets.
pub fn ring_offsets(ring: i64) -> impl Iterator<Item = (i64, i64)> {
    let side = 2 * ring;
    let top = (0..side).map(move |i| (-ring + i, -ring));
    let right = (0..side).map(move |i| (ring, -ring + i));
    let bottom = (0..side).map(move |i| (ring - i, ring));
    let left = (0..side).map(move |i| (-ring, ring - i));
    let center = (ring == 0).then_some((0, 0));
    center.into_iter().chain(top).chain(right).chain(bottom).chain(left)
}

/// The id picked by a spiral search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiralHit {
    /// Primitive id (not the buffer value).
    pub id: u32,
    /// Kind of the primitive as rasterized.
    pub kind: PrimitiveKind,
    /// Pixel the id was read from.
    pub pixel: UVec2,
}

/// Scans rings `0..=radius` around `center` for the nearest id.
///
/// With `prefer_wire` set, a face does not end the search: scanning goes on
/// for an edge or vertex and falls back to the first face found. Ids for
/// which `classify` returns `None` are skipped.
pub fn spiral_search(
    ids: &IdBuffer,
    center: (i64, i64),
    radius: u32,
    prefer_wire: bool,
    classify: impl Fn(u32) -> Option<PrimitiveKind>,
) -> Option<SpiralHit> {
    let mut fallback = None;

    for ring in 0..=i64::from(radius) {
        for (dx, dy) in ring_offsets(ring) {
            let (x, y) = (center.0 + dx, center.1 + dy);
            let Some(id) = ids.get(x, y).and_then(pixel_to_id) else {
                continue;
            };
            let Some(kind) = classify(id) else {
                continue;
            };
            let hit = SpiralHit {
                id,
                kind,
                pixel: UVec2::new(x as u32, y as u32),
            };
            if !prefer_wire || kind != PrimitiveKind::Face {
                return Some(hit);
            }
            fallback.get_or_insert(hit);
        }
    }

    fallback
}
