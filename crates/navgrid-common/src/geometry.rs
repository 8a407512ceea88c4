//! Bounds and grid sizing helpers

use glam::Vec3;

/// Computes the axis-aligned bounding box of a flat vertex array.
///
/// Returns `(Vec3::ZERO, Vec3::ZERO)` for an empty array.
pub fn calc_bounds(verts: &[f32]) -> (Vec3, Vec3) {
    if verts.len() < 3 {
        return (Vec3::ZERO, Vec3::ZERO);
    }
    let mut bmin = Vec3::new(verts[0], verts[1], verts[2]);
    let mut bmax = bmin;
    for v in verts.chunks_exact(3).skip(1) {
        let p = Vec3::new(v[0], v[1], v[2]);
        bmin = bmin.min(p);
        bmax = bmax.max(p);
    }
    (bmin, bmax)
}

/// Computes the grid width and height covering `[bmin, bmax]` at cell size `cs`.
pub fn calc_grid_size(bmin: Vec3, bmax: Vec3, cs: f32) -> (i32, i32) {
    let w = ((bmax.x - bmin.x) / cs).ceil() as i32;
    let h = ((bmax.z - bmin.z) / cs).ceil() as i32;
    (w.max(1), h.max(1))
}

/// Checks whether two axis-aligned bounding boxes overlap.
pub fn overlap_bounds(amin: Vec3, amax: Vec3, bmin: Vec3, bmax: Vec3) -> bool {
    amin.x <= bmax.x
        && amax.x >= bmin.x
        && amin.y <= bmax.y
        && amax.y >= bmin.y
        && amin.z <= bmax.z
        && amax.z >= bmin.z
}
