//! Area marking and walkable-surface erosion
//!
//! Markers mutate `areas[]` in place; erosion runs the half-scale Chamfer
//! transform over the span graph and clears everything closer to a boundary
//! than the agent radius.

use glam::Vec3;
use navgrid_common::Result;

use crate::compact::{dir_offset_x, dir_offset_y, CompactHeightfield};
use crate::NULL_AREA;

const EPSILON: f32 = 1e-6;

/// Sorts a small byte buffer in place
fn insert_sort(data: &mut [u8]) {
    for i in 1..data.len() {
        let value = data[i];
        let mut j = i as i32 - 1;
        while j >= 0 && data[j as usize] > value {
            data[j as usize + 1] = data[j as usize];
            j -= 1;
        }
        data[(j + 1) as usize] = value;
    }
}

/// Horizontal-ray crossing count point-in-polygon test on the xz plane
fn point_in_poly(verts: &[Vec3], point: Vec3) -> bool {
    let mut inside = false;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let vi = verts[i];
        let vj = verts[j];
        if (vi.z > point.z) != (vj.z > point.z)
            && point.x < (vj.x - vi.x) * (point.z - vi.z) / (vj.z - vi.z) + vi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Marks every walkable span whose cell lies inside the box as `area_id`.
pub fn mark_box_area(
    chf: &mut CompactHeightfield,
    bmin: Vec3,
    bmax: Vec3,
    area_id: u8,
) -> Result<()> {
    let w = chf.width;
    let h = chf.height;

    let min_x = ((bmin.x - chf.bmin.x) / chf.cs) as i32;
    let min_y = ((bmin.y - chf.bmin.y) / chf.ch) as i32;
    let min_z = ((bmin.z - chf.bmin.z) / chf.cs) as i32;
    let max_x = ((bmax.x - chf.bmin.x) / chf.cs) as i32;
    let max_y = ((bmax.y - chf.bmin.y) / chf.ch) as i32;
    let max_z = ((bmax.z - chf.bmin.z) / chf.cs) as i32;

    if max_x < 0 || min_x >= w || max_z < 0 || min_z >= h {
        return Ok(());
    }
    let min_x = min_x.max(0);
    let max_x = max_x.min(w - 1);
    let min_z = min_z.max(0);
    let max_z = max_z.min(h - 1);

    for z in min_z..=max_z {
        for x in min_x..=max_x {
            let cell = chf.cells[(x + z * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if chf.areas[i] == NULL_AREA {
                    continue;
                }
                let y = chf.spans[i].y as i32;
                if y >= min_y && y <= max_y {
                    chf.areas[i] = area_id;
                }
            }
        }
    }
    Ok(())
}

/// Marks walkable spans whose cell centre lies inside the convex polygon
/// footprint, between `hmin` and `hmax`, as `area_id`.
pub fn mark_convex_poly_area(
    chf: &mut CompactHeightfield,
    verts: &[Vec3],
    hmin: f32,
    hmax: f32,
    area_id: u8,
) -> Result<()> {
    let w = chf.width;
    let h = chf.height;

    let mut bmin = verts[0];
    let mut bmax = verts[0];
    for &v in &verts[1..] {
        bmin = bmin.min(v);
        bmax = bmax.max(v);
    }
    bmin.y = hmin;
    bmax.y = hmax;

    let min_x = ((bmin.x - chf.bmin.x) / chf.cs) as i32;
    let min_y = ((bmin.y - chf.bmin.y) / chf.ch) as i32;
    let min_z = ((bmin.z - chf.bmin.z) / chf.cs) as i32;
    let max_x = ((bmax.x - chf.bmin.x) / chf.cs) as i32;
    let max_y = ((bmax.y - chf.bmin.y) / chf.ch) as i32;
    let max_z = ((bmax.z - chf.bmin.z) / chf.cs) as i32;

    if max_x < 0 || min_x >= w || max_z < 0 || min_z >= h {
        return Ok(());
    }
    let min_x = min_x.max(0);
    let max_x = max_x.min(w - 1);
    let min_z = min_z.max(0);
    let max_z = max_z.min(h - 1);

    for z in min_z..=max_z {
        for x in min_x..=max_x {
            let cell = chf.cells[(x + z * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if chf.areas[i] == NULL_AREA {
                    continue;
                }
                let y = chf.spans[i].y as i32;
                if y < min_y || y > max_y {
                    continue;
                }
                let point = Vec3::new(
                    chf.bmin.x + (x as f32 + 0.5) * chf.cs,
                    0.0,
                    chf.bmin.z + (z as f32 + 0.5) * chf.cs,
                );
                if point_in_poly(verts, point) {
                    chf.areas[i] = area_id;
                }
            }
        }
    }
    Ok(())
}

/// Marks walkable spans inside the vertical cylinder as `area_id`.
pub fn mark_cylinder_area(
    chf: &mut CompactHeightfield,
    position: Vec3,
    radius: f32,
    height: f32,
    area_id: u8,
) -> Result<()> {
    let w = chf.width;
    let h = chf.height;

    let bmin = Vec3::new(position.x - radius, position.y, position.z - radius);
    let bmax = Vec3::new(position.x + radius, position.y + height, position.z + radius);

    let min_x = ((bmin.x - chf.bmin.x) / chf.cs) as i32;
    let min_y = ((bmin.y - chf.bmin.y) / chf.ch) as i32;
    let min_z = ((bmin.z - chf.bmin.z) / chf.cs) as i32;
    let max_x = ((bmax.x - chf.bmin.x) / chf.cs) as i32;
    let max_y = ((bmax.y - chf.bmin.y) / chf.ch) as i32;
    let max_z = ((bmax.z - chf.bmin.z) / chf.cs) as i32;

    if max_x < 0 || min_x >= w || max_z < 0 || min_z >= h {
        return Ok(());
    }
    let min_x = min_x.max(0);
    let max_x = max_x.min(w - 1);
    let min_z = min_z.max(0);
    let max_z = max_z.min(h - 1);

    let radius_sq = radius * radius;

    for z in min_z..=max_z {
        for x in min_x..=max_x {
            let cell_x = chf.bmin.x + (x as f32 + 0.5) * chf.cs;
            let cell_z = chf.bmin.z + (z as f32 + 0.5) * chf.cs;
            let dx = cell_x - position.x;
            let dz = cell_z - position.z;
            if dx * dx + dz * dz >= radius_sq {
                continue;
            }

            let cell = chf.cells[(x + z * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if chf.areas[i] == NULL_AREA {
                    continue;
                }
                let y = chf.spans[i].y as i32;
                if y >= min_y && y <= max_y {
                    chf.areas[i] = area_id;
                }
            }
        }
    }
    Ok(())
}

/// Offsets a convex polygon outward on the xz plane by `offset`.
///
/// Convex corners whose miter would stretch past 1.2x the offset are capped
/// with two bevel vertices. Returns the number of vertices written, or 0 if
/// `max_out` would be exceeded.
pub fn offset_poly(verts: &[Vec3], offset: f32, out: &mut Vec<Vec3>, max_out: usize) -> usize {
    const MITER_LIMIT: f32 = 1.20;

    out.clear();
    let n = verts.len();

    for b in 0..n {
        let va = verts[(b + n - 1) % n];
        let vb = verts[b];
        let vc = verts[(b + 1) % n];

        let mut dir0 = vb - va;
        dir0.y = 0.0;
        let dir0 = dir0.normalize_or_zero();
        let mut dir1 = vc - vb;
        dir1.y = 0.0;
        let dir1 = dir1.normalize_or_zero();

        let cross = dir1.x * dir0.z - dir0.x * dir1.z;

        // CCW edge normals
        let n0 = Vec3::new(-dir0.z, 0.0, dir0.x);
        let n1 = Vec3::new(-dir1.z, 0.0, dir1.x);

        let mut miter = (n0 + n1) * 0.5;
        let miter_sq = miter.x * miter.x + miter.z * miter.z;
        let bevel = miter_sq * MITER_LIMIT * MITER_LIMIT < 1.0;
        if miter_sq > EPSILON {
            miter *= 1.0 / miter_sq;
        }

        if bevel && cross < 0.0 {
            if out.len() + 2 > max_out {
                out.clear();
                return 0;
            }
            let d = (1.0 - (dir0.x * dir1.x + dir0.z * dir1.z)) * 0.5;
            out.push(Vec3::new(
                vb.x + (-n0.x + dir0.x * d) * offset,
                vb.y,
                vb.z + (-n0.z + dir0.z * d) * offset,
            ));
            out.push(Vec3::new(
                vb.x + (-n1.x - dir1.x * d) * offset,
                vb.y,
                vb.z + (-n1.z - dir1.z * d) * offset,
            ));
        } else {
            if out.len() + 1 > max_out {
                out.clear();
                return 0;
            }
            out.push(Vec3::new(
                vb.x - miter.x * offset,
                vb.y,
                vb.z - miter.z * offset,
            ));
        }
    }

    out.len()
}

/// Computes the half-scale Chamfer distance to the nearest boundary for every
/// span, stored as a saturating byte (axis step 2, diagonal step 3).
fn boundary_distances(chf: &CompactHeightfield) -> Vec<u8> {
    let w = chf.width;
    let h = chf.height;
    let mut dist = vec![0xffu8; chf.span_count()];

    // Boundary seeds: unwalkable spans and spans missing a walkable
    // neighbour in any cardinal direction
    for y in 0..h {
        for x in 0..w {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if chf.areas[i] == NULL_AREA {
                    dist[i] = 0;
                    continue;
                }
                let mut connected = 0;
                for dir in 0..4 {
                    match chf.con_index(x, y, i, dir) {
                        Some(ni) if chf.areas[ni] != NULL_AREA => connected += 1,
                        _ => {}
                    }
                }
                if connected != 4 {
                    dist[i] = 0;
                }
            }
        }
    }

    // Forward pass: (-1,0) then its (0,-1) diagonal, (0,-1) then its (1,0)
    // diagonal. The diagonal is reached through the concrete neighbour so
    // holes block diagonal propagation.
    for y in 0..h {
        for x in 0..w {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if let Some(ai) = chf.con_index(x, y, i, 0) {
                    let nd = dist[ai].saturating_add(2);
                    if nd < dist[i] {
                        dist[i] = nd;
                    }
                    let ax = x + dir_offset_x(0);
                    let ay = y + dir_offset_y(0);
                    if let Some(aai) = chf.con_index(ax, ay, ai, 3) {
                        let nd = dist[aai].saturating_add(3);
                        if nd < dist[i] {
                            dist[i] = nd;
                        }
                    }
                }
                if let Some(ai) = chf.con_index(x, y, i, 3) {
                    let nd = dist[ai].saturating_add(2);
                    if nd < dist[i] {
                        dist[i] = nd;
                    }
                    let ax = x + dir_offset_x(3);
                    let ay = y + dir_offset_y(3);
                    if let Some(aai) = chf.con_index(ax, ay, ai, 2) {
                        let nd = dist[aai].saturating_add(3);
                        if nd < dist[i] {
                            dist[i] = nd;
                        }
                    }
                }
            }
        }
    }

    // Backward pass: (1,0) with (0,1) diagonal, (0,1) with (-1,0) diagonal
    for y in (0..h).rev() {
        for x in (0..w).rev() {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if let Some(ai) = chf.con_index(x, y, i, 2) {
                    let nd = dist[ai].saturating_add(2);
                    if nd < dist[i] {
                        dist[i] = nd;
                    }
                    let ax = x + dir_offset_x(2);
                    let ay = y + dir_offset_y(2);
                    if let Some(aai) = chf.con_index(ax, ay, ai, 1) {
                        let nd = dist[aai].saturating_add(3);
                        if nd < dist[i] {
                            dist[i] = nd;
                        }
                    }
                }
                if let Some(ai) = chf.con_index(x, y, i, 1) {
                    let nd = dist[ai].saturating_add(2);
                    if nd < dist[i] {
                        dist[i] = nd;
                    }
                    let ax = x + dir_offset_x(1);
                    let ay = y + dir_offset_y(1);
                    if let Some(aai) = chf.con_index(ax, ay, ai, 0) {
                        let nd = dist[aai].saturating_add(3);
                        if nd < dist[i] {
                            dist[i] = nd;
                        }
                    }
                }
            }
        }
    }

    dist
}

/// Clears the area of every walkable span within `radius` grid cells of a
/// boundary, shrinking the walkable surface by the agent radius.
pub fn erode_walkable_area(chf: &mut CompactHeightfield, radius: i32) -> Result<()> {
    let dist = boundary_distances(chf);
    // The threshold is a byte like the stored distances; oversized radii wrap
    let min_boundary_dist = (radius * 2) as u8;
    for (i, &d) in dist.iter().enumerate() {
        if d < min_boundary_dist {
            chf.areas[i] = NULL_AREA;
        }
    }
    Ok(())
}

/// Replaces each walkable span's area with the median of its 3x3
/// neighbourhood, cleaning up speckled area assignments.
///
/// Missing or unwalkable neighbours contribute the centre value; all writes
/// are double-buffered so every sample reads pre-filter state.
pub fn median_filter_walkable_area(chf: &mut CompactHeightfield) -> Result<()> {
    let w = chf.width;
    let h = chf.height;
    let mut filtered = vec![0xffu8; chf.span_count()];

    for y in 0..h {
        for x in 0..w {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if chf.areas[i] == NULL_AREA {
                    filtered[i] = chf.areas[i];
                    continue;
                }

                let mut samples = [chf.areas[i]; 9];
                for dir in 0..4 {
                    if let Some(ai) = chf.con_index(x, y, i, dir) {
                        if chf.areas[ai] != NULL_AREA {
                            samples[dir * 2] = chf.areas[ai];
                        }
                        let dir2 = (dir + 1) & 0x3;
                        let ax = x + dir_offset_x(dir);
                        let ay = y + dir_offset_y(dir);
                        if let Some(ai2) = chf.con_index(ax, ay, ai, dir2) {
                            if chf.areas[ai2] != NULL_AREA {
                                samples[dir * 2 + 1] = chf.areas[ai2];
                            }
                        }
                    }
                }
                insert_sort(&mut samples);
                filtered[i] = samples[4];
            }
        }
    }

    chf.areas.copy_from_slice(&filtered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::Heightfield;
    use crate::WALKABLE_AREA;

    fn plate(size: i32) -> CompactHeightfield {
        let mut hf = Heightfield::new(
            size,
            size,
            Vec3::ZERO,
            Vec3::new(size as f32, 4.0, size as f32),
            1.0,
            1.0,
        );
        for z in 0..size {
            for x in 0..size {
                hf.add_span(x, z, 0, 1, WALKABLE_AREA, 1).unwrap();
            }
        }
        CompactHeightfield::from_heightfield(&hf, 2, 1).unwrap()
    }

    fn walkable_cells(chf: &CompactHeightfield) -> Vec<(i32, i32)> {
        let mut cells = Vec::new();
        for y in 0..chf.height {
            for x in 0..chf.width {
                let cell = chf.cells[(x + y * chf.width) as usize];
                for i in cell.index..cell.index + cell.count {
                    if chf.areas[i as usize] != NULL_AREA {
                        cells.push((x, y));
                    }
                }
            }
        }
        cells
    }

    #[test]
    fn test_insert_sort() {
        let mut data = [5, 2, 8, 1, 9, 3, 7, 4, 6];
        insert_sort(&mut data);
        assert_eq!(data, [1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_point_in_poly() {
        let square = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 5.0),
            Vec3::new(0.0, 0.0, 5.0),
        ];
        assert!(point_in_poly(&square, Vec3::new(2.5, 0.0, 2.5)));
        assert!(!point_in_poly(&square, Vec3::new(6.0, 0.0, 3.0)));
    }

    #[test]
    fn test_mark_box_area() {
        let mut chf = plate(4);
        mark_box_area(
            &mut chf,
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.9, 2.0, 1.9),
            7,
        )
        .unwrap();
        let marked = chf.areas.iter().filter(|&&a| a == 7).count();
        assert_eq!(marked, 4);
    }

    #[test]
    fn test_mark_cylinder_area() {
        let mut chf = plate(5);
        mark_cylinder_area(&mut chf, Vec3::new(2.5, 0.0, 2.5), 1.2, 2.0, 9).unwrap();
        // Centre cell plus the four cardinal cell centres within 1.2
        let marked = chf.areas.iter().filter(|&&a| a == 9).count();
        assert_eq!(marked, 5);
    }

    #[test]
    fn test_mark_convex_poly_area() {
        let mut chf = plate(4);
        let poly = [
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(3.0, 0.0, 1.0),
            Vec3::new(3.0, 0.0, 3.0),
            Vec3::new(1.0, 0.0, 3.0),
        ];
        mark_convex_poly_area(&mut chf, &poly, 0.0, 2.0, 5).unwrap();
        let marked = chf.areas.iter().filter(|&&a| a == 5).count();
        assert_eq!(marked, 4);
    }

    #[test]
    fn test_erode_shrinks_plate() {
        let mut chf = plate(5);
        erode_walkable_area(&mut chf, 1).unwrap();
        let cells = walkable_cells(&chf);
        assert_eq!(cells.len(), 9);
        for (x, y) in cells {
            assert!((1..=3).contains(&x) && (1..=3).contains(&y));
        }
    }

    #[test]
    fn test_median_filter_uniform_field_unchanged() {
        let mut chf = plate(4);
        let before = chf.areas.clone();
        median_filter_walkable_area(&mut chf).unwrap();
        assert_eq!(chf.areas, before);
        // Running it twice changes nothing either
        median_filter_walkable_area(&mut chf).unwrap();
        assert_eq!(chf.areas, before);
    }

    #[test]
    fn test_median_filter_removes_speckle() {
        let mut chf = plate(5);
        // One odd-area span in the middle of a uniform plate
        let centre = chf.cells[(2 + 2 * 5) as usize].index as usize;
        chf.areas[centre] = 5;
        median_filter_walkable_area(&mut chf).unwrap();
        assert_eq!(chf.areas[centre], WALKABLE_AREA);
    }

    #[test]
    fn test_offset_poly_square() {
        let square = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        let mut out = Vec::new();
        let n = offset_poly(&square, 0.5, &mut out, 16);
        // Right-angle corners exceed the miter limit: every corner bevels
        assert_eq!(n, 8);
        for v in &out {
            assert!(v.x < 0.0 + 2.6 && v.x > -0.6);
        }
    }
}
