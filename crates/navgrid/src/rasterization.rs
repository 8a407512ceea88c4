//! Triangle rasterization into the sparse heightfield
//!
//! Triangles are clipped cell by cell: the triangle is treated as a convex
//! polygon and repeatedly sliced along row and column planes, so each cell
//! receives the exact vertical extent of its fragment.

use glam::Vec3;
use navgrid_common::{overlap_bounds, Result};

use crate::heightfield::{Heightfield, SPAN_MAX_HEIGHT};
use crate::{NULL_AREA, WALKABLE_AREA};

/// Axis selector for polygon splitting
#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Z,
}

impl Axis {
    fn component(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Z => v.z,
        }
    }
}

/// Assigns [`WALKABLE_AREA`] to triangles whose slope is at most
/// `walkable_slope_angle` degrees, [`NULL_AREA`] to the rest.
pub fn mark_walkable_triangles(walkable_slope_angle: f32, verts: &[f32], indices: &[i32]) -> Vec<u8> {
    let walkable_thr = walkable_slope_angle.to_radians().cos();
    let mut areas = vec![NULL_AREA; indices.len() / 3];
    for (i, tri) in indices.chunks_exact(3).enumerate() {
        let v0 = vertex(verts, tri[0] as usize);
        let v1 = vertex(verts, tri[1] as usize);
        let v2 = vertex(verts, tri[2] as usize);
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        if normal.y > walkable_thr {
            areas[i] = WALKABLE_AREA;
        }
    }
    areas
}

fn vertex(verts: &[f32], index: usize) -> Vec3 {
    Vec3::new(verts[index * 3], verts[index * 3 + 1], verts[index * 3 + 2])
}

/// Splits a convex polygon along an axis-aligned plane at `offset`.
///
/// `below` receives the part with `axis coordinate <= offset`, `above` the
/// rest; vertices lying on the plane go to both. Buffers must be able to
/// hold up to 7 vertices (a triangle gains one vertex per clip).
fn divide_poly(input: &[Vec3], below: &mut Vec<Vec3>, above: &mut Vec<Vec3>, offset: f32, axis: Axis) {
    below.clear();
    above.clear();

    let n = input.len();
    if n == 0 {
        return;
    }
    let mut d = [0.0f32; 7];
    for (i, &v) in input.iter().enumerate() {
        d[i] = offset - axis.component(v);
    }

    let mut j = n - 1;
    for i in 0..n {
        let same_side = (d[j] >= 0.0) == (d[i] >= 0.0);
        if !same_side {
            // Edge crosses the plane: both halves share the intersection
            let t = d[j] / (d[j] - d[i]);
            let p = input[j] + (input[i] - input[j]) * t;
            below.push(p);
            above.push(p);
            // Points on the plane were just added
            if d[i] > 0.0 {
                below.push(input[i]);
            } else if d[i] < 0.0 {
                above.push(input[i]);
            }
        } else {
            if d[i] >= 0.0 {
                below.push(input[i]);
                if d[i] != 0.0 {
                    j = i;
                    continue;
                }
            }
            above.push(input[i]);
        }
        j = i;
    }
}

fn rasterize_tri(
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    area: u8,
    hf: &mut Heightfield,
    flag_merge_thr: i32,
) -> Result<()> {
    let ics = 1.0 / hf.cs;
    let ich = 1.0 / hf.ch;
    let by = hf.bmax.y - hf.bmin.y;

    let tmin = v0.min(v1).min(v2);
    let tmax = v0.max(v1).max(v2);
    if !overlap_bounds(tmin, tmax, hf.bmin, hf.bmax) {
        return Ok(());
    }

    let h = hf.height;
    let w = hf.width;
    let z0 = (((tmin.z - hf.bmin.z) * ics) as i32).clamp(0, h - 1);
    let z1 = (((tmax.z - hf.bmin.z) * ics) as i32).clamp(0, h - 1);

    let mut poly: Vec<Vec3> = Vec::with_capacity(7);
    poly.extend([v0, v1, v2]);
    let mut row: Vec<Vec3> = Vec::with_capacity(7);
    let mut rest: Vec<Vec3> = Vec::with_capacity(7);
    let mut cell: Vec<Vec3> = Vec::with_capacity(7);
    let mut col_rest: Vec<Vec3> = Vec::with_capacity(7);

    for z in z0..=z1 {
        // Slice off one row; the remainder feeds the next iteration
        let row_plane = hf.bmin.z + (z + 1) as f32 * hf.cs;
        divide_poly(&poly, &mut row, &mut rest, row_plane, Axis::Z);
        std::mem::swap(&mut poly, &mut rest);
        if row.len() < 3 {
            continue;
        }

        let mut min_x = row[0].x;
        let mut max_x = row[0].x;
        for v in &row[1..] {
            min_x = min_x.min(v.x);
            max_x = max_x.max(v.x);
        }
        let x0 = (((min_x - hf.bmin.x) * ics) as i32).clamp(0, w - 1);
        let x1 = (((max_x - hf.bmin.x) * ics) as i32).clamp(0, w - 1);

        let mut row_poly = std::mem::take(&mut row);
        for x in x0..=x1 {
            let col_plane = hf.bmin.x + (x + 1) as f32 * hf.cs;
            divide_poly(&row_poly, &mut cell, &mut col_rest, col_plane, Axis::X);
            std::mem::swap(&mut row_poly, &mut col_rest);
            if cell.len() < 3 {
                continue;
            }

            let mut ymin = cell[0].y;
            let mut ymax = cell[0].y;
            for v in &cell[1..] {
                ymin = ymin.min(v.y);
                ymax = ymax.max(v.y);
            }
            let smin = ymin - hf.bmin.y;
            let smax = ymax - hf.bmin.y;
            // Fragment entirely outside the vertical range
            if smax < 0.0 || smin > by {
                continue;
            }
            let smin = smin.max(0.0);
            let smax = smax.min(by);

            let ismin = ((smin * ich).floor() as i32).clamp(0, SPAN_MAX_HEIGHT);
            let ismax = ((smax * ich).ceil() as i32)
                .min(SPAN_MAX_HEIGHT)
                .max(ismin + 1);

            hf.add_span(x, z, ismin as u16, ismax as u16, area, flag_merge_thr)?;
        }
        row = row_poly;
        row.clear();
    }

    Ok(())
}

/// Rasterizes a single triangle into the heightfield.
///
/// Triangles entirely outside the field bounds add nothing.
pub fn rasterize_triangle(
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    area: u8,
    hf: &mut Heightfield,
    flag_merge_thr: i32,
) -> Result<()> {
    rasterize_tri(v0, v1, v2, area, hf, flag_merge_thr)
}

/// Rasterizes indexed triangles, one area tag per triangle.
pub fn rasterize_triangles(
    verts: &[f32],
    indices: &[i32],
    areas: &[u8],
    hf: &mut Heightfield,
    flag_merge_thr: i32,
) -> Result<()> {
    for (i, tri) in indices.chunks_exact(3).enumerate() {
        rasterize_tri(
            vertex(verts, tri[0] as usize),
            vertex(verts, tri[1] as usize),
            vertex(verts, tri[2] as usize),
            areas[i],
            hf,
            flag_merge_thr,
        )?;
    }
    Ok(())
}

/// Rasterizes a triangle soup of sequential vertices, 9 floats per triangle.
pub fn rasterize_triangle_soup(
    verts: &[f32],
    areas: &[u8],
    hf: &mut Heightfield,
    flag_merge_thr: i32,
) -> Result<()> {
    for (i, tri) in verts.chunks_exact(9).enumerate() {
        rasterize_tri(
            Vec3::new(tri[0], tri[1], tri[2]),
            Vec3::new(tri[3], tri[4], tri[5]),
            Vec3::new(tri[6], tri[7], tri[8]),
            areas[i],
            hf,
            flag_merge_thr,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(w: i32, h: i32) -> Heightfield {
        Heightfield::new(
            w,
            h,
            Vec3::ZERO,
            Vec3::new(w as f32, 4.0, h as f32),
            1.0,
            1.0,
        )
    }

    #[test]
    fn test_divide_poly_splits_triangle() {
        let tri = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        let mut below = Vec::with_capacity(7);
        let mut above = Vec::with_capacity(7);
        divide_poly(&tri, &mut below, &mut above, 1.0, Axis::X);
        // Quad on the low side, triangle on the high side
        assert_eq!(below.len(), 4);
        assert_eq!(above.len(), 3);
        for v in &below {
            assert!(v.x <= 1.0 + 1e-6);
        }
        for v in &above {
            assert!(v.x >= 1.0 - 1e-6);
        }
    }

    #[test]
    fn test_divide_poly_no_crossing() {
        let tri = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let mut below = Vec::with_capacity(7);
        let mut above = Vec::with_capacity(7);
        divide_poly(&tri, &mut below, &mut above, 5.0, Axis::X);
        assert_eq!(below.len(), 3);
        assert!(above.is_empty());
    }

    #[test]
    fn test_rasterize_flat_quad_fills_cells() {
        let mut hf = field(4, 4);
        let a = Vec3::new(0.0, 0.5, 0.0);
        let b = Vec3::new(4.0, 0.5, 0.0);
        let c = Vec3::new(4.0, 0.5, 4.0);
        let d = Vec3::new(0.0, 0.5, 4.0);
        rasterize_triangle(a, b, c, WALKABLE_AREA, &mut hf, 1).unwrap();
        rasterize_triangle(a, c, d, WALKABLE_AREA, &mut hf, 1).unwrap();

        for z in 0..4 {
            for x in 0..4 {
                let spans: Vec<_> = hf.column(x, z).collect();
                assert_eq!(spans.len(), 1, "cell ({x}, {z})");
                assert_eq!((spans[0].smin, spans[0].smax), (0, 1));
                assert_eq!(spans[0].area, WALKABLE_AREA);
            }
        }
    }

    #[test]
    fn test_rasterize_triangle_outside_bounds() {
        let mut hf = field(4, 4);
        rasterize_triangle(
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::new(12.0, 0.0, 10.0),
            Vec3::new(10.0, 0.0, 12.0),
            WALKABLE_AREA,
            &mut hf,
            1,
        )
        .unwrap();
        assert_eq!(hf.span_count(), 0);
    }

    #[test]
    fn test_rasterize_is_deterministic() {
        let soup = [
            0.0, 0.2, 0.0, 3.5, 1.1, 0.3, 1.0, 0.9, 3.2, //
            1.0, 0.9, 3.2, 3.5, 1.1, 0.3, 3.8, 2.0, 3.9,
        ];
        let areas = [WALKABLE_AREA, WALKABLE_AREA];
        let mut a = field(4, 4);
        let mut b = field(4, 4);
        rasterize_triangle_soup(&soup, &areas, &mut a, 1).unwrap();
        rasterize_triangle_soup(&soup, &areas, &mut b, 1).unwrap();
        for z in 0..4 {
            for x in 0..4 {
                let sa: Vec<_> = a.column(x, z).map(|s| (s.smin, s.smax, s.area)).collect();
                let sb: Vec<_> = b.column(x, z).map(|s| (s.smin, s.smax, s.area)).collect();
                assert_eq!(sa, sb);
            }
        }
    }

    #[test]
    fn test_mark_walkable_triangles() {
        // One flat triangle, one vertical wall
        let verts = [
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, //
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0,
        ];
        let indices = [0, 2, 1, 3, 4, 5];
        let areas = mark_walkable_triangles(45.0, &verts, &indices);
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[1], NULL_AREA);
    }
}
