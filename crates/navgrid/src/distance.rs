//! Distance field over the compact span graph
//!
//! Two-pass Chamfer transform (axis step 2, diagonal step 3) seeded at area
//! boundaries, followed by a 3x3 box blur that preserves thin features.

use crate::compact::{dir_offset_x, dir_offset_y, CompactHeightfield};

/// Builds `chf.dist` and `chf.max_distance`.
///
/// A span seeds at distance 0 unless all four cardinal neighbours exist and
/// share its area. The reported maximum is taken before blurring, so region
/// seeding levels are unaffected by the smoothing.
pub fn build_distance_field(chf: &mut CompactHeightfield) {
    let (src, max_distance) = calculate_distance_field(chf);
    chf.dist = box_blur(chf, 1, &src);
    chf.max_distance = max_distance;
}

fn calculate_distance_field(chf: &CompactHeightfield) -> (Vec<u16>, u16) {
    let w = chf.width;
    let h = chf.height;
    let mut src = vec![0xffffu16; chf.span_count()];

    // Mark boundary spans
    for y in 0..h {
        for x in 0..w {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                let area = chf.areas[i];
                let mut same_area = 0;
                for dir in 0..4 {
                    if let Some(ai) = chf.con_index(x, y, i, dir) {
                        if chf.areas[ai] == area {
                            same_area += 1;
                        }
                    }
                }
                if same_area != 4 {
                    src[i] = 0;
                }
            }
        }
    }

    let relax = |src: &mut [u16], i: usize, ai: usize, step: u32| {
        let nd = src[ai] as u32 + step;
        if nd < src[i] as u32 {
            src[i] = nd as u16;
        }
    };

    // Forward pass
    for y in 0..h {
        for x in 0..w {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if let Some(ai) = chf.con_index(x, y, i, 0) {
                    relax(&mut src, i, ai, 2);
                    let ax = x + dir_offset_x(0);
                    let ay = y + dir_offset_y(0);
                    if let Some(aai) = chf.con_index(ax, ay, ai, 3) {
                        relax(&mut src, i, aai, 3);
                    }
                }
                if let Some(ai) = chf.con_index(x, y, i, 3) {
                    relax(&mut src, i, ai, 2);
                    let ax = x + dir_offset_x(3);
                    let ay = y + dir_offset_y(3);
                    if let Some(aai) = chf.con_index(ax, ay, ai, 2) {
                        relax(&mut src, i, aai, 3);
                    }
                }
            }
        }
    }

    // Backward pass
    for y in (0..h).rev() {
        for x in (0..w).rev() {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if let Some(ai) = chf.con_index(x, y, i, 2) {
                    relax(&mut src, i, ai, 2);
                    let ax = x + dir_offset_x(2);
                    let ay = y + dir_offset_y(2);
                    if let Some(aai) = chf.con_index(ax, ay, ai, 1) {
                        relax(&mut src, i, aai, 3);
                    }
                }
                if let Some(ai) = chf.con_index(x, y, i, 1) {
                    relax(&mut src, i, ai, 2);
                    let ax = x + dir_offset_x(1);
                    let ay = y + dir_offset_y(1);
                    if let Some(aai) = chf.con_index(ax, ay, ai, 0) {
                        relax(&mut src, i, aai, 3);
                    }
                }
            }
        }
    }

    let max_distance = src.iter().copied().max().unwrap_or(0);
    (src, max_distance)
}

fn box_blur(chf: &CompactHeightfield, thr: u16, src: &[u16]) -> Vec<u16> {
    let w = chf.width;
    let h = chf.height;
    let thr = thr * 2;
    let mut dst = vec![0u16; src.len()];

    for y in 0..h {
        for x in 0..w {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                let cd = src[i];
                // Values at or below the threshold pass through so thin
                // features keep their exact distances
                if cd <= thr {
                    dst[i] = cd;
                    continue;
                }

                let mut d = cd as i32;
                for dir in 0..4 {
                    if let Some(ai) = chf.con_index(x, y, i, dir) {
                        d += src[ai] as i32;
                        let dir2 = (dir + 1) & 0x3;
                        let ax = x + dir_offset_x(dir);
                        let ay = y + dir_offset_y(dir);
                        if let Some(ai2) = chf.con_index(ax, ay, ai, dir2) {
                            d += src[ai2] as i32;
                        } else {
                            d += cd as i32;
                        }
                    } else {
                        d += cd as i32 * 2;
                    }
                }
                dst[i] = ((d + 5) / 9) as u16;
            }
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::Heightfield;
    use crate::WALKABLE_AREA;
    use glam::Vec3;

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

    fn span_at(chf: &CompactHeightfield, x: i32, y: i32) -> usize {
        chf.cells[(x + y * chf.width) as usize].index as usize
    }

    #[test]
    fn test_plate_max_distance() {
        let mut chf = plate(5);
        build_distance_field(&mut chf);
        // Centre is two chamfer rings from the edge
        assert_eq!(chf.max_distance, 4);
        assert_eq!(chf.dist.len(), 25);
    }

    #[test]
    fn test_border_spans_are_zero() {
        let mut chf = plate(5);
        build_distance_field(&mut chf);
        for x in 0..5 {
            assert_eq!(chf.dist[span_at(&chf, x, 0)], 0);
            assert_eq!(chf.dist[span_at(&chf, x, 4)], 0);
        }
    }

    #[test]
    fn test_chamfer_monotonicity() {
        let mut chf = plate(7);
        build_distance_field(&mut chf);
        for y in 0..7 {
            for x in 0..7 {
                let i = span_at(&chf, x, y);
                for dir in 0..4 {
                    if let Some(j) = chf.con_index(x, y, i, dir) {
                        assert!(chf.dist[i] as i32 <= chf.dist[j] as i32 + 2);
                    }
                }
            }
        }
    }

    #[test]
    fn test_area_seam_seeds_zero() {
        let mut chf = plate(6);
        // Split the plate into two areas down the middle
        for y in 0..6 {
            for x in 3..6 {
                let i = span_at(&chf, x, y);
                chf.areas[i] = 5;
            }
        }
        build_distance_field(&mut chf);
        // Spans on both sides of the seam are boundaries
        for y in 0..6 {
            assert_eq!(chf.dist[span_at(&chf, 2, y)], 0);
            assert_eq!(chf.dist[span_at(&chf, 3, y)], 0);
        }
    }
}
