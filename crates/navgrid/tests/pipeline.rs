//! End-to-end pipeline scenarios

use glam::Vec3;
use navgrid::{
    build_contours, build_distance_field, build_regions, erode_walkable_area, rasterize_triangle,
    BuildConfig, BuildContext, CompactHeightfield, ContourBuildFlags, GridBuilder, Heightfield,
    NULL_AREA, WALKABLE_AREA,
};

fn signed_area(verts: &[(i32, i32)]) -> i64 {
    let n = verts.len();
    let mut area = 0i64;
    let mut j = n - 1;
    for i in 0..n {
        area += verts[i].0 as i64 * verts[j].1 as i64 - verts[j].0 as i64 * verts[i].1 as i64;
        j = i;
    }
    (area + 1) / 2
}

/// A flat quad rasterized over a 4x4 grid becomes one span per cell, one
/// region and a 4-vertex contour.
#[test]
fn flat_quad_single_region() {
    let mut hf = Heightfield::new(4, 4, Vec3::ZERO, Vec3::new(4.0, 2.0, 4.0), 1.0, 1.0);
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
        }
    }

    let mut chf = CompactHeightfield::from_heightfield(&hf, 2, 1).unwrap();
    build_regions(&mut chf, 0, 1, 0).unwrap();

    let regions: Vec<u16> = chf.spans.iter().map(|s| s.reg).collect();
    assert_eq!(regions.len(), 16);
    assert!(regions.iter().all(|&r| r == 1));

    let cset = build_contours(&chf, 0.5, 0, ContourBuildFlags::default()).unwrap();
    assert_eq!(cset.contours.len(), 1);
    let contour = &cset.contours[0];
    assert_eq!(contour.verts.len(), 4);

    let mut corners: Vec<(i32, i32)> = contour.verts.iter().map(|v| (v.x, v.z)).collect();
    assert!(signed_area(&corners) > 0, "outline must be counter-clockwise");
    corners.sort_unstable();
    assert_eq!(corners, vec![(0, 0), (0, 4), (4, 0), (4, 4)]);
}

/// Two triangles meeting at a ridge form a tent with peak height 2.0; every
/// column's span interpolates the surface, so all nine tops are distinct.
#[test]
fn tent_ridge_interpolates_distinct_heights() {
    let mut hf = Heightfield::new(3, 3, Vec3::ZERO, Vec3::new(3.0, 4.0, 3.0), 1.0, 0.1);
    // Ridge along the diagonal from the origin up to the 2.0 peak; the two
    // eave corners sit at different heights so no two columns match
    let p0 = Vec3::new(0.0, 0.0, 0.0);
    let p1 = Vec3::new(3.0, 0.9, 0.0);
    let p2 = Vec3::new(3.0, 2.0, 3.0);
    let p3 = Vec3::new(0.0, 0.6, 3.0);
    rasterize_triangle(p0, p1, p2, WALKABLE_AREA, &mut hf, 1).unwrap();
    rasterize_triangle(p0, p2, p3, WALKABLE_AREA, &mut hf, 1).unwrap();

    assert_eq!(hf.span_count(), 9);
    let mut tops = Vec::new();
    for z in 0..3 {
        for x in 0..3 {
            let spans: Vec<_> = hf.column(x, z).collect();
            assert_eq!(spans.len(), 1, "cell ({x}, {z})");
            assert!(spans[0].smin < spans[0].smax);
            tops.push(spans[0].smax);
        }
    }

    // The cell holding the ridge foot starts at the floor, the cell under
    // the peak reaches the full 2.0
    assert_eq!(hf.column(0, 0).next().unwrap().smin, 0);
    assert_eq!(hf.column(2, 2).next().unwrap().smax, 20);

    tops.sort_unstable();
    tops.dedup();
    assert_eq!(tops.len(), 9, "column tops must be pairwise distinct");
}

/// Eroding a 10x10 plate by radius 2 leaves the central 6x6 walkable, and
/// the remaining surface keeps at least two chamfer rings of distance.
#[test]
fn erosion_shrinks_plate_to_centre() {
    let mut hf = Heightfield::new(10, 10, Vec3::ZERO, Vec3::new(10.0, 2.0, 10.0), 1.0, 1.0);
    for z in 0..10 {
        for x in 0..10 {
            hf.add_span(x, z, 0, 1, WALKABLE_AREA, 1).unwrap();
        }
    }
    let mut chf = CompactHeightfield::from_heightfield(&hf, 2, 1).unwrap();
    erode_walkable_area(&mut chf, 2).unwrap();

    let mut walkable = Vec::new();
    for y in 0..10 {
        for x in 0..10 {
            let cell = chf.cells[(x + y * 10) as usize];
            for i in cell.index..cell.index + cell.count {
                if chf.areas[i as usize] != NULL_AREA {
                    walkable.push((x, y));
                }
            }
        }
    }
    assert_eq!(walkable.len(), 36);
    for (x, y) in walkable {
        assert!((2..8).contains(&x) && (2..8).contains(&y));
    }

    build_distance_field(&mut chf);
    assert!(chf.max_distance >= 4);
}

/// After watershed segmentation every walkable span carries a region and the
/// distance invariant holds against cardinal neighbours.
#[test]
fn segmentation_invariants() {
    let mut hf = Heightfield::new(12, 12, Vec3::ZERO, Vec3::new(12.0, 2.0, 12.0), 1.0, 1.0);
    for z in 0..12 {
        for x in 0..12 {
            // Leave an unwalkable bar splitting the plate
            let area = if x == 5 && z < 8 { NULL_AREA } else { WALKABLE_AREA };
            hf.add_span(x, z, 0, 1, area, 1).unwrap();
        }
    }
    let mut chf = CompactHeightfield::from_heightfield(&hf, 2, 1).unwrap();
    build_distance_field(&mut chf);
    build_regions(&mut chf, 0, 1, 0).unwrap();

    for y in 0..12 {
        for x in 0..12 {
            let cell = chf.cells[(x + y * 12) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if chf.areas[i] != NULL_AREA {
                    assert_ne!(chf.spans[i].reg, 0);
                }
                for dir in 0..4 {
                    if let Some(j) = chf.con_index(x, y, i, dir) {
                        assert!(chf.dist[i] as i32 <= chf.dist[j] as i32 + 2);
                    }
                }
            }
        }
    }
}

/// The full builder runs end to end and yields counter-clockwise outlines
/// with valid region ids.
#[test]
fn full_pipeline_on_plate() {
    let vertices = vec![
        0.0, 0.1, 0.0, //
        12.0, 0.1, 0.0, //
        12.0, 0.1, 12.0, //
        0.0, 0.1, 12.0,
    ];
    let indices = vec![0, 2, 1, 0, 3, 2];

    let mut config = BuildConfig {
        cs: 0.5,
        ch: 0.2,
        walkable_height: 10,
        walkable_climb: 4,
        walkable_radius: 1,
        min_region_area: 4,
        merge_region_area: 20,
        max_edge_len: 0,
        max_simplification_error: 1.3,
        ..Default::default()
    };
    config.calc_grid_size(Vec3::new(0.0, 0.0, 0.0), Vec3::new(12.0, 1.0, 12.0));

    let builder = GridBuilder::new(config);
    let mut ctx = BuildContext::new();
    let cset = builder.build(&mut ctx, &vertices, &indices).unwrap();

    assert!(!cset.contours.is_empty());
    for contour in &cset.contours {
        assert!(contour.reg > 0);
        assert!(contour.verts.len() >= 3);
        let corners: Vec<(i32, i32)> = contour.verts.iter().map(|v| (v.x, v.z)).collect();
        assert!(signed_area(&corners) > 0);
    }
}

/// Identical inputs give byte-identical outputs.
#[test]
fn pipeline_is_deterministic() {
    let vertices = vec![
        0.0, 0.3, 0.0, //
        9.0, 0.1, 0.4, //
        8.6, 0.2, 9.0, //
        0.2, 0.4, 8.8,
    ];
    let indices = vec![0, 2, 1, 0, 3, 2];

    let run = || {
        let mut config = BuildConfig {
            cs: 0.4,
            ch: 0.15,
            walkable_radius: 1,
            min_region_area: 2,
            ..Default::default()
        };
        config.calc_grid_size(Vec3::ZERO, Vec3::new(9.0, 1.0, 9.0));
        let builder = GridBuilder::new(config);
        let mut ctx = BuildContext::new();
        builder.build(&mut ctx, &vertices, &indices).unwrap()
    };

    let a = run();
    let b = run();
    assert_eq!(a.contours.len(), b.contours.len());
    for (ca, cb) in a.contours.iter().zip(b.contours.iter()) {
        assert_eq!(ca.reg, cb.reg);
        assert_eq!(ca.verts, cb.verts);
        assert_eq!(ca.rverts, cb.rverts);
    }
}

/// Spans stay sorted and disjoint per column no matter the insertion order.
#[test]
fn rasterized_columns_stay_sorted() {
    let mut hf = Heightfield::new(6, 6, Vec3::ZERO, Vec3::new(6.0, 8.0, 6.0), 1.0, 0.25);
    let tris = [
        (Vec3::new(0.0, 0.3, 0.0), Vec3::new(6.0, 1.1, 0.2), Vec3::new(3.0, 0.9, 5.8)),
        (Vec3::new(0.5, 4.0, 0.5), Vec3::new(5.5, 4.4, 0.5), Vec3::new(3.0, 4.2, 5.5)),
        (Vec3::new(1.0, 2.0, 4.0), Vec3::new(5.0, 2.1, 4.5), Vec3::new(2.5, 2.3, 1.0)),
    ];
    for (a, b, c) in tris {
        rasterize_triangle(a, b, c, WALKABLE_AREA, &mut hf, 1).unwrap();
    }

    for z in 0..6 {
        for x in 0..6 {
            let spans: Vec<_> = hf.column(x, z).collect();
            for w in spans.windows(2) {
                assert!(w[0].smax < w[1].smin, "cell ({x}, {z}) has touching spans");
                assert!(w[0].smin < w[0].smax);
            }
        }
    }
}
