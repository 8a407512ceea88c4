//! Region segmentation over the compact field
//!
//! Three partitioners produce per-span region ids: a watershed that floods
//! the distance field from its peaks, a monotone row sweep, and a layer
//! variant that unions monotone strips into non-overlapping layers. All
//! share the same small-region filtering and merging post-pass.

use navgrid_common::{Error, Result};

use crate::compact::{dir_offset_x, dir_offset_y, CompactHeightfield};
use crate::distance::build_distance_field;
use crate::{BORDER_REG, NULL_AREA};

const NULL_NEI: u16 = 0xffff;

#[derive(Debug, Clone, Copy)]
struct LevelStackEntry {
    x: i32,
    y: i32,
    index: i32,
}

impl LevelStackEntry {
    fn new(x: i32, y: i32, index: i32) -> Self {
        Self { x, y, index }
    }
}

#[derive(Debug)]
struct Region {
    span_count: i32,
    id: u16,
    area_type: u8,
    remap: bool,
    visited: bool,
    overlap: bool,
    connects_to_border: bool,
    ymin: u16,
    ymax: u16,
    /// Neighbour region ids around the contour, adjacent-duplicate-free
    connections: Vec<u16>,
    /// Region ids sharing a column with this region
    floors: Vec<u16>,
}

impl Region {
    fn new(id: u16) -> Self {
        Self {
            span_count: 0,
            id,
            area_type: 0,
            remap: false,
            visited: false,
            overlap: false,
            connects_to_border: false,
            ymin: 0xffff,
            ymax: 0,
            connections: Vec::new(),
            floors: Vec::new(),
        }
    }
}

fn paint_rect_region(
    min_x: i32,
    max_x: i32,
    min_y: i32,
    max_y: i32,
    region_id: u16,
    chf: &CompactHeightfield,
    src_reg: &mut [u16],
) {
    let w = chf.width;
    for y in min_y..max_y {
        for x in min_x..max_x {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                if chf.areas[i as usize] != NULL_AREA {
                    src_reg[i as usize] = region_id;
                }
            }
        }
    }
}

fn sort_cells_by_level(
    start_level: u16,
    chf: &CompactHeightfield,
    src_reg: &[u16],
    stacks: &mut [Vec<LevelStackEntry>],
    log_levels_per_stack: u16,
) {
    let w = chf.width;
    let h = chf.height;
    let start_level = (start_level >> log_levels_per_stack) as i32;
    let nb_stacks = stacks.len() as i32;

    for stack in stacks.iter_mut() {
        stack.clear();
    }

    for y in 0..h {
        for x in 0..w {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if chf.areas[i] == NULL_AREA || src_reg[i] != 0 {
                    continue;
                }
                let level = (chf.dist[i] >> log_levels_per_stack) as i32;
                // Higher bands land in lower stacks; anything left over from
                // earlier high bands drops into stack 0
                let mut s_id = start_level - level;
                if s_id >= nb_stacks {
                    continue;
                }
                if s_id < 0 {
                    s_id = 0;
                }
                stacks[s_id as usize].push(LevelStackEntry::new(x, y, i as i32));
            }
        }
    }
}

fn append_stacks(
    src_stack: &[LevelStackEntry],
    dst_stack: &mut Vec<LevelStackEntry>,
    src_reg: &[u16],
) {
    for &entry in src_stack {
        if entry.index < 0 || src_reg[entry.index as usize] != 0 {
            continue;
        }
        dst_stack.push(entry);
    }
}

/// BFS-floods a fresh region id from `(x, y, i)`, claiming connected
/// same-area spans with `dist >= level - 2`. A span whose 8-neighbourhood
/// already holds a different non-border region is left unassigned, which
/// keeps two seeds from coalescing across the current contour.
fn flood_region(
    x: i32,
    y: i32,
    i: usize,
    level: u16,
    r: u16,
    chf: &CompactHeightfield,
    src_reg: &mut [u16],
    src_dist: &mut [u16],
    stack: &mut Vec<LevelStackEntry>,
) -> bool {
    let area = chf.areas[i];

    stack.clear();
    stack.push(LevelStackEntry::new(x, y, i as i32));
    src_reg[i] = r;
    src_dist[i] = 0;

    let lev = level.saturating_sub(2);
    let mut count = 0;

    while let Some(back) = stack.pop() {
        let cx = back.x;
        let cy = back.y;
        let ci = back.index as usize;

        // Check if any of the 8-connected neighbours already carry a
        // different region
        let mut ar = 0u16;
        'dirs: for dir in 0..4 {
            if let Some(ai) = chf.con_index(cx, cy, ci, dir) {
                if chf.areas[ai] != area {
                    continue;
                }
                let nr = src_reg[ai];
                if nr & BORDER_REG != 0 {
                    // Do not take borders into account
                    continue;
                }
                if nr != 0 && nr != r {
                    ar = nr;
                    break 'dirs;
                }

                let ax = cx + dir_offset_x(dir);
                let ay = cy + dir_offset_y(dir);
                let dir2 = (dir + 1) & 0x3;
                if let Some(ai2) = chf.con_index(ax, ay, ai, dir2) {
                    if chf.areas[ai2] != area {
                        continue;
                    }
                    let nr2 = src_reg[ai2];
                    if nr2 != 0 && nr2 != r {
                        ar = nr2;
                        break 'dirs;
                    }
                }
            }
        }
        if ar != 0 {
            src_reg[ci] = 0;
            continue;
        }

        count += 1;

        for dir in 0..4 {
            if let Some(ai) = chf.con_index(cx, cy, ci, dir) {
                if chf.areas[ai] != area {
                    continue;
                }
                if chf.dist[ai] >= lev && src_reg[ai] == 0 {
                    src_reg[ai] = r;
                    src_dist[ai] = 0;
                    stack.push(LevelStackEntry::new(
                        cx + dir_offset_x(dir),
                        cy + dir_offset_y(dir),
                        ai as i32,
                    ));
                }
            }
        }
    }

    count > 0
}

/// Grows existing regions into the unassigned spans of `stack`.
///
/// Writes are buffered per round so regions advance by exactly one ring per
/// iteration. With `level == 0` the loop runs until no span changes.
fn expand_regions(
    max_iter: i32,
    level: u16,
    chf: &CompactHeightfield,
    src_reg: &mut [u16],
    src_dist: &mut [u16],
    stack: &mut Vec<LevelStackEntry>,
    fill_stack: bool,
) {
    let w = chf.width;
    let h = chf.height;

    if fill_stack {
        // Find cells revealed by the raised level
        stack.clear();
        for y in 0..h {
            for x in 0..w {
                let cell = chf.cells[(x + y * w) as usize];
                for i in cell.index..cell.index + cell.count {
                    let i = i as usize;
                    if chf.dist[i] >= level && src_reg[i] == 0 && chf.areas[i] != NULL_AREA {
                        stack.push(LevelStackEntry::new(x, y, i as i32));
                    }
                }
            }
        }
    } else {
        // Mark entries that already have a region as handled
        for entry in stack.iter_mut() {
            if entry.index >= 0 && src_reg[entry.index as usize] != 0 {
                entry.index = -1;
            }
        }
    }

    let mut dirty: Vec<(usize, u16, u16)> = Vec::new();
    let mut iter = 0;
    while !stack.is_empty() {
        let mut failed = 0usize;
        dirty.clear();

        for j in 0..stack.len() {
            let x = stack[j].x;
            let y = stack[j].y;
            let i = stack[j].index;
            if i < 0 {
                failed += 1;
                continue;
            }
            let i = i as usize;

            let mut r = src_reg[i];
            let mut d2 = 0xffffu16;
            let area = chf.areas[i];
            for dir in 0..4 {
                if let Some(ai) = chf.con_index(x, y, i, dir) {
                    if chf.areas[ai] != area {
                        continue;
                    }
                    if src_reg[ai] > 0 && src_reg[ai] & BORDER_REG == 0 {
                        let nd = src_dist[ai].saturating_add(2);
                        if (nd as i32) < d2 as i32 {
                            r = src_reg[ai];
                            d2 = nd;
                        }
                    }
                }
            }

            if r != 0 {
                stack[j].index = -1;
                dirty.push((i, r, d2));
            } else {
                failed += 1;
            }
        }

        for &(i, r, d) in &dirty {
            src_reg[i] = r;
            src_dist[i] = d;
        }

        if failed == stack.len() {
            break;
        }
        if level > 0 {
            iter += 1;
            if iter >= max_iter {
                break;
            }
        }
    }
}

fn remove_adjacent_neighbours(reg: &mut Region) {
    let mut i = 0;
    while i < reg.connections.len() && reg.connections.len() > 1 {
        let ni = (i + 1) % reg.connections.len();
        if reg.connections[i] == reg.connections[ni] {
            reg.connections.remove(i);
        } else {
            i += 1;
        }
    }
}

fn replace_neighbour(reg: &mut Region, old_id: u16, new_id: u16) {
    let mut nei_changed = false;
    for connection in reg.connections.iter_mut() {
        if *connection == old_id {
            *connection = new_id;
            nei_changed = true;
        }
    }
    for floor in reg.floors.iter_mut() {
        if *floor == old_id {
            *floor = new_id;
        }
    }
    if nei_changed {
        remove_adjacent_neighbours(reg);
    }
}

fn can_merge_with_region(rega: &Region, regb: &Region) -> bool {
    if rega.area_type != regb.area_type {
        return false;
    }
    // Exactly one shared contour segment
    let n = rega.connections.iter().filter(|&&c| c == regb.id).count();
    if n > 1 {
        return false;
    }
    // No vertical overlap
    if rega.floors.contains(&regb.id) {
        return false;
    }
    true
}

fn add_unique_floor_region(reg: &mut Region, n: u16) {
    if !reg.floors.contains(&n) {
        reg.floors.push(n);
    }
}

fn merge_regions(regions: &mut [Region], target: usize, source: usize) -> bool {
    let aid = regions[target].id;
    let bid = regions[source].id;

    let acon = regions[target].connections.clone();
    let bcon = regions[source].connections.clone();

    let Some(insa) = acon.iter().position(|&c| c == bid) else {
        return false;
    };
    let Some(insb) = bcon.iter().position(|&c| c == aid) else {
        return false;
    };

    // Splice the cyclic neighbour lists at the shared segment
    let mut merged = Vec::with_capacity(acon.len() + bcon.len());
    for i in 0..acon.len().saturating_sub(1) {
        merged.push(acon[(insa + 1 + i) % acon.len()]);
    }
    for i in 0..bcon.len().saturating_sub(1) {
        merged.push(bcon[(insb + 1 + i) % bcon.len()]);
    }
    regions[target].connections = merged;
    remove_adjacent_neighbours(&mut regions[target]);

    let floors = regions[source].floors.clone();
    for floor in floors {
        add_unique_floor_region(&mut regions[target], floor);
    }
    regions[target].span_count += regions[source].span_count;
    regions[source].span_count = 0;
    regions[source].connections.clear();
    true
}

fn is_region_connected_to_border(reg: &Region) -> bool {
    // A null neighbour id means the contour touches unassigned space
    reg.connections.contains(&0)
}

fn is_solid_edge(
    chf: &CompactHeightfield,
    src_reg: &[u16],
    x: i32,
    y: i32,
    i: usize,
    dir: usize,
) -> bool {
    let r = chf
        .con_index(x, y, i, dir)
        .map(|ai| src_reg[ai])
        .unwrap_or(0);
    r != src_reg[i]
}

/// Walks the region contour starting at span `i`, collecting the sequence of
/// neighbour region ids with adjacent duplicates collapsed.
fn walk_contour(
    mut x: i32,
    mut y: i32,
    mut i: usize,
    mut dir: usize,
    chf: &CompactHeightfield,
    src_reg: &[u16],
    cont: &mut Vec<u16>,
) {
    let start_dir = dir;
    let start_i = i;

    let mut cur_reg = chf
        .con_index(x, y, i, dir)
        .map(|ai| src_reg[ai])
        .unwrap_or(0);
    cont.push(cur_reg);

    let mut iter = 0;
    while iter < 40000 {
        iter += 1;

        if is_solid_edge(chf, src_reg, x, y, i, dir) {
            let r = chf
                .con_index(x, y, i, dir)
                .map(|ai| src_reg[ai])
                .unwrap_or(0);
            if r != cur_reg {
                cur_reg = r;
                cont.push(r);
            }
            dir = (dir + 1) & 0x3; // Rotate CW
        } else {
            let Some(ni) = chf.con_index(x, y, i, dir) else {
                // Should not happen
                return;
            };
            x += dir_offset_x(dir);
            y += dir_offset_y(dir);
            i = ni;
            dir = (dir + 3) & 0x3; // Rotate CCW
        }

        if start_i == i && start_dir == dir {
            break;
        }
    }

    // Collapse the duplicate wrapping across the seam
    if cont.len() > 1 {
        let mut j = 0;
        while j < cont.len() {
            let nj = (j + 1) % cont.len();
            if cont[j] == cont[nj] {
                cont.remove(j);
            } else {
                j += 1;
            }
        }
    }
}

/// Shared post-pass for the watershed and monotone partitioners: deletes
/// small isolated region components and merges small regions into their
/// smallest mergeable neighbours, then compresses region ids.
fn merge_and_filter_regions(
    min_region_area: i32,
    merge_region_size: i32,
    max_region_id: &mut u16,
    chf: &CompactHeightfield,
    src_reg: &mut [u16],
) -> Result<Vec<u16>> {
    let w = chf.width;
    let h = chf.height;
    let nreg = *max_region_id as usize + 1;

    let mut regions: Vec<Region> = (0..nreg).map(|i| Region::new(i as u16)).collect();

    // Gather span counts, floors and contour connections per region
    for y in 0..h {
        for x in 0..w {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                let r = src_reg[i];
                if r == 0 || r as usize >= nreg {
                    continue;
                }

                regions[r as usize].span_count += 1;

                // Other regions in the same column
                for j in cell.index..cell.index + cell.count {
                    let j = j as usize;
                    if i == j {
                        continue;
                    }
                    let floor_id = src_reg[j];
                    if floor_id == 0 || floor_id as usize >= nreg {
                        continue;
                    }
                    if floor_id == r {
                        regions[r as usize].overlap = true;
                    }
                    add_unique_floor_region(&mut regions[r as usize], floor_id);
                }

                // Contour already collected
                if !regions[r as usize].connections.is_empty() {
                    continue;
                }
                regions[r as usize].area_type = chf.areas[i];

                let edge_dir = (0..4).find(|&dir| is_solid_edge(chf, src_reg, x, y, i, dir));
                if let Some(dir) = edge_dir {
                    let mut cont = Vec::new();
                    walk_contour(x, y, i, dir, chf, src_reg, &mut cont);
                    regions[r as usize].connections = cont;
                }
            }
        }
    }

    // Remove too small region components. Regions touching a tile border
    // survive since their true size extends into the neighbour tile.
    let mut stack = Vec::with_capacity(32);
    let mut trace = Vec::with_capacity(32);
    for i in 0..nreg {
        if regions[i].id == 0 || regions[i].id & BORDER_REG != 0 {
            continue;
        }
        if regions[i].span_count == 0 || regions[i].visited {
            continue;
        }

        let mut connects_to_border = false;
        let mut span_count = 0;
        stack.clear();
        trace.clear();
        regions[i].visited = true;
        stack.push(i);

        while let Some(ri) = stack.pop() {
            span_count += regions[ri].span_count;
            trace.push(ri);

            let connections = regions[ri].connections.clone();
            for nei in connections {
                if nei & BORDER_REG != 0 {
                    connects_to_border = true;
                    continue;
                }
                let nei = nei as usize;
                if regions[nei].visited
                    || regions[nei].id == 0
                    || regions[nei].id & BORDER_REG != 0
                {
                    continue;
                }
                stack.push(regions[nei].id as usize);
                regions[nei].visited = true;
            }
        }

        if span_count < min_region_area && !connects_to_border {
            for &t in &trace {
                regions[t].span_count = 0;
                regions[t].id = 0;
            }
        }
    }

    // Merge too small regions into neighbour regions
    loop {
        let mut merge_count = 0;
        for i in 0..nreg {
            if regions[i].id == 0 || regions[i].id & BORDER_REG != 0 {
                continue;
            }
            if regions[i].overlap || regions[i].span_count == 0 {
                continue;
            }
            if regions[i].span_count > merge_region_size
                && is_region_connected_to_border(&regions[i])
            {
                continue;
            }

            // Smallest neighbour the region can merge with both ways
            let mut smallest = i32::MAX;
            let mut merge_id = regions[i].id;
            for &nei in &regions[i].connections {
                if nei & BORDER_REG != 0 {
                    continue;
                }
                let m = nei as usize;
                if regions[m].id == 0 || regions[m].id & BORDER_REG != 0 || regions[m].overlap {
                    continue;
                }
                if regions[m].span_count < smallest
                    && can_merge_with_region(&regions[i], &regions[m])
                    && can_merge_with_region(&regions[m], &regions[i])
                {
                    smallest = regions[m].span_count;
                    merge_id = regions[m].id;
                }
            }

            if merge_id != regions[i].id {
                let old_id = regions[i].id;
                let target = merge_id as usize;
                if merge_regions(&mut regions, target, i) {
                    // Every other region's references must follow the merge
                    for j in 0..nreg {
                        if regions[j].id == 0 || regions[j].id & BORDER_REG != 0 {
                            continue;
                        }
                        if regions[j].id == old_id {
                            regions[j].id = merge_id;
                        }
                        replace_neighbour(&mut regions[j], old_id, merge_id);
                    }
                    merge_count += 1;
                }
            }
        }
        if merge_count == 0 {
            break;
        }
    }

    // Compress region ids
    for region in regions.iter_mut() {
        region.remap = region.id != 0 && region.id & BORDER_REG == 0;
    }
    let mut reg_id_gen = 0u16;
    for i in 0..nreg {
        if !regions[i].remap {
            continue;
        }
        reg_id_gen += 1;
        let old_id = regions[i].id;
        let new_id = reg_id_gen;
        for region in regions[i..].iter_mut() {
            if region.id == old_id {
                region.id = new_id;
                region.remap = false;
            }
        }
    }
    *max_region_id = reg_id_gen;

    for reg in src_reg.iter_mut() {
        if *reg & BORDER_REG == 0 {
            *reg = regions[*reg as usize].id;
        }
    }

    let overlaps = regions
        .iter()
        .filter(|region| region.overlap)
        .map(|region| region.id)
        .collect();
    Ok(overlaps)
}

fn add_unique_connection(reg: &mut Region, n: u16) {
    if !reg.connections.contains(&n) {
        reg.connections.push(n);
    }
}

/// Merges monotone strips into layers: unions over the connection graph,
/// refusing any union that would create vertical overlap. Small regions are
/// removed afterwards.
fn merge_and_filter_layer_regions(
    min_region_area: i32,
    max_region_id: &mut u16,
    chf: &CompactHeightfield,
    src_reg: &mut [u16],
) -> Result<()> {
    let w = chf.width;
    let h = chf.height;
    let nreg = *max_region_id as usize + 1;

    let mut regions: Vec<Region> = (0..nreg).map(|i| Region::new(i as u16)).collect();

    // Find region neighbours and overlapping regions
    let mut lregs: Vec<u16> = Vec::with_capacity(32);
    for y in 0..h {
        for x in 0..w {
            let cell = chf.cells[(x + y * w) as usize];
            lregs.clear();

            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                let ri = src_reg[i];
                if ri == 0 || ri as usize >= nreg {
                    continue;
                }
                let y_span = chf.spans[i].y;
                {
                    let reg = &mut regions[ri as usize];
                    reg.span_count += 1;
                    reg.ymin = reg.ymin.min(y_span);
                    reg.ymax = reg.ymax.max(y_span);
                }
                lregs.push(ri);

                for dir in 0..4 {
                    if let Some(ai) = chf.con_index(x, y, i, dir) {
                        let rai = src_reg[ai];
                        if rai > 0 && (rai as usize) < nreg && rai != ri {
                            add_unique_connection(&mut regions[ri as usize], rai);
                        }
                        if rai & BORDER_REG != 0 {
                            regions[ri as usize].connects_to_border = true;
                        }
                    }
                }
            }

            // Every pair of region layers in this column overlaps
            for i in 0..lregs.len() {
                for j in i + 1..lregs.len() {
                    if lregs[i] != lregs[j] {
                        add_unique_floor_region(&mut regions[lregs[i] as usize], lregs[j]);
                        add_unique_floor_region(&mut regions[lregs[j] as usize], lregs[i]);
                    }
                }
            }
        }
    }

    // Create 2D layers from the regions
    let mut layer_id = 1u16;
    for region in regions.iter_mut() {
        region.id = 0;
    }

    let mut stack: Vec<usize> = Vec::with_capacity(32);
    for i in 1..nreg {
        if regions[i].id != 0 {
            continue;
        }
        regions[i].id = layer_id;
        stack.clear();
        stack.push(i);

        while !stack.is_empty() {
            let reg_idx = stack.remove(0);
            let connections = regions[reg_idx].connections.clone();
            for nei in connections {
                let nei = nei as usize;
                if regions[nei].id != 0 {
                    continue;
                }
                // A union that stacks two layers of the same column is
                // forbidden
                if regions[i].floors.contains(&(nei as u16)) {
                    continue;
                }

                stack.push(nei);
                regions[nei].id = layer_id;

                let floors = regions[nei].floors.clone();
                for floor in floors {
                    add_unique_floor_region(&mut regions[i], floor);
                }
                regions[i].ymin = regions[i].ymin.min(regions[nei].ymin);
                regions[i].ymax = regions[i].ymax.max(regions[nei].ymax);
                regions[i].span_count += regions[nei].span_count;
                regions[nei].span_count = 0;
                regions[i].connects_to_border =
                    regions[i].connects_to_border || regions[nei].connects_to_border;
            }
        }

        layer_id += 1;
    }

    // Remove small regions
    for i in 0..nreg {
        if regions[i].span_count > 0
            && regions[i].span_count < min_region_area
            && !regions[i].connects_to_border
        {
            let reg = regions[i].id;
            for region in regions.iter_mut() {
                if region.id == reg {
                    region.id = 0;
                }
            }
        }
    }

    // Compress region ids
    for region in regions.iter_mut() {
        region.remap = region.id != 0 && region.id & BORDER_REG == 0;
    }
    let mut reg_id_gen = 0u16;
    for i in 0..nreg {
        if !regions[i].remap {
            continue;
        }
        reg_id_gen += 1;
        let old_id = regions[i].id;
        let new_id = reg_id_gen;
        for region in regions[i..].iter_mut() {
            if region.id == old_id {
                region.id = new_id;
                region.remap = false;
            }
        }
    }
    *max_region_id = reg_id_gen;

    for reg in src_reg.iter_mut() {
        if *reg & BORDER_REG == 0 {
            *reg = regions[*reg as usize].id;
        }
    }

    Ok(())
}

fn paint_border_regions(
    chf: &CompactHeightfield,
    border_size: i32,
    region_id: &mut u16,
    src_reg: &mut [u16],
) {
    let w = chf.width;
    let h = chf.height;
    let bw = w.min(border_size);
    let bh = h.min(border_size);

    paint_rect_region(0, bw, 0, h, *region_id | BORDER_REG, chf, src_reg);
    *region_id += 1;
    paint_rect_region(w - bw, w, 0, h, *region_id | BORDER_REG, chf, src_reg);
    *region_id += 1;
    paint_rect_region(0, w, 0, bh, *region_id | BORDER_REG, chf, src_reg);
    *region_id += 1;
    paint_rect_region(0, w, h - bh, h, *region_id | BORDER_REG, chf, src_reg);
    *region_id += 1;
}

/// Builds regions with watershed partitioning.
///
/// The distance field is treated as terrain elevation and flooded downward
/// from the peaks in two-unit bands, growing existing regions before seeding
/// new ones. Requires the distance field; builds it when absent.
pub fn build_regions(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    if chf.dist.len() != chf.span_count() {
        build_distance_field(chf);
    }

    let span_count = chf.span_count();
    let mut src_reg = vec![0u16; span_count];
    let mut src_dist = vec![0u16; span_count];

    const NB_STACKS: usize = 8;
    let mut lvl_stacks: [Vec<LevelStackEntry>; NB_STACKS] = Default::default();
    let mut stack: Vec<LevelStackEntry> = Vec::with_capacity(256);

    let mut region_id = 1u16;
    let mut level = (chf.max_distance + 1) & !1;

    // How far the watershed overflows before new seeds are planted
    let expand_iters = 8;

    if border_size > 0 {
        paint_border_regions(chf, border_size, &mut region_id, &mut src_reg);
    }
    chf.border_size = border_size;

    let mut s_id: i32 = -1;
    while level > 0 {
        level = level.saturating_sub(2);
        s_id = (s_id + 1) & (NB_STACKS as i32 - 1);

        if s_id == 0 {
            sort_cells_by_level(level, chf, &src_reg, &mut lvl_stacks, 1);
        } else {
            let (left, right) = lvl_stacks.split_at_mut(s_id as usize);
            append_stacks(&left[s_id as usize - 1], &mut right[0], &src_reg);
        }

        expand_regions(
            expand_iters,
            level,
            chf,
            &mut src_reg,
            &mut src_dist,
            &mut lvl_stacks[s_id as usize],
            false,
        );

        for j in 0..lvl_stacks[s_id as usize].len() {
            let entry = lvl_stacks[s_id as usize][j];
            if entry.index < 0 || src_reg[entry.index as usize] != 0 {
                continue;
            }
            if flood_region(
                entry.x,
                entry.y,
                entry.index as usize,
                level,
                region_id,
                chf,
                &mut src_reg,
                &mut src_dist,
                &mut stack,
            ) {
                if region_id == 0xffff {
                    return Err(Error::RegionOverflow);
                }
                region_id += 1;
            }
        }
    }

    // Claim any stragglers
    expand_regions(
        expand_iters * 8,
        0,
        chf,
        &mut src_reg,
        &mut src_dist,
        &mut stack,
        true,
    );

    let mut max_region_id = region_id;
    let overlaps = merge_and_filter_regions(
        min_region_area,
        merge_region_area,
        &mut max_region_id,
        chf,
        &mut src_reg,
    )?;
    chf.max_regions = max_region_id;
    if !overlaps.is_empty() {
        log::warn!("{} overlapping regions after merge", overlaps.len());
    }

    for (i, span) in chf.spans.iter_mut().enumerate() {
        span.reg = src_reg[i];
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
struct SweepSpan {
    /// Region id assigned after the row resolves
    id: u16,
    /// Samples matched against the neighbour row
    ns: u16,
    /// Sole previous-row neighbour, `NULL_NEI` when ambiguous
    nei: u16,
}

fn sweep_rows(
    chf: &CompactHeightfield,
    border_size: i32,
    id: &mut u16,
    src_reg: &mut [u16],
) {
    let w = chf.width;
    let h = chf.height;

    for y in border_size..h - border_size {
        let mut sweeps: Vec<SweepSpan> = vec![SweepSpan::default(); 2];
        let mut prev_count = vec![0i32; *id as usize + 1];
        let mut rid = 1u16;

        for x in border_size..w - border_size {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if chf.areas[i] == NULL_AREA {
                    continue;
                }

                // Inherit the west run when possible
                let mut previd = 0u16;
                if let Some(ai) = chf.con_index(x, y, i, 0) {
                    if src_reg[ai] & BORDER_REG == 0 && chf.areas[i] == chf.areas[ai] {
                        previd = src_reg[ai];
                    }
                }
                if previd == 0 {
                    previd = rid;
                    rid += 1;
                    if sweeps.len() <= previd as usize {
                        sweeps.resize(previd as usize + 1, SweepSpan::default());
                    }
                    sweeps[previd as usize] = SweepSpan::default();
                }

                // Track the south neighbour of the run
                if let Some(ai) = chf.con_index(x, y, i, 3) {
                    let nr = src_reg[ai];
                    if nr != 0 && nr & BORDER_REG == 0 && chf.areas[i] == chf.areas[ai] {
                        let sweep = &mut sweeps[previd as usize];
                        if sweep.nei == 0 || sweep.nei == nr {
                            sweep.nei = nr;
                            sweep.ns += 1;
                            prev_count[nr as usize] += 1;
                        } else {
                            sweep.nei = NULL_NEI;
                        }
                    }
                }

                src_reg[i] = previd;
            }
        }

        // A run whose south neighbours all belong to one previous-row region
        // inherits that region
        for sweep in sweeps.iter_mut().take(rid as usize).skip(1) {
            if sweep.nei != NULL_NEI
                && sweep.nei != 0
                && prev_count[sweep.nei as usize] == sweep.ns as i32
            {
                sweep.id = sweep.nei;
            } else {
                sweep.id = *id;
                *id += 1;
            }
        }

        // Remap the row through the run table
        for x in border_size..w - border_size {
            let cell = chf.cells[(x + y * w) as usize];
            for i in cell.index..cell.index + cell.count {
                let i = i as usize;
                if src_reg[i] > 0 && src_reg[i] < rid {
                    src_reg[i] = sweeps[src_reg[i] as usize].id;
                }
            }
        }
    }
}

/// Builds regions with a monotone row sweep.
///
/// Each row is partitioned into runs that inherit the previous row's region
/// when unambiguous; the shared filter/merge pass follows.
pub fn build_regions_monotone(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    let span_count = chf.span_count();
    let mut src_reg = vec![0u16; span_count];
    let mut id = 1u16;

    if border_size > 0 {
        paint_border_regions(chf, border_size, &mut id, &mut src_reg);
    }
    chf.border_size = border_size;

    sweep_rows(chf, border_size, &mut id, &mut src_reg);

    let mut max_region_id = id;
    merge_and_filter_regions(
        min_region_area,
        merge_region_area,
        &mut max_region_id,
        chf,
        &mut src_reg,
    )?;
    chf.max_regions = max_region_id;

    for (i, span) in chf.spans.iter_mut().enumerate() {
        span.reg = src_reg[i];
    }
    Ok(())
}

/// Builds layer regions: a monotone sweep whose strips are unioned into
/// layers that never overlap vertically.
pub fn build_layer_regions(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
) -> Result<()> {
    let span_count = chf.span_count();
    let mut src_reg = vec![0u16; span_count];
    let mut id = 1u16;

    if border_size > 0 {
        paint_border_regions(chf, border_size, &mut id, &mut src_reg);
    }
    chf.border_size = border_size;

    sweep_rows(chf, border_size, &mut id, &mut src_reg);

    let mut max_region_id = id;
    merge_and_filter_layer_regions(min_region_area, &mut max_region_id, chf, &mut src_reg)?;
    chf.max_regions = max_region_id;

    for (i, span) in chf.spans.iter_mut().enumerate() {
        span.reg = src_reg[i];
    }
    Ok(())
}
