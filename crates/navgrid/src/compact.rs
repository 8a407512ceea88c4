//! Column-major compact field with neighbour links
//!
//! Built once from the voxel heightfield: one compact span per walkable
//! heightfield span, packed per column, with 4-direction neighbour offsets
//! resolved under clearance and climb constraints.

use glam::Vec3;
use navgrid_common::Result;

use crate::heightfield::Heightfield;
use crate::NULL_AREA;

/// Sentinel neighbour offset meaning "no connection in this direction"
pub const NOT_CONNECTED: u8 = 63;

/// Highest span offset a neighbour link can encode
const MAX_LAYERS: i32 = NOT_CONNECTED as i32 - 1;

const MAX_HEIGHT: i32 = 0xffff;

/// Offsets in x for directions 0..3
pub const DIR_OFFSET_X: [i32; 4] = [-1, 0, 1, 0];
/// Offsets in z for directions 0..3
pub const DIR_OFFSET_Y: [i32; 4] = [0, 1, 0, -1];

/// X offset for a direction
#[inline]
pub fn dir_offset_x(dir: usize) -> i32 {
    DIR_OFFSET_X[dir]
}

/// Z offset for a direction
#[inline]
pub fn dir_offset_y(dir: usize) -> i32 {
    DIR_OFFSET_Y[dir]
}

/// A cell's range into the span table
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactCell {
    /// Index of the first span in the cell
    pub index: u32,
    /// Number of spans in the cell
    pub count: u32,
}

/// A walkable floor with clearance and neighbour links
#[derive(Debug, Clone, Copy)]
pub struct CompactSpan {
    /// Floor height of the span
    pub y: u16,
    /// Region id, 0 when unassigned
    pub reg: u16,
    /// Clearance above the floor
    pub h: u8,
    con: [u8; 4],
}

impl CompactSpan {
    /// Neighbour offset in direction `dir`, [`NOT_CONNECTED`] when absent.
    ///
    /// The offset is relative to the neighbour cell's first span, not a
    /// global index.
    #[inline]
    pub fn con(&self, dir: usize) -> u8 {
        self.con[dir]
    }

    #[inline]
    pub(crate) fn set_con(&mut self, dir: usize, offset: u8) {
        self.con[dir] = offset;
    }
}

/// Column-major compact representation of the walkable surface
#[derive(Debug, Clone)]
pub struct CompactHeightfield {
    /// Width of the field along the x-axis in cells
    pub width: i32,
    /// Height of the field along the z-axis in cells
    pub height: i32,
    /// Minimum bounds of the field's AABB
    pub bmin: Vec3,
    /// Maximum bounds of the field's AABB
    pub bmax: Vec3,
    /// Horizontal cell size
    pub cs: f32,
    /// Vertical cell size
    pub ch: f32,

    /// Clearance the field was built with
    pub walkable_height: i32,
    /// Climb the neighbour links were resolved with
    pub walkable_climb: i32,
    /// Width of the synthetic border painted by region building
    pub border_size: i32,
    /// Maximum distance value, set by distance-field construction
    pub max_distance: u16,
    /// One past the highest region id, set by segmentation
    pub max_regions: u16,

    /// Per-cell span ranges, `x + y * width` indexed
    pub cells: Vec<CompactCell>,
    /// Span table
    pub spans: Vec<CompactSpan>,
    /// Area tag per span
    pub areas: Vec<u8>,
    /// Distance to boundary per span; empty until the distance field is built
    pub dist: Vec<u16>,
}

impl CompactHeightfield {
    /// Builds the compact field from a heightfield.
    ///
    /// Every walkable heightfield span becomes one compact span whose floor
    /// is the top of the solid span. Neighbour links are established where
    /// the floors are within `walkable_climb` of each other and the shared
    /// gap leaves at least `walkable_height` of clearance.
    pub fn from_heightfield(
        hf: &Heightfield,
        walkable_height: i32,
        walkable_climb: i32,
    ) -> Result<Self> {
        let w = hf.width;
        let h = hf.height;
        let span_count = hf.walkable_span_count();

        let mut cells = vec![CompactCell::default(); (w * h) as usize];
        let mut spans = Vec::with_capacity(span_count);
        let mut areas = Vec::with_capacity(span_count);

        for y in 0..h {
            for x in 0..w {
                let cell = &mut cells[(x + y * w) as usize];
                cell.index = spans.len() as u32;

                let column: Vec<_> = hf.column(x, y).collect();
                for (k, span) in column.iter().enumerate() {
                    if span.area == NULL_AREA {
                        continue;
                    }
                    let bot = span.smax as i32;
                    let top = column
                        .get(k + 1)
                        .map(|next| next.smin as i32)
                        .unwrap_or(MAX_HEIGHT);
                    spans.push(CompactSpan {
                        y: bot.clamp(0, 0xffff) as u16,
                        reg: 0,
                        h: (top - bot).clamp(0, 0xff) as u8,
                        con: [NOT_CONNECTED; 4],
                    });
                    areas.push(span.area);
                }
                cell.count = spans.len() as u32 - cell.index;
            }
        }

        let mut chf = Self {
            width: w,
            height: h,
            bmin: hf.bmin,
            bmax: hf.bmax,
            cs: hf.cs,
            ch: hf.ch,
            walkable_height,
            walkable_climb,
            border_size: 0,
            max_distance: 0,
            max_regions: 0,
            cells,
            spans,
            areas,
            dist: Vec::new(),
        };
        chf.build_connections();
        Ok(chf)
    }

    fn build_connections(&mut self) {
        let w = self.width;
        let h = self.height;
        let mut too_high_neighbour = 0i32;

        for y in 0..h {
            for x in 0..w {
                let cell = self.cells[(x + y * w) as usize];
                for i in cell.index..cell.index + cell.count {
                    let i = i as usize;
                    for dir in 0..4 {
                        let nx = x + dir_offset_x(dir);
                        let ny = y + dir_offset_y(dir);
                        if nx < 0 || ny < 0 || nx >= w || ny >= h {
                            continue;
                        }
                        let ncell = self.cells[(nx + ny * w) as usize];
                        for k in ncell.index..ncell.index + ncell.count {
                            let k = k as usize;
                            let span = self.spans[i];
                            let nspan = self.spans[k];
                            let bot = span.y.max(nspan.y) as i32;
                            let top = (span.y as i32 + span.h as i32)
                                .min(nspan.y as i32 + nspan.h as i32);

                            if top - bot >= self.walkable_height
                                && (nspan.y as i32 - span.y as i32).abs() <= self.walkable_climb
                            {
                                let offset = k as i32 - ncell.index as i32;
                                if !(0..=MAX_LAYERS).contains(&offset) {
                                    too_high_neighbour = too_high_neighbour.max(offset);
                                    continue;
                                }
                                self.spans[i].set_con(dir, offset as u8);
                                break;
                            }
                        }
                    }
                }
            }
        }

        if too_high_neighbour > MAX_LAYERS {
            log::warn!(
                "heightfield has too many layers: {} (max {})",
                too_high_neighbour,
                MAX_LAYERS
            );
        }
    }

    /// Total number of compact spans
    #[inline]
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Resolves the neighbour span index of span `i` at cell `(x, y)` in
    /// direction `dir`, or `None` when not connected.
    #[inline]
    pub fn con_index(&self, x: i32, y: i32, i: usize, dir: usize) -> Option<usize> {
        let offset = self.spans[i].con(dir);
        if offset == NOT_CONNECTED {
            return None;
        }
        let ax = x + dir_offset_x(dir);
        let ay = y + dir_offset_y(dir);
        Some(self.cells[(ax + ay * self.width) as usize].index as usize + offset as usize)
    }
}
