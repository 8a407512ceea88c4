//! Sparse voxel heightfield
//!
//! A `width x height` grid of singly-linked span lists. Spans live in a
//! pooled arena and link to each other by index; the free list is threaded
//! through the same `next` field, so a destroyed column costs nothing to
//! reclaim.

use glam::Vec3;
use navgrid_common::{Error, Result};

use crate::NULL_AREA;

/// Maximum span height in voxel units (13 bits)
pub const SPAN_MAX_HEIGHT: i32 = 0x1fff;

/// Sentinel for "no span" links in the arena
const NIL: u32 = u32::MAX;

/// Ceiling used when a span has nothing above it
const MAX_HEIGHT: i32 = 0xffff;

/// Spans are allocated from the pool in chunks of this many entries
const SPANS_PER_POOL: usize = 2048;

/// A vertically contiguous voxel interval in one grid column
#[derive(Debug, Clone, Copy)]
pub struct Span {
    /// Lower voxel bound (inclusive)
    pub smin: u16,
    /// Upper voxel bound (exclusive)
    pub smax: u16,
    /// Area tag; [`NULL_AREA`] marks non-walkable
    pub area: u8,
    /// Arena index of the next span in the column, or `NIL`
    next: u32,
}

/// Sparse voxel heightfield over an axis-aligned grid
#[derive(Debug)]
pub struct Heightfield {
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

    columns: Vec<u32>,
    pool: Vec<Span>,
    free_head: u32,
}

impl Heightfield {
    /// Creates an empty heightfield covering `[bmin, bmax]`
    pub fn new(width: i32, height: i32, bmin: Vec3, bmax: Vec3, cs: f32, ch: f32) -> Self {
        Self {
            width,
            height,
            bmin,
            bmax,
            cs,
            ch,
            columns: vec![NIL; (width * height) as usize],
            pool: Vec::new(),
            free_head: NIL,
        }
    }

    fn alloc_span(&mut self, smin: u16, smax: u16, area: u8, next: u32) -> Result<u32> {
        if self.free_head != NIL {
            let idx = self.free_head;
            self.free_head = self.pool[idx as usize].next;
            self.pool[idx as usize] = Span {
                smin,
                smax,
                area,
                next,
            };
            return Ok(idx);
        }
        if self.pool.len() == self.pool.capacity() {
            self.pool
                .try_reserve(SPANS_PER_POOL)
                .map_err(|_| Error::OutOfMemory("span pool"))?;
        }
        let idx = self.pool.len() as u32;
        self.pool.push(Span {
            smin,
            smax,
            area,
            next,
        });
        Ok(idx)
    }

    fn free_span(&mut self, idx: u32) {
        self.pool[idx as usize].next = self.free_head;
        self.free_head = idx;
    }

    /// Adds a span to column `(x, z)`, merging it with any overlapping spans.
    ///
    /// When the merged top ends up within `flag_merge_thr` of an absorbed
    /// span's top, the more walkable area tag wins; otherwise the incoming
    /// tag is kept.
    pub fn add_span(
        &mut self,
        x: i32,
        z: i32,
        smin: u16,
        smax: u16,
        area: u8,
        flag_merge_thr: i32,
    ) -> Result<()> {
        if x < 0 || z < 0 || x >= self.width || z >= self.height {
            return Err(Error::InvalidInput(format!(
                "span position ({}, {}) out of bounds",
                x, z
            )));
        }
        if smin >= smax {
            return Err(Error::InvalidInput(format!(
                "invalid span interval [{}, {})",
                smin, smax
            )));
        }
        let column = (x + z * self.width) as usize;

        let mut smin = smin;
        let mut smax = smax;
        let mut area = area;

        let mut prev = NIL;
        let mut cur = self.columns[column];
        while cur != NIL {
            let cur_span = self.pool[cur as usize];
            if cur_span.smin > smax {
                // Past the new span, insert here
                break;
            }
            if cur_span.smax < smin {
                prev = cur;
                cur = cur_span.next;
                continue;
            }
            // Overlapping or touching: absorb the existing span
            smin = smin.min(cur_span.smin);
            smax = smax.max(cur_span.smax);
            if (smax as i32 - cur_span.smax as i32).abs() <= flag_merge_thr {
                area = area.max(cur_span.area);
            }
            let next = cur_span.next;
            self.free_span(cur);
            if prev != NIL {
                self.pool[prev as usize].next = next;
            } else {
                self.columns[column] = next;
            }
            cur = next;
        }

        let new_idx = self.alloc_span(smin, smax, area, cur)?;
        if prev != NIL {
            self.pool[prev as usize].next = new_idx;
        } else {
            self.columns[column] = new_idx;
        }
        Ok(())
    }

    /// Returns the spans of column `(x, z)` from bottom to top
    pub fn column(&self, x: i32, z: i32) -> ColumnIter<'_> {
        let cur = if x < 0 || z < 0 || x >= self.width || z >= self.height {
            NIL
        } else {
            self.columns[(x + z * self.width) as usize]
        };
        ColumnIter { field: self, cur }
    }

    fn column_head(&self, x: i32, z: i32) -> u32 {
        self.columns[(x + z * self.width) as usize]
    }

    /// Total number of live spans
    pub fn span_count(&self) -> usize {
        let mut count = 0;
        for z in 0..self.height {
            for x in 0..self.width {
                count += self.column(x, z).count();
            }
        }
        count
    }

    /// Number of live spans with a walkable area tag
    pub fn walkable_span_count(&self) -> usize {
        let mut count = 0;
        for z in 0..self.height {
            for x in 0..self.width {
                count += self.column(x, z).filter(|s| s.area != NULL_AREA).count();
            }
        }
        count
    }

    /// Marks unwalkable spans as walkable when a walkable span sits directly
    /// below them within `walkable_climb`, so agents can step over low debris.
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: i32) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut prev = NIL;
                let mut prev_walkable = false;
                let mut prev_area = NULL_AREA;

                let mut cur = self.column_head(x, z);
                while cur != NIL {
                    let walkable = self.pool[cur as usize].area != NULL_AREA;
                    if !walkable && prev_walkable {
                        let step = self.pool[cur as usize].smax as i32
                            - self.pool[prev as usize].smax as i32;
                        if step.abs() <= walkable_climb {
                            self.pool[cur as usize].area = prev_area;
                        }
                    }
                    // Take the pre-filter walkability so consecutive unwalkable
                    // spans do not cascade into walkable ones
                    prev_walkable = walkable;
                    prev_area = self.pool[cur as usize].area;
                    prev = cur;
                    cur = self.pool[cur as usize].next;
                }
            }
        }
    }

    /// Marks walkable spans next to a drop higher than `walkable_climb` as
    /// unwalkable, and likewise spans whose traversable neighbours disagree
    /// in height by more than `walkable_climb` (steep surfaces).
    pub fn filter_ledge_spans(&mut self, walkable_height: i32, walkable_climb: i32) {
        const DIR_X: [i32; 4] = [-1, 0, 1, 0];
        const DIR_Z: [i32; 4] = [0, 1, 0, -1];

        for z in 0..self.height {
            for x in 0..self.width {
                let mut cur = self.column_head(x, z);
                while cur != NIL {
                    let span = self.pool[cur as usize];
                    if span.area == NULL_AREA {
                        cur = span.next;
                        continue;
                    }

                    let floor = span.smax as i32;
                    let ceiling = if span.next != NIL {
                        self.pool[span.next as usize].smin as i32
                    } else {
                        MAX_HEIGHT
                    };

                    // Lowest floor difference to any standable neighbour gap,
                    // and the floor range of the traversable neighbours
                    let mut lowest_diff = MAX_HEIGHT;
                    let mut access_min = floor;
                    let mut access_max = floor;

                    for dir in 0..4 {
                        let nx = x + DIR_X[dir];
                        let nz = z + DIR_Z[dir];
                        // The tile edge counts as a drop
                        if nx < 0 || nz < 0 || nx >= self.width || nz >= self.height {
                            lowest_diff = -walkable_climb - 1;
                            break;
                        }

                        let mut ncur = self.column_head(nx, nz);
                        let first_ceiling = if ncur != NIL {
                            self.pool[ncur as usize].smin as i32
                        } else {
                            MAX_HEIGHT
                        };
                        // Standable gap below the neighbour column's first span
                        // means the geometry simply ends there
                        if ceiling.min(first_ceiling) - floor >= walkable_height {
                            lowest_diff = -walkable_climb - 1;
                            break;
                        }

                        while ncur != NIL {
                            let nspan = self.pool[ncur as usize];
                            let nfloor = nspan.smax as i32;
                            let nceiling = if nspan.next != NIL {
                                self.pool[nspan.next as usize].smin as i32
                            } else {
                                MAX_HEIGHT
                            };
                            // Only gaps tall enough to stand in count
                            if ceiling.min(nceiling) - floor.max(nfloor) >= walkable_height {
                                let diff = nfloor - floor;
                                lowest_diff = lowest_diff.min(diff);
                                if diff.abs() <= walkable_climb {
                                    access_min = access_min.min(nfloor);
                                    access_max = access_max.max(nfloor);
                                }
                            }
                            ncur = nspan.next;
                        }
                    }

                    if lowest_diff < -walkable_climb {
                        self.pool[cur as usize].area = NULL_AREA;
                    } else if access_max - access_min > walkable_climb {
                        self.pool[cur as usize].area = NULL_AREA;
                    }

                    cur = span.next;
                }
            }
        }
    }

    /// Marks walkable spans with less than `walkable_height` clearance to the
    /// span above as unwalkable.
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: i32) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut cur = self.column_head(x, z);
                while cur != NIL {
                    let span = self.pool[cur as usize];
                    if span.area != NULL_AREA {
                        let bot = span.smax as i32;
                        let top = if span.next != NIL {
                            self.pool[span.next as usize].smin as i32
                        } else {
                            MAX_HEIGHT
                        };
                        if top - bot <= walkable_height {
                            self.pool[cur as usize].area = NULL_AREA;
                        }
                    }
                    cur = span.next;
                }
            }
        }
    }
}

/// Iterator over the spans of one column, bottom to top
pub struct ColumnIter<'a> {
    field: &'a Heightfield,
    cur: u32,
}

impl Iterator for ColumnIter<'_> {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        if self.cur == NIL {
            return None;
        }
        let span = self.field.pool[self.cur as usize];
        self.cur = span.next;
        Some(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WALKABLE_AREA;

    fn field() -> Heightfield {
        Heightfield::new(4, 4, Vec3::ZERO, Vec3::new(4.0, 8.0, 4.0), 1.0, 1.0)
    }

    #[test]
    fn test_add_span_simple() {
        let mut hf = field();
        hf.add_span(1, 2, 3, 5, WALKABLE_AREA, 1).unwrap();
        let spans: Vec<_> = hf.column(1, 2).collect();
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].smin, spans[0].smax), (3, 5));
        assert_eq!(spans[0].area, WALKABLE_AREA);
    }

    #[test]
    fn test_add_span_keeps_columns_sorted() {
        let mut hf = field();
        hf.add_span(0, 0, 10, 12, 1, 1).unwrap();
        hf.add_span(0, 0, 2, 4, 1, 1).unwrap();
        hf.add_span(0, 0, 6, 8, 1, 1).unwrap();
        let spans: Vec<_> = hf.column(0, 0).collect();
        let mins: Vec<u16> = spans.iter().map(|s| s.smin).collect();
        assert_eq!(mins, vec![2, 6, 10]);
    }

    #[test]
    fn test_add_span_merges_overlap() {
        let mut hf = field();
        hf.add_span(0, 0, 2, 5, 2, 1).unwrap();
        hf.add_span(0, 0, 4, 6, 1, 1).unwrap();
        let spans: Vec<_> = hf.column(0, 0).collect();
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].smin, spans[0].smax), (2, 6));
        // Tops within the threshold: the stronger tag wins over the incoming
        assert_eq!(spans[0].area, 2);
    }

    #[test]
    fn test_add_span_flag_merge_threshold() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 6, WALKABLE_AREA, 1).unwrap();
        // New span overlaps but its top is 2 above the old one; incoming
        // tag is kept because the threshold is 1
        hf.add_span(0, 0, 5, 8, 1, 1).unwrap();
        let spans: Vec<_> = hf.column(0, 0).collect();
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].smin, spans[0].smax), (0, 8));
        assert_eq!(spans[0].area, 1);
    }

    #[test]
    fn test_add_span_merges_chain() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 2, 1, 1).unwrap();
        hf.add_span(0, 0, 4, 6, 1, 1).unwrap();
        hf.add_span(0, 0, 8, 10, 1, 1).unwrap();
        // Bridges all three
        hf.add_span(0, 0, 1, 9, 1, 1).unwrap();
        let spans: Vec<_> = hf.column(0, 0).collect();
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].smin, spans[0].smax), (0, 10));
    }

    #[test]
    fn test_add_span_out_of_bounds() {
        let mut hf = field();
        assert!(hf.add_span(4, 0, 0, 1, 1, 1).is_err());
        assert!(hf.add_span(0, -1, 0, 1, 1, 1).is_err());
    }

    #[test]
    fn test_filter_low_hanging() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 4, WALKABLE_AREA, 1).unwrap();
        hf.add_span(0, 0, 5, 5 + 1, NULL_AREA, 1).unwrap();
        hf.filter_low_hanging_walkable_obstacles(2);
        let spans: Vec<_> = hf.column(0, 0).collect();
        assert_eq!(spans[1].area, WALKABLE_AREA);
    }

    #[test]
    fn test_filter_low_height_spans() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 2, WALKABLE_AREA, 1).unwrap();
        hf.add_span(0, 0, 4, 6, WALKABLE_AREA, 1).unwrap();
        // Clearance between the spans is 2, below the required 5
        hf.filter_walkable_low_height_spans(5);
        let spans: Vec<_> = hf.column(0, 0).collect();
        assert_eq!(spans[0].area, NULL_AREA);
        // Top span keeps its tag: nothing above it
        assert_eq!(spans[1].area, WALKABLE_AREA);
    }

    #[test]
    fn test_filter_ledge_spans_drops_cliff_edge() {
        // 3x3 plateau at height 10 with the column east of the centre
        // dropped to height 1
        let mut hf = Heightfield::new(3, 3, Vec3::ZERO, Vec3::new(3.0, 16.0, 3.0), 1.0, 1.0);
        for z in 0..3 {
            for x in 0..3 {
                let smax = if (x, z) == (2, 1) { 1 } else { 10 };
                hf.add_span(x, z, 0, smax, WALKABLE_AREA, 1).unwrap();
            }
        }
        hf.filter_ledge_spans(3, 2);
        let centre: Vec<_> = hf.column(1, 1).collect();
        assert_eq!(centre[0].area, NULL_AREA);

        // On a uniform plateau the centre keeps its tag
        let mut flat = Heightfield::new(3, 3, Vec3::ZERO, Vec3::new(3.0, 16.0, 3.0), 1.0, 1.0);
        for z in 0..3 {
            for x in 0..3 {
                flat.add_span(x, z, 0, 10, WALKABLE_AREA, 1).unwrap();
            }
        }
        flat.filter_ledge_spans(3, 2);
        let centre: Vec<_> = flat.column(1, 1).collect();
        assert_eq!(centre[0].area, WALKABLE_AREA);
    }

    #[test]
    fn test_span_pool_reuse() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 2, 1, 1).unwrap();
        hf.add_span(0, 0, 4, 6, 1, 1).unwrap();
        let before = hf.pool.len();
        // Merging frees two spans and allocates one; the follow-up insert
        // reuses the second freed slot, so the pool does not grow
        hf.add_span(0, 0, 1, 5, 1, 1).unwrap();
        hf.add_span(1, 1, 0, 2, 1, 1).unwrap();
        assert_eq!(hf.pool.len(), before);
        assert_eq!(hf.span_count(), 2);
    }
}
