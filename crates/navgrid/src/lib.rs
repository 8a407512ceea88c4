//! Walkable-surface extraction from triangle geometry
//!
//! The pipeline turns triangle soup into 2D walkable polygonal regions:
//! triangles are rasterized into a sparse voxel heightfield, repacked into a
//! column-major compact field with neighbour links, eroded by the agent
//! radius, segmented into regions over a distance field, and finally traced
//! into simplified region contours.

mod area;
mod compact;
mod config;
mod context;
mod contour;
mod distance;
mod heightfield;
mod rasterization;
mod region;

pub use area::{
    erode_walkable_area, mark_box_area, mark_convex_poly_area, mark_cylinder_area,
    median_filter_walkable_area, offset_poly,
};
pub use compact::{
    dir_offset_x, dir_offset_y, CompactCell, CompactHeightfield, CompactSpan, NOT_CONNECTED,
};
pub use config::BuildConfig;
pub use context::{BuildContext, LogEntry, LogLevel, TimerCategory};
pub use contour::{build_contours, Contour, ContourBuildFlags, ContourSet, ContourVertex};
pub use distance::build_distance_field;
pub use heightfield::{Heightfield, Span, SPAN_MAX_HEIGHT};
pub use rasterization::{
    mark_walkable_triangles, rasterize_triangle, rasterize_triangle_soup, rasterize_triangles,
};
pub use region::{build_layer_regions, build_regions, build_regions_monotone};

use navgrid_common::{Error, Result};

/// Area tag for unwalkable space
pub const NULL_AREA: u8 = 0;
/// Default area tag for walkable surface
pub const WALKABLE_AREA: u8 = 63;
/// Bit marking synthetic border regions painted along the tile periphery
pub const BORDER_REG: u16 = 0x8000;
/// Contour vertex flag: corner on the tile boundary between paired regions
pub const BORDER_VERTEX: u32 = 0x10000;
/// Contour vertex flag: the outgoing edge borders a different area
pub const AREA_BORDER: u32 = 0x20000;
/// Mask extracting the neighbour region id from contour vertex data
pub const CONTOUR_REG_MASK: u32 = 0xffff;

/// Region partitioning algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Partition {
    /// Distance-field watershed; best general-purpose region shapes
    #[default]
    Watershed,
    /// Monotone row sweep; fastest, may produce long thin regions
    Monotone,
    /// Monotone sweep unioned into non-overlapping layers
    Layers,
}

/// Drives the full pipeline from triangle soup to a contour set
#[derive(Debug)]
pub struct GridBuilder {
    config: BuildConfig,
    partition: Partition,
}

impl GridBuilder {
    /// Creates a builder with the given configuration
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            partition: Partition::default(),
        }
    }

    /// Selects the region partitioning algorithm
    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    /// The builder's configuration
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Rasterizes the input mesh into a heightfield and applies the span
    /// filters.
    pub fn build_heightfield(
        &self,
        ctx: &mut BuildContext,
        vertices: &[f32],
        indices: &[i32],
    ) -> Result<Heightfield> {
        self.config.validate()?;
        validate_mesh(vertices, indices)?;

        let mut hf = Heightfield::new(
            self.config.width,
            self.config.height,
            self.config.bmin,
            self.config.bmax,
            self.config.cs,
            self.config.ch,
        );

        ctx.start_timer(TimerCategory::Rasterization);
        let areas = mark_walkable_triangles(self.config.walkable_slope_angle, vertices, indices);
        rasterize_triangles(vertices, indices, &areas, &mut hf, self.config.walkable_climb)?;
        ctx.stop_timer(TimerCategory::Rasterization);

        ctx.start_timer(TimerCategory::Filtering);
        hf.filter_low_hanging_walkable_obstacles(self.config.walkable_climb);
        hf.filter_ledge_spans(self.config.walkable_height, self.config.walkable_climb);
        hf.filter_walkable_low_height_spans(self.config.walkable_height);
        ctx.stop_timer(TimerCategory::Filtering);

        Ok(hf)
    }

    /// Builds the compact field from a filtered heightfield and erodes it by
    /// the agent radius.
    pub fn build_compact_field(
        &self,
        ctx: &mut BuildContext,
        hf: &Heightfield,
    ) -> Result<CompactHeightfield> {
        ctx.start_timer(TimerCategory::Compaction);
        let mut chf = CompactHeightfield::from_heightfield(
            hf,
            self.config.walkable_height,
            self.config.walkable_climb,
        )?;
        ctx.stop_timer(TimerCategory::Compaction);

        ctx.start_timer(TimerCategory::AreaMarking);
        if self.config.walkable_radius > 0 {
            erode_walkable_area(&mut chf, self.config.walkable_radius)?;
        }
        ctx.stop_timer(TimerCategory::AreaMarking);

        Ok(chf)
    }

    /// Runs the whole pipeline and returns the region contours.
    pub fn build(
        &self,
        ctx: &mut BuildContext,
        vertices: &[f32],
        indices: &[i32],
    ) -> Result<ContourSet> {
        ctx.start_timer(TimerCategory::Total);

        let hf = self.build_heightfield(ctx, vertices, indices)?;
        let mut chf = self.build_compact_field(ctx, &hf)?;

        ctx.start_timer(TimerCategory::DistanceField);
        if self.partition == Partition::Watershed {
            build_distance_field(&mut chf);
        }
        ctx.stop_timer(TimerCategory::DistanceField);

        ctx.start_timer(TimerCategory::Regions);
        match self.partition {
            Partition::Watershed => build_regions(
                &mut chf,
                self.config.border_size,
                self.config.min_region_area,
                self.config.merge_region_area,
            )?,
            Partition::Monotone => build_regions_monotone(
                &mut chf,
                self.config.border_size,
                self.config.min_region_area,
                self.config.merge_region_area,
            )?,
            Partition::Layers => build_layer_regions(
                &mut chf,
                self.config.border_size,
                self.config.min_region_area,
            )?,
        }
        ctx.stop_timer(TimerCategory::Regions);

        ctx.start_timer(TimerCategory::Contours);
        let cset = build_contours(
            &chf,
            self.config.max_simplification_error,
            self.config.max_edge_len,
            ContourBuildFlags::default(),
        )?;
        ctx.stop_timer(TimerCategory::Contours);

        ctx.stop_timer(TimerCategory::Total);
        Ok(cset)
    }
}

fn validate_mesh(vertices: &[f32], indices: &[i32]) -> Result<()> {
    if vertices.len() % 3 != 0 {
        return Err(Error::InvalidInput(
            "vertex array length must be a multiple of 3".to_string(),
        ));
    }
    if indices.len() % 3 != 0 {
        return Err(Error::InvalidInput(
            "index array length must be a multiple of 3".to_string(),
        ));
    }
    let vert_count = (vertices.len() / 3) as i32;
    if let Some(&bad) = indices.iter().find(|&&i| i < 0 || i >= vert_count) {
        return Err(Error::InvalidInput(format!(
            "triangle index {} out of range",
            bad
        )));
    }
    Ok(())
}
