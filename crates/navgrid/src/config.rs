//! Configuration for a walkable-surface build

use glam::Vec3;
use navgrid_common::{Error, Result};

/// Parameters controlling a single tile build.
///
/// Grid sizes are derived from the bounds via [`BuildConfig::calc_grid_size`];
/// all `walkable_*` values are in voxel units.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// The width of the field along the x-axis in cells
    pub width: i32,
    /// The height of the field along the z-axis in cells
    pub height: i32,

    /// Horizontal cell size
    pub cs: f32,
    /// Vertical cell size
    pub ch: f32,

    /// The minimum bounds of the field's AABB
    pub bmin: Vec3,
    /// The maximum bounds of the field's AABB
    pub bmax: Vec3,

    /// The maximum slope in degrees that is considered walkable
    pub walkable_slope_angle: f32,
    /// Minimum floor-to-ceiling clearance for a floor to stay walkable
    pub walkable_height: i32,
    /// The maximum ledge height that is still traversable
    pub walkable_climb: i32,
    /// The distance to erode the walkable area away from obstructions
    pub walkable_radius: i32,

    /// Maximum allowed length for contour edges along the mesh border (0 disables splitting)
    pub max_edge_len: i32,
    /// Maximum distance a simplified contour may deviate from the raw contour
    pub max_simplification_error: f32,
    /// Minimum number of spans allowed to form an isolated region
    pub min_region_area: i32,
    /// Regions with span counts at or below this are merged into neighbours when possible
    pub merge_region_area: i32,

    /// Width of the synthetic border painted around the tile edge
    pub border_size: i32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            cs: 0.3,
            ch: 0.2,
            bmin: Vec3::ZERO,
            bmax: Vec3::ZERO,
            walkable_slope_angle: 45.0,
            walkable_height: 10,
            walkable_climb: 4,
            walkable_radius: 2,
            max_edge_len: 40,
            max_simplification_error: 1.3,
            min_region_area: 8,
            merge_region_area: 20,
            border_size: 0,
        }
    }
}

impl BuildConfig {
    /// Sets the bounds and derives the grid size from them
    pub fn calc_grid_size(&mut self, bmin: Vec3, bmax: Vec3) {
        self.bmin = bmin;
        self.bmax = bmax;
        let (w, h) = navgrid_common::calc_grid_size(bmin, bmax, self.cs);
        self.width = w;
        self.height = h;
    }

    /// Validates the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(Error::InvalidInput("grid size must be positive".to_string()));
        }
        if self.cs <= 0.0 || self.ch <= 0.0 {
            return Err(Error::InvalidInput(
                "cell size and cell height must be positive".to_string(),
            ));
        }
        if !(0.0..=90.0).contains(&self.walkable_slope_angle) {
            return Err(Error::InvalidInput(
                "walkable slope angle must be in [0, 90]".to_string(),
            ));
        }
        if self.walkable_height < 1 {
            return Err(Error::InvalidInput(
                "walkable height must be at least 1".to_string(),
            ));
        }
        if self.walkable_climb < 0 || self.walkable_radius < 0 {
            return Err(Error::InvalidInput(
                "walkable climb and radius must be non-negative".to_string(),
            ));
        }
        if self.min_region_area < 0 || self.merge_region_area < 0 {
            return Err(Error::InvalidInput(
                "region area thresholds must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
