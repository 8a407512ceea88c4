//! CLI driver: load an OBJ mesh, run the pipeline, dump region contours

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use navgrid::{BuildConfig, BuildContext, ContourSet, GridBuilder, Partition};
use navgrid_common::TriMesh;

/// Walkable-surface extraction from triangle meshes
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PartitionArg {
    Watershed,
    Monotone,
    Layers,
}

impl From<PartitionArg> for Partition {
    fn from(value: PartitionArg) -> Self {
        match value {
            PartitionArg::Watershed => Partition::Watershed,
            PartitionArg::Monotone => Partition::Monotone,
            PartitionArg::Layers => Partition::Layers,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build region contours from an input mesh
    Build {
        /// Input mesh file (OBJ format)
        #[clap(long)]
        input: PathBuf,

        /// Output contour file (JSON)
        #[clap(long)]
        output: PathBuf,

        /// Cell size (horizontal resolution)
        #[clap(long, default_value = "0.3")]
        cs: f32,

        /// Cell height (vertical resolution)
        #[clap(long, default_value = "0.2")]
        ch: f32,

        /// Maximum walkable slope in degrees
        #[clap(long, default_value = "45.0")]
        walkable_slope_angle: f32,

        /// Minimum clearance for a floor to stay walkable, in voxels
        #[clap(long, default_value = "10")]
        walkable_height: i32,

        /// Maximum traversable ledge height, in voxels
        #[clap(long, default_value = "4")]
        walkable_climb: i32,

        /// Agent radius to erode the walkable area by, in voxels
        #[clap(long, default_value = "2")]
        walkable_radius: i32,

        /// Maximum contour edge length, in voxels (0 disables splitting)
        #[clap(long, default_value = "40")]
        max_edge_len: i32,

        /// Maximum contour simplification error, in voxels
        #[clap(long, default_value = "1.3")]
        max_simplification_error: f32,

        /// Minimum region area, in spans
        #[clap(long, default_value = "8")]
        min_region_area: i32,

        /// Merge regions smaller than this, in spans
        #[clap(long, default_value = "20")]
        merge_region_area: i32,

        /// Border size around the tile, in voxels
        #[clap(long, default_value = "0")]
        border_size: i32,

        /// Region partitioning algorithm
        #[clap(long, value_enum, default_value = "watershed")]
        partition: PartitionArg,

        /// Print per-stage timing after the build
        #[clap(long)]
        timings: bool,
    },

    /// Print mesh statistics
    Info {
        /// Input mesh file (OBJ format)
        #[clap(long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Build {
            input,
            output,
            cs,
            ch,
            walkable_slope_angle,
            walkable_height,
            walkable_climb,
            walkable_radius,
            max_edge_len,
            max_simplification_error,
            min_region_area,
            merge_region_area,
            border_size,
            partition,
            timings,
        } => {
            let mesh = TriMesh::from_obj(&input)
                .with_context(|| format!("failed to load mesh from {}", input.display()))?;
            let (bmin, bmax) = mesh.calculate_bounds();

            let mut config = BuildConfig {
                cs,
                ch,
                walkable_slope_angle,
                walkable_height,
                walkable_climb,
                walkable_radius,
                max_edge_len,
                max_simplification_error,
                min_region_area,
                merge_region_area,
                border_size,
                ..Default::default()
            };
            config.calc_grid_size(bmin, bmax);

            let builder = GridBuilder::new(config).with_partition(partition.into());
            let mut ctx = BuildContext::new();
            let cset = builder
                .build(&mut ctx, &mesh.vertices, &mesh.indices)
                .context("pipeline failed")?;

            write_contours(&output, &cset)
                .with_context(|| format!("failed to write {}", output.display()))?;

            println!(
                "{} contours written to {}",
                cset.contours.len(),
                output.display()
            );
            if timings {
                for (category, duration) in ctx.timer_summary() {
                    println!("{:>14.3} ms  {:?}", duration.as_secs_f64() * 1000.0, category);
                }
            }
            Ok(())
        }

        Commands::Info { input } => {
            let mesh = TriMesh::from_obj(&input)
                .with_context(|| format!("failed to load mesh from {}", input.display()))?;
            let (bmin, bmax) = mesh.calculate_bounds();
            println!("vertices:  {}", mesh.vert_count());
            println!("triangles: {}", mesh.tri_count());
            println!("bounds:    {:?} .. {:?}", bmin, bmax);
            Ok(())
        }
    }
}

fn write_contours(path: &Path, cset: &ContourSet) -> Result<()> {
    let contours: Vec<serde_json::Value> = cset
        .contours
        .iter()
        .map(|c| {
            serde_json::json!({
                "region": c.reg,
                "area": c.area,
                "vertices": c.verts.iter()
                    .map(|v| serde_json::json!([v.x, v.y, v.z, v.data]))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    let doc = serde_json::json!({
        "bmin": [cset.bmin.x, cset.bmin.y, cset.bmin.z],
        "bmax": [cset.bmax.x, cset.bmax.y, cset.bmax.z],
        "cs": cset.cs,
        "ch": cset.ch,
        "width": cset.width,
        "height": cset.height,
        "contours": contours,
    });

    let mut file = File::create(path)?;
    file.write_all(serde_json::to_string_pretty(&doc)?.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}
