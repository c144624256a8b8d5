// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use polyline_lift::{
    Error, GroupedPolylines3d, JsonDatasetStore, Polyline2d, Polylines2d, Polylines3d,
    ProjectionMetadata, Settings, fetch_entries, load_polylines_grouped, project,
};
use serde_json::Value;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (TOML, JSON or YAML) layered over the built-in defaults
    #[clap(long, env = "POLYLINE_LIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Client Command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Back-project a single polyline (or a `{"polylines": [...]}` collection)
    /// using the provided projection metadata and print the 3D result as
    /// JSON.
    Project {
        /// Projection metadata JSON file
        #[clap(long)]
        metadata: PathBuf,

        /// 2D polyline JSON file with normalized coordinates
        #[clap(long)]
        polyline: PathBuf,

        /// Height of the plane the polyline is lifted onto
        #[clap(long, allow_negative_numbers = true)]
        plane_height: Option<f64>,
    },
    /// Reproject the 2D polylines of a dataset snapshot and store the 3D
    /// polylines on the point cloud sample of each group.  The projection
    /// slice is read and only the point cloud slice is written.
    ///
    /// The snapshot is updated in place unless `--output` is given.  It is
    /// left untouched when any step fails.
    Load {
        /// Dataset snapshot JSON file
        dataset: PathBuf,

        /// Field to store the 3D polylines into
        #[clap(long)]
        label_field: Option<String>,

        /// Group slice holding the point clouds, inferred from the slice
        /// media types when omitted
        #[clap(long)]
        pcd_slice: Option<String>,

        /// Group slice holding the projection images
        #[clap(long)]
        projection_slice: Option<String>,

        /// Height of the road surface in the point cloud
        #[clap(long, allow_negative_numbers = true)]
        plane_height: Option<f64>,

        /// Reproject groups in parallel
        #[clap(long)]
        parallel: bool,

        /// Process every group even when some samples carry the annotate tag
        #[clap(long)]
        all_groups: bool,

        /// Output snapshot path
        #[clap(long)]
        output: Option<PathBuf>,

        /// Also export the 3D polylines as an Arrow IPC table
        #[clap(long)]
        arrow: Option<PathBuf>,
    },
    /// List the groups of a dataset snapshot with their 2D polyline counts.
    Inspect {
        /// Dataset snapshot JSON file
        dataset: PathBuf,
    },
}

fn read_json(path: &Path) -> Result<Value, Error> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn open_store(dataset: &Path, settings: &Settings) -> Result<JsonDatasetStore, Error> {
    let store =
        JsonDatasetStore::open(dataset)?.with_source_slice(settings.projection_slice.clone());
    let store = match &settings.pcd_slice {
        Some(slice) => store.with_target_slice(slice.clone()),
        None => store,
    };
    Ok(match &settings.annotate_tag {
        Some(tag) => store.with_annotate_tag(tag.clone()),
        None => store,
    })
}

fn handle_project(
    settings: &Settings,
    metadata: PathBuf,
    polyline: PathBuf,
    plane_height: Option<f64>,
) -> Result<(), Error> {
    let metadata: ProjectionMetadata = serde_json::from_value(read_json(&metadata)?)?;
    let plane_height = plane_height.unwrap_or(settings.plane_height);

    if !metadata.is_well_formed() {
        log::warn!(
            "Projection bounds {:?} to {:?} are not ordered, output will be mirrored",
            metadata.min_bound(),
            metadata.max_bound()
        );
    }

    let value = read_json(&polyline)?;
    let output = if value.get("polylines").is_some() {
        let polylines: Polylines2d = serde_json::from_value(value)?;
        let lifted = Polylines3d::new(
            polylines
                .polylines
                .iter()
                .map(|p| project(p, &metadata, plane_height))
                .collect(),
        );
        serde_json::to_string_pretty(&lifted)?
    } else {
        let polyline: Polyline2d = serde_json::from_value(value)?;
        serde_json::to_string_pretty(&project(&polyline, &metadata, plane_height))?
    };

    println!("{}", output);
    Ok(())
}

fn handle_load(
    settings: &Settings,
    dataset: PathBuf,
    output: Option<PathBuf>,
    arrow: Option<PathBuf>,
) -> Result<(), Error> {
    let mut store = open_store(&dataset, settings)?;
    let (summary, grouped) = load_polylines_grouped(&mut store, settings)?;

    // Export before saving: a failed export must leave the snapshot unchanged.
    if let Some(arrow) = &arrow {
        write_arrow(arrow, &grouped)?;
    }

    match &output {
        Some(output) => store.save_to(output)?,
        None => store.save()?,
    }

    println!("{}", summary);
    Ok(())
}

#[cfg(feature = "polars")]
fn write_arrow(path: &Path, grouped: &GroupedPolylines3d) -> Result<(), Error> {
    use polars::{io::SerWriter as _, prelude::IpcWriter};

    let mut df = polyline_lift::polylines3d_dataframe(grouped)?;
    IpcWriter::new(File::create(path)?).finish(&mut df)?;
    log::info!("Wrote {} polylines to {:?}", df.height(), path);
    Ok(())
}

#[cfg(not(feature = "polars"))]
fn write_arrow(_path: &Path, _grouped: &GroupedPolylines3d) -> Result<(), Error> {
    Err(Error::FeatureNotEnabled("polars".to_owned()))
}

fn handle_inspect(settings: &Settings, dataset: PathBuf) -> Result<(), Error> {
    let store = open_store(&dataset, settings)?;
    for entry in fetch_entries(&store, settings)? {
        match &entry.polylines {
            Some(polylines) => println!(
                "[{}] {} polylines, {} points",
                entry.group_id,
                polylines.len(),
                polylines
                    .polylines
                    .iter()
                    .map(Polyline2d::num_points)
                    .sum::<usize>()
            ),
            None => println!("[{}] not annotated", entry.group_id),
        }
    }
    Ok(())
}

#[cfg(feature = "profiling")]
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
}

fn main() -> Result<(), Error> {
    #[cfg(feature = "profiling")]
    init_tracing();
    #[cfg(not(feature = "profiling"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;

    match args.cmd {
        Command::Project {
            metadata,
            polyline,
            plane_height,
        } => handle_project(&settings, metadata, polyline, plane_height),
        Command::Load {
            dataset,
            label_field,
            pcd_slice,
            projection_slice,
            plane_height,
            parallel,
            all_groups,
            output,
            arrow,
        } => {
            if let Some(label_field) = label_field {
                settings.label_field = label_field;
            }
            if pcd_slice.is_some() {
                settings.pcd_slice = pcd_slice;
            }
            if let Some(projection_slice) = projection_slice {
                settings.projection_slice = projection_slice;
            }
            if let Some(plane_height) = plane_height {
                settings.plane_height = plane_height;
            }
            if all_groups {
                settings.annotate_tag = None;
            }
            settings.parallel |= parallel;
            settings.validate()?;

            handle_load(&settings, dataset, output, arrow)
        }
        Command::Inspect { dataset } => handle_inspect(&settings, dataset),
    }
}
