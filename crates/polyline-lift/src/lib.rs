// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # Polyline Lift
//!
//! Converts 2D polyline annotations drawn on an orthographic (top-down)
//! projection image of a point cloud back into 3D polylines in point cloud
//! space.
//!
//! The projection image covers a bounded rectangle of the point cloud's
//! `(x, y)` plane. Since the image carries no height, every annotated point is
//! placed on a single horizontal plane, `z = plane_height`, typically the road
//! surface.
//!
//! ## Features
//!
//! - **Back-projection**: [`project`] maps one [`Polyline2d`] to a
//!   [`Polyline3d`] using the image's [`ProjectionMetadata`]
//! - **Batch reprojection**: [`reproject_batch`] lifts every group of a
//!   dataset and keys the results by group identifier
//! - **Dataset access**: the [`DatasetStore`] trait isolates the geometry
//!   from the host dataset; [`JsonDatasetStore`] works on JSON snapshots
//! - **Load flow**: [`load_polylines`] fetches, reprojects and stores in one
//!   call, driven by [`Settings`]. Results only land in the point cloud slice
//! - **Polars Integration**: optional DataFrame export of 3D polylines
//!
//! ## Quick Start
//!
//! ```rust
//! use polyline_lift::{Polyline2d, ProjectionMetadata, project};
//!
//! let metadata = ProjectionMetadata::new([0.0, 0.0], [10.0, 20.0], 1080, 2160);
//! let lane = Polyline2d::new("lane", vec![vec![[0.0, 0.0], [1.0, 1.0]]]);
//!
//! let lifted = project(&lane, &metadata, -1.6);
//! assert_eq!(lifted.label, "lane");
//! assert_eq!(lifted.points3d[0], vec![[0.0, 20.0, -1.6], [10.0, 0.0, -1.6]]);
//! ```
//!
//! ## Optional Features
//!
//! - `polars`: Enables [`polylines3d_dataframe`] for export to Polars
//!   DataFrames
//! - `profiling`: Adds `tracing` spans to the projection and batch operations

mod batch;
mod error;
mod loader;
mod metadata;
mod polyline;
mod project;
mod settings;
mod store;

#[cfg(feature = "polars")]
mod dataframe;

pub use crate::{
    batch::{BatchEntry, GroupedPolylines3d, reproject_batch, reproject_batch_par},
    error::Error,
    loader::{
        LoadSummary, entry_from_record, fetch_entries, load_polylines, load_polylines_grouped,
        reproject_entries,
    },
    metadata::ProjectionMetadata,
    polyline::{Polyline2d, Polyline3d, Polylines2d, Polylines3d},
    project::{BackProjector, DEFAULT_PLANE_HEIGHT, project, project_point},
    settings::{ENV_PREFIX, Settings},
    store::{
        DatasetStore, GROUP_ID_FIELD, GROUP_SLICE_FIELD, JsonDatasetStore, MEDIA_TYPE_FIELD,
        MemoryDatasetStore, POINT_CLOUD_MEDIA_TYPES, Record, TAGS_FIELD, lookup, value_key,
    },
};

#[cfg(feature = "polars")]
pub use crate::dataframe::polylines3d_dataframe;

#[cfg(test)]
mod tests {
    use super::*;

    #[ctor::ctor]
    fn init() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    #[test]
    fn test_batch_output_matches_single_projection() {
        let metadata = ProjectionMetadata::new([-40.0, -40.0], [40.0, 40.0], 1080, 1080);
        let polylines = Polylines2d::new(vec![
            Polyline2d::new("lane", vec![vec![[0.1, 0.9], [0.12, 0.5], [0.15, 0.1]]]),
            Polyline2d::new("stop_line", vec![vec![[0.4, 0.3], [0.6, 0.3]]]),
        ]);
        let entries = vec![BatchEntry::new(Some(polylines.clone()), metadata.clone(), "g")];

        let grouped = reproject_batch(&entries, DEFAULT_PLANE_HEIGHT);
        let expected: Vec<Polyline3d> = polylines
            .polylines
            .iter()
            .map(|p| project(p, &metadata, DEFAULT_PLANE_HEIGHT))
            .collect();
        assert_eq!(grouped["g"].polylines, expected);
    }
}
