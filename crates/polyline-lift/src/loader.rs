// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Load 2D polyline annotations from a dataset and store them as 3D
//! polylines.
//!
//! The flow reads the projection slice's polylines, projection metadata and
//! group ids through a [`DatasetStore`], reprojects every group onto the
//! configured plane and writes the results onto the point cloud samples
//! sharing each group id.

use crate::{
    BatchEntry, DatasetStore, Error, GroupedPolylines3d, Polylines2d, Polylines3d,
    ProjectionMetadata, Record, Settings, reproject_batch, reproject_batch_par,
};
use log::{debug, info};

/// Counts from one [`load_polylines`] run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Distinct groups reprojected.
    pub groups: usize,
    /// Groups that produced no 3D polyline.
    pub empty_groups: usize,
    /// 3D polylines produced.
    pub polylines: usize,
    /// 3D points produced.
    pub points: usize,
    /// Samples the results were written to.
    pub written: usize,
}

impl LoadSummary {
    /// Summarize a reprojection into `grouped` that wrote `written` samples.
    pub fn new(grouped: &GroupedPolylines3d, written: usize) -> Self {
        Self {
            groups: grouped.len(),
            empty_groups: grouped.values().filter(|p| p.is_empty()).count(),
            polylines: grouped.values().map(Polylines3d::len).sum(),
            points: grouped.values().map(Polylines3d::num_points).sum(),
            written,
        }
    }
}

impl std::fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} groups ({} without annotations), {} polylines, {} points, {} samples written",
            self.groups, self.empty_groups, self.polylines, self.points, self.written
        )
    }
}

/// Convert one fetched record into a batch entry.
///
/// The group key is always required. Projection metadata is required only
/// when the record carries polylines; unannotated records without metadata
/// use [`ProjectionMetadata::default`] since nothing is projected for them.
pub fn entry_from_record(record: &Record, settings: &Settings) -> Result<BatchEntry, Error> {
    let group_id = record.key(&settings.key_field).ok_or_else(|| {
        Error::MissingField(format!("record has no usable {}", settings.key_field))
    })?;

    let polylines = record
        .get(&settings.projection_field)
        .map(|value| serde_json::from_value::<Polylines2d>(value.clone()))
        .transpose()
        .map_err(|e| {
            Error::ShapeMismatch(format!(
                "group {} field {}: {}",
                group_id, settings.projection_field, e
            ))
        })?;

    let metadata = match record.get(&settings.metadata_field) {
        Some(value) => serde_json::from_value::<ProjectionMetadata>(value.clone()).map_err(|e| {
            Error::ShapeMismatch(format!(
                "group {} field {}: {}",
                group_id, settings.metadata_field, e
            ))
        })?,
        None if polylines.is_none() => ProjectionMetadata::default(),
        None => {
            return Err(Error::MissingField(format!(
                "group {} has polylines but no {}",
                group_id, settings.metadata_field
            )));
        }
    };

    Ok(BatchEntry::new(polylines, metadata, group_id))
}

/// Fetch the projection slice's records and convert them to batch entries.
pub fn fetch_entries<S>(store: &S, settings: &Settings) -> Result<Vec<BatchEntry>, Error>
where
    S: DatasetStore + ?Sized,
{
    let fields = [
        settings.projection_field.as_str(),
        settings.metadata_field.as_str(),
        settings.key_field.as_str(),
    ];

    store
        .fetch_batch(&fields)?
        .iter()
        .map(|record| entry_from_record(record, settings))
        .collect()
}

/// Reproject entries onto `settings.plane_height`, in parallel when
/// `settings.parallel` is set.
pub fn reproject_entries(entries: &[BatchEntry], settings: &Settings) -> GroupedPolylines3d {
    debug!(
        "Reprojecting {} groups onto z = {}",
        entries.len(),
        settings.plane_height
    );

    if settings.parallel {
        reproject_batch_par(entries, settings.plane_height)
    } else {
        reproject_batch(entries, settings.plane_height)
    }
}

/// Reproject every annotated group in `store` and write the 3D polylines
/// into `settings.label_field` of the store's point cloud slice.
///
/// Nothing is written if the point cloud slice cannot be resolved or any
/// record fails to convert.
///
/// # Examples
///
/// ```rust
/// use polyline_lift::{MemoryDatasetStore, Settings, load_polylines};
/// use serde_json::json;
///
/// let mut store = MemoryDatasetStore::new(vec![
///     json!({
///         "group": {"id": "g1", "name": "projection"},
///         "media_type": "image",
///         "polyline_2d": {"polylines": [{"label": "lane", "points": [[[0.0, 0.0], [1.0, 1.0]]]}]},
///         "orthographic_projection_metadata": {"min_bound": [0, 0, 0], "max_bound": [10, 20, 0]},
///     }),
///     json!({"group": {"id": "g1", "name": "pcd"}, "media_type": "pcd"}),
/// ])
/// .with_source_slice("projection");
///
/// let summary = load_polylines(&mut store, &Settings::default())?;
/// assert_eq!(summary.polylines, 1);
/// assert_eq!(
///     store.samples()[1]["polylines_3d"]["polylines"][0]["points3d"][0][0],
///     json!([0.0, 20.0, -1.6])
/// );
/// # Ok::<(), polyline_lift::Error>(())
/// ```
pub fn load_polylines<S>(store: &mut S, settings: &Settings) -> Result<LoadSummary, Error>
where
    S: DatasetStore + ?Sized,
{
    load_polylines_grouped(store, settings).map(|(summary, _)| summary)
}

/// [`load_polylines`], also returning the stored 3D polylines.
#[cfg_attr(feature = "profiling", tracing::instrument(skip_all))]
pub fn load_polylines_grouped<S>(
    store: &mut S,
    settings: &Settings,
) -> Result<(LoadSummary, GroupedPolylines3d), Error>
where
    S: DatasetStore + ?Sized,
{
    settings.validate()?;
    let target = store.target_slice()?;

    let entries = fetch_entries(&*store, settings)?;
    let grouped = reproject_entries(&entries, settings);
    let written = store.store_batch(&settings.label_field, &grouped, &settings.key_field)?;

    let summary = LoadSummary::new(&grouped, written);
    info!(
        "Loaded polylines into {} of slice {}: {}",
        settings.label_field, target, summary
    );
    Ok((summary, grouped))
}
