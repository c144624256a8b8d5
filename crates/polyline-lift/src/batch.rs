// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Batch reprojection of per-group polyline annotations.
//!
//! Each [`BatchEntry`] carries one projection image's 2D polylines (or `None`
//! when nothing was annotated), that image's [`ProjectionMetadata`] and the
//! identifier of the sample group it belongs to. The result maps every group
//! identifier to its 3D polylines, ready to be written onto the point cloud
//! sample of the same group.

use crate::{Polylines2d, Polylines3d, ProjectionMetadata, project};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::HashMap;

/// 3D polylines keyed by sample group identifier.
pub type GroupedPolylines3d = HashMap<String, Polylines3d>;

/// One group's input to [`reproject_batch`].
#[derive(Clone, Debug, PartialEq)]
pub struct BatchEntry {
    /// Annotated polylines, `None` when the group has no annotation.
    pub polylines: Option<Polylines2d>,
    pub metadata: ProjectionMetadata,
    pub group_id: String,
}

impl BatchEntry {
    pub fn new(
        polylines: Option<Polylines2d>,
        metadata: ProjectionMetadata,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            polylines,
            metadata,
            group_id: group_id.into(),
        }
    }

    /// Back-project this entry's polylines, preserving their order.
    pub fn reproject(&self, plane_height: f64) -> Polylines3d {
        match &self.polylines {
            Some(polylines) => Polylines3d::new(
                polylines
                    .polylines
                    .iter()
                    .map(|polyline| project(polyline, &self.metadata, plane_height))
                    .collect(),
            ),
            None => Polylines3d::default(),
        }
    }
}

/// Reproject a batch of groups onto the plane `z = plane_height`.
///
/// Every input `group_id` appears in the output exactly once; groups without
/// annotations map to an empty collection. Group identifiers are expected to
/// be unique. If one repeats, the later entry replaces the earlier one and a
/// warning is logged.
///
/// # Examples
///
/// ```rust
/// use polyline_lift::{BatchEntry, Polyline2d, Polylines2d, ProjectionMetadata, reproject_batch};
///
/// let metadata = ProjectionMetadata::new([0.0, 0.0], [10.0, 20.0], 100, 200);
/// let entries = vec![
///     BatchEntry::new(
///         Some(Polylines2d::new(vec![Polyline2d::new("lane", vec![vec![[0.0, 0.0]]])])),
///         metadata.clone(),
///         "group-1",
///     ),
///     BatchEntry::new(None, metadata, "group-2"),
/// ];
///
/// let grouped = reproject_batch(&entries, -1.6);
/// assert_eq!(grouped.len(), 2);
/// assert_eq!(grouped["group-1"].polylines[0].points3d[0][0], [0.0, 20.0, -1.6]);
/// assert!(grouped["group-2"].is_empty());
/// ```
#[cfg_attr(
    feature = "profiling",
    tracing::instrument(skip_all, fields(entries = entries.len()))
)]
pub fn reproject_batch(entries: &[BatchEntry], plane_height: f64) -> GroupedPolylines3d {
    let grouped = entries
        .iter()
        .map(|entry| (entry.group_id.as_str(), entry.reproject(plane_height)));
    collect_grouped(grouped, entries.len())
}

/// Parallel form of [`reproject_batch`] using the rayon thread pool.
///
/// Entries are independent, so the output is identical to the sequential
/// version, including which entry wins on a repeated group identifier.
#[cfg_attr(
    feature = "profiling",
    tracing::instrument(skip_all, fields(entries = entries.len()))
)]
pub fn reproject_batch_par(entries: &[BatchEntry], plane_height: f64) -> GroupedPolylines3d {
    let reprojected: Vec<_> = entries
        .par_iter()
        .map(|entry| (entry.group_id.as_str(), entry.reproject(plane_height)))
        .collect();
    collect_grouped(reprojected, entries.len())
}

fn collect_grouped<'a>(
    reprojected: impl IntoIterator<Item = (&'a str, Polylines3d)>,
    capacity: usize,
) -> GroupedPolylines3d {
    let grouped = reprojected.into_iter().fold(
        HashMap::with_capacity(capacity),
        |mut grouped, (group_id, polylines)| {
            if grouped.insert(group_id.to_owned(), polylines).is_some() {
                warn!(
                    "Duplicate group id {}, keeping the later entry's polylines",
                    group_id
                );
            }
            grouped
        },
    );

    debug!(
        "Reprojected {} entries into {} groups",
        capacity,
        grouped.len()
    );
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Polyline2d;

    fn metadata() -> ProjectionMetadata {
        ProjectionMetadata::new([0.0, 0.0], [10.0, 20.0], 100, 200)
    }

    fn polylines(labels: &[&str]) -> Polylines2d {
        Polylines2d::new(
            labels
                .iter()
                .map(|label| Polyline2d::new(*label, vec![vec![[0.5, 0.5], [1.0, 0.0]]]))
                .collect(),
        )
    }

    #[test]
    fn test_absent_polylines_yield_empty_group() {
        let entries = vec![BatchEntry::new(None, metadata(), "g0")];
        let grouped = reproject_batch(&entries, -1.6);
        assert_eq!(grouped.len(), 1);
        assert!(grouped["g0"].is_empty());
    }

    #[test]
    fn test_batch_completeness() {
        let entries: Vec<BatchEntry> = (0..25)
            .map(|i| {
                let anno = (i % 3 != 0).then(|| polylines(&["lane"]));
                BatchEntry::new(anno, metadata(), format!("group-{}", i))
            })
            .collect();
        let grouped = reproject_batch(&entries, -1.6);
        assert_eq!(grouped.len(), entries.len());
        for entry in &entries {
            let out = &grouped[&entry.group_id];
            let expected = entry.polylines.as_ref().map(Polylines2d::len).unwrap_or(0);
            assert_eq!(out.len(), expected);
        }
    }

    #[test]
    fn test_order_preserved_within_group() {
        let entries = vec![BatchEntry::new(
            Some(polylines(&["a", "b", "c", "d"])),
            metadata(),
            "g",
        )];
        let grouped = reproject_batch(&entries, 0.0);
        let labels: Vec<&str> = grouped["g"]
            .polylines
            .iter()
            .map(|p| p.label.as_str())
            .collect();
        assert_eq!(labels, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_per_entry_metadata() {
        let other = ProjectionMetadata::new([100.0, 100.0], [110.0, 120.0], 100, 200);
        let entries = vec![
            BatchEntry::new(Some(polylines(&["lane"])), metadata(), "g0"),
            BatchEntry::new(Some(polylines(&["lane"])), other, "g1"),
        ];
        let grouped = reproject_batch(&entries, -1.0);
        assert_eq!(grouped["g0"].polylines[0].points3d[0][1], [10.0, 20.0, -1.0]);
        assert_eq!(grouped["g1"].polylines[0].points3d[0][1], [110.0, 120.0, -1.0]);
    }

    #[test]
    fn test_duplicate_group_keeps_later_entry() {
        let entries = vec![
            BatchEntry::new(Some(polylines(&["first"])), metadata(), "dup"),
            BatchEntry::new(Some(polylines(&["second", "third"])), metadata(), "dup"),
        ];
        let grouped = reproject_batch(&entries, 0.0);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped["dup"].polylines[0].label, "second");

        let grouped_par = reproject_batch_par(&entries, 0.0);
        assert_eq!(grouped, grouped_par);
    }

    #[test]
    fn test_inputs_untouched() {
        let entries = vec![BatchEntry::new(Some(polylines(&["lane"])), metadata(), "g")];
        let before = entries.clone();
        let _ = reproject_batch(&entries, -1.6);
        assert_eq!(entries, before);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let entries: Vec<BatchEntry> = (0..200)
            .map(|i| {
                let anno = (i % 5 != 0).then(|| polylines(&["lane", "curb"]));
                BatchEntry::new(anno, metadata(), format!("g{}", i))
            })
            .collect();
        assert_eq!(
            reproject_batch(&entries, -1.6),
            reproject_batch_par(&entries, -1.6)
        );
    }

    #[test]
    fn test_empty_batch() {
        assert!(reproject_batch(&[], -1.6).is_empty());
        assert!(reproject_batch_par(&[], -1.6).is_empty());
    }
}
