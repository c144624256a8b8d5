// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Polars export of reprojected polylines.

use crate::{Error, GroupedPolylines3d};
use itertools::Itertools;
use polars::prelude::*;

/// Flatten chains into one coordinate list, `x, y, z` per point, with a NaN
/// separating consecutive chains.
fn flatten_chains(chains: &[Vec<[f64; 3]>]) -> Vec<f64> {
    let mut list = Vec::new();

    for (idx, chain) in chains.iter().enumerate() {
        if idx > 0 {
            list.push(f64::NAN);
        }
        for point in chain {
            list.extend_from_slice(point);
        }
    }

    list
}

/// Create a DataFrame with one row per 3D polyline.
///
/// # Schema
///
/// - `group`: Sample group identifier (String)
/// - `label`: Polyline label (Categorical)
/// - `points3d`: Chains flattened to `x, y, z` triples with NaN between
///   chains (List<Float64>)
///
/// Rows are ordered by group identifier, then by polyline order within the
/// group. Groups without polylines contribute no rows.
pub fn polylines3d_dataframe(grouped: &GroupedPolylines3d) -> Result<DataFrame, Error> {
    let (groups, labels, points) = grouped
        .iter()
        .sorted_by(|a, b| a.0.cmp(b.0))
        .flat_map(|(group_id, polylines)| {
            polylines.polylines.iter().map(move |polyline| {
                (
                    group_id.as_str(),
                    polyline.label.as_str(),
                    Series::new("points3d".into(), flatten_chains(&polyline.points3d)),
                )
            })
        })
        .multiunzip::<(
            Vec<_>, // groups
            Vec<_>, // labels
            Vec<_>, // points
        )>();

    let groups = Series::new("group".into(), groups).into();
    let labels = Series::new("label".into(), labels)
        .cast(&DataType::Categorical(
            Categories::new("labels".into(), "labels".into(), CategoricalPhysical::U8),
            Arc::new(CategoricalMapping::new(u8::MAX as usize)),
        ))?
        .into();
    let points = Series::new("points3d".into(), points)
        .cast(&DataType::List(Box::new(DataType::Float64)))?
        .into();

    Ok(DataFrame::new(vec![groups, labels, points])?)
}
