// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Polyline value types in image space and point cloud space.
//!
//! ## Coordinate Systems
//!
//! - **Polyline2d**: normalized `[0, 1]` projection image coordinates, origin
//!   at the top-left, `v` increasing downward
//! - **Polyline3d**: point cloud coordinates `(x, y, z)`
//!
//! Both hold a sequence of chains, each chain an ordered sequence of points.

use crate::{Error, ProjectionMetadata};
use serde::{Deserialize, Serialize};

/// A 2D polyline drawn on an orthographic projection image.
///
/// Points are validated on construction: every point must have exactly two
/// coordinates. Deserialization goes through the same check, so a malformed
/// annotation fails fast instead of being truncated or padded.
///
/// # Examples
///
/// ```rust
/// use polyline_lift::Polyline2d;
///
/// let polyline: Polyline2d = serde_json::from_str(
///     r#"{"label": "lane", "points": [[[0.1, 0.9], [0.2, 0.5], [0.25, 0.1]]]}"#,
/// )?;
/// assert_eq!(polyline.num_chains(), 1);
/// assert_eq!(polyline.num_points(), 3);
///
/// let bad = serde_json::from_str::<Polyline2d>(
///     r#"{"label": "lane", "points": [[[0.1, 0.9, 0.0]]]}"#,
/// );
/// assert!(bad.is_err());
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "RawPolyline2d")]
pub struct Polyline2d {
    pub label: String,
    pub points: Vec<Vec<[f64; 2]>>,
}

/// Unvalidated wire shape of a 2D polyline.
#[derive(Deserialize)]
struct RawPolyline2d {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    points: Vec<Vec<Vec<f64>>>,
}

impl TryFrom<RawPolyline2d> for Polyline2d {
    type Error = Error;

    fn try_from(raw: RawPolyline2d) -> Result<Self, Self::Error> {
        Polyline2d::from_nested(raw.label.unwrap_or_default(), raw.points)
    }
}

impl Polyline2d {
    pub fn new(label: impl Into<String>, points: Vec<Vec<[f64; 2]>>) -> Self {
        Self {
            label: label.into(),
            points,
        }
    }

    /// Build a polyline from loosely shaped nested coordinates.
    ///
    /// Returns [`Error::ShapeMismatch`] naming the first offending chain and
    /// point if any point does not have exactly two coordinates. Empty chains
    /// and an empty chain list are valid.
    pub fn from_nested(label: impl Into<String>, chains: Vec<Vec<Vec<f64>>>) -> Result<Self, Error> {
        let points = chains
            .into_iter()
            .enumerate()
            .map(|(chain_idx, chain)| {
                chain
                    .into_iter()
                    .enumerate()
                    .map(|(point_idx, point)| match point.as_slice() {
                        [u, v] => Ok([*u, *v]),
                        _ => Err(Error::ShapeMismatch(format!(
                            "chain {} point {} has {} coordinates, expected 2",
                            chain_idx,
                            point_idx,
                            point.len()
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            label: label.into(),
            points,
        })
    }

    /// Build a normalized polyline from pixel coordinates on the projection
    /// image described by `metadata`.
    pub fn from_pixels(
        label: impl Into<String>,
        chains: &[Vec<[f64; 2]>],
        metadata: &ProjectionMetadata,
    ) -> Result<Self, Error> {
        let points = chains
            .iter()
            .map(|chain| {
                chain
                    .iter()
                    .map(|&[px, py]| metadata.pixel_to_normalized(px, py))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            label: label.into(),
            points,
        })
    }

    pub fn num_chains(&self) -> usize {
        self.points.len()
    }

    /// Total number of points across all chains.
    pub fn num_points(&self) -> usize {
        self.points.iter().map(Vec::len).sum()
    }
}

/// A polyline in point cloud space, produced by back-projecting a
/// [`Polyline2d`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Polyline3d {
    pub label: String,
    pub points3d: Vec<Vec<[f64; 3]>>,
}

impl Polyline3d {
    pub fn new(label: impl Into<String>, points3d: Vec<Vec<[f64; 3]>>) -> Self {
        Self {
            label: label.into(),
            points3d,
        }
    }

    pub fn num_chains(&self) -> usize {
        self.points3d.len()
    }

    pub fn num_points(&self) -> usize {
        self.points3d.iter().map(Vec::len).sum()
    }
}

/// All 2D polylines annotated on one projection image.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Polylines2d {
    #[serde(default)]
    pub polylines: Vec<Polyline2d>,
}

impl Polylines2d {
    pub fn new(polylines: Vec<Polyline2d>) -> Self {
        Self { polylines }
    }

    pub fn len(&self) -> usize {
        self.polylines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polylines.is_empty()
    }
}

/// All 3D polylines for one point cloud sample.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Polylines3d {
    #[serde(default)]
    pub polylines: Vec<Polyline3d>,
}

impl Polylines3d {
    pub fn new(polylines: Vec<Polyline3d>) -> Self {
        Self { polylines }
    }

    pub fn len(&self) -> usize {
        self.polylines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polylines.is_empty()
    }

    pub fn num_points(&self) -> usize {
        self.polylines.iter().map(Polyline3d::num_points).sum()
    }
}
