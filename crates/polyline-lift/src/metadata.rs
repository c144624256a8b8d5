// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Orthographic projection metadata.
//!
//! Describes how a bounded region of a point cloud was flattened into a
//! top-down image. The image covers `[min_bound, max_bound]` in the point
//! cloud's `(x, y)` plane; image rows run from `max_bound.y` (top) down to
//! `min_bound.y` (bottom).

use crate::Error;
use serde::{Deserialize, Deserializer, Serialize};

/// Spatial bounds and image size of one orthographic projection.
///
/// Bounds are expected to satisfy `max_bound[i] >= min_bound[i]`. This is not
/// enforced: inverted or degenerate bounds still produce finite (but
/// meaningless) back-projections, see [`ProjectionMetadata::is_well_formed`].
///
/// The host dataset stores bounds as `[x, y, z]` vectors; deserialization
/// accepts any vector with at least two components and keeps `(x, y)`.
///
/// The default value is the degenerate zero-size region at the origin.
///
/// # Examples
///
/// ```rust
/// use polyline_lift::ProjectionMetadata;
///
/// let metadata: ProjectionMetadata = serde_json::from_str(
///     r#"{"min_bound": [-20.0, -10.0, -3.0], "max_bound": [20.0, 10.0, 1.0],
///         "width": 1920, "height": 1080}"#,
/// )?;
/// assert_eq!(metadata.min_bound(), [-20.0, -10.0]);
/// assert_eq!(metadata.extent(), [40.0, 20.0]);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ProjectionMetadata {
    #[serde(deserialize_with = "deserialize_bound")]
    min_bound: [f64; 2],
    #[serde(deserialize_with = "deserialize_bound")]
    max_bound: [f64; 2],
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

fn deserialize_bound<'de, D>(deserializer: D) -> Result<[f64; 2], D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<f64>::deserialize(deserializer)?;
    match values.as_slice() {
        [x, y, ..] => Ok([*x, *y]),
        _ => Err(serde::de::Error::custom(format!(
            "bound requires at least 2 components, found {}",
            values.len()
        ))),
    }
}

impl ProjectionMetadata {
    pub fn new(min_bound: [f64; 2], max_bound: [f64; 2], width: u32, height: u32) -> Self {
        Self {
            min_bound,
            max_bound,
            width,
            height,
        }
    }

    pub fn min_bound(&self) -> [f64; 2] {
        self.min_bound
    }

    pub fn max_bound(&self) -> [f64; 2] {
        self.max_bound
    }

    /// Projection image width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Projection image height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size of the projected region along each axis, `max_bound - min_bound`.
    ///
    /// Negative when the bounds are inverted.
    pub fn extent(&self) -> [f64; 2] {
        [
            self.max_bound[0] - self.min_bound[0],
            self.max_bound[1] - self.min_bound[1],
        ]
    }

    /// Returns `true` when all bounds are finite and `max_bound >= min_bound`
    /// on both axes.
    ///
    /// Back-projection does not consult this; callers that want to reject
    /// malformed metadata can check it up front.
    pub fn is_well_formed(&self) -> bool {
        self.min_bound
            .iter()
            .chain(self.max_bound.iter())
            .all(|v| v.is_finite())
            && self.max_bound[0] >= self.min_bound[0]
            && self.max_bound[1] >= self.min_bound[1]
    }

    /// Convert pixel coordinates on the projection image to normalized
    /// `[0, 1]` image coordinates.
    ///
    /// Annotation backends commonly report vertices in pixels; the
    /// back-projection works on normalized coordinates.
    pub fn pixel_to_normalized(&self, px: f64, py: f64) -> Result<[f64; 2], Error> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidParameters(format!(
                "projection image size must be positive, got {}x{}",
                self.width, self.height
            )));
        }

        Ok([px / self.width as f64, py / self.height as f64])
    }

    /// Forward point mapping from point cloud `(x, y)` to normalized image
    /// coordinates `(u, v)`, with `v = 0` at `max_bound.y`.
    ///
    /// This is the exact inverse of [`crate::project_point`]. A zero-extent
    /// axis yields a non-finite component.
    pub fn to_normalized(&self, x: f64, y: f64) -> [f64; 2] {
        let [dx, dy] = self.extent();
        let u = (x - self.min_bound[0]) / dx;
        let v = 1.0 - (y - self.min_bound[1]) / dy;
        [u, v]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_three_component_bounds() {
        let json = r#"{
            "min_bound": [-51.2, -25.6, -5.0],
            "max_bound": [51.2, 25.6, 3.0],
            "width": 2160,
            "height": 1080
        }"#;
        let metadata: ProjectionMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.min_bound(), [-51.2, -25.6]);
        assert_eq!(metadata.max_bound(), [51.2, 25.6]);
        assert_eq!(metadata.width(), 2160);
        assert_eq!(metadata.height(), 1080);
    }

    #[test]
    fn test_deserialize_ignores_host_fields() {
        let json = r#"{
            "_cls": "OrthographicProjectionMetadata",
            "filepath": "/tmp/projection/000001.png",
            "min_bound": [0.0, 0.0],
            "max_bound": [10.0, 20.0]
        }"#;
        let metadata: ProjectionMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.extent(), [10.0, 20.0]);
        assert_eq!(metadata.width(), 0);
    }

    #[test]
    fn test_deserialize_rejects_short_bound() {
        let json = r#"{"min_bound": [0.0], "max_bound": [10.0, 20.0]}"#;
        let err = serde_json::from_str::<ProjectionMetadata>(json).unwrap_err();
        assert!(err.to_string().contains("at least 2 components"));
    }

    #[test]
    fn test_well_formed() {
        assert!(ProjectionMetadata::new([0.0, 0.0], [10.0, 20.0], 100, 200).is_well_formed());
        // Degenerate but ordered bounds are still accepted.
        assert!(ProjectionMetadata::new([5.0, 5.0], [5.0, 5.0], 1, 1).is_well_formed());
        assert!(!ProjectionMetadata::new([10.0, 0.0], [0.0, 20.0], 1, 1).is_well_formed());
        assert!(!ProjectionMetadata::new([0.0, f64::NAN], [10.0, 20.0], 1, 1).is_well_formed());
    }

    #[test]
    fn test_pixel_to_normalized() {
        let metadata = ProjectionMetadata::new([0.0, 0.0], [10.0, 20.0], 1920, 1080);
        let [u, v] = metadata.pixel_to_normalized(960.0, 270.0).unwrap();
        assert!((u - 0.5).abs() < 1e-12);
        assert!((v - 0.25).abs() < 1e-12);

        let empty = ProjectionMetadata::new([0.0, 0.0], [10.0, 20.0], 0, 1080);
        assert!(matches!(
            empty.pixel_to_normalized(1.0, 1.0),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_to_normalized_corners() {
        let metadata = ProjectionMetadata::new([0.0, 0.0], [10.0, 20.0], 100, 200);
        assert_eq!(metadata.to_normalized(0.0, 20.0), [0.0, 0.0]);
        assert_eq!(metadata.to_normalized(10.0, 0.0), [1.0, 1.0]);
    }

    #[test]
    fn test_to_normalized_degenerate_axis() {
        let metadata = ProjectionMetadata::new([0.0, 3.0], [10.0, 3.0], 100, 200);
        let [u, v] = metadata.to_normalized(5.0, 3.0);
        assert_eq!(u, 0.5);
        assert!(!v.is_finite());
    }
}
