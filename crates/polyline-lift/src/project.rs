// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Back-projection of projection image polylines onto a horizontal plane in
//! point cloud space.
//!
//! The projection image maps the rectangle `[min_bound, max_bound]` onto the
//! unit square with the vertical image axis inverted: image row `v = 0` is
//! `max_bound.y`. A normalized point `(u, v)` therefore lifts to
//!
//! ```text
//! x = u       * (max_bound.x - min_bound.x) + min_bound.x
//! y = (1 - v) * (max_bound.y - min_bound.y) + min_bound.y
//! z = plane_height
//! ```
//!
//! Height is not recoverable from the image, so every point lands on the
//! plane `z = plane_height` (typically the road surface). Coordinates outside
//! `[0, 1]` are extrapolated, not clamped.

use crate::{Polyline2d, Polyline3d, ProjectionMetadata};

/// Default plane height in meters, a road surface below a vehicle-mounted
/// sensor origin.
pub const DEFAULT_PLANE_HEIGHT: f64 = -1.6;

/// Lift one normalized image point onto the plane `z = plane_height`.
///
/// # Examples
///
/// ```rust
/// use polyline_lift::{ProjectionMetadata, project_point};
///
/// let metadata = ProjectionMetadata::new([0.0, 0.0], [10.0, 20.0], 1000, 2000);
/// assert_eq!(project_point([0.0, 0.0], &metadata, -1.6), [0.0, 20.0, -1.6]);
/// assert_eq!(project_point([1.0, 1.0], &metadata, -1.6), [10.0, 0.0, -1.6]);
/// ```
#[inline]
pub fn project_point(point: [f64; 2], metadata: &ProjectionMetadata, plane_height: f64) -> [f64; 3] {
    let [u, v] = point;
    let [min_x, min_y] = metadata.min_bound();
    let [dx, dy] = metadata.extent();

    [u * dx + min_x, (1.0 - v) * dy + min_y, plane_height]
}

/// Back-project a 2D polyline into point cloud space.
///
/// The result keeps the label and the exact chain structure of the input:
/// same number of chains, same number of points per chain, same order. Empty
/// polylines and empty chains are valid and map to empty output.
#[cfg_attr(
    feature = "profiling",
    tracing::instrument(skip_all, fields(label = %polyline.label, chains = polyline.num_chains()))
)]
pub fn project(polyline: &Polyline2d, metadata: &ProjectionMetadata, plane_height: f64) -> Polyline3d {
    let points3d = polyline
        .points
        .iter()
        .map(|chain| {
            chain
                .iter()
                .map(|&point| project_point(point, metadata, plane_height))
                .collect()
        })
        .collect();

    Polyline3d::new(polyline.label.clone(), points3d)
}

/// Projection parameters shared by every polyline of one sample.
///
/// ```rust
/// use polyline_lift::{BackProjector, Polyline2d, ProjectionMetadata};
///
/// let projector = BackProjector::new(
///     ProjectionMetadata::new([-10.0, -10.0], [10.0, 10.0], 512, 512),
///     -1.8,
/// );
/// let lane = Polyline2d::new("lane", vec![vec![[0.5, 0.5], [0.5, 0.0]]]);
/// let lifted = projector.project(&lane);
/// assert_eq!(lifted.points3d[0], vec![[0.0, 0.0, -1.8], [0.0, 10.0, -1.8]]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct BackProjector {
    metadata: ProjectionMetadata,
    plane_height: f64,
}

impl BackProjector {
    pub fn new(metadata: ProjectionMetadata, plane_height: f64) -> Self {
        Self {
            metadata,
            plane_height,
        }
    }

    pub fn metadata(&self) -> &ProjectionMetadata {
        &self.metadata
    }

    pub fn plane_height(&self) -> f64 {
        self.plane_height
    }

    pub fn project_point(&self, point: [f64; 2]) -> [f64; 3] {
        project_point(point, &self.metadata, self.plane_height)
    }

    pub fn project(&self, polyline: &Polyline2d) -> Polyline3d {
        project(polyline, &self.metadata, self.plane_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn metadata() -> ProjectionMetadata {
        ProjectionMetadata::new([0.0, 0.0], [10.0, 20.0], 500, 1000)
    }

    fn assert_close(a: [f64; 3], b: [f64; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < EPSILON, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_corner_mapping() {
        let polyline = Polyline2d::new("lane", vec![vec![[0.0, 0.0], [1.0, 1.0]]]);
        let lifted = project(&polyline, &metadata(), DEFAULT_PLANE_HEIGHT);
        assert_eq!(lifted.points3d[0][0], [0.0, 20.0, -1.6]);
        assert_eq!(lifted.points3d[0][1], [10.0, 0.0, -1.6]);
    }

    #[test]
    fn test_other_corners_are_not_mirrored() {
        // Top-right of the image is (max_x, max_y), bottom-left is (min_x, min_y).
        let metadata = ProjectionMetadata::new([-5.0, 2.0], [15.0, 6.0], 100, 100);
        assert_close(project_point([1.0, 0.0], &metadata, 0.0), [15.0, 6.0, 0.0]);
        assert_close(project_point([0.0, 1.0], &metadata, 0.0), [-5.0, 2.0, 0.0]);
        assert_close(project_point([0.5, 0.5], &metadata, 0.0), [5.0, 4.0, 0.0]);
    }

    #[test]
    fn test_affine_interpolation() {
        let metadata = ProjectionMetadata::new([-12.5, 3.0], [40.0, 9.5], 640, 480);
        let p1 = [0.13, 0.87];
        let p2 = [0.91, 0.02];
        let q1 = project_point(p1, &metadata, 0.4);
        let q2 = project_point(p2, &metadata, 0.4);

        for t in [0.0, 0.25, 0.5, 0.8, 1.0, 1.5, -0.3] {
            let p = [p1[0] + t * (p2[0] - p1[0]), p1[1] + t * (p2[1] - p1[1])];
            let expected = [
                q1[0] + t * (q2[0] - q1[0]),
                q1[1] + t * (q2[1] - q1[1]),
                q1[2] + t * (q2[2] - q1[2]),
            ];
            assert_close(project_point(p, &metadata, 0.4), expected);
        }
    }

    #[test]
    fn test_constant_z() {
        let polyline = Polyline2d::new(
            "road_edge",
            vec![
                vec![[0.1, 0.2], [0.3, 0.4], [0.9, 0.99]],
                vec![[0.0, 1.0]],
                vec![[2.0, -1.0]],
            ],
        );
        let plane_height = -1.734;
        let lifted = project(&polyline, &metadata(), plane_height);
        for point in lifted.points3d.iter().flatten() {
            assert_eq!(point[2], plane_height);
        }
    }

    #[test]
    fn test_shape_and_label_preserved() {
        let polyline = Polyline2d::new(
            "crosswalk",
            vec![vec![[0.1, 0.1]; 5], vec![], vec![[0.5, 0.5]; 2]],
        );
        let lifted = project(&polyline, &metadata(), 0.0);
        assert_eq!(lifted.label, "crosswalk");
        assert_eq!(lifted.num_chains(), 3);
        let lens: Vec<usize> = lifted.points3d.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![5, 0, 2]);
    }

    #[test]
    fn test_empty_polyline() {
        let polyline = Polyline2d::new("lane", vec![]);
        let lifted = project(&polyline, &metadata(), DEFAULT_PLANE_HEIGHT);
        assert_eq!(lifted.num_chains(), 0);
        assert_eq!(lifted.label, "lane");
    }

    #[test]
    fn test_out_of_range_extrapolates() {
        let lifted = project_point([1.5, -0.5], &metadata(), 0.0);
        assert_close(lifted, [15.0, 30.0, 0.0]);
    }

    #[test]
    fn test_inverted_bounds_do_not_panic() {
        let inverted = ProjectionMetadata::new([10.0, 20.0], [0.0, 0.0], 10, 10);
        let lifted = project_point([0.25, 0.75], &inverted, 1.0);
        assert_close(lifted, [7.5, 15.0, 1.0]);
        assert!(lifted.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_inverse_of_forward_mapping() {
        let metadata = ProjectionMetadata::new([-30.0, -15.0], [30.0, 45.0], 1920, 1080);
        for point in [[0.0, 0.0], [0.33, 0.66], [1.0, 0.5]] {
            let [x, y, _] = project_point(point, &metadata, 0.0);
            let [u, v] = metadata.to_normalized(x, y);
            assert!((u - point[0]).abs() < EPSILON);
            assert!((v - point[1]).abs() < EPSILON);
        }
    }

    #[test]
    fn test_back_projector_matches_free_function() {
        let projector = BackProjector::new(metadata(), -2.0);
        let polyline = Polyline2d::new("lane", vec![vec![[0.2, 0.8], [0.4, 0.6]]]);
        assert_eq!(projector.project(&polyline), project(&polyline, &metadata(), -2.0));
        assert_eq!(projector.plane_height(), -2.0);
        assert_eq!(projector.metadata(), &metadata());
    }
}
