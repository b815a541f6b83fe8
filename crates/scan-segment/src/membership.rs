//! Point-in-face membership test.
//!
//! A point lies on a triangle when its projection onto the triangle's plane
//! splits the triangle into three sub-triangles whose areas add up to the
//! triangle's own area, and when the point is not too far from that plane.
//!
//! For triangle `(v0, v1, v2)` with area `A` and projected point `P'`:
//!
//! ```text
//! r = (area(v0,v1,P') + area(v1,v2,P') + area(v2,v0,P') - A) / A
//! ```
//!
//! `r` is zero inside the triangle and grows as `P'` moves outside. The point
//! is accepted when `|r| < threshold` and `|P - P'| <= min_edge_length / 2`.
//! The distance bound rejects points from a parallel surface whose projection
//! happens to land inside the footprint.

use nalgebra::Point3;
use rayon::prelude::*;

use crate::cloud::PointCloud;
use crate::types::{FaceMesh, Triangle, triangle_area};

/// Raw outcome of testing one point against one triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Membership {
    /// Relative area residual `r`.
    pub residual: f64,

    /// Out-of-plane distance `|P - P'|`.
    pub plane_distance: f64,

    /// Half the triangle's shortest edge.
    pub max_plane_distance: f64,
}

impl Membership {
    /// Whether the point is accepted at the given association threshold.
    #[inline]
    pub fn is_inside(&self, threshold: f64) -> bool {
        self.residual.abs() < threshold && self.plane_distance <= self.max_plane_distance
    }
}

/// Test a point against a triangle.
///
/// Returns None for degenerate triangles, which never accept a point.
pub fn triangle_membership(point: &Point3<f64>, triangle: &Triangle) -> Option<Membership> {
    if triangle.is_degenerate() {
        return None;
    }
    let reference_area = triangle.area();
    let projected = triangle.project(point)?;

    let a1 = triangle_area(&triangle.v0, &triangle.v1, &projected);
    let a2 = triangle_area(&triangle.v1, &triangle.v2, &projected);
    let a3 = triangle_area(&triangle.v2, &triangle.v0, &projected);

    Some(Membership {
        residual: (a1 + a2 + a3 - reference_area) / reference_area,
        plane_distance: (point - projected).norm(),
        max_plane_distance: triangle.min_edge_length() * 0.5,
    })
}

/// Check whether a point lies on a triangle.
#[inline]
pub fn point_in_triangle(point: &Point3<f64>, triangle: &Triangle, threshold: f64) -> bool {
    triangle_membership(point, triangle).is_some_and(|m| m.is_inside(threshold))
}

/// Check whether a point lies on any triangle of a face.
pub fn point_in_face(point: &Point3<f64>, face: &FaceMesh, threshold: f64) -> bool {
    face.triangles()
        .any(|triangle| point_in_triangle(point, &triangle, threshold))
}

/// Indices (increasing) of the points of `cloud` that lie on `face`.
///
/// The test is read-only, so large clouds are classified in parallel when
/// `parallel` is set; the result is the same either way.
pub fn classify_points(
    cloud: &PointCloud,
    face: &FaceMesh,
    threshold: f64,
    parallel: bool,
) -> Vec<usize> {
    let triangles: Vec<Triangle> = face.triangles().filter(|t| !t.is_degenerate()).collect();
    let on_face = |i: &usize| {
        triangles
            .iter()
            .any(|t| point_in_triangle(&cloud.points[*i], t, threshold))
    };

    if parallel {
        (0..cloud.len()).into_par_iter().filter(on_face).collect()
    } else {
        (0..cloud.len()).filter(on_face).collect()
    }
}
