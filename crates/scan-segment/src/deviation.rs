//! Deviation of segmented points from their reference piece.
//!
//! Every point of a segment is measured against the closest point on any
//! triangle of the piece it was assigned to. In [`DistanceMode::Signed`] the
//! distance is negative when the point lies behind the closest triangle,
//! i.e. when `(p - closest) · n < 0` for that triangle's normal `n`.
//!
//! The per-segment summary follows the usual fabrication-tolerance report:
//!
//! ```text
//! rmse    = sqrt(mean(d²))
//! std_dev = sqrt(mean((d - mean(d))²))
//! ```
//!
//! # Example
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use scan_segment::{DistanceMode, FaceMesh, PointCloud, segment_deviation};
//!
//! let piece = vec![FaceMesh::quad([
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ])];
//! let mut segment = PointCloud::new();
//! segment.push(Point3::new(0.5, 0.5, 0.2), Vector3::z());
//! segment.push(Point3::new(0.5, 0.5, -0.2), Vector3::z());
//!
//! let stats = segment_deviation(&segment, &piece, DistanceMode::Signed, false)
//!     .unwrap()
//!     .unwrap();
//! assert!((stats.max - 0.2).abs() < 1e-12);
//! assert!((stats.min + 0.2).abs() < 1e-12);
//! ```

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::cloud::PointCloud;
use crate::error::{SegmentError, SegmentResult};
use crate::types::{FaceMesh, Piece, Triangle, validate_pieces};

/// How point-to-piece distances are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMode {
    /// Euclidean distance, always non-negative.
    #[default]
    Unsigned,
    /// Negative for points behind the closest triangle.
    Signed,
}

/// Summary of the distances of one segment to its piece.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationStats {
    /// Number of measured points.
    pub count: usize,

    /// Root mean square of the distances.
    pub rmse: f64,

    /// Largest distance.
    pub max: f64,

    /// Smallest distance. Negative in signed mode when any point is behind.
    pub min: f64,

    /// Arithmetic mean of the distances.
    pub mean: f64,

    /// Population standard deviation of the distances.
    pub std_dev: f64,
}

impl DeviationStats {
    /// Summarize a set of distances. Returns None when there are none.
    pub fn from_distances(distances: &[f64]) -> Option<Self> {
        if distances.is_empty() {
            return None;
        }
        let n = distances.len() as f64;

        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for &d in distances {
            sum += d;
            sum_sq += d * d;
            max = max.max(d);
            min = min.min(d);
        }
        let mean = sum / n;
        let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            count: distances.len(),
            rmse: (sum_sq / n).sqrt(),
            max,
            min,
            mean,
            std_dev: variance.sqrt(),
        })
    }

    /// Whether every distance lies within `tolerance` of the piece.
    pub fn within(&self, tolerance: f64) -> bool {
        self.max.abs() <= tolerance && self.min.abs() <= tolerance
    }
}

/// Non-degenerate triangles of a piece, with their unit normals.
fn measurable_triangles(piece: &[FaceMesh]) -> Vec<(Triangle, Vector3<f64>)> {
    piece
        .iter()
        .flat_map(FaceMesh::triangles)
        .filter(|t| !t.is_degenerate())
        .filter_map(|t| t.normal().map(|n| (t, n)))
        .collect()
}

fn distance_to_triangles(
    point: &Point3<f64>,
    triangles: &[(Triangle, Vector3<f64>)],
    mode: DistanceMode,
) -> Option<f64> {
    let (closest, normal, distance_sq) = triangles
        .iter()
        .map(|(t, n)| {
            let c = t.closest_point(point);
            (c, n, (point - c).norm_squared())
        })
        .min_by(|a, b| a.2.total_cmp(&b.2))?;

    let distance = distance_sq.sqrt();
    match mode {
        DistanceMode::Signed if (point - closest).dot(normal) < 0.0 => Some(-distance),
        _ => Some(distance),
    }
}

/// Distance from a point to the closest triangle of a piece.
///
/// Returns None when the piece has no non-degenerate triangle. Faces are not
/// validated here; see [`FaceMesh::validate`].
pub fn point_to_piece_distance(
    point: &Point3<f64>,
    piece: &[FaceMesh],
    mode: DistanceMode,
) -> Option<f64> {
    distance_to_triangles(point, &measurable_triangles(piece), mode)
}

/// Distance of every point of `segment` to `piece`, in point order.
///
/// # Errors
///
/// An invalid face, or [`SegmentError::EmptyPiece`] when the segment has
/// points but the piece has no non-degenerate triangle.
pub fn segment_deviations(
    segment: &PointCloud,
    piece: &[FaceMesh],
    mode: DistanceMode,
    parallel: bool,
) -> SegmentResult<Vec<f64>> {
    for (i, face) in piece.iter().enumerate() {
        face.validate(i)?;
    }
    if segment.is_empty() {
        return Ok(Vec::new());
    }

    let triangles = measurable_triangles(piece);
    if triangles.is_empty() {
        return Err(SegmentError::EmptyPiece { piece: None });
    }

    // Non-empty triangle list, so every lookup yields a distance.
    let measure = |p: &Point3<f64>| distance_to_triangles(p, &triangles, mode).unwrap_or(0.0);
    let distances: Vec<f64> = if parallel {
        segment.points.par_iter().map(measure).collect()
    } else {
        segment.points.iter().map(measure).collect()
    };
    Ok(distances)
}

/// Deviation summary of one segment. None for an empty segment.
pub fn segment_deviation(
    segment: &PointCloud,
    piece: &[FaceMesh],
    mode: DistanceMode,
    parallel: bool,
) -> SegmentResult<Option<DeviationStats>> {
    let distances = segment_deviations(segment, piece, mode, parallel)?;
    let stats = DeviationStats::from_distances(&distances);
    if let Some(s) = &stats {
        debug!(
            points = s.count,
            rmse = s.rmse,
            max = s.max,
            min = s.min,
            std_dev = s.std_dev,
            "Segment deviation"
        );
    }
    Ok(stats)
}

/// Deviation summary of every piece pool, indexed like `pieces`.
///
/// # Errors
///
/// [`SegmentError::PoolCountMismatch`] when the slices differ in length,
/// and any face or piece error, tagged with the piece index.
pub fn assembly_deviation(
    piece_pools: &[PointCloud],
    pieces: &[Piece],
    mode: DistanceMode,
    parallel: bool,
) -> SegmentResult<Vec<Option<DeviationStats>>> {
    if piece_pools.len() != pieces.len() {
        return Err(SegmentError::PoolCountMismatch {
            pools: piece_pools.len(),
            pieces: pieces.len(),
        });
    }
    validate_pieces(pieces)?;

    let stats = piece_pools
        .iter()
        .zip(pieces)
        .enumerate()
        .map(|(index, (pool, piece))| {
            segment_deviation(pool, piece, mode, parallel).map_err(|e| e.in_piece(index))
        })
        .collect::<SegmentResult<Vec<_>>>()?;

    let worst = stats
        .iter()
        .flatten()
        .map(|s| s.rmse)
        .fold(0.0, f64::max);
    info!(
        pieces = pieces.len(),
        measured = stats.iter().flatten().count(),
        worst_rmse = worst,
        "Assembly deviation computed"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    fn unit_square() -> FaceMesh {
        FaceMesh::quad([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn test_point_distance_signs() {
        let piece = vec![unit_square()];
        let above = Point3::new(0.3, 0.6, 0.25);
        let below = Point3::new(0.3, 0.6, -0.25);

        let d = point_to_piece_distance(&above, &piece, DistanceMode::Signed).unwrap();
        assert!(approx_eq(d, 0.25));
        let d = point_to_piece_distance(&below, &piece, DistanceMode::Signed).unwrap();
        assert!(approx_eq(d, -0.25));
        let d = point_to_piece_distance(&below, &piece, DistanceMode::Unsigned).unwrap();
        assert!(approx_eq(d, 0.25));
    }

    #[test]
    fn test_point_distance_outside_footprint() {
        let piece = vec![unit_square()];
        // Closest feature is the edge x = 1.
        let d = point_to_piece_distance(&Point3::new(1.3, 0.5, 0.4), &piece, DistanceMode::Signed)
            .unwrap();
        assert!(approx_eq(d, 0.5));
        // Closest feature is the corner (0, 0, 0).
        let d = point_to_piece_distance(
            &Point3::new(-3.0, -4.0, 0.0),
            &piece,
            DistanceMode::Unsigned,
        )
        .unwrap();
        assert!(approx_eq(d, 5.0));
    }

    #[test]
    fn test_closest_face_wins() {
        let far = FaceMesh::quad([
            Point3::new(0.0, 0.0, 5.0),
            Point3::new(1.0, 0.0, 5.0),
            Point3::new(1.0, 1.0, 5.0),
            Point3::new(0.0, 1.0, 5.0),
        ]);
        let piece = vec![far, unit_square()];
        let d = point_to_piece_distance(&Point3::new(0.5, 0.5, 1.0), &piece, DistanceMode::Signed)
            .unwrap();
        assert!(approx_eq(d, 1.0));
    }

    #[test]
    fn test_degenerate_piece_has_no_distance() {
        let sliver = FaceMesh::from_raw(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let piece = vec![sliver];
        assert!(point_to_piece_distance(&Point3::origin(), &piece, DistanceMode::Unsigned).is_none());

        let mut segment = PointCloud::new();
        segment.push(Point3::new(0.5, 0.5, 0.0), Vector3::z());
        let err = segment_deviations(&segment, &piece, DistanceMode::Unsigned, false).unwrap_err();
        assert!(matches!(err, SegmentError::EmptyPiece { piece: None }));

        // Nothing to measure, nothing to fail on.
        let stats = segment_deviation(&PointCloud::new(), &piece, DistanceMode::Unsigned, false);
        assert_eq!(stats.unwrap(), None);
    }

    #[test]
    fn test_stats_from_distances() {
        let stats = DeviationStats::from_distances(&[1.0, -1.0, 2.0]).unwrap();
        assert_eq!(stats.count, 3);
        assert!(approx_eq(stats.rmse, 2.0f64.sqrt()));
        assert!(approx_eq(stats.max, 2.0));
        assert!(approx_eq(stats.min, -1.0));
        assert!(approx_eq(stats.mean, 2.0 / 3.0));
        assert!(approx_eq(stats.std_dev, (42.0f64 / 27.0).sqrt()));
        assert!(!stats.within(1.5));
        assert!(stats.within(2.0));

        assert!(DeviationStats::from_distances(&[]).is_none());

        let flat = DeviationStats::from_distances(&[0.5; 4]).unwrap();
        assert!(approx_eq(flat.std_dev, 0.0));
        assert!(approx_eq(flat.rmse, 0.5));
    }

    #[test]
    fn test_segment_deviations_serial_matches_parallel() {
        let piece = vec![unit_square()];
        let mut segment = PointCloud::new();
        for i in 0..20 {
            let t = i as f64 / 20.0;
            segment.push(Point3::new(t, 1.0 - t, (t - 0.5) * 0.1), Vector3::z());
        }

        let serial = segment_deviations(&segment, &piece, DistanceMode::Signed, false).unwrap();
        let parallel = segment_deviations(&segment, &piece, DistanceMode::Signed, true).unwrap();
        assert_eq!(serial.len(), 20);
        assert_eq!(serial, parallel);
        assert!(serial[0] < 0.0);
        assert!(serial[19] > 0.0);
    }

    #[test]
    fn test_assembly_deviation_per_pool() {
        let lifted = FaceMesh::quad([
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(1.0, 1.0, 2.0),
            Point3::new(0.0, 1.0, 2.0),
        ]);
        let pieces = vec![vec![unit_square()], vec![lifted]];

        let mut on_first = PointCloud::new();
        on_first.push(Point3::new(0.5, 0.5, 0.1), Vector3::z());
        let pools = vec![on_first, PointCloud::new()];

        let stats = assembly_deviation(&pools, &pieces, DistanceMode::Unsigned, false).unwrap();
        assert_eq!(stats.len(), 2);
        assert!(approx_eq(stats[0].unwrap().rmse, 0.1));
        assert!(stats[1].is_none());

        let err = assembly_deviation(&pools[..1], &pieces, DistanceMode::Unsigned, false)
            .unwrap_err();
        assert!(matches!(err, SegmentError::PoolCountMismatch { pools: 1, pieces: 2 }));
    }

    #[test]
    fn test_assembly_deviation_names_empty_piece() {
        let sliver = FaceMesh::from_raw(vec![Point3::origin(); 3], vec![[0, 1, 2]]).unwrap();
        let pieces = vec![vec![unit_square()], vec![sliver]];
        let mut pool = PointCloud::new();
        pool.push(Point3::new(0.5, 0.5, 0.0), Vector3::z());
        let pools = vec![pool.clone(), pool];

        let err = assembly_deviation(&pools, &pieces, DistanceMode::Signed, false).unwrap_err();
        assert!(matches!(err, SegmentError::EmptyPiece { piece: Some(1) }));
    }
}
