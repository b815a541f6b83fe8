//! Whole-assembly segmentation and per-segment sanity checks.
//!
//! An assembly is a list of pieces, each a list of faces. Segmentation runs
//! the primary associator once per piece, merges each piece's face pools into
//! one piece pool, and then reconciles the leftover clusters across all
//! pieces.

use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::associate::associate_clusters;
use crate::cloud::{Cluster, ClusterId, PointCloud};
use crate::error::{SegmentError, SegmentResult};
use crate::params::AssociationParams;
use crate::reconcile::{ReconcileReport, clean_unassociated_clusters};
use crate::tracing_ext::{PassTimer, log_cloud_stats};
use crate::types::{Piece, validate_pieces};

/// Output of [`segment_assembly`].
#[derive(Debug, Clone, Default)]
pub struct SegmentationResult {
    /// One pool per piece, holding every point assigned to any of its faces.
    pub piece_pools: Vec<PointCloud>,

    /// Primary-pass match of each face, indexed `[piece][face]`.
    pub face_matches: Vec<Vec<Option<ClusterId>>>,

    /// What the reconciliation pass did with the leftovers.
    pub report: ReconcileReport,

    /// Clusters (or parts of clusters) that no face claimed.
    pub leftovers: Vec<Cluster>,
}

impl SegmentationResult {
    /// Number of points assigned to pieces.
    pub fn assigned_points(&self) -> usize {
        self.piece_pools.iter().map(PointCloud::len).sum()
    }

    /// Number of points left in clusters.
    pub fn leftover_points(&self) -> usize {
        self.leftovers.iter().map(Cluster::len).sum()
    }
}

/// Segment clusters against every piece of an assembly.
///
/// Every input point ends up either in exactly one piece pool or in
/// [`SegmentationResult::leftovers`].
///
/// # Errors
///
/// Any invalid cluster, face or parameter. Inputs are checked up front, so
/// no pass starts on bad data.
pub fn segment_assembly(
    pieces: &[Piece],
    mut clusters: Vec<Cluster>,
    params: &AssociationParams,
) -> SegmentResult<SegmentationResult> {
    params.validate()?;
    validate_pieces(pieces)?;
    for cluster in &clusters {
        cluster.validate()?;
    }

    let face_count = pieces.iter().map(Vec::len).sum();
    let _pass = PassTimer::start("segment_assembly", face_count, clusters.len());

    let mut piece_pools = Vec::with_capacity(pieces.len());
    let mut face_matches = Vec::with_capacity(pieces.len());

    for (piece_index, piece) in pieces.iter().enumerate() {
        if clusters.is_empty() {
            debug!(piece = piece_index, "No clusters left, skipping piece");
            piece_pools.push(PointCloud::new());
            face_matches.push(vec![None; piece.len()]);
            continue;
        }
        let result = associate_clusters(piece, &mut clusters, params)
            .map_err(|e| e.in_piece(piece_index))?;
        face_matches.push(result.matched_clusters.clone());
        let pool = result.into_unified();
        log_cloud_stats(&pool, "piece pool after primary association");
        piece_pools.push(pool);
    }

    let report = if clusters.is_empty() {
        ReconcileReport::default()
    } else {
        clean_unassociated_clusters(&mut clusters, &mut piece_pools, pieces, params)?
    };

    let result = SegmentationResult {
        piece_pools,
        face_matches,
        report,
        leftovers: clusters,
    };

    info!(
        pieces = pieces.len(),
        assigned = result.assigned_points(),
        leftover = result.leftover_points(),
        "Assembly segmented"
    );
    Ok(result)
}

/// Verdict of [`check_segment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    /// Center within tolerance of the reference.
    Consistent,
    /// Center farther than the tolerance from the reference, which usually
    /// means the piece moved or points were assigned to the wrong piece.
    Displaced,
    /// No points were assigned.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentCheck {
    pub status: SegmentStatus,
    /// Distance between the segment's bounding-box center and the reference
    /// center. None for empty segments.
    pub distance: Option<f64>,
}

impl SegmentCheck {
    pub fn is_consistent(&self) -> bool {
        self.status == SegmentStatus::Consistent
    }
}

/// Compare a segment's bounding-box center with the center of the piece it
/// was assigned to.
///
/// # Errors
///
/// Returns [`SegmentError::InvalidParameter`] for a negative or non-finite
/// tolerance.
pub fn check_segment(
    segment: &PointCloud,
    reference_center: &Point3<f64>,
    tolerance: f64,
) -> SegmentResult<SegmentCheck> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(SegmentError::invalid_parameter(
            "tolerance",
            format!("must be finite and >= 0, got {tolerance}"),
        ));
    }

    let Some((min, max)) = segment.bounds() else {
        warn!("Segment is empty");
        return Ok(SegmentCheck {
            status: SegmentStatus::Empty,
            distance: None,
        });
    };

    let center = nalgebra::center(&min, &max);
    let distance = (center - reference_center).norm();
    let status = if distance > tolerance {
        warn!(distance, tolerance, "Segment is displaced from its piece");
        SegmentStatus::Displaced
    } else {
        SegmentStatus::Consistent
    };

    Ok(SegmentCheck {
        status,
        distance: Some(distance),
    })
}
