//! Reconciliation of clusters left over after primary association.
//!
//! Primary association only ever looks at one piece at a time, so a cluster
//! can survive it because it belongs to a face of another piece or because a
//! neighboring face took its best match. Each leftover cluster is re-scored
//! against every face of every piece with
//!
//! ```text
//! c     = n_c · normalize(centroid_c - centroid_f)
//! score = |centroid_c - centroid_f| · c² / (n_c · n_f)²
//! ```
//!
//! where `n_c` is the cluster's unit mean normal. The `c²` factor down-weights
//! faces whose centroid lies in the cluster's own plane, which favors the face
//! the cluster actually sits on over a nearby parallel face.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::associate::best_candidate;
use crate::cloud::{Cluster, ClusterId, PointCloud};
use crate::descriptor::{ClusterDescriptor, FaceDescriptor};
use crate::error::{SegmentError, SegmentResult};
use crate::membership::classify_points;
use crate::params::AssociationParams;
use crate::tracing_ext::{PassTimer, log_reconcile_summary};
use crate::types::{FaceMesh, Piece, validate_pieces};

/// Location of a face within an assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceRef {
    /// Index of the piece.
    pub piece: usize,
    /// Index of the face within the piece.
    pub face: usize,
}

/// Where a leftover cluster was sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterAssignment {
    pub cluster: ClusterId,
    pub face: FaceRef,
    pub score: f64,
    /// Points moved into the piece pool. May be zero when none of the
    /// cluster's points pass the membership test for the chosen face.
    pub points_moved: usize,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Clusters that found a face, in processing order.
    pub assignments: Vec<ClusterAssignment>,

    /// Clusters for which no face produced a finite score. They stay in the
    /// cluster list.
    pub unresolved: Vec<ClusterId>,
}

impl ReconcileReport {
    /// Total number of points moved into piece pools.
    pub fn points_moved(&self) -> usize {
        self.assignments.iter().map(|a| a.points_moved).sum()
    }

    /// Whether every cluster found a face.
    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Score a cluster against a face for reconciliation.
///
/// `cluster_normal` must be unit length. Returns None for faces without a
/// normal, near-perpendicular pairs and non-finite scores.
pub fn reconcile_score(
    cluster_centroid: &Point3<f64>,
    cluster_normal: &Vector3<f64>,
    face: &FaceDescriptor,
    min_alignment: f64,
) -> Option<f64> {
    let face_normal = face.normal?;
    let alignment = cluster_normal.dot(&face_normal);
    let alignment_sq = alignment * alignment;
    if alignment_sq < min_alignment * min_alignment {
        return None;
    }

    let junction = cluster_centroid - face.centroid;
    let distance = junction.norm();
    let cos = junction
        .try_normalize(f64::EPSILON)
        .map_or(0.0, |dir| cluster_normal.dot(&dir));

    let score = distance * cos * cos / alignment_sq;
    score.is_finite().then_some(score)
}

/// Assign leftover clusters to faces across all pieces.
///
/// `piece_pools[i]` receives the points reconciled onto faces of `pieces[i]`.
/// Points are moved by swap-remove, so the remaining points of a partially
/// reconciled cluster are reordered. Emptied clusters are removed from
/// `clusters`; clusters without any viable face stay and are listed in
/// [`ReconcileReport::unresolved`].
///
/// # Errors
///
/// Returns an error before mutating anything when `piece_pools` and `pieces`
/// differ in length, when a pre-filled pool holds points without normals, or
/// when a pool, face, cluster or parameter is invalid.
pub fn clean_unassociated_clusters(
    clusters: &mut Vec<Cluster>,
    piece_pools: &mut [PointCloud],
    pieces: &[Piece],
    params: &AssociationParams,
) -> SegmentResult<ReconcileReport> {
    params.validate()?;
    if piece_pools.len() != pieces.len() {
        return Err(SegmentError::PoolCountMismatch {
            pools: piece_pools.len(),
            pieces: pieces.len(),
        });
    }
    for pool in piece_pools.iter() {
        pool.validate()?;
        if !pool.is_empty() && !pool.has_normals() {
            return Err(SegmentError::misaligned(
                "piece pool normals",
                pool.len(),
                pool.normals.len(),
            ));
        }
    }
    validate_pieces(pieces)?;
    for cluster in clusters.iter() {
        cluster.validate()?;
    }

    let face_count = pieces.iter().map(Vec::len).sum();
    let _pass = PassTimer::start("clean_unassociated_clusters", face_count, clusters.len());

    let mut faces: Vec<(FaceRef, &FaceMesh)> = Vec::with_capacity(face_count);
    let mut descriptors: Vec<FaceDescriptor> = Vec::with_capacity(face_count);
    for (piece_index, piece) in pieces.iter().enumerate() {
        for (face_index, face) in piece.iter().enumerate() {
            let face_ref = FaceRef {
                piece: piece_index,
                face: face_index,
            };
            faces.push((face_ref, face));
            descriptors.push(
                FaceDescriptor::new(face, face_index).map_err(|e| e.in_piece(piece_index))?,
            );
        }
    }

    let mut report = ReconcileReport::default();

    for cluster in clusters.iter_mut() {
        let desc = ClusterDescriptor::new(cluster)?;
        let Some(normal) = desc.mean_normal else {
            warn!(cluster = cluster.id, "Cluster normals cancel out, cannot reconcile");
            report.unresolved.push(cluster.id);
            continue;
        };

        let scores: Vec<Option<f64>> = if params.parallel {
            descriptors
                .par_iter()
                .map(|f| reconcile_score(&desc.centroid, &normal, f, params.min_alignment))
                .collect()
        } else {
            descriptors
                .iter()
                .map(|f| reconcile_score(&desc.centroid, &normal, f, params.min_alignment))
                .collect()
        };

        let Some((slot, best)) = best_candidate(scores) else {
            warn!(cluster = cluster.id, points = cluster.len(), "No face for cluster");
            report.unresolved.push(cluster.id);
            continue;
        };

        let (face_ref, face) = faces[slot];
        let on_face = classify_points(
            &cluster.cloud,
            face,
            params.association_threshold,
            params.parallel,
        );

        let pool = &mut piece_pools[face_ref.piece];
        // Descending order keeps the remaining indices valid under swap-remove.
        for &i in on_face.iter().rev() {
            cluster.cloud.swap_remove_into(i, pool);
        }

        trace!(
            cluster = cluster.id,
            piece = face_ref.piece,
            face = face_ref.face,
            score = best,
            moved = on_face.len(),
            remaining = cluster.len(),
            "Reconciled cluster"
        );

        report.assignments.push(ClusterAssignment {
            cluster: cluster.id,
            face: face_ref,
            score: best,
            points_moved: on_face.len(),
        });
    }

    let before = clusters.len();
    clusters.retain(|c| !c.is_empty());
    debug!(
        dropped = before - clusters.len(),
        remaining = clusters.len(),
        "Removed exhausted clusters"
    );

    log_reconcile_summary(&report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PointColor;

    fn square_at_z(z: f64) -> FaceMesh {
        FaceMesh::quad([
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(1.0, 1.0, z),
            Point3::new(0.0, 1.0, z),
        ])
    }

    fn square_at_x(x: f64) -> FaceMesh {
        FaceMesh::quad([
            Point3::new(x, 0.0, 0.0),
            Point3::new(x, 1.0, 0.0),
            Point3::new(x, 1.0, 1.0),
            Point3::new(x, 0.0, 1.0),
        ])
    }

    fn patch_at_z(z: f64) -> PointCloud {
        let mut cloud = PointCloud::new();
        for i in 1..4 {
            for j in 1..4 {
                cloud.push(Point3::new(i as f64 * 0.25, j as f64 * 0.25, z), Vector3::z());
            }
        }
        cloud
    }

    #[test]
    fn test_reconcile_score_prefers_nearer_parallel_face() {
        let near = FaceDescriptor::new(&square_at_z(0.0), 0).unwrap();
        let far = FaceDescriptor::new(&square_at_z(1.0), 1).unwrap();
        let centroid = Point3::new(0.5, 0.5, 0.1);
        let normal = Vector3::z();

        let near_score = reconcile_score(&centroid, &normal, &near, 1e-6).unwrap();
        let far_score = reconcile_score(&centroid, &normal, &far, 1e-6).unwrap();
        assert!((near_score - 0.1).abs() < 1e-12);
        assert!((far_score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_reconcile_score_coincident_centroids() {
        let face = FaceDescriptor::new(&square_at_z(0.0), 0).unwrap();
        let score = reconcile_score(&Point3::new(0.5, 0.5, 0.0), &Vector3::z(), &face, 1e-6);
        assert_eq!(score, Some(0.0));
    }

    #[test]
    fn test_reconcile_score_rejects_perpendicular() {
        let face = FaceDescriptor::new(&square_at_x(0.0), 0).unwrap();
        let score = reconcile_score(&Point3::new(0.5, 0.5, 0.0), &Vector3::z(), &face, 1e-6);
        assert!(score.is_none());
    }

    #[test]
    fn test_moves_cluster_into_piece_pool() {
        let pieces = vec![vec![square_at_x(0.0)], vec![square_at_z(0.0)]];
        let mut pools = vec![PointCloud::new(), PointCloud::new()];
        let mut clusters = Cluster::from_clouds([patch_at_z(0.0)]);

        let report = clean_unassociated_clusters(
            &mut clusters,
            &mut pools,
            &pieces,
            &AssociationParams::strict(),
        )
        .unwrap();

        assert!(report.is_fully_resolved());
        assert_eq!(report.assignments[0].face, FaceRef { piece: 1, face: 0 });
        assert_eq!(report.points_moved(), 9);
        assert!(pools[0].is_empty());
        assert_eq!(pools[1].len(), 9);
        assert_eq!(pools[1].normals.len(), 9);
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_unresolved_cluster_stays() {
        let pieces = vec![vec![square_at_x(0.0)]];
        let mut pools = vec![PointCloud::new()];
        let mut clusters = vec![Cluster::new(4, patch_at_z(0.0))];

        let report = clean_unassociated_clusters(
            &mut clusters,
            &mut pools,
            &pieces,
            &AssociationParams::strict(),
        )
        .unwrap();

        assert_eq!(report.unresolved, vec![4]);
        assert!(report.assignments.is_empty());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 9);
        assert!(pools[0].is_empty());
    }

    #[test]
    fn test_partial_reconcile_keeps_remainder() {
        let pieces = vec![vec![square_at_z(0.0)]];
        let mut pools = vec![PointCloud::new()];
        let mut cloud = patch_at_z(0.0);
        cloud.push(Point3::new(4.0, 4.0, 0.0), Vector3::z());
        let mut clusters = Cluster::from_clouds([cloud]);

        let report = clean_unassociated_clusters(
            &mut clusters,
            &mut pools,
            &pieces,
            &AssociationParams::strict(),
        )
        .unwrap();

        assert_eq!(report.points_moved(), 9);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].cloud.points, vec![Point3::new(4.0, 4.0, 0.0)]);
        assert_eq!(clusters[0].cloud.normals.len(), 1);
    }

    #[test]
    fn test_pool_count_mismatch() {
        let pieces = vec![vec![square_at_z(0.0)], vec![square_at_x(0.0)]];
        let mut pools = vec![PointCloud::new()];
        let mut clusters = Cluster::from_clouds([patch_at_z(0.0)]);

        let err = clean_unassociated_clusters(
            &mut clusters,
            &mut pools,
            &pieces,
            &AssociationParams::default(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            SegmentError::PoolCountMismatch {
                pools: 1,
                pieces: 2
            }
        ));
        assert_eq!(clusters[0].len(), 9);
    }

    #[test]
    fn test_prefilled_pool_without_normals_rejected() {
        let pieces = vec![vec![square_at_z(0.0)]];
        let mut pool = PointCloud::new();
        pool.points.push(Point3::new(0.5, 0.5, 0.0));
        let mut pools = vec![pool];
        let mut cloud = PointCloud::new();
        cloud.push(Point3::new(0.25, 0.25, 0.0), Vector3::z());
        cloud.push(Point3::new(0.75, 0.75, 0.0), Vector3::z());
        let mut clusters = Cluster::from_clouds([cloud]);

        let err = clean_unassociated_clusters(
            &mut clusters,
            &mut pools,
            &pieces,
            &AssociationParams::strict(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            SegmentError::MisalignedAttributes {
                expected: 1,
                actual: 0,
                ..
            }
        ));
        assert_eq!(pools[0].len(), 1);
        assert!(pools[0].normals.is_empty());
        assert_eq!(clusters[0].len(), 2);
    }

    #[test]
    fn test_prefilled_pool_with_misaligned_colors_rejected() {
        let pieces = vec![vec![square_at_z(0.0)]];
        let mut pool = patch_at_z(0.0);
        pool.colors.push(PointColor::new(255, 0, 0));
        let mut pools = vec![pool];
        let mut clusters = Cluster::from_clouds([patch_at_z(0.0)]);

        let err = clean_unassociated_clusters(
            &mut clusters,
            &mut pools,
            &pieces,
            &AssociationParams::strict(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            SegmentError::MisalignedAttributes {
                attribute: "colors",
                ..
            }
        ));
        assert_eq!(pools[0].len(), 9);
    }

    #[test]
    fn test_prefilled_pool_stays_aligned() {
        let pieces = vec![vec![square_at_z(0.0)]];
        let mut pools = vec![patch_at_z(0.0)];
        let mut clusters = Cluster::from_clouds([patch_at_z(0.0)]);

        let report = clean_unassociated_clusters(
            &mut clusters,
            &mut pools,
            &pieces,
            &AssociationParams::strict(),
        )
        .unwrap();

        assert_eq!(report.points_moved(), 9);
        assert_eq!(pools[0].len(), 18);
        assert_eq!(pools[0].normals.len(), 18);
        assert!(pools[0].validate().is_ok());
    }

    #[test]
    fn test_face_error_names_piece() {
        let pieces = vec![vec![square_at_z(0.0)], vec![square_at_x(0.0), FaceMesh::new()]];
        let mut pools = vec![PointCloud::new(), PointCloud::new()];
        let mut clusters = Cluster::from_clouds([patch_at_z(0.0)]);

        let err = clean_unassociated_clusters(
            &mut clusters,
            &mut pools,
            &pieces,
            &AssociationParams::default(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            SegmentError::EmptyFace {
                piece: Some(1),
                face: 1,
                ..
            }
        ));
        assert!(err.to_string().contains("face 1 of piece 1"));
    }
}
