//! Primary association: match each reference face with its best cluster.
//!
//! Faces are processed in input order. For each face every remaining cluster
//! is scored by
//!
//! ```text
//! score = |face_centroid - cluster_centroid| / |cluster_normal_sum · face_normal|
//! ```
//!
//! where `cluster_normal_sum` is the non-normalized sum of the cluster's
//! normals. The lowest score wins. Points of the winning cluster that pass the
//! [membership test](crate::membership) move into the face's pool; the rest
//! stay in the cluster. A cluster that runs out of points is removed from the
//! list.
//!
//! Matching is greedy: a face processed early can consume the cluster that
//! would have fit a later face better. There is no backtracking.
//!
//! # Example
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use scan_segment::{AssociationParams, Cluster, FaceMesh, PointCloud, associate_clusters};
//!
//! let face = FaceMesh::quad([
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ]);
//!
//! let mut cloud = PointCloud::new();
//! cloud.push(Point3::new(0.2, 0.2, 0.0), Vector3::z());
//! cloud.push(Point3::new(5.0, 5.0, 0.0), Vector3::z());
//! let mut clusters = Cluster::from_clouds([cloud]);
//!
//! let result = associate_clusters(&[face], &mut clusters, &AssociationParams::strict()).unwrap();
//! assert_eq!(result.face_pools[0].len(), 1);
//! assert_eq!(clusters[0].len(), 1);
//! ```

use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::cloud::{Cluster, ClusterId, PointCloud};
use crate::descriptor::{ClusterDescriptor, FaceDescriptor};
use crate::error::SegmentResult;
use crate::membership::classify_points;
use crate::params::AssociationParams;
use crate::tracing_ext::{PassTimer, log_association_summary};
use crate::types::FaceMesh;

/// Output of the primary association pass.
#[derive(Debug, Clone, Default)]
pub struct AssociationResult {
    /// One pool per input face, in face order, holding the points confirmed
    /// to lie on that face.
    pub face_pools: Vec<PointCloud>,

    /// The cluster each face was matched with, or None if no cluster was a
    /// viable candidate.
    pub matched_clusters: Vec<Option<ClusterId>>,
}

impl AssociationResult {
    /// Total number of associated points.
    pub fn point_count(&self) -> usize {
        self.face_pools.iter().map(PointCloud::len).sum()
    }

    /// Indices of faces that found no cluster.
    pub fn unmatched_faces(&self) -> impl Iterator<Item = usize> + '_ {
        self.matched_clusters
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_none())
            .map(|(i, _)| i)
    }

    /// Merge the per-face pools into a single point pool.
    pub fn into_unified(self) -> PointCloud {
        let mut unified = PointCloud::with_capacity(self.point_count());
        for pool in self.face_pools {
            unified.append(pool);
        }
        unified
    }
}

/// Score a cluster against a face for the primary pass.
///
/// Returns None when the pair is not a viable match: the face has no normal,
/// the cluster normals cancel out, or the normals are too close to
/// perpendicular.
pub fn primary_score(
    face: &FaceDescriptor,
    cluster: &ClusterDescriptor,
    min_alignment: f64,
) -> Option<f64> {
    let face_normal = face.normal?;
    let sum_norm = cluster.normal_sum.norm();
    if sum_norm <= f64::EPSILON {
        return None;
    }
    let alignment = cluster.normal_sum.dot(&face_normal).abs();
    if alignment / sum_norm < min_alignment {
        return None;
    }
    let score = (face.centroid - cluster.centroid).norm() / alignment;
    score.is_finite().then_some(score)
}

/// Index of the lowest score; the earliest candidate wins ties.
pub(crate) fn best_candidate(scores: impl IntoIterator<Item = Option<f64>>) -> Option<(usize, f64)> {
    scores
        .into_iter()
        .enumerate()
        .filter_map(|(i, s)| s.map(|s| (i, s)))
        .fold(None, |best, (i, s)| match best {
            Some((_, b)) if b <= s => best,
            _ => Some((i, s)),
        })
}

/// Associate clusters with the faces of one piece.
///
/// `clusters` is shrunk in place: associated points are moved out and
/// exhausted clusters are removed. All inputs are validated before anything is
/// mutated, so on error the clusters are untouched.
///
/// # Errors
///
/// Empty or normal-less clusters, misaligned attribute arrays, empty faces,
/// out-of-range triangle indices and out-of-range parameters.
pub fn associate_clusters(
    faces: &[FaceMesh],
    clusters: &mut Vec<Cluster>,
    params: &AssociationParams,
) -> SegmentResult<AssociationResult> {
    params.validate()?;
    for (i, face) in faces.iter().enumerate() {
        face.validate(i)?;
    }
    for cluster in clusters.iter() {
        cluster.validate()?;
    }

    let _pass = PassTimer::start("associate_clusters", faces.len(), clusters.len());

    let mut descriptors = clusters
        .iter()
        .map(ClusterDescriptor::new)
        .collect::<SegmentResult<Vec<_>>>()?;

    let mut result = AssociationResult {
        face_pools: Vec::with_capacity(faces.len()),
        matched_clusters: Vec::with_capacity(faces.len()),
    };

    for (face_index, face) in faces.iter().enumerate() {
        let face_desc = FaceDescriptor::new(face, face_index)?;
        if face_desc.normal.is_none() {
            warn!(
                face = face_index,
                "Face has a degenerate first triangle and no normal, skipping"
            );
        }

        let scores: Vec<Option<f64>> = if params.parallel {
            descriptors
                .par_iter()
                .map(|d| primary_score(&face_desc, d, params.min_alignment))
                .collect()
        } else {
            descriptors
                .iter()
                .map(|d| primary_score(&face_desc, d, params.min_alignment))
                .collect()
        };

        let Some((slot, score)) = best_candidate(scores) else {
            debug!(face = face_index, "No viable cluster for face");
            result.face_pools.push(PointCloud::new());
            result.matched_clusters.push(None);
            continue;
        };

        let cluster = &mut clusters[slot];
        let on_face = classify_points(
            &cluster.cloud,
            face,
            params.association_threshold,
            params.parallel,
        );
        let pool = cluster.cloud.take_indices(&on_face);

        trace!(
            face = face_index,
            cluster = cluster.id,
            score,
            moved = pool.len(),
            remaining = cluster.len(),
            "Matched face with cluster"
        );

        result.matched_clusters.push(Some(cluster.id));
        result.face_pools.push(pool);

        if cluster.is_empty() {
            clusters.remove(slot);
            descriptors.remove(slot);
        } else if !on_face.is_empty() {
            descriptors[slot] = ClusterDescriptor::new(&clusters[slot])?;
        }
    }

    log_association_summary(&result, clusters.len());
    Ok(result)
}
