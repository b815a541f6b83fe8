//! Centroid and normal descriptors for faces and clusters.
//!
//! Descriptors are computed once per call and reused across all candidate
//! pairs, instead of being recomputed for every comparison.

use nalgebra::{Point3, Vector3};

use crate::cloud::{Cluster, PointCloud};
use crate::error::{SegmentError, SegmentResult};
use crate::types::FaceMesh;

/// Centroid and representative normal of a reference face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceDescriptor {
    /// Mean of the face's vertex positions.
    pub centroid: Point3<f64>,

    /// Unit normal of the face's first triangle, if that triangle is not
    /// degenerate. A face without a normal can never be matched.
    pub normal: Option<Vector3<f64>>,
}

impl FaceDescriptor {
    /// Describe a face. `face_index` is used for error reports only.
    pub fn new(face: &FaceMesh, face_index: usize) -> SegmentResult<Self> {
        let centroid = face
            .centroid()
            .ok_or_else(|| SegmentError::empty_face(face_index, "no vertices"))?;
        Ok(Self {
            centroid,
            normal: face.first_normal(),
        })
    }
}

/// Centroid and normals of a cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterDescriptor {
    /// Mean of the cluster's point positions.
    pub centroid: Point3<f64>,

    /// Sum of the cluster's normals, not normalized.
    pub normal_sum: Vector3<f64>,

    /// Unit mean normal; None when the normals cancel out.
    pub mean_normal: Option<Vector3<f64>>,
}

impl ClusterDescriptor {
    /// Describe a cluster. Empty clusters are a precondition violation.
    pub fn new(cluster: &Cluster) -> SegmentResult<Self> {
        Self::from_cloud(&cluster.cloud).ok_or_else(|| SegmentError::empty_cluster(cluster.id))
    }

    /// Describe a cloud, or None if it is empty.
    pub fn from_cloud(cloud: &PointCloud) -> Option<Self> {
        Some(Self {
            centroid: cloud.centroid()?,
            normal_sum: cloud.normal_sum(),
            mean_normal: cloud.mean_normal(),
        })
    }
}
