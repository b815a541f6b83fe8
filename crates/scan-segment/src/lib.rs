//! Segmentation of scanned point clouds against a reference assembly.
//!
//! Given an assembly of pieces, each a list of planar faces, and clusters of
//! scanned points (the output of an upstream clustering step), this crate
//! decides which points belong to which face.
//!
//! # Passes
//!
//! - **Primary association** ([`associate_clusters`]): faces are processed in
//!   order and each picks the remaining cluster whose centroid is nearest
//!   along the face normal. Only the points that lie on the face move.
//! - **Reconciliation** ([`clean_unassociated_clusters`]): leftover clusters
//!   are re-scored against every face of every piece and moved into the
//!   winning piece's pool.
//!
//! [`segment_assembly`] runs both passes over a whole assembly.
//!
//! # Membership
//!
//! A point lies on a face if, for any triangle of the face, the projection of
//! the point onto the triangle's plane falls inside the triangle (relative
//! area residual below [`AssociationParams::association_threshold`]) and the
//! point is no farther from the plane than half the triangle's shortest edge.
//! See [`membership`].
//!
//! # Units
//!
//! Distances are in whatever unit the inputs use; scans of construction
//! components are usually in millimeters. The association threshold is
//! dimensionless.
//!
//! # Quick Start
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use scan_segment::{AssociationParams, Cluster, FaceMesh, PointCloud, segment_assembly};
//!
//! let floor = FaceMesh::quad([
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(4.0, 0.0, 0.0),
//!     Point3::new(4.0, 4.0, 0.0),
//!     Point3::new(0.0, 4.0, 0.0),
//! ]);
//!
//! let mut scan = PointCloud::new();
//! scan.push(Point3::new(1.0, 1.0, 0.0), Vector3::z());
//! scan.push(Point3::new(3.0, 2.0, 0.0), Vector3::z());
//!
//! let result = segment_assembly(
//!     &[vec![floor]],
//!     Cluster::from_clouds([scan]),
//!     &AssociationParams::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(result.piece_pools[0].len(), 2);
//! assert!(result.leftovers.is_empty());
//! ```
//!
//! # Clusters from labels
//!
//! Clustering primitives usually return one label per point. [`split_by_labels`]
//! turns such a labelling into [`Cluster`]s:
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use scan_segment::{PointCloud, split_by_labels};
//!
//! let mut cloud = PointCloud::new();
//! for i in 0..4 {
//!     cloud.push(Point3::new(i as f64, 0.0, 0.0), Vector3::z());
//! }
//! let split = split_by_labels(&cloud, &[0, 0, -1, 1], 1).unwrap();
//! assert_eq!(split.clusters.len(), 2);
//! assert_eq!(split.noise.len(), 1);
//! ```
//!
//! # Deviation
//!
//! Once segmented, each piece pool can be compared against its piece with
//! [`segment_deviation`] or [`assembly_deviation`], which report RMSE,
//! extremes and spread of the point-to-mesh distances.
//!
//! # Logging
//!
//! All passes log through `tracing`. Install a subscriber and set
//! `RUST_LOG=scan_segment=debug` to see per-face decisions; see
//! [`tracing_ext`].
//!
//! # Limitations
//!
//! Primary association is greedy: a face processed early may take a cluster
//! that fits a later face better. Reconciliation recovers some of these cases
//! but does not re-run the matching.

mod error;
mod types;

pub mod associate;
pub mod cloud;
pub mod descriptor;
pub mod deviation;
pub mod membership;
pub mod params;
pub mod reconcile;
pub mod segment;
pub mod tracing_ext;

// Re-export core types at crate root
pub use error::{ErrorCode, RecoverySuggestion, SegmentError, SegmentResult};
pub use types::{FaceMesh, Piece, PointColor, Triangle, triangle_area};

pub use associate::{AssociationResult, associate_clusters};
pub use cloud::{
    Cluster, ClusterId, LabeledSplit, NormalEstimator, PointCloud, split_by_labels,
};
pub use descriptor::{ClusterDescriptor, FaceDescriptor};
pub use deviation::{
    DeviationStats, DistanceMode, assembly_deviation, point_to_piece_distance, segment_deviation,
    segment_deviations,
};
pub use membership::{classify_points, point_in_face, point_in_triangle};
pub use params::AssociationParams;
pub use reconcile::{ClusterAssignment, FaceRef, ReconcileReport, clean_unassociated_clusters};
pub use segment::{
    SegmentCheck, SegmentStatus, SegmentationResult, check_segment, segment_assembly,
};
