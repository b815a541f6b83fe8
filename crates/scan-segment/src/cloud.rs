//! Point clouds stored as index-aligned attribute arrays, and scan clusters.
//!
//! A [`PointCloud`] keeps positions, normals and colors in parallel vectors.
//! A point is always addressed by its index; moving points between clouds goes
//! through [`PointCloud::take_indices`] / [`PointCloud::swap_remove_into`], which keep
//! every attribute array aligned.
//!
//! A [`Cluster`] is a cloud with a stable [`ClusterId`] handle. Cluster lists
//! shrink as the engine assigns points, so positions in the list are not stable;
//! ids are.
//!
//! # Example
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use scan_segment::PointCloud;
//!
//! let mut cloud = PointCloud::new();
//! cloud.push(Point3::new(0.0, 0.0, 0.0), Vector3::z());
//! cloud.push(Point3::new(1.0, 0.0, 0.0), Vector3::z());
//! cloud.push(Point3::new(2.0, 0.0, 0.0), Vector3::z());
//!
//! let taken = cloud.take_indices(&[0, 2]);
//! assert_eq!(taken.len(), 2);
//! assert_eq!(cloud.len(), 1);
//! assert_eq!(cloud.points[0].x, 1.0);
//! ```

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use tracing::{debug, warn};

use crate::error::{SegmentError, SegmentResult};
use crate::types::PointColor;

/// A collection of 3D points with index-aligned normals and colors.
///
/// `normals` is either empty or exactly as long as `points`; the same holds
/// for `colors`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// Point positions.
    pub points: Vec<Point3<f64>>,

    /// Per-point normals (empty when the cloud has none).
    pub normals: Vec<Vector3<f64>>,

    /// Per-point colors (empty when the cloud has none).
    pub colors: Vec<PointColor>,
}

impl PointCloud {
    /// Create a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            normals: Vec::with_capacity(capacity),
            colors: Vec::new(),
        }
    }

    /// Create a cloud from positions and normals, checking alignment.
    pub fn from_parts(
        points: Vec<Point3<f64>>,
        normals: Vec<Vector3<f64>>,
        colors: Vec<PointColor>,
    ) -> SegmentResult<Self> {
        let cloud = Self {
            points,
            normals,
            colors,
        };
        cloud.validate()?;
        Ok(cloud)
    }

    /// Number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Check if every point has a normal.
    #[inline]
    pub fn has_normals(&self) -> bool {
        !self.points.is_empty() && self.normals.len() == self.points.len()
    }

    /// Check if every point has a color.
    #[inline]
    pub fn has_colors(&self) -> bool {
        !self.points.is_empty() && self.colors.len() == self.points.len()
    }

    /// Verify that attribute arrays are index-aligned with the points.
    pub fn validate(&self) -> SegmentResult<()> {
        let n = self.points.len();
        if !self.normals.is_empty() && self.normals.len() != n {
            return Err(SegmentError::misaligned("normals", n, self.normals.len()));
        }
        if !self.colors.is_empty() && self.colors.len() != n {
            return Err(SegmentError::misaligned("colors", n, self.colors.len()));
        }
        Ok(())
    }

    /// Add a point with its normal.
    #[inline]
    pub fn push(&mut self, point: Point3<f64>, normal: Vector3<f64>) {
        self.points.push(point);
        self.normals.push(normal);
    }

    /// Add a point with its normal and color.
    #[inline]
    pub fn push_colored(&mut self, point: Point3<f64>, normal: Vector3<f64>, color: PointColor) {
        self.push(point, normal);
        self.colors.push(color);
    }

    /// Arithmetic mean of the point positions. None for an empty cloud.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Some(Point3::from(sum / self.points.len() as f64))
    }

    /// Sum of all normals (not normalized).
    pub fn normal_sum(&self) -> Vector3<f64> {
        self.normals.iter().fold(Vector3::zeros(), |acc, n| acc + n)
    }

    /// Unit-length mean normal. None without normals or when they cancel out.
    pub fn mean_normal(&self) -> Option<Vector3<f64>> {
        if self.normals.is_empty() {
            return None;
        }
        let mean = self.normal_sum() / self.normals.len() as f64;
        mean.try_normalize(f64::EPSILON)
    }

    /// Compute the axis-aligned bounding box as (min, max).
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = *self.points.first()?;
        Some(self.points[1..].iter().fold((first, first), |(min, max), p| {
            (min.inf(p), max.sup(p))
        }))
    }

    /// Append every point of `other`, keeping attributes aligned.
    ///
    /// Colors are kept only if both clouds carry them (or `self` is empty).
    pub fn append(&mut self, mut other: PointCloud) {
        if other.is_empty() {
            return;
        }
        let keep_colors = (self.is_empty() || self.has_colors()) && other.has_colors();
        if !keep_colors && !self.colors.is_empty() {
            debug!(
                dropped = self.colors.len(),
                "Dropping colors while merging with an uncolored cloud"
            );
            self.colors.clear();
        }
        self.points.append(&mut other.points);
        self.normals.append(&mut other.normals);
        if keep_colors {
            self.colors.append(&mut other.colors);
        }
    }

    /// Move the point at `index` (with its attributes) into `dest`.
    ///
    /// Uses swap-remove: the last point takes the vacated slot, so point
    /// order is not preserved.
    pub fn swap_remove_into(&mut self, index: usize, dest: &mut PointCloud) {
        let colored = self.colors.len() > index && (dest.is_empty() || dest.has_colors());
        if !colored && !dest.colors.is_empty() {
            debug!(
                dropped = dest.colors.len(),
                "Dropping colors while merging with an uncolored cloud"
            );
            dest.colors.clear();
        }
        dest.points.push(self.points.swap_remove(index));
        if self.normals.len() > index {
            dest.normals.push(self.normals.swap_remove(index));
        }
        if self.colors.len() > index {
            let color = self.colors.swap_remove(index);
            if colored {
                dest.colors.push(color);
            }
        }
    }

    /// Remove and return the points at `indices`, preserving the relative
    /// order of both the removed and the remaining points.
    ///
    /// `indices` must be strictly increasing.
    pub fn take_indices(&mut self, indices: &[usize]) -> PointCloud {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));

        let has_normals = self.has_normals();
        let has_colors = self.has_colors();
        let mut taken = PointCloud::with_capacity(indices.len());
        let mut keep = PointCloud::with_capacity(self.len().saturating_sub(indices.len()));
        let mut next = indices.iter().peekable();

        for i in 0..self.points.len() {
            let dest = if next.peek() == Some(&&i) {
                next.next();
                &mut taken
            } else {
                &mut keep
            };
            dest.points.push(self.points[i]);
            if has_normals {
                dest.normals.push(self.normals[i]);
            }
            if has_colors {
                dest.colors.push(self.colors[i]);
            }
        }

        *self = keep;
        taken
    }

    /// Estimate normals through `estimator` if the cloud has none.
    ///
    /// Returns true when normals were estimated.
    pub fn ensure_normals(
        &mut self,
        estimator: &dyn NormalEstimator,
        neighbors: usize,
    ) -> SegmentResult<bool> {
        if self.has_normals() || self.is_empty() {
            return Ok(false);
        }
        warn!(
            points = self.len(),
            neighbors, "Point cloud has no normals, estimating them"
        );
        let normals = estimator.estimate_normals(&self.points, neighbors);
        if normals.len() != self.points.len() {
            return Err(SegmentError::misaligned(
                "estimated normals",
                self.points.len(),
                normals.len(),
            ));
        }
        self.normals = normals;
        Ok(true)
    }
}

/// External normal estimation, invoked only for clouds without normals.
pub trait NormalEstimator {
    /// Return one unit normal per input point, in the same order.
    fn estimate_normals(&self, points: &[Point3<f64>], neighbors: usize) -> Vec<Vector3<f64>>;
}

impl<F> NormalEstimator for F
where
    F: Fn(&[Point3<f64>], usize) -> Vec<Vector3<f64>>,
{
    fn estimate_normals(&self, points: &[Point3<f64>], neighbors: usize) -> Vec<Vector3<f64>> {
        self(points, neighbors)
    }
}

/// Stable handle for a cluster, independent of its position in a list.
pub type ClusterId = usize;

/// A locally-coherent group of scanned points produced by upstream clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Stable handle.
    pub id: ClusterId,

    /// Remaining points of this cluster.
    pub cloud: PointCloud,
}

impl Cluster {
    /// Create a cluster with the given id.
    pub fn new(id: ClusterId, cloud: PointCloud) -> Self {
        Self { id, cloud }
    }

    /// Wrap clouds as clusters, using their position as id.
    pub fn from_clouds(clouds: impl IntoIterator<Item = PointCloud>) -> Vec<Cluster> {
        clouds
            .into_iter()
            .enumerate()
            .map(|(id, cloud)| Cluster::new(id, cloud))
            .collect()
    }

    /// Number of remaining points.
    #[inline]
    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    /// Check if the cluster has been exhausted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }

    /// Check the engine's preconditions: non-empty, normals present, aligned.
    pub fn validate(&self) -> SegmentResult<()> {
        if self.cloud.is_empty() {
            return Err(SegmentError::empty_cluster(self.id));
        }
        self.cloud.validate()?;
        if !self.cloud.has_normals() {
            return Err(SegmentError::MissingNormals { cluster: self.id });
        }
        Ok(())
    }
}

/// Clusters obtained from a label vector, plus the points labelled as noise.
#[derive(Debug, Clone)]
pub struct LabeledSplit {
    /// Clusters ordered by first appearance of their label.
    pub clusters: Vec<Cluster>,

    /// Points with a negative label or in a cluster smaller than the minimum size.
    pub noise: PointCloud,
}

/// Split a cloud by per-point cluster labels.
///
/// This adapts the output of label-producing clustering primitives (DBSCAN,
/// connected-component extraction): label `< 0` marks noise. Clusters with
/// fewer than `min_cluster_size` points are moved to the noise cloud, so every
/// input point ends up in exactly one output.
pub fn split_by_labels(
    cloud: &PointCloud,
    labels: &[i32],
    min_cluster_size: usize,
) -> SegmentResult<LabeledSplit> {
    cloud.validate()?;
    if labels.len() != cloud.len() {
        return Err(SegmentError::LabelCountMismatch {
            labels: labels.len(),
            points: cloud.len(),
        });
    }

    let has_normals = cloud.has_normals();
    let has_colors = cloud.has_colors();
    let copy_point = |dest: &mut PointCloud, i: usize| {
        dest.points.push(cloud.points[i]);
        if has_normals {
            dest.normals.push(cloud.normals[i]);
        }
        if has_colors {
            dest.colors.push(cloud.colors[i]);
        }
    };

    let mut slots: HashMap<i32, usize> = HashMap::new();
    let mut groups: Vec<PointCloud> = Vec::new();
    let mut noise = PointCloud::new();

    for (i, &label) in labels.iter().enumerate() {
        if label < 0 {
            copy_point(&mut noise, i);
            continue;
        }
        let slot = *slots.entry(label).or_insert_with(|| {
            groups.push(PointCloud::new());
            groups.len() - 1
        });
        copy_point(&mut groups[slot], i);
    }

    let (kept, small): (Vec<_>, Vec<_>) = groups
        .into_iter()
        .partition(|g| g.len() >= min_cluster_size);
    for group in small {
        noise.append(group);
    }

    debug!(
        clusters = kept.len(),
        noise = noise.len(),
        "Split labelled cloud"
    );

    Ok(LabeledSplit {
        clusters: Cluster::from_clouds(kept),
        noise,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_cloud(n: usize) -> PointCloud {
        let mut cloud = PointCloud::new();
        for i in 0..n {
            cloud.push_colored(
                Point3::new(i as f64, 0.0, 0.0),
                Vector3::z(),
                PointColor::new(i as u8, 0, 0),
            );
        }
        cloud
    }

    #[test]
    fn test_centroid_and_normals() {
        let mut cloud = PointCloud::new();
        cloud.push(Point3::new(0.0, 0.0, 0.0), Vector3::z());
        cloud.push(Point3::new(2.0, 2.0, 0.0), Vector3::z());
        let c = cloud.centroid().unwrap();
        assert!((c.x - 1.0).abs() < 1e-12);
        assert!((cloud.normal_sum().z - 2.0).abs() < 1e-12);
        assert!((cloud.mean_normal().unwrap().z - 1.0).abs() < 1e-12);
        assert!(PointCloud::new().centroid().is_none());
    }

    #[test]
    fn test_mean_normal_cancels() {
        let mut cloud = PointCloud::new();
        cloud.push(Point3::origin(), Vector3::z());
        cloud.push(Point3::origin(), -Vector3::z());
        assert!(cloud.mean_normal().is_none());
    }

    #[test]
    fn test_take_indices_keeps_alignment() {
        let mut cloud = line_cloud(5);
        let taken = cloud.take_indices(&[1, 3]);
        assert_eq!(taken.points[0].x, 1.0);
        assert_eq!(taken.points[1].x, 3.0);
        assert_eq!(taken.colors[1].r, 3);
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.colors.len(), 3);
        assert_eq!(cloud.points[2].x, 4.0);
        assert_eq!(cloud.colors[2].r, 4);
    }

    #[test]
    fn test_swap_remove_into() {
        let mut cloud = line_cloud(3);
        let mut dest = PointCloud::new();
        cloud.swap_remove_into(0, &mut dest);
        assert_eq!(dest.points[0].x, 0.0);
        assert_eq!(dest.colors[0].r, 0);
        assert_eq!(cloud.points[0].x, 2.0);
        assert_eq!(cloud.colors[0].r, 2);
        assert!(cloud.validate().is_ok());
        assert!(dest.validate().is_ok());
    }

    #[test]
    fn test_append_colors() {
        let mut merged = PointCloud::new();
        merged.append(line_cloud(2));
        merged.append(PointCloud::new());
        assert_eq!(merged.colors.len(), 2);

        let mut bare = PointCloud::new();
        bare.push(Point3::origin(), Vector3::z());
        merged.append(bare);
        assert_eq!(merged.len(), 3);
        assert!(merged.colors.is_empty());
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_validate_misaligned() {
        let mut cloud = line_cloud(3);
        cloud.normals.pop();
        let err = cloud.validate().unwrap_err();
        assert!(matches!(
            err,
            SegmentError::MisalignedAttributes {
                attribute: "normals",
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_ensure_normals_only_when_missing() {
        let estimator = |points: &[Point3<f64>], _k: usize| vec![Vector3::x(); points.len()];

        let mut with = line_cloud(2);
        assert!(!with.ensure_normals(&estimator, 50).unwrap());
        assert_eq!(with.normals[0], Vector3::z());

        let mut without = PointCloud {
            points: vec![Point3::origin(); 4],
            ..Default::default()
        };
        assert!(without.ensure_normals(&estimator, 50).unwrap());
        assert_eq!(without.normals.len(), 4);
    }

    #[test]
    fn test_split_by_labels() {
        let cloud = line_cloud(6);
        let split = split_by_labels(&cloud, &[0, 1, 0, -1, 2, 1], 2).unwrap();
        assert_eq!(split.clusters.len(), 2);
        assert_eq!(split.clusters[0].id, 0);
        assert_eq!(split.clusters[0].len(), 2);
        assert_eq!(split.clusters[1].cloud.points[1].x, 5.0);
        // label -1 plus the singleton label 2
        assert_eq!(split.noise.len(), 2);
        assert!(split.noise.has_colors());

        assert!(split_by_labels(&cloud, &[0, 1], 1).is_err());
    }

    #[test]
    fn test_cluster_validate() {
        let err = Cluster::new(7, PointCloud::new()).validate().unwrap_err();
        assert!(matches!(err, SegmentError::EmptyCluster { cluster: 7 }));

        let bare = PointCloud {
            points: vec![Point3::origin()],
            ..Default::default()
        };
        let err = Cluster::new(2, bare).validate().unwrap_err();
        assert!(matches!(err, SegmentError::MissingNormals { cluster: 2 }));
    }
}
