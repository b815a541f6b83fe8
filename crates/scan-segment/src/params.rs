//! Tuning parameters for cluster-to-face association.
//!
//! Distances are in the units of the input data (typically millimeters for
//! scans of construction components); the association threshold is a
//! dimensionless relative area residual.
//!
//! # Example
//!
//! ```
//! use scan_segment::AssociationParams;
//!
//! // Defaults are a reasonable starting point for noisy scans.
//! let params = AssociationParams::default();
//!
//! // Or customize
//! let params = AssociationParams::for_scans()
//!     .with_association_threshold(0.05)
//!     .with_parallel(false);
//! assert!(params.validate().is_ok());
//! ```

use crate::error::{SegmentError, SegmentResult};

/// Configuration for the primary association and reconciliation passes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct AssociationParams {
    /// Maximum relative area residual `|r|` for a point to count as lying on
    /// a triangle.
    ///
    /// Larger values accept points whose projection falls slightly outside
    /// the triangle, which helps with scan noise along face borders.
    ///
    /// Default: `0.1`
    pub association_threshold: f64,

    /// Minimum `|cos|` between a cluster normal and a face normal for the pair
    /// to be scored at all.
    ///
    /// Pairs below this are treated as "not a match" instead of producing a
    /// huge or infinite score.
    ///
    /// Default: `1e-6`
    pub min_alignment: f64,

    /// Score candidates and classify points on the rayon thread pool.
    ///
    /// Mutation is always sequential, so results do not depend on this flag.
    ///
    /// Default: `true`
    pub parallel: bool,

    /// Neighbor count handed to the external normal estimator for clouds
    /// without normals.
    ///
    /// Default: `50`
    pub normal_estimation_neighbors: usize,
}

impl Default for AssociationParams {
    fn default() -> Self {
        Self {
            association_threshold: 0.1,
            min_alignment: 1e-6,
            parallel: true,
            normal_estimation_neighbors: 50,
        }
    }
}

impl AssociationParams {
    /// Create default params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for raw scans: tolerant residual, loose alignment guard.
    pub fn for_scans() -> Self {
        Self::default()
    }

    /// Settings for clean or synthetic data: tight residual, stricter
    /// alignment guard.
    pub fn strict() -> Self {
        Self {
            association_threshold: 0.01,
            min_alignment: 1e-3,
            ..Default::default()
        }
    }

    /// Set the association threshold.
    pub fn with_association_threshold(mut self, threshold: f64) -> Self {
        self.association_threshold = threshold;
        self
    }

    /// Set the minimum normal alignment.
    pub fn with_min_alignment(mut self, min_alignment: f64) -> Self {
        self.min_alignment = min_alignment;
        self
    }

    /// Enable or disable parallel scoring.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the neighbor count for normal estimation.
    pub fn with_normal_estimation_neighbors(mut self, neighbors: usize) -> Self {
        self.normal_estimation_neighbors = neighbors;
        self
    }

    /// Check that every parameter is in range.
    pub fn validate(&self) -> SegmentResult<()> {
        if !self.association_threshold.is_finite() || self.association_threshold <= 0.0 {
            return Err(SegmentError::invalid_parameter(
                "association_threshold",
                format!("must be finite and > 0, got {}", self.association_threshold),
            ));
        }
        if !(0.0..1.0).contains(&self.min_alignment) {
            return Err(SegmentError::invalid_parameter(
                "min_alignment",
                format!("must be in [0, 1), got {}", self.min_alignment),
            ));
        }
        if self.normal_estimation_neighbors < 3 {
            return Err(SegmentError::invalid_parameter(
                "normal_estimation_neighbors",
                format!("must be at least 3, got {}", self.normal_estimation_neighbors),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "config")]
impl AssociationParams {
    /// Load params from a TOML string. Missing fields take their defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load params from a JSON string. Missing fields take their defaults.
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AssociationParams::default().validate().is_ok());
        assert!(AssociationParams::strict().validate().is_ok());
        assert!(AssociationParams::for_scans().validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let params = AssociationParams::default().with_association_threshold(0.0);
        assert!(params.validate().is_err());

        let params = AssociationParams::default().with_association_threshold(f64::NAN);
        assert!(params.validate().is_err());

        let params = AssociationParams::default().with_min_alignment(1.0);
        assert!(params.validate().is_err());

        let params = AssociationParams::default().with_normal_estimation_neighbors(2);
        assert!(params.validate().is_err());
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_params_config_files() {
        let params = AssociationParams::strict().with_parallel(false);
        let toml_str = params.to_toml().unwrap();
        assert_eq!(AssociationParams::from_toml(&toml_str).unwrap(), params);

        let parsed = AssociationParams::from_json(r#"{ "association_threshold": 0.2 }"#).unwrap();
        assert_eq!(parsed.association_threshold, 0.2);
        assert_eq!(parsed.normal_estimation_neighbors, 50);
    }
}
