//! Error types for segmentation operations with rich diagnostics.
//!
//! Every error is a precondition violation detected before any caller-supplied
//! collection is mutated. Numerical degeneracies (a cluster normal perpendicular
//! to a face, a zero-area triangle) are never errors: the offending candidate is
//! simply rejected. Clusters that cannot be placed on any face are reported in
//! [`ReconcileReport::unresolved`](crate::ReconcileReport) instead.
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `SEG-XXXX`:
//! - `SEG-1xxx`: Input validation errors (empty or misaligned clouds)
//! - `SEG-2xxx`: Geometry errors (faces, triangle indices)
//! - `SEG-3xxx`: Parameter errors
//!
//! # Example
//!
//! ```
//! use scan_segment::{ErrorCode, SegmentError};
//!
//! let err = SegmentError::empty_cluster(3);
//! assert_eq!(err.code(), ErrorCode::EmptyCluster);
//! assert_eq!(err.code().as_str(), "SEG-1001");
//! ```

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for segmentation operations.
pub type SegmentResult<T> = Result<T, SegmentError>;

/// Machine-readable error codes for segmentation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Input validation errors (1xxx)
    /// SEG-1001: Cluster has no points
    EmptyCluster = 1001,
    /// SEG-1002: Normal or color array length differs from point count
    MisalignedAttributes = 1002,
    /// SEG-1003: Cluster has no normals
    MissingNormals = 1003,
    /// SEG-1004: Label vector length differs from point count
    LabelCountMismatch = 1004,

    // Geometry errors (2xxx)
    /// SEG-2001: Face has no triangles or no vertices
    EmptyFace = 2001,
    /// SEG-2002: Triangle references a vertex that does not exist
    InvalidTriangleIndex = 2002,
    /// SEG-2003: Number of piece pools differs from number of pieces
    PoolCountMismatch = 2003,
    /// SEG-2004: Piece has no usable triangle to measure against
    EmptyPiece = 2004,

    // Parameter errors (3xxx)
    /// SEG-3001: Parameter out of range
    InvalidParameter = 3001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `SEG-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EmptyCluster => "SEG-1001",
            ErrorCode::MisalignedAttributes => "SEG-1002",
            ErrorCode::MissingNormals => "SEG-1003",
            ErrorCode::LabelCountMismatch => "SEG-1004",
            ErrorCode::EmptyFace => "SEG-2001",
            ErrorCode::InvalidTriangleIndex => "SEG-2002",
            ErrorCode::PoolCountMismatch => "SEG-2003",
            ErrorCode::EmptyPiece => "SEG-2004",
            ErrorCode::InvalidParameter => "SEG-3001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for segmentation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Drop empty clusters before calling the engine.
    FilterInput { description: String },
    /// Estimate normals before segmenting.
    EstimateNormals { neighbors: usize },
    /// Check the reference mesh export.
    CheckReferenceMesh { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::FilterInput { description } => write!(f, "{}", description),
            RecoverySuggestion::EstimateNormals { neighbors } => {
                write!(
                    f,
                    "Estimate normals with {} neighbors before segmenting",
                    neighbors
                )
            }
            RecoverySuggestion::CheckReferenceMesh { checks } => {
                write!(f, "Check the reference mesh for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
        }
    }
}

/// Errors that can occur during segmentation.
#[derive(Debug, Error, Diagnostic)]
pub enum SegmentError {
    /// A cluster with no points was passed where a centroid is required.
    #[error("cluster {cluster} has no points")]
    #[diagnostic(
        code(segment::input::empty_cluster),
        help("Remove empty clusters before association; an empty cluster has no centroid.")
    )]
    EmptyCluster { cluster: usize },

    /// Attribute arrays are not index-aligned with the point array.
    #[error("{attribute} array has {actual} entries but the cloud has {expected} points")]
    #[diagnostic(
        code(segment::input::misaligned),
        help("Normals and colors must be stored in the same order as the points they belong to.")
    )]
    MisalignedAttributes {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A cluster has no normals.
    #[error("cluster {cluster} has no normals")]
    #[diagnostic(
        code(segment::input::missing_normals),
        help("Call `PointCloud::ensure_normals` with a normal estimator before segmenting.")
    )]
    MissingNormals { cluster: usize },

    /// A label vector does not cover the cloud.
    #[error("got {labels} labels for {points} points")]
    #[diagnostic(code(segment::input::labels))]
    LabelCountMismatch { labels: usize, points: usize },

    /// A face with no triangles or vertices.
    ///
    /// `piece` is set when the face was checked as part of an assembly.
    #[error("face {face}{} is empty: {details}", of_piece(.piece))]
    #[diagnostic(
        code(segment::geometry::empty_face),
        help("Every reference face needs at least one triangle.")
    )]
    EmptyFace {
        piece: Option<usize>,
        face: usize,
        details: String,
    },

    /// A triangle refers to a vertex outside the face's vertex array.
    #[error(
        "invalid triangle index{}: triangle {triangle} references vertex {vertex_index}, but the face only has {vertex_count} vertices",
        face_location(.piece, .face)
    )]
    #[diagnostic(code(segment::geometry::triangle_index))]
    InvalidTriangleIndex {
        piece: Option<usize>,
        face: Option<usize>,
        triangle: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// The number of destination pools does not match the number of pieces.
    #[error("got {pools} piece pools for {pieces} pieces")]
    #[diagnostic(
        code(segment::geometry::pool_count),
        help("Pass exactly one point pool per piece, in the same order as the pieces.")
    )]
    PoolCountMismatch { pools: usize, pieces: usize },

    /// A piece without any non-degenerate triangle, so no distance to it exists.
    #[error("piece{} has no triangles to measure against", index_suffix(.piece))]
    #[diagnostic(code(segment::geometry::empty_piece))]
    EmptyPiece { piece: Option<usize> },

    /// A parameter is outside its valid range.
    #[error("invalid parameter {name}: {details}")]
    #[diagnostic(code(segment::params::invalid))]
    InvalidParameter { name: &'static str, details: String },
}

impl SegmentError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SegmentError::EmptyCluster { .. } => ErrorCode::EmptyCluster,
            SegmentError::MisalignedAttributes { .. } => ErrorCode::MisalignedAttributes,
            SegmentError::MissingNormals { .. } => ErrorCode::MissingNormals,
            SegmentError::LabelCountMismatch { .. } => ErrorCode::LabelCountMismatch,
            SegmentError::EmptyFace { .. } => ErrorCode::EmptyFace,
            SegmentError::InvalidTriangleIndex { .. } => ErrorCode::InvalidTriangleIndex,
            SegmentError::PoolCountMismatch { .. } => ErrorCode::PoolCountMismatch,
            SegmentError::EmptyPiece { .. } => ErrorCode::EmptyPiece,
            SegmentError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            SegmentError::EmptyCluster { .. } => RecoverySuggestion::FilterInput {
                description: "Drop clusters with no points before association".into(),
            },
            SegmentError::MisalignedAttributes { .. } => RecoverySuggestion::FilterInput {
                description: "Rebuild the cloud so normals and colors match the points".into(),
            },
            SegmentError::MissingNormals { .. } => {
                RecoverySuggestion::EstimateNormals { neighbors: 50 }
            }
            SegmentError::LabelCountMismatch { .. } => RecoverySuggestion::FilterInput {
                description: "Pass exactly one label per point".into(),
            },
            SegmentError::EmptyFace { .. }
            | SegmentError::InvalidTriangleIndex { .. }
            | SegmentError::EmptyPiece { .. } => {
                RecoverySuggestion::CheckReferenceMesh {
                    checks: vec!["face triangulation".into(), "vertex indices".into()],
                }
            }
            SegmentError::PoolCountMismatch { pieces, .. } => RecoverySuggestion::FilterInput {
                description: format!("Pass {} piece pools", pieces),
            },
            SegmentError::InvalidParameter { name, .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![((*name).into(), "use a finite, non-negative value".into())],
            },
        }
    }

    /// Create an EmptyCluster error.
    pub fn empty_cluster(cluster: usize) -> Self {
        SegmentError::EmptyCluster { cluster }
    }

    /// Create an EmptyFace error for a face outside any piece.
    pub fn empty_face(face: usize, details: impl Into<String>) -> Self {
        SegmentError::EmptyFace {
            piece: None,
            face,
            details: details.into(),
        }
    }

    /// Attach the index of the owning piece to a face or piece error.
    ///
    /// Other errors are returned unchanged.
    pub fn in_piece(mut self, index: usize) -> Self {
        if let SegmentError::EmptyFace { piece, .. }
        | SegmentError::InvalidTriangleIndex { piece, .. }
        | SegmentError::EmptyPiece { piece } = &mut self
        {
            *piece = Some(index);
        }
        self
    }

    /// Create a MisalignedAttributes error.
    pub fn misaligned(attribute: &'static str, expected: usize, actual: usize) -> Self {
        SegmentError::MisalignedAttributes {
            attribute,
            expected,
            actual,
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(name: &'static str, details: impl Into<String>) -> Self {
        SegmentError::InvalidParameter {
            name,
            details: details.into(),
        }
    }
}

fn of_piece(piece: &Option<usize>) -> String {
    piece.map(|p| format!(" of piece {p}")).unwrap_or_default()
}

fn index_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" {i}")).unwrap_or_default()
}

fn face_location(piece: &Option<usize>, face: &Option<usize>) -> String {
    match (piece, face) {
        (Some(p), Some(f)) => format!(" in face {f} of piece {p}"),
        (None, Some(f)) => format!(" in face {f}"),
        (Some(p), None) => format!(" in piece {p}"),
        (None, None) => String::new(),
    }
}
