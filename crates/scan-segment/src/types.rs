//! Core geometric types: triangles, reference faces and point colors.

use nalgebra::{Point3, Vector3};

use crate::error::{SegmentError, SegmentResult};

/// RGB color with 8-bit components, carried alongside scanned points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl PointColor {
    /// Create a new color from RGB components.
    #[inline]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A triangle with concrete vertex positions.
///
/// Winding is counter-clockwise when viewed from the front (normal points
/// toward viewer).
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(&e2)
    }

    /// Compute the unit face normal.
    /// Returns None for degenerate triangles (zero area).
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len_sq = n.norm_squared();
        if len_sq > f64::EPSILON * f64::EPSILON {
            Some(n / len_sq.sqrt())
        } else {
            None
        }
    }

    /// Compute the area of the triangle.
    #[inline]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    /// Compute the centroid.
    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::from((self.v0.coords + self.v1.coords + self.v2.coords) / 3.0)
    }

    /// Compute the lengths of the three edges.
    /// Returns [len01, len12, len20] where lenXY is the distance from vX to vY.
    #[inline]
    pub fn edge_lengths(&self) -> [f64; 3] {
        [
            (self.v1 - self.v0).norm(),
            (self.v2 - self.v1).norm(),
            (self.v0 - self.v2).norm(),
        ]
    }

    /// Get the length of the shortest edge.
    #[inline]
    pub fn min_edge_length(&self) -> f64 {
        let lengths = self.edge_lengths();
        lengths[0].min(lengths[1]).min(lengths[2])
    }

    /// Check if the triangle is degenerate (area below `f64::EPSILON`).
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.area() < f64::EPSILON
    }

    /// Orthogonally project a point onto the triangle's supporting plane.
    ///
    /// Returns None for degenerate triangles, which have no plane.
    pub fn project(&self, point: &Point3<f64>) -> Option<Point3<f64>> {
        let n = self.normal()?;
        Some(point - n * n.dot(&(point - self.v0)))
    }

    /// Closest point on the triangle (interior, edges or corners) to `point`.
    ///
    /// Walks the Voronoi regions of the corners, then the edges, and falls
    /// back to barycentric coordinates for the interior. Callers should skip
    /// degenerate triangles, whose interior weights are undefined.
    pub fn closest_point(&self, point: &Point3<f64>) -> Point3<f64> {
        let (a, b, c) = (self.v0, self.v1, self.v2);
        let ab = b - a;
        let ac = c - a;

        let from_a = point - a;
        let (a_ab, a_ac) = (ab.dot(&from_a), ac.dot(&from_a));
        if a_ab <= 0.0 && a_ac <= 0.0 {
            return a;
        }

        let from_b = point - b;
        let (b_ab, b_ac) = (ab.dot(&from_b), ac.dot(&from_b));
        if b_ab >= 0.0 && b_ac <= b_ab {
            return b;
        }

        let weight_c = a_ab * b_ac - b_ab * a_ac;
        if weight_c <= 0.0 && a_ab >= 0.0 && b_ab <= 0.0 {
            return a + ab * (a_ab / (a_ab - b_ab));
        }

        let from_c = point - c;
        let (c_ab, c_ac) = (ab.dot(&from_c), ac.dot(&from_c));
        if c_ac >= 0.0 && c_ab <= c_ac {
            return c;
        }

        let weight_b = c_ab * a_ac - a_ab * c_ac;
        if weight_b <= 0.0 && a_ac >= 0.0 && c_ac <= 0.0 {
            return a + ac * (a_ac / (a_ac - c_ac));
        }

        let weight_a = b_ab * c_ac - c_ab * b_ac;
        let along_bc = b_ac - b_ab;
        let toward_c = c_ab - c_ac;
        if weight_a <= 0.0 && along_bc >= 0.0 && toward_c >= 0.0 {
            return b + (c - b) * (along_bc / (along_bc + toward_c));
        }

        let total = weight_a + weight_b + weight_c;
        a + ab * (weight_b / total) + ac * (weight_c / total)
    }
}

/// Area of the triangle spanned by three points.
#[inline]
pub fn triangle_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    (b - a).cross(&(c - a)).norm() * 0.5
}

/// One planar face of a reference piece: a small indexed triangle mesh.
///
/// Faces carry their own vertex array, so a piece is just an ordered list of
/// faces. The centroid and representative normal are derived on demand.
#[derive(Debug, Clone, Default)]
pub struct FaceMesh {
    /// Optional face label (e.g. "top", "joint-3/side").
    pub name: Option<String>,

    /// Vertex positions.
    pub vertices: Vec<Point3<f64>>,

    /// Triangles as indices into `vertices`.
    pub triangles: Vec<[u32; 3]>,
}

/// A fabricated part, modeled as an ordered set of faces.
pub type Piece = Vec<FaceMesh>;

/// Validate every face of every piece. Errors name both the face and the piece.
pub(crate) fn validate_pieces(pieces: &[Piece]) -> SegmentResult<()> {
    for (piece_index, piece) in pieces.iter().enumerate() {
        for (i, face) in piece.iter().enumerate() {
            face.validate(i).map_err(|e| e.in_piece(piece_index))?;
        }
    }
    Ok(())
}

impl FaceMesh {
    /// Create an empty face.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a face from raw vertex and triangle arrays, checking that every
    /// triangle index refers to an existing vertex.
    pub fn from_raw(vertices: Vec<Point3<f64>>, triangles: Vec<[u32; 3]>) -> SegmentResult<Self> {
        let face = Self {
            name: None,
            vertices,
            triangles,
        };
        face.check_indices(None)?;
        Ok(face)
    }

    /// Build a two-triangle quad from four corners given in winding order.
    pub fn quad(corners: [Point3<f64>; 4]) -> Self {
        Self {
            name: None,
            vertices: corners.to_vec(),
            triangles: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    /// Attach a label to this face.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Check if the face has no geometry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangles.is_empty()
    }

    /// Iterate over triangles with concrete vertex positions.
    ///
    /// Assumes indices are in range; see [`FaceMesh::validate`].
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.triangles.iter().map(|&[i0, i1, i2]| {
            Triangle::new(
                self.vertices[i0 as usize],
                self.vertices[i1 as usize],
                self.vertices[i2 as usize],
            )
        })
    }

    /// Arithmetic mean of the vertex positions.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.vertices.is_empty() {
            return None;
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + v.coords);
        Some(Point3::from(sum / self.vertices.len() as f64))
    }

    /// Unit normal of the first triangle, the face's representative normal.
    ///
    /// None when the face has no triangles or its first triangle is degenerate.
    pub fn first_normal(&self) -> Option<Vector3<f64>> {
        self.triangles().next().and_then(|t| t.normal())
    }

    /// Axis-aligned bounding box as (min, max).
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = *self.vertices.first()?;
        Some(self.vertices[1..].iter().fold((first, first), |(min, max), p| {
            (min.inf(p), max.sup(p))
        }))
    }

    /// Check that the face is usable by the engine: non-empty, indices in range.
    ///
    /// `face` is the caller's index for this face, used in error reports.
    pub fn validate(&self, face: usize) -> SegmentResult<()> {
        if self.triangles.is_empty() {
            return Err(SegmentError::empty_face(face, "no triangles"));
        }
        if self.vertices.is_empty() {
            return Err(SegmentError::empty_face(face, "no vertices"));
        }
        self.check_indices(Some(face))
    }

    fn check_indices(&self, face: Option<usize>) -> SegmentResult<()> {
        let vertex_count = self.vertices.len();
        for (triangle, tri) in self.triangles.iter().enumerate() {
            if let Some(&vertex_index) = tri.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(SegmentError::InvalidTriangleIndex {
                    piece: None,
                    face,
                    triangle,
                    vertex_index,
                    vertex_count,
                });
            }
        }
        Ok(())
    }
}
