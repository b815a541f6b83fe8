//! Segment a synthetic scan of two beams.
//!
//! Run with: RUST_LOG=scan_segment=debug cargo run -p scan-segment --example beam_segmentation

use nalgebra::{Point3, Vector3};
use scan_segment::{
    AssociationParams, FaceMesh, Piece, PointCloud, SegmentStatus, check_segment,
    segment_assembly, split_by_labels,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

/// Box-shaped beam with six quad faces.
fn beam(min: Point3<f64>, size: Vector3<f64>) -> Piece {
    let p = |x: f64, y: f64, z: f64| min + Vector3::new(x * size.x, y * size.y, z * size.z);
    vec![
        FaceMesh::quad([p(0., 0., 0.), p(0., 1., 0.), p(1., 1., 0.), p(1., 0., 0.)])
            .with_name("bottom"),
        FaceMesh::quad([p(0., 0., 1.), p(1., 0., 1.), p(1., 1., 1.), p(0., 1., 1.)])
            .with_name("top"),
        FaceMesh::quad([p(0., 0., 0.), p(1., 0., 0.), p(1., 0., 1.), p(0., 0., 1.)])
            .with_name("front"),
        FaceMesh::quad([p(0., 1., 0.), p(0., 1., 1.), p(1., 1., 1.), p(1., 1., 0.)])
            .with_name("back"),
        FaceMesh::quad([p(0., 0., 0.), p(0., 0., 1.), p(0., 1., 1.), p(0., 1., 0.)])
            .with_name("left"),
        FaceMesh::quad([p(1., 0., 0.), p(1., 1., 0.), p(1., 1., 1.), p(1., 0., 1.)])
            .with_name("right"),
    ]
}

fn main() -> miette::Result<()> {
    init_tracing();

    let size = Vector3::new(200.0, 40.0, 40.0);
    let origins = [Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 100.0, 0.0)];
    let pieces: Vec<Piece> = origins.iter().map(|o| beam(*o, size)).collect();

    // Simulated scan without normals: the top of each beam plus the front of
    // the first one, labelled by an upstream clustering step.
    let mut scan = PointCloud::new();
    let mut labels = Vec::new();
    for (label, origin) in origins.iter().enumerate() {
        for i in 0..20 {
            for j in 0..4 {
                scan.points.push(Point3::new(
                    origin.x + 5.0 + i as f64 * 9.5,
                    origin.y + 5.0 + j as f64 * 9.5,
                    origin.z + size.z + 0.3,
                ));
                labels.push(label as i32);
            }
        }
    }
    for i in 0..20 {
        for k in 0..4 {
            scan.points
                .push(Point3::new(5.0 + i as f64 * 9.5, -0.2, 5.0 + k as f64 * 9.5));
            labels.push(2);
        }
    }
    scan.points.push(Point3::new(500.0, 500.0, 500.0));
    labels.push(-1);

    // Stand-in for a real estimator: tops face up, the front faces -y.
    let estimator = |points: &[Point3<f64>], _neighbors: usize| {
        points
            .iter()
            .map(|p| {
                if p.y.abs() < 1.0 {
                    -Vector3::y()
                } else {
                    Vector3::z()
                }
            })
            .collect::<Vec<_>>()
    };

    let params = AssociationParams::for_scans();
    scan.ensure_normals(&estimator, params.normal_estimation_neighbors)?;

    let split = split_by_labels(&scan, &labels, 10)?;
    println!(
        "{} clusters, {} noise points",
        split.clusters.len(),
        split.noise.len()
    );

    let result = segment_assembly(&pieces, split.clusters, &params)?;

    for (index, (pool, origin)) in result.piece_pools.iter().zip(origins).enumerate() {
        let center = origin + size * 0.5;
        let check = check_segment(pool, &center, size.norm() * 0.5)?;
        let status = match check.status {
            SegmentStatus::Consistent => "ok",
            SegmentStatus::Displaced => "displaced",
            SegmentStatus::Empty => "empty",
        };
        println!("beam {index}: {} points ({status})", pool.len());
    }
    println!(
        "{} points left unassigned in {} clusters",
        result.leftover_points(),
        result.leftovers.len()
    );

    Ok(())
}
