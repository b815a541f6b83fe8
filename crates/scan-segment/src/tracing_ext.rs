//! Tracing helpers for association runs.
//!
//! Nothing here installs a subscriber; applications do that themselves:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=scan_segment=debug for per-face decisions
//! ```
//!
//! # Log Levels
//!
//! - **WARN**: Skipped faces, unresolved clusters, estimated normals
//! - **INFO**: Pass summaries, timing
//! - **DEBUG**: Per-face and per-cluster decisions
//! - **TRACE**: Scores and point counts for every match

use nalgebra::Point3;
use std::time::Instant;
use tracing::span::EnteredSpan;
use tracing::{debug, info, info_span, warn};

use crate::associate::AssociationResult;
use crate::cloud::PointCloud;
use crate::reconcile::ReconcileReport;

/// Timing guard for one engine pass.
///
/// Entering the `scan_pass` span on creation scopes every event of the pass
/// to it. The duration is logged under `scan_segment::timing` when the guard
/// drops, still inside the span.
///
/// ```rust,ignore
/// let _pass = PassTimer::start("segment_assembly", faces.len(), clusters.len());
/// ```
pub struct PassTimer {
    pass: &'static str,
    started: Instant,
    _span: EnteredSpan,
}

impl PassTimer {
    /// Enter the span for `pass` and start the clock.
    pub fn start(pass: &'static str, faces: usize, clusters: usize) -> Self {
        let span = info_span!("scan_pass", pass, faces, clusters).entered();
        debug!(target: "scan_segment::timing", pass, faces, clusters, "Pass started");
        Self {
            pass,
            started: Instant::now(),
            _span: span,
        }
    }

    /// Milliseconds since the pass started.
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for PassTimer {
    fn drop(&mut self) {
        info!(
            target: "scan_segment::timing",
            pass = self.pass,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Pass finished"
        );
    }
}

/// Log point cloud statistics at debug level.
pub fn log_cloud_stats(cloud: &PointCloud, context: &str) {
    let (min_bounds, max_bounds) = cloud
        .bounds()
        .unwrap_or((Point3::origin(), Point3::origin()));
    let dims = max_bounds - min_bounds;

    debug!(
        target: "scan_segment::cloud_state",
        context = context,
        points = cloud.len(),
        has_normals = cloud.has_normals(),
        has_colors = cloud.has_colors(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Cloud state"
    );
}

/// Log the outcome of a primary association pass.
pub fn log_association_summary(result: &AssociationResult, clusters_left: usize) {
    let unmatched = result.unmatched_faces().count();
    info!(
        target: "scan_segment::association",
        faces = result.face_pools.len(),
        unmatched_faces = unmatched,
        associated_points = result.point_count(),
        clusters_left = clusters_left,
        "Primary association completed"
    );
}

/// Log the outcome of a reconciliation pass.
pub fn log_reconcile_summary(report: &ReconcileReport) {
    if report.is_fully_resolved() {
        info!(
            target: "scan_segment::reconcile",
            resolved = report.assignments.len(),
            points_moved = report.points_moved(),
            "Reconciliation completed"
        );
    } else {
        warn!(
            target: "scan_segment::reconcile",
            resolved = report.assignments.len(),
            unresolved = report.unresolved.len(),
            points_moved = report.points_moved(),
            "Reconciliation left clusters without a face"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn current_span_name() -> Option<&'static str> {
        tracing::Span::current().metadata().map(|m| m.name())
    }

    #[test]
    fn test_pass_timer_enters_span() {
        let _subscriber = tracing::subscriber::set_default(tracing_subscriber::registry());
        assert_eq!(current_span_name(), None);

        {
            let timer = PassTimer::start("test_pass", 3, 2);
            assert_eq!(current_span_name(), Some("scan_pass"));
            std::thread::sleep(std::time::Duration::from_millis(10));
            assert!(timer.elapsed_ms() >= 10.0);
        }

        assert_eq!(current_span_name(), None);
    }

    #[test]
    fn test_log_helpers_accept_empty_inputs() {
        log_cloud_stats(&PointCloud::new(), "empty");

        let mut cloud = PointCloud::new();
        cloud.push(Point3::new(1.0, 2.0, 3.0), Vector3::z());
        log_cloud_stats(&cloud, "single");

        log_association_summary(&AssociationResult::default(), 0);
        log_reconcile_summary(&ReconcileReport::default());
    }
}
