//! Pipeline telemetry.
//!
//! Lock-free counters incremented by the collector kernel, its workers and
//! the canvas reactor. Reading them never blocks the pipeline.
//!
//! # Architecture
//!
//! ```text
//! Kernel / Workers / Reactor ─────► PipelineMetrics ─────► TelemetrySnapshot ─────► Views
//!                                  (atomic counters)      (point-in-time copy)      (CLI, logs)
//! ```
//!
//! # Example
//!
//! ```
//! use tilecanvas::telemetry::PipelineMetrics;
//!
//! let metrics = PipelineMetrics::new();
//! metrics.spec_submitted();
//! metrics.tile_completed();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.tiles_completed, 1);
//! println!("{snapshot}");
//! ```

mod metrics;
mod snapshot;

pub use metrics::PipelineMetrics;
pub use snapshot::TelemetrySnapshot;
