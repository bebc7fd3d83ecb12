//! Metrics for the switchyard mesh.
//!
//! Uses the `metrics` facade: every macro call is a no-op until a recorder is
//! installed. With the `prometheus` feature, [`init_metrics`] installs a
//! Prometheus recorder whose [`MetricsHandle::render`] backs `GET /metrics`.
//!
//! ```rust,ignore
//! use switchyard_metrics::{counter, mesh, labels};
//!
//! counter!(mesh::HOPS_TOTAL, labels::ADDRESS => "context-stage").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
