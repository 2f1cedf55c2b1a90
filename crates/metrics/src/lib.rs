//! Metrics collection and export for beenbag.
//!
//! Library crates record through the `metrics` facade macros re-exported
//! here, behind their own `metrics` feature. The binary installs a recorder
//! with [`init_metrics`]; with the `prometheus` feature the recorder renders
//! the Prometheus text format.
//!
//! ```rust,ignore
//! use beenbag_metrics::{counter, gate};
//!
//! counter!(gate::THROTTLED_TOTAL, "operation" => "edit_message").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
