// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod decay;
pub mod ingest;
pub mod metrics;
pub mod phase;
pub mod pipeline;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use crate::api::create_router;
pub use crate::config::PipelineConfig;
pub use crate::phase::PhaseEvent;
pub use crate::pipeline::{Pipeline, PipelineError, RunOptions};
pub use crate::stats::{PipelineStats, RunMode, ZeroReason};
