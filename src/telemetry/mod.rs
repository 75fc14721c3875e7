//! Telemetry and logging infrastructure
//!
//! Structured logging with tracing, plus frame timing and link counters.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_default, LogConfig, LogGuard};
pub use metrics::{FrameProfiler, FrameStats, LinkStats};
