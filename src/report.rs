//! Report pipeline
//!
//! Reports are served from an LRU cache when possible. On a miss a request
//! goes out on the report channel and the user gets a placeholder; the
//! computed rows come back later through the completion loop, which renders,
//! caches and sends them.

mod cache;
mod channel;
mod formatter;
mod pipeline;

pub use cache::ReportCache;
pub use channel::{
    QueueReportChannel, ReportCompletion, ReportDispatchError, ReportRequest, ReportWorker,
};
pub use pipeline::{run_completion_loop, ReportError, ReportPipeline};
