//! Streaming pipelines
//!
//! Two independent blocking loops, one per direction, each owning its own
//! frame buffer, connection and audio device.

mod receive;
mod report;
mod send;

pub use receive::ReceivePipeline;
pub use report::{CancelFlag, Direction, PipelineReport, Termination};
pub use send::SendPipeline;
