//! Orchestrator Module
//!
//! Coordinates the stages of a run: the bounded worker pool, the pipeline
//! that drives segmentation through recommendations, and its reports.

pub mod pipeline;
pub mod pool;
pub mod report;

pub use pipeline::ExtractionPipeline;
pub use pool::WorkerPool;
pub use report::{generated_at, CardsReport, ExtractionReport, RunMeta, RunReport};
