// src/pipeline/mod.rs

pub mod frame_report;
pub mod metrics;
pub mod orchestrator;

pub use frame_report::FrameReport;
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use orchestrator::PipelineOrchestrator;
