#![doc = include_str!("../README.md")]

pub mod cleanup;
pub mod detector;
pub mod detectors;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod telemetry;
pub mod tool;
pub mod walker;

// --- Public API Re-exports ---

pub use cleanup::CleanupCoordinator;
pub use detector::{
    DynFileComponentDetector, FileComponentDetector, FileMatch, ProcessRequest, ScanContext,
};
pub use orchestrator::{ScanOrchestrator, ScanResult};
pub use pipeline::{DetectionPipeline, DetectorRunSummary};
pub use registry::{DetectorRegistry, SelectedDetector};
pub use telemetry::{DetectorExecutionEvent, DetectorExecutionRecord};
pub use tool::{ToolOutput, ToolRunner};
pub use walker::{DirectoryWalker, WalkStats};
