#![doc = include_str!("../README.md")]

pub mod component;
pub mod graph;
pub mod recorder;

// --- Public API Re-exports ---

pub use component::DetectedComponent;
pub use graph::DependencyGraph;
pub use recorder::{ComponentRecorder, SingleFileComponentRecorder, Usage};
