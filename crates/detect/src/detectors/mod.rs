//! 내장 생태계 탐지기

pub mod cargo_lock;
pub mod gomod;
pub mod npm;

pub use cargo_lock::CargoLockDetector;
pub use gomod::GoModDetector;
pub use npm::NpmDetector;
