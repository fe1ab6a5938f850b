//! End-to-end orchestrator tests: shared walk, concurrent detectors,
//! result-code aggregation, and the cross-detector merge.

use std::sync::Arc;
use std::time::Duration;

use compscan_core::config::CompscanConfig;
use compscan_core::error::{CompscanError, DetectionError};
use compscan_core::types::{Component, ComponentType, ResultCode};
use compscan_detect::detector::{FileComponentDetector, ProcessRequest, ScanContext};
use compscan_detect::detectors::{CargoLockDetector, NpmDetector};
use compscan_detect::orchestrator::ScanOrchestrator;
use compscan_detect::registry::DetectorRegistry;
use compscan_graph::Usage;

const NPM_LOCKFILE: &str = include_str!("fixtures/package-lock.json");
const CARGO_LOCKFILE: &str = include_str!("fixtures/Cargo.lock.fixture");

fn config_for(dir: &std::path::Path) -> CompscanConfig {
    let mut config = CompscanConfig::default();
    config.scan.source_dir = dir.display().to_string();
    config
}

fn manifest_registry() -> DetectorRegistry {
    let mut registry = DetectorRegistry::new();
    registry.register(Arc::new(NpmDetector::new()));
    registry.register(Arc::new(CargoLockDetector::new()));
    registry
}

#[tokio::test]
async fn scan_merges_components_across_detectors() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package-lock.json"), NPM_LOCKFILE).unwrap();
    std::fs::create_dir(dir.path().join("backend")).unwrap();
    std::fs::write(dir.path().join("backend/Cargo.lock"), CARGO_LOCKFILE).unwrap();

    let (orchestrator, mut telemetry) =
        ScanOrchestrator::new(manifest_registry(), config_for(dir.path()));
    let result = orchestrator.scan().await.unwrap();

    assert_eq!(result.result_code, ResultCode::Success);
    assert!(result.directories_walked >= 2);
    assert!(result.skipped_components.is_empty());

    // 3 npm components + 3 cargo components
    assert_eq!(result.components.len(), 6);
    let ids: Vec<String> = result.components.iter().map(|c| c.component.id()).collect();
    assert!(ids.contains(&Component::new(ComponentType::Npm, "express", "4.19.2").id()));
    assert!(ids.contains(&Component::new(ComponentType::Cargo, "serde", "1.0.200").id()));

    assert_eq!(result.detector_records.len(), 2);
    assert!(
        result
            .detector_records
            .iter()
            .all(|r| r.result_code == ResultCode::Success)
    );

    // one telemetry event per detector, sharing the scan trace id
    let first = telemetry.recv().await.unwrap();
    let second = telemetry.recv().await.unwrap();
    assert_eq!(
        compscan_core::event::Event::metadata(&first).trace_id,
        compscan_core::event::Event::metadata(&second).trace_id
    );
}

#[tokio::test]
async fn missing_source_dir_is_an_input_error() {
    let mut config = CompscanConfig::default();
    config.scan.source_dir = "/no/such/compscan/source".to_owned();

    let (orchestrator, _telemetry) = ScanOrchestrator::new(manifest_registry(), config);
    let result = orchestrator.scan().await;
    assert!(matches!(result, Err(CompscanError::Input(_))));
}

#[tokio::test]
async fn source_file_is_not_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    std::fs::write(&file, "not a directory").unwrap();

    let mut config = CompscanConfig::default();
    config.scan.source_dir = file.display().to_string();

    let (orchestrator, _telemetry) = ScanOrchestrator::new(manifest_registry(), config);
    let result = orchestrator.scan().await;
    assert!(matches!(result, Err(CompscanError::Input(_))));
}

/// Registers one component per matched file. Optionally experimental.
struct MarkerDetector {
    id: &'static str,
    experimental: bool,
    fail: bool,
}

impl FileComponentDetector for MarkerDetector {
    fn id(&self) -> &str {
        self.id
    }

    fn version(&self) -> u32 {
        1
    }

    fn categories(&self) -> &[&str] {
        &["test"]
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        &[ComponentType::Npm]
    }

    fn search_patterns(&self) -> &[&str] {
        &["*.marker"]
    }

    fn experimental(&self) -> bool {
        self.experimental
    }

    async fn process(
        &self,
        request: ProcessRequest,
        _ctx: &ScanContext,
    ) -> Result<(), DetectionError> {
        if self.fail {
            return Err(DetectionError::Detector {
                detector_id: self.id.to_owned(),
                reason: "always fails".to_owned(),
            });
        }
        request.recorder.register_usage(
            Usage::new(Component::new(ComponentType::Npm, self.id, "1.0")).explicit(true),
        );
        Ok(())
    }
}

#[tokio::test]
async fn experimental_detectors_run_but_do_not_contribute_components() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scan.marker"), "").unwrap();

    let mut registry = DetectorRegistry::new();
    registry.register(Arc::new(MarkerDetector {
        id: "exp",
        experimental: true,
        fail: false,
    }));

    let (orchestrator, _telemetry) = ScanOrchestrator::new(registry, config_for(dir.path()));
    let result = orchestrator.scan().await.unwrap();

    assert_eq!(result.result_code, ResultCode::Success);
    assert!(result.components.is_empty());

    let record = &result.detector_records[0];
    assert!(record.is_experimental);
    assert_eq!(record.component_count, 1);
    assert_eq!(record.explicit_component_count, 1);
}

#[tokio::test]
async fn experimental_failures_do_not_affect_the_overall_result() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scan.marker"), "").unwrap();

    let mut registry = DetectorRegistry::new();
    registry.register(Arc::new(MarkerDetector {
        id: "stable",
        experimental: false,
        fail: false,
    }));
    registry.register(Arc::new(MarkerDetector {
        id: "exp-broken",
        experimental: true,
        fail: true,
    }));

    let (orchestrator, _telemetry) = ScanOrchestrator::new(registry, config_for(dir.path()));
    let result = orchestrator.scan().await.unwrap();

    assert_eq!(result.result_code, ResultCode::Success);
    assert_eq!(result.components.len(), 1);
    assert_eq!(result.components[0].component.name, "stable");
    // the experimental failure is still visible in the records
    let broken = result
        .detector_records
        .iter()
        .find(|r| r.detector_id == "exp-broken")
        .unwrap();
    assert_eq!(broken.result_code, ResultCode::PartialSuccess);
}

#[tokio::test]
async fn enabled_ids_lift_experimental_detectors_into_the_merge() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scan.marker"), "").unwrap();

    let mut registry = DetectorRegistry::new();
    registry.register(Arc::new(MarkerDetector {
        id: "exp",
        experimental: true,
        fail: false,
    }));

    let mut config = config_for(dir.path());
    config.detectors.enabled_ids = vec!["exp".to_owned()];

    let (orchestrator, _telemetry) = ScanOrchestrator::new(registry, config);
    let result = orchestrator.scan().await.unwrap();

    assert_eq!(result.components.len(), 1);
    assert!(!result.detector_records[0].is_experimental);
}

#[tokio::test]
async fn stable_failures_downgrade_the_scan_to_partial_success() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scan.marker"), "").unwrap();

    let mut registry = DetectorRegistry::new();
    registry.register(Arc::new(MarkerDetector {
        id: "stable",
        experimental: false,
        fail: false,
    }));
    registry.register(Arc::new(MarkerDetector {
        id: "broken",
        experimental: false,
        fail: true,
    }));

    let (orchestrator, _telemetry) = ScanOrchestrator::new(registry, config_for(dir.path()));
    let result = orchestrator.scan().await.unwrap();

    assert_eq!(result.result_code, ResultCode::PartialSuccess);
    // the healthy detector still contributes
    assert_eq!(result.components.len(), 1);
    assert_eq!(result.skipped_components.len(), 1);
}

struct SleepyDetector;

impl FileComponentDetector for SleepyDetector {
    fn id(&self) -> &str {
        "sleepy"
    }

    fn version(&self) -> u32 {
        1
    }

    fn categories(&self) -> &[&str] {
        &["test"]
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        &[ComponentType::Npm]
    }

    fn search_patterns(&self) -> &[&str] {
        &["*.marker"]
    }

    async fn process(
        &self,
        _request: ProcessRequest,
        _ctx: &ScanContext,
    ) -> Result<(), DetectionError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

#[tokio::test]
async fn detector_timeout_is_fatal_for_the_whole_scan() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scan.marker"), "").unwrap();

    let mut registry = DetectorRegistry::new();
    registry.register(Arc::new(SleepyDetector));
    registry.register(Arc::new(MarkerDetector {
        id: "stable",
        experimental: false,
        fail: false,
    }));

    let mut config = config_for(dir.path());
    config.scan.detector_timeout_secs = 1;

    let (orchestrator, _telemetry) = ScanOrchestrator::new(registry, config);
    let result = orchestrator.scan().await.unwrap();

    assert_eq!(result.result_code, ResultCode::TimeoutError);
    let sleepy = result
        .detector_records
        .iter()
        .find(|r| r.detector_id == "sleepy")
        .unwrap();
    assert_eq!(sleepy.result_code, ResultCode::TimeoutError);
}
