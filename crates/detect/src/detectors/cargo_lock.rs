//! cargo 탐지기 — Cargo.lock
//!
//! `[[package]]` 배열을 해석합니다. Cargo.lock은 워크스페이스 루트를
//! 표시하지 않으므로 자동 루트 계산 모드를 사용합니다: 부모 없는
//! 노드(워크스페이스 멤버)가 명시적 루트로 해석됩니다.
//!
//! 의존성 항목은 `"name"`, `"name version"`, `"name version (source)"`
//! 형태입니다. 버전이 생략된 경우 이름이 유일할 때만 간선을 만듭니다.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use compscan_core::error::DetectionError;
use compscan_core::types::{Component, ComponentType};
use compscan_graph::Usage;

use crate::detector::{FileComponentDetector, ProcessRequest, ScanContext};

/// Cargo.lock 탐지기
pub struct CargoLockDetector;

impl CargoLockDetector {
    /// 탐지기를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl Default for CargoLockDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FileComponentDetector for CargoLockDetector {
    fn id(&self) -> &str {
        "cargo-lockfile"
    }

    fn version(&self) -> u32 {
        1
    }

    fn categories(&self) -> &[&str] {
        &["cargo", "rust"]
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        &[ComponentType::Cargo]
    }

    fn search_patterns(&self) -> &[&str] {
        &["Cargo.lock"]
    }

    fn needs_automatic_root_calculation(&self) -> bool {
        true
    }

    async fn process(
        &self,
        request: ProcessRequest,
        _ctx: &ScanContext,
    ) -> Result<(), DetectionError> {
        let path = &request.file.path;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DetectionError::Detector {
                detector_id: self.id().to_owned(),
                reason: format!("{}: {e}", path.display()),
            })?;
        let lockfile: CargoLockfile =
            toml::from_str(&content).map_err(|e| DetectionError::Detector {
                detector_id: self.id().to_owned(),
                reason: format!("{}: {e}", path.display()),
            })?;

        let recorder = &request.recorder;

        let mut by_name: HashMap<&str, Vec<&str>> = HashMap::new();
        for package in &lockfile.packages {
            by_name
                .entry(package.name.as_str())
                .or_default()
                .push(package.version.as_str());
            recorder.register_usage(Usage::new(Component::new(
                ComponentType::Cargo,
                &package.name,
                &package.version,
            )));
        }

        for package in &lockfile.packages {
            let parent = Component::new(ComponentType::Cargo, &package.name, &package.version);
            for dependency in &package.dependencies {
                let mut parts = dependency.split_whitespace();
                let Some(name) = parts.next() else {
                    continue;
                };
                let version = match parts.next() {
                    Some(version) => Some(version),
                    // 버전 생략은 이름이 유일할 때만 해석 가능
                    None => match by_name.get(name) {
                        Some(versions) if versions.len() == 1 => Some(versions[0]),
                        _ => None,
                    },
                };
                match version {
                    Some(version) => {
                        let child = Component::new(ComponentType::Cargo, name, version);
                        recorder.register_usage(Usage::new(child).parent(parent.id()));
                    }
                    None => {
                        debug!(
                            parent = %parent.id(),
                            dependency = name,
                            "ambiguous or missing dependency version, skipping edge"
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CargoLockfile {
    #[serde(default, rename = "package")]
    packages: Vec<CargoPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoPackage {
    name: String,
    version: String,
    #[serde(default)]
    dependencies: Vec<String>,
}
