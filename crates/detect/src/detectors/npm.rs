//! npm 탐지기 — package-lock.json / npm-shrinkwrap.json (v2/v3)
//!
//! 잠금 파일의 `packages` 맵을 해석합니다. 키 `""`는 루트 프로젝트이며,
//! 루트의 `dependencies` / `devDependencies` 선언이 명시적 루트가
//! 됩니다. 설치 경로 키(`node_modules/...`)는 npm 호이스팅 규칙을
//! 따르므로, 간선 해석 시 가장 가까운 둘러싼 `node_modules`부터
//! 바깥쪽으로 탐색합니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use compscan_core::error::DetectionError;
use compscan_core::types::{Component, ComponentType};
use compscan_graph::Usage;

use crate::detector::{
    FILE_CHANNEL_CAPACITY, FileComponentDetector, FileMatch, ProcessRequest, ScanContext,
};

/// npm 잠금 파일 탐지기
pub struct NpmDetector {
    telemetry: Mutex<BTreeMap<String, String>>,
}

impl NpmDetector {
    /// 탐지기를 생성합니다.
    pub fn new() -> Self {
        Self {
            telemetry: Mutex::new(BTreeMap::new()),
        }
    }

    fn record_lockfile_version(&self, version: u64) {
        let mut telemetry = self.telemetry.lock().unwrap_or_else(PoisonError::into_inner);
        let key = format!("lockfile_version_{version}");
        let count = telemetry
            .get(&key)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        telemetry.insert(key, (count + 1).to_string());
    }
}

impl Default for NpmDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FileComponentDetector for NpmDetector {
    fn id(&self) -> &str {
        "npm-lockfile"
    }

    fn version(&self) -> u32 {
        2
    }

    fn categories(&self) -> &[&str] {
        &["npm", "javascript"]
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        &[ComponentType::Npm]
    }

    fn search_patterns(&self) -> &[&str] {
        &["package-lock.json", "npm-shrinkwrap.json"]
    }

    /// `node_modules` 아래에 설치된 패키지 자체의 잠금 파일을 걸러냅니다.
    async fn prepare(
        &self,
        mut files: mpsc::Receiver<FileMatch>,
        _ctx: &ScanContext,
    ) -> Result<mpsc::Receiver<FileMatch>, DetectionError> {
        let (tx, filtered) = mpsc::channel(FILE_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(file) = files.recv().await {
                let nested = file
                    .path
                    .components()
                    .any(|c| c.as_os_str() == "node_modules");
                if nested {
                    debug!(path = %file.path.display(), "skipping lockfile under node_modules");
                    continue;
                }
                if tx.send(file).await.is_err() {
                    break;
                }
            }
        });
        Ok(filtered)
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
        let lockfile: NpmLockfile =
            serde_json::from_str(&content).map_err(|e| DetectionError::Detector {
                detector_id: self.id().to_owned(),
                reason: format!("{}: {e}", path.display()),
            })?;

        self.record_lockfile_version(lockfile.lockfile_version);
        if lockfile.packages.is_empty() {
            return Err(DetectionError::Detector {
                detector_id: self.id().to_owned(),
                reason: format!(
                    "{}: lockfile version {} without a packages map is not supported",
                    path.display(),
                    lockfile.lockfile_version
                ),
            });
        }

        let recorder = &request.recorder;

        // 설치 경로 키 → 컴포넌트. 첫 패스에서 모든 설치 패키지를
        // dev 플래그와 함께 등록합니다.
        let mut installed: HashMap<&str, Component> = HashMap::new();
        for (key, entry) in &lockfile.packages {
            if key.is_empty() || entry.link {
                continue;
            }
            let Some(derived) = installed_package_name(key) else {
                continue;
            };
            let name = entry.name.as_deref().unwrap_or(derived);
            let Some(version) = entry.version.as_deref() else {
                debug!(package = name, "installed package without version, skipping");
                continue;
            };
            let component = Component::new(ComponentType::Npm, name, version);
            recorder.register_usage(
                Usage::new(component.clone()).development(entry.dev || entry.dev_optional),
            );
            installed.insert(key.as_str(), component);
        }

        // 루트 프로젝트의 선언이 명시적 루트입니다.
        if let Some(root) = lockfile.packages.get("") {
            for name in root.dependencies.keys() {
                if let Some(component) = resolve_hoisted(&installed, "", name) {
                    recorder
                        .register_usage(Usage::new(component.clone()).explicit(true).development(false));
                }
            }
            for name in root.dev_dependencies.keys() {
                if let Some(component) = resolve_hoisted(&installed, "", name) {
                    recorder
                        .register_usage(Usage::new(component.clone()).explicit(true).development(true));
                }
            }
        }

        // 두 번째 패스: 호이스팅 규칙대로 간선을 해석합니다.
        for (key, entry) in &lockfile.packages {
            if key.is_empty() {
                continue;
            }
            let Some(parent) = installed.get(key.as_str()) else {
                continue;
            };
            for name in entry
                .dependencies
                .keys()
                .chain(entry.optional_dependencies.keys())
            {
                match resolve_hoisted(&installed, key, name) {
                    Some(child) => {
                        recorder.register_usage(Usage::new(child.clone()).parent(parent.id()));
                    }
                    None => {
                        debug!(parent = %parent.id(), dependency = %name, "dependency not installed, skipping edge");
                    }
                }
            }
        }

        Ok(())
    }

    async fn finish(&self) -> BTreeMap<String, String> {
        self.telemetry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Deserialize)]
struct NpmLockfile {
    #[serde(default, rename = "lockfileVersion")]
    lockfile_version: u64,
    #[serde(default)]
    packages: BTreeMap<String, NpmPackage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NpmPackage {
    name: Option<String>,
    version: Option<String>,
    dev: bool,
    #[serde(rename = "devOptional")]
    dev_optional: bool,
    link: bool,
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "optionalDependencies")]
    optional_dependencies: BTreeMap<String, serde_json::Value>,
}

/// 설치 경로 키에서 패키지 이름을 유도합니다.
///
/// `"node_modules/a/node_modules/@scope/b"` → `"@scope/b"`
fn installed_package_name(key: &str) -> Option<&str> {
    key.rsplit_once("node_modules/").map(|(_, name)| name)
}

/// npm 호이스팅 규칙대로 의존성 이름을 설치 패키지로 해석합니다.
///
/// `from` 위치에서 시작해 가장 가까운 둘러싼 `node_modules`부터
/// 바깥쪽으로 올라가며 찾습니다.
fn resolve_hoisted<'a>(
    installed: &'a HashMap<&str, Component>,
    from: &str,
    name: &str,
) -> Option<&'a Component> {
    let mut scope = from.to_owned();
    loop {
        let candidate = if scope.is_empty() {
            format!("node_modules/{name}")
        } else {
            format!("{scope}/node_modules/{name}")
        };
        if let Some(component) = installed.get(candidate.as_str()) {
            return Some(component);
        }
        if scope.is_empty() {
            return None;
        }
        scope = match scope.rfind("/node_modules/") {
            Some(idx) => scope[..idx].to_owned(),
            None => String::new(),
        };
    }
}
