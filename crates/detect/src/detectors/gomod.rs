//! go 탐지기 — go.mod (+ `go mod graph`)
//!
//! go 툴체인이 있으면 `go mod graph`로 전이 의존성 그래프를 얻습니다.
//! 출력의 각 행은 `부모 자식` 쌍이며 모듈은 `path@version` 형태입니다.
//! 메인 모듈은 버전이 없으므로, 메인 모듈에서 나가는 간선의 자식이
//! 명시적 루트가 됩니다.
//!
//! 툴체인이 없거나 실행에 실패하면 go.mod의 `require` 블록을 정적으로
//! 파싱하는 폴백을 사용합니다 (`// indirect` 주석이 없는 항목이
//! 명시적).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use compscan_core::error::DetectionError;
use compscan_core::types::{Component, ComponentType};
use compscan_graph::{SingleFileComponentRecorder, Usage};

use crate::detector::{FileComponentDetector, FileMatch, ProcessRequest, ScanContext};
use crate::tool::ToolRunner;

/// go 툴체인 존재 확인에 쓰는 타임아웃
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// go.mod 탐지기
pub struct GoModDetector {
    go_available: AtomicBool,
}

impl GoModDetector {
    /// 탐지기를 생성합니다.
    pub fn new() -> Self {
        Self {
            go_available: AtomicBool::new(false),
        }
    }

    async fn process_with_go(
        &self,
        path: &Path,
        recorder: &Arc<SingleFileComponentRecorder>,
        ctx: &ScanContext,
    ) -> Result<(), DetectionError> {
        let Some(dir) = path.parent() else {
            return Err(DetectionError::Detector {
                detector_id: self.id().to_owned(),
                reason: format!("{}: go.mod has no parent directory", path.display()),
            });
        };

        let runner = ToolRunner::new(ctx.detector_timeout, ctx.cancellation.clone());
        let output = runner.run("go", &["mod", "graph"], dir).await?;

        for line in output.stdout.lines() {
            let mut parts = line.split_whitespace();
            let (Some(from), Some(to)) = (parts.next(), parts.next()) else {
                continue;
            };
            let Some(child) = parse_module_ref(to) else {
                continue;
            };
            match parse_module_ref(from) {
                Some(parent) => {
                    recorder.register_usage(Usage::new(parent.clone()));
                    recorder.register_usage(Usage::new(child).parent(parent.id()));
                }
                // 버전 없는 왼쪽은 메인 모듈: 직접 요구사항이 명시적 루트
                None => {
                    recorder.register_usage(Usage::new(child).explicit(true));
                }
            }
        }
        Ok(())
    }
}

impl Default for GoModDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FileComponentDetector for GoModDetector {
    fn id(&self) -> &str {
        "go-mod"
    }

    fn version(&self) -> u32 {
        1
    }

    fn categories(&self) -> &[&str] {
        &["go"]
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        &[ComponentType::Go]
    }

    fn search_patterns(&self) -> &[&str] {
        &["go.mod"]
    }

    /// `go mod graph`가 go.sum을 새로 만들 수 있습니다.
    fn cleanup_patterns(&self) -> &[&str] {
        &["go.sum"]
    }

    /// 매치를 모두 모아 중첩 모듈을 제거하고 go 툴체인을 한 번만
    /// 확인합니다.
    async fn prepare(
        &self,
        mut files: mpsc::Receiver<FileMatch>,
        ctx: &ScanContext,
    ) -> Result<mpsc::Receiver<FileMatch>, DetectionError> {
        let mut matches = Vec::new();
        while let Some(file) = files.recv().await {
            matches.push(file);
        }

        // 다른 매치된 go.mod의 하위 디렉토리에 있는 go.mod는 상위
        // 모듈의 `go mod graph`가 이미 커버합니다.
        let module_dirs: BTreeSet<PathBuf> = matches
            .iter()
            .filter_map(|file| file.path.parent().map(Path::to_path_buf))
            .collect();
        matches.retain(|file| {
            let Some(dir) = file.path.parent() else {
                return true;
            };
            let nested = dir.ancestors().skip(1).any(|a| module_dirs.contains(a));
            if nested {
                debug!(path = %file.path.display(), "skipping go.mod nested under another module");
            }
            !nested
        });

        let runner = ToolRunner::new(PROBE_TIMEOUT, ctx.cancellation.clone());
        let go = runner.probe("go", &["version"]).await;
        self.go_available.store(go, Ordering::Relaxed);
        if !go && !matches.is_empty() {
            warn!("go toolchain not found, falling back to static go.mod parsing");
        }

        let (tx, filtered) = mpsc::channel(matches.len().max(1));
        for file in matches {
            if tx.send(file).await.is_err() {
                break;
            }
        }
        Ok(filtered)
    }

    async fn process(
        &self,
        request: ProcessRequest,
        ctx: &ScanContext,
    ) -> Result<(), DetectionError> {
        let path = &request.file.path;
        let recorder = &request.recorder;

        if self.go_available.load(Ordering::Relaxed) {
            match self.process_with_go(path, recorder, ctx).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "go mod graph failed, falling back to static parsing");
                }
            }
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DetectionError::Detector {
                detector_id: self.id().to_owned(),
                reason: format!("{}: {e}", path.display()),
            })?;
        parse_go_mod_static(&content, recorder);
        Ok(())
    }
}

/// `path@version` 모듈 참조를 컴포넌트로 파싱합니다.
fn parse_module_ref(s: &str) -> Option<Component> {
    s.split_once('@')
        .filter(|(name, version)| !name.is_empty() && !version.is_empty())
        .map(|(name, version)| Component::new(ComponentType::Go, name, version))
}

/// go.mod의 require 선언을 정적으로 파싱합니다.
fn parse_go_mod_static(content: &str, recorder: &SingleFileComponentRecorder) {
    let mut in_require = false;
    for line in content.lines() {
        let line = line.trim();

        let entry = if in_require {
            if line.starts_with(')') {
                in_require = false;
                continue;
            }
            line
        } else if let Some(rest) = line.strip_prefix("require ") {
            let rest = rest.trim();
            if rest == "(" {
                in_require = true;
                continue;
            }
            rest
        } else {
            continue;
        };

        if entry.is_empty() || entry.starts_with("//") {
            continue;
        }
        let indirect = entry.contains("// indirect");
        let mut parts = entry.split_whitespace();
        let (Some(name), Some(version)) = (parts.next(), parts.next()) else {
            continue;
        };

        let component = Component::new(ComponentType::Go, name, version);
        recorder.register_usage(Usage::new(component).explicit(!indirect));
    }
}

#[cfg(test)]
mod tests {
    use compscan_graph::ComponentRecorder;

    use super::*;

    #[test]
    fn module_refs_require_a_version() {
        let module = parse_module_ref("github.com/pkg/errors@v0.9.1").unwrap();
        assert_eq!(module.name, "github.com/pkg/errors");
        assert_eq!(module.version, "v0.9.1");
        assert!(parse_module_ref("example.com/main").is_none());
        assert!(parse_module_ref("@v1.0.0").is_none());
    }

    #[test]
    fn static_parsing_handles_blocks_and_indirect_markers() {
        let content = r#"
module example.com/app

go 1.22

require (
    github.com/pkg/errors v0.9.1
    golang.org/x/sync v0.7.0 // indirect
)

require github.com/stretchr/testify v1.9.0
"#;
        let recorder = ComponentRecorder::new("go-mod", true);
        let file = recorder.create_single_file_recorder("/repo/go.mod");
        parse_go_mod_static(content, &file);

        let errors_id = Component::new(ComponentType::Go, "github.com/pkg/errors", "v0.9.1").id();
        let sync_id = Component::new(ComponentType::Go, "golang.org/x/sync", "v0.7.0").id();
        let testify_id =
            Component::new(ComponentType::Go, "github.com/stretchr/testify", "v1.9.0").id();

        file.with_graph(|g| {
            assert!(g.is_explicitly_referenced(&errors_id));
            assert!(!g.is_explicitly_referenced(&sync_id));
            assert!(g.is_explicitly_referenced(&testify_id));
        });
        assert_eq!(recorder.detected_components().len(), 3);
    }
}
