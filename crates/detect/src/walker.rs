//! 디렉토리 워커 — 단일 패스 순회와 구독 기반 파일 매치 분배
//!
//! 모든 탐지기의 검색 패턴을 구독으로 등록한 뒤 디렉토리 트리를 한 번만
//! 순회합니다. 매치된 파일은 해당 구독자의 bounded mpsc 채널로
//! 스트리밍됩니다.
//!
//! # 순회 규칙
//!
//! - 반복적(스택 기반) 순회 — 깊은 트리에서도 재귀 깊이 제한이 없습니다.
//! - 심볼릭 링크 디렉토리는 따라가지 않습니다 (순환 방지).
//! - 열거 실패한 디렉토리는 경고 후 건너뜁니다. 스캔 전체를 중단하지
//!   않습니다.
//! - 제외 판정은 (디렉토리 이름, 부모 경로)에 대한 술어로, 매치 시
//!   해당 서브트리 전체가 잘립니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use globset::{Glob, GlobSet, GlobSetBuilder};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use compscan_core::error::{CompscanError, ConfigError, DetectionError};
use compscan_core::metrics::{
    LABEL_DETECTOR, WALKER_DIRECTORIES_TOTAL, WALKER_DURATION_SECONDS, WALKER_MATCHES_TOTAL,
    WALKER_SKIPPED_TOTAL,
};

use crate::detector::{FILE_CHANNEL_CAPACITY, FileMatch};

/// 제외 술어 — (디렉토리 이름, 부모 경로)가 제외 대상이면 true
pub type ExclusionPredicate = Arc<dyn Fn(&str, &Path) -> bool + Send + Sync>;

/// 순회 통계
#[derive(Debug, Clone, Default)]
pub struct WalkStats {
    /// 순회한 디렉토리 수
    pub directories: u64,
    /// 구독자에게 전달한 매치 수 (구독자별 합계)
    pub matches: u64,
    /// 건너뛴 서브트리 수 (제외 규칙 + 열거 실패)
    pub skipped: u64,
    /// 순회 소요 시간
    pub duration: Duration,
}

struct Subscription {
    detector_id: String,
    patterns: Vec<String>,
    globs: GlobSet,
    tx: mpsc::Sender<FileMatch>,
}

/// 단일 패스 디렉토리 워커
///
/// `subscribe`로 구독을 모두 등록한 뒤 `walk`를 호출합니다. `walk`는
/// 워커를 소비하며, 순회가 끝나면 모든 구독 채널이 닫힙니다.
pub struct DirectoryWalker {
    root: PathBuf,
    exclusion: ExclusionPredicate,
    subscriptions: Vec<Subscription>,
}

impl DirectoryWalker {
    /// 워커를 생성합니다.
    pub fn new(root: impl Into<PathBuf>, exclusion: ExclusionPredicate) -> Self {
        Self {
            root: root.into(),
            exclusion,
            subscriptions: Vec::new(),
        }
    }

    /// 파일명 글롭 패턴으로 구독을 등록하고 수신 채널을 반환합니다.
    pub fn subscribe(
        &mut self,
        detector_id: &str,
        patterns: &[String],
    ) -> Result<mpsc::Receiver<FileMatch>, DetectionError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| DetectionError::Detector {
                detector_id: detector_id.to_owned(),
                reason: format!("invalid search pattern '{pattern}': {e}"),
            })?;
            builder.add(glob);
        }
        let globs = builder.build().map_err(|e| DetectionError::Detector {
            detector_id: detector_id.to_owned(),
            reason: format!("failed to build search pattern set: {e}"),
        })?;

        let (tx, rx) = mpsc::channel(FILE_CHANNEL_CAPACITY);
        self.subscriptions.push(Subscription {
            detector_id: detector_id.to_owned(),
            patterns: patterns.to_vec(),
            globs,
            tx,
        });
        Ok(rx)
    }

    /// 디렉토리 트리를 순회하고 매치를 구독자에게 분배합니다.
    ///
    /// 순회는 blocking 파일시스템 I/O이므로 `spawn_blocking`에서
    /// 실행됩니다. 반환 시점에 모든 구독 채널이 닫혀 있습니다.
    pub async fn walk(self) -> Result<WalkStats, DetectionError> {
        let start = Instant::now();
        let root = self.root.clone();
        let mut stats = tokio::task::spawn_blocking(move || self.walk_blocking())
            .await
            .map_err(|e| DetectionError::Walk {
                path: root.display().to_string(),
                reason: format!("walk task failed: {e}"),
            })?;

        stats.duration = start.elapsed();
        histogram!(WALKER_DURATION_SECONDS).record(stats.duration.as_secs_f64());
        Ok(stats)
    }

    fn walk_blocking(self) -> WalkStats {
        let mut stats = WalkStats::default();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            stats.directories += 1;
            counter!(WALKER_DIRECTORIES_TOTAL).increment(1);

            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "failed to enumerate directory, skipping subtree");
                    stats.skipped += 1;
                    counter!(WALKER_SKIPPED_TOTAL).increment(1);
                    continue;
                }
            };

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(path = %dir.display(), error = %e, "failed to read directory entry, skipping");
                        continue;
                    }
                };
                // file_type()은 심볼릭 링크를 따라가지 않으므로, 링크된
                // 디렉토리는 어느 분기에도 해당하지 않아 자연히 제외됩니다.
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                let path = entry.path();
                let name = entry.file_name();
                let name = name.to_string_lossy();

                if file_type.is_dir() {
                    if (self.exclusion)(&name, &dir) {
                        debug!(path = %path.display(), "subtree excluded");
                        stats.skipped += 1;
                        counter!(WALKER_SKIPPED_TOTAL).increment(1);
                        continue;
                    }
                    stack.push(path);
                } else if file_type.is_file() {
                    for subscription in &self.subscriptions {
                        let matched = subscription.globs.matches(name.as_ref());
                        let Some(&index) = matched.first() else {
                            continue;
                        };
                        let file = FileMatch {
                            path: path.clone(),
                            pattern: subscription.patterns[index].clone(),
                        };
                        // 수신자가 이미 종료된 구독은 조용히 무시
                        if subscription.tx.blocking_send(file).is_ok() {
                            stats.matches += 1;
                            counter!(
                                WALKER_MATCHES_TOTAL,
                                LABEL_DETECTOR => subscription.detector_id.clone()
                            )
                            .increment(1);
                        }
                    }
                }
            }
        }

        stats
    }
}

/// 디렉토리 이름 글롭 목록에서 제외 술어를 구성합니다.
pub fn exclusion_from_globs(patterns: &[String]) -> Result<ExclusionPredicate, CompscanError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidValue {
            field: "scan.exclusions".to_owned(),
            reason: format!("invalid glob '{pattern}': {e}"),
        })?;
        builder.add(glob);
    }
    let globs = builder.build().map_err(|e| ConfigError::InvalidValue {
        field: "scan.exclusions".to_owned(),
        reason: e.to_string(),
    })?;

    Ok(Arc::new(move |name: &str, _parent: &Path| {
        globs.is_match(name)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_predicate_matches_directory_names() {
        let exclusion =
            exclusion_from_globs(&[".git".to_owned(), "node_modules".to_owned()]).unwrap();
        assert!(exclusion(".git", Path::new("/repo")));
        assert!(exclusion("node_modules", Path::new("/repo/sub")));
        assert!(!exclusion("src", Path::new("/repo")));
    }

    #[test]
    fn invalid_exclusion_glob_is_a_config_error() {
        let result = exclusion_from_globs(&["[".to_owned()]);
        assert!(matches!(result, Err(CompscanError::Config(_))));
    }

    #[test]
    fn invalid_search_pattern_is_rejected_at_subscribe() {
        let mut walker = DirectoryWalker::new("/tmp", Arc::new(|_: &str, _: &Path| false));
        let result = walker.subscribe("broken", &["[".to_owned()]);
        assert!(result.is_err());
    }
}
