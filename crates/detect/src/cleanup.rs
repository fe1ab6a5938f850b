//! 산출물 정리 — 스냅샷 비교 기반 cleanup 코디네이터
//!
//! 외부 도구를 실행하는 탐지기는 매니페스트 디렉토리에 임시 산출물
//! (lock 파일, 캐시 디렉토리 등)을 남길 수 있습니다. 코디네이터는
//! process 전후로 패턴에 매치되는 경로의 스냅샷을 찍고, 새로 생긴
//! 경로만 삭제합니다. 스캔 전부터 존재하던 파일은 절대 건드리지
//! 않습니다.
//!
//! 삭제는 전역 advisory lock으로 직렬화됩니다. 서로 다른 탐지기가
//! 같은 디렉토리를 동시에 정리하다 충돌하는 것을 막기 위한 것으로,
//! 스냅샷과 process 자체는 잠금 없이 동시에 진행됩니다.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, info};

use compscan_core::error::DetectionError;
use compscan_core::metrics::{LABEL_DETECTOR, PIPELINE_CLEANUP_DELETED_TOTAL};

/// 스냅샷이 내려가는 최대 깊이 (매니페스트 디렉토리 기준)
const MAX_CLEANUP_DEPTH: usize = 5;

#[derive(Debug, Default)]
struct Snapshot {
    files: BTreeSet<PathBuf>,
    dirs: BTreeSet<PathBuf>,
}

/// 탐지기 하나의 cleanup 코디네이터
pub struct CleanupCoordinator {
    detector_id: String,
    globs: GlobSet,
    dry_run: bool,
    lock: Arc<Mutex<()>>,
}

impl CleanupCoordinator {
    /// 코디네이터를 생성합니다. 패턴이 없으면 `None`을 반환합니다.
    pub fn new(
        detector_id: &str,
        patterns: &[&str],
        dry_run: bool,
        lock: Arc<Mutex<()>>,
    ) -> Result<Option<Self>, DetectionError> {
        if patterns.is_empty() {
            return Ok(None);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| DetectionError::Detector {
                detector_id: detector_id.to_owned(),
                reason: format!("invalid cleanup pattern '{pattern}': {e}"),
            })?;
            builder.add(glob);
        }
        let globs = builder.build().map_err(|e| DetectionError::Detector {
            detector_id: detector_id.to_owned(),
            reason: format!("failed to build cleanup pattern set: {e}"),
        })?;

        Ok(Some(Self {
            detector_id: detector_id.to_owned(),
            globs,
            dry_run,
            lock,
        }))
    }

    /// process 실행을 전후 스냅샷으로 감싸고 새로 생긴 산출물을 삭제합니다.
    ///
    /// process가 에러를 반환하면 cleanup 없이 그대로 전파됩니다.
    /// 스냅샷이나 삭제의 실패는 스캔을 중단시키지 않습니다.
    pub async fn with_cleanup<F, Fut>(
        &self,
        manifest: &Path,
        process: F,
    ) -> Result<(), DetectionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), DetectionError>>,
    {
        let root = manifest.parent().unwrap_or(manifest).to_path_buf();

        let before = match self.snapshot(&root).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!(path = %root.display(), error = %e, "pre-process snapshot failed, cleanup disabled for this file");
                None
            }
        };

        process().await?;

        let Some(before) = before else {
            return Ok(());
        };
        let after = match self.snapshot(&root).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(path = %root.display(), error = %e, "post-process snapshot failed, skipping cleanup");
                return Ok(());
            }
        };

        let created_dirs: Vec<_> = after.dirs.difference(&before.dirs).cloned().collect();
        let created_files: Vec<_> = after
            .files
            .difference(&before.files)
            .filter(|file| !created_dirs.iter().any(|dir| file.starts_with(dir)))
            .cloned()
            .collect();
        if created_dirs.is_empty() && created_files.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.lock().await;
        let mut deleted: u64 = 0;

        for dir in created_dirs {
            if self.dry_run {
                info!(detector = %self.detector_id, path = %dir.display(), "dry-run: would delete created directory");
                continue;
            }
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    debug!(detector = %self.detector_id, path = %dir.display(), "deleted created directory");
                    deleted += 1;
                }
                Err(e) => {
                    debug!(path = %dir.display(), error = %e, "failed to delete created directory");
                }
            }
        }
        for file in created_files {
            if self.dry_run {
                info!(detector = %self.detector_id, path = %file.display(), "dry-run: would delete created file");
                continue;
            }
            match tokio::fs::remove_file(&file).await {
                Ok(()) => {
                    debug!(detector = %self.detector_id, path = %file.display(), "deleted created file");
                    deleted += 1;
                }
                Err(e) => {
                    debug!(path = %file.display(), error = %e, "failed to delete created file");
                }
            }
        }

        if deleted > 0 {
            counter!(
                PIPELINE_CLEANUP_DELETED_TOTAL,
                LABEL_DETECTOR => self.detector_id.clone()
            )
            .increment(deleted);
        }
        Ok(())
    }

    /// 패턴에 매치되는 경로의 깊이 제한 스냅샷을 찍습니다.
    async fn snapshot(&self, root: &Path) -> Result<Snapshot, DetectionError> {
        let globs = self.globs.clone();
        let root = root.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut snapshot = Snapshot::default();
            let mut stack = vec![(root, 0usize)];

            while let Some((dir, depth)) = stack.pop() {
                let entries = match std::fs::read_dir(&dir) {
                    Ok(entries) => entries,
                    Err(e) => {
                        debug!(path = %dir.display(), error = %e, "snapshot skipping unreadable directory");
                        continue;
                    }
                };
                for entry in entries.flatten() {
                    let Ok(file_type) = entry.file_type() else {
                        continue;
                    };
                    let path = entry.path();
                    let name = entry.file_name();
                    let name = name.to_string_lossy();

                    if file_type.is_dir() {
                        if globs.is_match(name.as_ref()) {
                            snapshot.dirs.insert(path.clone());
                        }
                        if depth + 1 < MAX_CLEANUP_DEPTH {
                            stack.push((path, depth + 1));
                        }
                    } else if file_type.is_file() && globs.is_match(name.as_ref()) {
                        snapshot.files.insert(path);
                    }
                }
            }

            snapshot
        })
        .await
        .map_err(|e| DetectionError::Channel(format!("snapshot task failed: {e}")))
    }
}
