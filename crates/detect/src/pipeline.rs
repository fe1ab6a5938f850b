//! 탐지 파이프라인 — 탐지기 하나의 prepare → process → finish 실행
//!
//! 파이프라인은 워커가 스트리밍하는 파일 매치를 받아 파일 단위로
//! process를 동시 실행합니다. 동시성은 `max_threads` 설정에 따라
//! 세마포어로 제한됩니다 (0이면 무제한).
//!
//! 파일 하나의 실패는 경고 + 파싱 실패 기록으로 처리되고 나머지 파일은
//! 계속 진행됩니다. 모든 process가 완료된 뒤에야 finish가 호출됩니다
//! (배리어).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use compscan_core::error::DetectionError;
use compscan_core::metrics::{
    LABEL_DETECTOR, PIPELINE_DETECTOR_DURATION_SECONDS, PIPELINE_FILES_PROCESSED_TOTAL,
    PIPELINE_PARSE_FAILURES_TOTAL,
};
use compscan_core::types::ResultCode;
use compscan_graph::ComponentRecorder;

use crate::cleanup::CleanupCoordinator;
use crate::detector::{DynFileComponentDetector, FileMatch, ProcessRequest, ScanContext};

/// 탐지기 실행 한 번의 요약
#[derive(Debug, Clone)]
pub struct DetectorRunSummary {
    /// 탐지기 id
    pub detector_id: String,
    /// 실행 결과 코드
    pub result_code: ResultCode,
    /// process를 시도한 파일 수
    pub files_processed: u64,
    /// 실패한 파일 수
    pub parse_failures: u64,
    /// 실행 소요 시간
    pub duration: Duration,
    /// 탐지기별 텔레메트리 (finish 반환값)
    pub telemetry: std::collections::BTreeMap<String, String>,
}

impl DetectorRunSummary {
    /// 파일 처리 없이 종료된 실행의 요약을 만듭니다 (에러/타임아웃).
    pub fn terminal(detector_id: impl Into<String>, code: ResultCode, duration: Duration) -> Self {
        Self {
            detector_id: detector_id.into(),
            result_code: code,
            files_processed: 0,
            parse_failures: 0,
            duration,
            telemetry: std::collections::BTreeMap::new(),
        }
    }
}

/// 탐지기 하나의 실행 파이프라인
pub struct DetectionPipeline {
    detector: Arc<dyn DynFileComponentDetector>,
    cleanup_lock: Arc<Mutex<()>>,
}

impl DetectionPipeline {
    /// 파이프라인을 생성합니다.
    ///
    /// `cleanup_lock`은 스캔 전역에서 공유되는 advisory lock입니다.
    pub fn new(detector: Arc<dyn DynFileComponentDetector>, cleanup_lock: Arc<Mutex<()>>) -> Self {
        Self {
            detector,
            cleanup_lock,
        }
    }

    /// 파이프라인을 실행합니다.
    ///
    /// prepare 실패는 [`DetectionError::Prepare`]로 전파됩니다. 파일 단위 실패는
    /// 기록만 남기고 결과 코드를 `PartialSuccess`로 낮춥니다.
    pub async fn run(
        &self,
        files: mpsc::Receiver<FileMatch>,
        recorder: Arc<ComponentRecorder>,
        ctx: Arc<ScanContext>,
    ) -> Result<DetectorRunSummary, DetectionError> {
        let start = Instant::now();
        let detector_id = self.detector.id().to_owned();
        debug!(detector = %detector_id, "detection pipeline starting");

        let mut files =
            self.detector
                .prepare(files, &ctx)
                .await
                .map_err(|e| DetectionError::Prepare {
                    detector_id: detector_id.clone(),
                    reason: e.to_string(),
                })?;

        let cleanup = if ctx.cleanup_created_files {
            CleanupCoordinator::new(
                &detector_id,
                self.detector.cleanup_patterns(),
                ctx.cleanup_dry_run,
                self.cleanup_lock.clone(),
            )?
            .map(Arc::new)
        } else {
            None
        };

        let semaphore = (ctx.max_threads > 0).then(|| Arc::new(Semaphore::new(ctx.max_threads)));
        let processed = Arc::new(AtomicU64::new(0));
        let failures = Arc::new(AtomicU64::new(0));
        let mut tasks = JoinSet::new();

        while let Some(file) = files.recv().await {
            let detector = self.detector.clone();
            let file_recorder = recorder.create_single_file_recorder(&file.path);
            let ctx = ctx.clone();
            let cleanup = cleanup.clone();
            let semaphore = semaphore.clone();
            let processed = processed.clone();
            let failures = failures.clone();

            tasks.spawn(async move {
                let _permit = match &semaphore {
                    Some(semaphore) => semaphore.acquire().await.ok(),
                    None => None,
                };

                let request = ProcessRequest {
                    file: file.clone(),
                    recorder: file_recorder.clone(),
                };
                let result = match &cleanup {
                    Some(cleanup) => {
                        cleanup
                            .with_cleanup(&file.path, || detector.process(request, &ctx))
                            .await
                    }
                    None => detector.process(request, &ctx).await,
                };

                processed.fetch_add(1, Ordering::Relaxed);
                counter!(
                    PIPELINE_FILES_PROCESSED_TOTAL,
                    LABEL_DETECTOR => detector.id().to_owned()
                )
                .increment(1);

                if let Err(e) = result {
                    warn!(
                        detector = detector.id(),
                        path = %file.path.display(),
                        error = %e,
                        "failed to process manifest"
                    );
                    file_recorder.register_package_parse_failure(file.path.display().to_string());
                    failures.fetch_add(1, Ordering::Relaxed);
                    counter!(
                        PIPELINE_PARSE_FAILURES_TOTAL,
                        LABEL_DETECTOR => detector.id().to_owned()
                    )
                    .increment(1);
                }
            });
        }

        // finish 전 배리어: 모든 process 태스크의 완료를 기다립니다.
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(detector = %detector_id, error = %e, "process task panicked");
                failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        let telemetry = self.detector.finish().await;

        let duration = start.elapsed();
        histogram!(
            PIPELINE_DETECTOR_DURATION_SECONDS,
            LABEL_DETECTOR => detector_id.clone()
        )
        .record(duration.as_secs_f64());

        let files_processed = processed.load(Ordering::Relaxed);
        let parse_failures = failures.load(Ordering::Relaxed);
        let result_code = if parse_failures == 0 {
            ResultCode::Success
        } else {
            ResultCode::PartialSuccess
        };
        debug!(
            detector = %detector_id,
            files = files_processed,
            failures = parse_failures,
            result = %result_code,
            "detection pipeline finished"
        );

        Ok(DetectorRunSummary {
            detector_id,
            result_code,
            files_processed,
            parse_failures,
            duration,
            telemetry,
        })
    }
}
