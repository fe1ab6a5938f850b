//! 스캔 오케스트레이터 — 워커와 탐지기 파이프라인의 조율
//!
//! 오케스트레이터는 스캔 한 번을 조율합니다:
//!
//! 1. 스캔 루트 검증 (없거나 디렉토리가 아니면 입력 에러)
//! 2. 설정 기반 탐지기 선택
//! 3. 탐지기별 파이프라인을 동시 실행 (탐지기별 타임아웃 포함)
//! 4. 공유 워커 단일 패스 순회
//! 5. 결과 코드 집계와 컴포넌트 전역 병합
//!
//! # 결과 코드 집계
//!
//! - 어떤 탐지기든 타임아웃이면 전체 결과는 `TimeoutError` (치명적 —
//!   타임아웃된 탐지기의 외부 도구가 어떤 상태를 남겼는지 보장할 수
//!   없습니다).
//! - 정식 탐지기의 에러/부분 실패는 전체를 `PartialSuccess`로 낮춥니다.
//! - 실험적 탐지기의 실패는 전체 결과에 영향을 주지 않습니다
//!   (타임아웃 제외).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use compscan_core::config::CompscanConfig;
use compscan_core::error::{CompscanError, DetectionError, InputError};
use compscan_core::event::{EventMetadata, MODULE_ORCHESTRATOR};
use compscan_core::metrics::{
    LABEL_DETECTOR, LABEL_RESULT, ORCHESTRATOR_COMPONENTS_DETECTED,
    ORCHESTRATOR_DETECTOR_RUNS_TOTAL, ORCHESTRATOR_SCAN_DURATION_SECONDS,
};
use compscan_core::types::{ResultCode, ScannedComponent};
use compscan_graph::ComponentRecorder;

use crate::detector::ScanContext;
use crate::pipeline::{DetectionPipeline, DetectorRunSummary};
use crate::registry::DetectorRegistry;
use crate::telemetry::{DetectorExecutionEvent, DetectorExecutionRecord};
use crate::walker::{DirectoryWalker, exclusion_from_globs};

/// 텔레메트리 채널 용량
const TELEMETRY_CHANNEL_CAPACITY: usize = 64;

/// 스캔 한 번의 최종 결과
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// 집계된 결과 코드
    pub result_code: ResultCode,
    /// 전역 병합을 거친 최종 컴포넌트 목록 (id 순 정렬)
    pub components: Vec<ScannedComponent>,
    /// 파싱 실패로 건너뛴 위치 목록
    pub skipped_components: Vec<String>,
    /// 탐지기별 실행 기록 (실험적 탐지기 포함)
    pub detector_records: Vec<DetectorExecutionRecord>,
    /// 순회한 디렉토리 수
    pub directories_walked: u64,
    /// 전체 스캔 소요 시간
    pub duration: Duration,
}

struct DetectorRun {
    handle: JoinHandle<DetectorRunSummary>,
    recorder: Arc<ComponentRecorder>,
    detector_version: u32,
    experimental: bool,
}

/// 스캔 오케스트레이터
pub struct ScanOrchestrator {
    registry: DetectorRegistry,
    config: CompscanConfig,
    telemetry_tx: mpsc::Sender<DetectorExecutionEvent>,
}

impl ScanOrchestrator {
    /// 오케스트레이터와 텔레메트리 수신 채널을 생성합니다.
    ///
    /// 수신자를 버리면 이벤트는 조용히 유실됩니다 (스캔은 영향 없음).
    pub fn new(
        registry: DetectorRegistry,
        config: CompscanConfig,
    ) -> (Self, mpsc::Receiver<DetectorExecutionEvent>) {
        let (telemetry_tx, telemetry_rx) = mpsc::channel(TELEMETRY_CHANNEL_CAPACITY);
        (
            Self {
                registry,
                config,
                telemetry_tx,
            },
            telemetry_rx,
        )
    }

    /// 스캔을 실행합니다.
    pub async fn scan(&self) -> Result<ScanResult, CompscanError> {
        let start = Instant::now();
        let trace_id = EventMetadata::with_new_trace(MODULE_ORCHESTRATOR).trace_id;

        let source_dir = self.validate_source_dir().await?;
        let selected = self.registry.select(&self.config.detectors)?;
        info!(
            source_dir = %source_dir.display(),
            detectors = selected.len(),
            trace_id = %trace_id,
            "scan starting"
        );

        let exclusion = exclusion_from_globs(&self.config.scan.exclusions)?;
        let mut walker = DirectoryWalker::new(&source_dir, exclusion);
        let root_token = CancellationToken::new();
        let cleanup_lock = Arc::new(Mutex::new(()));

        let mut runs = Vec::with_capacity(selected.len());
        for selection in selected {
            let detector = selection.detector;
            let patterns: Vec<String> = detector
                .search_patterns()
                .iter()
                .map(|p| p.to_string())
                .collect();
            let files = walker.subscribe(detector.id(), &patterns)?;

            let ctx = Arc::new(ScanContext {
                source_dir: source_dir.clone(),
                detector_args: self.config.detectors.args.clone(),
                max_threads: self.config.scan.max_threads,
                cleanup_created_files: self.config.scan.cleanup_created_files,
                cleanup_dry_run: self.config.scan.cleanup_dry_run,
                detector_timeout: Duration::from_secs(self.config.scan.detector_timeout_secs),
                cancellation: root_token.child_token(),
            });
            let recorder = Arc::new(ComponentRecorder::new(
                detector.id(),
                !detector.needs_automatic_root_calculation(),
            ));
            let pipeline = DetectionPipeline::new(detector.clone(), cleanup_lock.clone());
            let detector_id = detector.id().to_owned();
            let detector_version = detector.version();
            let task_recorder = recorder.clone();

            let handle = tokio::spawn(async move {
                let run_start = Instant::now();
                let timeout = ctx.detector_timeout;
                match tokio::time::timeout(timeout, pipeline.run(files, task_recorder, ctx.clone()))
                    .await
                {
                    Ok(Ok(summary)) => summary,
                    Ok(Err(e)) => {
                        warn!(detector = %detector_id, error = %e, "detector failed");
                        DetectorRunSummary::terminal(
                            detector_id,
                            ResultCode::Error,
                            run_start.elapsed(),
                        )
                    }
                    Err(_) => {
                        // 실행 중인 외부 도구까지 중단시킵니다.
                        ctx.cancellation.cancel();
                        warn!(detector = %detector_id, timeout_secs = timeout.as_secs(), "detector timed out");
                        DetectorRunSummary::terminal(
                            detector_id,
                            ResultCode::TimeoutError,
                            run_start.elapsed(),
                        )
                    }
                }
            });
            runs.push(DetectorRun {
                handle,
                recorder,
                detector_version,
                experimental: selection.experimental,
            });
        }

        // 파이프라인들이 이미 채널을 잡고 있으므로 순회와 처리가
        // 동시에 진행됩니다.
        let walk_stats = walker.walk().await?;

        let mut overall = ResultCode::Success;
        let mut records = Vec::with_capacity(runs.len());
        let mut merged: HashMap<String, ScannedComponent> = HashMap::new();
        let mut skipped = Vec::new();

        for run in runs {
            let summary = run
                .handle
                .await
                .map_err(|e| DetectionError::Channel(format!("detector task failed: {e}")))?;

            if summary.result_code == ResultCode::TimeoutError {
                overall = ResultCode::TimeoutError;
            } else if summary.result_code > ResultCode::Success
                && !run.experimental
                && overall != ResultCode::TimeoutError
            {
                overall = overall.max(ResultCode::PartialSuccess);
            }
            counter!(
                ORCHESTRATOR_DETECTOR_RUNS_TOTAL,
                LABEL_DETECTOR => summary.detector_id.clone(),
                LABEL_RESULT => summary.result_code.to_string()
            )
            .increment(1);

            let components = run.recorder.scanned_components();
            let record = DetectorExecutionRecord {
                detector_id: summary.detector_id.clone(),
                detector_version: run.detector_version,
                is_experimental: run.experimental,
                result_code: summary.result_code,
                duration_ms: summary.duration.as_millis() as u64,
                files_processed: summary.files_processed,
                parse_failures: summary.parse_failures,
                component_count: components.len(),
                explicit_component_count: run.recorder.explicit_component_count(),
                additional: summary.telemetry,
            };
            // 텔레메트리는 best-effort: 수신자가 느리거나 없으면 버립니다.
            let _ = self
                .telemetry_tx
                .try_send(DetectorExecutionEvent::new(record.clone(), &trace_id));
            records.push(record);

            if !run.experimental && summary.result_code != ResultCode::TimeoutError {
                for component in components {
                    merge_scanned(&mut merged, component);
                }
                skipped.extend(run.recorder.skipped_components());
            }
        }

        skipped.sort();
        skipped.dedup();
        let mut components: Vec<_> = merged.into_values().collect();
        components.sort_by_key(|c| c.component.id());

        let duration = start.elapsed();
        gauge!(ORCHESTRATOR_COMPONENTS_DETECTED).set(components.len() as f64);
        histogram!(ORCHESTRATOR_SCAN_DURATION_SECONDS).record(duration.as_secs_f64());
        info!(
            components = components.len(),
            directories = walk_stats.directories,
            result = %overall,
            duration_ms = duration.as_millis() as u64,
            "scan finished"
        );

        Ok(ScanResult {
            result_code: overall,
            components,
            skipped_components: skipped,
            detector_records: records,
            directories_walked: walk_stats.directories,
            duration,
        })
    }

    async fn validate_source_dir(&self) -> Result<PathBuf, CompscanError> {
        let source_dir = PathBuf::from(&self.config.scan.source_dir);
        let metadata = match tokio::fs::metadata(&source_dir).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InputError::SourceDirMissing {
                    path: source_dir.display().to_string(),
                }
                .into());
            }
            Err(e) => return Err(CompscanError::Io(e)),
        };
        if !metadata.is_dir() {
            return Err(InputError::SourceNotADirectory {
                path: source_dir.display().to_string(),
            }
            .into());
        }
        Ok(source_dir.canonicalize().unwrap_or(source_dir))
    }
}

/// 탐지기 간 전역 병합: 최초 관측이 식별 정보를 정하고, 파일 경로와
/// 참조자는 합집합, dev 여부는 알려진 값들의 AND, 스코프는 선착순.
fn merge_scanned(merged: &mut HashMap<String, ScannedComponent>, component: ScannedComponent) {
    let id = component.component.id();
    match merged.get_mut(&id) {
        Some(existing) => {
            for path in component.file_paths {
                if !existing.file_paths.contains(&path) {
                    existing.file_paths.push(path);
                }
            }
            for container_id in component.container_ids {
                if !existing.container_ids.contains(&container_id) {
                    existing.container_ids.push(container_id);
                }
            }
            for referrer in component.top_level_referrers {
                if !existing.top_level_referrers.contains(&referrer) {
                    existing.top_level_referrers.push(referrer);
                }
            }
            if let Some(dev) = component.is_development_dependency {
                existing.is_development_dependency =
                    Some(existing.is_development_dependency.unwrap_or(true) && dev);
            }
            if existing.dependency_scope.is_none() {
                existing.dependency_scope = component.dependency_scope;
            }
        }
        None => {
            merged.insert(id, component);
        }
    }
}
