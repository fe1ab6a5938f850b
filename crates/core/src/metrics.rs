//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 레이블을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `compscan_`
//! - 모듈명: `walker_`, `pipeline_`, `orchestrator_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(compscan_core::metrics::PIPELINE_FILES_PROCESSED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 탐지기 id 레이블 키
pub const LABEL_DETECTOR: &str = "detector";

/// 결과 코드 레이블 키 (success, partial_success, error, input_error, timeout_error)
pub const LABEL_RESULT: &str = "result";

// ─── Directory Walker 메트릭 ───────────────────────────────────────

/// 워커: 순회한 디렉토리 수 (counter)
pub const WALKER_DIRECTORIES_TOTAL: &str = "compscan_walker_directories_total";

/// 워커: 구독자에게 전달한 파일 매치 수 (counter, label: detector)
pub const WALKER_MATCHES_TOTAL: &str = "compscan_walker_matches_total";

/// 워커: 건너뛴 서브트리 수 (열거 실패 + 제외 규칙) (counter)
pub const WALKER_SKIPPED_TOTAL: &str = "compscan_walker_skipped_total";

/// 워커: 전체 순회 소요 시간 (histogram, 초)
pub const WALKER_DURATION_SECONDS: &str = "compscan_walker_duration_seconds";

// ─── Detection Pipeline 메트릭 ─────────────────────────────────────

/// 파이프라인: 처리한 파일 수 (counter, label: detector)
pub const PIPELINE_FILES_PROCESSED_TOTAL: &str = "compscan_pipeline_files_processed_total";

/// 파이프라인: 파싱 실패 수 (counter, label: detector)
pub const PIPELINE_PARSE_FAILURES_TOTAL: &str = "compscan_pipeline_parse_failures_total";

/// 파이프라인: 정리(cleanup)로 삭제한 산출물 수 (counter, label: detector)
pub const PIPELINE_CLEANUP_DELETED_TOTAL: &str = "compscan_pipeline_cleanup_deleted_total";

/// 파이프라인: 탐지기 실행 시간 (histogram, 초, label: detector)
pub const PIPELINE_DETECTOR_DURATION_SECONDS: &str =
    "compscan_pipeline_detector_duration_seconds";

// ─── Orchestrator 메트릭 ───────────────────────────────────────────

/// 오케스트레이터: 탐지기 실행 수 (counter, label: detector, result)
pub const ORCHESTRATOR_DETECTOR_RUNS_TOTAL: &str = "compscan_orchestrator_detector_runs_total";

/// 오케스트레이터: 병합 후 최종 컴포넌트 수 (gauge)
pub const ORCHESTRATOR_COMPONENTS_DETECTED: &str = "compscan_orchestrator_components_detected";

/// 오케스트레이터: 전체 스캔 소요 시간 (histogram, 초)
pub const ORCHESTRATOR_SCAN_DURATION_SECONDS: &str = "compscan_orchestrator_scan_duration_seconds";

// ─── 설명 등록 함수 ────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다. 레코더가 없으면
/// no-op입니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Directory Walker
    describe_counter!(
        WALKER_DIRECTORIES_TOTAL,
        "Total number of directories visited by the shared walk"
    );
    describe_counter!(
        WALKER_MATCHES_TOTAL,
        "Total number of file matches delivered to detector subscribers"
    );
    describe_counter!(
        WALKER_SKIPPED_TOTAL,
        "Total number of subtrees skipped (exclusions and enumeration failures)"
    );
    describe_histogram!(
        WALKER_DURATION_SECONDS,
        "Full directory walk duration in seconds"
    );

    // Detection Pipeline
    describe_counter!(
        PIPELINE_FILES_PROCESSED_TOTAL,
        "Total number of files handed to detector process calls"
    );
    describe_counter!(
        PIPELINE_PARSE_FAILURES_TOTAL,
        "Total number of per-file detector failures"
    );
    describe_counter!(
        PIPELINE_CLEANUP_DELETED_TOTAL,
        "Total number of detector-created artifacts removed by cleanup"
    );
    describe_histogram!(
        PIPELINE_DETECTOR_DURATION_SECONDS,
        "Single detector pipeline duration in seconds"
    );

    // Orchestrator
    describe_counter!(
        ORCHESTRATOR_DETECTOR_RUNS_TOTAL,
        "Total number of detector executions by result code"
    );
    describe_gauge!(
        ORCHESTRATOR_COMPONENTS_DETECTED,
        "Number of components in the merged scan result"
    );
    describe_histogram!(
        ORCHESTRATOR_SCAN_DURATION_SECONDS,
        "End-to-end scan duration in seconds"
    );
}
