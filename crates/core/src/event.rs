//! 이벤트 기반 모듈 간 통신 — Event trait과 메타데이터
//!
//! 텔레메트리 이벤트는 `tokio::mpsc` 채널로 전송됩니다. 각 도메인
//! 크레이트는 자체 이벤트 타입을 정의하고 [`Event`] trait을 구현합니다
//! (예: `compscan-detect`의 `DetectorExecutionEvent`).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ─── 모듈명 상수 ─────────────────────────────────────────────────────

/// 오케스트레이터 모듈명
pub const MODULE_ORCHESTRATOR: &str = "orchestrator";

// ─── 이벤트 타입 상수 ────────────────────────────────────────────────

/// 탐지기 실행 텔레메트리 이벤트 타입
pub const EVENT_TYPE_DETECTOR_EXECUTION: &str = "detector_execution";

/// 이벤트 공통 메타데이터
///
/// 각 이벤트의 발생 시각, 생성 모듈, 분산 추적 ID를 담고 있어
/// 이벤트 흐름을 추적하고 디버깅할 수 있습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명 (예: "orchestrator")
    pub source_module: String,
    /// 분산 추적 ID — 같은 스캔의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    ///
    /// 하나의 스캔에 속한 이벤트 체인에서 동일한 추적 ID를 유지할 때
    /// 사용합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    ///
    /// 새로운 스캔의 시작점에서 사용합니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            unix_timestamp_str(self.timestamp),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통한
/// 안전한 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터 (timestamp, source_module, trace_id)
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// SystemTime을 유닉스 타임스탬프 문자열로 변환합니다.
fn unix_timestamp_str(t: SystemTime) -> String {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => format!("{}.{:03}", d.as_secs(), d.subsec_millis()),
        Err(_) => "invalid".to_owned(),
    }
}
