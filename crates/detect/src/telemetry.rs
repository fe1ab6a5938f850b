//! 탐지기 실행 텔레메트리 — 실행 기록과 이벤트
//!
//! 오케스트레이터는 탐지기 실행이 끝날 때마다
//! [`DetectorExecutionEvent`]를 텔레메트리 채널로 송출합니다. 같은
//! 스캔의 이벤트는 동일한 trace_id를 공유합니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use compscan_core::event::{EVENT_TYPE_DETECTOR_EXECUTION, Event, EventMetadata, MODULE_ORCHESTRATOR};
use compscan_core::types::ResultCode;

/// 탐지기 실행 한 번의 기록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorExecutionRecord {
    /// 탐지기 id
    pub detector_id: String,
    /// 탐지기 버전
    pub detector_version: u32,
    /// 실험적 모드 실행 여부
    pub is_experimental: bool,
    /// 실행 결과 코드
    pub result_code: ResultCode,
    /// 실행 소요 시간 (밀리초)
    pub duration_ms: u64,
    /// process를 시도한 파일 수
    pub files_processed: u64,
    /// 파싱 실패 수
    pub parse_failures: u64,
    /// 이 탐지기가 보고한 컴포넌트 수
    pub component_count: usize,
    /// 그중 명시적 루트 수
    pub explicit_component_count: usize,
    /// 탐지기별 자유형식 텔레메트리
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, String>,
}

/// 탐지기 실행 완료 이벤트
#[derive(Debug, Clone)]
pub struct DetectorExecutionEvent {
    event_id: String,
    metadata: EventMetadata,
    /// 실행 기록
    pub record: DetectorExecutionRecord,
}

impl DetectorExecutionEvent {
    /// 이벤트를 생성합니다. `trace_id`는 스캔 단위로 공유됩니다.
    pub fn new(record: DetectorExecutionRecord, trace_id: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_ORCHESTRATOR, trace_id),
            record,
        }
    }
}

impl Event for DetectorExecutionEvent {
    fn event_id(&self) -> &str {
        &self.event_id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_DETECTOR_EXECUTION
    }
}
