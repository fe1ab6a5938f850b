//! 에러 타입 — 도메인별 에러 정의
//!
//! 그래프 변이 API는 예상 가능한 상황(미등록 부모, 중복 등록)에서
//! 에러를 내지 않고 no-op 처리하므로 별도 그래프 에러 타입은 없습니다.
//! 타임아웃도 에러가 아니라 결과 코드(`TimeoutError`)로 집계됩니다.

/// Compscan 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum CompscanError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 탐지 파이프라인 에러
    #[error("detection error: {0}")]
    Detection(#[from] DetectionError),

    /// 사용자 입력 에러 (잘못된 스캔 루트 등)
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 탐지 파이프라인 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// 디렉토리 순회 실패
    #[error("walk error: {path}: {reason}")]
    Walk { path: String, reason: String },

    /// Prepare 단계 실패
    #[error("prepare failed for detector '{detector_id}': {reason}")]
    Prepare { detector_id: String, reason: String },

    /// 외부 도구 실행 실패
    #[error("tool '{tool}' failed: {reason}")]
    Tool { tool: String, reason: String },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 탐지기 내부 에러
    #[error("detector '{detector_id}' failed: {reason}")]
    Detector { detector_id: String, reason: String },
}

/// 사용자 입력 에러
///
/// 자동화 파이프라인에서 설정 오류와 구분되어야 하므로
/// 별도 결과 코드(`ResultCode::InputError`)로 표면화됩니다.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// 스캔 루트가 존재하지 않음
    #[error("source directory does not exist: {path}")]
    SourceDirMissing { path: String },

    /// 스캔 루트가 디렉토리가 아님
    #[error("source path is not a directory: {path}")]
    SourceNotADirectory { path: String },

    /// 알 수 없는 탐지기 id 지정
    #[error("unknown detector id: {id}")]
    UnknownDetectorId { id: String },
}
