//! 설정 관리 — compscan.toml 파싱 및 런타임 설정
//!
//! [`CompscanConfig`]는 스캔 전체의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`COMPSCAN_SCAN_MAX_THREADS=8` 형식)
//! 3. 설정 파일 (`compscan.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), compscan_core::error::CompscanError> {
//! use compscan_core::config::CompscanConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = CompscanConfig::load("compscan.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = CompscanConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CompscanError, ConfigError};

/// Compscan 통합 설정
///
/// `compscan.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompscanConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스캔 설정
    #[serde(default)]
    pub scan: ScanConfig,
    /// 탐지기 선택 설정
    #[serde(default)]
    pub detectors: DetectorsConfig,
}

impl CompscanConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CompscanError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CompscanError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CompscanError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CompscanError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, CompscanError> {
        toml::from_str(toml_str).map_err(|e| {
            CompscanError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `COMPSCAN_{SECTION}_{FIELD}`
    /// 예: `COMPSCAN_SCAN_MAX_THREADS=8`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "COMPSCAN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "COMPSCAN_GENERAL_LOG_FORMAT");

        // Scan
        override_string(&mut self.scan.source_dir, "COMPSCAN_SCAN_SOURCE_DIR");
        override_csv(&mut self.scan.exclusions, "COMPSCAN_SCAN_EXCLUSIONS");
        override_usize(&mut self.scan.max_threads, "COMPSCAN_SCAN_MAX_THREADS");
        override_u64(
            &mut self.scan.detector_timeout_secs,
            "COMPSCAN_SCAN_DETECTOR_TIMEOUT_SECS",
        );
        override_bool(
            &mut self.scan.cleanup_created_files,
            "COMPSCAN_SCAN_CLEANUP_CREATED_FILES",
        );
        override_bool(
            &mut self.scan.cleanup_dry_run,
            "COMPSCAN_SCAN_CLEANUP_DRY_RUN",
        );

        // Detectors
        override_csv(
            &mut self.detectors.enabled_ids,
            "COMPSCAN_DETECTORS_ENABLED_IDS",
        );
        override_csv(
            &mut self.detectors.disabled_ids,
            "COMPSCAN_DETECTORS_DISABLED_IDS",
        );
        override_csv(
            &mut self.detectors.categories,
            "COMPSCAN_DETECTORS_CATEGORIES",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `general.log_format`: "json" 또는 "pretty"
    /// - `scan.detector_timeout_secs`: 1-86400
    /// - `scan.max_threads`: 0(무제한)-1024
    /// - `detectors`: enabled와 disabled에 같은 id가 동시에 올 수 없음
    pub fn validate(&self) -> Result<(), CompscanError> {
        if self.general.log_format != "json" && self.general.log_format != "pretty" {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("'{}' (expected: json, pretty)", self.general.log_format),
            }
            .into());
        }

        if self.scan.detector_timeout_secs == 0
            || self.scan.detector_timeout_secs > MAX_DETECTOR_TIMEOUT_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "scan.detector_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_DETECTOR_TIMEOUT_SECS}"),
            }
            .into());
        }

        if self.scan.max_threads > MAX_THREADS_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "scan.max_threads".to_owned(),
                reason: format!("must be 0 (unbounded) or 1-{MAX_THREADS_LIMIT}"),
            }
            .into());
        }

        if let Some(id) = self
            .detectors
            .enabled_ids
            .iter()
            .find(|id| self.detectors.disabled_ids.contains(id))
        {
            return Err(ConfigError::InvalidValue {
                field: "detectors.enabled_ids".to_owned(),
                reason: format!("detector '{id}' is both enabled and disabled"),
            }
            .into());
        }

        Ok(())
    }
}

/// 설정 상한값 상수
const MAX_DETECTOR_TIMEOUT_SECS: u64 = 86_400; // 24 hours
const MAX_THREADS_LIMIT: usize = 1024;

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 스캔 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 스캔 루트 디렉토리
    pub source_dir: String,
    /// 순회에서 제외할 디렉토리 이름/글롭 패턴
    pub exclusions: Vec<String>,
    /// Process 단계 동시 실행 상한 (0이면 무제한)
    pub max_threads: usize,
    /// 탐지기별 타임아웃 (초)
    pub detector_timeout_secs: u64,
    /// 탐지기가 생성한 임시 산출물 삭제 여부
    pub cleanup_created_files: bool,
    /// true면 삭제 대신 로그만 남김 (dry-run)
    pub cleanup_dry_run: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            source_dir: ".".to_owned(),
            exclusions: vec![".git".to_owned()],
            max_threads: 0, // unbounded
            detector_timeout_secs: 900,
            cleanup_created_files: true,
            cleanup_dry_run: false,
        }
    }
}

/// 탐지기 선택 설정
///
/// 비어 있으면 실험적 탐지기를 제외한 전체가 실행됩니다.
/// `enabled_ids`에 명시된 실험적 탐지기는 정식 탐지기로 취급되어
/// 병합 결과에 컴포넌트를 기여할 수 있습니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorsConfig {
    /// 명시적으로 활성화할 탐지기 id 목록
    pub enabled_ids: Vec<String>,
    /// 제외할 탐지기 id 목록
    pub disabled_ids: Vec<String>,
    /// 이 카테고리에 속한 탐지기만 실행 (비어 있으면 전체)
    pub categories: Vec<String>,
    /// 탐지기에 전달되는 자유형식 인자
    pub args: std::collections::BTreeMap<String, String>,
}

// ─── 환경변수 오버라이드 헬퍼 ────────────────────────────────────────

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

fn override_bool(target: &mut bool, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => *target = true,
            "false" | "0" | "no" => *target = false,
            _ => tracing::warn!(var, value, "invalid bool env override, ignoring"),
        }
    }
}

fn override_usize(target: &mut usize, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value, "invalid usize env override, ignoring"),
        }
    }
}

fn override_u64(target: &mut u64, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value, "invalid u64 env override, ignoring"),
        }
    }
}

fn override_csv(target: &mut Vec<String>, var: &str) {
    if let Ok(value) = std::env::var(var) {
        *target = value
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
