//! 탐지기 레지스트리 — 등록과 설정 기반 선택
//!
//! 내장 탐지기는 [`DetectorRegistry::with_defaults`]로 등록됩니다.
//! 선택 규칙:
//!
//! - `disabled_ids`에 있는 탐지기는 제외됩니다.
//! - `enabled_ids`가 비어 있지 않으면 그 목록만 실행되며, 여기 명시된
//!   실험적 탐지기는 정식으로 승격됩니다.
//! - `categories`가 비어 있지 않으면 해당 카테고리의 탐지기만 실행됩니다.
//! - 알 수 없는 id는 입력 에러입니다 (오타가 조용히 무시되지 않도록).

use std::sync::Arc;

use tracing::warn;

use compscan_core::config::DetectorsConfig;
use compscan_core::error::{CompscanError, InputError};

use crate::detector::DynFileComponentDetector;
use crate::detectors::{CargoLockDetector, GoModDetector, NpmDetector};

/// 선택된 탐지기와 실행 모드
pub struct SelectedDetector {
    /// 탐지기
    pub detector: Arc<dyn DynFileComponentDetector>,
    /// 실험적 모드 실행 여부 (병합 결과에서 제외)
    pub experimental: bool,
}

/// 탐지기 레지스트리
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn DynFileComponentDetector>>,
}

impl DetectorRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// 내장 탐지기가 모두 등록된 레지스트리를 생성합니다.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NpmDetector::new()));
        registry.register(Arc::new(CargoLockDetector::new()));
        registry.register(Arc::new(GoModDetector::new()));
        registry
    }

    /// 탐지기를 등록합니다. 중복 id는 경고 후 무시됩니다.
    pub fn register(&mut self, detector: Arc<dyn DynFileComponentDetector>) {
        if self.detectors.iter().any(|d| d.id() == detector.id()) {
            warn!(detector = detector.id(), "detector already registered, ignoring");
            return;
        }
        self.detectors.push(detector);
    }

    /// 등록된 탐지기 목록을 반환합니다.
    pub fn detectors(&self) -> &[Arc<dyn DynFileComponentDetector>] {
        &self.detectors
    }

    /// id로 탐지기를 조회합니다.
    pub fn get(&self, id: &str) -> Option<Arc<dyn DynFileComponentDetector>> {
        self.detectors.iter().find(|d| d.id() == id).cloned()
    }

    /// 설정에 따라 실행할 탐지기를 선택합니다.
    pub fn select(&self, filter: &DetectorsConfig) -> Result<Vec<SelectedDetector>, CompscanError> {
        for id in filter.enabled_ids.iter().chain(&filter.disabled_ids) {
            if !self.detectors.iter().any(|d| d.id() == id) {
                return Err(InputError::UnknownDetectorId { id: id.clone() }.into());
            }
        }

        let mut selected = Vec::new();
        for detector in &self.detectors {
            let id = detector.id();
            if filter.disabled_ids.iter().any(|d| d == id) {
                continue;
            }
            let lifted = filter.enabled_ids.iter().any(|e| e == id);
            if !filter.enabled_ids.is_empty() && !lifted {
                continue;
            }
            if !filter.categories.is_empty() && !lifted {
                let in_category = detector.categories().iter().any(|category| {
                    filter
                        .categories
                        .iter()
                        .any(|wanted| wanted.eq_ignore_ascii_case(category))
                });
                if !in_category {
                    continue;
                }
            }
            selected.push(SelectedDetector {
                detector: detector.clone(),
                experimental: detector.experimental() && !lifted,
            });
        }
        Ok(selected)
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(enabled: &[&str], disabled: &[&str], categories: &[&str]) -> DetectorsConfig {
        DetectorsConfig {
            enabled_ids: enabled.iter().map(|s| s.to_string()).collect(),
            disabled_ids: disabled.iter().map(|s| s.to_string()).collect(),
            categories: categories.iter().map(|s| s.to_string()).collect(),
            args: Default::default(),
        }
    }

    #[test]
    fn default_registry_has_builtin_detectors() {
        let registry = DetectorRegistry::with_defaults();
        assert!(registry.get("npm-lockfile").is_some());
        assert!(registry.get("cargo-lockfile").is_some());
        assert!(registry.get("go-mod").is_some());
    }

    #[test]
    fn empty_filter_selects_everything() {
        let registry = DetectorRegistry::with_defaults();
        let selected = registry.select(&filter(&[], &[], &[])).unwrap();
        assert_eq!(selected.len(), registry.detectors().len());
        assert!(selected.iter().all(|s| !s.experimental));
    }

    #[test]
    fn disabled_ids_are_excluded() {
        let registry = DetectorRegistry::with_defaults();
        let selected = registry
            .select(&filter(&[], &["cargo-lockfile"], &[]))
            .unwrap();
        assert!(selected.iter().all(|s| s.detector.id() != "cargo-lockfile"));
    }

    #[test]
    fn enabled_ids_restrict_the_run() {
        let registry = DetectorRegistry::with_defaults();
        let selected = registry.select(&filter(&["npm-lockfile"], &[], &[])).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].detector.id(), "npm-lockfile");
    }

    #[test]
    fn categories_filter_by_detector_category() {
        let registry = DetectorRegistry::with_defaults();
        let selected = registry.select(&filter(&[], &[], &["go"])).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].detector.id(), "go-mod");
    }

    #[test]
    fn unknown_detector_id_is_an_input_error() {
        let registry = DetectorRegistry::with_defaults();
        let result = registry.select(&filter(&["no-such-detector"], &[], &[]));
        assert!(matches!(result, Err(CompscanError::Input(_))));
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let mut registry = DetectorRegistry::with_defaults();
        let before = registry.detectors().len();
        registry.register(Arc::new(NpmDetector::new()));
        assert_eq!(registry.detectors().len(), before);
    }
}
