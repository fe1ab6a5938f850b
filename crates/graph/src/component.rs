//! 탐지된 컴포넌트 — 식별 정보 + 가변 탐지 메타데이터

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use compscan_core::types::Component;

/// 탐지 메타데이터가 붙은 컴포넌트
///
/// 불변 식별 정보([`Component`])에 발견 위치, 탐지기, 컨테이너 귀속을
/// 더한 형태입니다. 동일 id의 반복 등록은 [`DetectedComponent::merge_with`]로
/// 합쳐지며, 집합 연산만 사용하므로 등록 순서에 무관합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedComponent {
    /// 컴포넌트 식별 정보
    pub component: Component,
    /// 이 컴포넌트를 보고한 탐지기 id
    pub detector_id: String,
    /// 발견된 파일 경로 집합
    pub file_paths: BTreeSet<PathBuf>,
    /// 컨테이너/레이어 귀속 id 집합
    pub container_ids: BTreeSet<String>,
}

impl DetectedComponent {
    /// 새 탐지 컴포넌트를 생성합니다.
    pub fn new(component: Component, detector_id: impl Into<String>) -> Self {
        Self {
            component,
            detector_id: detector_id.into(),
            file_paths: BTreeSet::new(),
            container_ids: BTreeSet::new(),
        }
    }

    /// 그래프 키로 쓰이는 컴포넌트 id를 반환합니다.
    pub fn id(&self) -> String {
        self.component.id()
    }

    /// 발견 위치를 추가합니다.
    pub fn add_file_path(&mut self, path: impl AsRef<Path>) {
        self.file_paths.insert(path.as_ref().to_path_buf());
    }

    /// 컨테이너 귀속 id를 추가합니다.
    pub fn add_container_id(&mut self, container_id: impl Into<String>) {
        self.container_ids.insert(container_id.into());
    }

    /// 같은 id의 다른 관측을 합칩니다 (경로/컨테이너 합집합).
    ///
    /// 탐지기 id는 최초 관측 값을 유지합니다.
    pub fn merge_with(&mut self, other: &DetectedComponent) {
        debug_assert_eq!(self.id(), other.id());
        self.file_paths.extend(other.file_paths.iter().cloned());
        self.container_ids.extend(other.container_ids.iter().cloned());
    }
}

impl fmt::Display for DetectedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} locations)",
            self.component,
            self.file_paths.len()
        )
    }
}
