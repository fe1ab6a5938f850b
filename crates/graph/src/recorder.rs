//! 컴포넌트 레코더 -- 탐지기가 관측을 써 넣는 동시성 저장소
//!
//! [`ComponentRecorder`]는 스캔(탐지기 실행)당 하나 생성되며, 매니페스트
//! 위치별 [`SingleFileComponentRecorder`]를 lazy하게 발급합니다. 생태계
//! 파서는 위치별 퍼사드만 통해 그래프에 접근합니다.
//!
//! # 동시성 모델
//!
//! - 위치→레코더 맵과 위치별 detected/skipped 맵은 `DashMap` (샤딩된
//!   동시성 맵)이라 전역 잠금 없이 여러 워커가 동시에 기록할 수 있습니다.
//! - 그래프 변이만 위치별 `Mutex`로 직렬화됩니다. 서로 다른 매니페스트는
//!   서로를 기다리지 않습니다.
//! - 그래프 변이는 I/O에 걸리지 않습니다 (잠금 구간은 순수 인메모리).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tracing::warn;

use compscan_core::types::{Component, DependencyScope, ScannedComponent};

use crate::component::DetectedComponent;
use crate::graph::DependencyGraph;

/// 컴포넌트 관측 한 건
///
/// `register_usage`에 전달되는 인자 묶음입니다. 기본값은
/// "비명시적, 부모 없음, dev 여부 불명, 스코프 없음"입니다.
#[derive(Debug, Clone)]
pub struct Usage {
    /// 관측된 컴포넌트
    pub component: Component,
    /// 프로젝트가 직접 선언한 의존성인지
    pub is_explicit: bool,
    /// 부모 컴포넌트 id (간선 parent→child 생성)
    pub parent_id: Option<String>,
    /// 개발 의존성 여부 (None이면 불명)
    pub is_development_dependency: Option<bool>,
    /// 의존성 스코프
    pub dependency_scope: Option<DependencyScope>,
    /// 컨테이너/레이어 귀속 id
    pub container_id: Option<String>,
}

impl Usage {
    /// 기본 속성의 관측을 생성합니다.
    pub fn new(component: Component) -> Self {
        Self {
            component,
            is_explicit: false,
            parent_id: None,
            is_development_dependency: None,
            dependency_scope: None,
            container_id: None,
        }
    }

    /// 명시적 참조 여부를 지정합니다.
    pub fn explicit(mut self, is_explicit: bool) -> Self {
        self.is_explicit = is_explicit;
        self
    }

    /// 부모 컴포넌트 id를 지정합니다.
    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// 개발 의존성 여부를 지정합니다.
    pub fn development(mut self, is_dev: bool) -> Self {
        self.is_development_dependency = Some(is_dev);
        self
    }

    /// 의존성 스코프를 지정합니다.
    pub fn scope(mut self, scope: DependencyScope) -> Self {
        self.dependency_scope = Some(scope);
        self
    }

    /// 컨테이너 귀속 id를 지정합니다.
    pub fn container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }
}

/// 매니페스트 위치 하나에 결합된 레코더 퍼사드
///
/// 의존성 그래프 하나를 소유하며, 그래프 변이를 위치 단위로
/// 직렬화합니다. 여러 워커가 같은 위치에 동시에 기록해도 안전합니다.
pub struct SingleFileComponentRecorder {
    location: PathBuf,
    detector_id: String,
    graph: Mutex<DependencyGraph>,
    detected: DashMap<String, DetectedComponent>,
    skipped: DashMap<String, ()>,
}

impl SingleFileComponentRecorder {
    fn new(location: PathBuf, detector_id: String, manual_explicit_tracking: bool) -> Self {
        Self {
            location,
            detector_id,
            graph: Mutex::new(DependencyGraph::new(manual_explicit_tracking)),
            detected: DashMap::new(),
            skipped: DashMap::new(),
        }
    }

    /// 이 레코더가 결합된 매니페스트 위치를 반환합니다.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// 컴포넌트 관측을 등록합니다.
    ///
    /// 최초 등록은 노드와 [`DetectedComponent`]를 생성하고, 반복 등록은
    /// [`DependencyGraph`]의 병합 규칙대로 합쳐집니다. 예상 가능한 상황
    /// (미등록 부모, 중복 등록)에서는 에러를 내지 않습니다. 빈 이름의
    /// 컴포넌트는 기록하지 않고 경고만 남깁니다.
    pub fn register_usage(&self, usage: Usage) {
        if usage.component.name.trim().is_empty() {
            warn!(location = %self.location.display(), "component with empty name, skipping");
            return;
        }

        let id = usage.component.id();

        {
            let mut entry = self
                .detected
                .entry(id.clone())
                .or_insert_with(|| DetectedComponent::new(usage.component.clone(), &self.detector_id));
            entry.add_file_path(&self.location);
            if let Some(container_id) = &usage.container_id {
                entry.add_container_id(container_id);
            }
        }

        // 패닉한 태스크가 남긴 독은 복구합니다: 그래프 변이는 호출
        // 단위로 완결되므로 중간 상태가 관측되지 않습니다.
        let mut graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        graph.add_component(
            &id,
            usage.is_explicit,
            usage.is_development_dependency,
            usage.dependency_scope,
            usage.parent_id.as_deref(),
        );
    }

    /// 복구 불가능한 파싱 실패 위치를 기록합니다.
    ///
    /// 그래프에서는 제외되고 진단용으로만 보존됩니다.
    pub fn register_package_parse_failure(&self, skipped_component: impl Into<String>) {
        self.skipped.insert(skipped_component.into(), ());
    }

    /// 추가 관련 파일을 기록합니다.
    ///
    /// 이 위치의 모든 컴포넌트에 귀속되지만, fan-out은 읽기 시점에
    /// 계산됩니다.
    pub fn add_additional_related_file(&self, path: impl AsRef<Path>) {
        let mut graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        graph.add_additional_related_file(path);
    }

    /// id로 탐지 컴포넌트를 조회합니다.
    pub fn get_component(&self, id: &str) -> Option<DetectedComponent> {
        self.detected.get(id).map(|entry| entry.clone())
    }

    /// 이 위치의 탐지 컴포넌트를 반환합니다.
    ///
    /// 추가 관련 파일이 읽기 시점에 각 컴포넌트의 경로 집합으로
    /// fan-out됩니다.
    pub fn detected_components(&self) -> Vec<DetectedComponent> {
        let related = {
            let graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
            graph.additional_related_files().clone()
        };

        self.detected
            .iter()
            .map(|entry| {
                let mut component = entry.clone();
                component.file_paths.extend(related.iter().cloned());
                component
            })
            .collect()
    }

    /// 파싱 실패로 건너뛴 위치 목록을 반환합니다.
    pub fn skipped_components(&self) -> Vec<String> {
        self.skipped.iter().map(|e| e.key().clone()).collect()
    }

    /// 그래프 읽기 조회를 수행합니다.
    ///
    /// 잠금 구간이 호출자 클로저로 한정되므로 가드를 밖으로 내보내지
    /// 않습니다.
    pub fn with_graph<R>(&self, f: impl FnOnce(&DependencyGraph) -> R) -> R {
        let graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        f(&graph)
    }
}

/// 전역 컴포넌트 레코더 -- 탐지기 실행당 하나
///
/// 위치→그래프 맵과 전역 병합을 담당합니다. 위치별 레코더 생성은
/// idempotent하며, 전역 병합 맵은 샤딩된 동시성 맵이라 대규모 트리에서도
/// 단일 잠금 병목이 없습니다.
pub struct ComponentRecorder {
    detector_id: String,
    manual_explicit_tracking: bool,
    recorders: DashMap<PathBuf, Arc<SingleFileComponentRecorder>>,
}

impl ComponentRecorder {
    /// 탐지기 하나를 위한 레코더를 생성합니다.
    ///
    /// `manual_explicit_tracking`이 false면 모든 위치 그래프가 자동 루트
    /// 계산 모드로 동작합니다.
    pub fn new(detector_id: impl Into<String>, manual_explicit_tracking: bool) -> Self {
        Self {
            detector_id: detector_id.into(),
            manual_explicit_tracking,
            recorders: DashMap::new(),
        }
    }

    /// 이 레코더를 소유한 탐지기 id를 반환합니다.
    pub fn detector_id(&self) -> &str {
        &self.detector_id
    }

    /// 위치별 레코더를 발급합니다 (lazy + idempotent).
    ///
    /// 같은 위치로 여러 번 호출해도 동일한 레코더가 반환됩니다.
    pub fn create_single_file_recorder(
        &self,
        location: impl AsRef<Path>,
    ) -> Arc<SingleFileComponentRecorder> {
        let location = location.as_ref().to_path_buf();
        self.recorders
            .entry(location.clone())
            .or_insert_with(|| {
                Arc::new(SingleFileComponentRecorder::new(
                    location,
                    self.detector_id.clone(),
                    self.manual_explicit_tracking,
                ))
            })
            .clone()
    }

    /// 전체 위치별 레코더 목록을 반환합니다.
    pub fn single_file_recorders(&self) -> Vec<Arc<SingleFileComponentRecorder>> {
        self.recorders.iter().map(|e| e.value().clone()).collect()
    }

    /// 컴포넌트가 하나라도 있는 위치→그래프 조회 결과를 반환합니다.
    pub fn locations_with_components(&self) -> Vec<PathBuf> {
        self.recorders
            .iter()
            .filter(|e| e.value().with_graph(|g| g.has_components()))
            .map(|e| e.key().clone())
            .collect()
    }

    /// id로 컴포넌트 식별 정보를 조회합니다 (전 위치 대상, 최초 일치).
    pub fn get_component(&self, id: &str) -> Option<Component> {
        self.recorders
            .iter()
            .find_map(|e| e.value().get_component(id).map(|d| d.component))
    }

    /// 위치별 관측을 컴포넌트 id로 전역 병합합니다.
    ///
    /// 여러 매니페스트에서 발견된 동일 컴포넌트가 하나의 보고 엔트리가
    /// 되는 지점입니다. 파일 경로와 컨테이너 귀속은 합집합을 취합니다.
    pub fn detected_components(&self) -> Vec<DetectedComponent> {
        let mut merged: HashMap<String, DetectedComponent> = HashMap::new();
        for entry in self.recorders.iter() {
            for component in entry.value().detected_components() {
                match merged.get_mut(&component.id()) {
                    Some(existing) => existing.merge_with(&component),
                    None => {
                        merged.insert(component.id(), component);
                    }
                }
            }
        }
        let mut components: Vec<_> = merged.into_values().collect();
        components.sort_by_key(|c| c.id());
        components
    }

    /// 파싱 실패 위치를 전역으로 중복 제거해 반환합니다.
    pub fn skipped_components(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .recorders
            .iter()
            .flat_map(|e| e.value().skipped_components())
            .collect();
        all.sort();
        all.dedup();
        all
    }

    /// 전역 병합 + 그래프 속성 해석을 거친 최종 보고 형태를 생성합니다.
    ///
    /// 위치별 그래프에서 dev 여부(알려진 값들의 AND), 스코프(선착순),
    /// 명시적 루트(합집합)를 해석해 [`ScannedComponent`]로 합칩니다.
    pub fn scanned_components(&self) -> Vec<ScannedComponent> {
        let mut merged: HashMap<String, ScannedComponent> = HashMap::new();

        for entry in self.recorders.iter() {
            let recorder = entry.value();
            for detected in recorder.detected_components() {
                let id = detected.id();
                let (dev, scope, root_ids) = recorder.with_graph(|g| {
                    (
                        g.is_development_dependency(&id),
                        g.dependency_scope(&id),
                        g.get_explicit_referenced_dependency_ids(&id),
                    )
                });
                let referrers: Vec<Component> = root_ids
                    .iter()
                    .filter(|root_id| **root_id != id)
                    .filter_map(|root_id| {
                        recorder
                            .get_component(root_id)
                            .map(|d| d.component)
                            .or_else(|| self.get_component(root_id))
                    })
                    .collect();

                match merged.get_mut(&id) {
                    Some(existing) => {
                        merge_file_paths(existing, &detected);
                        // dev: 알려진 관측들의 AND
                        if let Some(dev) = dev {
                            existing.is_development_dependency =
                                Some(existing.is_development_dependency.unwrap_or(true) && dev);
                        }
                        // scope: 선착순
                        if existing.dependency_scope.is_none() {
                            existing.dependency_scope = scope;
                        }
                        for referrer in referrers {
                            if !existing.top_level_referrers.contains(&referrer) {
                                existing.top_level_referrers.push(referrer);
                            }
                        }
                    }
                    None => {
                        merged.insert(
                            id,
                            ScannedComponent {
                                detector_id: detected.detector_id.clone(),
                                component: detected.component.clone(),
                                file_paths: detected.file_paths.iter().cloned().collect(),
                                is_development_dependency: dev,
                                dependency_scope: scope,
                                top_level_referrers: referrers,
                                container_ids: detected.container_ids.iter().cloned().collect(),
                            },
                        );
                    }
                }
            }
        }

        let mut components: Vec<_> = merged.into_values().collect();
        components.sort_by_key(|c| c.component.id());
        components
    }

    /// 전 위치에서 명시적으로 참조된 고유 컴포넌트 수를 반환합니다.
    pub fn explicit_component_count(&self) -> usize {
        let mut ids: Vec<String> = self
            .recorders
            .iter()
            .flat_map(|e| {
                e.value()
                    .with_graph(|g| g.get_all_explicitly_referenced_components())
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }
}

fn merge_file_paths(existing: &mut ScannedComponent, detected: &DetectedComponent) {
    for path in &detected.file_paths {
        if !existing.file_paths.contains(path) {
            existing.file_paths.push(path.clone());
        }
    }
    for container_id in &detected.container_ids {
        if !existing.container_ids.contains(container_id) {
            existing.container_ids.push(container_id.clone());
        }
    }
}
