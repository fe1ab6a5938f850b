//! 의존성 그래프 -- 매니페스트 위치당 하나
//!
//! 노드는 컴포넌트 id로 식별되며, 반복 등록은 가환적·멱등적 규칙으로
//! 병합됩니다. 조상 조회는 npm `requires` 자기 참조 같은 사이클이 있어도
//! 종료되도록 방문 집합을 사용한 반복(비재귀) 순회로 구현되어 있습니다.
//!
//! 이 타입 자체는 동기화를 제공하지 않습니다. 변이 직렬화는 소유자인
//! [`SingleFileComponentRecorder`](crate::recorder::SingleFileComponentRecorder)의
//! 위치별 잠금이 담당합니다.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::debug;

use compscan_core::types::DependencyScope;

/// 그래프 노드 — 컴포넌트 id당 하나
#[derive(Debug, Clone)]
pub struct ComponentRefNode {
    /// 컴포넌트 id
    pub id: String,
    /// 프로젝트가 직접 선언한 의존성인지 (관측들의 OR)
    pub is_explicit: bool,
    /// 개발 의존성 tri-state (알려진 관측들의 AND)
    pub is_development_dependency: Option<bool>,
    /// 의존성 스코프 (최초로 알려진 값)
    pub dependency_scope: Option<DependencyScope>,
    /// 이 노드가 의존하는 컴포넌트 id (outgoing)
    pub dependency_ids: BTreeSet<String>,
    /// 이 노드에 의존하는 컴포넌트 id (incoming)
    pub depended_on_by: BTreeSet<String>,
}

impl ComponentRefNode {
    fn new(id: String) -> Self {
        Self {
            id,
            is_explicit: false,
            is_development_dependency: None,
            dependency_scope: None,
            dependency_ids: BTreeSet::new(),
            depended_on_by: BTreeSet::new(),
        }
    }
}

/// 매니페스트 위치 하나의 의존성 그래프
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: HashMap<String, ComponentRefNode>,
    /// 읽기 시점에 모든 노드로 fan-out되는 추가 관련 파일 집합
    additional_related_files: BTreeSet<PathBuf>,
    /// true면 명시적 참조를 탐지기가 직접 표시, false면 루트(무부모) 자동 계산
    manual_explicit_tracking: bool,
}

impl DependencyGraph {
    /// 새 그래프를 생성합니다.
    ///
    /// `manual_explicit_tracking`이 false면 부모가 하나도 없는 노드가
    /// 명시적 참조로 간주됩니다 (자동 루트 계산).
    pub fn new(manual_explicit_tracking: bool) -> Self {
        Self {
            nodes: HashMap::new(),
            additional_related_files: BTreeSet::new(),
            manual_explicit_tracking,
        }
    }

    /// 컴포넌트 관측을 그래프에 반영합니다.
    ///
    /// 최초 등록은 노드를 생성하고, 반복 등록은 병합합니다:
    /// - `is_explicit`: OR (한 번 true면 유지)
    /// - `is_development_dependency`: 알려진 값들의 AND, `None`은 무시
    /// - `dependency_scope`: 최초로 알려진 값 유지
    ///
    /// `parent_id`가 주어지고 그래프에 존재하면 parent→child 간선을
    /// 추가합니다. 중복 간선과 자기 간선은 no-op이며, 미등록 부모는
    /// 디버그 로그만 남기고 무시합니다 (예상 가능한 상황에서 에러 없음).
    pub fn add_component(
        &mut self,
        id: &str,
        is_explicit: bool,
        is_development_dependency: Option<bool>,
        dependency_scope: Option<DependencyScope>,
        parent_id: Option<&str>,
    ) {
        debug_assert!(!id.trim().is_empty(), "component id must not be empty");

        let node = self
            .nodes
            .entry(id.to_owned())
            .or_insert_with(|| ComponentRefNode::new(id.to_owned()));

        node.is_explicit |= is_explicit;

        // 알려진 관측이 있을 때만 AND 병합. unknown은 기존 값을 덮지 않음
        if let Some(dev) = is_development_dependency {
            node.is_development_dependency =
                Some(node.is_development_dependency.unwrap_or(true) && dev);
        }

        if node.dependency_scope.is_none() {
            node.dependency_scope = dependency_scope;
        }

        if let Some(parent) = parent_id {
            self.add_dependency(id, parent);
        }
    }

    /// parent→child 간선을 추가합니다.
    fn add_dependency(&mut self, child_id: &str, parent_id: &str) {
        if parent_id == child_id {
            // 자기 간선은 no-op
            return;
        }

        if !self.nodes.contains_key(parent_id) {
            debug!(parent = parent_id, child = child_id, "parent not in graph, skipping edge");
            return;
        }

        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.dependency_ids.insert(child_id.to_owned());
        }
        if let Some(child) = self.nodes.get_mut(child_id) {
            child.depended_on_by.insert(parent_id.to_owned());
        }
    }

    /// 그래프에 노드가 존재하는지 확인합니다.
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// 그래프에 노드가 하나라도 있는지 확인합니다.
    pub fn has_components(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// 전체 노드 id를 반환합니다.
    pub fn component_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// 노드의 직접 의존성 id를 반환합니다.
    pub fn dependencies_of(&self, id: &str) -> Option<Vec<String>> {
        self.nodes
            .get(id)
            .map(|n| n.dependency_ids.iter().cloned().collect())
    }

    /// 노드의 개발 의존성 tri-state를 반환합니다 (미등록 id면 None).
    pub fn is_development_dependency(&self, id: &str) -> Option<bool> {
        self.nodes.get(id).and_then(|n| n.is_development_dependency)
    }

    /// 노드의 의존성 스코프를 반환합니다 (미등록 id면 None).
    pub fn dependency_scope(&self, id: &str) -> Option<DependencyScope> {
        self.nodes.get(id).and_then(|n| n.dependency_scope)
    }

    /// 노드가 명시적 참조인지 확인합니다.
    ///
    /// 수동 추적 모드면 탐지기가 표시한 플래그를, 자동 모드면
    /// "부모 없음"을 기준으로 판단합니다.
    pub fn is_explicitly_referenced(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(|n| self.is_explicit_node(n))
    }

    fn is_explicit_node(&self, node: &ComponentRefNode) -> bool {
        if self.manual_explicit_tracking {
            node.is_explicit
        } else {
            node.depended_on_by.is_empty()
        }
    }

    /// 역방향 전이 도달 가능 집합 (조상)을 반환합니다.
    ///
    /// 방문 집합을 사용한 반복 BFS라서 사이클(A→B→C→A)이 있어도
    /// 유한한 결과로 종료합니다. 자기 자신은 결과에서 제외되고,
    /// 발견 깊이 순서(너비 우선)로 반환됩니다.
    pub fn get_ancestors(&self, id: &str) -> Vec<String> {
        let Some(start) = self.nodes.get(id) else {
            // 그래프에 없는 컴포넌트는 조상도 없음
            return Vec::new();
        };

        let mut ancestors = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);

        let mut queue: VecDeque<&str> = start.depended_on_by.iter().map(String::as_str).collect();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            ancestors.push(current.to_owned());
            if let Some(node) = self.nodes.get(current) {
                queue.extend(node.depended_on_by.iter().map(String::as_str));
            }
        }

        ancestors
    }

    /// 이 노드에서 역방향으로 도달 가능한 명시적 루트 id를 반환합니다.
    ///
    /// 하나의 컴포넌트가 여러 명시적 루트에서 동시에 도달 가능할 수
    /// 있으므로 multi-source 탐색입니다. 자기 자신이 명시적이면 결과에
    /// 포함됩니다. 사이클 안전 (방문 집합, 반복 순회).
    pub fn get_explicit_referenced_dependency_ids(&self, id: &str) -> Vec<String> {
        let Some(start) = self.nodes.get(id) else {
            return Vec::new();
        };

        let mut roots = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&ComponentRefNode> = vec![start];

        while let Some(node) = stack.pop() {
            if !visited.insert(node.id.as_str()) {
                continue;
            }
            if self.is_explicit_node(node) {
                roots.push(node.id.clone());
            }
            for parent_id in &node.depended_on_by {
                if let Some(parent) = self.nodes.get(parent_id) {
                    stack.push(parent);
                }
            }
        }

        roots.sort();
        roots
    }

    /// 명시적으로 참조된 모든 컴포넌트 id를 반환합니다.
    pub fn get_all_explicitly_referenced_components(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| self.is_explicit_node(n))
            .map(|n| n.id.clone())
            .collect()
    }

    /// 추가 관련 파일을 기록합니다. O(1) append.
    ///
    /// 모든 노드로의 귀속은 읽기 시점에 계산되며, 등록 시점에
    /// fan-out하지 않습니다.
    pub fn add_additional_related_file(&mut self, path: impl AsRef<Path>) {
        self.additional_related_files
            .insert(path.as_ref().to_path_buf());
    }

    /// 기록된 추가 관련 파일 집합을 반환합니다.
    pub fn additional_related_files(&self) -> &BTreeSet<PathBuf> {
        &self.additional_related_files
    }
}
