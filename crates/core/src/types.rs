//! 도메인 타입 -- 컴포넌트, 생태계, 의존성 스코프, 결과 코드
//!
//! 스캔 결과를 구성하는 핵심 타입을 정의합니다. 컴포넌트 식별자
//! (`Component::id()`)는 그래프와 전역 병합의 키로 사용되므로
//! 형식이 바뀌면 탐지기 버전을 올려야 합니다.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 패키지 생태계 (언어/패키지 관리자)
///
/// 탐지기가 인식하는 매니페스트 형식에 대응합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    /// JavaScript/TypeScript (package-lock.json)
    Npm,
    /// Rust (Cargo.lock)
    Cargo,
    /// Go (go.mod)
    Go,
    /// Python (requirements.txt, poetry.lock)
    Pip,
    /// Java (pom.xml)
    Maven,
    /// .NET (project.assets.json)
    NuGet,
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npm => write!(f, "npm"),
            Self::Cargo => write!(f, "cargo"),
            Self::Go => write!(f, "go"),
            Self::Pip => write!(f, "pip"),
            Self::Maven => write!(f, "maven"),
            Self::NuGet => write!(f, "nuget"),
        }
    }
}

/// 스캔된 패키지의 불변 식별 정보
///
/// 생태계 + 이름 + 버전으로 하나의 컴포넌트를 식별합니다.
/// [`Component::id`]가 그래프 노드와 전역 병합 맵의 키입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component {
    /// 패키지 생태계
    pub component_type: ComponentType,
    /// 패키지 이름
    pub name: String,
    /// 패키지 버전
    pub version: String,
}

impl Component {
    /// 컴포넌트를 생성합니다.
    pub fn new(
        component_type: ComponentType,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            component_type,
            name: name.into(),
            version: version.into(),
        }
    }

    /// 파생된 안정 문자열 id를 반환합니다.
    ///
    /// 형식: `"{name} {version} - {type}"`. 그래프/병합 키이므로
    /// 형식 변경 시 기존 결과와 호환되지 않습니다.
    pub fn id(&self) -> String {
        format!("{} {} - {}", self.name, self.version, self.component_type)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.version, self.component_type)
    }
}

/// 의존성 스코프
///
/// 생태계가 정의하는 "언제 필요한 의존성인가"를 나타냅니다.
/// maven 스코프 모델을 따릅니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyScope {
    /// 컴파일 및 런타임에 필요 (기본)
    Compile,
    /// 런타임에만 필요
    Runtime,
    /// 실행 환경이 제공
    Provided,
    /// 테스트에만 필요
    Test,
    /// 시스템 경로로 제공
    System,
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile => write!(f, "compile"),
            Self::Runtime => write!(f, "runtime"),
            Self::Provided => write!(f, "provided"),
            Self::Test => write!(f, "test"),
            Self::System => write!(f, "system"),
        }
    }
}

/// 탐지기 실행 결과 코드
///
/// 숫자 값이 클수록 심각합니다. 오케스트레이터는 탐지기별 코드 중
/// 가장 심각한 것을 전체 결과로 승격합니다 (단, 실험적 탐지기 제외).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum ResultCode {
    /// 모든 파일 처리 성공
    #[default]
    Success = 0,
    /// 일부 파일 처리 실패 (결과는 사용 가능)
    PartialSuccess = 1,
    /// 탐지기 수준 실패
    Error = 2,
    /// 사용자 입력 오류
    InputError = 3,
    /// 타임아웃 (전체 스캔에 치명적)
    TimeoutError = 4,
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::Error => write!(f, "error"),
            Self::InputError => write!(f, "input_error"),
            Self::TimeoutError => write!(f, "timeout_error"),
        }
    }
}

/// 최종 보고서에 실리는 병합 완료 컴포넌트
///
/// 여러 매니페스트 위치와 여러 탐지기에 걸쳐 관측된 동일 컴포넌트가
/// 전역 병합을 거쳐 하나의 엔트리가 된 형태입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedComponent {
    /// 이 컴포넌트를 최초로 보고한 탐지기 id
    pub detector_id: String,
    /// 컴포넌트 식별 정보
    pub component: Component,
    /// 컴포넌트가 발견된 파일 경로 집합 (additional related files 포함)
    pub file_paths: Vec<PathBuf>,
    /// 개발 의존성 여부 (모든 관측의 AND, 관측 없으면 None)
    pub is_development_dependency: Option<bool>,
    /// 의존성 스코프 (최초 관측 값)
    pub dependency_scope: Option<DependencyScope>,
    /// 이 컴포넌트에 도달 가능한 명시적 루트 컴포넌트들
    pub top_level_referrers: Vec<Component>,
    /// 컨테이너/레이어 귀속 id 집합
    pub container_ids: Vec<String>,
}

impl fmt::Display for ScannedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.component, self.detector_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_id_is_stable() {
        let c = Component::new(ComponentType::Npm, "left-pad", "1.3.0");
        assert_eq!(c.id(), "left-pad 1.3.0 - npm");
    }

    #[test]
    fn result_code_ordering_matches_severity() {
        assert!(ResultCode::Success < ResultCode::PartialSuccess);
        assert!(ResultCode::PartialSuccess < ResultCode::Error);
        assert!(ResultCode::Error < ResultCode::InputError);
        assert!(ResultCode::InputError < ResultCode::TimeoutError);
    }
}
