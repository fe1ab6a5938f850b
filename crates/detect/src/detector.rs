//! 탐지기 계약 — 생태계 탐지기가 구현하는 trait과 실행 컨텍스트
//!
//! [`FileComponentDetector`]는 RPITIT 기반 trait이라 `dyn`으로 쓸 수
//! 없습니다. 레지스트리와 오케스트레이터는 [`DynFileComponentDetector`]
//! (`BoxFuture` 반환)로 탐지기를 동적 관리하며, blanket impl이 두 trait을
//! 자동으로 연결합니다.
//!
//! # 생명주기
//! ```text
//! subscribe → prepare(파일 스트림 필터/보강) → process(파일별, 동시) → finish
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use compscan_core::config::CompscanConfig;
use compscan_core::error::DetectionError;
use compscan_core::types::ComponentType;
use compscan_graph::SingleFileComponentRecorder;

/// dyn-compatible 반환을 위한 박싱된 Future 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 워커 → 탐지기 파일 채널의 기본 용량
pub const FILE_CHANNEL_CAPACITY: usize = 256;

/// 워커가 탐지기에게 전달하는 파일 매치 한 건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatch {
    /// 매치된 파일의 절대 경로
    pub path: PathBuf,
    /// 매치를 발생시킨 검색 패턴
    pub pattern: String,
}

/// Process 단계에 전달되는 파일별 처리 요청
///
/// 레코더는 해당 매니페스트 위치에 결합된 퍼사드입니다. 탐지기는
/// 이 레코더를 통해서만 관측을 기록합니다.
pub struct ProcessRequest {
    /// 처리할 파일 매치
    pub file: FileMatch,
    /// 이 파일 위치의 컴포넌트 레코더
    pub recorder: Arc<SingleFileComponentRecorder>,
}

/// 스캔 한 번의 실행 컨텍스트
///
/// 오케스트레이터가 탐지기별로 하나씩 생성합니다. 취소 토큰은 탐지기별
/// child token이라 한 탐지기의 타임아웃이 다른 탐지기에 영향을 주지
/// 않습니다.
#[derive(Clone)]
pub struct ScanContext {
    /// 스캔 루트 디렉토리 (정규화된 경로)
    pub source_dir: PathBuf,
    /// 탐지기에 전달되는 자유형식 인자
    pub detector_args: BTreeMap<String, String>,
    /// Process 단계 동시 실행 상한 (0이면 무제한)
    pub max_threads: usize,
    /// 탐지기가 생성한 임시 산출물 삭제 여부
    pub cleanup_created_files: bool,
    /// true면 삭제 대신 로그만 남김
    pub cleanup_dry_run: bool,
    /// 탐지기별 타임아웃
    pub detector_timeout: Duration,
    /// 취소 신호 — 타임아웃 시 실행 중인 외부 도구를 중단시킵니다
    pub cancellation: CancellationToken,
}

impl ScanContext {
    /// 기본 설정의 컨텍스트를 생성합니다.
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            detector_args: BTreeMap::new(),
            max_threads: 0,
            cleanup_created_files: true,
            cleanup_dry_run: false,
            detector_timeout: Duration::from_secs(900),
            cancellation: CancellationToken::new(),
        }
    }

    /// 설정에서 컨텍스트를 구성합니다.
    pub fn from_config(config: &CompscanConfig) -> Self {
        Self {
            source_dir: PathBuf::from(&config.scan.source_dir),
            detector_args: config.detectors.args.clone(),
            max_threads: config.scan.max_threads,
            cleanup_created_files: config.scan.cleanup_created_files,
            cleanup_dry_run: config.scan.cleanup_dry_run,
            detector_timeout: Duration::from_secs(config.scan.detector_timeout_secs),
            cancellation: CancellationToken::new(),
        }
    }
}

/// 생태계 탐지기가 구현하는 trait
///
/// 탐지기는 검색 패턴으로 워커를 구독하고, prepare에서 파일 스트림을
/// 필터/보강하며, process에서 파일별로 컴포넌트를 기록합니다.
/// process는 파일 단위로 동시에 호출될 수 있으므로 탐지기 상태는
/// `&self`로 공유 가능해야 합니다.
pub trait FileComponentDetector: Send + Sync {
    /// 탐지기 고유 id (예: `"npm-lockfile"`)
    fn id(&self) -> &str;

    /// 탐지기 버전 — 기록 형식이 바뀔 때 올립니다.
    fn version(&self) -> u32;

    /// 탐지기가 속한 카테고리 목록
    fn categories(&self) -> &[&str];

    /// 탐지기가 보고하는 생태계 목록
    fn supported_component_types(&self) -> &[ComponentType];

    /// 워커 구독에 사용되는 파일명 글롭 패턴
    fn search_patterns(&self) -> &[&str];

    /// 실험적 탐지기 여부
    ///
    /// 실험적 탐지기는 실행되고 텔레메트리를 남기지만, 병합 결과에
    /// 컴포넌트를 기여하지 않고 에러가 전체 결과에 영향을 주지 않습니다.
    fn experimental(&self) -> bool {
        false
    }

    /// 자동 루트 계산 모드 여부
    ///
    /// true면 명시적 플래그 대신 "부모 없는 노드 = 명시적 루트"로
    /// 해석됩니다 (Cargo.lock처럼 매니페스트가 루트를 표시하지 않는
    /// 생태계용).
    fn needs_automatic_root_calculation(&self) -> bool {
        false
    }

    /// Process가 생성할 수 있는 임시 산출물의 파일명 패턴
    ///
    /// 비어 있지 않으면 파이프라인이 스냅샷 기반 cleanup으로 감쌉니다.
    fn cleanup_patterns(&self) -> &[&str] {
        &[]
    }

    /// 파일 스트림을 필터/보강합니다.
    ///
    /// 기본 구현은 스트림을 그대로 통과시킵니다. 매치 전체를 먼저
    /// 모아야 하는 탐지기(예: 중첩 모듈 제거)는 여기서 수집 후 새
    /// 채널로 재송출합니다.
    fn prepare(
        &self,
        files: mpsc::Receiver<FileMatch>,
        ctx: &ScanContext,
    ) -> impl Future<Output = Result<mpsc::Receiver<FileMatch>, DetectionError>> + Send {
        let _ = ctx;
        async move { Ok(files) }
    }

    /// 파일 하나를 처리하고 레코더에 관측을 기록합니다.
    fn process(
        &self,
        request: ProcessRequest,
        ctx: &ScanContext,
    ) -> impl Future<Output = Result<(), DetectionError>> + Send;

    /// 모든 process 완료 후 호출됩니다. 탐지기별 텔레메트리를 반환합니다.
    fn finish(&self) -> impl Future<Output = BTreeMap<String, String>> + Send {
        async move { BTreeMap::new() }
    }
}

/// dyn-compatible 탐지기 trait
///
/// `FileComponentDetector`는 RPITIT를 사용하므로 `dyn`이 불가합니다.
/// 레지스트리는 이 trait의 `Arc<dyn DynFileComponentDetector>`로
/// 탐지기를 보관합니다.
pub trait DynFileComponentDetector: Send + Sync {
    /// 탐지기 고유 id
    fn id(&self) -> &str;

    /// 탐지기 버전
    fn version(&self) -> u32;

    /// 카테고리 목록
    fn categories(&self) -> &[&str];

    /// 생태계 목록
    fn supported_component_types(&self) -> &[ComponentType];

    /// 검색 패턴
    fn search_patterns(&self) -> &[&str];

    /// 실험적 탐지기 여부
    fn experimental(&self) -> bool;

    /// 자동 루트 계산 모드 여부
    fn needs_automatic_root_calculation(&self) -> bool;

    /// 임시 산출물 패턴
    fn cleanup_patterns(&self) -> &[&str];

    /// 파일 스트림을 필터/보강합니다.
    fn prepare<'a>(
        &'a self,
        files: mpsc::Receiver<FileMatch>,
        ctx: &'a ScanContext,
    ) -> BoxFuture<'a, Result<mpsc::Receiver<FileMatch>, DetectionError>>;

    /// 파일 하나를 처리합니다.
    fn process<'a>(
        &'a self,
        request: ProcessRequest,
        ctx: &'a ScanContext,
    ) -> BoxFuture<'a, Result<(), DetectionError>>;

    /// 탐지기별 텔레메트리를 반환합니다.
    fn finish(&self) -> BoxFuture<'_, BTreeMap<String, String>>;
}

/// FileComponentDetector를 구현한 타입은 자동으로
/// DynFileComponentDetector도 구현됩니다.
impl<T: FileComponentDetector> DynFileComponentDetector for T {
    fn id(&self) -> &str {
        FileComponentDetector::id(self)
    }

    fn version(&self) -> u32 {
        FileComponentDetector::version(self)
    }

    fn categories(&self) -> &[&str] {
        FileComponentDetector::categories(self)
    }

    fn supported_component_types(&self) -> &[ComponentType] {
        FileComponentDetector::supported_component_types(self)
    }

    fn search_patterns(&self) -> &[&str] {
        FileComponentDetector::search_patterns(self)
    }

    fn experimental(&self) -> bool {
        FileComponentDetector::experimental(self)
    }

    fn needs_automatic_root_calculation(&self) -> bool {
        FileComponentDetector::needs_automatic_root_calculation(self)
    }

    fn cleanup_patterns(&self) -> &[&str] {
        FileComponentDetector::cleanup_patterns(self)
    }

    fn prepare<'a>(
        &'a self,
        files: mpsc::Receiver<FileMatch>,
        ctx: &'a ScanContext,
    ) -> BoxFuture<'a, Result<mpsc::Receiver<FileMatch>, DetectionError>> {
        Box::pin(FileComponentDetector::prepare(self, files, ctx))
    }

    fn process<'a>(
        &'a self,
        request: ProcessRequest,
        ctx: &'a ScanContext,
    ) -> BoxFuture<'a, Result<(), DetectionError>> {
        Box::pin(FileComponentDetector::process(self, request, ctx))
    }

    fn finish(&self) -> BoxFuture<'_, BTreeMap<String, String>> {
        Box::pin(FileComponentDetector::finish(self))
    }
}

#[cfg(test)]
mod tests {
    use compscan_graph::ComponentRecorder;

    use super::*;

    struct NoopDetector;

    impl FileComponentDetector for NoopDetector {
        fn id(&self) -> &str {
            "noop"
        }

        fn version(&self) -> u32 {
            1
        }

        fn categories(&self) -> &[&str] {
            &["test"]
        }

        fn supported_component_types(&self) -> &[ComponentType] {
            &[ComponentType::Npm]
        }

        fn search_patterns(&self) -> &[&str] {
            &["noop.json"]
        }

        async fn process(
            &self,
            _request: ProcessRequest,
            _ctx: &ScanContext,
        ) -> Result<(), DetectionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn detector_can_be_used_through_dyn_trait() {
        let detector: Arc<dyn DynFileComponentDetector> = Arc::new(NoopDetector);
        assert_eq!(detector.id(), "noop");
        assert!(!detector.experimental());
        assert!(detector.cleanup_patterns().is_empty());

        let ctx = ScanContext::new("/tmp");
        let (tx, rx) = mpsc::channel(4);
        tx.send(FileMatch {
            path: PathBuf::from("/tmp/noop.json"),
            pattern: "noop.json".to_owned(),
        })
        .await
        .unwrap();
        drop(tx);

        // default prepare passes the stream through untouched
        let mut prepared = detector.prepare(rx, &ctx).await.unwrap();
        let file = prepared.recv().await.unwrap();
        assert_eq!(file.pattern, "noop.json");
        assert!(prepared.recv().await.is_none());

        let recorder = ComponentRecorder::new("noop", true);
        let request = ProcessRequest {
            file,
            recorder: recorder.create_single_file_recorder("/tmp/noop.json"),
        };
        detector.process(request, &ctx).await.unwrap();
        assert!(detector.finish().await.is_empty());
    }

    #[test]
    fn context_from_config_picks_up_scan_settings() {
        let config = CompscanConfig::parse(
            "[scan]\nsource_dir = \"/repo\"\nmax_threads = 4\ndetector_timeout_secs = 30",
        )
        .expect("should parse");
        let ctx = ScanContext::from_config(&config);
        assert_eq!(ctx.source_dir, PathBuf::from("/repo"));
        assert_eq!(ctx.max_threads, 4);
        assert_eq!(ctx.detector_timeout, Duration::from_secs(30));
        assert!(ctx.cleanup_created_files);
    }
}
