//! 외부 도구 실행 — 타임아웃과 취소 신호가 걸린 자식 프로세스 러너
//!
//! go 같은 생태계 도구는 탐지기의 process 안에서 실행됩니다. 러너는
//! 타임아웃과 스캔 취소 토큰을 모두 관찰하며, 어느 쪽이든 발화하면
//! 자식 프로세스를 종료합니다 (`kill_on_drop`).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use compscan_core::error::DetectionError;

/// stderr를 에러 메시지로 옮길 때의 최대 길이
const MAX_STDERR_SNIPPET: usize = 512;

/// 외부 도구 실행 결과
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// 표준 출력 (lossy UTF-8)
    pub stdout: String,
    /// 표준 에러 (lossy UTF-8)
    pub stderr: String,
}

/// 외부 도구 러너
pub struct ToolRunner {
    timeout: Duration,
    cancellation: CancellationToken,
}

impl ToolRunner {
    /// 러너를 생성합니다.
    pub fn new(timeout: Duration, cancellation: CancellationToken) -> Self {
        Self {
            timeout,
            cancellation,
        }
    }

    /// 도구를 실행하고 출력을 수집합니다.
    ///
    /// 비정상 종료 코드, 타임아웃, 취소, 실행 실패 모두
    /// [`DetectionError::Tool`]로 보고됩니다.
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
    ) -> Result<ToolOutput, DetectionError> {
        debug!(tool = program, args = ?args, cwd = %cwd.display(), "running external tool");

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::select! {
            _ = self.cancellation.cancelled() => {
                return Err(DetectionError::Tool {
                    tool: program.to_owned(),
                    reason: "cancelled".to_owned(),
                });
            }
            result = tokio::time::timeout(self.timeout, command.output()) => match result {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return Err(DetectionError::Tool {
                        tool: program.to_owned(),
                        reason: format!("failed to run: {e}"),
                    });
                }
                Err(_) => {
                    return Err(DetectionError::Tool {
                        tool: program.to_owned(),
                        reason: format!("timed out after {}s", self.timeout.as_secs()),
                    });
                }
            },
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(DetectionError::Tool {
                tool: program.to_owned(),
                reason: format!("{}: {}", output.status, snippet(&stderr)),
            });
        }

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }

    /// 도구의 존재 여부를 확인합니다.
    pub async fn probe(&self, program: &str, args: &[&str]) -> bool {
        self.run(program, args, Path::new(".")).await.is_ok()
    }
}

fn snippet(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    match trimmed.char_indices().nth(MAX_STDERR_SNIPPET) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(timeout_secs: u64) -> ToolRunner {
        ToolRunner::new(Duration::from_secs(timeout_secs), CancellationToken::new())
    }

    #[tokio::test]
    async fn missing_tool_is_a_tool_error() {
        let result = runner(5)
            .run("compscan-no-such-binary", &[], Path::new("."))
            .await;
        assert!(matches!(result, Err(DetectionError::Tool { .. })));
    }

    #[tokio::test]
    async fn successful_run_captures_stdout() {
        let output = runner(5)
            .run("echo", &["hello"], Path::new("."))
            .await
            .expect("echo should succeed");
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_tool_error() {
        let result = runner(5).run("false", &[], Path::new(".")).await;
        assert!(matches!(result, Err(DetectionError::Tool { .. })));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_the_run() {
        let token = CancellationToken::new();
        token.cancel();
        let runner = ToolRunner::new(Duration::from_secs(5), token);
        let result = runner.run("sleep", &["5"], Path::new(".")).await;
        match result {
            Err(DetectionError::Tool { reason, .. }) => assert_eq!(reason, "cancelled"),
            other => panic!("expected cancelled tool error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn probe_reports_missing_tools() {
        assert!(!runner(5).probe("compscan-no-such-binary", &[]).await);
        assert!(runner(5).probe("echo", &["probe"]).await);
    }
}
