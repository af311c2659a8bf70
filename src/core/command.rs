use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use crate::core::error::CommandError;

/// Hard bounds applied to every external invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl CommandLimits {
    /// Listing queries against the automation tool.
    pub const QUERY: Self = Self {
        timeout: Duration::from_secs(30),
        max_output_bytes: 5 * 1024 * 1024,
    };

    /// Message delivery.
    pub const SEND: Self = Self {
        timeout: Duration::from_secs(20),
        max_output_bytes: 2 * 1024 * 1024,
    };

    /// Task lister and log capture scripts.
    pub const TASKS: Self = Self {
        timeout: Duration::from_secs(20),
        max_output_bytes: 5 * 1024 * 1024,
    };
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program and hands back its raw output. No parsing happens here.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        limits: CommandLimits,
    ) -> Result<CommandOutput, CommandError>;
}

/// Spawns real child processes through tokio.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

enum ReadFailure {
    Overflow,
    Io(std::io::Error),
}

impl From<std::io::Error> for ReadFailure {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: usize,
) -> Result<Vec<u8>, ReadFailure> {
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buf);
        }
        if buf.len() + n > limit {
            return Err(ReadFailure::Overflow);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        limits: CommandLimits,
    ) -> Result<CommandOutput, CommandError> {
        debug!("exec {} {:?}", program, args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = limits.max_output_bytes;

        let run = async {
            let (out, err) =
                tokio::try_join!(read_capped(stdout, limit), read_capped(stderr, limit))?;
            let status = child.wait().await?;
            Ok::<_, ReadFailure>((out, err, status))
        };
        let outcome = tokio::time::timeout(limits.timeout, run).await;

        let (out, err, status) = match outcome {
            Ok(Ok(done)) => done,
            Ok(Err(failure)) => {
                let _ = child.start_kill();
                return Err(match failure {
                    ReadFailure::Overflow => CommandError::OutputOverflow {
                        program: program.to_string(),
                        limit,
                    },
                    ReadFailure::Io(source) => CommandError::Io {
                        program: program.to_string(),
                        source,
                    },
                });
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(CommandError::Timeout {
                    program: program.to_string(),
                    after: limits.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&out).into_owned();
        let stderr = String::from_utf8_lossy(&err).into_owned();

        if !status.success() {
            return Err(CommandError::NonZeroExit {
                program: program.to_string(),
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    fn limits(timeout_ms: u64, max_output_bytes: usize) -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_millis(timeout_ms),
            max_output_bytes,
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let out = ProcessRunner
            .execute("sh", &sh("echo hello; echo warn >&2"), limits(5_000, 1024))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "warn");
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let err = ProcessRunner
            .execute("sh", &sh("sleep 5"), limits(100, 1024))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }

    #[tokio::test]
    async fn runaway_output_overflows() {
        let err = ProcessRunner
            .execute("sh", &sh("head -c 100000 /dev/zero"), limits(5_000, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::OutputOverflow { limit: 1000, .. }));
    }

    #[tokio::test]
    async fn non_zero_exit_reports_code_and_stderr() {
        let err = ProcessRunner
            .execute("sh", &sh("echo boom >&2; exit 3"), limits(5_000, 1024))
            .await
            .unwrap_err();
        match err {
            CommandError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_failure() {
        let err = ProcessRunner
            .execute("opsdeck-no-such-binary", &[], limits(1_000, 1024))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
