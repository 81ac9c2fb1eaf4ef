// External image tool invocation
//
// Design Decision: The tool is a black box; only its exit status and output
// streams are observed. A non-zero exit, a spawn failure or a timeout is a
// failure.

use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::SeedConfig;
use crate::reference::ImageReference;

/// Keep at most this many bytes of captured output per stream
const MAX_CAPTURED_BYTES: usize = 4 * 1024;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", exit_code_label(.exit_code))]
    NonZeroExit {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl ToolError {
    /// Spawn failures (missing binary, permissions) will not fix themselves
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ToolError::Spawn { .. })
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Output of a successful invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub elapsed: Duration,
}

/// Handle to the image tool (`docker` by default)
#[derive(Debug, Clone)]
pub struct ImageTool {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
}

impl ImageTool {
    pub fn new(program: impl Into<String>, base_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_args,
            timeout,
        }
    }

    pub fn from_config(config: &SeedConfig) -> Self {
        Self::new(
            config.tool.clone(),
            config.tool_args.clone(),
            config.command_timeout(),
        )
    }

    /// `<tool> tag <source> <target>`
    pub async fn tag(
        &self,
        source: &str,
        target: &ImageReference,
    ) -> Result<CommandOutput, ToolError> {
        self.exec(&["tag".to_string(), source.to_string(), target.to_string()])
            .await
    }

    /// `<tool> push <target>`
    pub async fn push(&self, target: &ImageReference) -> Result<CommandOutput, ToolError> {
        self.exec(&["push".to_string(), target.to_string()]).await
    }

    async fn exec(&self, args: &[String]) -> Result<CommandOutput, ToolError> {
        let command_line = self.command_line(args);
        debug!(command = %command_line, "Running image tool");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let started = Instant::now();

        // Dropping the child on timeout kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ToolError::Wait {
                command: command_line.clone(),
                source,
            })?,
            Err(_) => {
                warn!(command = %command_line, timeout = ?self.timeout, "Image tool timed out");
                return Err(ToolError::Timeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }
        };

        let elapsed = started.elapsed();
        let stdout = captured(&output.stdout);
        let stderr = captured(&output.stderr);

        if !output.status.success() {
            warn!(
                command = %command_line,
                exit_code = ?output.status.code(),
                stdout = %stdout,
                stderr = %stderr,
                "Image tool failed"
            );
            return Err(ToolError::NonZeroExit {
                command: command_line,
                exit_code: output.status.code(),
                stdout,
                stderr,
            });
        }

        debug!(command = %command_line, elapsed_ms = elapsed.as_millis() as u64, "Image tool finished");

        Ok(CommandOutput { stdout, elapsed })
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.base_args.iter().map(String::as_str))
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Lossy UTF-8 of the last `MAX_CAPTURED_BYTES` bytes, trimmed
fn captured(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(MAX_CAPTURED_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ImageTool {
        // `sh -c <script> fake-tool <args...>` makes the args available as "$@"
        ImageTool::new(
            "sh",
            vec!["-c".into(), script.into(), "fake-tool".into()],
            timeout,
        )
    }

    fn reference() -> ImageReference {
        ImageReference::new("localhost:80", "a", 180, "testing")
    }

    #[tokio::test]
    async fn test_tag_passes_arguments() {
        let tool = sh(
            r#"[ "$1" = tag ] && [ "$2" = alpine ] && [ "$3" = localhost:80/a/180:testing ] && echo ok"#,
            Duration::from_secs(10),
        );

        let output = tool.tag("alpine", &reference()).await.unwrap();
        assert_eq!(output.stdout, "ok");
    }

    #[tokio::test]
    async fn test_push_passes_arguments() {
        let tool = sh(r#"echo "$@""#, Duration::from_secs(10));

        let output = tool.push(&reference()).await.unwrap();
        assert_eq!(output.stdout, "push localhost:80/a/180:testing");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let tool = sh(
            "echo 'pushing layer'; echo denied >&2; exit 3",
            Duration::from_secs(10),
        );

        let err = tool.push(&reference()).await.unwrap_err();
        match &err {
            ToolError::NonZeroExit {
                exit_code,
                stdout,
                stderr,
                ..
            } => {
                assert_eq!(*exit_code, Some(3));
                assert_eq!(stdout, "pushing layer");
                assert_eq!(stderr, "denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("exit code 3"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let tool = sh("sleep 5", Duration::from_millis(100));

        let started = Instant::now();
        let err = tool.push(&reference()).await.unwrap_err();

        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let tool = ImageTool::new(
            "regseed-definitely-not-installed",
            vec![],
            Duration::from_secs(1),
        );

        let err = tool.push(&reference()).await.unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_command_line() {
        let tool = ImageTool::new(
            "docker",
            vec!["--context".into(), "ci".into()],
            Duration::from_secs(1),
        );
        assert_eq!(
            tool.command_line(&["push".into(), "x".into()]),
            "docker --context ci push x"
        );
    }

    #[test]
    fn test_captured_keeps_tail() {
        let mut bytes = vec![b'a'; MAX_CAPTURED_BYTES];
        bytes.extend_from_slice(b"tail");
        let text = captured(&bytes);
        assert_eq!(text.len(), MAX_CAPTURED_BYTES);
        assert!(text.ends_with("tail"));
    }
}
