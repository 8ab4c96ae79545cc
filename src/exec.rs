//! External binary invocation
//!
//! The node, wallet, faucet and visor binaries are driven as subprocesses.
//! Non-zero exit status is fatal for the call and carries the captured
//! standard error; JSON output is decoded into a typed result. A cancelled
//! call kills its child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors that can occur while invoking an external binary
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to spawn {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for {}: {source}", .binary.display())]
    Wait {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} {args} was cancelled", .binary.display())]
    Cancelled { binary: PathBuf, args: String },

    #[error("{} {args} exited with {status}: {stderr}", .binary.display())]
    Failed {
        binary: PathBuf,
        args: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to parse JSON output of {}: {source} (stdout: {stdout})", .binary.display())]
    InvalidOutput {
        binary: PathBuf,
        stdout: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Run a binary to completion and return its standard output
pub async fn run_command<S: AsRef<str>>(
    binary: &Path,
    args: &[S],
    cancel: &CancellationToken,
) -> Result<String, ExecError> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    debug!("Executing {} {}", binary.display(), args.join(" "));

    let child = Command::new(binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            binary: binary.to_path_buf(),
            source,
        })?;

    // dropping the pending wait kills the child
    let output = tokio::select! {
        _ = cancel.cancelled() => {
            warn!("Killing {} {}", binary.display(), args.join(" "));
            return Err(ExecError::Cancelled {
                binary: binary.to_path_buf(),
                args: args.join(" "),
            });
        }
        output = child.wait_with_output() => output.map_err(|source| ExecError::Wait {
            binary: binary.to_path_buf(),
            source,
        })?,
    };

    if !output.status.success() {
        return Err(ExecError::Failed {
            binary: binary.to_path_buf(),
            args: args.join(" "),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a binary that prints JSON and decode its output
pub async fn run_json<T, S>(
    binary: &Path,
    args: &[S],
    cancel: &CancellationToken,
) -> Result<T, ExecError>
where
    T: DeserializeOwned,
    S: AsRef<str>,
{
    let stdout = run_command(binary, args, cancel).await?;
    parse_json_output(binary, &stdout)
}

/// Decode JSON printed by a binary.
///
/// Some binaries print log lines before the document, so decoding starts at
/// the first `{` or `[`.
pub fn parse_json_output<T: DeserializeOwned>(binary: &Path, stdout: &str) -> Result<T, ExecError> {
    let start = stdout.find(|c: char| c == '{' || c == '[').unwrap_or(0);
    serde_json::from_str(stdout[start..].trim()).map_err(|source| ExecError::InvalidOutput {
        binary: binary.to_path_buf(),
        stdout: stdout.trim().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct InitOutput {
        #[serde(rename = "publicKey")]
        public_key: String,
    }

    #[test]
    fn test_parse_json_output_skips_preamble() {
        let out = "2024-01-01 INFO starting\n{\"publicKey\": \"abc\"}\n";
        let parsed: InitOutput = parse_json_output(Path::new("faucet"), out).unwrap();
        assert_eq!(parsed.public_key, "abc");
    }

    #[test]
    fn test_parse_json_output_rejects_garbage() {
        let result: Result<InitOutput, _> = parse_json_output(Path::new("faucet"), "not json");
        assert!(matches!(result, Err(ExecError::InvalidOutput { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_json() {
        let out: InitOutput = run_json(
            Path::new("sh"),
            &["-c", "echo '{\"publicKey\": \"k1\"}'"],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(out.public_key, "k1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_captures_stderr() {
        let err = run_command(
            Path::new("sh"),
            &["-c", "echo boom >&2; exit 3"],
            &CancellationToken::new(),
        )
        .await
            .unwrap_err();
        match err {
            ExecError::Failed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let err = run_command(
            Path::new("/definitely/not/here"),
            &["init"],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_running_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 5; touch {}", marker.display());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = run_command(Path::new("sh"), &["-c", script.as_str()], &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecError::Cancelled { .. }));
        assert!(started.elapsed() < std::time::Duration::from_secs(4));
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!marker.exists());
    }
}
