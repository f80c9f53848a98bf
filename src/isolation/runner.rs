// ABOUTME: Subprocess execution and result reading for isolated invocations
// ABOUTME: Runs a command line to completion, streams its output to the log and decodes the result artifact

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info};

use super::codec::Codec;
use super::error::{IsolationError, Result, CROSS_VERSION_NOTE};
use crate::value::Value;

/// Number of output lines kept for the error message of a failed command.
const OUTPUT_TAIL_LINES: usize = 20;

/// Runs a command line to completion and fails on a non-zero exit.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: &[String]) -> Result<()>;
}

/// Default runner backed by `tokio::process`.
///
/// The child is killed if the future is dropped before it exits.
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner;

#[async_trait]
impl ProcessRunner for SubprocessRunner {
    async fn run(&self, command: &[String]) -> Result<()> {
        let (program, args) = command.split_first().ok_or_else(|| IsolationError::Subprocess {
            command: Vec::new(),
            exit_code: None,
            output: "empty command line".to_string(),
        })?;

        info!("Executing cmd: {}", command.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| IsolationError::Subprocess {
                command: command.to_vec(),
                exit_code: None,
                output: format!("failed to start: {}", e),
            })?;

        let (stdout, stderr) = tokio::join!(
            collect_lines(child.stdout.take()),
            collect_lines(child.stderr.take())
        );
        let status = child.wait().await?;

        debug!("Command exited with {}", status);

        if status.success() {
            return Ok(());
        }

        let mut output: Vec<String> = stdout;
        output.extend(stderr);
        let tail_start = output.len().saturating_sub(OUTPUT_TAIL_LINES);

        Err(IsolationError::Subprocess {
            command: command.to_vec(),
            exit_code: status.code(),
            output: output[tail_start..].join("\n"),
        })
    }
}

async fn collect_lines<R>(reader: Option<R>) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let Some(reader) = reader else {
        return collected;
    };

    // Lines are raw bytes; the pipe must be drained to EOF even when the
    // child writes something that is not UTF-8.
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);
                let line = line.trim_end_matches(&['\n', '\r'][..]).to_string();
                info!("{}", line);
                collected.push(line);
            }
            Err(e) => {
                debug!("Stopped reading command output: {}", e);
                break;
            }
        }
    }
    collected
}

/// Read the result artifact.
///
/// A missing or zero-length file means the callable returned nothing and is
/// never handed to the decoder. A non-empty file that does not decode is an
/// error.
pub async fn read_result(path: &Path, codec: Codec) -> Result<Option<Value>> {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No result file at {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    if metadata.len() == 0 {
        return Ok(None);
    }

    let bytes = fs::read(path).await?;
    match codec.decode(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            error!("Error deserializing result. {}", CROSS_VERSION_NOTE);
            Err(err)
        }
    }
}
