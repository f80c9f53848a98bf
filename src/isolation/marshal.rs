// ABOUTME: Argument marshalling for isolated invocations
// ABOUTME: Lays out the per-invocation artifact files and writes serialized args and string args into them

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::codec::Codec;
use super::error::Result;
use crate::value::{kwargs_to_mapping, Kwargs, Mapping, Value};

/// File locations used by one invocation, all inside its scoped temp directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionArtifacts {
    pub input: PathBuf,
    pub output: PathBuf,
    pub string_args: PathBuf,
    pub script: PathBuf,
}

impl ExecutionArtifacts {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            input: dir.join("script.in"),
            output: dir.join("script.out"),
            string_args: dir.join("string_args.txt"),
            script: dir.join("script.py"),
        }
    }
}

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationArgs {
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl InvocationArgs {
    pub fn new(args: Vec<Value>, kwargs: Kwargs) -> Self {
        Self { args, kwargs }
    }

    /// True when there is nothing to serialize.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// The `{"args": [...], "kwargs": {...}}` document read by the driver script.
    pub fn to_document(&self) -> Value {
        let mut document = Mapping::new();
        document.insert("args".into(), Value::Sequence(self.args.clone()));
        document.insert(
            "kwargs".into(),
            Value::Mapping(kwargs_to_mapping(&self.kwargs)),
        );
        Value::Mapping(document)
    }
}

/// Serialize `args` to `path`. Nothing is written when there are no arguments;
/// returns whether the file was written.
pub async fn write_args(path: &Path, args: &InvocationArgs, codec: Codec) -> Result<bool> {
    if args.is_empty() {
        debug!("No arguments to pass, skipping {}", path.display());
        return Ok(false);
    }

    let bytes = codec.encode("arguments", &args.to_document())?;
    fs::write(path, &bytes).await?;
    debug!(
        "Wrote {} positional and {} keyword arguments ({} bytes) to {}",
        args.args.len(),
        args.kwargs.len(),
        bytes.len(),
        path.display()
    );
    Ok(true)
}

/// Write string args one per line. Always written, even when empty, so they
/// stay readable whatever codec or interpreter version is on the other side.
pub async fn write_string_args(path: &Path, string_args: &[String]) -> Result<()> {
    fs::write(path, string_args.join("\n")).await?;
    Ok(())
}
