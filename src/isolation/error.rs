// ABOUTME: Error types for the isolated execution bridge
// ABOUTME: Covers argument serialization, environment provisioning, subprocess and result decoding failures

use std::path::PathBuf;
use thiserror::Error;

/// Appended to every result decoding failure.
pub const CROSS_VERSION_NOTE: &str =
    "Note that result deserialization is not supported across major Python versions.";

#[derive(Error, Debug)]
pub enum IsolationError {
    #[error("Failed to serialize {what} with the {codec} codec: {reason}")]
    Serialization {
        what: String,
        codec: String,
        reason: String,
    },

    #[error("Failed to provision environment in {}: {message}", .directory.display())]
    Provisioning { directory: PathBuf, message: String },

    #[error("Command {command:?} exited with code {exit_code:?}: {output}")]
    Subprocess {
        command: Vec<String>,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Error deserializing result with the {codec} codec: {reason}. {}", CROSS_VERSION_NOTE)]
    Decode { codec: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IsolationError>;
