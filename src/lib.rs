// ABOUTME: Main library module for pyoperator
// ABOUTME: Exports workflow task operators and the isolated execution bridge behind them

pub mod cli;
pub mod engine;
pub mod isolation;
pub mod operators;
pub mod value;

// Re-export commonly used types
pub use cli::{App, Args, Config};
pub use engine::{ExecutionContext, HostHandle, LocalHost, OperatorError, Signature};
pub use isolation::{CallableSpec, Codec, EnvironmentSpec, ExecutionBridge, IsolationError};
pub use operators::{
    BranchOperator, FunctionOperator, IsolatedOperator, Operator, ShortCircuitOperator,
    TaskDecorator, TaskRegistry,
};
pub use value::{Kwargs, Value};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
