// ABOUTME: Operator execution support shared by every operator kind
// ABOUTME: Provides the host context, keyword binding, invocation tracking and operator errors

pub mod binding;
pub mod context;
pub mod error;
pub mod result;

pub use binding::{determine_op_kwargs, Signature, RESERVED_CONTEXT_KEYS};
pub use context::{ExecutionContext, HostHandle, LocalHost};
pub use error::{OperatorError, Result};
pub use result::{InvocationState, InvocationTracker};
