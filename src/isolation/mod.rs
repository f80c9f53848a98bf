// ABOUTME: Isolated execution bridge running callables inside a separate interpreter environment
// ABOUTME: Exposes codecs, callable specs, argument marshalling, script generation, provisioning and the runner

pub mod bridge;
pub mod callable;
pub mod codec;
pub mod error;
pub mod marshal;
pub mod provision;
pub mod runner;
pub mod script;
pub mod settings;

pub use bridge::{ExecutionBridge, IsolatedCall};
pub use callable::{CallableSource, CallableSpec, InvalidCallable};
pub use codec::Codec;
pub use error::{IsolationError, Result};
pub use marshal::{ExecutionArtifacts, InvocationArgs};
pub use provision::{
    EnvironmentProvisioner, EnvironmentSpec, ExistingInterpreterProvisioner, ProvisionRequest,
    VirtualenvProvisioner,
};
pub use runner::{ProcessRunner, SubprocessRunner};
pub use script::{generate_driver_script, STRING_ARGS_GLOBAL};
pub use settings::IsolationSettings;
