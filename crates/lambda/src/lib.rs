//! AWS Lambda custom runtime for the approval notifier.
//!
//! The `bootstrap` binary polls the Lambda Runtime API, hands each invocation
//! payload to `ApprovalNotifier` and reports `{}` or an `InvocationError` back.

pub mod bootstrap;
pub mod runtime;

pub use bootstrap::{
    bootstrap, bootstrap_with_config, report_bootstrap_failure, Application, BootstrapError,
};
pub use runtime::{
    report_init_failure, Invocation, InvocationHandler, InvocationRunner, InvocationTransport,
    RetryPolicy, RunnerError, RuntimeApiTransport, TransportError,
};
