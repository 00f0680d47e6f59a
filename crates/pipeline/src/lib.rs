//! AWS CodePipeline access.
//!
//! `CodePipelineClient` implements `gatebell_core::PipelineStateSource` by calling
//! `GetPipelineState` over the AWS JSON 1.1 protocol. Requests are signed with
//! SigV4 using the static credentials the Lambda environment exports.

pub mod client;
pub mod credentials;
pub mod sigv4;

pub use client::{ClientBuildError, CodePipelineClient};
pub use credentials::{AwsCredentials, CredentialsError};
