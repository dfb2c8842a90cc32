//! Deploys a pre-compiled contract to an EVM network, waits for confirmation, and records the
//! result in a deployment JSON file and the project's `.env`.

pub mod artifact;
pub mod chain;
pub mod cli;
pub mod config;
pub mod env_file;
pub mod error;
pub mod networks;
pub mod orchestrator;
pub mod record;

pub use artifact::ContractArtifact;
pub use chain::{ChainClient, DeployReceipt, MockChain, RpcClient};
pub use config::{ConnectionConfig, SigningCredential};
pub use error::{ChainError, DeployError};
pub use orchestrator::{
    connect, deploy, persist_record, reconcile_environment, run, ConnectedContext,
    DeploymentResult, OutputPaths, RunReport, Stage,
};
pub use record::DeploymentRecord;
