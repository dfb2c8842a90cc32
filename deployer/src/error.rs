use std::{path::PathBuf, time::Duration};

use ethers::{
    providers::ProviderError,
    signers::WalletError,
    types::{Address, TxHash},
};

/// Failures talking to the node or signing for it.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Provider(#[from] ProviderError),
    #[error("signing failed: {0}")]
    Signer(#[from] WalletError),
    /// The node refused the request (used by non-ethers clients and mocks).
    #[error("{0}")]
    Rejected(String),
}

/// Everything that can go wrong during a deployment run.
///
/// Variants before [`DeployError::Deployment`] are pre-flight: nothing was broadcast.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("account {account:#x} has no funds on {network}; fund it before deploying")]
    InsufficientFunds { account: Address, network: String },

    #[error("contract artifact not found at {}; compile the contract first", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("invalid contract artifact {}: {reason}", .path.display())]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("{operation} failed: {source}")]
    Network {
        operation: &'static str,
        #[source]
        source: ChainError,
    },

    #[error("deployment transaction rejected: {0}")]
    Deployment(#[source] ChainError),

    #[error("deployment transaction {tx:#x} reverted")]
    Reverted { tx: TxHash },

    #[error("deployment transaction {tx:#x} was mined but the receipt has no contract address")]
    MissingContractAddress { tx: TxHash },

    #[error(
        "no receipt for {tx:#x} after {}s; the transaction may still be mined, check it manually",
        .waited.as_secs()
    )]
    Timeout { tx: TxHash, waited: Duration },

    #[error("{operation} failed for {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DeployError {
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// True when the error happened before anything was broadcast.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::InsufficientFunds { .. }
                | Self::ArtifactNotFound(_)
                | Self::InvalidArtifact { .. }
                | Self::Network { .. }
        )
    }

    /// Process exit status for a run that ended with this error.
    ///
    /// 1: nothing deployed. 2: outcome unknown. 3: deployed, bookkeeping failed.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Timeout { .. } => 2,
            Self::Io { .. } => 3,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_classification() {
        assert!(DeployError::Config("x".into()).is_preflight());
        assert!(DeployError::ArtifactNotFound(PathBuf::from("a.json")).is_preflight());
        assert!(!DeployError::Reverted { tx: TxHash::zero() }.is_preflight());
        assert!(!DeployError::Timeout {
            tx: TxHash::zero(),
            waited: Duration::from_secs(1)
        }
        .is_preflight());
    }

    #[test]
    fn exit_codes_distinguish_unknown_outcome() {
        let timeout = DeployError::Timeout {
            tx: TxHash::zero(),
            waited: Duration::from_secs(30),
        };
        assert_eq!(timeout.exit_code(), 2);
        assert_eq!(DeployError::Config("x".into()).exit_code(), 1);
        let io = DeployError::io(
            "persist record",
            "out.json",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(io.exit_code(), 3);
        assert!(io.to_string().contains("persist record"));
    }
}
