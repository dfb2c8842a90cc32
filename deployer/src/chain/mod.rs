//! Node capabilities used by the orchestrator.
//!
//! The orchestrator only needs a handful of JSON-RPC calls, so they are abstracted behind
//! [`ChainClient`]: [`RpcClient`] talks to a real node, [`MockChain`] is scripted for tests.

pub mod mock;
pub mod rpc;

use async_trait::async_trait;
use ethers::types::{transaction::eip2718::TypedTransaction, Address, Bytes, TxHash, U256};

use crate::error::ChainError;

pub use mock::MockChain;
pub use rpc::RpcClient;

/// The parts of a transaction receipt a deployment cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployReceipt {
    pub transaction_hash: TxHash,
    pub contract_address: Option<Address>,
    pub block_number: Option<u64>,
    /// `false` when the transaction reverted.
    pub success: bool,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `eth_chainId`.
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// `eth_getBalance` at the latest block.
    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Fill nonce, gas limit and fees for an unsigned transaction. `from` is already set.
    async fn prepare(&self, tx: TypedTransaction) -> Result<TypedTransaction, ChainError>;

    /// `eth_sendRawTransaction`.
    async fn submit(&self, raw: Bytes) -> Result<TxHash, ChainError>;

    /// `eth_getTransactionReceipt`; `None` while the transaction is pending.
    async fn receipt(&self, tx: TxHash) -> Result<Option<DeployReceipt>, ChainError>;
}

#[async_trait]
impl<'a, T: ChainClient + ?Sized> ChainClient for &'a T {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        (**self).chain_id().await
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        (**self).balance(address).await
    }

    async fn prepare(&self, tx: TypedTransaction) -> Result<TypedTransaction, ChainError> {
        (**self).prepare(tx).await
    }

    async fn submit(&self, raw: Bytes) -> Result<TxHash, ChainError> {
        (**self).submit(raw).await
    }

    async fn receipt(&self, tx: TxHash) -> Result<Option<DeployReceipt>, ChainError> {
        (**self).receipt(tx).await
    }
}
