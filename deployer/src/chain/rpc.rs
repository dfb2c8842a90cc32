use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes, TransactionReceipt,
        TxHash, U256,
    },
};
use url::Url;

use super::{ChainClient, DeployReceipt};
use crate::error::{ChainError, DeployError};

/// [`ChainClient`] backed by an ethers HTTP provider.
#[derive(Clone, Debug)]
pub struct RpcClient {
    provider: Provider<Http>,
}

impl RpcClient {
    /// Bind a provider to `url`. Does not touch the network.
    pub fn new(url: &Url) -> Result<Self, DeployError> {
        let provider = Provider::<Http>::try_from(url.as_str())
            .map_err(|err| DeployError::Config(format!("invalid RPC URL {url}: {err}")))?;
        Ok(Self { provider })
    }
}

impl From<TransactionReceipt> for DeployReceipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            contract_address: receipt.contract_address,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            // Pre-Byzantium receipts carry no status.
            success: receipt.status.map_or(true, |status| status.as_u64() == 1),
        }
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_chainid().await?.as_u64())
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self.provider.get_balance(address, None).await?)
    }

    async fn prepare(&self, mut tx: TypedTransaction) -> Result<TypedTransaction, ChainError> {
        if tx.nonce().is_none() {
            let from = tx
                .from()
                .copied()
                .ok_or_else(|| ChainError::Rejected("transaction has no sender".into()))?;
            let nonce = self
                .provider
                .get_transaction_count(from, Some(BlockNumber::Pending.into()))
                .await?;
            tx.set_nonce(nonce);
        }
        self.provider.fill_transaction(&mut tx, None).await?;
        Ok(tx)
    }

    async fn submit(&self, raw: Bytes) -> Result<TxHash, ChainError> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(pending.tx_hash())
    }

    async fn receipt(&self, tx: TxHash) -> Result<Option<DeployReceipt>, ChainError> {
        Ok(self
            .provider
            .get_transaction_receipt(tx)
            .await?
            .map(DeployReceipt::from))
    }
}
