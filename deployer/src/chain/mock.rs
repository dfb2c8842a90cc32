//! Scripted in-memory chain for off-chain testing.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use ethers::types::{transaction::eip2718::TypedTransaction, Address, Bytes, TxHash, U256};

use super::{ChainClient, DeployReceipt};
use crate::error::ChainError;

/// How the mock answers receipt queries.
#[derive(Clone, Debug)]
pub enum ReceiptScript {
    /// Mined after `pending_polls` empty answers.
    Mined {
        contract_address: Address,
        success: bool,
        pending_polls: usize,
    },
    /// Never mined.
    Pending,
    /// Mined without a contract address.
    NoContractAddress,
}

/// Chain whose answers are fixed up front; counts every call it receives.
#[derive(Debug)]
pub struct MockChain {
    pub chain_id: u64,
    pub balance: U256,
    pub tx_hash: TxHash,
    pub receipt: ReceiptScript,
    pub reject_submit: Option<String>,
    calls: AtomicUsize,
    receipt_polls: AtomicUsize,
    submitted: Mutex<Vec<Bytes>>,
}

impl MockChain {
    pub fn new(chain_id: u64, balance: impl Into<U256>) -> Self {
        Self {
            chain_id,
            balance: balance.into(),
            tx_hash: TxHash::repeat_byte(0xab),
            receipt: ReceiptScript::Pending,
            reject_submit: None,
            calls: AtomicUsize::new(0),
            receipt_polls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tx_hash(mut self, tx_hash: TxHash) -> Self {
        self.tx_hash = tx_hash;
        self
    }

    pub fn mines(mut self, contract_address: Address) -> Self {
        self.receipt = ReceiptScript::Mined {
            contract_address,
            success: true,
            pending_polls: 0,
        };
        self
    }

    pub fn with_receipt(mut self, receipt: ReceiptScript) -> Self {
        self.receipt = receipt;
        self
    }

    pub fn rejecting_submit(mut self, reason: impl Into<String>) -> Self {
        self.reject_submit = Some(reason.into());
        self
    }

    /// Total number of RPC calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn receipt_polls(&self) -> usize {
        self.receipt_polls.load(Ordering::SeqCst)
    }

    /// Raw signed transactions received by `submit`.
    pub fn submitted(&self) -> Vec<Bytes> {
        self.submitted
            .lock()
            .map(|txs| txs.clone())
            .unwrap_or_default()
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.hit();
        Ok(self.chain_id)
    }

    async fn balance(&self, _address: Address) -> Result<U256, ChainError> {
        self.hit();
        Ok(self.balance)
    }

    async fn prepare(&self, mut tx: TypedTransaction) -> Result<TypedTransaction, ChainError> {
        self.hit();
        tx.set_nonce(0u64);
        tx.set_gas(3_000_000u64);
        Ok(tx)
    }

    async fn submit(&self, raw: Bytes) -> Result<TxHash, ChainError> {
        self.hit();
        if let Some(reason) = &self.reject_submit {
            return Err(ChainError::Rejected(reason.clone()));
        }
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(raw);
        }
        Ok(self.tx_hash)
    }

    async fn receipt(&self, tx: TxHash) -> Result<Option<DeployReceipt>, ChainError> {
        self.hit();
        let polls = self.receipt_polls.fetch_add(1, Ordering::SeqCst);
        let receipt = match &self.receipt {
            ReceiptScript::Pending => None,
            ReceiptScript::Mined { pending_polls, .. } if polls < *pending_polls => None,
            ReceiptScript::Mined {
                contract_address,
                success,
                ..
            } => Some(DeployReceipt {
                transaction_hash: tx,
                contract_address: Some(*contract_address),
                block_number: Some(1),
                success: *success,
            }),
            ReceiptScript::NoContractAddress => Some(DeployReceipt {
                transaction_hash: tx,
                contract_address: None,
                block_number: Some(1),
                success: true,
            }),
        };
        Ok(receipt)
    }
}
