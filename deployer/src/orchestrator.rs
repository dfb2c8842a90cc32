//! Deploy-and-record orchestration.
//!
//! A run moves through `Unconnected -> Connected -> Deployed -> Recorded -> Reconciled`. Anything
//! that fails before `Deployed` aborts the run with nothing written. Once the contract is on
//! chain the transaction is final: record and `.env` failures are reported in the [`RunReport`]
//! but never trigger a redeploy.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use ethers::{
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest, TxHash,
        U256,
    },
    utils::{format_ether, to_checksum},
};
use time::{macros::format_description, OffsetDateTime};
use tracing::{error, info, warn};

use crate::{
    artifact::ContractArtifact,
    chain::{ChainClient, DeployReceipt},
    config::ConnectionConfig,
    env_file,
    error::DeployError,
    networks,
    record::{self, DeploymentRecord},
};

pub const CONTRACT_ADDRESS_KEY: &str = "CONTRACT_ADDRESS";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Unconnected,
    Connected,
    Deployed,
    Recorded,
    Reconciled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Connected => "connected",
            Self::Deployed => "deployed",
            Self::Recorded => "recorded",
            Self::Reconciled => "reconciled",
        };
        f.write_str(name)
    }
}

/// A node client plus a resolved signer, ready to deploy.
#[derive(Debug)]
pub struct ConnectedContext<C> {
    pub client: C,
    pub wallet: LocalWallet,
    pub deployer: Address,
    pub chain_id: u64,
    pub balance: U256,
    pub network_name: String,
    pub rpc_url: String,
    pub rpc_url_key: String,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

/// Outcome of a confirmed deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentResult {
    pub contract_address: Address,
    pub deployer_address: Address,
    pub network_name: String,
    pub chain_id: u64,
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    pub rpc_url: String,
    pub rpc_url_key: String,
}

impl DeploymentResult {
    pub fn checksum_address(&self) -> String {
        to_checksum(&self.contract_address, None)
    }
}

/// Where bookkeeping output goes.
#[derive(Clone, Debug)]
pub struct OutputPaths {
    pub record_path: PathBuf,
    pub env_path: PathBuf,
    /// Copy the env file aside before rewriting it.
    pub backup_env: bool,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            record_path: PathBuf::from("deployment-info.json"),
            env_path: PathBuf::from(".env"),
            backup_env: false,
        }
    }
}

/// Result of a run that reached `Deployed`.
#[derive(Debug)]
pub struct RunReport {
    pub result: DeploymentResult,
    pub record: Result<DeploymentRecord, DeployError>,
    pub environment: Result<(), DeployError>,
}

impl RunReport {
    /// Furthest stage reached without a gap.
    pub fn stage(&self) -> Stage {
        match (&self.record, &self.environment) {
            (Ok(_), Ok(())) => Stage::Reconciled,
            (Ok(_), Err(_)) => Stage::Recorded,
            (Err(_), _) => Stage::Deployed,
        }
    }

    pub fn bookkeeping_errors(&self) -> Vec<&DeployError> {
        self.record
            .as_ref()
            .err()
            .into_iter()
            .chain(self.environment.as_ref().err())
            .collect()
    }

    /// 0 when fully reconciled, 3 when the contract is deployed but bookkeeping failed.
    pub fn exit_code(&self) -> u8 {
        if self.stage() == Stage::Reconciled {
            0
        } else {
            3
        }
    }
}

/// Resolve the signer, check the chain id and fail fast on an empty account.
pub async fn connect<C: ChainClient>(
    config: &ConnectionConfig,
    client: C,
) -> Result<ConnectedContext<C>, DeployError> {
    let credential = config.credential.as_ref().ok_or_else(|| {
        DeployError::Config(
            "no signing credential; set PRIVATE_KEY or pass --private-key / --private-key-path"
                .into(),
        )
    })?;
    let wallet = credential.resolve()?;
    let deployer = wallet.address();

    let chain_id = client
        .chain_id()
        .await
        .map_err(|source| DeployError::Network {
            operation: "query chain id",
            source,
        })?;
    if let Some(expected) = config.chain_id {
        if expected != chain_id {
            return Err(DeployError::Config(format!(
                "{} at {} reports chain id {chain_id}, expected {expected}",
                config.network_name, config.rpc_url
            )));
        }
    }

    let balance = client
        .balance(deployer)
        .await
        .map_err(|source| DeployError::Network {
            operation: "query balance",
            source,
        })?;
    let currency = networks::by_chain_id(chain_id).map_or("ETH", |preset| preset.currency);
    info!(
        network = %config.network_name,
        chain_id,
        deployer = %to_checksum(&deployer, None),
        balance = %format!("{} {currency}", format_ether(balance)),
        "connected"
    );
    if balance.is_zero() {
        return Err(DeployError::InsufficientFunds {
            account: deployer,
            network: config.network_name.clone(),
        });
    }

    Ok(ConnectedContext {
        client,
        wallet: wallet.with_chain_id(chain_id),
        deployer,
        chain_id,
        balance,
        network_name: config.network_name.clone(),
        rpc_url: config.rpc_url.to_string(),
        rpc_url_key: config.rpc_url_key.clone(),
        confirmation_timeout: config.confirmation_timeout,
        poll_interval: config.poll_interval,
    })
}

/// Broadcast the creation transaction and wait for one confirmation. Never retries.
pub async fn deploy<C: ChainClient>(
    ctx: &ConnectedContext<C>,
    artifact: &ContractArtifact,
) -> Result<DeploymentResult, DeployError> {
    let request = Eip1559TransactionRequest::new()
        .from(ctx.deployer)
        .data(artifact.init_code.clone())
        .chain_id(ctx.chain_id);
    let tx = ctx
        .client
        .prepare(TypedTransaction::Eip1559(request))
        .await
        .map_err(DeployError::Deployment)?;

    let signature = ctx
        .wallet
        .sign_transaction(&tx)
        .await
        .map_err(|err| DeployError::Deployment(err.into()))?;
    let raw: Bytes = tx.rlp_signed(&signature);

    // Past this point the transaction may be mined even if we give up waiting.
    let tx_hash = ctx
        .client
        .submit(raw)
        .await
        .map_err(DeployError::Deployment)?;
    info!(
        tx = %format!("{tx_hash:#x}"),
        contract = artifact.name.as_deref().unwrap_or("contract"),
        "deployment transaction sent, waiting for confirmation"
    );

    let receipt = tokio::time::timeout(
        ctx.confirmation_timeout,
        wait_for_receipt(&ctx.client, tx_hash, ctx.poll_interval),
    )
    .await
    .map_err(|_| DeployError::Timeout {
        tx: tx_hash,
        waited: ctx.confirmation_timeout,
    })?;

    if !receipt.success {
        return Err(DeployError::Reverted { tx: tx_hash });
    }
    let contract_address = receipt
        .contract_address
        .ok_or(DeployError::MissingContractAddress { tx: tx_hash })?;

    let result = DeploymentResult {
        contract_address,
        deployer_address: ctx.deployer,
        network_name: ctx.network_name.clone(),
        chain_id: ctx.chain_id,
        transaction_hash: tx_hash,
        block_number: receipt.block_number,
        rpc_url: ctx.rpc_url.clone(),
        rpc_url_key: ctx.rpc_url_key.clone(),
    };
    info!(
        address = %result.checksum_address(),
        block = ?result.block_number,
        "contract deployed"
    );
    if let Some(link) = networks::by_chain_id(ctx.chain_id)
        .and_then(|preset| preset.explorer_address_url(&result.checksum_address()))
    {
        info!("view on explorer: {link}");
    }
    Ok(result)
}

async fn wait_for_receipt<C: ChainClient>(
    client: &C,
    tx_hash: TxHash,
    poll_interval: Duration,
) -> DeployReceipt {
    loop {
        match client.receipt(tx_hash).await {
            Ok(Some(receipt)) => return receipt,
            Ok(None) => {}
            Err(err) => warn!(%err, tx = %format!("{tx_hash:#x}"), "receipt query failed, retrying"),
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Write the deployment record to `sink_path`, replacing whatever was there.
pub fn persist_record(
    result: &DeploymentResult,
    sink_path: &Path,
) -> Result<DeploymentRecord, DeployError> {
    let record = DeploymentRecord::new(result, OffsetDateTime::now_utc());
    record::write_json_atomic(sink_path, &record)?;
    info!(path = %sink_path.display(), "deployment record saved");
    Ok(record)
}

/// Set `CONTRACT_ADDRESS` and the network's RPC URL key in the env file at `env_path`.
pub fn reconcile_environment(
    result: &DeploymentResult,
    env_path: &Path,
    backup: bool,
) -> Result<(), DeployError> {
    const OP: &str = "reconcile environment";

    let existing = if env_path.exists() {
        let text = fs::read_to_string(env_path).map_err(|err| DeployError::io(OP, env_path, err))?;
        if backup {
            let backup_path = backup_path_for(env_path, OffsetDateTime::now_utc());
            backup_env_file(env_path, &backup_path)
                .map_err(|err| DeployError::io("back up environment", &backup_path, err))?;
            info!(path = %backup_path.display(), "backed up env file");
        }
        text
    } else {
        warn!(
            path = %env_path.display(),
            "env file not found, creating it"
        );
        String::new()
    };

    let address = result.checksum_address();
    let updated = env_file::reconcile(
        &existing,
        &[
            (CONTRACT_ADDRESS_KEY, address.as_str()),
            (result.rpc_url_key.as_str(), result.rpc_url.as_str()),
        ],
    );
    if updated == existing {
        info!(path = %env_path.display(), "env file already up to date");
        return Ok(());
    }
    record::write_atomic(env_path, updated.as_bytes(), OP)?;
    info!(path = %env_path.display(), "env file updated with new contract address");
    Ok(())
}

fn backup_path_for(env_path: &Path, now: OffsetDateTime) -> PathBuf {
    let stamp = now
        .format(format_description!(
            "[year][month][day][hour][minute][second][subsecond digits:6]"
        ))
        .unwrap_or_else(|_| "0".to_string());
    let mut name = env_path.as_os_str().to_os_string();
    name.push(format!(".backup.{stamp}"));
    PathBuf::from(name)
}

/// Copy `env_path` to `backup_path` with the same permissions. Never replaces an existing backup.
fn backup_env_file(env_path: &Path, backup_path: &Path) -> std::io::Result<()> {
    let mut source = fs::File::open(env_path)?;
    let mut backup = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(backup_path)?;
    fs::set_permissions(backup_path, source.metadata()?.permissions())?;
    io::copy(&mut source, &mut backup)?;
    backup.sync_all()
}

/// Run the whole pipeline: load artifact, connect, deploy, record, reconcile.
///
/// Returns `Err` only when nothing was deployed (or the outcome is unknown); once deployed the
/// bookkeeping outcome is carried in the [`RunReport`].
pub async fn run<C: ChainClient>(
    config: &ConnectionConfig,
    client: C,
    artifact_path: &Path,
    constructor_args: Option<&Bytes>,
    outputs: &OutputPaths,
) -> Result<RunReport, DeployError> {
    let artifact = ContractArtifact::load(artifact_path, constructor_args)?;
    let ctx = connect(config, client).await?;
    info!(stage = %Stage::Connected, "deploying {}", artifact.name.as_deref().unwrap_or("contract"));

    let result = deploy(&ctx, &artifact).await?;

    let record = persist_record(&result, &outputs.record_path);
    if let Err(err) = &record {
        error!(
            address = %result.checksum_address(),
            tx = %format!("{:#x}", result.transaction_hash),
            "contract IS deployed but the deployment record was not saved: {err}"
        );
    }
    let environment = reconcile_environment(&result, &outputs.env_path, outputs.backup_env);
    if let Err(err) = &environment {
        error!(
            address = %result.checksum_address(),
            "contract IS deployed but the env file was not updated: {err}"
        );
    }

    let report = RunReport {
        result,
        record,
        environment,
    };
    info!(stage = %report.stage(), "run finished");
    Ok(report)
}
