use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use ethers::{signers::Signer, types::Bytes, utils::to_checksum};
use tracing::{error, info, warn};

use crate::{
    artifact::decode_bytecode,
    chain::RpcClient,
    config::{ConnectionConfig, SigningCredential},
    networks::NETWORKS,
    orchestrator::{self, OutputPaths},
};

/// Deploy the AIAgent contract, then record the address in a deployment JSON and `.env`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy a compiled contract artifact.
    Deploy(DeployArgs),
    /// Print the address a private key resolves to.
    Address(AddressArgs),
    /// List built-in networks.
    Networks,
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Deployer private key (hex string, 0x...).
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Path to a file containing the deployer private key. Takes precedence over --private-key.
    #[arg(long, env = "PRIV_KEY_PATH")]
    pub private_key_path: Option<PathBuf>,
}

impl KeyArgs {
    fn credential(&self) -> Option<SigningCredential> {
        SigningCredential::from_sources(self.private_key.clone(), self.private_key_path.clone())
    }
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Network preset (arbitrumSepolia, arbitrumOne, fuji) or a custom name used with --rpc-url.
    #[arg(long, env = "DEPLOY_NETWORK", default_value = "arbitrumSepolia")]
    pub network: String,

    /// RPC URL; overrides the network's `<NETWORK>_RPC_URL` variable and preset default.
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Expected chain id; the run aborts if the node reports a different one.
    #[arg(long)]
    pub chain_id: Option<u64>,

    #[command(flatten)]
    pub key: KeyArgs,

    /// Compiled artifact: Hardhat/Foundry JSON, or a raw hex bytecode file.
    #[arg(long, default_value = "artifacts/contracts/AIAgent.sol/AIAgent.json")]
    pub artifact: PathBuf,

    /// ABI-encoded constructor arguments (hex), appended to the bytecode.
    #[arg(long)]
    pub constructor_args: Option<String>,

    /// Where to write the deployment record.
    #[arg(long, default_value = "deployment-info.json")]
    pub record_path: PathBuf,

    /// Env file to update with CONTRACT_ADDRESS and the RPC URL.
    #[arg(long, default_value = ".env")]
    pub env_path: PathBuf,

    /// Copy the env file to `<env-path>.backup.<timestamp>` before changing it.
    #[arg(long)]
    pub backup_env: bool,

    /// Seconds to wait for the deployment receipt.
    #[arg(long, default_value_t = 300)]
    pub confirmation_timeout: u64,

    /// Milliseconds between receipt polls.
    #[arg(long, default_value_t = 1000)]
    pub poll_interval: u64,
}

#[derive(Args, Debug)]
pub struct AddressArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Address the key is expected to control.
    #[arg(long)]
    pub expected: Option<String>,
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Deploy(args) => deploy(args).await,
        Command::Address(args) => address(args),
        Command::Networks => {
            for preset in NETWORKS {
                println!(
                    "{:<16} chain {:<7} {:<26} {}",
                    preset.name,
                    preset.chain_id,
                    preset.rpc_url_key,
                    preset.default_rpc_url.unwrap_or("-")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn deploy(args: DeployArgs) -> Result<ExitCode> {
    let constructor_args = args
        .constructor_args
        .as_deref()
        .map(decode_bytecode)
        .transpose()
        .map_err(|err| anyhow!("invalid --constructor-args: {err}"))?
        .map(Bytes::from);

    let config = ConnectionConfig::for_network(
        &args.network,
        args.rpc_url.as_deref(),
        args.key.credential(),
        |key| std::env::var(key).ok(),
    )?
    .with_chain_id(args.chain_id)
    .with_confirmation_timeout(Duration::from_secs(args.confirmation_timeout))
    .with_poll_interval(Duration::from_millis(args.poll_interval));

    let client = RpcClient::new(&config.rpc_url)?;
    let outputs = OutputPaths {
        record_path: args.record_path,
        env_path: args.env_path,
        backup_env: args.backup_env,
    };

    info!(network = %config.network_name, rpc = %config.rpc_url, "starting deployment");
    match orchestrator::run(&config, client, &args.artifact, constructor_args.as_ref(), &outputs)
        .await
    {
        Ok(report) => {
            let address = report.result.checksum_address();
            if report.exit_code() == 0 {
                println!("Deployed to {address}");
            } else {
                warn!(
                    stage = %report.stage(),
                    failures = report.bookkeeping_errors().len(),
                    "deployment succeeded but bookkeeping is incomplete"
                );
                println!("Deployed to {address} (bookkeeping incomplete, see errors above)");
            }
            Ok(ExitCode::from(report.exit_code()))
        }
        Err(err) => {
            if err.is_preflight() {
                error!("nothing was deployed: {err}");
            } else {
                error!("deployment failed: {err}");
            }
            Ok(ExitCode::from(err.exit_code()))
        }
    }
}

fn address(args: AddressArgs) -> Result<ExitCode> {
    let wallet = args
        .key
        .credential()
        .context("no private key; pass --private-key / --private-key-path or set PRIVATE_KEY")?
        .resolve()?;
    let derived = to_checksum(&wallet.address(), None);
    println!("Derived address: {derived}");

    if let Some(expected) = args.expected {
        let matches = expected.trim().eq_ignore_ascii_case(&derived);
        println!("Expected address: {expected}");
        println!("Matches expected address: {matches}");
        if !matches {
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_deploy_flags() {
        let cli = Cli::try_parse_from([
            "aiagent-deployer",
            "deploy",
            "--network",
            "fuji",
            "--rpc-url",
            "https://api.avax-test.network/ext/bc/C/rpc",
            "--artifact",
            "out/AIAgent.json",
            "--backup-env",
            "--confirmation-timeout",
            "60",
        ])
        .unwrap();
        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(args.network, "fuji");
        assert_eq!(args.confirmation_timeout, 60);
        assert!(args.backup_env);
        assert_eq!(args.record_path, PathBuf::from("deployment-info.json"));
    }

    #[test]
    fn key_path_wins_over_private_key_from_env() {
        // main loads `.env` before parsing, so PRIVATE_KEY is commonly set alongside the flag.
        std::env::set_var(
            "PRIVATE_KEY",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        );
        let cli = Cli::try_parse_from([
            "aiagent-deployer",
            "address",
            "--private-key-path",
            "key.txt",
        ])
        .unwrap();
        let Command::Address(args) = cli.command else {
            panic!("expected address");
        };
        assert!(matches!(
            args.key.credential(),
            Some(SigningCredential::KeyFile(path)) if path == PathBuf::from("key.txt")
        ));
    }

    #[test]
    fn both_key_flags_are_accepted() {
        let cli = Cli::try_parse_from([
            "aiagent-deployer",
            "address",
            "--private-key",
            "0x01",
            "--private-key-path",
            "key.txt",
        ])
        .unwrap();
        let Command::Address(args) = cli.command else {
            panic!("expected address");
        };
        assert!(matches!(args.key.credential(), Some(SigningCredential::KeyFile(_))));
    }
}
