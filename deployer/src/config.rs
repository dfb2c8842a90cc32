use std::{fmt, fs, path::PathBuf, time::Duration};

use ethers::signers::LocalWallet;
use url::Url;

use crate::{error::DeployError, networks};

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Secret material for the deployer account.
#[derive(Clone)]
pub enum SigningCredential {
    /// Hex private key, with or without `0x`.
    PrivateKey(String),
    /// File containing a hex private key.
    KeyFile(PathBuf),
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateKey(_) => f.write_str("PrivateKey(<redacted>)"),
            Self::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

impl SigningCredential {
    /// Build a credential from the two CLI/env sources; blank values count as absent.
    pub fn from_sources(private_key: Option<String>, key_path: Option<PathBuf>) -> Option<Self> {
        if let Some(path) = key_path.filter(|p| !p.as_os_str().is_empty()) {
            return Some(Self::KeyFile(path));
        }
        private_key
            .filter(|k| !k.trim().is_empty())
            .map(Self::PrivateKey)
    }

    /// Resolve the credential to a local signing wallet. No network access.
    pub fn resolve(&self) -> Result<LocalWallet, DeployError> {
        let raw = match self {
            Self::PrivateKey(key) => key.clone(),
            Self::KeyFile(path) => fs::read_to_string(path).map_err(|err| {
                DeployError::Config(format!(
                    "cannot read private key file {}: {err}",
                    path.display()
                ))
            })?,
        };
        let hex_key = raw.trim();
        let hex_key = hex_key
            .strip_prefix("0x")
            .or_else(|| hex_key.strip_prefix("0X"))
            .unwrap_or(hex_key);
        if hex_key.is_empty() {
            return Err(DeployError::Config("signing credential is empty".into()));
        }
        if hex_key.len() != 64 {
            return Err(DeployError::Config(format!(
                "private key must be 32 bytes (64 hex chars), got {} chars",
                hex_key.len()
            )));
        }
        hex_key
            .parse::<LocalWallet>()
            .map_err(|err| DeployError::Config(format!("invalid private key: {err}")))
    }
}

/// Everything needed to reach a network and sign for it.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub network_name: String,
    pub rpc_url: Url,
    /// Environment key that stores `rpc_url` (eg `ARBITRUM_RPC_URL`).
    pub rpc_url_key: String,
    /// Expected chain id; checked against the node when set.
    pub chain_id: Option<u64>,
    pub credential: Option<SigningCredential>,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

impl ConnectionConfig {
    pub fn new(
        network_name: impl Into<String>,
        rpc_url: &str,
        credential: Option<SigningCredential>,
    ) -> Result<Self, DeployError> {
        let network_name = network_name.into();
        let rpc_url = parse_rpc_url(rpc_url)?;
        let (rpc_url_key, chain_id) = match networks::lookup(&network_name) {
            Some(preset) => (preset.rpc_url_key.to_string(), Some(preset.chain_id)),
            None => (networks::rpc_url_key_for(&network_name), None),
        };
        Ok(Self {
            network_name,
            rpc_url,
            rpc_url_key,
            chain_id,
            credential,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Build a config for `network`, resolving the RPC URL from (in order) the explicit
    /// override, the network's environment key, and the preset default.
    pub fn for_network(
        network: &str,
        rpc_url_override: Option<&str>,
        credential: Option<SigningCredential>,
        lookup_env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DeployError> {
        let preset = networks::lookup(network);
        let key = match preset {
            Some(preset) => preset.rpc_url_key.to_string(),
            None => networks::rpc_url_key_for(network),
        };
        let rpc_url = rpc_url_override
            .map(str::to_string)
            .or_else(|| lookup_env(&key).filter(|v| !v.trim().is_empty()))
            .or_else(|| preset.and_then(|p| p.default_rpc_url).map(str::to_string))
            .ok_or_else(|| {
                DeployError::Config(format!(
                    "no RPC URL for network `{network}`; pass --rpc-url or set {key}"
                ))
            })?;
        let name = preset.map(|p| p.name).unwrap_or(network);
        Self::new(name, &rpc_url, credential)
    }

    pub fn with_chain_id(mut self, chain_id: Option<u64>) -> Self {
        if chain_id.is_some() {
            self.chain_id = chain_id;
        }
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

fn parse_rpc_url(raw: &str) -> Result<Url, DeployError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| DeployError::Config(format!("invalid RPC URL `{raw}`: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DeployError::Config(format!(
            "unsupported RPC URL scheme `{other}` (expected http or https)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::Signer;

    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn resolves_key_with_or_without_prefix() {
        let with = SigningCredential::PrivateKey(ANVIL_KEY.into()).resolve().unwrap();
        let without = SigningCredential::PrivateKey(ANVIL_KEY.trim_start_matches("0x").into())
            .resolve()
            .unwrap();
        assert_eq!(with.address(), without.address());
        assert_eq!(
            format!("{:#x}", with.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn key_file_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        fs::write(&path, format!("{ANVIL_KEY}\n")).unwrap();
        let wallet = SigningCredential::KeyFile(path).resolve().unwrap();
        assert_eq!(
            format!("{:#x}", wallet.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn blank_sources_are_absent() {
        assert!(SigningCredential::from_sources(Some("  ".into()), None).is_none());
        assert!(SigningCredential::from_sources(None, None).is_none());
        assert!(matches!(
            SigningCredential::from_sources(Some("k".into()), Some("p".into())),
            Some(SigningCredential::KeyFile(_))
        ));
    }

    #[test]
    fn rejects_bad_keys() {
        let non_hex = "zz".repeat(32);
        for key in ["0x", "1234", non_hex.as_str()] {
            let err = SigningCredential::PrivateKey(key.into()).resolve().unwrap_err();
            assert!(matches!(err, DeployError::Config(_)), "{key}: {err}");
        }
    }

    #[test]
    fn debug_redacts_secret() {
        let cred = SigningCredential::PrivateKey(ANVIL_KEY.into());
        assert!(!format!("{cred:?}").contains("ac0974"));
    }

    #[test]
    fn rpc_url_resolution_order() {
        let env = |key: &str| (key == "ARBITRUM_RPC_URL").then(|| "https://env.example/rpc".to_string());

        let cfg = ConnectionConfig::for_network("arbitrumSepolia", None, None, env).unwrap();
        assert_eq!(cfg.rpc_url.as_str(), "https://env.example/rpc");
        assert_eq!(cfg.chain_id, Some(421614));

        let cfg = ConnectionConfig::for_network(
            "arbitrum-sepolia",
            Some("http://localhost:8547"),
            None,
            env,
        )
        .unwrap();
        assert_eq!(cfg.rpc_url.as_str(), "http://localhost:8547/");
        assert_eq!(cfg.network_name, "arbitrumSepolia");

        let cfg = ConnectionConfig::for_network("arbitrumOne", None, None, |_| None).unwrap();
        assert_eq!(cfg.rpc_url.as_str(), "https://arb1.arbitrum.io/rpc");
        assert_eq!(cfg.rpc_url_key, "ARBITRUM_MAINNET_RPC_URL");
    }

    #[test]
    fn unknown_network_needs_rpc_url() {
        let err = ConnectionConfig::for_network("devnet", None, None, |_| None).unwrap_err();
        assert!(err.to_string().contains("DEVNET_RPC_URL"));

        let cfg = ConnectionConfig::for_network("devnet", Some("http://127.0.0.1:8545"), None, |_| None)
            .unwrap();
        assert_eq!(cfg.rpc_url_key, "DEVNET_RPC_URL");
        assert_eq!(cfg.chain_id, None);
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(
            ConnectionConfig::new("fuji", "not a url", None),
            Err(DeployError::Config(_))
        ));
        assert!(matches!(
            ConnectionConfig::new("fuji", "ws://localhost:8546", None),
            Err(DeployError::Config(_))
        ));
    }
}
