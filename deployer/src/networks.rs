//! Built-in network presets.

/// Connection defaults for a known network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkPreset {
    pub name: &'static str,
    pub chain_id: u64,
    /// Environment key holding this network's RPC URL.
    pub rpc_url_key: &'static str,
    pub default_rpc_url: Option<&'static str>,
    pub explorer_url: Option<&'static str>,
    pub currency: &'static str,
}

impl NetworkPreset {
    pub fn explorer_address_url(&self, address: &str) -> Option<String> {
        self.explorer_url
            .map(|base| format!("{}/address/{}", base.trim_end_matches('/'), address))
    }
}

pub const NETWORKS: &[NetworkPreset] = &[
    NetworkPreset {
        name: "arbitrumSepolia",
        chain_id: 421614,
        rpc_url_key: "ARBITRUM_RPC_URL",
        default_rpc_url: Some("https://sepolia-rollup.arbitrum.io/rpc"),
        explorer_url: Some("https://sepolia.arbiscan.io"),
        currency: "ETH",
    },
    NetworkPreset {
        name: "arbitrumOne",
        chain_id: 42161,
        rpc_url_key: "ARBITRUM_MAINNET_RPC_URL",
        default_rpc_url: Some("https://arb1.arbitrum.io/rpc"),
        explorer_url: Some("https://arbiscan.io"),
        currency: "ETH",
    },
    NetworkPreset {
        name: "fuji",
        chain_id: 43113,
        rpc_url_key: "AVALANCHE_FUJI_RPC",
        default_rpc_url: None,
        explorer_url: Some("https://testnet.snowtrace.io"),
        currency: "AVAX",
    },
];

fn normalise(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Find a preset by name, ignoring case and `-`/`_` separators.
pub fn lookup(name: &str) -> Option<&'static NetworkPreset> {
    let wanted = normalise(name);
    NETWORKS.iter().find(|preset| normalise(preset.name) == wanted)
}

/// Find a preset by chain id.
pub fn by_chain_id(chain_id: u64) -> Option<&'static NetworkPreset> {
    NETWORKS.iter().find(|preset| preset.chain_id == chain_id)
}

/// Environment key for the RPC URL of a network without a preset (eg `base-sepolia` ->
/// `BASE_SEPOLIA_RPC_URL`).
pub fn rpc_url_key_for(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 8);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                key.push('_');
            }
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            key.push(c.to_ascii_uppercase());
        } else {
            if !key.is_empty() && !key.ends_with('_') {
                key.push('_');
            }
            prev_lower = false;
        }
    }
    let key = key.trim_end_matches('_');
    format!("{key}_RPC_URL")
}
