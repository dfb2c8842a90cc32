use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{error::DeployError, orchestrator::DeploymentResult};

/// What gets written to `deployment-info.json` after a successful deployment.
///
/// Field names on disk match the files produced by the earlier Hardhat scripts, so tooling
/// that reads `contractAddress` keeps working.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    #[serde(rename = "network")]
    pub network_name: String,
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "contractAddress")]
    pub contract_address: String,
    #[serde(rename = "deploymentTime")]
    pub deployed_at_timestamp: String,
    #[serde(rename = "deployer")]
    pub deployer_address: String,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
}

impl DeploymentRecord {
    pub fn new(result: &DeploymentResult, now: OffsetDateTime) -> Self {
        let deployed_at_timestamp = now
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            network_name: result.network_name.clone(),
            chain_id: result.chain_id.to_string(),
            contract_address: to_checksum(&result.contract_address, None),
            deployed_at_timestamp,
            deployer_address: to_checksum(&result.deployer_address, None),
            transaction_hash: format!("{:#x}", result.transaction_hash),
        }
    }
}

/// Load a record previously written by [`write_json_atomic`].
pub fn read_record(path: &Path) -> Result<DeploymentRecord, DeployError> {
    let contents = fs::read_to_string(path).map_err(|err| DeployError::io("read record", path, err))?;
    serde_json::from_str(&contents).map_err(|err| {
        DeployError::io(
            "read record",
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        )
    })
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), DeployError> {
    let serialised = serde_json::to_string_pretty(value).map_err(|err| {
        DeployError::io(
            "serialise record",
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        )
    })?;
    write_atomic(path, serialised.as_bytes(), "persist record")
}

/// Write `contents` to a sibling temp file, then rename it over `path`.
///
/// A symlinked `path` is resolved so the link survives, and an existing target's permissions
/// are carried over to the replacement before any bytes are written.
pub(crate) fn write_atomic(
    path: &Path,
    contents: &[u8],
    operation: &'static str,
) -> Result<(), DeployError> {
    let target = if path.is_symlink() {
        // A dangling link still names where the file should go.
        match fs::canonicalize(path) {
            Ok(resolved) => resolved,
            Err(_) => {
                let link = fs::read_link(path).map_err(|err| DeployError::io(operation, path, err))?;
                path.parent().unwrap_or_else(|| Path::new("")).join(link)
            }
        }
    } else {
        path.to_path_buf()
    };
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|err| DeployError::io(operation, parent, err))?;
    }
    let existing_permissions = fs::metadata(&target).ok().map(|meta| meta.permissions());

    let tmp_path = tmp_path_for(&target);
    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        if let Some(permissions) = existing_permissions {
            fs::set_permissions(&tmp_path, permissions)?;
        }
        file.write_all(contents)?;
        file.sync_all()
    })();
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(DeployError::io(operation, &tmp_path, err));
    }
    fs::rename(&tmp_path, &target).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        DeployError::io(operation, &target, err)
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
