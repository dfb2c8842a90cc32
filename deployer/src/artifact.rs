//! Compiled contract artifacts (interface + init code).

use std::{fs, path::Path};

use ethers::{abi::Abi, types::Bytes};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::DeployError;

/// A deployable contract: its interface and the bytes of the creation transaction.
#[derive(Clone, Debug)]
pub struct ContractArtifact {
    pub name: Option<String>,
    pub interface: Abi,
    /// Creation bytecode followed by ABI-encoded constructor arguments.
    pub init_code: Bytes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactJson {
    contract_name: Option<String>,
    #[serde(default)]
    abi: Option<Abi>,
    bytecode: BytecodeJson,
}

/// Hardhat writes a hex string, Foundry an object with an `object` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum BytecodeJson {
    Hex(String),
    Object { object: String },
}

impl BytecodeJson {
    fn into_hex(self) -> String {
        match self {
            Self::Hex(hex) | Self::Object { object: hex } => hex,
        }
    }
}

impl ContractArtifact {
    /// Load an artifact from `path`, appending `constructor_args` to the bytecode.
    ///
    /// JSON files are read as Hardhat/Foundry artifacts; anything else as a raw hex bytecode file.
    pub fn load(path: &Path, constructor_args: Option<&Bytes>) -> Result<Self, DeployError> {
        if !path.is_file() {
            return Err(DeployError::ArtifactNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)
            .map_err(|err| invalid(path, format!("cannot read file: {err}")))?;

        let (name, interface, bytecode_hex) = if is_json(path, &contents) {
            let parsed: ArtifactJson = serde_json::from_str(&contents)
                .map_err(|err| invalid(path, format!("malformed artifact JSON: {err}")))?;
            (
                parsed.contract_name,
                parsed.abi.unwrap_or_default(),
                parsed.bytecode.into_hex(),
            )
        } else {
            (None, Abi::default(), contents)
        };

        let mut init_code = decode_bytecode(&bytecode_hex).map_err(|reason| invalid(path, reason))?;
        if init_code.is_empty() {
            return Err(invalid(
                path,
                "bytecode is empty (abstract contract or interface?)".into(),
            ));
        }

        let expects_args = interface
            .constructor()
            .is_some_and(|ctor| !ctor.inputs.is_empty());
        match constructor_args {
            Some(args) if !args.is_empty() => init_code.extend_from_slice(args),
            _ if expects_args => warn!(
                artifact = %path.display(),
                "constructor takes arguments but none were supplied"
            ),
            _ => {}
        }

        debug!(
            artifact = %path.display(),
            bytes = init_code.len(),
            "loaded contract artifact"
        );
        Ok(Self {
            name,
            interface,
            init_code: init_code.into(),
        })
    }
}

fn is_json(path: &Path, contents: &str) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        || contents.trim_start().starts_with('{')
}

/// Decode hex bytecode (`0x` optional, surrounding whitespace ignored).
pub fn decode_bytecode(raw: &str) -> Result<Vec<u8>, String> {
    let trimmed = raw.trim();
    let hex_str = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex_str.contains("__") {
        return Err("bytecode has unlinked library placeholders".into());
    }
    hex::decode(hex_str).map_err(|err| format!("bytecode is not valid hex: {err}"))
}

fn invalid(path: &Path, reason: String) -> DeployError {
    DeployError::InvalidArtifact {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_hardhat_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "AIAgent.json",
            r#"{
                "_format": "hh-sol-artifact-1",
                "contractName": "AIAgent",
                "abi": [{"type":"function","name":"taskCounter","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}],
                "bytecode": "0x6080604052",
                "deployedBytecode": "0x6080"
            }"#,
        );
        let artifact = ContractArtifact::load(&path, None).unwrap();
        assert_eq!(artifact.name.as_deref(), Some("AIAgent"));
        assert_eq!(artifact.init_code.to_vec(), vec![0x60, 0x80, 0x60, 0x40, 0x52]);
        assert!(artifact.interface.function("taskCounter").is_ok());
    }

    #[test]
    fn loads_foundry_artifact_and_appends_args() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "Counter.json",
            r#"{"abi": [], "bytecode": {"object": "0x6001", "linkReferences": {}}}"#,
        );
        let args = Bytes::from(vec![0u8, 1]);
        let artifact = ContractArtifact::load(&path, Some(&args)).unwrap();
        assert_eq!(artifact.init_code.to_vec(), vec![0x60, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn loads_raw_hex_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "AIAgent.bin", "  0x60806040\n");
        let artifact = ContractArtifact::load(&path, None).unwrap();
        assert_eq!(artifact.init_code.len(), 4);
        assert!(artifact.name.is_none());
    }

    #[test]
    fn missing_artifact() {
        let err = ContractArtifact::load(Path::new("/nonexistent/AIAgent.json"), None).unwrap_err();
        assert!(matches!(err, DeployError::ArtifactNotFound(_)));
    }

    #[test]
    fn rejects_empty_or_unlinked_bytecode() {
        let dir = tempfile::tempdir().unwrap();
        let empty = write(&dir, "IFace.json", r#"{"abi": [], "bytecode": "0x"}"#);
        assert!(matches!(
            ContractArtifact::load(&empty, None),
            Err(DeployError::InvalidArtifact { .. })
        ));

        let unlinked = write(
            &dir,
            "Lib.json",
            r#"{"abi": [], "bytecode": "0x60__$abcdef$__60"}"#,
        );
        let err = ContractArtifact::load(&unlinked, None).unwrap_err();
        assert!(err.to_string().contains("unlinked"));
    }
}
