use crate::{
    chain::parse_address,
    config::{
        ContractBinding,
        ContractName,
    },
    registry::{
        abi_fingerprint,
        registry_abi,
    },
};
use alloy::{
    json_abi::JsonAbi,
    primitives::Address,
};
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
};
use tracing::warn;

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const CONTRACTS_FILE: &str = "contracts.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Dev,
    Test,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Dev => "dev",
            DeploymentEnv::Test => "test",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Dev => "Devnet",
            DeploymentEnv::Test => "Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

impl FromStr for DeploymentEnv {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dev" | "devnet" => Ok(DeploymentEnv::Dev),
            "test" | "testnet" => Ok(DeploymentEnv::Test),
            "local" => Ok(DeploymentEnv::Local),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// One stored contract entry: the address it was deployed at and, when the
/// deploy pipeline exported it, the ABI document alongside.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredBinding {
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<serde_json::Value>,
}

/// The build-time defaults for one environment, written at deploy time and
/// read back to seed the config store before the first registry refresh.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub recorded_at: String,
    pub network_url: String,
    #[serde(default)]
    pub contracts: Vec<StoredBinding>,
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: &DeploymentRecord) -> Result<()> {
        write_record(&self.path, record)
    }
}

pub fn ensure_structure() -> Result<()> {
    for env in [
        DeploymentEnv::Dev,
        DeploymentEnv::Test,
        DeploymentEnv::Local,
    ] {
        let _ = ensure_store(env)?;
    }
    Ok(())
}

fn ensure_store(env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = Path::new(DEPLOYMENTS_ROOT).join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!(".deployments/{} could not be created", env.dir_name())
        })?;
    }
    Ok(env_dir.join(CONTRACTS_FILE))
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path).wrap_err("Failed to read deployment record")?;
    if data.is_empty() || data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let record = serde_json::from_slice::<DeploymentRecord>(&data)
        .map_err(|err| eyre!("Failed to parse deployment record JSON: {err}"))?;
    Ok(Some(record))
}

fn write_record(path: impl AsRef<Path>, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .wrap_err("Failed to serialize deployment record")?;
    fs::write(path.as_ref(), json).wrap_err("Failed to write deployment record")?;
    Ok(())
}

pub fn record_deployment(
    env: DeploymentEnv,
    network_url: impl AsRef<str>,
    contracts: Vec<StoredBinding>,
) -> Result<()> {
    let store = DeploymentStore::new(env)?;
    let record = DeploymentRecord {
        recorded_at: Utc::now().to_rfc3339(),
        network_url: network_url.as_ref().to_string(),
        contracts,
    };
    store.save(&record)
}

/// Build the seed the config store starts from: every name sentinel, the
/// registry's fixed interface filled in, and whatever the stored record
/// resolves layered on top. Entries that fail validation are logged and left
/// at their defaults, the same rule a bad registry entry gets at runtime.
pub fn seed_bindings(record: Option<&DeploymentRecord>) -> Vec<ContractBinding> {
    let mut seed: Vec<ContractBinding> = ContractName::ALL
        .iter()
        .map(|name| match name {
            ContractName::ContractRegistry => {
                ContractBinding::new(*name, Address::ZERO, registry_abi(), None)
            }
            _ => ContractBinding::sentinel(*name),
        })
        .collect();

    let Some(record) = record else {
        return seed;
    };

    for stored in &record.contracts {
        let Ok(name) = ContractName::from_str(&stored.name) else {
            warn!(name = %stored.name, "deployment record names an unknown contract");
            continue;
        };
        let address = match parse_address(&stored.address) {
            Ok(address) => address,
            Err(err) => {
                warn!(contract = %name, error = %err, "deployment record address rejected");
                continue;
            }
        };
        let (abi, abi_hash) = match &stored.abi {
            Some(value) => match serde_json::from_value::<JsonAbi>(value.clone())
            {
                Ok(abi) => {
                    let hash = abi_fingerprint(&value.to_string());
                    (abi, Some(hash))
                }
                Err(err) => {
                    warn!(contract = %name, error = %err, "deployment record ABI rejected");
                    continue;
                }
            },
            // The registry resolves through its built-in interface;
            // everything else waits for the first refresh.
            None if name == ContractName::ContractRegistry => {
                (registry_abi(), None)
            }
            None => (JsonAbi::default(), None),
        };
        if let Some(slot) = seed.iter_mut().find(|binding| binding.name == name) {
            *slot = ContractBinding::new(name, address, abi, abi_hash);
        }
    }

    seed
}
