//! In-memory stand-ins for the chain so the resolution and dispatch paths
//! can be exercised without a node.

use crate::{
    chain::{
        ChainClient,
        ChainError,
    },
    config::{
        ConfigStore,
        ContractBinding,
        ContractName,
    },
    registry::registry_abi,
};
use alloy::{
    dyn_abi::{
        DynSolValue,
        JsonAbiExt,
    },
    json_abi::JsonAbi,
    primitives::{
        Address,
        Bytes,
        TxHash,
        U256,
        keccak256,
    },
};
use async_trait::async_trait;
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

pub type CallHandler =
    Box<dyn Fn(Address, &[u8]) -> Result<Bytes, ChainError> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct SentTransaction {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Chain client double: read calls are answered by a programmable handler,
/// sends are recorded and answered with a deterministic hash.
pub struct FakeChainClient {
    sender: Address,
    handler: CallHandler,
    calls: Mutex<Vec<(Address, Bytes)>>,
    sent: Mutex<Vec<SentTransaction>>,
    next_send_failure: Mutex<Option<ChainError>>,
}

impl FakeChainClient {
    pub const DEFAULT_SENDER: Address = Address::repeat_byte(0x42);

    pub fn new(handler: CallHandler) -> Self {
        Self {
            sender: Self::DEFAULT_SENDER,
            handler,
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            next_send_failure: Mutex::new(None),
        }
    }

    /// Every read call fails as if the endpoint were down.
    pub fn unreachable() -> Self {
        Self::new(Box::new(|_, _| {
            Err(ChainError::Transport {
                method: "eth_call".to_string(),
                message: "connection refused".to_string(),
            })
        }))
    }

    /// Every read call reverts at the node.
    pub fn rejecting(message: &str) -> Self {
        let message = message.to_string();
        Self::new(Box::new(move |_, _| {
            Err(ChainError::Rejected {
                method: "eth_call".to_string(),
                message: message.clone(),
            })
        }))
    }

    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = sender;
        self
    }

    /// Make the next send fail with `err`; later sends succeed again.
    pub fn fail_next_send(&self, err: ChainError) {
        *self.next_send_failure.lock().unwrap() = Some(err);
    }

    pub fn recorded_calls(&self) -> Vec<(Address, Bytes)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent_transactions(&self) -> Vec<SentTransaction> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.calls.lock().unwrap().push((to, data.clone()));
        (self.handler)(to, &data)
    }

    async fn send(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> Result<TxHash, ChainError> {
        if let Some(err) = self.next_send_failure.lock().unwrap().take() {
            return Err(err);
        }
        let mut sent = self.sent.lock().unwrap();
        let mut preimage = Vec::from(to.as_slice());
        preimage.extend_from_slice(&data);
        preimage.push(sent.len() as u8);
        let tx_hash = keccak256(&preimage);
        sent.push(SentTransaction { to, data, value });
        Ok(tx_hash)
    }

    async fn native_balance(&self, _account: Address) -> Result<U256, ChainError> {
        Ok(U256::ZERO)
    }
}

/// ABI-encode values the way a contract returns them.
pub fn encode_return(values: &[DynSolValue]) -> Bytes {
    DynSolValue::Tuple(values.to_vec()).abi_encode_params().into()
}

#[derive(Clone, Debug)]
pub struct RegistryEntry {
    pub address: Address,
    pub abi_json: String,
}

/// Scripted registry contract. Unknown names answer with the zero address
/// and an empty ABI blob, like an on-chain registry with no entry.
#[derive(Clone, Debug, Default)]
pub struct FakeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: ContractName,
        address: Address,
        abi_json: impl Into<String>,
    ) -> &mut Self {
        self.entries.insert(
            name.as_str().to_string(),
            RegistryEntry {
                address,
                abi_json: abi_json.into(),
            },
        );
        self
    }

    pub fn into_handler(self) -> CallHandler {
        let abi = registry_abi();
        let get_address = abi
            .functions()
            .find(|f| f.name == "getAddress")
            .expect("registry ABI has getAddress")
            .clone();
        let get_abi = abi
            .functions()
            .find(|f| f.name == "getAbi")
            .expect("registry ABI has getAbi")
            .clone();
        Box::new(move |_, data| {
            if data.len() < 4 {
                return Err(ChainError::Rejected {
                    method: "eth_call".to_string(),
                    message: "calldata too short".to_string(),
                });
            }
            let (selector, args) = data.split_at(4);
            let decode_name = |function: &alloy::json_abi::Function| {
                function
                    .abi_decode_input(args)
                    .ok()
                    .and_then(|values| {
                        values.first().and_then(|v| v.as_str().map(str::to_string))
                    })
            };
            if selector == get_address.selector().as_slice() {
                let name = decode_name(&get_address).unwrap_or_default();
                let address = self
                    .entries
                    .get(&name)
                    .map(|entry| entry.address)
                    .unwrap_or(Address::ZERO);
                return Ok(encode_return(&[DynSolValue::Address(address)]));
            }
            if selector == get_abi.selector().as_slice() {
                let name = decode_name(&get_abi).unwrap_or_default();
                let abi_json = self
                    .entries
                    .get(&name)
                    .map(|entry| entry.abi_json.clone())
                    .unwrap_or_default();
                return Ok(encode_return(&[DynSolValue::String(abi_json)]));
            }
            Err(ChainError::Rejected {
                method: "eth_call".to_string(),
                message: "unknown selector".to_string(),
            })
        })
    }
}

/// Store seeded like a fresh process: everything sentinel except the
/// registry, which is bound at `registry_address`.
pub fn seeded_store(registry_address: Address) -> Arc<ConfigStore> {
    let store = ConfigStore::empty();
    store.publish([ContractBinding::new(
        ContractName::ContractRegistry,
        registry_address,
        registry_abi(),
        None,
    )]);
    Arc::new(store)
}

pub fn resolved_binding(
    name: ContractName,
    address: Address,
    abi_json: &str,
) -> ContractBinding {
    let abi: JsonAbi =
        serde_json::from_str(abi_json).expect("fixture ABI parses");
    ContractBinding::new(name, address, abi, None)
}

/// Minimal ABI document for the given `(name, inputs, outputs)` functions.
pub fn abi_json(functions: &[(&str, &[&str], &[&str])]) -> String {
    let entries: Vec<serde_json::Value> = functions
        .iter()
        .map(|(name, inputs, outputs)| {
            let params = |types: &[&str]| {
                types
                    .iter()
                    .map(|ty| json!({ "name": "", "type": ty }))
                    .collect::<Vec<_>>()
            };
            json!({
                "type": "function",
                "name": name,
                "stateMutability": "nonpayable",
                "inputs": params(inputs),
                "outputs": params(outputs),
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

pub fn token_abi_json() -> String {
    abi_json(&[
        ("mint", &["address", "uint256"], &[]),
        ("burn", &["uint256"], &[]),
        ("transfer", &["address", "uint256"], &[]),
        ("updateBalance", &["address", "string", "uint256"], &[]),
        ("activeBalances", &["address", "string"], &["uint256"]),
    ])
}

pub fn staking_abi_json() -> String {
    abi_json(&[("stakeAsset", &["string", "uint256", "uint256"], &[])])
}

pub fn pair_staking_abi_json() -> String {
    abi_json(&[(
        "stakeTokens",
        &["string", "string", "uint256", "uint256", "uint256"],
        &[],
    )])
}

pub fn lending_abi_json() -> String {
    abi_json(&[("lend", &["uint256"], &[]), ("borrow", &["uint256"], &[])])
}

pub fn simple_game_abi_json() -> String {
    abi_json(&[("startGame", &[], &[])])
}

pub fn team_bets_abi_json() -> String {
    abi_json(&[(
        "placeBet",
        &["uint256", "uint256", "uint256", "bool"],
        &[],
    )])
}

pub fn board_game_abi_json() -> String {
    abi_json(&[("startGame", &["address[]", "uint256", "uint256[]"], &[])])
}

pub fn property_abi_json() -> String {
    abi_json(&[
        ("buyPropertyNFT", &["address", "uint256", "uint256"], &[]),
        ("sellPropertyNFT", &["address", "uint256", "bool"], &[]),
    ])
}

pub fn device_abi_json() -> String {
    // getUserDevices returns a tuple array, which needs explicit components
    // in the JSON ABI form.
    json!([
        {
            "type": "function",
            "name": "addDevice",
            "stateMutability": "nonpayable",
            "inputs": [{ "name": "", "type": "string" }],
            "outputs": []
        },
        {
            "type": "function",
            "name": "connectDevice",
            "stateMutability": "nonpayable",
            "inputs": [{ "name": "", "type": "string" }],
            "outputs": []
        },
        {
            "type": "function",
            "name": "getUserDevices",
            "stateMutability": "view",
            "inputs": [{ "name": "", "type": "address" }],
            "outputs": [{
                "name": "",
                "type": "tuple[]",
                "components": [
                    { "name": "deviceId", "type": "string" },
                    { "name": "batteryCapacity", "type": "uint256" },
                    { "name": "isInsured", "type": "bool" }
                ]
            }]
        }
    ])
    .to_string()
}

pub fn insurance_abi_json() -> String {
    abi_json(&[
        ("mint", &["address", "uint256"], &[]),
        ("subscribe", &["string", "uint256"], &[]),
        ("deactivateShield", &["string"], &[]),
    ])
}
