use crate::{
    chain::{
        ChainClient,
        ChainError,
    },
    config::{
        ConfigStore,
        ContractName,
    },
};
use alloy::{
    dyn_abi::{
        DynSolValue,
        FunctionExt,
        JsonAbiExt,
    },
    json_abi::{
        Function,
        JsonAbi,
    },
    primitives::{
        Address,
        Bytes,
        TxHash,
        U256,
    },
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindError {
    /// The name is known but still bound to the sentinel address (or an
    /// empty ABI); nothing has been deployed or resolved for it yet.
    #[error("contract '{0}' has no resolved deployment yet")]
    Unresolved(ContractName),
    #[error("contract '{contract}' ABI exposes no function '{method}'")]
    MissingFunction {
        contract: ContractName,
        method: String,
    },
    #[error("encoding arguments for {contract}.{method} failed: {source}")]
    Encode {
        contract: ContractName,
        method: String,
        source: alloy::dyn_abi::Error,
    },
    #[error("decoding output of {contract}.{method} failed: {source}")]
    Decode {
        contract: ContractName,
        method: String,
        source: alloy::dyn_abi::Error,
    },
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Resolves symbolic names against the current snapshot. Cheap to clone;
/// every consumer gets one.
#[derive(Clone)]
pub struct ContractBinder {
    store: Arc<ConfigStore>,
    client: Arc<dyn ChainClient>,
}

impl ContractBinder {
    pub fn new(store: Arc<ConfigStore>, client: Arc<dyn ChainClient>) -> Self {
        Self { store, client }
    }

    pub fn client(&self) -> Arc<dyn ChainClient> {
        self.client.clone()
    }

    /// Bind `name` to the exact (address, ABI) pair in the snapshot current
    /// right now. The handle keeps that pair for its whole lifetime, so a
    /// registry refresh mid-dispatch never switches a call under the caller.
    pub fn bind(&self, name: ContractName) -> Result<BoundContract, BindError> {
        let snapshot = self.store.current();
        let binding = snapshot
            .binding(name)
            .filter(|binding| binding.is_resolved())
            .ok_or(BindError::Unresolved(name))?;
        Ok(BoundContract {
            name,
            address: binding.address,
            abi: binding.abi.clone(),
            client: self.client.clone(),
        })
    }
}

/// A callable handle pinned to one address + ABI pair.
#[derive(Clone)]
pub struct BoundContract {
    name: ContractName,
    address: Address,
    abi: Arc<JsonAbi>,
    client: Arc<dyn ChainClient>,
}

impl BoundContract {
    pub fn name(&self) -> ContractName {
        self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn function(&self, method: &str) -> Result<&Function, BindError> {
        self.abi
            .functions()
            .find(|function| function.name == method)
            .ok_or_else(|| BindError::MissingFunction {
                contract: self.name,
                method: method.to_string(),
            })
    }

    /// Selector-prefixed calldata for `method(args)`.
    pub fn encode(
        &self,
        method: &str,
        args: &[DynSolValue],
    ) -> Result<Bytes, BindError> {
        let function = self.function(method)?;
        let calldata =
            function
                .abi_encode_input(args)
                .map_err(|source| BindError::Encode {
                    contract: self.name,
                    method: method.to_string(),
                    source,
                })?;
        Ok(calldata.into())
    }

    /// Read-only invocation, decoded against the function's output types.
    pub async fn call(
        &self,
        method: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, BindError> {
        let calldata = self.encode(method, args)?;
        let raw = self.client.call(self.address, calldata).await?;
        let function = self.function(method)?;
        function
            .abi_decode_output(&raw)
            .map_err(|source| BindError::Decode {
                contract: self.name,
                method: method.to_string(),
                source,
            })
    }

    /// Signed state-changing invocation.
    pub async fn send(
        &self,
        method: &str,
        args: &[DynSolValue],
        value: U256,
    ) -> Result<TxHash, BindError> {
        let calldata = self.encode(method, args)?;
        let tx_hash = self.client.send(self.address, calldata, value).await?;
        Ok(tx_hash)
    }
}
