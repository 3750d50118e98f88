use alloy::{
    network::{
        EthereumWallet,
        TransactionBuilder,
    },
    primitives::{
        Address,
        Bytes,
        TxHash,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::{
        RpcError,
        TransportErrorKind,
    },
};
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TESTNET_RPC_URL: &str =
    "https://ethereum-sepolia-rpc.publicnode.com";
pub const DEFAULT_DEVNET_RPC_URL: &str =
    "https://ethereum-holesky-rpc.publicnode.com";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545/";

#[derive(Clone, Debug, Error)]
pub enum ChainError {
    /// The node accepted the request and rejected it (revert, bad call).
    #[error("{method} rejected: {message}")]
    Rejected { method: String, message: String },
    /// The node could not be reached or answered garbage.
    #[error("{method} transport failure: {message}")]
    Transport { method: String, message: String },
    #[error("no signing wallet configured")]
    NoSigner,
}

impl ChainError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ChainError::Transport { .. })
    }

    fn classify(method: &str, err: RpcError<TransportErrorKind>) -> Self {
        match err.as_error_resp() {
            Some(payload) => ChainError::Rejected {
                method: method.to_string(),
                message: payload.message.to_string(),
            },
            None => ChainError::Transport {
                method: method.to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// The one seam between the dashboard core and the chain. Read calls and
/// signed sends both go through it, so everything above is testable against
/// an in-memory fake.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The account whose wallet signs mutations; used as the implicit actor
    /// in argument shaping.
    fn sender(&self) -> Address;

    /// Read-only contract call (`eth_call`).
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Signed state-changing transaction. Resolves once the node accepted
    /// the transaction; confirmation is the caller's concern.
    async fn send(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> Result<TxHash, ChainError>;

    async fn native_balance(&self, account: Address) -> Result<U256, ChainError>;
}

/// JSON-RPC implementation over a single HTTP endpoint, optionally signing
/// with a locally unlocked key.
pub struct RpcChainClient {
    provider: DynProvider,
    sender: Address,
    can_sign: bool,
}

impl RpcChainClient {
    pub fn connect(url: &Url, signer: Option<PrivateKeySigner>) -> Self {
        match signer {
            Some(signer) => {
                let sender = signer.address();
                let provider = ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .connect_http(url.clone())
                    .erased();
                Self {
                    provider,
                    sender,
                    can_sign: true,
                }
            }
            None => {
                let provider =
                    ProviderBuilder::new().connect_http(url.clone()).erased();
                Self {
                    provider,
                    sender: Address::ZERO,
                    can_sign: false,
                }
            }
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx = TransactionRequest::default()
            .with_from(self.sender)
            .with_to(to)
            .with_input(data);
        self.provider
            .call(tx)
            .await
            .map_err(|err| ChainError::classify("eth_call", err))
    }

    async fn send(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> Result<TxHash, ChainError> {
        if !self.can_sign {
            return Err(ChainError::NoSigner);
        }
        let tx = TransactionRequest::default()
            .with_from(self.sender)
            .with_to(to)
            .with_input(data)
            .with_value(value);
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|err| ChainError::classify("eth_sendTransaction", err))?;
        Ok(*pending.tx_hash())
    }

    async fn native_balance(&self, account: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(account)
            .await
            .map_err(|err| ChainError::classify("eth_getBalance", err))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid address '{raw}': {reason}")]
pub struct AddressParseError {
    pub raw: String,
    pub reason: String,
}

/// Parse a user- or registry-supplied address. Mixed-case input must carry a
/// valid EIP-55 checksum; single-case input only has to be well-formed hex.
pub fn parse_address(raw: &str) -> Result<Address, AddressParseError> {
    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let parsed = if has_upper && has_lower {
        Address::parse_checksummed(trimmed, None)
            .map_err(|err| (trimmed, err.to_string()))
    } else {
        trimmed
            .parse::<Address>()
            .map_err(|err| (trimmed, err.to_string()))
    };
    parsed.map_err(|(raw, reason)| AddressParseError {
        raw: raw.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn parse_address__accepts_lowercase_hex() {
        let parsed =
            parse_address("0x52908400098527886e0f7030069857d2e4169ee7").unwrap();
        assert!(!parsed.is_zero());
    }

    #[test]
    fn parse_address__accepts_valid_checksums() {
        assert!(
            parse_address("0x52908400098527886E0F7030069857D2E4169EE7").is_ok()
        );
        assert!(
            parse_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_ok()
        );
    }

    #[test]
    fn parse_address__rejects_broken_checksums_and_garbage() {
        // same address with one letter's case flipped
        assert!(
            parse_address("0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_err()
        );
        assert!(parse_address("not-an-address").is_err());
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn chain_error__transport_is_distinguishable() {
        let transport = ChainError::Transport {
            method: "eth_call".into(),
            message: "connection refused".into(),
        };
        let rejected = ChainError::Rejected {
            method: "eth_call".into(),
            message: "execution reverted".into(),
        };
        assert!(transport.is_transport());
        assert!(!rejected.is_transport());
    }
}
