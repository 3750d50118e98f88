pub mod assets;
pub mod binder;
pub mod chain;
pub mod config;
pub mod deployment;
pub mod dispatch;
pub mod prices;
pub mod queries;
pub mod registry;
pub mod wallets;

pub mod test_helpers;

pub use crate::{
    assets::{
        Action,
        Asset,
        Game,
        Subject,
    },
    binder::ContractBinder,
    chain::{
        ChainClient,
        RpcChainClient,
    },
    config::{
        ConfigSnapshot,
        ConfigStore,
        ContractBinding,
        ContractName,
    },
    dispatch::{
        ActionDispatcher,
        DispatchContext,
        DispatchOutcome,
    },
    registry::{
        RegistryPoller,
        RegistryResolver,
    },
};
