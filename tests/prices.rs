#![allow(non_snake_case)]

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{
        Address,
        I256,
        U256,
        keccak256,
    },
};
use goate_dashboard::{
    chain::ChainError,
    prices::{
        PRICE_FEEDS,
        PriceFetcher,
    },
    test_helpers::{
        FakeChainClient,
        encode_return,
    },
};
use std::sync::Arc;

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Answers every aggregator with the same round, except the USDC feed which
/// is down.
fn feed_handler() -> Box<
    dyn Fn(Address, &[u8]) -> Result<alloy::primitives::Bytes, ChainError>
        + Send
        + Sync,
> {
    let usdc: Address = PRICE_FEEDS
        .iter()
        .find(|(pair, _)| *pair == "USDC/USD")
        .unwrap()
        .1
        .parse()
        .unwrap();
    let latest_round_data = selector("latestRoundData()");
    let decimals = selector("decimals()");
    Box::new(move |to, data| {
        if to == usdc {
            return Err(ChainError::Transport {
                method: "eth_call".into(),
                message: "connection refused".into(),
            });
        }
        if data.starts_with(&latest_round_data) {
            return Ok(encode_return(&[
                DynSolValue::Uint(U256::from(1_000u64), 80),
                DynSolValue::Int(I256::try_from(342_155_000_000i64).unwrap(), 256),
                DynSolValue::Uint(U256::from(1_700_000_000u64), 256),
                DynSolValue::Uint(U256::from(1_700_000_100u64), 256),
                DynSolValue::Uint(U256::from(1_000u64), 80),
            ]));
        }
        if data.starts_with(&decimals) {
            return Ok(encode_return(&[DynSolValue::Uint(U256::from(8u64), 8)]));
        }
        Err(ChainError::Rejected {
            method: "eth_call".into(),
            message: "unknown selector".into(),
        })
    })
}

#[tokio::test]
async fn latest__formats_the_answer_at_feed_precision() {
    let client = Arc::new(FakeChainClient::new(feed_handler()));
    let fetcher = PriceFetcher::mainnet(client);

    let price = fetcher.latest("ETH/USD").await.unwrap();

    assert_eq!(price.pair, "ETH/USD");
    assert_eq!(price.price, "3421.55000000");
    assert_eq!(price.decimals, 8);
    assert_eq!(price.round_id, 1_000);
    assert!(price.updated_at.is_some());
}

#[tokio::test]
async fn latest__unknown_pair_is_an_error() {
    let client = Arc::new(FakeChainClient::new(feed_handler()));
    let fetcher = PriceFetcher::mainnet(client);

    assert!(fetcher.latest("DOGE/USD").await.is_err());
}

#[tokio::test]
async fn all__isolates_a_dead_feed_from_the_rest() {
    let client = Arc::new(FakeChainClient::new(feed_handler()));
    let fetcher = PriceFetcher::mainnet(client);

    let prices = fetcher.all().await;

    assert_eq!(prices.len(), PRICE_FEEDS.len());
    for (pair, price) in prices {
        if pair == "USDC/USD" {
            assert!(price.is_none());
        } else {
            assert!(price.is_some(), "expected a price for {pair}");
        }
    }
}
