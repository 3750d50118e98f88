use crate::chain::{
    ChainClient,
    ChainError,
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
        I256,
        utils::format_units,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Mainnet aggregator addresses for the pairs the dashboard shows.
pub const PRICE_FEEDS: [(&str, &str); 5] = [
    ("ETH/USD", "0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419"),
    ("BTC/USD", "0xF4030086522a5bEEa4988F8cA5B36dbC97BeE88c"),
    ("LINK/USD", "0x2c1d072e956AFFC0D435Cb7AC38EF18d24d9127c"),
    ("USDC/USD", "0x8fFfFfd4AfB6115b954Bd326cbe7B4BA576818f6"),
    ("USDT/USD", "0x3E7d1eAB13ad0104d2750B8863b489D65364e32D"),
];

/// Minimal aggregator surface: the latest round and the feed's precision.
const AGGREGATOR_ABI_JSON: &str = r#"[
  {
    "inputs": [],
    "name": "latestRoundData",
    "outputs": [
      { "internalType": "uint80", "name": "roundId", "type": "uint80" },
      { "internalType": "int256", "name": "answer", "type": "int256" },
      { "internalType": "uint256", "name": "startedAt", "type": "uint256" },
      { "internalType": "uint256", "name": "updatedAt", "type": "uint256" },
      { "internalType": "uint80", "name": "answeredInRound", "type": "uint80" }
    ],
    "stateMutability": "view",
    "type": "function"
  },
  {
    "inputs": [],
    "name": "decimals",
    "outputs": [{ "internalType": "uint8", "name": "", "type": "uint8" }],
    "stateMutability": "view",
    "type": "function"
  }
]"#;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("no price feed configured for '{0}'")]
    UnknownPair(String),
    #[error("feed response for {what} had an unexpected shape")]
    BadShape { what: String },
    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairPrice {
    pub pair: String,
    /// Formatted at the feed's own precision, e.g. "3421.55000000".
    pub price: String,
    pub round_id: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub decimals: u8,
}

struct Feed {
    pair: &'static str,
    address: Address,
}

/// Oracle price reads against the fixed feed table. Independent of the
/// registry: aggregator addresses are pinned, not resolved.
pub struct PriceFetcher {
    client: Arc<dyn ChainClient>,
    abi: Arc<JsonAbi>,
    feeds: Vec<Feed>,
}

impl PriceFetcher {
    pub fn mainnet(client: Arc<dyn ChainClient>) -> Self {
        let abi: JsonAbi = serde_json::from_str(AGGREGATOR_ABI_JSON)
            .expect("built-in aggregator ABI is valid JSON");
        let feeds = PRICE_FEEDS
            .iter()
            .map(|(pair, address)| Feed {
                pair,
                address: address
                    .parse()
                    .expect("built-in feed addresses are well-formed"),
            })
            .collect();
        Self {
            client,
            abi: Arc::new(abi),
            feeds,
        }
    }

    fn function(&self, name: &str) -> &Function {
        self.abi
            .functions()
            .find(|function| function.name == name)
            .expect("aggregator ABI declares its functions")
    }

    async fn read(
        &self,
        address: Address,
        name: &str,
    ) -> Result<Vec<DynSolValue>, PriceError> {
        let function = self.function(name);
        let calldata = function
            .abi_encode_input(&[])
            .expect("argument-less call encodes");
        let raw = self.client.call(address, calldata.into()).await?;
        function
            .abi_decode_output(&raw)
            .map_err(|_| PriceError::BadShape {
                what: name.to_string(),
            })
    }

    pub async fn latest(&self, pair: &str) -> Result<PairPrice, PriceError> {
        let feed = self
            .feeds
            .iter()
            .find(|feed| feed.pair.eq_ignore_ascii_case(pair))
            .ok_or_else(|| PriceError::UnknownPair(pair.to_string()))?;

        let round = self.read(feed.address, "latestRoundData").await?;
        let decimals_out = self.read(feed.address, "decimals").await?;

        let bad_shape = || PriceError::BadShape {
            what: feed.pair.to_string(),
        };
        let (round_id, _) =
            round.first().and_then(DynSolValue::as_uint).ok_or_else(bad_shape)?;
        let (answer, _) =
            round.get(1).and_then(DynSolValue::as_int).ok_or_else(bad_shape)?;
        let (updated_at, _) =
            round.get(3).and_then(DynSolValue::as_uint).ok_or_else(bad_shape)?;
        let (decimals, _) = decimals_out
            .first()
            .and_then(DynSolValue::as_uint)
            .ok_or_else(bad_shape)?;

        let decimals = u8::try_from(decimals).unwrap_or(u8::MAX);
        let price = format_price(answer, decimals);
        let updated_at = i64::try_from(updated_at)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Ok(PairPrice {
            pair: feed.pair.to_string(),
            price,
            round_id: u64::try_from(round_id).unwrap_or(u64::MAX),
            updated_at,
            decimals,
        })
    }

    /// All configured pairs; a pair whose feed misbehaves comes back `None`
    /// instead of taking the rest down with it.
    pub async fn all(&self) -> Vec<(String, Option<PairPrice>)> {
        let reads = self.feeds.iter().map(|feed| self.latest(feed.pair));
        let results = join_all(reads).await;
        self.feeds
            .iter()
            .zip(results)
            .map(|(feed, result)| {
                let price = match result {
                    Ok(price) => Some(price),
                    Err(err) => {
                        warn!(pair = feed.pair, error = %err, "price read failed");
                        None
                    }
                };
                (feed.pair.to_string(), price)
            })
            .collect()
    }
}

fn format_price(answer: I256, decimals: u8) -> String {
    format_units(answer, decimals).unwrap_or_else(|_| answer.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn aggregator_abi__parses_and_declares_both_reads() {
        let abi: JsonAbi = serde_json::from_str(AGGREGATOR_ABI_JSON).unwrap();
        assert!(abi.functions().any(|f| f.name == "latestRoundData"));
        assert!(abi.functions().any(|f| f.name == "decimals"));
    }

    #[test]
    fn price_feed_table__addresses_are_well_formed() {
        for (_, address) in PRICE_FEEDS {
            assert!(address.parse::<Address>().is_ok(), "bad feed {address}");
        }
    }

    #[test]
    fn format_price__applies_feed_precision() {
        let answer = I256::try_from(342_155_000_000i64).unwrap();
        assert_eq!(format_price(answer, 8), "3421.55000000");
    }
}
