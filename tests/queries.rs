#![allow(non_snake_case)]

use alloy::{
    dyn_abi::{
        DynSolValue,
        JsonAbiExt,
    },
    json_abi::JsonAbi,
    primitives::{
        Address,
        U256,
    },
};
use goate_dashboard::{
    assets::Asset,
    binder::ContractBinder,
    chain::ChainError,
    config::{
        ConfigStore,
        ContractName,
    },
    queries::{
        BalanceFetcher,
        DeviceFetcher,
        QueryError,
    },
    test_helpers::{
        FakeChainClient,
        device_abi_json,
        encode_return,
        insurance_abi_json,
        resolved_binding,
        token_abi_json,
    },
};
use std::sync::Arc;

const BRIDGE_ADDR: Address = Address::repeat_byte(0x66);
const DEVICE_ADDR: Address = Address::repeat_byte(0x77);
const INSURANCE_ADDR: Address = Address::repeat_byte(0x88);

fn units_18(n: u64) -> U256 {
    U256::from(n) * U256::from(10).pow(U256::from(18))
}

fn binder_with(client: Arc<FakeChainClient>) -> ContractBinder {
    let store = Arc::new(ConfigStore::empty());
    store.publish([
        resolved_binding(
            ContractName::InstilledInteroperability,
            BRIDGE_ADDR,
            &token_abi_json(),
        ),
        resolved_binding(
            ContractName::DeviceConnect,
            DEVICE_ADDR,
            &device_abi_json(),
        ),
        resolved_binding(
            ContractName::ZeropointInsurance,
            INSURANCE_ADDR,
            &insurance_abi_json(),
        ),
    ]);
    ContractBinder::new(store, client)
}

/// Answers `activeBalances` with 7 units, except for BTC which reverts.
fn balance_handler() -> Box<
    dyn Fn(Address, &[u8]) -> Result<alloy::primitives::Bytes, ChainError>
        + Send
        + Sync,
> {
    let abi: JsonAbi = serde_json::from_str(&token_abi_json()).unwrap();
    let balances = abi
        .functions()
        .find(|f| f.name == "activeBalances")
        .unwrap()
        .clone();
    Box::new(move |_, data| {
        let asset = balances
            .abi_decode_input(&data[4..])
            .ok()
            .and_then(|values| {
                values.get(1).and_then(|v| v.as_str().map(str::to_string))
            })
            .unwrap_or_default();
        if asset == "BTC" {
            return Err(ChainError::Rejected {
                method: "eth_call".into(),
                message: "execution reverted".into(),
            });
        }
        Ok(encode_return(&[DynSolValue::Uint(units_18(7), 256)]))
    })
}

#[tokio::test]
async fn fetch_all__reads_every_asset_and_degrades_failures_to_zero() {
    let client = Arc::new(FakeChainClient::new(balance_handler()));
    let fetcher = BalanceFetcher::new(binder_with(client.clone()));

    let sheet = fetcher
        .fetch_all(FakeChainClient::DEFAULT_SENDER)
        .await
        .unwrap();

    // one read per asset, all against the bridge
    let calls = client.recorded_calls();
    assert_eq!(calls.len(), Asset::ALL.len());
    assert!(calls.iter().all(|(to, _)| *to == BRIDGE_ADDR));
    // the failed asset reads as zero, the rest carry the reported amount
    assert_eq!(sheet.raw(Asset::Btc), U256::ZERO);
    assert_eq!(sheet.raw(Asset::Goate), units_18(7));
    assert_eq!(sheet.display(Asset::Goate), "7.000000000000000000");
}

#[tokio::test]
async fn fetch__decodes_the_device_roster() {
    let roster = DynSolValue::Array(vec![
        DynSolValue::Tuple(vec![
            DynSolValue::String("handheld-01".into()),
            DynSolValue::Uint(U256::from(87u64), 256),
            DynSolValue::Bool(true),
        ]),
        DynSolValue::Tuple(vec![
            DynSolValue::String("vehicle-02".into()),
            DynSolValue::Uint(U256::from(54u64), 256),
            DynSolValue::Bool(false),
        ]),
    ]);
    let response = encode_return(&[roster]);
    let client = Arc::new(FakeChainClient::new(Box::new(move |_, _| {
        Ok(response.clone())
    })));
    let fetcher = DeviceFetcher::new(binder_with(client));

    let devices = fetcher
        .fetch(FakeChainClient::DEFAULT_SENDER)
        .await
        .unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].device_id, "handheld-01");
    assert_eq!(devices[0].battery_capacity, 87);
    assert!(devices[0].is_insured);
    assert_eq!(devices[1].device_id, "vehicle-02");
    assert!(!devices[1].is_insured);
}

#[tokio::test]
async fn add_device__rejects_a_blank_id_before_binding() {
    let client = Arc::new(FakeChainClient::new(Box::new(|_, _| {
        Ok(encode_return(&[]))
    })));
    let fetcher = DeviceFetcher::new(binder_with(client.clone()));

    let result = fetcher.add_device("   ").await;

    assert!(matches!(result, Err(QueryError::EmptyDeviceId)));
    assert!(client.sent_transactions().is_empty());
}

#[tokio::test]
async fn set_insurance__subscribes_at_the_flat_premium() {
    let client = Arc::new(FakeChainClient::new(Box::new(|_, _| {
        Ok(encode_return(&[]))
    })));
    let fetcher = DeviceFetcher::new(binder_with(client.clone()));

    fetcher.set_insurance("handheld-01", true).await.unwrap();

    let sent = client.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, INSURANCE_ADDR);
    let abi: JsonAbi = serde_json::from_str(&insurance_abi_json()).unwrap();
    let expected = abi
        .functions()
        .find(|f| f.name == "subscribe")
        .unwrap()
        .abi_encode_input(&[
            DynSolValue::String("handheld-01".into()),
            DynSolValue::Uint(units_18(6), 256),
        ])
        .unwrap();
    assert_eq!(sent[0].data.as_ref(), expected.as_slice());
}

#[tokio::test]
async fn set_insurance__deactivates_the_shield_when_disabled() {
    let client = Arc::new(FakeChainClient::new(Box::new(|_, _| {
        Ok(encode_return(&[]))
    })));
    let fetcher = DeviceFetcher::new(binder_with(client.clone()));

    fetcher.set_insurance("handheld-01", false).await.unwrap();

    let sent = client.sent_transactions();
    let abi: JsonAbi = serde_json::from_str(&insurance_abi_json()).unwrap();
    let expected = abi
        .functions()
        .find(|f| f.name == "deactivateShield")
        .unwrap()
        .abi_encode_input(&[DynSolValue::String("handheld-01".into())])
        .unwrap();
    assert_eq!(sent[0].data.as_ref(), expected.as_slice());
}
