use crate::{
    assets::{
        Asset,
        DEFAULT_DECIMALS,
    },
    binder::{
        BindError,
        ContractBinder,
    },
    config::ContractName,
};
use alloy::{
    dyn_abi::DynSolValue,
    primitives::{
        Address,
        TxHash,
        U256,
        utils::format_units,
    },
};
use thiserror::Error;
use tracing::warn;

/// Monthly shield premium, in whole units of the insurance token.
const INSURANCE_PREMIUM_UNITS: u64 = 6;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("a device id is required")]
    EmptyDeviceId,
    #[error(transparent)]
    Bind(#[from] BindError),
}

/// Per-asset holdings as the interoperability bridge reports them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BalanceSheet {
    entries: Vec<(Asset, U256)>,
}

impl BalanceSheet {
    pub fn raw(&self, asset: Asset) -> U256 {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == asset)
            .map(|(_, amount)| *amount)
            .unwrap_or(U256::ZERO)
    }

    /// Human-readable amount at the standard token precision.
    pub fn display(&self, asset: Asset) -> String {
        format_units(self.raw(asset), DEFAULT_DECIMALS)
            .unwrap_or_else(|_| "0".to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Asset, U256)> + '_ {
        self.entries.iter().copied()
    }
}

/// Read-only projection of every asset balance for one account. All reads
/// in one pass go through a single bound handle, so the whole sheet comes
/// off one consistent binding.
#[derive(Clone)]
pub struct BalanceFetcher {
    binder: ContractBinder,
}

impl BalanceFetcher {
    pub fn new(binder: ContractBinder) -> Self {
        Self { binder }
    }

    pub async fn fetch_all(&self, account: Address) -> Result<BalanceSheet, BindError> {
        let bridge = self
            .binder
            .bind(ContractName::InstilledInteroperability)?;
        let mut entries = Vec::with_capacity(Asset::ALL.len());
        for asset in Asset::ALL {
            let args = [
                DynSolValue::Address(account),
                DynSolValue::String(asset.symbol().to_string()),
            ];
            // One failed asset must not blank the whole dashboard.
            let amount = match bridge.call("activeBalances", &args).await {
                Ok(values) => match values.first().and_then(DynSolValue::as_uint)
                {
                    Some((amount, _)) => amount,
                    None => {
                        warn!(%asset, "activeBalances returned a non-numeric value");
                        U256::ZERO
                    }
                },
                Err(err) => {
                    warn!(%asset, error = %err, "balance read failed; showing zero");
                    U256::ZERO
                }
            };
            entries.push((asset, amount));
        }
        Ok(BalanceSheet { entries })
    }
}

/// A registered device as DeviceConnect reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub device_id: String,
    pub battery_capacity: u64,
    pub is_insured: bool,
}

/// Device roster reads plus the handful of device mutations (registration,
/// connection, shield toggling).
#[derive(Clone)]
pub struct DeviceFetcher {
    binder: ContractBinder,
}

impl DeviceFetcher {
    pub fn new(binder: ContractBinder) -> Self {
        Self { binder }
    }

    pub async fn fetch(&self, account: Address) -> Result<Vec<Device>, BindError> {
        let connect = self.binder.bind(ContractName::DeviceConnect)?;
        let raw = connect
            .call("getUserDevices", &[DynSolValue::Address(account)])
            .await?;
        let mut devices = Vec::new();
        let Some(DynSolValue::Array(items)) = raw.into_iter().next() else {
            return Ok(devices);
        };
        for item in items {
            match decode_device(&item) {
                Some(device) => devices.push(device),
                None => warn!("skipping device entry with unexpected shape"),
            }
        }
        Ok(devices)
    }

    pub async fn add_device(&self, device_id: &str) -> Result<TxHash, QueryError> {
        let device_id = non_empty_id(device_id)?;
        let connect = self.binder.bind(ContractName::DeviceConnect)?;
        let tx_hash = connect
            .send(
                "addDevice",
                &[DynSolValue::String(device_id)],
                U256::ZERO,
            )
            .await?;
        Ok(tx_hash)
    }

    pub async fn connect_device(
        &self,
        device_id: &str,
    ) -> Result<TxHash, QueryError> {
        let device_id = non_empty_id(device_id)?;
        let connect = self.binder.bind(ContractName::DeviceConnect)?;
        let tx_hash = connect
            .send(
                "connectDevice",
                &[DynSolValue::String(device_id)],
                U256::ZERO,
            )
            .await?;
        Ok(tx_hash)
    }

    /// Toggle the insurance shield for one device. Enabling subscribes at
    /// the flat premium; disabling deactivates the shield.
    pub async fn set_insurance(
        &self,
        device_id: &str,
        enable: bool,
    ) -> Result<TxHash, QueryError> {
        let device_id = non_empty_id(device_id)?;
        let insurance = self.binder.bind(ContractName::ZeropointInsurance)?;
        let tx_hash = if enable {
            let premium = U256::from(INSURANCE_PREMIUM_UNITS)
                * U256::from(10).pow(U256::from(DEFAULT_DECIMALS));
            insurance
                .send(
                    "subscribe",
                    &[
                        DynSolValue::String(device_id),
                        DynSolValue::Uint(premium, 256),
                    ],
                    U256::ZERO,
                )
                .await?
        } else {
            insurance
                .send(
                    "deactivateShield",
                    &[DynSolValue::String(device_id)],
                    U256::ZERO,
                )
                .await?
        };
        Ok(tx_hash)
    }
}

fn non_empty_id(device_id: &str) -> Result<String, QueryError> {
    let trimmed = device_id.trim();
    if trimmed.is_empty() {
        return Err(QueryError::EmptyDeviceId);
    }
    Ok(trimmed.to_string())
}

fn decode_device(value: &DynSolValue) -> Option<Device> {
    let DynSolValue::Tuple(fields) = value else {
        return None;
    };
    let device_id = fields.first()?.as_str()?.to_string();
    let (battery, _) = fields.get(1)?.as_uint()?;
    let is_insured = fields.get(2)?.as_bool()?;
    Some(Device {
        device_id,
        battery_capacity: u64::try_from(battery).unwrap_or(u64::MAX),
        is_insured,
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn decode_device__reads_the_roster_tuple() {
        let value = DynSolValue::Tuple(vec![
            DynSolValue::String("handheld-01".to_string()),
            DynSolValue::Uint(U256::from(87u64), 256),
            DynSolValue::Bool(true),
        ]);
        let device = decode_device(&value).unwrap();
        assert_eq!(device.device_id, "handheld-01");
        assert_eq!(device.battery_capacity, 87);
        assert!(device.is_insured);
    }

    #[test]
    fn decode_device__rejects_malformed_entries() {
        assert!(decode_device(&DynSolValue::Bool(true)).is_none());
        let missing_field = DynSolValue::Tuple(vec![DynSolValue::String(
            "handheld-01".to_string(),
        )]);
        assert!(decode_device(&missing_field).is_none());
    }

    #[test]
    fn balance_sheet__unknown_assets_read_as_zero() {
        let sheet = BalanceSheet {
            entries: vec![(Asset::Goate, U256::from(5u64))],
        };
        assert_eq!(sheet.raw(Asset::Goate), U256::from(5u64));
        assert_eq!(sheet.raw(Asset::Btc), U256::ZERO);
    }
}
