use crate::{
    binder::{
        BindError,
        BoundContract,
        ContractBinder,
    },
    chain::{
        ChainClient,
        parse_address,
    },
    config::{
        ConfigStore,
        ContractBinding,
        ContractName,
    },
};
use alloy::{
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    primitives::Address,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

/// How often the registry is re-read unless the caller overrides it.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// The registry's interface is fixed: name in, address or ABI JSON out.
pub const REGISTRY_ABI_JSON: &str = r#"[
  {
    "type": "function",
    "name": "getAddress",
    "stateMutability": "view",
    "inputs": [{ "name": "name", "type": "string" }],
    "outputs": [{ "name": "", "type": "address" }]
  },
  {
    "type": "function",
    "name": "getAbi",
    "stateMutability": "view",
    "inputs": [{ "name": "name", "type": "string" }],
    "outputs": [{ "name": "", "type": "string" }]
  }
]"#;

pub fn registry_abi() -> JsonAbi {
    serde_json::from_str(REGISTRY_ABI_JSON)
        .expect("built-in registry ABI is valid JSON")
}

pub fn abi_fingerprint(abi_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(abi_json.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry contract is not bound yet; seed its address first")]
    RegistryUnbound,
    #[error("registry unreachable: {0}")]
    Unreachable(#[from] BindError),
}

/// What one refresh cycle did. Skips carry the reason so the log line tells
/// the operator which registry entries are bad.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub accepted: Vec<ContractName>,
    pub skipped: Vec<(ContractName, String)>,
    pub unchanged: usize,
    /// Names the registry has no entry for at all.
    pub absent: usize,
}

/// Keeps the config store close to the on-chain registry. One resolver per
/// store; refreshes never overlap because the poller awaits each one.
pub struct RegistryResolver {
    store: Arc<ConfigStore>,
    binder: ContractBinder,
}

impl RegistryResolver {
    pub fn new(store: Arc<ConfigStore>, client: Arc<dyn ChainClient>) -> Self {
        let binder = ContractBinder::new(store.clone(), client);
        Self { store, binder }
    }

    /// One full pass over every resolvable name. Bad entries are skipped
    /// with their prior binding retained; accepted entries are published as
    /// a single atomic update. A registry that cannot be reached at all
    /// leaves the store untouched.
    pub async fn refresh(&self) -> Result<RefreshReport, RegistryError> {
        let registry = self
            .binder
            .bind(ContractName::ContractRegistry)
            .map_err(|_| RegistryError::RegistryUnbound)?;

        let current = self.store.current();
        let mut report = RefreshReport::default();
        let mut update = Vec::new();

        for name in ContractName::resolvable() {
            let prior = current
                .binding(name)
                .cloned()
                .unwrap_or_else(|| ContractBinding::sentinel(name));

            let candidate = match self.resolve_one(&registry, name, &prior).await
            {
                Ok(Resolution::Updated(binding)) => binding,
                Ok(Resolution::Unchanged) => {
                    report.unchanged += 1;
                    continue;
                }
                Ok(Resolution::Absent) => {
                    report.absent += 1;
                    continue;
                }
                Err(ResolveSkip::Entry(reason)) => {
                    debug!(contract = %name, %reason, "registry entry skipped");
                    report.skipped.push((name, reason));
                    continue;
                }
                Err(ResolveSkip::Fatal(err)) => {
                    return Err(RegistryError::Unreachable(err));
                }
            };

            update.push(candidate);
            report.accepted.push(name);
        }

        if !update.is_empty() {
            self.store.publish(update);
        }
        Ok(report)
    }

    /// Resolve a single name against the registry.
    async fn resolve_one(
        &self,
        registry: &BoundContract,
        name: ContractName,
        prior: &ContractBinding,
    ) -> Result<Resolution, ResolveSkip> {
        let name_arg = [DynSolValue::String(name.as_str().to_string())];

        let abi_blob = registry
            .call("getAbi", &name_arg)
            .await
            .map_err(ResolveSkip::from_bind)?;
        let abi_json = match abi_blob.first() {
            Some(DynSolValue::String(json)) => json.clone(),
            other => {
                return Err(ResolveSkip::Entry(format!(
                    "getAbi returned unexpected shape: {other:?}"
                )));
            }
        };
        // The registry answers names it has no entry for with an empty blob;
        // that is not an error, just nothing to merge.
        if abi_json.trim().is_empty() {
            return Ok(Resolution::Absent);
        }
        // A registry entry with a broken ABI must never overwrite a working
        // binding; drop the whole entry and keep what we have.
        let abi: JsonAbi = match serde_json::from_str(&abi_json) {
            Ok(abi) => abi,
            Err(err) => {
                return Err(ResolveSkip::Entry(format!("malformed ABI: {err}")));
            }
        };
        if abi.functions.is_empty() {
            return Err(ResolveSkip::Entry(
                "ABI parses but declares no functions".to_string(),
            ));
        }

        let addr_out = registry
            .call("getAddress", &name_arg)
            .await
            .map_err(ResolveSkip::from_bind)?;
        let address = match addr_out.first() {
            Some(DynSolValue::Address(address)) => *address,
            other => {
                return Err(ResolveSkip::Entry(format!(
                    "getAddress returned unexpected shape: {other:?}"
                )));
            }
        };
        // Never downgrade to the sentinel: an unresolved or garbled address
        // keeps the previously bound one.
        let address = accept_address(address).unwrap_or(prior.address);

        let abi_hash = abi_fingerprint(&abi_json);
        if address == prior.address && prior.abi_hash.as_deref() == Some(&abi_hash)
        {
            return Ok(Resolution::Unchanged);
        }

        Ok(Resolution::Updated(ContractBinding::new(
            name,
            address,
            abi,
            Some(abi_hash),
        )))
    }
}

enum Resolution {
    Updated(ContractBinding),
    Unchanged,
    Absent,
}

fn accept_address(address: Address) -> Option<Address> {
    if address.is_zero() {
        return None;
    }
    // Round-trip through the textual form so a registry serving garbage
    // bytes is caught by the same rule as user input.
    parse_address(&address.to_string()).ok()
}

enum ResolveSkip {
    /// This entry is bad; retain the prior binding and move on.
    Entry(String),
    /// The registry itself is unreachable; abort the whole refresh.
    Fatal(BindError),
}

impl ResolveSkip {
    fn from_bind(err: BindError) -> Self {
        match &err {
            BindError::Chain(chain) if chain.is_transport() => {
                ResolveSkip::Fatal(err)
            }
            _ => ResolveSkip::Entry(err.to_string()),
        }
    }
}

/// The scheduled half of the resolver: refresh immediately on spawn, then on
/// every tick, serialized. `stop` shuts the task down cleanly.
pub struct RegistryPoller {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RegistryPoller {
    pub fn spawn(resolver: RegistryResolver, period: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            // A refresh slower than the period must not cause a burst of
            // back-to-back polls afterwards.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match resolver.refresh().await {
                            Ok(report) => {
                                if !report.accepted.is_empty() {
                                    info!(
                                        accepted = report.accepted.len(),
                                        skipped = report.skipped.len(),
                                        unchanged = report.unchanged,
                                        "registry refresh applied"
                                    );
                                }
                                for (name, reason) in &report.skipped {
                                    warn!(contract = %name, %reason, "retaining previous binding");
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "registry refresh failed; keeping last known config");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
        Self { shutdown, handle }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn registry_abi__declares_both_lookup_functions() {
        let abi = registry_abi();
        assert!(abi.functions().any(|f| f.name == "getAddress"));
        assert!(abi.functions().any(|f| f.name == "getAbi"));
    }

    #[test]
    fn abi_fingerprint__is_stable_and_input_sensitive() {
        let a = abi_fingerprint("[]");
        let b = abi_fingerprint("[]");
        let c = abi_fingerprint("[{}]");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn accept_address__filters_the_sentinel() {
        assert_eq!(accept_address(Address::ZERO), None);
        let real = Address::repeat_byte(0x11);
        assert_eq!(accept_address(real), Some(real));
    }
}
