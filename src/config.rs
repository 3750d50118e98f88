use alloy::{
    json_abi::JsonAbi,
    primitives::Address,
};
use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
    sync::{
        Arc,
        RwLock,
    },
};

/// Symbolic names of every deployed contract the dashboard talks to.
/// The registry itself is one of them; it is the only name the resolver
/// never tries to re-resolve.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ContractName {
    ContractRegistry,
    DeviceConnect,
    Zeropoint,
    ZeropointWifi,
    ZeropointPhoneService,
    ZeropointInsurance,
    TheGoateToken,
    GoateStaking,
    TokenPairStaking,
    P2pLendingAndBorrowing,
    InstilledInteroperability,
    CardWars,
    HomeTeamBets,
    GerastyxOpol,
    Spades,
    GerastyxPropertyNft,
}

impl ContractName {
    pub const ALL: [ContractName; 16] = [
        ContractName::ContractRegistry,
        ContractName::DeviceConnect,
        ContractName::Zeropoint,
        ContractName::ZeropointWifi,
        ContractName::ZeropointPhoneService,
        ContractName::ZeropointInsurance,
        ContractName::TheGoateToken,
        ContractName::GoateStaking,
        ContractName::TokenPairStaking,
        ContractName::P2pLendingAndBorrowing,
        ContractName::InstilledInteroperability,
        ContractName::CardWars,
        ContractName::HomeTeamBets,
        ContractName::GerastyxOpol,
        ContractName::Spades,
        ContractName::GerastyxPropertyNft,
    ];

    /// The key the registry and the deployment records use for this name.
    pub fn as_str(self) -> &'static str {
        match self {
            ContractName::ContractRegistry => "ContractRegistry",
            ContractName::DeviceConnect => "DeviceConnect",
            ContractName::Zeropoint => "Zeropoint",
            ContractName::ZeropointWifi => "ZeropointWifi",
            ContractName::ZeropointPhoneService => "ZeropointPhoneService",
            ContractName::ZeropointInsurance => "ZeropointInsurance",
            ContractName::TheGoateToken => "TheGoateToken",
            ContractName::GoateStaking => "GoateStaking",
            ContractName::TokenPairStaking => "TokenPairStaking",
            ContractName::P2pLendingAndBorrowing => "p2pLendingAndBorrowing",
            ContractName::InstilledInteroperability => "InstilledInteroperability",
            ContractName::CardWars => "CardWars",
            ContractName::HomeTeamBets => "HomeTeamBets",
            ContractName::GerastyxOpol => "GerastyxOpol",
            ContractName::Spades => "Spades",
            ContractName::GerastyxPropertyNft => "GerastyxPropertyNFT",
        }
    }

    /// Every name the resolver refreshes from the registry.
    pub fn resolvable() -> impl Iterator<Item = ContractName> {
        ContractName::ALL
            .iter()
            .copied()
            .filter(|name| *name != ContractName::ContractRegistry)
    }
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractName {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ContractName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == raw.trim())
            .ok_or_else(|| format!("unknown contract name '{raw}'"))
    }
}

/// The resolved (address, ABI) pair backing one contract name at a point in
/// time. A zero address marks a name that has not been resolved yet.
#[derive(Clone, Debug)]
pub struct ContractBinding {
    pub name: ContractName,
    pub address: Address,
    pub abi: Arc<JsonAbi>,
    /// SHA-256 of the ABI JSON this binding was built from, when known.
    /// Lets a refresh cycle skip entries that did not actually change.
    pub abi_hash: Option<String>,
}

impl ContractBinding {
    /// The not-yet-resolved state every name starts in.
    pub fn sentinel(name: ContractName) -> Self {
        Self {
            name,
            address: Address::ZERO,
            abi: Arc::new(JsonAbi::default()),
            abi_hash: None,
        }
    }

    pub fn new(
        name: ContractName,
        address: Address,
        abi: JsonAbi,
        abi_hash: Option<String>,
    ) -> Self {
        Self {
            name,
            address,
            abi: Arc::new(abi),
            abi_hash,
        }
    }

    /// A binding is usable once it has a real address and at least one
    /// callable function.
    pub fn is_resolved(&self) -> bool {
        !self.address.is_zero() && !self.abi.functions.is_empty()
    }
}

/// An immutable, fully-consistent view of every binding. Published wholesale
/// and never mutated afterwards; consumers hold the `Arc` for as long as
/// they need a stable view.
#[derive(Clone, Debug, Default)]
pub struct ConfigSnapshot {
    bindings: BTreeMap<ContractName, ContractBinding>,
}

impl ConfigSnapshot {
    pub fn binding(&self, name: ContractName) -> Option<&ContractBinding> {
        self.bindings.get(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContractBinding> {
        self.bindings.values()
    }

    pub fn resolved_count(&self) -> usize {
        self.bindings.values().filter(|b| b.is_resolved()).count()
    }
}

/// Owner of the current snapshot. Publishing swaps one `Arc` under a lock
/// held only for the swap itself; readers either see the old snapshot or the
/// new one in full, never a mix.
pub struct ConfigStore {
    snapshot: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    pub fn new(seed: impl IntoIterator<Item = ContractBinding>) -> Self {
        let mut bindings = BTreeMap::new();
        for binding in seed {
            bindings.insert(binding.name, binding);
        }
        Self {
            snapshot: RwLock::new(Arc::new(ConfigSnapshot { bindings })),
        }
    }

    /// Seed with every name unresolved.
    pub fn empty() -> Self {
        Self::new(ContractName::ALL.map(ContractBinding::sentinel))
    }

    /// The latest published snapshot. Non-blocking apart from the lock held
    /// for the clone of the `Arc`.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    /// Merge a partial update into a fresh snapshot and make it current.
    /// Only the names present in `update` change; all other bindings carry
    /// over untouched.
    pub fn publish(
        &self,
        update: impl IntoIterator<Item = ContractBinding>,
    ) -> Arc<ConfigSnapshot> {
        let mut guard = self.snapshot.write().unwrap();
        let mut bindings = guard.bindings.clone();
        for binding in update {
            bindings.insert(binding.name, binding);
        }
        let next = Arc::new(ConfigSnapshot { bindings });
        *guard = next.clone();
        next
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use alloy::primitives::address;

    fn binding_at(name: ContractName, address: Address) -> ContractBinding {
        ContractBinding {
            address,
            ..ContractBinding::sentinel(name)
        }
    }

    #[test]
    fn publish__replaces_only_named_entries() {
        let store = ConfigStore::empty();
        let zeropoint = address!("00000000000000000000000000000000000000aa");

        store.publish([binding_at(ContractName::Zeropoint, zeropoint)]);

        let snapshot = store.current();
        assert_eq!(
            snapshot.binding(ContractName::Zeropoint).unwrap().address,
            zeropoint
        );
        assert!(
            snapshot
                .binding(ContractName::Spades)
                .unwrap()
                .address
                .is_zero()
        );
    }

    #[test]
    fn publish__disjoint_updates_accumulate_into_a_union() {
        let store = ConfigStore::empty();
        let first = address!("00000000000000000000000000000000000000aa");
        let second = address!("00000000000000000000000000000000000000bb");

        store.publish([binding_at(ContractName::Zeropoint, first)]);
        store.publish([binding_at(ContractName::Spades, second)]);

        let snapshot = store.current();
        assert_eq!(
            snapshot.binding(ContractName::Zeropoint).unwrap().address,
            first
        );
        assert_eq!(
            snapshot.binding(ContractName::Spades).unwrap().address,
            second
        );
    }

    #[test]
    fn current__captured_snapshot_is_unaffected_by_later_publishes() {
        let store = ConfigStore::empty();
        let first = address!("00000000000000000000000000000000000000aa");
        let second = address!("00000000000000000000000000000000000000bb");
        store.publish([binding_at(ContractName::Zeropoint, first)]);

        // given a reader holding the current snapshot
        let held = store.current();

        // when a new snapshot is published
        store.publish([binding_at(ContractName::Zeropoint, second)]);

        // then the held snapshot still carries the old binding
        assert_eq!(
            held.binding(ContractName::Zeropoint).unwrap().address,
            first
        );
        assert_eq!(
            store
                .current()
                .binding(ContractName::Zeropoint)
                .unwrap()
                .address,
            second
        );
    }

    #[test]
    fn sentinel__is_not_resolved() {
        let binding = ContractBinding::sentinel(ContractName::CardWars);
        assert!(!binding.is_resolved());
    }
}
