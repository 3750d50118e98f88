use crate::config::ContractName;
use std::{
    fmt,
    str::FromStr,
};

/// Decimal precision used for token amounts unless a rule overrides it.
pub const DEFAULT_DECIMALS: u8 = 18;
/// Auction and opening-bet amounts are denominated in 6-decimal units.
pub const AUCTION_DECIMALS: u8 = 6;
/// Fixed staking period submitted with every stake, in days.
pub const STAKE_DURATION_DAYS: u64 = 30;
/// Second leg of every paired stake.
pub const UNIT_OF_ACCOUNT: Asset = Asset::Usd;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Asset {
    Zpe,
    Zpp,
    Zpw,
    Btc,
    Usd,
    Pi,
    Goate,
    Zgi,
}

impl Asset {
    pub const ALL: [Asset; 8] = [
        Asset::Zpe,
        Asset::Zpp,
        Asset::Zpw,
        Asset::Btc,
        Asset::Usd,
        Asset::Pi,
        Asset::Goate,
        Asset::Zgi,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Asset::Zpe => "ZPE",
            Asset::Zpp => "ZPP",
            Asset::Zpw => "ZPW",
            Asset::Btc => "BTC",
            Asset::Usd => "USD",
            Asset::Pi => "PI",
            Asset::Goate => "GOATE",
            Asset::Zgi => "ZGI",
        }
    }

    /// The contract that backs this asset's mint/burn/transfer surface.
    /// BTC, USD and PI have no token contract of their own and route through
    /// the interoperability bridge.
    pub fn token_contract(self) -> ContractName {
        match self {
            Asset::Zpe => ContractName::Zeropoint,
            Asset::Zpw => ContractName::ZeropointWifi,
            Asset::Zpp => ContractName::ZeropointPhoneService,
            Asset::Zgi => ContractName::ZeropointInsurance,
            Asset::Goate => ContractName::TheGoateToken,
            Asset::Btc | Asset::Usd | Asset::Pi => {
                ContractName::InstilledInteroperability
            }
        }
    }

    /// Flat service purchases (energy, wifi, phone, insurance) may omit the
    /// amount and fall back to one whole unit.
    pub fn is_utility_service(self) -> bool {
        matches!(self, Asset::Zpe | Asset::Zpw | Asset::Zpp | Asset::Zgi)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Asset::ALL
            .iter()
            .copied()
            .find(|asset| asset.symbol().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| format!("unknown asset '{raw}'"))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Game {
    CardWars,
    HomeTeamBets,
    GerastyxOpol,
    Spades,
}

impl Game {
    pub const ALL: [Game; 4] = [
        Game::CardWars,
        Game::HomeTeamBets,
        Game::GerastyxOpol,
        Game::Spades,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Game::CardWars => "CardWars",
            Game::HomeTeamBets => "HomeTeamBets",
            Game::GerastyxOpol => "GerastyxOpol",
            Game::Spades => "Spades",
        }
    }

    pub fn contract(self) -> ContractName {
        match self {
            Game::CardWars => ContractName::CardWars,
            Game::HomeTeamBets => ContractName::HomeTeamBets,
            Game::GerastyxOpol => ContractName::GerastyxOpol,
            Game::Spades => ContractName::Spades,
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Game {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Game::ALL
            .iter()
            .copied()
            .find(|game| game.name().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| format!("unknown game '{raw}'"))
    }
}

/// What a user intent is aimed at: a token asset, a game table, or the
/// property NFT collection behind the auction buttons.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Subject {
    Asset(Asset),
    Game(Game),
    PropertyCollection,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Asset(asset) => asset.fmt(f),
            Subject::Game(game) => game.fmt(f),
            Subject::PropertyCollection => f.write_str("GerastyxPropertyNFT"),
        }
    }
}

impl FromStr for Subject {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("GerastyxPropertyNFT") {
            return Ok(Subject::PropertyCollection);
        }
        if let Ok(asset) = Asset::from_str(trimmed) {
            return Ok(Subject::Asset(asset));
        }
        if let Ok(game) = Game::from_str(trimmed) {
            return Ok(Subject::Game(game));
        }
        Err(format!("unknown asset or game '{raw}'"))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Action {
    Buy,
    Sell,
    Transfer,
    Deposit,
    Stake,
    DualStake,
    Lend,
    Borrow,
    StartGame,
    AuctionBuy,
    AuctionSell,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::Buy,
        Action::Sell,
        Action::Transfer,
        Action::Deposit,
        Action::Stake,
        Action::DualStake,
        Action::Lend,
        Action::Borrow,
        Action::StartGame,
        Action::AuctionBuy,
        Action::AuctionSell,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Transfer => "transfer",
            Action::Deposit => "deposit",
            Action::Stake => "stake",
            Action::DualStake => "dualStake",
            Action::Lend => "lend",
            Action::Borrow => "borrow",
            Action::StartGame => "startGame",
            Action::AuctionBuy => "auction-buy",
            Action::AuctionSell => "auction-sell",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| format!("unknown action '{raw}'"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn asset_from_str__accepts_any_case() {
        assert_eq!(Asset::from_str("goate"), Ok(Asset::Goate));
        assert_eq!(Asset::from_str(" USD "), Ok(Asset::Usd));
        assert!(Asset::from_str("DOGE").is_err());
    }

    #[test]
    fn subject_from_str__distinguishes_assets_games_and_collection() {
        assert_eq!(Subject::from_str("ZPE"), Ok(Subject::Asset(Asset::Zpe)));
        assert_eq!(
            Subject::from_str("Spades"),
            Ok(Subject::Game(Game::Spades))
        );
        assert_eq!(
            Subject::from_str("GerastyxPropertyNFT"),
            Ok(Subject::PropertyCollection)
        );
        assert!(Subject::from_str("Chess").is_err());
    }

    #[test]
    fn action_from_str__round_trips_every_action() {
        for action in Action::ALL {
            assert_eq!(Action::from_str(action.as_str()), Ok(action));
        }
    }

    #[test]
    fn bridge_assets__route_through_interoperability() {
        for asset in [Asset::Btc, Asset::Usd, Asset::Pi] {
            assert_eq!(
                asset.token_contract(),
                ContractName::InstilledInteroperability
            );
        }
        assert_eq!(Asset::Goate.token_contract(), ContractName::TheGoateToken);
    }
}
