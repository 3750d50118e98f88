use crate::{
    assets::{
        AUCTION_DECIMALS,
        Action,
        Asset,
        DEFAULT_DECIMALS,
        Game,
        STAKE_DURATION_DAYS,
        Subject,
        UNIT_OF_ACCOUNT,
    },
    binder::{
        BindError,
        ContractBinder,
    },
    chain::parse_address,
    config::ContractName,
};
use alloy::{
    dyn_abi::DynSolValue,
    primitives::{
        Address,
        TxHash,
        U256,
        utils::{
            ParseUnits,
            parse_units,
        },
    },
};
use std::fmt;
use tracing::{
    info,
    warn,
};

/// How one user intent maps onto a contract call. Static for the process
/// lifetime; looked up, never branched over per page.
#[derive(Clone, Copy, Debug)]
pub struct ActionRule {
    pub target: ContractName,
    pub method: &'static str,
    pub shape: ArgShape,
    pub decimals: u8,
    /// Flat purchases may omit the amount and fall back to one whole unit.
    pub implicit_unit_amount: bool,
    pub kind: ResultKind,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResultKind {
    Mutation,
    Query,
}

/// Tagged argument-construction rule. Each variant is one calldata shape;
/// the dispatcher fills it from validated inputs plus the sender account.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArgShape {
    /// `mint(account, amount)`
    MintToSender,
    /// `burn(amount)`
    BurnAmount,
    /// `transfer(recipient, amount)`
    TransferToRecipient,
    /// `updateBalance(account, asset, amount)`
    DepositForSender,
    /// `stakeAsset(asset, amount, duration)`
    SingleStake,
    /// `stakeTokens(asset, unitAsset, amount, amount, duration)`; the second
    /// leg is always the unit-of-account asset.
    PairedStake,
    /// `lend(amount)` / `borrow(amount)`
    PlainAmount,
    /// `startGame()`
    StartSimpleGame,
    /// `placeBet(0, 1 unit, 0, false)`, the flat opening bet.
    OpeningTeamBet,
    /// `startGame([account], 0, [0])`
    StartBoardGame,
    /// `buyPropertyNFT(account, tokenId, amount)`
    AuctionPurchase,
    /// `sellPropertyNFT(account, tokenId, true)`
    AuctionListing,
}

impl ArgShape {
    // Listings validate an asking amount like every other auction input,
    // even though the listing call itself does not carry it.
    fn needs_amount(self) -> bool {
        matches!(
            self,
            ArgShape::MintToSender
                | ArgShape::BurnAmount
                | ArgShape::TransferToRecipient
                | ArgShape::DepositForSender
                | ArgShape::SingleStake
                | ArgShape::PairedStake
                | ArgShape::PlainAmount
                | ArgShape::AuctionPurchase
                | ArgShape::AuctionListing
        )
    }

    fn needs_recipient(self) -> bool {
        matches!(self, ArgShape::TransferToRecipient)
    }

    fn needs_token_id(self) -> bool {
        matches!(self, ArgShape::AuctionPurchase | ArgShape::AuctionListing)
    }
}

/// Raw user input accompanying a dispatch. Everything is optional here; the
/// rule decides what is actually required.
#[derive(Clone, Debug, Default)]
pub struct DispatchContext {
    pub amount: Option<String>,
    pub recipient: Option<String>,
    pub token_id: Option<u64>,
}

/// The classified result of one dispatch. Returned, never thrown; the caller
/// owns it for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success { tx_hash: Option<TxHash> },
    Reverted { reason: String },
    ResolutionFailure { detail: String },
    ValidationFailure { detail: String },
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success { .. })
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Success { tx_hash: Some(hash) } => {
                write!(f, "submitted ({hash})")
            }
            DispatchOutcome::Success { tx_hash: None } => {
                write!(f, "completed")
            }
            DispatchOutcome::Reverted { reason } => {
                write!(f, "rejected on chain: {reason}")
            }
            DispatchOutcome::ResolutionFailure { detail } => {
                write!(f, "contract unavailable: {detail}")
            }
            DispatchOutcome::ValidationFailure { detail } => {
                write!(f, "invalid request: {detail}")
            }
        }
    }
}

/// Where outcomes go once a dispatch finishes. Rendering them is someone
/// else's job; the dashboard core only hands them over.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, subject: Subject, action: Action, outcome: &DispatchOutcome);
}

/// Default sink: structured log lines.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, subject: Subject, action: Action, outcome: &DispatchOutcome) {
        if outcome.is_success() {
            info!(%subject, %action, %outcome, "dispatch finished");
        } else {
            warn!(%subject, %action, %outcome, "dispatch failed");
        }
    }
}

/// Look up the rule backing `(subject, action)`. `None` means the pair is
/// simply not something the dashboard offers.
pub fn rule_for(subject: Subject, action: Action) -> Option<ActionRule> {
    let mutation = |target, method, shape, decimals, implicit| ActionRule {
        target,
        method,
        shape,
        decimals,
        implicit_unit_amount: implicit,
        kind: ResultKind::Mutation,
    };
    match (subject, action) {
        (Subject::Asset(asset), Action::Buy) => Some(mutation(
            asset.token_contract(),
            "mint",
            ArgShape::MintToSender,
            DEFAULT_DECIMALS,
            asset.is_utility_service(),
        )),
        (Subject::Asset(asset), Action::Sell) => Some(mutation(
            asset.token_contract(),
            "burn",
            ArgShape::BurnAmount,
            DEFAULT_DECIMALS,
            false,
        )),
        (Subject::Asset(asset), Action::Transfer) => Some(mutation(
            asset.token_contract(),
            "transfer",
            ArgShape::TransferToRecipient,
            DEFAULT_DECIMALS,
            false,
        )),
        (Subject::Asset(asset), Action::Deposit) => Some(mutation(
            asset.token_contract(),
            "updateBalance",
            ArgShape::DepositForSender,
            DEFAULT_DECIMALS,
            false,
        )),
        (Subject::Asset(_), Action::Stake) => Some(mutation(
            ContractName::GoateStaking,
            "stakeAsset",
            ArgShape::SingleStake,
            DEFAULT_DECIMALS,
            false,
        )),
        (Subject::Asset(_), Action::DualStake) => Some(mutation(
            ContractName::TokenPairStaking,
            "stakeTokens",
            ArgShape::PairedStake,
            DEFAULT_DECIMALS,
            false,
        )),
        (Subject::Asset(_), Action::Lend) => Some(mutation(
            ContractName::P2pLendingAndBorrowing,
            "lend",
            ArgShape::PlainAmount,
            DEFAULT_DECIMALS,
            false,
        )),
        (Subject::Asset(_), Action::Borrow) => Some(mutation(
            ContractName::P2pLendingAndBorrowing,
            "borrow",
            ArgShape::PlainAmount,
            DEFAULT_DECIMALS,
            false,
        )),
        (Subject::Game(game), Action::StartGame) => Some(match game {
            Game::CardWars | Game::Spades => mutation(
                game.contract(),
                "startGame",
                ArgShape::StartSimpleGame,
                DEFAULT_DECIMALS,
                false,
            ),
            Game::HomeTeamBets => mutation(
                game.contract(),
                "placeBet",
                ArgShape::OpeningTeamBet,
                AUCTION_DECIMALS,
                false,
            ),
            Game::GerastyxOpol => mutation(
                game.contract(),
                "startGame",
                ArgShape::StartBoardGame,
                DEFAULT_DECIMALS,
                false,
            ),
        }),
        (Subject::PropertyCollection, Action::AuctionBuy) => Some(mutation(
            ContractName::GerastyxPropertyNft,
            "buyPropertyNFT",
            ArgShape::AuctionPurchase,
            AUCTION_DECIMALS,
            false,
        )),
        (Subject::PropertyCollection, Action::AuctionSell) => Some(mutation(
            ContractName::GerastyxPropertyNft,
            "sellPropertyNFT",
            ArgShape::AuctionListing,
            AUCTION_DECIMALS,
            false,
        )),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct ValidatedInputs {
    amount: Option<U256>,
    recipient: Option<Address>,
    token_id: Option<U256>,
}

fn unit_amount(decimals: u8) -> U256 {
    U256::from(10).pow(U256::from(decimals))
}

fn parse_amount(raw: &str, decimals: u8) -> Result<U256, String> {
    let parsed = parse_units(raw, decimals)
        .map_err(|err| format!("invalid amount '{raw}': {err}"))?;
    let value = match parsed {
        ParseUnits::U256(value) => value,
        // signed parse means the input carried a minus
        ParseUnits::I256(_) => {
            return Err(format!("amount must be positive, got '{raw}'"));
        }
    };
    if value.is_zero() {
        return Err(format!("amount must be positive, got '{raw}'"));
    }
    Ok(value)
}

fn validate(rule: &ActionRule, ctx: &DispatchContext) -> Result<ValidatedInputs, String> {
    let mut inputs = ValidatedInputs::default();

    if rule.shape.needs_amount() {
        let raw = ctx
            .amount
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty());
        inputs.amount = match raw {
            Some(raw) => Some(parse_amount(raw, rule.decimals)?),
            None if rule.implicit_unit_amount => Some(unit_amount(rule.decimals)),
            None => return Err(format!("'{}' requires an amount", rule.method)),
        };
    }

    if rule.shape.needs_recipient() {
        let raw = ctx
            .recipient
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| "transfer requires a recipient address".to_string())?;
        let recipient = parse_address(raw).map_err(|err| err.to_string())?;
        inputs.recipient = Some(recipient);
    }

    if rule.shape.needs_token_id() {
        let token_id = ctx
            .token_id
            .ok_or_else(|| "auction actions require a token id".to_string())?;
        inputs.token_id = Some(U256::from(token_id));
    }

    Ok(inputs)
}

fn build_args(
    rule: &ActionRule,
    subject: Subject,
    inputs: &ValidatedInputs,
    sender: Address,
) -> Vec<DynSolValue> {
    let uint = |value: U256| DynSolValue::Uint(value, 256);
    let amount = inputs.amount.unwrap_or(U256::ZERO);
    let asset_symbol = || match subject {
        Subject::Asset(asset) => asset.symbol().to_string(),
        // Only asset rules carry asset-shaped arguments.
        _ => unreachable!("asset argument requested for non-asset subject"),
    };
    match rule.shape {
        ArgShape::MintToSender => {
            vec![DynSolValue::Address(sender), uint(amount)]
        }
        ArgShape::BurnAmount | ArgShape::PlainAmount => vec![uint(amount)],
        ArgShape::TransferToRecipient => {
            let recipient = inputs.recipient.unwrap_or(Address::ZERO);
            vec![DynSolValue::Address(recipient), uint(amount)]
        }
        ArgShape::DepositForSender => vec![
            DynSolValue::Address(sender),
            DynSolValue::String(asset_symbol()),
            uint(amount),
        ],
        ArgShape::SingleStake => vec![
            DynSolValue::String(asset_symbol()),
            uint(amount),
            uint(U256::from(STAKE_DURATION_DAYS)),
        ],
        ArgShape::PairedStake => vec![
            DynSolValue::String(asset_symbol()),
            DynSolValue::String(UNIT_OF_ACCOUNT.symbol().to_string()),
            uint(amount),
            uint(amount),
            uint(U256::from(STAKE_DURATION_DAYS)),
        ],
        ArgShape::StartSimpleGame => Vec::new(),
        ArgShape::OpeningTeamBet => vec![
            uint(U256::ZERO),
            uint(unit_amount(rule.decimals)),
            uint(U256::ZERO),
            DynSolValue::Bool(false),
        ],
        ArgShape::StartBoardGame => vec![
            DynSolValue::Array(vec![DynSolValue::Address(sender)]),
            uint(U256::ZERO),
            DynSolValue::Array(vec![uint(U256::ZERO)]),
        ],
        ArgShape::AuctionPurchase => vec![
            DynSolValue::Address(sender),
            uint(inputs.token_id.unwrap_or(U256::ZERO)),
            uint(amount),
        ],
        ArgShape::AuctionListing => vec![
            DynSolValue::Address(sender),
            uint(inputs.token_id.unwrap_or(U256::ZERO)),
            DynSolValue::Bool(true),
        ],
    }
}

/// Turns `(subject, action, inputs)` into exactly one contract call and a
/// typed outcome. Holds no per-dispatch state; safe to share.
#[derive(Clone)]
pub struct ActionDispatcher {
    binder: ContractBinder,
}

impl ActionDispatcher {
    pub fn new(binder: ContractBinder) -> Self {
        Self { binder }
    }

    pub async fn dispatch(
        &self,
        subject: Subject,
        action: Action,
        ctx: &DispatchContext,
    ) -> DispatchOutcome {
        // Rule lookup and input validation both happen before any network
        // traffic; an undefined pair never costs an RPC round trip.
        let Some(rule) = rule_for(subject, action) else {
            return DispatchOutcome::ValidationFailure {
                detail: format!("'{action}' is not available for '{subject}'"),
            };
        };
        let inputs = match validate(&rule, ctx) {
            Ok(inputs) => inputs,
            Err(detail) => return DispatchOutcome::ValidationFailure { detail },
        };

        let contract = match self.binder.bind(rule.target) {
            Ok(contract) => contract,
            Err(err) => {
                return DispatchOutcome::ResolutionFailure {
                    detail: err.to_string(),
                };
            }
        };

        let sender = self.binder.client().sender();
        let args = build_args(&rule, subject, &inputs, sender);

        match rule.kind {
            ResultKind::Mutation => {
                match contract.send(rule.method, &args, U256::ZERO).await {
                    Ok(tx_hash) => DispatchOutcome::Success {
                        tx_hash: Some(tx_hash),
                    },
                    Err(BindError::Chain(err)) => DispatchOutcome::Reverted {
                        reason: err.to_string(),
                    },
                    // Encoding or ABI-shape trouble means the binding is
                    // wrong, not that the chain said no.
                    Err(err) => DispatchOutcome::ResolutionFailure {
                        detail: err.to_string(),
                    },
                }
            }
            ResultKind::Query => {
                match contract.call(rule.method, &args).await {
                    Ok(_) => DispatchOutcome::Success { tx_hash: None },
                    Err(BindError::Chain(err)) => DispatchOutcome::Reverted {
                        reason: err.to_string(),
                    },
                    Err(err) => DispatchOutcome::ResolutionFailure {
                        detail: err.to_string(),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rule_for__unknown_pairs_have_no_rule() {
        assert!(rule_for(Subject::Asset(Asset::Zpe), Action::StartGame).is_none());
        assert!(rule_for(Subject::Game(Game::Spades), Action::Transfer).is_none());
        assert!(
            rule_for(Subject::PropertyCollection, Action::Stake).is_none()
        );
    }

    #[test]
    fn rule_for__stake_targets_the_staking_contract() {
        let rule = rule_for(Subject::Asset(Asset::Usd), Action::Stake).unwrap();
        assert_eq!(rule.target, ContractName::GoateStaking);
        assert_eq!(rule.method, "stakeAsset");
        assert_eq!(rule.decimals, DEFAULT_DECIMALS);
    }

    #[test]
    fn rule_for__auction_amounts_use_six_decimals() {
        let buy =
            rule_for(Subject::PropertyCollection, Action::AuctionBuy).unwrap();
        let bet =
            rule_for(Subject::Game(Game::HomeTeamBets), Action::StartGame)
                .unwrap();
        assert_eq!(buy.decimals, AUCTION_DECIMALS);
        assert_eq!(bet.decimals, AUCTION_DECIMALS);
    }

    #[test]
    fn rule_for__only_utility_services_allow_the_implicit_unit() {
        let zpe = rule_for(Subject::Asset(Asset::Zpe), Action::Buy).unwrap();
        let goate = rule_for(Subject::Asset(Asset::Goate), Action::Buy).unwrap();
        assert!(zpe.implicit_unit_amount);
        assert!(!goate.implicit_unit_amount);
    }

    #[test]
    fn validate__missing_recipient_fails_before_any_call() {
        let rule =
            rule_for(Subject::Asset(Asset::Zpe), Action::Transfer).unwrap();
        let ctx = DispatchContext {
            amount: Some("2".into()),
            recipient: Some("".into()),
            ..DispatchContext::default()
        };
        assert!(validate(&rule, &ctx).is_err());
    }

    #[test]
    fn validate__rejects_zero_and_negative_amounts() {
        let rule = rule_for(Subject::Asset(Asset::Goate), Action::Sell).unwrap();
        for bad in ["0", "-3", "abc", "0.0"] {
            let ctx = DispatchContext {
                amount: Some(bad.into()),
                ..DispatchContext::default()
            };
            assert!(validate(&rule, &ctx).is_err(), "accepted '{bad}'");
        }
    }

    #[test]
    fn validate__service_buy_falls_back_to_one_unit() {
        let rule = rule_for(Subject::Asset(Asset::Zpw), Action::Buy).unwrap();
        let inputs = validate(&rule, &DispatchContext::default()).unwrap();
        assert_eq!(inputs.amount, Some(unit_amount(DEFAULT_DECIMALS)));
    }

    #[test]
    fn build_args__paired_stake_always_binds_the_unit_of_account() {
        let rule =
            rule_for(Subject::Asset(Asset::Goate), Action::DualStake).unwrap();
        let inputs = ValidatedInputs {
            amount: Some(U256::from(5u64) * unit_amount(DEFAULT_DECIMALS)),
            ..ValidatedInputs::default()
        };
        let args = build_args(
            &rule,
            Subject::Asset(Asset::Goate),
            &inputs,
            Address::repeat_byte(0x42),
        );
        assert_eq!(args.len(), 5);
        assert_eq!(args[0], DynSolValue::String("GOATE".to_string()));
        assert_eq!(args[1], DynSolValue::String("USD".to_string()));
        assert_eq!(args[2], args[3]);
        assert_eq!(
            args[4],
            DynSolValue::Uint(U256::from(STAKE_DURATION_DAYS), 256)
        );
    }

    #[test]
    fn build_args__opening_bet_is_one_six_decimal_unit() {
        let rule =
            rule_for(Subject::Game(Game::HomeTeamBets), Action::StartGame)
                .unwrap();
        let args = build_args(
            &rule,
            Subject::Game(Game::HomeTeamBets),
            &ValidatedInputs::default(),
            Address::repeat_byte(0x42),
        );
        assert_eq!(args[1], DynSolValue::Uint(U256::from(1_000_000u64), 256));
        assert_eq!(args[3], DynSolValue::Bool(false));
    }

    proptest! {
        #[test]
        fn parse_amount__scales_whole_numbers_by_the_decimal_table(
            n in 1u64..1_000_000_000
        ) {
            let scaled = parse_amount(&n.to_string(), DEFAULT_DECIMALS).unwrap();
            prop_assert_eq!(
                scaled,
                U256::from(n) * unit_amount(DEFAULT_DECIMALS)
            );
        }
    }

    #[test]
    fn parse_amount__handles_fractions_at_rule_precision() {
        assert_eq!(
            parse_amount("1.5", DEFAULT_DECIMALS).unwrap(),
            U256::from(15u64) * U256::from(10).pow(U256::from(17))
        );
        assert_eq!(
            parse_amount("2.25", AUCTION_DECIMALS).unwrap(),
            U256::from(2_250_000u64)
        );
    }
}
