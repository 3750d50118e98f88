use clap::{
    ArgGroup,
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use goate_dashboard::{
    assets::{
        Action,
        Asset,
        Subject,
    },
    binder::ContractBinder,
    chain::{
        ChainClient,
        DEFAULT_DEVNET_RPC_URL,
        DEFAULT_LOCAL_RPC_URL,
        DEFAULT_TESTNET_RPC_URL,
        RpcChainClient,
        parse_address,
    },
    config::ConfigStore,
    deployment::{
        self,
        DeploymentEnv,
        DeploymentStore,
    },
    dispatch::{
        ActionDispatcher,
        DispatchContext,
        LogNotifier,
        NotificationSink,
    },
    prices::PriceFetcher,
    queries::{
        BalanceFetcher,
        DeviceFetcher,
    },
    registry::{
        DEFAULT_REFRESH_INTERVAL,
        RegistryPoller,
        RegistryResolver,
    },
    wallets,
};
use itertools::Itertools;
use std::{
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "goate-dashboard",
    about = "Console for the Goate Electric contract suite",
    version,
    group(
        ArgGroup::new("network")
            .args(["local", "dev", "test"])
            .required(true)
    )
)]
struct Args {
    /// Connect to a local node
    #[arg(long)]
    local: bool,

    /// Connect to the devnet deployment
    #[arg(long)]
    dev: bool,

    /// Connect to the testnet deployment
    #[arg(long)]
    test: bool,

    /// Override the RPC URL for the selected network
    #[arg(long)]
    rpc_url: Option<Url>,

    /// Keystore wallet name to sign with
    #[arg(long)]
    wallet: Option<String>,

    /// Override the wallet directory (defaults to ~/.goate/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Registry poll interval in seconds
    #[arg(long)]
    refresh_interval: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one user action against its contract
    Dispatch {
        /// Asset, game, or collection the action applies to
        subject: String,
        /// buy, sell, transfer, deposit, stake, dualStake, lend, borrow,
        /// startGame, auction-buy, auction-sell
        action: String,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long)]
        token_id: Option<u64>,
    },
    /// Show every asset balance for an account
    Balances {
        #[arg(long)]
        account: Option<String>,
    },
    /// List registered devices for an account
    Devices {
        #[arg(long)]
        account: Option<String>,
    },
    /// Register a device by id
    AddDevice { device_id: String },
    /// Connect a registered device
    ConnectDevice { device_id: String },
    /// Toggle the insurance shield for a device
    Insure {
        device_id: String,
        /// Deactivate instead of subscribing
        #[arg(long)]
        off: bool,
    },
    /// Show oracle prices for the configured pairs
    Prices,
    /// Keep the registry bindings fresh until interrupted
    Watch,
}

fn init_tracing() -> WorkerGuard {
    let file_appender = rolling::daily("logs", "goate-dashboard.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

fn resolve_account(
    flag: Option<&str>,
    client: &dyn ChainClient,
) -> Result<alloy::primitives::Address> {
    match flag {
        Some(raw) => parse_address(raw).map_err(|err| eyre!(err)),
        None => {
            let sender = client.sender();
            if sender.is_zero() {
                Err(eyre!("Provide --account or unlock a wallet with --wallet"))
            } else {
                Ok(sender)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _guard = init_tracing();
    let args = Args::parse();

    let env = if args.local {
        DeploymentEnv::Local
    } else if args.dev {
        DeploymentEnv::Dev
    } else {
        DeploymentEnv::Test
    };
    deployment::ensure_structure()?;
    let record = DeploymentStore::new(env)?
        .load()
        .wrap_err("loading deployment record")?;

    let rpc_url = match (&args.rpc_url, &record) {
        (Some(url), _) => url.clone(),
        (None, Some(record)) if !record.network_url.is_empty() => {
            Url::parse(&record.network_url)
                .wrap_err("deployment record network_url is not a valid URL")?
        }
        _ => {
            let default = match env {
                DeploymentEnv::Local => DEFAULT_LOCAL_RPC_URL,
                DeploymentEnv::Dev => DEFAULT_DEVNET_RPC_URL,
                DeploymentEnv::Test => DEFAULT_TESTNET_RPC_URL,
            };
            Url::parse(default).expect("default RPC URLs parse")
        }
    };

    let signer = match &args.wallet {
        Some(name) => {
            let dir = wallets::resolve_wallet_dir(args.wallet_dir.as_deref())?;
            let descriptor = wallets::find_wallet(&dir, name)?;
            Some(wallets::unlock_wallet(&descriptor)?)
        }
        None => None,
    };

    tracing::info!(%env, %rpc_url, "connecting");
    let client: Arc<dyn ChainClient> =
        Arc::new(RpcChainClient::connect(&rpc_url, signer));

    let store = Arc::new(ConfigStore::new(deployment::seed_bindings(
        record.as_ref(),
    )));
    let binder = ContractBinder::new(store.clone(), client.clone());
    let resolver = RegistryResolver::new(store.clone(), client.clone());

    // First resolution pass before any command runs; a dead registry just
    // means we work from the seeded defaults.
    match resolver.refresh().await {
        Ok(report) => {
            if !report.skipped.is_empty() {
                let reasons = report
                    .skipped
                    .iter()
                    .map(|(name, reason)| format!("{name}: {reason}"))
                    .join("; ");
                tracing::warn!(%reasons, "registry entries skipped");
            }
            tracing::info!(
                accepted = report.accepted.len(),
                skipped = report.skipped.len(),
                "initial registry refresh"
            );
        }
        Err(err) => tracing::warn!(
            error = %err,
            "initial registry refresh failed; using seeded defaults"
        ),
    }

    match args.command {
        Command::Dispatch {
            subject,
            action,
            amount,
            recipient,
            token_id,
        } => {
            let subject = Subject::from_str(&subject).map_err(|e| eyre!(e))?;
            let action = Action::from_str(&action).map_err(|e| eyre!(e))?;
            let ctx = DispatchContext {
                amount,
                recipient,
                token_id,
            };
            let dispatcher = ActionDispatcher::new(binder);
            let outcome = dispatcher.dispatch(subject, action, &ctx).await;
            LogNotifier.notify(subject, action, &outcome);
            if outcome.is_success() {
                println!("{subject} {action}: {outcome}");
                Ok(())
            } else {
                Err(eyre!("{subject} {action}: {outcome}"))
            }
        }
        Command::Balances { account } => {
            let account = resolve_account(account.as_deref(), client.as_ref())?;
            let sheet = BalanceFetcher::new(binder).fetch_all(account).await?;
            for asset in Asset::ALL {
                println!("{asset:>6}: {}", sheet.display(asset));
            }
            Ok(())
        }
        Command::Devices { account } => {
            let account = resolve_account(account.as_deref(), client.as_ref())?;
            let devices = DeviceFetcher::new(binder).fetch(account).await?;
            if devices.is_empty() {
                println!("No devices registered");
            }
            for device in devices {
                println!(
                    "{} battery {}% insurance {}",
                    device.device_id,
                    device.battery_capacity,
                    if device.is_insured { "on" } else { "off" }
                );
            }
            Ok(())
        }
        Command::AddDevice { device_id } => {
            let tx_hash = DeviceFetcher::new(binder).add_device(&device_id).await?;
            println!("Registered '{device_id}' ({tx_hash})");
            Ok(())
        }
        Command::ConnectDevice { device_id } => {
            let tx_hash = DeviceFetcher::new(binder)
                .connect_device(&device_id)
                .await?;
            println!("Connected '{device_id}' ({tx_hash})");
            Ok(())
        }
        Command::Insure { device_id, off } => {
            let tx_hash = DeviceFetcher::new(binder)
                .set_insurance(&device_id, !off)
                .await?;
            let state = if off { "deactivated" } else { "subscribed" };
            println!("Insurance {state} for '{device_id}' ({tx_hash})");
            Ok(())
        }
        Command::Prices => {
            let fetcher = PriceFetcher::mainnet(client.clone());
            for (pair, price) in fetcher.all().await {
                match price {
                    Some(price) => println!("{pair}: {}", price.price),
                    None => println!("{pair}: unavailable"),
                }
            }
            Ok(())
        }
        Command::Watch => {
            let period = args
                .refresh_interval
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL);
            let poller = RegistryPoller::spawn(resolver, period);
            let mut status = tokio::time::interval(Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = status.tick() => {
                        let snapshot = store.current();
                        tracing::info!(
                            resolved = snapshot.resolved_count(),
                            total = goate_dashboard::config::ContractName::ALL.len(),
                            "binding status"
                        );
                    }
                }
            }
            tracing::info!("Received interrupt, exiting");
            poller.stop().await;
            Ok(())
        }
    }
}
