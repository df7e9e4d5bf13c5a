//! Bisq API bots CLI
//!
//! Single RPC calls and polling bots for a running Bisq API daemon.

use anyhow::Result;
use bisq_api_bots::bots::bsq_swap_mm::BsqSwapMarketMaker;
use bisq_api_bots::bots::events::{spawn_log_listener, EventDispatcher};
use bisq_api_bots::bots::payment_simulator::PaymentSimulator;
use bisq_api_bots::bots::price_sync::PriceSyncBot;
use bisq_api_bots::bots::sepa_mm::{self, SepaMarketMaker};
use bisq_api_bots::bots::take_best_priced::{TakeBestPricedBot, TakerOptions};
use bisq_api_bots::bots::{shutdown_on_ctrl_c, Pacing};
use bisq_api_bots::config::{BsqSwapMmConfig, ConnectionConfig, PriceSyncConfig, SepaMmConfig, TakerConfig};
use bisq_api_bots::rpccalls::{self, RpcCall};
use bisq_api_bots::BisqClient;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "bisq-bots")]
#[command(about = "Bisq API daemon calls and trading bots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API daemon host [env: BISQ_HOST]
    #[arg(long, global = true)]
    host: Option<String>,

    /// API daemon port [env: BISQ_PORT]
    #[arg(long, global = true)]
    port: Option<u16>,

    /// API password [env: BISQ_API_PASSWORD]
    #[arg(long, global = true)]
    password: Option<String>,

    /// Wallet password [env: BISQ_WALLET_PASSWORD]
    #[arg(long, global = true)]
    wallet_password: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Make one RPC call and print the reply
    Rpc {
        #[command(subcommand)]
        call: RpcCall,
    },

    /// Keep a BUY and a SELL SEPA offer on the book and walk trades through the protocol
    SepaMm {
        #[arg(short, long, default_value = "conf/sepa_mm.ini")]
        config: PathBuf,

        #[command(subcommand)]
        action: Option<SepaMmAction>,
    },

    /// Keep a BUY and a SELL BSQ swap offer on the book
    BsqSwapMm {
        #[arg(short, long, default_value = "conf/bsq_swap_mm.ini")]
        config: PathBuf,
    },

    /// Keep my offers at the most competitive available price
    PriceSync {
        #[arg(short, long, default_value = "conf/price_sync.ini")]
        config: PathBuf,
    },

    /// Take the best priced offers in one market
    Take {
        #[arg(short, long, default_value = "conf/take_buy_btc.ini")]
        config: PathBuf,

        /// Show which offers would be taken without taking them
        #[arg(long, conflicts_with = "simulate_regtest_payment")]
        dry_run: bool,

        /// Complete each taken trade on regtest
        #[arg(long)]
        simulate_regtest_payment: bool,
    },

    /// Complete a trade on regtest
    SimulatePayment {
        trade_id: String,

        #[arg(long, default_value = "EUR")]
        currency: String,

        #[arg(long, default_value_t = 20_000)]
        polling_interval_ms: u64,
    },
}

#[derive(Subcommand)]
enum SepaMmAction {
    /// Tell the BTC seller the payment was sent
    ConfirmPaymentStarted { trade_id: String },
    /// Tell the BTC buyer the payment arrived
    ConfirmPaymentReceived { trade_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let connection = ConnectionConfig::load(cli.host, cli.port, cli.password, cli.wallet_password)?;
    let client = BisqClient::connect(&connection).await?;
    let pacing = Pacing {
        shutdown: shutdown_on_ctrl_c(),
        ..Pacing::default()
    };

    match cli.command {
        Commands::Rpc { call } => rpccalls::run(&client, call).await?,
        Commands::SepaMm { config, action } => match action {
            Some(SepaMmAction::ConfirmPaymentStarted { trade_id }) => {
                sepa_mm::confirm_payment_started(&client, &trade_id).await?
            }
            Some(SepaMmAction::ConfirmPaymentReceived { trade_id }) => {
                sepa_mm::confirm_payment_received(&client, &trade_id).await?
            }
            None => run_sepa_mm(&client, &config, pacing).await?,
        },
        Commands::BsqSwapMm { config } => run_bsq_swap_mm(&client, &config, pacing).await?,
        Commands::PriceSync { config } => run_price_sync(&client, &config, pacing).await?,
        Commands::Take {
            config,
            dry_run,
            simulate_regtest_payment,
        } => {
            let options = TakerOptions {
                dry_run,
                simulate_regtest_payment,
            };
            run_taker(&client, &connection, &config, options, pacing).await?
        }
        Commands::SimulatePayment {
            trade_id,
            currency,
            polling_interval_ms,
        } => {
            print_banner("REGTEST PAYMENT SIMULATOR", &format!("Trade: {}", trade_id));
            PaymentSimulator::new(
                &client,
                trade_id,
                currency.to_uppercase(),
                Duration::from_millis(polling_interval_ms),
                pacing,
            )
            .run()
            .await?
        }
    }

    Ok(())
}

fn print_banner(title: &str, detail: &str) {
    println!("\n{}", "=".repeat(70));
    println!("  {}", title.bold());
    println!("  {}", detail);
    println!("{}\n", "=".repeat(70));
}

async fn run_sepa_mm(client: &BisqClient, path: &std::path::Path, pacing: Pacing) -> Result<()> {
    let config = SepaMmConfig::from_file(path)?;
    print_banner(
        "SEPA MARKET MAKER",
        &format!(
            "Margin: {}% | Spread: {}% | Interval: {}s",
            config.reference_price_margin, config.target_spread, config.offers_poll_interval_in_sec
        ),
    );

    let (events, rx) = EventDispatcher::new();
    let listener = spawn_log_listener(rx);
    {
        let bot = SepaMarketMaker::new(client, config, pacing, events);
        bot.run().await?;
    }
    // the bot dropped the last sender, so the listener drains and exits
    listener.await?;
    Ok(())
}

async fn run_bsq_swap_mm(client: &BisqClient, path: &std::path::Path, pacing: Pacing) -> Result<()> {
    let config = BsqSwapMmConfig::from_file(path)?;
    print_banner(
        "BSQ SWAP MARKET MAKER",
        &format!("Reference price: {} BTC | Spread: {}%", config.reference_price, config.spread),
    );
    BsqSwapMarketMaker::new(client, config, pacing.shutdown).run().await?;
    Ok(())
}

async fn run_price_sync(client: &BisqClient, path: &std::path::Path, pacing: Pacing) -> Result<()> {
    let config = PriceSyncConfig::from_file(path)?;
    print_banner(
        "PRICE SYNC",
        &format!("{} {} offers: {}", config.direction, config.currency, config.offer_ids.join(", ")),
    );
    PriceSyncBot::new(client, config, pacing).run().await?;
    Ok(())
}

async fn run_taker(
    client: &BisqClient,
    connection: &ConnectionConfig,
    path: &std::path::Path,
    options: TakerOptions,
    pacing: Pacing,
) -> Result<()> {
    let config = TakerConfig::from_file(path)?;
    print_banner(
        "TAKE BEST PRICED OFFER",
        &format!(
            "Market: {} | Dry run: {}",
            config.market,
            if options.dry_run { "YES" } else { "NO - LIVE MODE" }
        ),
    );

    let mut bot = TakeBestPricedBot::new(
        client,
        config,
        options,
        connection.wallet_password.clone(),
        pacing,
    )
    .await?;
    let taken = bot.run().await?;
    info!("Bot took {} offer(s).", taken);
    Ok(())
}
