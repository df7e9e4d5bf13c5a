//! Polling bots and the helpers they share

pub mod bsq_swap_mm;
pub mod events;
pub mod offer_taker;
pub mod payment_simulator;
pub mod price_sync;
pub mod protocol_step;
pub mod sepa_mm;
pub mod take_best_priced;

use crate::api::BisqApi;
use crate::client::{with_retry, RetryPolicy};
use crate::error::{ApiError, ApiResult};
use crate::proto::get_trades_request::Category;
use crate::table::trades_table;
use crate::types::{parse_decimal, price_precision};
use chrono::{Local, TimeZone};
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fixed pauses between daemon calls, and the shutdown token every pause
/// watches. Zero pauses in tests.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// After making a market, before looking at trades
    pub after_make_market: Duration,
    /// For an edited offer to be republished
    pub offer_republish: Duration,
    /// After taking a BSQ swap offer
    pub bsq_swap_completion: Duration,
    /// Between polls for a newly taken trade
    pub new_trade_poll: Duration,
    /// Between simulated payment steps
    pub payment_step: Duration,
    /// Before stopping the daemon after a fatal error
    pub fatal_error: Duration,
    /// Cancelled on Ctrl-C
    pub shutdown: CancellationToken,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_make_market: Duration::from_secs(1),
            offer_republish: Duration::from_secs(5),
            bsq_swap_completion: Duration::from_secs(2),
            new_trade_poll: Duration::from_secs(1),
            payment_step: Duration::from_secs(2),
            fatal_error: Duration::from_secs(5),
            shutdown: CancellationToken::new(),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            after_make_market: Duration::ZERO,
            offer_republish: Duration::ZERO,
            bsq_swap_completion: Duration::ZERO,
            new_trade_poll: Duration::ZERO,
            payment_step: Duration::ZERO,
            fatal_error: Duration::ZERO,
            shutdown: CancellationToken::new(),
        }
    }

    /// Sleep for `duration`; returns false once shutdown is requested.
    pub async fn sleep(&self, duration: Duration) -> bool {
        sleep_or_shutdown(&self.shutdown, duration).await
    }

    /// Sleep for `duration`, failing with `ApiError::Interrupted` on shutdown.
    pub async fn pause(&self, duration: Duration) -> ApiResult<()> {
        if self.sleep(duration).await {
            Ok(())
        } else {
            Err(ApiError::Interrupted)
        }
    }
}

/// Token cancelled by the first Ctrl-C
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {}", e);
            return;
        }
        info!("Shutdown signal received");
        trigger.cancel();
    });
    token
}

/// Sleep for `duration`; returns false if shutdown was requested before or during the sleep.
pub async fn sleep_or_shutdown(shutdown: &CancellationToken, duration: Duration) -> bool {
    if shutdown.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.cancelled() => false,
    }
}

/// Stall the bot between offer book polls; returns false on shutdown.
pub async fn run_countdown(shutdown: &CancellationToken, duration: Duration) -> bool {
    if !duration.is_zero() && !shutdown.is_cancelled() {
        info!("Will wake up in {} seconds.", duration.as_secs());
    }
    sleep_or_shutdown(shutdown, duration).await
}

/// Log the bot's uptime and check the daemon still answers.
pub async fn ping_daemon<A: BisqApi + ?Sized>(api: &A, started: Instant) -> ApiResult<String> {
    let uptime = started.elapsed().as_secs();
    info!(
        "Pinging API daemon.  Uptime: {} hours {} minutes {} seconds.",
        uptime / 3600,
        (uptime % 3600) / 60,
        uptime % 60
    );
    match api.get_version().await {
        Ok(version) => {
            info!("API daemon {} is available.", version);
            Ok(version)
        }
        Err(e) => {
            error!("Fatal Error: {}, daemon not available.  Shutting down bot.", e.clean_message());
            Err(e)
        }
    }
}

pub async fn is_connected_to_mainnet<A: BisqApi + ?Sized>(api: &A) -> ApiResult<bool> {
    Ok(api.get_network().await?.eq_ignore_ascii_case("mainnet"))
}

/// Lock an encrypted wallet. Wallet-state failures come back as `NonFatal`.
pub async fn lock_wallet<A: BisqApi + ?Sized>(api: &A) -> ApiResult<()> {
    api.lock_wallet()
        .await
        .map_err(ApiError::into_non_fatal_if_wallet_state)?;
    info!("Wallet is locked.");
    Ok(())
}

pub async fn unlock_wallet<A: BisqApi + ?Sized>(api: &A, password: &str, timeout_secs: u64) -> ApiResult<()> {
    api.unlock_wallet(password, timeout_secs)
        .await
        .map_err(ApiError::into_non_fatal_if_wallet_state)?;
    info!("Wallet is unlocked.");
    Ok(())
}

/// Unlock the wallet for one second; any failure means a bad password.
pub async fn validate_wallet_password<A: BisqApi + ?Sized>(api: &A, password: &str) -> ApiResult<()> {
    if let Err(e) = api.unlock_wallet(password, 1).await {
        error!("Wallet password check failed.");
        error!("{}", e.clean_message());
        return Err(e);
    }
    Ok(())
}

pub async fn stop_daemon<A: BisqApi + ?Sized>(api: &A) -> ApiResult<()> {
    api.stop().await?;
    info!("API server shutdown request sent.");
    Ok(())
}

/// Lock the wallet and stop the daemon after an unrecoverable error.
/// The caller exits with a non-zero status afterwards.
pub async fn shutdown_after_fatal_error<A: BisqApi + ?Sized>(api: &A, message: &str, pacing: &Pacing) {
    if let Err(e) = lock_wallet(api).await {
        warn!("{}", e);
    }
    error!("{}", message);
    // Ctrl-C skips the wait, the daemon is stopped either way
    if !pacing.sleep(pacing.fatal_error).await {
        warn!("Shutdown requested, stopping daemon now.");
    }
    error!("Sending stop request to daemon.");
    if let Err(e) = stop_daemon(api).await {
        error!("Could not stop daemon: {}", e.clean_message());
    }
}

/// Market price at the currency's price precision
pub async fn current_market_price<A: BisqApi + ?Sized>(api: &A, currency_code: &str) -> ApiResult<Decimal> {
    let price = with_retry(&RetryPolicy::default(), "getmarketprice", || {
        api.get_market_price(currency_code)
    })
    .await?;
    let price = Decimal::from_f64(price).ok_or(ApiError::MissingField("price"))?;
    Ok(price.round_dp_with_strategy(price_precision(currency_code), RoundingStrategy::MidpointAwayFromZero))
}

/// 30-day volume weighted average BSQ price in BTC
pub async fn thirty_day_avg_bsq_price<A: BisqApi + ?Sized>(api: &A) -> ApiResult<Decimal> {
    let price = api.get_average_bsq_trade_price(30).await?;
    Ok(parse_decimal(&price.btc_price))
}

/// Epoch millis of today's local midnight
pub fn midnight_today_millis() -> u64 {
    let today = Local::now().date_naive();
    today
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|midnight| midnight.timestamp_millis().max(0) as u64)
        .unwrap_or(0)
}

pub async fn print_trades_summary_for_today<A: BisqApi + ?Sized>(api: &A, category: Category) -> ApiResult<()> {
    let midnight = midnight_today_millis();
    let trades: Vec<_> = api
        .get_trades(category)
        .await?
        .into_iter()
        .filter(|t| t.date >= midnight)
        .collect();
    if trades.is_empty() {
        info!("No trades to print.");
    } else {
        println!("{}", trades_table(&trades));
    }
    Ok(())
}

/// Normalise a `host:port` peer address
pub fn validate_peer_address(address: &str) -> ApiResult<String> {
    let pattern = Regex::new(r"^\s*([^:\s]+)\s*:\s*([^:\s]*)\s*$")
        .map_err(|e| ApiError::Config(e.to_string()))?;
    let Some(captures) = pattern.captures(address) else {
        return Err(ApiError::Config(format!(
            "{} is invalid. Each address much include a port, i.e, lucky7nerds.onion:9999",
            address.trim()
        )));
    };
    let host = &captures[1];
    let port: u16 = captures[2].parse().map_err(|_| {
        ApiError::Config(format!("Invalid port in preferred trading peer address {}", address.trim()))
    })?;
    Ok(format!("{}:{}", host, port))
}

/// Parse a comma separated list of preferred trading peers; empty means any peer.
pub fn load_preferred_trading_peers(csv: &str) -> ApiResult<Vec<String>> {
    if csv.trim().is_empty() {
        warn!("Non-Fatal Error:  no preferred trading peers defined in config file.");
        return Ok(Vec::new());
    }
    csv.split(',').map(validate_peer_address).collect()
}
