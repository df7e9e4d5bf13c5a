//! Take best priced offer bots
//!
//! One bot for the six taker markets (buy/sell BTC with fiat, buy/sell XMR, buy/sell
//! BSQ by swap). Each round it checks the network fee rate, reads the offer book,
//! and takes the first offer that passes the payment method, preferred peer, price
//! and amount filters. It stops after `max_take_offers` offers were taken.

use super::offer_taker::OfferTaker;
use super::payment_simulator::PaymentSimulator;
use super::{
    current_market_price, is_connected_to_mainnet, load_preferred_trading_peers, lock_wallet,
    ping_daemon, run_countdown, shutdown_after_fatal_error, stop_daemon, thirty_day_avg_bsq_price,
    unlock_wallet, validate_wallet_password, Pacing,
};
use crate::api::BisqApi;
use crate::config::TakerConfig;
use crate::error::{ApiError, ApiResult};
use crate::pricing::{
    above_or_below, calc_target_bsq_price, calc_target_price, is_fixed_price_ge_min_margin,
    is_fixed_price_le_max_margin, is_margin_based_price_ge_target, is_margin_ge_min_margin,
    is_margin_le_max_margin, is_within_btc_amount_bounds, sort_by_price,
};
use crate::proto::{OfferInfo, PaymentAccount};
use crate::table::{balances_table, bsq_swap_offers_table, my_offers_table, to_table, yes_no};
use crate::types::{is_altcoin, is_bsq, is_xmr, TakerMarket};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

const BSQ_SWAP_PAYMENT_METHOD_ID: &str = "BSQ_SWAP";
const WALLET_UNLOCK_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, Default)]
pub struct TakerOptions {
    /// Pretend to take offers
    pub dry_run: bool,
    /// Complete taken trades on regtest
    pub simulate_regtest_payment: bool,
}

/// What one polling round did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    TxFeeRateTooHigh,
    NoTakeableOffers,
    NoAcceptableOffer,
    Taken,
    /// `max_take_offers` reached
    Finished,
}

/// Reference and target prices for one round
#[derive(Debug, Clone)]
struct TakeCriteria {
    reference_price: Decimal,
    target_price: Decimal,
}

pub struct TakeBestPricedBot<'a, A: BisqApi + ?Sized> {
    api: &'a A,
    config: TakerConfig,
    options: TakerOptions,
    wallet_password: Option<String>,
    pacing: Pacing,
    payment_account: PaymentAccount,
    currency_code: String,
    preferred_trading_peers: Vec<String>,
    /// Offers "taken" during a dry run
    offers_taken: Vec<OfferInfo>,
    num_offers_taken: u32,
    started: Instant,
}

/// Reject accounts the V1 taker markets cannot trade with.
pub fn validate_payment_account(account: &PaymentAccount, market: TakerMarket) -> ApiResult<()> {
    let Some(currency) = account.selected_trade_currency.as_ref() else {
        return Err(ApiError::Config(format!(
            "PaymentAccount with ID '{}' and name '{}' has no selected currency definition.",
            account.id, account.account_name
        )));
    };
    let method_id = account
        .payment_method
        .as_ref()
        .map(|m| m.id.as_str())
        .unwrap_or_default();

    if method_id == "BLOCK_CHAINS" && !is_xmr(&currency.code) {
        return Err(ApiError::Config(format!(
            "This bot only supports fiat and monero (XMR) trading, not the {} altcoin.",
            currency.code
        )));
    }
    if is_bsq(&currency.code) {
        return Err(ApiError::Config("This bot does not support BSQ Swaps.".to_string()));
    }
    match market.fixed_currency() {
        Some(expected) if !currency.code.eq_ignore_ascii_case(expected) => Err(ApiError::Config(format!(
            "The {} market needs a {} payment account, not a {} account.",
            market, expected, currency.code
        ))),
        None if is_altcoin(&currency.code) => Err(ApiError::Config(format!(
            "The {} market needs a fiat payment account, not a {} account.",
            market, currency.code
        ))),
        _ => Ok(()),
    }
}

impl<'a, A: BisqApi + ?Sized> TakeBestPricedBot<'a, A> {
    /// Ping the daemon, then resolve and check the payment account.
    pub async fn new(
        api: &'a A,
        config: TakerConfig,
        options: TakerOptions,
        wallet_password: Option<String>,
        pacing: Pacing,
    ) -> ApiResult<Self> {
        if options.dry_run && options.simulate_regtest_payment {
            return Err(ApiError::Config(
                "--dry-run and --simulate-regtest-payment cannot be used together".to_string(),
            ));
        }
        let started = Instant::now();
        ping_daemon(api, started).await?;

        let accounts = api.get_payment_accounts().await?;
        let payment_account = if config.market.is_bsq_swap() {
            accounts
                .into_iter()
                .find(|a| a.payment_method.as_ref().is_some_and(|m| m.id == BSQ_SWAP_PAYMENT_METHOD_ID))
                .ok_or_else(|| {
                    ApiError::NotFound("Your default BSQ Swap payment account was not found.".to_string())
                })?
        } else {
            let account = accounts
                .into_iter()
                .find(|a| a.id == config.payment_account_id)
                .ok_or_else(|| {
                    ApiError::NotFound(format!(
                        "Payment account with ID '{}' not found.",
                        config.payment_account_id
                    ))
                })?;
            validate_payment_account(&account, config.market)?;
            account
        };

        let currency_code = match config.market.fixed_currency() {
            Some(code) => code.to_string(),
            None => payment_account
                .selected_trade_currency
                .as_ref()
                .map(|c| c.code.clone())
                .unwrap_or_default(),
        };
        let preferred_trading_peers = load_preferred_trading_peers(&config.preferred_trading_peers)?;

        Ok(Self {
            api,
            config,
            options,
            wallet_password,
            pacing,
            payment_account,
            currency_code,
            preferred_trading_peers,
            offers_taken: Vec::new(),
            num_offers_taken: 0,
            started,
        })
    }

    pub fn offers_taken(&self) -> &[OfferInfo] {
        &self.offers_taken
    }

    fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.config.polling_interval_ms)
    }

    /// Poll until `max_take_offers` offers are taken, Ctrl-C, or a fatal error.
    ///
    /// Fatal errors lock the wallet and stop the daemon before they are returned.
    pub async fn run(&mut self) -> ApiResult<u32> {
        if let Err(e) = self.startup_checks().await {
            self.fail(&e).await;
            return Err(e);
        }

        let polling_interval = self.polling_interval();
        loop {
            match self.poll_once().await {
                Ok(PollOutcome::Finished) => break,
                Ok(_) => {}
                Err(e) if e.is_interrupted() => {
                    self.stop_after_interrupt().await;
                    break;
                }
                Err(e) if e.is_non_fatal() => {
                    warn!("{}", e);
                    if let Some(stall) = e.stall() {
                        warn!(
                            "A minute must pass between the previous and the next takeoffer attempt.  \
                             Stalling for {} seconds before the next takeoffer attempt.",
                            (stall + polling_interval).as_secs()
                        );
                        if !run_countdown(&self.pacing.shutdown, stall).await {
                            self.stop_after_interrupt().await;
                            break;
                        }
                    }
                }
                Err(e) => {
                    self.fail(&e).await;
                    return Err(e);
                }
            }

            self.print_dry_run_progress();
            if !run_countdown(&self.pacing.shutdown, polling_interval).await {
                self.stop_after_interrupt().await;
                break;
            }
            if let Err(e) = ping_daemon(self.api, self.started).await {
                self.fail(&e).await;
                return Err(e);
            }
        }
        Ok(self.num_offers_taken)
    }

    async fn stop_after_interrupt(&self) {
        info!(
            "Shutdown requested, stopping bot after taking {} offer(s).",
            self.num_offers_taken
        );
        if !self.options.dry_run {
            if let Err(e) = lock_wallet(self.api).await {
                warn!("{}", e);
            }
        }
    }

    async fn fail(&self, e: &ApiError) {
        error!("{}", e);
        shutdown_after_fatal_error(
            self.api,
            "Shutting down API daemon and bot after failing to take offer.",
            &self.pacing,
        )
        .await;
    }

    async fn startup_checks(&self) -> ApiResult<()> {
        match self.wallet_password.as_deref() {
            Some(password) => validate_wallet_password(self.api, password).await?,
            None if self.options.dry_run => {}
            None => {
                return Err(ApiError::Config(
                    "An encrypted wallet must be unlocked before any offer can be taken; wallet password required."
                        .to_string(),
                ))
            }
        }
        self.print_bot_configuration().await
    }

    async fn print_bot_configuration(&self) -> ApiResult<()> {
        let network = self.api.get_network().await?;
        let mut rows = vec![
            ("Bot OS:".to_string(), format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)),
            ("BTC Network:".to_string(), network.clone()),
            ("My Payment Account:".to_string(), String::new()),
            ("\tPayment Account Id:".to_string(), self.payment_account.id.clone()),
            ("\tAccount Name:".to_string(), self.payment_account.account_name.clone()),
            ("\tCurrency Code:".to_string(), self.currency_code.clone()),
            ("Trading Rules:".to_string(), String::new()),
            (
                "\tMax # of offers bot can take:".to_string(),
                self.config.max_take_offers.to_string(),
            ),
            ("\tMax Tx Fee Rate:".to_string(), format!("{} sats/byte", self.config.max_tx_fee_rate)),
        ];
        let margin_label = if self.config.market.wants_min_margin() {
            "\tMin Market Price Margin:"
        } else {
            "\tMax Market Price Margin:"
        };
        rows.push((margin_label.to_string(), format!("{}%", self.config.market_price_margin)));
        if self.config.market.is_bsq_swap() {
            if network.eq_ignore_ascii_case("mainnet") {
                let avg = thirty_day_avg_bsq_price(self.api).await?;
                rows.push(("\tMainnet 30-Day Avg BSQ Price:".to_string(), format!("{} BTC", avg)));
            } else if let Some(avg) = self.config.avg_bsq_price_override {
                rows.push(("\tRegtest 30-Day Avg BSQ Price:".to_string(), format!("{} BTC", avg)));
            }
        }
        rows.push(("\tMin BTC Amount:".to_string(), format!("{} BTC", self.config.min_amount)));
        rows.push(("\tMax BTC Amount:".to_string(), format!("{} BTC", self.config.max_amount)));
        let peers = if self.preferred_trading_peers.is_empty() {
            "N/A".to_string()
        } else {
            self.preferred_trading_peers.join(", ")
        };
        rows.push(("\tPreferred Trading Peers:".to_string(), peers));
        rows.push((
            "Bot Polling Interval:".to_string(),
            format!("{} ms", self.config.polling_interval_ms),
        ));
        if self.options.dry_run {
            rows.push(("Dry Run:".to_string(), yes_no(true)));
        }
        info!("{}", to_table(&format!("{} Bot Configuration", self.config.market), &rows));
        Ok(())
    }

    /// One polling round, without the countdown.
    pub async fn poll_once(&mut self) -> ApiResult<PollOutcome> {
        if !self.is_tx_fee_rate_low_enough().await? {
            return Ok(PollOutcome::TxFeeRateTooHigh);
        }

        let offers = self.takeable_offers().await?;
        if offers.is_empty() {
            info!("No takeable offers found.");
            return Ok(PollOutcome::NoTakeableOffers);
        }

        let criteria = self.take_criteria().await?;
        self.print_criteria_summary(&criteria);
        info!(
            "Currently available {} offers -- want to take offer with price {} {} {}.",
            self.config.market,
            if self.config.market.wants_min_margin() { ">=" } else { "<=" },
            criteria.target_price,
            self.price_unit()
        );
        info!("\n{}", self.offers_table(&offers));

        let selected = offers.iter().find(|o| self.is_takeable(o, &criteria)).cloned();
        match selected {
            Some(offer) => {
                info!("Will attempt to take offer '{}'.", offer.id);
                self.print_offer_against_criteria(&offer, &criteria);
                self.take(offer).await
            }
            None => {
                info!("No acceptable offer found.  Closest possible candidate did not pass filters:");
                self.print_offer_against_criteria(&offers[0], &criteria);
                Ok(PollOutcome::NoAcceptableOffer)
            }
        }
    }

    async fn is_tx_fee_rate_low_enough(&self) -> ApiResult<bool> {
        let current = self.api.get_tx_fee_rate().await?.fee_service_rate;
        if current <= self.config.max_tx_fee_rate {
            info!("Current tx fee rate: {} sats/byte.", current);
            Ok(true)
        } else {
            warn!(
                "Current network tx fee rate ({} sats/byte) is too high, it must fall below configured max fee rate ({} sats/byte) before attempting to take an offer.",
                current, self.config.max_tx_fee_rate
            );
            Ok(false)
        }
    }

    /// Offers not already taken, best price first
    async fn takeable_offers(&self) -> ApiResult<Vec<OfferInfo>> {
        let direction = self.config.market.offer_direction();
        let offers = if self.config.market.is_bsq_swap() {
            self.api.get_bsq_swap_offers(direction).await?
        } else {
            self.api.get_offers(direction, &self.currency_code).await?
        };
        let mut offers: Vec<OfferInfo> = offers
            .into_iter()
            .filter(|o| !self.offers_taken.iter().any(|t| t.id == o.id))
            .collect();
        sort_by_price(&mut offers, self.config.market.wants_min_margin());
        Ok(offers)
    }

    async fn take_criteria(&self) -> ApiResult<TakeCriteria> {
        let margin = self.config.market_price_margin;
        if self.config.market.is_bsq_swap() {
            let reference_price = match self.config.avg_bsq_price_override {
                Some(price) if !is_connected_to_mainnet(self.api).await? => price,
                _ => thirty_day_avg_bsq_price(self.api).await?,
            };
            let target_price = calc_target_bsq_price(margin, reference_price)?;
            return Ok(TakeCriteria {
                reference_price,
                target_price,
            });
        }
        let reference_price = current_market_price(self.api, &self.currency_code).await?;
        let target_price = calc_target_price(margin, reference_price, &self.currency_code)?;
        Ok(TakeCriteria {
            reference_price,
            target_price,
        })
    }

    fn price_unit(&self) -> &str {
        if self.config.market.is_bsq_swap() {
            "BTC"
        } else {
            &self.currency_code
        }
    }

    fn uses_same_payment_method(&self, offer: &OfferInfo) -> bool {
        self.payment_account
            .payment_method
            .as_ref()
            .is_some_and(|m| m.id == offer.payment_method_id)
    }

    /// `None` when no preferred peers are configured
    fn is_preferred_trading_peer(&self, offer: &OfferInfo) -> Option<bool> {
        if self.preferred_trading_peers.is_empty() {
            None
        } else {
            Some(self.preferred_trading_peers.contains(&offer.owner_node_address))
        }
    }

    fn passes_price_filter(&self, offer: &OfferInfo, criteria: &TakeCriteria) -> bool {
        let margin = self.config.market_price_margin;
        let reference = criteria.reference_price;
        match self.config.market {
            TakerMarket::BuyBtc => {
                is_margin_based_price_ge_target(offer, criteria.target_price)
                    || is_fixed_price_ge_min_margin(offer, reference, margin)
            }
            TakerMarket::BuyXmr => {
                is_margin_ge_min_margin(offer, margin) || is_fixed_price_ge_min_margin(offer, reference, margin)
            }
            TakerMarket::SellBtc | TakerMarket::SellXmr => {
                is_margin_le_max_margin(offer, margin) || is_fixed_price_le_max_margin(offer, reference, margin)
            }
            TakerMarket::BuyBsq => is_fixed_price_ge_min_margin(offer, reference, margin),
            TakerMarket::SellBsq => is_fixed_price_le_max_margin(offer, reference, margin),
        }
    }

    fn is_within_amount_bounds(&self, offer: &OfferInfo) -> bool {
        is_within_btc_amount_bounds(offer, self.config.min_amount, self.config.max_amount)
    }

    fn is_takeable(&self, offer: &OfferInfo, criteria: &TakeCriteria) -> bool {
        self.uses_same_payment_method(offer)
            && self.is_preferred_trading_peer(offer).unwrap_or(true)
            && self.passes_price_filter(offer, criteria)
            && self.is_within_amount_bounds(offer)
    }

    fn print_criteria_summary(&self, criteria: &TakeCriteria) {
        let reference = if self.config.market.is_bsq_swap() {
            format!("the 30-day average BSQ trade price of {} BTC", criteria.reference_price)
        } else {
            format!("the current market price of {} {}", criteria.reference_price, self.currency_code)
        };
        let bound = if self.config.market.wants_min_margin() {
            "at or higher than"
        } else {
            "at or less than"
        };
        let margin = self.config.market_price_margin;
        if margin.is_zero() {
            info!("Looking for offers to {}, priced {} {}.", self.config.market, bound, reference);
        } else {
            info!(
                "Looking for offers to {}, priced {} {}% {} {}.",
                self.config.market,
                bound,
                margin.abs(),
                above_or_below(margin),
                reference
            );
        }
    }

    fn print_offer_against_criteria(&self, offer: &OfferInfo, criteria: &TakeCriteria) {
        let unit = self.price_unit();
        let comparison = if self.config.market.wants_min_margin() { ">=" } else { "<=" };
        let reference_label = if self.config.market.is_bsq_swap() {
            "30-day Avg BSQ trade price:"
        } else {
            "Current Market Price:"
        };
        let price_label = if offer.use_market_based_price {
            format!(
                "Is offer's margin based price ({} {}) {} bot's target price ({} {})?",
                offer.price, unit, comparison, criteria.target_price, unit
            )
        } else {
            format!(
                "Is offer's fixed-price ({} {}) {} bot's target price ({} {})?",
                offer.price, unit, comparison, criteria.target_price, unit
            )
        };
        let preferred = match self.is_preferred_trading_peer(offer) {
            Some(is_preferred) => yes_no(is_preferred),
            None => "N/A".to_string(),
        };
        let rows = vec![
            (reference_label.to_string(), format!("{} {}", criteria.reference_price, unit)),
            ("Target Price:".to_string(), format!("{} {}", criteria.target_price, unit)),
            ("Offer Price:".to_string(), format!("{} {}", offer.price, unit)),
            (
                "Offer maker used same payment method?".to_string(),
                yes_no(self.uses_same_payment_method(offer)),
            ),
            ("Is offer maker a preferred trading peer?".to_string(), preferred),
            (price_label, yes_no(self.passes_price_filter(offer, criteria))),
            (
                format!(
                    "Is offer's BTC amount within bot amount bounds ({} BTC - {} BTC)?",
                    self.config.min_amount, self.config.max_amount
                ),
                yes_no(self.is_within_amount_bounds(offer)),
            ),
        ];
        let kind = if offer.use_market_based_price {
            "Margin based"
        } else {
            "Fixed price"
        };
        info!("{}", to_table(&format!("{} offer {} filter results:", kind, offer.id), &rows));
    }

    fn offers_table(&self, offers: &[OfferInfo]) -> String {
        if self.config.market.is_bsq_swap() {
            bsq_swap_offers_table(offers)
        } else {
            my_offers_table(offers, &self.currency_code)
        }
    }

    fn print_dry_run_progress(&self) {
        if self.options.dry_run && !self.offers_taken.is_empty() {
            info!(
                "You have \"taken\" {} offer(s) during dry run:\n{}",
                self.offers_taken.len(),
                self.offers_table(&self.offers_taken)
            );
        }
    }

    async fn print_balances(&self, title: &str) {
        match self.api.get_balances("").await {
            Ok(balances) => info!("{}\n{}", title, balances_table(&balances)),
            Err(e) => warn!("{}", e.clean_message()),
        }
    }

    async fn take(&mut self, offer: OfferInfo) -> ApiResult<PollOutcome> {
        if self.options.dry_run {
            info!("{}", self.offers_table(std::slice::from_ref(&offer)));
            info!("Did not actually take that offer during this simulation.");
            self.offers_taken.push(offer);
            self.num_offers_taken += 1;
        } else {
            let password = self
                .wallet_password
                .clone()
                .ok_or_else(|| ApiError::Config("wallet password required".to_string()))?;
            // overrides the timeout of any earlier unlock
            unlock_wallet(self.api, &password, WALLET_UNLOCK_SECS).await?;
            self.print_balances("Balances Before Take Offer Attempt").await;

            let polling_interval = self.polling_interval();
            if self.config.market.is_bsq_swap() {
                let taker = OfferTaker::bsq_swap(self.api, offer.clone(), polling_interval, self.pacing.clone());
                taker.take_offer().await?;
                self.num_offers_taken += 1;
                info!("You took offer '{}';  waiting on swap completion.", offer.id);
                taker.wait_for_bsq_swap_completion().await?;
                self.print_balances("Balances After Swap Execution").await;
            } else {
                let taker = OfferTaker::v1(
                    self.api,
                    offer.clone(),
                    self.payment_account.clone(),
                    self.config.bisq_trade_fee_currency.clone(),
                    polling_interval,
                    self.pacing.clone(),
                );
                taker.take_offer().await?;
                self.num_offers_taken += 1;
                info!("You took offer '{}';  waiting on new trade contract preparation.", offer.id);
                let trade = taker.wait_for_trade_preparation().await?;
                self.print_balances("Balances After Take Offer Attempt").await;

                if self.options.simulate_regtest_payment {
                    PaymentSimulator::new(
                        self.api,
                        trade.trade_id.clone(),
                        self.currency_code.clone(),
                        polling_interval,
                        self.pacing.clone(),
                    )
                    .run()
                    .await?;
                    self.print_balances("Balances After Simulated Trade Completion").await;
                }
            }
        }

        self.maybe_shutdown_after_successful_take().await
    }

    async fn maybe_shutdown_after_successful_take(&self) -> ApiResult<PollOutcome> {
        if !self.options.dry_run {
            if let Err(e) = lock_wallet(self.api).await {
                warn!("{}", e);
            }
        }
        if self.num_offers_taken < self.config.max_take_offers {
            info!("You have taken {} offer(s) during this bot session.", self.num_offers_taken);
            return Ok(PollOutcome::Taken);
        }

        info!("Shutting down API bot after taking {} offer(s).", self.num_offers_taken);
        if !self.options.dry_run {
            // the desktop UI completes the trades, and it cannot share the data dir with the daemon
            if let Err(e) = stop_daemon(self.api).await {
                warn!("{}", e.clean_message());
            }
        }
        Ok(PollOutcome::Finished)
    }
}
