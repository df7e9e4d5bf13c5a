//! SEPA market maker bot
//!
//! Keeps one BUY and one SELL margin-priced offer on the order book, moves each
//! open trade on by one automatic protocol step per round, and raises a
//! `TradeEvent` whenever a trade waits on a manual payment confirmation.

use super::events::{EventDispatcher, TradeEvent};
use super::protocol_step::{next_buy_step, next_sell_step, ProtocolStep, ProtocolStepper};
use super::Pacing;
use crate::api::BisqApi;
use crate::config::SepaMmConfig;
use crate::error::ApiResult;
use crate::pricing::{buy_offset_price_margin, sell_offset_price_margin};
use crate::proto::get_trades_request::Category;
use crate::proto::{CreateOfferRequest, OfferInfo, TradeInfo};
use crate::table::{my_offers_table, trades_table};
use crate::types::Direction;
use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;
use tracing::{info, warn};

const BUYER_SECURITY_DEPOSIT_PCT: f64 = 15.0;

pub struct SepaMarketMaker<'a, A: BisqApi + ?Sized> {
    api: &'a A,
    config: SepaMmConfig,
    pacing: Pacing,
    events: EventDispatcher,
}

impl<'a, A: BisqApi + ?Sized> SepaMarketMaker<'a, A> {
    pub fn new(api: &'a A, config: SepaMmConfig, pacing: Pacing, events: EventDispatcher) -> Self {
        Self {
            api,
            config,
            pacing,
            events,
        }
    }

    /// Poll until the iteration limit is reached or Ctrl-C is pressed.
    pub async fn run(&self) -> ApiResult<()> {
        info!("Starting SEPA market maker bot.");
        info!(
            "Reference Price Margin = {:.2}%, Spread = {:.2}%, Amount = {} satoshis, SEPA Payment Account Id = {}",
            self.config.reference_price_margin,
            self.config.target_spread,
            self.config.amount_in_satoshis,
            self.config.sepa_payment_account_id
        );

        let interval = Duration::from_secs(self.config.offers_poll_interval_in_sec);
        let mut count = 0;
        loop {
            match self.run_cycle().await {
                Err(e) if e.is_interrupted() => break,
                result => result?,
            }
            count += 1;
            if count >= self.config.max_polling_iterations {
                info!("Reached {} polling iterations.", count);
                break;
            }
            info!("Bot is sleeping for {} seconds.", interval.as_secs());
            if !self.pacing.sleep(interval).await {
                break;
            }
        }
        info!("Shutting down SEPA market maker bot.");
        Ok(())
    }

    /// One polling round: make the market, step open trades, show closed trades.
    pub async fn run_cycle(&self) -> ApiResult<()> {
        self.make_market().await?;
        self.pacing.pause(self.pacing.after_make_market).await?;
        self.process_trades(Direction::Buy).await?;
        self.process_trades(Direction::Sell).await?;

        let closed = self.api.get_trades(Category::Closed).await?;
        info!("My Closed Trades:\n{}", trades_table(&closed));
        Ok(())
    }

    /// Make sure there is one BUY and one SELL offer.
    pub async fn make_market(&self) -> ApiResult<(OfferInfo, OfferInfo)> {
        let buy = self.ensure_offer(Direction::Buy).await?;
        let sell = self.ensure_offer(Direction::Sell).await?;
        Ok((buy, sell))
    }

    async fn ensure_offer(&self, direction: Direction) -> ApiResult<OfferInfo> {
        let currency = &self.config.currency_code;
        let existing = self
            .api
            .get_my_offers(direction, currency)
            .await?
            .into_iter()
            .find(|o| o.payment_method_id == self.config.payment_method_id);

        if let Some(offer) = existing {
            info!(
                "My open {} BTC offer:\n{}",
                direction,
                my_offers_table(std::slice::from_ref(&offer), currency)
            );
            return Ok(offer);
        }

        info!("No {} BTC offers.", direction.as_str().to_lowercase());
        let margin = match direction {
            Direction::Buy => {
                buy_offset_price_margin(self.config.reference_price_margin, self.config.target_spread)
            }
            Direction::Sell => {
                sell_offset_price_margin(self.config.reference_price_margin, self.config.target_spread)
            }
        };
        let offer = self
            .api
            .create_offer(CreateOfferRequest {
                currency_code: currency.clone(),
                direction: direction.to_string(),
                use_market_based_price: true,
                market_price_margin_pct: margin.to_f64().unwrap_or_default(),
                amount: self.config.amount_in_satoshis,
                min_amount: self.config.amount_in_satoshis,
                buyer_security_deposit_pct: BUYER_SECURITY_DEPOSIT_PCT,
                payment_account_id: self.config.sepa_payment_account_id.clone(),
                ..Default::default()
            })
            .await?;
        info!(
            "Created new {} BTC offer:\n{}",
            direction,
            my_offers_table(std::slice::from_ref(&offer), currency)
        );
        Ok(offer)
    }

    /// Open trades for my offers in `direction`, on my payment account, oldest first
    async fn open_trades(&self, direction: Direction) -> ApiResult<Vec<TradeInfo>> {
        let mut trades: Vec<TradeInfo> = self
            .api
            .get_trades(Category::Open)
            .await?
            .into_iter()
            .filter(|t| {
                t.offer.as_ref().is_some_and(|o| {
                    o.direction.eq_ignore_ascii_case(direction.as_str())
                        && o.counter_currency_code == self.config.currency_code
                        && o.payment_account_id == self.config.sepa_payment_account_id
                })
            })
            .collect();
        trades.sort_by_key(|t| t.date);
        Ok(trades)
    }

    /// Run one protocol step for each open trade; returns how many were looked at.
    pub async fn process_trades(&self, direction: Direction) -> ApiResult<usize> {
        let trades = self.open_trades(direction).await?;
        if trades.is_empty() {
            info!("There are no open {} trades at this time.", direction);
            return Ok(0);
        }

        info!("Do one protocol step for {} open {} trades.", trades.len(), direction);
        for trade in &trades {
            let stepper = ProtocolStepper::new(self.api, trade.trade_id.clone());
            if stepper.can_execute().await? {
                stepper.run().await?;
                continue;
            }

            warn!("Next protocol step is manual (trade {}).", trade.trade_id);
            let event = match direction {
                Direction::Buy if next_buy_step(trade) == ProtocolStep::SendPaymentStartedMsg => {
                    Some(TradeEvent::must_send_payment_started(trade.clone()))
                }
                Direction::Sell if next_sell_step(trade) == ProtocolStep::SendPaymentReceivedMsg => {
                    Some(TradeEvent::must_send_payment_received(trade.clone()))
                }
                _ => None,
            };
            if let Some(event) = event {
                warn!(
                    "Dispatching {} for trade:\n{}",
                    event.kind,
                    trades_table(std::slice::from_ref(trade))
                );
                self.events.dispatch(event);
            }
        }
        Ok(trades.len())
    }
}

/// Tell the seller the fiat payment has been sent.
pub async fn confirm_payment_started<A: BisqApi + ?Sized>(api: &A, trade_id: &str) -> ApiResult<()> {
    ProtocolStepper::new(api, trade_id).send_payment_started_msg().await
}

/// Tell the buyer the fiat payment has arrived.
pub async fn confirm_payment_received<A: BisqApi + ?Sized>(api: &A, trade_id: &str) -> ApiResult<()> {
    ProtocolStepper::new(api, trade_id).send_payment_received_msg().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{offer, FakeDaemon};
    use crate::bots::events::TradeEventKind;
    use rust_decimal_macros::dec;

    fn config() -> SepaMmConfig {
        SepaMmConfig {
            offers_poll_interval_in_sec: 0,
            reference_price_margin: dec!(0.50),
            target_spread: dec!(3.00),
            amount_in_satoshis: 1_000_000,
            sepa_payment_account_id: "sepa-acct".to_string(),
            max_polling_iterations: 2,
            currency_code: "EUR".to_string(),
            payment_method_id: "SEPA".to_string(),
        }
    }

    fn my_trade(id: &str, direction: &str, account: &str, date: u64, flags: [bool; 3]) -> TradeInfo {
        let mut o = offer(id, direction, "EUR", "40000", "400");
        o.is_my_offer = true;
        o.payment_account_id = account.to_string();
        TradeInfo {
            trade_id: id.to_string(),
            date,
            is_deposit_published: flags[0],
            is_deposit_confirmed: flags[1],
            is_payment_started_message_sent: flags[2],
            offer: Some(o),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_make_market_creates_missing_offers() {
        let daemon = FakeDaemon::new();
        daemon.state().market_prices.insert("EUR".to_string(), 40_000.0);
        let (events, _rx) = EventDispatcher::new();
        let bot = SepaMarketMaker::new(&daemon, config(), Pacing::none(), events);

        let (buy, sell) = bot.make_market().await.unwrap();
        assert_eq!(buy.direction, "BUY");
        assert_eq!(sell.direction, "SELL");
        assert_eq!(
            daemon.calls(),
            vec!["createoffer BUY EUR -1".to_string(), "createoffer SELL EUR 2".to_string()]
        );

        // Second round reuses the offers
        bot.make_market().await.unwrap();
        assert_eq!(daemon.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_make_market_ignores_other_payment_methods() {
        let daemon = FakeDaemon::new();
        let mut zelle = offer("zelle-buy", "BUY", "EUR", "40000", "400");
        zelle.payment_method_id = "ZELLE".to_string();
        daemon.state().my_offers.push(zelle);
        let mut sepa = offer("sepa-sell", "SELL", "EUR", "41000", "410");
        sepa.is_my_offer = true;
        daemon.state().my_offers.push(sepa);
        let (events, _rx) = EventDispatcher::new();
        let bot = SepaMarketMaker::new(&daemon, config(), Pacing::none(), events);

        let (buy, sell) = bot.make_market().await.unwrap();
        assert_eq!(buy.id, "my-offer-1");
        assert_eq!(sell.id, "sepa-sell");
    }

    #[tokio::test]
    async fn test_manual_buy_step_dispatches_event() {
        let daemon = FakeDaemon::new();
        daemon
            .state()
            .open_trades
            .push(my_trade("buy-1", "BUY", "sepa-acct", 10, [true, true, false]));
        let (events, mut rx) = EventDispatcher::new();
        let bot = SepaMarketMaker::new(&daemon, config(), Pacing::none(), events);

        assert_eq!(bot.process_trades(Direction::Buy).await.unwrap(), 1);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, TradeEventKind::MustSendPaymentStartedMsg);
        assert_eq!(event.trade.trade_id, "buy-1");
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_trades_on_other_accounts_are_ignored() {
        let daemon = FakeDaemon::new();
        daemon
            .state()
            .open_trades
            .push(my_trade("sell-1", "SELL", "other-acct", 10, [true, true, true]));
        let (events, mut rx) = EventDispatcher::new();
        let bot = SepaMarketMaker::new(&daemon, config(), Pacing::none(), events);

        assert_eq!(bot.process_trades(Direction::Sell).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_automatic_step_runs_without_event() {
        let daemon = FakeDaemon::new();
        // Seller waiting for the buyer's payment
        daemon
            .state()
            .open_trades
            .push(my_trade("sell-2", "SELL", "sepa-acct", 10, [true, true, false]));
        let (events, mut rx) = EventDispatcher::new();
        let bot = SepaMarketMaker::new(&daemon, config(), Pacing::none(), events);

        assert_eq!(bot.process_trades(Direction::Sell).await.unwrap(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_stops_after_max_iterations() {
        let daemon = FakeDaemon::new();
        let (events, _rx) = EventDispatcher::new();
        let bot = SepaMarketMaker::new(&daemon, config(), Pacing::none(), events);
        bot.run().await.unwrap();
        // Offers are created once and reused on the second iteration
        let creates = daemon.calls().iter().filter(|c| c.starts_with("createoffer")).count();
        assert_eq!(creates, 2);
    }

    #[tokio::test]
    async fn test_run_ends_on_shutdown_between_rounds() {
        let daemon = FakeDaemon::new();
        let (events, _rx) = EventDispatcher::new();
        let config = SepaMmConfig {
            offers_poll_interval_in_sec: 3600,
            max_polling_iterations: 1000,
            ..config()
        };
        let pacing = Pacing::none();
        let trigger = pacing.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let bot = SepaMarketMaker::new(&daemon, config, pacing, events);

        let started = std::time::Instant::now();
        bot.run().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        let creates = daemon.calls().iter().filter(|c| c.starts_with("createoffer")).count();
        assert_eq!(creates, 2);
    }

    #[tokio::test]
    async fn test_shutdown_after_making_market_skips_trade_steps() {
        let daemon = FakeDaemon::new();
        // would raise a manual step event if trades were processed
        daemon
            .state()
            .open_trades
            .push(my_trade("buy-1", "BUY", "sepa-acct", 10, [true, true, false]));
        let (events, mut rx) = EventDispatcher::new();
        let pacing = Pacing {
            after_make_market: Duration::from_secs(3600),
            ..Pacing::none()
        };
        pacing.shutdown.cancel();
        let bot = SepaMarketMaker::new(&daemon, config(), pacing, events);

        bot.run().await.unwrap();
        assert_eq!(
            daemon.calls(),
            vec!["createoffer BUY EUR -1".to_string(), "createoffer SELL EUR 2".to_string()]
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_confirm_payment_started() {
        let daemon = FakeDaemon::new();
        daemon
            .state()
            .open_trades
            .push(my_trade("buy-3", "BUY", "sepa-acct", 10, [true, true, false]));
        confirm_payment_started(&daemon, "buy-3").await.unwrap();
        assert_eq!(daemon.calls(), vec!["confirmpaymentstarted buy-3".to_string()]);
    }
}
