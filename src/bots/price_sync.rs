//! Best priced offer bot
//!
//! Keeps a set of my offers at the most competitive price found on the order book,
//! within the configured safeguards.

use super::Pacing;
use crate::api::BisqApi;
use crate::client::{with_retry, RetryPolicy};
use crate::config::PriceSyncConfig;
use crate::error::{ApiError, ApiResult};
use crate::pricing::{best_available_price, my_most_competitive_price, PriceSafeguards};
use crate::proto::edit_offer_request::EditType;
use crate::proto::{EditOfferRequest, OfferInfo};
use crate::types::{is_bsq, offer_price};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, warn};

pub struct PriceSyncBot<'a, A: BisqApi + ?Sized> {
    api: &'a A,
    config: PriceSyncConfig,
    pacing: Pacing,
    /// BSQ swap offers are recreated on every price change, so ids move
    synced_offer_ids: Vec<String>,
}

impl<'a, A: BisqApi + ?Sized> PriceSyncBot<'a, A> {
    pub fn new(api: &'a A, config: PriceSyncConfig, pacing: Pacing) -> Self {
        let synced_offer_ids = config.offer_ids.clone();
        Self {
            api,
            config,
            pacing,
            synced_offer_ids,
        }
    }

    pub fn synced_offer_ids(&self) -> &[String] {
        &self.synced_offer_ids
    }

    fn safeguards(&self) -> PriceSafeguards {
        PriceSafeguards {
            min_accepted_amount: self.config.min_accepted_offer_amount_for_price_adaption,
            min_accepted_price: self.config.min_accepted_price,
            max_accepted_price: self.config.max_accepted_price,
        }
    }

    /// Poll until the iteration limit is reached or Ctrl-C is pressed.
    pub async fn run(&mut self) -> ApiResult<()> {
        match self.poll().await {
            Err(e) if e.is_interrupted() => {
                warn!("Timer interrupted");
                Ok(())
            }
            result => result,
        }
    }

    async fn poll(&mut self) -> ApiResult<()> {
        self.update_my_offers_with_my_most_competitive_price().await?;

        let interval = Duration::from_secs(self.config.check_price_interval_in_sec);
        let mut count = 0;
        loop {
            self.check_best_available_price_and_update().await?;
            count += 1;
            if count >= self.config.max_iterations {
                break;
            }
            self.pacing.pause(interval).await?;
        }
        Ok(())
    }

    async fn my_open_offers(&self) -> ApiResult<Vec<OfferInfo>> {
        if is_bsq(&self.config.currency) {
            self.api.get_my_bsq_swap_offers(self.config.direction).await
        } else {
            self.api
                .get_my_offers(self.config.direction, &self.config.currency)
                .await
        }
    }

    async fn available_offers(&self) -> ApiResult<Vec<OfferInfo>> {
        let direction = self.config.direction;
        let currency = self.config.currency.as_str();
        with_retry(&RetryPolicy::default(), "getoffers", || async move {
            if is_bsq(currency) {
                self.api.get_bsq_swap_offers(direction).await
            } else {
                self.api.get_offers(direction, currency).await
            }
        })
        .await
    }

    /// Bring every synced offer up to the best price among my own offers.
    pub async fn update_my_offers_with_my_most_competitive_price(&mut self) -> ApiResult<()> {
        let direction = self.config.direction;
        let currency = self.config.currency.clone();
        info!(
            "Updating or recreating my synced {} {} offers with my most competitive price.",
            direction, currency
        );

        let my_offers = self.my_open_offers().await?;
        let Some(competitive_price) = my_most_competitive_price(&my_offers, direction) else {
            return Err(ApiError::NotFound(format!(
                "I have no {} {} offers to sync.",
                direction, currency
            )));
        };

        let synced: Vec<OfferInfo> = my_offers
            .into_iter()
            .filter(|o| self.synced_offer_ids.contains(&o.id))
            .collect();
        for offer in synced {
            if offer_price(&offer) != competitive_price {
                self.update_my_offer(&offer, competitive_price).await?;
            } else {
                info!(
                    "My synced {} {} offer {} already has my most competitive price ({})",
                    direction, currency, offer.id, offer.price
                );
            }
        }
        Ok(())
    }

    /// One polling round against the available offers.
    pub async fn check_best_available_price_and_update(&mut self) -> ApiResult<()> {
        info!("Polling available offers for the best price...");
        let available = self.available_offers().await?;
        if available.is_empty() {
            info!("No available offers found.");
        }
        let Some(best_price) = best_available_price(&available, self.config.direction, &self.safeguards())
        else {
            warn!("Could not find best available price.");
            return Ok(());
        };
        info!("Best available price is {}.", best_price);

        for offer_id in self.synced_offer_ids.clone() {
            let offer = self.api.get_my_offer(&offer_id).await.map_err(|e| {
                if e.is_not_found() {
                    ApiError::NotFound(format!(
                        "You do not have an offer with id {}. The offer may have been taken or canceled. \
                         Update your config file and restart the bot.",
                        offer_id
                    ))
                } else {
                    e
                }
            })?;

            if offer_price(&offer) != best_price {
                info!(
                    "Update {} {} offer {} price ({}) with a competitive price ({}).",
                    self.config.direction, self.config.currency, offer.id, offer.price, best_price
                );
                self.update_my_offer(&offer, best_price).await?;
            } else {
                info!(
                    "My {} offer {} (with price {}) already has the most competitive price ({}).",
                    offer.direction, offer.id, offer.price, best_price
                );
            }
        }
        Ok(())
    }

    async fn update_my_offer(&mut self, offer: &OfferInfo, price: Decimal) -> ApiResult<()> {
        if offer.is_bsq_swap_offer {
            // Swap offers cannot be edited
            self.api.cancel_offer(&offer.id).await?;
            let new_offer = self
                .api
                .create_bsq_swap_offer(
                    self.config.direction,
                    offer.amount,
                    offer.min_amount,
                    &price.to_string(),
                )
                .await?;
            self.synced_offer_ids.retain(|id| id != &offer.id);
            self.synced_offer_ids.push(new_offer.id.clone());
            info!(
                "Replaced old {} {} offer {} with new offer {} with fixed-price {}.",
                self.config.direction, self.config.currency, offer.id, new_offer.id, new_offer.price
            );
            return Ok(());
        }

        self.api
            .edit_offer(EditOfferRequest {
                id: offer.id.clone(),
                price: price.to_string(),
                enable: -1,
                edit_type: EditType::FixedPriceOnly as i32,
                ..Default::default()
            })
            .await?;
        // wait for the offer to be republished
        self.pacing.pause(self.pacing.offer_republish).await?;
        let updated = self.api.get_my_offer(&offer.id).await?;
        info!(
            "Updated {} {} offer {} with new fixed-price {}.",
            self.config.direction, self.config.currency, updated.id, updated.price
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{bsq_swap_offer, offer, FakeDaemon};
    use crate::types::Direction;
    use rust_decimal_macros::dec;

    fn config(direction: Direction, currency: &str, ids: &[&str], min: Decimal, max: Decimal) -> PriceSyncConfig {
        PriceSyncConfig {
            check_price_interval_in_sec: 0,
            max_iterations: 1,
            offer_ids: ids.iter().map(|s| s.to_string()).collect(),
            direction,
            currency: currency.to_string(),
            min_accepted_offer_amount_for_price_adaption: dec!(100),
            min_accepted_price: min,
            max_accepted_price: max,
        }
    }

    fn mine(id: &str, direction: &str, price: &str) -> OfferInfo {
        let mut o = offer(id, direction, "USD", price, "500");
        o.is_my_offer = true;
        o
    }

    #[tokio::test]
    async fn test_startup_syncs_to_my_most_competitive_price() {
        let daemon = FakeDaemon::new();
        daemon.state().my_offers.push(mine("a", "SELL", "41000"));
        daemon.state().my_offers.push(mine("b", "SELL", "42000"));
        let mut bot = PriceSyncBot::new(
            &daemon,
            config(Direction::Sell, "USD", &["a"], dec!(30000), dec!(50000)),
            Pacing::none(),
        );
        bot.update_my_offers_with_my_most_competitive_price().await.unwrap();
        // SELL sorts descending, so 42000 is the reference
        assert_eq!(daemon.calls(), vec!["editoffer a 42000 -1".to_string()]);
    }

    #[tokio::test]
    async fn test_startup_without_offers_is_fatal() {
        let daemon = FakeDaemon::new();
        let mut bot = PriceSyncBot::new(
            &daemon,
            config(Direction::Buy, "USD", &["a"], dec!(30000), dec!(50000)),
            Pacing::none(),
        );
        let err = bot.update_my_offers_with_my_most_competitive_price().await.unwrap_err();
        assert_eq!(err.clean_message(), "not found: I have no BUY USD offers to sync.");
    }

    #[tokio::test]
    async fn test_poll_updates_to_best_available_price() {
        let daemon = FakeDaemon::new();
        daemon.state().my_offers.push(mine("a", "BUY", "39000"));
        daemon.state().offers.push(offer("p1", "BUY", "USD", "39500", "500"));
        // Below the volume floor
        daemon.state().offers.push(offer("p2", "BUY", "USD", "38000", "50"));
        let mut bot = PriceSyncBot::new(
            &daemon,
            config(Direction::Buy, "USD", &["a"], dec!(30000), dec!(50000)),
            Pacing::none(),
        );
        bot.check_best_available_price_and_update().await.unwrap();
        assert_eq!(daemon.calls(), vec!["editoffer a 39500 -1".to_string()]);
    }

    #[tokio::test]
    async fn test_poll_respects_safeguard() {
        let daemon = FakeDaemon::new();
        daemon.state().my_offers.push(mine("a", "SELL", "41000"));
        daemon.state().offers.push(offer("p1", "SELL", "USD", "60000", "500"));
        let mut bot = PriceSyncBot::new(
            &daemon,
            config(Direction::Sell, "USD", &["a"], dec!(30000), dec!(50000)),
            Pacing::none(),
        );
        bot.check_best_available_price_and_update().await.unwrap();
        assert_eq!(daemon.calls(), vec!["editoffer a 50000 -1".to_string()]);
    }

    #[tokio::test]
    async fn test_poll_without_available_offers_does_nothing() {
        let daemon = FakeDaemon::new();
        daemon.state().my_offers.push(mine("a", "SELL", "41000"));
        let mut bot = PriceSyncBot::new(
            &daemon,
            config(Direction::Sell, "USD", &["a"], dec!(30000), dec!(50000)),
            Pacing::none(),
        );
        bot.check_best_available_price_and_update().await.unwrap();
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_synced_offer_is_fatal() {
        let daemon = FakeDaemon::new();
        daemon.state().offers.push(offer("p1", "SELL", "USD", "45000", "500"));
        let mut bot = PriceSyncBot::new(
            &daemon,
            config(Direction::Sell, "USD", &["gone"], dec!(30000), dec!(50000)),
            Pacing::none(),
        );
        let err = bot.check_best_available_price_and_update().await.unwrap_err();
        assert!(err.to_string().contains("You do not have an offer with id gone."));
    }

    #[tokio::test]
    async fn test_busy_daemon_is_not_reported_as_missing_offer() {
        let daemon = FakeDaemon::new();
        daemon.state().my_offers.push(mine("a", "SELL", "41000"));
        daemon.state().offers.push(offer("p1", "SELL", "USD", "45000", "500"));
        daemon.state().get_my_offer_error = Some(tonic::Status::unavailable("server is busy"));
        let mut bot = PriceSyncBot::new(
            &daemon,
            config(Direction::Sell, "USD", &["a"], dec!(30000), dec!(50000)),
            Pacing::none(),
        );
        let err = bot.check_best_available_price_and_update().await.unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(err.clean_message(), "server is busy");
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_ends_on_shutdown_between_polls() {
        let daemon = FakeDaemon::new();
        daemon.state().my_offers.push(mine("a", "SELL", "41000"));
        let config = PriceSyncConfig {
            check_price_interval_in_sec: 3600,
            max_iterations: 1000,
            ..config(Direction::Sell, "USD", &["a"], dec!(30000), dec!(50000))
        };
        let pacing = Pacing::none();
        let trigger = pacing.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let mut bot = PriceSyncBot::new(&daemon, config, pacing);

        let started = std::time::Instant::now();
        bot.run().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_shutdown_while_offer_republishes_stops_run() {
        let daemon = FakeDaemon::new();
        daemon.state().my_offers.push(mine("a", "SELL", "41000"));
        daemon.state().my_offers.push(mine("b", "SELL", "42000"));
        daemon.state().offers.push(offer("p1", "SELL", "USD", "45000", "500"));
        let pacing = Pacing {
            offer_republish: Duration::from_secs(3600),
            ..Pacing::none()
        };
        pacing.shutdown.cancel();
        let mut bot = PriceSyncBot::new(
            &daemon,
            PriceSyncConfig {
                max_iterations: 5,
                ..config(Direction::Sell, "USD", &["a"], dec!(30000), dec!(50000))
            },
            pacing,
        );

        bot.run().await.unwrap();
        // the first edit goes out, nothing after it
        assert_eq!(daemon.calls(), vec!["editoffer a 42000 -1".to_string()]);
    }

    #[tokio::test]
    async fn test_bsq_swap_offer_is_recreated() {
        let daemon = FakeDaemon::new();
        let mut swap = bsq_swap_offer("swap-a", "BUY", "0.00003800");
        swap.is_my_offer = true;
        swap.amount = 2_000_000;
        swap.min_amount = 1_000_000;
        daemon.state().my_offers.push(swap);
        let mut peer = bsq_swap_offer("p1", "BUY", "0.00003900");
        peer.volume = "500".to_string();
        daemon.state().offers.push(peer);
        let mut bot = PriceSyncBot::new(
            &daemon,
            config(Direction::Buy, "BSQ", &["swap-a"], dec!(0.00003), dec!(0.00005)),
            Pacing::none(),
        );
        bot.check_best_available_price_and_update().await.unwrap();
        assert_eq!(
            daemon.calls(),
            vec![
                "canceloffer swap-a".to_string(),
                "createbsqswapoffer BUY 2000000 1000000 0.00003900".to_string(),
            ]
        );
        assert_eq!(bot.synced_offer_ids(), &["my-swap-1".to_string()]);
    }
}
