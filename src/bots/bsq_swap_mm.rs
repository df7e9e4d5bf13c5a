//! BSQ swap market maker bot
//!
//! Keeps one BUY and one SELL BSQ swap offer on the book, priced a half spread
//! either side of a configured BTC/BSQ reference price.

use super::sleep_or_shutdown;
use crate::api::BisqApi;
use crate::config::BsqSwapMmConfig;
use crate::error::ApiResult;
use crate::pricing::{buy_offset_price, reference_price_offset, sell_offset_price, spread_midpoint};
use crate::proto::get_trades_request::Category;
use crate::proto::OfferInfo;
use crate::table::{bsq_swap_offers_table, trades_table};
use crate::types::Direction;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct BsqSwapMarketMaker<'a, A: BisqApi + ?Sized> {
    api: &'a A,
    config: BsqSwapMmConfig,
    shutdown: CancellationToken,
}

impl<'a, A: BisqApi + ?Sized> BsqSwapMarketMaker<'a, A> {
    pub fn new(api: &'a A, config: BsqSwapMmConfig, shutdown: CancellationToken) -> Self {
        Self { api, config, shutdown }
    }

    pub fn print_configuration(&self) {
        let offset = reference_price_offset(self.config.reference_price, spread_midpoint(self.config.spread));
        info!(
            "Bot Configuration: Bisq Reference Price = {} BTC  Spread = {}%  Reference Price Offset={:.8} BTC",
            self.config.reference_price, self.config.spread, offset
        );
    }

    pub async fn run(&self) -> ApiResult<()> {
        self.print_configuration();
        let interval = Duration::from_secs(self.config.offers_poll_interval_in_sec);
        let mut count = 0;
        loop {
            self.make_market().await?;
            count += 1;
            if count >= self.config.max_iterations {
                break;
            }
            info!("Going to sleep for {} seconds", interval.as_secs());
            if !sleep_or_shutdown(&self.shutdown, interval).await {
                warn!("Timer interrupted");
                break;
            }
        }
        Ok(())
    }

    /// Make sure there is one BUY and one SELL swap offer, then log closed trades.
    pub async fn make_market(&self) -> ApiResult<(OfferInfo, OfferInfo)> {
        let buy = self.ensure_offer(Direction::Buy).await?;
        let sell = self.ensure_offer(Direction::Sell).await?;

        let closed = self.api.get_trades(Category::Closed).await?;
        info!("My Closed Trades:\n{}", trades_table(&closed));
        Ok((buy, sell))
    }

    fn offer_price(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Buy => buy_offset_price(self.config.reference_price, self.config.spread),
            Direction::Sell => sell_offset_price(self.config.reference_price, self.config.spread),
        }
    }

    async fn ensure_offer(&self, direction: Direction) -> ApiResult<OfferInfo> {
        let label = match direction {
            Direction::Buy => "BUY BTC with BSQ",
            Direction::Sell => "SELL BTC for BSQ",
        };
        if let Some(offer) = self.api.get_my_bsq_swap_offers(direction).await?.into_iter().next() {
            info!(
                "My old {} offer:\n{}",
                label,
                bsq_swap_offers_table(std::slice::from_ref(&offer))
            );
            return Ok(offer);
        }

        info!("\tNo {} offers.", label);
        let price = self.offer_price(direction);
        info!(
            "Creating {} offer with {} sats at price of {:.8} BTC for 1 BSQ.",
            label, self.config.amount, price
        );
        warn!("Remember, a {} offer is an offer to {} BTC!", direction.as_str().to_lowercase(), direction.as_str().to_lowercase());
        let offer = self
            .api
            .create_bsq_swap_offer(
                direction,
                self.config.amount,
                self.config.amount,
                &format!("{:.8}", price),
            )
            .await?;
        info!(
            "My new {} offer:\n{}",
            label,
            bsq_swap_offers_table(std::slice::from_ref(&offer))
        );
        Ok(offer)
    }
}
