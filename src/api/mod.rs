//! Daemon API traits
//!
//! Bots talk to the daemon through these traits rather than `BisqClient`
//! directly so they can run against an in-memory daemon in tests.

#[cfg(test)]
pub mod mock;

use crate::client::BisqClient;
use crate::error::ApiResult;
use crate::proto::get_offer_category_reply::OfferCategory;
use crate::proto::get_trades_request::Category;
use crate::proto::{
    AverageBsqTradePrice, BalancesInfo, CreateOfferRequest, EditOfferRequest, OfferInfo,
    PaymentAccount, TakeOfferReply, TakeOfferRequest, TradeInfo, TxFeeRateInfo,
};
use crate::types::Direction;
use async_trait::async_trait;

#[async_trait]
pub trait OffersApi: Send + Sync {
    async fn get_offer(&self, offer_id: &str) -> ApiResult<OfferInfo>;
    async fn get_my_offer(&self, offer_id: &str) -> ApiResult<OfferInfo>;
    async fn get_offers(&self, direction: Direction, currency_code: &str) -> ApiResult<Vec<OfferInfo>>;
    async fn get_my_offers(&self, direction: Direction, currency_code: &str) -> ApiResult<Vec<OfferInfo>>;
    async fn get_bsq_swap_offers(&self, direction: Direction) -> ApiResult<Vec<OfferInfo>>;
    async fn get_my_bsq_swap_offers(&self, direction: Direction) -> ApiResult<Vec<OfferInfo>>;
    async fn get_offer_category(&self, offer_id: &str, is_my_offer: bool) -> ApiResult<OfferCategory>;
    async fn create_offer(&self, request: CreateOfferRequest) -> ApiResult<OfferInfo>;
    async fn create_bsq_swap_offer(
        &self,
        direction: Direction,
        amount: u64,
        min_amount: u64,
        price: &str,
    ) -> ApiResult<OfferInfo>;
    async fn edit_offer(&self, request: EditOfferRequest) -> ApiResult<()>;
    async fn cancel_offer(&self, offer_id: &str) -> ApiResult<()>;
}

#[async_trait]
pub trait TradesApi: Send + Sync {
    async fn get_trade(&self, trade_id: &str) -> ApiResult<TradeInfo>;
    async fn get_trades(&self, category: Category) -> ApiResult<Vec<TradeInfo>>;
    async fn take_offer(&self, request: TakeOfferRequest) -> ApiResult<TakeOfferReply>;
    async fn confirm_payment_started(&self, trade_id: &str) -> ApiResult<()>;
    async fn confirm_payment_received(&self, trade_id: &str) -> ApiResult<()>;
    async fn close_trade(&self, trade_id: &str) -> ApiResult<()>;
}

#[async_trait]
pub trait WalletsApi: Send + Sync {
    async fn get_balances(&self, currency_code: &str) -> ApiResult<BalancesInfo>;
    async fn get_network(&self) -> ApiResult<String>;
    async fn get_tx_fee_rate(&self) -> ApiResult<TxFeeRateInfo>;
    async fn lock_wallet(&self) -> ApiResult<()>;
    async fn unlock_wallet(&self, password: &str, timeout_secs: u64) -> ApiResult<()>;
}

#[async_trait]
pub trait DaemonApi: Send + Sync {
    async fn get_version(&self) -> ApiResult<String>;
    async fn stop(&self) -> ApiResult<()>;
    async fn get_market_price(&self, currency_code: &str) -> ApiResult<f64>;
    async fn get_average_bsq_trade_price(&self, days: i32) -> ApiResult<AverageBsqTradePrice>;
    async fn get_payment_accounts(&self) -> ApiResult<Vec<PaymentAccount>>;
}

/// Everything a bot may call
pub trait BisqApi: OffersApi + TradesApi + WalletsApi + DaemonApi {}

impl<T: OffersApi + TradesApi + WalletsApi + DaemonApi> BisqApi for T {}

#[async_trait]
impl OffersApi for BisqClient {
    async fn get_offer(&self, offer_id: &str) -> ApiResult<OfferInfo> {
        BisqClient::get_offer(self, offer_id).await
    }

    async fn get_my_offer(&self, offer_id: &str) -> ApiResult<OfferInfo> {
        BisqClient::get_my_offer(self, offer_id).await
    }

    async fn get_offers(&self, direction: Direction, currency_code: &str) -> ApiResult<Vec<OfferInfo>> {
        BisqClient::get_offers(self, direction, currency_code).await
    }

    async fn get_my_offers(&self, direction: Direction, currency_code: &str) -> ApiResult<Vec<OfferInfo>> {
        BisqClient::get_my_offers(self, direction, currency_code).await
    }

    async fn get_bsq_swap_offers(&self, direction: Direction) -> ApiResult<Vec<OfferInfo>> {
        BisqClient::get_bsq_swap_offers(self, direction).await
    }

    async fn get_my_bsq_swap_offers(&self, direction: Direction) -> ApiResult<Vec<OfferInfo>> {
        BisqClient::get_my_bsq_swap_offers(self, direction).await
    }

    async fn get_offer_category(&self, offer_id: &str, is_my_offer: bool) -> ApiResult<OfferCategory> {
        BisqClient::get_offer_category(self, offer_id, is_my_offer).await
    }

    async fn create_offer(&self, request: CreateOfferRequest) -> ApiResult<OfferInfo> {
        BisqClient::create_offer(self, request).await
    }

    async fn create_bsq_swap_offer(
        &self,
        direction: Direction,
        amount: u64,
        min_amount: u64,
        price: &str,
    ) -> ApiResult<OfferInfo> {
        BisqClient::create_bsq_swap_offer(self, direction, amount, min_amount, price).await
    }

    async fn edit_offer(&self, request: EditOfferRequest) -> ApiResult<()> {
        BisqClient::edit_offer(self, request).await
    }

    async fn cancel_offer(&self, offer_id: &str) -> ApiResult<()> {
        BisqClient::cancel_offer(self, offer_id).await
    }
}

#[async_trait]
impl TradesApi for BisqClient {
    async fn get_trade(&self, trade_id: &str) -> ApiResult<TradeInfo> {
        BisqClient::get_trade(self, trade_id).await
    }

    async fn get_trades(&self, category: Category) -> ApiResult<Vec<TradeInfo>> {
        BisqClient::get_trades(self, category).await
    }

    async fn take_offer(&self, request: TakeOfferRequest) -> ApiResult<TakeOfferReply> {
        BisqClient::take_offer(self, request).await
    }

    async fn confirm_payment_started(&self, trade_id: &str) -> ApiResult<()> {
        BisqClient::confirm_payment_started(self, trade_id).await
    }

    async fn confirm_payment_received(&self, trade_id: &str) -> ApiResult<()> {
        BisqClient::confirm_payment_received(self, trade_id).await
    }

    async fn close_trade(&self, trade_id: &str) -> ApiResult<()> {
        BisqClient::close_trade(self, trade_id).await
    }
}

#[async_trait]
impl WalletsApi for BisqClient {
    async fn get_balances(&self, currency_code: &str) -> ApiResult<BalancesInfo> {
        BisqClient::get_balances(self, currency_code).await
    }

    async fn get_network(&self) -> ApiResult<String> {
        BisqClient::get_network(self).await
    }

    async fn get_tx_fee_rate(&self) -> ApiResult<TxFeeRateInfo> {
        BisqClient::get_tx_fee_rate(self).await
    }

    async fn lock_wallet(&self) -> ApiResult<()> {
        BisqClient::lock_wallet(self).await
    }

    async fn unlock_wallet(&self, password: &str, timeout_secs: u64) -> ApiResult<()> {
        BisqClient::unlock_wallet(self, password, timeout_secs).await
    }
}

#[async_trait]
impl DaemonApi for BisqClient {
    async fn get_version(&self) -> ApiResult<String> {
        BisqClient::get_version(self).await
    }

    async fn stop(&self) -> ApiResult<()> {
        BisqClient::stop(self).await
    }

    async fn get_market_price(&self, currency_code: &str) -> ApiResult<f64> {
        BisqClient::get_market_price(self, currency_code).await
    }

    async fn get_average_bsq_trade_price(&self, days: i32) -> ApiResult<AverageBsqTradePrice> {
        BisqClient::get_average_bsq_trade_price(self, days).await
    }

    async fn get_payment_accounts(&self) -> ApiResult<Vec<PaymentAccount>> {
        BisqClient::get_payment_accounts(self).await
    }
}
