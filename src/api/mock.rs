//! In-memory API daemon for bot tests

use super::{DaemonApi, OffersApi, TradesApi, WalletsApi};
use crate::error::ApiResult;
use crate::proto::get_offer_category_reply::OfferCategory;
use crate::proto::get_trades_request::Category;
use crate::proto::*;
use crate::types::{is_altcoin, Direction};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct FakeState {
    pub version: String,
    pub network: String,
    pub market_prices: HashMap<String, f64>,
    pub avg_bsq_price: AverageBsqTradePrice,
    /// Offers made by other traders
    pub offers: Vec<OfferInfo>,
    pub my_offers: Vec<OfferInfo>,
    pub open_trades: Vec<TradeInfo>,
    pub closed_trades: Vec<TradeInfo>,
    pub payment_accounts: Vec<PaymentAccount>,
    pub balances: BalancesInfo,
    pub tx_fee_rate: TxFeeRateInfo,
    pub wallet_password: Option<String>,
    /// Returned once by the next takeoffer call
    pub take_offer_error: Option<tonic::Status>,
    pub get_my_offer_error: Option<tonic::Status>,
    pub take_offer_failure: Option<AvailabilityResultWithDescription>,
    /// Taken trades start deposit-confirmed and the peer completes its steps
    pub peer_completes_steps: bool,
    pub stopped: bool,
    /// Mutating calls, in order
    pub calls: Vec<String>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct FakeDaemon {
    state: Mutex<FakeState>,
}

pub fn offer(id: &str, direction: &str, currency: &str, price: &str, volume: &str) -> OfferInfo {
    let (base, counter) = if is_altcoin(currency) {
        (currency.to_string(), "BTC".to_string())
    } else {
        ("BTC".to_string(), currency.to_string())
    };
    OfferInfo {
        id: id.to_string(),
        direction: direction.to_string(),
        price: price.to_string(),
        volume: volume.to_string(),
        amount: 1_000_000,
        min_amount: 1_000_000,
        base_currency_code: base,
        counter_currency_code: counter,
        payment_method_id: "SEPA".to_string(),
        owner_node_address: "peer.onion:9999".to_string(),
        ..Default::default()
    }
}

pub fn bsq_swap_offer(id: &str, direction: &str, price: &str) -> OfferInfo {
    OfferInfo {
        is_bsq_swap_offer: true,
        payment_method_id: "BSQ_SWAP".to_string(),
        ..offer(id, direction, "BSQ", price, "0")
    }
}

pub fn payment_account(id: &str, method: &str, currency: &str) -> PaymentAccount {
    PaymentAccount {
        id: id.to_string(),
        account_name: format!("{} account", method),
        payment_method: Some(PaymentMethod {
            id: method.to_string(),
            ..Default::default()
        }),
        selected_trade_currency: Some(TradeCurrency {
            code: currency.to_string(),
            name: currency.to_string(),
        }),
        ..Default::default()
    }
}

fn offer_currency(offer: &OfferInfo) -> &str {
    if offer.base_currency_code == "BTC" {
        &offer.counter_currency_code
    } else {
        &offer.base_currency_code
    }
}

impl FakeDaemon {
    pub fn new() -> Self {
        let daemon = Self::default();
        {
            let mut state = daemon.state();
            state.version = "1.9.4".to_string();
            state.network = "regtest".to_string();
        }
        daemon
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }

    fn find_trade<F: FnOnce(&mut TradeInfo)>(&self, trade_id: &str, f: F) -> ApiResult<()> {
        let mut state = self.state();
        match state.open_trades.iter_mut().find(|t| t.trade_id == trade_id) {
            Some(trade) => {
                f(trade);
                Ok(())
            }
            None => Err(tonic::Status::not_found(format!("trade with id '{}' not found", trade_id)).into()),
        }
    }
}

#[async_trait]
impl OffersApi for FakeDaemon {
    async fn get_offer(&self, offer_id: &str) -> ApiResult<OfferInfo> {
        let state = self.state();
        state
            .offers
            .iter()
            .chain(state.my_offers.iter())
            .find(|o| o.id == offer_id)
            .cloned()
            .ok_or_else(|| tonic::Status::not_found(format!("offer with id '{}' not found", offer_id)).into())
    }

    async fn get_my_offer(&self, offer_id: &str) -> ApiResult<OfferInfo> {
        let mut state = self.state();
        if let Some(status) = state.get_my_offer_error.take() {
            return Err(status.into());
        }
        state
            .my_offers
            .iter()
            .find(|o| o.id == offer_id)
            .cloned()
            .ok_or_else(|| tonic::Status::not_found(format!("offer with id '{}' not found", offer_id)).into())
    }

    async fn get_offers(&self, direction: Direction, currency_code: &str) -> ApiResult<Vec<OfferInfo>> {
        Ok(self
            .state()
            .offers
            .iter()
            .filter(|o| !o.is_bsq_swap_offer)
            .filter(|o| o.direction.eq_ignore_ascii_case(direction.as_str()))
            .filter(|o| offer_currency(o).eq_ignore_ascii_case(currency_code))
            .cloned()
            .collect())
    }

    async fn get_my_offers(&self, direction: Direction, currency_code: &str) -> ApiResult<Vec<OfferInfo>> {
        Ok(self
            .state()
            .my_offers
            .iter()
            .filter(|o| !o.is_bsq_swap_offer)
            .filter(|o| o.direction.eq_ignore_ascii_case(direction.as_str()))
            .filter(|o| offer_currency(o).eq_ignore_ascii_case(currency_code))
            .cloned()
            .collect())
    }

    async fn get_bsq_swap_offers(&self, direction: Direction) -> ApiResult<Vec<OfferInfo>> {
        Ok(self
            .state()
            .offers
            .iter()
            .filter(|o| o.is_bsq_swap_offer)
            .filter(|o| o.direction.eq_ignore_ascii_case(direction.as_str()))
            .cloned()
            .collect())
    }

    async fn get_my_bsq_swap_offers(&self, direction: Direction) -> ApiResult<Vec<OfferInfo>> {
        Ok(self
            .state()
            .my_offers
            .iter()
            .filter(|o| o.is_bsq_swap_offer)
            .filter(|o| o.direction.eq_ignore_ascii_case(direction.as_str()))
            .cloned()
            .collect())
    }

    async fn get_offer_category(&self, offer_id: &str, is_my_offer: bool) -> ApiResult<OfferCategory> {
        let offer = if is_my_offer {
            self.get_my_offer(offer_id).await?
        } else {
            self.get_offer(offer_id).await?
        };
        Ok(if offer.is_bsq_swap_offer {
            OfferCategory::BsqSwap
        } else if offer.base_currency_code != "BTC" {
            OfferCategory::Altcoin
        } else {
            OfferCategory::Fiat
        })
    }

    async fn create_offer(&self, request: CreateOfferRequest) -> ApiResult<OfferInfo> {
        let mut state = self.state();
        state.next_id += 1;
        let price = if request.use_market_based_price {
            state
                .market_prices
                .get(&request.currency_code)
                .copied()
                .unwrap_or_default()
                .to_string()
        } else {
            request.price.clone()
        };
        let mut created = offer(
            &format!("my-offer-{}", state.next_id),
            &request.direction,
            &request.currency_code,
            &price,
            "0",
        );
        created.is_my_offer = true;
        created.use_market_based_price = request.use_market_based_price;
        created.market_price_margin_pct = request.market_price_margin_pct;
        created.amount = request.amount;
        created.min_amount = request.min_amount;
        created.payment_account_id = request.payment_account_id.clone();
        if let Some(account) = state
            .payment_accounts
            .iter()
            .find(|a| a.id == request.payment_account_id)
        {
            created.payment_method_id = account
                .payment_method
                .as_ref()
                .map(|m| m.id.clone())
                .unwrap_or_default();
        }
        state.my_offers.push(created.clone());
        state.calls.push(format!(
            "createoffer {} {} {}",
            request.direction, request.currency_code, request.market_price_margin_pct
        ));
        Ok(created)
    }

    async fn create_bsq_swap_offer(
        &self,
        direction: Direction,
        amount: u64,
        min_amount: u64,
        price: &str,
    ) -> ApiResult<OfferInfo> {
        let mut state = self.state();
        state.next_id += 1;
        let mut created = bsq_swap_offer(&format!("my-swap-{}", state.next_id), direction.as_str(), price);
        created.is_my_offer = true;
        created.amount = amount;
        created.min_amount = min_amount;
        state.my_offers.push(created.clone());
        state
            .calls
            .push(format!("createbsqswapoffer {} {} {} {}", direction, amount, min_amount, price));
        Ok(created)
    }

    async fn edit_offer(&self, request: EditOfferRequest) -> ApiResult<()> {
        let mut state = self.state();
        let Some(offer) = state.my_offers.iter_mut().find(|o| o.id == request.id) else {
            return Err(tonic::Status::not_found(format!("offer with id '{}' not found", request.id)).into());
        };
        offer.price = request.price.clone();
        state
            .calls
            .push(format!("editoffer {} {} {}", request.id, request.price, request.enable));
        Ok(())
    }

    async fn cancel_offer(&self, offer_id: &str) -> ApiResult<()> {
        let mut state = self.state();
        let before = state.my_offers.len();
        state.my_offers.retain(|o| o.id != offer_id);
        if state.my_offers.len() == before {
            return Err(tonic::Status::not_found(format!("offer with id '{}' not found", offer_id)).into());
        }
        state.calls.push(format!("canceloffer {}", offer_id));
        Ok(())
    }
}

#[async_trait]
impl TradesApi for FakeDaemon {
    async fn get_trade(&self, trade_id: &str) -> ApiResult<TradeInfo> {
        let state = self.state();
        state
            .open_trades
            .iter()
            .chain(state.closed_trades.iter())
            .find(|t| t.trade_id == trade_id)
            .cloned()
            .ok_or_else(|| tonic::Status::not_found(format!("trade with id '{}' not found", trade_id)).into())
    }

    async fn get_trades(&self, category: Category) -> ApiResult<Vec<TradeInfo>> {
        let state = self.state();
        Ok(match category {
            Category::Open => state.open_trades.clone(),
            Category::Closed => state.closed_trades.clone(),
            Category::Failed => Vec::new(),
        })
    }

    async fn take_offer(&self, request: TakeOfferRequest) -> ApiResult<TakeOfferReply> {
        let mut state = self.state();
        state.calls.push(format!(
            "takeoffer {} {} {}",
            request.offer_id, request.payment_account_id, request.taker_fee_currency_code
        ));
        if let Some(status) = state.take_offer_error.take() {
            return Err(status.into());
        }
        if let Some(failure) = state.take_offer_failure.take() {
            return Ok(TakeOfferReply {
                trade: None,
                failure_reason: Some(failure),
            });
        }
        let Some(index) = state.offers.iter().position(|o| o.id == request.offer_id) else {
            return Err(tonic::Status::not_found(format!("offer with id '{}' not found", request.offer_id)).into());
        };
        let offer = state.offers.remove(index);
        let maker_is_buyer = offer.direction.eq_ignore_ascii_case("BUY");
        let peer_done = state.peer_completes_steps;
        let trade = TradeInfo {
            trade_id: offer.id.clone(),
            short_id: offer.id.chars().take(8).collect(),
            date: offer.date,
            role: if maker_is_buyer {
                "BTC seller as taker".to_string()
            } else {
                "BTC buyer as taker".to_string()
            },
            trade_price: offer.price.clone(),
            trade_volume: offer.volume.clone(),
            trade_amount_as_long: offer.amount,
            is_deposit_published: peer_done,
            is_deposit_confirmed: peer_done,
            // A buying maker starts the payment once the deposit is confirmed
            is_payment_started_message_sent: peer_done && maker_is_buyer,
            contract: Some(ContractInfo {
                is_buyer_maker_and_seller_taker: maker_is_buyer,
                ..Default::default()
            }),
            offer: Some(offer),
            ..Default::default()
        };
        state.open_trades.push(trade.clone());
        Ok(TakeOfferReply {
            trade: Some(trade),
            failure_reason: None,
        })
    }

    async fn confirm_payment_started(&self, trade_id: &str) -> ApiResult<()> {
        let peer_done = self.state().peer_completes_steps;
        self.find_trade(trade_id, |t| {
            t.is_payment_started_message_sent = true;
            if peer_done {
                t.is_payment_received_message_sent = true;
                t.is_payout_published = true;
            }
        })?;
        self.record(format!("confirmpaymentstarted {}", trade_id));
        Ok(())
    }

    async fn confirm_payment_received(&self, trade_id: &str) -> ApiResult<()> {
        self.find_trade(trade_id, |t| {
            t.is_payment_received_message_sent = true;
            t.is_payout_published = true;
        })?;
        self.record(format!("confirmpaymentreceived {}", trade_id));
        Ok(())
    }

    async fn close_trade(&self, trade_id: &str) -> ApiResult<()> {
        let mut state = self.state();
        let Some(index) = state.open_trades.iter().position(|t| t.trade_id == trade_id) else {
            return Err(tonic::Status::not_found(format!("trade with id '{}' not found", trade_id)).into());
        };
        let mut trade = state.open_trades.remove(index);
        trade.is_completed = true;
        state.closed_trades.push(trade);
        state.calls.push(format!("closetrade {}", trade_id));
        Ok(())
    }
}

#[async_trait]
impl WalletsApi for FakeDaemon {
    async fn get_balances(&self, _currency_code: &str) -> ApiResult<BalancesInfo> {
        Ok(self.state().balances.clone())
    }

    async fn get_network(&self) -> ApiResult<String> {
        Ok(self.state().network.clone())
    }

    async fn get_tx_fee_rate(&self) -> ApiResult<TxFeeRateInfo> {
        Ok(self.state().tx_fee_rate.clone())
    }

    async fn lock_wallet(&self) -> ApiResult<()> {
        self.record("lockwallet".to_string());
        Ok(())
    }

    async fn unlock_wallet(&self, password: &str, timeout_secs: u64) -> ApiResult<()> {
        let mut state = self.state();
        if let Some(expected) = &state.wallet_password {
            if expected != password {
                return Err(tonic::Status::invalid_argument("incorrect password").into());
            }
        }
        state.calls.push(format!("unlockwallet {}", timeout_secs));
        Ok(())
    }
}

#[async_trait]
impl DaemonApi for FakeDaemon {
    async fn get_version(&self) -> ApiResult<String> {
        Ok(self.state().version.clone())
    }

    async fn stop(&self) -> ApiResult<()> {
        let mut state = self.state();
        state.stopped = true;
        state.calls.push("stop".to_string());
        Ok(())
    }

    async fn get_market_price(&self, currency_code: &str) -> ApiResult<f64> {
        self.state()
            .market_prices
            .get(&currency_code.to_uppercase())
            .copied()
            .ok_or_else(|| tonic::Status::not_found(format!("no price for {}", currency_code)).into())
    }

    async fn get_average_bsq_trade_price(&self, _days: i32) -> ApiResult<AverageBsqTradePrice> {
        Ok(self.state().avg_bsq_price.clone())
    }

    async fn get_payment_accounts(&self) -> ApiResult<Vec<PaymentAccount>> {
        Ok(self.state().payment_accounts.clone())
    }
}
