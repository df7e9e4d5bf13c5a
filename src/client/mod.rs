//! gRPC client for the Bisq API daemon
//!
//! Wraps the generated service clients. Every call carries the API password as
//! `password` metadata and passes the call rate meter first. Methods take plain
//! arguments, build the request message and unwrap the reply.

pub mod rate_meter;
pub mod retry;

pub use rate_meter::{CallClass, CallRateMeter};
pub use retry::{with_retry, RetryPolicy};

use crate::config::ConnectionConfig;
use crate::error::{ApiError, ApiResult};
use crate::proto::get_version_client::GetVersionClient;
use crate::proto::offers_client::OffersClient;
use crate::proto::payment_accounts_client::PaymentAccountsClient;
use crate::proto::price_client::PriceClient;
use crate::proto::shutdown_server_client::ShutdownServerClient;
use crate::proto::trades_client::TradesClient;
use crate::proto::wallets_client::WalletsClient;
use crate::proto::*;
use crate::types::Direction;
use std::sync::Arc;
use std::time::Duration;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tracing::debug;

/// Puts the API password on every outgoing request
#[derive(Debug, Clone)]
pub struct PasswordInterceptor {
    password: AsciiMetadataValue,
}

impl PasswordInterceptor {
    pub fn new(password: &str) -> ApiResult<Self> {
        let password = AsciiMetadataValue::try_from(password).map_err(|_| ApiError::InvalidMetadata)?;
        Ok(Self { password })
    }
}

impl Interceptor for PasswordInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert("password", self.password.clone());
        Ok(request)
    }
}

type AuthChannel = InterceptedService<Channel, PasswordInterceptor>;

/// Connected API daemon client. Cheap to clone; clones share the channel and rate meter.
#[derive(Clone)]
pub struct BisqClient {
    version: GetVersionClient<AuthChannel>,
    shutdown: ShutdownServerClient<AuthChannel>,
    offers: OffersClient<AuthChannel>,
    trades: TradesClient<AuthChannel>,
    wallets: WalletsClient<AuthChannel>,
    price: PriceClient<AuthChannel>,
    payment_accounts: PaymentAccountsClient<AuthChannel>,
    meter: Arc<CallRateMeter>,
}

impl BisqClient {
    /// Connect to the daemon at `http://host:port`.
    pub async fn connect(config: &ConnectionConfig) -> ApiResult<Self> {
        let interceptor = PasswordInterceptor::new(&config.api_password)?;

        debug!("Connecting to API daemon at {}", config.endpoint_uri());
        let channel = Endpoint::from_shared(config.endpoint_uri())?
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.call_timeout_secs))
            .connect()
            .await?;

        Ok(Self {
            version: GetVersionClient::with_interceptor(channel.clone(), interceptor.clone()),
            shutdown: ShutdownServerClient::with_interceptor(channel.clone(), interceptor.clone()),
            offers: OffersClient::with_interceptor(channel.clone(), interceptor.clone()),
            trades: TradesClient::with_interceptor(channel.clone(), interceptor.clone()),
            wallets: WalletsClient::with_interceptor(channel.clone(), interceptor.clone()),
            price: PriceClient::with_interceptor(channel.clone(), interceptor.clone()),
            payment_accounts: PaymentAccountsClient::with_interceptor(channel, interceptor),
            meter: Arc::new(CallRateMeter::new()),
        })
    }

    async fn metered(&self, class: CallClass, method: &str) {
        self.meter.acquire(class).await;
        debug!("-> {}", method);
    }

    pub async fn get_version(&self) -> ApiResult<String> {
        self.metered(CallClass::General, "GetVersion").await;
        let reply = self
            .version
            .clone()
            .get_version(GetVersionRequest {})
            .await?
            .into_inner();
        Ok(reply.version)
    }

    pub async fn stop(&self) -> ApiResult<()> {
        self.metered(CallClass::General, "Stop").await;
        self.shutdown.clone().stop(StopRequest {}).await?;
        Ok(())
    }

    pub async fn get_offer(&self, offer_id: &str) -> ApiResult<OfferInfo> {
        self.metered(CallClass::General, "GetOffer").await;
        let reply = self
            .offers
            .clone()
            .get_offer(GetOfferRequest {
                id: offer_id.to_string(),
            })
            .await?
            .into_inner();
        reply.offer.ok_or(ApiError::MissingField("offer"))
    }

    pub async fn get_my_offer(&self, offer_id: &str) -> ApiResult<OfferInfo> {
        self.metered(CallClass::General, "GetMyOffer").await;
        let reply = self
            .offers
            .clone()
            .get_my_offer(GetMyOfferRequest {
                id: offer_id.to_string(),
            })
            .await?
            .into_inner();
        reply.offer.ok_or(ApiError::MissingField("offer"))
    }

    /// Available offers, excluding my own
    pub async fn get_offers(
        &self,
        direction: Direction,
        currency_code: &str,
    ) -> ApiResult<Vec<OfferInfo>> {
        self.metered(CallClass::General, "GetOffers").await;
        let reply = self
            .offers
            .clone()
            .get_offers(GetOffersRequest {
                direction: direction.to_string(),
                currency_code: currency_code.to_uppercase(),
            })
            .await?
            .into_inner();
        Ok(reply.offers)
    }

    pub async fn get_my_offers(
        &self,
        direction: Direction,
        currency_code: &str,
    ) -> ApiResult<Vec<OfferInfo>> {
        self.metered(CallClass::General, "GetMyOffers").await;
        let reply = self
            .offers
            .clone()
            .get_my_offers(GetMyOffersRequest {
                direction: direction.to_string(),
                currency_code: currency_code.to_uppercase(),
            })
            .await?
            .into_inner();
        Ok(reply.offers)
    }

    pub async fn get_bsq_swap_offers(&self, direction: Direction) -> ApiResult<Vec<OfferInfo>> {
        self.metered(CallClass::General, "GetBsqSwapOffers").await;
        let reply = self
            .offers
            .clone()
            .get_bsq_swap_offers(GetBsqSwapOffersRequest {
                direction: direction.to_string(),
            })
            .await?
            .into_inner();
        Ok(reply.bsq_swap_offers)
    }

    pub async fn get_my_bsq_swap_offers(&self, direction: Direction) -> ApiResult<Vec<OfferInfo>> {
        self.metered(CallClass::General, "GetMyBsqSwapOffers").await;
        let reply = self
            .offers
            .clone()
            .get_my_bsq_swap_offers(GetBsqSwapOffersRequest {
                direction: direction.to_string(),
            })
            .await?
            .into_inner();
        Ok(reply.bsq_swap_offers)
    }

    pub async fn get_offer_category(
        &self,
        offer_id: &str,
        is_my_offer: bool,
    ) -> ApiResult<get_offer_category_reply::OfferCategory> {
        self.metered(CallClass::General, "GetOfferCategory").await;
        let reply = self
            .offers
            .clone()
            .get_offer_category(GetOfferCategoryRequest {
                id: offer_id.to_string(),
                is_my_offer,
            })
            .await?
            .into_inner();
        Ok(reply.offer_category())
    }

    pub async fn create_offer(&self, mut request: CreateOfferRequest) -> ApiResult<OfferInfo> {
        request.direction = request.direction.to_uppercase();
        request.currency_code = request.currency_code.to_uppercase();
        self.metered(CallClass::General, "CreateOffer").await;
        let reply = self
            .offers
            .clone()
            .create_offer(request)
            .await?
            .into_inner();
        reply.offer.ok_or(ApiError::MissingField("offer"))
    }

    pub async fn create_bsq_swap_offer(
        &self,
        direction: Direction,
        amount: u64,
        min_amount: u64,
        price: &str,
    ) -> ApiResult<OfferInfo> {
        self.metered(CallClass::General, "CreateBsqSwapOffer").await;
        let reply = self
            .offers
            .clone()
            .create_bsq_swap_offer(CreateBsqSwapOfferRequest {
                direction: direction.to_string(),
                amount,
                min_amount,
                price: price.to_string(),
            })
            .await?
            .into_inner();
        reply.bsq_swap_offer.ok_or(ApiError::MissingField("bsq_swap_offer"))
    }

    pub async fn edit_offer(&self, request: EditOfferRequest) -> ApiResult<()> {
        self.metered(CallClass::General, "EditOffer").await;
        self.offers
            .clone()
            .edit_offer(request)
            .await?;
        Ok(())
    }

    pub async fn cancel_offer(&self, offer_id: &str) -> ApiResult<()> {
        self.metered(CallClass::General, "CancelOffer").await;
        self.offers
            .clone()
            .cancel_offer(CancelOfferRequest {
                id: offer_id.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn get_trade(&self, trade_id: &str) -> ApiResult<TradeInfo> {
        self.metered(CallClass::General, "GetTrade").await;
        let reply = self
            .trades
            .clone()
            .get_trade(GetTradeRequest {
                trade_id: trade_id.to_string(),
            })
            .await?
            .into_inner();
        reply.trade.ok_or(ApiError::MissingField("trade"))
    }

    pub async fn get_trades(
        &self,
        category: get_trades_request::Category,
    ) -> ApiResult<Vec<TradeInfo>> {
        self.metered(CallClass::General, "GetTrades").await;
        let reply = self
            .trades
            .clone()
            .get_trades(GetTradesRequest {
                category: category as i32,
            })
            .await?
            .into_inner();
        Ok(reply.trades)
    }

    /// Metered at one call per minute; the daemon refuses faster callers.
    pub async fn take_offer(&self, request: TakeOfferRequest) -> ApiResult<TakeOfferReply> {
        self.metered(CallClass::TakeOffer, "TakeOffer").await;
        let reply = self.trades.clone().take_offer(request).await?;
        Ok(reply.into_inner())
    }

    pub async fn confirm_payment_started(&self, trade_id: &str) -> ApiResult<()> {
        self.metered(CallClass::General, "ConfirmPaymentStarted").await;
        self.trades
            .clone()
            .confirm_payment_started(ConfirmPaymentStartedRequest {
                trade_id: trade_id.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn confirm_payment_received(&self, trade_id: &str) -> ApiResult<()> {
        self.metered(CallClass::General, "ConfirmPaymentReceived").await;
        self.trades
            .clone()
            .confirm_payment_received(ConfirmPaymentReceivedRequest {
                trade_id: trade_id.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn close_trade(&self, trade_id: &str) -> ApiResult<()> {
        self.metered(CallClass::General, "CloseTrade").await;
        self.trades
            .clone()
            .close_trade(CloseTradeRequest {
                trade_id: trade_id.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn fail_trade(&self, trade_id: &str) -> ApiResult<()> {
        self.metered(CallClass::General, "FailTrade").await;
        self.trades
            .clone()
            .fail_trade(FailTradeRequest {
                trade_id: trade_id.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn unfail_trade(&self, trade_id: &str) -> ApiResult<()> {
        self.metered(CallClass::General, "UnFailTrade").await;
        self.trades
            .clone()
            .un_fail_trade(UnFailTradeRequest {
                trade_id: trade_id.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn withdraw_funds(&self, trade_id: &str, address: &str, memo: &str) -> ApiResult<()> {
        self.metered(CallClass::General, "WithdrawFunds").await;
        self.trades
            .clone()
            .withdraw_funds(WithdrawFundsRequest {
                trade_id: trade_id.to_string(),
                address: address.to_string(),
                memo: memo.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Empty currency code returns both BTC and BSQ balances
    pub async fn get_balances(&self, currency_code: &str) -> ApiResult<BalancesInfo> {
        self.metered(CallClass::General, "GetBalances").await;
        let reply = self
            .wallets
            .clone()
            .get_balances(GetBalancesRequest {
                currency_code: currency_code.to_uppercase(),
            })
            .await?
            .into_inner();
        reply.balances.ok_or(ApiError::MissingField("balances"))
    }

    /// Metered at one call per second
    pub async fn get_network(&self) -> ApiResult<String> {
        self.metered(CallClass::GetNetwork, "GetNetwork").await;
        let reply = self
            .wallets
            .clone()
            .get_network(GetNetworkRequest {})
            .await?
            .into_inner();
        Ok(reply.network)
    }

    pub async fn get_tx_fee_rate(&self) -> ApiResult<TxFeeRateInfo> {
        self.metered(CallClass::General, "GetTxFeeRate").await;
        let reply = self
            .wallets
            .clone()
            .get_tx_fee_rate(GetTxFeeRateRequest {})
            .await?
            .into_inner();
        reply
            .tx_fee_rate_info
            .ok_or(ApiError::MissingField("tx_fee_rate_info"))
    }

    pub async fn set_tx_fee_rate_preference(&self, sats_per_vbyte: u64) -> ApiResult<TxFeeRateInfo> {
        self.metered(CallClass::General, "SetTxFeeRatePreference").await;
        let reply = self
            .wallets
            .clone()
            .set_tx_fee_rate_preference(SetTxFeeRatePreferenceRequest {
                tx_fee_rate_preference: sats_per_vbyte,
            })
            .await?
            .into_inner();
        reply
            .tx_fee_rate_info
            .ok_or(ApiError::MissingField("tx_fee_rate_info"))
    }

    pub async fn unset_tx_fee_rate_preference(&self) -> ApiResult<TxFeeRateInfo> {
        self.metered(CallClass::General, "UnsetTxFeeRatePreference").await;
        let reply = self
            .wallets
            .clone()
            .unset_tx_fee_rate_preference(UnsetTxFeeRatePreferenceRequest {})
            .await?
            .into_inner();
        reply
            .tx_fee_rate_info
            .ok_or(ApiError::MissingField("tx_fee_rate_info"))
    }

    pub async fn get_address_balance(&self, address: &str) -> ApiResult<AddressBalanceInfo> {
        self.metered(CallClass::General, "GetAddressBalance").await;
        let reply = self
            .wallets
            .clone()
            .get_address_balance(GetAddressBalanceRequest {
                address: address.to_string(),
            })
            .await?
            .into_inner();
        reply
            .address_balance_info
            .ok_or(ApiError::MissingField("address_balance_info"))
    }

    pub async fn get_funding_addresses(&self) -> ApiResult<Vec<AddressBalanceInfo>> {
        self.metered(CallClass::General, "GetFundingAddresses").await;
        let reply = self
            .wallets
            .clone()
            .get_funding_addresses(GetFundingAddressesRequest {})
            .await?
            .into_inner();
        Ok(reply.address_balance_info)
    }

    pub async fn get_unused_bsq_address(&self) -> ApiResult<String> {
        self.metered(CallClass::General, "GetUnusedBsqAddress").await;
        let reply = self
            .wallets
            .clone()
            .get_unused_bsq_address(GetUnusedBsqAddressRequest {})
            .await?
            .into_inner();
        Ok(reply.address)
    }

    pub async fn send_bsq(&self, address: &str, amount: &str, tx_fee_rate: &str) -> ApiResult<TxInfo> {
        self.metered(CallClass::General, "SendBsq").await;
        let reply = self
            .wallets
            .clone()
            .send_bsq(SendBsqRequest {
                address: address.to_string(),
                amount: amount.to_string(),
                tx_fee_rate: tx_fee_rate.to_string(),
            })
            .await?
            .into_inner();
        reply.tx_info.ok_or(ApiError::MissingField("tx_info"))
    }

    pub async fn send_btc(
        &self,
        address: &str,
        amount: &str,
        tx_fee_rate: &str,
        memo: &str,
    ) -> ApiResult<TxInfo> {
        self.metered(CallClass::General, "SendBtc").await;
        let reply = self
            .wallets
            .clone()
            .send_btc(SendBtcRequest {
                address: address.to_string(),
                amount: amount.to_string(),
                tx_fee_rate: tx_fee_rate.to_string(),
                memo: memo.to_string(),
            })
            .await?
            .into_inner();
        reply.tx_info.ok_or(ApiError::MissingField("tx_info"))
    }

    pub async fn verify_bsq_sent_to_address(&self, address: &str, amount: &str) -> ApiResult<bool> {
        self.metered(CallClass::General, "VerifyBsqSentToAddress").await;
        let reply = self
            .wallets
            .clone()
            .verify_bsq_sent_to_address(VerifyBsqSentToAddressRequest {
                address: address.to_string(),
                amount: amount.to_string(),
            })
            .await?
            .into_inner();
        Ok(reply.is_amount_received)
    }

    pub async fn get_transaction(&self, tx_id: &str) -> ApiResult<TxInfo> {
        self.metered(CallClass::General, "GetTransaction").await;
        let reply = self
            .wallets
            .clone()
            .get_transaction(GetTransactionRequest {
                tx_id: tx_id.to_string(),
            })
            .await?
            .into_inner();
        reply.tx_info.ok_or(ApiError::MissingField("tx_info"))
    }

    pub async fn lock_wallet(&self) -> ApiResult<()> {
        self.metered(CallClass::General, "LockWallet").await;
        self.wallets
            .clone()
            .lock_wallet(LockWalletRequest {})
            .await?;
        Ok(())
    }

    pub async fn unlock_wallet(&self, password: &str, timeout_secs: u64) -> ApiResult<()> {
        self.metered(CallClass::General, "UnlockWallet").await;
        self.wallets
            .clone()
            .unlock_wallet(UnlockWalletRequest {
                password: password.to_string(),
                timeout: timeout_secs,
            })
            .await?;
        Ok(())
    }

    /// `password` is the current password, empty when the wallet is not encrypted yet
    pub async fn set_wallet_password(&self, password: &str, new_password: &str) -> ApiResult<()> {
        self.metered(CallClass::General, "SetWalletPassword").await;
        self.wallets
            .clone()
            .set_wallet_password(SetWalletPasswordRequest {
                password: password.to_string(),
                new_password: new_password.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn remove_wallet_password(&self, password: &str) -> ApiResult<()> {
        self.metered(CallClass::General, "RemoveWalletPassword").await;
        self.wallets
            .clone()
            .remove_wallet_password(RemoveWalletPasswordRequest {
                password: password.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn get_market_price(&self, currency_code: &str) -> ApiResult<f64> {
        self.metered(CallClass::General, "GetMarketPrice").await;
        let reply = self
            .price
            .clone()
            .get_market_price(MarketPriceRequest {
                currency_code: currency_code.to_uppercase(),
            })
            .await?
            .into_inner();
        Ok(reply.price)
    }

    pub async fn get_average_bsq_trade_price(&self, days: i32) -> ApiResult<AverageBsqTradePrice> {
        self.metered(CallClass::General, "GetAverageBsqTradePrice").await;
        let reply = self
            .price
            .clone()
            .get_average_bsq_trade_price(GetAverageBsqTradePriceRequest { days })
            .await?
            .into_inner();
        reply.price.ok_or(ApiError::MissingField("price"))
    }

    pub async fn get_payment_methods(&self) -> ApiResult<Vec<PaymentMethod>> {
        self.metered(CallClass::General, "GetPaymentMethods").await;
        let reply = self
            .payment_accounts
            .clone()
            .get_payment_methods(GetPaymentMethodsRequest {})
            .await?
            .into_inner();
        Ok(reply.payment_methods)
    }

    /// Blank JSON form for creating an account with the given payment method
    pub async fn get_payment_account_form(&self, payment_method_id: &str) -> ApiResult<String> {
        self.metered(CallClass::General, "GetPaymentAccountForm").await;
        let reply = self
            .payment_accounts
            .clone()
            .get_payment_account_form(GetPaymentAccountFormRequest {
                payment_method_id: payment_method_id.to_string(),
            })
            .await?
            .into_inner();
        Ok(reply.payment_account_form_json)
    }

    pub async fn create_payment_account(&self, form_json: &str) -> ApiResult<PaymentAccount> {
        self.metered(CallClass::General, "CreatePaymentAccount").await;
        let reply = self
            .payment_accounts
            .clone()
            .create_payment_account(CreatePaymentAccountRequest {
                payment_account_form: form_json.to_string(),
            })
            .await?
            .into_inner();
        reply
            .payment_account
            .ok_or(ApiError::MissingField("payment_account"))
    }

    pub async fn get_payment_accounts(&self) -> ApiResult<Vec<PaymentAccount>> {
        self.metered(CallClass::General, "GetPaymentAccounts").await;
        let reply = self
            .payment_accounts
            .clone()
            .get_payment_accounts(GetPaymentAccountsRequest {})
            .await?
            .into_inner();
        Ok(reply.payment_accounts)
    }

    pub async fn create_crypto_currency_payment_account(
        &self,
        account_name: &str,
        currency_code: &str,
        address: &str,
        trade_instant: bool,
    ) -> ApiResult<PaymentAccount> {
        self.metered(CallClass::General, "CreateCryptoCurrencyPaymentAccount").await;
        let reply = self
            .payment_accounts
            .clone()
            .create_crypto_currency_payment_account(CreateCryptoCurrencyPaymentAccountRequest {
                account_name: account_name.to_string(),
                currency_code: currency_code.to_uppercase(),
                address: address.to_string(),
                trade_instant,
            })
            .await?
            .into_inner();
        reply
            .payment_account
            .ok_or(ApiError::MissingField("payment_account"))
    }

    pub async fn get_crypto_currency_payment_methods(&self) -> ApiResult<Vec<PaymentMethod>> {
        self.metered(CallClass::General, "GetCryptoCurrencyPaymentMethods").await;
        let reply = self
            .payment_accounts
            .clone()
            .get_crypto_currency_payment_methods(GetCryptoCurrencyPaymentMethodsRequest {})
            .await?
            .into_inner();
        Ok(reply.payment_methods)
    }
}
