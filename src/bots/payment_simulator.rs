//! Regtest trade payment simulator
//!
//! Walks a freshly taken trade through the payment steps on a regtest network so
//! the taker bots can be exercised end to end. The trading peer's side is done by
//! hand with the CLI commands logged along the way.

use super::{is_connected_to_mainnet, print_trades_summary_for_today, Pacing};
use crate::api::BisqApi;
use crate::error::ApiResult;
use crate::proto::get_trades_request::Category;
use crate::proto::TradeInfo;
use crate::table::{trade_detail_table, BANNER};
use crate::types::is_btc_buyer;
use std::time::Duration;
use tracing::{info, warn};

/// Regtest peer daemon the CLI hints point at
const PEER_API_PASSWORD: &str = "xyz";
const PEER_API_PORT: u16 = 9999;

pub struct PaymentSimulator<'a, A: BisqApi + ?Sized> {
    api: &'a A,
    trade_id: String,
    currency_code: String,
    polling_interval: Duration,
    pacing: Pacing,
}

impl<'a, A: BisqApi + ?Sized> PaymentSimulator<'a, A> {
    pub fn new(
        api: &'a A,
        trade_id: impl Into<String>,
        currency_code: impl Into<String>,
        polling_interval: Duration,
        pacing: Pacing,
    ) -> Self {
        Self {
            api,
            trade_id: trade_id.into(),
            currency_code: currency_code.into(),
            polling_interval,
            pacing,
        }
    }

    pub async fn run(&self) -> ApiResult<()> {
        if is_connected_to_mainnet(self.api).await? {
            return Err(tonic::Status::permission_denied("API daemon is connected to BTC mainnet!").into());
        }

        self.wait_until("taker deposit tx confirmation", |t| t.is_deposit_confirmed)
            .await?;
        info!("The trade's taker deposit tx has been confirmed on the bitcoin blockchain.");

        let trade = self.api.get_trade(&self.trade_id).await?;
        if is_btc_buyer(&trade) {
            self.send_payment_started().await?;
            print_cli_command(
                &format!(
                    "BTC seller must manually confirm {} payment was received with a confirmpaymentreceived CLI command:",
                    self.currency_code
                ),
                &format!("confirmpaymentreceived --trade-id={}", self.trade_id),
            );
            self.wait_until("payment received confirmation", |t| t.is_payment_received_message_sent)
                .await?;
            info!("The trade's {} payment receipt has been confirmed.", self.currency_code);
        } else {
            print_cli_command(
                &format!(
                    "BTC buyer must manually confirm {} payment has been sent with a confirmpaymentstarted CLI command:",
                    self.currency_code
                ),
                &format!("confirmpaymentstarted --trade-id={}", self.trade_id),
            );
            self.wait_until("payment started message", |t| t.is_payment_started_message_sent)
                .await?;
            info!("The trade's {} payment has been sent.", self.currency_code);
            self.send_payment_received().await?;
        }

        self.pause(self.polling_interval).await?;
        self.api.close_trade(&self.trade_id).await?;
        info!("You closed the trade here in the bot (mandatory, to move trades to history list).");
        print_cli_command(
            "Trading peer must manually close trade with a closetrade CLI command:",
            &format!("closetrade --trade-id={}", self.trade_id),
        );

        self.pause(self.polling_interval).await?;
        info!("Trade is completed.  Here are today's completed trades:");
        print_trades_summary_for_today(self.api, Category::Closed).await
    }

    async fn pause(&self, duration: Duration) -> ApiResult<()> {
        self.pacing.pause(duration).await.inspect_err(|_| {
            warn!("Payment simulation interrupted for trade {}.", self.trade_id);
        })
    }

    /// Poll the trade until `done` holds.
    async fn wait_until<F>(&self, what: &str, done: F) -> ApiResult<TradeInfo>
    where
        F: Fn(&TradeInfo) -> bool,
    {
        let mut trade = self.api.get_trade(&self.trade_id).await?;
        while !done(&trade) {
            info!("Waiting for {} on trade {}.", what, self.trade_id);
            self.pause(self.polling_interval).await?;
            trade = self.api.get_trade(&self.trade_id).await?;
        }
        println!("{}", trade_detail_table(&trade));
        Ok(trade)
    }

    async fn send_payment_started(&self) -> ApiResult<()> {
        info!("You send a {} payment started message to the BTC seller.", self.currency_code);
        self.pause(self.polling_interval).await?;
        self.api.confirm_payment_started(&self.trade_id).await?;
        self.pause(self.pacing.payment_step).await?;
        let trade = self.api.get_trade(&self.trade_id).await?;
        println!("{}", trade_detail_table(&trade));
        info!("You sent a {} payment started message to the BTC seller.", self.currency_code);
        Ok(())
    }

    async fn send_payment_received(&self) -> ApiResult<()> {
        info!(
            "You confirm {} payment was received to your wallet before sending confirmpaymentreceived to the BTC buyer.",
            self.currency_code
        );
        self.pause(self.polling_interval).await?;
        self.api.confirm_payment_received(&self.trade_id).await?;
        self.pause(self.pacing.payment_step).await?;
        let trade = self.api.get_trade(&self.trade_id).await?;
        println!("{}", trade_detail_table(&trade));
        info!("You sent a confirmpaymentreceived message to the BTC buyer.");
        Ok(())
    }
}

fn print_cli_command(instruction: &str, command: &str) {
    warn!("{}", BANNER);
    warn!("{}", instruction);
    warn!(
        "./bisq-cli --password={} --port={} {}",
        PEER_API_PASSWORD, PEER_API_PORT, command
    );
    warn!("{}", BANNER);
}
