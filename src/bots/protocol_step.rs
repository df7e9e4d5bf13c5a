//! Trade protocol step classifier
//!
//! Works out, from a trade's status flags, what has to happen next for my side
//! of the trade. Automatic steps (waiting, closing) run from the bot loop; the
//! two payment confirmations are manual and need the user.

use crate::api::TradesApi;
use crate::error::{ApiError, ApiResult};
use crate::proto::TradeInfo;
use crate::types::i_am_buyer;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolStep {
    WaitForTradeDepositConfirmation,
    WaitForPaymentStartedMsg,
    WaitForPaymentReceivedMsg,
    WaitForPayoutIsPublished,
    SendPaymentStartedMsg,
    SendPaymentReceivedMsg,
    CloseTrade,
    StopBotOpenUiContactSupport,
}

impl ProtocolStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolStep::WaitForTradeDepositConfirmation => "WAIT_FOR_TRADE_DEPOSIT_CONFIRMATION",
            ProtocolStep::WaitForPaymentStartedMsg => "WAIT_FOR_PAYMENT_STARTED_MSG",
            ProtocolStep::WaitForPaymentReceivedMsg => "WAIT_FOR_PAYMENT_RECEIVED_MSG",
            ProtocolStep::WaitForPayoutIsPublished => "WAIT_FOR_PAYOUT_IS_PUBLISHED",
            ProtocolStep::SendPaymentStartedMsg => "SEND_PAYMENT_STARTED_MSG",
            ProtocolStep::SendPaymentReceivedMsg => "SEND_PAYMENT_RECEIVED_MSG",
            ProtocolStep::CloseTrade => "CLOSE_TRADE",
            ProtocolStep::StopBotOpenUiContactSupport => "STOP_BOT_OPEN_UI_CONTACT_SUPPORT",
        }
    }

    /// Steps that need a human: sending or confirming the fiat payment
    pub fn is_manual(&self) -> bool {
        matches!(
            self,
            ProtocolStep::SendPaymentStartedMsg | ProtocolStep::SendPaymentReceivedMsg
        )
    }
}

impl fmt::Display for ProtocolStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeRole {
    Buyer,
    Seller,
}

impl TradeRole {
    pub fn of(trade: &TradeInfo) -> Self {
        if i_am_buyer(trade) {
            TradeRole::Buyer
        } else {
            TradeRole::Seller
        }
    }
}

impl fmt::Display for TradeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeRole::Buyer => write!(f, "buy"),
            TradeRole::Seller => write!(f, "sell"),
        }
    }
}

pub fn next_buy_step(trade: &TradeInfo) -> ProtocolStep {
    next_step(trade, TradeRole::Buyer)
}

pub fn next_sell_step(trade: &TradeInfo) -> ProtocolStep {
    next_step(trade, TradeRole::Seller)
}

pub fn next_step(trade: &TradeInfo, role: TradeRole) -> ProtocolStep {
    if !trade.is_deposit_published || !trade.is_deposit_confirmed {
        ProtocolStep::WaitForTradeDepositConfirmation
    } else if !trade.is_payment_started_message_sent {
        match role {
            TradeRole::Buyer => ProtocolStep::SendPaymentStartedMsg,
            TradeRole::Seller => ProtocolStep::WaitForPaymentStartedMsg,
        }
    } else if !trade.is_payment_received_message_sent {
        match role {
            TradeRole::Buyer => ProtocolStep::WaitForPaymentReceivedMsg,
            TradeRole::Seller => ProtocolStep::SendPaymentReceivedMsg,
        }
    } else if !trade.is_payout_published {
        ProtocolStep::WaitForPayoutIsPublished
    } else if trade.is_payout_published {
        ProtocolStep::CloseTrade
    } else {
        ProtocolStep::StopBotOpenUiContactSupport
    }
}

/// Runs protocol steps for one trade
pub struct ProtocolStepper<'a, A: TradesApi + ?Sized> {
    api: &'a A,
    trade_id: String,
}

impl<'a, A: TradesApi + ?Sized> ProtocolStepper<'a, A> {
    pub fn new(api: &'a A, trade_id: impl Into<String>) -> Self {
        Self {
            api,
            trade_id: trade_id.into(),
        }
    }

    pub fn trade_id(&self) -> &str {
        &self.trade_id
    }

    /// False when my next step is a manual payment confirmation.
    pub async fn can_execute(&self) -> ApiResult<bool> {
        let trade = self.api.get_trade(&self.trade_id).await?;
        let step = next_step(&trade, TradeRole::of(&trade));
        Ok(!step.is_manual())
    }

    /// Execute the next automatic step; returns the step that was found.
    pub async fn run(&self) -> ApiResult<ProtocolStep> {
        info!("Execute automatic protocol step for trade {}.", self.trade_id);
        let trade = self.api.get_trade(&self.trade_id).await?;
        let role = TradeRole::of(&trade);
        let step = next_step(&trade, role);
        info!("\tTrade {}: next {} step: {}", trade.trade_id, role, step);

        match step {
            ProtocolStep::WaitForTradeDepositConfirmation => {
                info!("\tWaiting for trade deposit tx to be confirmed ...");
            }
            ProtocolStep::WaitForPaymentStartedMsg => {
                info!("\tWaiting for buyer to start payment ...");
            }
            ProtocolStep::SendPaymentStartedMsg => {
                warn!("\tPayment must be sent manually, and payment sent msg must be sent from UI.");
            }
            ProtocolStep::SendPaymentReceivedMsg => {
                warn!(
                    "\tPayment receipt must be confirmed manually, and payment received confirmation msg must be sent from UI."
                );
            }
            ProtocolStep::WaitForPaymentReceivedMsg => {
                info!("\tPayment sent, waiting for payment received msg ...");
            }
            ProtocolStep::WaitForPayoutIsPublished => {
                info!("\tPayment received, waiting for payout tx to be published ...");
            }
            ProtocolStep::CloseTrade => {
                info!("\tPayment received, payout tx is published, closing trade ...");
                self.api.close_trade(&self.trade_id).await?;
            }
            ProtocolStep::StopBotOpenUiContactSupport => {
                error!(
                    "Something bad happened.  You have to shutdown the bot, start the desktop UI, and open a support ticket for trade {}",
                    self.trade_id
                );
            }
        }
        Ok(step)
    }

    pub async fn send_payment_started_msg(&self) -> ApiResult<()> {
        let trade = self.api.get_trade(&self.trade_id).await?;
        let step = next_buy_step(&trade);
        if step != ProtocolStep::SendPaymentStartedMsg {
            return Err(ApiError::InvalidTradeState {
                trade_id: trade.trade_id,
                expected: ProtocolStep::SendPaymentStartedMsg.to_string(),
                actual: step.to_string(),
            });
        }
        info!("Sending payment started msg for trade {}.", self.trade_id);
        self.api.confirm_payment_started(&self.trade_id).await
    }

    pub async fn send_payment_received_msg(&self) -> ApiResult<()> {
        let trade = self.api.get_trade(&self.trade_id).await?;
        let step = next_sell_step(&trade);
        if step != ProtocolStep::SendPaymentReceivedMsg {
            return Err(ApiError::InvalidTradeState {
                trade_id: trade.trade_id,
                expected: ProtocolStep::SendPaymentReceivedMsg.to_string(),
                actual: step.to_string(),
            });
        }
        info!("Sending payment received confirmation msg for trade {}.", self.trade_id);
        self.api.confirm_payment_received(&self.trade_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{offer, FakeDaemon};

    fn trade(flags: [bool; 5]) -> TradeInfo {
        TradeInfo {
            trade_id: "trade-1".to_string(),
            is_deposit_published: flags[0],
            is_deposit_confirmed: flags[1],
            is_payment_started_message_sent: flags[2],
            is_payment_received_message_sent: flags[3],
            is_payout_published: flags[4],
            ..Default::default()
        }
    }

    #[test]
    fn test_buy_steps() {
        assert_eq!(
            next_buy_step(&trade([false, false, false, false, false])),
            ProtocolStep::WaitForTradeDepositConfirmation
        );
        assert_eq!(
            next_buy_step(&trade([true, false, false, false, false])),
            ProtocolStep::WaitForTradeDepositConfirmation
        );
        assert_eq!(
            next_buy_step(&trade([true, true, false, false, false])),
            ProtocolStep::SendPaymentStartedMsg
        );
        assert_eq!(
            next_buy_step(&trade([true, true, true, false, false])),
            ProtocolStep::WaitForPaymentReceivedMsg
        );
        assert_eq!(
            next_buy_step(&trade([true, true, true, true, false])),
            ProtocolStep::WaitForPayoutIsPublished
        );
        assert_eq!(
            next_buy_step(&trade([true, true, true, true, true])),
            ProtocolStep::CloseTrade
        );
    }

    #[test]
    fn test_sell_steps() {
        assert_eq!(
            next_sell_step(&trade([true, true, false, false, false])),
            ProtocolStep::WaitForPaymentStartedMsg
        );
        assert_eq!(
            next_sell_step(&trade([true, true, true, false, false])),
            ProtocolStep::SendPaymentReceivedMsg
        );
        assert_eq!(
            next_sell_step(&trade([true, true, true, true, true])),
            ProtocolStep::CloseTrade
        );
    }

    fn fake_with_trade(direction: &str, is_my_offer: bool, flags: [bool; 5]) -> FakeDaemon {
        let daemon = FakeDaemon::new();
        let mut t = trade(flags);
        let mut o = offer("trade-1", direction, "EUR", "40000", "400");
        o.is_my_offer = is_my_offer;
        t.offer = Some(o);
        daemon.state().open_trades.push(t);
        daemon
    }

    #[tokio::test]
    async fn test_buyer_cannot_execute_payment_started() {
        // My BUY offer: I am the buyer and must send the payment
        let daemon = fake_with_trade("BUY", true, [true, true, false, false, false]);
        let stepper = ProtocolStepper::new(&daemon, "trade-1");
        assert!(!stepper.can_execute().await.unwrap());
    }

    #[tokio::test]
    async fn test_seller_can_execute_while_waiting_for_payment() {
        let daemon = fake_with_trade("SELL", true, [true, true, false, false, false]);
        let stepper = ProtocolStepper::new(&daemon, "trade-1");
        assert!(stepper.can_execute().await.unwrap());
        assert_eq!(stepper.run().await.unwrap(), ProtocolStep::WaitForPaymentStartedMsg);
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_closes_trade_when_payout_published() {
        let daemon = fake_with_trade("BUY", false, [true, true, true, true, true]);
        let stepper = ProtocolStepper::new(&daemon, "trade-1");
        assert_eq!(stepper.run().await.unwrap(), ProtocolStep::CloseTrade);
        assert_eq!(daemon.calls(), vec!["closetrade trade-1".to_string()]);
        assert_eq!(daemon.state().closed_trades.len(), 1);
    }

    #[tokio::test]
    async fn test_send_payment_started_in_wrong_state() {
        let daemon = fake_with_trade("BUY", true, [true, false, false, false, false]);
        let stepper = ProtocolStepper::new(&daemon, "trade-1");
        let err = stepper.send_payment_started_msg().await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidTradeState { .. }));
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_send_payment_received() {
        // Taker of a BUY offer is the seller
        let daemon = fake_with_trade("BUY", false, [true, true, true, false, false]);
        let stepper = ProtocolStepper::new(&daemon, "trade-1");
        assert!(!stepper.can_execute().await.unwrap());
        stepper.send_payment_received_msg().await.unwrap();
        assert_eq!(daemon.calls(), vec!["confirmpaymentreceived trade-1".to_string()]);
    }
}
