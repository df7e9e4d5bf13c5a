//! Trade events raised when a bot reaches a manual protocol step

use crate::proto::TradeInfo;
use crate::table::banner_lines;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeEventKind {
    MustSendPaymentStartedMsg,
    MustSendPaymentReceivedMsg,
}

impl fmt::Display for TradeEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeEventKind::MustSendPaymentStartedMsg => write!(f, "MUST_SEND_PAYMENT_STARTED_MSG_EVENT"),
            TradeEventKind::MustSendPaymentReceivedMsg => write!(f, "MUST_SEND_PAYMENT_RECEIVED_MSG_EVENT"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub kind: TradeEventKind,
    pub trade: TradeInfo,
    pub message: String,
}

impl TradeEvent {
    pub fn must_send_payment_started(trade: TradeInfo) -> Self {
        Self {
            kind: TradeEventKind::MustSendPaymentStartedMsg,
            trade,
            message: "Send trade payment and click the button.".to_string(),
        }
    }

    pub fn must_send_payment_received(trade: TradeInfo) -> Self {
        Self {
            kind: TradeEventKind::MustSendPaymentReceivedMsg,
            trade,
            message: "Confirm trade payment was received and click the button.".to_string(),
        }
    }

    /// Command line that completes the manual step
    pub fn completion_command(&self) -> String {
        let subcommand = match self.kind {
            TradeEventKind::MustSendPaymentStartedMsg => "confirm-payment-started",
            TradeEventKind::MustSendPaymentReceivedMsg => "confirm-payment-received",
        };
        format!("bisq-bots sepa-mm {} {}", subcommand, self.trade.trade_id)
    }
}

pub type TradeEventTx = mpsc::UnboundedSender<TradeEvent>;
pub type TradeEventRx = mpsc::UnboundedReceiver<TradeEvent>;

#[derive(Debug, Clone)]
pub struct EventDispatcher {
    tx: TradeEventTx,
}

impl EventDispatcher {
    pub fn new() -> (Self, TradeEventRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn dispatch(&self, event: TradeEvent) {
        debug!("Dispatching {} for trade {}", event.kind, event.trade.trade_id);
        if self.tx.send(event).is_err() {
            warn!("Trade event listener is gone, event dropped");
        }
    }
}

/// Log every event with the command the user must run.
pub fn spawn_log_listener(mut rx: TradeEventRx) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let lines = banner_lines(&[
                format!("{} (trade {})", event.kind, event.trade.trade_id),
                event.message.clone(),
                format!("When done, run: {}", event.completion_command()),
            ]);
            for line in lines {
                warn!("{}", line);
            }
        }
    })
}
