//! Takes one offer and waits for the daemon to set up the new trade

use super::Pacing;
use crate::api::BisqApi;
use crate::error::{ApiError, ApiResult};
use crate::proto::get_offer_category_reply::OfferCategory;
use crate::proto::{OfferInfo, PaymentAccount, TakeOfferRequest, TradeInfo};
use crate::table::trade_detail_table;
use std::time::Duration;
use tonic::Code;
use tracing::info;

const MAX_GET_NEW_TRADE_ATTEMPTS: u32 = 15;

/// The daemon meters takeoffer at one call per minute
const TAKE_OFFER_METER_MS: u64 = 60_005;

pub struct OfferTaker<'a, A: BisqApi + ?Sized> {
    api: &'a A,
    offer: OfferInfo,
    /// Not used for BSQ swaps
    payment_account: Option<PaymentAccount>,
    /// Not used for BSQ swaps
    fee_currency: Option<String>,
    /// Calling bot's polling interval
    polling_interval: Duration,
    pacing: Pacing,
}

impl<'a, A: BisqApi + ?Sized> OfferTaker<'a, A> {
    pub fn bsq_swap(api: &'a A, offer: OfferInfo, polling_interval: Duration, pacing: Pacing) -> Self {
        Self {
            api,
            offer,
            payment_account: None,
            fee_currency: None,
            polling_interval,
            pacing,
        }
    }

    /// For fiat and XMR offers
    pub fn v1(
        api: &'a A,
        offer: OfferInfo,
        payment_account: PaymentAccount,
        fee_currency: impl Into<String>,
        polling_interval: Duration,
        pacing: Pacing,
    ) -> Self {
        Self {
            api,
            offer,
            payment_account: Some(payment_account),
            fee_currency: Some(fee_currency.into()),
            polling_interval,
            pacing,
        }
    }

    /// Send the takeoffer request.
    ///
    /// Offer availability problems, insufficient funds and the takeoffer call
    /// rate limit come back as `ApiError::NonFatal`; the rate limit case carries
    /// a stall long enough for the next request to be accepted.
    pub async fn take_offer(&self) -> ApiResult<OfferCategory> {
        let category = self.api.get_offer_category(&self.offer.id, false).await?;
        let mut request = TakeOfferRequest {
            offer_id: self.offer.id.clone(),
            ..Default::default()
        };
        if category != OfferCategory::BsqSwap {
            let account = self
                .payment_account
                .as_ref()
                .ok_or(ApiError::MissingField("payment_account_id"))?;
            request.payment_account_id = account.id.clone();
            request.taker_fee_currency_code = self.fee_currency.clone().unwrap_or_default();
        }

        let reply = self
            .api
            .take_offer(request)
            .await
            .map_err(|e| self.classify_take_offer_error(e))?;
        if let Some(reason) = reply.failure_reason {
            return Err(ApiError::non_fatal(format!(
                "{}: {}",
                reason.availability_result, reason.description
            )));
        }

        if category == OfferCategory::BsqSwap {
            info!("New BSQ swap '{}' is being executed.", self.offer.id);
        } else {
            info!("New trade '{}' is being prepared.", self.offer.id);
        }
        Ok(category)
    }

    fn classify_take_offer_error(&self, error: ApiError) -> ApiError {
        match error.code() {
            // insufficient funds
            Some(Code::Unavailable) => ApiError::non_fatal(error.clean_message()),
            Some(Code::PermissionDenied) => {
                let polling_ms = self.polling_interval.as_millis() as u64;
                ApiError::NonFatal {
                    message: error.clean_message(),
                    stall: Some(Duration::from_millis(TAKE_OFFER_METER_MS.saturating_sub(polling_ms))),
                }
            }
            _ => error,
        }
    }

    pub async fn wait_for_trade_preparation(&self) -> ApiResult<TradeInfo> {
        let trade = self.prepared_trade().await?;
        info!("New trade has been prepared:");
        println!("{}", trade_detail_table(&trade));
        Ok(trade)
    }

    pub async fn wait_for_bsq_swap_completion(&self) -> ApiResult<TradeInfo> {
        // let the daemon finish the swap before asking for it
        self.pacing.pause(self.pacing.bsq_swap_completion).await?;
        let trade = self.prepared_trade().await?;
        info!("BSQ Swap is complete:");
        println!("{}", trade_detail_table(&trade));
        Ok(trade)
    }

    /// Poll for the new trade once per interval; the last attempt's error is returned as is.
    /// Ctrl-C ends the wait with `ApiError::Interrupted`.
    async fn prepared_trade(&self) -> ApiResult<TradeInfo> {
        for _ in 1..MAX_GET_NEW_TRADE_ATTEMPTS {
            match self.api.get_trade(&self.offer.id).await {
                Ok(trade) if !trade.role.eq_ignore_ascii_case("Not Available") => return Ok(trade),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            self.pacing.pause(self.pacing.new_trade_poll).await?;
        }
        self.api.get_trade(&self.offer.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{bsq_swap_offer, offer, payment_account, FakeDaemon};
    use crate::proto::AvailabilityResultWithDescription;

    fn v1_taker<'a>(daemon: &'a FakeDaemon, id: &str) -> OfferTaker<'a, FakeDaemon> {
        let o = offer(id, "BUY", "EUR", "40000", "400");
        daemon.state().offers.push(o.clone());
        OfferTaker::v1(
            daemon,
            o,
            payment_account("acct-1", "SEPA", "EUR"),
            "BSQ",
            Duration::from_secs(20),
            Pacing::none(),
        )
    }

    #[tokio::test]
    async fn test_take_v1_offer_and_wait() {
        let daemon = FakeDaemon::new();
        let taker = v1_taker(&daemon, "p1");
        assert_eq!(taker.take_offer().await.unwrap(), OfferCategory::Fiat);
        assert_eq!(daemon.calls(), vec!["takeoffer p1 acct-1 BSQ".to_string()]);
        let trade = taker.wait_for_trade_preparation().await.unwrap();
        assert_eq!(trade.role, "BTC seller as taker");
    }

    #[tokio::test]
    async fn test_take_bsq_swap_sends_no_account() {
        let daemon = FakeDaemon::new();
        let o = bsq_swap_offer("swap-1", "SELL", "0.00004");
        daemon.state().offers.push(o.clone());
        let taker = OfferTaker::bsq_swap(&daemon, o, Duration::from_secs(20), Pacing::none());
        assert_eq!(taker.take_offer().await.unwrap(), OfferCategory::BsqSwap);
        assert_eq!(daemon.calls(), vec!["takeoffer swap-1  ".to_string()]);
        assert!(taker.wait_for_bsq_swap_completion().await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_reason_is_non_fatal() {
        let daemon = FakeDaemon::new();
        daemon.state().take_offer_failure = Some(AvailabilityResultWithDescription {
            availability_result: 3,
            description: "offer no longer available".to_string(),
        });
        let taker = v1_taker(&daemon, "p2");
        let err = taker.take_offer().await.unwrap_err();
        assert!(err.is_non_fatal());
        assert_eq!(err.clean_message(), "3: offer no longer available");
    }

    #[tokio::test]
    async fn test_rate_limited_take_offer_stalls() {
        let daemon = FakeDaemon::new();
        daemon.state().take_offer_error = Some(tonic::Status::permission_denied("wait one minute"));
        let taker = v1_taker(&daemon, "p3");
        let err = taker.take_offer().await.unwrap_err();
        assert!(err.is_non_fatal());
        assert_eq!(err.stall(), Some(Duration::from_millis(40_005)));
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_non_fatal() {
        let daemon = FakeDaemon::new();
        daemon.state().take_offer_error = Some(tonic::Status::unavailable("not enough BTC"));
        let taker = v1_taker(&daemon, "p4");
        let err = taker.take_offer().await.unwrap_err();
        assert!(err.is_non_fatal());
        assert_eq!(err.stall(), None);
    }

    #[tokio::test]
    async fn test_other_take_offer_errors_are_fatal() {
        let daemon = FakeDaemon::new();
        daemon.state().take_offer_error = Some(tonic::Status::internal("boom"));
        let taker = v1_taker(&daemon, "p5");
        let err = taker.take_offer().await.unwrap_err();
        assert!(!err.is_non_fatal());
    }

    #[tokio::test]
    async fn test_missing_trade_fails_after_last_attempt() {
        let daemon = FakeDaemon::new();
        let taker = OfferTaker::bsq_swap(
            &daemon,
            offer("never-taken", "BUY", "EUR", "40000", "400"),
            Duration::from_secs(20),
            Pacing::none(),
        );
        let err = taker.wait_for_trade_preparation().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_shutdown_ends_wait_for_new_trade() {
        let daemon = FakeDaemon::new();
        let pacing = Pacing {
            new_trade_poll: Duration::from_secs(3600),
            ..Pacing::none()
        };
        pacing.shutdown.cancel();
        let taker = OfferTaker::bsq_swap(
            &daemon,
            offer("never-taken", "BUY", "EUR", "40000", "400"),
            Duration::from_secs(20),
            pacing,
        );
        let err = taker.wait_for_trade_preparation().await.unwrap_err();
        assert!(err.is_interrupted());
    }

    #[tokio::test]
    async fn test_shutdown_skips_bsq_swap_completion_wait() {
        let daemon = FakeDaemon::new();
        let o = bsq_swap_offer("swap-2", "SELL", "0.00004");
        daemon.state().offers.push(o.clone());
        let pacing = Pacing {
            bsq_swap_completion: Duration::from_secs(3600),
            ..Pacing::none()
        };
        let taker = OfferTaker::bsq_swap(&daemon, o, Duration::from_secs(20), pacing.clone());
        assert_eq!(taker.take_offer().await.unwrap(), OfferCategory::BsqSwap);

        pacing.shutdown.cancel();
        let err = taker.wait_for_bsq_swap_completion().await.unwrap_err();
        assert!(err.is_interrupted());
    }
}
