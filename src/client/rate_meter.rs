//! Call rate meter - token buckets mirroring the API daemon's own call rate meters
//!
//! The daemon rejects calls with PERMISSION_DENIED when a method is called too often:
//! - getnetwork: 1 call per second
//! - takeoffer: 1 call per minute
//!
//! Waiting here before those calls keeps bots from tripping the daemon's meter.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Metered method classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallClass {
    /// Everything without a daemon-side meter
    General,
    GetNetwork,
    TakeOffer,
}

impl CallClass {
    fn max_tokens(&self) -> u32 {
        match self {
            CallClass::General => 100,
            CallClass::GetNetwork => 1,
            CallClass::TakeOffer => 1,
        }
    }

    fn window(&self) -> Duration {
        match self {
            CallClass::General => Duration::from_secs(1),
            CallClass::GetNetwork => Duration::from_secs(1),
            CallClass::TakeOffer => Duration::from_secs(60),
        }
    }
}

struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl TokenBucket {
    fn new(class: CallClass) -> Self {
        let max = class.max_tokens() as f64;
        let window_secs = class.window().as_secs_f64();
        Self {
            tokens: max,
            max_tokens: max,
            refill_rate: max / window_secs,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let deficit = 1.0 - self.tokens;
            Duration::from_secs_f64(deficit / self.refill_rate)
        }
    }
}

/// One bucket per metered call class
pub struct CallRateMeter {
    general: Arc<Mutex<TokenBucket>>,
    get_network: Arc<Mutex<TokenBucket>>,
    take_offer: Arc<Mutex<TokenBucket>>,
}

impl Default for CallRateMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl CallRateMeter {
    pub fn new() -> Self {
        Self {
            general: Arc::new(Mutex::new(TokenBucket::new(CallClass::General))),
            get_network: Arc::new(Mutex::new(TokenBucket::new(CallClass::GetNetwork))),
            take_offer: Arc::new(Mutex::new(TokenBucket::new(CallClass::TakeOffer))),
        }
    }

    /// Wait until a call of the given class is allowed.
    /// Returns true if we had to wait.
    pub async fn acquire(&self, class: CallClass) -> bool {
        let bucket = self.get_bucket(class);
        let mut waited = false;
        loop {
            let wait_time = {
                let mut b = bucket.lock().await;
                if b.try_acquire() {
                    return waited;
                }
                b.time_until_available()
            };

            waited = true;
            debug!("Call rate meter: waiting {:?} for {:?}", wait_time, class);
            tokio::time::sleep(wait_time).await;
        }
    }

    /// Try to acquire a token without waiting.
    pub async fn try_acquire(&self, class: CallClass) -> bool {
        let bucket = self.get_bucket(class);
        let mut b = bucket.lock().await;
        b.try_acquire()
    }

    fn get_bucket(&self, class: CallClass) -> &Arc<Mutex<TokenBucket>> {
        match class {
            CallClass::General => &self.general,
            CallClass::GetNetwork => &self.get_network,
            CallClass::TakeOffer => &self.take_offer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_call_is_not_delayed() {
        let meter = CallRateMeter::new();
        assert!(!meter.acquire(CallClass::GetNetwork).await);
        assert!(!meter.acquire(CallClass::TakeOffer).await);
    }

    #[tokio::test]
    async fn test_take_offer_allows_one_call_per_minute() {
        let meter = CallRateMeter::new();
        assert!(meter.try_acquire(CallClass::TakeOffer).await);
        assert!(!meter.try_acquire(CallClass::TakeOffer).await);
        // Other classes are metered independently
        assert!(meter.try_acquire(CallClass::General).await);
    }

    #[tokio::test]
    async fn test_get_network_waits_for_refill() {
        let meter = CallRateMeter::new();
        meter.acquire(CallClass::GetNetwork).await;
        let start = Instant::now();
        assert!(meter.acquire(CallClass::GetNetwork).await);
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
