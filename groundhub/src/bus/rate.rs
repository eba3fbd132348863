use tokio::time::Instant;

/// Delivery rate limit of a single subscriber.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum RateLimit {
    /// Deliver every message (default value).
    #[default]
    Unlimited,
    /// Deliver at most this many messages per second, with a burst of one.
    PerSecond(f64),
}

impl RateLimit {
    /// Creates a limit from an optional rate. Non-positive or missing rates mean unlimited.
    pub fn from_hz(rate: Option<f64>) -> Self {
        match rate {
            Some(rate) if rate > 0.0 && rate.is_finite() => RateLimit::PerSecond(rate),
            _ => RateLimit::Unlimited,
        }
    }
}

/// Token bucket with a capacity of one token.
///
/// Starts full, so the very first message always passes.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    limit: RateLimit,
    tokens: f64,
    last_refill: Instant,
}

const BURST: f64 = 1.0;

impl RateLimiter {
    pub(crate) fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            tokens: BURST,
            last_refill: Instant::now(),
        }
    }

    /// Consumes a token if one is available.
    pub(crate) fn try_acquire(&mut self) -> bool {
        let rate = match self.limit {
            RateLimit::Unlimited => return true,
            RateLimit::PerSecond(rate) => rate,
        };

        self.refill(rate);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }

        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(BURST);
        self.last_refill = now;
    }
}
