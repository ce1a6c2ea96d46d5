//! Tracks Binance's `X-MBX-USED-WEIGHT-1M`/`X-MBX-ORDER-COUNT-*` response
//! headers so the adapter can classify a response as rate-limited before the
//! venue itself returns a -1003/-1021 error.

use std::sync::atomic::{AtomicU32, Ordering};

const WEIGHT_WARN_THRESHOLD: u32 = 800;
const WEIGHT_HARD_LIMIT: u32 = 1000;

#[derive(Default)]
pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(weight) = headers
            .get("x-mbx-used-weight-1m")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
        {
            self.used_weight_1m.store(weight, Ordering::Relaxed);
            if weight >= WEIGHT_WARN_THRESHOLD {
                tracing::warn!(weight, "approaching binance request weight limit");
            }
        }
    }

    pub fn is_near_limit(&self) -> bool {
        self.used_weight_1m.load(Ordering::Relaxed) >= WEIGHT_HARD_LIMIT
    }
}
