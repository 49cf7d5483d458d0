use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window admission control for calls to the external service.
///
/// In-process and best-effort: the window lives in memory only, so a restart
/// begins a fresh window. The external side may enforce its own limits.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    safety_margin: Duration,
    window_start: Instant,
    count: u32,
}

/// Result of one admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// How long the caller was held back. Zero for immediate admissions.
    pub waited: Duration,
}

impl RateLimiter {
    /// `max_per_window` is clamped to at least one call.
    pub fn new(max_per_window: u32, window: Duration, safety_margin: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
            safety_margin,
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Wait until one more call fits in the budget, then count it.
    ///
    /// Cancel-safe: dropping the future while it sleeps leaves the limiter
    /// unchanged.
    pub async fn admit(&mut self) -> Admission {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.count = 0;
        }

        let mut waited = Duration::ZERO;
        if self.count >= self.max_per_window {
            let remaining = self
                .window
                .saturating_sub(now.duration_since(self.window_start));
            waited = remaining + self.safety_margin;
            tracing::warn!(
                "Rate limit {}/{:?} reached; waiting {:.1} minutes",
                self.max_per_window,
                self.window,
                waited.as_secs_f64() / 60.0
            );
            tokio::time::sleep(waited).await;
            self.window_start = Instant::now();
            self.count = 0;
        }

        self.count += 1;
        Admission { waited }
    }

    /// Calls admitted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// `"count/max"` for progress lines.
    pub fn progress(&self) -> String {
        format!("{}/{}", self.count, self.max_per_window)
    }
}
