//! Per-record verification against the session gateway.

use failsafe::CircuitBreaker;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::{create_session_circuit_breaker, SessionBreaker};
use crate::models::{Lead, VerificationState, VerificationStatus};
use crate::rate_limiter::RateLimiter;
use crate::session::{ChannelCheck, SessionGateway, UnknownReason};

/// Randomized pause after every gateway call, in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownRange {
    pub min: Duration,
    pub max: Duration,
}

impl CooldownRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::rng().random_range(self.min..=self.max)
    }
}

/// Executor tuning.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub cooldown: CooldownRange,
    /// Hard timeout for one gateway call.
    pub call_timeout: Duration,
    /// Consecutive inconclusive checks before the session is declared
    /// unhealthy. Zero disables the breaker.
    pub breaker_threshold: u32,
}

/// Normalized result of verifying one lead.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub state: VerificationState,
    /// Present when the stored `invalid` came from an inconclusive check.
    pub inconclusive: Option<UnknownReason>,
}

impl VerificationOutcome {
    fn from_check(check: ChannelCheck) -> Self {
        let (state, inconclusive) = match check {
            ChannelCheck::HasChannel => (VerificationState::new(VerificationStatus::Valid), None),
            ChannelCheck::NoChannel => (VerificationState::new(VerificationStatus::Invalid), None),
            ChannelCheck::Unknown(reason) => (VerificationState::inconclusive(), Some(reason)),
        };
        Self {
            state,
            inconclusive,
        }
    }

    fn no_contact_channel() -> Self {
        Self {
            state: VerificationState::new(VerificationStatus::NoContactChannel),
            inconclusive: None,
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        self.inconclusive.is_some()
    }
}

/// Result of one executor invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Completed(VerificationOutcome),
    /// Cancelled while waiting for admission; the gateway was not called.
    Cancelled,
}

/// Fatal executor conditions; the run must stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// Too many consecutive inconclusive checks.
    SessionUnhealthy { consecutive: u32 },
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorError::SessionUnhealthy { consecutive } => write!(
                f,
                "{} consecutive inconclusive checks; session looks unhealthy",
                consecutive
            ),
        }
    }
}

pub struct VerificationExecutor<G> {
    gateway: G,
    settings: ExecutorSettings,
    breaker: Option<SessionBreaker>,
}

impl<G: SessionGateway> VerificationExecutor<G> {
    pub fn new(gateway: G, settings: ExecutorSettings) -> Self {
        let breaker = (settings.breaker_threshold > 0).then(|| {
            create_session_circuit_breaker(settings.breaker_threshold, Duration::from_secs(300))
        });
        Self {
            gateway,
            settings,
            breaker,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Verify one lead.
    ///
    /// Leads without a business key short-circuit to `no-contact-channel`
    /// without touching the limiter or the gateway. Everything else is
    /// admitted by `limiter`, checked under the hard timeout, and followed by
    /// the cool-down. Waiting for admission and the cool-down both end early
    /// on cancellation.
    pub async fn verify(
        &mut self,
        lead: &Lead,
        limiter: &mut RateLimiter,
        cancel: &CancellationToken,
    ) -> Result<Attempt, ExecutorError> {
        let Some(key) = lead.business_key() else {
            return Ok(Attempt::Completed(VerificationOutcome::no_contact_channel()));
        };

        if let Some(ref breaker) = self.breaker {
            if !breaker.is_call_permitted() {
                return Err(ExecutorError::SessionUnhealthy {
                    consecutive: self.settings.breaker_threshold,
                });
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Attempt::Cancelled),
            admission = limiter.admit() => {
                if !admission.waited.is_zero() {
                    tracing::info!("Resumed after rate-limit wait of {:?}", admission.waited);
                }
            }
        }

        let check = match tokio::time::timeout(self.settings.call_timeout, self.gateway.check(key)).await {
            Ok(check) => check,
            Err(_) => ChannelCheck::Unknown(UnknownReason::Timeout),
        };
        if let ChannelCheck::Unknown(ref reason) = check {
            tracing::debug!("Inconclusive check for {}: {}", key, reason);
        }
        self.record_health(&check);

        let pause = self.settings.cooldown.sample();
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(pause) => {}
        }

        Ok(Attempt::Completed(VerificationOutcome::from_check(check)))
    }

    fn record_health(&self, check: &ChannelCheck) {
        let Some(ref breaker) = self.breaker else {
            return;
        };
        let _ = match check {
            ChannelCheck::Unknown(_) => breaker.call(|| Err::<(), ()>(())),
            _ => breaker.call(|| Ok::<(), ()>(())),
        };
    }

    /// Release the gateway session.
    pub async fn shutdown(&mut self) {
        self.gateway.close().await;
    }
}
