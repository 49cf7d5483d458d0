//! Session gateway abstraction over a long-lived authenticated external session.
//!
//! Implementations live in `gateway_client` (remote automation sidecar) and
//! `mock_gateway` (dry runs). The orchestrator establishes the session once,
//! as a precondition, through [`establish_session`]; per-record checks never
//! trigger a bootstrap.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::PipelineError;

/// Readiness of the external session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// An authenticated session exists and can be reused.
    Ready,
    /// No durable session exists; a human must complete a bootstrap step.
    NeedsInteractiveBootstrap,
    /// The gateway is unusable.
    Failed(String),
}

/// Outcome of one per-record check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCheck {
    /// The number has an active account on the channel.
    HasChannel,
    /// The service confirmed the number has no account.
    NoChannel,
    /// Inconclusive. Never a confirmed negative.
    Unknown(UnknownReason),
}

/// Why a check was inconclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownReason {
    /// The call exceeded its hard timeout.
    Timeout,
    /// Network or transport failure.
    Transport(String),
    /// The service answered with a status or shape we do not understand.
    UnexpectedResponse(String),
    /// The session was rejected or expired mid-run.
    SessionUnavailable,
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownReason::Timeout => write!(f, "timeout"),
            UnknownReason::Transport(msg) => write!(f, "transport error: {}", msg),
            UnknownReason::UnexpectedResponse(msg) => write!(f, "unexpected response: {}", msg),
            UnknownReason::SessionUnavailable => write!(f, "session unavailable"),
        }
    }
}

/// What the operator must do to bootstrap a session (e.g. scan a QR code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPrompt {
    /// Human-readable instruction, QR payload or URL.
    pub instructions: String,
}

/// Whether a human is available to complete an interactive bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Attended,
    Unattended,
}

/// Bounded wait for the interactive bootstrap.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for BootstrapPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// How [`establish_session`] ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Establishment {
    Ready,
    /// The operator cancelled while the bootstrap wait was pending.
    Cancelled,
}

#[async_trait]
pub trait SessionGateway: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Report whether a reusable session exists, reusing (and, once
    /// established, persisting) it where the implementation can.
    async fn ensure_session(&mut self) -> SessionStatus;

    /// Start the interactive bootstrap and return what to show the operator.
    async fn begin_bootstrap(&mut self) -> Result<BootstrapPrompt, String>;

    /// Check one business key. Faults map to `Unknown`, never to an error.
    async fn check(&mut self, business_key: &str) -> ChannelCheck;

    /// Release the session. The durable part of the session stays on disk.
    async fn close(&mut self) {}
}

#[async_trait]
impl<G: SessionGateway + ?Sized> SessionGateway for Box<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn ensure_session(&mut self) -> SessionStatus {
        (**self).ensure_session().await
    }

    async fn begin_bootstrap(&mut self) -> Result<BootstrapPrompt, String> {
        (**self).begin_bootstrap().await
    }

    async fn check(&mut self, business_key: &str) -> ChannelCheck {
        (**self).check(business_key).await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

/// Bring the gateway to `Ready` or fail with an actionable setup error.
///
/// Unattended runs fail fast when a bootstrap is needed. Attended runs start
/// the bootstrap and poll `ensure_session` until `policy.timeout`, or until
/// `cancel` fires, which ends the wait with [`Establishment::Cancelled`].
pub async fn establish_session<G: SessionGateway + ?Sized>(
    gateway: &mut G,
    mode: SessionMode,
    policy: BootstrapPolicy,
    cancel: &CancellationToken,
) -> Result<Establishment, PipelineError> {
    match gateway.ensure_session().await {
        SessionStatus::Ready => {
            tracing::info!("Session '{}' ready; no bootstrap required", gateway.name());
            return Ok(Establishment::Ready);
        }
        SessionStatus::Failed(reason) => {
            return Err(PipelineError::SessionBootstrap(format!(
                "gateway '{}' failed: {}",
                gateway.name(),
                reason
            )));
        }
        SessionStatus::NeedsInteractiveBootstrap => {}
    }

    if mode == SessionMode::Unattended {
        tracing::error!("No saved session and the run is unattended");
        return Err(PipelineError::SessionBootstrap(
            "no saved session; run once with --attended to complete the bootstrap".to_string(),
        ));
    }
    if cancel.is_cancelled() {
        tracing::warn!("Cancellation requested; bootstrap not started");
        return Ok(Establishment::Cancelled);
    }

    let prompt = gateway
        .begin_bootstrap()
        .await
        .map_err(PipelineError::SessionBootstrap)?;
    tracing::warn!("════════════════════════════════════════");
    tracing::warn!("Complete the session bootstrap now:");
    tracing::warn!("{}", prompt.instructions);
    tracing::warn!("You have {} seconds...", policy.timeout.as_secs());
    tracing::warn!("════════════════════════════════════════");

    let deadline = tokio::time::Instant::now() + policy.timeout;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("Cancellation requested; abandoning session bootstrap");
                return Ok(Establishment::Cancelled);
            }
            _ = tokio::time::sleep(policy.poll_interval) => {}
        }
        match gateway.ensure_session().await {
            SessionStatus::Ready => {
                tracing::info!("Session bootstrap completed");
                return Ok(Establishment::Ready);
            }
            SessionStatus::Failed(reason) => {
                return Err(PipelineError::SessionBootstrap(reason));
            }
            SessionStatus::NeedsInteractiveBootstrap => {}
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(PipelineError::SessionBootstrap(format!(
                "bootstrap not completed within {} seconds",
                policy.timeout.as_secs()
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Becomes ready after `ready_after` polls once bootstrap has started.
    struct SlowBootstrap {
        bootstrapped: bool,
        polls: u32,
        ready_after: Option<u32>,
    }

    #[async_trait]
    impl SessionGateway for SlowBootstrap {
        fn name(&self) -> &str {
            "slow"
        }

        async fn ensure_session(&mut self) -> SessionStatus {
            if !self.bootstrapped {
                return SessionStatus::NeedsInteractiveBootstrap;
            }
            self.polls += 1;
            match self.ready_after {
                Some(n) if self.polls >= n => SessionStatus::Ready,
                _ => SessionStatus::NeedsInteractiveBootstrap,
            }
        }

        async fn begin_bootstrap(&mut self) -> Result<BootstrapPrompt, String> {
            self.bootstrapped = true;
            Ok(BootstrapPrompt {
                instructions: "scan the code".into(),
            })
        }

        async fn check(&mut self, _business_key: &str) -> ChannelCheck {
            ChannelCheck::Unknown(UnknownReason::SessionUnavailable)
        }
    }

    fn gateway(ready_after: Option<u32>) -> SlowBootstrap {
        SlowBootstrap {
            bootstrapped: false,
            polls: 0,
            ready_after,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unattended_fails_fast() {
        let mut gw = gateway(Some(1));
        let start = tokio::time::Instant::now();

        let err = establish_session(
            &mut gw,
            SessionMode::Unattended,
            BootstrapPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::SessionBootstrap(_)));
        assert!(err.to_string().contains("--attended"));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!gw.bootstrapped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attended_waits_for_readiness() {
        let mut gw = gateway(Some(3));
        let start = tokio::time::Instant::now();

        let established = establish_session(
            &mut gw,
            SessionMode::Attended,
            BootstrapPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(established, Establishment::Ready);
        assert_eq!(gw.polls, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attended_times_out() {
        let mut gw = gateway(None);
        let policy = BootstrapPolicy {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
        };
        let start = tokio::time::Instant::now();

        let err = establish_session(&mut gw, SessionMode::Attended, policy, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("10 seconds"));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_ends_bootstrap_wait() {
        let mut gw = gateway(None);
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let established = establish_session(
            &mut gw,
            SessionMode::Attended,
            BootstrapPolicy::default(),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(established, Establishment::Cancelled);
        // Two polls at 2s and 4s, then the cancel at 5s, far short of 180s.
        assert_eq!(gw.polls, 2);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_bootstrap_returns_immediately() {
        let mut gw = gateway(Some(1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = tokio::time::Instant::now();

        let established = establish_session(
            &mut gw,
            SessionMode::Attended,
            BootstrapPolicy::default(),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(established, Establishment::Cancelled);
        assert!(!gw.bootstrapped);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
