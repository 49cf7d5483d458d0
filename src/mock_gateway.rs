use async_trait::async_trait;
use rand::Rng;

use crate::session::{BootstrapPrompt, ChannelCheck, SessionGateway, SessionStatus};

/// How the dry-run gateway decides outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MockStrategy {
    /// `HasChannel` when the last digit of the key is even.
    Deterministic,
    /// `HasChannel` with probability [`RANDOM_HIT_RATE`].
    Random,
}

/// Roughly the hit rate observed on real runs.
pub const RANDOM_HIT_RATE: f64 = 0.35;

/// Stand-in for the external session in dry runs. Always ready, never
/// touches the network.
#[derive(Debug, Clone)]
pub struct MockGateway {
    strategy: MockStrategy,
    checks: usize,
}

impl MockGateway {
    pub fn new(strategy: MockStrategy) -> Self {
        Self {
            strategy,
            checks: 0,
        }
    }

    /// Number of checks performed so far.
    pub fn checks(&self) -> usize {
        self.checks
    }
}

#[async_trait]
impl SessionGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn ensure_session(&mut self) -> SessionStatus {
        SessionStatus::Ready
    }

    async fn begin_bootstrap(&mut self) -> Result<BootstrapPrompt, String> {
        Ok(BootstrapPrompt {
            instructions: "mock session needs no bootstrap".to_string(),
        })
    }

    async fn check(&mut self, business_key: &str) -> ChannelCheck {
        self.checks += 1;
        let has_channel = match self.strategy {
            MockStrategy::Deterministic => business_key
                .chars()
                .rev()
                .find(|c| c.is_ascii_digit())
                .is_some_and(|d| matches!(d, '0' | '2' | '4' | '6' | '8')),
            MockStrategy::Random => rand::rng().random_bool(RANDOM_HIT_RATE),
        };
        if has_channel {
            ChannelCheck::HasChannel
        } else {
            ChannelCheck::NoChannel
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_uses_last_digit() {
        let mut gw = MockGateway::new(MockStrategy::Deterministic);
        assert_eq!(gw.ensure_session().await, SessionStatus::Ready);
        assert_eq!(gw.check("+525511112222").await, ChannelCheck::HasChannel);
        assert_eq!(gw.check("+525511112223").await, ChannelCheck::NoChannel);
        assert_eq!(gw.checks(), 2);
    }

    #[tokio::test]
    async fn test_random_never_inconclusive() {
        let mut gw = MockGateway::new(MockStrategy::Random);
        for _ in 0..50 {
            let outcome = gw.check("+525511112222").await;
            assert!(matches!(
                outcome,
                ChannelCheck::HasChannel | ChannelCheck::NoChannel
            ));
        }
    }
}
