use failsafe::backoff::{self, Constant};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

/// Breaker guarding the external session against a run of inconclusive checks.
pub type SessionBreaker = StateMachine<ConsecutiveFailures<Constant>, ()>;

/// Creates a circuit breaker that opens after `threshold` consecutive
/// inconclusive checks.
///
/// A long streak of `Unknown` results usually means the session itself is
/// gone (logged out, blocked, sidecar down). Once the breaker is open the
/// executor stops calling the gateway and the run halts with a flush.
///
/// # States
///
/// - **CLOSED**: Normal operation, checks pass through.
/// - **OPEN**: Too many inconclusive checks in a row, calls are refused.
/// - **HALF_OPEN**: After `cool_off`, one trial call is allowed.
pub fn create_session_circuit_breaker(threshold: u32, cool_off: Duration) -> SessionBreaker {
    let backoff_strategy = backoff::constant(cool_off);
    let failure_policy = failure_policy::consecutive_failures(threshold, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
