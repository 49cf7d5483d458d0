//! Lead Verifier Library
//!
//! Resumable, rate-limited verification of contact channels for lead datasets
//! gathered from untrusted sources, with crash-safe checkpointing and a
//! non-destructive record merge.
//!
//! # Modules
//!
//! - `core`: Record model, merge engine and the orchestrator.
//! - `integrations`: Session gateway implementations.
//! - `checkpoint`: Durable set of processed business keys.
//! - `circuit_breaker`: Session health breaker.
//! - `config`: CLI and validated run configuration.
//! - `errors`: Error handling types.
//! - `executor`: Per-record verification.
//! - `gateway_client`: HTTP client for the session sidecar.
//! - `integrity`: Checksums for persisted key sets.
//! - `merge`: Merge/dedup engine.
//! - `mock_gateway`: Dry-run gateway.
//! - `models`: Lead and dataset models.
//! - `normalize`: Structural normalization of identity fields.
//! - `pipeline`: The resumable control loop.
//! - `progress`: Operator-facing progress reporting.
//! - `rate_limiter`: Sliding-window admission control.
//! - `session`: Session gateway abstraction and bootstrap.
//! - `storage`: Atomic JSON persistence.

pub mod core;
pub mod integrations;

pub mod checkpoint;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod executor;
pub mod gateway_client;
pub mod integrity;
pub mod merge;
pub mod mock_gateway;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod rate_limiter;
pub mod session;
pub mod storage;
