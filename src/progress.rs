//! Operator-facing progress reporting.
//!
//! The orchestrator never prints directly; it reports to a [`ProgressSink`]
//! handed to it at construction.

use std::time::Duration;

use crate::models::VerificationStatus;
use crate::pipeline::{PipelineState, RunReport};
use crate::session::UnknownReason;

/// One verified record, as seen by the operator.
#[derive(Debug, Clone)]
pub struct ProgressTick {
    /// 1-based position among the records pending at the start of the run.
    pub position: usize,
    pub pending_total: usize,
    pub business_key: String,
    pub status: VerificationStatus,
    pub inconclusive: Option<UnknownReason>,
    /// Rate window usage, `count/max`.
    pub rate_usage: String,
    pub valid_so_far: usize,
    pub checked_so_far: usize,
    pub eta: Option<Duration>,
}

impl ProgressTick {
    /// Valid share of the records checked so far in this run.
    pub fn success_rate(&self) -> usize {
        self.valid_so_far * 100 / self.checked_so_far.max(1)
    }
}

pub trait ProgressSink: Send {
    fn state_changed(&mut self, _state: PipelineState) {}

    fn record_verified(&mut self, tick: &ProgressTick);

    fn finished(&mut self, report: &RunReport);
}

/// Default sink: per-record lines through `tracing`, final summary on stdout.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn state_changed(&mut self, state: PipelineState) {
        tracing::debug!("Pipeline state: {:?}", state);
    }

    fn record_verified(&mut self, tick: &ProgressTick) {
        let marker = match (tick.status, &tick.inconclusive) {
            (VerificationStatus::Valid, _) => "✓ valid".to_string(),
            (_, Some(reason)) => format!("? inconclusive ({})", reason),
            (VerificationStatus::NoContactChannel, _) => "- no channel".to_string(),
            _ => "✗ invalid".to_string(),
        };
        tracing::info!(
            "[{}/{}] {} {} | rate {} | ok {}% | ETA {}",
            tick.position,
            tick.pending_total,
            tick.business_key,
            marker,
            tick.rate_usage,
            tick.success_rate(),
            format_eta(tick.eta)
        );
    }

    fn finished(&mut self, report: &RunReport) {
        let meta = &report.metadata;
        println!();
        println!("══════════════════════════════════════════");
        println!("  Verification summary ({:?})", report.final_state);
        println!("══════════════════════════════════════════");
        println!("  Total records:        {}", meta.total_leads);
        println!("  Checked this run:     {}", report.processed);
        println!("  Skipped (checkpoint): {}", report.skipped);
        println!("  Valid:                {}", meta.valid);
        println!(
            "  Invalid:              {} (confirmed {}, inconclusive {})",
            meta.invalid,
            meta.invalid - meta.inconclusive,
            meta.inconclusive
        );
        println!("  No contact channel:   {}", meta.no_contact_channel);
        println!("  Still pending:        {}", meta.pending);
        println!("  Validation rate:      {}", meta.validation_rate);
        println!("  Output:               {}", report.output_path.display());
        if report.checkpoint_cleared {
            println!("  Checkpoint cleared; next run starts fresh");
        } else if meta.pending > 0 {
            println!("  Rerun with --resume to continue");
        }
        println!("══════════════════════════════════════════");
    }
}

/// Render an ETA the way the progress line shows it.
pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta.filter(|d| !d.is_zero()) else {
        return "--:--".to_string();
    };
    let secs = eta.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Linear ETA from the average time per record so far.
pub fn estimate_eta(elapsed: Duration, done: usize, remaining: usize) -> Option<Duration> {
    if done == 0 {
        return None;
    }
    Some(elapsed / done as u32 * remaining as u32)
}
