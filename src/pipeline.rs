//! Resumable verification control loop.
//!
//! ```text
//! Loading -> Filtering -> EstablishingSession -> Verifying -> Flushing -> Done
//!                                                    |            ^
//!                                                    v            |
//!                                               Interrupted ------+
//! ```
//!
//! Records are verified strictly one at a time through a single session. The
//! output dataset and the checkpoint are flushed together every
//! `batch_size` records and once more, unconditionally, when `Verifying` ends.

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointStore;
use crate::errors::PipelineError;
use crate::executor::{Attempt, ExecutorError, VerificationExecutor};
use crate::merge::LeadSet;
use crate::models::{DatasetMetadata, VerificationStatus};
use crate::normalize::PhoneRules;
use crate::progress::{estimate_eta, ProgressSink, ProgressTick};
use crate::rate_limiter::RateLimiter;
use crate::session::{
    establish_session, BootstrapPolicy, Establishment, SessionGateway, SessionMode,
};
use crate::storage::{load_input, load_prior_output, OutputWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Loading,
    Filtering,
    EstablishingSession,
    Verifying,
    Interrupted,
    Flushing,
    Done,
}

/// Orchestrator settings, fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub checkpoint: PathBuf,
    pub resume: bool,
    /// Flush output and checkpoint after this many verified records.
    pub batch_size: usize,
    pub session_mode: SessionMode,
    pub bootstrap: BootstrapPolicy,
    pub phone_rules: PhoneRules,
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    /// `Done` for a complete pass, `Interrupted` otherwise.
    pub final_state: PipelineState,
    pub pending_at_start: usize,
    /// Records verified in this run.
    pub processed: usize,
    /// Keyed records skipped because the checkpoint already had them.
    pub skipped: usize,
    /// Inconclusive checks in this run.
    pub inconclusive: usize,
    pub checkpoint_cleared: bool,
    pub output_path: PathBuf,
    /// Counts over the whole written dataset.
    pub metadata: DatasetMetadata,
}

impl RunReport {
    pub fn completed(&self) -> bool {
        self.final_state == PipelineState::Done
    }
}

/// How `Verifying` ended.
#[derive(Debug)]
enum LoopExit {
    Completed,
    Cancelled,
    Fatal(ExecutorError),
    Storage(PipelineError),
}

#[derive(Debug, Default)]
struct Tally {
    processed: usize,
    valid: usize,
    inconclusive: usize,
}

pub struct Pipeline<G> {
    config: PipelineConfig,
    executor: VerificationExecutor<G>,
    limiter: RateLimiter,
    progress: Box<dyn ProgressSink>,
    cancel: CancellationToken,
    writer: OutputWriter,
    state: PipelineState,
}

impl<G: SessionGateway> Pipeline<G> {
    pub fn new(
        config: PipelineConfig,
        executor: VerificationExecutor<G>,
        limiter: RateLimiter,
        progress: Box<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Self {
        let writer = OutputWriter::new(config.output.clone());
        Self {
            config,
            executor,
            limiter,
            progress,
            cancel,
            writer,
            state: PipelineState::Loading,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn executor(&self) -> &VerificationExecutor<G> {
        &self.executor
    }

    fn transition(&mut self, state: PipelineState) {
        tracing::debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
        self.progress.state_changed(state);
    }

    /// Run the pipeline to completion or interruption.
    ///
    /// Setup failures, a failed session bootstrap included, return before any
    /// write. Otherwise output and checkpoint are always flushed before
    /// returning, whatever ended the run. A bootstrap cancelled by the
    /// operator ends `Interrupted` without verifying anything.
    pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
        tracing::info!("Run {} starting", self.writer.run_id());
        self.transition(PipelineState::Loading);
        let (mut set, mut checkpoint) = self.load()?;

        self.transition(PipelineState::Filtering);
        let pending: Vec<String> = set
            .keys()
            .filter(|key| !checkpoint.is_processed(key))
            .map(str::to_string)
            .collect();
        let skipped = set.keyed_len() - pending.len();
        tracing::info!(
            "{} records: {} pending, {} already processed, {} without contact channel",
            set.len(),
            pending.len(),
            skipped,
            set.keyless_len()
        );

        let mut tally = Tally::default();
        let exit = if pending.is_empty() {
            tracing::info!("Nothing to verify");
            LoopExit::Completed
        } else {
            self.transition(PipelineState::EstablishingSession);
            let established = establish_session(
                self.executor.gateway_mut(),
                self.config.session_mode,
                self.config.bootstrap,
                &self.cancel,
            )
            .await?;

            let exit = match established {
                Establishment::Cancelled => LoopExit::Cancelled,
                Establishment::Ready => {
                    self.transition(PipelineState::Verifying);
                    self.verify_pending(&pending, &mut set, &mut checkpoint, &mut tally)
                        .await
                }
            };
            self.executor.shutdown().await;
            exit
        };

        let interrupted = !matches!(exit, LoopExit::Completed);
        if interrupted {
            self.transition(PipelineState::Interrupted);
        }

        self.transition(PipelineState::Flushing);
        let flushed = self.flush(&set, &mut checkpoint);

        let mut checkpoint_cleared = false;
        if !interrupted && flushed.is_ok() {
            checkpoint.clear()?;
            checkpoint_cleared = true;
        }

        let final_state = if interrupted {
            PipelineState::Interrupted
        } else {
            PipelineState::Done
        };
        if final_state == PipelineState::Done {
            self.transition(PipelineState::Done);
        }

        // A failed batch flush outranks whatever the final flush did.
        let metadata = match (exit, flushed) {
            (LoopExit::Storage(e), final_flush) => {
                if let Err(again) = final_flush {
                    tracing::error!("Final flush also failed: {}", again);
                }
                return Err(e);
            }
            (_, Err(e)) => return Err(e),
            (LoopExit::Fatal(e), Ok(metadata)) => {
                let report = self.report(final_state, &pending, skipped, &tally, false, metadata);
                self.progress.finished(&report);
                return Err(PipelineError::Executor(e.to_string()));
            }
            (_, Ok(metadata)) => metadata,
        };

        let report = self.report(
            final_state,
            &pending,
            skipped,
            &tally,
            checkpoint_cleared,
            metadata,
        );
        self.progress.finished(&report);
        Ok(report)
    }

    fn load(&mut self) -> Result<(LeadSet, CheckpointStore), PipelineError> {
        let rules = &self.config.phone_rules;
        let raw = load_input(&self.config.input)?;
        let raw_count = raw.len();
        let mut set = LeadSet::from_leads(raw.into_iter().map(|lead| lead.normalized(rules)));
        tracing::info!(
            "Loaded {} records from {} ({} after merge)",
            raw_count,
            self.config.input.display(),
            set.len()
        );

        let mut checkpoint = CheckpointStore::new(self.config.checkpoint.clone());
        if self.config.resume {
            let done = checkpoint.load_existing().len();
            tracing::info!("Resuming: {} keys already processed", done);
            if let Some(prior) = load_prior_output(&self.config.output) {
                // Keyless records are re-derived from the input on every run.
                let keyed: Vec<_> = prior
                    .into_iter()
                    .filter(|lead| lead.business_key().is_some())
                    .collect();
                tracing::info!("Merging {} keyed records from prior output", keyed.len());
                set.extend(keyed);
            }
        } else if checkpoint.path().exists() {
            tracing::info!(
                "Ignoring existing checkpoint {} (no --resume)",
                checkpoint.path().display()
            );
        }

        let marked = set.mark_keyless_no_channel();
        if marked > 0 {
            tracing::info!("{} records have no contact channel", marked);
        }
        Ok((set, checkpoint))
    }

    async fn verify_pending(
        &mut self,
        pending: &[String],
        set: &mut LeadSet,
        checkpoint: &mut CheckpointStore,
        tally: &mut Tally,
    ) -> LoopExit {
        let started = tokio::time::Instant::now();
        let batch_size = self.config.batch_size.max(1);

        for (i, key) in pending.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!("Cancellation requested; stopping before {}", key);
                return LoopExit::Cancelled;
            }
            let Some(lead) = set.get(key).cloned() else {
                continue;
            };

            let outcome = match self.executor.verify(&lead, &mut self.limiter, &self.cancel).await {
                Ok(Attempt::Completed(outcome)) => outcome,
                Ok(Attempt::Cancelled) => {
                    tracing::warn!("Cancellation requested; {} not checked", key);
                    return LoopExit::Cancelled;
                }
                Err(e) => {
                    tracing::error!("Stopping verification: {}", e);
                    return LoopExit::Fatal(e);
                }
            };

            set.apply_verification(key, outcome.state);
            checkpoint.mark_processed(key);
            tally.processed += 1;
            if outcome.state.status == VerificationStatus::Valid {
                tally.valid += 1;
            }
            if outcome.is_inconclusive() {
                tally.inconclusive += 1;
            }

            let remaining = pending.len() - (i + 1);
            self.progress.record_verified(&ProgressTick {
                position: i + 1,
                pending_total: pending.len(),
                business_key: key.clone(),
                status: outcome.state.status,
                inconclusive: outcome.inconclusive,
                rate_usage: self.limiter.progress(),
                valid_so_far: tally.valid,
                checked_so_far: tally.processed,
                eta: estimate_eta(started.elapsed(), tally.processed, remaining),
            });

            if tally.processed % batch_size == 0 {
                if let Err(e) = self.flush(set, checkpoint) {
                    tracing::error!("Batch flush failed: {}", e);
                    return LoopExit::Storage(e);
                }
                tracing::info!("Progress saved ({} keys)", checkpoint.len());
            }
        }

        LoopExit::Completed
    }

    /// Write the output first, then the checkpoint, so the checkpoint never
    /// names a key whose result is missing from the output.
    fn flush(
        &self,
        set: &LeadSet,
        checkpoint: &mut CheckpointStore,
    ) -> Result<DatasetMetadata, PipelineError> {
        let metadata = self.writer.write(&set.to_vec())?;
        checkpoint.flush()?;
        Ok(metadata)
    }

    fn report(
        &self,
        final_state: PipelineState,
        pending: &[String],
        skipped: usize,
        tally: &Tally,
        checkpoint_cleared: bool,
        metadata: DatasetMetadata,
    ) -> RunReport {
        RunReport {
            run_id: self.writer.run_id(),
            final_state,
            pending_at_start: pending.len(),
            processed: tally.processed,
            skipped,
            inconclusive: tally.inconclusive,
            checkpoint_cleared,
            output_path: self.writer.path().to_path_buf(),
            metadata,
        }
    }
}
