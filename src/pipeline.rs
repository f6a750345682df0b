//! Local (offline) mode.
//!
//! `Pipeline` pulls frames from a source one at a time and pushes each
//! through the invoker before pulling the next. There is no lookahead.
//! The first analytic or output failure aborts the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::StreamError;
use crate::ingest::{FrameSequence, FrameSource, SourceSpec};
use crate::invoker::AnalyticInvoker;

const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Operator interrupt shared between a signal handler and a running pipeline.
///
/// Cancellation is observed before each frame is pulled. An in-flight
/// invocation always completes.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a run that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    /// True if the run stopped on cancellation rather than exhaustion.
    pub cancelled: bool,
    pub elapsed: Duration,
}

pub struct Pipeline<'a> {
    invoker: &'a AnalyticInvoker,
    cancel: CancelToken,
    progress_interval: Duration,
}

impl<'a> Pipeline<'a> {
    pub fn new(invoker: &'a AnalyticInvoker) -> Self {
        Self {
            invoker,
            cancel: CancelToken::new(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Open `spec`, drive it to completion, then release it.
    pub fn run_spec(&self, spec: &SourceSpec) -> Result<RunSummary, StreamError> {
        let mut source = spec.open()?;
        self.run(&mut source)
    }

    /// Drive `source` through the invoker until it is exhausted, cancelled,
    /// or a frame fails.
    pub fn run<S: FrameSource + ?Sized>(&self, source: &mut S) -> Result<RunSummary, StreamError> {
        let origin = source.describe();
        let started = Instant::now();
        let mut last_progress = Instant::now();
        let mut frames_processed = 0u64;
        let mut cancelled = false;

        log::info!("run started: {}", origin);

        let mut frames = FrameSequence::new(source);
        loop {
            if self.cancel.is_cancelled() {
                cancelled = true;
                log::info!("run cancelled after {} frames: {}", frames_processed, origin);
                break;
            }
            let Some(captured) = frames.next() else {
                break;
            };
            let captured = captured?;

            if let Err(err) =
                self.invoker
                    .invoke(&captured.frame, captured.frame_num, captured.timestamp)
            {
                log::error!("run aborted at frame {}: {}", captured.frame_num, err);
                return Err(err);
            }
            frames_processed += 1;

            if last_progress.elapsed() >= self.progress_interval {
                let secs = started.elapsed().as_secs_f64();
                log::info!(
                    "progress: {} frames from {} ({:.1} fps)",
                    frames_processed,
                    origin,
                    frames_processed as f64 / secs.max(f64::EPSILON)
                );
                last_progress = Instant::now();
            }
        }

        let summary = RunSummary {
            frames_processed,
            cancelled,
            elapsed: started.elapsed(),
        };
        log::info!(
            "run finished: {} frames from {} in {:.2}s",
            summary.frames_processed,
            origin,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
