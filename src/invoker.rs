//! The single orchestration point every frame passes through.
//!
//! `AnalyticInvoker` owns the registered analytic and output handler. Both
//! sit behind one `Mutex`, so concurrent callers (served mode) are
//! serialized: an analytic never sees two frames at once and the output
//! handler for frame N runs before the analytic sees any other frame.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::anyhow;

use crate::analytic::{Analytic, OutputHandler};
use crate::envelope::{FrameData, InputFrame, Regions};
use crate::error::StreamError;
use crate::frame::Frame;
use crate::output::SummaryOutput;

/// Completed envelope for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub input: InputFrame,
    pub data: FrameData,
}

enum OutputSlot {
    Default,
    Custom(Box<dyn OutputHandler>),
    Disabled,
}

/// Registration step. `build` is the configuration check: it fails with
/// `NotConfigured` when no analytic was registered, before any source is
/// touched.
pub struct InvokerBuilder {
    analytic: Option<Box<dyn Analytic>>,
    output: OutputSlot,
}

impl InvokerBuilder {
    pub fn new() -> Self {
        Self {
            analytic: None,
            output: OutputSlot::Default,
        }
    }

    /// Register the analytic. A later call replaces an earlier one.
    pub fn analytic<A: Analytic + 'static>(mut self, analytic: A) -> Self {
        self.analytic = Some(Box::new(analytic));
        self
    }

    pub fn analytic_boxed(mut self, analytic: Box<dyn Analytic>) -> Self {
        self.analytic = Some(analytic);
        self
    }

    /// Register the output handler. Defaults to [`SummaryOutput`] on stdout.
    pub fn output<O: OutputHandler + 'static>(mut self, output: O) -> Self {
        self.output = OutputSlot::Custom(Box::new(output));
        self
    }

    /// `None` disables output entirely.
    pub fn output_boxed(mut self, output: Option<Box<dyn OutputHandler>>) -> Self {
        self.output = match output {
            Some(handler) => OutputSlot::Custom(handler),
            None => OutputSlot::Disabled,
        };
        self
    }

    pub fn without_output(mut self) -> Self {
        self.output = OutputSlot::Disabled;
        self
    }

    /// Validate the registration and run the analytic's warm-up hook once.
    pub fn build(self) -> Result<AnalyticInvoker, StreamError> {
        let mut analytic = self.analytic.ok_or(StreamError::NotConfigured)?;
        analytic.warm_up().map_err(StreamError::InitFailure)?;
        let output: Option<Box<dyn OutputHandler>> = match self.output {
            OutputSlot::Default => Some(Box::new(SummaryOutput::stdout())),
            OutputSlot::Custom(handler) => Some(handler),
            OutputSlot::Disabled => None,
        };
        log::info!(
            "invoker ready: analytic={} output={}",
            analytic.name(),
            if output.is_some() { "on" } else { "off" }
        );
        Ok(AnalyticInvoker {
            slots: Mutex::new(Slots { analytic, output }),
            invocations: AtomicU64::new(0),
        })
    }
}

impl Default for InvokerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Slots {
    analytic: Box<dyn Analytic>,
    output: Option<Box<dyn OutputHandler>>,
}

/// Capability object passed explicitly to the pipeline and the service.
pub struct AnalyticInvoker {
    slots: Mutex<Slots>,
    invocations: AtomicU64,
}

impl AnalyticInvoker {
    pub fn builder() -> InvokerBuilder {
        InvokerBuilder::new()
    }

    /// Process one frame.
    ///
    /// 1. Build the `InputFrame`.
    /// 2. Take the analytic lock.
    /// 3. Stamp `start_time_millis`, run the analytic, stamp `end_time_millis`.
    /// 4. Hand the envelope to the output handler, if any.
    ///
    /// User-code failures are returned as `AnalyticFailure`/`OutputFailure`
    /// carrying `frame_num`; nothing is retried or skipped. A panic in user
    /// code is caught and reported the same way, so the lock is never left
    /// poisoned by an analytic or output handler.
    pub fn invoke(
        &self,
        frame: &Frame,
        frame_num: u64,
        timestamp: f64,
    ) -> Result<Invocation, StreamError> {
        let input = InputFrame::new(frame_num, timestamp);

        let mut slots = self
            .slots
            .lock()
            .map_err(|_| StreamError::InvokerPoisoned)?;
        let Slots { analytic, output } = &mut *slots;

        // End is derived from a monotonic clock so a wall-clock step during
        // the call cannot produce end < start.
        let start_time_millis = crate::epoch_millis();
        let started = Instant::now();
        let regions = catch_unwind(AssertUnwindSafe(|| analytic.analyze(frame, &input)))
            .unwrap_or_else(|payload| Err(panic_error(payload)))
            .and_then(check_confidences)
            .map_err(|source| StreamError::AnalyticFailure { frame_num, source })?;
        let elapsed = started.elapsed();
        let data = FrameData {
            start_time_millis,
            end_time_millis: start_time_millis + elapsed.as_millis() as u64,
            roi: regions.into_vec(),
        };

        if let Some(output) = output.as_mut() {
            catch_unwind(AssertUnwindSafe(|| output.emit(frame, &input, &data)))
                .unwrap_or_else(|payload| Err(panic_error(payload)))
                .map_err(|source| StreamError::OutputFailure { frame_num, source })?;
        }
        drop(slots);

        self.invocations.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "frame {} processed: {} regions in {} ms",
            frame_num,
            data.roi.len(),
            elapsed.as_millis()
        );
        Ok(Invocation { input, data })
    }

    /// Number of successful invocations so far.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

/// Confidence must be a finite value in [0, 1] for the envelope to encode
/// losslessly.
fn check_confidences(regions: Regions) -> anyhow::Result<Regions> {
    for (index, roi) in regions.iter().enumerate() {
        if !(0.0..=1.0).contains(&roi.confidence) {
            return Err(anyhow!(
                "region {} ({}) has confidence {} outside [0, 1]",
                index,
                roi.display_label(),
                roi.confidence
            ));
        }
    }
    Ok(regions)
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow!("panicked: {}", message)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytic::{analytic_fn, output_fn};
    use crate::envelope::{RegionOfInterest, Regions};
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex as StdMutex};

    fn person_detector() -> impl Analytic {
        analytic_fn(|_frame: &Frame, _input: &InputFrame| {
            Ok(Regions::new().with(RegionOfInterest::new("Person", 0.506)))
        })
    }

    #[test]
    fn build_without_analytic_is_not_configured() {
        let result = AnalyticInvoker::builder().without_output().build();
        assert!(matches!(result, Err(StreamError::NotConfigured)));
    }

    #[test]
    fn single_channel_frame_yields_one_region() {
        let invoker = AnalyticInvoker::builder()
            .analytic(person_detector())
            .without_output()
            .build()
            .unwrap();
        let frame = Frame::filled(256, 256, 1, 1).unwrap();

        let inv = invoker.invoke(&frame, 0, 506.0).unwrap();

        assert_eq!(inv.input, InputFrame::new(0, 506.0));
        assert_eq!(inv.data.roi, vec![RegionOfInterest::new("Person", 0.506)]);
        assert!(inv.data.start_time_millis <= inv.data.end_time_millis);
        assert_eq!(invoker.invocations(), 1);
    }

    #[test]
    fn analytic_sees_request_envelope() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_by_analytic = seen.clone();
        let invoker = AnalyticInvoker::builder()
            .analytic(analytic_fn(move |frame: &Frame, input: &InputFrame| {
                seen_by_analytic
                    .lock()
                    .unwrap()
                    .push((frame.shape(), input.frame_num, input.timestamp));
                Ok(Regions::new())
            }))
            .without_output()
            .build()
            .unwrap();

        let frame = Frame::filled(256, 256, 1, 1).unwrap();
        invoker.invoke(&frame, 16, 506.0).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![((256, 256, 1), 16, 506.0)]);
    }

    #[test]
    fn output_receives_populated_envelope() {
        let captured = Arc::new(StdMutex::new(None));
        let sink = captured.clone();
        let invoker = AnalyticInvoker::builder()
            .analytic(person_detector())
            .output(output_fn(move |_frame: &Frame, input: &InputFrame, data: &FrameData| {
                *sink.lock().unwrap() = Some((input.frame_num, data.clone()));
                Ok(())
            }))
            .build()
            .unwrap();

        let frame = Frame::filled(8, 8, 3, 0).unwrap();
        let inv = invoker.invoke(&frame, 4, 1.0).unwrap();

        let (frame_num, data) = captured.lock().unwrap().take().expect("output called");
        assert_eq!(frame_num, 4);
        assert_eq!(data, inv.data);
    }

    #[test]
    fn analytic_failure_carries_frame_num() {
        let invoker = AnalyticInvoker::builder()
            .analytic(analytic_fn(|_: &Frame, _: &InputFrame| -> anyhow::Result<Regions> {
                Err(anyhow!("bad weights"))
            }))
            .without_output()
            .build()
            .unwrap();
        let frame = Frame::filled(2, 2, 1, 0).unwrap();

        let err = invoker.invoke(&frame, 9, 0.0).unwrap_err();
        assert!(matches!(err, StreamError::AnalyticFailure { frame_num: 9, .. }));
        assert_eq!(invoker.invocations(), 0);
    }

    #[test]
    fn output_failure_is_surfaced() {
        let invoker = AnalyticInvoker::builder()
            .analytic(person_detector())
            .output(output_fn(|_: &Frame, _: &InputFrame, _: &FrameData| {
                Err(anyhow!("window closed"))
            }))
            .build()
            .unwrap();
        let frame = Frame::filled(2, 2, 1, 0).unwrap();

        let err = invoker.invoke(&frame, 2, 0.0).unwrap_err();
        assert!(matches!(err, StreamError::OutputFailure { frame_num: 2, .. }));
    }

    #[test]
    fn analytic_panic_is_reported_and_invoker_stays_usable() {
        let invoker = AnalyticInvoker::builder()
            .analytic(analytic_fn(|_: &Frame, input: &InputFrame| {
                if input.frame_num == 3 {
                    let empty: Vec<RegionOfInterest> = Vec::new();
                    return Ok(Regions::new().with(empty[3].clone()));
                }
                Ok(Regions::new())
            }))
            .without_output()
            .build()
            .unwrap();
        let frame = Frame::filled(2, 2, 1, 0).unwrap();

        let err = invoker.invoke(&frame, 3, 0.0).unwrap_err();
        assert!(matches!(err, StreamError::AnalyticFailure { frame_num: 3, .. }));
        let source = std::error::Error::source(&err).expect("panic message attached");
        assert!(source.to_string().starts_with("panicked:"));

        invoker.invoke(&frame, 4, 0.0).unwrap();
        assert_eq!(invoker.invocations(), 1);
    }

    #[test]
    fn output_panic_is_reported_as_output_failure() {
        let invoker = AnalyticInvoker::builder()
            .analytic(person_detector())
            .output(output_fn(|_: &Frame, input: &InputFrame, _: &FrameData| {
                if input.frame_num == 0 {
                    panic!("renderer gone");
                }
                Ok(())
            }))
            .build()
            .unwrap();
        let frame = Frame::filled(2, 2, 1, 0).unwrap();

        let err = invoker.invoke(&frame, 0, 0.0).unwrap_err();
        assert!(matches!(err, StreamError::OutputFailure { frame_num: 0, .. }));
        assert!(invoker.invoke(&frame, 1, 0.0).is_ok());
    }

    #[test]
    fn out_of_range_confidence_is_an_analytic_failure() {
        for bad in [f32::NAN, f32::INFINITY, -0.1, 7.5] {
            let invoker = AnalyticInvoker::builder()
                .analytic(analytic_fn(move |_: &Frame, _: &InputFrame| {
                    Ok(Regions::new()
                        .with(RegionOfInterest::new("Person", 0.9))
                        .with(RegionOfInterest::new("x", bad)))
                }))
                .without_output()
                .build()
                .unwrap();
            let frame = Frame::filled(2, 2, 1, 0).unwrap();

            let err = invoker.invoke(&frame, 5, 0.0).unwrap_err();
            assert!(
                matches!(err, StreamError::AnalyticFailure { frame_num: 5, .. }),
                "confidence {bad} accepted"
            );
        }
    }

    #[test]
    fn boundary_confidences_are_accepted() {
        let invoker = AnalyticInvoker::builder()
            .analytic(analytic_fn(|_: &Frame, _: &InputFrame| {
                Ok(Regions::new()
                    .with(RegionOfInterest::new("", 0.0))
                    .with(RegionOfInterest::new("Person", 1.0)))
            }))
            .without_output()
            .build()
            .unwrap();
        let frame = Frame::filled(2, 2, 1, 0).unwrap();
        assert_eq!(invoker.invoke(&frame, 0, 0.0).unwrap().data.roi.len(), 2);
    }

    struct FailingWarmUp;

    impl Analytic for FailingWarmUp {
        fn analyze(&mut self, _frame: &Frame, _input: &InputFrame) -> anyhow::Result<Regions> {
            Ok(Regions::new())
        }

        fn warm_up(&mut self) -> anyhow::Result<()> {
            Err(anyhow!("model file missing"))
        }
    }

    #[test]
    fn warm_up_failure_blocks_build() {
        let result = AnalyticInvoker::builder().analytic(FailingWarmUp).build();
        assert!(matches!(result, Err(StreamError::InitFailure(_))));
    }

    #[test]
    fn concurrent_invocations_are_serialized() {
        use std::sync::atomic::{AtomicBool, AtomicUsize};

        let in_flight = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let (flag, overlap_count) = (in_flight.clone(), overlaps.clone());
        let invoker = Arc::new(
            AnalyticInvoker::builder()
                .analytic(analytic_fn(move |_: &Frame, _: &InputFrame| {
                    if flag.swap(true, Ordering::SeqCst) {
                        overlap_count.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    flag.store(false, Ordering::SeqCst);
                    Ok(Regions::new())
                }))
                .without_output()
                .build()
                .unwrap(),
        );

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let invoker = invoker.clone();
                std::thread::spawn(move || {
                    let frame = Frame::filled(4, 4, 1, 0).unwrap();
                    for n in 0..5 {
                        invoker.invoke(&frame, n, 0.0).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(invoker.invocations(), 20);
    }
}
