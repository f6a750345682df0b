use anyhow::Result;

use crate::envelope::{FrameData, InputFrame, Regions};
use crate::frame::Frame;

/// User-supplied analytic.
///
/// Calls are strictly sequential and never reentrant: the invoker holds an
/// exclusive lock for the duration of `analyze` and the following output
/// call, so implementations may keep mutable model state in `self`.
///
/// Implementations must treat the frame as read-only and ephemeral. The
/// borrow ends when `analyze` returns.
pub trait Analytic: Send {
    /// Analytic identifier used in logs.
    fn name(&self) -> &str {
        "analytic"
    }

    /// Run the analytic on one frame and return the regions it found.
    fn analyze(&mut self, frame: &Frame, input: &InputFrame) -> Result<Regions>;

    /// One-time initialization (e.g. loading a model). Called once when the
    /// invoker is built, before any frame is processed.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// User-supplied sink for completed invocations (logging, rendering, replies).
pub trait OutputHandler: Send {
    fn emit(&mut self, frame: &Frame, input: &InputFrame, data: &FrameData) -> Result<()>;
}

impl<A: Analytic + ?Sized> Analytic for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn analyze(&mut self, frame: &Frame, input: &InputFrame) -> Result<Regions> {
        (**self).analyze(frame, input)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}

impl<O: OutputHandler + ?Sized> OutputHandler for Box<O> {
    fn emit(&mut self, frame: &Frame, input: &InputFrame, data: &FrameData) -> Result<()> {
        (**self).emit(frame, input, data)
    }
}

// ----------------------------------------------------------------------------
// Closure adapters
// ----------------------------------------------------------------------------

/// Analytic backed by a closure. Built with [`analytic_fn`].
pub struct FnAnalytic<F> {
    func: F,
}

/// Register a plain function or closure as the analytic.
pub fn analytic_fn<F>(func: F) -> FnAnalytic<F>
where
    F: FnMut(&Frame, &InputFrame) -> Result<Regions> + Send,
{
    FnAnalytic { func }
}

impl<F> Analytic for FnAnalytic<F>
where
    F: FnMut(&Frame, &InputFrame) -> Result<Regions> + Send,
{
    fn name(&self) -> &str {
        "fn"
    }

    fn analyze(&mut self, frame: &Frame, input: &InputFrame) -> Result<Regions> {
        (self.func)(frame, input)
    }
}

/// Output handler backed by a closure. Built with [`output_fn`].
pub struct FnOutput<F> {
    func: F,
}

pub fn output_fn<F>(func: F) -> FnOutput<F>
where
    F: FnMut(&Frame, &InputFrame, &FrameData) -> Result<()> + Send,
{
    FnOutput { func }
}

impl<F> OutputHandler for FnOutput<F>
where
    F: FnMut(&Frame, &InputFrame, &FrameData) -> Result<()> + Send,
{
    fn emit(&mut self, frame: &Frame, input: &InputFrame, data: &FrameData) -> Result<()> {
        (self.func)(frame, input, data)
    }
}
