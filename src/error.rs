/// Failures surfaced by sources, the invoker and the service endpoint.
///
/// User code (analytic, output handler, warm-up) reports failures as
/// `anyhow::Error`; the invoker wraps them here without suppressing them.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Bad path or device. Fatal to the run that tried to open it.
    #[error("frame source '{origin}' unavailable: {reason}")]
    SourceUnavailable { origin: String, reason: String },

    /// No analytic was registered before processing was requested.
    #[error("no analytic registered; register one before processing frames")]
    NotConfigured,

    /// The analytic's warm-up hook failed while the invoker was being built.
    #[error("analytic initialization failed")]
    InitFailure(#[source] anyhow::Error),

    #[error("analytic failed on frame {frame_num}")]
    AnalyticFailure {
        frame_num: u64,
        source: anyhow::Error,
    },

    #[error("output handler failed on frame {frame_num}")]
    OutputFailure {
        frame_num: u64,
        source: anyhow::Error,
    },

    /// Malformed image payload or pixel buffer.
    #[error("could not decode frame: {0}")]
    Decode(String),

    /// The invoker lock was poisoned by a panic outside user code.
    #[error("analytic state is unusable after a panic in an earlier invocation")]
    InvokerPoisoned,
}

impl StreamError {
    pub(crate) fn unavailable(origin: impl Into<String>, reason: impl ToString) -> Self {
        StreamError::SourceUnavailable {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status the service endpoint answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            StreamError::Decode(_) => 400,
            StreamError::NotConfigured | StreamError::InvokerPoisoned => 503,
            StreamError::SourceUnavailable { .. }
            | StreamError::InitFailure(_)
            | StreamError::AnalyticFailure { .. }
            | StreamError::OutputFailure { .. } => 500,
        }
    }

    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::SourceUnavailable { .. } => "source_unavailable",
            StreamError::NotConfigured => "not_configured",
            StreamError::InitFailure(_) => "init_failure",
            StreamError::AnalyticFailure { .. } => "analytic_failure",
            StreamError::OutputFailure { .. } => "output_failure",
            StreamError::Decode(_) => "decode_error",
            StreamError::InvokerPoisoned => "invoker_poisoned",
        }
    }

    /// Frame number attached to user-code failures.
    pub fn frame_num(&self) -> Option<u64> {
        match self {
            StreamError::AnalyticFailure { frame_num, .. }
            | StreamError::OutputFailure { frame_num, .. } => Some(*frame_num),
            _ => None,
        }
    }
}
