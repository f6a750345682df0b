//! vidstreamer - frame dispatch for user-supplied video analytics
//!
//! This crate pushes frames from heterogeneous sources through one
//! request/response contract so that an analytic behaves identically whether
//! it runs over a local file, an attached camera or an HTTP request.
//!
//! # Architecture
//!
//! - `ingest`: Frame sources (single image, video, camera) normalized into a
//!   numbered, timestamped sequence.
//! - `envelope`: The `InputFrame` / `FrameData` interchange types and codec.
//! - `invoker`: `AnalyticInvoker`, the single choke point every frame passes
//!   through. Owns the analytic and output handler behind a mutex.
//! - `pipeline`: Local mode. Drives a source through the invoker.
//! - `service`: Served mode. `POST /process` over HTTP.
//! - `analytics`, `output`: Builtin capabilities and the registry used by the
//!   binary.
//! - `config`: File + environment configuration.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod analytic;
pub mod analytics;
pub mod config;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod invoker;
pub mod output;
pub mod pipeline;
pub mod service;

pub use analytic::{analytic_fn, output_fn, Analytic, OutputHandler};
pub use analytics::{AnalyticRegistry, AnalyticSettings, MotionAnalytic, StaticAnalytic};
pub use envelope::{
    decode_frame_data, encode_frame_data, BoundingBox, FrameData, InputFrame, Point,
    RegionOfInterest, Regions,
};
pub use config::StreamerConfig;
pub use error::StreamError;
pub use frame::Frame;
pub use ingest::{CapturedFrame, FrameSequence, FrameSource, SourceSpec};
pub use invoker::{AnalyticInvoker, Invocation, InvokerBuilder};
pub use output::{JsonLinesOutput, OutputMode, SummaryOutput};
pub use pipeline::{CancelToken, Pipeline, RunSummary};
pub use service::{ServiceConfig, ServiceHandle, ServiceServer};

// -------------------- Wall clock --------------------

/// Milliseconds since the Unix epoch. A clock set before 1970 reads as zero.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Seconds since the Unix epoch with sub-second precision.
pub fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
