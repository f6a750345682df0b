//! Builtin output handlers.

use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analytic::OutputHandler;
use crate::envelope::{FrameData, InputFrame};
use crate::frame::Frame;

/// Output selection for the binary and config file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Human-readable detection summary on stdout.
    #[default]
    Summary,
    /// One JSON record per frame on stdout.
    Json,
    /// No output handler.
    None,
}

impl OutputMode {
    pub fn handler(self) -> Option<Box<dyn OutputHandler>> {
        match self {
            OutputMode::Summary => Some(Box::new(SummaryOutput::stdout())),
            OutputMode::Json => Some(Box::new(JsonLinesOutput::stdout())),
            OutputMode::None => None,
        }
    }
}

/// Textual detection summary. Used when no output handler is registered.
///
/// ```text
/// Detections for frame_num: 3
///      Class: Person   Confidence:0.506
/// ```
pub struct SummaryOutput<W> {
    writer: W,
}

impl SummaryOutput<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> SummaryOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> OutputHandler for SummaryOutput<W> {
    fn emit(&mut self, _frame: &Frame, input: &InputFrame, data: &FrameData) -> Result<()> {
        writeln!(self.writer, "Detections for frame_num: {}", input.frame_num)?;
        for roi in &data.roi {
            writeln!(
                self.writer,
                "\t Class: {} \t Confidence:{}",
                roi.display_label(),
                roi.confidence
            )?;
        }
        self.writer.flush().context("flush detection summary")?;
        Ok(())
    }
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    input: &'a InputFrame,
    data: &'a FrameData,
}

/// Newline-delimited JSON, one `{input, data}` record per frame.
pub struct JsonLinesOutput<W> {
    writer: W,
}

impl JsonLinesOutput<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> OutputHandler for JsonLinesOutput<W> {
    fn emit(&mut self, _frame: &Frame, input: &InputFrame, data: &FrameData) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &FrameRecord { input, data })
            .context("serialize frame record")?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
