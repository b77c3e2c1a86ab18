//! Progress reporting
//!
//! The pipeline reports `(stage, fraction, message)` triples to a
//! [`ProgressSink`]. Sinks must never block the caller: they may be invoked
//! from any worker thread, and nothing flows back into the pipeline.
//!
//! [`ProgressRange`] rescales a page-local `0.0..=1.0` fraction into a slice of
//! the document-wide progress bar, which is how per-page progress is folded
//! into a single number for the whole drawing set.

use std::fmt;
use std::sync::mpsc::Sender;

/// Pipeline stage identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Rasterize,
    Tiling,
    Ocr,
    Merge,
    LineDetection,
    Matching,
    ScaleResolution,
    Measurement,
    Annotation,
    Export,
    Complete,
}

impl Stage {
    /// Stable identifier used in logs and progress messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Rasterize => "rasterize",
            Stage::Tiling => "tiling",
            Stage::Ocr => "ocr",
            Stage::Merge => "merge",
            Stage::LineDetection => "line_detection",
            Stage::Matching => "matching",
            Stage::ScaleResolution => "scale_resolution",
            Stage::Measurement => "measurement",
            Stage::Annotation => "annotation",
            Stage::Export => "export",
            Stage::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single progress notification
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub stage: Stage,
    /// Fraction complete, clamped to `0.0..=1.0`
    pub fraction: f32,
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: Stage, fraction: f32, message: impl Into<String>) -> Self {
        Self {
            stage,
            fraction: fraction.clamp(0.0, 1.0),
            message: message.into(),
        }
    }

    /// Whole-number percentage, as shown to end users
    pub fn percent(&self) -> u8 {
        (self.fraction * 100.0).round() as u8
    }
}

/// Consumer of progress updates
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Forwards updates over an unbounded channel
///
/// `send` on an unbounded channel never blocks. A dropped receiver is not an
/// error for the pipeline; updates are simply discarded.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: Sender<ProgressUpdate>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<ProgressUpdate>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, update: ProgressUpdate) {
        let _ = self.sender.send(update);
    }
}

/// Maps local progress into `[start, end]` of a parent sink
pub struct ProgressRange<'a> {
    parent: &'a dyn ProgressSink,
    start: f32,
    end: f32,
    prefix: String,
}

impl<'a> ProgressRange<'a> {
    /// Create a range over `parent`; `start`/`end` are fractions of the parent
    pub fn new(parent: &'a dyn ProgressSink, start: f32, end: f32) -> Self {
        let start = start.clamp(0.0, 1.0);
        Self {
            parent,
            start,
            end: end.clamp(start, 1.0),
            prefix: String::new(),
        }
    }

    /// Prefix every forwarded message (e.g. `"Page 2/5: "`)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// The `index`-th of `count` equal slices of this range
    pub fn slice(&self, index: usize, count: usize) -> ProgressRange<'_> {
        let count = count.max(1) as f32;
        ProgressRange {
            parent: self,
            start: index as f32 / count,
            end: (index + 1) as f32 / count,
            prefix: String::new(),
        }
    }

    /// Map a local fraction into the parent's coordinates
    pub fn map(&self, fraction: f32) -> f32 {
        self.start + (self.end - self.start) * fraction.clamp(0.0, 1.0)
    }
}

impl ProgressSink for ProgressRange<'_> {
    fn report(&self, update: ProgressUpdate) {
        let message = if self.prefix.is_empty() {
            update.message
        } else {
            format!("{}{}", self.prefix, update.message)
        };
        self.parent.report(ProgressUpdate::new(
            update.stage,
            self.map(update.fraction),
            message,
        ));
    }
}
