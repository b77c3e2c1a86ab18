//! Tendon Extract Scheduler Library
//!
//! Execution plumbing shared by the extraction pipeline: cooperative
//! cancellation checked at stage boundaries, non-blocking progress reporting,
//! and page dispatch.
//!
//! # Example
//!
//! ```
//! use tendon_scheduler::{dispatch, CancellationToken, DispatchMode, NullProgress, ProgressRange};
//!
//! let token = CancellationToken::new();
//! let sink = NullProgress;
//! let overall = ProgressRange::new(&sink, 0.05, 0.90);
//!
//! let pages = vec!["page-0", "page-1"];
//! let done = dispatch(pages, DispatchMode::Sequential, |index, _page| {
//!     let _page_progress = overall.slice(index, 2);
//!     token.checkpoint("ocr").is_ok()
//! });
//! assert_eq!(done, vec![true, true]);
//! ```

mod cancel;
mod dispatch;
mod progress;

pub use cancel::{CancellationToken, Cancelled};
pub use dispatch::{dispatch, DispatchMode};
pub use progress::{
    ChannelProgress, NullProgress, ProgressRange, ProgressSink, ProgressUpdate, Stage,
};
