//! Page dispatch
//!
//! Pages of a drawing set share no mutable state, so they can be processed
//! one after another (the default, which keeps progress monotonic) or spread
//! across the rayon thread pool. Either way results come back in input order.

use rayon::prelude::*;

/// How independent work items are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One item at a time, in order
    #[default]
    Sequential,
    /// Items run concurrently on the global rayon pool
    Parallel,
}

impl DispatchMode {
    pub fn from_parallel_flag(parallel: bool) -> Self {
        if parallel {
            DispatchMode::Parallel
        } else {
            DispatchMode::Sequential
        }
    }
}

/// Run `work` over every item, returning results in input order
///
/// `work` receives the item's index alongside the item itself.
pub fn dispatch<T, R, F>(items: Vec<T>, mode: DispatchMode, work: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(usize, T) -> R + Send + Sync,
{
    tracing::debug!(items = items.len(), ?mode, "dispatching work items");

    match mode {
        DispatchMode::Sequential => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| work(index, item))
            .collect(),
        DispatchMode::Parallel => items
            .into_par_iter()
            .enumerate()
            .map(|(index, item)| work(index, item))
            .collect(),
    }
}
