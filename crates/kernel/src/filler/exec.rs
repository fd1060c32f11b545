//! Fork-join execution of per-pair tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::warn;

use crate::config::BooleanOptions;
use crate::error::PreconditionError;

/// Cooperative cancellation flag shared between a caller and a running
/// operation. Checked at stage and task boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<(), PreconditionError> {
        if self.is_cancelled() { Err(PreconditionError::Cancelled) } else { Ok(()) }
    }
}

/// Runs independent tasks either inline or on a dedicated rayon pool.
///
/// Results always come back in input order, so merges that walk them
/// sequentially are independent of the worker count.
pub(crate) struct Executor {
    pool: Option<rayon::ThreadPool>,
}

impl Executor {
    pub fn new(options: &BooleanOptions) -> Self {
        let workers = options.worker_count();
        if workers <= 1 {
            return Self { pool: None };
        }
        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => Self { pool: Some(pool) },
            Err(err) => {
                warn!(%err, "thread pool unavailable, running sequentially");
                Self { pool: None }
            }
        }
    }

    pub fn workers(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// Apply `task` to every item into private result slots.
    pub fn map<T, R, F>(&self, items: &[T], cancel: &CancelToken, task: F) -> Result<Vec<R>, PreconditionError>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        cancel.check()?;
        let run = |item: &T| if cancel.is_cancelled() { None } else { Some(task(item)) };
        let slots: Vec<Option<R>> = match &self.pool {
            Some(pool) => pool.install(|| items.par_iter().map(run).collect()),
            None => items.iter().map(run).collect(),
        };
        slots.into_iter().collect::<Option<Vec<R>>>().ok_or(PreconditionError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_keep_input_order() {
        let items: Vec<u64> = (0..500).collect();
        let options = BooleanOptions {
            workers: 4,
            ..BooleanOptions::default()
        };
        let executor = Executor::new(&options);
        let out = executor.map(&items, &CancelToken::new(), |x| x * x).unwrap();
        assert_eq!(out, items.iter().map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancelled_token_stops_map() {
        let token = CancelToken::new();
        token.cancel();
        let executor = Executor::new(&BooleanOptions::sequential());
        let result = executor.map(&[1, 2, 3], &token, |x| x + 1);
        assert_eq!(result, Err(PreconditionError::Cancelled));
    }
}
