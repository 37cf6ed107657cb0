//! Parallel execution of independent replications
//!
//! Each replication builds its own [`Scheduler`], runs it to completion on a
//! rayon worker, and hands the finished scheduler to a `finish` closure that
//! extracts whatever the caller needs. Schedulers never cross threads; only
//! the extracted output does.
//!
//! # Example: five replications of a trivial model
//!
//! ```rust
//! use des::parallel::ParallelRunner;
//! use des::{Await, Context, Process, Scheduler, SimError, Wake};
//!
//! struct Tick(f64);
//!
//! impl Process<u32> for Tick {
//!     fn resume(&mut self, ctx: &mut Context<'_, u32>, _wake: Wake) -> Result<Await, SimError> {
//!         *ctx.state_mut() += 1;
//!         if *ctx.state() == 3 {
//!             return Ok(Await::Done);
//!         }
//!         Ok(Await::Timeout(self.0))
//!     }
//! }
//!
//! let results = ParallelRunner::new(
//!     5,
//!     |replication| {
//!         let mut scheduler = Scheduler::new(0u32);
//!         scheduler.spawn(Tick(1.0 + replication as f64));
//!         Ok(scheduler)
//!     },
//!     |scheduler| scheduler.now().value(),
//! )
//! .num_threads(2)
//! .run();
//!
//! let end_times: Vec<f64> = results.into_iter().map(|r| r.unwrap()).collect();
//! assert_eq!(end_times, vec![2.0, 4.0, 6.0, 8.0, 10.0]);
//! ```
//!
//! # Determinism
//!
//! Results come back in replication order and are identical across runs when
//! the builder derives every random seed from the replication index. Thread
//! count and completion order have no influence.
//!
//! # Error Handling
//!
//! Build and run errors are returned as [`ReplicationError::Sim`]. Panics in
//! one replication are caught and returned as [`ReplicationError::Panicked`];
//! the other replications keep running.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::{Scheduler, SimError};

/// Why a replication produced no output.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplicationError {
    #[error("replication {replication} failed: {source}")]
    Sim {
        replication: usize,
        #[source]
        source: SimError,
    },

    #[error("replication {replication} panicked: {message}")]
    Panicked { replication: usize, message: String },
}

type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Runs independent replications in parallel
///
/// Generic over:
/// - `C`: run context of each scheduler
/// - `S`: output extracted from a finished scheduler
/// - `B`: builder, `Fn(replication) -> Result<Scheduler<C>, SimError>`
/// - `F`: finisher, `Fn(Scheduler<C>) -> S`
pub struct ParallelRunner<C, S, B, F>
where
    B: Fn(usize) -> Result<Scheduler<C>, SimError> + Send + Sync,
    F: Fn(Scheduler<C>) -> S + Send + Sync,
    S: Send,
{
    replications: usize,
    build: B,
    finish: F,
    num_threads: Option<usize>,
    progress_callback: Option<ProgressCallback>,
    _context: std::marker::PhantomData<fn() -> C>,
}

impl<C, S, B, F> ParallelRunner<C, S, B, F>
where
    B: Fn(usize) -> Result<Scheduler<C>, SimError> + Send + Sync,
    F: Fn(Scheduler<C>) -> S + Send + Sync,
    S: Send,
{
    pub fn new(replications: usize, build: B, finish: F) -> Self {
        ParallelRunner {
            replications,
            build,
            finish,
            num_threads: None,
            progress_callback: None,
            _context: std::marker::PhantomData,
        }
    }

    /// Set number of threads (defaults to rayon's global pool)
    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Set progress callback, called with `(completed, total)` after each
    /// replication finishes.
    pub fn progress<P>(mut self, callback: P) -> Self
    where
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Execute all replications and return their outputs in replication order
    pub fn run(self) -> Vec<Result<S, ReplicationError>> {
        let completed = AtomicUsize::new(0);

        let pool = self.num_threads.and_then(|n| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|err| warn!(%err, "falling back to the global thread pool"))
                .ok()
        });

        let execute = || {
            (0..self.replications)
                .into_par_iter()
                .map(|replication| {
                    let attempt = || -> Result<S, SimError> {
                        let mut scheduler = (self.build)(replication)?;
                        scheduler.run()?;
                        Ok((self.finish)(scheduler))
                    };
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(attempt));

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref callback) = self.progress_callback {
                        callback(done, self.replications);
                    }

                    match result {
                        Ok(Ok(output)) => Ok(output),
                        Ok(Err(source)) => Err(ReplicationError::Sim {
                            replication,
                            source,
                        }),
                        Err(panic) => Err(ReplicationError::Panicked {
                            replication,
                            message: panic_message(panic.as_ref()),
                        }),
                    }
                })
                .collect()
        };

        if let Some(pool) = pool {
            pool.install(execute)
        } else {
            execute()
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Run replications in parallel with the default thread pool.
pub fn run_parallel<C, S, B, F>(
    replications: usize,
    build: B,
    finish: F,
) -> Vec<Result<S, ReplicationError>>
where
    B: Fn(usize) -> Result<Scheduler<C>, SimError> + Send + Sync,
    F: Fn(Scheduler<C>) -> S + Send + Sync,
    S: Send,
{
    ParallelRunner::new(replications, build, finish).run()
}

/// Progress callback that logs every `interval` completed replications.
pub fn simple_progress_reporter(interval: usize) -> impl Fn(usize, usize) + Send + Sync {
    let interval = interval.max(1);
    move |completed, total| {
        if completed % interval == 0 || completed == total {
            info!(completed, total, "replications finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Await, Context, Process, Wake};
    use std::sync::Mutex;

    /// Counts up to `limit`, one tick every `gap`.
    struct Counter {
        gap: f64,
        limit: u32,
    }

    impl Process<u32> for Counter {
        fn resume(&mut self, ctx: &mut Context<'_, u32>, _wake: Wake) -> Result<Await, SimError> {
            *ctx.state_mut() += 1;
            if *ctx.state() >= self.limit {
                return Ok(Await::Done);
            }
            Ok(Await::Timeout(self.gap))
        }
    }

    fn build(replication: usize) -> Result<Scheduler<u32>, SimError> {
        let mut scheduler = Scheduler::new(0);
        scheduler.spawn(Counter {
            gap: 0.5,
            limit: replication as u32 + 1,
        });
        Ok(scheduler)
    }

    fn finish(scheduler: Scheduler<u32>) -> (u32, f64) {
        let now = scheduler.now().value();
        (scheduler.into_state(), now)
    }

    #[test]
    fn test_parallel_basic() {
        let results = run_parallel(10, build, finish);

        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            let (count, end) = result.as_ref().unwrap();
            assert_eq!(*count, i as u32 + 1);
            assert_eq!(*end, 0.5 * i as f64);
        }
    }

    #[test]
    fn test_parallel_determinism() {
        let run1 = run_parallel(20, build, finish);
        let run2 = ParallelRunner::new(20, build, finish).num_threads(3).run();

        assert_eq!(run1, run2);
    }

    #[test]
    fn test_parallel_error_isolation() {
        let results = run_parallel(
            4,
            |replication| {
                let mut scheduler = Scheduler::new(0);
                let gap = if replication == 2 { -1.0 } else { 1.0 };
                scheduler.spawn(Counter { gap, limit: 2 });
                Ok(scheduler)
            },
            finish,
        );

        assert!(matches!(
            results[2],
            Err(ReplicationError::Sim {
                replication: 2,
                source: SimError::InvalidDelay { .. }
            })
        ));
        assert!(results[0].is_ok() && results[1].is_ok() && results[3].is_ok());
    }

    #[test]
    fn test_parallel_panic_isolation() {
        let results = run_parallel(
            5,
            |replication| {
                if replication == 3 {
                    panic!("Test panic");
                }
                build(replication)
            },
            finish,
        );

        assert_eq!(
            results[3],
            Err(ReplicationError::Panicked {
                replication: 3,
                message: "Test panic".to_string()
            })
        );
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
    }

    #[test]
    fn test_parallel_progress_callback() {
        let completed = Arc::new(Mutex::new(0));
        let completed_clone = completed.clone();

        ParallelRunner::new(5, build, finish)
            .progress(move |count, _total| {
                let mut seen = completed_clone.lock().unwrap();
                *seen = (*seen).max(count);
            })
            .run();

        assert_eq!(*completed.lock().unwrap(), 5);
    }

    #[test]
    fn test_empty_replications() {
        let results = run_parallel(0, build, finish);
        assert!(results.is_empty());
    }

    #[test]
    fn test_simple_progress_reporter() {
        let reporter = simple_progress_reporter(10);
        reporter(10, 100);
        reporter(100, 100);
    }
}
