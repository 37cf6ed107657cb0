//! Process-oriented discrete-event simulation kernel.
//!
//! A [`Scheduler`] owns a virtual clock, a time-ordered set of pending events,
//! a set of [`Resource`]s and a caller-defined run context `C`. Simulation
//! logic lives in [`Process`] implementations: explicit state machines that
//! run synchronously until they return an [`Await`] naming their next
//! suspension point.
//!
//! Three suspension points exist:
//! - [`Await::Timeout`]: resume after a delay on the virtual clock
//! - [`Await::Resource`]: resume once the resource is granted (FIFO)
//! - [`Await::FirstOf`]: race a resource grant against a timeout
//!
//! # Ordering
//!
//! Events are ordered by `(time, sequence)` where `sequence` is the order in
//! which they were scheduled, so a run is fully reproducible given the same
//! sequence of draws from the caller's random source.
//!
//! # Races
//!
//! When a race's timeout fires it is not resolved immediately. It is parked
//! until every ordinary event due at the same instant has run; if the
//! resource is handed over in that window the grant wins and the timeout is
//! discarded. When several race timeouts fall due together, racers that hold
//! a resource are resolved first, so a slot they give up at that instant
//! still reaches a racer waiting for it.
//!
//! The one case left to timer order is a set of racers that each hold what
//! another is waiting for: one of them has to give up first.
//!
//! # Example
//!
//! ```rust
//! use des::{Await, Context, Process, Scheduler, SimError, Wake};
//!
//! struct Sleeper {
//!     naps: usize,
//! }
//!
//! impl Process<Vec<f64>> for Sleeper {
//!     fn resume(&mut self, ctx: &mut Context<'_, Vec<f64>>, _wake: Wake) -> Result<Await, SimError> {
//!         let now = ctx.now().value();
//!         ctx.state_mut().push(now);
//!         if self.naps == 0 {
//!             return Ok(Await::Done);
//!         }
//!         self.naps -= 1;
//!         Ok(Await::Timeout(1.5))
//!     }
//! }
//!
//! let mut scheduler = Scheduler::new(Vec::new());
//! scheduler.spawn(Sleeper { naps: 2 });
//! scheduler.run().unwrap();
//! assert_eq!(scheduler.state(), &vec![0.0, 1.5, 3.0]);
//! ```

pub mod event;
pub mod parallel;
pub mod process;
pub mod resource;
pub mod scheduler;

pub use event::{EventHandle, EventKey, Time};
pub use process::{Await, Context, Process, ProcessId, ProcessState, RaceOutcome, Wake};
pub use resource::{Resource, ResourceId, ResourceStats};
pub use scheduler::{RunOutcome, Scheduler};

/// Errors raised by the kernel.
///
/// Every variant aborts the run; there is no recovery inside a simulation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("resource capacity must be at least 1 (resource {name})")]
    InvalidCapacity { name: String },

    #[error("delay must be finite and non-negative, got {delay}")]
    InvalidDelay { delay: f64 },

    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),

    #[error("unknown or finished process {0}")]
    UnknownProcess(ProcessId),

    #[error("process {process} does not hold resource {resource}")]
    NotHolder {
        process: ProcessId,
        resource: ResourceId,
    },

    #[error("process {process} already holds resource {resource}")]
    AlreadyHolding {
        process: ProcessId,
        resource: ResourceId,
    },

    #[error("process {0} is not sleeping on a timeout")]
    NotSleeping(ProcessId),

    #[error("process {process} resumed in an unexpected state: {detail}")]
    UnexpectedWake { process: ProcessId, detail: String },

    #[error("resource invariant violated: {0}")]
    Invariant(String),
}
