//! Processes: cooperatively suspended state machines driven by the scheduler.

use std::fmt;

use crate::SimError;
use crate::event::Time;
use crate::resource::{Resource, ResourceId};
use crate::scheduler::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub usize);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Lifecycle of a process as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned, first resumption pending.
    Created,
    /// Currently executing inside [`Process::resume`].
    Running,
    /// Waiting on a timeout, a resource or a race.
    Suspended,
    /// Returned [`Await::Done`]; never resumed again.
    Done,
}

/// The suspension point a process yields to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Await {
    /// Resume with [`Wake::Timeout`] after `delay` units of virtual time.
    Timeout(f64),
    /// Resume with [`Wake::Granted`] once the resource is held.
    Resource(ResourceId),
    /// Race a grant of `resource` against `timeout`.
    ///
    /// Resumes with [`Wake::Race`]. If the timeout wins, the queued request
    /// has already been withdrawn when the process is resumed. A grant and a
    /// timeout at the same instant resolve in favour of the grant, including
    /// a grant caused by another racer giving up at that instant (see the
    /// crate docs for the order racers are settled in).
    FirstOf { resource: ResourceId, timeout: f64 },
    /// The process is finished.
    Done,
}

/// Why a process was resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Start,
    Timeout,
    Granted(ResourceId),
    Race(RaceOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceOutcome {
    /// The resource was granted first; the process now holds it.
    Granted(ResourceId),
    /// The timeout elapsed first; the request was withdrawn.
    TimedOut(ResourceId),
}

/// A unit of simulation logic.
///
/// `resume` runs synchronously and must return the next suspension point.
/// It is only ever called by the scheduler, with the clock already advanced
/// to the time of the event being delivered.
pub trait Process<C> {
    fn resume(&mut self, ctx: &mut Context<'_, C>, wake: Wake) -> Result<Await, SimError>;
}

/// The running process's view of the simulation.
pub struct Context<'a, C> {
    pub(crate) kernel: &'a mut Kernel<C>,
    pub(crate) state: &'a mut C,
    pub(crate) current: ProcessId,
}

impl<C> Context<'_, C> {
    pub fn now(&self) -> Time {
        self.kernel.now
    }

    /// Id of the process being resumed.
    pub fn id(&self) -> ProcessId {
        self.current
    }

    pub fn state(&self) -> &C {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut C {
        &mut *self.state
    }

    pub fn resource(&self, id: ResourceId) -> Result<&Resource, SimError> {
        self.kernel.resource(id)
    }

    /// Release a resource held by the current process.
    ///
    /// The oldest queued request, if any, is granted at the current instant.
    pub fn release(&mut self, resource: ResourceId) -> Result<(), SimError> {
        self.kernel.release(self.current, resource)
    }

    /// Start a new process at the current instant.
    pub fn spawn(&mut self, process: impl Process<C> + 'static) -> ProcessId {
        self.kernel.spawn(Box::new(process))
    }

    /// Build an [`SimError::UnexpectedWake`] for the current process.
    pub fn unexpected(&self, detail: impl fmt::Debug) -> SimError {
        SimError::UnexpectedWake {
            process: self.current,
            detail: format!("{detail:?}"),
        }
    }
}
