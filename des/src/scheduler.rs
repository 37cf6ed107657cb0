//! The event scheduler.
//!
//! Owns the virtual clock and the pending event set, and drives every process
//! by delivering events in `(time, sequence)` order. Exactly one process runs
//! at a time and only yields at the suspension points named by [`Await`].

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, trace};

use crate::SimError;
use crate::event::{Event, EventHandle, EventKey, EventKind, Time};
use crate::process::{Await, Context, Process, ProcessId, ProcessState, RaceOutcome, Wake};
use crate::resource::{Resource, ResourceId};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The caller's predicate became true.
    PredicateMet,
    /// No pending events were left.
    Exhausted,
}

/// What a suspended process is waiting for.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Waiting {
    Start,
    Timer(EventKey),
    Resource(ResourceId),
    /// `timer` is `None` when the request was granted on the spot.
    Race {
        resource: ResourceId,
        timer: Option<EventKey>,
    },
}

struct Slot<C> {
    state: ProcessState,
    body: Option<Box<dyn Process<C>>>,
    waiting: Option<Waiting>,
}

/// Everything a running process may touch besides the run context.
pub(crate) struct Kernel<C> {
    pub(crate) now: Time,
    next_sequence: u64,
    pending: BTreeMap<EventKey, Event>,
    // race timeouts that fired at `now`, resolved once nothing else is due at `now`
    expiring: VecDeque<(ProcessId, ResourceId)>,
    processes: Vec<Slot<C>>,
    resources: Vec<Resource>,
    events_processed: u64,
}

impl<C> Kernel<C> {
    fn new() -> Self {
        Kernel {
            now: Time::ZERO,
            next_sequence: 0,
            pending: BTreeMap::new(),
            expiring: VecDeque::new(),
            processes: Vec::new(),
            resources: Vec::new(),
            events_processed: 0,
        }
    }

    fn push_event(&mut self, time: Time, target: ProcessId, kind: EventKind) -> EventKey {
        let key = EventKey {
            time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.pending.insert(key, Event { target, kind });
        key
    }

    fn due_after(&self, delay: f64) -> Result<Time, SimError> {
        if !delay.is_finite() || delay < 0.0 {
            return Err(SimError::InvalidDelay { delay });
        }
        Ok(self.now + delay)
    }

    fn schedule_timer(&mut self, after: f64, target: ProcessId) -> Result<EventHandle, SimError> {
        let due = self.due_after(after)?;
        Ok(EventHandle(self.push_event(due, target, EventKind::Timer)))
    }

    pub(crate) fn spawn(&mut self, body: Box<dyn Process<C>>) -> ProcessId {
        let id = ProcessId(self.processes.len());
        self.processes.push(Slot {
            state: ProcessState::Created,
            body: Some(body),
            waiting: Some(Waiting::Start),
        });
        self.push_event(self.now, id, EventKind::Start);
        trace!(time = %self.now, process = %id, "spawned");
        id
    }

    fn slot_mut(&mut self, id: ProcessId) -> Result<&mut Slot<C>, SimError> {
        self.processes
            .get_mut(id.0)
            .ok_or(SimError::UnknownProcess(id))
    }

    fn waiting(&self, id: ProcessId) -> Option<Waiting> {
        self.processes.get(id.0).and_then(|slot| slot.waiting)
    }

    pub(crate) fn resource(&self, id: ResourceId) -> Result<&Resource, SimError> {
        self.resources
            .get(id.0)
            .ok_or(SimError::UnknownResource(id))
    }

    fn resource_mut(&mut self, id: ResourceId) -> Result<&mut Resource, SimError> {
        self.resources
            .get_mut(id.0)
            .ok_or(SimError::UnknownResource(id))
    }

    fn check(&self, id: ResourceId) -> Result<(), SimError> {
        if cfg!(debug_assertions) {
            self.resource(id)?.check_invariants()?;
        }
        Ok(())
    }

    /// Returns `true` if the request was granted on the spot. The grant is
    /// still delivered as an event at the current instant.
    fn request(&mut self, process: ProcessId, resource: ResourceId) -> Result<bool, SimError> {
        let now = self.now;
        let granted = self.resource_mut(resource)?.request(process, now)?;
        if granted {
            self.push_event(now, process, EventKind::Grant(resource));
        } else {
            trace!(time = %now, %process, %resource, "queued");
        }
        self.check(resource)?;
        Ok(granted)
    }

    pub(crate) fn release(&mut self, process: ProcessId, resource: ResourceId) -> Result<(), SimError> {
        let now = self.now;
        if let Some(next) = self.resource_mut(resource)?.release(process, now)? {
            self.hand_over(next, resource);
        }
        self.check(resource)
    }

    /// Deliver a queued grant. Any race the grantee is in is decided here, in
    /// favour of the grant, even if its timeout is due at this same instant.
    fn hand_over(&mut self, process: ProcessId, resource: ResourceId) {
        if let Some(Waiting::Race { timer, .. }) = self.waiting(process) {
            if let Some(timer) = timer {
                self.pending.remove(&timer);
            }
            self.expiring.retain(|(parked, _)| *parked != process);
        }
        debug!(time = %self.now, %process, %resource, "granted from queue");
        self.push_event(self.now, process, EventKind::Grant(resource));
    }

    fn holds_any(&self, process: ProcessId) -> bool {
        self.resources.iter().any(|resource| resource.holds(process))
    }

    /// Next parked race timeout to resolve.
    ///
    /// Racers that hold a resource go first, in timer order: resuming them
    /// may release a slot, which hands it to another parked racer before its
    /// own timeout is settled. Racers holding nothing cannot free a slot, so
    /// their order among themselves does not matter.
    fn next_expiry(&mut self) -> Option<(ProcessId, ResourceId)> {
        let position = self
            .expiring
            .iter()
            .position(|(process, _)| self.holds_any(*process))
            .unwrap_or(0);
        self.expiring.remove(position)
    }

    fn withdraw(&mut self, process: ProcessId, resource: ResourceId) -> Result<bool, SimError> {
        let now = self.now;
        let withdrawn = self.resource_mut(resource)?.withdraw(process, now);
        self.check(resource)?;
        Ok(withdrawn)
    }

    /// Park `process` on its next suspension point.
    fn suspend(
        &mut self,
        id: ProcessId,
        body: Box<dyn Process<C>>,
        next: Await,
    ) -> Result<(), SimError> {
        let waiting = match next {
            Await::Done => {
                let slot = self.slot_mut(id)?;
                slot.state = ProcessState::Done;
                slot.waiting = None;
                trace!(time = %self.now, process = %id, "done");
                return Ok(());
            }
            Await::Timeout(delay) => Waiting::Timer(self.schedule_timer(delay, id)?.key()),
            Await::Resource(resource) => {
                self.request(id, resource)?;
                Waiting::Resource(resource)
            }
            Await::FirstOf { resource, timeout } => {
                let expires = self.due_after(timeout)?;
                let timer = if self.request(id, resource)? {
                    None
                } else {
                    Some(self.push_event(expires, id, EventKind::RaceTimer(resource)))
                };
                Waiting::Race { resource, timer }
            }
        };
        let slot = self.slot_mut(id)?;
        slot.state = ProcessState::Suspended;
        slot.body = Some(body);
        slot.waiting = Some(waiting);
        Ok(())
    }
}

/// Drives processes over a virtual clock.
///
/// `C` is the run context: whatever shared state the processes of one run
/// read and write. It is owned by the scheduler, so independent runs never
/// share state.
pub struct Scheduler<C> {
    kernel: Kernel<C>,
    state: C,
}

impl<C> Scheduler<C> {
    pub fn new(state: C) -> Scheduler<C> {
        Scheduler {
            kernel: Kernel::new(),
            state,
        }
    }

    pub fn now(&self) -> Time {
        self.kernel.now
    }

    pub fn state(&self) -> &C {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut C {
        &mut self.state
    }

    pub fn into_state(self) -> C {
        self.state
    }

    pub fn add_resource(
        &mut self,
        name: impl Into<String>,
        capacity: usize,
    ) -> Result<ResourceId, SimError> {
        let id = ResourceId(self.kernel.resources.len());
        self.kernel.resources.push(Resource::new(id, name, capacity)?);
        Ok(id)
    }

    pub fn resource(&self, id: ResourceId) -> Result<&Resource, SimError> {
        self.kernel.resource(id)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.kernel.resources
    }

    /// Start a process at the current instant.
    pub fn spawn(&mut self, process: impl Process<C> + 'static) -> ProcessId {
        self.kernel.spawn(Box::new(process))
    }

    pub fn process_state(&self, id: ProcessId) -> Option<ProcessState> {
        self.kernel.processes.get(id.0).map(|slot| slot.state)
    }

    /// Move the wake-up of a process sleeping on [`Await::Timeout`] to
    /// `after` units from now.
    ///
    /// The pending timeout is replaced, so the process still wakes exactly
    /// once. Processes waiting on a resource or a race cannot be woken this
    /// way: they are still in the resource's queue.
    pub fn schedule(&mut self, after: f64, target: ProcessId) -> Result<EventHandle, SimError> {
        if target.0 >= self.kernel.processes.len() {
            return Err(SimError::UnknownProcess(target));
        }
        let Some(Waiting::Timer(current)) = self.kernel.waiting(target) else {
            return Err(SimError::NotSleeping(target));
        };
        let handle = self.kernel.schedule_timer(after, target)?;
        self.kernel.pending.remove(&current);
        self.kernel.slot_mut(target)?.waiting = Some(Waiting::Timer(handle.key()));
        Ok(handle)
    }

    /// Remove an event that has not fired yet. Returns `false` if it already
    /// fired or was cancelled before.
    ///
    /// A process whose timeout is cancelled stays asleep.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.kernel.pending.remove(&handle.key()).is_some()
    }

    /// Events still to be delivered, including parked race timeouts.
    pub fn pending_len(&self) -> usize {
        self.kernel.pending.len() + self.kernel.expiring.len()
    }

    pub fn events_processed(&self) -> u64 {
        self.kernel.events_processed
    }

    /// Deliver the next event. Returns `false` once nothing is pending.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let next_due = self.kernel.pending.first_key_value().map(|(key, _)| key.time);
        if next_due.is_none_or(|due| due > self.kernel.now) {
            if let Some((id, resource)) = self.kernel.next_expiry() {
                self.expire(id, resource)?;
                return Ok(true);
            }
        }

        let Some((key, event)) = self.kernel.pending.pop_first() else {
            return Ok(false);
        };
        debug_assert!(key.time >= self.kernel.now, "clock must not run backwards");
        self.kernel.now = key.time;
        self.kernel.events_processed += 1;
        trace!(
            time = %key.time,
            sequence = key.sequence,
            process = %event.target,
            kind = ?event.kind,
            "deliver event"
        );

        match event.kind {
            EventKind::Start => self.resume(event.target, Wake::Start)?,
            EventKind::Timer => self.resume(event.target, Wake::Timeout)?,
            EventKind::Grant(resource) => {
                let wake = match self.kernel.waiting(event.target) {
                    Some(Waiting::Race { .. }) => Wake::Race(RaceOutcome::Granted(resource)),
                    _ => Wake::Granted(resource),
                };
                self.resume(event.target, wake)?
            }
            EventKind::RaceTimer(resource) => {
                self.kernel.expiring.push_back((event.target, resource))
            }
        }
        Ok(true)
    }

    /// Deliver events until `predicate` holds or nothing is pending.
    ///
    /// The predicate is checked before the first event and after every
    /// delivered event.
    pub fn run_until<P>(&mut self, mut predicate: P) -> Result<RunOutcome, SimError>
    where
        P: FnMut(&C) -> bool,
    {
        if predicate(&self.state) {
            return Ok(RunOutcome::PredicateMet);
        }
        while self.step()? {
            if predicate(&self.state) {
                return Ok(RunOutcome::PredicateMet);
            }
        }
        Ok(RunOutcome::Exhausted)
    }

    /// Deliver events until nothing is pending.
    pub fn run(&mut self) -> Result<RunOutcome, SimError> {
        self.run_until(|_| false)
    }

    fn resume(&mut self, id: ProcessId, wake: Wake) -> Result<(), SimError> {
        let slot = self.kernel.slot_mut(id)?;
        let mut body = slot.body.take().ok_or(SimError::UnknownProcess(id))?;
        slot.state = ProcessState::Running;
        slot.waiting = None;

        let next = {
            let mut ctx = Context {
                kernel: &mut self.kernel,
                state: &mut self.state,
                current: id,
            };
            body.resume(&mut ctx, wake)?
        };
        self.kernel.suspend(id, body, next)
    }

    /// Resolve a race whose timeout won: withdraw the queued request, then
    /// resume the process.
    fn expire(&mut self, id: ProcessId, resource: ResourceId) -> Result<(), SimError> {
        match self.kernel.waiting(id) {
            Some(Waiting::Race { resource: racing, .. }) if racing == resource => {}
            other => {
                return Err(SimError::UnexpectedWake {
                    process: id,
                    detail: format!("race timeout on {resource} while waiting on {other:?}"),
                });
            }
        }
        if !self.kernel.withdraw(id, resource)? {
            return Err(SimError::Invariant(format!(
                "{id} timed out on {resource} without a queued request"
            )));
        }
        debug!(time = %self.kernel.now, process = %id, %resource, "race timed out, request withdrawn");
        self.resume(id, Wake::Race(RaceOutcome::TimedOut(resource)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records `(label, now)` on every resumption, sleeping `delays` in turn.
    struct Sleeper {
        label: u8,
        delays: Vec<f64>,
    }

    impl Process<Vec<(u8, f64)>> for Sleeper {
        fn resume(
            &mut self,
            ctx: &mut Context<'_, Vec<(u8, f64)>>,
            _wake: Wake,
        ) -> Result<Await, SimError> {
            let now = ctx.now().value();
            ctx.state_mut().push((self.label, now));
            if self.delays.is_empty() {
                return Ok(Await::Done);
            }
            Ok(Await::Timeout(self.delays.remove(0)))
        }
    }

    #[test]
    fn events_are_delivered_in_time_order() {
        let mut scheduler = Scheduler::new(Vec::new());
        scheduler.spawn(Sleeper {
            label: 1,
            delays: vec![5.0],
        });
        scheduler.spawn(Sleeper {
            label: 2,
            delays: vec![2.0],
        });

        let outcome = scheduler.run().unwrap();

        assert_eq!(outcome, RunOutcome::Exhausted);
        assert_eq!(
            scheduler.state(),
            &vec![(1, 0.0), (2, 0.0), (2, 2.0), (1, 5.0)]
        );
        assert_eq!(scheduler.now(), Time(5.0));
    }

    #[test]
    fn equal_times_follow_scheduling_order() {
        let mut scheduler = Scheduler::new(Vec::new());
        for label in 0..4 {
            scheduler.spawn(Sleeper {
                label,
                delays: vec![1.0],
            });
        }

        scheduler.run().unwrap();

        let at_one: Vec<u8> = scheduler
            .state()
            .iter()
            .filter(|(_, t)| *t == 1.0)
            .map(|(label, _)| *label)
            .collect();
        assert_eq!(at_one, vec![0, 1, 2, 3]);
    }

    #[test]
    fn clock_never_runs_backwards() {
        let mut scheduler = Scheduler::new(Vec::new());
        scheduler.spawn(Sleeper {
            label: 0,
            delays: vec![0.0, 3.0, 0.0, 1.0],
        });
        scheduler.spawn(Sleeper {
            label: 1,
            delays: vec![2.0, 2.0],
        });

        let mut last = Time::ZERO;
        while scheduler.step().unwrap() {
            assert!(scheduler.now() >= last);
            last = scheduler.now();
        }
    }

    #[test]
    fn negative_delay_is_rejected() {
        let mut scheduler = Scheduler::new(Vec::new());
        scheduler.spawn(Sleeper {
            label: 0,
            delays: vec![-1.0],
        });

        assert_eq!(
            scheduler.run(),
            Err(SimError::InvalidDelay { delay: -1.0 })
        );
    }

    #[test]
    fn rescheduled_sleeper_wakes_once_at_the_new_time() {
        let mut scheduler = Scheduler::new(Vec::new());
        let id = scheduler.spawn(Sleeper {
            label: 0,
            delays: vec![10.0],
        });
        scheduler.step().unwrap();

        scheduler.schedule(4.0, id).unwrap();
        scheduler.run().unwrap();

        assert_eq!(scheduler.state(), &vec![(0, 0.0), (0, 4.0)]);
        assert_eq!(scheduler.now(), Time(4.0));
    }

    #[test]
    fn cancelled_event_never_fires() {
        let mut scheduler = Scheduler::new(Vec::new());
        let id = scheduler.spawn(Sleeper {
            label: 0,
            delays: vec![10.0],
        });
        scheduler.step().unwrap();
        let handle = scheduler.schedule(4.0, id).unwrap();

        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle), "second cancel is a no-op");

        scheduler.run().unwrap();
        assert_eq!(scheduler.state(), &vec![(0, 0.0)]);
        assert_eq!(scheduler.now(), Time::ZERO);
        assert_eq!(scheduler.process_state(id), Some(ProcessState::Suspended));
    }

    #[test]
    fn only_sleeping_processes_can_be_rescheduled() {
        let mut scheduler = Scheduler::new(Vec::new());
        let id = scheduler.spawn(Sleeper {
            label: 0,
            delays: vec![],
        });

        // start still pending
        assert_eq!(scheduler.schedule(1.0, id), Err(SimError::NotSleeping(id)));

        scheduler.run().unwrap();
        assert_eq!(scheduler.schedule(1.0, id), Err(SimError::NotSleeping(id)));
        assert_eq!(
            scheduler.schedule(1.0, ProcessId(7)),
            Err(SimError::UnknownProcess(ProcessId(7)))
        );
    }

    #[test]
    fn run_until_stops_when_predicate_holds() {
        let mut scheduler = Scheduler::new(Vec::new());
        scheduler.spawn(Sleeper {
            label: 0,
            delays: vec![1.0, 1.0, 1.0],
        });

        let outcome = scheduler.run_until(|log| log.len() == 2).unwrap();

        assert_eq!(outcome, RunOutcome::PredicateMet);
        assert_eq!(scheduler.now(), Time(1.0));
        assert_eq!(scheduler.pending_len(), 1);
    }

    #[test]
    fn process_state_follows_lifecycle() {
        let mut scheduler = Scheduler::new(Vec::new());
        let id = scheduler.spawn(Sleeper {
            label: 0,
            delays: vec![1.0],
        });
        assert_eq!(scheduler.process_state(id), Some(ProcessState::Created));

        scheduler.step().unwrap();
        assert_eq!(scheduler.process_state(id), Some(ProcessState::Suspended));

        scheduler.step().unwrap();
        assert_eq!(scheduler.process_state(id), Some(ProcessState::Done));
    }
}
