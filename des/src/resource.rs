//! Bounded-capacity resources with a FIFO wait queue.
//!
//! A resource hands out at most `capacity` concurrent grants. Requests that
//! arrive while it is full wait in strict arrival order. On release the head
//! of the queue takes over the freed slot in the same step, so no other
//! process can observe the resource as free in between.

use std::collections::VecDeque;
use std::fmt;

use crate::SimError;
use crate::event::Time;
use crate::process::ProcessId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub usize);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Observable counters for a resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceStats {
    pub total_requests: usize,
    pub total_granted: usize,
    pub total_released: usize,
    pub total_withdrawn: usize,
    pub max_queue_length: usize,
    /// Time spent queued by requests that were granted or withdrawn.
    pub total_wait_time: f64,
    /// Integral of `in_use` over time up to the last state change.
    pub busy_area: f64,
}

#[derive(Debug, Clone)]
pub struct Resource {
    id: ResourceId,
    name: String,
    capacity: usize,
    users: Vec<ProcessId>,
    queue: VecDeque<(ProcessId, Time)>,
    last_change: Time,
    stats: ResourceStats,
}

impl Resource {
    pub fn new(id: ResourceId, name: impl Into<String>, capacity: usize) -> Result<Resource, SimError> {
        let name = name.into();
        if capacity == 0 {
            return Err(SimError::InvalidCapacity { name });
        }
        Ok(Resource {
            id,
            name,
            capacity,
            users: Vec::with_capacity(capacity),
            queue: VecDeque::new(),
            last_change: Time::ZERO,
            stats: ResourceStats::default(),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.users.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_at_capacity(&self) -> bool {
        self.users.len() == self.capacity
    }

    pub fn holds(&self, process: ProcessId) -> bool {
        self.users.contains(&process)
    }

    pub fn is_queued(&self, process: ProcessId) -> bool {
        self.queue.iter().any(|(queued, _)| *queued == process)
    }

    /// Queued processes, oldest request first.
    pub fn waiting(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.queue.iter().map(|(process, _)| *process)
    }

    pub fn stats(&self) -> &ResourceStats {
        &self.stats
    }

    /// Fraction of `[0, now]` the resource spent serving, averaged over its
    /// capacity.
    pub fn utilization(&self, now: Time) -> f64 {
        if now.value() <= 0.0 {
            return 0.0;
        }
        let open = self.users.len() as f64 * (now - self.last_change).max(0.0);
        (self.stats.busy_area + open) / (now.value() * self.capacity as f64)
    }

    /// Grant immediately if a slot is free, otherwise queue the request.
    ///
    /// Returns `true` if the request was granted on the spot.
    pub fn request(&mut self, process: ProcessId, now: Time) -> Result<bool, SimError> {
        if self.holds(process) {
            return Err(SimError::AlreadyHolding {
                process,
                resource: self.id,
            });
        }
        self.stats.total_requests += 1;
        if self.users.len() < self.capacity {
            self.accrue(now);
            self.users.push(process);
            self.stats.total_granted += 1;
            return Ok(true);
        }
        self.queue.push_back((process, now));
        self.stats.max_queue_length = self.stats.max_queue_length.max(self.queue.len());
        Ok(false)
    }

    /// Release the slot held by `process`.
    ///
    /// If anyone is waiting, the oldest request takes the slot over and is
    /// returned so the caller can wake it.
    pub fn release(&mut self, process: ProcessId, now: Time) -> Result<Option<ProcessId>, SimError> {
        let Some(position) = self.users.iter().position(|user| *user == process) else {
            return Err(SimError::NotHolder {
                process,
                resource: self.id,
            });
        };
        self.accrue(now);
        self.users.swap_remove(position);
        self.stats.total_released += 1;

        let Some((next, requested_at)) = self.queue.pop_front() else {
            return Ok(None);
        };
        self.users.push(next);
        self.stats.total_granted += 1;
        self.stats.total_wait_time += now - requested_at;
        Ok(Some(next))
    }

    /// Remove a queued, not yet granted request.
    ///
    /// Returns `false` if `process` is not queued, e.g. because it was granted.
    pub fn withdraw(&mut self, process: ProcessId, now: Time) -> bool {
        let Some(position) = self.queue.iter().position(|(queued, _)| *queued == process) else {
            return false;
        };
        if let Some((_, requested_at)) = self.queue.remove(position) {
            self.stats.total_withdrawn += 1;
            self.stats.total_wait_time += now - requested_at;
        }
        true
    }

    pub fn check_invariants(&self) -> Result<(), SimError> {
        if self.users.len() > self.capacity {
            return Err(SimError::Invariant(format!(
                "{}: {} users exceed capacity {}",
                self.name,
                self.users.len(),
                self.capacity
            )));
        }
        if let Some(user) = self.users.iter().find(|user| self.is_queued(**user)) {
            return Err(SimError::Invariant(format!(
                "{}: holder {} is also queued",
                self.name, user
            )));
        }
        if !self.queue.is_empty() && self.users.len() < self.capacity {
            return Err(SimError::Invariant(format!(
                "{}: {} queued while a slot is free",
                self.name,
                self.queue.len()
            )));
        }
        Ok(())
    }

    fn accrue(&mut self, now: Time) {
        let elapsed = (now - self.last_change).max(0.0);
        self.stats.busy_area += self.users.len() as f64 * elapsed;
        self.last_change = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: usize) -> ProcessId {
        ProcessId(n)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            Resource::new(ResourceId(0), "desk", 0),
            Err(SimError::InvalidCapacity { .. })
        ));
    }

    #[test]
    fn given_free_slot_when_requested_then_granted_immediately() {
        let mut resource = Resource::new(ResourceId(0), "desk", 2).unwrap();

        let granted = resource.request(pid(42), Time(10.0)).unwrap();

        assert!(granted);
        assert_eq!(resource.in_use(), 1);
        assert_eq!(resource.queue_len(), 0);
        assert_eq!(resource.stats().total_granted, 1);
    }

    #[test]
    fn given_full_resource_when_requested_then_queued() {
        let mut resource = Resource::new(ResourceId(0), "desk", 1).unwrap();
        resource.request(pid(1), Time(10.0)).unwrap();

        let granted = resource.request(pid(2), Time(15.0)).unwrap();

        assert!(!granted);
        assert!(resource.is_queued(pid(2)));
        assert!(resource.is_at_capacity());
        assert_eq!(resource.stats().max_queue_length, 1);
    }

    #[test]
    fn given_queue_when_released_then_oldest_request_takes_over() {
        let mut resource = Resource::new(ResourceId(0), "desk", 1).unwrap();
        resource.request(pid(1), Time(10.0)).unwrap();
        resource.request(pid(2), Time(15.0)).unwrap();
        resource.request(pid(3), Time(17.0)).unwrap();

        let next = resource.release(pid(1), Time(25.0)).unwrap();

        assert_eq!(next, Some(pid(2)));
        assert!(resource.holds(pid(2)));
        assert_eq!(resource.in_use(), 1, "hand-over keeps the slot occupied");
        assert_eq!(resource.waiting().collect::<Vec<_>>(), vec![pid(3)]);
        assert_eq!(resource.stats().total_wait_time, 10.0);
        resource.check_invariants().unwrap();
    }

    #[test]
    fn given_queued_request_when_withdrawn_then_never_granted() {
        let mut resource = Resource::new(ResourceId(0), "desk", 1).unwrap();
        resource.request(pid(1), Time(10.0)).unwrap();
        resource.request(pid(2), Time(15.0)).unwrap();

        assert!(resource.withdraw(pid(2), Time(20.0)));
        let next = resource.release(pid(1), Time(30.0)).unwrap();

        assert_eq!(next, None);
        assert_eq!(resource.in_use(), 0);
        assert_eq!(resource.stats().total_withdrawn, 1);
        assert_eq!(resource.stats().total_wait_time, 5.0);
    }

    #[test]
    fn withdrawing_a_holder_is_a_no_op() {
        let mut resource = Resource::new(ResourceId(0), "desk", 1).unwrap();
        resource.request(pid(1), Time(0.0)).unwrap();

        assert!(!resource.withdraw(pid(1), Time(1.0)));
        assert!(resource.holds(pid(1)));
    }

    #[test]
    fn release_by_non_holder_is_an_error() {
        let mut resource = Resource::new(ResourceId(0), "desk", 1).unwrap();
        resource.request(pid(1), Time(0.0)).unwrap();

        assert!(matches!(
            resource.release(pid(7), Time(1.0)),
            Err(SimError::NotHolder { .. })
        ));
    }

    #[test]
    fn utilization_integrates_busy_time() {
        let mut resource = Resource::new(ResourceId(0), "desk", 1).unwrap();
        resource.request(pid(1), Time(2.0)).unwrap();
        resource.release(pid(1), Time(6.0)).unwrap();

        assert_eq!(resource.utilization(Time(8.0)), 0.5);
    }
}
