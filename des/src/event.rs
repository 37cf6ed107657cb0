//! Virtual time and the keys that order the pending event set.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

use crate::process::ProcessId;
use crate::resource::ResourceId;

/// A point on the virtual clock.
///
/// Wraps `f64` so it can be totally ordered. Two times compare equal only if
/// their bit patterns order equal under [`f64::total_cmp`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Time(pub f64);

impl Time {
    pub const ZERO: Time = Time(0.0);

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Time {}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add<f64> for Time {
    type Output = Time;

    fn add(self, rhs: f64) -> Time {
        Time(self.0 + rhs)
    }
}

impl Sub for Time {
    type Output = f64;

    fn sub(self, rhs: Time) -> f64 {
        self.0 - rhs.0
    }
}

impl From<f64> for Time {
    fn from(value: f64) -> Self {
        Time(value)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Key for ordering pending events.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (FIFO for events due at the same time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    /// When this event is due.
    pub time: Time,
    /// Order in which the event was scheduled.
    pub sequence: u64,
}

/// Handle to a scheduled event, used to cancel it before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHandle(pub(crate) EventKey);

impl EventHandle {
    pub fn key(&self) -> EventKey {
        self.0
    }

    pub fn due(&self) -> Time {
        self.0.time
    }
}

/// What happens to the target process when the event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    /// First resumption of a freshly spawned process.
    Start,
    /// A plain timeout elapsed.
    Timer,
    /// The resource was handed to the target.
    Grant(ResourceId),
    /// The timeout side of a race for the given resource elapsed.
    RaceTimer(ResourceId),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Event {
    pub target: ProcessId,
    pub kind: EventKind,
}
