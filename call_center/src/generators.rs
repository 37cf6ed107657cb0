//! Background processes: customer arrivals and expert breaks.
//!
//! Both loop until the run's end time is set, checking once per iteration
//! before they sleep. Work already started when the end time is set (an
//! arrival about to happen, a break already requested) still runs to
//! completion.

use des::{Await, Context, Process, ResourceId, SimError, Wake};
use tracing::{debug, trace};

use crate::RunState;
use crate::customer::Customer;
use crate::variates::Draw;

/// Spawns a [`Customer`] after every interarrival gap.
#[derive(Debug)]
pub struct ArrivalGenerator {
    frontdesk: ResourceId,
    expert: ResourceId,
}

impl ArrivalGenerator {
    pub fn new(frontdesk: ResourceId, expert: ResourceId) -> ArrivalGenerator {
        ArrivalGenerator { frontdesk, expert }
    }
}

impl Process<RunState> for ArrivalGenerator {
    fn resume(&mut self, ctx: &mut Context<'_, RunState>, wake: Wake) -> Result<Await, SimError> {
        match wake {
            Wake::Start => {}
            Wake::Timeout => {
                let id = ctx.state_mut().note_arrival();
                let process = ctx.spawn(Customer::new(id, self.frontdesk, self.expert));
                trace!(time = %ctx.now(), customer = id, %process, "arrival");
            }
            other => return Err(ctx.unexpected(other)),
        }

        if ctx.state().end_time().is_some() {
            debug!(time = %ctx.now(), arrivals = ctx.state().arrivals(), "arrivals stopped");
            return Ok(Await::Done);
        }
        Ok(Await::Timeout(ctx.state_mut().draw(Draw::Interarrival)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakPhase {
    Idle,
    /// Sleeping until the next break is due.
    Resting,
    /// Queued for the expert behind any waiting callers.
    Queued,
    OnBreak,
}

/// Takes the expert off the phones for `duration` at random intervals.
///
/// Breaks have no priority: the request joins the same FIFO queue as
/// customers, so a break starts once everyone queued before it is served.
#[derive(Debug)]
pub struct BreakScheduler {
    expert: ResourceId,
    duration: f64,
    phase: BreakPhase,
}

impl BreakScheduler {
    pub fn new(expert: ResourceId, duration: f64) -> BreakScheduler {
        BreakScheduler {
            expert,
            duration,
            phase: BreakPhase::Idle,
        }
    }

    fn rest(&mut self, ctx: &mut Context<'_, RunState>) -> Await {
        if ctx.state().end_time().is_some() {
            debug!(time = %ctx.now(), breaks = ctx.state().breaks_taken(), "breaks stopped");
            return Await::Done;
        }
        self.phase = BreakPhase::Resting;
        Await::Timeout(ctx.state_mut().draw(Draw::BreakInterval))
    }
}

impl Process<RunState> for BreakScheduler {
    fn resume(&mut self, ctx: &mut Context<'_, RunState>, wake: Wake) -> Result<Await, SimError> {
        match (self.phase, wake) {
            (BreakPhase::Idle, Wake::Start) => Ok(self.rest(ctx)),
            (BreakPhase::Resting, Wake::Timeout) => {
                self.phase = BreakPhase::Queued;
                Ok(Await::Resource(self.expert))
            }
            (BreakPhase::Queued, Wake::Granted(_)) => {
                debug!(time = %ctx.now(), duration = self.duration, "expert on break");
                let now = ctx.now();
                ctx.state_mut().start_break(now);
                self.phase = BreakPhase::OnBreak;
                Ok(Await::Timeout(self.duration))
            }
            (BreakPhase::OnBreak, Wake::Timeout) => {
                ctx.release(self.expert)?;
                ctx.state_mut().record_break(self.duration);
                Ok(self.rest(ctx))
            }
            (phase, wake) => Err(ctx.unexpected((phase, wake))),
        }
    }
}
