//! The customer call workflow.
//!
//! ```text
//! Arrived -> WaitingFrontdesk -> InFrontdesk -> WaitingExpert -+-> InExpert -> Done
//!                                                              +-> Reneged
//! ```
//!
//! `Done` and `Reneged` are both final: the record is written on entry.
//!
//! While waiting for the expert the customer races the expert's queue
//! against their patience. Losing the race means hanging up without expert
//! service.

use des::{Await, Context, Process, RaceOutcome, ResourceId, SimError, Time, Wake};
use serde::Serialize;
use tracing::debug;

use crate::RunState;
use crate::variates::Draw;

/// Final, immutable view of a customer, appended once the call is over.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRecord {
    /// Arrival number, starting at 1.
    pub id: usize,
    pub arrival_time: f64,
    pub frontdesk_wait: f64,
    pub frontdesk_service: f64,
    pub expert_wait: f64,
    /// Zero when the customer reneged.
    pub expert_service: f64,
    pub reneged: bool,
    pub completed_at: f64,
}

impl CustomerRecord {
    pub fn total_wait(&self) -> f64 {
        self.frontdesk_wait + self.expert_wait
    }

    pub fn total_service(&self) -> f64 {
        self.frontdesk_service + self.expert_service
    }

    /// Share of the time in the system spent waiting.
    pub fn wait_ratio(&self) -> f64 {
        let in_system = self.total_wait() + self.total_service();
        if in_system > 0.0 {
            self.total_wait() / in_system
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Arrived,
    WaitingFrontdesk,
    InFrontdesk,
    WaitingExpert,
    InExpert,
    Done,
    /// Hung up while waiting for the expert.
    Reneged,
}

#[derive(Debug)]
pub struct Customer {
    id: usize,
    frontdesk: ResourceId,
    expert: ResourceId,
    phase: CallPhase,
    arrival_time: Time,
    frontdesk_wait: f64,
    frontdesk_service: f64,
    frontdesk_released: Time,
    patience: f64,
    expert_wait: f64,
    expert_service: f64,
}

impl Customer {
    pub fn new(id: usize, frontdesk: ResourceId, expert: ResourceId) -> Customer {
        Customer {
            id,
            frontdesk,
            expert,
            phase: CallPhase::Arrived,
            arrival_time: Time::ZERO,
            frontdesk_wait: 0.0,
            frontdesk_service: 0.0,
            frontdesk_released: Time::ZERO,
            patience: 0.0,
            expert_wait: 0.0,
            expert_service: 0.0,
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    fn finish(&mut self, ctx: &mut Context<'_, RunState>, phase: CallPhase) -> Await {
        self.phase = phase;
        let reneged = phase == CallPhase::Reneged;
        let now = ctx.now();
        let record = CustomerRecord {
            id: self.id,
            arrival_time: self.arrival_time.value(),
            frontdesk_wait: self.frontdesk_wait,
            frontdesk_service: self.frontdesk_service,
            expert_wait: self.expert_wait,
            expert_service: self.expert_service,
            reneged,
            completed_at: now.value(),
        };
        debug!(time = %now, customer = self.id, reneged, "call completed");
        ctx.state_mut().complete(record, now);
        Await::Done
    }
}

impl Process<RunState> for Customer {
    fn resume(&mut self, ctx: &mut Context<'_, RunState>, wake: Wake) -> Result<Await, SimError> {
        match (self.phase, wake) {
            (CallPhase::Arrived, Wake::Start) => {
                self.arrival_time = ctx.now();
                self.phase = CallPhase::WaitingFrontdesk;
                Ok(Await::Resource(self.frontdesk))
            }
            (CallPhase::WaitingFrontdesk, Wake::Granted(_)) => {
                self.frontdesk_wait = ctx.now() - self.arrival_time;
                self.frontdesk_service = ctx.state_mut().draw(Draw::FrontdeskService);
                self.phase = CallPhase::InFrontdesk;
                Ok(Await::Timeout(self.frontdesk_service))
            }
            (CallPhase::InFrontdesk, Wake::Timeout) => {
                ctx.release(self.frontdesk)?;
                self.frontdesk_released = ctx.now();
                self.patience = ctx.state_mut().draw(Draw::Patience);
                self.phase = CallPhase::WaitingExpert;
                Ok(Await::FirstOf {
                    resource: self.expert,
                    timeout: self.patience,
                })
            }
            (CallPhase::WaitingExpert, Wake::Race(RaceOutcome::Granted(_))) => {
                self.expert_wait = ctx.now() - self.frontdesk_released;
                self.expert_service = ctx.state_mut().draw(Draw::ExpertService);
                self.phase = CallPhase::InExpert;
                Ok(Await::Timeout(self.expert_service))
            }
            (CallPhase::WaitingExpert, Wake::Race(RaceOutcome::TimedOut(_))) => {
                // the kernel has already withdrawn the expert request
                self.expert_wait = self.patience;
                self.expert_service = 0.0;
                debug!(time = %ctx.now(), customer = self.id, waited = self.patience, "reneged");
                Ok(self.finish(ctx, CallPhase::Reneged))
            }
            (CallPhase::InExpert, Wake::Timeout) => {
                ctx.release(self.expert)?;
                Ok(self.finish(ctx, CallPhase::Done))
            }
            (phase, wake) => Err(ctx.unexpected((self.id, phase, wake))),
        }
    }
}
