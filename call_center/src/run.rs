//! Wiring a call center onto the kernel and running it.

use des::parallel::{ParallelRunner, simple_progress_reporter};
use des::{ResourceStats, Scheduler, SimError, Time};
use tracing::{info, info_span};

use crate::Error;
use crate::config::CallCenterConfig;
use crate::customer::CustomerRecord;
use crate::generators::{ArrivalGenerator, BreakScheduler};
use crate::variates::{Draw, SeededVariates, VariateSource};

const FRONTDESK: &str = "frontdesk";
const EXPERT: &str = "expert";

/// Run context shared by every process of one call center run.
pub struct RunState {
    config: CallCenterConfig,
    variates: Box<dyn VariateSource + Send>,
    completed: Vec<CustomerRecord>,
    end_time: Option<f64>,
    break_time: f64,
    breaks_taken: usize,
    break_starts: Vec<f64>,
    arrivals: usize,
}

impl RunState {
    pub fn new(config: CallCenterConfig, variates: Box<dyn VariateSource + Send>) -> RunState {
        RunState {
            config,
            variates,
            completed: Vec::new(),
            end_time: None,
            break_time: 0.0,
            breaks_taken: 0,
            break_starts: Vec::new(),
            arrivals: 0,
        }
    }

    pub fn config(&self) -> &CallCenterConfig {
        &self.config
    }

    pub fn draw(&mut self, kind: Draw) -> f64 {
        self.variates.draw(kind)
    }

    /// Count a new arrival and return its customer id.
    pub fn note_arrival(&mut self) -> usize {
        self.arrivals += 1;
        self.arrivals
    }

    /// Append a finished customer. The completion that reaches the target
    /// count fixes the end time; later completions leave it alone.
    pub fn complete(&mut self, record: CustomerRecord, now: Time) {
        self.completed.push(record);
        if self.end_time.is_none() && self.completed.len() >= self.config.target_count {
            info!(time = %now, completed = self.completed.len(), "target reached, winding down");
            self.end_time = Some(now.value());
        }
    }

    /// Note that the expert went on break at `now`.
    pub fn start_break(&mut self, now: Time) {
        self.break_starts.push(now.value());
    }

    pub fn record_break(&mut self, duration: f64) {
        self.break_time += duration;
        self.breaks_taken += 1;
    }

    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    /// Every record, in completion order, including those finishing after
    /// the end time.
    pub fn completed(&self) -> &[CustomerRecord] {
        &self.completed
    }

    pub fn break_time(&self) -> f64 {
        self.break_time
    }

    pub fn breaks_taken(&self) -> usize {
        self.breaks_taken
    }

    pub fn break_starts(&self) -> &[f64] {
        &self.break_starts
    }

    pub fn arrivals(&self) -> usize {
        self.arrivals
    }
}

/// Counters of one station over the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct StationReport {
    pub name: String,
    pub capacity: usize,
    pub stats: ResourceStats,
    /// Busy share of the run including the wind-down after the end time.
    pub utilization: f64,
}

/// Everything a finished run leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub config: CallCenterConfig,
    /// All records in completion order.
    pub completed: Vec<CustomerRecord>,
    /// Completion time of the `target_count`-th customer.
    pub end_time: f64,
    /// Clock after the last event was processed.
    pub finished_at: f64,
    /// Break minutes over the whole run.
    pub break_time: f64,
    pub breaks_taken: usize,
    /// When each break began, including one still running at the end.
    pub break_starts: Vec<f64>,
    pub arrivals: usize,
    pub events_processed: u64,
    pub frontdesk: StationReport,
    pub expert: StationReport,
}

impl SimulationReport {
    /// The records statistics are computed over: the first `target_count`
    /// completions.
    pub fn counted(&self) -> &[CustomerRecord] {
        let n = self.config.target_count.min(self.completed.len());
        &self.completed[..n]
    }
}

/// Run one replication driven by the seed in `config`.
pub fn simulate(config: &CallCenterConfig) -> Result<SimulationReport, Error> {
    config.validate()?;
    let variates = SeededVariates::from_config(config)?;
    simulate_with(config, variates)
}

/// Run one replication with the given source of random durations.
pub fn simulate_with(
    config: &CallCenterConfig,
    variates: impl VariateSource + Send + 'static,
) -> Result<SimulationReport, Error> {
    config.validate()?;
    let _span = info_span!("run", seed = config.seed, target = config.target_count).entered();

    let mut scheduler = build_scheduler(config, Box::new(variates))?;
    info!(breaks = config.breaks.is_some(), "starting run");
    scheduler.run()?;
    finish_report(scheduler)
}

/// Create the stations and the background processes of one run.
///
/// The arrival generator is spawned before the break scheduler, so at time
/// zero the first interarrival gap is drawn before the first break interval.
pub fn build_scheduler(
    config: &CallCenterConfig,
    variates: Box<dyn VariateSource + Send>,
) -> Result<Scheduler<RunState>, SimError> {
    let mut scheduler = Scheduler::new(RunState::new(config.clone(), variates));
    let frontdesk = scheduler.add_resource(FRONTDESK, config.frontdesk_capacity)?;
    let expert = scheduler.add_resource(EXPERT, config.expert_capacity)?;

    scheduler.spawn(ArrivalGenerator::new(frontdesk, expert));
    if let Some(breaks) = config.breaks {
        scheduler.spawn(BreakScheduler::new(expert, breaks.duration));
    }
    Ok(scheduler)
}

/// Turn a drained scheduler into a report.
///
/// Fails with [`Error::SchedulerExhausted`] if the events ran out before
/// `target_count` customers completed.
pub fn finish_report(scheduler: Scheduler<RunState>) -> Result<SimulationReport, Error> {
    let finished_at = scheduler.now();
    let events_processed = scheduler.events_processed();
    let frontdesk = station(&scheduler, FRONTDESK, finished_at)?;
    let expert = station(&scheduler, EXPERT, finished_at)?;

    let state = scheduler.into_state();
    let Some(end_time) = state.end_time else {
        return Err(Error::SchedulerExhausted {
            completed: state.completed.len(),
            target: state.config.target_count,
        });
    };

    info!(
        end_time,
        finished_at = finished_at.value(),
        completed = state.completed.len(),
        arrivals = state.arrivals,
        "run finished"
    );

    Ok(SimulationReport {
        config: state.config,
        completed: state.completed,
        end_time,
        finished_at: finished_at.value(),
        break_time: state.break_time,
        breaks_taken: state.breaks_taken,
        break_starts: state.break_starts,
        arrivals: state.arrivals,
        events_processed,
        frontdesk,
        expert,
    })
}

fn station(scheduler: &Scheduler<RunState>, name: &str, now: Time) -> Result<StationReport, SimError> {
    let resource = scheduler
        .resources()
        .iter()
        .find(|resource| resource.name() == name)
        .ok_or_else(|| SimError::Invariant(format!("no station named {name}")))?;
    Ok(StationReport {
        name: name.to_string(),
        capacity: resource.capacity(),
        stats: resource.stats().clone(),
        utilization: resource.utilization(now),
    })
}

/// Run `replications` independent runs in parallel.
///
/// Replication `i` is seeded with `config.seed + i`, so the first one
/// matches [`simulate`] on the same config. Results come back in
/// replication order. A failed replication does not stop the others.
pub fn replicate(
    config: &CallCenterConfig,
    replications: usize,
    threads: Option<usize>,
) -> Result<Vec<Result<SimulationReport, Error>>, Error> {
    config.validate()?;
    let base = SeededVariates::from_config(config)?;
    info!(replications, seed = config.seed, "starting replications");

    let build = |replication: usize| {
        let seed = config.seed.wrapping_add(replication as u64);
        let config = config.clone().with_seed(seed);
        build_scheduler(&config, Box::new(base.reseeded(seed)))
    };

    let mut runner = ParallelRunner::new(replications, build, finish_report)
        .progress(simple_progress_reporter(replications / 10));
    if let Some(threads) = threads {
        runner = runner.num_threads(threads);
    }

    Ok(runner
        .run()
        .into_iter()
        .map(|result| result.map_err(Error::from).and_then(|report| report))
        .collect())
}
