//! Two-stage call center simulation
//!
//! Customers call in, are triaged by a front desk, then wait for an expert.
//! While waiting for the expert they may hang up (renege) once their patience
//! runs out. The expert also takes short breaks, queuing for the expert
//! resource like any caller.
//!
//! Processes:
//! - ArrivalGenerator: spawns a Customer every `Exp(interarrival_rate)`
//! - Customer: front desk, then expert-or-renege, then records itself
//! - BreakScheduler: periodically occupies the expert for a fixed duration
//!
//! The run winds down once `target_count` customers have completed: no new
//! customers or breaks are started, but those already in flight finish.
//! Statistics are computed over the first `target_count` completions.

pub mod config;
pub mod customer;
pub mod generators;
pub mod output;
pub mod run;
pub mod summary;
pub mod variates;

pub use config::{BreakConfig, CallCenterConfig, FrontdeskService};
pub use customer::{CallPhase, Customer, CustomerRecord};
pub use generators::{ArrivalGenerator, BreakScheduler};
pub use output::{RunOutput, write_all, write_customers_csv};
pub use run::{
    RunState, SimulationReport, StationReport, build_scheduler, finish_report, replicate, simulate,
    simulate_with,
};
pub use summary::Summary;
pub use variates::{Draw, LogNormalParams, ScriptedVariates, SeededVariates, VariateSource};

use des::SimError;
use des::parallel::ReplicationError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("event queue ran dry after {completed} of {target} customers completed")]
    SchedulerExhausted { completed: usize, target: usize },

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Replication(#[from] ReplicationError),

    #[error("could not parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("could not render configuration: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("could not write customer records: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not write summary: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
