//! Random durations.
//!
//! Every stochastic quantity in the model is drawn through [`VariateSource`]
//! so that a run can be driven either by a seeded generator or by scripted
//! values in tests.

use std::collections::{HashMap, VecDeque};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp, LogNormal};

use crate::Error;
use crate::config::CallCenterConfig;

/// What a draw is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Draw {
    /// Gap between two arrivals.
    Interarrival,
    FrontdeskService,
    ExpertService,
    /// How long a customer waits for the expert before hanging up.
    Patience,
    /// Gap between the end of one break and the next break request.
    BreakInterval,
}

pub trait VariateSource {
    fn draw(&mut self, kind: Draw) -> f64;
}

/// Parameters of the underlying normal of a log-normal distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogNormalParams {
    pub mean_log: f64,
    pub std_log: f64,
}

impl LogNormalParams {
    /// Parameters whose log-normal has mean `m` and variance `v`.
    ///
    /// `σ = sqrt(ln(1 + v/m²))`, `μ = ln(m) - σ²/2`
    pub fn from_moments(m: f64, v: f64) -> Self {
        let sigma_sq = (1.0 + v / (m * m)).ln();
        LogNormalParams {
            mean_log: m.ln() - sigma_sq / 2.0,
            std_log: sigma_sq.sqrt(),
        }
    }
}

/// Draws from a single seeded stream, in call order.
#[derive(Debug, Clone)]
pub struct SeededVariates {
    rng: StdRng,
    interarrival: Exp<f64>,
    frontdesk: LogNormal<f64>,
    expert: Exp<f64>,
    patience: Exp<f64>,
    breaks: Option<Exp<f64>>,
}

impl SeededVariates {
    pub fn from_config(config: &CallCenterConfig) -> Result<Self, Error> {
        let frontdesk = LogNormalParams::from_moments(config.frontdesk.mean, config.frontdesk.variance);
        Ok(SeededVariates {
            rng: StdRng::seed_from_u64(config.seed),
            interarrival: exp("interarrival_rate", config.interarrival_rate)?,
            frontdesk: LogNormal::new(frontdesk.mean_log, frontdesk.std_log).map_err(|err| {
                Error::InvalidConfiguration(format!("front-desk service distribution: {err}"))
            })?,
            expert: exp("expert_service_rate", config.expert_service_rate)?,
            patience: exp("reneging_rate", config.reneging_rate)?,
            breaks: config
                .breaks
                .map(|breaks| exp("breaks.rate", breaks.rate))
                .transpose()?,
        })
    }

    /// Same distributions, fresh stream.
    pub fn reseeded(&self, seed: u64) -> Self {
        SeededVariates {
            rng: StdRng::seed_from_u64(seed),
            ..self.clone()
        }
    }
}

fn exp(name: &str, rate: f64) -> Result<Exp<f64>, Error> {
    Exp::new(rate).map_err(|err| Error::InvalidConfiguration(format!("{name}: {err}")))
}

impl VariateSource for SeededVariates {
    fn draw(&mut self, kind: Draw) -> f64 {
        match kind {
            Draw::Interarrival => self.interarrival.sample(&mut self.rng),
            Draw::FrontdeskService => self.frontdesk.sample(&mut self.rng),
            Draw::ExpertService => self.expert.sample(&mut self.rng),
            Draw::Patience => self.patience.sample(&mut self.rng),
            // never scheduled: no break process runs without a break config
            Draw::BreakInterval => match &self.breaks {
                Some(breaks) => breaks.sample(&mut self.rng),
                None => f64::INFINITY,
            },
        }
    }
}

/// Fixed values per draw kind, for hand-checkable runs.
///
/// A kind can have a script of values that are handed out first, then a
/// value repeated forever. Drawing a kind with neither yields `NaN`, which
/// the scheduler rejects as an invalid delay.
#[derive(Debug, Clone, Default)]
pub struct ScriptedVariates {
    always: HashMap<Draw, f64>,
    scripts: HashMap<Draw, VecDeque<f64>>,
}

impl ScriptedVariates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always(mut self, kind: Draw, value: f64) -> Self {
        self.always.insert(kind, value);
        self
    }

    pub fn then(mut self, kind: Draw, values: impl IntoIterator<Item = f64>) -> Self {
        self.scripts.entry(kind).or_default().extend(values);
        self
    }
}

impl VariateSource for ScriptedVariates {
    fn draw(&mut self, kind: Draw) -> f64 {
        if let Some(value) = self.scripts.get_mut(&kind).and_then(VecDeque::pop_front) {
            return value;
        }
        self.always.get(&kind).copied().unwrap_or(f64::NAN)
    }
}
