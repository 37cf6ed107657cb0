//! Operating statistics of a finished run.
//!
//! Computed over the first `target_count` completions and scaled by the end
//! time, i.e. the completion time of the `target_count`-th customer.
//! Customers finishing during the wind-down are not counted.

use std::fmt;

use serde::Serialize;

use crate::customer::CustomerRecord;
use crate::run::SimulationReport;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub customers: usize,
    pub end_time: f64,
    /// Front-desk service time over the end time.
    pub frontdesk_utilization: f64,
    /// Expert service time over the end time; break minutes count as idle.
    pub expert_utilization: f64,
    /// Expert service time over the end time minus break minutes.
    pub expert_utilization_excluding_breaks: f64,
    pub average_total_wait: f64,
    /// Largest share of time in system spent waiting, over all customers.
    pub max_wait_ratio: f64,
    /// Time-average number of customers queued for the expert.
    pub average_expert_queue: f64,
    pub reneged: usize,
    pub renege_rate: f64,
    pub break_time: f64,
}

impl Summary {
    pub fn from_report(report: &SimulationReport) -> Summary {
        Summary::from_records(report.counted(), report.end_time, report.break_time)
    }

    pub fn from_records(records: &[CustomerRecord], end_time: f64, break_time: f64) -> Summary {
        let customers = records.len();
        let sum = |f: fn(&CustomerRecord) -> f64| records.iter().map(f).sum::<f64>();

        let frontdesk_service = sum(|c| c.frontdesk_service);
        let expert_service = sum(|c| c.expert_service);
        let expert_wait = sum(|c| c.expert_wait);
        let total_wait = sum(CustomerRecord::total_wait);
        let reneged = records.iter().filter(|c| c.reneged).count();

        Summary {
            customers,
            end_time,
            frontdesk_utilization: ratio(frontdesk_service, end_time),
            expert_utilization: ratio(expert_service, end_time),
            expert_utilization_excluding_breaks: ratio(expert_service, end_time - break_time),
            average_total_wait: ratio(total_wait, customers as f64),
            max_wait_ratio: records
                .iter()
                .map(CustomerRecord::wait_ratio)
                .fold(0.0, f64::max),
            average_expert_queue: ratio(expert_wait, end_time),
            reneged,
            renege_rate: ratio(reneged as f64, customers as f64),
            break_time,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Customers:                                  {}", self.customers)?;
        writeln!(f, "End time:                                   {:.2}", self.end_time)?;
        writeln!(f, "Utilization of frontdesk:                   {:.4}", self.frontdesk_utilization)?;
        writeln!(f, "Utilization of expert (including breaks):   {:.4}", self.expert_utilization)?;
        writeln!(
            f,
            "Utilization of expert (excluding breaks):   {:.4}",
            self.expert_utilization_excluding_breaks
        )?;
        writeln!(f, "Average total waiting time:                 {:.4}", self.average_total_wait)?;
        writeln!(f, "Maximum waiting to system time ratio:       {:.4}", self.max_wait_ratio)?;
        writeln!(f, "Average number waiting for expert:          {:.4}", self.average_expert_queue)?;
        write!(
            f,
            "Reneged:                                    {} ({:.2}%)",
            self.reneged,
            self.renege_rate * 100.0
        )
    }
}
