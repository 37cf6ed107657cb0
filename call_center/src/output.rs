//! Writing run results to disk.
//!
//! A run directory holds:
//! - `customers.csv`: every completed customer, in completion order
//! - `summary.json`: configuration, metadata and summary statistics

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::Error;
use crate::config::CallCenterConfig;
use crate::run::SimulationReport;
use crate::summary::Summary;

#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub config: CallCenterConfig,
    pub timestamp: String,
    pub end_time: f64,
    pub finished_at: f64,
    pub arrivals: usize,
    pub completed: usize,
    pub breaks_taken: usize,
    pub events_processed: u64,
    pub frontdesk_utilization: f64,
    pub expert_utilization: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub metadata: RunMetadata,
    pub summary: Summary,
}

impl RunOutput {
    pub fn from_report(report: &SimulationReport) -> RunOutput {
        RunOutput {
            metadata: RunMetadata {
                config: report.config.clone(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                end_time: report.end_time,
                finished_at: report.finished_at,
                arrivals: report.arrivals,
                completed: report.completed.len(),
                breaks_taken: report.breaks_taken,
                events_processed: report.events_processed,
                frontdesk_utilization: report.frontdesk.utilization,
                expert_utilization: report.expert.utilization,
            },
            summary: Summary::from_report(report),
        }
    }

    pub fn write_summary_json<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Write customer records to CSV, one row per completed customer.
pub fn write_customers_csv<P: AsRef<Path>>(report: &SimulationReport, path: P) -> Result<(), Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    for record in &report.completed {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write all outputs of a run to `dir`, creating it if needed.
pub fn write_all<P: AsRef<Path>>(report: &SimulationReport, dir: P) -> Result<(), Error> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    write_customers_csv(report, dir.join("customers.csv"))?;
    RunOutput::from_report(report).write_summary_json(dir.join("summary.json"))?;
    Ok(())
}
