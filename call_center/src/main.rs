//! Call center simulation - command line driver
//!
//! Runs the baseline study (or a TOML configuration) and prints the
//! operating statistics of each replication.

use std::path::PathBuf;
use std::process::ExitCode;

use call_center::{
    CallCenterConfig, Error, SimulationReport, Summary, replicate, simulate, write_all,
};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Two-stage call center simulation
#[derive(Parser, Debug)]
#[command(name = "call-center")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML file with model parameters (baseline study if omitted)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Random seed, overriding the configuration
    #[arg(long)]
    seed: Option<u64>,

    /// Completed customers after which the run winds down
    #[arg(short = 'n', long)]
    customers: Option<usize>,

    /// Independent replications, seeded seed, seed+1, ...
    #[arg(short = 'r', long, default_value = "1")]
    replications: usize,

    /// Worker threads for replications (rayon's default if omitted)
    #[arg(long)]
    threads: Option<usize>,

    /// Disable expert breaks
    #[arg(long)]
    no_breaks: bool,

    /// Directory to write customers.csv and summary.json into
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,call_center=info")),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "simulation failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    let mut config = match &args.config {
        Some(path) => CallCenterConfig::load(path)?,
        None => CallCenterConfig::baseline(),
    };
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(customers) = args.customers {
        config = config.with_target_count(customers);
    }
    if args.no_breaks {
        config = config.without_breaks();
    }
    config.validate()?;

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("=== Two-Stage Call Center ===\n");
    print_config(&config);

    if args.replications <= 1 {
        let report = simulate(&config)?;
        print_report(&report);
        if let Some(dir) = &args.output {
            write_all(&report, dir)?;
            println!("Results written to {}", dir.display());
        }
        return Ok(());
    }

    let results = replicate(&config, args.replications, args.threads)?;
    let mut summaries = Vec::with_capacity(results.len());
    for (replication, result) in results.into_iter().enumerate() {
        println!("--- Replication {} ---", replication);
        match result {
            Ok(report) => {
                print_report(&report);
                if let Some(dir) = &args.output {
                    write_all(&report, dir.join(format!("replication_{replication}")))?;
                }
                summaries.push(Summary::from_report(&report));
            }
            Err(err) => println!("failed: {err}\n"),
        }
    }
    print_means(&summaries, args.replications);
    Ok(())
}

fn print_config(config: &CallCenterConfig) {
    println!("Configuration:");
    println!("  Seed: {}", config.seed);
    println!("  Customers: {}", config.target_count);
    println!("  Mean interarrival: {:.2}", 1.0 / config.interarrival_rate);
    println!(
        "  Front desk service: log-normal, mean {:.2}, variance {:.2}",
        config.frontdesk.mean, config.frontdesk.variance
    );
    println!("  Mean expert service: {:.2}", 1.0 / config.expert_service_rate);
    println!("  Mean patience: {:.2}", 1.0 / config.reneging_rate);
    match config.breaks {
        Some(breaks) => println!(
            "  Breaks: every {:.2} on average, {:.2} long",
            1.0 / breaks.rate,
            breaks.duration
        ),
        None => println!("  Breaks: none"),
    }
    println!(
        "  Servers: {} front desk, {} expert\n",
        config.frontdesk_capacity, config.expert_capacity
    );
}

fn print_report(report: &SimulationReport) {
    println!("{}", Summary::from_report(report));
    println!(
        "Breaks taken: {} ({:.2} minutes)",
        report.breaks_taken, report.break_time
    );
    println!(
        "Arrivals: {}, completed: {}, events: {}\n",
        report.arrivals,
        report.completed.len(),
        report.events_processed
    );
}

fn print_means(summaries: &[Summary], replications: usize) {
    if summaries.is_empty() {
        println!("No replication finished");
        return;
    }
    let n = summaries.len() as f64;
    let mean = |f: fn(&Summary) -> f64| summaries.iter().map(f).sum::<f64>() / n;

    println!("=== Mean over {} of {} replications ===", summaries.len(), replications);
    println!("Utilization of frontdesk:                   {:.4}", mean(|s| s.frontdesk_utilization));
    println!("Utilization of expert (including breaks):   {:.4}", mean(|s| s.expert_utilization));
    println!(
        "Utilization of expert (excluding breaks):   {:.4}",
        mean(|s| s.expert_utilization_excluding_breaks)
    );
    println!("Average total waiting time:                 {:.4}", mean(|s| s.average_total_wait));
    println!("Maximum waiting to system time ratio:       {:.4}", mean(|s| s.max_wait_ratio));
    println!("Average number waiting for expert:          {:.4}", mean(|s| s.average_expert_queue));
    println!("Renege rate:                                {:.4}", mean(|s| s.renege_rate));
}
