use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use rusty_cable::config::{run_experiment, ExperimentConfig};
use rusty_cable::core::estimator::Execution;
use rusty_cable::error::CableError;
use rusty_cable::hines::solver::CableSolver;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {l} - {m}{n}";

#[derive(Parser, Debug)]
struct Args {
    /// The experiment configuration (JSON); the default experiment is run without it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Where to write the report, by default reports/<configuration hash>.json
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// The base seed shared by all comparisons
    #[arg(long)]
    seed: Option<u64>,
    /// The number of worker threads; trials run sequentially without it
    #[arg(long)]
    workers: Option<usize>,
    /// The number of trials per configuration and amplitude
    #[arg(long)]
    trials: Option<usize>,
    /// The log level, one of: off, error, warn, info, debug, trace
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(level: LevelFilter, log_file: Option<&PathBuf>) -> Result<(), CableError> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let mut builder =
        Config::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));
    let mut root = Root::builder().appender("stdout");

    if let Some(path) = log_file {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(path)
            .map_err(|e| CableError::IOError(e.to_string()))?;
        builder = builder.appender(Appender::builder().build("logfile", Box::new(logfile)));
        root = root.appender("logfile");
    }

    let config = builder
        .build(root.build(level))
        .map_err(|e| CableError::IOError(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| CableError::IOError(e.to_string()))?;
    Ok(())
}

fn main() -> Result<(), CableError> {
    let args = Args::parse();

    let level = args.log_level.parse::<LevelFilter>().map_err(|_| {
        CableError::ConfigurationError(format!("Invalid log level: {}", args.log_level))
    })?;
    init_logging(level, args.log_file.as_ref())?;

    log::info!("{:?}", args);

    let mut config = match &args.config {
        Some(path) => ExperimentConfig::load_from(path)?,
        None => ExperimentConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.estimator.base_seed = Some(seed);
    }
    if let Some(num_workers) = args.workers {
        config.estimator.execution = Execution::Parallel { num_workers };
    }
    if let Some(num_trials) = args.trials {
        config.estimator.num_trials = num_trials;
    }

    let report = run_experiment(&config, CableSolver)?;

    for amplitude in report.amplitudes.iter() {
        for distribution_report in amplitude.distributions.iter() {
            let distribution = &distribution_report.distribution;
            match &distribution_report.summary {
                Some(summary) => log::info!(
                    "{} at {} nA: firing probability {:.3} ± {:.3} \
                     (median {:.3}, {} trials, {} excluded)",
                    distribution.configuration,
                    amplitude.stim_amplitude,
                    summary.mean,
                    summary.std,
                    summary.median,
                    summary.count,
                    distribution.failures.len()
                ),
                None => log::warn!(
                    "{} at {} nA: no successful trial",
                    distribution.configuration,
                    amplitude.stim_amplitude
                ),
            }
        }
    }

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("reports/{}.json", report.config_hash)));
    report.save_to(&output)?;
    log::info!("Report saved to {}", output.display());

    Ok(())
}
