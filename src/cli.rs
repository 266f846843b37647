//! CLI definition and dispatch.

use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use crate::adapters::cached_adapter::{CachedPriceData, DEFAULT_CACHE_CAPACITY};
use crate::adapters::csv_adapter::CsvPriceData;
use crate::adapters::csv_weights_writer::{CsvWeightsWriter, SessionWeightsWriter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::alpha::AlphaModel;
use crate::domain::config_validation::{
    parse_signals, read_bool, read_date, read_exposure_targets, read_number, read_required,
    read_trailing_window, read_value, validate_session_config,
};
use crate::domain::error::PortconError;
use crate::domain::market::MarketClock;
use crate::domain::optimizer::constraints::Bounds;
use crate::domain::optimizer::objective::Objective;
use crate::domain::optimizer::solver::SolverSettings;
use crate::domain::optimizer::{MeanVarianceConfig, PortfolioOptimizer};
use crate::domain::rebalance::{Frequency, RebalanceSchedule, DEFAULT_SCHEDULE_DAYS};
use crate::domain::returns::{ReturnMode, ReturnSettings};
use crate::domain::risk::marchenko_pastur::MarchenkoPastur;
use crate::domain::risk::RiskModel;
use crate::domain::system::{QuantSystem, SessionSummary, Verbosity};
use crate::domain::universe::{parse_assets, parse_listings, Universe};
use crate::ports::config_port::ConfigPort;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "portcon", about = "Quantitative portfolio construction sessions")]
pub struct Cli {
    /// Debug-level logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one session per config file
    Run {
        #[arg(short, long, num_args = 1.., required = true)]
        config: Vec<PathBuf>,
        /// Log every rebalance event at info level
        #[arg(long)]
        events: bool,
    },
    /// Print the rebalance schedule of a session
    Schedule {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a session configuration and its data files
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run { config, events } => {
            let verbosity = if events {
                Verbosity::Events
            } else {
                Verbosity::Quiet
            };
            run_sessions(&config, verbosity)
        }
        Command::Schedule { config } => run_schedule(&config),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(e: &PortconError) -> ExitCode {
    eprintln!("error: {e}");
    ExitCode::from(e)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, PortconError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    validate_session_config(&adapter)?;
    Ok(adapter)
}

fn run_sessions(paths: &[PathBuf], verbosity: Verbosity) -> ExitCode {
    eprintln!("Running {} session(s)", paths.len());

    // sessions share nothing
    let results: Vec<Result<SessionSummary, PortconError>> = paths
        .par_iter()
        .map(|path| run_session(path, verbosity))
        .collect();

    let mut exit = ExitCode::SUCCESS;
    let mut failed = false;
    for (path, result) in paths.iter().zip(&results) {
        match result {
            Ok(summary) => print_summary(path, summary),
            Err(e) => {
                eprintln!("{}: error: {e}", path.display());
                if !failed {
                    exit = ExitCode::from(e);
                    failed = true;
                }
            }
        }
    }

    let ok = results.iter().filter(|r| r.is_ok()).count();
    eprintln!("{ok}/{} session(s) completed", results.len());
    exit
}

fn print_summary(path: &Path, summary: &SessionSummary) {
    eprintln!(
        "{}: {} ticks, {} rebalances, {} skipped",
        path.display(),
        summary.ticks,
        summary.rebalances,
        summary.skipped
    );
    match &summary.final_weights {
        Some(weights) => {
            for (asset, weight) in weights {
                eprintln!("  {asset:<10} {weight:>10.6}");
            }
        }
        None => eprintln!("  no target weights produced"),
    }
}

/// Build and run the session described by one config file.
pub fn run_session(path: &Path, verbosity: Verbosity) -> Result<SessionSummary, PortconError> {
    let config = load_config(path)?;
    let clock = build_clock(&config)?;
    let (start, end) = build_session_dates(&config)?;
    let universe = build_universe(&config, &clock)?;
    let schedule = build_schedule(&config, &clock, start, end)?;
    let alpha = build_alpha(&config)?;
    let risk = build_risk(&config)?;
    let optimizer = build_optimizer(&config)?;

    let capacity = read_number::<usize>(&config, "session", "cache_capacity")?
        .unwrap_or(DEFAULT_CACHE_CAPACITY);
    let data = CachedPriceData::new(
        CsvPriceData::new(PathBuf::from(read_required(&config, "data", "path")?), clock),
        capacity,
    );

    let mut sink: SessionWeightsWriter = match read_value(&config, "output", "path") {
        Some(out) => CsvWeightsWriter::create(out)?,
        None => CsvWeightsWriter::discard()?,
    };

    let summary = QuantSystem::new(
        &universe,
        &data,
        &mut sink,
        alpha,
        risk,
        optimizer,
        schedule,
    )?
    .with_verbosity(verbosity)
    .run(clock.session_ticks(start, end))?;

    let rows = sink.rows();
    sink.into_inner()?;
    let (cache_hits, cache_misses) = data.stats();
    info!(
        config = config.source(),
        rows,
        cache_hits,
        cache_misses,
        "weights written"
    );
    Ok(summary)
}

fn run_schedule(config_path: &Path) -> ExitCode {
    let schedule = load_config(config_path).and_then(|config| {
        let clock = build_clock(&config)?;
        let (start, end) = build_session_dates(&config)?;
        build_schedule(&config, &clock, start, end)
    });

    match schedule {
        Ok(schedule) => {
            eprintln!(
                "{} rebalance(s), frequency {}",
                schedule.len(),
                schedule.frequency()
            );
            for dt in schedule.iter() {
                println!("{}", dt.to_rfc3339());
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating {}", config_path.display());
    let result = load_config(config_path).and_then(|config| {
        let clock = build_clock(&config)?;
        let universe = build_universe(&config, &clock)?;
        let data_path = PathBuf::from(read_required(&config, "data", "path")?);
        let available = CsvPriceData::new(data_path.clone(), clock).available_assets()?;
        let missing: Vec<String> = universe
            .all_assets()
            .into_iter()
            .filter(|asset| available.binary_search(asset).is_err())
            .collect();
        if !missing.is_empty() {
            return Err(PortconError::Data {
                reason: format!(
                    "no price file in {} for: {}",
                    data_path.display(),
                    missing.join(", ")
                ),
            });
        }
        // construct every model so cross-field errors surface here too
        build_alpha(&config)?;
        build_risk(&config)?;
        build_optimizer(&config)?;
        Ok(universe.count())
    });

    match result {
        Ok(count) => {
            eprintln!("Configuration is valid ({count} assets)");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

pub fn build_clock(config: &dyn ConfigPort) -> Result<MarketClock, PortconError> {
    match read_value(config, "rebalance", "timezone") {
        Some(name) => MarketClock::from_timezone(&name),
        None => Ok(MarketClock::default()),
    }
}

/// First and last session dates; the end defaults to one year after the
/// start.
pub fn build_session_dates(
    config: &dyn ConfigPort,
) -> Result<(NaiveDate, NaiveDate), PortconError> {
    let start = read_date(config, "session", "start_date")?.ok_or_else(|| {
        PortconError::ConfigMissing {
            section: "session".to_string(),
            key: "start_date".to_string(),
        }
    })?;
    let end = match read_date(config, "session", "end_date")? {
        Some(end) => end,
        None => start
            .checked_add_signed(Duration::days(DEFAULT_SCHEDULE_DAYS))
            .ok_or_else(|| PortconError::ConfigInvalid {
                section: "session".to_string(),
                key: "start_date".to_string(),
                reason: format!("no default end date one year after {start}"),
            })?,
    };
    Ok((start, end))
}

pub fn build_universe(
    config: &dyn ConfigPort,
    clock: &MarketClock,
) -> Result<Universe, PortconError> {
    let invalid = |key: &str, reason: String| PortconError::ConfigInvalid {
        section: "universe".to_string(),
        key: key.to_string(),
        reason,
    };

    if let Some(listed) = read_value(config, "universe", "listed") {
        let listings = parse_listings(&listed, clock).map_err(|e| invalid("listed", e.to_string()))?;
        return Ok(Universe::Dynamic(listings));
    }
    let assets = read_required(config, "universe", "assets")?;
    let assets = parse_assets(&assets).map_err(|e| invalid("assets", e.to_string()))?;
    Ok(Universe::fixed(assets))
}

/// The schedule covers every session date: it ends at the close of the
/// last one.
pub fn build_schedule(
    config: &dyn ConfigPort,
    clock: &MarketClock,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RebalanceSchedule, PortconError> {
    let frequency = read_value(config, "rebalance", "frequency")
        .map(|tag| {
            let weekday = read_value(config, "rebalance", "weekday");
            Frequency::parse(&tag, weekday.as_deref())
        })
        .transpose()?;
    let pre_market = read_bool(config, "rebalance", "pre_market")?.unwrap_or(false);

    RebalanceSchedule::with_defaults(
        clock.start_of_day(start),
        Some(clock.close(end)),
        frequency,
        pre_market,
        clock,
    )
}

fn build_return_settings(
    config: &dyn ConfigPort,
    section: &str,
) -> Result<ReturnSettings, PortconError> {
    let mode = read_value(config, section, "return_mode")
        .map(|m| ReturnMode::from_str(&m))
        .transpose()?
        .unwrap_or_default();
    let settings = ReturnSettings::new(mode);
    Ok(match read_trailing_window(config, section)? {
        Some(window) => settings.with_trailing_window(window),
        None => settings,
    })
}

pub fn build_alpha(config: &dyn ConfigPort) -> Result<AlphaModel, PortconError> {
    let model = read_value(config, "alpha", "model").unwrap_or_else(|| "single_fixed".into());
    match model.to_lowercase().as_str() {
        "single_fixed" => Ok(AlphaModel::SingleFixed {
            signal: read_number(config, "alpha", "signal")?.unwrap_or(1.0),
        }),
        "fixed" => {
            let weights = read_required(config, "alpha", "weights")?;
            let signals = parse_signals(&weights).map_err(|reason| PortconError::ConfigInvalid {
                section: "alpha".to_string(),
                key: "weights".to_string(),
                reason,
            })?;
            Ok(AlphaModel::Fixed(signals))
        }
        "expected_returns" => Ok(AlphaModel::ExpectedReturns(build_return_settings(
            config, "alpha",
        )?)),
        other => Err(PortconError::ConfigInvalid {
            section: "alpha".to_string(),
            key: "model".to_string(),
            reason: format!("unknown alpha model '{other}'"),
        }),
    }
}

pub fn build_risk(config: &dyn ConfigPort) -> Result<Option<RiskModel>, PortconError> {
    let model = read_value(config, "risk", "model").unwrap_or_else(|| "none".into());
    match model.to_lowercase().as_str() {
        "none" => Ok(None),
        "sample" => Ok(Some(RiskModel::sample(build_return_settings(config, "risk")?))),
        "rmt" => {
            let filter = MarchenkoPastur::new(
                read_number(config, "risk", "rmt_q")?,
                read_number(config, "risk", "rmt_sigma")?,
            );
            Ok(Some(RiskModel::rmt(
                build_return_settings(config, "risk")?,
                filter,
            )))
        }
        other => Err(PortconError::ConfigInvalid {
            section: "risk".to_string(),
            key: "model".to_string(),
            reason: format!("unknown risk model '{other}'"),
        }),
    }
}

pub fn build_optimizer(config: &dyn ConfigPort) -> Result<PortfolioOptimizer, PortconError> {
    let kind = read_value(config, "optimizer", "kind").unwrap_or_else(|| "fixed_weight".into());
    match kind.to_lowercase().as_str() {
        "fixed_weight" => Ok(PortfolioOptimizer::FixedWeight),
        "equal_weight" => Ok(PortfolioOptimizer::EqualWeight {
            scale: read_number(config, "optimizer", "scale")?.unwrap_or(1.0),
        }),
        "mean_variance" => {
            let objective = read_value(config, "optimizer", "objective")
                .map(|o| Objective::from_str(&o))
                .transpose()?
                .unwrap_or_default();

            let lower = read_number::<f64>(config, "optimizer", "lower_bound")?;
            let upper = read_number::<f64>(config, "optimizer", "upper_bound")?;
            let bounds = match (lower, upper) {
                (None, None) => Bounds::Unbounded,
                (lower, upper) => Bounds::Uniform {
                    lower: lower.unwrap_or(f64::NEG_INFINITY),
                    upper: upper.unwrap_or(f64::INFINITY),
                },
            };

            let defaults = SolverSettings::default();
            let solver = SolverSettings {
                max_iterations: read_number(config, "optimizer", "max_iterations")?
                    .unwrap_or(defaults.max_iterations),
                constraint_tolerance: read_number(config, "optimizer", "tolerance")?
                    .unwrap_or(defaults.constraint_tolerance),
                ..defaults
            };

            PortfolioOptimizer::mean_variance(MeanVarianceConfig {
                objective,
                exposure: read_exposure_targets(config)?,
                bounds,
                solver,
                ..MeanVarianceConfig::default()
            })
        }
        other => Err(PortconError::ConfigInvalid {
            section: "optimizer".to_string(),
            key: "kind".to_string(),
            reason: format!("unknown optimizer kind '{other}'"),
        }),
    }
}
