//! Session configuration validation.
//!
//! Every field is checked before a session starts so that a bad file fails
//! fast with the offending `[section] key`. The typed readers are shared
//! with the CLI builders.

use crate::domain::alpha::ForecastVector;
use crate::domain::error::PortconError;
use crate::domain::market::MarketClock;
use crate::domain::optimizer::constraints::ExposureTargets;
use crate::domain::optimizer::objective::Objective;
use crate::domain::rebalance::Frequency;
use crate::domain::returns::ReturnMode;
use crate::domain::universe::{parse_assets, parse_listings};
use crate::ports::config_port::ConfigPort;
use chrono::{Duration, NaiveDate};
use std::str::FromStr;

pub const ALPHA_MODELS: &[&str] = &["single_fixed", "fixed", "expected_returns"];
pub const RISK_MODELS: &[&str] = &["none", "sample", "rmt"];
pub const OPTIMIZER_KINDS: &[&str] = &["fixed_weight", "equal_weight", "mean_variance"];

pub fn validate_session_config(config: &dyn ConfigPort) -> Result<(), PortconError> {
    validate_data(config)?;
    validate_session(config)?;
    validate_rebalance(config)?;
    validate_universe(config)?;
    validate_alpha(config)?;
    validate_risk(config)?;
    validate_optimizer(config)?;
    validate_output(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> PortconError {
    PortconError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> PortconError {
    PortconError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// A value that is present and not blank.
pub fn read_value(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn read_required(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, PortconError> {
    read_value(config, section, key).ok_or_else(|| missing(section, key))
}

pub fn read_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, PortconError> {
    read_value(config, section, key)
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| {
                invalid(section, key, format!("invalid {key} format, expected YYYY-MM-DD"))
            })
        })
        .transpose()
}

/// Parse a numeric key. A malformed value is an error, never a silent
/// default.
pub fn read_number<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, PortconError> {
    read_value(config, section, key)
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| invalid(section, key, format!("'{s}' is not a valid number")))
        })
        .transpose()
}

pub fn read_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<bool>, PortconError> {
    read_value(config, section, key)
        .map(|s| match s.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(invalid(section, key, format!("'{s}' is not a boolean"))),
        })
        .transpose()
}

/// `trailing_days` as a window: at least one day and small enough to be
/// represented as a `Duration`.
pub fn read_trailing_window(
    config: &dyn ConfigPort,
    section: &str,
) -> Result<Option<Duration>, PortconError> {
    let Some(days) = read_number::<i64>(config, section, "trailing_days")? else {
        return Ok(None);
    };
    if days < 1 {
        return Err(invalid(section, "trailing_days", "trailing_days must be at least 1"));
    }
    Duration::try_days(days).map(Some).ok_or_else(|| {
        invalid(
            section,
            "trailing_days",
            format!("trailing_days {days} is too large"),
        )
    })
}

/// An exposure target; `none` disables it.
fn read_exposure(
    config: &dyn ConfigPort,
    key: &str,
    default: Option<f64>,
) -> Result<Option<f64>, PortconError> {
    match read_value(config, "optimizer", key) {
        None => Ok(default),
        Some(s) if s.eq_ignore_ascii_case("none") => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid("optimizer", key, format!("'{s}' is not a valid exposure"))),
    }
}

pub fn read_exposure_targets(config: &dyn ConfigPort) -> Result<ExposureTargets, PortconError> {
    Ok(ExposureTargets {
        gross: read_exposure(config, "gross_exposure", Some(1.0))?,
        net: read_exposure(config, "net_exposure", None)?,
        long: read_exposure(config, "long_exposure", None)?,
        short: read_exposure(config, "short_exposure", None)?,
    })
}

/// `ASSET:value` pairs, e.g. `SPY:0.6, TLT:0.4`.
pub fn parse_signals(input: &str) -> Result<ForecastVector, String> {
    let mut signals = ForecastVector::new();
    for token in input.split(',') {
        let trimmed = token.trim();
        let (asset, value) = trimmed
            .split_once(':')
            .ok_or_else(|| format!("invalid entry '{trimmed}', expected ASSET:VALUE"))?;
        let asset = asset.trim().to_uppercase();
        if asset.is_empty() {
            return Err(format!("invalid entry '{trimmed}', expected ASSET:VALUE"));
        }
        let value: f64 = value
            .trim()
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| format!("invalid value in '{trimmed}'"))?;
        if signals.insert(asset.clone(), value).is_some() {
            return Err(format!("duplicate asset: {asset}"));
        }
    }
    Ok(signals)
}

fn one_of(section: &str, key: &str, value: &str, allowed: &[&str]) -> Result<(), PortconError> {
    if allowed.contains(&value.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(invalid(
            section,
            key,
            format!("unknown {key} '{value}', expected one of {}", allowed.join(", ")),
        ))
    }
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), PortconError> {
    read_required(config, "data", "path").map(|_| ())
}

fn validate_session(config: &dyn ConfigPort) -> Result<(), PortconError> {
    let start = read_date(config, "session", "start_date")?
        .ok_or_else(|| missing("session", "start_date"))?;
    if let Some(end) = read_date(config, "session", "end_date")? {
        if end < start {
            return Err(invalid(
                "session",
                "end_date",
                "end_date must not be before start_date",
            ));
        }
    }
    if let Some(capacity) = read_number::<i64>(config, "session", "cache_capacity")? {
        if capacity < 0 {
            return Err(invalid(
                "session",
                "cache_capacity",
                "cache_capacity must be non-negative",
            ));
        }
    }
    Ok(())
}

fn validate_rebalance(config: &dyn ConfigPort) -> Result<(), PortconError> {
    if let Some(tag) = read_value(config, "rebalance", "frequency") {
        let weekday = read_value(config, "rebalance", "weekday");
        Frequency::parse(&tag, weekday.as_deref())
            .map_err(|e| invalid("rebalance", "frequency", error_reason(e)))?;
    }
    read_bool(config, "rebalance", "pre_market")?;
    if let Some(name) = read_value(config, "rebalance", "timezone") {
        MarketClock::from_timezone(&name)
            .map_err(|e| invalid("rebalance", "timezone", error_reason(e)))?;
    }
    Ok(())
}

fn validate_universe(config: &dyn ConfigPort) -> Result<(), PortconError> {
    let assets = read_value(config, "universe", "assets");
    let listed = read_value(config, "universe", "listed");

    match (assets, listed) {
        (Some(_), Some(_)) => Err(invalid(
            "universe",
            "listed",
            "set either assets or listed, not both",
        )),
        (Some(assets), None) => parse_assets(&assets)
            .map(|_| ())
            .map_err(|e| invalid("universe", "assets", e.to_string())),
        (None, Some(listed)) => parse_listings(&listed, &MarketClock::default())
            .map(|_| ())
            .map_err(|e| invalid("universe", "listed", e.to_string())),
        (None, None) => Err(missing("universe", "assets")),
    }
}

fn validate_return_settings(config: &dyn ConfigPort, section: &str) -> Result<(), PortconError> {
    if let Some(mode) = read_value(config, section, "return_mode") {
        ReturnMode::from_str(&mode)
            .map_err(|e| invalid(section, "return_mode", error_reason(e)))?;
    }
    read_trailing_window(config, section)?;
    Ok(())
}

fn validate_alpha(config: &dyn ConfigPort) -> Result<(), PortconError> {
    let model = read_value(config, "alpha", "model").unwrap_or_else(|| "single_fixed".into());
    one_of("alpha", "model", &model, ALPHA_MODELS)?;

    if let Some(signal) = read_number::<f64>(config, "alpha", "signal")? {
        if !signal.is_finite() {
            return Err(invalid("alpha", "signal", "signal must be finite"));
        }
    }
    match read_value(config, "alpha", "weights") {
        Some(weights) => {
            parse_signals(&weights).map_err(|reason| invalid("alpha", "weights", reason))?;
        }
        None if model.eq_ignore_ascii_case("fixed") => return Err(missing("alpha", "weights")),
        None => {}
    }
    validate_return_settings(config, "alpha")
}

fn validate_risk(config: &dyn ConfigPort) -> Result<(), PortconError> {
    let model = read_value(config, "risk", "model").unwrap_or_else(|| "none".into());
    one_of("risk", "model", &model, RISK_MODELS)?;

    for key in ["rmt_q", "rmt_sigma"] {
        if let Some(value) = read_number::<f64>(config, "risk", key)? {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid("risk", key, format!("{key} must be positive")));
            }
        }
    }
    validate_return_settings(config, "risk")
}

fn validate_optimizer(config: &dyn ConfigPort) -> Result<(), PortconError> {
    let kind = read_value(config, "optimizer", "kind").unwrap_or_else(|| "fixed_weight".into());
    one_of("optimizer", "kind", &kind, OPTIMIZER_KINDS)?;

    if let Some(scale) = read_number::<f64>(config, "optimizer", "scale")? {
        if !scale.is_finite() {
            return Err(invalid("optimizer", "scale", "scale must be finite"));
        }
    }
    if let Some(objective) = read_value(config, "optimizer", "objective") {
        Objective::from_str(&objective)
            .map_err(|e| invalid("optimizer", "objective", error_reason(e)))?;
    }

    read_exposure_targets(config)?
        .resolve()
        .map_err(|e| invalid("optimizer", "exposure", error_reason(e)))?;

    let lower = read_number::<f64>(config, "optimizer", "lower_bound")?;
    let upper = read_number::<f64>(config, "optimizer", "upper_bound")?;
    if let (Some(lower), Some(upper)) = (lower, upper) {
        if lower > upper {
            return Err(invalid(
                "optimizer",
                "lower_bound",
                "lower_bound must not exceed upper_bound",
            ));
        }
    }
    if let Some(iterations) = read_number::<i64>(config, "optimizer", "max_iterations")? {
        if iterations < 1 {
            return Err(invalid(
                "optimizer",
                "max_iterations",
                "max_iterations must be at least 1",
            ));
        }
    }
    if let Some(tolerance) = read_number::<f64>(config, "optimizer", "tolerance")? {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(invalid("optimizer", "tolerance", "tolerance must be positive"));
        }
    }

    let risk = read_value(config, "risk", "model").unwrap_or_else(|| "none".into());
    if kind.eq_ignore_ascii_case("mean_variance") && risk.eq_ignore_ascii_case("none") {
        return Err(invalid(
            "risk",
            "model",
            "the mean_variance optimizer requires a risk model",
        ));
    }
    Ok(())
}

fn validate_output(config: &dyn ConfigPort) -> Result<(), PortconError> {
    match config.get_string("output", "path") {
        Some(path) if path.trim().is_empty() => {
            Err(invalid("output", "path", "path must not be blank"))
        }
        _ => Ok(()),
    }
}

fn error_reason(e: PortconError) -> String {
    match e {
        PortconError::Configuration { reason } => reason,
        other => other.to_string(),
    }
}
