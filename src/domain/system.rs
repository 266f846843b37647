//! The trading-session orchestrator.
//!
//! On every tick the schedule decides whether the pipeline fires. A due
//! tick runs alpha -> risk -> optimizer and hands the weights to the
//! order-sizing port. Ticks are processed strictly one at a time.
//!
//! Insufficient data and optimizer failures abort only the current tick:
//! the previous target weights stay current and the tick is reported as
//! skipped. Every other error aborts the session.

use crate::domain::alpha::AlphaModel;
use crate::domain::error::PortconError;
use crate::domain::market::Timestamp;
use crate::domain::optimizer::{PortfolioOptimizer, TargetWeights};
use crate::domain::rebalance::RebalanceSchedule;
use crate::domain::risk::RiskModel;
use crate::ports::data_port::{PriceDataPort, UniversePort};
use crate::ports::weights_port::TargetWeightPort;
use tracing::{debug, info, warn};

/// How loudly the orchestrator reports rebalance events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Events at `debug` level.
    #[default]
    Quiet,
    /// Events at `info` level.
    Events,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not a rebalance time.
    NoOp,
    Rebalanced(TargetWeights),
    /// Due, but no weights were produced; previous targets carried forward.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSummary {
    pub ticks: usize,
    pub rebalances: usize,
    pub skipped: usize,
    pub final_weights: Option<TargetWeights>,
}

pub struct QuantSystem<'a> {
    universe: &'a dyn UniversePort,
    data: &'a dyn PriceDataPort,
    sink: &'a mut dyn TargetWeightPort,
    alpha: AlphaModel,
    risk: Option<RiskModel>,
    optimizer: PortfolioOptimizer,
    schedule: RebalanceSchedule,
    verbosity: Verbosity,
    current: Option<TargetWeights>,
}

impl<'a> QuantSystem<'a> {
    pub fn new(
        universe: &'a dyn UniversePort,
        data: &'a dyn PriceDataPort,
        sink: &'a mut dyn TargetWeightPort,
        alpha: AlphaModel,
        risk: Option<RiskModel>,
        optimizer: PortfolioOptimizer,
        schedule: RebalanceSchedule,
    ) -> Result<Self, PortconError> {
        if optimizer.requires_risk() && risk.is_none() {
            return Err(PortconError::configuration(format!(
                "{optimizer} requires a risk model"
            )));
        }
        Ok(QuantSystem {
            universe,
            data,
            sink,
            alpha,
            risk,
            optimizer,
            schedule,
            verbosity: Verbosity::default(),
            current: None,
        })
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn schedule(&self) -> &RebalanceSchedule {
        &self.schedule
    }

    /// Target weights from the most recent successful rebalance.
    pub fn current_targets(&self) -> Option<&TargetWeights> {
        self.current.as_ref()
    }

    pub fn tick(&mut self, dt: Timestamp) -> Result<TickOutcome, PortconError> {
        if !self.schedule.is_due(dt) {
            return Ok(TickOutcome::NoOp);
        }

        match self.rebalance(dt) {
            Ok(Some(weights)) => {
                self.sink.submit(dt, &weights)?;
                self.event(dt, &format!("rebalanced {} assets", weights.len()));
                self.current = Some(weights.clone());
                Ok(TickOutcome::Rebalanced(weights))
            }
            Ok(None) => {
                self.event(dt, "empty forecast, no rebalance possible");
                Ok(TickOutcome::Skipped {
                    reason: "empty forecast".to_string(),
                })
            }
            Err(e) if !e.is_session_fatal() => {
                warn!(%dt, error = %e, "rebalance skipped, carrying forward previous targets");
                Ok(TickOutcome::Skipped {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Run every tick in order. The data port is told a session begins
    /// before the first tick.
    pub fn run(
        &mut self,
        ticks: impl IntoIterator<Item = Timestamp>,
    ) -> Result<SessionSummary, PortconError> {
        self.data.begin_session();
        self.current = None;
        info!(
            alpha = %self.alpha,
            risk = %self.risk.as_ref().map_or("none".to_string(), |r| r.to_string()),
            optimizer = %self.optimizer,
            rebalances = self.schedule.len(),
            "session started"
        );

        let mut summary = SessionSummary::default();
        for dt in ticks {
            summary.ticks += 1;
            match self.tick(dt)? {
                TickOutcome::NoOp => {}
                TickOutcome::Rebalanced(_) => summary.rebalances += 1,
                TickOutcome::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary.final_weights = self.current.clone();

        info!(
            ticks = summary.ticks,
            rebalances = summary.rebalances,
            skipped = summary.skipped,
            "session finished"
        );
        Ok(summary)
    }

    fn rebalance(&self, dt: Timestamp) -> Result<Option<TargetWeights>, PortconError> {
        let forecast = self.alpha.forecast(dt, self.universe, self.data)?;
        if forecast.is_empty() {
            return Ok(None);
        }

        let risk = self
            .risk
            .as_ref()
            .map(|model| model.covariance(dt, self.universe, self.data))
            .transpose()?;

        self.optimizer.optimize(&forecast, risk.as_ref()).map(Some)
    }

    fn event(&self, dt: Timestamp, message: &str) {
        match self.verbosity {
            Verbosity::Events => info!(%dt, "{message}"),
            Verbosity::Quiet => debug!(%dt, "{message}"),
        }
    }
}
