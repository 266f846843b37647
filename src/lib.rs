//! portcon: quantitative portfolio construction.
//!
//! Alpha forecasts and a risk model feed a portfolio optimizer on a
//! rebalance schedule; the resulting target weights are handed to an
//! order-sizing port.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
