//! Core domain types and portfolio-construction logic.

pub mod prices;
pub mod returns;
pub mod market;
pub mod universe;
pub mod alpha;
pub mod risk;
pub mod optimizer;
pub mod rebalance;
pub mod system;
pub mod config_validation;
pub mod error;
