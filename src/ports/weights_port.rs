//! Target-weight handoff to the external order-sizing collaborator.

use crate::domain::error::PortconError;
use crate::domain::market::Timestamp;
use crate::domain::optimizer::TargetWeights;

pub trait TargetWeightPort {
    /// Receive the target weights produced by a due rebalance at `dt`.
    fn submit(&mut self, dt: Timestamp, weights: &TargetWeights) -> Result<(), PortconError>;
}
