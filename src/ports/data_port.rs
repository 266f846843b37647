//! Data access port traits.
//!
//! Implementations may fan out per-asset queries internally, but the core
//! treats every call as blocking.

use crate::domain::error::PortconError;
use crate::domain::market::Timestamp;
use crate::domain::prices::PriceTable;

pub trait PriceDataPort {
    /// Closes for `assets` known at or before `end_dt` (and at or after
    /// `start_dt` when given). Returns an empty table, not an error, when no
    /// data exists yet.
    fn historical_closes(
        &self,
        assets: &[String],
        end_dt: Timestamp,
        start_dt: Option<Timestamp>,
    ) -> Result<PriceTable, PortconError>;

    /// Called once before a session's first tick. Implementations holding
    /// cached state drop it here.
    fn begin_session(&self) {}
}

pub trait UniversePort {
    /// Assets eligible for trading at `dt`, sorted and deduplicated.
    fn assets_at(&self, dt: Timestamp) -> Vec<String>;
}
