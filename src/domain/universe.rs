//! Asset universes: the set of assets eligible for trading at a given time.
//!
//! Parses asset lists from configuration. A static universe never changes;
//! a dynamic universe admits each asset from its listing timestamp onwards.

use crate::domain::market::{MarketClock, Timestamp};
use crate::ports::data_port::UniversePort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub enum Universe {
    Static(Vec<String>),
    Dynamic(BTreeMap<String, Timestamp>),
}

impl Universe {
    pub fn fixed(assets: Vec<String>) -> Self {
        let mut assets = assets;
        assets.sort();
        assets.dedup();
        Universe::Static(assets)
    }

    /// Every asset that ever appears in the universe.
    pub fn all_assets(&self) -> Vec<String> {
        match self {
            Universe::Static(assets) => assets.clone(),
            Universe::Dynamic(listings) => listings.keys().cloned().collect(),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Universe::Static(assets) => assets.len(),
            Universe::Dynamic(listings) => listings.len(),
        }
    }
}

impl UniversePort for Universe {
    fn assets_at(&self, dt: Timestamp) -> Vec<String> {
        match self {
            Universe::Static(assets) => assets.clone(),
            Universe::Dynamic(listings) => listings
                .iter()
                .filter(|(_, listed)| dt >= **listed)
                .map(|(asset, _)| asset.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in asset list")]
    EmptyToken,

    #[error("duplicate asset: {0}")]
    DuplicateAsset(String),

    #[error("invalid listing '{0}', expected ASSET:YYYY-MM-DD")]
    InvalidListing(String),
}

pub fn parse_assets(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let asset = trimmed.to_uppercase();
        if !seen.insert(asset.clone()) {
            return Err(UniverseError::DuplicateAsset(asset));
        }
        assets.push(asset);
    }

    Ok(assets)
}

/// Parse `ASSET:YYYY-MM-DD` pairs; each asset joins the universe at the
/// start of its listing day.
pub fn parse_listings(
    input: &str,
    clock: &MarketClock,
) -> Result<BTreeMap<String, Timestamp>, UniverseError> {
    let mut listings = BTreeMap::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let (asset, date) = trimmed
            .split_once(':')
            .ok_or_else(|| UniverseError::InvalidListing(trimmed.to_string()))?;
        let asset = asset.trim().to_uppercase();
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| UniverseError::InvalidListing(trimmed.to_string()))?;
        if asset.is_empty() {
            return Err(UniverseError::InvalidListing(trimmed.to_string()));
        }
        if listings.insert(asset.clone(), clock.start_of_day(date)).is_some() {
            return Err(UniverseError::DuplicateAsset(asset));
        }
    }

    Ok(listings)
}
