//! Bounded memoization of price queries.
//!
//! Alpha and risk models issue the same query at the same tick; the cache
//! answers the second one from memory. Entries are evicted oldest-first
//! once `capacity` is reached, and everything is dropped at the start of
//! each session.

use crate::domain::error::PortconError;
use crate::domain::market::Timestamp;
use crate::domain::prices::PriceTable;
use crate::ports::data_port::PriceDataPort;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use tracing::trace;

pub const DEFAULT_CACHE_CAPACITY: usize = 64;

type CacheKey = (Vec<String>, Timestamp, Option<Timestamp>);

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, PriceTable>,
    order: VecDeque<CacheKey>,
    hits: usize,
    misses: usize,
}

pub struct CachedPriceData<P> {
    inner: P,
    capacity: usize,
    state: RefCell<CacheState>,
}

impl<P: PriceDataPort> CachedPriceData<P> {
    pub fn new(inner: P, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            state: RefCell::new(CacheState::default()),
        }
    }

    pub fn invalidate(&self) {
        let mut state = self.state.borrow_mut();
        state.entries.clear();
        state.order.clear();
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since construction.
    pub fn stats(&self) -> (usize, usize) {
        let state = self.state.borrow();
        (state.hits, state.misses)
    }
}

impl<P: PriceDataPort> PriceDataPort for CachedPriceData<P> {
    fn historical_closes(
        &self,
        assets: &[String],
        end_dt: Timestamp,
        start_dt: Option<Timestamp>,
    ) -> Result<PriceTable, PortconError> {
        let key = (assets.to_vec(), end_dt, start_dt);
        {
            let mut state = self.state.borrow_mut();
            if let Some(table) = state.entries.get(&key).cloned() {
                state.hits += 1;
                return Ok(table);
            }
            state.misses += 1;
        }

        let table = self.inner.historical_closes(assets, end_dt, start_dt)?;
        if self.capacity == 0 {
            return Ok(table);
        }

        let mut state = self.state.borrow_mut();
        while state.entries.len() >= self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            trace!(end = %oldest.1, "evicting cached prices");
            state.entries.remove(&oldest);
        }
        state.order.push_back(key.clone());
        state.entries.insert(key, table.clone());
        Ok(table)
    }

    fn begin_session(&self) {
        self.invalidate();
        self.inner.begin_session();
    }
}
