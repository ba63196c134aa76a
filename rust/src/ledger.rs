//! Station lists and the credit ledger behind round-robin fairness.
//!
//! A station list is both the walk order of the candidate selectors and the
//! fairness ledger: after every committed transmission each listed station
//! accrues credit, served stations pay for the bandwidth they used, and the
//! list is stably re-sorted by decreasing credit.

use chrono::TimeDelta;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::models::{Aid, MacAddress, StationRecord};
use crate::ru::RuType;

/// Errors raised by ledger updates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Station with AID {0} is not in the list")]
    UnknownStation(Aid),
}

/// Ordered list of stations with an AID → position index.
///
/// Invariant: no AID appears twice, and `index` always maps every AID to its
/// current position.
#[pyclass]
#[derive(Debug, Clone, Default)]
pub struct StationList {
    stations: Vec<StationRecord>,
    index: FxHashMap<Aid, usize>,
}

impl StationList {
    /// Create an empty list with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stations: Vec::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    #[inline]
    pub fn contains(&self, aid: Aid) -> bool {
        self.index.contains_key(&aid)
    }

    #[inline]
    pub fn get(&self, aid: Aid) -> Option<&StationRecord> {
        self.index.get(&aid).map(|&pos| &self.stations[pos])
    }

    /// Stations in walk order.
    pub fn iter(&self) -> impl Iterator<Item = &StationRecord> {
        self.stations.iter()
    }

    pub fn front(&self) -> Option<&StationRecord> {
        self.stations.first()
    }

    /// Append a station at the tail. Returns false if the AID is already listed.
    pub fn push(&mut self, record: StationRecord) -> bool {
        if self.contains(record.aid) {
            return false;
        }
        self.index.insert(record.aid, self.stations.len());
        self.stations.push(record);
        true
    }

    /// Remove a station, preserving the order of the others.
    pub fn remove(&mut self, aid: Aid) -> Option<StationRecord> {
        let pos = self.index.remove(&aid)?;
        let record = self.stations.remove(pos);
        self.rebuild_index();
        Some(record)
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (pos, sta) in self.stations.iter().enumerate() {
            self.index.insert(sta.aid, pos);
        }
    }

    /// Apply one round of credit accounting and reorder the list.
    ///
    /// Every listed station gains `tx_duration / len` (capped at
    /// `max_credits`); each served station then pays `tx_duration` times its
    /// RU's share of the total bandwidth allocated to `served`.
    pub fn update_credits(
        &mut self,
        tx_duration: TimeDelta,
        served: &[(Aid, RuType)],
        max_credits: TimeDelta,
    ) -> Result<(), LedgerError> {
        if self.stations.is_empty() {
            return Ok(());
        }

        let n_stations = i32::try_from(self.stations.len()).unwrap_or(i32::MAX);
        let credits_per_sta = tx_duration / n_stations;
        for sta in &mut self.stations {
            sta.credits = (sta.credits + credits_per_sta).min(max_credits);
        }

        let total_bandwidth: u32 = served
            .iter()
            .map(|(_, ru_type)| u32::from(ru_type.bandwidth_mhz()))
            .sum();
        if total_bandwidth > 0 {
            for &(aid, ru_type) in served {
                let pos = *self
                    .index
                    .get(&aid)
                    .ok_or(LedgerError::UnknownStation(aid))?;
                let debit = scale(
                    tx_duration,
                    u32::from(ru_type.bandwidth_mhz()),
                    total_bandwidth,
                );
                self.stations[pos].credits = self.stations[pos].credits - debit;
            }
        }

        // Stable: ties keep their previous relative order
        self.stations.sort_by(|a, b| b.credits.cmp(&a.credits));
        self.rebuild_index();
        Ok(())
    }
}

/// `duration * num / den`, exact to the nanosecond.
fn scale(duration: TimeDelta, num: u32, den: u32) -> TimeDelta {
    let nanos = i128::from(duration.num_nanoseconds().unwrap_or(i64::MAX));
    let scaled = nanos * i128::from(num) / i128::from(den);
    TimeDelta::nanoseconds(i64::try_from(scaled).unwrap_or(i64::MAX))
}

#[pymethods]
impl StationList {
    #[new]
    fn py_new() -> Self {
        Self::default()
    }

    /// Add a station (address as "aa:bb:cc:dd:ee:ff"); false if already listed.
    #[pyo3(name = "add")]
    fn py_add(&mut self, aid: Aid, address: &str) -> PyResult<bool> {
        let address: MacAddress = address.parse().map_err(PyValueError::new_err)?;
        Ok(self.push(StationRecord::new(aid, address)))
    }

    #[pyo3(name = "remove")]
    fn py_remove(&mut self, aid: Aid) -> bool {
        self.remove(aid).is_some()
    }

    /// AIDs in walk order.
    fn aids(&self) -> Vec<Aid> {
        self.stations.iter().map(|s| s.aid).collect()
    }

    fn records(&self) -> Vec<StationRecord> {
        self.stations.clone()
    }

    fn credits(&self, aid: Aid) -> Option<TimeDelta> {
        self.get(aid).map(|s| s.credits)
    }

    #[pyo3(name = "update_credits")]
    fn py_update_credits(
        &mut self,
        tx_duration: TimeDelta,
        served: Vec<(Aid, RuType)>,
        max_credits: TimeDelta,
    ) -> PyResult<()> {
        self.update_credits(tx_duration, &served, max_credits)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn __len__(&self) -> usize {
        self.len()
    }

    fn __repr__(&self) -> String {
        format!("StationList(aids={:?})", self.aids())
    }
}
