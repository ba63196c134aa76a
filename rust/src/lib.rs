//! Round-robin OFDMA multi-user scheduler for an HE access point.
//!
//! The scheduler decides, at each channel access, whether the AP sends a
//! single-user PPDU, a DL MU PPDU or a trigger frame soliciting an UL MU
//! exchange. Stations are served in order of a per-AC credit ledger.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::prelude::*;

pub mod config;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod oracle;
pub mod phy;
pub mod ru;
pub mod scheduler;
pub mod trigger;

#[cfg(test)]
mod test_support;

pub use config::{SchedulerConfig, MAX_STATIONS};
pub use ledger::{LedgerError, StationList};
pub use models::{AccessCategory, Aid, Candidate, MacAddress, StationRecord, TxFormat, TxParams, TxVector};
pub use oracle::ApMac;
pub use ru::{RuError, RuPartition, RuSpec, RuType};
pub use scheduler::{AccessContext, CommitOutcome, Decision, RrMuScheduler, SchedulerError};
pub use trigger::{TriggerFrame, TriggerHeader, TriggerKind};

fn ru_error(e: RuError) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(e.to_string())
}

/// Partition a channel of `width` MHz among `n_stations` stations.
///
/// # Returns
/// * `(ru_type, n_rus, n_central_26)`
///
/// # Raises
/// * ValueError if the width is not 20, 40, 80 or 160 MHz
#[pyfunction]
fn equal_sized_rus(width: u16, n_stations: usize) -> PyResult<(RuType, usize, usize)> {
    let p = ru::equal_sized_rus(width, n_stations).map_err(ru_error)?;
    Ok((p.ru_type, p.n_rus, p.n_central_26))
}

/// All RUs of `ru_type` in a channel of `width` MHz, in index order.
#[pyfunction]
fn rus_of_type(width: u16, ru_type: RuType) -> PyResult<Vec<RuSpec>> {
    ru::rus_of_type(width, ru_type).map_err(ru_error)
}

/// Central 26-tone RUs not overlapped by an RU set of `ru_type`.
#[pyfunction]
fn central_26_tone_rus(width: u16, ru_type: RuType) -> PyResult<Vec<RuSpec>> {
    ru::central_26_tone_rus(width, ru_type).map_err(ru_error)
}

/// Route scheduler logs to stderr, filtered by `RUST_LOG`.
#[pyfunction]
fn init_logging() {
    logging::init_tracing();
}

/// The ofdma_scheduler.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Data types
    m.add_class::<RuType>()?;
    m.add_class::<RuSpec>()?;
    m.add_class::<StationRecord>()?;
    m.add_class::<StationList>()?;

    // Config types
    m.add_class::<SchedulerConfig>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(equal_sized_rus, m)?)?;
    m.add_function(wrap_pyfunction!(rus_of_type, m)?)?;
    m.add_function(wrap_pyfunction!(central_26_tone_rus, m)?)?;
    m.add_function(wrap_pyfunction!(phy::py_he_tb_duration_to_length, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;

    Ok(())
}
