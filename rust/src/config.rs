//! Configuration types for the multi-user scheduler.

use chrono::TimeDelta;
use pyo3::prelude::*;

use crate::scheduler::SchedulerError;

/// Largest number of stations an OFDMA PPDU can address (74 26-tone RUs at 160 MHz).
pub const MAX_STATIONS: u8 = 74;

/// Configuration of the round-robin multi-user scheduler.
#[pyclass]
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Maximum number of stations granted an RU in one MU PPDU (1-74)
    #[pyo3(get, set)]
    pub n_stations: u8,
    /// Allow frames of lower-priority ACs in a DL MU PPDU
    #[pyo3(get, set)]
    pub enable_txop_sharing: bool,
    /// Return NO_TX rather than SU_TX when no DL MU PPDU could be built
    #[pyo3(get, set)]
    pub force_dl_ofdma: bool,
    /// Attempt UL OFDMA after a DL MU transmission
    #[pyo3(get, set)]
    pub enable_ul_ofdma: bool,
    /// Send a BSRP trigger before soliciting UL data
    #[pyo3(get, set)]
    pub enable_bsrp: bool,
    /// Default size in bytes of a solicited PSDU
    #[pyo3(get, set)]
    pub ul_psdu_size: u32,
    /// Also allocate central 26-tone RUs when the main RU is at least 52 tones
    #[pyo3(get, set)]
    pub use_central_26_tones_rus: bool,
    /// Maximum credit a station can accumulate
    #[pyo3(get, set)]
    pub max_credits: TimeDelta,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug
    #[pyo3(get, set)]
    pub verbosity: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            n_stations: 4,
            enable_txop_sharing: true,
            force_dl_ofdma: false,
            enable_ul_ofdma: true,
            enable_bsrp: true,
            ul_psdu_size: 500,
            use_central_26_tones_rus: false,
            max_credits: TimeDelta::seconds(1),
            verbosity: 0,
        }
    }
}

impl SchedulerConfig {
    /// Reject settings the scheduler cannot work with.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.n_stations == 0 || self.n_stations > MAX_STATIONS {
            return Err(SchedulerError::InvalidConfig(format!(
                "n_stations must be between 1 and {}, got {}",
                MAX_STATIONS, self.n_stations
            )));
        }
        if self.ul_psdu_size == 0 {
            return Err(SchedulerError::InvalidConfig(
                "ul_psdu_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[pymethods]
impl SchedulerConfig {
    #[new]
    #[pyo3(signature = (
        n_stations=None,
        enable_txop_sharing=None,
        force_dl_ofdma=None,
        enable_ul_ofdma=None,
        enable_bsrp=None,
        ul_psdu_size=None,
        use_central_26_tones_rus=None,
        max_credits=None,
        verbosity=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        n_stations: Option<u8>,
        enable_txop_sharing: Option<bool>,
        force_dl_ofdma: Option<bool>,
        enable_ul_ofdma: Option<bool>,
        enable_bsrp: Option<bool>,
        ul_psdu_size: Option<u32>,
        use_central_26_tones_rus: Option<bool>,
        max_credits: Option<TimeDelta>,
        verbosity: Option<u8>,
    ) -> PyResult<Self> {
        let defaults = Self::default();
        let config = Self {
            n_stations: n_stations.unwrap_or(defaults.n_stations),
            enable_txop_sharing: enable_txop_sharing.unwrap_or(defaults.enable_txop_sharing),
            force_dl_ofdma: force_dl_ofdma.unwrap_or(defaults.force_dl_ofdma),
            enable_ul_ofdma: enable_ul_ofdma.unwrap_or(defaults.enable_ul_ofdma),
            enable_bsrp: enable_bsrp.unwrap_or(defaults.enable_bsrp),
            ul_psdu_size: ul_psdu_size.unwrap_or(defaults.ul_psdu_size),
            use_central_26_tones_rus: use_central_26_tones_rus
                .unwrap_or(defaults.use_central_26_tones_rus),
            max_credits: max_credits.unwrap_or(defaults.max_credits),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
        };
        config
            .validate()
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
        Ok(config)
    }

    fn __repr__(&self) -> String {
        format!(
            "SchedulerConfig(n_stations={}, enable_ul_ofdma={}, enable_bsrp={}, use_central_26_tones_rus={})",
            self.n_stations, self.enable_ul_ofdma, self.enable_bsrp, self.use_central_26_tones_rus
        )
    }
}
