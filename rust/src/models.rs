//! Core data types for the multi-user scheduler.

use chrono::TimeDelta;
use pyo3::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::ru::{RuSpec, RuType};

/// Association identifier of a station.
pub type Aid = u16;

/// Number of TIDs that carry QoS data in practice.
pub const N_DATA_TIDS: u8 = 8;

/// IEEE 802 MAC address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| format!("Invalid MAC address: {}", s))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| format!("Invalid MAC address: {}", s))?;
        }
        if parts.next().is_some() {
            return Err(format!("Invalid MAC address: {}", s));
        }
        Ok(MacAddress(bytes))
    }
}

/// EDCA access category, ordered by AC index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessCategory {
    BestEffort = 0,
    Background = 1,
    Video = 2,
    Voice = 3,
}

impl AccessCategory {
    /// All access categories in AC index order.
    pub const ALL: [AccessCategory; 4] = [
        AccessCategory::BestEffort,
        AccessCategory::Background,
        AccessCategory::Video,
        AccessCategory::Voice,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The higher-priority TID of this AC's pair.
    pub fn high_tid(self) -> u8 {
        match self {
            AccessCategory::BestEffort => 3,
            AccessCategory::Background => 2,
            AccessCategory::Video => 5,
            AccessCategory::Voice => 7,
        }
    }

    /// The lower-priority TID of this AC's pair.
    pub fn low_tid(self) -> u8 {
        match self {
            AccessCategory::BestEffort => 0,
            AccessCategory::Background => 1,
            AccessCategory::Video => 4,
            AccessCategory::Voice => 6,
        }
    }

    /// The other TID of the pair `tid` belongs to.
    pub fn other_tid(self, tid: u8) -> u8 {
        if tid == self.high_tid() {
            self.low_tid()
        } else {
            self.high_tid()
        }
    }

    /// Map a TID (0-7) to its access category.
    pub fn from_tid(tid: u8) -> AccessCategory {
        match tid {
            1 | 2 => AccessCategory::Background,
            4 | 5 => AccessCategory::Video,
            6 | 7 => AccessCategory::Voice,
            _ => AccessCategory::BestEffort,
        }
    }
}

/// Transmission format chosen for a channel access opportunity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxFormat {
    /// Single-user transmission of the head-of-line frame
    Su,
    /// Downlink multi-user (OFDMA) PPDU
    DlMu,
    /// Uplink multi-user exchange solicited by a trigger frame
    UlMu,
    /// Abstain for this opportunity
    NoTx,
}

impl fmt::Display for TxFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxFormat::Su => "SU_TX",
            TxFormat::DlMu => "DL_MU_TX",
            TxFormat::UlMu => "UL_MU_TX",
            TxFormat::NoTx => "NO_TX",
        };
        f.write_str(s)
    }
}

/// PPDU preamble variants relevant to multi-user scheduling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Preamble {
    /// Any single-user (non-MU) preamble
    Su,
    HeMu,
    HeTb,
    EhtMu,
    EhtTb,
}

/// Frequency band of the link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhyBand {
    Band2_4GHz,
    Band5GHz,
    Band6GHz,
}

/// AP-wide HE settings stamped on every MU TXVECTOR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeConfiguration {
    pub guard_interval_ns: u16,
    pub bss_color: u8,
}

impl Default for HeConfiguration {
    fn default() -> Self {
        Self {
            guard_interval_ns: 3200,
            bss_color: 0,
        }
    }
}

/// Rate chosen by link adaptation for a single-user transmission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuTxVector {
    pub preamble: Preamble,
    pub mcs: u8,
    pub nss: u8,
}

/// Per-station entry of an MU TXVECTOR.
///
/// `ru` stays `None` until the finalizer binds a concrete RU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MuUserInfo {
    pub ru: Option<RuSpec>,
    pub mcs: u8,
    pub nss: u8,
}

impl MuUserInfo {
    pub fn ru_type(&self) -> Option<RuType> {
        self.ru.map(|ru| ru.ru_type)
    }
}

/// Transmission parameters of a PPDU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxVector {
    pub preamble: Preamble,
    pub channel_width: u16,
    pub guard_interval_ns: u16,
    pub bss_color: u8,
    /// Per-station RU/rate assignment, keyed by association id
    pub user_info: BTreeMap<Aid, MuUserInfo>,
}

impl TxVector {
    pub fn new(preamble: Preamble, channel_width: u16, he: HeConfiguration) -> Self {
        Self {
            preamble,
            channel_width,
            guard_interval_ns: he.guard_interval_ns,
            bss_color: he.bss_color,
            user_info: BTreeMap::new(),
        }
    }

    pub fn set_user_info(&mut self, aid: Aid, info: MuUserInfo) {
        self.user_info.insert(aid, info);
    }

    /// Largest number of spatial streams among the users (1 if no users).
    pub fn nss_max(&self) -> u8 {
        self.user_info
            .values()
            .map(|u| u.nss)
            .max()
            .unwrap_or(1)
            .max(1)
    }
}

/// Aggregate timing state of a frame exchange under construction.
///
/// The scheduler owns this value; the timing oracle fills in the durations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxParams {
    pub tx_vector: TxVector,
    /// Duration of the PPDU (or trigger frame) being built
    pub tx_duration: Option<TimeDelta>,
    /// Time spent on protection (e.g. MU-RTS/CTS)
    pub protection_time: Option<TimeDelta>,
    /// Time spent on acknowledgment after the PPDU
    pub acknowledgment_time: Option<TimeDelta>,
    /// Bytes queued so far per receiver
    pub psdu_sizes: BTreeMap<MacAddress, u32>,
}

impl TxParams {
    pub fn new(tx_vector: TxVector) -> Self {
        Self {
            tx_vector,
            tx_duration: None,
            protection_time: None,
            acknowledgment_time: None,
            psdu_sizes: BTreeMap::new(),
        }
    }
}

/// A station known to the scheduler, with its fairness credit.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StationRecord {
    #[pyo3(get)]
    pub aid: Aid,
    pub address: MacAddress,
    #[pyo3(get)]
    pub credits: TimeDelta,
}

impl StationRecord {
    pub fn new(aid: Aid, address: MacAddress) -> Self {
        Self {
            aid,
            address,
            credits: TimeDelta::zero(),
        }
    }
}

#[pymethods]
impl StationRecord {
    #[getter(address)]
    fn py_address(&self) -> String {
        self.address.to_string()
    }

    fn __repr__(&self) -> String {
        format!(
            "StationRecord(aid={}, address={}, credits={}us)",
            self.aid,
            self.address,
            self.credits.num_microseconds().unwrap_or(i64::MAX)
        )
    }
}

/// A station tentatively selected for the current opportunity.
///
/// Stations are referenced by association id, never by list position, since
/// the ledger reorders lists between selection and commit.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate<F> {
    pub aid: Aid,
    pub address: MacAddress,
    /// Head frame queued for the station (downlink only)
    pub mpdu: Option<F>,
}
