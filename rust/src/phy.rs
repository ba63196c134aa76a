//! HE TB PPDU timing: L-SIG length conversion and PPDU duration limits.

use chrono::TimeDelta;
use pyo3::prelude::*;

use crate::models::{PhyBand, Preamble, TxVector};

/// Maximum duration of an HE or EHT PPDU (aPPDUMaxTime).
pub const MAX_HE_PPDU_DURATION_US: i64 = 5484;

/// L-STF + L-LTF + L-SIG + RL-SIG + HE-SIG-A + HE-STF of an HE TB PPDU.
const HE_TB_FIXED_PREAMBLE_NS: i64 = 40_000;

/// Legacy preamble portion (L-STF + L-LTF + L-SIG) used by the length formula.
const LEGACY_PREAMBLE_NS: i64 = 20_000;

/// `m` of the L-SIG length equation for HE TB PPDUs.
const LSIG_M: i64 = 2;

/// Maximum PPDU duration for the given preamble.
pub fn ppdu_max_time(preamble: Preamble) -> TimeDelta {
    // HE and EHT share aPPDUMaxTime
    debug_assert!(preamble != Preamble::Su);
    TimeDelta::microseconds(MAX_HE_PPDU_DURATION_US)
}

fn symbol_duration_ns(guard_interval_ns: u16) -> i64 {
    12_800 + i64::from(guard_interval_ns)
}

fn ltf_symbol_duration_ns(guard_interval_ns: u16) -> i64 {
    match guard_interval_ns {
        3200 => 16_000,
        1600 => 8_000,
        gi => 6_400 + i64::from(gi),
    }
}

fn n_ltf(nss_max: u8) -> i64 {
    match nss_max {
        0 | 1 => 1,
        2 => 2,
        3 | 4 => 4,
        5 | 6 => 6,
        _ => 8,
    }
}

fn signal_extension_ns(band: PhyBand) -> i64 {
    match band {
        PhyBand::Band2_4GHz => 6_000,
        PhyBand::Band5GHz | PhyBand::Band6GHz => 0,
    }
}

/// Preamble and header duration of an HE TB PPDU sent with `tx_vector`.
pub fn he_tb_preamble_duration(tx_vector: &TxVector) -> TimeDelta {
    TimeDelta::nanoseconds(
        HE_TB_FIXED_PREAMBLE_NS
            + n_ltf(tx_vector.nss_max()) * ltf_symbol_duration_ns(tx_vector.guard_interval_ns),
    )
}

fn ceil_div(num: i64, den: i64) -> i64 {
    if num <= 0 {
        0
    } else {
        (num + den - 1) / den
    }
}

/// Convert a TB PPDU duration to the UL Length advertised in a trigger frame.
///
/// Returns the length together with the duration it actually encodes, which
/// is `duration` rounded up to a whole number of data symbols.
pub fn he_tb_duration_to_length(
    duration: TimeDelta,
    tx_vector: &TxVector,
    band: PhyBand,
) -> (u16, TimeDelta) {
    let symbol = symbol_duration_ns(tx_vector.guard_interval_ns);
    let preamble = he_tb_preamble_duration(tx_vector).num_nanoseconds().unwrap_or(0);
    let ext = signal_extension_ns(band);
    let requested = duration.num_nanoseconds().unwrap_or(i64::MAX);

    let n_symbols = ceil_div(requested - preamble - ext, symbol);
    let aligned = preamble + n_symbols * symbol + ext;

    let length = ceil_div(aligned - LEGACY_PREAMBLE_NS - ext, 4_000) * 3 - 3 - LSIG_M;
    let length = u16::try_from(length.max(0)).unwrap_or(u16::MAX);
    (length, TimeDelta::nanoseconds(aligned))
}

/// Convert a UL Length back to the TB PPDU duration it grants.
pub fn he_tb_length_to_duration(length: u16, tx_vector: &TxVector, band: PhyBand) -> TimeDelta {
    let symbol = symbol_duration_ns(tx_vector.guard_interval_ns);
    let preamble = he_tb_preamble_duration(tx_vector).num_nanoseconds().unwrap_or(0);
    let ext = signal_extension_ns(band);

    let calculated = ceil_div(i64::from(length) + 3 + LSIG_M, 3) * 4_000 + LEGACY_PREAMBLE_NS + ext;
    let n_symbols = (calculated - preamble - ext).max(0) / symbol;
    TimeDelta::nanoseconds(preamble + n_symbols * symbol + ext)
}

/// Python wrapper: `(length, encoded_duration)` for a TB PPDU duration.
#[pyfunction]
#[pyo3(name = "he_tb_duration_to_length", signature = (duration, guard_interval_ns=3200, nss_max=1, band_2_4ghz=false))]
pub fn py_he_tb_duration_to_length(
    duration: TimeDelta,
    guard_interval_ns: u16,
    nss_max: u8,
    band_2_4ghz: bool,
) -> (u16, TimeDelta) {
    let mut tx_vector = TxVector::new(Preamble::HeTb, 20, Default::default());
    tx_vector.guard_interval_ns = guard_interval_ns;
    tx_vector.set_user_info(
        1,
        crate::models::MuUserInfo {
            ru: None,
            mcs: 0,
            nss: nss_max.max(1),
        },
    );
    let band = if band_2_4ghz {
        PhyBand::Band2_4GHz
    } else {
        PhyBand::Band5GHz
    };
    he_tb_duration_to_length(duration, &tx_vector, band)
}
