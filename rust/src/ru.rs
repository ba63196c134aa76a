//! HE resource unit (RU) tables and the equal-size RU partitioner.
//!
//! RU specifiers are enumerated in a fixed order (primary 80 MHz segment
//! first, ascending index within a segment). The finalizer binds candidates
//! to RUs in exactly this order.

use pyo3::prelude::*;
use std::fmt;
use thiserror::Error;

/// Channel widths (MHz) the partitioner knows about.
pub const SUPPORTED_WIDTHS: [u16; 4] = [20, 40, 80, 160];

/// Errors raised by the RU tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuError {
    #[error("Unsupported channel width: {0} MHz")]
    UnsupportedWidth(u16),
    #[error("Cannot partition a channel among zero stations")]
    NoStations,
}

/// HE RU sizes, ordered from narrowest to widest.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuType {
    Ru26Tone,
    Ru52Tone,
    Ru106Tone,
    Ru242Tone,
    Ru484Tone,
    Ru996Tone,
    Ru2x996Tone,
}

impl RuType {
    /// All RU types in ascending size.
    pub const ALL: [RuType; 7] = [
        RuType::Ru26Tone,
        RuType::Ru52Tone,
        RuType::Ru106Tone,
        RuType::Ru242Tone,
        RuType::Ru484Tone,
        RuType::Ru996Tone,
        RuType::Ru2x996Tone,
    ];

    /// Approximate bandwidth (MHz) occupied by one RU of this type.
    pub fn bandwidth_mhz(self) -> u16 {
        match self {
            RuType::Ru26Tone => 2,
            RuType::Ru52Tone => 4,
            RuType::Ru106Tone => 8,
            RuType::Ru242Tone => 20,
            RuType::Ru484Tone => 40,
            RuType::Ru996Tone => 80,
            RuType::Ru2x996Tone => 160,
        }
    }

    /// Number of data-bearing tones.
    pub fn tones(self) -> u16 {
        match self {
            RuType::Ru26Tone => 26,
            RuType::Ru52Tone => 52,
            RuType::Ru106Tone => 106,
            RuType::Ru242Tone => 242,
            RuType::Ru484Tone => 484,
            RuType::Ru996Tone => 996,
            RuType::Ru2x996Tone => 1992,
        }
    }
}

impl fmt::Display for RuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuType::Ru2x996Tone => write!(f, "2x996-tone"),
            other => write!(f, "{}-tone", other.tones()),
        }
    }
}

/// A concrete RU: type, 1-based index within its 80 MHz segment, and whether
/// it lies in the primary 80 MHz segment.
#[pyclass(frozen)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RuSpec {
    #[pyo3(get)]
    pub ru_type: RuType,
    #[pyo3(get)]
    pub index: usize,
    #[pyo3(get)]
    pub primary_80mhz: bool,
}

#[pymethods]
impl RuSpec {
    #[new]
    #[pyo3(signature = (ru_type, index, primary_80mhz=true))]
    pub fn new(ru_type: RuType, index: usize, primary_80mhz: bool) -> Self {
        Self {
            ru_type,
            index,
            primary_80mhz,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "RuSpec(ru_type={}, index={}, primary_80mhz={})",
            self.ru_type, self.index, self.primary_80mhz
        )
    }
}

/// Result of partitioning a channel into equal-size RUs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuPartition {
    /// RU size granted to each main-size candidate
    pub ru_type: RuType,
    /// How many RUs of `ru_type` are assigned (never above the request)
    pub n_rus: usize,
    /// Central 26-tone RUs left unused by an RU set of `ru_type`
    pub n_central_26: usize,
}

fn check_width(width: u16) -> Result<(), RuError> {
    if SUPPORTED_WIDTHS.contains(&width) {
        Ok(())
    } else {
        Err(RuError::UnsupportedWidth(width))
    }
}

/// Number of RUs of the given type within one segment of up to 80 MHz.
fn rus_per_segment(segment_width: u16, ru_type: RuType) -> usize {
    match (segment_width, ru_type) {
        (20, RuType::Ru26Tone) => 9,
        (20, RuType::Ru52Tone) => 4,
        (20, RuType::Ru106Tone) => 2,
        (20, RuType::Ru242Tone) => 1,
        (40, RuType::Ru26Tone) => 18,
        (40, RuType::Ru52Tone) => 8,
        (40, RuType::Ru106Tone) => 4,
        (40, RuType::Ru242Tone) => 2,
        (40, RuType::Ru484Tone) => 1,
        (80, RuType::Ru26Tone) => 37,
        (80, RuType::Ru52Tone) => 16,
        (80, RuType::Ru106Tone) => 8,
        (80, RuType::Ru242Tone) => 4,
        (80, RuType::Ru484Tone) => 2,
        (80, RuType::Ru996Tone) => 1,
        _ => 0,
    }
}

/// Number of RUs of the given type in a channel of the given width.
pub fn n_rus(width: u16, ru_type: RuType) -> Result<usize, RuError> {
    check_width(width)?;
    Ok(match (width, ru_type) {
        (160, RuType::Ru2x996Tone) => 1,
        (160, ty) => 2 * rus_per_segment(80, ty),
        (w, ty) => rus_per_segment(w, ty),
    })
}

/// Partition `width` among `n_stations` stations using equal-size RUs.
///
/// Picks the narrowest RU type whose count in the channel does not exceed the
/// request, so the number of assigned RUs is the largest achievable number of
/// equal-size RUs that is at most `n_stations`.
pub fn equal_sized_rus(width: u16, n_stations: usize) -> Result<RuPartition, RuError> {
    check_width(width)?;
    if n_stations == 0 {
        return Err(RuError::NoStations);
    }

    let mut picked = None;
    for ru_type in RuType::ALL {
        let count = n_rus(width, ru_type)?;
        if count > 0 && count <= n_stations {
            picked = Some((ru_type, count));
            break;
        }
    }
    // The widest RU always has count 1 for a supported width
    let (ru_type, n_rus) = picked.ok_or(RuError::UnsupportedWidth(width))?;

    let mut n_central_26 = match ru_type {
        RuType::Ru52Tone | RuType::Ru106Tone => match width {
            20 => 1,
            40 => 2,
            _ => 5,
        },
        RuType::Ru242Tone | RuType::Ru484Tone if width >= 80 => 1,
        _ => 0,
    };
    if width == 160 {
        n_central_26 *= 2;
    }

    Ok(RuPartition {
        ru_type,
        n_rus,
        n_central_26,
    })
}

fn segment_flags(width: u16) -> &'static [bool] {
    if width == 160 {
        &[true, false]
    } else {
        &[true]
    }
}

/// Enumerate every RU of the given type in the channel, in binding order.
pub fn rus_of_type(width: u16, ru_type: RuType) -> Result<Vec<RuSpec>, RuError> {
    check_width(width)?;
    if ru_type == RuType::Ru2x996Tone {
        return Ok(if width == 160 {
            vec![RuSpec::new(ru_type, 1, true)]
        } else {
            Vec::new()
        });
    }

    let segment_width = width.min(80);
    let per_segment = rus_per_segment(segment_width, ru_type);
    let mut rus = Vec::with_capacity(per_segment * segment_flags(width).len());
    for &primary in segment_flags(width) {
        for index in 1..=per_segment {
            rus.push(RuSpec::new(ru_type, index, primary));
        }
    }
    Ok(rus)
}

/// Enumerate the central 26-tone RUs left free by an RU set of `ru_type`.
pub fn central_26_tone_rus(width: u16, ru_type: RuType) -> Result<Vec<RuSpec>, RuError> {
    check_width(width)?;
    let indices: &[usize] = match ru_type {
        RuType::Ru52Tone | RuType::Ru106Tone => match width {
            20 => &[5],
            40 => &[5, 14],
            _ => &[5, 14, 19, 24, 33],
        },
        RuType::Ru242Tone | RuType::Ru484Tone if width >= 80 => &[19],
        _ => &[],
    };

    let mut rus = Vec::with_capacity(indices.len() * segment_flags(width).len());
    for &primary in segment_flags(width) {
        for &index in indices {
            rus.push(RuSpec::new(RuType::Ru26Tone, index, primary));
        }
    }
    Ok(rus)
}
