//! Trigger frames soliciting uplink multi-user transmissions.

use crate::models::{AccessCategory, Aid, MacAddress, MuUserInfo, Preamble, TxVector};
use crate::ru::RuSpec;
use crate::scheduler::SchedulerError;

/// Buffer status code meaning "queue size unknown".
pub const BUFFER_STATUS_UNKNOWN: u8 = 255;
/// Buffer status code meaning "more than can be expressed".
pub const BUFFER_STATUS_UNLIMITED: u8 = 254;
/// Bytes represented by one unit of a buffer status code.
pub const BUFFER_STATUS_UNIT: u32 = 256;

/// QoS Null MAC header plus FCS.
const QOS_NULL_MPDU_SIZE: u32 = 26 + 4;
/// A-MPDU subframe delimiter.
const MPDU_DELIMITER_SIZE: u32 = 4;

/// Kind of solicitation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// Buffer Status Report Poll: stations report queue sizes only
    Bsrp,
    /// Basic trigger: stations send data
    Basic,
}

/// Per-station field of a trigger frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerUserInfo {
    pub aid: Aid,
    pub ru: RuSpec,
    pub mcs: u8,
    pub nss: u8,
    /// AC the station should serve first (Basic triggers only)
    pub preferred_ac: Option<AccessCategory>,
}

/// A trigger frame under construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerFrame {
    pub kind: TriggerKind,
    pub ul_bandwidth: u16,
    pub guard_interval_ns: u16,
    /// L-SIG length of the solicited TB PPDU
    pub ul_length: u16,
    pub users: Vec<TriggerUserInfo>,
}

/// MAC header of the frame carrying a trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerHeader {
    pub receiver: MacAddress,
    pub transmitter: MacAddress,
}

/// Guard interval a trigger can signal for the given configured GI.
pub fn trigger_guard_interval(guard_interval_ns: u16) -> u16 {
    if guard_interval_ns <= 1600 {
        1600
    } else {
        3200
    }
}

impl TriggerFrame {
    /// Build a trigger soliciting every user of a finalized TB TXVECTOR.
    pub fn new(kind: TriggerKind, tx_vector: &TxVector) -> Result<Self, SchedulerError> {
        let users = tx_vector
            .user_info
            .iter()
            .map(|(&aid, info)| {
                let ru = info.ru.ok_or(SchedulerError::UnboundRu(aid))?;
                Ok(TriggerUserInfo {
                    aid,
                    ru,
                    mcs: info.mcs,
                    nss: info.nss,
                    preferred_ac: None,
                })
            })
            .collect::<Result<Vec<_>, SchedulerError>>()?;

        Ok(Self {
            kind,
            ul_bandwidth: tx_vector.channel_width,
            guard_interval_ns: trigger_guard_interval(tx_vector.guard_interval_ns),
            ul_length: 0,
            users,
        })
    }

    /// TB TXVECTOR the solicited stations will use.
    pub fn tb_tx_vector(&self, preamble: Preamble, bss_color: u8) -> TxVector {
        TxVector {
            preamble,
            channel_width: self.ul_bandwidth,
            guard_interval_ns: self.guard_interval_ns,
            bss_color,
            user_info: self
                .users
                .iter()
                .map(|u| {
                    (
                        u.aid,
                        MuUserInfo {
                            ru: Some(u.ru),
                            mcs: u.mcs,
                            nss: u.nss,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Set the preferred AC of every user field.
    pub fn set_preferred_ac(&mut self, ac: AccessCategory) {
        for user in &mut self.users {
            user.preferred_ac = Some(ac);
        }
    }

    pub fn aids(&self) -> impl Iterator<Item = Aid> + '_ {
        self.users.iter().map(|u| u.aid)
    }
}

/// Size of an A-MPDU carrying one QoS Null frame per TID.
pub fn qos_null_ampdu_size(n_tids: u8) -> u32 {
    let mut size = 0u32;
    for _ in 0..n_tids {
        let padding = (4 - size % 4) % 4;
        size += padding + MPDU_DELIMITER_SIZE + QOS_NULL_MPDU_SIZE;
    }
    size
}

/// Bytes a station may have queued according to its buffer status code.
pub fn buffer_status_bytes(code: u8, default_size: u32) -> u32 {
    match code {
        BUFFER_STATUS_UNKNOWN => default_size,
        BUFFER_STATUS_UNLIMITED => u32::MAX,
        units => u32::from(units) * BUFFER_STATUS_UNIT,
    }
}
