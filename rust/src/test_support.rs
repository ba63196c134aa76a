//! In-memory access point used by the unit tests.
//!
//! The PHY model is deliberately simple: a PSDU takes a 40us preamble plus
//! its bits at `tones * (mcs + 1) * nss / 13` bits per microsecond.

use std::cell::RefCell;

use chrono::TimeDelta;

use crate::models::{
    AccessCategory, Aid, HeConfiguration, MacAddress, PhyBand, Preamble, SuTxVector, TxParams,
    TxVector,
};
use crate::oracle::{
    Aggregation, BlockAckSessions, MacQueues, PhyTiming, QueuedMpdu, StationCapabilities,
    TxTiming,
};
use crate::scheduler::RrMuScheduler;
use crate::trigger::{TriggerFrame, TriggerHeader, TriggerKind, BUFFER_STATUS_UNKNOWN};

const PREAMBLE_NS: i64 = 40_000;

#[derive(Clone, Debug, PartialEq)]
pub struct FakeMpdu {
    pub id: u32,
    pub receiver: MacAddress,
    pub tid: u8,
    pub size: u32,
    pub retry: bool,
}

impl QueuedMpdu for FakeMpdu {
    fn receiver(&self) -> MacAddress {
        self.receiver
    }

    fn qos_tid(&self) -> Option<u8> {
        Some(self.tid)
    }

    fn is_retry(&self) -> bool {
        self.retry
    }
}

#[derive(Clone, Debug)]
pub struct FakeStation {
    pub aid: Aid,
    pub address: MacAddress,
    /// Address of the affiliated station on the link, for multi-link devices
    pub link_address: Option<MacAddress>,
    pub he: bool,
    pub eht: bool,
    pub link_setup: bool,
    pub associated: bool,
    pub ba_originator: Vec<u8>,
    pub ba_recipient: Vec<u8>,
    pub buffer_status: u8,
    pub mcs: u8,
    pub nss: u8,
}

impl FakeStation {
    fn new(aid: Aid) -> Self {
        Self {
            aid,
            address: MacAddress([0x02, 0, 0, 0, (aid >> 8) as u8, aid as u8]),
            link_address: None,
            he: true,
            eht: false,
            link_setup: true,
            associated: true,
            ba_originator: (0..8).collect(),
            ba_recipient: vec![0],
            buffer_status: BUFFER_STATUS_UNKNOWN,
            mcs: 5,
            nss: 1,
        }
    }
}

pub struct FakeMac {
    pub stations: Vec<FakeStation>,
    pub queue: Vec<FakeMpdu>,
    pub ap_eht: bool,
    pub band: PhyBand,
    pub protection_time: TimeDelta,
    pub trigger_tx_time: TimeDelta,
    pub basic_ack_time: TimeDelta,
    pub block_ack_time: TimeDelta,
    /// Longest PPDU `try_add_mpdu` accepts, whatever the budget
    pub ppdu_limit: Option<TimeDelta>,
    /// Receivers passed to `data_tx_vector`, in call order
    pub rate_queries: RefCell<Vec<MacAddress>>,
    /// Frames that got a sequence number, by id
    pub sequenced: Vec<u32>,
    next_id: u32,
}

impl FakeMac {
    /// Access point with HE stations 1..=n, all with a BE agreement both ways.
    pub fn with_stations(n: Aid) -> Self {
        Self {
            stations: (1..=n).map(FakeStation::new).collect(),
            queue: Vec::new(),
            ap_eht: false,
            band: PhyBand::Band5GHz,
            protection_time: TimeDelta::microseconds(50),
            trigger_tx_time: TimeDelta::microseconds(100),
            basic_ack_time: TimeDelta::microseconds(40),
            block_ack_time: TimeDelta::microseconds(32),
            ppdu_limit: None,
            rate_queries: RefCell::new(Vec::new()),
            sequenced: Vec::new(),
            next_id: 0,
        }
    }

    pub fn station(&self, aid: Aid) -> &FakeStation {
        self.stations
            .iter()
            .find(|s| s.aid == aid)
            .expect("unknown station")
    }

    pub fn station_mut(&mut self, aid: Aid) -> &mut FakeStation {
        self.stations
            .iter_mut()
            .find(|s| s.aid == aid)
            .expect("unknown station")
    }

    fn by_address(&self, address: MacAddress) -> Option<&FakeStation> {
        self.stations.iter().find(|s| s.address == address)
    }

    fn by_any_address(&self, address: MacAddress) -> Option<&FakeStation> {
        self.stations
            .iter()
            .find(|s| s.address == address || s.link_address == Some(address))
    }

    fn push(&mut self, aid: Aid, tid: u8, size: u32, retry: bool) {
        let receiver = self.station(aid).address;
        self.next_id += 1;
        self.queue.push(FakeMpdu {
            id: self.next_id,
            receiver,
            tid,
            size,
            retry,
        });
    }

    pub fn enqueue(&mut self, aid: Aid, tid: u8, size: u32) {
        self.push(aid, tid, size, false);
    }

    pub fn enqueue_retry(&mut self, aid: Aid, tid: u8, size: u32) {
        self.push(aid, tid, size, true);
    }
}

/// Notify the scheduler of every station the fake knows about.
pub fn associate_all(scheduler: &mut RrMuScheduler, mac: &FakeMac) {
    for sta in &mac.stations {
        scheduler
            .notify_station_associated(mac, sta.aid, sta.address)
            .unwrap();
    }
}

impl StationCapabilities for FakeMac {
    fn ap_address(&self, link_id: u8) -> MacAddress {
        MacAddress([0x0a, 0, 0, 0, 0, link_id])
    }

    fn ap_eht_supported(&self) -> bool {
        self.ap_eht
    }

    fn he_configuration(&self) -> HeConfiguration {
        HeConfiguration::default()
    }

    fn he_supported(&self, address: MacAddress) -> bool {
        self.by_address(address).is_some_and(|s| s.he)
    }

    fn eht_supported(&self, address: MacAddress) -> bool {
        self.by_address(address).is_some_and(|s| s.eht)
    }

    fn mld_or_link_address(&self, aid: Aid) -> Option<MacAddress> {
        self.stations.iter().find(|s| s.aid == aid).map(|s| s.address)
    }

    fn is_associated(&self, address: MacAddress) -> bool {
        self.by_address(address).is_some_and(|s| s.associated)
    }

    fn is_link_setup(&self, _link_id: u8, aid: Aid) -> bool {
        self.stations
            .iter()
            .any(|s| s.aid == aid && s.link_setup)
    }

    fn affiliated_sta_address(&self, _link_id: u8, address: MacAddress) -> Option<MacAddress> {
        self.by_address(address).and_then(|s| s.link_address)
    }

    fn data_tx_vector(&self, _link_id: u8, receiver: MacAddress, _allowed_width: u16) -> SuTxVector {
        self.rate_queries.borrow_mut().push(receiver);
        match self.by_any_address(receiver) {
            Some(sta) => SuTxVector {
                preamble: if sta.eht && self.ap_eht {
                    Preamble::EhtMu
                } else {
                    Preamble::HeMu
                },
                mcs: sta.mcs,
                nss: sta.nss,
            },
            None => SuTxVector {
                preamble: Preamble::HeMu,
                mcs: 0,
                nss: 1,
            },
        }
    }

    fn control_tx_vector(&self, _link_id: u8, _receiver: MacAddress) -> TxVector {
        TxVector::new(Preamble::Su, 20, self.he_configuration())
    }
}

impl BlockAckSessions for FakeMac {
    fn agreement_as_originator(&self, address: MacAddress, tid: u8) -> bool {
        self.by_address(address)
            .is_some_and(|s| s.ba_originator.contains(&tid))
    }

    fn agreement_as_recipient(&self, address: MacAddress, tid: u8) -> bool {
        self.by_address(address)
            .is_some_and(|s| s.ba_recipient.contains(&tid))
    }
}

impl MacQueues for FakeMac {
    type Mpdu = FakeMpdu;

    fn peek_head(&self, _link_id: u8, ac: AccessCategory) -> Option<FakeMpdu> {
        self.queue
            .iter()
            .find(|m| AccessCategory::from_tid(m.tid) == ac)
            .cloned()
    }

    fn peek_next(
        &self,
        _link_id: u8,
        _ac: AccessCategory,
        tid: u8,
        receiver: MacAddress,
    ) -> Option<FakeMpdu> {
        self.queue
            .iter()
            .find(|m| m.tid == tid && m.receiver == receiver)
            .cloned()
    }

    fn max_buffer_status(&self, address: MacAddress) -> u8 {
        self.by_address(address).map_or(0, |s| s.buffer_status)
    }
}

impl PhyTiming for FakeMac {
    fn tx_duration(&self, _link_id: u8, size: u32, tx_vector: &TxVector, sta_id: Aid) -> TimeDelta {
        let (tones, mcs, nss) = tx_vector
            .user_info
            .get(&sta_id)
            .map(|u| (u.ru_type().map_or(26, |t| t.tones()), u.mcs, u.nss))
            .unwrap_or((26, 0, 1));
        let bits_per_us = (i64::from(tones) * (i64::from(mcs) + 1) * i64::from(nss.max(1)) / 13).max(1);
        let data_ns = (i64::from(size) * 8 * 1000 + bits_per_us - 1) / bits_per_us;
        TimeDelta::nanoseconds(PREAMBLE_NS + data_ns)
    }

    fn sifs(&self, _link_id: u8) -> TimeDelta {
        TimeDelta::microseconds(16)
    }

    fn band(&self, _link_id: u8) -> PhyBand {
        self.band
    }
}

impl TxTiming for FakeMac {
    fn try_add_mpdu(
        &self,
        link_id: u8,
        mpdu: &FakeMpdu,
        params: &mut TxParams,
        available: Option<TimeDelta>,
    ) -> bool {
        let mut updated = params.clone();
        *updated.psdu_sizes.entry(mpdu.receiver).or_insert(0) += mpdu.size;

        let mut ppdu = TimeDelta::zero();
        for (&receiver, &size) in &updated.psdu_sizes {
            let Some(sta) = self.by_address(receiver) else {
                return false;
            };
            ppdu = ppdu.max(self.tx_duration(link_id, size, &updated.tx_vector, sta.aid));
        }
        updated.tx_duration = Some(ppdu);
        updated.protection_time = Some(TimeDelta::zero());
        updated.acknowledgment_time = Some(self.block_ack_time);

        if let Some(available) = available {
            if ppdu + self.block_ack_time > available {
                return false;
            }
        }
        if self.ppdu_limit.is_some_and(|limit| ppdu > limit) {
            return false;
        }
        *params = updated;
        true
    }

    fn try_add_trigger(
        &self,
        _link_id: u8,
        trigger: &TriggerFrame,
        _header: &TriggerHeader,
        params: &mut TxParams,
        available: Option<TimeDelta>,
    ) -> bool {
        if let Some(available) = available {
            if self.protection_time + self.trigger_tx_time > available {
                return false;
            }
        }
        params.protection_time = Some(self.protection_time);
        params.tx_duration = Some(self.trigger_tx_time);
        params.acknowledgment_time = Some(match trigger.kind {
            TriggerKind::Bsrp => TimeDelta::zero(),
            TriggerKind::Basic => self.basic_ack_time,
        });
        true
    }
}

impl Aggregation for FakeMac {
    fn next_amsdu(
        &mut self,
        _link_id: u8,
        _mpdu: &FakeMpdu,
        _params: &mut TxParams,
        _available: Option<TimeDelta>,
    ) -> Option<FakeMpdu> {
        None
    }

    fn next_ampdu(
        &mut self,
        _link_id: u8,
        mpdu: &FakeMpdu,
        _params: &mut TxParams,
        _available: Option<TimeDelta>,
    ) -> Vec<FakeMpdu> {
        let mut mpdus = vec![mpdu.clone()];
        mpdus.extend(
            self.queue
                .iter()
                .filter(|m| {
                    m.id != mpdu.id && m.receiver == mpdu.receiver && m.tid == mpdu.tid && !m.retry
                })
                .cloned(),
        );
        mpdus
    }

    fn assign_sequence_number(&mut self, _link_id: u8, mpdu: &FakeMpdu) {
        self.sequenced.push(mpdu.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MuUserInfo;
    use crate::ru::{RuSpec, RuType};

    #[test]
    fn test_wider_ru_is_faster() {
        let mac = FakeMac::with_stations(1);
        let mut v = TxVector::new(Preamble::HeMu, 20, HeConfiguration::default());
        v.set_user_info(
            1,
            MuUserInfo {
                ru: Some(RuSpec::new(RuType::Ru26Tone, 1, true)),
                mcs: 0,
                nss: 1,
            },
        );
        let narrow = mac.tx_duration(0, 1000, &v, 1);
        // 26 tones at MCS 0 carry 2 bits per microsecond
        assert_eq!(narrow, TimeDelta::microseconds(40 + 4000));

        v.set_user_info(
            1,
            MuUserInfo {
                ru: Some(RuSpec::new(RuType::Ru242Tone, 1, true)),
                mcs: 0,
                nss: 1,
            },
        );
        assert!(mac.tx_duration(0, 1000, &v, 1) < narrow);
    }

    #[test]
    fn test_try_add_mpdu_leaves_params_untouched_on_failure() {
        let mut mac = FakeMac::with_stations(1);
        mac.enqueue(1, 0, 100_000);
        let mpdu = mac.queue[0].clone();
        let mut params = TxParams::new(TxVector::new(Preamble::HeMu, 20, HeConfiguration::default()));
        let before = params.clone();
        assert!(!mac.try_add_mpdu(0, &mpdu, &mut params, Some(TimeDelta::microseconds(100))));
        assert_eq!(params, before);
        assert!(mac.try_add_mpdu(0, &mpdu, &mut params, None));
        assert!(params.tx_duration.is_some());
    }
}
