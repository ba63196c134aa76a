//! Interfaces to the access point's MAC and PHY collaborators.
//!
//! The scheduler never owns radio state. Everything it needs to know about
//! stations, queues, sessions and timing is asked through these traits, all of
//! which are synchronous in-memory queries.

use chrono::TimeDelta;
use std::fmt;

use crate::models::{
    AccessCategory, Aid, HeConfiguration, MacAddress, PhyBand, SuTxVector, TxParams, TxVector,
};
use crate::trigger::{TriggerFrame, TriggerHeader};

/// A frame sitting in one of the AP's transmit queues.
pub trait QueuedMpdu: Clone + fmt::Debug {
    /// Receiver address (Address 1) of the frame.
    fn receiver(&self) -> MacAddress;
    /// TID if the frame is a QoS data frame.
    fn qos_tid(&self) -> Option<u8>;
    /// Whether the frame is a retransmission.
    fn is_retry(&self) -> bool;
}

/// Capability, rate and association lookups.
pub trait StationCapabilities {
    /// Address the AP uses on the given link.
    fn ap_address(&self, link_id: u8) -> MacAddress;
    fn ap_eht_supported(&self) -> bool;
    fn he_configuration(&self) -> HeConfiguration;

    fn he_supported(&self, address: MacAddress) -> bool;
    fn eht_supported(&self, address: MacAddress) -> bool;

    /// Logical-device (MLD) or link address of an associated station.
    fn mld_or_link_address(&self, aid: Aid) -> Option<MacAddress>;
    /// Whether any link of the device with this address is still associated.
    fn is_associated(&self, address: MacAddress) -> bool;
    /// Whether the station has set up the given link.
    fn is_link_setup(&self, link_id: u8, aid: Aid) -> bool;
    /// Address of the device's station affiliated with the given link, if it
    /// is a multi-link device.
    fn affiliated_sta_address(&self, _link_id: u8, _address: MacAddress) -> Option<MacAddress> {
        None
    }

    /// Link-adaptation rate for data sent to `receiver` within `allowed_width`.
    fn data_tx_vector(&self, link_id: u8, receiver: MacAddress, allowed_width: u16)
        -> SuTxVector;
    /// TXVECTOR used to send a control frame (e.g. a trigger) to `receiver`.
    fn control_tx_vector(&self, link_id: u8, receiver: MacAddress) -> TxVector;
}

/// Block Ack agreement lookups.
pub trait BlockAckSessions {
    fn agreement_as_originator(&self, address: MacAddress, tid: u8) -> bool;
    fn agreement_as_recipient(&self, address: MacAddress, tid: u8) -> bool;
}

/// Non-destructive queue inspection.
pub trait MacQueues {
    type Mpdu: QueuedMpdu;

    /// Head-of-line frame of the AC that gained channel access.
    fn peek_head(&self, link_id: u8, ac: AccessCategory) -> Option<Self::Mpdu>;
    /// Next frame of the given TID addressed to `receiver`.
    fn peek_next(
        &self,
        link_id: u8,
        ac: AccessCategory,
        tid: u8,
        receiver: MacAddress,
    ) -> Option<Self::Mpdu>;
    /// Last buffer status code advertised by the station (254 = unlimited,
    /// 255 = unknown, otherwise units of 256 bytes).
    fn max_buffer_status(&self, address: MacAddress) -> u8;
}

/// The authoritative timing oracle.
///
/// On success each method updates `params` (duration, protection and
/// acknowledgment) to include the new frame; on failure `params` must be left
/// untouched. `available` is `None` when no TXOP budget applies.
pub trait TxTiming: MacQueues {
    fn try_add_mpdu(
        &self,
        link_id: u8,
        mpdu: &Self::Mpdu,
        params: &mut TxParams,
        available: Option<TimeDelta>,
    ) -> bool;

    fn try_add_trigger(
        &self,
        link_id: u8,
        trigger: &TriggerFrame,
        header: &TriggerHeader,
        params: &mut TxParams,
        available: Option<TimeDelta>,
    ) -> bool;
}

/// PHY duration queries.
pub trait PhyTiming {
    /// Duration of a PPDU carrying `size` bytes for station `sta_id`.
    fn tx_duration(&self, link_id: u8, size: u32, tx_vector: &TxVector, sta_id: Aid)
        -> TimeDelta;
    fn sifs(&self, link_id: u8) -> TimeDelta;
    fn band(&self, link_id: u8) -> PhyBand;
}

/// MSDU/MPDU aggregation, used only when committing a DL MU PPDU.
pub trait Aggregation: MacQueues {
    /// Build an A-MSDU headed by `mpdu`, if aggregation applies.
    fn next_amsdu(
        &mut self,
        link_id: u8,
        mpdu: &Self::Mpdu,
        params: &mut TxParams,
        available: Option<TimeDelta>,
    ) -> Option<Self::Mpdu>;
    /// Build an A-MPDU headed by `mpdu`; a single element means no aggregation.
    fn next_ampdu(
        &mut self,
        link_id: u8,
        mpdu: &Self::Mpdu,
        params: &mut TxParams,
        available: Option<TimeDelta>,
    ) -> Vec<Self::Mpdu>;
    fn assign_sequence_number(&mut self, link_id: u8, mpdu: &Self::Mpdu);
}

/// Everything the scheduler needs from the access point.
pub trait ApMac: StationCapabilities + BlockAckSessions + TxTiming + PhyTiming + Aggregation {}

impl<T> ApMac for T where
    T: StationCapabilities + BlockAckSessions + TxTiming + PhyTiming + Aggregation
{
}
