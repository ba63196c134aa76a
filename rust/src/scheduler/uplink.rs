//! Uplink OFDMA: candidate selection and trigger frame budgeting.
//!
//! Both solicitation kinds share one candidate walk, parameterized by an
//! eligibility predicate, and bind RUs right away since nothing can trim the
//! set afterwards. A BSRP trigger only asks for buffer status reports (QoS
//! Null frames); a Basic trigger grants a TB PPDU duration for data.

use chrono::TimeDelta;

use crate::models::{
    Aid, Candidate, MacAddress, MuUserInfo, Preamble, StationRecord, TxParams, TxVector,
    N_DATA_TIDS,
};
use crate::oracle::ApMac;
use crate::phy::{he_tb_duration_to_length, ppdu_max_time};
use crate::ru::equal_sized_rus;
use crate::trigger::{
    buffer_status_bytes, qos_null_ampdu_size, TriggerFrame, TriggerHeader, TriggerKind,
};
use crate::{log_changes, log_checks, log_debug};

use super::core::{RrMuScheduler, SchedulerError};
use super::finalize::{finalize_tx_vector, served_rus};
use super::state::{
    AccessContext, Attempt, CreditCharge, PendingSolicitation, Plan, UlMuInfo, UlScheduleStats,
};

/// Finalized UL candidate set.
pub(crate) struct UlSelection<F> {
    pub tx_vector: TxVector,
    pub candidates: Vec<Candidate<F>>,
    pub stats: UlScheduleStats,
}

/// Longest duration among the users for a PSDU of `size` bytes.
fn max_tx_duration<M: ApMac>(
    mac: &M,
    link_id: u8,
    size: u32,
    tx_vector: &TxVector,
    aids: impl Iterator<Item = Aid>,
) -> TimeDelta {
    aids.map(|aid| mac.tx_duration(link_id, size, tx_vector, aid))
        .max()
        .unwrap_or_else(TimeDelta::zero)
}

/// Protection, transmission and acknowledgment times set by the timing oracle.
fn trigger_timing(params: &TxParams) -> Result<(TimeDelta, TimeDelta, TimeDelta), SchedulerError> {
    Ok((
        params
            .protection_time
            .ok_or(SchedulerError::TimingStateMissing("protection_time"))?,
        params
            .tx_duration
            .ok_or(SchedulerError::TimingStateMissing("tx_duration"))?,
        params
            .acknowledgment_time
            .ok_or(SchedulerError::TimingStateMissing("acknowledgment_time"))?,
    ))
}

fn trigger_header<M: ApMac, F>(mac: &M, link_id: u8, candidates: &[Candidate<F>]) -> TriggerHeader {
    let receiver = match candidates {
        [only] => mac
            .affiliated_sta_address(link_id, only.address)
            .unwrap_or(only.address),
        _ => MacAddress::BROADCAST,
    };
    TriggerHeader {
        receiver,
        transmitter: mac.ap_address(link_id),
    }
}

impl RrMuScheduler {
    /// Walk the UL list and collect up to one partition's worth of stations
    /// that `can_be_solicited` accepts. Returns `None` if no station qualifies.
    pub(crate) fn ul_candidates<M, P>(
        &self,
        mac: &M,
        ctx: &AccessContext,
        can_be_solicited: P,
    ) -> Result<Option<UlSelection<M::Mpdu>>, SchedulerError>
    where
        M: ApMac,
        P: Fn(&StationRecord) -> bool,
    {
        let verbosity = self.config.verbosity;
        let count = usize::from(self.config.n_stations).min(self.ul.len());
        let partition = equal_sized_rus(ctx.allowed_width, count)?;
        log_debug!(
            verbosity,
            "First UL schedule: {} x {} RU, {} central 26-tone RU(s)",
            partition.n_rus,
            partition.ru_type,
            partition.n_central_26
        );
        let n_central = if self.config.use_central_26_tones_rus {
            partition.n_central_26
        } else {
            0
        };

        let mut tx_vector =
            TxVector::new(Preamble::HeTb, ctx.allowed_width, mac.he_configuration());
        let max_candidates = usize::from(self.config.n_stations).min(partition.n_rus + n_central);
        let mut candidates = Vec::with_capacity(max_candidates);
        let mut unsolicited = 0;

        for sta in self.ul.iter() {
            if tx_vector.user_info.len() >= max_candidates {
                break;
            }
            if !can_be_solicited(sta) {
                log_checks!(verbosity, aid = sta.aid, "Station cannot be solicited");
                unsolicited += 1;
                continue;
            }
            if tx_vector.preamble == Preamble::EhtTb && !mac.eht_supported(sta.address) {
                log_checks!(verbosity, aid = sta.aid, "Skipping non-EHT station");
                continue;
            }
            if !(0..N_DATA_TIDS).any(|tid| mac.agreement_as_recipient(sta.address, tid)) {
                log_checks!(verbosity, aid = sta.aid, "No Block Ack agreement");
                continue;
            }
            // The first candidate decides whether EHT TB PPDUs are solicited
            if tx_vector.user_info.is_empty()
                && mac.ap_eht_supported()
                && mac.eht_supported(sta.address)
            {
                tx_vector.preamble = Preamble::EhtTb;
            }

            let receiver = mac
                .affiliated_sta_address(ctx.link_id, sta.address)
                .unwrap_or(sta.address);
            let su = mac.data_tx_vector(ctx.link_id, receiver, ctx.allowed_width);
            tx_vector.set_user_info(
                sta.aid,
                MuUserInfo {
                    ru: None,
                    mcs: su.mcs,
                    nss: su.nss,
                },
            );
            candidates.push(Candidate {
                aid: sta.aid,
                address: sta.address,
                mpdu: None,
            });
        }

        if candidates.is_empty() {
            log_checks!(verbosity, "No suitable UL station");
            return Ok(None);
        }

        let initial_candidates = candidates.len();
        finalize_tx_vector(
            &mut tx_vector,
            &mut candidates,
            self.config.use_central_26_tones_rus,
            verbosity,
        )?;
        let stats = UlScheduleStats {
            list_size: self.ul.len(),
            unsolicited,
            target: partition.n_rus,
            initial_candidates,
            finalized: candidates.len(),
        };
        log_changes!(
            verbosity,
            list_size = stats.list_size,
            unsolicited = stats.unsolicited,
            target = stats.target,
            initial = stats.initial_candidates,
            finalized = stats.finalized,
            "UL candidates selected"
        );

        Ok(Some(UlSelection {
            tx_vector,
            candidates,
            stats,
        }))
    }

    /// Try soliciting buffer status reports with a BSRP trigger.
    pub(crate) fn try_bsrp<M: ApMac>(
        &self,
        mac: &M,
        ctx: &AccessContext,
    ) -> Result<Attempt<Plan<M::Mpdu>>, SchedulerError> {
        let verbosity = self.config.verbosity;
        if self.ul.is_empty() {
            log_checks!(verbosity, "No HE stations associated: SU_TX");
            return Ok(Attempt::Committed(Plan::Su));
        }

        let link_id = ctx.link_id;
        let Some(selection) =
            self.ul_candidates(mac, ctx, |sta| mac.is_link_setup(link_id, sta.aid))?
        else {
            return Ok(Attempt::TryNext);
        };
        let UlSelection {
            mut tx_vector,
            candidates,
            stats,
        } = selection;

        let mut trigger = TriggerFrame::new(TriggerKind::Bsrp, &tx_vector)?;
        tx_vector.guard_interval_ns = trigger.guard_interval_ns;
        let header = trigger_header(mac, link_id, &candidates);

        let mut tx_params = TxParams::new(mac.control_tx_vector(link_id, header.receiver));
        if !mac.try_add_trigger(link_id, &trigger, &header, &mut tx_params, ctx.available_time) {
            log_checks!(verbosity, "Remaining TXOP duration is not enough for BSRP TF");
            return Ok(Attempt::Abstain);
        }

        // Each station answers with one QoS Null per TID it has an agreement for
        let n_tids = candidates
            .iter()
            .map(|c| {
                (0..N_DATA_TIDS)
                    .filter(|&tid| mac.agreement_as_recipient(c.address, tid))
                    .count()
            })
            .max()
            .unwrap_or(0);
        let size = qos_null_ampdu_size(u8::try_from(n_tids).unwrap_or(N_DATA_TIDS));
        let qos_null_duration = max_tx_duration(mac, link_id, size, &tx_vector, trigger.aids());
        log_debug!(verbosity, "QoS Null exchange: {} bytes, {:?}", size, qos_null_duration);

        if let Some(available) = ctx.available_time {
            let (protection, trigger_tx, _) = trigger_timing(&tx_params)?;
            if protection + trigger_tx + mac.sifs(link_id) + qos_null_duration > available {
                log_checks!(verbosity, "Remaining TXOP duration is not enough for BSRP TF exchange");
                return Ok(Attempt::Abstain);
            }
        }

        // The length is computed against the first solicited user's TB TXVECTOR
        let mut first_user = trigger.tb_tx_vector(tx_vector.preamble, tx_vector.bss_color);
        if let Some(first) = trigger.aids().next() {
            first_user.user_info.retain(|&aid, _| aid == first);
        }
        let (ul_length, granted_duration) =
            he_tb_duration_to_length(qos_null_duration, &first_user, mac.band(link_id));
        trigger.ul_length = ul_length;
        log_changes!(
            verbosity,
            "BSRP TF soliciting {} station(s) for {:?}",
            trigger.users.len(),
            granted_duration
        );

        Ok(Attempt::Committed(Plan::UlMu(PendingSolicitation {
            trigger,
            header,
            tx_params,
            tb_tx_vector: tx_vector,
            granted_duration,
            credit_charge: None,
            stats,
        })))
    }

    /// Try soliciting UL data with a Basic trigger.
    pub(crate) fn try_basic<M: ApMac>(
        &self,
        mac: &M,
        ctx: &AccessContext,
    ) -> Result<Attempt<Plan<M::Mpdu>>, SchedulerError> {
        let verbosity = self.config.verbosity;
        if self.ul.is_empty() {
            log_checks!(verbosity, "No HE stations associated: SU_TX");
            return Ok(Attempt::Committed(Plan::Su));
        }

        let link_id = ctx.link_id;
        let Some(selection) = self.ul_candidates(mac, ctx, |sta| {
            mac.is_link_setup(link_id, sta.aid) && mac.max_buffer_status(sta.address) > 0
        })?
        else {
            return Ok(Attempt::TryNext);
        };
        let UlSelection {
            mut tx_vector,
            candidates,
            stats,
        } = selection;

        let mut max_buffer_size = 0u32;
        for &aid in tx_vector.user_info.keys() {
            let address = mac
                .mld_or_link_address(aid)
                .ok_or(SchedulerError::AidNotFound(aid))?;
            let code = mac.max_buffer_status(address);
            log_debug!(verbosity, aid, "Buffer status code {}", code);
            max_buffer_size = max_buffer_size.max(buffer_status_bytes(code, self.config.ul_psdu_size));
        }
        if max_buffer_size == 0 {
            return Ok(Attempt::TryNext);
        }

        let mut trigger = TriggerFrame::new(TriggerKind::Basic, &tx_vector)?;
        tx_vector.guard_interval_ns = trigger.guard_interval_ns;
        let header = trigger_header(mac, link_id, &candidates);

        let mut max_duration = ppdu_max_time(tx_vector.preamble);

        let mut tx_params = TxParams::new(mac.control_tx_vector(link_id, header.receiver));
        if !mac.try_add_trigger(link_id, &trigger, &header, &mut tx_params, ctx.available_time) {
            log_checks!(verbosity, "Remaining TXOP duration is not enough for UL MU exchange");
            return Ok(Attempt::Abstain);
        }

        if let Some(available) = ctx.available_time {
            let (protection, trigger_tx, ack) = trigger_timing(&tx_params)?;
            max_duration =
                max_duration.min(available - protection - trigger_tx - mac.sifs(link_id) - ack);
            if max_duration <= TimeDelta::zero() {
                log_checks!(verbosity, "Remaining TXOP duration is not enough for UL MU exchange");
                return Ok(Attempt::Abstain);
            }
        }

        let buffer_tx_time =
            max_tx_duration(mac, link_id, max_buffer_size, &tx_vector, trigger.aids());
        if buffer_tx_time < max_duration {
            max_duration = buffer_tx_time;
        } else {
            // The clamped grant must still let some station send a default-size PSDU
            let min_duration = trigger
                .aids()
                .map(|aid| mac.tx_duration(link_id, self.config.ul_psdu_size, &tx_vector, aid))
                .min()
                .unwrap_or_else(TimeDelta::zero);
            if max_duration < min_duration {
                log_checks!(verbosity, "Available time {:?} is too short", max_duration);
                return Ok(Attempt::Abstain);
            }
        }

        let (ul_length, granted_duration) =
            he_tb_duration_to_length(max_duration, &tx_vector, mac.band(link_id));
        trigger.ul_length = ul_length;
        trigger.set_preferred_ac(ctx.primary_ac);
        log_changes!(
            verbosity,
            "Basic TF soliciting {} station(s) for {:?}",
            trigger.users.len(),
            granted_duration
        );

        let credit_charge = CreditCharge {
            duration: granted_duration,
            served: served_rus(&tx_vector)?,
        };

        Ok(Attempt::Committed(Plan::UlMu(PendingSolicitation {
            trigger,
            header,
            tx_params,
            tb_tx_vector: tx_vector,
            granted_duration,
            credit_charge: Some(credit_charge),
            stats,
        })))
    }

    /// Charge the UL ledger, if the solicitation asks for it, and hand the
    /// trigger over for transmission.
    pub(crate) fn commit_ul(
        &mut self,
        pending: PendingSolicitation,
    ) -> Result<UlMuInfo, SchedulerError> {
        if let Some(charge) = &pending.credit_charge {
            self.ul
                .update_credits(charge.duration, &charge.served, self.config.max_credits)?;
            log_changes!(
                self.config.verbosity,
                "UL credits updated for {} station(s), next station to solicit: {:?}",
                charge.served.len(),
                self.ul.front().map(|sta| sta.aid)
            );
        }
        Ok(UlMuInfo {
            trigger: pending.trigger,
            header: pending.header,
            tx_params: pending.tx_params,
            granted_duration: pending.granted_duration,
        })
    }
}
