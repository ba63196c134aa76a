//! Downlink MU PPDU construction: candidate selection and commit.

use std::collections::BTreeMap;

use crate::models::{AccessCategory, Candidate, MuUserInfo, Preamble, TxParams, TxVector};
use crate::oracle::{ApMac, QueuedMpdu};
use crate::ru::{equal_sized_rus, RuSpec, RuType};
use crate::{log_changes, log_checks, log_debug};

use super::core::{RrMuScheduler, SchedulerError};
use super::finalize::{finalize_tx_vector, served_rus};
use super::state::{AccessContext, DlMuInfo, DlMuPlan, Plan, Psdu};

impl RrMuScheduler {
    /// TIDs probed for each station, in probe order.
    ///
    /// With TXOP sharing, every AC at or above the primary AC's index
    /// contributes its first TID followed by the other TID of its pair.
    pub(crate) fn tids_to_probe(&self, primary_ac: AccessCategory, current_tid: u8) -> Vec<u8> {
        if !self.config.enable_txop_sharing {
            return vec![current_tid];
        }
        AccessCategory::ALL
            .iter()
            .filter(|&&ac| ac >= primary_ac)
            .flat_map(|&ac| {
                let first = if ac == primary_ac {
                    current_tid
                } else {
                    ac.high_tid()
                };
                [first, ac.other_tid(first)]
            })
            .collect()
    }

    /// Select the stations served by a DL MU PPDU.
    ///
    /// RUs are only tentatively assigned here; `commit` binds them once the
    /// candidate set is final.
    pub(crate) fn try_dl_mu_ppdu<M: ApMac>(
        &self,
        mac: &M,
        ctx: &AccessContext,
        head: Option<&M::Mpdu>,
    ) -> Result<Plan<M::Mpdu>, SchedulerError> {
        let verbosity = self.config.verbosity;
        let list = &self.dl[ctx.primary_ac.index()];
        if list.is_empty() {
            log_checks!(verbosity, "No HE stations associated: SU_TX");
            return Ok(Plan::Su);
        }

        let count = usize::from(self.config.n_stations).min(list.len());
        let partition = equal_sized_rus(ctx.allowed_width, count)?;
        let n_central = if self.config.use_central_26_tones_rus {
            partition.n_central_26
        } else {
            0
        };
        log_debug!(
            verbosity,
            "DL partition: {} x {} RU, {} central 26-tone RU(s)",
            partition.n_rus,
            partition.ru_type,
            n_central
        );

        let current_tid = head
            .and_then(|mpdu| mpdu.qos_tid())
            .unwrap_or_else(|| ctx.primary_ac.high_tid());
        let tids = self.tids_to_probe(ctx.primary_ac, current_tid);
        log_debug!(verbosity, "TIDs to check: {:?}", tids);

        let mut tx_params = TxParams::new(TxVector::new(
            Preamble::HeMu,
            ctx.allowed_width,
            mac.he_configuration(),
        ));
        let budget = ctx.dl_budget();
        let max_candidates = usize::from(self.config.n_stations).min(partition.n_rus + n_central);
        let mut candidates: Vec<Candidate<M::Mpdu>> = Vec::with_capacity(max_candidates);

        for sta in list.iter() {
            if candidates.len() >= max_candidates {
                break;
            }
            if tx_params.tx_vector.preamble == Preamble::EhtMu && !mac.eht_supported(sta.address) {
                log_checks!(verbosity, aid = sta.aid, "Skipping non-EHT station in EHT MU PPDU");
                continue;
            }
            let ru_type = if candidates.len() < partition.n_rus {
                partition.ru_type
            } else {
                RuType::Ru26Tone
            };

            for &tid in &tids {
                if !mac.agreement_as_originator(sta.address, tid) {
                    continue;
                }
                let ac = AccessCategory::from_tid(tid);
                let Some(mpdu) = mac.peek_next(ctx.link_id, ac, tid, sta.address) else {
                    log_checks!(verbosity, aid = sta.aid, tid, "No frames queued");
                    continue;
                };

                let su = mac.data_tx_vector(ctx.link_id, mpdu.receiver(), ctx.allowed_width);
                let saved = tx_params.tx_vector.clone();
                // The first candidate decides the preamble
                if candidates.is_empty() && su.preamble == Preamble::EhtMu {
                    tx_params.tx_vector.preamble = Preamble::EhtMu;
                }
                tx_params.tx_vector.set_user_info(
                    sta.aid,
                    MuUserInfo {
                        ru: Some(RuSpec::new(ru_type, 1, true)),
                        mcs: su.mcs,
                        nss: su.nss,
                    },
                );

                if mac.try_add_mpdu(ctx.link_id, &mpdu, &mut tx_params, budget) {
                    log_changes!(
                        verbosity,
                        aid = sta.aid,
                        tid,
                        "Adding DL candidate {}",
                        sta.address
                    );
                    candidates.push(Candidate {
                        aid: sta.aid,
                        address: sta.address,
                        mpdu: Some(mpdu),
                    });
                    break;
                }
                log_checks!(
                    verbosity,
                    aid = sta.aid,
                    tid,
                    "Adding the peeked frame violates the time constraints"
                );
                tx_params.tx_vector = saved;
            }
        }

        if candidates.is_empty() {
            if self.config.force_dl_ofdma {
                log_checks!(verbosity, "No suitable frames to transmit: NO_TX");
                return Ok(Plan::NoTx);
            }
            log_checks!(verbosity, "No suitable frames to transmit: SU_TX");
            return Ok(Plan::Su);
        }

        Ok(Plan::DlMu(DlMuPlan {
            primary_ac: ctx.primary_ac,
            tx_params,
            candidates,
        }))
    }

    /// Bind RUs, rebuild the PPDU timing, aggregate and charge the ledger.
    pub(crate) fn commit_dl<M: ApMac>(
        &mut self,
        mac: &mut M,
        ctx: &AccessContext,
        plan: DlMuPlan<M::Mpdu>,
    ) -> Result<DlMuInfo<M::Mpdu>, SchedulerError> {
        let verbosity = self.config.verbosity;
        let DlMuPlan {
            primary_ac,
            tx_params,
            mut candidates,
        } = plan;

        let mut tx_vector = tx_params.tx_vector;
        finalize_tx_vector(
            &mut tx_vector,
            &mut candidates,
            self.config.use_central_26_tones_rus,
            verbosity,
        )?;

        // RU widths changed: recompute the timing with the final TXVECTOR
        let mut tx_params = TxParams::new(tx_vector);
        let budget = ctx.dl_budget();
        let mut frames = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mpdu = candidate
                .mpdu
                .ok_or(SchedulerError::MissingFrame(candidate.aid))?;
            if !mac.try_add_mpdu(ctx.link_id, &mpdu, &mut tx_params, budget) {
                return Err(SchedulerError::FrameNoLongerFits(candidate.aid));
            }
            frames.push((candidate.aid, candidate.address, mpdu));
        }

        let mut psdu_map = BTreeMap::new();
        for (aid, address, mpdu) in frames {
            if mpdu.receiver() != address {
                return Err(SchedulerError::ReceiverMismatch(aid));
            }
            let item = if mpdu.is_retry() {
                mpdu
            } else {
                let item = mac
                    .next_amsdu(ctx.link_id, &mpdu, &mut tx_params, ctx.available_time)
                    .unwrap_or(mpdu);
                mac.assign_sequence_number(ctx.link_id, &item);
                item
            };

            let mpdus = mac.next_ampdu(ctx.link_id, &item, &mut tx_params, ctx.available_time);
            let psdu = if mpdus.len() > 1 {
                Psdu::Ampdu(mpdus)
            } else {
                Psdu::Single(item)
            };
            log_debug!(verbosity, aid, "PSDU with {} MPDU(s)", psdu.n_mpdus());
            psdu_map.insert(aid, psdu);
        }

        let tx_duration = tx_params
            .tx_duration
            .ok_or(SchedulerError::TimingStateMissing("tx_duration"))?;
        let served = served_rus(&tx_params.tx_vector)?;
        let list = &mut self.dl[primary_ac.index()];
        list.update_credits(tx_duration, &served, self.config.max_credits)?;
        log_changes!(
            verbosity,
            "DL credits updated for {} station(s), next station to serve: {:?}",
            served.len(),
            list.front().map(|sta| sta.aid)
        );

        Ok(DlMuInfo {
            psdu_map,
            tx_params,
        })
    }
}
