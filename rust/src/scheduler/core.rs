//! Round-robin multi-user scheduler: format selection and commit.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::config::SchedulerConfig;
use crate::ledger::{LedgerError, StationList};
use crate::models::{AccessCategory, Aid, MacAddress, StationRecord, TxFormat};
use crate::oracle::{ApMac, QueuedMpdu, StationCapabilities};
use crate::ru::RuError;
use crate::trigger::TriggerKind;
use crate::{log_changes, log_checks};

use super::state::{AccessContext, Attempt, CommitOutcome, Decision, Plan};

/// Errors that can occur during scheduling.
///
/// All of these indicate an inconsistent station registry or a misbehaving
/// collaborator; an opportunity that simply cannot be used is a `NoTx`
/// decision, never an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("AID {0} not found")]
    AidNotFound(Aid),
    #[error("{candidates} candidates but {users} user info entries")]
    CandidateMismatch { candidates: usize, users: usize },
    #[error("Ran out of RUs while binding candidates")]
    RuExhausted,
    #[error("No RU bound for AID {0}")]
    UnboundRu(Aid),
    #[error("Timing oracle left {0} unset")]
    TimingStateMissing(&'static str),
    #[error("Frame for AID {0} does not fit after RU reassignment")]
    FrameNoLongerFits(Aid),
    #[error("Stored frame for AID {0} is addressed to another station")]
    ReceiverMismatch(Aid),
    #[error("No frame stored for DL candidate with AID {0}")]
    MissingFrame(Aid),
    #[error(transparent)]
    Ru(#[from] RuError),
}

impl From<LedgerError> for SchedulerError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownStation(aid) => SchedulerError::AidNotFound(aid),
        }
    }
}

/// OFDMA scheduler serving stations in round-robin order weighted by credits.
///
/// The DL side keeps one station list per AC, the UL side a single list.
/// Deciding never mutates the scheduler: `select_tx_format` returns a
/// `Decision` and only `commit` touches the lists and the bookkeeping of the
/// previous opportunity.
pub struct RrMuScheduler {
    pub(crate) config: SchedulerConfig,
    pub(crate) dl: [StationList; 4],
    pub(crate) ul: StationList,
    last_format: FxHashMap<u8, TxFormat>,
    last_trigger: Option<TriggerKind>,
}

impl RrMuScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            config,
            dl: Default::default(),
            ul: StationList::default(),
            last_format: FxHashMap::default(),
            last_trigger: None,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// DL station list of the given AC.
    pub fn dl_list(&self, ac: AccessCategory) -> &StationList {
        &self.dl[ac.index()]
    }

    pub fn ul_list(&self) -> &StationList {
        &self.ul
    }

    /// Format committed at the previous opportunity on this link.
    pub fn last_tx_format(&self, link_id: u8) -> TxFormat {
        self.last_format
            .get(&link_id)
            .copied()
            .unwrap_or(TxFormat::Su)
    }

    /// Kind of the most recently built trigger frame.
    pub fn last_trigger(&self) -> Option<TriggerKind> {
        self.last_trigger
    }

    /// Register a newly associated station in every list.
    ///
    /// Non-HE stations are ignored. Stations are keyed by the address of
    /// their logical device, so a multi-link device shows up once.
    pub fn notify_station_associated<M: StationCapabilities>(
        &mut self,
        mac: &M,
        aid: Aid,
        address: MacAddress,
    ) -> Result<(), SchedulerError> {
        if !mac.he_supported(address) {
            log_checks!(self.config.verbosity, aid, "Ignoring non-HE station {}", address);
            return Ok(());
        }
        let mld_address = mac
            .mld_or_link_address(aid)
            .ok_or(SchedulerError::AidNotFound(aid))?;

        for list in &mut self.dl {
            list.push(StationRecord::new(aid, mld_address));
        }
        if self.ul.push(StationRecord::new(aid, mld_address)) {
            log_changes!(self.config.verbosity, aid, "Station {} associated", mld_address);
        }
        Ok(())
    }

    /// Drop a deassociated station unless another of its links is still
    /// associated.
    pub fn notify_station_deassociated<M: StationCapabilities>(
        &mut self,
        mac: &M,
        aid: Aid,
        address: MacAddress,
    ) -> Result<(), SchedulerError> {
        if !mac.he_supported(address) {
            return Ok(());
        }
        let mld_address = mac
            .mld_or_link_address(aid)
            .ok_or(SchedulerError::AidNotFound(aid))?;
        if mac.is_associated(mld_address) {
            log_checks!(
                self.config.verbosity,
                aid,
                "Another link of {} is still associated",
                mld_address
            );
            return Ok(());
        }

        for list in &mut self.dl {
            list.remove(aid);
        }
        self.ul.remove(aid);
        log_changes!(self.config.verbosity, aid, "Station {} deassociated", mld_address);
        Ok(())
    }

    /// Decide the format of the current opportunity.
    ///
    /// UL attempts take precedence after a DL MU transmission or when the
    /// primary AC has nothing queued; an UL attempt that finds no station
    /// falls through to the DL build.
    pub fn select_tx_format<M: ApMac>(
        &self,
        mac: &M,
        ctx: AccessContext,
    ) -> Result<Decision<M::Mpdu>, SchedulerError> {
        let verbosity = self.config.verbosity;
        let head = mac.peek_head(ctx.link_id, ctx.primary_ac);

        if let Some(mpdu) = &head {
            if !mac.he_supported(mpdu.receiver()) {
                log_changes!(verbosity, "Head frame receiver {} is not HE: SU_TX", mpdu.receiver());
                return Ok(Decision {
                    ctx,
                    plan: Plan::Su,
                    trigger_built: None,
                });
            }
        }

        let last_format = self.last_tx_format(ctx.link_id);
        let enable_ul = self.config.enable_ul_ofdma;
        let attempt = if enable_ul
            && self.config.enable_bsrp
            && (last_format == TxFormat::DlMu || head.is_none())
        {
            Some((TriggerKind::Bsrp, self.try_bsrp(mac, &ctx)?))
        } else if enable_ul
            && (last_format == TxFormat::DlMu
                || self.last_trigger == Some(TriggerKind::Bsrp)
                || head.is_none())
        {
            Some((TriggerKind::Basic, self.try_basic(mac, &ctx)?))
        } else {
            None
        };

        let decision = match attempt {
            Some((kind, Attempt::Committed(plan))) => {
                let trigger_built = matches!(plan, Plan::UlMu(_)).then_some(kind);
                Decision {
                    ctx,
                    plan,
                    trigger_built,
                }
            }
            Some((kind, Attempt::Abstain)) => Decision {
                ctx,
                plan: Plan::NoTx,
                trigger_built: Some(kind),
            },
            Some((_, Attempt::TryNext)) | None => Decision {
                ctx,
                plan: self.try_dl_mu_ppdu(mac, &ctx, head.as_ref())?,
                trigger_built: None,
            },
        };

        log_changes!(
            verbosity,
            link = ctx.link_id,
            "Selected {} for {} station(s)",
            decision.tx_format(),
            decision.candidate_aids().len()
        );
        Ok(decision)
    }

    /// Apply a decision: record it as the previous opportunity and, for MU
    /// formats, build what is transmitted and charge the ledger.
    pub fn commit<M: ApMac>(
        &mut self,
        mac: &mut M,
        decision: Decision<M::Mpdu>,
    ) -> Result<CommitOutcome<M::Mpdu>, SchedulerError> {
        let format = decision.tx_format();
        let Decision {
            ctx,
            plan,
            trigger_built,
        } = decision;

        let outcome = match plan {
            Plan::Su => CommitOutcome::Su,
            Plan::NoTx => CommitOutcome::NoTx,
            Plan::DlMu(dl) => CommitOutcome::DlMu(self.commit_dl(mac, &ctx, dl)?),
            Plan::UlMu(pending) => CommitOutcome::UlMu(self.commit_ul(pending)?),
        };

        // An abstention keeps the previous format so the same attempt is retried
        if format != TxFormat::NoTx {
            self.last_format.insert(ctx.link_id, format);
        }
        if trigger_built.is_some() {
            self.last_trigger = trigger_built;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Preamble;
    use crate::ru::RuType;
    use crate::test_support::{associate_all, FakeMac};
    use chrono::TimeDelta;

    fn scheduler(config: SchedulerConfig, mac: &FakeMac) -> RrMuScheduler {
        let mut scheduler = RrMuScheduler::new(config).unwrap();
        associate_all(&mut scheduler, mac);
        scheduler
    }

    fn dl_only() -> SchedulerConfig {
        SchedulerConfig {
            enable_ul_ofdma: false,
            ..SchedulerConfig::default()
        }
    }

    fn snapshot(list: &StationList) -> Vec<StationRecord> {
        list.iter().cloned().collect()
    }

    fn be_20mhz() -> AccessContext {
        AccessContext::new(0, AccessCategory::BestEffort, 20)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = SchedulerConfig {
            n_stations: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            RrMuScheduler::new(config),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_no_stations_is_su_on_both_paths() {
        let mac = FakeMac::with_stations(0);

        // head-less opportunity: the BSRP attempt runs and finds an empty list
        let s = scheduler(SchedulerConfig::default(), &mac);
        assert_eq!(s.select_tx_format(&mac, be_20mhz()).unwrap().plan, Plan::Su);

        let s = scheduler(
            SchedulerConfig {
                enable_bsrp: false,
                ..SchedulerConfig::default()
            },
            &mac,
        );
        assert_eq!(s.select_tx_format(&mac, be_20mhz()).unwrap().plan, Plan::Su);

        let s = scheduler(dl_only(), &mac);
        assert_eq!(s.select_tx_format(&mac, be_20mhz()).unwrap().plan, Plan::Su);
    }

    #[test]
    fn test_four_stations_share_20mhz() {
        let mut mac = FakeMac::with_stations(4);
        for aid in 1..=4 {
            mac.enqueue(aid, 0, 400);
        }
        let mut s = scheduler(dl_only(), &mac);

        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(decision.tx_format(), TxFormat::DlMu);
        assert_eq!(decision.candidate_aids(), vec![1, 2, 3, 4]);

        let CommitOutcome::DlMu(info) = s.commit(&mut mac, decision).unwrap() else {
            panic!("expected a DL MU commit");
        };
        let rus: Vec<_> = info
            .tx_params
            .tx_vector
            .user_info
            .values()
            .map(|u| u.ru.unwrap())
            .collect();
        assert_eq!(rus.len(), 4);
        assert!(rus.iter().all(|ru| ru.ru_type == RuType::Ru52Tone));
        let mut indices: Vec<usize> = rus.iter().map(|ru| ru.index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert_eq!(info.psdu_map.len(), 4);
        assert_eq!(s.last_tx_format(0), TxFormat::DlMu);
    }

    #[test]
    fn test_decision_is_idempotent() {
        let mut mac = FakeMac::with_stations(6);
        for aid in 1..=6 {
            mac.enqueue(aid, 0, 300);
        }
        let s = scheduler(dl_only(), &mac);
        let before: Vec<_> = AccessCategory::ALL
            .iter()
            .map(|&ac| snapshot(s.dl_list(ac)))
            .collect();

        let first = s.select_tx_format(&mac, be_20mhz()).unwrap();
        let second = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(first, second);

        let after: Vec<_> = AccessCategory::ALL
            .iter()
            .map(|&ac| snapshot(s.dl_list(ac)))
            .collect();
        assert_eq!(before, after);
        assert_eq!(s.last_tx_format(0), TxFormat::Su);
    }

    #[test]
    fn test_fairness_over_many_rounds() {
        let mut mac = FakeMac::with_stations(4);
        for aid in 1..=4 {
            mac.enqueue(aid, 0, 1000);
        }
        let mut s = scheduler(
            SchedulerConfig {
                n_stations: 2,
                ..dl_only()
            },
            &mac,
        );

        let mut served: FxHashMap<Aid, usize> = FxHashMap::default();
        for _ in 0..1000 {
            let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
            let CommitOutcome::DlMu(info) = s.commit(&mut mac, decision).unwrap() else {
                panic!("expected a DL MU commit");
            };
            for aid in info.psdu_map.keys() {
                *served.entry(*aid).or_default() += 1;
            }

            let tx_duration = info.tx_params.tx_duration.unwrap();
            let list = s.dl_list(AccessCategory::BestEffort);
            let max = list.iter().map(|sta| sta.credits).max().unwrap();
            let min = list.iter().map(|sta| sta.credits).min().unwrap();
            assert!(max - min <= tx_duration);
        }

        for aid in 1..=4 {
            let n = served[&aid];
            assert!((490..=510).contains(&n), "AID {} served {} times", aid, n);
        }
    }

    #[test]
    fn test_ul_attempt_precedence() {
        let mut mac = FakeMac::with_stations(2);
        let mut s = scheduler(SchedulerConfig::default(), &mac);

        // nothing queued: sound first
        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(decision.trigger_built, Some(TriggerKind::Bsrp));
        assert_eq!(decision.tx_format(), TxFormat::UlMu);
        s.commit(&mut mac, decision).unwrap();
        assert_eq!(s.last_trigger(), Some(TriggerKind::Bsrp));

        // a BSRP exchange is followed by a Basic trigger even with DL traffic
        mac.enqueue(1, 0, 300);
        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(decision.trigger_built, Some(TriggerKind::Basic));
        let Plan::UlMu(pending) = &decision.plan else {
            panic!("expected a UL MU plan");
        };
        assert_eq!(pending.trigger.kind, TriggerKind::Basic);
        s.commit(&mut mac, decision).unwrap();

        // then DL traffic gets its turn
        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(decision.tx_format(), TxFormat::DlMu);
        s.commit(&mut mac, decision).unwrap();

        // and after a DL MU PPDU the stations are polled again
        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(decision.trigger_built, Some(TriggerKind::Bsrp));
    }

    #[test]
    fn test_ul_without_candidates_falls_through_to_dl() {
        let mut mac = FakeMac::with_stations(2);
        for aid in 1..=2 {
            mac.station_mut(aid).ba_recipient.clear();
        }
        let s = scheduler(SchedulerConfig::default(), &mac);
        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(decision.plan, Plan::Su);
        assert_eq!(decision.trigger_built, None);

        let forced = scheduler(
            SchedulerConfig {
                force_dl_ofdma: true,
                ..SchedulerConfig::default()
            },
            &mac,
        );
        assert_eq!(
            forced.select_tx_format(&mac, be_20mhz()).unwrap().plan,
            Plan::NoTx
        );
    }

    #[test]
    fn test_abstain_still_records_trigger_kind() {
        let mut mac = FakeMac::with_stations(2);
        let mut s = scheduler(SchedulerConfig::default(), &mac);

        let tight = be_20mhz().with_available_time(TimeDelta::microseconds(120));
        let decision = s.select_tx_format(&mac, tight).unwrap();
        assert_eq!(decision.plan, Plan::NoTx);
        assert_eq!(decision.trigger_built, Some(TriggerKind::Bsrp));
        assert_eq!(s.commit(&mut mac, decision).unwrap(), CommitOutcome::NoTx);
        assert_eq!(s.last_tx_format(0), TxFormat::Su);
        assert_eq!(s.last_trigger(), Some(TriggerKind::Bsrp));

        mac.enqueue(2, 0, 300);
        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(decision.trigger_built, Some(TriggerKind::Basic));
    }

    #[test]
    fn test_abstained_bsrp_after_dl_mu_is_retried() {
        let mut mac = FakeMac::with_stations(2);
        for aid in 1..=2 {
            mac.enqueue(aid, 0, 300);
        }
        let mut s = scheduler(SchedulerConfig::default(), &mac);

        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(decision.tx_format(), TxFormat::DlMu);
        s.commit(&mut mac, decision).unwrap();

        let tight = be_20mhz().with_available_time(TimeDelta::microseconds(120));
        let decision = s.select_tx_format(&mac, tight).unwrap();
        assert_eq!(decision.plan, Plan::NoTx);
        assert_eq!(decision.trigger_built, Some(TriggerKind::Bsrp));
        s.commit(&mut mac, decision).unwrap();
        assert_eq!(s.last_tx_format(0), TxFormat::DlMu);

        // no Basic trigger before the stations were polled
        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(decision.trigger_built, Some(TriggerKind::Bsrp));
        assert_eq!(decision.tx_format(), TxFormat::UlMu);
    }

    #[test]
    fn test_failed_commit_leaves_bookkeeping_untouched() {
        let mut mac = FakeMac::with_stations(2);
        for aid in 1..=2 {
            mac.enqueue(aid, 0, 300);
        }
        let mut s = scheduler(dl_only(), &mac);
        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        assert_eq!(decision.tx_format(), TxFormat::DlMu);
        let before = snapshot(s.dl_list(AccessCategory::BestEffort));

        mac.ppdu_limit = Some(TimeDelta::microseconds(1));
        assert!(matches!(
            s.commit(&mut mac, decision),
            Err(SchedulerError::FrameNoLongerFits(_))
        ));
        assert_eq!(s.last_tx_format(0), TxFormat::Su);
        assert_eq!(snapshot(s.dl_list(AccessCategory::BestEffort)), before);
    }

    #[test]
    fn test_non_he_head_receiver_is_su() {
        let mut mac = FakeMac::with_stations(3);
        mac.station_mut(3).he = false;
        let s = scheduler(SchedulerConfig::default(), &mac);
        mac.enqueue(3, 0, 300);
        mac.enqueue(1, 0, 300);
        assert_eq!(s.select_tx_format(&mac, be_20mhz()).unwrap().plan, Plan::Su);
    }

    #[test]
    fn test_association_lifecycle() {
        let mut mac = FakeMac::with_stations(3);
        mac.station_mut(3).he = false;
        let mut s = scheduler(SchedulerConfig::default(), &mac);
        associate_all(&mut s, &mac);

        for ac in AccessCategory::ALL {
            assert_eq!(s.dl_list(ac).len(), 2);
        }
        assert_eq!(s.ul_list().len(), 2);

        // another link of the device is still associated
        let address = mac.station(1).address;
        s.notify_station_deassociated(&mac, 1, address).unwrap();
        assert!(s.ul_list().contains(1));

        mac.station_mut(1).associated = false;
        s.notify_station_deassociated(&mac, 1, address).unwrap();
        assert!(!s.ul_list().contains(1));
        for ac in AccessCategory::ALL {
            assert!(!s.dl_list(ac).contains(1));
            assert!(s.dl_list(ac).contains(2));
        }
    }

    #[test]
    fn test_unknown_aid_on_association_is_an_error() {
        let mac = FakeMac::with_stations(1);
        let mut s = RrMuScheduler::new(SchedulerConfig::default()).unwrap();
        let address = mac.station(1).address;
        assert_eq!(
            s.notify_station_associated(&mac, 99, address),
            Err(SchedulerError::AidNotFound(99))
        );
        assert!(s.ul_list().is_empty());
    }

    #[test]
    fn test_eht_stations_get_eht_mu_ppdu() {
        let mut mac = FakeMac::with_stations(2);
        mac.ap_eht = true;
        mac.station_mut(1).eht = true;
        mac.station_mut(2).eht = true;
        for aid in 1..=2 {
            mac.enqueue(aid, 0, 300);
        }
        let mut s = scheduler(dl_only(), &mac);
        let decision = s.select_tx_format(&mac, be_20mhz()).unwrap();
        let CommitOutcome::DlMu(info) = s.commit(&mut mac, decision).unwrap() else {
            panic!("expected a DL MU commit");
        };
        assert_eq!(info.tx_params.tx_vector.preamble, Preamble::EhtMu);
    }
}
