//! Values passed between a scheduling decision and its commit.

use chrono::TimeDelta;
use std::collections::BTreeMap;

use crate::models::{AccessCategory, Aid, Candidate, TxFormat, TxParams, TxVector};
use crate::ru::RuType;
use crate::trigger::{TriggerFrame, TriggerHeader, TriggerKind};

/// Per-opportunity context handed to the scheduler by the channel access
/// function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessContext {
    pub link_id: u8,
    /// AC that gained channel access
    pub primary_ac: AccessCategory,
    /// Channel width (MHz) usable for this opportunity
    pub allowed_width: u16,
    /// Remaining TXOP time, `None` when no limit applies
    pub available_time: Option<TimeDelta>,
    /// Whether the first frame of the TXOP is being built
    pub initial_frame: bool,
}

impl AccessContext {
    pub fn new(link_id: u8, primary_ac: AccessCategory, allowed_width: u16) -> Self {
        Self {
            link_id,
            primary_ac,
            allowed_width,
            available_time: None,
            initial_frame: false,
        }
    }

    pub fn with_available_time(mut self, available_time: TimeDelta) -> Self {
        self.available_time = Some(available_time);
        self
    }

    pub fn with_initial_frame(mut self, initial_frame: bool) -> Self {
        self.initial_frame = initial_frame;
        self
    }

    /// Budget applied to DL frames. The first frame of a TXOP may exceed the
    /// TXOP limit as long as it is a single MPDU per receiver.
    pub fn dl_budget(&self) -> Option<TimeDelta> {
        if self.initial_frame {
            None
        } else {
            self.available_time
        }
    }
}

/// Outcome of one UL attempt inside the format selector.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Attempt<T> {
    /// A terminal result
    Committed(T),
    /// Not now: the exchange does not fit this opportunity
    Abstain,
    /// No suitable station, try the next format
    TryNext,
}

/// Statistics of one UL candidate selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UlScheduleStats {
    /// Stations in the UL list
    pub list_size: usize,
    /// Stations skipped because they could not be solicited
    pub unsolicited: usize,
    /// RUs targeted by the first partition
    pub target: usize,
    /// Candidates collected before finalization
    pub initial_candidates: usize,
    /// Candidates left after finalization
    pub finalized: usize,
}

/// A ledger update deferred to commit time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreditCharge {
    pub duration: TimeDelta,
    pub served: Vec<(Aid, RuType)>,
}

/// A trigger-based UL exchange ready to be sent.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingSolicitation {
    pub trigger: TriggerFrame,
    pub header: TriggerHeader,
    /// Timing of the trigger frame itself
    pub tx_params: TxParams,
    /// TXVECTOR the solicited stations use for their TB PPDUs
    pub tb_tx_vector: TxVector,
    /// TB PPDU duration encoded in the trigger's UL Length
    pub granted_duration: TimeDelta,
    pub credit_charge: Option<CreditCharge>,
    pub stats: UlScheduleStats,
}

/// A DL MU PPDU whose RUs are still to be bound.
#[derive(Clone, Debug, PartialEq)]
pub struct DlMuPlan<F> {
    pub primary_ac: AccessCategory,
    pub tx_params: TxParams,
    pub candidates: Vec<Candidate<F>>,
}

/// What to do with the current opportunity.
#[derive(Clone, Debug, PartialEq)]
pub enum Plan<F> {
    Su,
    NoTx,
    DlMu(DlMuPlan<F>),
    UlMu(PendingSolicitation),
}

/// Result of the decision step, consumed by exactly one commit.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision<F> {
    pub ctx: AccessContext,
    pub plan: Plan<F>,
    /// Kind of trigger built while deciding, if any
    pub trigger_built: Option<TriggerKind>,
}

impl<F> Decision<F> {
    pub fn tx_format(&self) -> TxFormat {
        match self.plan {
            Plan::Su => TxFormat::Su,
            Plan::NoTx => TxFormat::NoTx,
            Plan::DlMu(_) => TxFormat::DlMu,
            Plan::UlMu(_) => TxFormat::UlMu,
        }
    }

    /// AIDs of the stations selected for an MU transmission.
    pub fn candidate_aids(&self) -> Vec<Aid> {
        match &self.plan {
            Plan::DlMu(dl) => dl.candidates.iter().map(|c| c.aid).collect(),
            Plan::UlMu(ul) => ul.trigger.aids().collect(),
            Plan::Su | Plan::NoTx => Vec::new(),
        }
    }
}

/// PSDU sent to one station in a DL MU PPDU.
#[derive(Clone, Debug, PartialEq)]
pub enum Psdu<F> {
    Single(F),
    Ampdu(Vec<F>),
}

impl<F> Psdu<F> {
    pub fn n_mpdus(&self) -> usize {
        match self {
            Psdu::Single(_) => 1,
            Psdu::Ampdu(mpdus) => mpdus.len(),
        }
    }
}

/// Product of committing a DL MU decision.
#[derive(Clone, Debug, PartialEq)]
pub struct DlMuInfo<F> {
    pub psdu_map: BTreeMap<Aid, Psdu<F>>,
    pub tx_params: TxParams,
}

/// Product of committing a UL MU decision.
#[derive(Clone, Debug, PartialEq)]
pub struct UlMuInfo {
    pub trigger: TriggerFrame,
    pub header: TriggerHeader,
    pub tx_params: TxParams,
    pub granted_duration: TimeDelta,
}

/// What the caller transmits after a commit.
#[derive(Clone, Debug, PartialEq)]
pub enum CommitOutcome<F> {
    Su,
    NoTx,
    DlMu(DlMuInfo<F>),
    UlMu(UlMuInfo),
}
