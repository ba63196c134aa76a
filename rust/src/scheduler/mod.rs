//! Round-robin OFDMA multi-user scheduler.
//!
//! A transmit opportunity is handled in two steps. [`RrMuScheduler::select_tx_format`]
//! inspects the fairness ledgers and the access point state and returns a
//! [`Decision`] without mutating anything, so it can be repeated freely.
//! [`RrMuScheduler::commit`] then charges the ledgers, pulls the frames from
//! the queues and records the format for the next opportunity.

mod core;
mod downlink;
mod finalize;
mod state;
mod uplink;

pub use core::{RrMuScheduler, SchedulerError};
pub use state::{
    AccessContext, CommitOutcome, CreditCharge, Decision, DlMuInfo, DlMuPlan, PendingSolicitation,
    Plan, Psdu, UlMuInfo, UlScheduleStats,
};
