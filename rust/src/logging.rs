//! Logging macros for the scheduler with verbosity level control.
//!
//! Nothing is emitted below the configured verbosity; above it, events go to
//! `tracing` under the `ofdma_scheduler` target.
//! - 0: SILENT (only errors)
//! - 1: CHANGES (format decisions, candidate admissions, credit updates)
//! - 2: CHECKS (skip reasons, eligibility, timing rejections)
//! - 3: DEBUG (RU partition internals, per-station durations)

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: selected TX format, admitted candidates, ledger updates.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            ::tracing::info!(target: "ofdma_scheduler", $($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: station skip reasons, eligibility checks, budget rejections.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            ::tracing::debug!(target: "ofdma_scheduler", $($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
///
/// Used for: RU partitions, TID probe sets, per-station durations.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            ::tracing::trace!(target: "ofdma_scheduler", $($arg)*);
        }
    };
}

/// Install an env-filtered `fmt` subscriber unless one is already set.
///
/// Embedders that configure their own subscriber never need to call this.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
