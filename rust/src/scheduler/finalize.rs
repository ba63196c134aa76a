//! Binding of concrete RUs once the final candidate count is known.

use std::collections::BTreeMap;

use crate::models::{Aid, Candidate, MuUserInfo, TxVector};
use crate::ru::{central_26_tone_rus, equal_sized_rus, rus_of_type, RuType};
use crate::{log_changes, log_debug};

use super::core::SchedulerError;

/// Re-partition the channel for the candidates actually collected and bind
/// one RU per candidate, main-size RUs first and central 26-tone RUs after.
///
/// Candidates beyond the bound RUs are dropped from both `candidates` and the
/// TXVECTOR. Rates chosen during selection are kept.
pub(crate) fn finalize_tx_vector<F>(
    tx_vector: &mut TxVector,
    candidates: &mut Vec<Candidate<F>>,
    use_central_26_tones_rus: bool,
    verbosity: u8,
) -> Result<(), SchedulerError> {
    if tx_vector.user_info.len() != candidates.len() {
        return Err(SchedulerError::CandidateMismatch {
            candidates: candidates.len(),
            users: tx_vector.user_info.len(),
        });
    }

    let width = tx_vector.channel_width;
    let partition = equal_sized_rus(width, candidates.len())?;
    let n_rus = partition.n_rus;
    let n_central = if !use_central_26_tones_rus || candidates.len() == n_rus {
        0
    } else {
        (candidates.len() - n_rus).min(partition.n_central_26)
    };
    log_changes!(
        verbosity,
        "Final schedule: {} x {} RU, {} central 26-tone RU(s)",
        n_rus,
        partition.ru_type,
        n_central
    );

    let previous = std::mem::take(&mut tx_vector.user_info);
    let mut main_rus = rus_of_type(width, partition.ru_type)?.into_iter();
    let mut central_rus = central_26_tone_rus(width, partition.ru_type)?.into_iter();

    let mut bound = BTreeMap::new();
    for (i, candidate) in candidates.iter().take(n_rus + n_central).enumerate() {
        let info = previous
            .get(&candidate.aid)
            .ok_or(SchedulerError::AidNotFound(candidate.aid))?;
        let ru = if i < n_rus {
            main_rus.next()
        } else {
            central_rus.next()
        }
        .ok_or(SchedulerError::RuExhausted)?;
        log_debug!(verbosity, aid = candidate.aid, "bound RU {:?}", ru);
        bound.insert(
            candidate.aid,
            MuUserInfo {
                ru: Some(ru),
                mcs: info.mcs,
                nss: info.nss,
            },
        );
    }

    tx_vector.user_info = bound;
    candidates.truncate(n_rus + n_central);
    Ok(())
}

/// RU type granted to every user of a finalized TXVECTOR.
pub(crate) fn served_rus(tx_vector: &TxVector) -> Result<Vec<(Aid, RuType)>, SchedulerError> {
    tx_vector
        .user_info
        .iter()
        .map(|(&aid, info)| {
            info.ru_type()
                .map(|ru_type| (aid, ru_type))
                .ok_or(SchedulerError::UnboundRu(aid))
        })
        .collect()
}
