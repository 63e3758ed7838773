//! Borda count.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::config::*;
use crate::{check_ballots, check_registry, checked_total, registered};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BordaCandidateResult {
    pub id: CandidateId,
    pub name: String,
    pub party: String,
    pub color: String,
    pub points: u64,
    pub winner: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BordaResult {
    /// All the candidates, by decreasing number of points.
    pub results: Vec<BordaCandidateResult>,
    pub winner: CandidateId,
    pub total_points: u64,
    /// True if several candidates share the highest score.
    pub tie_detected: bool,
}

/// Scores the ballots with the Borda count.
///
/// With `n` registered candidates, the preference at (0-based) rank `r` of a
/// ballot is worth `n - 1 - r` points, multiplied by the count of the ballot.
/// Unranked candidates get nothing from that ballot.
pub fn score_borda(
    registry: &Registry,
    ballots: &BallotSet,
    tiebreak_mode: TieBreakMode,
) -> Result<BordaResult, VotingErrors> {
    check_registry(registry)?;
    check_ballots(registry, ballots)?;
    let n = registry.len() as u64;
    info!(
        "score_borda: {} candidates, {} ballots",
        registry.len(),
        ballots.len()
    );

    let mut points: BTreeMap<CandidateId, u64> = registry
        .candidates()
        .iter()
        .map(|c| (c.id, 0))
        .collect();
    for ballot in ballots.iter() {
        for (rank, cid) in ballot.preferences.iter().enumerate() {
            // A ballot without duplicates has at most n preferences.
            let value = n - 1 - rank as u64;
            let entry = points.entry(*cid).or_insert(0);
            *entry = value
                .checked_mul(ballot.count)
                .and_then(|p| p.checked_add(*entry))
                .context(InvalidInputSnafu {
                    reason: format!("the points of candidate {} are too large", cid),
                })?;
        }
    }
    debug!("score_borda: points: {:?}", points);

    let mut order: Vec<CandidateId> = registry.candidates().iter().map(|c| c.id).collect();
    order.sort_by(|a, b| {
        points[b].cmp(&points[a]).then_with(|| {
            tiebreak_mode
                .rank(a.0, registry.position(*a), 1)
                .cmp(&tiebreak_mode.rank(b.0, registry.position(*b), 1))
        })
    });
    // The registry is not empty.
    let winner = order[0];
    let tie_detected = order
        .get(1)
        .map(|second| points[second] == points[&winner])
        .unwrap_or(false);
    if tie_detected {
        debug!("score_borda: several candidates tied at {} points", points[&winner]);
    }

    let mut results: Vec<BordaCandidateResult> = Vec::new();
    for cid in order.iter() {
        let c = registered(registry, *cid)?;
        results.push(BordaCandidateResult {
            id: *cid,
            name: c.name.clone(),
            party: c.party_name.clone(),
            color: c.color.clone(),
            points: points[cid],
            winner: *cid == winner,
        });
    }

    let total_points = checked_total(points.values().cloned(), "the points")?;
    Ok(BordaResult {
        results,
        winner,
        total_points,
        tie_detected,
    })
}
