//! Condorcet pairwise comparison.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::*;
use crate::{check_ballots, check_registry, registered};

/// One row of the pairwise matrix.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseRow {
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    /// For each opponent, the number of voters ranking this candidate above the opponent.
    pub matchups: BTreeMap<CandidateId, u64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CondorcetCandidateResult {
    pub id: CandidateId,
    pub name: String,
    pub party: String,
    pub color: String,
    /// Number of opponents beaten head-to-head.
    pub pairwise_wins: u32,
    pub is_condorcet_winner: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CondorcetResult {
    /// By decreasing number of pairwise wins, then registry order.
    pub results: Vec<CondorcetCandidateResult>,
    pub condorcet_winner: Option<CandidateId>,
    pub has_paradox: bool,
    /// Registry order.
    pub pairwise_matrix: Vec<PairwiseRow>,
}

impl CondorcetResult {
    /// The number of voters preferring `i` over `j`.
    pub fn beats(&self, i: CandidateId, j: CandidateId) -> u64 {
        self.pairwise_matrix
            .iter()
            .find(|row| row.candidate_id == i)
            .and_then(|row| row.matchups.get(&j))
            .cloned()
            .unwrap_or(0)
    }
}

/// Looks for a candidate that beats every other candidate head-to-head.
///
/// A candidate ranked anywhere above another on a ballot is preferred to it
/// (not only when adjacent). Unranked candidates are not compared against
/// each other. A pairwise tie is not a win.
pub fn resolve_condorcet(
    registry: &Registry,
    ballots: &BallotSet,
) -> Result<CondorcetResult, VotingErrors> {
    check_registry(registry)?;
    check_ballots(registry, ballots)?;
    info!(
        "resolve_condorcet: {} candidates, {} ballots",
        registry.len(),
        ballots.len()
    );

    // beats[i][j] over registry positions
    let n = registry.len();
    let mut beats: Vec<Vec<u64>> = vec![vec![0; n]; n];
    for ballot in ballots.iter() {
        let positions: Vec<usize> = ballot
            .preferences
            .iter()
            .filter_map(|cid| registry.position(*cid))
            .collect();
        for (idx, i) in positions.iter().enumerate() {
            for j in positions[idx + 1..].iter() {
                beats[*i][*j] += ballot.count;
            }
        }
    }

    let order: Vec<CandidateId> = registry.candidates().iter().map(|c| c.id).collect();
    let wins: Vec<u32> = (0..n)
        .map(|i| (0..n).filter(|j| i != *j && beats[i][*j] > beats[*j][i]).count() as u32)
        .collect();
    debug!("resolve_condorcet: pairwise wins: {:?}", wins);
    let condorcet_winner = (0..n)
        .find(|i| wins[*i] as usize == n - 1)
        .map(|i| order[i]);
    let has_paradox = condorcet_winner.is_none();
    if has_paradox {
        info!("resolve_condorcet: no Condorcet winner, the preferences form a cycle");
    }

    let mut results: Vec<CondorcetCandidateResult> = Vec::new();
    let mut pairwise_matrix: Vec<PairwiseRow> = Vec::new();
    for (i, cid) in order.iter().enumerate() {
        let c = registered(registry, *cid)?;
        results.push(CondorcetCandidateResult {
            id: *cid,
            name: c.name.clone(),
            party: c.party_name.clone(),
            color: c.color.clone(),
            pairwise_wins: wins[i],
            is_condorcet_winner: condorcet_winner == Some(*cid),
        });
        pairwise_matrix.push(PairwiseRow {
            candidate_id: *cid,
            candidate_name: c.name.clone(),
            matchups: order
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, opp)| (*opp, beats[i][j]))
                .collect(),
        });
    }

    results.sort_by(|a, b| b.pairwise_wins.cmp(&a.pairwise_wins));

    Ok(CondorcetResult {
        results,
        condorcet_winner,
        has_paradox,
        pairwise_matrix,
    })
}
