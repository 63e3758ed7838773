//! Highest-averages seat allocation, and the national party-list election
//! built on top of it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::checked_total;
use crate::config::*;
use crate::tiebreak::{report_lot, resolve_tie};

/// A seat awarded by the allocator.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AllocationStep {
    /// 1-based.
    pub seat: u32,
    pub party_id: PartyId,
    /// The winning quotient, votes / divisor.
    pub quotient: f64,
    pub tie_broken: bool,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeatAllocation {
    /// Every party with positive votes, including the ones without seats.
    pub seats: BTreeMap<PartyId, u32>,
    /// In the order the seats were awarded.
    pub steps: Vec<AllocationStep>,
}

impl SeatAllocation {
    pub fn seats_for(&self, party: PartyId) -> u32 {
        self.seats.get(&party).cloned().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.seats.values().sum()
    }
}

/// Allocates `seats` seats between parties with a highest-averages method.
///
/// The seats are awarded one at a time to the party with the highest
/// quotient `votes / divisor(seats already won)`. Quotients are compared
/// exactly. Parties without votes never get a seat: if no party has votes,
/// nothing is allocated.
///
/// For [TieBreakMode::UseCandidateOrder], parties are not ordered here and the
/// lowest id wins. Use [run_party_list] to order them by registry.
pub fn allocate_seats(
    votes: &BTreeMap<PartyId, u64>,
    seats: u32,
    method: AllocationMethod,
    tiebreak_mode: TieBreakMode,
) -> SeatAllocation {
    allocate_seats_by(votes, seats, method, tiebreak_mode, |_| None)
}

fn compare_quotients(a: (u64, u64), b: (u64, u64)) -> Ordering {
    (a.0 as u128 * b.1 as u128).cmp(&(b.0 as u128 * a.1 as u128))
}

/// `position` gives the registry position of a party, for the tie-break.
pub(crate) fn allocate_seats_by(
    votes: &BTreeMap<PartyId, u64>,
    seats: u32,
    method: AllocationMethod,
    tiebreak_mode: TieBreakMode,
    position: impl Fn(PartyId) -> Option<usize>,
) -> SeatAllocation {
    let mut won: BTreeMap<PartyId, u32> = votes
        .iter()
        .filter(|(_, v)| **v > 0)
        .map(|(pid, _)| (*pid, 0))
        .collect();
    let mut steps: Vec<AllocationStep> = Vec::new();

    for seat in 1..=seats {
        let mut best: Option<(u64, u64)> = None;
        let mut leaders: Vec<PartyId> = Vec::new();
        for (pid, count) in won.iter() {
            let q = (votes[pid], method.divisor(*count));
            match best.map(|b| compare_quotients(q, b)) {
                Some(Ordering::Less) => {}
                Some(Ordering::Equal) => leaders.push(*pid),
                _ => {
                    best = Some(q);
                    leaders = vec![*pid];
                }
            }
        }
        let (num, den) = match best {
            Some(q) => q,
            None => break,
        };
        let party = match resolve_tie(&leaders, |p| tiebreak_mode.rank(p.0, position(*p), seat)) {
            Some(p) => p,
            None => break,
        };
        report_lot(tiebreak_mode, "seat allocation", &leaders, &party);
        *won.entry(party).or_insert(0) += 1;
        debug!(
            "allocate_seats: seat {} to party {} (quotient {}/{})",
            seat, party, num, den
        );
        steps.push(AllocationStep {
            seat,
            party_id: party,
            quotient: num as f64 / den as f64,
            tie_broken: leaders.len() > 1,
        });
    }

    SeatAllocation { seats: won, steps }
}

/// The share of the vote that guarantees a seat without any legal threshold,
/// in percent: 100 / (seats + 1).
pub fn natural_threshold(seats: u32) -> f64 {
    100.0 / (seats as f64 + 1.0)
}

/// Loosemore–Hanby disproportionality index, in percentage points.
///
/// Takes one `(vote share, seat share)` pair per party, both in percent.
pub fn loosemore_hanby(shares: &[(f64, f64)]) -> f64 {
    0.5 * shares.iter().map(|(v, s)| (v - s).abs()).sum::<f64>()
}

pub(crate) fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PartyListRow {
    pub party_id: PartyId,
    pub party_name: String,
    pub color: String,
    pub votes: u64,
    /// Percent of all the votes.
    pub vote_share: f64,
    pub seats: u32,
    pub below_threshold: bool,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PartyListResult {
    /// By decreasing seats, then decreasing votes.
    pub results: Vec<PartyListRow>,
    pub allocation: SeatAllocation,
    pub total_votes: u64,
    pub total_seats: u32,
    pub threshold: f64,
    pub natural_threshold: f64,
    pub allocation_method: AllocationMethod,
    pub disproportionality: f64,
}

/// A national party-list proportional election.
///
/// The parties whose share of `party_votes` is below the threshold are left
/// out, and the seats are allocated between the others.
pub fn run_party_list(
    registry: &Registry,
    party_votes: &BTreeMap<PartyId, u64>,
    rules: &AllocationRules,
) -> Result<PartyListResult, VotingErrors> {
    ensure!(
        rules.seats >= 1,
        InvalidInputSnafu {
            reason: "at least one seat must be filled"
        }
    );
    ensure!(
        !party_votes.is_empty(),
        InvalidInputSnafu {
            reason: "no party votes"
        }
    );
    check_threshold(rules.threshold)?;

    let total_votes = checked_total(party_votes.values().cloned(), "the party votes")?;
    info!(
        "run_party_list: {} parties, {} votes, {} seats, threshold {}%",
        party_votes.len(),
        total_votes,
        rules.seats,
        rules.threshold
    );
    let qualifying: BTreeMap<PartyId, u64> = party_votes
        .iter()
        .filter(|(_, v)| percent(**v, total_votes) >= rules.threshold)
        .map(|(pid, v)| (*pid, *v))
        .collect();
    debug!("run_party_list: qualifying parties: {:?}", qualifying);
    let allocation = allocate_seats_by(
        &qualifying,
        rules.seats,
        rules.method,
        rules.tiebreak_mode,
        |pid| registry.party_position(pid),
    );

    let allocated = allocation.total();
    let mut results: Vec<PartyListRow> = party_votes
        .iter()
        .map(|(pid, v)| {
            let party = registry.party(*pid);
            PartyListRow {
                party_id: *pid,
                party_name: party.name,
                color: party.color,
                votes: *v,
                vote_share: percent(*v, total_votes),
                seats: allocation.seats_for(*pid),
                below_threshold: !qualifying.contains_key(pid),
            }
        })
        .collect();
    results.sort_by(|a, b| {
        b.seats
            .cmp(&a.seats)
            .then(b.votes.cmp(&a.votes))
            .then(a.party_id.cmp(&b.party_id))
    });
    let shares: Vec<(f64, f64)> = results
        .iter()
        .map(|r| (r.vote_share, percent(r.seats as u64, allocated as u64)))
        .collect();

    Ok(PartyListResult {
        results,
        total_votes,
        total_seats: allocated,
        threshold: rules.threshold,
        natural_threshold: natural_threshold(rules.seats),
        allocation_method: rules.method,
        disproportionality: loosemore_hanby(&shares),
        allocation,
    })
}
