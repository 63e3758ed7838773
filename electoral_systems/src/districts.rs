//! Assemblies that combine single-member districts with party-list seats.
//!
//! Each district elects one member by first-past-the-post. The list seats
//! are then given out with the highest-averages allocator, either to
//! compensate the district results (mixed-member proportional) or
//! independently of them (parallel voting).
//!
//! In MMP mode, a party that wins more districts than its proportional
//! entitlement keeps the extra seats as overhang. The assembly grows by the
//! overhang and the other parties get no levelling seats in return
//! (non-compensated overhang).

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::allocation::{allocate_seats_by, loosemore_hanby, percent, SeatAllocation};
use crate::config::*;
use crate::tiebreak::{report_lot, resolve_tie};
use crate::{check_registry, checked_total, registered};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DistrictOutcome {
    pub district_id: u32,
    pub district_name: String,
    pub winner_id: CandidateId,
    pub winner_name: String,
    pub party_id: PartyId,
    pub party_name: String,
    /// The votes of the winner.
    pub votes: u64,
    pub total_votes: u64,
    pub tie_broken: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DistrictTabulation {
    /// In the order of the input districts.
    pub district_winners: Vec<DistrictOutcome>,
    pub party_district_seats: BTreeMap<PartyId, u32>,
    pub total_districts: u32,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PartyResult {
    pub party_id: PartyId,
    pub party_name: String,
    pub color: String,
    pub party_votes: u64,
    /// Percent of all the party votes.
    pub vote_share: f64,
    pub district_seats: u32,
    pub list_seats: u32,
    /// MMP only: the proportional share of the whole assembly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitled_seats: Option<u32>,
    /// MMP only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overhang_seats: Option<u32>,
    pub total_seats: u32,
    pub below_threshold: bool,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MultiDistrictResult {
    pub mode: AssemblyMode,
    /// By decreasing total seats, then decreasing votes, then party id.
    pub party_results: Vec<PartyResult>,
    pub district_results: DistrictTabulation,
    /// The proportional allocation: entitlements for MMP, list seats for
    /// parallel voting.
    pub allocation: SeatAllocation,
    pub total_districts: u32,
    pub list_seats: u32,
    pub total_overhang: u32,
    pub assembly_size: u32,
    pub allocation_method: AllocationMethod,
    pub threshold: f64,
    pub disproportionality: f64,
}

fn check_districts(registry: &Registry, districts: &[District]) -> Result<(), VotingErrors> {
    let mut ids: HashSet<u32> = HashSet::new();
    for district in districts.iter() {
        let location = format!("district {}", district.id);
        ensure!(
            ids.insert(district.id),
            InvalidInputSnafu {
                reason: format!("{} is defined more than once", location),
            }
        );
        ensure!(
            !district.votes.is_empty(),
            InvalidInputSnafu {
                reason: format!("{} has no votes", location),
            }
        );
        for cid in district.candidates.iter().chain(district.votes.keys()) {
            ensure!(
                registry.contains(*cid),
                UnknownReferenceSnafu {
                    candidate: *cid,
                    referenced_by: location.clone(),
                }
            );
        }
        if !district.candidates.is_empty() {
            for cid in district.votes.keys() {
                ensure!(
                    district.candidates.contains(cid),
                    InvalidInputSnafu {
                        reason: format!(
                            "{} has votes for candidate {} who is not running there",
                            location, cid
                        ),
                    }
                );
            }
        }
    }
    Ok(())
}

/// Elects one member per district by first-past-the-post.
pub fn tabulate_districts(
    registry: &Registry,
    districts: &[District],
    tiebreak_mode: TieBreakMode,
) -> Result<DistrictTabulation, VotingErrors> {
    check_registry(registry)?;
    check_districts(registry, districts)?;

    let mut district_winners: Vec<DistrictOutcome> = Vec::new();
    let mut party_district_seats: BTreeMap<PartyId, u32> = BTreeMap::new();
    for district in districts.iter() {
        let contestants: Vec<CandidateId> = if district.candidates.is_empty() {
            district.votes.keys().cloned().collect()
        } else {
            district.candidates.clone()
        };
        let votes_of = |cid: &CandidateId| district.votes.get(cid).cloned().unwrap_or(0);
        let max_votes = contestants.iter().map(votes_of).max().unwrap_or(0);
        let leaders: Vec<CandidateId> = contestants
            .iter()
            .filter(|cid| votes_of(*cid) == max_votes)
            .cloned()
            .collect();
        let winner_id = resolve_tie(&leaders, |cid| {
            tiebreak_mode.rank(cid.0, registry.position(*cid), district.id)
        })
        .context(InvalidInputSnafu {
            reason: format!("district {} has no candidates", district.id),
        })?;
        report_lot(tiebreak_mode, &district.name, &leaders, &winner_id);
        let winner = registered(registry, winner_id)?;
        let total_votes = checked_total(district.votes.values().cloned(), &district.name)?;
        debug!(
            "tabulate_districts: district {} won by {} with {} votes",
            district.id, winner_id, max_votes
        );
        *party_district_seats.entry(winner.party_id).or_insert(0) += 1;
        district_winners.push(DistrictOutcome {
            district_id: district.id,
            district_name: district.name.clone(),
            winner_id,
            winner_name: winner.name.clone(),
            party_id: winner.party_id,
            party_name: winner.party_name.clone(),
            votes: max_votes,
            total_votes,
            tie_broken: leaders.len() > 1,
        });
    }

    Ok(DistrictTabulation {
        district_winners,
        party_district_seats,
        total_districts: districts.len() as u32,
    })
}

/// Runs an election for an assembly of district and list seats.
///
/// Arguments:
/// * `registry` the candidates of all the districts, and the parties
/// * `districts` the single-member districts
/// * `party_votes` the national list votes of each party
/// * `rules` the mode, the number of list seats, the allocation method and
///   the legal threshold
pub fn run_multi_district(
    registry: &Registry,
    districts: &[District],
    party_votes: &BTreeMap<PartyId, u64>,
    rules: &MultiDistrictRules,
) -> Result<MultiDistrictResult, VotingErrors> {
    ensure!(
        !districts.is_empty(),
        InvalidInputSnafu {
            reason: "at least one district is required"
        }
    );
    check_threshold(rules.threshold)?;
    let tabulation = tabulate_districts(registry, districts, rules.tiebreak_mode)?;

    let total_districts = tabulation.total_districts;
    let total_votes = checked_total(party_votes.values().cloned(), "the party votes")?;
    info!(
        "run_multi_district: {:?}, {} districts, {} list seats, {} party votes",
        rules.mode, total_districts, rules.list_seats, total_votes
    );
    let qualifying: BTreeMap<PartyId, u64> = party_votes
        .iter()
        .filter(|(_, v)| percent(**v, total_votes) >= rules.threshold)
        .map(|(pid, v)| (*pid, *v))
        .collect();
    debug!("run_multi_district: qualifying parties: {:?}", qualifying);

    let seats_to_allocate = match rules.mode {
        AssemblyMode::Mmp => total_districts + rules.list_seats,
        AssemblyMode::Parallel => rules.list_seats,
    };
    let allocation = allocate_seats_by(
        &qualifying,
        seats_to_allocate,
        rules.method,
        rules.tiebreak_mode,
        |pid| registry.party_position(pid),
    );

    let parties: BTreeSet<PartyId> = party_votes
        .keys()
        .chain(tabulation.party_district_seats.keys())
        .cloned()
        .collect();
    let mut party_results: Vec<PartyResult> = Vec::new();
    let mut total_overhang = 0;
    for pid in parties.into_iter() {
        let party = registry.party(pid);
        let votes = party_votes.get(&pid).cloned().unwrap_or(0);
        let district_seats = tabulation
            .party_district_seats
            .get(&pid)
            .cloned()
            .unwrap_or(0);
        let allocated = allocation.seats_for(pid);
        let (list_seats, entitled_seats, overhang_seats) = match rules.mode {
            AssemblyMode::Mmp => {
                let overhang = district_seats.saturating_sub(allocated);
                total_overhang += overhang;
                (
                    allocated.saturating_sub(district_seats),
                    Some(allocated),
                    Some(overhang),
                )
            }
            AssemblyMode::Parallel => (allocated, None, None),
        };
        party_results.push(PartyResult {
            party_id: pid,
            party_name: party.name,
            color: party.color,
            party_votes: votes,
            vote_share: percent(votes, total_votes),
            district_seats,
            list_seats,
            entitled_seats,
            overhang_seats,
            total_seats: district_seats + list_seats,
            below_threshold: !qualifying.contains_key(&pid),
        });
    }
    party_results.sort_by(|a, b| {
        b.total_seats
            .cmp(&a.total_seats)
            .then(b.party_votes.cmp(&a.party_votes))
            .then(a.party_id.cmp(&b.party_id))
    });

    let assembly_size = total_districts + rules.list_seats + total_overhang;
    if total_overhang > 0 {
        info!(
            "run_multi_district: {} overhang seats, assembly size {}",
            total_overhang, assembly_size
        );
    }
    let shares: Vec<(f64, f64)> = party_results
        .iter()
        .map(|r| (r.vote_share, percent(r.total_seats as u64, assembly_size as u64)))
        .collect();

    Ok(MultiDistrictResult {
        mode: rules.mode,
        party_results,
        district_results: tabulation,
        allocation,
        total_districts,
        list_seats: rules.list_seats,
        total_overhang,
        assembly_size,
        allocation_method: rules.method,
        threshold: rules.threshold,
        disproportionality: loosemore_hanby(&shares),
    })
}
