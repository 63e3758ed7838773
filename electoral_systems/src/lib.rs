/*!
Tabulation and seat allocation for the common electoral systems.

Every method is a pure function from typed input records to a typed result:

* [run_stv]: Single Transferable Vote with a Droop quota and fractional surplus transfer
* [score_borda]: Borda count
* [resolve_condorcet]: Condorcet pairwise comparison
* [allocate_seats]: highest-averages seat allocation (D'Hondt, Sainte-Laguë)
* [run_party_list]: national party-list proportional representation
* [run_multi_district]: mixed-member proportional and parallel voting across districts

See the [manual] for the details of each method and the tie-breaking policies.
*/

mod allocation;
pub mod builder;
mod config;
mod districts;
pub mod manual;
mod pairwise;
mod positional;
mod stv;
mod tiebreak;

use log::debug;
use snafu::prelude::*;
use std::collections::HashSet;

pub use crate::allocation::*;
pub use crate::config::*;
pub use crate::districts::*;
pub use crate::pairwise::*;
pub use crate::positional::*;
pub use crate::stv::*;

// Validation that runs before any tabulation starts.

fn check_registry(registry: &Registry) -> Result<(), VotingErrors> {
    ensure!(!registry.is_empty(), EmptyElectionSnafu);
    Ok(())
}

/// Every ballot must only reference registered candidates, each at most once.
fn check_ballots(registry: &Registry, ballots: &BallotSet) -> Result<(), VotingErrors> {
    debug!("check_ballots: {} ballots", ballots.len());
    for (idx, ballot) in ballots.iter().enumerate() {
        let mut seen: HashSet<CandidateId> = HashSet::new();
        for cid in ballot.preferences.iter() {
            ensure!(
                registry.contains(*cid),
                UnknownReferenceSnafu {
                    candidate: *cid,
                    referenced_by: format!("ballot #{}", idx + 1),
                }
            );
            ensure!(
                seen.insert(*cid),
                InvalidInputSnafu {
                    reason: format!("ballot #{} ranks candidate {} more than once", idx + 1, cid),
                }
            );
        }
    }
    ballots.total_count().context(InvalidInputSnafu {
        reason: "the total of the ballot counts is too large",
    })?;
    Ok(())
}

/// Sums vote counts, failing instead of wrapping around.
fn checked_total(mut counts: impl Iterator<Item = u64>, what: &str) -> Result<u64, VotingErrors> {
    counts
        .try_fold(0u64, |acc, c| acc.checked_add(c))
        .context(InvalidInputSnafu {
            reason: format!("the total of {} is too large", what),
        })
}

/// The registry entry for a candidate that already went through the checks.
fn registered(registry: &Registry, cid: CandidateId) -> Result<&Candidate, VotingErrors> {
    registry.candidate(cid).context(UnknownReferenceSnafu {
        candidate: cid,
        referenced_by: "the tabulation".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    pub(crate) fn candidate(id: u32, party: u32) -> Candidate {
        Candidate {
            id: CandidateId(id),
            name: format!("Candidate {}", id),
            party_id: PartyId(party),
            party_name: format!("Party {}", party),
            color: "#000000".to_string(),
        }
    }

    /// A registry where candidate `i` runs for party `i`.
    pub(crate) fn registry(ids: &[u32]) -> Registry {
        Registry::new(ids.iter().map(|id| candidate(*id, *id)).collect(), vec![]).unwrap()
    }

    pub(crate) fn ballots(data: &[(&[u32], u64)]) -> BallotSet {
        data.iter().map(|(prefs, count)| Ballot::new(prefs, *count)).collect()
    }

    #[test]
    fn unknown_candidate_in_ballot() {
        let reg = registry(&[1, 2]);
        let res = check_ballots(&reg, &ballots(&[(&[1, 2], 3), (&[2, 9], 1)]));
        assert_eq!(
            res,
            Err(VotingErrors::UnknownReference {
                candidate: CandidateId(9),
                referenced_by: "ballot #2".to_string()
            })
        );
    }

    #[test]
    fn duplicate_preference() {
        let reg = registry(&[1, 2]);
        let res = check_ballots(&reg, &ballots(&[(&[1, 2, 1], 3)]));
        assert!(matches!(res, Err(VotingErrors::InvalidInput { .. })));
    }

    #[test]
    fn ballot_counts_too_large() {
        let reg = registry(&[1, 2]);
        let res = check_ballots(&reg, &ballots(&[(&[1], u64::MAX), (&[2], 1)]));
        assert!(matches!(res, Err(VotingErrors::InvalidInput { .. })));
        assert_eq!(checked_total([3u64, 4].into_iter(), "votes"), Ok(7));
        assert!(checked_total([u64::MAX, 1].into_iter(), "votes").is_err());
    }

    #[test]
    fn unknown_reference_message() {
        let err = VotingErrors::UnknownReference {
            candidate: CandidateId(9),
            referenced_by: "district 3".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "candidate 9 referenced by district 3 is not registered"
        );
    }

    #[test]
    fn empty_registry() {
        let reg = registry(&[]);
        assert_eq!(check_registry(&reg), Err(VotingErrors::EmptyElection {}));
    }

    #[test]
    fn duplicate_registration() {
        let res = Registry::new(vec![candidate(1, 1), candidate(1, 2)], vec![]);
        assert!(matches!(res, Err(VotingErrors::InvalidInput { .. })));
    }

    #[test]
    fn missing_party_falls_back() {
        let reg = registry(&[1]);
        let p = reg.party(PartyId(4));
        assert_eq!(p.name, "Party 4");
        assert_eq!(p.color, Party::FALLBACK_COLOR);
    }

    #[test]
    fn registry_serde_round_trip() {
        let reg = Registry::new(
            vec![candidate(2, 1), candidate(1, 1)],
            vec![Party {
                id: PartyId(1),
                name: "Greens".to_string(),
                color: "#00ff00".to_string(),
            }],
        )
        .unwrap();
        let js = serde_json::to_string(&reg).unwrap();
        let back: Registry = serde_json::from_str(&js).unwrap();
        assert_eq!(back, reg);
        assert_eq!(back.position(CandidateId(1)), Some(1));
    }

    #[test]
    fn registry_rejects_duplicates_when_deserialized() {
        let js = r##"{"candidates": [
            {"id": 1, "name": "A", "party_id": 1, "party_name": "P", "color": "#000"},
            {"id": 1, "name": "B", "party_id": 1, "party_name": "P", "color": "#000"}
        ]}"##;
        assert!(serde_json::from_str::<Registry>(js).is_err());
    }
}
