use std::collections::HashSet;

use snafu::prelude::*;

pub use crate::config::*;
use crate::pairwise::{resolve_condorcet, CondorcetResult};
use crate::positional::{score_borda, BordaResult};
use crate::stv::{run_stv, StvResult};

/// A builder for an election with ranked ballots.
///
/// Candidates must be declared before the ballots that rank them: every
/// ballot is checked when it is added.
///
/// ```
/// use electoral_systems::builder::Builder;
/// use electoral_systems::{CandidateId, StvRules};
/// # use electoral_systems::VotingErrors;
///
/// let mut builder = Builder::new()
///     .party(1, "Greens", "#00aa00")?
///     .candidate(1, "Anna", 1)?
///     .candidate(2, "Bob", 1)?;
///
/// builder.add_ballot_simple(&[1, 2])?;
/// builder.add_ballot(&[2, 1], 3)?;
///
/// let result = builder.run_stv(&StvRules::DEFAULT_RULES)?;
/// assert_eq!(result.elected, vec![CandidateId(2)]);
/// # Ok::<(), VotingErrors>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    _candidates: Vec<Candidate>,
    _parties: Vec<Party>,
    _ballots: BallotSet,
    _known: HashSet<CandidateId>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Declares a party. It must come before the candidates running for it,
    /// otherwise they get the fallback party name.
    pub fn party(mut self, id: u32, name: &str, color: &str) -> Result<Builder, VotingErrors> {
        ensure!(
            self._parties.iter().all(|p| p.id != PartyId(id)),
            InvalidInputSnafu {
                reason: format!("party id {} is registered more than once", id),
            }
        );
        self._parties.push(Party {
            id: PartyId(id),
            name: name.to_string(),
            color: color.to_string(),
        });
        Ok(self)
    }

    /// Declares a candidate. The candidate takes the color of their party.
    pub fn candidate(mut self, id: u32, name: &str, party_id: u32) -> Result<Builder, VotingErrors> {
        let cid = CandidateId(id);
        ensure!(
            self._known.insert(cid),
            InvalidInputSnafu {
                reason: format!("candidate id {} is registered more than once", id),
            }
        );
        let party = self
            ._parties
            .iter()
            .find(|p| p.id == PartyId(party_id))
            .cloned()
            .unwrap_or_else(|| Party::fallback(PartyId(party_id)));
        self._candidates.push(Candidate {
            id: cid,
            name: name.to_string(),
            party_id: party.id,
            party_name: party.name,
            color: party.color,
        });
        Ok(self)
    }

    /// Adds a single ballot.
    pub fn add_ballot_simple(&mut self, preferences: &[u32]) -> Result<(), VotingErrors> {
        self.add_ballot(preferences, 1)
    }

    /// Adds a ballot cast by `count` voters.
    ///
    /// preferences: the candidate ids, most preferred first. Each candidate
    /// must be declared and appear at most once.
    pub fn add_ballot(&mut self, preferences: &[u32], count: u64) -> Result<(), VotingErrors> {
        let location = format!("ballot #{}", self._ballots.len() + 1);
        let mut seen: HashSet<u32> = HashSet::new();
        for id in preferences.iter() {
            ensure!(
                self._known.contains(&CandidateId(*id)),
                UnknownReferenceSnafu {
                    candidate: CandidateId(*id),
                    referenced_by: location.clone(),
                }
            );
            ensure!(
                seen.insert(*id),
                InvalidInputSnafu {
                    reason: format!("{} ranks candidate {} more than once", location, id),
                }
            );
        }
        self._ballots.push(Ballot::new(preferences, count));
        Ok(())
    }

    pub fn build(self) -> Result<(Registry, BallotSet), VotingErrors> {
        let registry = Registry::new(self._candidates, self._parties)?;
        Ok((registry, self._ballots))
    }

    pub fn run_stv(self, rules: &StvRules) -> Result<StvResult, VotingErrors> {
        let (registry, ballots) = self.build()?;
        run_stv(&registry, &ballots, rules)
    }

    pub fn score_borda(self, tiebreak_mode: TieBreakMode) -> Result<BordaResult, VotingErrors> {
        let (registry, ballots) = self.build()?;
        score_borda(&registry, &ballots, tiebreak_mode)
    }

    pub fn resolve_condorcet(self) -> Result<CondorcetResult, VotingErrors> {
        let (registry, ballots) = self.build()?;
        resolve_condorcet(&registry, &ballots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> Builder {
        Builder::new()
            .party(1, "Greens", "#00aa00")
            .and_then(|b| b.candidate(1, "Anna", 1))
            .and_then(|b| b.candidate(2, "Bob", 2))
            .and_then(|b| b.candidate(3, "Clara", 1))
            .unwrap()
    }

    #[test]
    fn candidates_inherit_party_details() {
        let (registry, _) = builder().build().unwrap();
        let anna = registry.candidate(CandidateId(1)).unwrap();
        assert_eq!(anna.party_name, "Greens");
        assert_eq!(anna.color, "#00aa00");
        let bob = registry.candidate(CandidateId(2)).unwrap();
        assert_eq!(bob.party_name, "Party 2");
        assert_eq!(bob.color, Party::FALLBACK_COLOR);
    }

    #[test]
    fn ballots_are_checked_eagerly() {
        let mut b = builder();
        b.add_ballot(&[1, 2], 4).unwrap();
        assert_eq!(
            b.add_ballot_simple(&[3, 7]),
            Err(VotingErrors::UnknownReference {
                candidate: CandidateId(7),
                referenced_by: "ballot #2".to_string()
            })
        );
        assert!(matches!(
            b.add_ballot_simple(&[3, 3]),
            Err(VotingErrors::InvalidInput { .. })
        ));
        let (_, ballots) = b.build().unwrap();
        assert_eq!(ballots.len(), 1);
        assert_eq!(ballots.total_count(), Some(4));
    }

    #[test]
    fn duplicate_declarations() {
        assert!(builder().candidate(2, "Bob again", 1).is_err());
        assert!(builder().party(1, "Greens again", "#000").is_err());
    }

    #[test]
    fn all_ranked_methods() {
        let mut b = builder();
        b.add_ballot(&[1, 2, 3], 100).unwrap();
        b.add_ballot(&[2, 1, 3], 80).unwrap();
        b.add_ballot(&[3, 2, 1], 50).unwrap();
        assert_eq!(
            b.clone().score_borda(TieBreakMode::LowestId).unwrap().winner,
            CandidateId(2)
        );
        assert_eq!(
            b.clone().resolve_condorcet().unwrap().condorcet_winner,
            Some(CandidateId(2))
        );
        let stv = b.run_stv(&StvRules::DEFAULT_RULES).unwrap();
        assert_eq!(stv.elected.len(), 1);
    }
}
