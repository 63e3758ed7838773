// ********* Input data structures ***********

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// The identifier of a candidate. Unique within a [Registry].
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub u32);

/// The identifier of a party.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub u32);

impl Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub party_id: PartyId,
    pub party_name: String,
    pub color: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub name: String,
    pub color: String,
}

impl Party {
    /// Color used for parties that are referenced but not registered.
    pub const FALLBACK_COLOR: &'static str = "#666666";

    /// The stand-in returned for a party id that is absent from the registry.
    pub fn fallback(id: PartyId) -> Party {
        Party {
            id,
            name: format!("Party {}", id),
            color: Party::FALLBACK_COLOR.to_string(),
        }
    }
}

/// The serialized form of a [Registry].
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub parties: Vec<Party>,
}

/// The candidates and parties of an election.
///
/// The registry order of the candidates is kept: it is the order used for
/// reporting and for the [TieBreakMode::UseCandidateOrder] policy.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RegistryRecord", into = "RegistryRecord")]
pub struct Registry {
    candidates: Vec<Candidate>,
    parties: Vec<Party>,
    candidate_positions: HashMap<CandidateId, usize>,
    party_positions: HashMap<PartyId, usize>,
}

impl Registry {
    pub fn new(candidates: Vec<Candidate>, parties: Vec<Party>) -> Result<Registry, VotingErrors> {
        let mut candidate_positions: HashMap<CandidateId, usize> = HashMap::new();
        for (idx, c) in candidates.iter().enumerate() {
            ensure!(
                candidate_positions.insert(c.id, idx).is_none(),
                InvalidInputSnafu {
                    reason: format!("candidate id {} is registered more than once", c.id),
                }
            );
        }
        let mut party_positions: HashMap<PartyId, usize> = HashMap::new();
        for (idx, p) in parties.iter().enumerate() {
            ensure!(
                party_positions.insert(p.id, idx).is_none(),
                InvalidInputSnafu {
                    reason: format!("party id {} is registered more than once", p.id),
                }
            );
        }
        Ok(Registry {
            candidates,
            parties,
            candidate_positions,
            party_positions,
        })
    }

    /// All the candidates, in registry order.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn parties(&self) -> &[Party] {
        &self.parties
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, id: CandidateId) -> bool {
        self.candidate_positions.contains_key(&id)
    }

    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidate_positions
            .get(&id)
            .map(|idx| &self.candidates[*idx])
    }

    /// The position of the candidate in the registry.
    pub fn position(&self, id: CandidateId) -> Option<usize> {
        self.candidate_positions.get(&id).copied()
    }

    pub fn party_position(&self, id: PartyId) -> Option<usize> {
        self.party_positions.get(&id).copied()
    }

    /// Looks up a party. Unregistered ids get a synthesized name and color.
    pub fn party(&self, id: PartyId) -> Party {
        match self.party_positions.get(&id) {
            Some(idx) => self.parties[*idx].clone(),
            None => Party::fallback(id),
        }
    }
}

impl TryFrom<RegistryRecord> for Registry {
    type Error = VotingErrors;

    fn try_from(data: RegistryRecord) -> Result<Self, Self::Error> {
        Registry::new(data.candidates, data.parties)
    }
}

impl From<Registry> for RegistryRecord {
    fn from(registry: Registry) -> Self {
        RegistryRecord {
            candidates: registry.candidates,
            parties: registry.parties,
        }
    }
}

fn default_count() -> u64 {
    1
}

/// A ranked ballot. The same ranking cast by several voters is carried once
/// with its multiplicity in `count`.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
pub struct Ballot {
    pub preferences: Vec<CandidateId>,
    #[serde(default = "default_count")]
    pub count: u64,
}

impl Ballot {
    pub fn new(preferences: &[u32], count: u64) -> Ballot {
        Ballot {
            preferences: preferences.iter().map(|id| CandidateId(*id)).collect(),
            count,
        }
    }
}

/// An ordered list of ballots.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BallotSet {
    ballots: Vec<Ballot>,
}

impl BallotSet {
    pub fn new(ballots: Vec<Ballot>) -> BallotSet {
        BallotSet { ballots }
    }

    pub fn push(&mut self, ballot: Ballot) {
        self.ballots.push(ballot);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Ballot> {
        self.ballots.iter()
    }

    pub fn len(&self) -> usize {
        self.ballots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ballots.is_empty()
    }

    /// The number of voters: the sum of all the ballot counts. `None` if it
    /// does not fit in a `u64`.
    pub fn total_count(&self) -> Option<u64> {
        self.ballots
            .iter()
            .try_fold(0u64, |acc, b| acc.checked_add(b.count))
    }
}

impl FromIterator<Ballot> for BallotSet {
    fn from_iter<I: IntoIterator<Item = Ballot>>(iter: I) -> Self {
        BallotSet {
            ballots: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a BallotSet {
    type Item = &'a Ballot;
    type IntoIter = std::slice::Iter<'a, Ballot>;

    fn into_iter(self) -> Self::IntoIter {
        self.ballots.iter()
    }
}

/// A single-member district, decided by first-past-the-post.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct District {
    pub id: u32,
    pub name: String,
    /// The contestants. May be left empty, in which case the keys of `votes` are used.
    #[serde(default)]
    pub candidates: Vec<CandidateId>,
    pub votes: BTreeMap<CandidateId, u64>,
}

/// Errors that prevent a tabulation from starting or completing.
#[derive(Eq, PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum VotingErrors {
    #[snafu(display("the election has no candidates"))]
    EmptyElection {},

    #[snafu(display("invalid input: {reason}"))]
    InvalidInput { reason: String },

    #[snafu(display("candidate {candidate} referenced by {referenced_by} is not registered"))]
    UnknownReference {
        candidate: CandidateId,
        referenced_by: String,
    },

    #[snafu(display("the count did not terminate within {rounds} rounds"))]
    NoConvergence { rounds: u32 },
}

// ********* Configuration **********

/// How ties are resolved. The same policy applies to every method of a run.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TieBreakMode {
    /// The lowest candidate (or party) id wins the tie.
    LowestId,
    /// The candidate (or party) registered first wins the tie.
    UseCandidateOrder,
    /// Drawing of lots. The tied ids are ordered by a SHA-256 digest of the
    /// seed, the draw number and the id: hard to guess in advance, but
    /// reproducible for a given seed.
    Random(u32),
}

/// Highest-averages divisor sequences.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum AllocationMethod {
    /// Divisors 1, 2, 3, ...
    #[serde(rename = "dhondt")]
    DHondt,
    /// Divisors 1, 3, 5, ...
    #[serde(rename = "sainteLague")]
    SainteLague,
}

impl AllocationMethod {
    /// The divisor applied to a party that already holds `seats_won` seats.
    pub fn divisor(self, seats_won: u32) -> u64 {
        match self {
            AllocationMethod::DHondt => seats_won as u64 + 1,
            AllocationMethod::SainteLague => 2 * seats_won as u64 + 1,
        }
    }
}

/// How district seats and list seats combine.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum AssemblyMode {
    /// Mixed-member proportional: list seats compensate for district results.
    #[serde(rename = "mmp")]
    Mmp,
    /// District and list seats are allocated independently.
    #[serde(rename = "parallel")]
    Parallel,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StvRules {
    pub seats: u32,
    pub tiebreak_mode: TieBreakMode,
    pub max_rounds: u32,
    /// If set, hitting `max_rounds` is an error instead of a flagged partial result.
    pub fail_on_round_limit: bool,
}

impl StvRules {
    pub const DEFAULT_RULES: StvRules = StvRules {
        seats: 1,
        tiebreak_mode: TieBreakMode::LowestId,
        max_rounds: 100,
        fail_on_round_limit: false,
    };
}

#[derive(PartialEq, Debug, Clone)]
pub struct AllocationRules {
    pub seats: u32,
    pub method: AllocationMethod,
    /// Minimum national vote share, in percent, to take part in the allocation.
    pub threshold: f64,
    pub tiebreak_mode: TieBreakMode,
}

impl AllocationRules {
    pub const DEFAULT_RULES: AllocationRules = AllocationRules {
        seats: 1,
        method: AllocationMethod::DHondt,
        threshold: 0.0,
        tiebreak_mode: TieBreakMode::LowestId,
    };
}

#[derive(PartialEq, Debug, Clone)]
pub struct MultiDistrictRules {
    pub mode: AssemblyMode,
    pub list_seats: u32,
    pub method: AllocationMethod,
    /// Minimum national vote share, in percent.
    pub threshold: f64,
    pub tiebreak_mode: TieBreakMode,
}

impl MultiDistrictRules {
    pub const DEFAULT_RULES: MultiDistrictRules = MultiDistrictRules {
        mode: AssemblyMode::Mmp,
        list_seats: 0,
        method: AllocationMethod::DHondt,
        threshold: 0.0,
        tiebreak_mode: TieBreakMode::LowestId,
    };
}

pub(crate) fn check_threshold(threshold: f64) -> Result<(), VotingErrors> {
    ensure!(
        threshold.is_finite() && (0.0..=100.0).contains(&threshold),
        InvalidInputSnafu {
            reason: format!("threshold must be a percentage, got {}", threshold),
        }
    );
    Ok(())
}
