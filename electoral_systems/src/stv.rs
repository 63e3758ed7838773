//! Single Transferable Vote.
//!
//! Multi-winner count with a Droop quota. The surplus of an elected candidate
//! is transferred at a fractional value (surplus / votes) to the next
//! preferences of their ballots, while the ballots of an eliminated candidate
//! are transferred at full value.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::config::*;
use crate::tiebreak::{report_lot, resolve_tie};
use crate::{check_ballots, check_registry, checked_total, registered};

/// Droop quota: the smallest number of votes that guarantees election.
pub fn droop_quota(total_votes: u64, seats: u32) -> u64 {
    total_votes / (seats as u64 + 1) + 1
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundAction {
    Elected,
    ElectedRemaining,
    Eliminated,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Active,
    Elected,
    Eliminated,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabulationStatus {
    Complete,
    /// The round limit was hit before all the seats were decided.
    RoundLimitReached,
}

/// Statistics for one round
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StvRound {
    pub round: u32,
    pub quota: u64,
    /// Weighted votes of every candidate still active in this round.
    pub tally: BTreeMap<CandidateId, f64>,
    /// Weighted votes of the ballots with no active preference left.
    pub exhausted: f64,
    pub action: RoundAction,
    /// The candidate elected or eliminated in this round. For
    /// [RoundAction::ElectedRemaining], all the candidates filling the remaining seats.
    pub candidates: Vec<CandidateId>,
    pub surplus: Option<f64>,
    pub transfer_value: Option<f64>,
    pub tie_broken: bool,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StvCandidateResult {
    pub id: CandidateId,
    pub name: String,
    pub party: String,
    pub color: String,
    /// The tally of the last round in which the candidate was still active.
    pub votes: f64,
    pub status: CandidateStatus,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StvResult {
    /// One row per candidate, in registry order.
    pub results: Vec<StvCandidateResult>,
    /// In order of election.
    pub elected: Vec<CandidateId>,
    /// In order of elimination.
    pub eliminated: Vec<CandidateId>,
    pub rounds: Vec<StvRound>,
    pub quota: u64,
    pub total_votes: u64,
    pub status: TabulationStatus,
}

// **** Working state of a count ****

/// A position in a list of preferences. It never moves backwards.
#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord)]
struct Cursor(usize);

impl Cursor {
    fn advance(&mut self) {
        self.0 += 1;
    }

    fn exhaust(&mut self, len: usize) {
        self.0 = self.0.max(len);
    }
}

#[derive(Debug, Clone)]
struct WorkingBallot<'a> {
    preferences: &'a [CandidateId],
    count: u64,
    // Invariant: in (0, 1].
    weight: f64,
    cursor: Cursor,
    // The whole value went to an elected candidate with no surplus.
    absorbed: bool,
}

impl<'a> WorkingBallot<'a> {
    fn new(ballot: &'a Ballot) -> WorkingBallot<'a> {
        WorkingBallot {
            preferences: &ballot.preferences,
            count: ballot.count,
            weight: 1.0,
            cursor: Cursor(0),
            absorbed: false,
        }
    }

    fn current(&self) -> Option<CandidateId> {
        if self.absorbed {
            return None;
        }
        self.preferences.get(self.cursor.0).copied()
    }

    fn value(&self) -> f64 {
        self.count as f64 * self.weight
    }

    /// Skips the preferences that are not active anymore.
    fn seek_active(&mut self, statuses: &BTreeMap<CandidateId, CandidateStatus>) -> Option<CandidateId> {
        while let Some(cid) = self.current() {
            if statuses.get(&cid) == Some(&CandidateStatus::Active) {
                return Some(cid);
            }
            self.cursor.advance();
        }
        None
    }

    /// Carries the ballot to its next preference at a reduced weight.
    fn transfer_surplus(&mut self, transfer_value: f64) {
        if transfer_value > 0.0 {
            self.weight *= transfer_value;
            self.cursor.advance();
        } else {
            self.absorbed = true;
            self.cursor.exhaust(self.preferences.len());
        }
    }

    /// Carries the ballot to its next preference at full weight.
    fn transfer_full(&mut self) {
        self.cursor.advance();
    }
}

struct CountState {
    // Registry order.
    order: Vec<CandidateId>,
    // Tallies closer than this are equal: fractional transfers leave rounding noise.
    tolerance: f64,
    statuses: BTreeMap<CandidateId, CandidateStatus>,
    elected: Vec<CandidateId>,
    eliminated: Vec<CandidateId>,
    last_tally: BTreeMap<CandidateId, f64>,
}

impl CountState {
    fn new(registry: &Registry, total_votes: u64) -> CountState {
        let order: Vec<CandidateId> = registry.candidates().iter().map(|c| c.id).collect();
        CountState {
            tolerance: 1e-9 * total_votes.max(1) as f64,
            statuses: order
                .iter()
                .map(|cid| (*cid, CandidateStatus::Active))
                .collect(),
            order,
            elected: Vec::new(),
            eliminated: Vec::new(),
            last_tally: BTreeMap::new(),
        }
    }

    fn active(&self) -> Vec<CandidateId> {
        self.order
            .iter()
            .filter(|cid| self.statuses.get(cid) == Some(&CandidateStatus::Active))
            .cloned()
            .collect()
    }

    fn elect(&mut self, cid: CandidateId) {
        self.statuses.insert(cid, CandidateStatus::Elected);
        self.elected.push(cid);
    }

    fn eliminate(&mut self, cid: CandidateId) {
        self.statuses.insert(cid, CandidateStatus::Eliminated);
        self.eliminated.push(cid);
    }
}

/// Runs a Single Transferable Vote count.
///
/// Arguments:
/// * `registry` the candidates of the election
/// * `ballots` the ranked ballots. All the candidates they reference must be registered.
/// * `rules` the number of seats and the tie-breaking policy
pub fn run_stv(
    registry: &Registry,
    ballots: &BallotSet,
    rules: &StvRules,
) -> Result<StvResult, VotingErrors> {
    ensure!(
        rules.seats >= 1,
        InvalidInputSnafu {
            reason: "at least one seat must be filled"
        }
    );
    ensure!(
        rules.max_rounds >= 1,
        InvalidInputSnafu {
            reason: "the round limit must be at least 1"
        }
    );
    check_registry(registry)?;
    check_ballots(registry, ballots)?;

    let total_votes = checked_total(ballots.iter().map(|b| b.count), "the ballot counts")?;
    let quota = droop_quota(total_votes, rules.seats);
    info!(
        "run_stv: {} candidates, {} seats, {} ballots, {} votes, quota {}",
        registry.len(),
        rules.seats,
        ballots.len(),
        total_votes,
        quota
    );

    let mut arena: Vec<WorkingBallot> = ballots.iter().map(WorkingBallot::new).collect();
    let mut state = CountState::new(registry, total_votes);
    let mut rounds: Vec<StvRound> = Vec::new();

    let status = loop {
        if state.elected.len() >= rules.seats as usize || state.active().is_empty() {
            break TabulationStatus::Complete;
        }
        if rounds.len() >= rules.max_rounds as usize {
            break TabulationStatus::RoundLimitReached;
        }
        let round_id = rounds.len() as u32 + 1;
        let round = run_one_round(&mut arena, &mut state, registry, rules, quota, round_id);
        info!(
            "Round {} (quota: {}): {:?} {:?}",
            round.round, quota, round.action, round.candidates
        );
        rounds.push(round);
    };

    if status == TabulationStatus::RoundLimitReached {
        warn!(
            "run_stv: stopped after {} rounds with {} of {} seats filled",
            rounds.len(),
            state.elected.len(),
            rules.seats
        );
        ensure!(
            !rules.fail_on_round_limit,
            NoConvergenceSnafu {
                rounds: rounds.len() as u32
            }
        );
    }

    let mut results: Vec<StvCandidateResult> = Vec::new();
    for cid in state.order.iter() {
        let c = registered(registry, *cid)?;
        results.push(StvCandidateResult {
            id: *cid,
            name: c.name.clone(),
            party: c.party_name.clone(),
            color: c.color.clone(),
            votes: state.last_tally.get(cid).cloned().unwrap_or(0.0),
            status: state
                .statuses
                .get(cid)
                .cloned()
                .unwrap_or(CandidateStatus::Active),
        });
    }

    Ok(StvResult {
        results,
        elected: state.elected,
        eliminated: state.eliminated,
        rounds,
        quota,
        total_votes,
        status,
    })
}

fn run_one_round(
    arena: &mut [WorkingBallot],
    state: &mut CountState,
    registry: &Registry,
    rules: &StvRules,
    quota: u64,
    round_id: u32,
) -> StvRound {
    let active = state.active();
    let tolerance = state.tolerance;
    let same = |a: f64, b: f64| (a - b).abs() <= tolerance;

    // Candidates without any vote still take part in the round.
    let mut tally: BTreeMap<CandidateId, f64> = active.iter().map(|cid| (*cid, 0.0)).collect();
    let mut exhausted = 0.0;
    for wb in arena.iter_mut() {
        if wb.absorbed {
            continue;
        }
        match wb.seek_active(&state.statuses) {
            Some(cid) => *tally.entry(cid).or_insert(0.0) += wb.value(),
            None => exhausted += wb.value(),
        }
    }
    debug!("run_one_round: round {} tally: {:?}", round_id, tally);
    for (cid, votes) in tally.iter() {
        state.last_tally.insert(*cid, *votes);
    }

    let tie_rank = |cid: &CandidateId| {
        rules
            .tiebreak_mode
            .rank(cid.0, registry.position(*cid), round_id)
    };

    let mut record = StvRound {
        round: round_id,
        quota,
        tally: tally.clone(),
        exhausted,
        action: RoundAction::Eliminated,
        candidates: Vec::new(),
        surplus: None,
        transfer_value: None,
        tie_broken: false,
    };

    let max_votes = active
        .iter()
        .map(|cid| tally[cid])
        .fold(f64::NEG_INFINITY, f64::max);

    if max_votes + tolerance >= quota as f64 {
        let leaders: Vec<CandidateId> = active
            .iter()
            .filter(|cid| same(tally[*cid], max_votes))
            .cloned()
            .collect();
        // Not empty: the maximum is reached by at least one candidate.
        let winner = resolve_tie(&leaders, tie_rank).unwrap_or(leaders[0]);
        report_lot(rules.tiebreak_mode, "election", &leaders, &winner);
        let surplus = if same(max_votes, quota as f64) {
            0.0
        } else {
            max_votes - quota as f64
        };
        let transfer_value = if max_votes > 0.0 {
            surplus / max_votes
        } else {
            0.0
        };
        debug!(
            "run_one_round: electing {} with {} votes, surplus {}, transfer value {}",
            winner, max_votes, surplus, transfer_value
        );
        for wb in arena.iter_mut() {
            if wb.current() == Some(winner) {
                wb.transfer_surplus(transfer_value);
            }
        }
        state.elect(winner);
        record.action = RoundAction::Elected;
        record.candidates = vec![winner];
        record.surplus = Some(surplus);
        record.transfer_value = Some(transfer_value);
        record.tie_broken = leaders.len() > 1;
    } else if state.elected.len() + active.len() <= rules.seats as usize {
        let mut remaining = active.clone();
        // Tallies are compared on a grid of the tolerance, which keeps the order total.
        let level = |cid: &CandidateId| (tally[cid] / tolerance).round() as i64;
        remaining.sort_by(|a, b| {
            level(b)
                .cmp(&level(a))
                .then_with(|| tie_rank(a).cmp(&tie_rank(b)))
        });
        debug!("run_one_round: electing all the remaining candidates: {:?}", remaining);
        for cid in remaining.iter() {
            state.elect(*cid);
        }
        record.action = RoundAction::ElectedRemaining;
        record.candidates = remaining;
    } else {
        let min_votes = active
            .iter()
            .map(|cid| tally[cid])
            .fold(f64::INFINITY, f64::min);
        let trailing: Vec<CandidateId> = active
            .iter()
            .filter(|cid| same(tally[*cid], min_votes))
            .cloned()
            .collect();
        let loser = resolve_tie(&trailing, tie_rank).unwrap_or(trailing[0]);
        report_lot(rules.tiebreak_mode, "elimination", &trailing, &loser);
        debug!("run_one_round: eliminating {} with {} votes", loser, min_votes);
        for wb in arena.iter_mut() {
            if wb.current() == Some(loser) {
                wb.transfer_full();
            }
        }
        state.eliminate(loser);
        record.action = RoundAction::Eliminated;
        record.candidates = vec![loser];
        record.tie_broken = trailing.len() > 1;
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{ballots, candidate, init, registry};

    fn rules(seats: u32) -> StvRules {
        StvRules {
            seats,
            ..StvRules::DEFAULT_RULES
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn quota() {
        assert_eq!(droop_quota(100, 1), 51);
        assert_eq!(droop_quota(100, 3), 26);
        assert_eq!(droop_quota(0, 1), 1);
        for total in [0u64, 1, 7, 99, 100, 101, 12345] {
            for seats in 1u32..8 {
                let q = droop_quota(total, seats);
                assert!(q * seats as u64 <= total + seats as u64);
            }
        }
    }

    #[test]
    fn majority_first_round() {
        let reg = registry(&[1, 2, 3]);
        let b = ballots(&[(&[1, 2, 3], 60), (&[2, 1, 3], 30), (&[3, 2, 1], 10)]);
        let res = run_stv(&reg, &b, &rules(1)).unwrap();
        assert_eq!(res.quota, 51);
        assert_eq!(res.total_votes, 100);
        assert_eq!(res.elected, vec![CandidateId(1)]);
        assert_eq!(res.rounds.len(), 1);
        let r1 = &res.rounds[0];
        assert_eq!(r1.action, RoundAction::Elected);
        assert_close(r1.tally[&CandidateId(1)], 60.0);
        assert_close(r1.surplus.unwrap(), 9.0);
        assert_close(r1.transfer_value.unwrap(), 0.15);
        assert_eq!(res.status, TabulationStatus::Complete);
    }

    #[test]
    fn surplus_is_transferred_at_fractional_value() {
        init();
        let reg = registry(&[1, 2, 3]);
        let b = ballots(&[(&[1, 2], 64), (&[3], 40), (&[2], 38)]);
        let res = run_stv(&reg, &b, &rules(2)).unwrap();
        assert_eq!(res.quota, 48);
        assert_eq!(res.elected, vec![CandidateId(1), CandidateId(2)]);
        let r1 = &res.rounds[0];
        assert_close(r1.surplus.unwrap(), 16.0);
        assert_close(r1.transfer_value.unwrap(), 0.25);
        let r2 = &res.rounds[1];
        // 38 first preferences and 64 ballots at a weight of 0.25
        assert_close(r2.tally[&CandidateId(2)], 54.0);
        assert!(!r2.tally.contains_key(&CandidateId(1)));
    }

    #[test]
    fn elimination_transfers_at_full_value() {
        let reg = registry(&[1, 2, 3]);
        let b = ballots(&[(&[1], 40), (&[2], 35), (&[3, 2], 25)]);
        let res = run_stv(&reg, &b, &rules(1)).unwrap();
        assert_eq!(res.rounds.len(), 2);
        assert_eq!(res.rounds[0].action, RoundAction::Eliminated);
        assert_eq!(res.rounds[0].candidates, vec![CandidateId(3)]);
        assert_close(res.rounds[1].tally[&CandidateId(2)], 60.0);
        assert_eq!(res.elected, vec![CandidateId(2)]);
        assert_eq!(res.eliminated, vec![CandidateId(3)]);
    }

    #[test]
    fn exact_quota_exhausts_ballots_and_fills_remaining_seats() {
        let reg = registry(&[1, 2, 3]);
        let b = ballots(&[(&[1], 10), (&[2], 9), (&[3], 8)]);
        let res = run_stv(&reg, &b, &rules(2)).unwrap();
        assert_eq!(res.quota, 10);
        let actions: Vec<RoundAction> = res.rounds.iter().map(|r| r.action).collect();
        assert_eq!(
            actions,
            vec![
                RoundAction::Elected,
                RoundAction::Eliminated,
                RoundAction::ElectedRemaining
            ]
        );
        assert_close(res.rounds[0].transfer_value.unwrap(), 0.0);
        // The ballots of candidate 1 were fully used, only candidate 3's are exhausted.
        assert_close(res.rounds[1].exhausted, 0.0);
        assert_close(res.rounds[2].exhausted, 8.0);
        assert_eq!(res.elected, vec![CandidateId(1), CandidateId(2)]);
        let statuses: Vec<CandidateStatus> = res.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                CandidateStatus::Elected,
                CandidateStatus::Elected,
                CandidateStatus::Eliminated
            ]
        );
        assert_close(res.results[0].votes, 10.0);
        assert_close(res.results[2].votes, 8.0);
    }

    #[test]
    fn elimination_ties_go_to_the_lowest_id() {
        let reg = registry(&[1, 2, 3]);
        let b = ballots(&[(&[1], 10), (&[2], 10), (&[3], 5)]);
        let res = run_stv(&reg, &b, &rules(1)).unwrap();
        assert_eq!(res.eliminated, vec![CandidateId(3), CandidateId(1)]);
        assert!(!res.rounds[0].tie_broken);
        assert!(res.rounds[1].tie_broken);
        assert_eq!(res.elected, vec![CandidateId(2)]);
    }

    #[test]
    fn elimination_ties_in_registry_order() {
        let reg = Registry::new(
            vec![candidate(3, 3), candidate(2, 2), candidate(1, 1)],
            vec![],
        )
        .unwrap();
        let b = ballots(&[(&[1], 10), (&[2], 10), (&[3], 5)]);
        let r = StvRules {
            tiebreak_mode: TieBreakMode::UseCandidateOrder,
            ..rules(1)
        };
        let res = run_stv(&reg, &b, &r).unwrap();
        assert_eq!(res.eliminated, vec![CandidateId(3), CandidateId(2)]);
        assert_eq!(res.elected, vec![CandidateId(1)]);
    }

    #[test]
    fn ties_survive_fractional_transfers() {
        let reg = registry(&[1, 2, 3, 4, 5]);
        let mut data: Vec<(&[u32], u64)> = Vec::new();
        data.push((&[1], 50));
        data.push((&[2], 1));
        data.push((&[4], 49));
        data.push((&[5], 50));
        // Ten ballots of weight 0.1 each sum to slightly less than 1.
        for _ in 0..10 {
            data.push((&[1, 3], 1));
        }
        let res = run_stv(&reg, &ballots(&data), &rules(2)).unwrap();
        assert_eq!(res.quota, 54);
        assert_close(res.rounds[0].transfer_value.unwrap(), 0.1);
        let r2 = &res.rounds[1];
        assert_close(r2.tally[&CandidateId(3)], 1.0);
        assert_eq!(r2.action, RoundAction::Eliminated);
        assert_eq!(r2.candidates, vec![CandidateId(2)]);
        assert!(r2.tie_broken);
    }

    #[test]
    fn ballot_counts_too_large() {
        let reg = registry(&[1, 2]);
        let b = ballots(&[(&[1], u64::MAX), (&[2], 1)]);
        assert!(matches!(
            run_stv(&reg, &b, &rules(1)),
            Err(VotingErrors::InvalidInput { .. })
        ));
    }

    #[test]
    fn no_votes_at_all() {
        let reg = registry(&[1, 2, 3]);
        let res = run_stv(&reg, &BallotSet::default(), &rules(1)).unwrap();
        assert_eq!(res.quota, 1);
        assert_eq!(res.eliminated, vec![CandidateId(1), CandidateId(2)]);
        assert_eq!(res.elected, vec![CandidateId(3)]);
        assert_eq!(res.status, TabulationStatus::Complete);
    }

    #[test]
    fn round_limit_is_reported() {
        let ids: Vec<u32> = (1..=105).collect();
        let reg = registry(&ids);
        let b: BallotSet = ids.iter().map(|id| Ballot::new(&[*id], 1)).collect();
        let res = run_stv(&reg, &b, &rules(1)).unwrap();
        assert_eq!(res.status, TabulationStatus::RoundLimitReached);
        assert_eq!(res.rounds.len(), 100);
        assert!(res.elected.is_empty());
        assert_eq!(res.eliminated.len(), 100);

        let strict = StvRules {
            fail_on_round_limit: true,
            ..rules(1)
        };
        assert_eq!(
            run_stv(&reg, &b, &strict),
            Err(VotingErrors::NoConvergence { rounds: 100 })
        );
    }

    #[test]
    fn count_invariants() {
        init();
        let reg = registry(&[1, 2, 3, 4, 5, 6]);
        let b = ballots(&[
            (&[1, 2, 3], 31),
            (&[2, 1, 6], 17),
            (&[3, 4], 22),
            (&[4, 5, 1], 9),
            (&[5, 6, 2, 1], 14),
            (&[6, 3, 2], 11),
            (&[2, 5], 7),
        ]);
        for seats in 1..=6 {
            let res = run_stv(&reg, &b, &rules(seats)).unwrap();
            assert_eq!(res.status, TabulationStatus::Complete);
            assert!(res.elected.len() <= seats as usize);
            assert_eq!(res.elected.len(), seats as usize);
            assert!(res.elected.iter().all(|c| !res.eliminated.contains(c)));
            assert!(res.rounds.len() <= 6);
            for r in res.rounds.iter() {
                if let Some(tv) = r.transfer_value {
                    assert!((0.0..1.0).contains(&tv));
                }
                let counted: f64 = r.tally.values().sum::<f64>() + r.exhausted;
                assert!(counted <= b.total_count().unwrap() as f64 + 1e-9);
            }
        }
    }

    #[test]
    fn invalid_inputs() {
        let reg = registry(&[1, 2]);
        let b = ballots(&[(&[1, 2], 1)]);
        assert!(matches!(
            run_stv(&reg, &b, &rules(0)),
            Err(VotingErrors::InvalidInput { .. })
        ));
        assert!(matches!(
            run_stv(&reg, &ballots(&[(&[3], 1)]), &rules(1)),
            Err(VotingErrors::UnknownReference { .. })
        ));
        assert_eq!(
            run_stv(&registry(&[]), &b, &rules(1)),
            Err(VotingErrors::EmptyElection {})
        );
    }

    #[test]
    fn result_serde_round_trip() {
        let reg = registry(&[1, 2, 3]);
        let b = ballots(&[(&[1, 2], 64), (&[3], 40), (&[2], 38)]);
        let res = run_stv(&reg, &b, &rules(2)).unwrap();
        let js = serde_json::to_string(&res).unwrap();
        let back: StvResult = serde_json::from_str(&js).unwrap();
        assert_eq!(back, res);
    }
}
