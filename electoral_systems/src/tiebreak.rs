use log::{debug, warn};

use crate::config::TieBreakMode;

/// Sort key of an entry involved in a tie. The smallest key wins.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone)]
pub(crate) enum TieRank {
    Ordinal(u64, u32),
    Lot(String, u32),
}

impl TieBreakMode {
    /// The rank of the entry `id` for the given draw.
    ///
    /// `position` is the registry position of the entry, if it is registered.
    /// `draw` distinguishes successive ties in the same run (round number,
    /// seat number, district id) so that a lot drawing is not the same each time.
    pub(crate) fn rank(&self, id: u32, position: Option<usize>, draw: u32) -> TieRank {
        match *self {
            TieBreakMode::LowestId => TieRank::Ordinal(id as u64, id),
            TieBreakMode::UseCandidateOrder => {
                TieRank::Ordinal(position.map(|p| p as u64).unwrap_or(u64::MAX), id)
            }
            TieBreakMode::Random(seed) => {
                let data = format!("{:08}{:08}{}", seed, draw, id);
                TieRank::Lot(sha256::digest(data.as_str()), id)
            }
        }
    }
}

/// Picks the winner of a tie. Returns `None` only if `tied` is empty.
pub(crate) fn resolve_tie<T: Copy + std::fmt::Debug>(
    tied: &[T],
    rank: impl Fn(&T) -> TieRank,
) -> Option<T> {
    let res = tied.iter().min_by_key(|t| rank(t)).copied();
    if tied.len() > 1 {
        debug!("resolve_tie: tied: {:?} -> {:?}", tied, res);
    }
    res
}

/// Warns when a tie was settled by drawing lots.
pub(crate) fn report_lot<T: std::fmt::Debug>(
    mode: TieBreakMode,
    what: &str,
    tied: &[T],
    winner: &T,
) {
    if let TieBreakMode::Random(seed) = mode {
        if tied.len() > 1 {
            warn!(
                "{}: {:?} drawn by lot among {:?} (seed {})",
                what, winner, tied, seed
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_id_ignores_positions() {
        let mode = TieBreakMode::LowestId;
        let tied = [(7u32, 0usize), (3, 2), (5, 1)];
        let res = resolve_tie(&tied, |(id, pos)| mode.rank(*id, Some(*pos), 1));
        assert_eq!(res, Some((3, 2)));
    }

    #[test]
    fn candidate_order_uses_positions() {
        let mode = TieBreakMode::UseCandidateOrder;
        let tied = [(7u32, Some(2usize)), (3, None), (5, Some(1))];
        let res = resolve_tie(&tied, |(id, pos)| mode.rank(*id, *pos, 1));
        assert_eq!(res, Some((5, Some(1))));
    }

    #[test]
    fn lot_drawing_is_reproducible() {
        let mode = TieBreakMode::Random(42);
        let tied = [1u32, 2, 3, 4, 5];
        let first = resolve_tie(&tied, |id| mode.rank(*id, None, 3));
        let second = resolve_tie(&tied, |id| mode.rank(*id, None, 3));
        assert_eq!(first, second);
        assert!(tied.contains(&first.unwrap()));
    }

    #[test]
    fn empty_tie() {
        let tied: [u32; 0] = [];
        assert_eq!(
            resolve_tie(&tied, |id| TieBreakMode::LowestId.rank(*id, None, 0)),
            None
        );
    }
}
