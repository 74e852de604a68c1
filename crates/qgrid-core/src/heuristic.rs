//! Heuristics: picking one grid per beat

use num_traits::Zero;

use crate::grid::QGrid;
use crate::offset::RationalOffset;
use crate::target::QTargetBeat;

/// Trait for grid selection strategies.
///
/// After `process` every beat holds exactly one chosen grid and no
/// remaining candidates.
pub trait Heuristic: Send + Sync {
    fn name(&self) -> &str;
    fn process(&self, beats: &mut [QTargetBeat]);
}

/// Lowest mean distance wins, fewer leaves breaks ties, then the earliest
/// candidate. A grid with nothing fitted counts as a perfect fit.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceHeuristic;

impl Heuristic for DistanceHeuristic {
    fn name(&self) -> &str {
        "Distance"
    }

    fn process(&self, beats: &mut [QTargetBeat]) {
        for beat in beats {
            let chosen = std::mem::take(&mut beat.q_grids)
                .into_iter()
                .min_by_key(|grid| (grid.distance().unwrap_or_else(RationalOffset::zero), grid.leaf_count()));
            beat.q_grid = Some(chosen.unwrap_or_else(QGrid::new));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::QuantizationJob;
    use crate::offset::{Duration, MetronomeMark};
    use crate::search_tree::tests::{fixture_proxies, FIXTURE_DEFINITION};
    use crate::search_tree::{Definition, SearchTree, UnweightedSearchTree};
    use num_rational::Ratio;

    fn beat() -> QTargetBeat {
        QTargetBeat::new(Duration::new(1, 4), Ratio::zero(), SearchTree::default(), MetronomeMark::default())
    }

    #[test]
    fn test_picks_closest_grid() {
        let tree = SearchTree::Unweighted(UnweightedSearchTree::new(Definition::from_branches(FIXTURE_DEFINITION).unwrap()).unwrap());
        let mut job = QuantizationJob::new(0, tree, &fixture_proxies());
        job.run().unwrap();

        let mut beats = vec![beat()];
        beats[0].q_grids = job.take_q_grids();
        DistanceHeuristic.process(&mut beats);
        let chosen = beats[0].q_grid.as_ref().unwrap();
        assert_eq!(chosen.rtm_format(), "(1 ((1 ((1 (1 1)) (1 (1 1)))) (1 ((1 (1 1)) (1 (1 1))))))");
        assert_eq!(chosen.distance(), Some(Ratio::new(7, 330)));
        assert!(beats[0].q_grids.is_empty());
    }

    #[test]
    fn test_ties_prefer_fewer_leaves_then_first() {
        let mut coarse = QGrid::new();
        coarse.subdivide_leaf(0, &[1, 1]).unwrap();
        let mut fine = QGrid::new();
        fine.subdivide_leaf(0, &[1, 1, 1, 1]).unwrap();
        let mut twin = QGrid::new();
        twin.subdivide_leaf(0, &[1, 1]).unwrap();
        let coarse_id = coarse.id();

        let mut beats = vec![beat()];
        beats[0].q_grids = vec![fine, coarse, twin];
        DistanceHeuristic.process(&mut beats);
        assert_eq!(beats[0].q_grid.as_ref().map(QGrid::id), Some(coarse_id));
    }

    #[test]
    fn test_empty_beat_gets_default_grid() {
        let mut beats = vec![beat(), beat()];
        DistanceHeuristic.process(&mut beats);
        for beat in &beats {
            assert_eq!(beat.q_grid.as_ref().map(QGrid::rtm_format).as_deref(), Some("1"));
        }
    }
}
