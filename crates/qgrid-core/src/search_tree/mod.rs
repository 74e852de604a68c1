//! Search trees: which subdivisions a grid may try next
//!
//! A search step looks at every divisible leaf whose events do not already
//! sit exactly on its start, asks the strategy which ratio tuples that leaf
//! may take, and builds one new grid for every combination across leaves.

mod unweighted;
mod weighted;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::QGrid;
use crate::offset::Duration;

pub use unweighted::{Definition, DefinitionBranch, UnweightedSearchTree, DEFAULT_DEFINITION};
pub use weighted::{WeightedDefinition, WeightedSearchTree};

/// Relative weights of the children a leaf is split into
pub type Subdivision = Vec<u32>;

/// Leaf index paired with the subdivision to apply there
pub type SubdivisionCommand = Vec<(usize, Subdivision)>;

/// Policy for the legal next-level subdivisions of one leaf
pub trait SearchStrategy {
    /// `parentage` holds the divisor of every container above the leaf,
    /// root first
    fn find_leaf_subdivisions(&self, parentage: &[Duration]) -> Vec<Subdivision>;
}

/// Enum wrapper for all search strategies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTree {
    Unweighted(UnweightedSearchTree),
    Weighted(WeightedSearchTree),
}

impl Default for SearchTree {
    fn default() -> Self {
        Self::Unweighted(UnweightedSearchTree::default())
    }
}

impl SearchStrategy for SearchTree {
    fn find_leaf_subdivisions(&self, parentage: &[Duration]) -> Vec<Subdivision> {
        match self {
            Self::Unweighted(tree) => tree.find_leaf_subdivisions(parentage),
            Self::Weighted(tree) => tree.find_leaf_subdivisions(parentage),
        }
    }
}

impl SearchTree {
    /// Leaves worth dividing, each with its legal subdivisions.
    ///
    /// A leaf is skipped when nothing spills onto the next leaf from before
    /// its start and every event it holds sits exactly on its own start.
    /// Leaves with no legal subdivision are dropped silently.
    pub fn find_divisible_leaf_indices_and_subdivisions(&self, grid: &QGrid) -> Vec<(usize, Vec<Subdivision>)> {
        let leaves = grid.leaves();
        let offsets = grid.offsets();
        let mut divisible = Vec::new();
        for (i, pair) in leaves.windows(2).enumerate() {
            let (one, two) = (pair[0], pair[1]);
            if !one.is_divisible {
                continue;
            }
            let (one_start, two_start) = (offsets[i], offsets[i + 1]);
            let spills_over = two.q_event_proxies.iter().any(|p| p.offset() < two_start);
            let aligned = one
                .q_event_proxies
                .iter()
                .filter(|p| p.offset() >= one_start)
                .all(|p| p.offset() == one_start);
            if !spills_over && aligned {
                continue;
            }
            let Some(parentage) = grid.parentage(i) else {
                continue;
            };
            let subdivisions = self.find_leaf_subdivisions(&parentage);
            if !subdivisions.is_empty() {
                divisible.push((i, subdivisions));
            }
        }
        divisible
    }

    /// Cartesian product of every divisible leaf's subdivisions, the first
    /// leaf varying slowest. Empty when no leaf qualifies.
    pub fn generate_all_subdivision_commands(&self, grid: &QGrid) -> Vec<SubdivisionCommand> {
        let divisible = self.find_divisible_leaf_indices_and_subdivisions(grid);
        if divisible.is_empty() {
            return Vec::new();
        }
        let mut commands: Vec<SubdivisionCommand> = vec![Vec::new()];
        for (index, subdivisions) in &divisible {
            commands = commands
                .into_iter()
                .flat_map(|prefix| {
                    subdivisions.iter().map(move |subdivision| {
                        let mut command = prefix.clone();
                        command.push((*index, subdivision.clone()));
                        command
                    })
                })
                .collect();
        }
        commands
    }

    /// One expansion step: a refitted copy of `grid` per subdivision command
    pub fn search(&self, grid: &QGrid) -> Result<Vec<QGrid>> {
        let commands = self.generate_all_subdivision_commands(grid);
        let mut new_grids = Vec::with_capacity(commands.len());
        for command in &commands {
            let mut new_grid = grid.clone();
            let displaced = new_grid.subdivide_leaves(command)?;
            new_grid.fit_q_events(displaced);
            new_grid.sort_q_events_by_index();
            new_grids.push(new_grid);
        }
        Ok(new_grids)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::event::QEvent;
    use crate::proxy::QEventProxy;
    use num_rational::Ratio;
    use std::sync::Arc;

    pub(crate) const FIXTURE_DEFINITION: &[DefinitionBranch] = &[
        DefinitionBranch::new(2, &[DefinitionBranch::new(2, &[DefinitionBranch::terminal(2)]), DefinitionBranch::terminal(3)]),
        DefinitionBranch::terminal(5),
    ];

    /// Eleven silent events at 0, 1/5, 1/4, 1/3, 2/5, 1/2, 3/5, 2/3, 3/4, 4/5, 1
    pub(crate) fn fixture_proxies() -> Vec<QEventProxy> {
        [(0, 1), (1, 5), (1, 4), (1, 3), (2, 5), (1, 2), (3, 5), (2, 3), (3, 4), (4, 5), (1, 1)]
            .iter()
            .enumerate()
            .map(|(index, &(numer, denom))| {
                let offset = Ratio::new(numer, denom);
                let event = QEvent::silent(offset, vec![], Some(index)).unwrap();
                QEventProxy::new(Arc::new(event), offset).unwrap()
            })
            .collect()
    }

    fn fixture_tree() -> SearchTree {
        SearchTree::Unweighted(UnweightedSearchTree::new(Definition::from_branches(FIXTURE_DEFINITION).unwrap()).unwrap())
    }

    fn fitted_grid() -> QGrid {
        let mut grid = QGrid::new();
        grid.fit_q_events(fixture_proxies());
        grid
    }

    fn leaf_indices(grid: &QGrid) -> Vec<Vec<usize>> {
        grid.leaves()
            .iter()
            .map(|leaf| leaf.q_event_proxies.iter().filter_map(QEventProxy::index).collect())
            .collect()
    }

    #[test]
    fn test_find_divisible_leaf_indices_and_subdivisions() {
        let divisible = fixture_tree().find_divisible_leaf_indices_and_subdivisions(&fitted_grid());
        assert_eq!(divisible, vec![(0, vec![vec![1, 1], vec![1, 1, 1, 1, 1]])]);
    }

    #[test]
    fn test_aligned_leaf_is_not_divisible() {
        let mut grid = QGrid::new();
        grid.fit_q_events(fixture_proxies().into_iter().take(1));
        assert!(fixture_tree().find_divisible_leaf_indices_and_subdivisions(&grid).is_empty());
    }

    #[test]
    fn test_indivisible_leaf_is_skipped() {
        let mut grid = fitted_grid();
        grid.set_divisible(0, false).unwrap();
        assert!(fixture_tree().generate_all_subdivision_commands(&grid).is_empty());
    }

    #[test]
    fn test_generate_all_subdivision_commands() {
        let tree = fixture_tree();
        let commands = tree.generate_all_subdivision_commands(&fitted_grid());
        assert_eq!(commands, vec![vec![(0, vec![1, 1])], vec![(0, vec![1, 1, 1, 1, 1])]]);

        let children = tree.search(&fitted_grid()).unwrap();
        assert_eq!(children.len(), 2);

        let halves = &children[0];
        assert_eq!(halves.rtm_format(), "(1 (1 1))");
        assert_eq!(leaf_indices(halves), vec![vec![0, 1, 2], vec![3, 4, 5, 6, 7, 8], vec![9, 10]]);
        assert_eq!(
            tree.generate_all_subdivision_commands(halves),
            vec![
                vec![(0, vec![1, 1]), (1, vec![1, 1])],
                vec![(0, vec![1, 1]), (1, vec![1, 1, 1])],
                vec![(0, vec![1, 1, 1]), (1, vec![1, 1])],
                vec![(0, vec![1, 1, 1]), (1, vec![1, 1, 1])],
            ]
        );

        let fifths = &children[1];
        assert_eq!(fifths.rtm_format(), "(1 (1 1 1 1 1))");
        assert_eq!(
            leaf_indices(fifths),
            vec![vec![0], vec![1, 2], vec![3, 4, 5], vec![6, 7], vec![8, 9], vec![10]]
        );
        assert!(tree.generate_all_subdivision_commands(fifths).is_empty());
    }

    #[test]
    fn test_search_leaves_source_grid_untouched() {
        let grid = fitted_grid();
        let children = fixture_tree().search(&grid).unwrap();
        assert_eq!(grid.rtm_format(), "1");
        assert!(children.iter().all(|child| child != &grid));
    }

    #[test]
    fn test_weighted_search() {
        let tree = SearchTree::Weighted(WeightedSearchTree::default());
        let rtm: Vec<String> = tree.search(&fitted_grid()).unwrap().iter().map(QGrid::rtm_format).collect();
        assert_eq!(
            rtm,
            vec![
                "(1 (1 1))",
                "(1 (2 1))",
                "(1 (1 2))",
                "(1 (4 1))",
                "(1 (3 2))",
                "(1 (2 3))",
                "(1 (1 4))",
                "(1 (6 1))",
                "(1 (5 2))",
                "(1 (4 3))",
                "(1 (3 4))",
                "(1 (2 5))",
                "(1 (1 6))",
            ]
        );
    }

    #[test]
    fn test_search_tree_serde() {
        let tree: SearchTree =
            serde_json::from_str(r#"{"weighted": {"divisors": [2, 3], "max_depth": 2, "max_divisions": 2}}"#).unwrap();
        let SearchTree::Weighted(weighted) = &tree else {
            panic!("expected weighted tree");
        };
        assert_eq!(weighted.compositions(), &[vec![1, 1], vec![2, 1], vec![1, 2]]);

        let tree: SearchTree = serde_json::from_str(r#"{"unweighted": {"2": null, "3": {"2": null}}}"#).unwrap();
        assert_eq!(tree.find_leaf_subdivisions(&[]), vec![vec![1, 1], vec![1, 1, 1]]);
    }
}
