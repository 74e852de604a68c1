//! Flat divisor/depth search tree

use serde::{Deserialize, Serialize};

use super::{SearchStrategy, Subdivision};
use crate::error::{QuantizeError, Result};
use crate::offset::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedDefinition {
    pub divisors: Vec<u32>,
    pub max_depth: usize,
    pub max_divisions: usize,
}

impl Default for WeightedDefinition {
    fn default() -> Self {
        Self { divisors: vec![2, 3, 5, 7], max_depth: 3, max_divisions: 2 }
    }
}

/// Search tree offering every composition of every divisor, up to
/// `max_divisions` parts, on any leaf shallower than `max_depth`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WeightedDefinition", into = "WeightedDefinition")]
pub struct WeightedSearchTree {
    definition: WeightedDefinition,
    compositions: Vec<Subdivision>,
}

impl WeightedSearchTree {
    pub fn new(definition: WeightedDefinition) -> Result<Self> {
        if definition.divisors.is_empty() {
            return Err(QuantizeError::InvalidDefinition("no divisors".to_string()));
        }
        if let Some(divisor) = definition.divisors.iter().find(|&&d| d <= 1) {
            return Err(QuantizeError::InvalidDefinition(format!(
                "divisors must be greater than 1, got {divisor}"
            )));
        }
        if definition.max_depth == 0 {
            return Err(QuantizeError::InvalidDefinition("max_depth must be positive".to_string()));
        }
        if definition.max_divisions < 2 {
            return Err(QuantizeError::InvalidDefinition("max_divisions must be at least 2".to_string()));
        }

        let mut compositions: Vec<Subdivision> = Vec::new();
        for &divisor in &definition.divisors {
            for composition in compositions_of(divisor) {
                let parts = composition.len();
                if parts > 1 && parts <= definition.max_divisions && !compositions.contains(&composition) {
                    compositions.push(composition);
                }
            }
        }
        Ok(Self { definition, compositions })
    }

    pub fn definition(&self) -> &WeightedDefinition {
        &self.definition
    }

    pub fn compositions(&self) -> &[Subdivision] {
        &self.compositions
    }
}

impl Default for WeightedSearchTree {
    fn default() -> Self {
        let definition = WeightedDefinition::default();
        let compositions = [2, 3, 5, 7]
            .into_iter()
            .flat_map(compositions_of)
            .filter(|c| c.len() == 2)
            .collect();
        Self { definition, compositions }
    }
}

impl TryFrom<WeightedDefinition> for WeightedSearchTree {
    type Error = QuantizeError;

    fn try_from(definition: WeightedDefinition) -> Result<Self> {
        Self::new(definition)
    }
}

impl From<WeightedSearchTree> for WeightedDefinition {
    fn from(tree: WeightedSearchTree) -> Self {
        tree.definition
    }
}

impl SearchStrategy for WeightedSearchTree {
    fn find_leaf_subdivisions(&self, parentage: &[Duration]) -> Vec<Subdivision> {
        if parentage.len() < self.definition.max_depth {
            self.compositions.clone()
        } else {
            Vec::new()
        }
    }
}

/// All ordered compositions of `n`, reverse-lexicographic:
/// 3 gives (3) (2 1) (1 2) (1 1 1)
fn compositions_of(n: u32) -> Vec<Subdivision> {
    if n == 0 {
        return vec![Vec::new()];
    }
    let mut result = Vec::new();
    for first in (1..=n).rev() {
        for mut rest in compositions_of(n - first) {
            rest.insert(0, first);
            result.push(rest);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_rational::Ratio;

    #[test]
    fn test_compositions_of() {
        assert_eq!(compositions_of(3), vec![vec![3], vec![2, 1], vec![1, 2], vec![1, 1, 1]]);
        assert_eq!(compositions_of(4).len(), 8);
    }

    #[test]
    fn test_default_matches_definition() {
        let built = WeightedSearchTree::new(WeightedDefinition::default()).unwrap();
        assert_eq!(built, WeightedSearchTree::default());
        assert_eq!(built.compositions().len(), 13);
        assert_eq!(built.compositions()[3..7], [vec![4, 1], vec![3, 2], vec![2, 3], vec![1, 4]]);
    }

    #[test]
    fn test_depth_limit() {
        let tree = WeightedSearchTree::new(WeightedDefinition { divisors: vec![2, 3], max_depth: 2, max_divisions: 3 })
            .unwrap();
        let two = Ratio::from_integer(2);
        assert_eq!(
            tree.find_leaf_subdivisions(&[]),
            vec![vec![1, 1], vec![2, 1], vec![1, 2], vec![1, 1, 1]]
        );
        assert_eq!(tree.find_leaf_subdivisions(&[two]).len(), 4);
        assert!(tree.find_leaf_subdivisions(&[two, two]).is_empty());
    }

    #[test]
    fn test_invalid_definition_rejected() {
        let bad = |divisors: Vec<u32>, max_depth, max_divisions| {
            WeightedSearchTree::new(WeightedDefinition { divisors, max_depth, max_divisions }).is_err()
        };
        assert!(bad(vec![], 3, 2));
        assert!(bad(vec![1, 2], 3, 2));
        assert!(bad(vec![2], 0, 2));
        assert!(bad(vec![2], 3, 1));
    }
}
