//! Divisor-dictionary search tree

use std::collections::BTreeMap;

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::{SearchStrategy, Subdivision};
use crate::error::{QuantizeError, Result};
use crate::offset::Duration;

/// One branch of a static definition: a divisor and the divisors allowed
/// beneath each of its parts. No children means the branch stops here.
#[derive(Debug, Clone, Copy)]
pub struct DefinitionBranch {
    pub divisor: u32,
    pub children: &'static [DefinitionBranch],
}

impl DefinitionBranch {
    pub const fn new(divisor: u32, children: &'static [DefinitionBranch]) -> Self {
        Self { divisor, children }
    }

    pub const fn terminal(divisor: u32) -> Self {
        Self { divisor, children: &[] }
    }
}

/// Default nesting: duplets down to sixteenths, triplets, quintuplets,
/// septuplets, plus undivided 11- and 13-tuplets.
pub const DEFAULT_DEFINITION: &[DefinitionBranch] = &[
    DefinitionBranch::new(
        2,
        &[
            DefinitionBranch::new(2, &[DefinitionBranch::new(2, &[DefinitionBranch::terminal(2)]), DefinitionBranch::terminal(3)]),
            DefinitionBranch::terminal(3),
            DefinitionBranch::terminal(5),
            DefinitionBranch::terminal(7),
        ],
    ),
    DefinitionBranch::new(
        3,
        &[
            DefinitionBranch::new(2, &[DefinitionBranch::terminal(2)]),
            DefinitionBranch::terminal(3),
            DefinitionBranch::terminal(5),
        ],
    ),
    DefinitionBranch::new(5, &[DefinitionBranch::terminal(2), DefinitionBranch::terminal(3)]),
    DefinitionBranch::new(7, &[DefinitionBranch::terminal(2)]),
    DefinitionBranch::terminal(11),
    DefinitionBranch::terminal(13),
];

/// Recursive divisor map; `None` marks a branch that may not divide further
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Definition(BTreeMap<u32, Option<Definition>>);

impl Definition {
    pub fn new(map: BTreeMap<u32, Option<Definition>>) -> Result<Self> {
        let definition = Self(map);
        definition.validate()?;
        Ok(definition)
    }

    pub fn from_branches(branches: &[DefinitionBranch]) -> Result<Self> {
        let definition = Self::from_branches_unchecked(branches);
        definition.validate()?;
        Ok(definition)
    }

    fn from_branches_unchecked(branches: &[DefinitionBranch]) -> Self {
        Self(
            branches
                .iter()
                .map(|branch| {
                    let children = (!branch.children.is_empty())
                        .then(|| Self::from_branches_unchecked(branch.children));
                    (branch.divisor, children)
                })
                .collect(),
        )
    }

    fn validate(&self) -> Result<()> {
        for (&divisor, child) in &self.0 {
            if divisor <= 1 {
                return Err(QuantizeError::InvalidDefinition(format!(
                    "divisors must be greater than 1, got {divisor}"
                )));
            }
            if let Some(child) = child {
                child.validate()?;
            }
        }
        Ok(())
    }

    pub fn divisors(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    pub fn get(&self, divisor: u32) -> Option<&Option<Definition>> {
        self.0.get(&divisor)
    }
}

impl Default for Definition {
    fn default() -> Self {
        Self::from_branches_unchecked(DEFAULT_DEFINITION)
    }
}

impl TryFrom<BTreeMap<u32, Option<Definition>>> for Definition {
    type Error = QuantizeError;

    fn try_from(map: BTreeMap<u32, Option<Definition>>) -> Result<Self> {
        Self::new(map)
    }
}

/// Search tree whose legal subdivisions follow a nested divisor map,
/// matched against the divisors already used above a leaf
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Definition", into = "Definition")]
pub struct UnweightedSearchTree {
    definition: Definition,
}

impl UnweightedSearchTree {
    pub fn new(definition: Definition) -> Result<Self> {
        definition.validate()?;
        Ok(Self { definition })
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }
}

impl TryFrom<Definition> for UnweightedSearchTree {
    type Error = QuantizeError;

    fn try_from(definition: Definition) -> Result<Self> {
        Self::new(definition)
    }
}

impl From<UnweightedSearchTree> for Definition {
    fn from(tree: UnweightedSearchTree) -> Self {
        tree.definition
    }
}

impl SearchStrategy for UnweightedSearchTree {
    fn find_leaf_subdivisions(&self, parentage: &[Duration]) -> Vec<Subdivision> {
        let mut node = &self.definition;
        for divisor in parentage {
            let key = if divisor.is_integer() { divisor.to_integer().to_u32() } else { None };
            match key.and_then(|key| node.get(key)) {
                Some(Some(child)) => node = child,
                _ => return Vec::new(),
            }
        }
        node.divisors().map(|divisor| vec![1; divisor as usize]).collect()
    }
}
