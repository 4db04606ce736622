#![warn(missing_docs)]
#![doc(test(no_crate_inject))]
#![doc(test(attr(deny(unused, future_incompatible))))]

//! This crate learns the parameters of discrete probabilistic graphical models
//! whose joint distribution is represented as a clique tree (also called a
//! junction tree), optionally with latent variables. Given a categorical
//! dataset and a fixed tree of bounded treewidth, it fits the clique
//! potentials by expectation-maximisation on top of exact sum-product
//! calibration, as described by:
//!
//! - Lauritzen & Spiegelhalter, *Local Computations with Probabilities on
//!   Graphical Structures and their Application to Expert Systems*, 1988
//! - Koller & Friedman, *Probabilistic Graphical Models*, 2009 (chapters 10
//!   and 19)
//!
//! The pieces compose in dataset order: [`dataset`] reads categorical rows,
//! [`counter`] turns them into empirical joint counts, [`learn`] builds
//! initial clique potentials from those counts, [`cliquetree`] calibrates the
//! tree exactly, [`em`] drives the training loop, and [`likelihood`] scores
//! the result.

pub use sorted_iter;

use smallvec::SmallVec;
use sorted_iter::assume::AssumeSortedByItemExt;
use sorted_iter::sorted_iterator::SortedByItem;
use sorted_iter::SortedIterator;
use std::iter;

pub mod assignment;
pub mod cliquetree;
pub mod counter;
pub mod dataset;
pub mod em;
pub mod factor;
pub mod learn;
pub mod likelihood;
pub mod structure;

pub use assignment::Assignment;
pub use cliquetree::CliqueTree;
pub use counter::{BitCounter, Counter};
pub use dataset::{Dataset, HeaderFlags};
pub use em::{expectation_maximization, EmConfig, EmStats};
pub use factor::Factor;
pub use learn::{InitDist, InitMode};

/// Errors produced by this crate.
///
/// Structural and shape errors fail fast; [`Error::DegeneratePotential`] is
/// recoverable per dataset row during EM (the driver skips the row and keeps
/// a count); [`Error::NumericFailure`] is always fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required parameter was missing, out of range, or unrecognised.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The dataset is malformed: ragged rows, out-of-range values, or no rows
    /// at all.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The supplied clique tree is not a tree, or violates the
    /// running-intersection property.
    #[error("structure violation: {0}")]
    StructureViolation(String),

    /// A factor operation was asked to combine incompatible variable sets.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A factor summed to zero during normalisation, usually because evidence
    /// has zero probability under the current potentials.
    #[error("degenerate potential: table sums to zero")]
    DegeneratePotential,

    /// A non-finite value arose in a factor table.
    #[error("non-finite value in factor table")]
    NumericFailure,

    /// An I/O error while reading or writing a dataset, tree, or marginals
    /// file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A set of variables.
///
/// Variables are dense integer ids: the observed columns of a dataset come
/// first (`0..num_observed`), hidden variables follow. Each id indexes a
/// global cardinality vector. The set is kept sorted ascending, which is also
/// the canonical dimension order of factor tables, and avoids heap
/// allocations for the clique-sized sets this crate deals in.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VariableSet(SmallVec<[usize; 4]>);

impl VariableSet {
    /// Creates a variable set containing the specified variables.
    ///
    /// It's okay if the provided slice contains duplicates.
    pub fn new(ids: &[usize]) -> Self {
        let mut v = SmallVec::from_slice(ids);
        v.sort_unstable();
        v.dedup();
        VariableSet(v)
    }

    /// The empty variable set (the scope of a scalar factor).
    pub fn empty() -> Self {
        VariableSet(SmallVec::new())
    }

    /// The number of variables in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set contains no variables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the variables which appear in this set.
    ///
    /// ```
    /// use cliquelearn::VariableSet;
    ///
    /// let abc = VariableSet::new(&[2, 3, 1]);
    /// let mut it = abc.iter();
    /// assert_eq!(it.next(), Some(1));
    /// assert_eq!(it.next(), Some(2));
    /// assert_eq!(it.next(), Some(3));
    /// assert_eq!(it.next(), None);
    /// ```
    pub fn iter(&self) -> impl Iterator<Item = usize> + SortedByItem + Clone + '_ {
        self.0.iter().copied().assume_sorted_by_item()
    }

    /// The variables as a sorted slice.
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Returns `true` if `v` is in the set.
    pub fn contains(&self, v: usize) -> bool {
        self.0.binary_search(&v).is_ok()
    }

    /// Position of `v` in the sorted order, which is also its dimension index
    /// in a factor table over this set.
    pub fn position(&self, v: usize) -> Option<usize> {
        self.0.binary_search(&v).ok()
    }

    /// Returns `true` if `other` contains every variable that `self` does.
    ///
    /// ```
    /// use cliquelearn::VariableSet;
    /// let nil = VariableSet::new(&[]);
    /// let one = VariableSet::new(&[1]);
    ///
    /// assert!(nil.is_subset(&one));
    /// assert!(nil.is_subset(&nil));
    /// assert!(one.is_subset(&one));
    /// assert!(!one.is_subset(&nil));
    /// ```
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().intersection(other.iter()).eq(self.iter())
    }

    /// Returns `true` if `self` contains every variable that `other` does.
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }

    /// The variables appearing in either set.
    pub fn union(&self, other: &Self) -> Self {
        self.iter().union(other.iter()).collect()
    }

    /// The variables appearing in both sets.
    ///
    /// ```
    /// use cliquelearn::VariableSet;
    ///
    /// let ab = VariableSet::new(&[0, 1]);
    /// let bc = VariableSet::new(&[1, 2]);
    /// assert_eq!(ab.intersection(&bc), VariableSet::new(&[1]));
    /// ```
    pub fn intersection(&self, other: &Self) -> Self {
        self.iter().intersection(other.iter()).collect()
    }

    /// The variables of `self` that do not appear in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        self.iter().difference(other.iter()).collect()
    }
}

impl std::fmt::Debug for VariableSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl iter::FromIterator<usize> for VariableSet {
    /// Creates a variable set containing the specified variables.
    ///
    /// It's okay if the provided iterator contains duplicates.
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut v = SmallVec::from_iter(iter);
        v.sort_unstable();
        v.dedup();
        VariableSet(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_operations() {
        let ab = VariableSet::new(&[1, 0]);
        let bc = VariableSet::new(&[2, 1, 2]);

        assert_eq!(ab.union(&bc), VariableSet::new(&[0, 1, 2]));
        assert_eq!(ab.intersection(&bc), VariableSet::new(&[1]));
        assert_eq!(ab.difference(&bc), VariableSet::new(&[0]));
        assert_eq!(bc.difference(&ab), VariableSet::new(&[2]));
    }

    #[test]
    fn positions_follow_sorted_order() {
        let s = VariableSet::new(&[7, 2, 5]);
        assert_eq!(s.position(2), Some(0));
        assert_eq!(s.position(5), Some(1));
        assert_eq!(s.position(7), Some(2));
        assert_eq!(s.position(3), None);
        assert!(s.contains(5));
        assert!(!s.contains(0));
    }
}
