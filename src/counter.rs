//! Empirical joint counts over a categorical dataset.

use crate::{Assignment, Error, Result, VariableSet};
use bit_set::BitSet;
use std::sync::Arc;

/// The capabilities the learning code needs from an empirical-counts source.
///
/// [`BitCounter`] is the real implementation; tests substitute map-backed
/// fakes with hand-picked counts.
pub trait Counter {
    /// Cardinalities of the observed variables, indexed by id.
    fn cardinality(&self) -> &[usize];

    /// Number of rows in the dataset.
    fn num_tuples(&self) -> usize;

    /// Counts for every assignment of `vars`, in assignment-enumeration
    /// order (first variable fastest) — the layout of a factor table over
    /// `vars`.
    fn count_all(&self, vars: &VariableSet) -> Vec<usize>;
}

/// Empirical counts backed by one row bitmap per (variable, value) pair.
///
/// `bits[v][x]` has bit `r` set iff row `r` has value `x` for variable `v`;
/// a joint count is the popcount of the intersection of the participating
/// bitmaps. The bitmaps are immutable after loading and shared between
/// [`marginalize`](BitCounter::marginalize) views.
#[derive(Clone)]
pub struct BitCounter {
    card: Arc<Vec<usize>>,
    bits: Arc<Vec<Vec<BitSet>>>,
    vars: VariableSet,
    rows: usize,
}

impl BitCounter {
    /// Builds the per-value bitmaps from a dataset.
    ///
    /// Fails with [`Error::InvalidData`] on an empty dataset, ragged rows, or
    /// values outside their declared cardinality.
    pub fn from_data(data: &[Vec<usize>], card: &[usize]) -> Result<BitCounter> {
        if data.is_empty() || card.is_empty() {
            return Err(Error::InvalidData("empty dataset".into()));
        }
        let cols = card.len();
        let mut bits: Vec<Vec<BitSet>> = card
            .iter()
            .map(|&c| (0..c).map(|_| BitSet::with_capacity(data.len())).collect())
            .collect();
        for (r, row) in data.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::InvalidData(format!(
                    "row {} has {} fields, expected {}",
                    r,
                    row.len(),
                    cols
                )));
            }
            for (c, &value) in row.iter().enumerate() {
                if value >= card[c] {
                    return Err(Error::InvalidData(format!(
                        "row {}: value {} out of range for variable {} (cardinality {})",
                        r, value, c, card[c]
                    )));
                }
                bits[c][value].insert(r);
            }
        }
        Ok(BitCounter {
            card: Arc::new(card.to_vec()),
            bits: Arc::new(bits),
            vars: (0..cols).collect(),
            rows: data.len(),
        })
    }

    /// The variables this counter answers for.
    pub fn vars(&self) -> &VariableSet {
        &self.vars
    }

    /// Number of rows matching the assignment. The scalar assignment matches
    /// every row.
    pub fn count(&self, assignment: &Assignment) -> usize {
        debug_assert!(assignment.vars().is_subset(&self.vars));
        let mut pairs = assignment
            .vars()
            .iter()
            .zip(assignment.values().iter().copied());
        let (v0, x0) = match pairs.next() {
            Some(first) => first,
            None => return self.rows,
        };
        let mut acc = self.bits[v0][x0].clone();
        for (v, x) in pairs {
            acc.intersect_with(&self.bits[v][x]);
        }
        acc.len()
    }

    /// A view over a subset of the variables, sharing the bitmaps.
    pub fn marginalize(&self, vars: &VariableSet) -> BitCounter {
        debug_assert!(vars.is_subset(&self.vars));
        BitCounter {
            card: Arc::clone(&self.card),
            bits: Arc::clone(&self.bits),
            vars: vars.clone(),
            rows: self.rows,
        }
    }
}

impl Counter for BitCounter {
    fn cardinality(&self) -> &[usize] {
        &self.card
    }

    fn num_tuples(&self) -> usize {
        self.rows
    }

    fn count_all(&self, vars: &VariableSet) -> Vec<usize> {
        let mut a = Assignment::new(vars, &self.card);
        let mut counts = Vec::with_capacity(a.count());
        loop {
            counts.push(self.count(&a));
            if !a.advance() {
                break;
            }
        }
        counts
    }
}
