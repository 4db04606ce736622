//! Lexicographic enumeration of the assignments of a variable set.

use crate::VariableSet;
use smallvec::SmallVec;

/// A cursor over every assignment of a variable set, in factor-table order.
///
/// The first (lowest-id) variable varies fastest, so the sequence of
/// [`index`](Assignment::index) values is `0, 1, 2, ...` — exactly the layout
/// of a [`Factor`](crate::Factor) table over the same set. An empty variable
/// set has the single scalar assignment.
///
/// ```
/// use cliquelearn::{Assignment, VariableSet};
///
/// let vars = VariableSet::new(&[0, 2]);
/// let mut a = Assignment::new(&vars, &[2, 9, 3]);
/// let mut seen = Vec::new();
/// loop {
///     seen.push((a.values().to_vec(), a.index()));
///     if !a.advance() {
///         break;
///     }
/// }
/// assert_eq!(seen.len(), 6);
/// assert_eq!(seen[0], (vec![0, 0], 0));
/// assert_eq!(seen[1], (vec![1, 0], 1));
/// assert_eq!(seen[2], (vec![0, 1], 2));
/// assert_eq!(seen[5], (vec![1, 2], 5));
/// ```
#[derive(Clone, Debug)]
pub struct Assignment {
    vars: VariableSet,
    card: SmallVec<[usize; 4]>,
    values: SmallVec<[usize; 4]>,
}

impl Assignment {
    /// Starts at the all-zero assignment over `vars`.
    ///
    /// `card` is the global cardinality vector, indexed by variable id.
    pub fn new(vars: &VariableSet, card: &[usize]) -> Assignment {
        let restricted: SmallVec<[usize; 4]> = vars.iter().map(|v| card[v]).collect();
        let values = restricted.iter().map(|_| 0).collect();
        Assignment {
            vars: vars.clone(),
            card: restricted,
            values,
        }
    }

    /// The variable set being enumerated.
    pub fn vars(&self) -> &VariableSet {
        &self.vars
    }

    /// Current values, aligned with the sorted variable order.
    pub fn values(&self) -> &[usize] {
        &self.values
    }

    /// Value currently assigned to `v`, if it is in the set.
    pub fn get(&self, v: usize) -> Option<usize> {
        self.vars.position(v).map(|i| self.values[i])
    }

    /// Linear offset of the current assignment in a factor table over the
    /// same variable set (`stride[0] = 1`, `stride[i] = stride[i-1] ·
    /// card[i-1]`).
    pub fn index(&self) -> usize {
        let mut index = 0;
        let mut stride = 1;
        for (value, card) in self.values.iter().zip(&self.card) {
            index += value * stride;
            stride *= card;
        }
        index
    }

    /// Total number of assignments in the sequence.
    pub fn count(&self) -> usize {
        self.card.iter().product()
    }

    /// Steps to the next assignment; returns `false` once the sequence has
    /// wrapped back to all zeroes.
    pub fn advance(&mut self) -> bool {
        for (value, card) in self.values.iter_mut().zip(&self.card) {
            *value += 1;
            if *value < *card {
                return true;
            }
            *value = 0;
        }
        false
    }
}
