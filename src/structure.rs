//! Random bounded-treewidth structures.

use crate::likelihood::structure_score;
use crate::{CliqueTree, Counter, Error, Result, VariableSet};
use rand::seq::SliceRandom;
use rand::Rng;

/// Samples a random clique tree of treewidth `k` over variables `0..n`.
///
/// The tree is grown the k-tree way: a root clique of `k + 1` shuffled
/// variables, then each remaining variable forms a new clique with a random
/// `k`-subset of a randomly chosen existing clique, attached to that clique.
/// Growing along an existing clique is what keeps the running-intersection
/// property intact, so the result always passes [`CliqueTree::new`]
/// validation.
pub fn random_ktree<R: Rng + ?Sized>(
    n: usize,
    k: usize,
    card: &[usize],
    rng: &mut R,
) -> Result<CliqueTree> {
    if k == 0 {
        return Err(Error::InvalidArgument("treewidth must be at least 1".into()));
    }
    if n < k + 1 {
        return Err(Error::InvalidArgument(format!(
            "treewidth {k} needs at least {} variables, got {n}",
            k + 1
        )));
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    let mut cliques: Vec<Vec<usize>> = vec![order[..k + 1].to_vec()];
    let mut neighbours: Vec<Vec<usize>> = vec![Vec::new()];
    for &v in &order[k + 1..] {
        let host = rng.gen_range(0..cliques.len());
        let mut clique = cliques[host].clone();
        clique.remove(rng.gen_range(0..clique.len()));
        clique.push(v);

        let id = cliques.len();
        cliques.push(clique);
        neighbours.push(vec![host]);
        neighbours[host].push(id);
    }

    CliqueTree::new(
        cliques.iter().map(|c| VariableSet::new(c)).collect(),
        neighbours,
        card,
    )
}

/// Samples `samples` random structures and keeps the best one by
/// [`structure_score`], returning it with its score.
pub fn best_structure<C: Counter, R: Rng + ?Sized>(
    counter: &C,
    n: usize,
    k: usize,
    card: &[usize],
    samples: usize,
    rng: &mut R,
) -> Result<(CliqueTree, f64)> {
    let mut best: Option<(CliqueTree, f64)> = None;
    for _ in 0..samples.max(1) {
        let tree = random_ktree(n, k, card, rng)?;
        let cliques: Vec<VariableSet> = tree.cliques().cloned().collect();
        let score = structure_score(&cliques, &tree.separators(), counter);
        if best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((tree, score));
        }
    }
    Ok(best.expect("at least one structure was sampled"))
}
