//! Structure scores and data log-likelihood.

use crate::{CliqueTree, Counter, Factor, Result, VariableSet};

/// `Σ_α n_α · ln(n_α / N)` over the empirical counts of the observed part of
/// `vars` — the maximum log-likelihood the data admits for that scope. Hidden
/// variables are invisible to the counter and are ignored; an all-hidden
/// scope contributes nothing.
fn entropy_term<C: Counter>(counter: &C, vars: &VariableSet) -> f64 {
    let num_observed = counter.cardinality().len();
    let observed: VariableSet = vars.iter().filter(|&v| v < num_observed).collect();
    if observed.is_empty() {
        return 0.0;
    }
    let total = counter.num_tuples() as f64;
    counter
        .count_all(&observed)
        .into_iter()
        .filter(|&n| n > 0)
        .map(|n| {
            let n = n as f64;
            n * (n / total).ln()
        })
        .sum()
}

/// Ranks candidate structures: `Σ_cliques H̃ − Σ_separators H̃` over empirical
/// entropy terms. For fully observed scopes this equals the maximum data
/// log-likelihood any parameterisation of the tree can reach, which is what
/// makes it a sound ranking; with hidden variables it scores the observed
/// projection.
pub fn structure_score<C: Counter>(
    cliques: &[VariableSet],
    separators: &[VariableSet],
    counter: &C,
) -> f64 {
    let clique_terms: f64 = cliques.iter().map(|c| entropy_term(counter, c)).sum();
    let separator_terms: f64 = separators.iter().map(|s| entropy_term(counter, s)).sum();
    clique_terms - separator_terms
}

/// Data log-likelihood of a calibrated tree.
///
/// The tree distribution factors as `∏ β̂_c / ∏ μ̂_s` over normalised clique
/// beliefs and separator marginals, so the log-likelihood of the dataset is
/// the clique count-weighted log-beliefs minus the separator ones. Hidden
/// dimensions are summed out of each belief first, which is exact when every
/// row is fully observed and scores the observed projection otherwise.
///
/// Returns `-inf` if the model assigns zero probability to an observed
/// configuration.
pub fn loglikelihood<C: Counter>(tree: &CliqueTree, counter: &C) -> Result<f64> {
    let mut total = 0.0;
    for i in 0..tree.len() {
        total += belief_term(tree.calibrated(i), tree.vars(i), counter)?;
    }
    for (i, j) in tree.edges() {
        let separator = tree.separator(i, j);
        let rest = tree.vars(i).difference(&separator);
        let marginal = tree.calibrated(i).sum_out_all(&rest);
        total -= belief_term(&marginal, &separator, counter)?;
    }
    Ok(total)
}

/// `Σ_α N(α) · ln p̂(α)` for the observed projection of one belief.
fn belief_term<C: Counter>(belief: &Factor, vars: &VariableSet, counter: &C) -> Result<f64> {
    let num_observed = counter.cardinality().len();
    let observed: VariableSet = vars.iter().filter(|&v| v < num_observed).collect();
    if observed.is_empty() {
        return Ok(0.0);
    }
    let hidden = vars.difference(&observed);
    let mut marginal = belief.sum_out_all(&hidden);
    marginal.normalize()?;

    let counts = counter.count_all(&observed);
    Ok(counts
        .iter()
        .zip(marginal.values())
        .filter(|(&n, _)| n > 0)
        .map(|(&n, &p)| n as f64 * p.ln())
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::BitCounter;
    use crate::{CliqueTree, Factor};

    fn counter() -> BitCounter {
        let data = vec![
            vec![0, 0, 0],
            vec![0, 0, 1],
            vec![0, 1, 0],
            vec![1, 1, 0],
            vec![1, 1, 1],
            vec![1, 1, 1],
        ];
        BitCounter::from_data(&data, &[2, 2, 2]).unwrap()
    }

    fn chain_over(card: &[usize]) -> CliqueTree {
        CliqueTree::new(
            vec![VariableSet::new(&[0, 1]), VariableSet::new(&[1, 2])],
            vec![vec![1], vec![0]],
            card,
        )
        .unwrap()
    }

    #[test]
    fn structure_score_prefers_the_informative_edge() {
        let counter = counter();
        // variables 0 and 1 are strongly dependent in the data, 0 and 2 less
        // so; a tree keeping the {0,1} clique should score higher than one
        // splitting them
        let good = [VariableSet::new(&[0, 1]), VariableSet::new(&[1, 2])];
        let good_seps = [VariableSet::new(&[1])];
        let bad = [VariableSet::new(&[0, 2]), VariableSet::new(&[1, 2])];
        let bad_seps = [VariableSet::new(&[2])];
        let g = structure_score(&good, &good_seps, &counter);
        let b = structure_score(&bad, &bad_seps, &counter);
        assert!(g > b, "expected {g} > {b}");
    }

    #[test]
    fn saturated_potentials_reach_the_structure_score() {
        let counter = counter();
        let card = [2, 2, 2];
        let mut tree = chain_over(&card);

        // P(0,1) · P(2|1): the maximum-likelihood parameterisation of this
        // structure
        let rows = counter.num_tuples() as f64;
        let joint: Vec<f64> = counter
            .count_all(&VariableSet::new(&[0, 1]))
            .into_iter()
            .map(|n| n as f64 / rows)
            .collect();
        let n1 = counter.count_all(&VariableSet::new(&[1]));
        let cond: Vec<f64> = counter
            .count_all(&VariableSet::new(&[1, 2]))
            .into_iter()
            .enumerate()
            .map(|(idx, n)| n as f64 / n1[idx % 2] as f64)
            .collect();
        tree.set_all_potentials(vec![
            Factor::from_values(VariableSet::new(&[0, 1]), &card, joint).unwrap(),
            Factor::from_values(VariableSet::new(&[1, 2]), &card, cond).unwrap(),
        ])
        .unwrap();
        tree.calibrate();

        let ll = loglikelihood(&tree, &counter).unwrap();
        let cliques: Vec<VariableSet> = tree.cliques().cloned().collect();
        let score = structure_score(&cliques, &tree.separators(), &counter);
        assert!(
            (ll - score).abs() < 1e-9,
            "log-likelihood {ll} vs structure score {score}"
        );
    }

    #[test]
    fn uniform_potentials_score_like_a_fair_coin_per_cell() {
        let counter = counter();
        let mut tree = chain_over(&[2, 2, 2]);
        tree.calibrate();
        // uniform beliefs assign probability 1/4 to every clique cell and 1/2
        // to every separator cell
        let expected = 6.0 * (2.0 * 0.25f64.ln() - 0.5f64.ln());
        let ll = loglikelihood(&tree, &counter).unwrap();
        assert!((ll - expected).abs() < 1e-9);
    }
}
