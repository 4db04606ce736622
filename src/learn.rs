//! Initial clique potentials and marginal utilities.

use crate::{CliqueTree, Counter, Error, Factor, Result, VariableSet};
use rand::Rng;
use std::io::{BufRead, Write};
use std::str::FromStr;

/// How the observed/hidden split of a clique shapes its initial potential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitMode {
    /// Empirical marginal over the observed part, extended by a factor over
    /// the hidden part that does not depend on the observed values.
    Independent,
    /// Empirical marginal over the observed part, extended by a conditional
    /// over the hidden part given the observed one.
    Conditional,
    /// The whole joint drawn from the distribution, ignoring counts.
    Full,
}

impl FromStr for InitMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<InitMode> {
        match s {
            "independent" => Ok(InitMode::Independent),
            "conditional" => Ok(InitMode::Conditional),
            "full" => Ok(InitMode::Full),
            _ => Err(Error::InvalidArgument(format!(
                "unknown mode {s:?} (expected independent, conditional, or full)"
            ))),
        }
    }
}

/// The randomness family used for the non-empirical parts of an initial
/// potential.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InitDist {
    /// All entries equal.
    Uniform,
    /// Independent Uniform(0, 1] draws, normalised.
    Random,
    /// Independent Gamma(α, 1) draws, normalised.
    Dirichlet(f64),
}

/// Builds one initial potential per clique.
///
/// Variables below `num_observed` are dataset columns whose empirical counts
/// come from `counter`; the rest are hidden. Every returned table is strictly
/// positive and sums to one: strict positivity is what lets EM move mass
/// anywhere later, so empirical count vectors containing zeros get add-one
/// smoothing before normalisation.
pub fn initial_potentials<C: Counter, R: Rng + ?Sized>(
    counter: &C,
    cliques: &[VariableSet],
    card: &[usize],
    num_observed: usize,
    mode: InitMode,
    dist: InitDist,
    rng: &mut R,
) -> Result<Vec<Factor>> {
    cliques
        .iter()
        .map(|clique| initial_potential(counter, clique, card, num_observed, mode, dist, rng))
        .collect()
}

fn initial_potential<C: Counter, R: Rng + ?Sized>(
    counter: &C,
    clique: &VariableSet,
    card: &[usize],
    num_observed: usize,
    mode: InitMode,
    dist: InitDist,
    rng: &mut R,
) -> Result<Factor> {
    let observed: VariableSet = clique.iter().filter(|&v| v < num_observed).collect();
    let hidden: VariableSet = clique.iter().filter(|&v| v >= num_observed).collect();

    let mut potential = if observed.is_empty() || mode == InitMode::Full {
        let scope = if mode == InitMode::Full {
            clique.clone()
        } else {
            hidden.clone()
        };
        dist_factor(scope, card, dist, rng)?
    } else {
        let mut empirical = empirical_factor(counter, &observed, card)?;
        if !hidden.is_empty() {
            let extension = match mode {
                InitMode::Independent => dist_factor(hidden.clone(), card, dist, rng)?,
                InitMode::Conditional => {
                    conditional_factor(&observed, &hidden, card, dist, rng)?
                }
                InitMode::Full => unreachable!("handled above"),
            };
            empirical = empirical.product(&extension);
        }
        empirical
    };
    potential.normalize()?;
    Ok(potential)
}

/// Normalised empirical counts over `observed`, smoothed away from zero.
fn empirical_factor<C: Counter>(
    counter: &C,
    observed: &VariableSet,
    card: &[usize],
) -> Result<Factor> {
    let counts = counter.count_all(observed);
    let smooth = usize::from(counts.contains(&0));
    let values = counts.iter().map(|&n| (n + smooth) as f64).collect();
    let mut factor = Factor::from_values(observed.clone(), card, values)?;
    factor.normalize()?;
    Ok(factor)
}

fn dist_factor<R: Rng + ?Sized>(
    vars: VariableSet,
    card: &[usize],
    dist: InitDist,
    rng: &mut R,
) -> Result<Factor> {
    Ok(match dist {
        InitDist::Uniform => Factor::uniform(vars, card),
        InitDist::Random => Factor::random(vars, card, rng),
        InitDist::Dirichlet(alpha) => Factor::dirichlet(vars, card, alpha, rng)?,
    })
}

/// A conditional P(hidden | observed): a `dist` table over the whole scope,
/// rescaled so every observed assignment's hidden block sums to one.
///
/// Observed ids always precede hidden ids, so the observed assignments form
/// the fastest-varying prefix of the table and the hidden blocks are strided
/// copies of it.
fn conditional_factor<R: Rng + ?Sized>(
    observed: &VariableSet,
    hidden: &VariableSet,
    card: &[usize],
    dist: InitDist,
    rng: &mut R,
) -> Result<Factor> {
    let mut factor = dist_factor(observed.union(hidden), card, dist, rng)?;
    let observed_block: usize = observed.iter().map(|v| card[v]).product();
    let hidden_block = factor.len() / observed_block;

    for o in 0..observed_block {
        let mut total = 0.0;
        for h in 0..hidden_block {
            total += factor.values()[o + observed_block * h];
        }
        if total == 0.0 {
            return Err(Error::DegeneratePotential);
        }
        for h in 0..hidden_block {
            factor.values_mut()[o + observed_block * h] /= total;
        }
    }
    Ok(factor)
}

/// Per-variable marginal distributions of a calibrated tree, ordered by
/// variable id.
pub fn marginals(tree: &CliqueTree) -> Result<Vec<Vec<f64>>> {
    let mut out = Vec::new();
    for v in tree.scope().iter() {
        // running intersection guarantees some clique holds v
        let clique = (0..tree.len())
            .find(|&i| tree.vars(i).contains(v))
            .ok_or_else(|| Error::StructureViolation(format!("variable {v} is in no clique")))?;
        let rest = tree.vars(clique).difference(&VariableSet::new(&[v]));
        let mut marginal = tree.calibrated(clique).sum_out_all(&rest);
        marginal.normalize()?;
        out.push(marginal.values().to_vec());
    }
    Ok(out)
}

/// Writes marginals one line per variable, values space-separated, ordered by
/// variable id.
pub fn save_marginals<W: Write>(w: &mut W, marginals: &[Vec<f64>]) -> Result<()> {
    for marginal in marginals {
        let line: Vec<String> = marginal.iter().map(|v| v.to_string()).collect();
        writeln!(w, "{}", line.join(" "))?;
    }
    Ok(())
}

/// Reads a file written by [`save_marginals`].
pub fn load_marginals<R: BufRead>(r: &mut R) -> Result<Vec<Vec<f64>>> {
    let mut out = Vec::new();
    for line in r.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: Result<Vec<f64>> = line
            .split_whitespace()
            .map(|field| {
                field
                    .parse()
                    .map_err(|_| Error::InvalidData(format!("bad value {field:?} in marginals file")))
            })
            .collect();
        out.push(row?);
    }
    if out.is_empty() {
        return Err(Error::InvalidData("empty marginals file".into()));
    }
    Ok(out)
}

/// How [`compare_marginals`] measures the gap between two marginal files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareMode {
    /// Mean squared error over all entries.
    Mse,
    /// Cross entropy `-Σ p ln q` of the approximation `q` against the exact
    /// marginals `p`, averaged over variables.
    CrossEntropy,
}

impl FromStr for CompareMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<CompareMode> {
        match s {
            "mse" => Ok(CompareMode::Mse),
            "entropy" => Ok(CompareMode::CrossEntropy),
            _ => Err(Error::InvalidArgument(format!(
                "unknown comparison {s:?} (expected mse or entropy)"
            ))),
        }
    }
}

/// Compares per-variable marginals; `exact` and `approx` must have the same
/// shape.
pub fn compare_marginals(exact: &[Vec<f64>], approx: &[Vec<f64>], mode: CompareMode) -> Result<f64> {
    if exact.len() != approx.len()
        || exact
            .iter()
            .zip(approx)
            .any(|(p, q)| p.len() != q.len())
    {
        return Err(Error::ShapeMismatch(
            "marginal files describe different variables".into(),
        ));
    }
    match mode {
        CompareMode::Mse => {
            let cells: usize = exact.iter().map(|p| p.len()).sum();
            let total: f64 = exact
                .iter()
                .zip(approx)
                .flat_map(|(p, q)| p.iter().zip(q).map(|(a, b)| (a - b) * (a - b)))
                .sum();
            Ok(total / cells as f64)
        }
        CompareMode::CrossEntropy => {
            let total: f64 = exact
                .iter()
                .zip(approx)
                .flat_map(|(p, q)| {
                    p.iter()
                        .zip(q)
                        .filter(|(&a, _)| a > 0.0)
                        .map(|(&a, &b)| -a * b.max(f64::MIN_POSITIVE).ln())
                })
                .sum();
            Ok(total / exact.len() as f64)
        }
    }
}
