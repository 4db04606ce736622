//! Expectation-maximisation over a clique tree.

use crate::{CliqueTree, Error, Factor, Result};

/// Tuning knobs for [`expectation_maximization`].
#[derive(Clone, Debug)]
pub struct EmConfig {
    /// Number of EM iterations to run.
    pub max_iterations: usize,
    /// Stop early once the largest potential change falls below this, if set.
    pub epsilon: Option<f64>,
}

impl Default for EmConfig {
    fn default() -> Self {
        EmConfig {
            max_iterations: 100,
            epsilon: None,
        }
    }
}

/// What a run of [`expectation_maximization`] did.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmStats {
    /// Iterations actually performed.
    pub iterations: usize,
    /// Rows skipped (summed over iterations) because their evidence had zero
    /// probability under the potentials of the moment.
    pub skipped_rows: usize,
    /// Largest potential change in the last iteration.
    pub final_delta: f64,
}

/// Fits the tree's potentials to the dataset by EM.
///
/// Each dataset row binds the observed variables `0..row.len()`; variables
/// with higher ids are hidden and stay free. Per iteration, every row is
/// restricted into the tree, the tree is calibrated, and the normalised
/// beliefs are accumulated into per-clique expected counts; the M-step
/// installs the normalised accumulators as the next potentials. The dataset
/// is never mutated, and calibration runs exactly once per row per iteration.
///
/// A row whose evidence is impossible under the current potentials makes some
/// belief sum to zero; such rows are skipped and counted in
/// [`EmStats::skipped_rows`] rather than aborting the fit.
pub fn expectation_maximization(
    tree: &mut CliqueTree,
    data: &[Vec<usize>],
    config: &EmConfig,
) -> Result<EmStats> {
    if data.is_empty() {
        return Err(Error::InvalidData("empty dataset".into()));
    }
    let num_observed = data[0].len();
    if num_observed > tree.cardinalities().len() {
        return Err(Error::InvalidData(format!(
            "rows have {} columns but the tree covers {} variables",
            num_observed,
            tree.cardinalities().len()
        )));
    }
    let mut stats = EmStats::default();
    let mut evidence: Vec<Option<usize>> = vec![None; num_observed];

    for iteration in 0..config.max_iterations {
        let mut accumulators: Vec<Factor> = (0..tree.len())
            .map(|i| Factor::new(tree.vars(i).clone(), tree.cardinalities()))
            .collect();
        let mut skipped = 0;

        'rows: for (r, row) in data.iter().enumerate() {
            if row.len() != num_observed {
                return Err(Error::InvalidData(format!(
                    "row {} has {} fields, expected {}",
                    r,
                    row.len(),
                    num_observed
                )));
            }
            for (c, &value) in row.iter().enumerate() {
                if value >= tree.cardinalities()[c] {
                    return Err(Error::InvalidData(format!(
                        "row {}: value {} out of range for variable {} (cardinality {})",
                        r,
                        value,
                        c,
                        tree.cardinalities()[c]
                    )));
                }
                evidence[c] = Some(value);
            }
            tree.calibrate_with_evidence(&evidence);

            // normalise every belief before touching the accumulators so a
            // degenerate row contributes to none of them
            let mut beliefs = Vec::with_capacity(tree.len());
            for i in 0..tree.len() {
                let mut belief = tree.calibrated(i).clone();
                match belief.normalize() {
                    Ok(()) => beliefs.push(belief),
                    Err(Error::DegeneratePotential) => {
                        skipped += 1;
                        continue 'rows;
                    }
                    Err(e) => return Err(e),
                }
            }
            for (accumulator, belief) in accumulators.iter_mut().zip(&beliefs) {
                accumulator.add_sliced(&evidence, belief)?;
            }
        }

        if skipped > 0 {
            log::warn!("EM iteration {iteration}: skipped {skipped} rows with zero-probability evidence");
        }
        stats.skipped_rows += skipped;

        let mut delta = 0.0f64;
        for (i, mut accumulator) in accumulators.into_iter().enumerate() {
            match accumulator.normalize() {
                Ok(()) => {}
                // every row was skipped; keep the current potential
                Err(Error::DegeneratePotential) => continue,
                Err(e) => return Err(e),
            }
            delta = delta.max(accumulator.max_difference(tree.initial(i))?);
            tree.set_potential(i, accumulator)?;
        }
        stats.iterations = iteration + 1;
        stats.final_delta = delta;
        log::debug!("EM iteration {iteration}: max potential change {delta:.3e}");

        if let Some(epsilon) = config.epsilon {
            if delta < epsilon {
                break;
            }
        }
    }
    Ok(stats)
}
