use cliquelearn::learn::{self, CompareMode};
use cliquelearn::likelihood::loglikelihood;
use cliquelearn::{
    expectation_maximization, BitCounter, CliqueTree, Counter, EmConfig, InitDist, InitMode,
    VariableSet,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

const EPS: f64 = 1e-6;

fn fit(
    tree: &mut CliqueTree,
    data: &[Vec<usize>],
    mode: InitMode,
    dist: InitDist,
    iterations: usize,
    seed: u64,
) -> BitCounter {
    let counter = BitCounter::from_data(data, &tree.cardinalities()[..data[0].len()]).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let cliques: Vec<VariableSet> = tree.cliques().cloned().collect();
    let potentials = learn::initial_potentials(
        &counter,
        &cliques,
        tree.cardinalities(),
        data[0].len(),
        mode,
        dist,
        &mut rng,
    )
    .unwrap();
    tree.set_all_potentials(potentials).unwrap();
    expectation_maximization(
        tree,
        data,
        &EmConfig {
            max_iterations: iterations,
            epsilon: None,
        },
    )
    .unwrap();
    counter
}

#[test]
fn independent_pair_learns_the_uniform_joint() {
    // two independent fair variables, single clique, one EM iteration
    let card = [2, 2];
    let mut tree = CliqueTree::new(vec![VariableSet::new(&[0, 1])], vec![vec![]], &card).unwrap();
    let data = vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]];
    fit(&mut tree, &data, InitMode::Independent, InitDist::Uniform, 1, 0);

    for &value in tree.initial(0).values() {
        assert!((value - 0.25).abs() < EPS);
    }
}

#[test]
fn em_log_likelihood_never_decreases() {
    let card = [2, 2, 2];
    let data = vec![
        vec![0, 0, 0],
        vec![0, 0, 1],
        vec![0, 1, 1],
        vec![1, 1, 1],
        vec![1, 1, 0],
        vec![1, 0, 0],
        vec![1, 1, 1],
        vec![0, 0, 0],
    ];
    let mut tree = CliqueTree::new(
        vec![VariableSet::new(&[0, 1]), VariableSet::new(&[1, 2])],
        vec![vec![1], vec![0]],
        &card,
    )
    .unwrap();
    let counter = BitCounter::from_data(&data, &card).unwrap();

    // random initial potentials, then one EM iteration at a time; the
    // log-likelihoods after each iteration must never drop
    let mut rng = StdRng::seed_from_u64(5);
    let cliques: Vec<VariableSet> = tree.cliques().cloned().collect();
    let potentials = learn::initial_potentials(
        &counter,
        &cliques,
        &card,
        3,
        InitMode::Full,
        InitDist::Random,
        &mut rng,
    )
    .unwrap();
    tree.set_all_potentials(potentials).unwrap();

    let mut previous = None;
    for _ in 0..5 {
        expectation_maximization(
            &mut tree,
            &data,
            &EmConfig {
                max_iterations: 1,
                epsilon: None,
            },
        )
        .unwrap();
        tree.calibrate();
        let current = loglikelihood(&tree, &counter).unwrap();
        if let Some(previous) = previous {
            assert!(
                current >= previous - EPS,
                "log-likelihood dropped from {previous} to {current}"
            );
        }
        previous = Some(current);
    }
}

#[test]
fn em_log_likelihood_climbs_with_a_latent_variable() {
    // a latent mixture over one clique: here the M-step is exactly the
    // expected-counts update, so each iteration must improve the observed
    // log-likelihood
    let card = [2, 2, 2];
    let data = vec![
        vec![0, 0],
        vec![0, 0],
        vec![0, 1],
        vec![1, 1],
        vec![1, 1],
        vec![1, 0],
        vec![1, 1],
        vec![0, 0],
    ];
    let mut tree =
        CliqueTree::new(vec![VariableSet::new(&[0, 1, 2])], vec![vec![]], &card).unwrap();
    let counter = BitCounter::from_data(&data, &card[..2]).unwrap();

    let mut rng = StdRng::seed_from_u64(12);
    let cliques: Vec<VariableSet> = tree.cliques().cloned().collect();
    let potentials = learn::initial_potentials(
        &counter,
        &cliques,
        &card,
        2,
        InitMode::Conditional,
        InitDist::Random,
        &mut rng,
    )
    .unwrap();
    tree.set_all_potentials(potentials).unwrap();

    let mut previous = None;
    for _ in 0..8 {
        expectation_maximization(
            &mut tree,
            &data,
            &EmConfig {
                max_iterations: 1,
                epsilon: None,
            },
        )
        .unwrap();
        tree.calibrate();
        let current = loglikelihood(&tree, &counter).unwrap();
        if let Some(previous) = previous {
            assert!(
                current >= previous - EPS,
                "log-likelihood dropped from {previous} to {current}"
            );
        }
        previous = Some(current);
    }
}

#[test]
fn hidden_variable_fit_reproduces_the_observed_marginals() {
    // one observed column, one hidden variable sharing its clique
    let card = [2, 2];
    let mut tree = CliqueTree::new(vec![VariableSet::new(&[0, 1])], vec![vec![]], &card).unwrap();
    let data = vec![vec![0], vec![0], vec![0], vec![1]];
    fit(&mut tree, &data, InitMode::Conditional, InitDist::Random, 20, 9);

    tree.calibrate();
    let marginals = learn::marginals(&tree).unwrap();
    assert!((marginals[0][0] - 0.75).abs() < EPS);
    assert!((marginals[0][1] - 0.25).abs() < EPS);
}

#[test]
fn dirichlet_initialisation_is_strictly_positive() {
    let card = [2, 3, 2];
    let data = vec![vec![0, 0, 0], vec![1, 2, 1]];
    let counter = BitCounter::from_data(&data, &card).unwrap();
    let cliques = [VariableSet::new(&[0, 1]), VariableSet::new(&[1, 2])];
    let mut rng = StdRng::seed_from_u64(33);
    let potentials = learn::initial_potentials(
        &counter,
        &cliques,
        &card,
        3,
        InitMode::Full,
        InitDist::Dirichlet(0.5),
        &mut rng,
    )
    .unwrap();
    for potential in &potentials {
        assert!((potential.sum() - 1.0).abs() < EPS);
        assert!(potential.values().iter().all(|&v| v > 0.0));
    }
}

#[test]
fn fitted_trees_round_trip_through_save_and_load() {
    let card = [2, 2, 2];
    let mut tree = CliqueTree::new(
        vec![VariableSet::new(&[0, 1]), VariableSet::new(&[1, 2])],
        vec![vec![1], vec![0]],
        &card,
    )
    .unwrap();
    let data = vec![vec![0, 0, 1], vec![1, 1, 0], vec![0, 1, 1], vec![1, 0, 0]];
    fit(&mut tree, &data, InitMode::Independent, InitDist::Uniform, 3, 0);

    let mut buffer = Vec::new();
    tree.save(&mut buffer).unwrap();
    let loaded = CliqueTree::load(&mut &buffer[..]).unwrap();

    assert_eq!(loaded.len(), tree.len());
    for i in 0..tree.len() {
        assert_eq!(loaded.vars(i), tree.vars(i));
        assert_eq!(loaded.neighbours(i), tree.neighbours(i));
        // potentials survive the text format bit for bit
        assert_eq!(loaded.initial(i).values(), tree.initial(i).values());
    }

    // and the loaded tree calibrates to the same beliefs
    tree.calibrate();
    let mut loaded = loaded;
    loaded.calibrate();
    for i in 0..tree.len() {
        assert_eq!(loaded.calibrated(i).values(), tree.calibrated(i).values());
    }
}

#[test]
fn fitted_marginals_match_the_empirical_frequencies() {
    // fully observed chain with a balanced separator: the fitted model keeps
    // the empirical clique marginals, so its per-variable marginals are the
    // empirical column frequencies
    let card = [2, 2, 2];
    let data = vec![
        vec![0, 0, 0],
        vec![0, 0, 1],
        vec![1, 0, 0],
        vec![1, 0, 1],
        vec![0, 1, 1],
        vec![1, 1, 1],
        vec![1, 1, 0],
        vec![1, 1, 1],
    ];
    let mut tree = CliqueTree::new(
        vec![VariableSet::new(&[0, 1]), VariableSet::new(&[1, 2])],
        vec![vec![1], vec![0]],
        &card,
    )
    .unwrap();
    let counter = fit(&mut tree, &data, InitMode::Independent, InitDist::Uniform, 2, 0);

    tree.calibrate();
    let marginals = learn::marginals(&tree).unwrap();
    for v in 0..3 {
        let counts = counter.count_all(&VariableSet::new(&[v]));
        for (x, &n) in counts.iter().enumerate() {
            let expected = n as f64 / data.len() as f64;
            assert!(
                (marginals[v][x] - expected).abs() < EPS,
                "marginal of variable {v} at {x}: {} vs {expected}",
                marginals[v][x]
            );
        }
    }

    // marginals files round-trip and compare clean
    let mut buffer = Vec::new();
    learn::save_marginals(&mut buffer, &marginals).unwrap();
    let loaded = learn::load_marginals(&mut &buffer[..]).unwrap();
    assert_eq!(loaded, marginals);
    let mse = learn::compare_marginals(&marginals, &loaded, CompareMode::Mse).unwrap();
    assert_eq!(mse, 0.0);
}
