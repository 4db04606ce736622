//! Command-line frontend: sample structures, fit parameters by EM, dump and
//! compare marginals.

use clap::{Args, Parser, Subcommand};
use cliquelearn::learn::{self, CompareMode};
use cliquelearn::likelihood;
use cliquelearn::structure::best_structure;
use cliquelearn::{
    expectation_maximization, BitCounter, CliqueTree, Dataset, EmConfig, Error, HeaderFlags,
    InitDist, InitMode, Result, VariableSet,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "cliquelearn")]
#[command(about = "Learn clique-tree models with latent variables from categorical data")]
#[command(version)]
struct Cli {
    /// Print detailed progress on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DatasetArgs {
    /// Dataset file of integer category indices.
    #[arg(short = 'd', long)]
    dataset: PathBuf,

    /// Field delimiter.
    #[arg(long, default_value_t = ',')]
    delim: char,

    /// Header bitmask: 1 names, 2 cardinalities, 4 combined name_card.
    #[arg(long, default_value_t = 4)]
    hdr: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample random bounded-treewidth structures and keep the best-scoring one
    #[command(name = "struct")]
    Structure {
        #[command(flatten)]
        data: DatasetArgs,

        /// Treewidth of the sampled structures.
        #[arg(short = 'k', long, default_value_t = 3)]
        treewidth: usize,

        /// Number of hidden variables to add.
        #[arg(long, default_value_t = 0)]
        hidden: usize,

        /// Cardinality of the hidden variables.
        #[arg(long = "hc", default_value_t = 2)]
        hidden_card: usize,

        /// Number of candidate structures to sample.
        #[arg(long = "nk", default_value_t = 1)]
        samples: usize,

        /// Where to save the winning clique tree.
        #[arg(long = "cs")]
        tree_out: PathBuf,

        /// RNG seed; random when omitted.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Fit the potentials of a saved structure to the dataset by EM
    Param {
        #[command(flatten)]
        data: DatasetArgs,

        /// Clique tree file to start from.
        #[arg(long = "cl")]
        tree_in: PathBuf,

        /// Where to save the fitted tree.
        #[arg(long = "cs")]
        tree_out: Option<PathBuf>,

        /// Where to save the fitted per-variable marginals.
        #[arg(long = "mar")]
        marginals_out: Option<PathBuf>,

        /// Number of EM iterations.
        #[arg(long, default_value_t = 100)]
        iterem: usize,

        /// Stop EM early once potentials change less than this.
        #[arg(short = 'e', long)]
        epsilon: Option<f64>,

        /// Initial-potential mode: independent, conditional, or full.
        #[arg(long, default_value = "independent")]
        mode: String,

        /// Initial-potential distribution: uniform, random, or dirichlet.
        #[arg(long, default_value = "uniform")]
        dist: String,

        /// Dirichlet concentration, used with --dist dirichlet.
        #[arg(short = 'a', long, default_value_t = 1.0)]
        alpha: f64,

        /// RNG seed; random when omitted.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Write the per-variable marginals of a saved clique tree
    Marginals {
        /// Clique tree file to load.
        #[arg(short = 'c', long = "cl")]
        tree_in: PathBuf,

        /// Where to save the marginals.
        #[arg(short = 'm', long = "mar")]
        marginals_out: PathBuf,
    },

    /// Compare two marginals files
    Margerr {
        /// Exact marginals file.
        #[arg(short = 'e', long)]
        exact: PathBuf,

        /// Approximate marginals file.
        #[arg(short = 'a', long)]
        approx: PathBuf,

        /// Comparison: mse or entropy.
        #[arg(short = 'c', long, default_value = "mse")]
        compare: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Structure {
            data,
            treewidth,
            hidden,
            hidden_card,
            samples,
            tree_out,
            seed,
        } => {
            if hidden_card < 2 {
                return Err(Error::InvalidArgument(format!(
                    "hidden cardinality must be at least 2, got {hidden_card}"
                )));
            }
            let dataset = load_dataset(&data)?;
            let counter = BitCounter::from_data(dataset.rows(), dataset.cardinalities())?;
            let mut card = dataset.cardinalities().to_vec();
            card.extend(std::iter::repeat(hidden_card).take(hidden));

            let mut rng = seeded(seed);
            let total = card.len();
            let (tree, score) = best_structure(&counter, total, treewidth, &card, samples, &mut rng)?;
            save_tree(&tree, &tree_out)?;

            summary(&[
                display(&data.dataset),
                display(&tree_out),
                dataset.num_columns().to_string(),
                treewidth.to_string(),
                hidden.to_string(),
                format!("{score}"),
            ]);
            Ok(())
        }

        Commands::Param {
            data,
            tree_in,
            tree_out,
            marginals_out,
            iterem,
            epsilon,
            mode,
            dist,
            alpha,
            seed,
        } => {
            if let Some(e) = epsilon {
                if !(e > 0.0) {
                    return Err(Error::InvalidArgument(format!(
                        "epsilon must be positive, got {e}"
                    )));
                }
            }
            let init_mode: InitMode = mode.parse()?;
            let init_dist = parse_dist(&dist, alpha)?;

            let dataset = load_dataset(&data)?;
            let counter = BitCounter::from_data(dataset.rows(), dataset.cardinalities())?;
            let mut tree = load_tree(&tree_in)?;
            check_tree_matches(&tree, &dataset)?;

            let mut rng = seeded(seed);
            let cliques: Vec<VariableSet> = tree.cliques().cloned().collect();
            let potentials = learn::initial_potentials(
                &counter,
                &cliques,
                tree.cardinalities(),
                dataset.num_columns(),
                init_mode,
                init_dist,
                &mut rng,
            )?;
            tree.set_all_potentials(potentials)?;

            let config = EmConfig {
                max_iterations: iterem,
                epsilon,
            };
            let stats = expectation_maximization(&mut tree, dataset.rows(), &config)?;

            tree.calibrate();
            let ll = likelihood::loglikelihood(&tree, &counter)?;
            if let Some(path) = &tree_out {
                save_tree(&tree, path)?;
            }
            if let Some(path) = &marginals_out {
                let marginals = learn::marginals(&tree)?;
                let mut w = BufWriter::new(File::create(path)?);
                learn::save_marginals(&mut w, &marginals)?;
            }

            summary(&[
                display(&data.dataset),
                display(&tree_in),
                format!("{ll}"),
                stats.iterations.to_string(),
                stats.skipped_rows.to_string(),
                mode,
                dist,
                format!("{alpha}"),
            ]);
            Ok(())
        }

        Commands::Marginals {
            tree_in,
            marginals_out,
        } => {
            let mut tree = load_tree(&tree_in)?;
            tree.calibrate();
            let marginals = learn::marginals(&tree)?;
            let mut w = BufWriter::new(File::create(&marginals_out)?);
            learn::save_marginals(&mut w, &marginals)?;
            summary(&[display(&tree_in), display(&marginals_out)]);
            Ok(())
        }

        Commands::Margerr {
            exact,
            approx,
            compare,
        } => {
            let mode: CompareMode = compare.parse()?;
            let exact_marginals = load_marginals(&exact)?;
            let approx_marginals = load_marginals(&approx)?;
            let diff = learn::compare_marginals(&exact_marginals, &approx_marginals, mode)?;
            summary(&[display(&exact), display(&approx), format!("{diff}")]);
            Ok(())
        }
    }
}

fn parse_dist(dist: &str, alpha: f64) -> Result<InitDist> {
    match dist {
        "uniform" => Ok(InitDist::Uniform),
        "random" => Ok(InitDist::Random),
        "dirichlet" => Ok(InitDist::Dirichlet(alpha)),
        _ => Err(Error::InvalidArgument(format!(
            "unknown distribution {dist:?} (expected uniform, random, or dirichlet)"
        ))),
    }
}

fn load_dataset(args: &DatasetArgs) -> Result<Dataset> {
    if !args.delim.is_ascii() {
        return Err(Error::InvalidArgument(format!(
            "delimiter {:?} is not an ASCII character",
            args.delim
        )));
    }
    let file = BufReader::new(File::open(&args.dataset)?);
    Dataset::read(file, args.delim as u8, HeaderFlags(args.hdr))
}

fn load_tree(path: &Path) -> Result<CliqueTree> {
    let mut file = BufReader::new(File::open(path)?);
    CliqueTree::load(&mut file)
}

fn save_tree(tree: &CliqueTree, path: &Path) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    tree.save(&mut file)
}

fn load_marginals(path: &Path) -> Result<Vec<Vec<f64>>> {
    let mut file = BufReader::new(File::open(path)?);
    learn::load_marginals(&mut file)
}

/// The tree must cover every dataset column with matching cardinalities;
/// anything beyond the columns is hidden.
fn check_tree_matches(tree: &CliqueTree, dataset: &Dataset) -> Result<()> {
    let columns = dataset.num_columns();
    if tree.cardinalities().len() < columns {
        return Err(Error::InvalidData(format!(
            "tree covers {} variables but the dataset has {columns} columns",
            tree.cardinalities().len()
        )));
    }
    if &tree.cardinalities()[..columns] != dataset.cardinalities() {
        return Err(Error::InvalidData(
            "tree and dataset disagree on the observed cardinalities".into(),
        ));
    }
    let scope = tree.scope();
    if let Some(missing) = (0..columns).find(|&v| !scope.contains(v)) {
        return Err(Error::StructureViolation(format!(
            "dataset column {missing} appears in no clique"
        )));
    }
    Ok(())
}

fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// One comma-separated summary line on stdout, the machine-readable result of
/// a subcommand.
fn summary(fields: &[String]) {
    println!("{}", fields.join(", "));
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        eprintln!("{} {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logger(verbose: bool) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    });
}
