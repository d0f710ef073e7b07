//! Command line driver: load an instance, search for an equilibrium, write
//! the solution files.
//!
//! Exit code 0 covers every completed run, including "no equilibrium found
//! after a bounded search"; nonzero means the input was unusable or the
//! backend failed.

use anyhow::Context;
use clap::Parser;
use epx_game::{Algorithm, AlgorithmParams, EpecStatus, RecoverStrategy};
use epx_market::{EpecInstance, MarketEpec};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum AlgorithmArg {
    Full,
    Inner,
    Combinatorial,
    Outer,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(a: AlgorithmArg) -> Self {
        match a {
            AlgorithmArg::Full => Algorithm::FullEnumeration,
            AlgorithmArg::Inner => Algorithm::InnerApproximation,
            AlgorithmArg::Combinatorial => Algorithm::CombinatorialPne,
            AlgorithmArg::Outer => Algorithm::OuterApproximation,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum RecoverArg {
    Incremental,
    Combinatorial,
}

/// Equilibrium solver for multi-country energy-market EPEC instances.
#[derive(Parser, Debug)]
#[command(name = "epx", version, about, disable_version_flag = true)]
struct Cli {
    /// Print version information.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Path to the instance file.
    instance: PathBuf,

    /// Solution output path prefix (".json"/".txt" are appended).
    #[arg(short = 'r', long = "result", default_value = "solution")]
    result: PathBuf,

    /// Solution write level: 0 structured only, 1 human-readable only,
    /// 2 both.
    #[arg(short = 's', long = "write-level", default_value_t = 0)]
    write_level: u8,

    /// Equilibrium algorithm.
    #[arg(long, value_enum, default_value = "inner")]
    algorithm: AlgorithmArg,

    /// Recovery strategy when a pure equilibrium is requested but a mixed
    /// one is found.
    #[arg(long, value_enum, default_value = "incremental")]
    recover: RecoverArg,

    /// Polyhedra added per country and iteration in the inner
    /// approximation.
    #[arg(long, default_value_t = 1)]
    aggressiveness: u64,

    /// Use big-M rows instead of indicator constraints.
    #[arg(long)]
    big_m: bool,

    /// Big-M constant for the big-M reformulation.
    #[arg(long, default_value_t = 1e7)]
    big_m_value: f64,

    /// Wall-clock time limit in seconds.
    #[arg(long)]
    time_limit: Option<f64>,

    /// Backend thread hint.
    #[arg(long, default_value_t = 0)]
    threads: u32,

    /// Insist on a pure-strategy equilibrium.
    #[arg(long)]
    pure: bool,

    /// Seed for the random polyhedron selection.
    #[arg(long)]
    seed: Option<u64>,
}

fn run(cli: Cli) -> anyhow::Result<EpecStatus> {
    let instance = EpecInstance::load(&cli.instance)
        .with_context(|| format!("cannot read instance {}", cli.instance.display()))?;
    if instance.countries.is_empty() {
        anyhow::bail!("the instance has no countries");
    }
    info!(
        countries = instance.countries.len(),
        "loaded instance from {}",
        cli.instance.display()
    );

    let params = AlgorithmParams {
        algorithm: cli.algorithm.into(),
        recover_strategy: match cli.recover {
            RecoverArg::Incremental => RecoverStrategy::IncrementalEnumeration,
            RecoverArg::Combinatorial => RecoverStrategy::Combinatorial,
        },
        aggressiveness: cli.aggressiveness,
        indicators: !cli.big_m,
        big_m: cli.big_m_value,
        time_limit: cli.time_limit,
        threads: cli.threads,
        pure_nash: cli.pure,
        add_poly_method_seed: cli.seed,
        ..AlgorithmParams::default()
    };

    let start = chrono::Utc::now();
    let mut market =
        MarketEpec::from_instance(&instance, params).context("cannot build the market")?;
    let status = market.find_nash_eq().context("equilibrium search failed")?;
    market
        .write_solution(cli.write_level, &cli.result)
        .with_context(|| format!("cannot write solution to {}", cli.result.display()))?;

    println!(
        "{:?} in {:.2}s ({} countries, started {})",
        status,
        market.statistics().wall_clock_time,
        market.n_countries(),
        start.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    Ok(status)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();
    run(cli)?;
    Ok(())
}
