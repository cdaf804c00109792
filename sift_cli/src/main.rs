use sift_core::{
    ExecutionOutcome, InputId, ProgScore, Scheduler, ScoringEngine, SiftConfig, Signal,
};

use anyhow::Context;
use clap::Parser;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// JSON-lines file of recorded execution outcomes.
    #[clap(short, long, value_parser)]
    outcomes: PathBuf,
    /// How many of the best inputs to report.
    #[clap(short, long, default_value_t = 10)]
    top: usize,
    /// Scheduler picks to draw after replaying, to show the selection bias.
    #[clap(short, long, default_value_t = 0)]
    picks: usize,
    #[clap(short, long, default_value_t = 0)]
    seed: u64,
}

/// One recorded execution.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct OutcomeRecord {
    input: String,
    #[serde(default)]
    signal: Option<Vec<u64>>,
    #[serde(default)]
    elapsed_us: u64,
    #[serde(default)]
    log_lines: Vec<String>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    crashed: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OutcomeRecord {
    fn into_outcome(self) -> (InputId, ExecutionOutcome) {
        let id = InputId::of(&self.input);
        let mut outcome = ExecutionOutcome::new()
            .with_elapsed(Duration::from_micros(self.elapsed_us))
            .with_log_lines(self.log_lines);
        if let Some(signal) = self.signal {
            outcome = outcome.with_signal(Signal::from(signal));
        }
        if let Some(output) = &self.output {
            outcome = outcome.with_output(output);
        }
        if self.crashed {
            outcome = outcome.with_crash(self.error);
        }
        (id, outcome)
    }
}

#[derive(Serialize)]
struct RankedInput<'a> {
    rank: usize,
    input: &'a str,
    id: InputId,
    score: ProgScore,
}

fn load_config(config_file: Option<PathBuf>) -> Result<SiftConfig, anyhow::Error> {
    match config_file {
        Some(config_path) => {
            info!(path = ?config_path, "loading configuration");
            SiftConfig::load_from_file(&config_path)
        }
        None => {
            let default_config_path = PathBuf::from("config.toml");
            if default_config_path.exists() {
                info!(path = ?default_config_path, "no config file specified, loading default");
                SiftConfig::load_from_file(&default_config_path)
            } else {
                info!("no config file specified and 'config.toml' not found, using built-in defaults");
                Ok(SiftConfig::default())
            }
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config_file)?;
    let engine = ScoringEngine::new(config.scoring).context("invalid scoring configuration")?;
    let mut scheduler = engine.scheduler();

    let file = File::open(&cli.outcomes)
        .with_context(|| format!("Failed to open outcomes file at {:?}", cli.outcomes))?;

    // Identity -> input text, for the report.
    let mut names = std::collections::HashMap::new();
    let mut replayed = 0usize;
    let mut solutions = 0usize;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: OutcomeRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed outcome record");
                continue;
            }
        };
        let name = record.input.clone();
        let (id, outcome) = record.into_outcome();
        engine.process_feedback(&mut scheduler, id, &outcome, false);
        if outcome.crashed {
            solutions += 1;
        }
        names.insert(id, name);
        replayed += 1;
    }
    info!(replayed, solutions, "replayed outcomes");

    let ranking: Vec<RankedInput<'_>> = engine
        .tracker()
        .top_scored(cli.top)
        .into_iter()
        .enumerate()
        .map(|(i, id)| RankedInput {
            rank: i + 1,
            input: names.get(&id).map_or("", String::as_str),
            id,
            score: engine.tracker().get_score(&id),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&ranking)?);

    if cli.picks > 0 {
        let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);
        let mut counts = std::collections::BTreeMap::<&str, (usize, usize)>::new();
        for _ in 0..cli.picks {
            let pick = scheduler.next(&mut rng)?;
            let entry = counts
                .entry(names.get(&pick.id).map_or("", String::as_str))
                .or_default();
            entry.0 += 1;
            if pick.weighted {
                entry.1 += 1;
            }
        }
        for (input, (picked, weighted)) in counts {
            println!("picked {input:?} {picked} times ({weighted} by weight)");
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&engine.metrics_snapshot())?
    );
    Ok(())
}
