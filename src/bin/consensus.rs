#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use consensus_harness::evaluation;
use consensus_harness::owa::{owa_weights, LinguisticQuantifier};
use consensus_harness::{execute, CrpRequest, CrpResponse, JsonlTraceSink, TraceSink};

#[derive(Parser)]
#[command(name = "consensus", version, about = "Consensus-reaching harness CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the consensus process from a JSON request
    Run {
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Overrides `maxRounds` from the request
        #[arg(long)]
        max_rounds: Option<u32>,
        /// Overrides `rngSeed` from the request
        #[arg(long)]
        rng_seed: Option<u64>,
        /// Write one JSON line per round
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Run synthetic evaluation suite
    Eval {
        #[arg(long)]
        case: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Print OWA weights for a linguistic quantifier
    Weights {
        #[arg(long)]
        m: usize,
        #[arg(long, default_value_t = 0.3)]
        a: f64,
        #[arg(long, default_value_t = 0.8)]
        b: f64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            request,
            out,
            max_rounds,
            rng_seed,
            trace,
        } => {
            let mut req: CrpRequest = match read_json(&request) {
                Ok(req) => req,
                Err(e) => {
                    write_json(&out, &CrpResponse::failure(&e))?;
                    return Err(e);
                }
            };
            if max_rounds.is_some() {
                req.max_rounds = max_rounds;
            }
            if rng_seed.is_some() {
                req.rng_seed = rng_seed;
            }

            let (trace_sink, trace_worker) = if let Some(path) = trace {
                let (sink, worker) = JsonlTraceSink::new(path)?;
                (Some(sink), Some(worker))
            } else {
                (None, None)
            };
            let trace_ref = trace_sink.as_ref().map(|sink| sink as &dyn TraceSink);

            let resp = CrpResponse::from_result(execute(&req, trace_ref));
            write_json(&out, &resp)?;

            drop(trace_sink);
            if let Some(worker) = trace_worker {
                let rounds = worker.join()?;
                tracing::debug!(rounds, "round trace written");
            }

            if !resp.success {
                return Err(resp.msg.into());
            }
        }
        Commands::Eval { case, out } => {
            let results = evaluation::run_synthetic_suite(case.as_deref())?;
            if results.is_empty() {
                if let Some(name) = case {
                    return Err(format!("unknown evaluation case '{name}'").into());
                }
            }
            let mut file = File::create(out)?;
            for result in &results {
                let line = serde_json::to_string(result)?;
                writeln!(file, "{line}")?;
            }
        }
        Commands::Weights { m, a, b } => {
            let weights = owa_weights(m, LinguisticQuantifier::new(a, b))?;
            println!("{}", serde_json::to_string(&weights)?);
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
