use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use setcover::engine::CoverEngine;
use setcover::error::Result;
use setcover::evaluate::Evaluator;
use setcover::generate::{default_zipf, make_rules};
use setcover::greedy::GreedyCover;
use setcover::lazy::LazyCover;
use setcover::online::OnlineCover;
use setcover::ruleset::{read_rules, write_rules, Rules};
use setcover::settings::Settings;

#[derive(Parser)]
#[command(name = "setcover", version, about = "Keep a small set cover over a growing stream of rules")]
struct Cli {
    /// Config file, read on top of the defaults and below SETCOVER_* variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a synthetic rule set
    Generate {
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        rules: Option<usize>,
        #[arg(long)]
        sets: Option<usize>,
        #[arg(long)]
        max_rules_per_set: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Cover a rule set and print the chosen sets, one per line
    Cover {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = EngineKind::Online)]
        engine: EngineKind,
    },
    /// Seed a greedy cover, then stream the remaining rules through the online engine
    Compare {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        start: Option<usize>,
        #[arg(long)]
        seconds: Option<u64>,
        /// Write the report as JSON here
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineKind {
    Greedy,
    Lazy,
    Online,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match run(cli.command, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "setcover failed");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, settings: &Settings) -> Result<()> {
    match command {
        Command::Generate {
            output,
            rules,
            sets,
            max_rules_per_set,
            seed,
        } => {
            let mut generator = settings.generator.clone();
            if let Some(rules) = rules {
                generator.num_rules = rules;
            }
            if let Some(sets) = sets {
                generator.num_sets = sets;
            }
            if let Some(max) = max_rules_per_set {
                generator.max_rules_per_set = max;
            }
            if let Some(seed) = seed {
                generator.seed = seed;
            }
            let rules = make_rules(&generator, &default_zipf());
            write_rules(&rules, &output)?;
        }
        Command::Cover { input, engine } => {
            let rules = read_rules(&input)?;
            let cover = match engine {
                EngineKind::Greedy => {
                    let mut greedy = GreedyCover::new();
                    for rule in &rules {
                        greedy.register_rule(rule.iter().cloned())?;
                    }
                    greedy.compute_cover()?;
                    greedy.cover()
                }
                EngineKind::Lazy => stream(LazyCover::new(), &rules)?.cover(),
                EngineKind::Online => {
                    let online = stream(OnlineCover::new(), &rules)?;
                    online.show_stats();
                    online.cover()
                }
            };
            info!(rules = rules.len(), cover = cover.len(), ?engine, "covered");
            for set in cover {
                println!("{}", set);
            }
        }
        Command::Compare {
            input,
            start,
            seconds,
            report,
        } => {
            let evaluator = Evaluator::from_file(&input)?;
            let outcome = evaluator.compare(
                start.unwrap_or(settings.start_rules),
                Duration::from_secs(seconds.unwrap_or(settings.budget_secs)),
                settings.stats_every,
            )?;
            if let Some(report) = report {
                std::fs::write(&report, outcome.to_json()?)?;
                info!(path = %report.display(), "wrote report");
            }
        }
    }
    Ok(())
}

// one update per registered rule
fn stream<E: CoverEngine>(mut engine: E, rules: &Rules) -> Result<E> {
    for rule in rules {
        engine.register_rule(rule.iter().cloned())?;
        engine.update_cover()?;
    }
    Ok(engine)
}
