use std::path::{Path, PathBuf};
use std::sync::Arc;

use actor_optimizer::error::display_error;
use actor_optimizer::{
    llm_actor_factory, setup_logging, should_use_json, CancellationSignal, EmbeddingSimilarity,
    Error, GenerationOptions, LlmGeneticOperator, OpenAIClient, OptimizationReport, Optimizer,
    OptimizerConfig, RetryConfig, RunError, SimilarityMetric, TestSuite,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "actor-optimizer")]
#[command(author, version, about = "Evolutionary prompt optimization for LLM actors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a test suite and report what it contains
    Validate {
        /// Suite file (YAML)
        #[arg(short, long)]
        suite: PathBuf,
    },

    /// Search for a better prompt
    Optimize {
        /// Suite file (YAML)
        #[arg(short, long)]
        suite: PathBuf,

        /// Optimizer config file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of regenerations
        #[arg(short, long)]
        generations: Option<usize>,

        /// Target population size
        #[arg(short, long)]
        population: Option<usize>,

        /// Survivors kept per generation
        #[arg(long)]
        survivors: Option<usize>,

        /// Similarity metric for vector expectations (cosine, euclidean, manhattan)
        #[arg(long, default_value = "cosine")]
        metric: SimilarityMetric,

        /// Write the full report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let use_json = cli.json || should_use_json();
    setup_logging(use_json, &cli.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        json_output = use_json,
        "Actor optimizer starting"
    );

    let outcome = match cli.command {
        Commands::Validate { suite } => cmd_validate(&suite),
        Commands::Optimize {
            suite,
            config,
            generations,
            population,
            survivors,
            metric,
            report,
        } => {
            cmd_optimize(OptimizeArgs {
                suite,
                config,
                generations,
                population,
                survivors,
                metric,
                report,
            })
            .await
        }
    };

    if let Err(err) = outcome {
        std::process::exit(report_failure(&err));
    }
}

/// Print a failure and pick the exit code.
fn report_failure(err: &anyhow::Error) -> i32 {
    if let Some(run_err) = err.downcast_ref::<RunError>() {
        display_error(&run_err.error);
        return run_err.error.exit_code();
    }
    if let Some(error) = err.downcast_ref::<Error>() {
        display_error(error);
        return error.exit_code();
    }
    eprintln!("{} {:#}", "Error:".red().bold(), err);
    actor_optimizer::error::EXIT_INTERNAL_ERROR
}

// =============================================================================
// VALIDATE
// =============================================================================

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let suite = TestSuite::load_from_file(path)?;

    println!("{} {}", "Suite:".blue().bold(), path.display().to_string().cyan());
    println!("  {}", suite.summary());
    println!();

    println!("{}", "Seed prompts".bold());
    for (i, prompt) in suite.seed_prompts.iter().enumerate() {
        println!("  {}. {}", i + 1, first_line(prompt));
    }
    println!();

    println!("{}", "Test cases".bold());
    for case in &suite.test_cases {
        let retries = case
            .retry_budget()
            .map(|r| format!(", {} retries", r))
            .unwrap_or_default();
        println!(
            "  {} ({} turns, {} expectations{})",
            case.name().green(),
            case.turns().len(),
            case.expectation_count(),
            retries
        );
    }

    if suite.needs_scorer() {
        println!();
        println!(
            "{} vector expectations need an embeddings endpoint at optimize time",
            "Note:".yellow().bold()
        );
    }

    println!();
    println!("{} Suite is valid", "OK".green().bold());
    Ok(())
}

// =============================================================================
// OPTIMIZE
// =============================================================================

struct OptimizeArgs {
    suite: PathBuf,
    config: Option<PathBuf>,
    generations: Option<usize>,
    population: Option<usize>,
    survivors: Option<usize>,
    metric: SimilarityMetric,
    report: Option<PathBuf>,
}

async fn cmd_optimize(args: OptimizeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => OptimizerConfig::load_from_file(path)?,
        None => OptimizerConfig::default(),
    };
    if let Some(generations) = args.generations {
        config = config.with_generations(generations);
    }
    if let Some(population) = args.population {
        config = config.with_population_size(population);
    }
    if let Some(survivors) = args.survivors {
        config = config.with_survivor_count(survivors);
    }
    config.validate()?;
    info!(config = %config.summary(), "configuration loaded");

    let suite = TestSuite::load_from_file(&args.suite)?;
    info!(suite = %suite.summary(), "suite loaded");

    // Actor and operator calls retry under the run's own budgets; only
    // embeddings keep transport-level retries.
    let client = Arc::new(OpenAIClient::new()?);
    let single_shot = Arc::new(client.with_retry_config(RetryConfig::immediate(0)));
    let factory = llm_actor_factory(single_shot.clone(), GenerationOptions::default());
    let mut operator = LlmGeneticOperator::new(single_shot, config.genetic.clone())?;
    if let Some(seed) = config.seed {
        operator = operator.with_seed(seed);
    }

    let cancel = CancellationSignal::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current step");
            interrupt.cancel();
        }
    });

    let mut optimizer =
        Optimizer::new(config, factory, Arc::new(operator)).with_cancellation(cancel);
    if suite.needs_scorer() {
        optimizer = optimizer.with_scorer(Arc::new(EmbeddingSimilarity::new(client, args.metric)));
    }

    println!(
        "{} Optimizing {} seed prompt(s) against {} test case(s)",
        "Run:".blue().bold(),
        suite.seed_prompts.len(),
        suite.test_cases.len()
    );

    let report = match optimizer.run(&suite.seed_prompts, &suite.test_cases).await {
        Ok(report) => report,
        Err(run_err) => {
            if let Some(best) = &run_err.best {
                eprintln!(
                    "{} best before the failure scored {:.4} (generation {}):",
                    "Partial:".yellow().bold(),
                    best.score,
                    best.generation
                );
                eprintln!("{}", best.prompt);
            }
            return Err(run_err.into());
        }
    };

    print_report(&report);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .map_err(|e| Error::file_write_error(path.display().to_string(), e))?;
        println!(
            "{} report written to {}",
            "Saved:".blue().bold(),
            path.display().to_string().cyan()
        );
    }
    Ok(())
}

fn print_report(report: &OptimizationReport) {
    println!();
    println!("{}", "Generations".bold());
    for summary in &report.history {
        let best = summary
            .best_score
            .map(|s| format!("{:.4}", s))
            .unwrap_or_else(|| "-".to_string());
        let shortfall = if summary.shortfall > 0 {
            format!(" (short by {})", summary.shortfall).yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  #{:<3} best {}  mean {:.4}  size {}{}",
            summary.number, best, summary.mean_score, summary.population_size, shortfall
        );
    }

    println!();
    println!(
        "{} {:.4} (generation {}, {})",
        "Best score:".green().bold(),
        report.best_score,
        report.best_generation,
        report.termination
    );
    println!("{}", "Best prompt:".green().bold());
    println!("{}", report.best_prompt);
}

fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(77).collect::<String>())
    } else {
        line.to_string()
    }
}
