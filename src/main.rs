use clap::Parser;
use mayhap::{FileLoader, Generator, Shell, load_grammar};
use std::error::Error;
use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Grammar-based random text generator
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the grammar file
    grammar: PathBuf,

    /// Pattern or symbol to evaluate; reads standard input when omitted
    pattern: Option<String>,

    /// Start an interactive shell even if standard input is not a terminal
    #[arg(short, long, conflicts_with_all = ["batch", "test"])]
    interactive: bool,

    /// Evaluate each line of standard input even if it is a terminal
    #[arg(short, long, conflicts_with = "test")]
    batch: bool,

    /// Evaluate every rule once and report the ones that fail
    #[arg(short, long)]
    test: bool,

    /// Log the expansion of every token to standard error
    #[arg(short, long)]
    verbose: bool,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Number of times to evaluate PATTERN
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// Print the parsed grammar as JSON and exit
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "mayhap=trace" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .without_time()
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, Box<dyn Error>> {
    let grammar = load_grammar(&cli.grammar)?;
    debug!(symbols = grammar.len(), "loaded grammar:\n{grammar}");

    if cli.json {
        println!("{}", grammar.to_json()?);
        return Ok(ExitCode::SUCCESS);
    }

    let mut generator = match cli.seed {
        Some(seed) => Generator::seeded(grammar, seed),
        None => Generator::new(grammar),
    };

    if cli.test {
        let failures = generator.check();
        for failure in &failures {
            println!("{}", failure.symbol);
            println!("\t{}", failure.rule);
            println!("Error: {}", failure.error);
            println!();
        }
        if failures.is_empty() {
            println!("OK");
        } else {
            println!("FAILED (failures={})", failures.len());
        }
        return Ok(ExitCode::from(failures.len().min(255) as u8));
    }

    if let Some(pattern) = &cli.pattern {
        for _ in 0..cli.count {
            println!("{}", generator.evaluate_input(pattern)?);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let stdin = io::stdin();
    let use_shell = cli.interactive || (!cli.batch && stdin.is_terminal());
    if use_shell {
        Shell::new(generator, FileLoader::for_grammar(&cli.grammar)).run()?;
        return Ok(ExitCode::SUCCESS);
    }

    for line in stdin.lock().lines() {
        let line = line?;
        match generator.evaluate_input(&line) {
            Ok(output) => println!("{output}"),
            Err(err) => {
                eprintln!("Error: {err}");
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
