//! kata CLI
//!
//! Runs a submission against a test file, validates code without running it,
//! or evaluates a snippet in the sandboxed interpreter.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use kata::engine::runner::WORKER_STACK_SIZE;
use kata::engine::{validate_code, TestSuite};
use kata::runtime::{inspect, ResourceLimits, Runtime};
use kata::{EngineConfig, Outcome, TestEngine};

#[derive(Parser)]
#[command(name = "kata")]
#[command(author, version, about = "Run coding-practice submissions against their test cases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a submission against a test file
    Run {
        /// JavaScript file with the submission
        code: PathBuf,
        /// JSON test cases: an array or { "testCases": [...] }
        tests: PathBuf,
        /// Budget for the whole batch in milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
        /// Skip static validation
        #[arg(long)]
        no_validate: bool,
        /// JSON engine configuration
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a submission without running it
    Check {
        /// JavaScript file with the submission
        code: PathBuf,
        /// Function that must appear in the code
        #[arg(short, long)]
        function: Option<String>,
    },

    /// Evaluate a snippet and print its value
    Eval {
        /// The code to evaluate
        #[arg(required_unless_present = "file")]
        code: Option<String>,
        /// Read the code from a file instead
        #[arg(short, long, conflicts_with = "code")]
        file: Option<PathBuf>,
        /// Time limit in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 5000)]
        timeout_ms: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            code,
            tests,
            timeout_ms,
            no_validate,
            config,
            json,
        } => run_submission(&code, &tests, timeout_ms, no_validate, config.as_deref(), json),
        Commands::Check { code, function } => check_code(&code, function.as_deref()),
        Commands::Eval {
            code,
            file,
            timeout_ms,
        } => eval_code(code, file.as_deref(), timeout_ms),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn setup_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "kata=warn",
        1 => "kata=info",
        2 => "kata=debug",
        _ => "kata=trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn run_submission(
    code_path: &Path,
    tests_path: &Path,
    timeout_ms: Option<u64>,
    no_validate: bool,
    config_path: Option<&Path>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let code = read_source(code_path)?;
    let suite: TestSuite = serde_json::from_str(&read_source(tests_path)?)
        .with_context(|| format!("invalid test file {}", tests_path.display()))?;

    let mut config = match config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(ms) = timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }
    if no_validate {
        config.validate_syntax = false;
    }
    config.validate()?;

    let outcome = TestEngine::new(config).execute(&code, &suite.into_cases());

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match &outcome {
            Outcome::Report(report) => print!("{}", report),
            Outcome::Error { error } => eprintln!("✗ {}", error),
        }
    }

    Ok(if outcome.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn check_code(code_path: &Path, function: Option<&str>) -> anyhow::Result<ExitCode> {
    let code = read_source(code_path)?;
    let validation = validate_code(&code, function);
    match validation.error {
        None => {
            println!("✓ {} is valid", code_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Some(error) => {
            eprintln!("✗ {}", error);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn eval_code(
    code: Option<String>,
    file: Option<&Path>,
    timeout_ms: u64,
) -> anyhow::Result<ExitCode> {
    let source = match (code, file) {
        (_, Some(path)) => read_source(path)?,
        (Some(code), None) => code,
        (None, None) => return Err(anyhow!("no code given")),
    };

    // The evaluator recurses on the host stack, so run it with room to spare
    let worker = thread::Builder::new()
        .name("kata-eval".to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || {
            let mut runtime = Runtime::with_limits(ResourceLimits::new().with_time_limit(timeout_ms));
            let result = runtime.eval(&source);
            let console = runtime.console_output().to_vec();
            (result.map(|value| inspect(&value)), console)
        })
        .context("cannot start evaluator thread")?;

    let (result, console) = worker
        .join()
        .map_err(|_| anyhow!("evaluator panicked"))?;
    for line in console {
        println!("{}", line);
    }
    match result {
        Ok(value) => {
            println!("{}", value);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
