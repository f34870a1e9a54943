//! batch-template - expand a JSON/YAML template once per CSV or JSON row

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser};

use batch_template::config::{ExpanderConfig, IntFallback};
use batch_template::template::{
    ExpressionContext, Row, TemplateExpander, parse_json_rows, read_csv_rows,
};

#[derive(Parser)]
#[command(name = "batch-template")]
#[command(about = "Expand a JSON/YAML template for every row of a CSV or JSON file")]
#[command(version)]
#[command(group(ArgGroup::new("rows").required(true).args(["csv", "json"])))]
struct Cli {
    /// Template file (YAML or JSON)
    #[arg(short, long)]
    template: PathBuf,

    /// CSV input with a header line
    #[arg(long)]
    csv: Option<PathBuf>,

    /// JSON input: an array of objects or a single object
    #[arg(long)]
    json: Option<PathBuf>,

    /// Expander configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fail rows whose `:int` values are not numbers instead of using 0
    #[arg(long)]
    strict_int: bool,

    /// Continue with the next row after a failure
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    keep_going: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_rows(cli: &Cli) -> Result<Vec<Row>> {
    if let Some(path) = &cli.csv {
        let file = File::open(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
        return read_csv_rows(file)
            .with_context(|| format!("Failed to read CSV rows: {}", path.display()));
    }

    if let Some(path) = &cli.json {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read JSON file: {}", path.display()))?;
        return parse_json_rows(&content)
            .with_context(|| format!("Failed to parse JSON rows: {}", path.display()));
    }

    anyhow::bail!("Either --csv or --json is required")
}

/// Returns whether every row succeeded
fn run(cli: &Cli) -> Result<bool> {
    let mut config = match &cli.config {
        Some(path) => ExpanderConfig::load(path)?,
        None => ExpanderConfig::default(),
    };
    if cli.strict_int {
        config.int_fallback = IntFallback::Error;
    }

    let content = fs::read_to_string(&cli.template)
        .with_context(|| format!("Failed to read template: {}", cli.template.display()))?;
    let expander = TemplateExpander::from_yaml(&content)
        .with_context(|| format!("Failed to parse template: {}", cli.template.display()))?;

    let rows = load_rows(cli)?;
    log::info!("Loaded {} rows", rows.len());

    let mut ctx = ExpressionContext::with_config(&config);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0;

    for result in expander.expand_rows(&mut ctx, rows) {
        if let Some(expanded) = result.expanded() {
            writeln!(out, "{}", expanded).context("Failed to write output")?;
        }

        if let Some(failure) = result.to_failure_json() {
            failed += 1;
            eprintln!("{}", failure);
            if !cli.keep_going {
                log::warn!("Stopping after failure on line {}", result.line_number);
                break;
            }
        }
    }

    out.flush().context("Failed to flush output")?;
    Ok(failed == 0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
