use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use rasterload_core::{ConnectionParams, LoadParams};
use rasterload_engine::classify::ClassifierConfig;
use rasterload_engine::output::{OutputFormat, format_invalid_lines, format_summary};
use rasterload_engine::report::ArtifactPaths;
use rasterload_engine::source::{self, ParsedBatch, RecordLayout, SourceConfig};
use rasterload_engine::{BatchOptions, run_batch, run_parsed_batch};

/// Exit code when at least one job failed.
const EXIT_JOB_FAILURES: i32 = 1;
/// Exit code for setup errors and internal accounting defects.
const EXIT_FATAL: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "rasterload")]
#[command(about = "Batch raster loading via external raster2pgsql/psql commands")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a batch of commands from a command file.
    Run(RunArgs),
    /// Build loader commands from raster paths or records, then execute.
    Load(LoadArgs),
    /// Parse a command file and report invalid lines without executing.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
struct BatchArgs {
    /// Number of parallel workers (default: number of CPUs).
    #[arg(long)]
    jobs: Option<usize>,
    /// Classify any failure-keyword match as an error, even on exit code 0.
    #[arg(long)]
    strict: bool,
    /// Kill commands running longer than this many seconds (default: no timeout).
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Output format for the final summary.
    #[arg(long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Command names a valid input line may begin with.
    #[arg(long = "command", default_values_t = [String::from("raster2pgsql")])]
    commands: Vec<String>,
    /// Placeholder marker; lines containing it are skipped.
    #[arg(long, default_value_t = '#')]
    placeholder: char,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Command file: one external command per line.
    #[arg(long)]
    input: PathBuf,
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    batch: BatchArgs,
}

#[derive(Debug, Args)]
struct LoadArgs {
    /// Input list: one raster path per line, or CSV records with --records.
    #[arg(long)]
    input: PathBuf,
    /// Treat the input as comma-separated records (path,srid per line).
    #[arg(long)]
    records: bool,
    /// SRID applied to every raster (per-record SRIDs win in --records mode).
    #[arg(long)]
    srid: i32,
    /// Loader tile size, WxH.
    #[arg(long, default_value = "100x100")]
    tile_size: String,
    /// Target schema.
    #[arg(long)]
    schema: String,
    /// Target table.
    #[arg(long)]
    table: String,
    /// Append to an existing table instead of creating it.
    #[arg(long)]
    append: bool,
    /// Database host.
    #[arg(long, default_value = "localhost")]
    host: String,
    /// Database port.
    #[arg(long, default_value_t = 5432)]
    port: u16,
    /// Database user.
    #[arg(long)]
    user: String,
    /// Database name.
    #[arg(long)]
    dbname: String,
    #[command(flatten)]
    batch: BatchArgs,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Command file to validate.
    #[arg(long)]
    input: PathBuf,
    #[command(flatten)]
    source: SourceArgs,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => run_command_file(args),
        Command::Load(args) => run_load(args),
        Command::Check(args) => run_check(args),
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(EXIT_FATAL);
        }
    }
}

fn batch_options(source: &SourceArgs, batch: &BatchArgs) -> BatchOptions {
    BatchOptions {
        source: SourceConfig {
            expected_commands: source.commands.clone(),
            placeholder: source.placeholder,
        },
        classifier: if batch.strict {
            ClassifierConfig::strict()
        } else {
            ClassifierConfig::default()
        },
        max_parallelism: batch.jobs,
        timeout: batch.timeout_secs.map(Duration::from_secs),
    }
}

fn run_command_file(args: RunArgs) -> Result<i32, String> {
    let options = batch_options(&args.source, &args.batch);
    let summary = run_batch(&args.input, &options).map_err(|err| err.to_string())?;
    finish(&summary, args.batch.format)
}

fn run_load(args: LoadArgs) -> Result<i32, String> {
    let params = LoadParams {
        srid: args.srid,
        tile_size: args.tile_size.clone(),
        schema: args.schema.clone(),
        table: args.table.clone(),
        append: args.append,
        connection: ConnectionParams {
            host: args.host.clone(),
            port: args.port,
            user: args.user.clone(),
            dbname: args.dbname.clone(),
        },
    };

    let errors = rasterload_core::validate_load_params(&params);
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(messages.join("; "));
    }

    let batch = if args.records {
        source::jobs_from_records(&args.input, &RecordLayout::default(), &params, '#')
            .map_err(|err| err.to_string())?
    } else {
        let raw = std::fs::read_to_string(&args.input)
            .map_err(|err| format!("failed to read input '{}': {err}", args.input.display()))?;
        let paths: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        ParsedBatch {
            jobs: source::jobs_from_paths(&paths, &params).map_err(|err| err.to_string())?,
            invalid: Vec::new(),
        }
    };

    if batch.jobs.is_empty() {
        return Err(format!(
            "input '{}' contains no runnable commands",
            args.input.display()
        ));
    }

    let source_args = SourceArgs {
        commands: vec!["raster2pgsql".to_string()],
        placeholder: '#',
    };
    let options = batch_options(&source_args, &args.batch);
    let runner = rasterload_engine::executor::CommandRunner::with_timeout(options.timeout);
    let summary = run_parsed_batch(
        &batch,
        ArtifactPaths::for_input(&args.input),
        &options,
        &runner,
    )
    .map_err(|err| err.to_string())?;
    finish(&summary, args.batch.format)
}

fn run_check(args: CheckArgs) -> Result<i32, String> {
    let config = SourceConfig {
        expected_commands: args.source.commands.clone(),
        placeholder: args.source.placeholder,
    };
    let batch = source::parse(&args.input, &config).map_err(|err| err.to_string())?;

    println!(
        "{} runnable command(s), {} invalid line(s).",
        batch.jobs.len(),
        batch.invalid.len()
    );
    if !batch.invalid.is_empty() {
        print!("{}", format_invalid_lines(&batch.invalid));
    }

    Ok(0)
}

fn finish(summary: &rasterload_core::RunSummary, format: OutputFormat) -> Result<i32, String> {
    println!("{}", format_summary(summary, format)?);
    Ok(if summary.has_failures() {
        EXIT_JOB_FAILURES
    } else {
        0
    })
}
