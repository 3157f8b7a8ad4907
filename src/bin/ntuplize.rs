//! CLI for producing flat jet ntuples from JSON-lines event files.
//!
//! # Usage
//!
//! ```bash
//! # Project events with the default configuration
//! cargo run --release --bin ntuplize -- \
//!     --input data/ttbar.events.jsonl \
//!     --output out/ttbar.records.jsonl
//!
//! # With a configuration file, run statistics and a warning report
//! cargo run --release --bin ntuplize -- \
//!     -i data/ttbar.events.jsonl -o out/ttbar.records.jsonl \
//!     --config ntuplizer.json --stats out/stats.json --warnings out/warnings.json
//!
//! # Write the default configuration as a starting point
//! cargo run --release --bin ntuplize -- --write-config ntuplizer.json
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use jet_ntuplizer::{
    EventSource, JsonLinesSink, JsonLinesSource, Ntuplizer, NtuplizerConfig, Result,
};

/// Command-line arguments
struct Args {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    stats: Option<PathBuf>,
    warnings: Option<PathBuf>,
    write_config: Option<PathBuf>,
    skip_malformed: bool,
}

fn parse_args() -> std::result::Result<Args, String> {
    let args: Vec<String> = env::args().collect();

    let mut parsed = Args {
        input: None,
        output: None,
        config: None,
        stats: None,
        warnings: None,
        write_config: None,
        skip_malformed: false,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || -> std::result::Result<PathBuf, String> {
            i += 1;
            args.get(i)
                .map(PathBuf::from)
                .ok_or_else(|| format!("{flag} requires a path"))
        };

        match flag {
            "--input" | "-i" => parsed.input = Some(value()?),
            "--output" | "-o" => parsed.output = Some(value()?),
            "--config" | "-c" => parsed.config = Some(value()?),
            "--stats" => parsed.stats = Some(value()?),
            "--warnings" => parsed.warnings = Some(value()?),
            "--write-config" => parsed.write_config = Some(value()?),
            "--skip-malformed" => parsed.skip_malformed = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if parsed.input.is_none() && !arg.starts_with('-') => {
                parsed.input = Some(PathBuf::from(arg));
            }
            arg if parsed.output.is_none() && !arg.starts_with('-') => {
                parsed.output = Some(PathBuf::from(arg));
            }
            arg => return Err(format!("Unknown argument: {arg}")),
        }
        i += 1;
    }

    if parsed.write_config.is_none() && (parsed.input.is_none() || parsed.output.is_none()) {
        return Err("Input and output paths are required".to_string());
    }

    Ok(parsed)
}

fn print_help() {
    eprintln!(
        r#"
Project jet, track and vertex collections into flat ntuple records

USAGE:
    ntuplize [OPTIONS] --input <EVENTS> --output <RECORDS>
    ntuplize <EVENTS> <RECORDS>
    ntuplize --write-config <PATH>

OPTIONS:
    -i, --input <PATH>       JSON-lines event file (optional header line first)
    -o, --output <PATH>      JSON-lines record file to create
    -c, --config <PATH>      Ntuplizer configuration (JSON, missing keys default)
        --stats <PATH>       Write run statistics as JSON
        --warnings <PATH>    Write the warning report as JSON
        --skip-malformed     Skip undecodable events instead of aborting
        --write-config <PATH>
                             Write the default configuration and exit
    -h, --help               Print this help message

NOTES:
    - Real-data events with no configured trigger path fired are not written
    - Overflowing layout_capacity aborts the run
    - Log level follows RUST_LOG (default: info)
"#
    );
}

fn run(args: Args) -> Result<()> {
    if let Some(path) = &args.write_config {
        NtuplizerConfig::default().save_json(path)?;
        log::info!("Wrote default configuration to {}", path.display());
        if args.input.is_none() {
            return Ok(());
        }
    }

    let config = match &args.config {
        Some(path) => NtuplizerConfig::load_json(path)?,
        None => NtuplizerConfig::default(),
    };

    let (Some(input), Some(output)) = (&args.input, &args.output) else {
        return Err("Input and output paths are required".into());
    };

    let source = JsonLinesSource::open(input)?;
    let mut ntuplizer =
        Ntuplizer::for_source(config, source.metadata())?.skip_malformed(args.skip_malformed);
    let sink = JsonLinesSink::create(output)?;

    let result = ntuplizer.run(source, sink);

    // reports are written even when the run aborted
    if let Some(path) = &args.stats {
        ntuplizer.stats().save_json(path)?;
        log::info!("Wrote run statistics to {}", path.display());
    }
    if let Some(path) = &args.warnings {
        ntuplizer.warnings().export_to_file(path)?;
        log::info!("Wrote warning report to {}", path.display());
    }

    result
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Use --help for usage information");
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
