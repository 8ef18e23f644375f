use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use transmem::{DataBatch, DataDir, Result, TranslationMemory, search};

mod cli;

use cli::{Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("TRANSMEM_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let memory =
        TranslationMemory::open(&data_dir.index_dir()?, cli.memory_config())?;

    let result = run(&cli.command, &memory, &data_dir);
    memory.close();
    result
}

fn run(
    command: &Command,
    memory: &TranslationMemory,
    data_dir: &DataDir,
) -> Result<()> {
    match command {
        Command::Apply(args) => {
            let batch = read_batch(&args.file)?;
            let report = memory.on_data_received(&batch)?;
            if args.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!(
                    "added {}, revisions {}, deleted memories {}, \
                     replayed {}, rejected {}",
                    report.added,
                    report.revisions,
                    report.deleted_memories,
                    report.replayed,
                    report.rejected
                );
            }
        }
        Command::Search(args) => {
            let results = memory.search(
                args.user,
                &args.direction,
                &args.sentence,
                args.context.as_ref(),
                args.count,
            )?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                search::format_human(&results);
            }
        }
        Command::Dump(args) => {
            let mut failure = None;
            memory.dump(|entry| {
                if failure.is_some() {
                    return;
                }
                if args.json {
                    match serde_json::to_string(&entry) {
                        Ok(line) => println!("{line}"),
                        Err(e) => failure = Some(e),
                    }
                } else {
                    println!(
                        "{}\t{}\t{}\t{}",
                        entry.memory,
                        entry.direction,
                        entry.source,
                        entry.target
                    );
                }
            })?;
            if let Some(e) = failure {
                return Err(e.into());
            }
        }
        Command::Positions(args) => {
            let positions = memory.latest_channel_positions()?;
            if args.json {
                println!("{}", serde_json::to_string(&positions)?);
            } else if positions.is_empty() {
                println!("No channel positions recorded.");
            } else {
                for (channel, position) in &positions {
                    println!("{channel}\t{position}");
                }
            }
        }
        Command::Status(args) => {
            cmd_status(memory, data_dir, args.json)?;
        }
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}

fn read_batch(path: &Path) -> Result<DataBatch> {
    let raw = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

fn cmd_status(
    memory: &TranslationMemory,
    data_dir: &DataDir,
    json: bool,
) -> Result<()> {
    let units = memory.num_units()?;
    let channels = memory.latest_channel_positions()?.len();
    let config = memory.config();

    if json {
        let status = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "units": units,
            "channels": channels,
            "min_query_size": config.min_query_size,
            "rescore": config.rescore,
        });
        println!("{status}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Translation units: {units}");
        println!("Channels: {channels}");
        println!(
            "Rescoring: {}",
            if config.rescore { "on" } else { "off" }
        );
    }
    Ok(())
}
