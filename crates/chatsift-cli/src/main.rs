mod commands;
mod logging;
mod progress;

use std::path::Path;
use std::process;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;

use chatsift_core::engine::RunOptions;
use chatsift_core::{Error, ExportEngine, PipelineResult};
use tracing::error;

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match chatsift_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let code = match &args.command {
        Some(Commands::RematchMedia { out }) => run_rematch(config, out, &args),
        None => match args.archive.clone() {
            Some(archive) => run_parse(config, &archive, &args),
            None => {
                let _ = Cli::command().print_long_help();
                0
            }
        },
    };

    process::exit(code);
}

fn run_parse(config: chatsift_core::AppConfig, archive: &Path, args: &Cli) -> i32 {
    let engine = ExportEngine::new(config);
    let options = RunOptions {
        flat: args.flat,
        keep_workdir: args.keep_workdir,
    };
    let reporter = CliReporter::new();

    match engine.run(archive, &args.output, &options, &reporter) {
        Ok(result) => {
            println!();
            print_summary(&result, args.verbose);
            println!(
                "\n✅ Parsing complete. Output saved to: {}",
                args.output.display()
            );
            0
        }
        Err(err) => exit_code_for(&err),
    }
}

fn run_rematch(config: chatsift_core::AppConfig, out: &Path, args: &Cli) -> i32 {
    let engine = ExportEngine::new(config);
    let options = RunOptions {
        flat: args.flat,
        keep_workdir: true,
    };
    let reporter = CliReporter::new();

    match engine.rematch(out, &options, &reporter) {
        Ok(result) => {
            println!();
            print_summary(&result, args.verbose);
            0
        }
        Err(err) => exit_code_for(&err),
    }
}

/// Exit 0 on success, 2 on malformed input, 1 on fatal extraction failure
/// or any other fatal error.
fn exit_code_for(err: &Error) -> i32 {
    error!("Error: {}", err);
    match err {
        Error::InvalidInput(_) => 2,
        _ => 1,
    }
}

fn print_summary(result: &PipelineResult, verbose: bool) {
    tracing::info!(
        "Extract: {}, Index: {}, Resolve: {}, Write: {}",
        format!("{:.2}s", result.extract_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.index_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.resolve_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.write_duration.as_secs_f64()).green(),
    );
    tracing::info!(
        "{} conversations emitted ({} duplicates dropped), {} media files indexed, {} copied",
        format!("{}", result.conversations_emitted).cyan(),
        format!("{}", result.duplicates_dropped).cyan(),
        format!("{}", result.media_indexed).cyan(),
        format!("{}", result.media_copied).cyan(),
    );
    tracing::info!(
        "{} conversations with media, {} with assets, {} unresolved citations",
        format!("{}", result.with_media).cyan(),
        format!("{}", result.with_assets).cyan(),
        format!("{}", result.stats.unresolved_citations).red(),
    );

    if !verbose {
        return;
    }

    println!("\n{}", "=== Citations by kind ===".bold());
    for (kind, count) in &result.stats.citations_by_kind {
        println!("  {:<24} {}", kind, count);
    }
    println!("\n{}", "=== Resolutions by strategy ===".bold());
    for (strategy, count) in &result.stats.resolved_by_strategy {
        println!("  {:<24} {}", strategy, count);
    }
    if !result.stats.unresolved_examples.is_empty() {
        println!("\n{}", "=== Unresolved examples ===".bold());
        for example in &result.stats.unresolved_examples {
            println!("  {:<24} {}", example.kind, example.payload);
        }
    }
}
