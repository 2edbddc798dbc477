use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "chatsift")]
#[command(about = "Parse ChatGPT export archives into a browsable corpus", long_about = None)]
pub struct Cli {
    /// Path to the export archive (zip, possibly with nested zips)
    pub archive: Option<PathBuf>,

    /// Output directory for the parsed corpus
    #[arg(short, long, default_value = "output")]
    pub output: PathBuf,

    /// Print per-strategy match counts and unresolved citation examples
    #[arg(short, long)]
    pub verbose: bool,

    /// Legacy flat layout instead of per-conversation folders
    #[arg(long)]
    pub flat: bool,

    /// Retain the extraction workdir on success (enables rematch-media)
    #[arg(long)]
    pub keep_workdir: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Re-run media resolution over an existing extraction without
    /// re-unpacking the archive
    RematchMedia {
        /// Output directory of a previous run with a retained workdir
        out: PathBuf,
    },
}
