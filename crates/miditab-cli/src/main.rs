//! miditab - MIDI ⇄ CSV conversion for symbolic music datasets
//!
//! Subcommands:
//! - `miditab events <file>` - Flatten every message into an event table
//! - `miditab notes <file>` - Pair note-on/note-off into a note table
//! - `miditab encode <csv> <out>` - Write a note table back out as MIDI
//! - `miditab tempo <bpm>` - Print microseconds per quarter note
//! - `miditab dataset <dir> <out_dir>` - Convert a directory of MIDI files

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "miditab")]
#[command(about = "Convert MIDI files to tables and back")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./miditab.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten every track event into one table
    Events {
        /// MIDI file to read
        input: PathBuf,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "csv")]
        format: OutputFormat,
    },

    /// Extract notes as (track, time, duration, note) rows
    Notes {
        /// MIDI file to read
        input: PathBuf,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "csv")]
        format: OutputFormat,
    },

    /// Encode a note CSV (track,time,duration,note) as a MIDI file
    Encode {
        /// Note table CSV
        input: PathBuf,

        /// MIDI file to write
        output: PathBuf,

        #[command(flatten)]
        overrides: commands::EncodeOverrides,
    },

    /// Convert BPM to MIDI tempo (microseconds per quarter note)
    Tempo {
        /// Beats per minute
        bpm: f64,
    },

    /// Convert every .mid/.midi file in a directory to note CSVs
    Dataset {
        /// Directory of MIDI files
        input_dir: PathBuf,

        /// Directory for the CSV files (created if missing)
        output_dir: PathBuf,

        /// Also write <name>.events.csv next to each note table
        #[arg(long)]
        events: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Events {
            input,
            output,
            format,
        } => {
            commands::events(&input, output.as_deref(), format)?;
        }
        Commands::Notes {
            input,
            output,
            format,
        } => {
            commands::notes(&input, output.as_deref(), format, &config)?;
        }
        Commands::Encode {
            input,
            output,
            overrides,
        } => {
            commands::encode(&input, &output, &overrides, &config)?;
        }
        Commands::Tempo { bpm } => {
            commands::tempo(bpm)?;
        }
        Commands::Dataset {
            input_dir,
            output_dir,
            events,
        } => {
            commands::dataset(&input_dir, &output_dir, events, &config)?;
        }
    }

    Ok(())
}
