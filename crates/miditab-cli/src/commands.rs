//! Subcommand implementations.

use crate::OutputFormat;
use anyhow::{bail, Context, Result};
use clap::Args;
use miditab::{
    bpm_to_tempo, read_event_table, read_note_table, write_midi_file, EncodeOptions,
    MiditabConfig, NoteOrder, NoteTable,
};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Encoder settings given on the command line; each one overrides the config.
#[derive(Args, Debug, Default)]
pub struct EncodeOverrides {
    /// Tempo in beats per minute
    #[arg(long)]
    pub bpm: Option<f64>,

    /// File resolution (ticks per quarter note)
    #[arg(long)]
    pub ticks_per_beat: Option<u16>,

    /// Time signature, e.g. 3/4
    #[arg(long, value_parser = parse_time_signature)]
    pub time_signature: Option<(u8, u8)>,

    /// MIDI clocks per metronome click
    #[arg(long)]
    pub clocks_per_click: Option<u8>,

    /// Note velocity (0-127)
    #[arg(long)]
    pub velocity: Option<u8>,

    /// Sort each track's notes by start time before encoding
    #[arg(long)]
    pub sort_by_start: bool,
}

impl EncodeOverrides {
    pub fn apply(&self, base: &EncodeOptions) -> EncodeOptions {
        let mut options = base.clone();
        if let Some(bpm) = self.bpm {
            options.bpm = bpm;
        }
        if let Some(ticks_per_beat) = self.ticks_per_beat {
            options.ticks_per_beat = ticks_per_beat;
        }
        if let Some(time_signature) = self.time_signature {
            options.time_signature = time_signature;
        }
        if let Some(clocks_per_click) = self.clocks_per_click {
            options.clocks_per_click = clocks_per_click;
        }
        if let Some(velocity) = self.velocity {
            options.velocity = velocity;
        }
        if self.sort_by_start {
            options.note_order = NoteOrder::SortByStart;
        }
        options
    }
}

fn parse_time_signature(s: &str) -> Result<(u8, u8), String> {
    let (numerator, denominator) = s
        .split_once('/')
        .ok_or_else(|| format!("expected N/D, got '{s}'"))?;
    let numerator = numerator
        .trim()
        .parse()
        .map_err(|e| format!("bad numerator '{numerator}': {e}"))?;
    let denominator = denominator
        .trim()
        .parse()
        .map_err(|e| format!("bad denominator '{denominator}': {e}"))?;
    Ok((numerator, denominator))
}

pub fn load_config(path: Option<&Path>) -> Result<MiditabConfig> {
    let (config, files) = MiditabConfig::load(path).context("Failed to load configuration")?;
    debug!(?files, "configuration loaded");
    Ok(config)
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn write_json<T: Serialize>(mut out: Box<dyn Write>, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

pub fn events(input: &Path, output: Option<&Path>, format: OutputFormat) -> Result<()> {
    let table = read_event_table(input)
        .with_context(|| format!("Failed to decode {}", input.display()))?;
    info!(file = %input.display(), rows = table.len(), columns = table.columns().len(), "decoded events");

    let out = open_output(output)?;
    match format {
        OutputFormat::Csv => table.write_csv(out)?,
        OutputFormat::Json => write_json(out, &table)?,
    }
    Ok(())
}

pub fn notes(
    input: &Path,
    output: Option<&Path>,
    format: OutputFormat,
    config: &MiditabConfig,
) -> Result<()> {
    let table = read_note_table(input, &config.extract)
        .with_context(|| format!("Failed to extract notes from {}", input.display()))?;
    info!(
        file = %input.display(),
        notes = table.rows.len(),
        ticks_per_beat = table.ticks_per_beat,
        "extracted notes"
    );

    let out = open_output(output)?;
    match format {
        OutputFormat::Csv => table.write_csv(out)?,
        OutputFormat::Json => write_json(out, &table)?,
    }
    Ok(())
}

pub fn encode(
    input: &Path,
    output: &Path,
    overrides: &EncodeOverrides,
    config: &MiditabConfig,
) -> Result<()> {
    let options = overrides.apply(&config.encode);
    let table = NoteTable::read_csv_path(input, options.ticks_per_beat)
        .with_context(|| format!("Failed to read note table {}", input.display()))?;

    write_midi_file(&table.rows, output, &options)
        .with_context(|| format!("Failed to encode {}", input.display()))?;
    Ok(())
}

pub fn tempo(bpm: f64) -> Result<()> {
    println!("{}", bpm_to_tempo(bpm)?);
    Ok(())
}

fn is_midi_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("mid") || e.eq_ignore_ascii_case("midi"))
}

fn convert_one(
    path: &Path,
    output_dir: &Path,
    with_events: bool,
    config: &MiditabConfig,
) -> Result<()> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("file name is not valid UTF-8")?;

    let notes = read_note_table(path, &config.extract)?;
    notes.write_csv_path(output_dir.join(format!("{stem}.csv")))?;

    if with_events {
        let events = read_event_table(path)?;
        events.write_csv_path(output_dir.join(format!("{stem}.events.csv")))?;
    }

    debug!(file = %path.display(), notes = notes.rows.len(), "converted");
    Ok(())
}

pub fn dataset(
    input_dir: &Path,
    output_dir: &Path,
    with_events: bool,
    config: &MiditabConfig,
) -> Result<()> {
    let mut inputs: Vec<PathBuf> = fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read directory {}", input_dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    inputs.retain(|p| is_midi_file(p));
    inputs.sort();

    if inputs.is_empty() {
        warn!(dir = %input_dir.display(), "no MIDI files found");
        return Ok(());
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut failed = 0usize;
    for path in &inputs {
        if let Err(e) = convert_one(path, output_dir, with_events, config) {
            warn!(file = %path.display(), error = %format!("{e:#}"), "conversion failed");
            failed += 1;
        }
    }

    info!(
        converted = inputs.len() - failed,
        failed,
        output = %output_dir.display(),
        "dataset conversion finished"
    );

    if failed > 0 {
        bail!("{failed} of {} files failed to convert", inputs.len());
    }
    Ok(())
}
