//! MIDI ⇄ table conversion for symbolic-music datasets.
//!
//! Three one-way converters share a tempo helper:
//!
//! - [`decode`]: MIDI → event table, one row per message with absolute ticks.
//! - [`notes`]: MIDI → note table, note-on/note-off pairs as
//!   `(track, time, duration, note)` rows.
//! - [`encode`]: note table → format-1 MIDI, repairing overlaps inside a track.
//!
//! Ticks are the time unit everywhere; mapping ticks to seconds through a
//! tempo map is left to the caller.
//!
//! # Example
//!
//! ```
//! use miditab::{encode_notes, extract_bytes, EncodeOptions, ExtractOptions, NoteRow};
//!
//! let rows = vec![
//!     NoteRow::new("piano", 0, 480, 60),
//!     NoteRow::new("piano", 960, 480, 64),
//! ];
//! let midi = encode_notes(&rows, &EncodeOptions::default()).unwrap();
//! let table = extract_bytes(&midi, &ExtractOptions::default()).unwrap();
//!
//! assert_eq!(table.rows.len(), 2);
//! assert_eq!(table.rows[1].time, 960);
//! ```

pub mod config;
pub mod decode;
pub mod encode;
pub mod message;
pub mod notes;
pub mod table;
pub mod tempo;

pub use config::{ConfigError, MiditabConfig};
pub use decode::{decode_bytes, decode_events, read_event_table};
pub use encode::{encode_notes, write_midi_file, EncodeOptions, NoteOrder};
pub use message::EventMessage;
pub use notes::{
    extract_bytes, extract_notes, read_note_table, ExtractOptions, NoteRow, NoteTable, Retrigger,
    UnclosedNote, UnmatchedNoteOff,
};
pub use table::{ColumnType, Table, Value};
pub use tempo::{bpm_to_tempo, tempo_to_bpm};

/// Errors from MIDI table conversion.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("MIDI write error: {0}")]
    MidiWrite(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid tempo: {bpm} BPM is not a positive, finite number")]
    InvalidBpm { bpm: f64 },

    #[error("tempo of {bpm} BPM does not fit in a 24-bit microseconds-per-beat value")]
    TempoOutOfRange { bpm: f64 },

    #[error("{track}: unable to adjust the duration of the previous note at beat {beat} (tick {tick})")]
    UnrepairableConflict { track: String, tick: u64, beat: f64 },

    #[error("{track}: note-off for pitch {pitch} at tick {tick} has no matching note-on")]
    UnmatchedNoteOff { track: String, pitch: u8, tick: u64 },

    #[error("{track}: note-on for pitch {pitch} at tick {tick} while it is already sounding since tick {start_tick}")]
    Retrigger {
        track: String,
        pitch: u8,
        tick: u64,
        start_tick: u64,
    },

    #[error("{track}: pitch {pitch} started at tick {start_tick} is never released")]
    UnclosedNote {
        track: String,
        pitch: u8,
        start_tick: u64,
    },

    #[error("{track}: note number {note} is outside 0..=127")]
    InvalidNote { track: String, note: u8 },

    #[error("velocity {0} is outside 0..=127")]
    InvalidVelocity(u8),

    #[error("ticks per beat must be in 1..=32767, got {0}")]
    InvalidResolution(u16),

    #[error("invalid time signature {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u8, denominator: u8 },

    #[error("{track}: delta of {delta} ticks exceeds the 28-bit MIDI limit")]
    DeltaOverflow { track: String, delta: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
