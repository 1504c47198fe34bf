//! Flatten every track event of a MIDI file into one event table.
//!
//! Columns: `type`, the message's own fields, `time` (delta ticks),
//! `meta` (0/1), `track` (0-based index) and `tick` (absolute ticks,
//! restarting at 0 for each track).

use crate::message::EventMessage;
use crate::table::{Table, Value};
use crate::tempo::tempo_to_bpm;
use crate::{Error, Result};
use midly::Smf;
use std::path::Path;
use tracing::debug;

/// Build the event table for a parsed file.
pub fn decode_events(smf: &Smf) -> Table {
    let mut table = Table::new();

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut track_table = Table::new();
        let mut current_tick: u64 = 0;

        for event in track {
            let delta = event.delta.as_int();
            current_tick += delta as u64;

            let message = EventMessage::from_kind(&event.kind);
            if let EventMessage::SetTempo { tempo } = message {
                debug!(
                    track = track_index,
                    tick = current_tick,
                    tempo,
                    bpm = tempo_to_bpm(tempo),
                    "tempo change"
                );
            }
            let mut record: Vec<(&str, Value)> = Vec::with_capacity(10);
            record.push(("type", message.type_name().into()));
            record.extend(message.fields());
            record.push(("time", delta.into()));
            record.push(("meta", u8::from(message.is_meta()).into()));
            record.push(("track", (track_index as u64).into()));
            record.push(("tick", current_tick.into()));

            track_table.push_record(record);
        }

        debug!(
            track = track_index,
            rows = track_table.len(),
            last_tick = current_tick,
            "decoded track"
        );

        table = table.union(track_table);
    }

    let coerced = table.coerce_integral_columns();
    if !coerced.is_empty() {
        debug!(columns = ?coerced, "coerced integral float columns");
    }

    table
}

/// Parse MIDI bytes and build the event table.
pub fn decode_bytes(midi_bytes: &[u8]) -> Result<Table> {
    let smf = Smf::parse(midi_bytes).map_err(|e| Error::MidiParse(e.to_string()))?;
    Ok(decode_events(&smf))
}

/// Read a MIDI file from disk and build the event table.
pub fn read_event_table(path: impl AsRef<Path>) -> Result<Table> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_bytes(&bytes)
}
