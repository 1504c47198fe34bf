//! Write a note table back out as a format-1 Standard MIDI File.
//!
//! Track 0 carries tempo and time signature. Every distinct track label
//! gets its own track (labels in sorted order), named after the label.
//!
//! Each track is written as a single line of notes: a note that starts
//! before the previous one ends cuts the previous one short. The note-off
//! of the previous note is held back until the next row is seen so the
//! cut can still be applied; when the previous note would have to end
//! before it began, the table cannot be encoded.

use crate::notes::NoteRow;
use crate::tempo::bpm_to_tempo;
use crate::{Error, Result};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

const MAX_DELTA: u64 = 0x0FFF_FFFF;
const MAX_TICKS_PER_BEAT: u16 = 0x7FFF;
const NOTATED_32ND_NOTES_PER_BEAT: u8 = 8;

/// Row order inside a track when encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteOrder {
    /// Table order; the caller guarantees it is chronological
    #[default]
    AsGiven,
    /// Stable sort by start tick first
    SortByStart,
}

/// Options for note-table encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Tempo. Default: 120.
    pub bpm: f64,
    /// File resolution. Default: 960.
    pub ticks_per_beat: u16,
    /// (numerator, denominator). Default: (4, 4).
    pub time_signature: (u8, u8),
    /// MIDI clocks per metronome click. Default: 48.
    pub clocks_per_click: u8,
    /// Note-on and note-off velocity. Default: 64.
    pub velocity: u8,
    pub note_order: NoteOrder,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            ticks_per_beat: 960,
            time_signature: (4, 4),
            clocks_per_click: 48,
            velocity: 64,
            note_order: NoteOrder::AsGiven,
        }
    }
}

impl EncodeOptions {
    fn validate(&self) -> Result<()> {
        if self.ticks_per_beat == 0 || self.ticks_per_beat > MAX_TICKS_PER_BEAT {
            return Err(Error::InvalidResolution(self.ticks_per_beat));
        }
        let (numerator, denominator) = self.time_signature;
        if numerator == 0 || !denominator.is_power_of_two() {
            return Err(Error::InvalidTimeSignature {
                numerator,
                denominator,
            });
        }
        if self.velocity > 127 {
            return Err(Error::InvalidVelocity(self.velocity));
        }
        Ok(())
    }
}

/// A note-off not yet written: its end can still move earlier.
#[derive(Debug, Clone, Copy)]
struct PendingOff {
    key: u7,
    start: u64,
    end: u64,
}

/// Builds one note track, tracking the two cursors the overlap repair needs.
struct TrackWriter<'a> {
    label: &'a str,
    ticks_per_beat: u16,
    velocity: u7,
    events: Track<'a>,
    /// Absolute tick of the last message written
    last_event_time: u64,
    /// Absolute tick at which the previous note stops sounding
    prev_note_end_time: u64,
    pending_off: Option<PendingOff>,
}

impl<'a> TrackWriter<'a> {
    fn new(label: &'a str, ticks_per_beat: u16, velocity: u7) -> Self {
        let mut events = Track::new();
        events.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(label.as_bytes())),
        });
        Self {
            label,
            ticks_per_beat,
            velocity,
            events,
            last_event_time: 0,
            prev_note_end_time: 0,
            pending_off: None,
        }
    }

    fn push(&mut self, tick: u64, kind: TrackEventKind<'a>) -> Result<()> {
        debug_assert!(tick >= self.last_event_time);
        let delta = tick.saturating_sub(self.last_event_time);
        if delta > MAX_DELTA {
            return Err(Error::DeltaOverflow {
                track: self.label.to_string(),
                delta,
            });
        }
        self.events.push(TrackEvent {
            delta: u28::new(delta as u32),
            kind,
        });
        self.last_event_time = tick;
        Ok(())
    }

    fn channel_event(message: MidiMessage) -> TrackEventKind<'a> {
        TrackEventKind::Midi {
            channel: u4::new(0),
            message,
        }
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(off) = self.pending_off.take() {
            let kind = Self::channel_event(MidiMessage::NoteOff {
                key: off.key,
                vel: self.velocity,
            });
            self.push(off.end, kind)?;
        }
        Ok(())
    }

    fn add_note(&mut self, row: &NoteRow) -> Result<()> {
        if row.note > 127 {
            return Err(Error::InvalidNote {
                track: self.label.to_string(),
                note: row.note,
            });
        }

        let end = row.time.checked_add(row.duration).ok_or_else(|| Error::DeltaOverflow {
            track: self.label.to_string(),
            delta: row.duration,
        })?;

        if row.time < self.prev_note_end_time {
            let prev_end = self.prev_note_end_time;
            let overlap = prev_end - row.time;
            let (label, ticks_per_beat) = (self.label, self.ticks_per_beat);
            let conflict = || Error::UnrepairableConflict {
                track: label.to_string(),
                tick: prev_end,
                beat: prev_end as f64 / ticks_per_beat as f64,
            };
            let off = self.pending_off.as_mut().ok_or_else(conflict)?;
            // only the span between the previous note-on and its note-off can be given up
            if overlap > off.end - off.start {
                return Err(conflict());
            }
            off.end -= overlap;
            debug!(
                track = self.label,
                tick = row.time,
                overlap,
                "shortened previous note to resolve overlap"
            );
        }

        self.flush_pending()?;

        let key = u7::new(row.note);
        let kind = Self::channel_event(MidiMessage::NoteOn {
            key,
            vel: self.velocity,
        });
        self.push(row.time, kind)?;

        self.pending_off = Some(PendingOff {
            key,
            start: row.time,
            end,
        });
        self.prev_note_end_time = end;
        Ok(())
    }

    fn finish(mut self) -> Result<Track<'a>> {
        self.flush_pending()?;
        let end = self.last_event_time;
        self.push(end, TrackEventKind::Meta(MetaMessage::EndOfTrack))?;
        Ok(self.events)
    }
}

/// Build the tempo/time-signature track.
fn build_tempo_track(options: &EncodeOptions, tempo: u32) -> Track<'static> {
    let (numerator, denominator) = options.time_signature;
    let at_zero = |kind| TrackEvent {
        delta: u28::new(0),
        kind,
    };
    vec![
        at_zero(TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo)))),
        at_zero(TrackEventKind::Meta(MetaMessage::TimeSignature(
            numerator,
            denominator.trailing_zeros() as u8,
            options.clocks_per_click,
            NOTATED_32ND_NOTES_PER_BEAT,
        ))),
        at_zero(TrackEventKind::Meta(MetaMessage::EndOfTrack)),
    ]
}

/// Rows grouped by track label, labels sorted, table order kept inside each group.
fn group_by_track(rows: &[NoteRow]) -> BTreeMap<&str, Vec<&NoteRow>> {
    let mut groups: BTreeMap<&str, Vec<&NoteRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.track.as_str()).or_default().push(row);
    }
    groups
}

/// Encode note rows as Standard MIDI File format 1 bytes.
pub fn encode_notes(rows: &[NoteRow], options: &EncodeOptions) -> Result<Vec<u8>> {
    options.validate()?;
    let tempo = bpm_to_tempo(options.bpm)?;
    let velocity = u7::new(options.velocity);

    let mut tracks: Vec<Track> = vec![build_tempo_track(options, tempo)];

    for (label, mut notes) in group_by_track(rows) {
        if options.note_order == NoteOrder::SortByStart {
            notes.sort_by_key(|n| n.time);
        }

        let mut writer = TrackWriter::new(label, options.ticks_per_beat, velocity);
        for note in &notes {
            writer.add_note(note)?;
        }
        debug!(track = label, notes = notes.len(), "encoded track");
        tracks.push(writer.finish()?);
    }

    let smf = Smf {
        header: Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(options.ticks_per_beat)),
        ),
        tracks,
    };

    let mut buffer = Vec::new();
    smf.write(&mut buffer)
        .map_err(|e| Error::MidiWrite(e.to_string()))?;
    Ok(buffer)
}

/// Encode note rows and write the file to `path`.
pub fn write_midi_file(
    rows: &[NoteRow],
    path: impl AsRef<Path>,
    options: &EncodeOptions,
) -> Result<()> {
    let bytes = encode_notes(rows, options)?;
    std::fs::write(path.as_ref(), &bytes)?;
    info!(
        path = %path.as_ref().display(),
        notes = rows.len(),
        bytes = bytes.len(),
        "wrote MIDI file"
    );
    Ok(())
}
