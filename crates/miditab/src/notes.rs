//! Pair note-on/note-off events into `(track, time, duration, note)` rows.
//!
//! Every track keeps its own per-pitch state (`Idle` or `Sounding`). The
//! irregular cases (a release with nothing sounding, a second note-on
//! for a sounding pitch, a note still held at the end of a track) follow
//! the policies in [`ExtractOptions`].

use crate::tempo::tempo_to_bpm;
use crate::{Error, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Resolution assumed for SMPTE-timed files.
const FALLBACK_TICKS_PER_BEAT: u16 = 480;

/// One sounding note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRow {
    /// Track label, e.g. `Track2`
    pub track: String,
    /// Start, absolute ticks
    pub time: u64,
    /// Length in ticks
    pub duration: u64,
    /// MIDI note number
    pub note: u8,
}

impl NoteRow {
    pub fn new(track: impl Into<String>, time: u64, duration: u64, note: u8) -> Self {
        Self {
            track: track.into(),
            time,
            duration,
            note,
        }
    }

    pub fn end(&self) -> u64 {
        self.time.saturating_add(self.duration)
    }
}

/// Notes extracted from one file, in the order they were released.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteTable {
    pub ticks_per_beat: u16,
    pub rows: Vec<NoteRow>,
}

impl NoteTable {
    /// Read rows from CSV with a `track,time,duration,note` header.
    ///
    /// CSV carries no resolution, so the caller supplies it.
    pub fn read_csv<R: io::Read>(reader: R, ticks_per_beat: u16) -> Result<Self> {
        let mut csv = csv::Reader::from_reader(reader);
        let rows = csv
            .deserialize()
            .collect::<std::result::Result<Vec<NoteRow>, csv::Error>>()?;
        Ok(Self {
            ticks_per_beat,
            rows,
        })
    }

    pub fn read_csv_path(path: impl AsRef<Path>, ticks_per_beat: u16) -> Result<Self> {
        let file = File::open(path)?;
        Self::read_csv(io::BufReader::new(file), ticks_per_beat)
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv.serialize(row)?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.write_csv(io::BufWriter::new(file))
    }
}

/// What to do with a note-off whose pitch is not sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedNoteOff {
    /// Log a warning and emit nothing
    #[default]
    Ignore,
    Error,
}

/// What to do with a note-on for a pitch that is already sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retrigger {
    /// The newer start replaces the pending one; the earlier onset is lost
    #[default]
    Restart,
    /// Emit the sounding note ending here, then start a new one
    CloseAndRestart,
    Error,
}

/// What to do with notes still sounding when their track ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnclosedNote {
    #[default]
    Drop,
    /// Release at the track's last tick
    CloseAtTrackEnd,
    Error,
}

/// Pairing policies for irregular note streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub unmatched_note_off: UnmatchedNoteOff,
    pub retrigger: Retrigger,
    pub unclosed: UnclosedNote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoteState {
    Idle,
    Sounding { start_tick: u64 },
}

/// Per-track pairing state, indexed by pitch.
struct TrackPairing<'a> {
    label: String,
    options: &'a ExtractOptions,
    states: [NoteState; 128],
}

impl<'a> TrackPairing<'a> {
    fn new(label: String, options: &'a ExtractOptions) -> Self {
        Self {
            label,
            options,
            states: [NoteState::Idle; 128],
        }
    }

    fn row(&self, start_tick: u64, end_tick: u64, pitch: u8) -> NoteRow {
        NoteRow::new(self.label.clone(), start_tick, end_tick - start_tick, pitch)
    }

    fn note_on(&mut self, pitch: u8, tick: u64, out: &mut Vec<NoteRow>) -> Result<()> {
        let slot = pitch as usize;
        if let NoteState::Sounding { start_tick } = self.states[slot] {
            match self.options.retrigger {
                Retrigger::Restart => {
                    debug!(track = %self.label, pitch, start_tick, tick, "retrigger replaces pending start");
                }
                Retrigger::CloseAndRestart => out.push(self.row(start_tick, tick, pitch)),
                Retrigger::Error => {
                    return Err(Error::Retrigger {
                        track: self.label.clone(),
                        pitch,
                        tick,
                        start_tick,
                    })
                }
            }
        }
        self.states[slot] = NoteState::Sounding { start_tick: tick };
        Ok(())
    }

    fn note_off(&mut self, pitch: u8, tick: u64, out: &mut Vec<NoteRow>) -> Result<()> {
        let slot = pitch as usize;
        match self.states[slot] {
            NoteState::Sounding { start_tick } => {
                out.push(self.row(start_tick, tick, pitch));
                self.states[slot] = NoteState::Idle;
                Ok(())
            }
            NoteState::Idle => match self.options.unmatched_note_off {
                UnmatchedNoteOff::Ignore => {
                    warn!(track = %self.label, pitch, tick, "ignoring note-off with no matching note-on");
                    Ok(())
                }
                UnmatchedNoteOff::Error => Err(Error::UnmatchedNoteOff {
                    track: self.label.clone(),
                    pitch,
                    tick,
                }),
            },
        }
    }

    /// Apply the unclosed-note policy once the track is exhausted.
    fn finish(self, last_tick: u64, out: &mut Vec<NoteRow>) -> Result<()> {
        for (pitch, state) in self.states.iter().enumerate() {
            let NoteState::Sounding { start_tick } = *state else {
                continue;
            };
            let pitch = pitch as u8;
            match self.options.unclosed {
                UnclosedNote::Drop => {
                    warn!(track = %self.label, pitch, start_tick, "dropping note that is never released");
                }
                UnclosedNote::CloseAtTrackEnd => out.push(self.row(start_tick, last_tick, pitch)),
                UnclosedNote::Error => {
                    return Err(Error::UnclosedNote {
                        track: self.label.clone(),
                        pitch,
                        start_tick,
                    })
                }
            }
        }
        Ok(())
    }
}

fn ticks_per_beat(smf: &Smf) -> u16 {
    match smf.header.timing {
        Timing::Metrical(ticks) => ticks.as_int(),
        Timing::Timecode(_, _) => FALLBACK_TICKS_PER_BEAT,
    }
}

/// Extract notes from a parsed file.
///
/// Tracks are labelled `Track1`, `Track2`, ... in file order, counting
/// tracks without notes too. Rows appear in the order notes are released.
pub fn extract_notes(smf: &Smf, options: &ExtractOptions) -> Result<NoteTable> {
    let ticks_per_beat = ticks_per_beat(smf);
    debug!(ticks_per_beat, tracks = smf.tracks.len(), "extracting notes");

    let mut rows = Vec::new();

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut pairing = TrackPairing::new(format!("Track{}", track_index + 1), options);
        let mut current_tick: u64 = 0;

        for event in track {
            current_tick += event.delta.as_int() as u64;

            if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                debug!(
                    track = track_index,
                    tick = current_tick,
                    bpm = tempo_to_bpm(tempo.as_int()),
                    "tempo change"
                );
            }

            if let TrackEventKind::Midi { message, .. } = event.kind {
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        pairing.note_on(key.as_int(), current_tick, &mut rows)?;
                    }
                    // vel=0 NoteOn is NoteOff
                    MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                        pairing.note_off(key.as_int(), current_tick, &mut rows)?;
                    }
                    _ => {}
                }
            }
        }

        pairing.finish(current_tick, &mut rows)?;
    }

    Ok(NoteTable {
        ticks_per_beat,
        rows,
    })
}

/// Parse MIDI bytes and extract notes.
pub fn extract_bytes(midi_bytes: &[u8], options: &ExtractOptions) -> Result<NoteTable> {
    let smf = Smf::parse(midi_bytes).map_err(|e| Error::MidiParse(e.to_string()))?;
    extract_notes(&smf, options)
}

/// Read a MIDI file from disk and extract notes.
pub fn read_note_table(path: impl AsRef<Path>, options: &ExtractOptions) -> Result<NoteTable> {
    let bytes = std::fs::read(path.as_ref())?;
    extract_bytes(&bytes, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Format-1 file with an empty conductor track and one note track
    /// built from `(delta, status, key, velocity)` tuples.
    fn midi_with_events(events: &[(u8, u8, u8, u8)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&2u16.to_be_bytes());
        buf.extend_from_slice(&96u16.to_be_bytes());

        let track0 = [0x00, 0xFF, 0x2F, 0x00];
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track0.len() as u32).to_be_bytes());
        buf.extend_from_slice(&track0);

        let mut track1 = Vec::new();
        for &(delta, status, key, vel) in events {
            track1.extend_from_slice(&[delta, status, key, vel]);
        }
        track1.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track1.len() as u32).to_be_bytes());
        buf.extend_from_slice(&track1);

        buf
    }

    fn triples(table: &NoteTable) -> Vec<(u64, u64, u8)> {
        table.rows.iter().map(|r| (r.time, r.duration, r.note)).collect()
    }

    #[test]
    fn pairs_sequential_notes() {
        let midi = midi_with_events(&[
            (0, 0x90, 60, 100),
            (96, 0x80, 60, 0),
            (0, 0x90, 64, 100),
            (48, 0x80, 64, 0),
        ]);
        let table = extract_bytes(&midi, &ExtractOptions::default()).unwrap();

        assert_eq!(table.ticks_per_beat, 96);
        assert_eq!(triples(&table), vec![(0, 96, 60), (96, 48, 64)]);
        assert!(table.rows.iter().all(|r| r.track == "Track2"));
    }

    #[test]
    fn zero_velocity_note_on_releases() {
        let midi = midi_with_events(&[(10, 0x90, 67, 90), (20, 0x90, 67, 0)]);
        let table = extract_bytes(&midi, &ExtractOptions::default()).unwrap();
        assert_eq!(triples(&table), vec![(10, 20, 67)]);
    }

    #[test]
    fn chord_notes_pair_by_pitch() {
        // C and E start together, E is released first
        let midi = midi_with_events(&[
            (0, 0x90, 60, 100),
            (0, 0x90, 64, 100),
            (40, 0x80, 64, 0),
            (56, 0x80, 60, 0),
        ]);
        let table = extract_bytes(&midi, &ExtractOptions::default()).unwrap();
        assert_eq!(triples(&table), vec![(0, 40, 64), (0, 96, 60)]);
    }

    #[test]
    fn unmatched_note_off_ignored_by_default() {
        let midi = midi_with_events(&[(5, 0x80, 62, 0), (0, 0x90, 60, 100), (10, 0x80, 60, 0)]);
        let table = extract_bytes(&midi, &ExtractOptions::default()).unwrap();
        assert_eq!(triples(&table), vec![(5, 10, 60)]);
    }

    #[test]
    fn unmatched_note_off_can_fail() {
        let midi = midi_with_events(&[(5, 0x80, 62, 0)]);
        let options = ExtractOptions {
            unmatched_note_off: UnmatchedNoteOff::Error,
            ..Default::default()
        };
        let err = extract_bytes(&midi, &options).unwrap_err();
        assert!(matches!(
            err,
            Error::UnmatchedNoteOff { pitch: 62, tick: 5, ref track } if track == "Track2"
        ));
    }

    #[test]
    fn retrigger_policies() {
        let midi = midi_with_events(&[
            (0, 0x90, 60, 100),
            (30, 0x90, 60, 100),
            (20, 0x80, 60, 0),
        ]);

        let restart = extract_bytes(&midi, &ExtractOptions::default()).unwrap();
        assert_eq!(triples(&restart), vec![(30, 20, 60)]);

        let close = extract_bytes(
            &midi,
            &ExtractOptions {
                retrigger: Retrigger::CloseAndRestart,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(triples(&close), vec![(0, 30, 60), (30, 20, 60)]);

        let strict = extract_bytes(
            &midi,
            &ExtractOptions {
                retrigger: Retrigger::Error,
                ..Default::default()
            },
        );
        assert!(matches!(
            strict,
            Err(Error::Retrigger {
                pitch: 60,
                tick: 30,
                start_tick: 0,
                ..
            })
        ));
    }

    #[test]
    fn unclosed_note_policies() {
        let midi = midi_with_events(&[
            (0, 0x90, 60, 100),
            (10, 0x90, 72, 100),
            (10, 0x80, 60, 0),
            // controller change moves the track end further out
            (40, 0xB0, 7, 100),
        ]);

        let dropped = extract_bytes(&midi, &ExtractOptions::default()).unwrap();
        assert_eq!(triples(&dropped), vec![(0, 20, 60)]);

        let closed = extract_bytes(
            &midi,
            &ExtractOptions {
                unclosed: UnclosedNote::CloseAtTrackEnd,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(triples(&closed), vec![(0, 20, 60), (10, 50, 72)]);

        let strict = extract_bytes(
            &midi,
            &ExtractOptions {
                unclosed: UnclosedNote::Error,
                ..Default::default()
            },
        );
        assert!(matches!(
            strict,
            Err(Error::UnclosedNote {
                pitch: 72,
                start_tick: 10,
                ..
            })
        ));
    }

    #[test]
    fn state_resets_between_tracks() {
        // Track 1 leaves pitch 60 hanging; track 2's release must not pair with it.
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&2u16.to_be_bytes());
        buf.extend_from_slice(&96u16.to_be_bytes());
        for track in [
            vec![0x00, 0x90, 60, 100, 0x00, 0xFF, 0x2F, 0x00],
            vec![0x10, 0x80, 60, 0, 0x00, 0xFF, 0x2F, 0x00],
        ] {
            buf.extend_from_slice(b"MTrk");
            buf.extend_from_slice(&(track.len() as u32).to_be_bytes());
            buf.extend_from_slice(&track);
        }

        let table = extract_bytes(&buf, &ExtractOptions::default()).unwrap();
        assert!(table.rows.is_empty());
    }

    #[test]
    fn note_table_csv_round_trip() {
        let table = NoteTable {
            ticks_per_beat: 960,
            rows: vec![
                NoteRow::new("Track2", 0, 480, 60),
                NoteRow::new("Track3", 960, 240, 72),
            ],
        };

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "track,time,duration,note\nTrack2,0,480,60\nTrack3,960,240,72\n"
        );

        let back = NoteTable::read_csv(text.as_bytes(), 960).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn malformed_csv_is_an_error() {
        let csv = "track,time,duration,note\nTrack1,-5,10,60\n";
        assert!(matches!(
            NoteTable::read_csv(csv.as_bytes(), 480),
            Err(Error::Csv(_))
        ));
    }
}
