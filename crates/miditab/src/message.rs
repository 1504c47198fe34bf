//! Owned, typed view of a single MIDI track event.
//!
//! Each message kind has a fixed field set. The `type_name` strings and
//! column names follow the lower-snake naming common to MIDI tooling
//! (`note_on`, `set_tempo`, `clocks_per_click`, ...), so decoded tables
//! line up with existing MIDI-as-CSV datasets.

use crate::table::Value;
use midly::{MetaMessage, MidiMessage, SmpteTime, TrackEventKind};
use serde::{Deserialize, Serialize};

/// A MIDI message detached from its delta-time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMessage {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    #[serde(rename = "polytouch")]
    PolyTouch { channel: u8, note: u8, value: u8 },
    ControlChange { channel: u8, control: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    Aftertouch { channel: u8, value: u8 },
    /// Signed bend, -8192..=8191
    #[serde(rename = "pitchwheel")]
    PitchWheel { channel: u8, pitch: i16 },
    Sysex { data: Vec<u8> },
    Escape { data: Vec<u8> },

    SequenceNumber { number: u16 },
    Text { text: String },
    Copyright { text: String },
    TrackName { name: String },
    InstrumentName { name: String },
    Lyrics { text: String },
    Marker { text: String },
    CueMarker { text: String },
    ProgramName { name: String },
    DeviceName { name: String },
    ChannelPrefix { channel: u8 },
    MidiPort { port: u8 },
    EndOfTrack,
    SetTempo { tempo: u32 },
    SmpteOffset {
        frame_rate: f64,
        hours: u8,
        minutes: u8,
        seconds: u8,
        frames: u8,
        sub_frames: u8,
    },
    TimeSignature {
        numerator: u8,
        denominator: u32,
        clocks_per_click: u8,
        notated_32nd_notes_per_beat: u8,
    },
    KeySignature { key: String },
    SequencerSpecific { data: Vec<u8> },
    UnknownMeta { type_byte: u8, data: Vec<u8> },
}

impl EventMessage {
    pub fn from_kind(kind: &TrackEventKind<'_>) -> Self {
        match *kind {
            TrackEventKind::Midi { channel, message } => {
                Self::from_channel_message(channel.as_int(), message)
            }
            TrackEventKind::SysEx(data) => EventMessage::Sysex {
                data: data.to_vec(),
            },
            TrackEventKind::Escape(data) => EventMessage::Escape {
                data: data.to_vec(),
            },
            TrackEventKind::Meta(meta) => Self::from_meta(meta),
        }
    }

    fn from_channel_message(channel: u8, message: MidiMessage) -> Self {
        match message {
            MidiMessage::NoteOff { key, vel } => EventMessage::NoteOff {
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            },
            MidiMessage::NoteOn { key, vel } => EventMessage::NoteOn {
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            },
            MidiMessage::Aftertouch { key, vel } => EventMessage::PolyTouch {
                channel,
                note: key.as_int(),
                value: vel.as_int(),
            },
            MidiMessage::Controller { controller, value } => EventMessage::ControlChange {
                channel,
                control: controller.as_int(),
                value: value.as_int(),
            },
            MidiMessage::ProgramChange { program } => EventMessage::ProgramChange {
                channel,
                program: program.as_int(),
            },
            MidiMessage::ChannelAftertouch { vel } => EventMessage::Aftertouch {
                channel,
                value: vel.as_int(),
            },
            MidiMessage::PitchBend { bend } => EventMessage::PitchWheel {
                channel,
                // raw 14-bit value is centered at 0x2000
                pitch: bend.0.as_int() as i16 - 0x2000,
            },
        }
    }

    fn from_meta(meta: MetaMessage<'_>) -> Self {
        match meta {
            MetaMessage::TrackNumber(number) => EventMessage::SequenceNumber {
                number: number.unwrap_or(0),
            },
            MetaMessage::Text(b) => EventMessage::Text { text: lossy(b) },
            MetaMessage::Copyright(b) => EventMessage::Copyright { text: lossy(b) },
            MetaMessage::TrackName(b) => EventMessage::TrackName { name: lossy(b) },
            MetaMessage::InstrumentName(b) => EventMessage::InstrumentName { name: lossy(b) },
            MetaMessage::Lyric(b) => EventMessage::Lyrics { text: lossy(b) },
            MetaMessage::Marker(b) => EventMessage::Marker { text: lossy(b) },
            MetaMessage::CuePoint(b) => EventMessage::CueMarker { text: lossy(b) },
            MetaMessage::ProgramName(b) => EventMessage::ProgramName { name: lossy(b) },
            MetaMessage::DeviceName(b) => EventMessage::DeviceName { name: lossy(b) },
            MetaMessage::MidiChannel(channel) => EventMessage::ChannelPrefix {
                channel: channel.as_int(),
            },
            MetaMessage::MidiPort(port) => EventMessage::MidiPort {
                port: port.as_int(),
            },
            MetaMessage::EndOfTrack => EventMessage::EndOfTrack,
            MetaMessage::Tempo(tempo) => EventMessage::SetTempo {
                tempo: tempo.as_int(),
            },
            MetaMessage::SmpteOffset(time) => smpte_offset(time),
            MetaMessage::TimeSignature(numerator, denom_pow, clocks, notated) => {
                EventMessage::TimeSignature {
                    numerator,
                    denominator: 1u32.checked_shl(denom_pow as u32).unwrap_or(0),
                    clocks_per_click: clocks,
                    notated_32nd_notes_per_beat: notated,
                }
            }
            MetaMessage::KeySignature(accidentals, minor) => EventMessage::KeySignature {
                key: key_name(accidentals, minor),
            },
            MetaMessage::SequencerSpecific(data) => EventMessage::SequencerSpecific {
                data: data.to_vec(),
            },
            MetaMessage::Unknown(type_byte, data) => EventMessage::UnknownMeta {
                type_byte,
                data: data.to_vec(),
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            EventMessage::NoteOff { .. } => "note_off",
            EventMessage::NoteOn { .. } => "note_on",
            EventMessage::PolyTouch { .. } => "polytouch",
            EventMessage::ControlChange { .. } => "control_change",
            EventMessage::ProgramChange { .. } => "program_change",
            EventMessage::Aftertouch { .. } => "aftertouch",
            EventMessage::PitchWheel { .. } => "pitchwheel",
            EventMessage::Sysex { .. } => "sysex",
            EventMessage::Escape { .. } => "escape",
            EventMessage::SequenceNumber { .. } => "sequence_number",
            EventMessage::Text { .. } => "text",
            EventMessage::Copyright { .. } => "copyright",
            EventMessage::TrackName { .. } => "track_name",
            EventMessage::InstrumentName { .. } => "instrument_name",
            EventMessage::Lyrics { .. } => "lyrics",
            EventMessage::Marker { .. } => "marker",
            EventMessage::CueMarker { .. } => "cue_marker",
            EventMessage::ProgramName { .. } => "program_name",
            EventMessage::DeviceName { .. } => "device_name",
            EventMessage::ChannelPrefix { .. } => "channel_prefix",
            EventMessage::MidiPort { .. } => "midi_port",
            EventMessage::EndOfTrack => "end_of_track",
            EventMessage::SetTempo { .. } => "set_tempo",
            EventMessage::SmpteOffset { .. } => "smpte_offset",
            EventMessage::TimeSignature { .. } => "time_signature",
            EventMessage::KeySignature { .. } => "key_signature",
            EventMessage::SequencerSpecific { .. } => "sequencer_specific",
            EventMessage::UnknownMeta { .. } => "unknown_meta",
        }
    }

    /// Meta messages carry file metadata rather than performance data.
    /// Sysex and escape blobs are not meta.
    pub fn is_meta(&self) -> bool {
        !matches!(
            self,
            EventMessage::NoteOff { .. }
                | EventMessage::NoteOn { .. }
                | EventMessage::PolyTouch { .. }
                | EventMessage::ControlChange { .. }
                | EventMessage::ProgramChange { .. }
                | EventMessage::Aftertouch { .. }
                | EventMessage::PitchWheel { .. }
                | EventMessage::Sysex { .. }
                | EventMessage::Escape { .. }
        )
    }

    /// Structural fields as table columns.
    ///
    /// Descriptive text (`name`, `text`) duplicates nothing a dataset needs
    /// and is left out.
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        match self {
            EventMessage::NoteOff {
                channel,
                note,
                velocity,
            }
            | EventMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![
                ("channel", (*channel).into()),
                ("note", (*note).into()),
                ("velocity", (*velocity).into()),
            ],
            EventMessage::PolyTouch {
                channel,
                note,
                value,
            } => vec![
                ("channel", (*channel).into()),
                ("note", (*note).into()),
                ("value", (*value).into()),
            ],
            EventMessage::ControlChange {
                channel,
                control,
                value,
            } => vec![
                ("channel", (*channel).into()),
                ("control", (*control).into()),
                ("value", (*value).into()),
            ],
            EventMessage::ProgramChange { channel, program } => vec![
                ("channel", (*channel).into()),
                ("program", (*program).into()),
            ],
            EventMessage::Aftertouch { channel, value } => vec![
                ("channel", (*channel).into()),
                ("value", (*value).into()),
            ],
            EventMessage::PitchWheel { channel, pitch } => vec![
                ("channel", (*channel).into()),
                ("pitch", (*pitch).into()),
            ],
            EventMessage::Sysex { data }
            | EventMessage::Escape { data }
            | EventMessage::SequencerSpecific { data } => vec![("data", hex(data).into())],
            EventMessage::SequenceNumber { number } => vec![("number", (*number).into())],
            EventMessage::Text { .. }
            | EventMessage::Copyright { .. }
            | EventMessage::TrackName { .. }
            | EventMessage::InstrumentName { .. }
            | EventMessage::Lyrics { .. }
            | EventMessage::Marker { .. }
            | EventMessage::CueMarker { .. }
            | EventMessage::ProgramName { .. }
            | EventMessage::DeviceName { .. }
            | EventMessage::EndOfTrack => Vec::new(),
            EventMessage::ChannelPrefix { channel } => vec![("channel", (*channel).into())],
            EventMessage::MidiPort { port } => vec![("port", (*port).into())],
            EventMessage::SetTempo { tempo } => vec![("tempo", (*tempo).into())],
            EventMessage::SmpteOffset {
                frame_rate,
                hours,
                minutes,
                seconds,
                frames,
                sub_frames,
            } => vec![
                ("frame_rate", (*frame_rate).into()),
                ("hours", (*hours).into()),
                ("minutes", (*minutes).into()),
                ("seconds", (*seconds).into()),
                ("frames", (*frames).into()),
                ("sub_frames", (*sub_frames).into()),
            ],
            EventMessage::TimeSignature {
                numerator,
                denominator,
                clocks_per_click,
                notated_32nd_notes_per_beat,
            } => vec![
                ("numerator", (*numerator).into()),
                ("denominator", (*denominator).into()),
                ("clocks_per_click", (*clocks_per_click).into()),
                (
                    "notated_32nd_notes_per_beat",
                    (*notated_32nd_notes_per_beat).into(),
                ),
            ],
            EventMessage::KeySignature { key } => vec![("key", key.as_str().into())],
            EventMessage::UnknownMeta { type_byte, data } => vec![
                ("type_byte", (*type_byte).into()),
                ("data", hex(data).into()),
            ],
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn smpte_offset(time: SmpteTime) -> EventMessage {
    let frame_rate = match time.fps() {
        midly::Fps::Fps24 => 24.0,
        midly::Fps::Fps25 => 25.0,
        midly::Fps::Fps29 => 29.97,
        midly::Fps::Fps30 => 30.0,
    };
    EventMessage::SmpteOffset {
        frame_rate,
        hours: time.hour(),
        minutes: time.minute(),
        seconds: time.second(),
        frames: time.frame(),
        sub_frames: time.subframe(),
    }
}

const MAJOR_KEYS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];
const MINOR_KEYS: [&str; 15] = [
    "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#",
];

/// Key name from the signed sharp/flat count, e.g. `(-3, true)` → `"Cm"`.
fn key_name(accidentals: i8, minor: bool) -> String {
    let idx = (accidentals.clamp(-7, 7) + 7) as usize;
    if minor {
        format!("{}m", MINOR_KEYS[idx])
    } else {
        MAJOR_KEYS[idx].to_string()
    }
}
