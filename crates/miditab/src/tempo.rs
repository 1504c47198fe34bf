use crate::{Error, Result};

const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

/// Largest value the 24-bit `set_tempo` field can hold.
pub const MAX_TEMPO: u32 = 0x00FF_FFFF;

/// Convert beats per minute to MIDI tempo (microseconds per quarter note).
///
/// `round(60_000_000 / bpm)`. Zero, negative and non-finite BPM are
/// rejected, as is any BPM slow enough to overflow the 24-bit field.
pub fn bpm_to_tempo(bpm: f64) -> Result<u32> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(Error::InvalidBpm { bpm });
    }

    let tempo = (MICROSECONDS_PER_MINUTE / bpm).round();
    if tempo > MAX_TEMPO as f64 {
        return Err(Error::TempoOutOfRange { bpm });
    }

    Ok(tempo as u32)
}

/// Convert MIDI tempo back to beats per minute.
pub fn tempo_to_bpm(tempo: u32) -> f64 {
    if tempo == 0 {
        return 0.0;
    }
    MICROSECONDS_PER_MINUTE / tempo as f64
}
