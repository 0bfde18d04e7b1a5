// MIDI output from unfolded activity matrices.
//
// Converts a full 128-column activity matrix (rows = time steps) into a
// Standard MIDI File for playback and evaluation. Every active cell is a
// drum hit: NoteOn at its step, NoteOff one step later, all on MIDI
// channel 10 (index 9, the percussion channel). The matrix value becomes
// the hit velocity, clamped into MIDI range.
//
// The quantization grid is a parameter: `steps_per_quarter` says how many
// matrix rows fit in one quarter note. It belongs to this writer, not to
// the sequence engine, and must divide the 480-tick quarter evenly.
//
// Uses the `midly` crate for MIDI writing. Output is SMF Format 0
// (single track).

use loopforge_seq::codec::FULL_PITCH_RANGE;
use midly::{
    Format, Header, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// Default playback tempo. Drum loops in the corpus were exported at
/// 120 BPM; the artifact is for listening, not for round-tripping.
const TEMPO_BPM: u32 = 120;

/// Convert an unfolded activity matrix to MIDI and write it to a file.
pub fn write_midi(
    matrix: &[[f32; FULL_PITCH_RANGE]],
    steps_per_quarter: u32,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let smf = matrix_to_smf(matrix, steps_per_quarter)?;
    let mut buf = Vec::new();
    smf.write(&mut buf)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

/// Convert an activity matrix to an in-memory SMF.
pub fn matrix_to_smf(
    matrix: &[[f32; FULL_PITCH_RANGE]],
    steps_per_quarter: u32,
) -> Result<Smf<'static>, Box<dyn std::error::Error>> {
    // The grid must divide the tick resolution evenly, or steps would
    // accumulate rounding drift over the file.
    if steps_per_quarter == 0 || TICKS_PER_QUARTER as u32 % steps_per_quarter != 0 {
        return Err(format!("invalid quantization grid: {steps_per_quarter} steps per quarter").into());
    }
    let ticks_per_step = TICKS_PER_QUARTER as u32 / steps_per_quarter;
    // The percussion channel (channel 10, zero-indexed 9).
    let drum_channel = u4::new(9);

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let mut track: Track<'static> = Vec::new();
    let tempo_microseconds = 60_000_000 / TEMPO_BPM;
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::TrackName(b"Loopforge Drums")),
    });

    let mut last_event_tick: u32 = 0;
    // Hits from the previous step that still need their NoteOff.
    let mut sounding: Vec<u8> = Vec::new();

    for (step, row) in matrix.iter().enumerate() {
        let step_tick = step as u32 * ticks_per_step;

        // Close the previous step's hits before starting new ones at the
        // same tick.
        for pitch in sounding.drain(..) {
            let delta = step_tick - last_event_tick;
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi {
                    channel: drum_channel,
                    message: MidiMessage::NoteOff {
                        key: u7::new(pitch),
                        vel: u7::new(0),
                    },
                },
            });
            last_event_tick = step_tick;
        }

        for (pitch, &value) in row.iter().enumerate() {
            if value <= 0.0 {
                continue;
            }
            let velocity = (value.round() as i32).clamp(1, 127) as u8;
            let delta = step_tick - last_event_tick;
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi {
                    channel: drum_channel,
                    message: MidiMessage::NoteOn {
                        key: u7::new(pitch as u8),
                        vel: u7::new(velocity),
                    },
                },
            });
            last_event_tick = step_tick;
            sounding.push(pitch as u8);
        }
    }

    // Close hits from the final step.
    let end_tick = matrix.len() as u32 * ticks_per_step;
    for pitch in sounding.drain(..) {
        let delta = end_tick - last_event_tick;
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: drum_channel,
                message: MidiMessage::NoteOff {
                    key: u7::new(pitch),
                    vel: u7::new(0),
                },
            },
        });
        last_event_tick = end_tick;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    Ok(smf)
}
