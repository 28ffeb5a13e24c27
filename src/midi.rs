use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, TimelineError};
use crate::note::pitch_name;

/// Default tempo: 120 BPM = 500000 microseconds per beat
const DEFAULT_TEMPO: u32 = 500_000;

/// A single sounding note, in seconds from the start of the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: String,
    pub start: f64,
    pub end: f64,
}

impl NoteEvent {
    pub fn new(pitch: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            pitch: pitch.into(),
            start,
            end,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// The notes played by one instrument: a (MIDI track, channel, program) triple.
///
/// Instruments only come into being when one of their notes is released, so
/// every loaded `TrackNotes` holds at least one note.
#[derive(Debug, Clone, Default)]
pub struct TrackNotes {
    /// Index of the MIDI track the notes came from
    pub track: usize,
    pub channel: u8,
    /// Program in effect on the channel when the notes were released (0 until changed)
    pub program: u8,
    pub name: Option<String>,
    /// Notes in the order they were released
    pub notes: Vec<NoteEvent>,
}

impl TrackNotes {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

pub struct MidiData {
    tracks: Vec<TrackNotes>,
}

impl MidiData {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TimelineError::NotFound(path.to_path_buf()));
        }

        let data = std::fs::read(path).map_err(|e| TimelineError::read(path, e))?;
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let smf = Smf::parse(data)?;
        let clock = TickClock::new(&smf);

        let mut tracks = Vec::new();
        for (track_idx, track) in smf.tracks.iter().enumerate() {
            collect_track_notes(track_idx, track, &clock, &mut tracks);
        }

        debug!(
            midi_tracks = smf.tracks.len(),
            instruments = tracks.len(),
            "loaded MIDI file"
        );

        Ok(MidiData { tracks })
    }

    /// Instruments in the order their first note was released.
    pub fn tracks(&self) -> &[TrackNotes] {
        &self.tracks
    }
}

/// Walks one MIDI track, pairing note-ons with note-offs and filing each
/// finished note under the instrument for its channel and current program.
fn collect_track_notes(
    track_idx: usize,
    track: &[midly::TrackEvent],
    clock: &TickClock,
    tracks: &mut Vec<TrackNotes>,
) {
    let first_instrument = tracks.len();
    let mut instruments: HashMap<(u8, u8), usize> = HashMap::new();
    let mut programs = [0u8; 16];
    let mut open: HashMap<(u8, u8), Vec<u64>> = HashMap::new();
    let mut track_name: Option<String> = None;
    let mut tick: u64 = 0;

    for event in track {
        tick += event.delta.as_int() as u64;

        match event.kind {
            TrackEventKind::Midi { channel, message } => {
                let ch = channel.as_int();

                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        open.entry((ch, key.as_int())).or_default().push(tick);
                    }
                    // NoteOn with velocity 0 is a NoteOff
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        let Some(pending) = open.get_mut(&(ch, key.as_int())) else {
                            continue;
                        };
                        let closed = close_notes(pending, tick);
                        if closed.is_empty() {
                            continue;
                        }

                        let program = programs[ch as usize];
                        let instrument =
                            instrument_index(&mut instruments, tracks, track_idx, ch, program);
                        for start_tick in closed {
                            tracks[instrument].notes.push(NoteEvent::new(
                                pitch_name(key.as_int()),
                                clock.seconds(start_tick),
                                clock.seconds(tick),
                            ));
                        }
                    }
                    MidiMessage::ProgramChange { program: prog } => {
                        programs[ch as usize] = prog.as_int();
                    }
                    _ => {}
                }
            }
            TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                if let Ok(name_str) = std::str::from_utf8(name) {
                    let cleaned = name_str.trim_end_matches('\0').trim();
                    if !cleaned.is_empty() {
                        track_name = Some(cleaned.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    let dangling: usize = open.values().map(Vec::len).sum();
    if dangling > 0 {
        debug!(track = track_idx, dangling, "dropping notes without a note-off");
    }

    for info in &mut tracks[first_instrument..] {
        info.name = track_name.clone();
    }
}

fn instrument_index(
    instruments: &mut HashMap<(u8, u8), usize>,
    tracks: &mut Vec<TrackNotes>,
    track_idx: usize,
    channel: u8,
    program: u8,
) -> usize {
    *instruments.entry((channel, program)).or_insert_with(|| {
        tracks.push(TrackNotes {
            track: track_idx,
            channel,
            program,
            ..Default::default()
        });
        tracks.len() - 1
    })
}

/// Releases the open notes (by start tick) ended by a note-off at `tick`.
///
/// Every note started strictly before `tick` is closed and returned. If all
/// pending notes started on this very tick they are discarded, so no
/// zero-length note is produced.
fn close_notes(pending: &mut Vec<u64>, tick: u64) -> Vec<u64> {
    let (closed, remaining): (Vec<u64>, Vec<u64>) =
        std::mem::take(pending).into_iter().partition(|&start| start < tick);
    if !closed.is_empty() {
        *pending = remaining;
    }
    closed
}

/// Converts absolute ticks to seconds.
enum TickClock {
    /// Metrical timing with the tempo map of the first track
    Metrical {
        ticks_per_beat: f64,
        segments: Vec<TempoSegment>,
    },
    /// SMPTE timing: a fixed number of seconds per tick
    Timecode { seconds_per_tick: f64 },
}

#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    seconds: f64,
    tempo: u32,
}

impl TickClock {
    fn new(smf: &Smf) -> Self {
        match smf.header.timing {
            Timing::Metrical(tpb) => {
                let ticks_per_beat = tpb.as_int().max(1) as f64;
                let segments = build_tempo_map(&extract_tempo_changes(smf), ticks_per_beat);
                TickClock::Metrical {
                    ticks_per_beat,
                    segments,
                }
            }
            Timing::Timecode(fps, subframe) => {
                let ticks_per_second = fps.as_f32() as f64 * subframe.max(1) as f64;
                TickClock::Timecode {
                    seconds_per_tick: 1.0 / ticks_per_second,
                }
            }
        }
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self {
            TickClock::Metrical {
                ticks_per_beat,
                segments,
            } => {
                let idx = segments.partition_point(|s| s.tick <= tick).saturating_sub(1);
                let segment = segments[idx];
                segment.seconds
                    + tick_to_second(tick - segment.tick, *ticks_per_beat, segment.tempo)
            }
            TickClock::Timecode { seconds_per_tick } => tick as f64 * seconds_per_tick,
        }
    }
}

/// Collects (tick, tempo) pairs from the first track, which carries the
/// tempo map in format 0 and format 1 files.
fn extract_tempo_changes(smf: &Smf) -> Vec<(u64, u32)> {
    let mut changes = Vec::new();
    let Some(track) = smf.tracks.first() else {
        return changes;
    };

    let mut tick: u64 = 0;
    for event in track {
        tick += event.delta.as_int() as u64;
        if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
            changes.push((tick, tempo.as_int()));
        }
    }
    changes
}

fn build_tempo_map(changes: &[(u64, u32)], ticks_per_beat: f64) -> Vec<TempoSegment> {
    let mut segments = vec![TempoSegment {
        tick: 0,
        seconds: 0.0,
        tempo: DEFAULT_TEMPO,
    }];

    for &(tick, tempo) in changes {
        let Some(last) = segments.last_mut() else {
            continue;
        };
        if last.tick == tick {
            last.tempo = tempo;
            continue;
        }
        let seconds = last.seconds + tick_to_second(tick - last.tick, ticks_per_beat, last.tempo);
        segments.push(TempoSegment {
            tick,
            seconds,
            tempo,
        });
    }

    segments
}

fn tick_to_second(ticks: u64, ticks_per_beat: f64, tempo: u32) -> f64 {
    let seconds_per_tick = (tempo as f64 / 1_000_000.0) / ticks_per_beat;
    ticks as f64 * seconds_per_tick
}
