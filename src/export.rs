//! Per-track output: runs each instrument through the timeline pipeline and
//! writes one text file per non-empty track.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::error::{Result, TimelineError};
use crate::midi::{MidiData, TrackNotes};
use crate::output::OutputFormatter;
use crate::track::{TimelineBuilder, TimelineOptions};

/// A rendered timeline for one track, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTrack {
    /// 1-based position of the track in source order
    pub index: usize,
    pub name: Option<String>,
    pub events: usize,
    pub silences: usize,
    pub text: String,
}

/// What happened to each non-empty track during an export.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<(usize, PathBuf)>,
    pub failed: Vec<(usize, TimelineError)>,
    pub skipped: Vec<usize>,
}

impl ExportReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct TrackExporter {
    builder: TimelineBuilder,
    formatter: OutputFormatter,
}

impl Default for TrackExporter {
    fn default() -> Self {
        Self::new(TimelineOptions::default())
    }
}

impl TrackExporter {
    pub fn new(options: TimelineOptions) -> Self {
        Self {
            builder: TimelineBuilder::new(options),
            formatter: OutputFormatter::new(&options),
        }
    }

    /// Build and serialize one track. Returns `None` for tracks without notes.
    pub fn render_track(&self, index: usize, track: &TrackNotes) -> Option<RenderedTrack> {
        if track.is_empty() {
            debug!(track = index, "skipping track without notes");
            return None;
        }

        let events = self.builder.build(&track.notes);
        let silences = events.iter().filter(|e| e.is_silent()).count();
        debug!(
            track = index,
            notes = track.notes.len(),
            events = events.len(),
            silences,
            "built timeline"
        );

        Some(RenderedTrack {
            index,
            name: track.name.clone(),
            events: events.len(),
            silences,
            text: self.formatter.build_output(&events),
        })
    }

    /// Render every non-empty track in source order.
    pub fn render_all(&self, tracks: &[TrackNotes]) -> Vec<RenderedTrack> {
        tracks
            .iter()
            .enumerate()
            .filter_map(|(i, track)| self.render_track(i + 1, track))
            .collect()
    }

    /// Write `<base>_Track<N>.txt` for each non-empty track.
    ///
    /// A failed write is recorded and the remaining tracks are still written.
    pub fn export(&self, midi: &MidiData, base: &Path) -> ExportReport {
        let mut report = ExportReport::default();

        for (i, track) in midi.tracks().iter().enumerate() {
            let index = i + 1;
            let Some(rendered) = self.render_track(index, track) else {
                report.skipped.push(index);
                continue;
            };

            let path = track_file_name(base, index);
            match write_track(&path, &rendered.text) {
                Ok(()) => {
                    info!("Saved track {} to {}", index, path.display());
                    report.written.push((index, path));
                }
                Err(e) => {
                    error!(track = index, "{}", e);
                    report.failed.push((index, e));
                }
            }
        }

        report
    }
}

/// Load `input` and write one timeline file per non-empty track next to it.
///
/// Input errors abort before anything is written.
pub fn convert_file(input: &Path, options: TimelineOptions) -> Result<ExportReport> {
    let midi = MidiData::from_file(input)?;
    let base = base_name(input);
    Ok(TrackExporter::new(options).export(&midi, &base))
}

/// The input path with its extension removed.
pub fn base_name(input: &Path) -> PathBuf {
    input.with_extension("")
}

pub fn track_file_name(base: &Path, index: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!("_Track{}.txt", index));
    PathBuf::from(name)
}

fn write_track(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).map_err(|e| TimelineError::io(path, e))
}
