//! MIDI to chord timeline converter library
//!
//! Turns every instrument of a MIDI file into a line-oriented timeline where
//! simultaneous notes become chords and gaps become explicit silences:
//!
//! ```text
//! ():1
//! (C4/E4/G4):0.5
//! (D4):0.25
//! ```

pub mod error;
pub mod export;
pub mod midi;
pub mod note;
pub mod output;
pub mod track;

// Re-export main types for convenience
pub use error::{Result, TimelineError};
pub use export::{convert_file, ExportReport, TrackExporter};
pub use midi::{MidiData, NoteEvent, TrackNotes};
pub use output::OutputFormatter;
pub use track::{ChordEvent, TimelineBuilder, TimelineOptions};
