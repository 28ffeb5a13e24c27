use serde::{Deserialize, Serialize};

use crate::midi::NoteEvent;

/// Timing knobs shared by the grouping, silence and formatting stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineOptions {
    /// Decimal places start/end times are rounded to before grouping
    pub decimals: u32,
    /// Gaps at or below this many seconds are not turned into silences
    pub silence_tolerance: f64,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            decimals: 6,
            silence_tolerance: 1e-4,
        }
    }
}

/// One entry of a track timeline: a chord, a single note, or a silence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordEvent {
    pub start: f64,
    /// Pitch names in source order. Empty for a silence.
    pub pitches: Vec<String>,
    pub duration: f64,
}

impl ChordEvent {
    pub fn silence(start: f64, duration: f64) -> Self {
        Self {
            start,
            pitches: Vec::new(),
            duration,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

pub struct TimelineBuilder {
    options: TimelineOptions,
}

impl Default for TimelineBuilder {
    fn default() -> Self {
        Self::new(TimelineOptions::default())
    }
}

impl TimelineBuilder {
    pub fn new(options: TimelineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TimelineOptions {
        &self.options
    }

    /// Group a track's notes and fill the gaps between them with silences.
    pub fn build(&self, notes: &[NoteEvent]) -> Vec<ChordEvent> {
        self.insert_silences(&self.group_by_start(notes))
    }

    /// Merge notes sharing the same rounded start time into chords.
    ///
    /// The result is ordered by start time with one event per distinct start.
    /// Pitches inside a chord keep the order the notes were given in, and the
    /// chord's duration is the mean of its notes' durations.
    pub fn group_by_start(&self, notes: &[NoteEvent]) -> Vec<ChordEvent> {
        let mut rounded: Vec<(f64, f64, &str)> = notes
            .iter()
            .map(|note| {
                let start = self.round(note.start);
                let end = self.round(note.end);
                (start, self.round(end - start), note.pitch.as_str())
            })
            .collect();

        // sort_by is stable, so equal starts keep their source order
        rounded.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut chords: Vec<ChordEvent> = Vec::new();
        let mut durations: Vec<f64> = Vec::new();

        for (start, duration, pitch) in rounded {
            let same_start = chords.last().map_or(false, |chord| chord.start == start);
            if !same_start {
                if let Some(chord) = chords.last_mut() {
                    chord.duration = mean(&durations);
                }
                durations.clear();
                chords.push(ChordEvent {
                    start,
                    pitches: Vec::new(),
                    duration: 0.0,
                });
            }

            if let Some(chord) = chords.last_mut() {
                chord.pitches.push(pitch.to_string());
            }
            durations.push(duration);
        }

        if let Some(chord) = chords.last_mut() {
            chord.duration = mean(&durations);
        }

        chords
    }

    /// Insert silent events so the timeline runs from zero without gaps.
    ///
    /// Overlapping events pass through untouched; no trailing silence is added.
    pub fn insert_silences(&self, chords: &[ChordEvent]) -> Vec<ChordEvent> {
        let mut result = Vec::with_capacity(chords.len() * 2);
        let mut prev_end = 0.0;

        for chord in chords {
            let gap = chord.start - prev_end;
            if gap > self.options.silence_tolerance {
                result.push(ChordEvent::silence(prev_end, gap));
            }

            result.push(chord.clone());
            prev_end = chord.end();
        }

        result
    }

    fn round(&self, value: f64) -> f64 {
        round_to(value, self.options.decimals)
    }
}

/// Round to a fixed number of decimal places.
///
/// Rounds the exact binary value (ties to even), so a time stored as
/// `0.22727249999999998...` becomes `0.227272`. Scaling by `10^decimals`
/// first would round the inexact product instead and can land one unit off.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    format!("{:.*}", decimals as usize, value)
        .parse()
        .unwrap_or(value)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormatter;
    use proptest::prelude::*;

    fn note(pitch: &str, start: f64, end: f64) -> NoteEvent {
        NoteEvent::new(pitch, start, end)
    }

    fn pitches(events: &[ChordEvent]) -> Vec<Vec<String>> {
        events.iter().map(|e| e.pitches.clone()).collect()
    }

    #[test]
    fn test_simultaneous_notes_form_chord() {
        let builder = TimelineBuilder::default();
        let chords = builder.group_by_start(&[note("C4", 0.0, 0.5), note("E4", 0.0, 0.5)]);

        assert_eq!(chords.len(), 1);
        assert_eq!(chords[0].pitches, vec!["C4", "E4"]);
        assert_eq!(chords[0].duration, 0.5);
    }

    #[test]
    fn test_chord_keeps_source_order() {
        let builder = TimelineBuilder::default();
        let chords = builder.group_by_start(&[
            note("G4", 0.0, 1.0),
            note("C4", 0.0, 1.0),
            note("E4", 0.0, 1.0),
        ]);

        assert_eq!(chords[0].pitches, vec!["G4", "C4", "E4"]);
    }

    #[test]
    fn test_groups_sorted_by_start() {
        let builder = TimelineBuilder::default();
        let chords = builder.group_by_start(&[
            note("D4", 1.0, 1.5),
            note("C4", 0.0, 0.5),
            note("F4", 1.0, 2.0),
        ]);

        assert_eq!(pitches(&chords), vec![vec!["C4"], vec!["D4", "F4"]]);
        assert_eq!(chords[0].start, 0.0);
        assert_eq!(chords[1].start, 1.0);
        // Mean of 0.5 and 1.0
        assert_eq!(chords[1].duration, 0.75);
    }

    #[test]
    fn test_jitter_below_rounding_merges() {
        let builder = TimelineBuilder::default();
        let chords = builder.group_by_start(&[
            note("C4", 0.000_000_49, 0.5),
            note("E4", 0.0, 0.5),
        ]);

        assert_eq!(chords.len(), 1);
        assert_eq!(chords[0].start, 0.0);
        assert_eq!(chords[0].pitches, vec!["C4", "E4"]);
    }

    #[test]
    fn test_distinct_micro_starts_stay_apart() {
        let builder = TimelineBuilder::default();
        let chords = builder.group_by_start(&[note("C4", 0.0, 0.5), note("E4", 0.000_001, 0.5)]);

        assert_eq!(chords.len(), 2);
    }

    #[test]
    fn test_empty_track() {
        let builder = TimelineBuilder::default();
        assert!(builder.group_by_start(&[]).is_empty());
        assert!(builder.build(&[]).is_empty());
    }

    #[test]
    fn test_leading_silence() {
        let builder = TimelineBuilder::default();
        let events = builder.build(&[note("C4", 1.0, 1.5)]);

        assert_eq!(events.len(), 2);
        assert!(events[0].is_silent());
        assert_eq!(events[0].start, 0.0);
        assert_eq!(events[0].duration, 1.0);
        assert_eq!(events[1].pitches, vec!["C4"]);
        assert_eq!(events[1].duration, 0.5);
    }

    #[test]
    fn test_gap_within_tolerance_is_ignored() {
        let builder = TimelineBuilder::default();
        let events = builder.build(&[note("C4", 0.0, 0.5), note("D4", 0.500_05, 1.0)]);

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| !e.is_silent()));
    }

    #[test]
    fn test_gap_at_tolerance_boundary() {
        let options = TimelineOptions {
            silence_tolerance: 0.25,
            ..Default::default()
        };
        let builder = TimelineBuilder::new(options);

        // A gap of exactly the tolerance is not a silence
        let events = builder.build(&[note("C4", 0.0, 0.5), note("D4", 0.75, 1.0)]);
        assert_eq!(pitches(&events), vec![vec!["C4"], vec!["D4"]]);

        let events = builder.build(&[note("C4", 0.0, 0.5), note("D4", 0.875, 1.0)]);
        assert_eq!(pitches(&events), vec![vec!["C4"], vec![], vec!["D4"]]);
        assert_eq!(events[1].duration, 0.375);
    }

    #[test]
    fn test_gap_near_default_tolerance() {
        let builder = TimelineBuilder::default();

        // 0.5001 - 0.5 evaluates just below 1e-4
        let events = builder.build(&[note("C4", 0.0, 0.5), note("D4", 0.5001, 1.0)]);
        assert_eq!(pitches(&events), vec![vec!["C4"], vec!["D4"]]);

        let events = builder.build(&[note("C4", 0.0, 0.5), note("D4", 0.500_101, 1.0)]);
        assert_eq!(pitches(&events), vec![vec!["C4"], vec![], vec!["D4"]]);
        assert_eq!(OutputFormatter::default().format_duration(events[1].duration), "0.000101");
    }

    #[test]
    fn test_gap_between_notes() {
        let builder = TimelineBuilder::default();
        let events = builder.build(&[note("C4", 0.0, 0.5), note("D4", 1.0, 1.25)]);

        assert_eq!(pitches(&events), vec![vec!["C4"], vec![], vec!["D4"]]);
        assert_eq!(events[1].start, 0.5);
        assert_eq!(events[1].duration, 0.5);
    }

    #[test]
    fn test_overlap_passes_through() {
        let builder = TimelineBuilder::default();
        let events = builder.build(&[note("C4", 0.0, 1.0), note("E4", 0.5, 1.0)]);

        assert_eq!(pitches(&events), vec![vec!["C4"], vec!["E4"]]);
        assert_eq!(events[0].duration, 1.0);
        assert_eq!(events[1].duration, 0.5);
    }

    #[test]
    fn test_no_trailing_silence() {
        let builder = TimelineBuilder::default();
        let events = builder.build(&[note("C4", 0.0, 0.5), note("D4", 0.5, 3.0)]);

        assert!(!events.last().map(ChordEvent::is_silent).unwrap_or(true));
    }

    #[test]
    fn test_chord_events_serialize() {
        let builder = TimelineBuilder::default();
        let events = builder.build(&[note("C4", 0.5, 1.0)]);

        let json = serde_json::to_value(&events).unwrap();
        assert_eq!(json[0]["pitches"], serde_json::json!([]));
        assert_eq!(json[1]["pitches"], serde_json::json!(["C4"]));
        assert_eq!(json[1]["start"], serde_json::json!(0.5));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123_456_7, 6), 0.123_457);
        assert_eq!(round_to(0.000_000_49, 6), 0.0);
        assert_eq!(round_to(2.5, 0), 2.0);
    }

    #[test]
    fn test_round_to_uses_exact_value() {
        // 48 ticks at 96 ticks per beat and 454545 us per beat
        let start = 0.227_272_499_999_999_988_42;
        assert_eq!(round_to(start, 6), 0.227_272);

        let builder = TimelineBuilder::default();
        let chords = builder.group_by_start(&[note("C4", start, 0.5)]);
        assert_eq!(chords[0].start, 0.227_272);
        assert_eq!(chords[0].duration, 0.272_728);
    }

    fn arb_notes() -> impl Strategy<Value = Vec<NoteEvent>> {
        prop::collection::vec(
            (0u32..2_000, 1u32..2_000, 0u8..128),
            0..40,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .map(|(start_ms, len_ms, key)| {
                    let start = start_ms as f64 / 1000.0;
                    let end = start + len_ms as f64 / 1000.0;
                    NoteEvent::new(crate::note::pitch_name(key), start, end)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_grouping_is_idempotent(notes in arb_notes()) {
            let builder = TimelineBuilder::default();
            let chords = builder.group_by_start(&notes);

            // One representative note per chord, carrying the chord's start and duration
            let regrouped_input: Vec<NoteEvent> = chords
                .iter()
                .map(|c| NoteEvent::new(c.pitches[0].clone(), c.start, c.start + c.duration))
                .collect();
            let regrouped = builder.group_by_start(&regrouped_input);

            prop_assert_eq!(regrouped.len(), chords.len());
            for (a, b) in regrouped.iter().zip(&chords) {
                prop_assert_eq!(a.start, b.start);
                prop_assert!((a.duration - b.duration).abs() <= 2e-6);
            }
        }

        #[test]
        fn prop_starts_strictly_increase(notes in arb_notes()) {
            let builder = TimelineBuilder::default();
            let chords = builder.group_by_start(&notes);
            for pair in chords.windows(2) {
                prop_assert!(pair[0].start < pair[1].start);
            }
        }

        #[test]
        fn prop_timeline_is_contiguous(notes in arb_notes()) {
            let builder = TimelineBuilder::default();
            let tolerance = builder.options().silence_tolerance;
            let events = builder.build(&notes);

            if let Some(first) = events.first() {
                prop_assert!(first.start <= tolerance);
            }
            for pair in events.windows(2) {
                let gap = pair[1].start - pair[0].end();
                let overlap = pair[1].start < pair[0].end();
                prop_assert!(gap <= tolerance || overlap);
            }
        }

        #[test]
        fn prop_chord_order_is_stable(keys in prop::collection::vec(0u8..128, 1..8)) {
            let builder = TimelineBuilder::default();
            let notes: Vec<NoteEvent> = keys
                .iter()
                .map(|&k| NoteEvent::new(crate::note::pitch_name(k), 0.25, 0.75))
                .collect();
            let chords = builder.group_by_start(&notes);

            prop_assert_eq!(chords.len(), 1);
            let expected: Vec<String> = notes.iter().map(|n| n.pitch.clone()).collect();
            prop_assert_eq!(&chords[0].pitches, &expected);
        }
    }
}
