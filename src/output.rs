use crate::error::{Result, TimelineError};
use crate::track::{ChordEvent, TimelineOptions};

/// Renders timelines into the line format `(<pitch>/<pitch>...):<duration>`.
pub struct OutputFormatter {
    decimals: usize,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self::new(&TimelineOptions::default())
    }
}

impl OutputFormatter {
    pub fn new(options: &TimelineOptions) -> Self {
        Self {
            decimals: options.decimals as usize,
        }
    }

    /// Render a whole timeline, one newline-terminated line per event
    pub fn build_output(&self, events: &[ChordEvent]) -> String {
        let mut output = String::new();
        for event in events {
            output.push_str(&self.format_event(event));
            output.push('\n');
        }
        output
    }

    pub fn format_event(&self, event: &ChordEvent) -> String {
        format!(
            "{}:{}",
            format_pitches(&event.pitches),
            self.format_duration(event.duration)
        )
    }

    /// Fixed precision with trailing zeros and a dangling point removed,
    /// so `1.500000` becomes `1.5` and `1.000000` becomes `1`.
    pub fn format_duration(&self, duration: f64) -> String {
        let fixed = format!("{:.*}", self.decimals, duration);
        if !fixed.contains('.') {
            return fixed;
        }
        fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// `()` for a silence, otherwise the pitches joined by `/` in parentheses.
pub fn format_pitches(pitches: &[String]) -> String {
    format!("({})", pitches.join("/"))
}

/// Parse one rendered line back into its pitches and duration.
pub fn parse_line(line: &str) -> Result<(Vec<String>, f64)> {
    let line = line.trim_end_matches(['\r', '\n']);

    let (pitch_field, duration_field) = line
        .rsplit_once(':')
        .ok_or_else(|| TimelineError::malformed_line(line))?;

    let inner = pitch_field
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| TimelineError::malformed_line(line))?;

    let pitches = if inner.is_empty() {
        Vec::new()
    } else {
        inner.split('/').map(str::to_string).collect()
    };

    let duration = duration_field
        .parse::<f64>()
        .map_err(|_| TimelineError::malformed_line(line))?;

    Ok((pitches, duration))
}
