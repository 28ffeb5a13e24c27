const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Scientific pitch name for a MIDI key, sharps only: 60 is "C4", 0 is "C-1".
pub fn pitch_name(key: u8) -> String {
    let pitch_class = PITCH_CLASSES[usize::from(key % 12)];
    let octave = i32::from(key / 12) - 1;
    format!("{pitch_class}{octave}")
}
