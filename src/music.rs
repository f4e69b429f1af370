//! Music Primitives
//!
//! Note numbering, note-to-frequency conversion, scale materialization, and
//! the clock constants shared by the whole system.

use alloc::vec::Vec;
use libm::Libm;

/// Clock pulses per quarter note. Fixed across the system.
pub const CLOCK_PPQ: u32 = 24;

/// Clock pulses per sequencer step (a step is a 16th note).
pub const CLOCK_PPS: u32 = CLOCK_PPQ / 4;

/// The one sample rate the engine runs at, in Hz.
pub const SAMPLE_RATE: f64 = 44_100.0;

/// A note on the MIDI scale.
///
/// Note numbers are non-negative and below 128; anything else is a protocol
/// violation on the part of whoever produced the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    number: u32,
}

impl Note {
    pub fn new(number: u32) -> Self {
        assert!(number < 128, "note number {} outside MIDI range", number);
        Self { number }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Fundamental frequency in Hz, equal temperament, A4 = 440 Hz.
    pub fn freq(&self, cents: f64) -> f64 {
        note_freq(self.number, cents)
    }
}

/// MIDI note number to frequency with an optional cent offset.
///
/// `440 * 2^((n - 69) / 12 + cents / 1200)`
pub fn note_freq(number: u32, cents: f64) -> f64 {
    let exponent = (number as f64 - 69.0) / 12.0 + cents / 1200.0;
    440.0 * Libm::<f64>::pow(2.0, exponent)
}

/// Semitone interval table for a named scale.
///
/// The table walks one octave of scale degrees starting from the root; the
/// octave note itself is implied. Unknown names are a protocol error.
pub fn scale_intervals(name: &str) -> &'static [u32] {
    match name {
        "major" => &[2, 2, 1, 2, 2, 2],
        "natural minor" => &[2, 1, 2, 2, 1, 2],
        "harmonic minor" => &[2, 1, 2, 2, 1, 3],
        "major pentatonic" => &[2, 2, 3, 2],
        "minor pentatonic" => &[3, 2, 2, 3],
        "blues" => &[3, 2, 1, 1, 3],
        "chromatic" => &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
        _ => panic!("unknown scale name: {}", name),
    }
}

/// Materialize a playable scale from a root note.
///
/// Applies the named interval table starting at `root`, repeats it across
/// `num_octaves`, and closes with the root shifted up by `num_octaves`
/// octaves (so a one-octave major scale has eight notes, root to root).
pub fn gen_scale(root: u32, name: &str, num_octaves: u32) -> Vec<Note> {
    let intervals = scale_intervals(name);
    let mut notes = Vec::with_capacity(num_octaves as usize * (intervals.len() + 1) + 1);

    for octave in 0..num_octaves {
        let mut number = root + octave * 12;
        notes.push(Note::new(number));
        for &interval in intervals {
            number += interval;
            notes.push(Note::new(number));
        }
    }

    notes.push(Note::new(root + num_octaves * 12));
    notes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_freq_reference_points() {
        // A4 is the tuning reference.
        assert!((note_freq(69, 0.0) - 440.0).abs() < 1e-9);

        // Middle C.
        assert!((note_freq(60, 0.0) - 261.6255653).abs() < 1e-4);

        // One octave doubles.
        assert!((note_freq(81, 0.0) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn test_note_freq_cents() {
        // +1200 cents is exactly one octave.
        assert!((note_freq(69, 1200.0) - 880.0).abs() < 1e-9);

        // +50 cents lands between two semitones.
        let half_sharp = note_freq(69, 50.0);
        assert!(half_sharp > 440.0 && half_sharp < note_freq(70, 0.0));
    }

    #[test]
    fn test_c_major_scale() {
        let scale = gen_scale(60, "major", 1);
        let numbers: Vec<u32> = scale.iter().map(|n| n.number()).collect();
        assert_eq!(numbers, [60, 62, 64, 65, 67, 69, 71, 72]);
    }

    #[test]
    fn test_chromatic_scale_is_dense() {
        let scale = gen_scale(48, "chromatic", 1);
        let numbers: Vec<u32> = scale.iter().map(|n| n.number()).collect();
        let expected: Vec<u32> = (48..=60).collect();
        assert_eq!(numbers, expected);
    }

    #[test]
    fn test_two_octave_scale_ends_on_shifted_root() {
        let scale = gen_scale(36, "minor pentatonic", 2);
        assert_eq!(scale.first().unwrap().number(), 36);
        assert_eq!(scale.last().unwrap().number(), 60);
        // 5 degrees per octave, times two, plus the closing root.
        assert_eq!(scale.len(), 11);
    }

    #[test]
    #[should_panic(expected = "unknown scale name")]
    fn test_unknown_scale_panics() {
        scale_intervals("phrygian dominant");
    }

    #[test]
    #[should_panic(expected = "outside MIDI range")]
    fn test_note_out_of_range_panics() {
        Note::new(128);
    }
}
