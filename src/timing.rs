//! Optimal recognition point and per-word display duration.
//!
//! All lengths are counted in extended grapheme clusters so that combining
//! marks and astral-plane characters never split a visible glyph.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Characters that earn the punctuation pause when they end a word.
const PAUSE_CHARS: [char; 8] = ['.', ',', ';', ':', '!', '?', '\u{2014}', '\u{2013}'];

/// Number of user-perceived characters in `word`.
pub fn grapheme_len(word: &str) -> usize {
    word.graphemes(true).count()
}

/// Grapheme index where the reader's eye should land.
///
/// | length | index |
/// |--------|-------|
/// | 0..=2  | 0     |
/// | 3..=6  | 1     |
/// | 7..=9  | 2     |
/// | 10+    | 3     |
pub fn orp_index(word: &str) -> usize {
    match grapheme_len(word) {
        0..=2 => 0,
        3..=6 => 1,
        7..=9 => 2,
        _ => 3,
    }
}

/// Split a word into the text before the ORP, the ORP grapheme itself and
/// the text after it.
///
/// ```
/// use wordstream::timing::split_at_orp;
///
/// assert_eq!(split_at_orp("reading"), ("re", "a", "ding"));
/// ```
pub fn split_at_orp(word: &str) -> (&str, &str, &str) {
    let orp = orp_index(word);
    let mut bounds = word.grapheme_indices(true).skip(orp);
    match bounds.next() {
        Some((start, g)) => {
            let end = start + g.len();
            (&word[..start], &word[start..end], &word[end..])
        }
        None => (word, "", ""),
    }
}

fn ends_with_pause(word: &str) -> bool {
    word.chars().last().is_some_and(|c| PAUSE_CHARS.contains(&c))
}

/// Capitalised but not shouted: "London", "O'Brien", "(Alice".
fn looks_like_name(word: &str) -> bool {
    let letters: Vec<char> = word
        .chars()
        .skip_while(|c| !c.is_alphabetic())
        .filter(|c| c.is_alphabetic())
        .collect();
    if letters.len() < 2 || !letters[0].is_uppercase() {
        return false;
    }
    !letters.iter().all(|c| c.is_uppercase())
}

fn has_digit(word: &str) -> bool {
    word.chars().any(|c| c.is_ascii_digit())
}

/// Display duration in milliseconds.
///
/// The base interval `60000 / wpm` is scaled by each multiplier whose
/// condition holds; the conditions are independent and compose by
/// multiplication.
pub fn word_duration(
    word: &str,
    wpm: f64,
    punctuation_multiplier: f64,
    long_word_multiplier: f64,
    long_word_threshold: usize,
    name_multiplier: f64,
    number_multiplier: f64,
) -> u64 {
    let mut ms = 60_000.0 / wpm.max(1.0);

    if ends_with_pause(word) {
        ms *= punctuation_multiplier;
    }
    if grapheme_len(word) >= long_word_threshold {
        ms *= long_word_multiplier;
    }
    if looks_like_name(word) {
        ms *= name_multiplier;
    }
    if has_digit(word) {
        ms *= number_multiplier;
    }

    ms.round().max(0.0) as u64
}

/// Reading speed and pause multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub wpm: f64,
    pub punctuation_multiplier: f64,
    pub long_word_multiplier: f64,
    pub long_word_threshold: usize,
    pub name_multiplier: f64,
    pub number_multiplier: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            wpm: 300.0,
            punctuation_multiplier: 1.5,
            long_word_multiplier: 1.2,
            long_word_threshold: 10,
            name_multiplier: 1.3,
            number_multiplier: 1.3,
        }
    }
}

impl TimingConfig {
    pub fn with_wpm(mut self, wpm: f64) -> Self {
        self.wpm = wpm;
        self
    }

    pub fn with_punctuation_multiplier(mut self, m: f64) -> Self {
        self.punctuation_multiplier = m;
        self
    }

    pub fn with_long_word(mut self, multiplier: f64, threshold: usize) -> Self {
        self.long_word_multiplier = multiplier;
        self.long_word_threshold = threshold;
        self
    }

    pub fn with_name_multiplier(mut self, m: f64) -> Self {
        self.name_multiplier = m;
        self
    }

    pub fn with_number_multiplier(mut self, m: f64) -> Self {
        self.number_multiplier = m;
        self
    }

    /// [`word_duration`] with this configuration.
    pub fn duration(&self, word: &str) -> u64 {
        word_duration(
            word,
            self.wpm,
            self.punctuation_multiplier,
            self.long_word_multiplier,
            self.long_word_threshold,
            self.name_multiplier,
            self.number_multiplier,
        )
    }
}
