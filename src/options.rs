//! Parse configuration.

use serde::{Deserialize, Serialize};

/// Knobs for adapters and the reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// A page closes after the first paragraph that brings it to this many
    /// words.
    pub target_words_per_page: usize,
    /// Pages shorter than this are merged by reconciliation.
    pub min_page_words: usize,
    /// A chapter starts a new page only if the current page already holds
    /// more words than this.
    pub min_chapter_break_words: usize,
    /// Keep embedded images as resources.
    pub include_images: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            target_words_per_page: 250,
            min_page_words: 20,
            min_chapter_break_words: 10,
            include_images: true,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_words_per_page(mut self, words: usize) -> Self {
        self.target_words_per_page = words.max(1);
        self
    }

    pub fn with_min_page_words(mut self, words: usize) -> Self {
        self.min_page_words = words;
        self
    }

    pub fn with_min_chapter_break_words(mut self, words: usize) -> Self {
        self.min_chapter_break_words = words;
        self
    }

    pub fn with_images(mut self, include: bool) -> Self {
        self.include_images = include;
        self
    }
}
