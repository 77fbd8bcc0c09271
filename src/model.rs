//! The canonical word-stream model every adapter produces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource::{DisplayHandle, Resource, ResourceStore};

/// One display unit of the stream. Its identity is its position in
/// [`Document::words`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub paragraph_index: usize,
    pub page_index: usize,
    pub italic: bool,
    pub bold: bool,
}

impl Word {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            paragraph_index: 0,
            page_index: 0,
            italic: false,
            bold: false,
        }
    }
}

/// Words plus paragraph and page boundary tables.
///
/// Both tables are strictly increasing and start at 0 whenever there is at
/// least one word.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub words: Vec<Word>,
    pub paragraph_starts: Vec<usize>,
    pub page_starts: Vec<usize>,
}

/// Index of the boundary-table entry whose range contains `index`.
pub(crate) fn locate(starts: &[usize], index: usize) -> usize {
    starts.partition_point(|&s| s <= index).saturating_sub(1)
}

/// Whether a boundary table is non-empty, starts at 0, strictly increases
/// and stays within `len`.
pub(crate) fn is_valid_boundaries(starts: &[usize], len: usize) -> bool {
    starts.first() == Some(&0)
        && starts.windows(2).all(|w| w[0] < w[1])
        && starts.last().is_some_and(|&s| s < len)
}

impl Document {
    pub fn total_words(&self) -> usize {
        self.words.len()
    }

    pub fn total_paragraphs(&self) -> usize {
        self.paragraph_starts.len()
    }

    pub fn total_pages(&self) -> usize {
        self.page_starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Paragraph containing word `index`.
    pub fn paragraph_of(&self, index: usize) -> usize {
        locate(&self.paragraph_starts, index)
    }

    /// Page containing word `index`.
    pub fn page_of(&self, index: usize) -> usize {
        locate(&self.page_starts, index)
    }

    /// Inclusive word range of `page`, or `None` past the last page.
    pub fn page_range(&self, page: usize) -> Option<(usize, usize)> {
        let start = *self.page_starts.get(page)?;
        let end = self
            .page_starts
            .get(page + 1)
            .map(|&next| next - 1)
            .unwrap_or(self.words.len().saturating_sub(1));
        Some((start, end))
    }

    /// Word texts in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(|w| w.text.as_str())
    }

    /// Rewrite every word's paragraph and page index from the tables.
    pub fn assign_indices(&mut self) {
        let mut paragraph = 0;
        let mut page = 0;
        for (i, word) in self.words.iter_mut().enumerate() {
            while self
                .paragraph_starts
                .get(paragraph + 1)
                .is_some_and(|&s| s <= i)
            {
                paragraph += 1;
            }
            while self.page_starts.get(page + 1).is_some_and(|&s| s <= i) {
                page += 1;
            }
            word.paragraph_index = paragraph;
            word.page_index = page;
        }
    }

    /// Boundary tables are well-formed and agree with the per-word indices.
    pub fn is_consistent(&self) -> bool {
        if self.words.is_empty() {
            return self.paragraph_starts.is_empty() && self.page_starts.is_empty();
        }
        is_valid_boundaries(&self.paragraph_starts, self.words.len())
            && is_valid_boundaries(&self.page_starts, self.words.len())
            && self.words.iter().enumerate().all(|(i, w)| {
                w.paragraph_index == self.paragraph_of(i) && w.page_index == self.page_of(i)
            })
    }
}

/// A navigable chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub title: String,
    /// Spine href, section id or other source identifier.
    pub href: String,
    pub word_start: usize,
    /// Inclusive.
    pub word_end: usize,
    /// Image-only or empty chapter sharing the word at `word_start` with its
    /// neighbour. Placeholders are not in `chapter_starts`.
    pub placeholder: bool,
}

/// Annotated preview markup for one structural unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSection {
    pub ordinal: usize,
    pub title: String,
    pub markup: String,
    /// Inclusive range of words this section displays.
    pub word_range: (usize, usize),
    /// Original resource reference to display handle.
    pub resources: BTreeMap<String, DisplayHandle>,
}

impl PreviewSection {
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.word_range.0 <= end && start <= self.word_range.1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
}

/// The result of parsing one file.
#[derive(Debug, Serialize)]
pub struct ParsedBook {
    /// Adapter name ("epub", "mobi", "text", ...).
    pub format: String,
    pub metadata: Metadata,
    pub document: Document,
    pub chapters: Vec<ChapterInfo>,
    pub chapter_starts: Vec<usize>,
    pub sections: Vec<PreviewSection>,
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub resources: ResourceStore,
}

impl ParsedBook {
    /// Non-placeholder chapter containing word `index`.
    pub fn chapter_at(&self, index: usize) -> Option<&ChapterInfo> {
        if self.chapter_starts.is_empty() {
            return None;
        }
        let start = self.chapter_starts[locate(&self.chapter_starts, index)];
        self.chapters
            .iter()
            .find(|c| !c.placeholder && c.word_start == start)
    }

    /// Sections that display any word of `page`.
    pub fn sections_for_page(&self, page: usize) -> Vec<&PreviewSection> {
        match self.document.page_range(page) {
            Some((start, end)) => self
                .sections
                .iter()
                .filter(|s| s.overlaps(start, end))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn resource(&self, handle: DisplayHandle) -> Option<&Resource> {
        self.resources.get(handle)
    }

    /// Release every display handle. Call before discarding the book.
    pub fn release_resources(&mut self) -> usize {
        let released = self.resources.release_all();
        if released > 0 {
            log::debug!("released {released} display handle(s)");
        }
        released
    }

    /// Recompute chapter ends from the starts so that chapters tile the
    /// word sequence without gaps or overlaps.
    pub(crate) fn refresh_chapter_ends(&mut self) {
        let total = self.document.words.len();
        let last = total.saturating_sub(1);

        // A real chapter whose start collided with a later one has lost its
        // words and is demoted.
        let mut i = 0;
        while i < self.chapters.len() {
            if !self.chapters[i].placeholder {
                let start = self.chapters[i].word_start;
                let collides = self.chapters[i + 1..]
                    .iter()
                    .find(|c| !c.placeholder)
                    .is_some_and(|next| next.word_start <= start);
                if collides {
                    self.chapters[i].placeholder = true;
                }
            }
            i += 1;
        }

        for i in 0..self.chapters.len() {
            let start = self.chapters[i].word_start.min(last);
            self.chapters[i].word_start = start;
            if self.chapters[i].placeholder {
                self.chapters[i].word_end = start;
                continue;
            }
            let next = self.chapters[i + 1..]
                .iter()
                .find(|c| !c.placeholder)
                .map(|c| c.word_start);
            self.chapters[i].word_end = match next {
                Some(next) if next > start => next - 1,
                _ => last,
            };
        }

        self.chapter_starts = self
            .chapters
            .iter()
            .filter(|c| !c.placeholder)
            .map(|c| c.word_start)
            .collect();
    }
}

/// Persistence key for reading progress: file name plus byte size.
pub fn file_key(name: &str, size: u64) -> String {
    format!("{name}_{size}")
}
