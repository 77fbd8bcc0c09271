//! Incremental assembly of a [`ParsedBook`] from rendered units.

use std::collections::BTreeMap;

use crate::content::{ContentUnit, render_unit};
use crate::model::{ChapterInfo, Document, Metadata, ParsedBook, PreviewSection, Word};
use crate::options::ParseOptions;
use crate::resource::{DisplayHandle, ResourceStore};

/// Collects units in reading order, assigning paragraph starts and
/// provisional page starts as it goes.
pub struct DocumentBuilder {
    options: ParseOptions,
    words: Vec<Word>,
    paragraph_starts: Vec<usize>,
    page_starts: Vec<usize>,
    /// Words on the page currently being filled.
    page_words: usize,
    /// The next paragraph opens a new page.
    pending_break: bool,
    chapters: Vec<ChapterInfo>,
    sections: Vec<PreviewSection>,
    warnings: Vec<String>,
    resources: ResourceStore,
}

impl DocumentBuilder {
    pub fn new(options: &ParseOptions) -> Self {
        Self {
            options: options.clone(),
            words: Vec::new(),
            paragraph_starts: Vec::new(),
            page_starts: Vec::new(),
            page_words: 0,
            pending_break: true,
            chapters: Vec::new(),
            sections: Vec::new(),
            warnings: Vec::new(),
            resources: ResourceStore::new(),
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Record a non-fatal problem.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    /// Record a unit that could not be decoded and was skipped.
    pub fn unit_failed(&mut self, title: &str, error: impl std::fmt::Display) {
        self.warn(format!("Skipped \"{title}\": {error}"));
    }

    pub fn resources_mut(&mut self) -> &mut ResourceStore {
        &mut self.resources
    }

    /// Append a structural unit. Chapter units also get a [`ChapterInfo`]
    /// and may start a new page. Returns the section ordinal.
    pub fn add_unit(
        &mut self,
        unit: &ContentUnit,
        is_chapter: bool,
        resources: BTreeMap<String, DisplayHandle>,
    ) -> usize {
        let base = self.words.len();
        if is_chapter && self.page_words > self.options.min_chapter_break_words {
            self.pending_break = true;
        }

        let rendered = render_unit(unit, base);
        let local_len = rendered.words.len();

        for (k, &start) in rendered.paragraph_starts.iter().enumerate() {
            let end = rendered
                .paragraph_starts
                .get(k + 1)
                .copied()
                .unwrap_or(local_len);
            if self.pending_break {
                self.page_starts.push(base + start);
                self.page_words = 0;
                self.pending_break = false;
            }
            self.paragraph_starts.push(base + start);
            self.page_words += end - start;
            if self.page_words >= self.options.target_words_per_page {
                self.pending_break = true;
            }
        }
        self.words.extend(rendered.words);

        let title = unit
            .title
            .clone()
            .or_else(|| unit.first_heading())
            .unwrap_or_else(|| href_stem(&unit.href));
        let anchor = base.saturating_sub(1);

        if is_chapter {
            let placeholder = local_len == 0;
            let word_start = if placeholder { anchor } else { base };
            self.chapters.push(ChapterInfo {
                title: title.clone(),
                href: unit.href.clone(),
                word_start,
                word_end: word_start,
                placeholder,
            });
        }

        let ordinal = self.sections.len();
        if !rendered.markup.is_empty() {
            self.sections.push(PreviewSection {
                ordinal,
                title,
                markup: rendered.markup,
                word_range: rendered.index_range.unwrap_or((anchor, anchor)),
                resources,
            });
        }
        ordinal
    }

    /// Freeze the builder into a book. Page indices are provisional until
    /// [`reconcile`](crate::reconcile::reconcile) runs.
    pub fn finish(self, format: &str, metadata: Metadata) -> ParsedBook {
        let mut document = Document {
            words: self.words,
            paragraph_starts: self.paragraph_starts,
            page_starts: self.page_starts,
        };
        document.assign_indices();

        let mut book = ParsedBook {
            format: format.to_string(),
            metadata,
            document,
            chapters: self.chapters,
            chapter_starts: Vec::new(),
            sections: self.sections,
            warnings: self.warnings,
            resources: self.resources,
        };
        book.refresh_chapter_ends();
        book
    }
}

/// File name without directories or extension: `"Text/ch01.xhtml"` →
/// `"ch01"`.
pub(crate) fn href_stem(href: &str) -> String {
    let name = href.rsplit('/').next().unwrap_or(href);
    let name = name.split('#').next().unwrap_or(name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}
