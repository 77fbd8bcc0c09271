//! Post-adapter normalisation: global punctuation re-merge, index remapping
//! and tiny-page merging.
//!
//! Adapters merge orphaned punctuation only inside a structural unit, so a
//! closing quote that opens the next spine item survives as its own word.
//! This pass fixes that across the whole document and rewrites every index
//! that refers to the word array: the boundary tables, chapter ranges, and
//! the `data-word-index` attributes in preview markup.

use crate::markup::{coalesce_word_spans, remap_word_indices};
use crate::model::{Document, ParsedBook, Word};
use crate::options::ParseOptions;
use crate::segment::{MergeMap, merge_with_map};

/// Normalise a freshly built book. Running it twice gives the same result
/// as running it once.
pub fn reconcile(mut book: ParsedBook, options: &ParseOptions) -> ParsedBook {
    remerge_punctuation(&mut book);

    let before = book.document.total_pages();
    merge_tiny_pages(&mut book.document, options.min_page_words);
    let after = book.document.total_pages();
    if before != after {
        log::debug!("merged short pages: {before} -> {after}");
    }

    book.document.assign_indices();
    book.refresh_chapter_ends();

    debug_assert!(book.document.is_consistent());
    book
}

/// Re-run punctuation merging over the whole word array and remap every
/// index reference.
fn remerge_punctuation(book: &mut ParsedBook) {
    let texts: Vec<&str> = book.document.texts().collect();
    let (merged, map) = merge_with_map(&texts);
    if map.is_identity() {
        return;
    }
    log::debug!(
        "punctuation re-merge: {} -> {} words",
        map.old_len(),
        map.new_len()
    );

    let old_words = std::mem::take(&mut book.document.words);
    book.document.words = merged
        .into_iter()
        .enumerate()
        .map(|(new, text)| {
            let anchor = &old_words[map.anchor(new)];
            Word {
                text,
                paragraph_index: 0,
                page_index: 0,
                italic: anchor.italic,
                bold: anchor.bold,
            }
        })
        .collect();

    let doc = &mut book.document;
    doc.paragraph_starts = map.boundaries(&doc.paragraph_starts);
    doc.page_starts = map.boundaries(&doc.page_starts);

    remap_chapters(book, &map);

    for section in &mut book.sections {
        let markup = remap_word_indices(&section.markup, |i| map.index(i));
        section.markup = coalesce_word_spans(&markup);
        section.word_range = remap_range(section.word_range, &map);
    }
}

fn remap_chapters(book: &mut ParsedBook, map: &MergeMap) {
    let last = map.new_len().saturating_sub(1);
    for chapter in &mut book.chapters {
        if chapter.placeholder {
            chapter.word_start = map.index(chapter.word_start);
            continue;
        }
        let start = map.boundary(chapter.word_start);
        if start >= map.new_len() {
            // Every word of the chapter was glued onto its predecessor.
            chapter.placeholder = true;
            chapter.word_start = last;
        } else {
            chapter.word_start = start;
        }
    }
}

/// `[map(start), latest valid map(end..=start)]`.
fn remap_range((start, end): (usize, usize), map: &MergeMap) -> (usize, usize) {
    let new_start = map.index(start);
    let new_end = (start..=end)
        .rev()
        .find(|&i| i < map.old_len())
        .map(|i| map.index(i))
        .unwrap_or(new_start);
    (new_start, new_end.max(new_start))
}

/// Fold pages with fewer than `min_words` words into their neighbours.
///
/// Short pages merge forward into the next page; a short final page merges
/// back into the page before it.
pub fn merge_tiny_pages(doc: &mut Document, min_words: usize) {
    let total = doc.words.len();
    if total == 0 || min_words == 0 {
        return;
    }

    let mut merged: Vec<usize> = Vec::with_capacity(doc.page_starts.len());
    let mut open: Option<usize> = None;
    let mut count = 0;

    for (k, &start) in doc.page_starts.iter().enumerate() {
        let end = doc.page_starts.get(k + 1).copied().unwrap_or(total);
        let page_start = *open.get_or_insert(start);
        count += end - start;
        if count >= min_words {
            merged.push(page_start);
            open = None;
            count = 0;
        }
    }

    if let Some(start) = open
        && merged.is_empty()
    {
        merged.push(start);
    }

    doc.page_starts = merged;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChapterInfo, Metadata, PreviewSection};
    use crate::resource::ResourceStore;
    use std::collections::BTreeMap;

    fn doc_with_pages(n: usize, pages: &[usize]) -> Document {
        let mut d = Document {
            words: (0..n).map(|i| Word::new(format!("w{i}"))).collect(),
            paragraph_starts: vec![0],
            page_starts: pages.to_vec(),
        };
        d.assign_indices();
        d
    }

    #[test]
    fn test_tiny_pages_merge_forward() {
        let mut d = doc_with_pages(60, &[0, 5, 10, 40]);
        merge_tiny_pages(&mut d, 20);
        // 5 + 5 + 30 closes at the third page; the last 20 stands alone.
        assert_eq!(d.page_starts, vec![0, 40]);
    }

    #[test]
    fn test_trailing_short_page_merges_back() {
        let mut d = doc_with_pages(45, &[0, 30, 40]);
        merge_tiny_pages(&mut d, 20);
        assert_eq!(d.page_starts, vec![0]);

        let mut d = doc_with_pages(45, &[0, 25, 40]);
        merge_tiny_pages(&mut d, 20);
        assert_eq!(d.page_starts, vec![0, 25]);
    }

    #[test]
    fn test_short_document_keeps_one_page() {
        let mut d = doc_with_pages(3, &[0, 1, 2]);
        merge_tiny_pages(&mut d, 20);
        assert_eq!(d.page_starts, vec![0]);
    }

    fn book(words: &[&str], paragraphs: &[usize], sections: Vec<PreviewSection>) -> ParsedBook {
        let mut document = Document {
            words: words.iter().map(|w| Word::new(*w)).collect(),
            paragraph_starts: paragraphs.to_vec(),
            page_starts: vec![0],
        };
        document.assign_indices();
        ParsedBook {
            format: "test".into(),
            metadata: Metadata::default(),
            document,
            chapters: Vec::new(),
            chapter_starts: Vec::new(),
            sections,
            warnings: Vec::new(),
            resources: ResourceStore::new(),
        }
    }

    fn section(ordinal: usize, markup: &str, range: (usize, usize)) -> PreviewSection {
        PreviewSection {
            ordinal,
            title: String::new(),
            markup: markup.into(),
            word_range: range,
            resources: BTreeMap::new(),
        }
    }

    #[test]
    fn test_cross_unit_remerge() {
        let sections = vec![
            section(0, r#"<p><span data-word-index="0">He</span> <span data-word-index="1">said</span></p>"#, (0, 1)),
            section(1, r#"<p><span data-word-index="2">,</span> <span data-word-index="3">then</span> <img data-word-index="3" data-src="x"/></p>"#, (2, 3)),
        ];
        let mut b = book(&["He", "said", ",", "then"], &[0, 2], sections);
        b.chapters = vec![
            ChapterInfo {
                title: "one".into(),
                href: "a".into(),
                word_start: 0,
                word_end: 1,
                placeholder: false,
            },
            ChapterInfo {
                title: "two".into(),
                href: "b".into(),
                word_start: 2,
                word_end: 3,
                placeholder: false,
            },
        ];

        let b = reconcile(b, &ParseOptions::default());
        let texts: Vec<_> = b.document.texts().collect();
        assert_eq!(texts, vec!["He", "said,", "then"]);
        assert_eq!(b.document.paragraph_starts, vec![0, 2]);
        assert_eq!(b.chapter_starts, vec![0, 2]);
        assert_eq!(b.chapters[0].word_end, 1);
        assert_eq!(b.sections[1].word_range, (1, 2));
        assert_eq!(
            b.sections[1].markup,
            r#"<p><span data-word-index="1">,</span> <span data-word-index="2">then</span> <img data-word-index="2" data-src="x"/></p>"#
        );
        assert!(b.document.is_consistent());
    }

    #[test]
    fn test_remerge_coalesces_within_section() {
        let sections = vec![section(
            0,
            r#"<p><span data-word-index="0">word</span></p><p><span data-word-index="1">)</span> <span data-word-index="2">next</span></p>"#,
            (0, 2),
        )];
        let b = reconcile(book(&["word", ")", "next"], &[0, 1], sections), &ParseOptions::default());
        assert_eq!(b.document.texts().collect::<Vec<_>>(), vec!["word)", "next"]);
        assert_eq!(b.sections[0].word_range, (0, 1));
        assert_eq!(b.document.paragraph_starts, vec![0, 1]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let sections = vec![section(
            0,
            r#"<p><span data-word-index="0">(</span></p><p><span data-word-index="1">a</span> <span data-word-index="2">.</span></p>"#,
            (0, 2),
        )];
        let options = ParseOptions::default();
        let once = reconcile(book(&["(", "a", "."], &[0, 1], sections), &options);
        let texts: Vec<String> = once.document.texts().map(String::from).collect();
        let markup = once.sections[0].markup.clone();
        let paragraphs = once.document.paragraph_starts.clone();

        let twice = reconcile(once, &options);
        assert_eq!(twice.document.texts().collect::<Vec<_>>(), texts);
        assert_eq!(twice.sections[0].markup, markup);
        assert_eq!(twice.document.paragraph_starts, paragraphs);
        assert_eq!(texts, vec!["(a."]);
        assert_eq!(paragraphs, vec![0]);
    }
}
