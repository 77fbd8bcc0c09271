//! Plain text and light-markup documents through the whole pipeline.

use std::io::Write;

use wordstream::{ErrorKind, ParseOptions, Pipeline, file_key};

fn paragraphs(n: usize) -> String {
    (0..n)
        .map(|i| format!("alpha beta gamma delta{i}."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[test]
fn test_dash_splitting_and_paragraphs() {
    let book = Pipeline::new()
        .parse("sample.txt", "Hello world.\n\nForty-nine-year-old man\u{2014}tired.".as_bytes())
        .unwrap();

    let texts: Vec<_> = book.document.texts().collect();
    assert_eq!(
        texts,
        vec![
            "Hello",
            "world.",
            "Forty-",
            "nine-",
            "year-",
            "old",
            "man\u{2014}",
            "tired."
        ]
    );
    assert_eq!(book.document.paragraph_starts, vec![0, 2]);
    assert_eq!(book.document.page_starts, vec![0]);
    assert!(book.document.words[2..].iter().all(|w| w.paragraph_index == 1));
}

#[test]
fn test_orphaned_punctuation_is_merged() {
    let book = Pipeline::new()
        .parse("quotes.txt", "He said \" hello \" and left .".as_bytes())
        .unwrap();
    let texts: Vec<_> = book.document.texts().collect();
    assert_eq!(texts, vec!["He", "said", "\"hello\"", "and", "left."]);
}

#[test]
fn test_pages_close_after_target() {
    let options = ParseOptions::new()
        .with_target_words_per_page(10)
        .with_min_page_words(3);
    let book = Pipeline::with_options(options)
        .parse("pages.txt", paragraphs(6).as_bytes())
        .unwrap();

    let doc = &book.document;
    assert_eq!(doc.total_words(), 24);
    assert_eq!(doc.page_starts, vec![0, 12]);
    assert_eq!(doc.page_of(11), 0);
    assert_eq!(doc.page_of(12), 1);
    assert_eq!(doc.page_range(1), Some((12, 23)));
    assert_eq!(doc.page_range(2), None);
    assert_eq!(doc.words[23].page_index, 1);
    assert_eq!(book.sections_for_page(1).len(), 1);
}

#[test]
fn test_short_pages_are_merged() {
    let options = ParseOptions::new()
        .with_target_words_per_page(4)
        .with_min_page_words(6);
    let book = Pipeline::with_options(options)
        .parse("tiny.txt", paragraphs(5).as_bytes())
        .unwrap();

    // 4-word pages pair up; the last one folds back into its predecessor.
    assert_eq!(book.document.page_starts, vec![0, 8]);
    assert_eq!(book.document.page_range(1), Some((8, 19)));
}

#[test]
fn test_chapter_headings_in_text() {
    let text = "Title page words.\n\nChapter 1\n\nIt begins.\n\nChapter 2\n\nIt ends.";
    let book = Pipeline::new().parse("novel.txt", text.as_bytes()).unwrap();

    let titles: Vec<_> = book.chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["novel", "Chapter 1", "Chapter 2"]);
    assert_eq!(book.chapter_starts, vec![0, 3, 7]);
    assert_eq!(book.chapter_at(4).unwrap().title, "Chapter 1");
    assert_eq!(book.chapters[2].word_end, book.document.total_words() - 1);
}

#[test]
fn test_markdown_document() {
    let md = "# Field Notes\n\nSome *quiet* words.\n\n## Later\n\n- one item\n- **two** items\n";
    let book = Pipeline::new().parse("notes.md", md.as_bytes()).unwrap();

    assert_eq!(book.format, "markdown");
    assert_eq!(book.metadata.title.as_deref(), Some("Field Notes"));
    let texts: Vec<_> = book.document.texts().collect();
    assert_eq!(
        texts,
        vec!["Field", "Notes", "Some", "quiet", "words.", "Later", "one", "item", "two", "items"]
    );
    assert!(book.document.words[3].italic);
    assert!(book.document.words[8].bold);
}

#[test]
fn test_html_sniffed_without_extension() {
    let html = b"<!DOCTYPE html><html><head><title>Page</title></head><body><p>Short page.</p></body></html>";
    let book = Pipeline::new().parse("index", html).unwrap();
    assert_eq!(book.format, "html");
    assert_eq!(book.metadata.title.as_deref(), Some("Page"));
}

#[test]
fn test_cp1252_text_is_decoded() {
    let book = Pipeline::new()
        .parse("latin.txt", b"caf\xe9 cr\xe8me")
        .unwrap();
    let texts: Vec<_> = book.document.texts().collect();
    assert_eq!(texts, vec!["caf\u{e9}", "cr\u{e8}me"]);
}

#[test]
fn test_parse_file() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(b"Words from disk.").unwrap();
    file.flush().unwrap();

    let book = Pipeline::new().parse_file(file.path()).unwrap();
    assert_eq!(book.format, "text");
    assert_eq!(book.document.total_words(), 3);
}

#[test]
fn test_parse_file_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.txt");
    std::fs::write(&path, b"\n\n").unwrap();

    let err = Pipeline::new().parse_file(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyDocument);
}

#[test]
fn test_file_key() {
    assert_eq!(file_key("book.epub", 123456), "book.epub_123456");
}
