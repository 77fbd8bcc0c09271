//! EPUB archives assembled in memory.

mod common;

use common::{CONTAINER_XML, GIF, ncx, opf, xhtml, zip_epub};
use wordstream::{ErrorKind, Pipeline};

const IMAGE_ITEM: &str = r#"<item id="img" href="Images/dot.gif" media-type="image/gif"/>"#;

fn chapter_one() -> String {
    xhtml(
        "One",
        "<h1>Opening</h1><p>The first <b>bold</b> words.</p>",
    )
}

fn chapter_two() -> String {
    xhtml(
        "Two",
        r#"<p>Second part here.</p><p><img src="../Images/dot.gif" alt="dot"/></p>"#,
    )
}

fn sample_epub(extra: &[(&str, &[u8])]) -> Vec<u8> {
    let opf = opf(
        "Sample",
        "Ann Author",
        &["Text/ch1.xhtml", "Text/ch2.xhtml"],
        IMAGE_ITEM,
    );
    let ncx = ncx(&[("Opening", "Text/ch1.xhtml"), ("Closing", "Text/ch2.xhtml#top")]);
    let ch1 = chapter_one();
    let ch2 = chapter_two();

    let mut files: Vec<(&str, &[u8])> = vec![
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", opf.as_bytes()),
        ("OEBPS/toc.ncx", ncx.as_bytes()),
        ("OEBPS/Text/ch1.xhtml", ch1.as_bytes()),
        ("OEBPS/Text/ch2.xhtml", ch2.as_bytes()),
        ("OEBPS/Images/dot.gif", GIF),
    ];
    files.extend_from_slice(extra);
    zip_epub(&files)
}

fn encryption_xml(uri: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container"
            xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.idpf.org/2008/embedding"/>
    <enc:CipherData><enc:CipherReference URI="{uri}"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#
    )
}

#[test]
fn test_read_epub() {
    let mut book = Pipeline::new()
        .parse("sample.epub", &sample_epub(&[]))
        .unwrap();

    assert_eq!(book.format, "epub");
    assert_eq!(book.metadata.title.as_deref(), Some("Sample"));
    assert_eq!(book.metadata.author.as_deref(), Some("Ann Author"));
    assert_eq!(book.metadata.language.as_deref(), Some("en"));
    assert!(book.warnings.is_empty(), "{:?}", book.warnings);

    let texts: Vec<_> = book.document.texts().collect();
    assert_eq!(
        texts,
        vec!["Opening", "The", "first", "bold", "words.", "Second", "part", "here."]
    );
    assert!(book.document.words[3].bold);
    assert_eq!(book.document.paragraph_starts, vec![0, 1, 5]);

    let titles: Vec<_> = book.chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Opening", "Closing"]);
    assert_eq!(book.chapter_starts, vec![0, 5]);
    assert_eq!(book.chapter_at(6).unwrap().title, "Closing");

    let section = &book.sections[1];
    assert_eq!(section.word_range, (5, 7));
    let handle = section.resources["../Images/dot.gif"];
    let image = book.resource(handle).unwrap();
    assert_eq!(image.media_type, "image/gif");
    assert_eq!(image.data, GIF);

    assert_eq!(book.release_resources(), 1);
}

#[test]
fn test_missing_chapter_is_a_warning() {
    let opf = opf(
        "Gaps",
        "Ann Author",
        &["Text/ch1.xhtml", "Text/lost.xhtml"],
        "",
    );
    let ncx = ncx(&[("Opening", "Text/ch1.xhtml")]);
    let ch1 = chapter_one();
    let data = zip_epub(&[
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", opf.as_bytes()),
        ("OEBPS/toc.ncx", ncx.as_bytes()),
        ("OEBPS/Text/ch1.xhtml", ch1.as_bytes()),
    ]);

    let book = Pipeline::new().parse("gaps.epub", &data).unwrap();
    assert_eq!(book.document.total_words(), 5);
    assert_eq!(book.chapters.len(), 1);
    assert_eq!(book.warnings.len(), 1);
    assert!(book.warnings[0].contains("lost.xhtml"), "{:?}", book.warnings);
}

#[test]
fn test_missing_toc_falls_back_to_headings() {
    let opf = opf(
        "No Toc",
        "Ann Author",
        &["Text/ch1.xhtml", "Text/ch2.xhtml"],
        IMAGE_ITEM,
    );
    let ch1 = chapter_one();
    let ch2 = chapter_two();
    let data = zip_epub(&[
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", opf.as_bytes()),
        ("OEBPS/Text/ch1.xhtml", ch1.as_bytes()),
        ("OEBPS/Text/ch2.xhtml", ch2.as_bytes()),
        ("OEBPS/Images/dot.gif", GIF),
    ]);

    let mut book = Pipeline::new().parse("notoc.epub", &data).unwrap();
    let titles: Vec<_> = book.chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Opening", "ch2"]);
    assert!(
        book.warnings
            .iter()
            .any(|w| w.contains("No table of contents"))
    );
    book.release_resources();
}

#[test]
fn test_encrypted_content_is_drm() {
    let encryption = encryption_xml("OEBPS/Text/ch1.xhtml");
    let data = sample_epub(&[("META-INF/encryption.xml", encryption.as_bytes())]);
    let err = Pipeline::new().parse("locked.epub", &data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DrmProtected);
}

#[test]
fn test_obfuscated_font_is_not_drm() {
    let encryption = encryption_xml("OEBPS/Fonts/serif.ttf");
    let data = sample_epub(&[
        ("META-INF/encryption.xml", encryption.as_bytes()),
        ("OEBPS/Fonts/serif.ttf", b"\x00\x01\x00\x00obfuscated"),
    ]);
    let mut book = Pipeline::new().parse("fonts.epub", &data).unwrap();
    assert_eq!(book.document.total_words(), 8);
    book.release_resources();
}

#[test]
fn test_missing_container_is_malformed() {
    let data = zip_epub(&[("OEBPS/content.opf", b"<package/>")]);
    let err = Pipeline::new().parse("broken.epub", &data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
}

#[test]
fn test_not_a_zip_is_malformed() {
    let err = Pipeline::new()
        .parse("fake.epub", b"this is not an archive")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
}

#[test]
fn test_sniffed_by_mimetype() {
    let mut book = Pipeline::new()
        .parse("download.bin", &sample_epub(&[]))
        .unwrap();
    assert_eq!(book.format, "epub");
    book.release_resources();
}

#[test]
fn test_textless_book_is_empty() {
    let opf = opf("Blank", "Nobody", &["Text/blank.xhtml"], "");
    let blank = xhtml("Blank", "<div></div>");
    let data = zip_epub(&[
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", opf.as_bytes()),
        ("OEBPS/Text/blank.xhtml", blank.as_bytes()),
    ]);
    let err = Pipeline::new().parse("blank.epub", &data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyDocument);
}
