//! In-memory fixtures: EPUB archives and Palm databases.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use wordstream::mobi::palmdoc;

/// Smallest valid GIF.
pub const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\xff\xff\xff\x00\x00\x00!\xf9\x04\x01\x00\x00\x00\x00,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";

// ============================================================================
// EPUB
// ============================================================================

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Zip `files` behind a stored `mimetype` entry.
pub fn zip_epub(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();

    for (name, data) in files {
        zip.start_file(*name, stored).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// XHTML chapter document around `body`.
pub fn xhtml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{title}</title></head>
<body>
{body}
</body>
</html>"#
    )
}

/// Package document with one manifest item per chapter, spined in order,
/// plus an NCX naming each chapter.
pub fn opf(title: &str, author: &str, chapters: &[&str], extra_manifest: &str) -> String {
    let mut manifest = String::new();
    let mut spine = String::new();
    for (i, href) in chapters.iter().enumerate() {
        manifest.push_str(&format!(
            r#"<item id="ch{i}" href="{href}" media-type="application/xhtml+xml"/>"#
        ));
        spine.push_str(&format!(r#"<itemref idref="ch{i}"/>"#));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{title}</dc:title>
    <dc:creator>{author}</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    {manifest}
    {extra_manifest}
  </manifest>
  <spine toc="ncx">{spine}</spine>
</package>"#
    )
}

pub fn ncx(entries: &[(&str, &str)]) -> String {
    let points: String = entries
        .iter()
        .enumerate()
        .map(|(i, (label, src))| {
            format!(
                r#"<navPoint id="p{i}" playOrder="{}"><navLabel><text>{label}</text></navLabel><content src="{src}"/></navPoint>"#,
                i + 1
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>{points}</navMap>
</ncx>"#
    )
}

// ============================================================================
// Palm databases
// ============================================================================

const RECORD_SIZE: usize = 4096;
const MOBI_HEADER_LEN: usize = 0xE8;

/// Header, record table and records.
pub fn palm_database(name: &str, ident: &[u8; 8], records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0u8; 78];
    let name = name.as_bytes();
    out[..name.len().min(31)].copy_from_slice(&name[..name.len().min(31)]);
    out[60..68].copy_from_slice(ident);
    out[76..78].copy_from_slice(&(records.len() as u16).to_be_bytes());

    let mut offset = 78 + records.len() * 8;
    for (i, record) in records.iter().enumerate() {
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&((i as u32) * 2).to_be_bytes());
        offset += record.len();
    }
    for record in records {
        out.extend_from_slice(record);
    }
    out
}

/// Options for [`mobi_book`].
pub struct MobiFixture<'a> {
    pub title: &'a str,
    pub author: Option<&'a str>,
    pub text: &'a str,
    pub compress: bool,
    pub encryption: u16,
    pub images: &'a [&'a [u8]],
    /// 0-based index into `images`.
    pub cover: Option<u32>,
}

impl Default for MobiFixture<'_> {
    fn default() -> Self {
        Self {
            title: "Test Book",
            author: None,
            text: "",
            compress: false,
            encryption: 0,
            images: &[],
            cover: None,
        }
    }
}

fn exth(records: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (kind, data) in records {
        body.extend_from_slice(&kind.to_be_bytes());
        body.extend_from_slice(&((data.len() + 8) as u32).to_be_bytes());
        body.extend_from_slice(data);
    }
    let mut out = b"EXTH".to_vec();
    out.extend_from_slice(&((body.len() + 12) as u32).to_be_bytes());
    out.extend_from_slice(&(records.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

/// A UTF-8 MOBI6 book with a full MOBI header and EXTH block.
pub fn mobi_book(book: &MobiFixture<'_>) -> Vec<u8> {
    let text = book.text.as_bytes();
    let chunks: Vec<&[u8]> = if text.is_empty() {
        Vec::new()
    } else {
        text.chunks(RECORD_SIZE).collect()
    };
    let text_records: Vec<Vec<u8>> = chunks
        .iter()
        .map(|chunk| {
            if book.compress {
                palmdoc::compress(chunk)
            } else {
                chunk.to_vec()
            }
        })
        .collect();

    let mut exth_records = vec![(503, book.title.as_bytes().to_vec())];
    if let Some(author) = book.author {
        exth_records.push((100, author.as_bytes().to_vec()));
    }
    if let Some(cover) = book.cover {
        exth_records.push((201, cover.to_be_bytes().to_vec()));
    }
    let exth = exth(&exth_records);

    let mut record0 = vec![0u8; 16 + MOBI_HEADER_LEN];
    let compression: u16 = if book.compress { 2 } else { 1 };
    record0[0..2].copy_from_slice(&compression.to_be_bytes());
    record0[4..8].copy_from_slice(&(text.len() as u32).to_be_bytes());
    record0[8..10].copy_from_slice(&(text_records.len() as u16).to_be_bytes());
    record0[10..12].copy_from_slice(&(RECORD_SIZE as u16).to_be_bytes());
    record0[12..14].copy_from_slice(&book.encryption.to_be_bytes());
    record0[16..20].copy_from_slice(b"MOBI");
    record0[20..24].copy_from_slice(&(MOBI_HEADER_LEN as u32).to_be_bytes());
    record0[0x1C..0x20].copy_from_slice(&65001u32.to_be_bytes());

    let first_image = if book.images.is_empty() {
        u32::MAX
    } else {
        text_records.len() as u32 + 1
    };
    record0[0x6C..0x70].copy_from_slice(&first_image.to_be_bytes());
    record0[0x80..0x84].copy_from_slice(&0x40u32.to_be_bytes());

    record0.extend_from_slice(&exth);
    let title_offset = record0.len() as u32;
    record0[0x54..0x58].copy_from_slice(&title_offset.to_be_bytes());
    record0[0x58..0x5C].copy_from_slice(&(book.title.len() as u32).to_be_bytes());
    record0.extend_from_slice(book.title.as_bytes());
    record0.extend_from_slice(&[0, 0]);

    let mut records = vec![record0];
    records.extend(text_records);
    records.extend(book.images.iter().map(|image| image.to_vec()));
    records.push(b"FLIS\0\0\0\x08".to_vec());
    palm_database(book.title, b"BOOKMOBI", &records)
}

/// A plain PalmDOC (`TEXtREAd`) database.
pub fn palmdoc_book(name: &str, text: &str, compress: bool) -> Vec<u8> {
    let text_records: Vec<Vec<u8>> = text
        .as_bytes()
        .chunks(RECORD_SIZE)
        .map(|chunk| {
            if compress {
                palmdoc::compress(chunk)
            } else {
                chunk.to_vec()
            }
        })
        .collect();

    let mut record0 = vec![0u8; 16];
    let compression: u16 = if compress { 2 } else { 1 };
    record0[0..2].copy_from_slice(&compression.to_be_bytes());
    record0[4..8].copy_from_slice(&(text.len() as u32).to_be_bytes());
    record0[8..10].copy_from_slice(&(text_records.len() as u16).to_be_bytes());
    record0[10..12].copy_from_slice(&(RECORD_SIZE as u16).to_be_bytes());

    let mut records = vec![record0];
    records.extend(text_records);
    palm_database(name, b"TEXtREAd", &records)
}
