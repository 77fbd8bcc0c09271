//! Record 0 interpretation, text decompression and image discovery.
//!
//! The stages run in order and each one only starts once the previous has
//! validated its part of the file:
//!
//! 1. [`PalmDatabase::parse`]: header and record table
//! 2. [`MobiReader::new`]: record 0, DRM and codec checks
//! 3. [`MobiReader::text`]: per-record decompression

use super::headers::{Compression, Encoding, ExthHeader, MobiHeader, NULL_INDEX};
use super::palmdoc;
use super::parser::{DatabaseKind, PalmDatabase, is_metadata_record, strip_trailing_data};
use crate::error::{Error, Result};
use crate::model::Metadata;
use crate::util::{MediaFormat, sniff_image};

/// An image record found after the text.
#[derive(Debug, Clone, Copy)]
pub struct MobiImage<'a> {
    /// 1-based index relative to the first image record, as used by
    /// `recindex` attributes.
    pub recindex: usize,
    pub format: MediaFormat,
    pub data: &'a [u8],
}

/// A MOBI or PalmDOC book whose headers have been validated.
#[derive(Debug)]
pub struct MobiReader<'a> {
    db: PalmDatabase<'a>,
    header: MobiHeader,
    exth: Option<ExthHeader>,
}

impl<'a> MobiReader<'a> {
    /// Interpret record 0.
    ///
    /// Encrypted books fail with [`Error::DrmProtected`] and HUFF/CDIC books
    /// with [`Error::UnsupportedCompression`]; in both cases no text record
    /// is touched.
    pub fn new(db: PalmDatabase<'a>) -> Result<Self> {
        let record0 = db
            .record(0)
            .ok_or_else(|| Error::MalformedContainer("missing record 0".into()))?;
        let header = MobiHeader::parse(record0)?;

        if header.is_encrypted() {
            log::info!("encryption type {} in record 0", header.encryption);
            return Err(Error::DrmProtected);
        }
        if header.compression == Compression::Huffman {
            return Err(Error::UnsupportedCompression("HUFF/CDIC".into()));
        }
        if db.kind == DatabaseKind::Mobi && !header.has_mobi_header {
            log::debug!("BOOKMOBI database without MOBI header, reading as PalmDOC");
        }

        let exth = parse_exth(record0, &header);

        Ok(Self { db, header, exth })
    }

    /// Parse raw bytes through both header stages.
    pub fn open(data: &'a [u8]) -> Result<Self> {
        Self::new(PalmDatabase::parse(data)?)
    }

    pub fn header(&self) -> &MobiHeader {
        &self.header
    }

    pub fn database(&self) -> &PalmDatabase<'a> {
        &self.db
    }

    /// Title, author and language from EXTH, falling back to the full-title
    /// field and then the database name.
    pub fn metadata(&self) -> Metadata {
        let exth = self.exth.as_ref();
        let title = exth
            .and_then(|e| e.title.clone())
            .or_else(|| self.header.title.clone())
            .or_else(|| Some(self.db.name.clone()))
            .filter(|t| !t.is_empty());
        let author = exth
            .map(|e| e.authors.join(", "))
            .filter(|a| !a.is_empty());
        Metadata {
            title,
            author,
            language: exth.and_then(|e| e.language.clone()),
        }
    }

    /// EXTH cover image as a `recindex` (1-based).
    pub fn cover_recindex(&self) -> Option<usize> {
        self.exth
            .as_ref()
            .and_then(|e| e.cover_offset)
            .map(|offset| offset as usize + 1)
    }

    /// Decompress and decode every text record.
    ///
    /// Missing records and unknown compression codes are recorded in
    /// `warnings`; whatever decoded is returned.
    pub fn text(&self, warnings: &mut Vec<String>) -> String {
        let compression = self.header.compression;
        if let Compression::Unknown(code) = compression {
            warnings.push(format!(
                "Unknown compression type {code}, reading text records uncompressed"
            ));
        }

        let flags = if self.header.has_mobi_header {
            self.header.extra_data_flags
        } else {
            0
        };

        let count = self.header.text_record_count as usize;
        let mut raw = Vec::with_capacity(text_capacity(
            count,
            self.header.text_record_size as usize,
            self.db.byte_len(),
        ));
        for i in 1..=count {
            let Some(record) = self.db.record(i) else {
                warnings.push(format!(
                    "Text record {i} of {count} is missing; text is truncated"
                ));
                break;
            };
            let stripped = strip_trailing_data(record, flags);
            match compression {
                Compression::PalmDoc => raw.extend_from_slice(&palmdoc::decompress(stripped)),
                _ => raw.extend_from_slice(stripped),
            }
        }
        log::debug!("decoded {count} text record(s) into {} bytes", raw.len());

        raw.retain(|&b| b != 0);
        match self.header.encoding {
            Encoding::Utf8 => crate::util::decode_text(&raw, None).into_owned(),
            _ => encoding_rs::WINDOWS_1252.decode(&raw).0.into_owned(),
        }
    }

    /// Index of the first record that may hold an image.
    fn first_image_record(&self) -> usize {
        let first = self.header.first_image_index;
        if first != NULL_INDEX && first > 0 && (first as usize) < self.db.record_count() {
            first as usize
        } else {
            self.header.text_record_count as usize + 1
        }
    }

    /// Image records, sniffed by magic number. Other records are skipped.
    pub fn images(&self) -> Vec<MobiImage<'a>> {
        let start = self.first_image_record();
        let mut images = Vec::new();
        for i in start..self.db.record_count() {
            let Some(record) = self.db.record(i) else {
                continue;
            };
            if is_metadata_record(record) {
                continue;
            }
            if let Some(format) = sniff_image(record) {
                images.push(MobiImage {
                    recindex: i - start + 1,
                    format,
                    data: record,
                });
            }
        }
        images
    }
}

/// Parse EXTH header if present.
fn parse_exth(record0: &[u8], header: &MobiHeader) -> Option<ExthHeader> {
    if header.has_exth() && header.header_length > 0 {
        let exth_start = 16 + header.header_length as usize;
        if exth_start < record0.len() {
            return ExthHeader::parse(&record0[exth_start..], header.encoding).ok();
        }
    }
    None
}

/// PalmDOC output is at most eight times its input.
const MAX_EXPANSION: usize = 8;

/// Capacity hint for the decoded text. The header's record count and size
/// are untrusted, so the hint never exceeds what the file could decode to.
fn text_capacity(count: usize, record_size: usize, file_len: usize) -> usize {
    count
        .saturating_mul(record_size.max(1))
        .min(file_len.saturating_mul(MAX_EXPANSION))
}
