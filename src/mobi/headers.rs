use crate::error::{Error, Result};

pub const NULL_INDEX: u32 = 0xFFFFFFFF;

/// Compression code that marks HUFF/CDIC text ("DH").
pub const HUFF_CDIC: u16 = 0x4448;

/// PalmDOC + MOBI header (record 0).
///
/// Plain PalmDOC databases only carry the first 16 bytes; every field past
/// that comes from the MOBI header and is trusted only if the declared
/// header length covers it.
#[derive(Debug, Clone)]
pub struct MobiHeader {
    pub compression: Compression,
    pub text_length: u32,
    pub text_record_count: u16,
    pub text_record_size: u16,
    pub encryption: u16,
    /// Whether record 0 carries a `MOBI` header at all.
    pub has_mobi_header: bool,
    pub header_length: u32,
    pub encoding: Encoding,
    pub title: Option<String>,
    pub first_image_index: u32,
    pub exth_flags: u32,
    pub extra_data_flags: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    PalmDoc,
    Huffman,
    Unknown(u16),
}

impl Compression {
    fn from_code(code: u16) -> Self {
        match code {
            1 => Compression::None,
            2 => Compression::PalmDoc,
            HUFF_CDIC => Compression::Huffman,
            n => Compression::Unknown(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Cp1252,
    Utf8,
    Unknown(u32),
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

impl MobiHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 16 {
            return Err(Error::MalformedContainer(format!(
                "record 0 is {} bytes, need at least 16",
                data.len()
            )));
        }

        let mut header = Self {
            compression: Compression::from_code(u16::from_be_bytes([data[0], data[1]])),
            text_length: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            text_record_count: u16::from_be_bytes([data[8], data[9]]),
            text_record_size: u16::from_be_bytes([data[10], data[11]]),
            encryption: u16::from_be_bytes([data[12], data[13]]),
            has_mobi_header: false,
            header_length: 0,
            encoding: Encoding::Cp1252,
            title: None,
            first_image_index: NULL_INDEX,
            exth_flags: 0,
            extra_data_flags: 0,
        };

        if data.len() < 24 || &data[16..20] != b"MOBI" {
            return Ok(header);
        }
        header.has_mobi_header = true;
        header.header_length = be_u32(data, 20).unwrap_or(0);

        // Offsets below are absolute within record 0; the MOBI header starts
        // at 16, so a field is covered when it ends before 16 + length.
        let covered = 16 + header.header_length as usize;
        let field_u32 = |at: usize| -> Option<u32> {
            if at + 4 <= covered {
                be_u32(data, at)
            } else {
                None
            }
        };

        header.encoding = match field_u32(0x1C) {
            Some(1252) | None => Encoding::Cp1252,
            Some(65001) => Encoding::Utf8,
            Some(n) => Encoding::Unknown(n),
        };

        if let (Some(offset), Some(length)) = (field_u32(0x54), field_u32(0x58)) {
            let (offset, length) = (offset as usize, length as usize);
            if length > 0
                && let Some(bytes) = data.get(offset..offset.saturating_add(length))
            {
                header.title = Some(decode_mobi_string(bytes, header.encoding));
            }
        }

        header.first_image_index = field_u32(0x6C).unwrap_or(NULL_INDEX);
        header.exth_flags = field_u32(0x80).unwrap_or(0);

        if header.header_length >= 0xE4
            && let Some(flags) = be_u16(data, 0xF2)
        {
            header.extra_data_flags = flags;
        }

        Ok(header)
    }

    pub fn has_exth(&self) -> bool {
        self.exth_flags & 0x40 != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption != 0
    }
}

/// Decode a header or EXTH string in the book's declared encoding.
pub fn decode_mobi_string(bytes: &[u8], encoding: Encoding) -> String {
    let text = match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        _ => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
    };
    text.trim_matches(char::from(0)).trim().to_string()
}

/// EXTH header (extended metadata).
#[derive(Debug, Default)]
pub struct ExthHeader {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub language: Option<String>,
    pub cover_offset: Option<u32>,
}

impl ExthHeader {
    pub fn parse(data: &[u8], encoding: Encoding) -> Result<Self> {
        if data.len() < 12 || &data[0..4] != b"EXTH" {
            return Err(Error::MalformedContainer("invalid EXTH header".into()));
        }

        let record_count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut exth = ExthHeader::default();
        let mut pos = 12;

        for _ in 0..record_count {
            let (Some(record_type), Some(record_len)) = (be_u32(data, pos), be_u32(data, pos + 4))
            else {
                break;
            };
            let record_len = record_len as usize;
            if record_len < 8 || pos + record_len > data.len() {
                break;
            }

            let content = &data[pos + 8..pos + record_len];

            match record_type {
                100 => {
                    let author = decode_mobi_string(content, encoding);
                    if !author.is_empty() {
                        exth.authors.push(author);
                    }
                }
                201 => {
                    exth.cover_offset = be_u32(content, 0).filter(|&v| v != NULL_INDEX);
                }
                503 => exth.title = Some(decode_mobi_string(content, encoding)),
                524 => exth.language = Some(decode_mobi_string(content, encoding)),
                _ => {}
            }

            pos += record_len;
        }

        Ok(exth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record0(header_length: u32, total: usize) -> Vec<u8> {
        let mut data = vec![0u8; total];
        data[0..2].copy_from_slice(&2u16.to_be_bytes());
        data[8..10].copy_from_slice(&3u16.to_be_bytes());
        data[10..12].copy_from_slice(&4096u16.to_be_bytes());
        data[16..20].copy_from_slice(b"MOBI");
        data[20..24].copy_from_slice(&header_length.to_be_bytes());
        data
    }

    #[test]
    fn test_palmdoc_only_header() {
        let mut data = vec![0u8; 16];
        data[0..2].copy_from_slice(&2u16.to_be_bytes());
        data[8..10].copy_from_slice(&10u16.to_be_bytes());

        let header = MobiHeader::parse(&data).unwrap();
        assert_eq!(header.compression, Compression::PalmDoc);
        assert_eq!(header.text_record_count, 10);
        assert!(!header.has_mobi_header);
        assert_eq!(header.first_image_index, NULL_INDEX);
        assert_eq!(header.encoding, Encoding::Cp1252);
    }

    #[test]
    fn test_compression_codes() {
        let mut data = vec![0u8; 16];
        data[0..2].copy_from_slice(&HUFF_CDIC.to_be_bytes());
        assert_eq!(MobiHeader::parse(&data).unwrap().compression, Compression::Huffman);
        assert_eq!(HUFF_CDIC, 17480);
        data[0..2].copy_from_slice(&7u16.to_be_bytes());
        assert_eq!(
            MobiHeader::parse(&data).unwrap().compression,
            Compression::Unknown(7)
        );
    }

    #[test]
    fn test_fields_guarded_by_header_length() {
        let mut data = record0(0x18, 0x100);
        data[0x1C..0x20].copy_from_slice(&65001u32.to_be_bytes());
        data[0x6C..0x70].copy_from_slice(&5u32.to_be_bytes());

        // Header too short to cover the first-image field.
        let header = MobiHeader::parse(&data).unwrap();
        assert_eq!(header.encoding, Encoding::Utf8);
        assert_eq!(header.first_image_index, NULL_INDEX);

        data[20..24].copy_from_slice(&0xE8u32.to_be_bytes());
        let header = MobiHeader::parse(&data).unwrap();
        assert_eq!(header.first_image_index, 5);
    }

    #[test]
    fn test_full_title() {
        let mut data = record0(0xE8, 0x110);
        data[0x54..0x58].copy_from_slice(&0x100u32.to_be_bytes());
        data[0x58..0x5C].copy_from_slice(&5u32.to_be_bytes());
        data[0x100..0x105].copy_from_slice(b"Title");
        let header = MobiHeader::parse(&data).unwrap();
        assert_eq!(header.title.as_deref(), Some("Title"));

        // Out-of-bounds title is ignored.
        data[0x58..0x5C].copy_from_slice(&500u32.to_be_bytes());
        assert!(MobiHeader::parse(&data).unwrap().title.is_none());
    }

    #[test]
    fn test_extra_data_flags() {
        let mut data = record0(0xE8, 0x100);
        data[0xF2..0xF4].copy_from_slice(&3u16.to_be_bytes());
        assert_eq!(MobiHeader::parse(&data).unwrap().extra_data_flags, 3);

        data[20..24].copy_from_slice(&0xE0u32.to_be_bytes());
        assert_eq!(MobiHeader::parse(&data).unwrap().extra_data_flags, 0);
    }

    #[test]
    fn test_too_short() {
        assert!(MobiHeader::parse(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_exth_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(b"EXTH");
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&3u32.to_be_bytes());

        let author = b"Test Author";
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(&(8 + author.len() as u32).to_be_bytes());
        data.extend_from_slice(author);

        let title = b"Caf\xe9";
        data.extend_from_slice(&503u32.to_be_bytes());
        data.extend_from_slice(&(8 + title.len() as u32).to_be_bytes());
        data.extend_from_slice(title);

        data.extend_from_slice(&201u32.to_be_bytes());
        data.extend_from_slice(&12u32.to_be_bytes());
        data.extend_from_slice(&2u32.to_be_bytes());

        let exth = ExthHeader::parse(&data, Encoding::Cp1252).unwrap();
        assert_eq!(exth.authors, vec!["Test Author"]);
        assert_eq!(exth.title.as_deref(), Some("Caf\u{e9}"));
        assert_eq!(exth.cover_offset, Some(2));
    }

    #[test]
    fn test_exth_invalid() {
        assert!(ExthHeader::parse(b"NOTEXTH_____", Encoding::Utf8).is_err());
        assert!(ExthHeader::parse(b"EXTH", Encoding::Utf8).is_err());
    }
}
