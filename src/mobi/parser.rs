//! Palm database container: header and record table (no decompression).

use crate::error::{Error, Result};

/// Size of the fixed database header before the record table.
pub const PDB_HEADER_LEN: usize = 78;

/// Bytes per record-table entry: offset, attributes, unique id.
const RECORD_ENTRY_LEN: usize = 8;

/// Database type/creator pair at bytes 60..68.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    /// `BOOKMOBI`: MOBI header in record 0.
    Mobi,
    /// `TEXtREAd`: plain PalmDOC.
    PalmDoc,
}

/// Identify a Palm ebook database from its header bytes.
pub fn sniff_database(data: &[u8]) -> Option<DatabaseKind> {
    let ident = data.get(60..68)?;
    if ident == b"BOOKMOBI" {
        Some(DatabaseKind::Mobi)
    } else if ident.eq_ignore_ascii_case(b"TEXTREAD") {
        Some(DatabaseKind::PalmDoc)
    } else {
        None
    }
}

/// A validated Palm database borrowing the file bytes.
#[derive(Debug)]
pub struct PalmDatabase<'a> {
    data: &'a [u8],
    pub name: String,
    pub kind: DatabaseKind,
    /// Record start offsets, non-decreasing and within the file.
    offsets: Vec<usize>,
}

impl<'a> PalmDatabase<'a> {
    /// Read the header and record table.
    ///
    /// Fails with [`Error::MalformedContainer`] when the header is short, the
    /// type is unknown, there are fewer than two records, or the offset table
    /// is truncated, decreasing, or points outside the file.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < PDB_HEADER_LEN {
            return Err(Error::MalformedContainer(format!(
                "file is {} bytes, shorter than the database header",
                data.len()
            )));
        }

        // Bytes 0-31: database name (null-terminated)
        let name_end = data[..32].iter().position(|&b| b == 0).unwrap_or(32);
        let name = encoding_rs::WINDOWS_1252
            .decode(&data[..name_end])
            .0
            .trim()
            .to_string();

        let kind = sniff_database(data).ok_or_else(|| {
            Error::MalformedContainer(format!(
                "unknown database type {:?}",
                String::from_utf8_lossy(&data[60..68])
            ))
        })?;

        let num_records = u16::from_be_bytes([data[76], data[77]]) as usize;
        if num_records < 2 {
            return Err(Error::MalformedContainer(format!(
                "database has {num_records} record(s), need at least 2"
            )));
        }

        let table_end = PDB_HEADER_LEN + num_records * RECORD_ENTRY_LEN;
        if data.len() < table_end {
            return Err(Error::MalformedContainer("record table truncated".into()));
        }

        let mut offsets = Vec::with_capacity(num_records);
        for i in 0..num_records {
            let pos = PDB_HEADER_LEN + i * RECORD_ENTRY_LEN;
            let offset =
                u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
                    as usize;

            if offset < table_end || offset > data.len() {
                return Err(Error::MalformedContainer(format!(
                    "record {i} offset {offset} outside file bounds"
                )));
            }
            if let Some(&prev) = offsets.last()
                && offset < prev
            {
                return Err(Error::MalformedContainer(format!(
                    "record {i} offset {offset} precedes record {} offset {prev}",
                    i - 1
                )));
            }
            offsets.push(offset);
        }

        log::debug!("palm database {name:?}: {kind:?}, {num_records} records");

        Ok(Self {
            data,
            name,
            kind,
            offsets,
        })
    }

    pub fn record_count(&self) -> usize {
        self.offsets.len()
    }

    /// Size of the whole file in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Bytes of record `index`, up to the next record or end of file.
    pub fn record(&self, index: usize) -> Option<&'a [u8]> {
        let start = *self.offsets.get(index)?;
        let end = self
            .offsets
            .get(index + 1)
            .copied()
            .unwrap_or(self.data.len());
        self.data.get(start..end)
    }
}

/// Strip trailing entries from a text record before decompression.
///
/// Each set bit above bit 0 of `flags` adds one trailing entry whose size is
/// a backward variable-width integer at the end of the record. Bit 0 marks
/// multibyte overlap bytes, removed last.
pub fn strip_trailing_data(record: &[u8], flags: u16) -> &[u8] {
    if flags == 0 || record.is_empty() {
        return record;
    }

    let mut end = record.len();

    let mut shifted_flags = flags >> 1;
    while shifted_flags != 0 {
        if shifted_flags & 1 != 0 {
            if end == 0 {
                break;
            }
            // Low 7 bits carry the value; a set high bit ends the integer.
            let mut size = 0usize;
            let mut shift = 0;
            let mut pos = end;
            while pos > 0 {
                pos -= 1;
                let byte = record[pos];
                size |= ((byte & 0x7F) as usize) << shift;
                shift += 7;
                if byte & 0x80 != 0 || shift >= 28 {
                    break;
                }
            }
            if size > 0 && size <= end {
                end -= size;
            }
        }
        shifted_flags >>= 1;
    }

    if flags & 1 != 0 && end > 0 {
        let overlap = (record[end - 1] & 3) as usize + 1;
        if overlap <= end {
            end -= overlap;
        }
    }

    &record[..end]
}

/// Structural records that can follow the images.
pub fn is_metadata_record(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    matches!(
        &data[..4],
        b"FLIS" | b"FCIS" | b"SRCS" | b"BOUN" | b"FDST" | b"DATP"
        | b"AUDI" | b"VIDE" | b"RESC" | b"CMET" | b"PAGE" | b"CONT"
        | b"CRES" | b"FONT" | b"INDX" | b"EXTH" | b"HUFF" | b"CDIC"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Header plus table for records at the given offsets (relative to the
    /// end of the table), followed by `payload`.
    fn database(ident: &[u8; 8], record_offsets: &[usize], payload: &[u8]) -> Vec<u8> {
        let table_end = PDB_HEADER_LEN + record_offsets.len() * RECORD_ENTRY_LEN;
        let mut data = vec![0u8; PDB_HEADER_LEN];
        data[..8].copy_from_slice(b"Test DB\0");
        data[60..68].copy_from_slice(ident);
        data[76..78].copy_from_slice(&(record_offsets.len() as u16).to_be_bytes());
        for (i, off) in record_offsets.iter().enumerate() {
            data.extend_from_slice(&((table_end + off) as u32).to_be_bytes());
            data.extend_from_slice(&(i as u32).to_be_bytes());
        }
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn test_parse_records() {
        let data = database(b"BOOKMOBI", &[0, 4], b"abcdefgh");
        let db = PalmDatabase::parse(&data).unwrap();
        assert_eq!(db.name, "Test DB");
        assert_eq!(db.kind, DatabaseKind::Mobi);
        assert_eq!(db.record_count(), 2);
        assert_eq!(db.record(0), Some(&b"abcd"[..]));
        assert_eq!(db.record(1), Some(&b"efgh"[..]));
        assert_eq!(db.record(2), None);
    }

    #[test]
    fn test_textread_accepted() {
        let data = database(b"TEXtREAd", &[0, 1], b"ab");
        assert_eq!(PalmDatabase::parse(&data).unwrap().kind, DatabaseKind::PalmDoc);
    }

    #[test]
    fn test_rejects_bad_containers() {
        let malformed = |data: &[u8]| {
            matches!(PalmDatabase::parse(data), Err(Error::MalformedContainer(_)))
        };
        assert!(malformed(&[0u8; 20]));
        assert!(malformed(&database(b"BOOKMOBI", &[0], b"abcd")));
        assert!(malformed(&database(b"XXXXXXXX", &[0, 2], b"abcd")));
        assert!(malformed(&database(b"BOOKMOBI", &[2, 0], b"abcd")));
        assert!(malformed(&database(b"BOOKMOBI", &[0, 100], b"abcd")));

        let mut truncated = database(b"BOOKMOBI", &[0, 2], b"");
        truncated.truncate(PDB_HEADER_LEN + 4);
        assert!(malformed(&truncated));
    }

    #[test]
    fn test_strip_trailing_data() {
        // One trailing entry of size 3 (VWI 0x83 = last byte, value 3).
        let record = b"textXY\x83";
        assert_eq!(strip_trailing_data(record, 0b10), b"text");
        // Multibyte overlap: low two bits + 1 bytes.
        let record = b"text\x01";
        assert_eq!(strip_trailing_data(record, 0b01), b"tex");
        assert_eq!(strip_trailing_data(b"text", 0), b"text");
    }

    #[test]
    fn test_metadata_records() {
        assert!(is_metadata_record(b"FLIS\0\0\0\x08"));
        assert!(!is_metadata_record(&[0xFF, 0xD8, 0xFF, 0xE0]));
    }
}
