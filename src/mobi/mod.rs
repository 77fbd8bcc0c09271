//! Kindle-family containers: MOBI6 (`BOOKMOBI`) and PalmDOC (`TEXtREAd`).

mod headers;
pub mod palmdoc;
mod parser;
mod reader;

pub use headers::{Compression, Encoding, ExthHeader, HUFF_CDIC, MobiHeader, NULL_INDEX};
pub use parser::{DatabaseKind, PDB_HEADER_LEN, PalmDatabase, sniff_database, strip_trailing_data};
pub use reader::{MobiImage, MobiReader};
