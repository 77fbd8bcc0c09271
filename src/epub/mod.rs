//! EPUB package documents: container, OPF, navigation and encryption.

mod parser;

pub(crate) use parser::{local_name, resolve_entity};
pub use parser::{
    ManifestItem, NavEntry, OpfData, parse_container_xml, parse_encryption, parse_ncx, parse_nav,
    parse_opf,
};
