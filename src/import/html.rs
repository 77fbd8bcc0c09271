//! Standalone HTML/XHTML documents.

use std::collections::BTreeMap;

use super::{FormatAdapter, decode_data_uri, finish_book, split_at_headings};
use crate::builder::DocumentBuilder;
use crate::content::ContentUnit;
use crate::dom::{document_title, extract_blocks, parse_html};
use crate::error::Result;
use crate::model::{Metadata, ParsedBook};
use crate::options::ParseOptions;
use crate::resource::DisplayHandle;
use crate::util::decode_xml;

pub struct HtmlAdapter;

impl FormatAdapter for HtmlAdapter {
    fn name(&self) -> &'static str {
        "html"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["html", "htm", "xhtml"]
    }

    fn sniff(&self, data: &[u8]) -> bool {
        let prefix = &data[..data.len().min(512)];
        let lower = String::from_utf8_lossy(prefix).to_ascii_lowercase();
        let start = lower.trim_start_matches('\u{feff}').trim_start();
        start.starts_with("<!doctype html")
            || start.starts_with("<html")
            || (start.starts_with("<?xml") && lower.contains("<html"))
    }

    fn parse(&self, data: &[u8], source_name: &str, options: &ParseOptions) -> Result<ParsedBook> {
        let html = decode_xml(data);
        let dom = parse_html(&html);
        let metadata = Metadata {
            title: document_title(&dom),
            ..Metadata::default()
        };

        let (units, split) = split_at_headings(extract_blocks(&dom), source_name);
        log::debug!(
            "{source_name}: {} html unit(s), split at headings: {split}",
            units.len()
        );

        let mut builder = DocumentBuilder::new(options);
        for unit in &units {
            let resources = inline_resources(&mut builder, unit);
            builder.add_unit(unit, true, resources);
        }
        Ok(finish_book(builder, self.name(), metadata, source_name))
    }
}

/// Store `data:` images of a unit. Other references point outside the
/// file and are left unresolved.
pub(crate) fn inline_resources(
    builder: &mut DocumentBuilder,
    unit: &ContentUnit,
) -> BTreeMap<String, DisplayHandle> {
    let mut resources = BTreeMap::new();
    if !builder.options().include_images {
        return resources;
    }
    for src in unit.image_sources() {
        if resources.contains_key(src) {
            continue;
        }
        match decode_data_uri(src) {
            Some((media_type, data)) => {
                let handle = builder.resources_mut().acquire(media_type, data);
                resources.insert(src.to_string(), handle);
            }
            None => log::debug!("external image {src} not resolved"),
        }
    }
    resources
}
