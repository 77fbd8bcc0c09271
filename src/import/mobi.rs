//! MOBI/AZW/PRC and PalmDOC databases.
//!
//! MOBI6 text is one HTML stream; chapters are separated by
//! `<mbp:pagebreak/>` markers and images are referenced by `recindex`.
//! PalmDOC text is plain and goes through the text adapter's paragraph
//! rules.

use std::collections::{BTreeMap, HashMap};

use memchr::memmem;

use super::text::{group_chapters, split_paragraphs};
use super::{FormatAdapter, finish_book};
use crate::builder::DocumentBuilder;
use crate::content::{Block, BlockKind, ContentUnit, Inline};
use crate::dom::{extract_blocks, parse_html};
use crate::error::Result;
use crate::mobi::{MobiImage, MobiReader, sniff_database};
use crate::model::ParsedBook;
use crate::options::ParseOptions;
use crate::resource::DisplayHandle;

const PAGEBREAK: &[u8] = b"<mbp:pagebreak";

const HTML_MARKERS: &[&[u8]] = &[b"<html", b"<body", b"<p>", b"<p ", b"<div", b"<br", PAGEBREAK];

pub struct MobiAdapter;

impl FormatAdapter for MobiAdapter {
    fn name(&self) -> &'static str {
        "mobi"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["mobi", "azw", "prc", "pdb"]
    }

    fn sniff(&self, data: &[u8]) -> bool {
        sniff_database(data).is_some()
    }

    fn parse(&self, data: &[u8], source_name: &str, options: &ParseOptions) -> Result<ParsedBook> {
        let reader = MobiReader::open(data)?;
        let mut builder = DocumentBuilder::new(options);

        let mut warnings = Vec::new();
        let text = reader.text(&mut warnings);
        for warning in warnings {
            builder.warn(warning);
        }

        let images: HashMap<String, MobiImage<'_>> = reader
            .images()
            .into_iter()
            .map(|image| (recindex_key(image.recindex), image))
            .collect();
        let mut images = ImageCache {
            images,
            handles: HashMap::new(),
        };

        if let Some(cover) = reader.cover_recindex() {
            let key = recindex_key(cover);
            if options.include_images && images.images.contains_key(&key) {
                let mut unit = ContentUnit::new("cover").with_title("Cover");
                let mut block = Block::new(BlockKind::Paragraph);
                block.inlines.push(Inline::Image {
                    src: key,
                    alt: "Cover".into(),
                });
                unit.blocks.push(block);
                let resources = images.resolve(&mut builder, &unit);
                builder.add_unit(&unit, false, resources);
            }
        }

        if looks_like_html(&text) {
            let parts = split_pagebreaks(&text);
            log::debug!("{source_name}: {} pagebreak-delimited part(s)", parts.len());
            for (n, part) in parts.into_iter().enumerate() {
                let dom = parse_html(part);
                let mut unit = ContentUnit::new(format!("part{:04}", n + 1));
                unit.blocks = extract_blocks(&dom);
                if unit.blocks.is_empty() {
                    continue;
                }
                let title = unit
                    .first_heading()
                    .unwrap_or_else(|| format!("Section {}", n + 1));
                unit.title = Some(title);
                let resources = images.resolve(&mut builder, &unit);
                builder.add_unit(&unit, true, resources);
            }
        } else {
            for unit in group_chapters(split_paragraphs(&text), source_name) {
                builder.add_unit(&unit, true, BTreeMap::new());
            }
        }

        Ok(finish_book(builder, self.name(), reader.metadata(), source_name))
    }
}

fn recindex_key(recindex: usize) -> String {
    format!("recindex:{recindex:05}")
}

/// MOBI6 text is markup; PalmDOC text usually is not.
fn looks_like_html(text: &str) -> bool {
    let head = &text.as_bytes()[..text.len().min(4096)];
    let head = head.to_ascii_lowercase();
    HTML_MARKERS
        .iter()
        .any(|needle| memmem::find(&head, needle).is_some())
}

/// Split at every `<mbp:pagebreak` marker, case-insensitively.
fn split_pagebreaks(text: &str) -> Vec<&str> {
    let lower = text.as_bytes().to_ascii_lowercase();
    let mut parts = Vec::new();
    let mut start = 0;
    for pos in memmem::find_iter(&lower, PAGEBREAK) {
        // The marker starts with '<', so `pos` is a char boundary.
        parts.push(&text[start..pos]);
        start = pos;
    }
    parts.push(&text[start..]);
    parts
}

/// Image records of the book and the handles already handed out for them.
struct ImageCache<'a> {
    images: HashMap<String, MobiImage<'a>>,
    handles: HashMap<String, DisplayHandle>,
}

impl ImageCache<'_> {
    fn resolve(
        &mut self,
        builder: &mut DocumentBuilder,
        unit: &ContentUnit,
    ) -> BTreeMap<String, DisplayHandle> {
        let mut resources = BTreeMap::new();
        if !builder.options().include_images {
            return resources;
        }
        for src in unit.image_sources() {
            if let Some(&handle) = self.handles.get(src) {
                resources.insert(src.to_string(), handle);
                continue;
            }
            match self.images.get(src) {
                Some(image) => {
                    let handle = builder
                        .resources_mut()
                        .acquire(image.format.mime_type(), image.data.to_vec());
                    self.handles.insert(src.to_string(), handle);
                    resources.insert(src.to_string(), handle);
                }
                None => builder.warn(format!("Image {src} not found")),
            }
        }
        resources
    }
}
