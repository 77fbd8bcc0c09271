//! FictionBook 2 documents.
//!
//! Top-level `<section>`s of each `<body>` become units; nested sections are
//! flattened into headings. Images live in base64 `<binary>` elements at the
//! end of the file, so units are collected first and resolved afterwards.

use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use memchr::memmem;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{FormatAdapter, finish_book};
use crate::builder::DocumentBuilder;
use crate::content::{Block, BlockKind, ContentUnit, Inline, TextStyle};
use crate::epub::{local_name, resolve_entity};
use crate::error::Result;
use crate::model::{Metadata, ParsedBook};
use crate::options::ParseOptions;
use crate::resource::{DisplayHandle, Resource};
use crate::util::{decode_xml, sniff_image};

pub struct Fb2Adapter;

impl FormatAdapter for Fb2Adapter {
    fn name(&self) -> &'static str {
        "fb2"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["fb2"]
    }

    fn sniff(&self, data: &[u8]) -> bool {
        memmem::find(&data[..data.len().min(1024)], b"<FictionBook").is_some()
    }

    fn parse(&self, data: &[u8], source_name: &str, options: &ParseOptions) -> Result<ParsedBook> {
        let xml = decode_xml(data);
        let doc = parse_fiction_book(&xml)?;
        log::debug!(
            "{source_name}: {} section(s), {} binary object(s)",
            doc.units.len(),
            doc.binaries.len()
        );

        let mut builder = DocumentBuilder::new(options);
        let mut handles: HashMap<String, DisplayHandle> = HashMap::new();
        let mut units = doc.units;

        if let Some(cover) = doc.cover
            && options.include_images
        {
            let mut unit = ContentUnit::new("#cover").with_title("Cover");
            let mut block = Block::new(BlockKind::Paragraph);
            block.inlines.push(Inline::Image {
                src: cover,
                alt: "Cover".into(),
            });
            unit.blocks.push(block);
            units.insert(0, (unit, false));
        }

        for (unit, is_chapter) in &units {
            let mut resources = BTreeMap::new();
            if options.include_images {
                for src in unit.image_sources() {
                    let id = src.trim_start_matches('#');
                    if let Some(&handle) = handles.get(id) {
                        resources.insert(src.to_string(), handle);
                        continue;
                    }
                    match doc.binaries.get(id) {
                        Some(resource) => {
                            let handle = builder
                                .resources_mut()
                                .acquire(resource.media_type.clone(), resource.data.clone());
                            handles.insert(id.to_string(), handle);
                            resources.insert(src.to_string(), handle);
                        }
                        None => builder.warn(format!("Image {src} has no binary")),
                    }
                }
            }
            builder.add_unit(unit, *is_chapter, resources);
        }

        for warning in doc.warnings {
            builder.warn(warning);
        }
        Ok(finish_book(builder, self.name(), doc.metadata, source_name))
    }
}

/// Everything read from one FictionBook file.
#[derive(Debug, Default)]
struct FictionBook {
    metadata: Metadata,
    cover: Option<String>,
    /// Units with their chapter flag, in reading order.
    units: Vec<(ContentUnit, bool)>,
    binaries: HashMap<String, Resource>,
    warnings: Vec<String>,
}

fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

#[derive(Default)]
struct BodyState {
    /// Open `<section>` depth within the current body.
    section_depth: usize,
    title_depth: usize,
    quote_depth: usize,
    italic: usize,
    bold: usize,
    unit: Option<ContentUnit>,
    /// Title text of the top-level section, collected while its title is
    /// open.
    title: Option<String>,
    block: Option<Block>,
    is_notes: bool,
}

impl BodyState {
    fn style(&self) -> TextStyle {
        TextStyle {
            italic: self.italic > 0,
            bold: self.bold > 0,
        }
    }

    fn heading_level(&self) -> u8 {
        (self.section_depth + 1).min(6) as u8
    }

    fn unit(&mut self) -> &mut ContentUnit {
        self.unit.get_or_insert_with(|| ContentUnit::new("#body"))
    }

    fn open_block(&mut self, kind: BlockKind) {
        self.close_block();
        self.block = Some(Block::new(kind));
    }

    fn close_block(&mut self) {
        if let Some(block) = self.block.take() {
            if self.title_depth > 0 && self.section_depth <= 1 {
                let text = block.plain_text();
                let title = self.title.get_or_insert_with(String::new);
                if !title.is_empty() {
                    title.push(' ');
                }
                title.push_str(text.split_whitespace().collect::<Vec<_>>().join(" ").as_str());
            }
            self.unit().blocks.push(block);
        }
    }

    fn push_text(&mut self, text: &str) {
        let style = self.style();
        match self.block.as_mut() {
            Some(block) => block.inlines.push(Inline::styled(text, style)),
            None if !text.trim().is_empty() => {
                let mut block = Block::new(BlockKind::Paragraph);
                block.inlines.push(Inline::styled(text, style));
                self.block = Some(block);
            }
            None => {}
        }
    }

    fn push_image(&mut self, src: String, alt: String) {
        let image = Inline::Image { src, alt };
        match self.block.as_mut() {
            Some(block) => block.inlines.push(image),
            None => {
                let mut block = Block::new(BlockKind::Paragraph);
                block.inlines.push(image);
                self.unit().blocks.push(block);
            }
        }
    }

    /// Finish the open unit, if it has any content.
    fn finish_unit(&mut self, units: &mut Vec<(ContentUnit, bool)>) {
        self.close_block();
        if let Some(mut unit) = self.unit.take() {
            let title = self.title.take().filter(|t| !t.is_empty());
            if !unit.blocks.is_empty() {
                unit.title = title.or_else(|| self.is_notes.then(|| "Notes".to_string()));
                units.push((unit, true));
            }
        }
    }
}

fn parse_fiction_book(xml: &str) -> Result<FictionBook> {
    let mut reader = Reader::from_str(xml);
    let mut doc = FictionBook::default();

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut body: Option<BodyState> = None;
    let mut section_counter = 0usize;
    let mut text_buf = String::new();
    let mut authors: Vec<String> = Vec::new();
    let mut binary: Option<(String, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                match (&mut body, name.as_slice()) {
                    (None, b"body") => {
                        body = Some(BodyState {
                            is_notes: attr_value(&e, b"name").is_some(),
                            ..BodyState::default()
                        });
                    }
                    (None, b"binary") => {
                        let id = attr_value(&e, b"id").unwrap_or_default();
                        let media_type = attr_value(&e, b"content-type").unwrap_or_default();
                        binary = Some((id, media_type));
                        text_buf.clear();
                    }
                    (None, b"author") if path.iter().any(|p| p == b"title-info") => {
                        authors.push(String::new());
                    }
                    (None, _) => text_buf.clear(),
                    (Some(state), b"section") => {
                        if state.section_depth == 0 {
                            state.finish_unit(&mut doc.units);
                            section_counter += 1;
                            state.unit = Some(ContentUnit::new(format!("#section{section_counter}")));
                        } else {
                            state.close_block();
                        }
                        state.section_depth += 1;
                    }
                    (Some(state), b"title") => {
                        state.close_block();
                        state.title_depth += 1;
                    }
                    (Some(state), b"cite" | b"epigraph" | b"poem" | b"annotation") => {
                        state.close_block();
                        state.quote_depth += 1;
                    }
                    (Some(state), b"p" | b"v" | b"text-author") => {
                        let kind = if state.title_depth > 0 {
                            BlockKind::Heading(state.heading_level())
                        } else if state.quote_depth > 0 {
                            BlockKind::Quote
                        } else {
                            BlockKind::Paragraph
                        };
                        state.open_block(kind);
                    }
                    (Some(state), b"subtitle") => {
                        let level = (state.heading_level() + 1).min(6);
                        state.open_block(BlockKind::Heading(level));
                    }
                    (Some(state), b"emphasis") => state.italic += 1,
                    (Some(state), b"strong") => state.bold += 1,
                    (Some(state), b"image") => {
                        if let Some(href) = attr_value(&e, b"href") {
                            state.push_image(href, attr_value(&e, b"alt").unwrap_or_default());
                        }
                    }
                    (Some(_), _) => {}
                }
                path.push(name);
            }
            Event::Empty(e) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match (&mut body, name) {
                    (Some(state), b"image") => {
                        if let Some(href) = attr_value(&e, b"href") {
                            state.push_image(href, attr_value(&e, b"alt").unwrap_or_default());
                        }
                    }
                    (Some(state), b"empty-line") => state.close_block(),
                    (None, b"image") if path.iter().any(|p| p == b"coverpage") => {
                        doc.cover = attr_value(&e, b"href");
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                let text = String::from_utf8_lossy(e.as_ref());
                match body.as_mut() {
                    Some(state) => state.push_text(&text),
                    None => text_buf.push_str(&text),
                }
            }
            Event::CData(e) => {
                if let Some(state) = body.as_mut() {
                    state.push_text(&String::from_utf8_lossy(&e));
                }
            }
            Event::GeneralRef(e) => {
                if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    match body.as_mut() {
                        Some(state) => state.push_text(&resolved),
                        None => text_buf.push_str(&resolved),
                    }
                }
            }
            Event::End(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                path.pop();
                let in_title_info = path.iter().any(|p| p == b"title-info");
                match (&mut body, name.as_slice()) {
                    (Some(state), b"body") => {
                        state.finish_unit(&mut doc.units);
                        body = None;
                    }
                    (Some(state), b"section") => {
                        state.section_depth = state.section_depth.saturating_sub(1);
                        if state.section_depth == 0 {
                            state.finish_unit(&mut doc.units);
                        } else {
                            state.close_block();
                        }
                    }
                    (Some(state), b"title") => {
                        state.close_block();
                        state.title_depth = state.title_depth.saturating_sub(1);
                    }
                    (Some(state), b"cite" | b"epigraph" | b"poem" | b"annotation") => {
                        state.close_block();
                        state.quote_depth = state.quote_depth.saturating_sub(1);
                    }
                    (Some(state), b"p" | b"v" | b"text-author" | b"subtitle") => {
                        state.close_block()
                    }
                    (Some(state), b"emphasis") => state.italic = state.italic.saturating_sub(1),
                    (Some(state), b"strong") => state.bold = state.bold.saturating_sub(1),
                    (Some(_), _) => {}
                    (None, b"binary") => {
                        if let Some((id, media_type)) = binary.take() {
                            let compact: String =
                                text_buf.chars().filter(|c| !c.is_whitespace()).collect();
                            match STANDARD.decode(compact) {
                                Ok(data) => {
                                    let media_type = if media_type.is_empty() {
                                        sniff_image(&data)
                                            .map(|f| f.mime_type().to_string())
                                            .unwrap_or_else(|| "application/octet-stream".into())
                                    } else {
                                        media_type
                                    };
                                    doc.binaries.insert(id, Resource { media_type, data });
                                }
                                Err(e) => doc
                                    .warnings
                                    .push(format!("Binary {id} is not valid base64: {e}")),
                            }
                        }
                    }
                    (None, b"book-title") if in_title_info => {
                        doc.metadata.title = Some(text_buf.trim().to_string());
                    }
                    (None, b"lang") if in_title_info => {
                        doc.metadata.language = Some(text_buf.trim().to_string());
                    }
                    (None, b"first-name" | b"middle-name" | b"last-name" | b"nickname")
                        if in_title_info =>
                    {
                        if let Some(author) = authors.last_mut() {
                            let part = text_buf.trim();
                            if !part.is_empty() {
                                if !author.is_empty() {
                                    author.push(' ');
                                }
                                author.push_str(part);
                            }
                        }
                    }
                    (None, _) => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    authors.retain(|a| !a.is_empty());
    if !authors.is_empty() {
        doc.metadata.author = Some(authors.join(", "));
    }
    if doc.units.is_empty() {
        doc.warnings.push("No <body> content found".into());
    }
    Ok(doc)
}
