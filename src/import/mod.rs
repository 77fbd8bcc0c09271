//! Format adapters: native structure in, [`ParsedBook`] out.
//!
//! Each adapter locates the structural units of its format, converts them
//! into [`ContentUnit`]s and feeds them to a [`DocumentBuilder`]. Adapter
//! selection is explicit through an [`AdapterRegistry`]: extension first,
//! then content signature.

mod epub;
mod fb2;
mod html;
mod markdown;
mod mobi;
mod text;

pub use epub::EpubAdapter;
pub use fb2::Fb2Adapter;
pub use html::HtmlAdapter;
pub use markdown::MarkdownAdapter;
pub use mobi::MobiAdapter;
pub use text::TextAdapter;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::builder::DocumentBuilder;
use crate::content::{Block, BlockKind, ContentUnit};
use crate::error::{Error, Result};
use crate::model::{Metadata, ParsedBook};
use crate::options::ParseOptions;
use crate::util::{extension, file_stem};

/// A parser for one family of input formats.
///
/// Implementations hold no per-file state, so one registry can serve many
/// threads at once.
pub trait FormatAdapter: Send + Sync {
    /// Short identifier, also stored as [`ParsedBook::format`].
    fn name(&self) -> &'static str;

    /// Lower-case file extensions this adapter claims.
    fn extensions(&self) -> &'static [&'static str];

    /// Whether the bytes look like this format. Used when no extension
    /// matches.
    fn sniff(&self, _data: &[u8]) -> bool {
        false
    }

    /// Parse a whole file. The result has provisional page boundaries;
    /// [`reconcile`](crate::reconcile::reconcile) finalizes them.
    fn parse(&self, data: &[u8], source_name: &str, options: &ParseOptions) -> Result<ParsedBook>;
}

/// Ordered set of adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn FormatAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in adapter. Plain text is registered last so that its
    /// permissive signature check only applies when nothing else matches.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(EpubAdapter);
        registry.register(MobiAdapter);
        registry.register(Fb2Adapter);
        registry.register(HtmlAdapter);
        registry.register(MarkdownAdapter);
        registry.register(TextAdapter);
        registry
    }

    pub fn register(&mut self, adapter: impl FormatAdapter + 'static) {
        self.adapters.push(Box::new(adapter));
    }

    pub fn adapters(&self) -> impl Iterator<Item = &dyn FormatAdapter> {
        self.adapters.iter().map(|a| a.as_ref())
    }

    /// Pick the adapter for a file.
    pub fn select(&self, filename: &str, data: &[u8]) -> Result<&dyn FormatAdapter> {
        if let Some(ext) = extension(filename)
            && let Some(adapter) = self
                .adapters()
                .find(|a| a.extensions().contains(&ext.as_str()))
        {
            log::debug!("{filename}: selected {} by extension", adapter.name());
            return Ok(adapter);
        }

        if let Some(adapter) = self.adapters().find(|a| a.sniff(data)) {
            log::debug!("{filename}: selected {} by signature", adapter.name());
            return Ok(adapter);
        }

        Err(Error::UnsupportedFormat(match extension(filename) {
            Some(ext) => format!("no adapter for .{ext} files"),
            None => format!("cannot identify {filename}"),
        }))
    }
}

// ----------------------------------------------------------------------------
// Shared adapter helpers
// ----------------------------------------------------------------------------

/// Finish a book, falling back to the file stem for a missing title.
pub(crate) fn finish_book(
    builder: DocumentBuilder,
    format: &str,
    mut metadata: Metadata,
    source_name: &str,
) -> ParsedBook {
    if metadata.title.as_deref().is_none_or(|t| t.trim().is_empty()) {
        let stem = file_stem(source_name);
        metadata.title = (!stem.is_empty()).then(|| stem.to_string());
    }
    builder.finish(format, metadata)
}

/// Split a flat block list into units at each level-1 or level-2 heading.
///
/// Blocks before the first heading form their own untitled unit. Returns
/// the units and whether any heading split happened.
pub(crate) fn split_at_headings(blocks: Vec<Block>, href: &str) -> (Vec<ContentUnit>, bool) {
    let mut units = Vec::new();
    let mut current = ContentUnit::new(href);
    let mut split = false;

    for block in blocks {
        let major = matches!(block.kind, BlockKind::Heading(1 | 2)) && block.has_text();
        if major && !current.blocks.is_empty() {
            units.push(std::mem::replace(&mut current, ContentUnit::new(href)));
        }
        if major {
            split = true;
        }
        current.blocks.push(block);
    }
    if !current.blocks.is_empty() {
        units.push(current);
    }
    (units, split)
}

/// Decode a `data:` URI into its media type and payload.
pub(crate) fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let media_type = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("text/plain")
        .to_string();
    let data = if header.ends_with(";base64") {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD.decode(compact).ok()?
    } else {
        percent_encoding::percent_decode_str(payload).collect()
    };
    Some((media_type, data))
}
