//! Format-neutral content model and its rendering into words and markup.
//!
//! Every adapter converts its native structure into [`ContentUnit`]s: a
//! list of blocks, each a list of inline runs carrying italic/bold flags.
//! [`render_unit`] is the only place that turns content into indexed words,
//! which keeps the word array and the preview markup in lockstep.

use crate::markup::{coalesce_word_spans, escape_html};
use crate::model::Word;
use crate::segment::{is_decorative_punctuation, merge_with_map, split_on_dashes};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TextStyle {
    pub italic: bool,
    pub bold: bool,
}

impl TextStyle {
    pub const PLAIN: TextStyle = TextStyle {
        italic: false,
        bold: false,
    };

    pub fn italic(self) -> Self {
        Self {
            italic: true,
            ..self
        }
    }

    pub fn bold(self) -> Self {
        Self { bold: true, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text { text: String, style: TextStyle },
    /// `src` is the adapter's resource key, resolved later through the
    /// section's resource map.
    Image { src: String, alt: String },
    LineBreak,
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Inline::Text {
            text: text.into(),
            style: TextStyle::PLAIN,
        }
    }

    pub fn styled(text: impl Into<String>, style: TextStyle) -> Self {
        Inline::Text {
            text: text.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    Quote,
    ListItem,
    Preformatted,
}

impl BlockKind {
    fn open_tag(self) -> String {
        match self {
            BlockKind::Paragraph => "<p>".into(),
            BlockKind::Heading(level) => format!("<h{}>", level.clamp(1, 6)),
            BlockKind::Quote => "<blockquote>".into(),
            BlockKind::ListItem => "<p class=\"list-item\">".into(),
            BlockKind::Preformatted => "<pre>".into(),
        }
    }

    fn close_tag(self) -> String {
        match self {
            BlockKind::Paragraph | BlockKind::ListItem => "</p>".into(),
            BlockKind::Heading(level) => format!("</h{}>", level.clamp(1, 6)),
            BlockKind::Quote => "</blockquote>".into(),
            BlockKind::Preformatted => "</pre>".into(),
        }
    }
}

/// A paragraph-level element. Each non-empty block starts a paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub inlines: Vec<Inline>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            inlines: Vec::new(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            inlines: vec![Inline::text(text)],
        }
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Heading(level),
            inlines: vec![Inline::text(text)],
        }
    }

    /// Concatenated text of all runs.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for inline in &self.inlines {
            match inline {
                Inline::Text { text, .. } => out.push_str(text),
                Inline::LineBreak => out.push(' '),
                Inline::Image { .. } => {}
            }
        }
        out
    }

    pub fn has_text(&self) -> bool {
        self.inlines.iter().any(|i| match i {
            Inline::Text { text, .. } => !text.trim().is_empty(),
            _ => false,
        })
    }
}

/// One structural unit: a spine item, a heading-delimited section, ...
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentUnit {
    pub title: Option<String>,
    pub href: String,
    pub blocks: Vec<Block>,
}

impl ContentUnit {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            title: None,
            href: href.into(),
            blocks: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Text of the first heading block, whitespace-normalised.
    pub fn first_heading(&self) -> Option<String> {
        self.blocks
            .iter()
            .find(|b| matches!(b.kind, BlockKind::Heading(_)) && b.has_text())
            .map(|b| b.plain_text().split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn has_text(&self) -> bool {
        self.blocks.iter().any(Block::has_text)
    }

    /// Image sources in document order.
    pub fn image_sources(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .flat_map(|b| b.inlines.iter())
            .filter_map(|i| match i {
                Inline::Image { src, .. } => Some(src.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// A unit rendered into words and markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedUnit {
    /// Words with formatting flags; paragraph and page indices are left for
    /// the builder.
    pub words: Vec<Word>,
    /// Paragraph starts relative to the unit's first word.
    pub paragraph_starts: Vec<usize>,
    pub markup: String,
    /// Smallest and largest index referenced by the markup.
    pub index_range: Option<(usize, usize)>,
}

/// A styled run inside a token.
#[derive(Debug, Clone)]
struct Fragment {
    text: String,
    style: TextStyle,
}

#[derive(Debug, Clone)]
enum Item {
    /// `glued` pieces come from splitting one whitespace-delimited token and
    /// are rendered without a separating space.
    Token {
        fragments: Vec<Fragment>,
        glued: bool,
        decorative: bool,
    },
    Image {
        src: String,
        alt: String,
    },
    Break,
}

fn push_char(fragments: &mut Vec<Fragment>, c: char, style: TextStyle) {
    match fragments.last_mut() {
        Some(last) if last.style == style => last.text.push(c),
        _ => fragments.push(Fragment {
            text: c.to_string(),
            style,
        }),
    }
}

/// Split a token's fragments into pieces with the given character counts.
fn split_fragments(fragments: Vec<Fragment>, counts: &[usize]) -> Vec<Vec<Fragment>> {
    let mut chars = fragments.into_iter().flat_map(|f| {
        let style = f.style;
        f.text.chars().map(|c| (c, style)).collect::<Vec<_>>()
    });
    let mut pieces = Vec::with_capacity(counts.len());
    for &count in counts {
        let mut piece = Vec::new();
        for (c, style) in chars.by_ref().take(count) {
            push_char(&mut piece, c, style);
        }
        pieces.push(piece);
    }
    pieces
}

fn flush_token(items: &mut Vec<Item>, fragments: &mut Vec<Fragment>) {
    if fragments.is_empty() {
        return;
    }
    let fragments = std::mem::take(fragments);
    let text: String = fragments.iter().map(|f| f.text.as_str()).collect();
    let pieces = split_on_dashes(&text);
    let counts: Vec<usize> = pieces.iter().map(|p| p.chars().count()).collect();
    for (i, (piece, frags)) in pieces
        .iter()
        .zip(split_fragments(fragments, &counts))
        .enumerate()
    {
        items.push(Item::Token {
            fragments: frags,
            glued: i > 0,
            decorative: is_decorative_punctuation(piece),
        });
    }
}

fn tokenize_block(block: &Block) -> Vec<Item> {
    let mut items = Vec::new();
    let mut current: Vec<Fragment> = Vec::new();

    for inline in &block.inlines {
        match inline {
            Inline::Text { text, style } => {
                for c in text.chars() {
                    if c.is_whitespace() {
                        flush_token(&mut items, &mut current);
                    } else {
                        push_char(&mut current, c, *style);
                    }
                }
            }
            Inline::Image { src, alt } => {
                flush_token(&mut items, &mut current);
                items.push(Item::Image {
                    src: src.clone(),
                    alt: alt.clone(),
                });
            }
            Inline::LineBreak => {
                flush_token(&mut items, &mut current);
                items.push(Item::Break);
            }
        }
    }
    flush_token(&mut items, &mut current);
    items
}

fn render_fragments(out: &mut String, fragments: &[Fragment]) {
    for f in fragments {
        let text = escape_html(&f.text);
        match (f.style.bold, f.style.italic) {
            (true, true) => {
                out.push_str("<strong><em>");
                out.push_str(&text);
                out.push_str("</em></strong>");
            }
            (true, false) => {
                out.push_str("<strong>");
                out.push_str(&text);
                out.push_str("</strong>");
            }
            (false, true) => {
                out.push_str("<em>");
                out.push_str(&text);
                out.push_str("</em>");
            }
            (false, false) => out.push_str(&text),
        }
    }
}

/// Render one unit whose first word will sit at global index `base`.
///
/// Tokens are merged for orphaned punctuation within the unit, so several
/// spans may share an index; adjacent ones are coalesced. Images take the
/// index of the nearest preceding word, falling back to the last word of
/// the previous unit (`base - 1`), or 0 at the very start of a document.
pub fn render_unit(unit: &ContentUnit, base: usize) -> RenderedUnit {
    let blocks: Vec<(BlockKind, Vec<Item>)> = unit
        .blocks
        .iter()
        .map(|b| (b.kind, tokenize_block(b)))
        .collect();

    // Old (pre-merge) token numbering across the whole unit.
    let mut tokens: Vec<String> = Vec::new();
    let mut styles: Vec<Vec<Fragment>> = Vec::new();
    let mut block_first: Vec<usize> = Vec::new();
    for (_, items) in &blocks {
        let first = tokens.len();
        for item in items {
            if let Item::Token {
                fragments,
                decorative: false,
                ..
            } = item
            {
                tokens.push(fragments.iter().map(|f| f.text.as_str()).collect());
                styles.push(fragments.clone());
            }
        }
        if tokens.len() > first {
            block_first.push(first);
        }
    }

    let (merged, map) = merge_with_map(&tokens);

    let words: Vec<Word> = merged
        .into_iter()
        .enumerate()
        .map(|(new, text)| {
            let anchor = &styles[map.anchor(new)];
            Word {
                text,
                paragraph_index: 0,
                page_index: 0,
                italic: !anchor.is_empty() && anchor.iter().all(|f| f.style.italic),
                bold: !anchor.is_empty() && anchor.iter().all(|f| f.style.bold),
            }
        })
        .collect();

    let paragraph_starts = map.boundaries(&block_first);

    let fallback = base.saturating_sub(1);
    let mut last_index: Option<usize> = None;
    let mut old = 0usize;
    let mut markup = String::new();
    let mut lo = usize::MAX;
    let mut hi = 0usize;
    let mut note = |i: usize| {
        lo = lo.min(i);
        hi = hi.max(i);
    };

    for (kind, items) in &blocks {
        if items.is_empty() {
            continue;
        }
        markup.push_str(&kind.open_tag());
        let mut first = true;
        for item in items {
            match item {
                Item::Token {
                    fragments,
                    glued,
                    decorative,
                } => {
                    if !first && !glued {
                        markup.push(' ');
                    }
                    if *decorative {
                        render_fragments(&mut markup, fragments);
                    } else {
                        let index = base + map.index(old);
                        old += 1;
                        last_index = Some(index);
                        note(index);
                        markup.push_str(&format!("<span data-word-index=\"{index}\">"));
                        render_fragments(&mut markup, fragments);
                        markup.push_str("</span>");
                    }
                }
                Item::Image { src, alt } => {
                    if !first {
                        markup.push(' ');
                    }
                    let index = last_index.unwrap_or(fallback);
                    note(index);
                    markup.push_str(&format!(
                        "<img data-word-index=\"{index}\" data-src=\"{}\" alt=\"{}\"/>",
                        escape_html(src),
                        escape_html(alt)
                    ));
                }
                Item::Break => markup.push_str("<br/>"),
            }
            first = false;
        }
        markup.push_str(&kind.close_tag());
        markup.push('\n');
    }

    RenderedUnit {
        words,
        paragraph_starts,
        markup: coalesce_word_spans(&markup),
        index_range: (lo <= hi).then_some((lo, hi)),
    }
}
