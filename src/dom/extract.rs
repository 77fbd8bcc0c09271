//! Walk a parsed HTML tree into the block/inline content model.

use super::arena::{Dom, NodeData, NodeId};
use crate::content::{Block, BlockKind, Inline, TextStyle};

/// Marker emitted for `<hr>`; rendered but never indexed.
const SCENE_BREAK: &str = "* * *";

/// Extract the blocks under `<body>` (or the whole document when the
/// parser produced no body).
pub fn extract_blocks(dom: &Dom) -> Vec<Block> {
    let root = dom.find_element("body").unwrap_or(dom.root());
    let mut extractor = Extractor {
        dom,
        blocks: Vec::new(),
        current: None,
        context: Vec::new(),
    };
    extractor.walk(root, TextStyle::PLAIN);
    extractor.flush();
    extractor.blocks
}

/// Whitespace-normalised `<title>` text, if present and non-empty.
pub fn document_title(dom: &Dom) -> Option<String> {
    let title = dom.find_element("title")?;
    let text = dom
        .text_of(title)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// Image reference of an `<img>` or SVG `<image>` element.
///
/// MOBI `recindex` attributes become `recindex:NNNNN` keys.
fn image_source(dom: &Dom, id: NodeId) -> Option<String> {
    ["src", "href", "xlink:href"]
        .iter()
        .find_map(|attr| dom.attr(id, attr))
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            dom.attr(id, "recindex")
                .and_then(|r| r.trim().parse::<usize>().ok())
                .map(|r| format!("recindex:{r:05}"))
        })
}

enum Tag {
    Skip,
    Container,
    Leaf(BlockKind),
    Quote,
    Break,
    Rule,
    Image,
    Inline(fn(TextStyle) -> TextStyle),
}

fn classify(name: &str) -> Tag {
    match name {
        "head" | "script" | "style" | "title" | "noscript" | "template" | "svg:title" => Tag::Skip,
        "p" | "dt" | "dd" | "figcaption" | "caption" | "td" | "th" | "summary" => {
            Tag::Leaf(BlockKind::Paragraph)
        }
        "h1" => Tag::Leaf(BlockKind::Heading(1)),
        "h2" => Tag::Leaf(BlockKind::Heading(2)),
        "h3" => Tag::Leaf(BlockKind::Heading(3)),
        "h4" => Tag::Leaf(BlockKind::Heading(4)),
        "h5" => Tag::Leaf(BlockKind::Heading(5)),
        "h6" => Tag::Leaf(BlockKind::Heading(6)),
        "li" => Tag::Leaf(BlockKind::ListItem),
        "pre" => Tag::Leaf(BlockKind::Preformatted),
        "blockquote" => Tag::Quote,
        "div" | "section" | "article" | "body" | "html" | "main" | "header" | "footer"
        | "aside" | "nav" | "figure" | "ul" | "ol" | "dl" | "table" | "thead" | "tbody"
        | "tfoot" | "tr" | "details" | "address" | "center" => Tag::Container,
        "br" => Tag::Break,
        "hr" => Tag::Rule,
        "img" | "image" => Tag::Image,
        "em" | "i" | "cite" | "dfn" | "var" => Tag::Inline(TextStyle::italic),
        "strong" | "b" => Tag::Inline(TextStyle::bold),
        _ => Tag::Inline(|s| s),
    }
}

struct Extractor<'a> {
    dom: &'a Dom,
    blocks: Vec<Block>,
    current: Option<Block>,
    /// Enclosing quote/list contexts; paragraphs inside take their kind.
    context: Vec<BlockKind>,
}

impl Extractor<'_> {
    fn context_kind(&self) -> BlockKind {
        self.context.last().copied().unwrap_or(BlockKind::Paragraph)
    }

    fn flush(&mut self) {
        if let Some(block) = self.current.take() {
            let has_content = block.has_text()
                || block
                    .inlines
                    .iter()
                    .any(|i| matches!(i, Inline::Image { .. }));
            if has_content {
                self.blocks.push(block);
            }
        }
    }

    fn block(&mut self) -> &mut Block {
        let kind = self.context_kind();
        self.current.get_or_insert_with(|| Block::new(kind))
    }

    fn walk(&mut self, id: NodeId, style: TextStyle) {
        let children: Vec<_> = self.dom.children(id).collect();
        for child in children {
            self.visit(child, style);
        }
    }

    fn visit(&mut self, id: NodeId, style: TextStyle) {
        let dom = self.dom;
        match &dom.node(id).data {
            NodeData::Text(text) => self.text(text, style),
            NodeData::Element { name, .. } => {
                let tag = name.local.as_ref().to_ascii_lowercase();
                self.element(id, &tag, style);
            }
            NodeData::Document => self.walk(id, style),
            NodeData::Comment => {}
        }
    }

    fn text(&mut self, text: &str, style: TextStyle) {
        if self.current.is_none() && text.trim().is_empty() {
            return;
        }
        let preformatted = self.context_kind() == BlockKind::Preformatted;
        let block = self.block();
        if preformatted {
            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    block.inlines.push(Inline::LineBreak);
                }
                if !line.is_empty() {
                    block.inlines.push(Inline::styled(line, style));
                }
            }
        } else {
            block.inlines.push(Inline::styled(text, style));
        }
    }

    fn element(&mut self, id: NodeId, tag: &str, style: TextStyle) {
        match classify(tag) {
            Tag::Skip => {}
            Tag::Container => {
                self.flush();
                self.walk(id, style);
                self.flush();
            }
            Tag::Quote => {
                self.flush();
                self.context.push(BlockKind::Quote);
                self.walk(id, style);
                self.flush();
                self.context.pop();
            }
            Tag::Leaf(kind) => {
                self.flush();
                let kind = match (kind, self.context_kind()) {
                    (BlockKind::Paragraph, outer) => outer,
                    (kind, _) => kind,
                };
                self.context.push(kind);
                self.walk(id, style);
                self.flush();
                self.context.pop();
            }
            Tag::Break => {
                if let Some(block) = self.current.as_mut() {
                    block.inlines.push(Inline::LineBreak);
                }
            }
            Tag::Rule => {
                self.flush();
                self.blocks.push(Block::paragraph(SCENE_BREAK));
            }
            Tag::Image => {
                if let Some(src) = image_source(self.dom, id) {
                    let alt = self.dom.attr(id, "alt").unwrap_or_default().to_string();
                    self.block().inlines.push(Inline::Image { src, alt });
                }
            }
            Tag::Inline(apply) => self.walk(id, apply(style)),
        }
    }
}
