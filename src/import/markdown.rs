//! Markdown documents (CommonMark subset).
//!
//! Block structure is read line by line: ATX and setext headings, fenced
//! code, block quotes, list items, thematic breaks and paragraphs. Inline
//! parsing handles emphasis, code spans, links, images, backslash escapes
//! and hard line breaks. Nested containers are flattened.

use super::html::inline_resources;
use super::{FormatAdapter, finish_book, split_at_headings};
use crate::builder::DocumentBuilder;
use crate::content::{Block, BlockKind, Inline, TextStyle};
use crate::error::Result;
use crate::model::{Metadata, ParsedBook};
use crate::options::ParseOptions;
use crate::util::decode_text;

pub struct MarkdownAdapter;

impl FormatAdapter for MarkdownAdapter {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "markdown", "mkd"]
    }

    fn parse(&self, data: &[u8], source_name: &str, options: &ParseOptions) -> Result<ParsedBook> {
        let text = decode_text(data, None);
        let blocks = parse_blocks(&text);

        let metadata = Metadata {
            title: blocks
                .iter()
                .find(|b| b.kind == BlockKind::Heading(1) && b.has_text())
                .map(|b| b.plain_text().trim().to_string()),
            ..Metadata::default()
        };

        let (units, _) = split_at_headings(blocks, source_name);
        let mut builder = DocumentBuilder::new(options);
        for unit in &units {
            let resources = inline_resources(&mut builder, unit);
            builder.add_unit(unit, true, resources);
        }
        Ok(finish_book(builder, self.name(), metadata, source_name))
    }
}

// ----------------------------------------------------------------------------
// Blocks
// ----------------------------------------------------------------------------

/// A block whose lines are still being collected.
struct Pending {
    kind: BlockKind,
    lines: Vec<String>,
}

struct Fence {
    marker: char,
    len: usize,
    lines: Vec<String>,
}

fn fence_open(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| matches!(c, '`' | '~'))?;
    let len = trimmed.chars().take_while(|&c| c == marker).count();
    (len >= 3).then_some((marker, len))
}

fn is_thematic_break(line: &str) -> bool {
    let compact: Vec<char> = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && matches!(compact[0], '-' | '*' | '_')
        && compact.iter().all(|&c| c == compact[0])
}

fn atx_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim_end();
    Some((level as u8, text))
}

/// Text after a list marker (`- `, `* `, `+ `, `1. `, `1) `).
fn list_item(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return Some(rest);
        }
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if (1..=9).contains(&digits) {
        let rest = &trimmed[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest);
        }
    }
    None
}

fn scene_break() -> Block {
    Block::paragraph("* * *")
}

/// Parse a whole document into blocks.
pub(crate) fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut pending: Option<Pending> = None;
    let mut fence: Option<Fence> = None;

    let flush = |pending: &mut Option<Pending>, blocks: &mut Vec<Block>| {
        if let Some(p) = pending.take() {
            let block = Block {
                kind: p.kind,
                inlines: parse_inlines(&join_lines(&p.lines)),
            };
            if block.has_text() || !block.inlines.is_empty() {
                blocks.push(block);
            }
        }
    };

    for line in text.lines() {
        if let Some(open) = fence.as_mut() {
            let trimmed = line.trim();
            let closes = trimmed.chars().all(|c| c == open.marker)
                && trimmed.chars().count() >= open.len;
            if closes {
                if let Some(done) = fence.take() {
                    blocks.push(preformatted(&done.lines));
                }
            } else {
                open.lines.push(line.to_string());
            }
            continue;
        }

        if line.trim().is_empty() {
            flush(&mut pending, &mut blocks);
            continue;
        }

        if let Some((marker, len)) = fence_open(line) {
            flush(&mut pending, &mut blocks);
            fence = Some(Fence {
                marker,
                len,
                lines: Vec::new(),
            });
            continue;
        }

        // Setext underline turns the pending paragraph into a heading.
        let underline = line.trim();
        if let Some(p) = pending.as_mut()
            && p.kind == BlockKind::Paragraph
        {
            let level = if underline.chars().all(|c| c == '=') {
                Some(1)
            } else if underline.len() >= 2 && underline.chars().all(|c| c == '-') {
                Some(2)
            } else {
                None
            };
            if let Some(level) = level {
                p.kind = BlockKind::Heading(level);
                flush(&mut pending, &mut blocks);
                continue;
            }
        }

        if let Some((level, heading)) = atx_heading(line) {
            flush(&mut pending, &mut blocks);
            blocks.push(Block {
                kind: BlockKind::Heading(level),
                inlines: parse_inlines(heading),
            });
            continue;
        }

        if is_thematic_break(line) {
            flush(&mut pending, &mut blocks);
            blocks.push(scene_break());
            continue;
        }

        if let Some(quoted) = line.trim_start().strip_prefix('>') {
            let quoted = quoted.strip_prefix(' ').unwrap_or(quoted);
            if pending.as_ref().is_none_or(|p| p.kind != BlockKind::Quote) {
                flush(&mut pending, &mut blocks);
            }
            if quoted.trim().is_empty() {
                flush(&mut pending, &mut blocks);
            } else {
                pending
                    .get_or_insert_with(|| Pending {
                        kind: BlockKind::Quote,
                        lines: Vec::new(),
                    })
                    .lines
                    .push(quoted.to_string());
            }
            continue;
        }

        if let Some(item) = list_item(line) {
            flush(&mut pending, &mut blocks);
            pending = Some(Pending {
                kind: BlockKind::ListItem,
                lines: vec![item.to_string()],
            });
            continue;
        }

        // Continuation lines, including lazy ones, join the open block.
        match pending.as_mut() {
            Some(p) => p.lines.push(line.trim_start().to_string()),
            None => {
                pending = Some(Pending {
                    kind: BlockKind::Paragraph,
                    lines: vec![line.trim_start().to_string()],
                })
            }
        }
    }

    flush(&mut pending, &mut blocks);
    if let Some(open) = fence {
        blocks.push(preformatted(&open.lines));
    }
    blocks
}

fn preformatted(lines: &[String]) -> Block {
    let mut block = Block::new(BlockKind::Preformatted);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            block.inlines.push(Inline::LineBreak);
        }
        if !line.is_empty() {
            block.inlines.push(Inline::text(line.clone()));
        }
    }
    block
}

/// Join paragraph lines; a hard break (two trailing spaces or a trailing
/// backslash) becomes `\n`, anything else a space.
fn join_lines(lines: &[String]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let last = i + 1 == lines.len();
        let hard = !last && (line.ends_with("  ") || line.ends_with('\\'));
        let content = line.trim_end();
        let content = if hard {
            content.strip_suffix('\\').unwrap_or(content)
        } else {
            content
        };
        out.push_str(content);
        if !last {
            out.push(if hard { '\n' } else { ' ' });
        }
    }
    out
}

// ----------------------------------------------------------------------------
// Inlines
// ----------------------------------------------------------------------------

fn run_length(chars: &[char], start: usize, c: char) -> usize {
    chars[start..].iter().take_while(|&&x| x == c).count()
}

/// Position of the next run of exactly `len` copies of `c` at or after
/// `from`.
fn find_run(chars: &[char], from: usize, c: char, len: usize) -> Option<usize> {
    let mut i = from;
    while i < chars.len() {
        if chars[i] == c {
            let run = run_length(chars, i, c);
            if run == len {
                return Some(i);
            }
            i += run;
        } else {
            i += 1;
        }
    }
    None
}

/// `[label](destination "title")` starting at `open`. Returns the label,
/// the destination and the index after the closing parenthesis.
fn parse_link(chars: &[char], open: usize) -> Option<(String, String, usize)> {
    let mut depth = 0usize;
    let mut close = None;
    for (i, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close?;
    if chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut end = None;
    for (i, &c) in chars.iter().enumerate().skip(close + 1) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let end = end?;
    let label: String = chars[open + 1..close].iter().collect();
    let inner: String = chars[close + 2..end].iter().collect();
    let inner = inner.trim();
    let destination = match inner.strip_prefix('<') {
        Some(rest) => rest.split('>').next().unwrap_or(rest),
        None => inner.split_whitespace().next().unwrap_or(""),
    };
    Some((label, destination.to_string(), end + 1))
}

fn flush_text(out: &mut Vec<Inline>, buf: &mut String, style: TextStyle) {
    if !buf.is_empty() {
        out.push(Inline::styled(std::mem::take(buf), style));
    }
}

/// Parse inline markup into styled runs.
pub(crate) fn parse_inlines(text: &str) -> Vec<Inline> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut style = TextStyle::PLAIN;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if chars.get(i + 1).is_some_and(char::is_ascii_punctuation) => {
                buf.push(chars[i + 1]);
                i += 2;
            }
            '\n' => {
                flush_text(&mut out, &mut buf, style);
                out.push(Inline::LineBreak);
                i += 1;
            }
            '`' => {
                let run = run_length(&chars, i, '`');
                match find_run(&chars, i + run, '`', run) {
                    Some(end) => {
                        buf.extend(&chars[i + run..end]);
                        i = end + run;
                    }
                    None => {
                        buf.extend(&chars[i..i + run]);
                        i += run;
                    }
                }
            }
            '!' if chars.get(i + 1) == Some(&'[') => match parse_link(&chars, i + 1) {
                Some((alt, src, next)) => {
                    flush_text(&mut out, &mut buf, style);
                    out.push(Inline::Image { src, alt });
                    i = next;
                }
                None => {
                    buf.push('!');
                    i += 1;
                }
            },
            '[' => match parse_link(&chars, i) {
                Some((label, _, next)) => {
                    flush_text(&mut out, &mut buf, style);
                    for inline in parse_inlines(&label) {
                        out.push(match inline {
                            Inline::Text { text, style: inner } => Inline::styled(
                                text,
                                TextStyle {
                                    italic: inner.italic || style.italic,
                                    bold: inner.bold || style.bold,
                                },
                            ),
                            other => other,
                        });
                    }
                    i = next;
                }
                None => {
                    buf.push('[');
                    i += 1;
                }
            },
            '*' | '_' => {
                let run = run_length(&chars, i, c);
                let used = run.min(3);
                let prev = i.checked_sub(1).map(|p| chars[p]);
                let next = chars.get(i + run).copied();
                let intraword = c == '_'
                    && prev.is_some_and(char::is_alphanumeric)
                    && next.is_some_and(char::is_alphanumeric);

                let bold = used >= 2;
                let italic = used != 2;
                let active = (!bold || style.bold) && (!italic || style.italic);
                let can_close = active && prev.is_some_and(|p| !p.is_whitespace());
                let can_open = next.is_some_and(|n| !n.is_whitespace())
                    && find_run(&chars, i + run, c, run).is_some();

                if intraword {
                    buf.extend(&chars[i..i + run]);
                } else if can_close {
                    flush_text(&mut out, &mut buf, style);
                    style.bold &= !bold;
                    style.italic &= !italic;
                } else if can_open {
                    flush_text(&mut out, &mut buf, style);
                    style.bold |= bold;
                    style.italic |= italic;
                } else {
                    buf.extend(&chars[i..i + run]);
                }
                i += run;
            }
            _ => {
                buf.push(c);
                i += 1;
            }
        }
    }
    flush_text(&mut out, &mut buf, style);
    out
}
