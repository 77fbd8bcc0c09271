//! Rewriting of annotated preview markup.
//!
//! Preview markup is produced by [`render_unit`](crate::content::render_unit)
//! in a fixed shape: every indexed token is a
//! `<span data-word-index="N">…</span>` and every image is an
//! `<img data-word-index="N" …/>`. The functions here operate on that
//! shape with plain byte scanning, so they never reparse the document.

use memchr::memmem;

const INDEX_ATTR: &[u8] = b"data-word-index=\"";
const SPAN_CLOSE: &[u8] = b"</span>";
const SPAN_OPEN: &[u8] = b"<span data-word-index=\"";

/// Escape text for element content and double-quoted attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Parse the decimal digits at the start of `data`, returning the value and
/// the number of bytes consumed.
fn parse_index(data: &[u8]) -> Option<(usize, usize)> {
    let len = data.iter().take_while(|b| b.is_ascii_digit()).count();
    if len == 0 {
        return None;
    }
    let value = std::str::from_utf8(&data[..len]).ok()?.parse().ok()?;
    Some((value, len))
}

/// Replace every `data-word-index` value with `f(value)`.
pub fn remap_word_indices(markup: &str, mut f: impl FnMut(usize) -> usize) -> String {
    let bytes = markup.as_bytes();
    let mut output = String::with_capacity(markup.len());
    let mut pos = 0;

    let finder = memmem::Finder::new(INDEX_ATTR);

    while let Some(rel_start) = finder.find(&bytes[pos..]) {
        let value_start = pos + rel_start + INDEX_ATTR.len();
        output.push_str(&markup[pos..value_start]);

        match parse_index(&bytes[value_start..]) {
            Some((old, len)) => {
                output.push_str(&f(old).to_string());
                pos = value_start + len;
            }
            None => pos = value_start,
        }
    }

    output.push_str(&markup[pos..]);
    output
}

/// All `data-word-index` values in document order.
pub fn collect_word_indices(markup: &str) -> Vec<usize> {
    let bytes = markup.as_bytes();
    memmem::find_iter(bytes, INDEX_ATTR)
        .filter_map(|at| parse_index(&bytes[at + INDEX_ATTR.len()..]).map(|(v, _)| v))
        .collect()
}

/// Index of the span whose opening tag ends just before `end`, searching
/// backwards from the `</span>` at `end`.
fn open_span_index(bytes: &[u8], end: usize) -> Option<usize> {
    let open = memmem::rfind(&bytes[..end], SPAN_OPEN)?;
    // The opening tag must belong to this span, not an enclosing one.
    if memmem::find(&bytes[open + SPAN_OPEN.len()..end], b"<span").is_some() {
        return None;
    }
    parse_index(&bytes[open + SPAN_OPEN.len()..]).map(|(v, _)| v)
}

/// One coalescing step over the whole string. Returns `None` when nothing
/// changed.
fn coalesce_once(markup: &str) -> Option<String> {
    let bytes = markup.as_bytes();
    let mut output = String::with_capacity(markup.len());
    let mut pos = 0;
    let mut changed = false;

    let finder = memmem::Finder::new(SPAN_CLOSE);
    let mut search = 0;

    while let Some(rel) = finder.find(&bytes[search..]) {
        let close = search + rel;
        let after_close = close + SPAN_CLOSE.len();
        search = after_close;

        let ws = bytes[after_close..]
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        let next = after_close + ws;
        if !bytes[next..].starts_with(SPAN_OPEN) {
            continue;
        }
        let Some((next_index, len)) = parse_index(&bytes[next + SPAN_OPEN.len()..]) else {
            continue;
        };
        let tag_end = next + SPAN_OPEN.len() + len;
        if !bytes[tag_end..].starts_with(b"\">") {
            continue;
        }
        if open_span_index(bytes, close) != Some(next_index) {
            continue;
        }

        // Drop `</span>` and the following opening tag, keep the whitespace.
        output.push_str(&markup[pos..close]);
        output.push_str(&markup[after_close..next]);
        pos = tag_end + 2;
        search = pos;
        changed = true;
    }

    if !changed {
        return None;
    }
    output.push_str(&markup[pos..]);
    Some(output)
}

/// Merge adjacent word spans that carry the same index, repeating until
/// nothing changes.
///
/// ```
/// use wordstream::markup::coalesce_word_spans;
///
/// let html = r#"<span data-word-index="3">word</span><span data-word-index="3">,</span>"#;
/// assert_eq!(coalesce_word_spans(html), r#"<span data-word-index="3">word,</span>"#);
/// ```
pub fn coalesce_word_spans(markup: &str) -> String {
    let mut current = markup.to_string();
    while let Some(next) = coalesce_once(&current) {
        current = next;
    }
    current
}
