//! Plain text: blank-line paragraphs and heading-delimited chapters.

use std::collections::BTreeMap;

use super::{FormatAdapter, finish_book};
use crate::builder::DocumentBuilder;
use crate::content::{Block, ContentUnit};
use crate::error::Result;
use crate::model::{Metadata, ParsedBook};
use crate::options::ParseOptions;
use crate::util::{decode_text, strip_bom};

/// Bytes inspected by [`TextAdapter::sniff`].
const SNIFF_LEN: usize = 4096;

pub struct TextAdapter;

impl FormatAdapter for TextAdapter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "text"]
    }

    /// Valid UTF-8 without control bytes other than whitespace.
    fn sniff(&self, data: &[u8]) -> bool {
        let prefix = &data[..data.len().min(SNIFF_LEN)];
        let valid = match std::str::from_utf8(prefix) {
            Ok(_) => true,
            // A multi-byte character cut by the prefix is fine.
            Err(e) => e.error_len().is_none(),
        };
        valid
            && !prefix.is_empty()
            && prefix
                .iter()
                .all(|&b| b >= 0x20 || matches!(b, b'\n' | b'\r' | b'\t' | 0x0C))
    }

    fn parse(&self, data: &[u8], source_name: &str, options: &ParseOptions) -> Result<ParsedBook> {
        let text = decode_text(data, None);
        let paragraphs = split_paragraphs(&text);
        log::debug!("{source_name}: {} text paragraph(s)", paragraphs.len());

        let mut builder = DocumentBuilder::new(options);
        for unit in group_chapters(paragraphs, source_name) {
            builder.add_unit(&unit, true, BTreeMap::new());
        }
        Ok(finish_book(builder, self.name(), Metadata::default(), source_name))
    }
}

/// Paragraphs separated by blank lines, lines inside a paragraph joined by
/// a space. Text without any blank line is read one paragraph per line.
pub(crate) fn split_paragraphs(text: &str) -> Vec<String> {
    let text = strip_bom(text);
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());
    let has_blank_separator = match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].iter().any(|l| l.is_empty()),
        _ => false,
    };

    if !has_blank_separator {
        return lines
            .into_iter()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
    }

    lines
        .split(|l| l.is_empty())
        .filter(|group| !group.is_empty())
        .map(|group| group.join(" "))
        .collect()
}

/// Number words accepted after `Chapter`, `Part` and `Book`.
const NUMBER_WORDS: &[&str] = &[
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen",
    "twenty", "first", "second", "third", "last",
];

fn is_roman_numeral(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| matches!(c.to_ascii_uppercase(), 'I' | 'V' | 'X' | 'L' | 'C' | 'D' | 'M'))
}

/// Short single-line paragraphs such as `Chapter 12`, `PART IV`,
/// `Chapter One: The Road` or `Epilogue`.
pub(crate) fn is_chapter_heading(paragraph: &str) -> bool {
    if paragraph.chars().count() > 60 {
        return false;
    }
    let mut words = paragraph.split_whitespace();
    let Some(first) = words.next() else {
        return false;
    };
    let first = first
        .trim_end_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();

    match first.as_str() {
        "prologue" | "epilogue" | "preface" | "foreword" | "afterword" | "introduction"
        | "interlude" => paragraph.split_whitespace().count() <= 6,
        "chapter" | "part" | "book" => {
            let Some(second) = words.next() else {
                return false;
            };
            let number = second.trim_end_matches(|c: char| !c.is_alphanumeric());
            let numeric = !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
            let is_number = numeric
                || is_roman_numeral(number)
                || NUMBER_WORDS.contains(&number.to_lowercase().as_str());
            // Anything after the number must be set off as a subtitle.
            let subtitled = match words.next() {
                None => true,
                Some(third) => {
                    second.ends_with([':', '.', '\u{2014}', '\u{2013}'])
                        || matches!(third, "-" | ":" | "\u{2014}" | "\u{2013}")
                }
            };
            is_number && subtitled
        }
        _ => false,
    }
}

/// Group paragraphs into chapter units at detected headings. Without any
/// heading the whole text is one unit named after the file.
pub(crate) fn group_chapters(paragraphs: Vec<String>, source_name: &str) -> Vec<ContentUnit> {
    let mut units = Vec::new();
    let mut current = ContentUnit::new(source_name);

    for paragraph in paragraphs {
        if is_chapter_heading(&paragraph) {
            if !current.blocks.is_empty() {
                units.push(current);
            }
            current = ContentUnit::new(format!("{source_name}#{}", units.len() + 1))
                .with_title(paragraph.clone());
            current.blocks.push(Block::heading(2, paragraph));
        } else {
            current.blocks.push(Block::paragraph(paragraph));
        }
    }
    if !current.blocks.is_empty() {
        units.push(current);
    }
    units
}
