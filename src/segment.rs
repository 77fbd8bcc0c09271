//! Word segmentation shared by every format adapter.
//!
//! Raw text is split on whitespace, then each token goes through
//! [`split_on_dashes`], decorative glyphs are filtered with
//! [`is_decorative_punctuation`], and finally [`merge_orphaned_punctuation`]
//! reattaches stray brackets, quotes and terminal marks to their words.

/// Characters that end a token and stay attached to the text before them.
const DASH_MARKS: [char; 3] = ['\u{2014}', '\u{2013}', '\u{2026}'];

/// Opening brackets and quotes that belong to the following word.
const OPENING: &[char] = &[
    '(', '[', '{', '\u{201C}', '\u{2018}', '\u{00AB}', '\u{2039}', '\u{201E}', '\u{201A}',
    '\u{00BF}', '\u{00A1}',
];

/// Closing brackets, quotes and terminal punctuation that belong to the
/// preceding word.
const CLOSING: &[char] = &[
    ')', ']', '}', '\u{201D}', '\u{2019}', '\u{00BB}', '\u{203A}', '.', ',', ';', ':', '!', '?',
    '\u{2026}', '\u{2014}', '\u{2013}',
];

/// Straight quotes can open or close.
const AMBIGUOUS: &[char] = &['"', '\''];

/// Split a whitespace-free token on hyphen chains, dashes and ellipses.
///
/// Three or more hyphen-joined parts become one token per part, each but
/// the last keeping its hyphen, and are not split further. Two parts stay
/// joined. Otherwise em-dashes, en-dashes, `…` and runs of three or more
/// dots end a token and stay on the text before them.
///
/// ```
/// use wordstream::segment::split_on_dashes;
///
/// assert_eq!(split_on_dashes("forty-nine-year-old"), ["forty-", "nine-", "year-", "old"]);
/// assert_eq!(split_on_dashes("well-known"), ["well-known"]);
/// assert_eq!(split_on_dashes("consciousness\u{2014}seemed"), ["consciousness\u{2014}", "seemed"]);
/// ```
pub fn split_on_dashes(token: &str) -> Vec<String> {
    if token.is_empty() {
        return Vec::new();
    }

    let parts: Vec<&str> = token.split('-').collect();
    if parts.len() >= 3 && parts.iter().all(|p| !p.is_empty()) {
        let last = parts.len() - 1;
        let mut out = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            if i < last {
                out.push(format!("{part}-"));
            } else {
                out.push(part.to_string());
            }
        }
        return out;
    }

    split_on_marks(token)
}

fn split_on_marks(token: &str) -> Vec<String> {
    let chars: Vec<char> = token.chars().collect();
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_has_text = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        let mark_len = if DASH_MARKS.contains(&c) {
            1
        } else if c == '.' {
            let run = chars[i..].iter().take_while(|&&d| d == '.').count();
            if run < 3 {
                // One or two dots are ordinary text ("e.g", "end.").
                current.extend(&chars[i..i + run]);
                current_has_text = true;
                i += run;
                continue;
            }
            run
        } else {
            0
        };

        if mark_len == 0 {
            current.push(c);
            current_has_text = true;
            i += 1;
            continue;
        }

        let mark: String = chars[i..i + mark_len].iter().collect();
        i += mark_len;

        if current_has_text {
            current.push_str(&mark);
            out.push(std::mem::take(&mut current));
            current_has_text = false;
        } else if current.is_empty()
            && let Some(last) = out.last_mut()
        {
            last.push_str(&mark);
        } else {
            // Leading marks wait for the text that follows them.
            current.push_str(&mark);
        }
    }

    if !current.is_empty() {
        out.push(current);
    }

    out
}

/// Scene separators and rules: `***`, `---`, `___`, `....`, `~~~`.
///
/// These are still rendered in the preview markup, but never indexed.
pub fn is_decorative_punctuation(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    token.chars().all(|c| c == '*')
        || token.chars().all(|c| c == '-' || c == '_')
        || (token.chars().count() >= 4 && token.chars().all(|c| c == '.'))
        || token.chars().all(|c| c == '~')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PunctuationClass {
    Opening,
    Closing,
    Ambiguous,
    Word,
}

fn classify(token: &str) -> PunctuationClass {
    if token.is_empty() {
        return PunctuationClass::Word;
    }
    let mut any_open = false;
    let mut any_close = false;
    for c in token.chars() {
        if AMBIGUOUS.contains(&c) {
            continue;
        }
        let open = OPENING.contains(&c);
        let close = CLOSING.contains(&c);
        if !open && !close {
            return PunctuationClass::Word;
        }
        any_open |= open;
        any_close |= close;
    }
    match (any_open, any_close) {
        (true, false) => PunctuationClass::Opening,
        (false, true) => PunctuationClass::Closing,
        (false, false) => PunctuationClass::Ambiguous,
        (true, true) => PunctuationClass::Word,
    }
}

/// Index correspondence produced by [`merge_with_map`].
///
/// Every input token maps to exactly one output token, and every output
/// token covers a contiguous run of input tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeMap {
    old_to_new: Vec<usize>,
    /// First input token of each output token's run.
    starts: Vec<usize>,
    /// The input token carrying the word itself; punctuation-only runs use
    /// their first token.
    anchors: Vec<usize>,
}

impl MergeMap {
    /// Number of tokens before merging.
    pub fn old_len(&self) -> usize {
        self.old_to_new.len()
    }

    /// Number of tokens after merging.
    pub fn new_len(&self) -> usize {
        self.starts.len()
    }

    /// True when nothing was merged.
    pub fn is_identity(&self) -> bool {
        self.old_len() == self.new_len()
    }

    /// New index of input token `old`.
    ///
    /// Out-of-range indices clamp to the last output token.
    pub fn index(&self, old: usize) -> usize {
        match self.old_to_new.get(old) {
            Some(&new) => new,
            None => self.new_len().saturating_sub(1),
        }
    }

    /// Input range covered by output token `new`.
    pub fn source_range(&self, new: usize) -> std::ops::Range<usize> {
        let start = self.starts[new];
        let end = self
            .starts
            .get(new + 1)
            .copied()
            .unwrap_or(self.old_len());
        start..end
    }

    /// Input token that carries output token `new`'s word.
    pub fn anchor(&self, new: usize) -> usize {
        self.anchors[new]
    }

    /// Remap a boundary (the first token of a paragraph, page or chapter).
    ///
    /// If the token at `old` was glued onto a word that lies before the
    /// boundary, the boundary moves to the next output token; otherwise it
    /// stays on the token that now contains `old`.
    pub fn boundary(&self, old: usize) -> usize {
        if old >= self.old_len() {
            return self.new_len();
        }
        let new = self.old_to_new[old];
        if self.anchors[new] >= old {
            new
        } else {
            new + 1
        }
    }

    /// Remap a whole boundary table, dropping entries that collapse or fall
    /// off the end. The result is strictly increasing.
    pub fn boundaries(&self, table: &[usize]) -> Vec<usize> {
        let mut out: Vec<usize> = Vec::with_capacity(table.len());
        for &b in table {
            let nb = self.boundary(b);
            if nb >= self.new_len() {
                continue;
            }
            if out.last().is_none_or(|&last| nb > last) {
                out.push(nb);
            }
        }
        out
    }
}

/// Reattach orphaned punctuation and report how indices moved.
///
/// See [`merge_orphaned_punctuation`] for the rules.
pub fn merge_with_map<S: AsRef<str>>(tokens: &[S]) -> (Vec<String>, MergeMap) {
    let n = tokens.len();
    let mut out: Vec<String> = Vec::with_capacity(n);
    let mut starts: Vec<usize> = Vec::with_capacity(n);
    let mut anchors: Vec<usize> = Vec::with_capacity(n);
    let mut old_to_new = vec![0usize; n];

    // Opening punctuation waiting for its word.
    let mut pending = String::new();
    let mut pending_members: Vec<usize> = Vec::new();
    let mut standalone_quotes = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        let token = token.as_ref();
        let class = match classify(token) {
            PunctuationClass::Ambiguous => {
                standalone_quotes += 1;
                if standalone_quotes % 2 == 1 {
                    PunctuationClass::Opening
                } else {
                    PunctuationClass::Closing
                }
            }
            other => other,
        };

        match class {
            PunctuationClass::Opening => {
                pending.push_str(token);
                pending_members.push(i);
            }
            PunctuationClass::Closing if !pending_members.is_empty() => {
                pending.push_str(token);
                pending_members.push(i);
            }
            PunctuationClass::Closing if !out.is_empty() => {
                let last = out.len() - 1;
                out[last].push_str(token);
                old_to_new[i] = last;
            }
            PunctuationClass::Closing => {
                old_to_new[i] = out.len();
                starts.push(i);
                anchors.push(i);
                out.push(token.to_string());
            }
            PunctuationClass::Word | PunctuationClass::Ambiguous => {
                let new = out.len();
                let start = pending_members.first().copied().unwrap_or(i);
                for m in pending_members.drain(..) {
                    old_to_new[m] = new;
                }
                let mut text = std::mem::take(&mut pending);
                text.push_str(token);
                old_to_new[i] = new;
                starts.push(start);
                anchors.push(i);
                out.push(text);
            }
        }
    }

    if !pending_members.is_empty() {
        if let Some(last) = out.last_mut() {
            last.push_str(&pending);
            let target = out.len() - 1;
            for m in pending_members {
                old_to_new[m] = target;
            }
        } else {
            let start = pending_members[0];
            for m in pending_members {
                old_to_new[m] = 0;
            }
            starts.push(start);
            anchors.push(start);
            out.push(pending);
        }
    }

    (
        out,
        MergeMap {
            old_to_new,
            starts,
            anchors,
        },
    )
}

/// Glue punctuation-only tokens onto their words in one left-to-right pass.
///
/// Opening brackets and quotes prefix the next token; closing brackets,
/// quotes and terminal marks suffix the previous one. A lone straight quote
/// opens or closes depending on how many lone quotes came before it.
///
/// ```
/// use wordstream::segment::merge_orphaned_punctuation;
///
/// let merged = merge_orphaned_punctuation(&["(", "see", "above", ")", ","]);
/// assert_eq!(merged, ["(see", "above),"]);
/// ```
pub fn merge_orphaned_punctuation<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    merge_with_map(tokens).0
}

/// Tokenize free text: whitespace split, dash split, decorative glyphs
/// removed, punctuation merged.
pub fn segment_text(text: &str) -> Vec<String> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .flat_map(split_on_dashes)
        .filter(|t| !is_decorative_punctuation(t))
        .collect();
    merge_orphaned_punctuation(&tokens)
}
