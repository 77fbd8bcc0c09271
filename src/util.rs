//! Text decoding, media sniffing and path helpers shared by the adapters.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

// ============================================================================
// Text Decoding
// ============================================================================

/// Decode bytes to a string, handling various encodings gracefully.
///
/// 1. UTF-8 first (a BOM is handled by encoding_rs)
/// 2. If malformed, the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Windows-1252, common in old ebooks
///
/// ```ignore
/// assert_eq!(decode_text(b"caf\xc3\xa9", None), "caf\u{e9}");
/// assert_eq!(decode_text(b"caf\xe9", None), "caf\u{e9}");
/// ```
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Decode an XML document, honouring its declared encoding.
pub fn decode_xml(bytes: &[u8]) -> Cow<'_, str> {
    decode_text(bytes, extract_xml_encoding(bytes))
}

/// Extract encoding from XML declaration.
///
/// Only the first 100 bytes are checked.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = memchr::memmem::find(prefix, b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let &quote = after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

/// Strip a UTF-8 BOM if present.
pub fn strip_bom(s: &str) -> &str {
    s.strip_prefix('\u{FEFF}').unwrap_or(s)
}

// ============================================================================
// Media Detection
// ============================================================================

/// Image formats the preview can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Svg,
    WebP,
    Binary,
}

impl MediaFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::Gif => "image/gif",
            MediaFormat::Bmp => "image/bmp",
            MediaFormat::Svg => "image/svg+xml",
            MediaFormat::WebP => "image/webp",
            MediaFormat::Binary => "application/octet-stream",
        }
    }
}

/// Identify an image by its leading bytes.
pub fn sniff_image(data: &[u8]) -> Option<MediaFormat> {
    if data.len() < 4 {
        return None;
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(MediaFormat::Jpeg)
    } else if data.starts_with(b"\x89PNG") {
        Some(MediaFormat::Png)
    } else if data.starts_with(b"GIF8") {
        Some(MediaFormat::Gif)
    } else if data.starts_with(b"BM") {
        Some(MediaFormat::Bmp)
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some(MediaFormat::WebP)
    } else {
        None
    }
}

/// Detect a resource's format from its path, falling back to magic bytes.
pub fn detect_media_format(path: &str, data: &[u8]) -> MediaFormat {
    let path_lower = path.to_lowercase();

    if path_lower.ends_with(".jpg") || path_lower.ends_with(".jpeg") {
        return MediaFormat::Jpeg;
    }
    if path_lower.ends_with(".png") {
        return MediaFormat::Png;
    }
    if path_lower.ends_with(".gif") {
        return MediaFormat::Gif;
    }
    if path_lower.ends_with(".bmp") {
        return MediaFormat::Bmp;
    }
    if path_lower.ends_with(".svg") {
        return MediaFormat::Svg;
    }
    if path_lower.ends_with(".webp") {
        return MediaFormat::WebP;
    }

    sniff_image(data).unwrap_or(MediaFormat::Binary)
}

// ============================================================================
// Paths
// ============================================================================

/// Directory part of an archive path, with trailing slash: `"OEBPS/"`.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..=pos],
        None => "",
    }
}

/// Resolve `href` relative to `base_dir`, dropping fragments and decoding
/// percent escapes. `..` segments above the root are discarded.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let decoded = percent_decode_str(href).decode_utf8_lossy();

    let joined = if let Some(absolute) = decoded.strip_prefix('/') {
        absolute.to_string()
    } else {
        format!("{base_dir}{decoded}")
    };

    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// File name without directories and extension.
pub fn file_stem(name: &str) -> &str {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Lower-cased extension of a file name, without the dot.
pub fn extension(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    name.rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_with_hint() {
        // 0xE9 is invalid UTF-8; ISO-8859-15 maps it to é as well.
        assert_eq!(decode_text(b"\xe9t\xe9", Some("iso-8859-15")), "\u{e9}t\u{e9}");
        assert_eq!(decode_text(b"plain", Some("bogus")), "plain");
    }

    #[test]
    fn test_extract_xml_encoding() {
        assert_eq!(
            extract_xml_encoding(b"<?xml version=\"1.0\" encoding=\"windows-1251\"?><a/>"),
            Some("windows-1251")
        );
        assert_eq!(
            extract_xml_encoding(b"<?xml version='1.0' encoding='UTF-8'?>"),
            Some("UTF-8")
        );
        assert_eq!(extract_xml_encoding(b"<html>"), None);
    }

    #[test]
    fn test_strip_bom() {
        assert_eq!(strip_bom("\u{FEFF}<?xml"), "<?xml");
        assert_eq!(strip_bom("<?xml"), "<?xml");
    }

    #[test]
    fn test_sniff_image() {
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(MediaFormat::Jpeg));
        assert_eq!(sniff_image(b"\x89PNG\r\n"), Some(MediaFormat::Png));
        assert_eq!(sniff_image(b"GIF89a"), Some(MediaFormat::Gif));
        assert_eq!(sniff_image(b"BM\0\0\0\0"), Some(MediaFormat::Bmp));
        assert_eq!(sniff_image(b"FLIS\0\0\0\x08"), None);
        assert_eq!(sniff_image(b"BM"), None);
    }

    #[test]
    fn test_detect_media_format() {
        assert_eq!(detect_media_format("a/b.JPG", &[]), MediaFormat::Jpeg);
        assert_eq!(detect_media_format("cover", b"\x89PNG...."), MediaFormat::Png);
        assert_eq!(detect_media_format("data.bin", b"nope"), MediaFormat::Binary);
        assert_eq!(MediaFormat::Svg.mime_type(), "image/svg+xml");
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("OEBPS/Text/", "../Images/a%20b.png"), "OEBPS/Images/a b.png");
        assert_eq!(resolve_href("OEBPS/", "ch1.xhtml#sec"), "OEBPS/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/", "/cover.jpg"), "cover.jpg");
        assert_eq!(resolve_href("", "./a.html"), "a.html");
        assert_eq!(parent_dir("OEBPS/content.opf"), "OEBPS/");
        assert_eq!(parent_dir("content.opf"), "");
    }

    #[test]
    fn test_names() {
        assert_eq!(file_stem("/tmp/My Book.epub"), "My Book");
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(extension("Book.EPUB").as_deref(), Some("epub"));
        assert_eq!(extension("README"), None);
    }
}
