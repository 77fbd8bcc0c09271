//! EPUB package parsing (container.xml, OPF, NCX, nav, encryption.xml).

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};
use crate::model::Metadata;

/// A manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, name: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|p| p.split_ascii_whitespace().any(|x| x == name))
    }
}

/// Parsed OPF package data.
#[derive(Debug)]
pub struct OpfData {
    pub metadata: Metadata,
    /// Manifest id -> item.
    pub manifest: HashMap<String, ManifestItem>,
    pub spine_ids: Vec<String>,
    pub ncx_href: Option<String>,
    /// EPUB 3 navigation document.
    pub nav_href: Option<String>,
}

/// One table-of-contents entry, in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    pub title: String,
    pub href: String,
    pub depth: usize,
}

fn attr_string(value: &[u8]) -> Result<String> {
    String::from_utf8(value.to_vec())
        .map_err(|e| Error::InvalidEpub(format!("attribute is not UTF-8: {e}")))
}

/// Parse META-INF/container.xml to find the OPF path.
pub fn parse_container_xml(content: &str) -> Result<String> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        return attr_string(&attr.value);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(Error::InvalidEpub("no rootfile in container.xml".into()))
}

/// Parse the OPF package document.
pub fn parse_opf(content: &str) -> Result<OpfData> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut metadata = Metadata::default();
    let mut authors: Vec<String> = Vec::new();
    let mut manifest: HashMap<String, ManifestItem> = HashMap::new();
    let mut spine_ids: Vec<String> = Vec::new();
    let mut toc_id: Option<String> = None;

    let mut in_metadata = false;
    let mut current_element: Option<&'static str> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"metadata" => in_metadata = true,
                    b"title" if in_metadata => {
                        current_element = Some("title");
                        buf_text.clear();
                    }
                    b"creator" if in_metadata => {
                        current_element = Some("creator");
                        buf_text.clear();
                    }
                    b"language" if in_metadata => {
                        current_element = Some("language");
                        buf_text.clear();
                    }
                    b"spine" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"toc" {
                                toc_id = Some(attr_string(&attr.value)?);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"item" => {
                        let mut id = String::new();
                        let mut item = ManifestItem {
                            href: String::new(),
                            media_type: String::new(),
                            properties: None,
                        };
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"id" => id = attr_string(&attr.value)?,
                                b"href" => item.href = attr_string(&attr.value)?,
                                b"media-type" => item.media_type = attr_string(&attr.value)?,
                                b"properties" => {
                                    item.properties = Some(attr_string(&attr.value)?)
                                }
                                _ => {}
                            }
                        }
                        if !id.is_empty() {
                            manifest.insert(id, item);
                        }
                    }
                    b"itemref" => {
                        let mut idref = None;
                        let mut linear = true;
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"idref" => idref = Some(attr_string(&attr.value)?),
                                b"linear" => linear = attr.value.as_ref() != b"no",
                                _ => {}
                            }
                        }
                        if let Some(idref) = idref
                            && linear
                        {
                            spine_ids.push(idref);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if current_element.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if current_element.is_some() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        buf_text.push_str(&resolved);
                    }
                }
            }
            Event::End(e) => {
                let name = e.name();
                if local_name(name.as_ref()) == b"metadata" {
                    in_metadata = false;
                }

                if let Some(elem) = current_element.take() {
                    let text = buf_text.trim().to_string();
                    buf_text.clear();
                    if text.is_empty() {
                        continue;
                    }
                    match elem {
                        "title" if metadata.title.is_none() => metadata.title = Some(text),
                        "creator" => authors.push(text),
                        "language" if metadata.language.is_none() => {
                            metadata.language = Some(text)
                        }
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !authors.is_empty() {
        metadata.author = Some(authors.join(", "));
    }

    let ncx_href = toc_id
        .and_then(|id| manifest.get(&id))
        .map(|item| item.href.clone())
        .or_else(|| {
            manifest
                .values()
                .find(|item| item.media_type == "application/x-dtbncx+xml")
                .map(|item| item.href.clone())
        });
    let nav_href = manifest
        .values()
        .find(|item| item.has_property("nav"))
        .map(|item| item.href.clone());

    Ok(OpfData {
        metadata,
        manifest,
        spine_ids,
        ncx_href,
        nav_href,
    })
}

/// Parse an NCX table of contents into a flat, reading-order list.
pub fn parse_ncx(content: &str) -> Result<Vec<NavEntry>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    // Entries are emitted when their navPoint opens, so parents precede
    // children; the title and src are filled in as they arrive.
    let mut entries: Vec<NavEntry> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"navPoint" => {
                    open.push(entries.len());
                    entries.push(NavEntry {
                        title: String::new(),
                        href: String::new(),
                        depth: open.len() - 1,
                    });
                }
                b"text" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                if local_name(e.name().as_ref()) == b"content"
                    && let Some(&idx) = open.last()
                {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"src" {
                            entries[idx].href = attr_string(&attr.value)?;
                        }
                    }
                }
            }
            Event::Text(e) => {
                if in_text && let Some(&idx) = open.last() {
                    entries[idx].title.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if in_text
                    && let Some(&idx) = open.last()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    entries[idx].title.push_str(&resolved);
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"text" => in_text = false,
                b"navPoint" => {
                    open.pop();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    entries.retain(|e| !e.href.is_empty());
    for entry in &mut entries {
        entry.title = entry.title.trim().to_string();
    }
    Ok(entries)
}

/// Parse the `toc` nav of an EPUB 3 navigation document.
pub fn parse_nav(content: &str) -> Result<Vec<NavEntry>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    let mut entries: Vec<NavEntry> = Vec::new();
    // Depth of the <nav> element we are inside, if it is the toc.
    let mut nav_depth: Option<usize> = None;
    let mut depth = 0usize;
    let mut list_depth = 0usize;
    let mut current: Option<NavEntry> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"nav" if nav_depth.is_none() => {
                        let is_toc = e.attributes().flatten().any(|a| {
                            local_name(a.key.as_ref()) == b"type"
                                && a.value.split(|&b| b == b' ').any(|t| t == b"toc")
                        });
                        if is_toc {
                            nav_depth = Some(depth);
                        }
                    }
                    b"ol" if nav_depth.is_some() => list_depth += 1,
                    b"a" if nav_depth.is_some() => {
                        let mut href = String::new();
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"href" {
                                href = attr_string(&attr.value)?;
                            }
                        }
                        current = Some(NavEntry {
                            title: String::new(),
                            href,
                            depth: list_depth.saturating_sub(1),
                        });
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if let Some(entry) = current.as_mut() {
                    entry.title.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if let Some(entry) = current.as_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    entry.title.push_str(&resolved);
                }
            }
            Event::End(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"a" => {
                        if let Some(mut entry) = current.take()
                            && !entry.href.is_empty()
                        {
                            entry.title =
                                entry.title.split_whitespace().collect::<Vec<_>>().join(" ");
                            entries.push(entry);
                        }
                    }
                    b"ol" if nav_depth.is_some() => list_depth = list_depth.saturating_sub(1),
                    b"nav" if nav_depth == Some(depth) => nav_depth = None,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

/// URIs of encrypted resources listed in META-INF/encryption.xml.
pub fn parse_encryption(content: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut uris = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e)
                if local_name(e.name().as_ref()) == b"CipherReference" =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"URI" {
                        uris.push(attr_string(&attr.value)?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(uris)
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve XML entity references.
pub(crate) fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        "nbsp" => return Some("\u{a0}".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code).map(|c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"title"), b"title");
        assert_eq!(local_name(b"dc:title"), b"title");
        assert_eq!(local_name(b""), b"");
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp"), Some("&".to_string()));
        assert_eq!(resolve_entity("#8217"), Some("\u{2019}".to_string()));
        assert_eq!(resolve_entity("#x2019"), Some("\u{2019}".to_string()));
        assert_eq!(resolve_entity("invalid"), None);
    }

    #[test]
    fn test_parse_container_xml() {
        let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
        assert_eq!(parse_container_xml(container).unwrap(), "OEBPS/content.opf");
        assert!(parse_container_xml("<container/>").is_err());
    }

    #[test]
    fn test_parse_opf() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Tom &amp; Jerry</dc:title>
    <dc:creator>Author One</dc:creator>
    <dc:creator>Author Two</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="chapter1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="notes" href="notes.xhtml" media-type="application/xhtml+xml"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="chapter1"/>
    <itemref idref="notes" linear="no"/>
  </spine>
</package>"#;

        let opf = parse_opf(opf).unwrap();
        assert_eq!(opf.metadata.title.as_deref(), Some("Tom & Jerry"));
        assert_eq!(opf.metadata.author.as_deref(), Some("Author One, Author Two"));
        assert_eq!(opf.metadata.language.as_deref(), Some("en"));
        assert_eq!(opf.spine_ids, vec!["chapter1"]);
        assert_eq!(opf.ncx_href.as_deref(), Some("toc.ncx"));
        assert_eq!(opf.nav_href.as_deref(), Some("nav.xhtml"));
        assert_eq!(opf.manifest["chapter1"].href, "chapter1.xhtml");
    }

    #[test]
    fn test_parse_ncx_nested() {
        let ncx = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="part1" playOrder="1">
      <navLabel><text>Part One</text></navLabel>
      <content src="part1.xhtml"/>
      <navPoint id="ch1" playOrder="2">
        <navLabel><text>Chapter 1</text></navLabel>
        <content src="ch1.xhtml#start"/>
      </navPoint>
    </navPoint>
    <navPoint id="ch2" playOrder="3">
      <navLabel><text>Chapter 2</text></navLabel>
      <content src="ch2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

        let toc = parse_ncx(ncx).unwrap();
        let titles: Vec<_> = toc.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Part One", "Chapter 1", "Chapter 2"]);
        assert_eq!(toc[1].href, "ch1.xhtml#start");
        assert_eq!(toc[1].depth, 1);
        assert_eq!(toc[2].depth, 0);
    }

    #[test]
    fn test_parse_nav() {
        let nav = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body>
  <nav epub:type="landmarks"><ol><li><a href="cover.xhtml">Cover</a></li></ol></nav>
  <nav epub:type="toc">
    <ol>
      <li><a href="ch1.xhtml">Chapter
          One</a>
        <ol><li><a href="ch1.xhtml#s1">Section</a></li></ol>
      </li>
      <li><a href="ch2.xhtml">Chapter Two</a></li>
    </ol>
  </nav>
</body>
</html>"#;
        let toc = parse_nav(nav).unwrap();
        let titles: Vec<_> = toc.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Chapter One", "Section", "Chapter Two"]);
        assert_eq!(toc[1].depth, 1);
    }

    #[test]
    fn test_parse_encryption() {
        let xml = r#"<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container"
            xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
  <enc:EncryptedData>
    <enc:CipherData><enc:CipherReference URI="OEBPS/ch1.xhtml"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#;
        assert_eq!(parse_encryption(xml).unwrap(), vec!["OEBPS/ch1.xhtml"]);
    }
}
