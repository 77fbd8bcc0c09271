//! EPUB 2/3 archives.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Seek};

use memchr::memmem;
use zip::ZipArchive;

use super::{FormatAdapter, decode_data_uri, finish_book};
use crate::builder::DocumentBuilder;
use crate::content::ContentUnit;
use crate::dom::{extract_blocks, parse_html};
use crate::epub::{NavEntry, OpfData, parse_container_xml, parse_encryption, parse_nav, parse_ncx, parse_opf};
use crate::error::{Error, Result};
use crate::model::ParsedBook;
use crate::options::ParseOptions;
use crate::resource::DisplayHandle;
use crate::util::{decode_xml, detect_media_format, extension, parent_dir, resolve_href};

const CONTAINER_PATH: &str = "META-INF/container.xml";
const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";

/// Font files may be obfuscated without the book being DRM-protected.
const FONT_EXTENSIONS: &[&str] = &["otf", "ttf", "woff", "woff2"];

pub struct EpubAdapter;

impl FormatAdapter for EpubAdapter {
    fn name(&self) -> &'static str {
        "epub"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["epub"]
    }

    /// A zip whose leading `mimetype` entry declares EPUB.
    fn sniff(&self, data: &[u8]) -> bool {
        data.starts_with(b"PK\x03\x04")
            && memmem::find(&data[..data.len().min(128)], b"application/epub+zip").is_some()
    }

    fn parse(&self, data: &[u8], source_name: &str, options: &ParseOptions) -> Result<ParsedBook> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;

        let container = read_entry(&mut archive, CONTAINER_PATH)?
            .ok_or_else(|| Error::InvalidEpub(format!("missing {CONTAINER_PATH}")))?;
        let opf_path = parse_container_xml(&decode_xml(&container))?;
        let opf_bytes = read_entry(&mut archive, &opf_path)?
            .ok_or_else(|| Error::InvalidEpub(format!("missing package document {opf_path}")))?;
        let opf = parse_opf(&decode_xml(&opf_bytes))?;
        let opf_dir = parent_dir(&opf_path).to_string();

        let spine: Vec<(String, String)> = opf
            .spine_ids
            .iter()
            .filter_map(|id| opf.manifest.get(id).map(|item| (id.clone(), item.href.clone())))
            .map(|(id, href)| (id, resolve_href(&opf_dir, &href)))
            .collect();

        check_encryption(&mut archive, &spine)?;

        let mut builder = DocumentBuilder::new(options);
        for id in &opf.spine_ids {
            if !opf.manifest.contains_key(id) {
                builder.warn(format!("Spine item {id} is not in the manifest"));
            }
        }

        let toc = read_toc(&mut archive, &opf, &opf_dir, &mut builder);
        let media_types: HashMap<String, String> = opf
            .manifest
            .values()
            .map(|item| (resolve_href(&opf_dir, &item.href), item.media_type.clone()))
            .collect();

        log::debug!(
            "{source_name}: {} spine item(s), {} toc entries",
            spine.len(),
            toc.len()
        );

        let mut images = ImageCache {
            media_types,
            handles: HashMap::new(),
        };
        for (id, path) in &spine {
            let title = toc.get(path).cloned();
            let label = title.clone().unwrap_or_else(|| id.clone());
            let bytes = match read_entry(&mut archive, path) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    builder.unit_failed(&label, format!("{path} is missing from the archive"));
                    continue;
                }
                Err(e) => {
                    builder.unit_failed(&label, e);
                    continue;
                }
            };

            let dom = parse_html(&decode_xml(&bytes));
            let mut unit = ContentUnit::new(path.clone());
            unit.title = title;
            unit.blocks = extract_blocks(&dom);

            let resources = images.resolve(&mut archive, &mut builder, &unit, path);
            builder.add_unit(&unit, true, resources);
        }

        Ok(finish_book(builder, self.name(), opf.metadata, source_name))
    }
}

/// Read one archive entry; `None` when it does not exist. Falls back to a
/// case-insensitive name match, which some broken packages need.
fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Option<Vec<u8>>> {
    let name = if archive.file_names().any(|n| n == path) {
        path.to_string()
    } else {
        match archive.file_names().find(|n| n.eq_ignore_ascii_case(path)) {
            Some(n) => n.to_string(),
            None => return Ok(None),
        }
    };
    let mut file = archive.by_name(&name)?;
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

/// Fail with [`Error::DrmProtected`] when any content document is
/// encrypted. Obfuscated fonts alone are accepted.
fn check_encryption<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    spine: &[(String, String)],
) -> Result<()> {
    let Some(bytes) = read_entry(archive, ENCRYPTION_PATH)? else {
        return Ok(());
    };
    let encrypted = parse_encryption(&decode_xml(&bytes))?;
    let protected = encrypted.iter().any(|uri| {
        let path = resolve_href("", uri);
        let is_font = extension(&path).is_some_and(|e| FONT_EXTENSIONS.contains(&e.as_str()));
        !is_font || spine.iter().any(|(_, p)| *p == path)
    });
    if protected {
        log::info!("{} encrypted resource(s) listed in {ENCRYPTION_PATH}", encrypted.len());
        return Err(Error::DrmProtected);
    }
    Ok(())
}

/// Chapter titles keyed by archive path, from the NCX or the EPUB 3 nav
/// document. The first entry pointing into a file names it.
fn read_toc<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    opf: &OpfData,
    opf_dir: &str,
    builder: &mut DocumentBuilder,
) -> HashMap<String, String> {
    let sources: [(Option<&String>, fn(&str) -> Result<Vec<NavEntry>>); 2] =
        [(opf.ncx_href.as_ref(), parse_ncx), (opf.nav_href.as_ref(), parse_nav)];

    for (href, parse) in sources {
        let Some(href) = href else {
            continue;
        };
        let path = resolve_href(opf_dir, href);
        let entries = match read_entry(archive, &path) {
            Ok(Some(bytes)) => parse(&decode_xml(&bytes)),
            Ok(None) => {
                builder.warn(format!("Table of contents {path} is missing from the archive"));
                continue;
            }
            Err(e) => Err(e),
        };
        match entries {
            Ok(entries) if !entries.is_empty() => {
                let base = parent_dir(&path);
                let mut titles = HashMap::new();
                for entry in entries {
                    titles
                        .entry(resolve_href(base, &entry.href))
                        .or_insert(entry.title);
                }
                return titles;
            }
            Ok(_) => {}
            Err(e) => builder.warn(format!("Unreadable table of contents {path}: {e}")),
        }
    }

    builder.warn("No table of contents; chapter titles come from headings");
    HashMap::new()
}

/// Handles already handed out, keyed by archive path.
struct ImageCache {
    media_types: HashMap<String, String>,
    handles: HashMap<String, DisplayHandle>,
}

impl ImageCache {
    fn resolve<R: Read + Seek>(
        &mut self,
        archive: &mut ZipArchive<R>,
        builder: &mut DocumentBuilder,
        unit: &ContentUnit,
        unit_path: &str,
    ) -> BTreeMap<String, DisplayHandle> {
        let mut resources = BTreeMap::new();
        if !builder.options().include_images {
            return resources;
        }

        for src in unit.image_sources() {
            if resources.contains_key(src) {
                continue;
            }
            if let Some((media_type, data)) = decode_data_uri(src) {
                let handle = builder.resources_mut().acquire(media_type, data);
                resources.insert(src.to_string(), handle);
                continue;
            }

            let path = resolve_href(parent_dir(unit_path), src);
            if let Some(&handle) = self.handles.get(&path) {
                resources.insert(src.to_string(), handle);
                continue;
            }
            match read_entry(archive, &path) {
                Ok(Some(data)) => {
                    let media_type = self
                        .media_types
                        .get(&path)
                        .cloned()
                        .unwrap_or_else(|| detect_media_format(&path, &data).mime_type().to_string());
                    let handle = builder.resources_mut().acquire(media_type, data);
                    self.handles.insert(path, handle);
                    resources.insert(src.to_string(), handle);
                }
                Ok(None) => builder.warn(format!("Image {path} is missing from the archive")),
                Err(e) => builder.warn(format!("Image {path} could not be read: {e}")),
            }
        }
        resources
    }
}
