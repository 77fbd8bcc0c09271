//! The ingestion entry point: adapter selection, parsing and
//! reconciliation.

use std::path::Path;

use crate::error::{Error, Result};
use crate::import::AdapterRegistry;
use crate::model::ParsedBook;
use crate::options::ParseOptions;
use crate::reconcile::reconcile;

/// Turns raw file bytes into a reconciled [`ParsedBook`].
///
/// A pipeline holds no mutable state, so one instance can parse many files
/// from several threads at once.
///
/// ```
/// use wordstream::Pipeline;
///
/// let pipeline = Pipeline::new();
/// let book = pipeline.parse("note.txt", b"Hello world.").unwrap();
/// assert_eq!(book.document.total_words(), 2);
/// ```
pub struct Pipeline {
    registry: AdapterRegistry,
    options: ParseOptions,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// A pipeline with every built-in adapter and default options.
    pub fn new() -> Self {
        Self::with_options(ParseOptions::default())
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Self {
            registry: AdapterRegistry::with_defaults(),
            options,
        }
    }

    /// Use a custom set of adapters.
    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Parse `data`, choosing an adapter from `filename` and the content
    /// signature.
    ///
    /// Fails with [`Error::EmptyDocument`] when the file is readable but
    /// yields no words.
    pub fn parse(&self, filename: &str, data: &[u8]) -> Result<ParsedBook> {
        let adapter = self.registry.select(filename, data)?;
        log::debug!("{filename}: using {} adapter", adapter.name());

        let mut book = adapter.parse(data, filename, &self.options)?;
        if book.document.is_empty() {
            book.release_resources();
            return Err(Error::EmptyDocument);
        }

        let book = reconcile(book, &self.options);
        log::info!(
            "{filename}: {} words, {} paragraphs, {} pages, {} chapters, {} warning(s)",
            book.document.total_words(),
            book.document.total_paragraphs(),
            book.document.total_pages(),
            book.chapter_starts.len(),
            book.warnings.len()
        );
        Ok(book)
    }

    /// Read a file from disk and parse it under its file name.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<ParsedBook> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.parse(&name, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_pipeline_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
    }

    #[test]
    fn test_parse_text() {
        let book = Pipeline::new()
            .parse("story.txt", b"Hello world.\n\nSecond paragraph here.")
            .unwrap();
        assert_eq!(book.format, "text");
        assert_eq!(book.document.total_words(), 5);
        assert_eq!(book.document.paragraph_starts, vec![0, 2]);
        assert_eq!(book.metadata.title.as_deref(), Some("story"));
    }

    #[test]
    fn test_empty_document() {
        let err = Pipeline::new().parse("blank.txt", b"  \n\n \n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyDocument);
    }

    #[test]
    fn test_unsupported_format() {
        let err = Pipeline::new()
            .parse("photo.bin", &[0u8, 159, 146, 150, 1, 2])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_custom_registry() {
        let pipeline = Pipeline::new().with_registry(AdapterRegistry::new());
        let err = pipeline.parse("a.txt", b"words").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_missing_file() {
        let err = Pipeline::new()
            .parse_file("/nonexistent/dir/book.epub")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
