//! # wordstream
//!
//! Turns ebooks and text documents into a flat, indexed word stream for
//! rapid serial visual presentation (RSVP) readers.
//!
//! ## Features
//!
//! - Read EPUB 2/3, MOBI/AZW/PRC, PalmDOC, FictionBook 2, HTML, Markdown and
//!   plain text
//! - Segment text into display words with dash splitting and orphaned
//!   punctuation merging
//! - Paragraph, page and chapter boundary tables over one word array
//! - Preview markup annotated with word indices, plus embedded images
//! - Optimal recognition point and per-word display durations
//!
//! ## Quick Start
//!
//! ```no_run
//! use wordstream::{Pipeline, TimingConfig, orp_index};
//!
//! let mut book = Pipeline::new().parse_file("book.epub").unwrap();
//! let timing = TimingConfig::default();
//! for word in &book.document.words {
//!     let pivot = orp_index(&word.text);
//!     let ms = timing.duration(&word.text);
//!     println!("{} [{pivot}] {ms}ms", word.text);
//! }
//! book.release_resources();
//! ```
//!
//! ## Custom adapters
//!
//! Adapters are registered explicitly:
//!
//! ```
//! use wordstream::{AdapterRegistry, Pipeline, TextAdapter};
//!
//! let mut registry = AdapterRegistry::new();
//! registry.register(TextAdapter);
//! let pipeline = Pipeline::new().with_registry(registry);
//! let book = pipeline.parse("notes.txt", b"Just text.").unwrap();
//! assert_eq!(book.document.total_words(), 2);
//! ```

pub mod builder;
pub mod content;
pub mod dom;
pub mod epub;
pub mod error;
pub mod import;
pub mod markup;
pub mod mobi;
pub mod model;
pub mod options;
pub mod pipeline;
pub mod reconcile;
pub mod resource;
pub mod segment;
pub mod timing;
pub(crate) mod util;

pub use error::{Error, ErrorKind, Result};
pub use import::{
    AdapterRegistry, EpubAdapter, Fb2Adapter, FormatAdapter, HtmlAdapter, MarkdownAdapter,
    MobiAdapter, TextAdapter,
};
pub use model::{ChapterInfo, Document, Metadata, ParsedBook, PreviewSection, Word, file_key};
pub use options::ParseOptions;
pub use pipeline::Pipeline;
pub use resource::{DisplayHandle, Resource, ResourceStore};
pub use segment::{merge_orphaned_punctuation, segment_text, split_on_dashes};
pub use timing::{TimingConfig, orp_index, split_at_orp, word_duration};
