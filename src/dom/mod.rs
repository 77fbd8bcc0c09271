//! HTML parsing into an arena tree and extraction into content blocks.

mod arena;
mod extract;
mod tree_sink;

pub use arena::{Attribute, Children, Descendants, Dom, Node, NodeData, NodeId};
pub use extract::{document_title, extract_blocks};
pub use tree_sink::{DomSink, parse_html};
