//! html5ever tree builder hooks that grow a [`Dom`].

use std::borrow::Cow;
use std::cell::{Cell, RefCell};

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute as HtmlAttribute, QualName};

use super::arena::{Attribute, Dom, NodeData, NodeId};

/// Parse an HTML or XHTML string leniently, the way a browser would.
pub fn parse_html(html: &str) -> Dom {
    parse_document(DomSink::default(), ParseOpts::default())
        .from_utf8()
        .one(html.as_bytes())
}

/// Tree sink for [`parse_html`].
///
/// html5ever drives the sink through `&self`, so the tree sits in a
/// `RefCell`.
#[derive(Default)]
pub struct DomSink {
    dom: RefCell<Dom>,
    errors: Cell<usize>,
}

fn convert_attrs(attrs: Vec<HtmlAttribute>) -> Vec<Attribute> {
    attrs
        .into_iter()
        .map(|a| Attribute {
            name: a.name,
            value: a.value.to_string(),
        })
        .collect()
}

impl TreeSink for DomSink {
    type Handle = NodeId;
    type Output = Dom;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Dom {
        let errors = self.errors.get();
        if errors > 0 {
            log::trace!("html parser recovered from {errors} error(s)");
        }
        self.dom.into_inner()
    }

    fn parse_error(&self, _msg: Cow<'static, str>) {
        self.errors.set(self.errors.get() + 1);
    }

    fn get_document(&self) -> NodeId {
        self.dom.borrow().root()
    }

    fn elem_name<'a>(&'a self, target: &'a NodeId) -> &'a QualName {
        static NONE: QualName = QualName {
            prefix: None,
            ns: html5ever::ns!(),
            local: html5ever::local_name!(""),
        };

        let dom = self.dom.borrow();
        match &dom.node(*target).data {
            NodeData::Element { name, .. } => {
                let name: &QualName = name;
                // SAFETY: element names are boxed and never dropped or
                // replaced while the sink lives, so the pointee outlives
                // both the RefCell guard and any growth of the node vector.
                unsafe { std::mem::transmute::<&QualName, &'a QualName>(name) }
            }
            _ => &NONE,
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<HtmlAttribute>,
        _flags: ElementFlags,
    ) -> NodeId {
        self.dom.borrow_mut().create(NodeData::Element {
            name: Box::new(name),
            attrs: convert_attrs(attrs),
        })
    }

    fn create_comment(&self, _text: StrTendril) -> NodeId {
        self.dom.borrow_mut().create(NodeData::Comment)
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> NodeId {
        self.dom.borrow_mut().create(NodeData::Comment)
    }

    fn append(&self, parent: &NodeId, child: NodeOrText<NodeId>) {
        let mut dom = self.dom.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => dom.append(*parent, node),
            NodeOrText::AppendText(text) => dom.append_text(*parent, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &NodeId,
        prev_element: &NodeId,
        child: NodeOrText<NodeId>,
    ) {
        let has_parent = self.dom.borrow().node(*element).parent.is_some();
        if has_parent {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
    }

    fn get_template_contents(&self, target: &NodeId) -> NodeId {
        *target
    }

    fn same_node(&self, x: &NodeId, y: &NodeId) -> bool {
        x == y
    }

    fn set_quirks_mode(&self, mode: QuirksMode) {
        if mode != QuirksMode::NoQuirks {
            log::trace!("document parsed in {mode:?}");
        }
    }

    fn append_before_sibling(&self, sibling: &NodeId, new_node: NodeOrText<NodeId>) {
        let mut dom = self.dom.borrow_mut();
        match new_node {
            NodeOrText::AppendNode(node) => dom.insert_before(*sibling, node),
            NodeOrText::AppendText(text) => dom.insert_text_before(*sibling, &text),
        }
    }

    fn add_attrs_if_missing(&self, target: &NodeId, attrs: Vec<HtmlAttribute>) {
        self.dom
            .borrow_mut()
            .add_missing_attrs(*target, convert_attrs(attrs));
    }

    fn remove_from_parent(&self, target: &NodeId) {
        self.dom.borrow_mut().detach(*target);
    }

    fn reparent_children(&self, node: &NodeId, new_parent: &NodeId) {
        let mut dom = self.dom.borrow_mut();
        let children: Vec<_> = dom.children(*node).collect();
        for child in children {
            dom.append(*new_parent, child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builds_body() {
        let dom = parse_html("<html><body><p>Hello</p></body></html>");
        let p = dom.find_element("p").unwrap();
        let body = dom.find_element("body").unwrap();
        assert_eq!(dom.node(p).parent, Some(body));
        assert_eq!(dom.text_of(p), "Hello");
    }

    #[test]
    fn test_attributes() {
        let dom = parse_html(r#"<img src="a.png" alt="A cat">"#);
        let img = dom.find_element("img").unwrap();
        assert_eq!(dom.attr(img, "src"), Some("a.png"));
        assert_eq!(dom.attr(img, "alt"), Some("A cat"));
    }

    #[test]
    fn test_misnested_markup_recovers() {
        // The adoption agency algorithm reparents the text under a new <b>.
        let dom = parse_html("<p><b>bold <i>both</b> italic</i></p>");
        let p = dom.find_element("p").unwrap();
        assert_eq!(dom.text_of(p), "bold both italic");
    }

    #[test]
    fn test_foster_parented_text() {
        // Stray text inside a table is moved in front of it.
        let dom = parse_html("<div><table>loose<tr><td>cell</td></tr></table></div>");
        let div = dom.find_element("div").unwrap();
        assert_eq!(dom.text_of(div), "loosecell");
        let first = dom.children(div).next().unwrap();
        assert!(matches!(&dom.node(first).data, NodeData::Text(t) if t == "loose"));
    }
}
