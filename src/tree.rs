//! Content tree: the in-memory form of one document part.
//!
//! A part is an ordered, attributed tree of elements and text. The transform
//! consumes a tree and produces a new one; nothing in this module mutates a
//! parsed tree in place.
//!
//! Whitespace-only text between elements is dropped at parse time, so a
//! round-trip through [`parse`] and [`to_bytes`] yields canonical bytes.

use compact_str::CompactString;
use quick_xml::{
    Reader, Writer,
    events::{BytesEnd, BytesStart, BytesText, Event},
};
use std::io::Cursor;
use thiserror::Error;

/// Tracked-revision wrappers; templates containing these are rejected up front.
pub const REVISION_TAGS: [&str; 2] = ["Ins", "Del"];

/// Bookmark markers, stripped from table prototype rows before replication.
pub const BOOKMARK_TAGS: [&str; 2] = ["BookmarkStart", "BookmarkEnd"];

/// Content-tree errors.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("XML syntax error at position {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("part has no root element")]
    NoRoot,

    #[error("content after the root element")]
    TrailingContent,

    #[error("XML write error: {0}")]
    Write(String),
}

/// One child slot of an element: a nested element or character data.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }
}

/// An element node: name, ordered attributes, ordered children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: CompactString,
    pub attrs: Vec<(CompactString, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Element {
            name: CompactString::new(name),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.push((CompactString::new(key), value.into()));
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Node::Text(text.into()))
    }

    /// First attribute with the given name.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First descendant element with the given name, depth-first.
    pub fn first_descendant(&self, name: &str) -> Option<&Element> {
        for el in self.elements() {
            if el.name == name {
                return Some(el);
            }
            if let Some(found) = el.first_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated character data of the whole subtree, in document order.
    pub fn gathered_text(&self) -> String {
        let mut out = String::new();
        gather_text(self, &mut out);
        out
    }

    /// True if any element in the subtree (including self) has one of `names`.
    pub fn contains_any(&self, names: &[&str]) -> bool {
        if names.contains(&self.name.as_str()) {
            return true;
        }
        self.elements().any(|el| el.contains_any(names))
    }

    /// Copy of this subtree with every element named in `names` removed.
    pub fn without(&self, names: &[&str]) -> Element {
        Element {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            children: self
                .children
                .iter()
                .filter_map(|child| match child {
                    Node::Element(el) if names.contains(&el.name.as_str()) => None,
                    Node::Element(el) => Some(Node::Element(el.without(names))),
                    Node::Text(t) => Some(Node::Text(t.clone())),
                })
                .collect(),
        }
    }
}

fn gather_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => gather_text(el, out),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[inline]
fn create_reader(content: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);
    reader.config_mut().enable_all_checks(false);
    reader
}

/// Parse one part's bytes into its root element.
pub fn parse(content: &[u8]) -> Result<Element, TreeError> {
    let mut reader = create_reader(content);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| TreeError::Syntax {
            position: reader.error_position(),
            message: e.to_string(),
        })?;
        match event {
            Event::Start(elem) => {
                stack.push(read_element(&elem, &reader)?);
            }
            Event::Empty(elem) => {
                let el = read_element(&elem, &reader)?;
                attach(&mut stack, &mut root, Node::Element(el))?;
            }
            Event::End(_) => {
                let el = stack.pop().ok_or(TreeError::NoRoot)?;
                attach(&mut stack, &mut root, Node::Element(el))?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| TreeError::Syntax {
                    position: reader.error_position(),
                    message: e.to_string(),
                })?;
                if !text.trim().is_empty() {
                    attach(&mut stack, &mut root, Node::Text(text.into_owned()))?;
                }
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(data.as_ref()).into_owned();
                attach(&mut stack, &mut root, Node::Text(text))?;
            }
            Event::Eof => break,
            // Declarations, comments and processing instructions carry no content
            _ => {}
        }
    }

    root.ok_or(TreeError::NoRoot)
}

fn read_element(elem: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Element, TreeError> {
    let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
    let mut el = Element::new(&name);
    for attr in elem.attributes() {
        let attr = attr.map_err(|e| TreeError::Syntax {
            position: reader.error_position(),
            message: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| TreeError::Syntax {
            position: reader.error_position(),
            message: e.to_string(),
        })?;
        el.attrs.push((CompactString::new(&key), value.into_owned()));
    }
    Ok(el)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, node: Node) -> Result<(), TreeError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    match node {
        Node::Element(el) if root.is_none() => {
            *root = Some(el);
            Ok(())
        }
        // A second root element or bare text at the top level means the part
        // is malformed; enable_all_checks(false) leaves this to us
        _ => Err(TreeError::TrailingContent),
    }
}

// ============================================================================
// Serialization
// ============================================================================

/// Serialize an element subtree to bytes (no XML declaration).
pub fn to_bytes(root: &Element) -> Result<Vec<u8>, TreeError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_element(&mut writer, root)?;
    Ok(writer.into_inner().into_inner())
}

fn write_element(writer: &mut Writer<Cursor<Vec<u8>>>, el: &Element) -> Result<(), TreeError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if el.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| TreeError::Write(e.to_string()))?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| TreeError::Write(e.to_string()))?;
    for child in &el.children {
        match child {
            Node::Element(el) => write_element(writer, el)?,
            Node::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| TreeError::Write(e.to_string()))?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(|e| TreeError::Write(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_builds_nested_tree() {
        let root = parse(b"<Document><Paragraph Style=\"Body\"><Run>hi</Run></Paragraph></Document>")
            .unwrap();
        assert_eq!(root.name, "Document");
        let para = root.elements().next().unwrap();
        assert_eq!(para.attr("Style"), Some("Body"));
        assert_eq!(para.gathered_text(), "hi");
    }

    #[test]
    fn parse_drops_interelement_whitespace() {
        let root = parse(b"<Document>\n  <Paragraph>\n    <Run>a</Run>\n  </Paragraph>\n</Document>")
            .unwrap();
        assert_eq!(root.gathered_text(), "a");
    }

    #[test]
    fn parse_unescapes_text_and_attributes() {
        let root = parse(b"<Run Note=\"a &amp; b\">x &lt; y</Run>").unwrap();
        assert_eq!(root.attr("Note"), Some("a & b"));
        assert_eq!(root.gathered_text(), "x < y");
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert!(matches!(parse(b"  "), Err(TreeError::NoRoot)));
    }

    #[test]
    fn parse_rejects_a_second_root_element() {
        assert!(matches!(
            parse(b"<Document/><Document/>"),
            Err(TreeError::TrailingContent)
        ));
    }

    #[test]
    fn parse_rejects_text_after_the_root() {
        assert!(matches!(
            parse(b"<Document/>junk"),
            Err(TreeError::TrailingContent)
        ));
        // Trailing whitespace alone is still fine
        assert!(parse(b"<Document/>\n").is_ok());
    }

    #[test]
    fn round_trip_is_canonical() {
        let bytes = b"<Document><Run Bold=\"true\">a &amp; b</Run><Break/></Document>";
        let first = to_bytes(&parse(bytes).unwrap()).unwrap();
        let second = to_bytes(&parse(&first).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn first_descendant_is_depth_first() {
        let root = parse(
            b"<Document><Paragraph><Run>one</Run></Paragraph><Run>two</Run></Document>",
        )
        .unwrap();
        assert_eq!(root.first_descendant("Run").unwrap().gathered_text(), "one");
    }

    #[test]
    fn without_strips_named_elements_recursively() {
        let root = parse(
            b"<Row><BookmarkStart Id=\"1\"/><Cell><BookmarkEnd Id=\"1\"/><Run>x</Run></Cell></Row>",
        )
        .unwrap();
        let stripped = root.without(&BOOKMARK_TAGS);
        assert!(!stripped.contains_any(&BOOKMARK_TAGS));
        assert_eq!(stripped.gathered_text(), "x");
    }

    #[test]
    fn contains_any_finds_revision_markers() {
        let root = parse(b"<Document><Paragraph><Ins><Run>new</Run></Ins></Paragraph></Document>")
            .unwrap();
        assert!(root.contains_any(&REVISION_TAGS));
    }
}
