//! Reference [`DataContext`] binding: an XPath-mimicking selector subset over
//! an XML data document.
//!
//! The document is parsed once into an id-indexed arena shared behind an
//! `Arc`, so contexts are two words, cheap to fan out and safe to read from
//! every part transform concurrently. A context is a bound position: either
//! an element or one of its attributes.
//!
//! # Selector subset
//!
//! Steps separated by `/`:
//!
//! - `name` — child elements with that tag
//! - `name[n]` — the n-th such child per parent, 1-based
//! - `*` — any child element
//! - `@name` — an attribute (final step only)
//! - `.` / `..` — self / parent
//!
//! A leading `/` anchors at the document root; a leading `//` searches the
//! whole document for the first step's tag. The text value of an element is
//! its concatenated descendant character data.

use super::{DataContext, EvalError};
use crate::tree::{self, Element, Node, TreeError};
use compact_str::CompactString;
use std::sync::Arc;

type NodeId = usize;

#[derive(Debug)]
enum ArenaChild {
    Element(NodeId),
    Text(String),
}

#[derive(Debug)]
struct ArenaNode {
    name: CompactString,
    attrs: Vec<(CompactString, String)>,
    parent: Option<NodeId>,
    children: Vec<ArenaChild>,
}

/// The parsed data document. Immutable once built.
#[derive(Debug)]
pub struct XmlDocument {
    nodes: Vec<ArenaNode>,
}

impl XmlDocument {
    /// Parse a data document and return a context bound to its root element.
    pub fn parse(content: &[u8]) -> Result<XmlContext, TreeError> {
        let root = tree::parse(content)?;
        let mut doc = XmlDocument { nodes: Vec::new() };
        doc.intern(&root, None);
        Ok(XmlContext {
            doc: Arc::new(doc),
            place: Place::Element(0),
        })
    }

    fn intern(&mut self, el: &Element, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ArenaNode {
            name: el.name.clone(),
            attrs: el.attrs.clone(),
            parent,
            children: Vec::new(),
        });
        for child in &el.children {
            let interned = match child {
                Node::Element(el) => ArenaChild::Element(self.intern(el, Some(id))),
                Node::Text(t) => ArenaChild::Text(t.clone()),
            };
            self.nodes[id].children.push(interned);
        }
        id
    }

    fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id].children.iter().filter_map(|c| match c {
            ArenaChild::Element(id) => Some(*id),
            ArenaChild::Text(_) => None,
        })
    }

    /// Concatenated descendant character data, document order.
    fn text_value(&self, id: NodeId, out: &mut String) {
        for child in &self.nodes[id].children {
            match child {
                ArenaChild::Text(t) => out.push_str(t),
                ArenaChild::Element(id) => self.text_value(*id, out),
            }
        }
    }

    /// `id` and every descendant element, document order.
    fn descendants_into(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        for child in self.element_children(id).collect::<Vec<_>>() {
            self.descendants_into(child, out);
        }
    }
}

/// A bound position in the data document.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Place {
    Element(NodeId),
    Attribute(NodeId, usize),
}

/// The reference XML data context.
#[derive(Debug)]
pub struct XmlContext {
    doc: Arc<XmlDocument>,
    place: Place,
}

impl XmlContext {
    fn value_of(&self, place: Place) -> String {
        match place {
            Place::Element(id) => {
                let mut out = String::new();
                self.doc.text_value(id, &mut out);
                out
            }
            Place::Attribute(id, idx) => self.doc.nodes[id].attrs[idx].1.clone(),
        }
    }

    fn resolve(&self, selector: &str) -> Result<Vec<Place>, EvalError> {
        let syntax = |message: &str| EvalError::SelectorSyntax {
            selector: selector.to_string(),
            message: message.to_string(),
        };

        let (mut current, rest): (Vec<Place>, &str) = if let Some(rest) =
            selector.strip_prefix("//")
        {
            // Descendant search: seed with every element in the document
            let mut all = Vec::new();
            self.doc.descendants_into(0, &mut all);
            (all.into_iter().map(Place::Element).collect(), rest)
        } else if let Some(rest) = selector.strip_prefix('/') {
            // Absolute: a virtual document node whose only child is the root.
            // Resolved by matching the first step against the root itself.
            return resolve_absolute(self, rest, selector);
        } else {
            (vec![self.place], selector)
        };

        let steps: Vec<&str> = rest.split('/').collect();
        if steps.iter().any(|s| s.is_empty()) {
            return Err(syntax("empty step (`//` is only allowed as a prefix)"));
        }

        // The `//name` seed matches the first step in place rather than
        // against children
        let mut descendant_head = selector.starts_with("//");

        for (i, step) in steps.iter().enumerate() {
            let is_last = i + 1 == steps.len();
            current = apply_step(self, &current, step, is_last, descendant_head, &syntax)?;
            descendant_head = false;
        }
        Ok(current)
    }
}

fn resolve_absolute(
    ctx: &XmlContext,
    rest: &str,
    selector: &str,
) -> Result<Vec<Place>, EvalError> {
    let syntax = |message: &str| EvalError::SelectorSyntax {
        selector: selector.to_string(),
        message: message.to_string(),
    };
    let steps: Vec<&str> = rest.split('/').collect();
    if steps.iter().any(|s| s.is_empty()) {
        return Err(syntax("empty step (`//` is only allowed as a prefix)"));
    }

    // First step matches the document root element itself
    let (name, index) = parse_name_step(steps[0], &syntax)?;
    let root_name = ctx.doc.nodes[0].name.as_str();
    let mut current: Vec<Place> =
        if (name == "*" || name == root_name) && index.unwrap_or(1) == 1 {
            vec![Place::Element(0)]
        } else {
            Vec::new()
        };

    for (i, step) in steps.iter().enumerate().skip(1) {
        let is_last = i + 1 == steps.len();
        current = apply_step(ctx, &current, step, is_last, false, &syntax)?;
    }
    Ok(current)
}

fn apply_step(
    ctx: &XmlContext,
    current: &[Place],
    step: &str,
    is_last: bool,
    match_in_place: bool,
    syntax: &impl Fn(&str) -> EvalError,
) -> Result<Vec<Place>, EvalError> {
    let mut next = Vec::new();

    if step == "." {
        next.extend_from_slice(current);
        return Ok(next);
    }
    if step == ".." {
        for place in current {
            match *place {
                Place::Element(id) => {
                    if let Some(parent) = ctx.doc.nodes[id].parent {
                        next.push(Place::Element(parent));
                    }
                }
                Place::Attribute(id, _) => next.push(Place::Element(id)),
            }
        }
        next.dedup();
        return Ok(next);
    }
    if let Some(attr_name) = step.strip_prefix('@') {
        if !is_last {
            return Err(syntax("attribute step must be the final step"));
        }
        if attr_name.is_empty() {
            return Err(syntax("attribute step needs a name"));
        }
        for place in current {
            if let Place::Element(id) = *place {
                for (idx, (key, _)) in ctx.doc.nodes[id].attrs.iter().enumerate() {
                    if key == attr_name {
                        next.push(Place::Attribute(id, idx));
                    }
                }
            }
        }
        return Ok(next);
    }

    let (name, index) = parse_name_step(step, syntax)?;
    for place in current {
        let Place::Element(id) = *place else {
            // Attributes have no children
            continue;
        };
        if match_in_place {
            // Seeded descendant set: test the node itself
            if name == "*" || ctx.doc.nodes[id].name == name {
                next.push(Place::Element(id));
            }
            continue;
        }
        let mut position = 0usize;
        for child in ctx.doc.element_children(id) {
            if name == "*" || ctx.doc.nodes[child].name == name {
                position += 1;
                match index {
                    Some(want) if want != position => {}
                    _ => next.push(Place::Element(child)),
                }
            }
        }
    }
    Ok(next)
}

/// Split `name[n]` into the tag and the optional 1-based position.
fn parse_name_step<'a>(
    step: &'a str,
    syntax: &impl Fn(&str) -> EvalError,
) -> Result<(&'a str, Option<usize>), EvalError> {
    let Some(open) = step.find('[') else {
        return Ok((step, None));
    };
    let Some(digits) = step[open + 1..].strip_suffix(']') else {
        return Err(syntax("unterminated `[` in step"));
    };
    let index: usize = digits
        .parse()
        .map_err(|_| syntax("position filter must be a positive integer"))?;
    if index == 0 {
        return Err(syntax("position filters are 1-based"));
    }
    Ok((&step[..open], Some(index)))
}

impl DataContext for XmlContext {
    fn evaluate_text(&self, selector: &str, optional: bool) -> Result<String, EvalError> {
        if selector.is_empty() {
            // No binding configured: sparse table templates leave cells blank
            return Ok(String::new());
        }
        let matches = self.resolve(selector)?;
        match matches.as_slice() {
            [] if optional => Ok(String::new()),
            [] => Err(EvalError::SelectorEmpty(selector.to_string())),
            [place] => Ok(self.value_of(*place)),
            many => Err(EvalError::SelectorAmbiguous {
                selector: selector.to_string(),
                count: many.len(),
            }),
        }
    }

    fn evaluate_list(&self, selector: &str, optional: bool) -> Result<Vec<Self>, EvalError> {
        let matches = if selector.is_empty() {
            Vec::new()
        } else {
            self.resolve(selector)?
        };
        if matches.is_empty() && !optional {
            return Err(EvalError::SelectorEmpty(selector.to_string()));
        }
        Ok(matches
            .into_iter()
            .map(|place| XmlContext {
                doc: Arc::clone(&self.doc),
                place,
            })
            .collect())
    }
}
