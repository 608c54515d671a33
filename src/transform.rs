//! Directive tree transform: the recursive rewriter at the core of assembly.
//!
//! Walks one part's content tree, recognizes the four directive tags
//! (`Content`, `Repeat`, `Table`, `Conditional`), evaluates each directive's
//! selector against a [`DataContext`] and substitutes a replacement subtree.
//! Non-directive elements are rebuilt with their children rewritten against
//! the same context, so directives compose anywhere in the tree.
//!
//! Evaluation failures never abort the walk: the failing directive (or, for
//! tables, the failing cell alone) is replaced by an inline error marker and
//! the shared [`ErrorFlag`] is raised. The finished document always renders.

use crate::data::{DataContext, EvalError};
use crate::tree::{BOOKMARK_TAGS, Element, Node};
use std::sync::atomic::{AtomicBool, Ordering};

/// Reserved directive tags.
pub const DIRECTIVE_TAGS: [&str; 4] = ["Content", "Repeat", "Table", "Conditional"];

/// Aggregated per-run error indicator.
///
/// Raised (never lowered) by any evaluator that could not be satisfied;
/// shared across all concurrently transforming parts, read once at the end.
#[derive(Debug, Default)]
pub struct ErrorFlag(AtomicBool);

impl ErrorFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Visual styling for inline error markers.
#[derive(Debug, Clone)]
pub struct MarkerStyle {
    /// `Color` attribute on marker runs (RRGGBB).
    pub color: String,
    /// Text prepended to the error message.
    pub prefix: String,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        MarkerStyle {
            color: "FF0000".to_string(),
            prefix: "Error: ".to_string(),
        }
    }
}

/// The rewriter for one assembly run. Cheap to share by reference across
/// part transforms; all per-run state lives in the [`ErrorFlag`].
#[derive(Debug)]
pub struct Rewriter<'a> {
    flag: &'a ErrorFlag,
    marker: MarkerStyle,
}

impl<'a> Rewriter<'a> {
    pub fn new(flag: &'a ErrorFlag, marker: MarkerStyle) -> Self {
        Rewriter { flag, marker }
    }

    /// Rewrite a whole part. The part root itself is never a directive; its
    /// children are rewritten against the part's root context.
    pub fn rewrite_part<C: DataContext>(&self, root: &Element, ctx: &C) -> Element {
        Element {
            name: root.name.clone(),
            attrs: root.attrs.clone(),
            children: self.rewrite_nodes(&root.children, ctx),
        }
    }

    fn rewrite_nodes<C: DataContext>(&self, nodes: &[Node], ctx: &C) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Text(t) => out.push(Node::Text(t.clone())),
                Node::Element(el) => out.extend(self.rewrite_element(el, ctx)),
            }
        }
        out
    }

    /// One element: dispatch on the directive tag, or recurse by default.
    /// Returns the replacement sequence; empty means the element disappears.
    fn rewrite_element<C: DataContext>(&self, el: &Element, ctx: &C) -> Vec<Node> {
        match el.name.as_str() {
            "Content" => self.content_directive(el, ctx),
            "Repeat" => self.repeat_directive(el, ctx),
            "Table" => self.table_directive(el, ctx),
            "Conditional" => self.conditional_directive(el, ctx),
            _ => vec![Node::Element(Element {
                name: el.name.clone(),
                attrs: el.attrs.clone(),
                children: self.rewrite_nodes(&el.children, ctx),
            })],
        }
    }

    // ========================================================================
    // Directives
    // ========================================================================

    fn content_directive<C: DataContext>(&self, el: &Element, ctx: &C) -> Vec<Node> {
        let select = el.attr("Select").unwrap_or_default();
        match ctx.evaluate_text(select, is_optional(el)) {
            Ok(text) => vec![substitute_text(el, &text)],
            Err(err) => vec![self.soft_error(&err)],
        }
    }

    fn repeat_directive<C: DataContext>(&self, el: &Element, ctx: &C) -> Vec<Node> {
        let select = el.attr("Select").unwrap_or_default();
        let items = match ctx.evaluate_list(select, is_optional(el)) {
            Ok(items) => items,
            Err(err) => return vec![self.soft_error(&err)],
        };

        // An empty (optional) list removes the directive and its template
        // content entirely
        let mut out = Vec::new();
        for item in items {
            out.extend(self.rewrite_nodes(&el.children, &item));
            item.release();
        }
        out
    }

    fn conditional_directive<C: DataContext>(&self, el: &Element, ctx: &C) -> Vec<Node> {
        let select = el.attr("Select").unwrap_or_default();
        match ctx.evaluate_bool(select, el.attr("Match"), el.attr("NotMatch")) {
            Ok(true) => self.rewrite_nodes(&el.children, ctx),
            Ok(false) => Vec::new(),
            Err(err) => vec![self.soft_error(&err)],
        }
    }

    /// Row-based repetition over a `Grid` with a header row, one prototype
    /// row and optional trailing footer rows.
    fn table_directive<C: DataContext>(&self, el: &Element, ctx: &C) -> Vec<Node> {
        // Structural checks come first: item contexts must not be fanned out
        // on a path that cannot consume and release them
        let Some(grid) = el.first_descendant("Grid") else {
            return vec![self.soft_message("Table directive contains no Grid")];
        };
        let rows: Vec<&Element> = grid.elements().filter(|e| e.name == "Row").collect();
        if rows.len() < 2 {
            return vec![self.soft_message("table needs a header row and a prototype row")];
        }
        // Duplicated bookmark ids across generated rows are invalid
        let prototype = rows[1].without(&BOOKMARK_TAGS);

        // Absence alone is never a hard error at the fetch; the empty-list
        // case below still surfaces it as one (empty data-bound tables are
        // authoring mistakes worth flagging)
        let select = el.attr("Select").unwrap_or_default();
        let items = match ctx.evaluate_list(select, true) {
            Ok(items) => items,
            Err(err) => return vec![self.soft_error(&err)],
        };
        if items.is_empty() {
            return vec![self.soft_message(&format!("no data for table `{select}`"))];
        }

        let mut generated = Vec::with_capacity(items.len());
        for item in items {
            generated.push(Node::Element(self.fill_row(&prototype, &item)));
            item.release();
        }

        // Rebuild the grid preserving non-row children (column specs etc.)
        // in place: header verbatim, prototype slot -> generated rows,
        // later rows -> footer rows transformed against the table context
        let mut row_index = 0usize;
        let mut children = Vec::new();
        for child in &grid.children {
            match child {
                Node::Element(e) if e.name == "Row" => {
                    match row_index {
                        0 => children.push(child.clone()),
                        1 => children.append(&mut generated),
                        _ => children.extend(self.rewrite_element(e, ctx)),
                    }
                    row_index += 1;
                }
                other => children.push(other.clone()),
            }
        }

        vec![Node::Element(Element {
            name: grid.name.clone(),
            attrs: grid.attrs.clone(),
            children,
        })]
    }

    /// One generated row: every prototype cell's own paragraph text is the
    /// selector, evaluated against the item's context. A failing cell is
    /// replaced by a marker cell; the row and table carry on.
    fn fill_row<C: DataContext>(&self, prototype: &Element, item: &C) -> Element {
        let mut row = Element {
            name: prototype.name.clone(),
            attrs: prototype.attrs.clone(),
            children: Vec::new(),
        };
        for child in &prototype.children {
            let Node::Element(cell) = child else {
                row.children.push(child.clone());
                continue;
            };
            if cell.name != "Cell" {
                row.children.push(child.clone());
                continue;
            }
            let selector = cell.gathered_text();
            let filled = match item.evaluate_text(selector.trim(), false) {
                Ok(text) => fill_cell(cell, &text),
                Err(err) => {
                    self.flag.raise();
                    Element {
                        name: cell.name.clone(),
                        attrs: cell.attrs.clone(),
                        children: vec![Node::Element(
                            Element::new("Paragraph").with_child(self.marker_run(&err.to_string())),
                        )],
                    }
                }
            };
            row.children.push(Node::Element(filled));
        }
        row
    }

    // ========================================================================
    // Error markers
    // ========================================================================

    fn soft_error(&self, err: &EvalError) -> Node {
        self.flag.raise();
        self.marker_run(&err.to_string())
    }

    fn soft_message(&self, message: &str) -> Node {
        self.flag.raise();
        self.marker_run(message)
    }

    /// A visually distinct run carrying the error message, substituted in the
    /// failed directive's structural position.
    fn marker_run(&self, message: &str) -> Node {
        Node::Element(
            Element::new("Run")
                .with_attr("Color", self.marker.color.clone())
                .with_attr("Bold", "true")
                .with_text(format!("{}{}", self.marker.prefix, message)),
        )
    }
}

/// Number of directive nodes in a subtree (used by `weave inspect`).
pub fn directive_count(el: &Element) -> usize {
    let own = usize::from(DIRECTIVE_TAGS.contains(&el.name.as_str()));
    own + el.elements().map(directive_count).sum::<usize>()
}

fn is_optional(el: &Element) -> bool {
    el.attr("Optional").is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Replacement for a resolved `Content` directive: a single run of the new
/// text wearing the formatting the template author put inside the directive.
fn substitute_text(el: &Element, text: &str) -> Node {
    let run_attrs = el
        .first_descendant("Run")
        .map(|run| run.attrs.clone())
        .unwrap_or_default();
    let mut run = Element::new("Run");
    run.attrs = run_attrs;
    if !text.is_empty() {
        run.children.push(Node::Text(text.to_string()));
    }
    match el.first_descendant("Paragraph") {
        Some(para) => {
            let mut out = Element::new("Paragraph");
            out.attrs = para.attrs.clone();
            out.children.push(Node::Element(run));
            Node::Element(out)
        }
        None => Node::Element(run),
    }
}

/// A generated table cell: prototype cell formatting, first-run formatting,
/// new text.
fn fill_cell(prototype: &Element, text: &str) -> Element {
    let mut run = Element::new("Run");
    run.attrs = prototype
        .first_descendant("Run")
        .map(|r| r.attrs.clone())
        .unwrap_or_default();
    if !text.is_empty() {
        run.children.push(Node::Text(text.to_string()));
    }
    let mut para = Element::new("Paragraph");
    para.attrs = prototype
        .first_descendant("Paragraph")
        .map(|p| p.attrs.clone())
        .unwrap_or_default();
    para.children.push(Node::Element(run));
    Element {
        name: prototype.name.clone(),
        attrs: prototype.attrs.clone(),
        children: vec![Node::Element(para)],
    }
}
