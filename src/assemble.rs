//! Assembly entry point and part coordinator.
//!
//! `assemble` opens the template package, rejects templates that still carry
//! tracked revisions, then fans one directive-tree transform out per content
//! part. Parts share no tree state, so the compute phase runs fully parallel;
//! the package itself is not safe for concurrent structural writes, so
//! write-back goes through one mutex scoped to exactly that call. The
//! aggregated error flag is the logical OR of every part's contributions.
//!
//! `assemble_async` is the suspension-capable form: the same code path moved
//! onto the blocking pool, byte-identical output for identical inputs.

use crate::data::DataContext;
use crate::package::{Package, PackageError};
use crate::transform::{ErrorFlag, MarkerStyle, Rewriter};
use parking_lot::Mutex;
use rayon::prelude::*;
use thiserror::Error;

/// Fatal assembly failures. Soft per-directive problems never surface here;
/// they raise [`AssemblyOutput::had_errors`] instead.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("template contains tracked revisions; resolve them before assembly")]
    TrackedRevisions,

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error("assembly task panicked")]
    TaskPanicked,
}

/// The rendered package plus the aggregated error indicator.
#[derive(Debug)]
pub struct AssemblyOutput {
    pub bytes: Vec<u8>,
    /// True if any error marker was inserted anywhere in the document.
    pub had_errors: bool,
}

/// Merge `data` into the template package, blocking form.
pub fn assemble<C: DataContext>(
    template: &[u8],
    data: &C,
) -> Result<AssemblyOutput, AssembleError> {
    assemble_with_style(template, data, MarkerStyle::default())
}

/// [`assemble`] with caller-chosen error marker styling.
pub fn assemble_with_style<C: DataContext>(
    template: &[u8],
    data: &C,
    marker: MarkerStyle,
) -> Result<AssemblyOutput, AssembleError> {
    let mut package = Package::open(template)?;
    if package.has_tracked_revisions() {
        return Err(AssembleError::TrackedRevisions);
    }

    // Each detached tree is private to its transform; the root data context
    // is shared read-only across all parts
    let trees = package.detach_trees();
    let flag = ErrorFlag::new();
    let rewriter = Rewriter::new(&flag, marker);

    // Sole contention point: the package is fine with concurrent reads but
    // not concurrent structural writes, so write-back is serialized here
    let package = Mutex::new(package);
    trees.into_par_iter().enumerate().for_each(|(index, tree)| {
        let rewritten = rewriter.rewrite_part(&tree, data);
        package.lock().write_tree(index, rewritten);
    });

    let bytes = package.into_inner().serialize()?;
    Ok(AssemblyOutput {
        bytes,
        had_errors: flag.raised(),
    })
}

/// Merge `data` into the template package, suspension-capable form.
///
/// A thin scheduling adapter over [`assemble`]: identical semantics, the
/// work just runs on the blocking pool instead of the caller's task.
pub async fn assemble_async<C>(
    template: Vec<u8>,
    data: C,
) -> Result<AssemblyOutput, AssembleError>
where
    C: DataContext + 'static,
{
    tokio::task::spawn_blocking(move || assemble(&template, &data))
        .await
        .map_err(|_| AssembleError::TaskPanicked)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::xml::XmlDocument;
    use crate::package::tests::build_archive;

    const DATA: &[u8] = br#"
        <Invoice Paid="no">
            <Customer><Name>Ada</Name></Customer>
            <Lines>
                <Line><Desc>Widget</Desc></Line>
                <Line><Desc>Sprocket</Desc></Line>
            </Lines>
        </Invoice>"#;

    fn template() -> Vec<u8> {
        build_archive(&[
            (
                "content/body.xml",
                b"<Document><Paragraph><Content Select=\"Customer/Name\"/></Paragraph>\
                  <Repeat Select=\"//Line\" Optional=\"true\">\
                  <Paragraph><Content Select=\"Desc\"/></Paragraph></Repeat></Document>"
                    as &[u8],
            ),
            (
                "content/header1.xml",
                b"<Document><Paragraph><Conditional Select=\"@Paid\" NotMatch=\"yes\">\
                  <Run>UNPAID</Run></Conditional></Paragraph></Document>",
            ),
            ("meta/manifest.txt", b"opaque"),
        ])
    }

    fn body_text(output: &[u8], part: &str) -> String {
        let package = Package::open(output).unwrap();
        let index = package
            .parts()
            .iter()
            .position(|p| p.name == part)
            .unwrap();
        package.read_tree(index).gathered_text()
    }

    #[test]
    fn assemble_merges_every_part() {
        let data = XmlDocument::parse(DATA).unwrap();
        let out = assemble(&template(), &data).unwrap();
        assert!(!out.had_errors);
        assert_eq!(body_text(&out.bytes, "content/body.xml"), "AdaWidgetSprocket");
        assert_eq!(body_text(&out.bytes, "content/header1.xml"), "UNPAID");
    }

    #[test]
    fn assemble_is_deterministic_across_runs() {
        let data = XmlDocument::parse(DATA).unwrap();
        let first = assemble(&template(), &data).unwrap();
        let second = assemble(&template(), &data).unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn soft_errors_set_the_flag_but_still_render() {
        let template = build_archive(&[(
            "content/body.xml",
            b"<Document><Paragraph><Content Select=\"Customer/Missing\"/></Paragraph>\
              <Paragraph><Content Select=\"Customer/Name\"/></Paragraph></Document>"
                as &[u8],
        )]);
        let data = XmlDocument::parse(DATA).unwrap();
        let out = assemble(&template, &data).unwrap();
        assert!(out.had_errors);
        let text = body_text(&out.bytes, "content/body.xml");
        assert!(text.contains("matched no data"));
        assert!(text.contains("Ada"));
    }

    #[test]
    fn tracked_revisions_abort_before_any_transform() {
        let template = build_archive(&[(
            "content/body.xml",
            b"<Document><Ins><Run>added</Run></Ins></Document>" as &[u8],
        )]);
        let data = XmlDocument::parse(DATA).unwrap();
        assert!(matches!(
            assemble(&template, &data),
            Err(AssembleError::TrackedRevisions)
        ));
    }

    #[test]
    fn flag_aggregates_across_parts() {
        let template = build_archive(&[
            ("content/body.xml", b"<Document/>" as &[u8]),
            (
                "content/footer1.xml",
                b"<Document><Content Select=\"Nope\"/></Document>",
            ),
        ]);
        let data = XmlDocument::parse(DATA).unwrap();
        assert!(assemble(&template, &data).unwrap().had_errors);
    }

    #[tokio::test]
    async fn async_form_matches_blocking_output() {
        let data = XmlDocument::parse(DATA).unwrap();
        let blocking = assemble(&template(), &data).unwrap();
        let asynchronous = assemble_async(template(), data).await.unwrap();
        assert_eq!(blocking.bytes, asynchronous.bytes);
        assert_eq!(blocking.had_errors, asynchronous.had_errors);
    }
}
