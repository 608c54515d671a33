//! Template package store: a ZIP archive with one XML file per content part.
//!
//! Recognized entries live under `content/`:
//!
//! | entry                         | part            |
//! |-------------------------------|-----------------|
//! | `content/body.xml`            | body (required) |
//! | `content/header*.xml`         | header          |
//! | `content/footer*.xml`         | footer          |
//! | `content/footnotes.xml`       | footnotes       |
//! | `content/endnotes.xml`        | endnotes        |
//!
//! Anything else is preserved verbatim through assembly. Entries are sorted
//! by name on open so output bytes do not depend on archive order.
//!
//! A `Package` is safe to read from many threads, but structural writes
//! (`write_tree`) must be externally serialized; the part coordinator owns
//! the mutex.

use crate::tree::{self, Element, REVISION_TAGS, TreeError};
use std::fmt;
use std::io::{Cursor, Read, Write};
use thiserror::Error;
use zip::{ZipArchive, ZipWriter, write::SimpleFileOptions};

const XML_DECL: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Package errors; all fatal for the assembly run.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("template is not a readable package archive")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to read package entry `{name}`")]
    Entry {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("part `{name}` is not well-formed")]
    Part {
        name: String,
        #[source]
        source: TreeError,
    },

    #[error("package has no `content/body.xml` part")]
    MissingBody,
}

/// Which independently addressable unit of the template a part is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Body,
    Header,
    Footer,
    Footnotes,
    Endnotes,
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PartKind::Body => "body",
            PartKind::Header => "header",
            PartKind::Footer => "footer",
            PartKind::Footnotes => "footnotes",
            PartKind::Endnotes => "endnotes",
        };
        f.write_str(label)
    }
}

fn classify(name: &str) -> Option<PartKind> {
    let rest = name.strip_prefix("content/")?;
    let stem = rest.strip_suffix(".xml")?;
    match stem {
        "body" => Some(PartKind::Body),
        "footnotes" => Some(PartKind::Footnotes),
        "endnotes" => Some(PartKind::Endnotes),
        _ if stem.starts_with("header") => Some(PartKind::Header),
        _ if stem.starts_with("footer") => Some(PartKind::Footer),
        _ => None,
    }
}

/// One content part: archive name, kind and its parsed tree.
#[derive(Debug)]
pub struct Part {
    pub name: String,
    pub kind: PartKind,
    tree: Element,
}

/// An opened template package: parsed content parts plus untouched extras.
#[derive(Debug)]
pub struct Package {
    parts: Vec<Part>,
    extras: Vec<(String, Vec<u8>)>,
}

impl Package {
    /// Open a package from raw bytes, parsing every content part.
    pub fn open(bytes: &[u8]) -> Result<Self, PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::new();
        let mut extras = Vec::new();

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut content = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut content)
                .map_err(|source| PackageError::Entry {
                    name: name.clone(),
                    source,
                })?;

            match classify(&name) {
                Some(kind) => {
                    let tree = tree::parse(&content).map_err(|source| PackageError::Part {
                        name: name.clone(),
                        source,
                    })?;
                    parts.push(Part { name, kind, tree });
                }
                None => extras.push((name, content)),
            }
        }

        if !parts.iter().any(|p| p.kind == PartKind::Body) {
            return Err(PackageError::MissingBody);
        }

        // Canonical order: output bytes must not depend on archive order
        parts.sort_by(|a, b| a.name.cmp(&b.name));
        extras.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Package { parts, extras })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// True if any part still carries tracked-revision markup.
    pub fn has_tracked_revisions(&self) -> bool {
        self.parts.iter().any(|p| p.tree.contains_any(&REVISION_TAGS))
    }

    pub fn read_tree(&self, index: usize) -> &Element {
        &self.parts[index].tree
    }

    /// Move every part's tree out, leaving empty slots to be refilled via
    /// [`write_tree`](Self::write_tree). Runs before the parallel phase; each
    /// detached tree is then private to its own transform.
    pub fn detach_trees(&mut self) -> Vec<Element> {
        self.parts
            .iter_mut()
            .map(|p| std::mem::take(&mut p.tree))
            .collect()
    }

    /// Put a transformed tree back into its part slot. Not safe for
    /// concurrent structural writes; callers serialize (§ part coordinator).
    pub fn write_tree(&mut self, index: usize, tree: Element) {
        self.parts[index].tree = tree;
    }

    /// Serialize the package back to archive bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, PackageError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        for part in &self.parts {
            writer.start_file(part.name.as_str(), options)?;
            let body = tree::to_bytes(&part.tree).map_err(|source| PackageError::Part {
                name: part.name.clone(),
                source,
            })?;
            write_entry(&mut writer, &part.name, XML_DECL)?;
            write_entry(&mut writer, &part.name, &body)?;
        }
        for (name, content) in &self.extras {
            writer.start_file(name.as_str(), options)?;
            write_entry(&mut writer, name, content)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

fn write_entry(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    bytes: &[u8],
) -> Result<(), PackageError> {
    writer.write_all(bytes).map_err(|source| PackageError::Entry {
        name: name.to_string(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a package archive from (name, content) pairs. Shared with the
    /// assembly tests.
    pub(crate) fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn open_classifies_parts_and_keeps_extras() {
        let bytes = build_archive(&[
            ("content/body.xml", b"<Document/>"),
            ("content/header1.xml", b"<Document/>"),
            ("content/footer1.xml", b"<Document/>"),
            ("content/footnotes.xml", b"<Document/>"),
            ("meta/manifest.txt", b"opaque"),
        ]);
        let package = Package::open(&bytes).unwrap();
        let kinds: Vec<PartKind> = package.parts().iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            [
                PartKind::Body,
                PartKind::Footer,
                PartKind::Footnotes,
                PartKind::Header
            ]
        );
        assert_eq!(package.extras.len(), 1);
    }

    #[test]
    fn open_requires_a_body_part() {
        let bytes = build_archive(&[("content/header1.xml", b"<Document/>")]);
        assert!(matches!(
            Package::open(&bytes),
            Err(PackageError::MissingBody)
        ));
    }

    #[test]
    fn open_rejects_malformed_parts() {
        let bytes = build_archive(&[("content/body.xml", b"<Document>")]);
        assert!(matches!(Package::open(&bytes), Err(PackageError::Part { .. })));
    }

    #[test]
    fn serialize_preserves_extras_verbatim() {
        let bytes = build_archive(&[
            ("content/body.xml", b"<Document><Run>x</Run></Document>"),
            ("meta/manifest.txt", b"opaque"),
        ]);
        let package = Package::open(&bytes).unwrap();
        let out = Package::open(&package.serialize().unwrap()).unwrap();
        assert_eq!(out.extras, vec![("meta/manifest.txt".to_string(), b"opaque".to_vec())]);
        assert_eq!(out.read_tree(0).gathered_text(), "x");
    }

    #[test]
    fn serialize_is_deterministic() {
        let bytes = build_archive(&[
            ("content/body.xml", b"<Document><Run>x</Run></Document>"),
            ("content/header1.xml", b"<Document/>"),
        ]);
        let a = Package::open(&bytes).unwrap().serialize().unwrap();
        let b = Package::open(&bytes).unwrap().serialize().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tracked_revisions_are_detected_in_any_part() {
        let bytes = build_archive(&[
            ("content/body.xml", b"<Document/>"),
            ("content/footer1.xml", b"<Document><Del><Run>old</Run></Del></Document>"),
        ]);
        assert!(Package::open(&bytes).unwrap().has_tracked_revisions());
    }

    #[test]
    fn detach_and_write_round_trip() {
        let bytes = build_archive(&[("content/body.xml", b"<Document><Run>x</Run></Document>")]);
        let mut package = Package::open(&bytes).unwrap();
        let trees = package.detach_trees();
        assert_eq!(trees.len(), 1);
        package.write_tree(0, trees.into_iter().next().unwrap());
        assert_eq!(package.read_tree(0).gathered_text(), "x");
    }
}
