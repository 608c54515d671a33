//! Weave - a document assembly engine.
//!
//! Merges a hierarchical XML data source into a marked-up document template
//! package, producing a fully rendered package plus an error indicator.
//! Isolated data problems never abort generation: a failing directive is
//! replaced by an inline error marker and the run's error flag is raised.
//!
//! The core is the directive tree transform ([`transform`]): a recursive
//! rewriter that recognizes `Content`, `Repeat`, `Table` and `Conditional`
//! nodes, evaluates their selectors against a pluggable [`DataContext`] and
//! substitutes each directive in place. Parts of a package are transformed
//! in parallel with serialized write-back ([`assemble`]).

pub mod assemble;
pub mod cli;
pub mod config;
pub mod data;
pub mod logger;
pub mod package;
pub mod transform;
pub mod tree;

pub use assemble::{AssembleError, AssemblyOutput, assemble, assemble_async, assemble_with_style};
pub use data::{DataContext, EvalError, xml::XmlDocument};
pub use transform::{ErrorFlag, MarkerStyle};
