//! Data-source bindings.
//!
//! The transform engine only knows [`DataContext`]: a position inside some
//! hierarchical data source that can answer text, list and boolean queries
//! against a selector string. New data source kinds plug in by implementing
//! this trait; [`xml`] ships the reference XML/XPath-subset binding.

pub mod xml;

use thiserror::Error;

/// A selector evaluation failure.
///
/// These are soft errors: the transform catches them at the directive
/// boundary, raises the shared error flag and substitutes an inline marker.
/// A context implementation never touches the flag itself.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("selector `{0}` matched no data")]
    SelectorEmpty(String),

    #[error("selector `{selector}` matched {count} values, expected one")]
    SelectorAmbiguous { selector: String, count: usize },

    #[error("conditional requires exactly one of `Match` or `NotMatch`")]
    ConditionMisconfigured,

    #[error("malformed selector `{selector}`: {message}")]
    SelectorSyntax { selector: String, message: String },
}

/// A bound position in a hierarchical data source.
///
/// Contexts created by [`evaluate_list`](DataContext::evaluate_list) are
/// owned by the directive iteration that created them and consumed by
/// [`release`](DataContext::release) once that item's subtree has been
/// merged. Release takes `self`, so use-after-release is unrepresentable.
pub trait DataContext: Send + Sync + Sized {
    /// Resolve `selector` to at most one textual value.
    ///
    /// An empty selector returns empty text unconditionally. Zero matches
    /// return empty text when `optional`, otherwise [`EvalError::SelectorEmpty`].
    /// Two or more matches always fail with [`EvalError::SelectorAmbiguous`];
    /// optionality tolerates absence, never ambiguity.
    fn evaluate_text(&self, selector: &str, optional: bool) -> Result<String, EvalError>;

    /// Resolve `selector` to a child context per match, in document order.
    ///
    /// Zero matches return an empty list when `optional`, otherwise
    /// [`EvalError::SelectorEmpty`].
    fn evaluate_list(&self, selector: &str, optional: bool) -> Result<Vec<Self>, EvalError>;

    /// Decide a conditional: exactly one of `matches`/`not_matches` must be
    /// set, then the selector's (required) text is compared against it.
    fn evaluate_bool(
        &self,
        selector: &str,
        matches: Option<&str>,
        not_matches: Option<&str>,
    ) -> Result<bool, EvalError> {
        if matches.is_some() == not_matches.is_some() {
            return Err(EvalError::ConditionMisconfigured);
        }
        let text = self.evaluate_text(selector, false)?;
        Ok(match (matches, not_matches) {
            (Some(want), None) => text == want,
            (None, Some(reject)) => text != reject,
            _ => unreachable!(),
        })
    }

    /// End of life for a context produced by `evaluate_list`.
    fn release(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal context: one fixed text answer, no lists.
    struct Fixed(&'static str);

    impl DataContext for Fixed {
        fn evaluate_text(&self, _selector: &str, _optional: bool) -> Result<String, EvalError> {
            Ok(self.0.to_string())
        }
        fn evaluate_list(&self, selector: &str, _optional: bool) -> Result<Vec<Self>, EvalError> {
            Err(EvalError::SelectorEmpty(selector.to_string()))
        }
    }

    #[test]
    fn bool_requires_exactly_one_comparand() {
        let ctx = Fixed("yes");
        assert_eq!(
            ctx.evaluate_bool("x", None, None),
            Err(EvalError::ConditionMisconfigured)
        );
        assert_eq!(
            ctx.evaluate_bool("x", Some("yes"), Some("no")),
            Err(EvalError::ConditionMisconfigured)
        );
    }

    #[test]
    fn bool_match_and_not_match_semantics() {
        let ctx = Fixed("yes");
        assert_eq!(ctx.evaluate_bool("x", Some("yes"), None), Ok(true));
        assert_eq!(ctx.evaluate_bool("x", Some("no"), None), Ok(false));
        assert_eq!(ctx.evaluate_bool("x", None, Some("no")), Ok(true));
        assert_eq!(ctx.evaluate_bool("x", None, Some("yes")), Ok(false));
    }
}
