//! Soft failures
//!
//! A few steps of the pipeline are best-effort: a foreign key lookup the
//! backend cannot answer, sample rows for the prompt, or an oracle reply that
//! is not the JSON we asked for. Those steps return a [`Soft`] value instead of
//! an error so callers (and tests) can see that a fallback was taken.

use crate::Result;

/// The outcome of a best-effort step.
#[derive(Debug, Clone, PartialEq)]
pub enum Soft<T> {
    /// The step succeeded
    Ok(T),
    /// The step failed and `value` is the default that replaces its result
    Fallback { value: T, reason: String },
}

impl<T> Soft<T> {
    /// Collapse a result, using `fallback` to build the default on error
    pub fn from_result(result: Result<T>, fallback: impl FnOnce() -> T) -> Self {
        match result {
            Ok(value) => Soft::Ok(value),
            Err(e) => Soft::Fallback {
                value: fallback(),
                reason: e.to_string(),
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Soft::Fallback { .. })
    }

    /// Reason the fallback was taken, if it was
    pub fn reason(&self) -> Option<&str> {
        match self {
            Soft::Ok(_) => None,
            Soft::Fallback { reason, .. } => Some(reason),
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Soft::Ok(value) | Soft::Fallback { value, .. } => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AskdbError;

    #[test]
    fn test_ok_result_is_not_fallback() {
        let soft = Soft::from_result(Ok(vec![1, 2]), Vec::new);
        assert!(!soft.is_fallback());
        assert_eq!(soft.reason(), None);
        assert_eq!(soft.into_inner(), vec![1, 2]);
    }

    #[test]
    fn test_error_collapses_to_default() {
        let soft: Soft<Vec<i32>> = Soft::from_result(
            Err(AskdbError::IntrospectionError("no foreign keys".to_string())),
            Vec::new,
        );
        assert!(soft.is_fallback());
        assert!(soft.reason().unwrap().contains("no foreign keys"));
        assert!(soft.into_inner().is_empty());
    }
}
