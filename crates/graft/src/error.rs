//! error taxonomy
//!
//! Hard failures are [Error]s. Independent failures from one evaluation are
//! collected into a [MultiError]. Recoverable conditions that only deserve a
//! diagnostic are [Warning]s and never fail a run.
use crate::cursor::Cursor;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("syntax error in `{input}` at position {position}: {problem}")]
    Syntax {
        input: String,
        problem: String,
        position: usize,
    },

    #[error("`{path}` could not be found in the datastructure")]
    NotFound { path: String },

    #[error("`{path}` is a {actual}, expected {wanted}")]
    TypeMismatch {
        path: String,
        wanted: String,
        actual: String,
    },

    #[error("cycle detected in operator data flow between {}; you seem to have a self-referencing dataset", .paths.join(", "))]
    Cycle { paths: Vec<String> },

    #[error("hit max recursion depth of {depth} evaluation rounds; you seem to have a self-referencing dataset")]
    MaxRecursion { depth: usize },

    #[error("depends on `{dependency}`, which failed to evaluate")]
    DependencyFailed { dependency: String },

    #[error("{0}")]
    Message(String),

    #[error("{at}: {source}")]
    At { at: String, source: Box<Error> },

    #[error(transparent)]
    Multi(#[from] MultiError),
}

impl Error {
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }

    pub fn not_found(path: &Cursor) -> Self {
        Error::NotFound {
            path: path.rooted(),
        }
    }

    pub fn type_mismatch(path: &Cursor, wanted: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::TypeMismatch {
            path: path.rooted(),
            wanted: wanted.into(),
            actual: actual.into(),
        }
    }

    /// Attach the location of the operator call that produced this error
    pub fn at(self, location: &Cursor) -> Self {
        Error::At {
            at: location.rooted(),
            source: Box::new(self),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::At { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Errors from independent evaluation branches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiError {
    pub errors: Vec<Error>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error, flattening nested [MultiError]s
    pub fn append(&mut self, error: Error) {
        match error {
            Error::Multi(multi) => self.errors.extend(multi.errors),
            error => self.errors.push(error),
        }
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = Error>) {
        for error in errors {
            self.append(error);
        }
    }

    pub fn count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok` when nothing was collected, otherwise the errors sorted by message
    pub fn into_result(mut self) -> Result<(), Error> {
        if self.errors.is_empty() {
            return Ok(());
        }

        self.errors.sort_by_cached_key(ToString::to_string);
        Err(Error::Multi(self))
    }
}

impl std::error::Error for MultiError {}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} error(s) detected:", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, " - {error}")?;
        }
        Ok(())
    }
}

/// A recoverable condition, reported but never fatal
#[derive(Debug, Clone, PartialEq)]
pub struct Warning(pub String);

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn multi_error_is_sorted_and_flattened() {
        let mut inner = MultiError::new();
        inner.append(Error::msg("b went wrong"));

        let mut errors = MultiError::new();
        errors.append(Error::msg("c went wrong"));
        errors.append(Error::Multi(inner));
        errors.append(Error::msg("a went wrong"));
        assert_eq!(errors.count(), 3);

        let rendered = errors.into_result().unwrap_err().to_string();
        assert_eq!(
            rendered,
            "3 error(s) detected:\n - a went wrong\n - b went wrong\n - c went wrong\n"
        );
    }

    #[test]
    fn multi_error_keeps_duplicate_messages() {
        let mut errors = MultiError::new();
        errors.append(Error::msg("same"));
        errors.append(Error::msg("same"));
        assert_eq!(errors.count(), 2);
    }

    #[test]
    fn empty_multi_error_is_ok() {
        assert_eq!(MultiError::new().into_result(), Ok(()));
    }

    #[test]
    fn located_errors_render_their_location() {
        let at: Cursor = "meta.name".parse().unwrap();
        let err = Error::msg("boom").at(&at);
        assert_eq!(err.to_string(), "$.meta.name: boom");
    }

    #[test]
    fn not_found_survives_location() {
        let path: Cursor = "a.b".parse().unwrap();
        let err = Error::not_found(&path).at(&path);
        assert!(err.is_not_found());
        assert!(!Error::msg("x").is_not_found());
    }
}
