//! Pipeline error types

use thiserror::Error;

use crate::content::Identity;

/// Result alias for pipeline operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A pipeline failure for a single content item
#[derive(Error, Debug)]
#[error("{identity}: {kind}")]
pub struct Error {
    /// The content item the failure belongs to
    pub identity: Identity,
    /// What went wrong
    pub kind: ErrorKind,
}

/// Taxonomy of pipeline failures
#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("malformed front matter at line {line}: {message}")]
    MalformedFrontMatter { line: usize, message: String },

    #[error("unterminated `{directive}` block opened at line {line}")]
    UnterminatedBlock { directive: String, line: usize },

    #[error("duplicate slot `{name}` at line {line} (first declared at line {first_line})")]
    DuplicateSlot {
        name: String,
        line: usize,
        first_line: usize,
    },

    #[error("directive nesting deeper than {limit} levels at line {line}")]
    NestingTooDeep { line: usize, limit: usize },

    #[error("unknown layout `{layout}`")]
    UnknownLayout { layout: String },

    #[error("layout `{layout}` requires slot `{slot}`")]
    MissingRequiredSlot { layout: String, slot: String },

    /// `line` is the content line involved, absent when both bindings come
    /// from layout defaults
    #[error("slot `{slot}` bound more than once{}", at_line(.line))]
    DuplicateSlotBinding { slot: String, line: Option<usize> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn new(identity: impl Into<Identity>, kind: impl Into<ErrorKind>) -> Self {
        Self {
            identity: identity.into(),
            kind: kind.into(),
        }
    }

    /// Source line of the failure, when it has one
    pub fn line(&self) -> Option<usize> {
        match &self.kind {
            ErrorKind::MalformedFrontMatter { line, .. }
            | ErrorKind::UnterminatedBlock { line, .. }
            | ErrorKind::DuplicateSlot { line, .. }
            | ErrorKind::NestingTooDeep { line, .. } => Some(*line),
            ErrorKind::DuplicateSlotBinding { line, .. } => *line,
            ErrorKind::UnknownLayout { .. }
            | ErrorKind::MissingRequiredSlot { .. }
            | ErrorKind::Io(_) => None,
        }
    }
}

fn at_line(line: &Option<usize>) -> String {
    line.map(|line| format!(" (line {})", line)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_identity_and_line() {
        let err = Error::new(
            "posts/hello.md",
            ErrorKind::UnterminatedBlock {
                directive: "slot".to_string(),
                line: 7,
            },
        );
        assert_eq!(
            err.to_string(),
            "posts/hello.md: unterminated `slot` block opened at line 7"
        );
        assert_eq!(err.line(), Some(7));
    }

    #[test]
    fn test_layout_errors_have_no_line() {
        let err = Error::new(
            "index.md",
            ErrorKind::UnknownLayout {
                layout: "nope".to_string(),
            },
        );
        assert_eq!(err.line(), None);
    }

    #[test]
    fn test_duplicate_binding_line_is_optional() {
        let err = Error::new(
            "a.md",
            ErrorKind::DuplicateSlotBinding {
                slot: "note".to_string(),
                line: None,
            },
        );
        assert_eq!(err.to_string(), "a.md: slot `note` bound more than once");
        assert_eq!(err.line(), None);

        let err = Error::new(
            "a.md",
            ErrorKind::DuplicateSlotBinding {
                slot: "note".to_string(),
                line: Some(4),
            },
        );
        assert_eq!(err.to_string(), "a.md: slot `note` bound more than once (line 4)");
        assert_eq!(err.line(), Some(4));
    }
}
