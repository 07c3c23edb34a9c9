use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
pub enum DelimiterError {
    #[error("Delimiter '{name}' must not be empty")]
    Empty { name: &'static str },

    #[error("Delimiters '{first}' and '{second}' are both {value:?}")]
    Duplicate {
        first: &'static str,
        second: &'static str,
        value: String,
    },

    #[error("Delimiter '{inner}' ({inner_value:?}) occurs inside '{outer}' ({outer_value:?})")]
    Overlapping {
        inner: &'static str,
        inner_value: String,
        outer: &'static str,
        outer_value: String,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
pub enum SyntaxError {
    #[error("Unterminated tag opened at position {position}")]
    UnterminatedTag { position: usize },

    #[error("Invalid character {found:?} in tag key at position {position}")]
    InvalidKey { position: usize, found: char },

    #[error("Block close at position {position} has no open block")]
    UnexpectedBlockClose { position: usize },

    #[error("Expected a single tag, found {found:?} at position {position}")]
    NotATag { position: usize, found: String },
}

impl SyntaxError {
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::UnterminatedTag { position }
            | Self::InvalidKey { position, .. }
            | Self::UnexpectedBlockClose { position }
            | Self::NotATag { position, .. } => *position,
        }
    }
}

/// Everything that can go wrong while turning text into a tag tree.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
pub enum TemplateError {
    #[error("Configuration error: {0}")]
    Delimiters(#[from] DelimiterError),

    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxError),
}
