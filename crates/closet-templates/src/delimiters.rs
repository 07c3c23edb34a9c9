use closet_conf::DelimiterSettings;
use serde::Serialize;

use crate::error::DelimiterError;

const BLOCK_OPEN_MARKER: char = '#';
const BLOCK_CLOSE_MARKER: char = '/';

/// The tokens that make up tag syntax.
///
/// `open`, `close`, `sep` and `sub_sep` are validated once at construction:
/// none may be empty, equal to another, or contained in another. The block
/// markers are derived from `open` (`open#` and `open/`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Delimiters {
    open: String,
    close: String,
    sep: String,
    sub_sep: String,
    block_open: String,
    block_close: String,
}

impl Delimiters {
    pub fn new(
        open: impl Into<String>,
        close: impl Into<String>,
        sep: impl Into<String>,
        sub_sep: impl Into<String>,
    ) -> Result<Self, DelimiterError> {
        let open = open.into();
        let close = close.into();
        let sep = sep.into();
        let sub_sep = sub_sep.into();

        let named = [
            ("open", open.as_str()),
            ("close", close.as_str()),
            ("sep", sep.as_str()),
            ("sub_sep", sub_sep.as_str()),
        ];

        for (name, value) in named {
            if value.is_empty() {
                return Err(DelimiterError::Empty { name });
            }
        }

        for (i, &(first, first_value)) in named.iter().enumerate() {
            for &(second, second_value) in &named[i + 1..] {
                if first_value == second_value {
                    return Err(DelimiterError::Duplicate {
                        first,
                        second,
                        value: first_value.to_string(),
                    });
                }
                let (inner, inner_value, outer, outer_value) =
                    if first_value.len() <= second_value.len() {
                        (first, first_value, second, second_value)
                    } else {
                        (second, second_value, first, first_value)
                    };
                if outer_value.contains(inner_value) {
                    return Err(DelimiterError::Overlapping {
                        inner,
                        inner_value: inner_value.to_string(),
                        outer,
                        outer_value: outer_value.to_string(),
                    });
                }
            }
        }

        let block_open = format!("{open}{BLOCK_OPEN_MARKER}");
        let block_close = format!("{open}{BLOCK_CLOSE_MARKER}");

        Ok(Self {
            open,
            close,
            sep,
            sub_sep,
            block_open,
            block_close,
        })
    }

    #[must_use]
    pub fn open(&self) -> &str {
        &self.open
    }

    #[must_use]
    pub fn close(&self) -> &str {
        &self.close
    }

    #[must_use]
    pub fn sep(&self) -> &str {
        &self.sep
    }

    #[must_use]
    pub fn sub_sep(&self) -> &str {
        &self.sub_sep
    }

    #[must_use]
    pub fn block_open(&self) -> &str {
        &self.block_open
    }

    #[must_use]
    pub fn block_close(&self) -> &str {
        &self.block_close
    }

    /// Wraps `inner` in the inline tag delimiters.
    #[must_use]
    pub fn wrap(&self, inner: &str) -> String {
        format!("{}{inner}{}", self.open, self.close)
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            open: "[[".to_string(),
            close: "]]".to_string(),
            sep: "::".to_string(),
            sub_sep: "||".to_string(),
            block_open: "[[#".to_string(),
            block_close: "[[/".to_string(),
        }
    }
}

impl TryFrom<&DelimiterSettings> for Delimiters {
    type Error = DelimiterError;

    fn try_from(settings: &DelimiterSettings) -> Result<Self, Self::Error> {
        Self::new(
            settings.open.clone(),
            settings.close.clone(),
            settings.sep.clone(),
            settings.sub_sep.clone(),
        )
    }
}
