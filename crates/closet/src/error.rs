use closet_templates::SyntaxError;
use thiserror::Error;

/// Error returned by a filter handler. Handlers can use `?` on anything that
/// converts into [`anyhow::Error`].
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FilterError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Why a single tag could not be resolved. The render loop decides what to do
/// with it according to the renderer's failure policy.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No filter registered for '{key}'")]
    FilterNotFound { key: String },

    #[error("Filter '{key}' failed: {source}")]
    Filter {
        key: String,
        #[source]
        source: FilterError,
    },

    #[error("Tag text no longer parses: {0}")]
    Syntax(#[from] SyntaxError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Rendering aborted in iteration {iteration}: {source}")]
    Aborted {
        iteration: usize,
        #[source]
        source: DispatchError,
    },
}
