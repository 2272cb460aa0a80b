//! Error types for request handling

use mockingjay_scripting::ScriptError;

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures inside a request cycle
///
/// None of these escape [`crate::RequestCycle::handle`]; they are logged and
/// turned into a 500 response there.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Core error (invalid response state, serialization, ...)
    #[error(transparent)]
    Core(#[from] mockingjay_core::Error),

    /// Script compile, runtime or not-callable error
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Session store error
    #[error("Session store error: {0}")]
    Store(#[from] mockingjay_state::Error),

    /// No resource at the given path
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Attempt to rebind a name owned by the cycle
    #[error("Binding '{0}' is reserved")]
    ReservedName(String),

    /// Template missing or failed to render
    #[error("Template error: {0}")]
    Template(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a template error
    pub fn template(message: impl Into<String>) -> Self {
        Error::Template(message.into())
    }
}
