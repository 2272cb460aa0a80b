//! Script execution error types

use std::fmt;

/// Script execution result type
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Script execution error
#[derive(Debug, Clone)]
pub enum ScriptError {
    /// Script compilation/parsing error
    CompilationError {
        /// Error message
        message: String,
        /// Line number if available
        line: Option<usize>,
        /// Column number if available
        column: Option<usize>,
    },

    /// Uncaught script runtime error
    RuntimeError {
        /// Error message
        message: String,
        /// Script line where error occurred
        line: Option<usize>,
    },

    /// Attempt to invoke a value that is not a function
    NotCallable {
        /// Type of the value that was invoked
        type_name: String,
    },

    /// Type conversion error
    TypeError {
        /// Error message
        message: String,
    },

    /// IO error (reading script streams)
    IoError {
        /// Error message
        message: String,
    },
}

impl ScriptError {
    /// Create a compilation error
    pub fn compilation<S: Into<String>>(message: S) -> Self {
        Self::CompilationError {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Create a runtime error
    pub fn runtime<S: Into<String>>(message: S) -> Self {
        Self::RuntimeError {
            message: message.into(),
            line: None,
        }
    }

    /// Create a not-callable error
    pub fn not_callable<S: Into<String>>(type_name: S) -> Self {
        Self::NotCallable {
            type_name: type_name.into(),
        }
    }

    /// Create a type error
    pub fn type_error<S: Into<String>>(message: S) -> Self {
        Self::TypeError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompilationError {
                message,
                line,
                column,
            } => {
                write!(f, "Script compilation error: {}", message)?;
                if let Some(line) = line {
                    write!(f, " at line {}", line)?;
                    if let Some(col) = column {
                        write!(f, ", column {}", col)?;
                    }
                }
                Ok(())
            }
            Self::RuntimeError { message, line } => {
                write!(f, "Script runtime error: {}", message)?;
                if let Some(line) = line {
                    write!(f, " at line {}", line)?;
                }
                Ok(())
            }
            Self::NotCallable { type_name } => {
                write!(f, "Value of type '{}' is not callable", type_name)
            }
            Self::TypeError { message } => {
                write!(f, "Script type error: {}", message)
            }
            Self::IoError { message } => {
                write!(f, "Script IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<std::io::Error> for ScriptError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            message: err.to_string(),
        }
    }
}

impl From<rhai::ParseError> for ScriptError {
    fn from(err: rhai::ParseError) -> Self {
        let pos = err.1;
        Self::CompilationError {
            message: err.0.to_string(),
            line: pos.line(),
            column: pos.position(),
        }
    }
}

impl From<Box<rhai::EvalAltResult>> for ScriptError {
    fn from(err: Box<rhai::EvalAltResult>) -> Self {
        let line = err.position().line();
        Self::RuntimeError {
            message: err.to_string(),
            line,
        }
    }
}
