//! HTML template rendering seam

use crate::context::ContextHandle;
use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::trace;

/// Renders a template path to HTML
///
/// A failing render is the signal the cycle watches for: when the context
/// has requested a switch (see [`ContextHandle::switch_to`]) the failure is
/// recovered by rendering the switch target instead.
pub trait TemplateEngine: Send + Sync {
    /// Render the template at `path`
    fn process(&self, path: &str, context: &ContextHandle) -> Result<String>;
}

impl<F> TemplateEngine for F
where
    F: Fn(&str, &ContextHandle) -> Result<String> + Send + Sync,
{
    fn process(&self, path: &str, context: &ContextHandle) -> Result<String> {
        self(path, context)
    }
}

/// Serves template files from a directory verbatim
#[derive(Debug, Clone)]
pub struct FileTemplateEngine {
    root: PathBuf,
    extension: String,
}

impl FileTemplateEngine {
    /// Create an engine reading `<root>/<path>.<extension>`
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }
}

impl TemplateEngine for FileTemplateEngine {
    fn process(&self, path: &str, _context: &ContextHandle) -> Result<String> {
        let name = match path.trim_matches('/') {
            "" => "index",
            name => name,
        };
        if name.split('/').any(|segment| segment == "..") {
            return Err(Error::template(format!("invalid template path: {path}")));
        }

        let file = self.root.join(format!("{name}.{}", self.extension));
        trace!(template = %file.display(), "Rendering template");
        fs::read_to_string(&file).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::template(format!("template not found: {name}")),
            _ => Error::template(format!("failed to read template {name}: {e}")),
        })
    }
}
