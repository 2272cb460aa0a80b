//! Script resource lookup

use crate::error::{Error, Result};
use bytes::Bytes;
use dashmap::DashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// A readable script resource
pub struct Resource {
    path: String,
    reader: Box<dyn Read + Send>,
}

impl Resource {
    /// Wrap a reader
    pub fn new(path: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            path: path.into(),
            reader: Box::new(reader),
        }
    }

    /// Resource backed by in-memory content
    pub fn from_bytes(path: impl Into<String>, content: Bytes) -> Self {
        Self::new(path, Cursor::new(content))
    }

    /// Resource path relative to the mock root
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Consume into the underlying stream
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.reader
    }
}

impl Read for Resource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource").field("path", &self.path).finish()
    }
}

/// Resolves resource paths (relative, `/`-separated) to readable streams
pub trait ResourceResolver: Send + Sync + fmt::Debug {
    /// Open a resource
    fn resolve(&self, path: &str) -> Result<Resource>;

    /// Every resource whose name ends with `extension`
    fn list_scripts(&self, extension: &str) -> Result<Vec<String>>;
}

/// Resolver reading from a directory
#[derive(Debug, Clone)]
pub struct FileResourceResolver {
    root: PathBuf,
}

impl FileResourceResolver {
    /// Create a resolver rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Mock root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(Error::ResourceNotFound(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn collect(&self, dir: &Path, extension: &str, found: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                self.collect(&path, extension, found)?;
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if name.ends_with(extension) {
                found.push(name);
            }
        }
        Ok(())
    }
}

impl ResourceResolver for FileResourceResolver {
    fn resolve(&self, path: &str) -> Result<Resource> {
        let full = self.full_path(path)?;
        trace!(path, file = %full.display(), "Opening resource");
        match File::open(&full) {
            Ok(file) => Ok(Resource::new(path, file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::ResourceNotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list_scripts(&self, extension: &str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        if self.root.is_dir() {
            self.collect(&self.root, extension, &mut found)?;
        }
        found.sort();
        debug!(root = %self.root.display(), count = found.len(), "Scanned resources");
        Ok(found)
    }
}

/// Resolver over resources held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryResourceResolver {
    resources: Arc<DashMap<String, Bytes>>,
}

impl InMemoryResourceResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource (builder style)
    pub fn with(self, path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add or replace a resource
    pub fn insert(&self, path: impl Into<String>, content: impl Into<Bytes>) {
        self.resources.insert(path.into(), content.into());
    }

    /// Remove a resource
    pub fn remove(&self, path: &str) -> bool {
        self.resources.remove(path).is_some()
    }
}

impl ResourceResolver for InMemoryResourceResolver {
    fn resolve(&self, path: &str) -> Result<Resource> {
        self.resources
            .get(path)
            .map(|content| Resource::from_bytes(path, content.value().clone()))
            .ok_or_else(|| Error::ResourceNotFound(path.to_string()))
    }

    fn list_scripts(&self, extension: &str) -> Result<Vec<String>> {
        let mut found: Vec<String> = self
            .resources
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| name.ends_with(extension))
            .collect();
        found.sort();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(resource: Resource) -> String {
        let mut text = String::new();
        resource.into_reader().read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_file_resolver() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("api/cats")).unwrap();
        fs::write(dir.path().join("api/cats.rhai"), "response.status = 201;").unwrap();
        fs::write(dir.path().join("api/cats/list.rhai"), "[]").unwrap();
        fs::write(dir.path().join("index.html"), "<p/>").unwrap();

        let resolver = FileResourceResolver::new(dir.path());
        let resource = resolver.resolve("api/cats.rhai").unwrap();
        assert_eq!(resource.path(), "api/cats.rhai");
        assert_eq!(read_all(resource), "response.status = 201;");

        let scripts = resolver.list_scripts(".rhai").unwrap();
        assert_eq!(scripts, vec!["api/cats.rhai", "api/cats/list.rhai"]);
    }

    #[test]
    fn test_file_resolver_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FileResourceResolver::new(dir.path());

        let err = resolver.resolve("api/dogs.rhai").unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound(path) if path == "api/dogs.rhai"));
    }

    #[test]
    fn test_file_resolver_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FileResourceResolver::new(dir.path().join("mocks"));

        assert!(resolver.resolve("../secret.rhai").is_err());
        assert!(resolver.resolve("/etc/passwd").is_err());
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let resolver = FileResourceResolver::new("/nonexistent/mockingjay/root");
        assert!(resolver.list_scripts(".rhai").unwrap().is_empty());
    }

    #[test]
    fn test_in_memory_resolver() {
        let resolver = InMemoryResourceResolver::new()
            .with("api/cats.rhai", "1")
            .with("api/dogs.rhai", "2")
            .with("index.html", "<p/>");

        assert_eq!(read_all(resolver.resolve("api/dogs.rhai").unwrap()), "2");
        assert_eq!(
            resolver.list_scripts(".rhai").unwrap(),
            vec!["api/cats.rhai", "api/dogs.rhai"]
        );

        assert!(resolver.remove("api/dogs.rhai"));
        assert!(resolver.resolve("api/dogs.rhai").is_err());
    }
}
