//! Byte-stream collaborators supplying raw file contents.
//!
//! The engine never touches the filesystem or network directly; it asks a
//! [`ByteSource`] for the bytes behind a relative data path. Hosts that serve
//! data over HTTP plug their own fetcher into [`UrlSource`].

use crate::errors::{PaleoError, PaleoResult};
use crate::naming::resolve_url;
use std::fmt;
use std::path::{Path, PathBuf};

/// Supplier of raw file contents addressed by `/`-separated relative paths
pub trait ByteSource: fmt::Debug + Send + Sync {
    /// Full location (path or URL) of a relative data path, used in errors
    fn locate(&self, relative: &str) -> String;

    fn exists(&self, relative: &str) -> bool;

    /// Read the whole resource
    ///
    /// A missing resource is reported as [`PaleoError::DataNotFound`] with
    /// `what` describing the data being looked for.
    fn read(&self, relative: &str, what: &str) -> PaleoResult<Vec<u8>>;

    fn read_to_string(&self, relative: &str, what: &str) -> PaleoResult<String> {
        let bytes = self.read(relative, what)?;
        String::from_utf8(bytes).map_err(|e| PaleoError::malformed(self.locate(relative), e))
    }

    /// Local filesystem path of the resource, if the source is backed by one
    fn local_path(&self, _relative: &str) -> Option<PathBuf> {
        None
    }
}

/// Files below a local directory
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

impl ByteSource for LocalDirectory {
    fn locate(&self, relative: &str) -> String {
        self.resolve(relative).display().to_string()
    }

    fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).is_file()
    }

    fn read(&self, relative: &str, what: &str) -> PaleoResult<Vec<u8>> {
        let path = self.resolve(relative);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PaleoError::not_found(path.display().to_string(), what))
            }
            Err(source) => Err(PaleoError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn local_path(&self, relative: &str) -> Option<PathBuf> {
        Some(self.resolve(relative))
    }
}

/// Fetches resources below a base URL through a host-supplied transport
///
/// The transport returns `Ok(None)` when the server reports the resource as
/// missing and `Err` for transport failures (which are wrapped with the URL).
pub struct UrlSource<F>
where
    F: Fn(&str) -> std::io::Result<Option<Vec<u8>>> + Send + Sync,
{
    base_url: String,
    fetch: F,
}

impl<F> UrlSource<F>
where
    F: Fn(&str) -> std::io::Result<Option<Vec<u8>>> + Send + Sync,
{
    pub fn new(base_url: impl Into<String>, fetch: F) -> Self {
        let mut base_url = base_url.into();
        if !base_url.is_empty() && !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { base_url, fetch }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl<F> fmt::Debug for UrlSource<F>
where
    F: Fn(&str) -> std::io::Result<Option<Vec<u8>>> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSource")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl<F> ByteSource for UrlSource<F>
where
    F: Fn(&str) -> std::io::Result<Option<Vec<u8>>> + Send + Sync,
{
    fn locate(&self, relative: &str) -> String {
        resolve_url(&self.base_url, relative)
    }

    /// Remote resources are assumed present until a read says otherwise
    fn exists(&self, _relative: &str) -> bool {
        true
    }

    fn read(&self, relative: &str, what: &str) -> PaleoResult<Vec<u8>> {
        let url = self.locate(relative);
        match (self.fetch)(&url) {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(PaleoError::not_found(url, what)),
            Err(source) => Err(PaleoError::Io { path: url, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn local_directory_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("T")).unwrap();
        std::fs::write(dir.path().join("T").join("a.txt"), "1 2 3").unwrap();

        let source = LocalDirectory::new(dir.path());
        assert!(source.exists("T/a.txt"));
        assert_eq!(source.read_to_string("T/a.txt", "test").unwrap(), "1 2 3");
        assert!(source.locate("T/a.txt").ends_with("a.txt"));
    }

    #[test]
    fn local_directory_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalDirectory::new(dir.path());
        assert!(!source.exists("T/missing.txt"));
        match source.read("T/missing.txt", "Mean Temperature data") {
            Err(PaleoError::DataNotFound { attempted, what }) => {
                assert!(attempted.ends_with("missing.txt"));
                assert_eq!(what, "Mean Temperature data");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn url_source_wraps_transport() {
        let files: HashMap<String, Vec<u8>> =
            HashMap::from([("http://host/data/T/a.txt".to_string(), b"42".to_vec())]);
        let source = UrlSource::new("http://host/data", move |url: &str| {
            if url.contains("broken") {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "proxy refused"))
            } else {
                Ok(files.get(url).cloned())
            }
        });

        assert_eq!(source.base_url(), "http://host/data/");
        assert_eq!(source.read("T/a.txt", "test").unwrap(), b"42".to_vec());
        assert!(matches!(
            source.read("T/b.txt", "test"),
            Err(PaleoError::DataNotFound { .. })
        ));
        match source.read("broken/c.txt", "test") {
            Err(PaleoError::Io { path, .. }) => assert_eq!(path, "http://host/data/broken/c.txt"),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
