use std::cell::Cell;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};

use crate::AssetError;

/// Source of prefab bytes, addressed by URL.
pub trait PrefabFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, AssetError>>;
}

/// Resolves URLs as paths below a root directory.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map `url` to a file under the root. Absolute URLs are taken relative
    /// to the root; `..` components are rejected.
    pub fn resolve(&self, url: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(url.trim_start_matches('/'));
        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(AssetError::InvalidUrl(url.to_owned())),
            }
        }
        if path == self.root {
            return Err(AssetError::InvalidUrl(url.to_owned()));
        }
        Ok(path)
    }
}

impl PrefabFetcher for FsFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.resolve(url)?;
        tracing::debug!(url, path = %path.display(), "fetching prefab");
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(url.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory fetcher that counts how often it is asked.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    fetches: Cell<usize>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(url.into(), bytes.into());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }
}

impl PrefabFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        self.fetches.set(self.fetches.get() + 1);
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(url.to_owned()))
    }
}
