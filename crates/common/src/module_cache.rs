//! Module cache registry and dependency purger
//!
//! The cache maps a resolved module path to the loaded module handle and the
//! resolved paths of the modules it loaded in turn. Loading the same id twice
//! returns the same handle until the entry is purged.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::{DEPS_DIR, FRAMEWORK_MODULE};

/// Loaded module instance
pub type ModuleHandle = Arc<dyn Any + Send + Sync>;

/// A single cache record
#[derive(Clone)]
pub struct CacheEntry {
    /// Resolved path (the cache key)
    pub path: String,

    /// Loaded module
    pub handle: ModuleHandle,

    /// Resolved paths of child dependencies
    pub children: Vec<String>,
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("path", &self.path)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// What a loader hands back to the cache
pub struct Loaded {
    pub handle: ModuleHandle,
    pub children: Vec<String>,
}

impl Loaded {
    pub fn new<T: Any + Send + Sync>(module: T) -> Self {
        Self {
            handle: Arc::new(module),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = children;
        self
    }
}

/// Maps a module identifier to its canonical path
pub trait ModuleResolver: Send + Sync {
    fn resolve(&self, id: &str) -> Result<String>;
}

impl<F> ModuleResolver for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn resolve(&self, id: &str) -> Result<String> {
        self(id)
    }
}

/// Shared, clonable module registry
#[derive(Clone, Default)]
pub struct ModuleCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, handle: ModuleHandle, children: Vec<String>) {
        let path = path.into();
        self.entries.write().insert(
            path.clone(),
            CacheEntry {
                path,
                handle,
                children,
            },
        );
    }

    pub fn get(&self, path: &str) -> Option<CacheEntry> {
        self.entries.read().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.read().contains_key(path)
    }

    pub fn remove(&self, path: &str) -> Option<CacheEntry> {
        self.entries.write().remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Sorted list of cached paths
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Return the cached module for `id`, loading and caching it on a miss.
    ///
    /// The lock is not held while `load` runs, so loaders may populate the
    /// cache with their own children.
    pub fn require<F>(&self, id: &str, resolver: &dyn ModuleResolver, load: F) -> Result<ModuleHandle>
    where
        F: FnOnce(&str) -> Result<Loaded>,
    {
        let path = resolver.resolve(id)?;
        if let Some(entry) = self.get(&path) {
            return Ok(entry.handle);
        }

        debug!("Loading module {} ({})", id, path);
        let loaded = load(&path)?;
        let handle = loaded.handle.clone();
        self.insert(path, loaded.handle, loaded.children);
        Ok(handle)
    }

    /// Typed variant of [`ModuleCache::require`]
    pub fn require_as<T, F>(&self, id: &str, resolver: &dyn ModuleResolver, load: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce(&str) -> Result<Loaded>,
    {
        let handle = self.require(id, resolver, load)?;
        handle.downcast::<T>().map_err(|_| Error::ModuleType {
            path: id.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
    }
}

/// Resolves bare module ids against a dependency install tree.
///
/// `framework` resolves to `<root>/deps/framework/index`,
/// `framework/lib/router` to `<root>/deps/framework/lib/router`.
/// Absolute paths and paths already under `<root>/deps/` pass through
/// unchanged, whether or not the root itself is relative.
#[derive(Debug, Clone)]
pub struct InstallTree {
    root: PathBuf,
    packages: HashSet<String>,
}

impl InstallTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            packages: HashSet::new(),
        }
    }

    /// Mark a package as installed
    pub fn with_package(mut self, name: &str) -> Self {
        self.packages.insert(name.to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(DEPS_DIR).join(name)
    }

    fn is_resolved(&self, id: &str) -> bool {
        if id.starts_with('/') {
            return true;
        }
        let deps = normalize(&self.root.join(DEPS_DIR));
        id.strip_prefix(deps.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

impl ModuleResolver for InstallTree {
    fn resolve(&self, id: &str) -> Result<String> {
        if self.is_resolved(id) {
            return Ok(id.to_string());
        }

        let mut segments = id.split('/');
        let package = segments.next().unwrap_or_default();
        if package.is_empty() || !self.packages.contains(package) {
            return Err(Error::ModuleNotFound(id.to_string()));
        }

        let mut path = self.package_dir(package);
        let rest: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();
        if rest.is_empty() {
            path.push("index");
        } else {
            path.extend(rest);
        }

        Ok(normalize(&path))
    }
}

/// Evicts a dependency and its transitive children from a [`ModuleCache`].
///
/// Only entries whose path contains `/deps/<package>` are evicted; children
/// outside the package's install tree stay cached.
#[derive(Debug, Clone)]
pub struct Purger {
    package: String,
    pattern: String,
}

impl Default for Purger {
    fn default() -> Self {
        Self::new(FRAMEWORK_MODULE)
    }
}

impl Purger {
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            pattern: format!("/{}/{}", DEPS_DIR, package),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether a resolved path belongs to the target package
    pub fn matches(&self, path: &str) -> bool {
        path.contains(&self.pattern)
    }

    /// Purge `id` (default: the target package) and return how many entries
    /// were evicted. Absent or unresolvable ids are a no-op.
    pub fn purge(&self, cache: &ModuleCache, resolver: &dyn ModuleResolver, id: Option<&str>) -> usize {
        let id = id.unwrap_or(&self.package);
        let path = match resolver.resolve(id) {
            Ok(path) => path,
            Err(e) => {
                debug!("Nothing to purge for {}: {}", id, e);
                return 0;
            }
        };

        let mut visited = HashSet::new();
        let evicted = self.purge_path(cache, resolver, &path, &mut visited);
        debug!("Purged {} module(s) under {}", evicted, self.pattern);
        evicted
    }

    fn purge_path(
        &self,
        cache: &ModuleCache,
        resolver: &dyn ModuleResolver,
        path: &str,
        visited: &mut HashSet<String>,
    ) -> usize {
        if !visited.insert(path.to_string()) {
            return 0;
        }

        let Some(entry) = cache.get(path) else {
            return 0;
        };

        // Children first: a stale child must not outlive its parent's eviction.
        let mut evicted = 0;
        for child in &entry.children {
            match resolver.resolve(child) {
                Ok(child_path) => evicted += self.purge_path(cache, resolver, &child_path, visited),
                Err(e) => debug!("Skipping unresolvable child {}: {}", child, e),
            }
        }

        if self.matches(path) && cache.remove(path).is_some() {
            evicted += 1;
        }

        evicted
    }
}
