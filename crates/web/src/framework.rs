//! The framework module
//!
//! A [`Framework`] owns the response capability table shared by every
//! response its apps create. Loaded through the module cache it is split
//! across three modules, mirroring an installed dependency tree:
//!
//! ```text
//! deps/framework/index          Framework       children: response, mime
//! deps/framework/lib/response   ResponseProto   children: mime
//! deps/mime/index               MimeTypes       (hoisted, shared)
//! ```

use autotest_common::{Loaded, ModuleCache, ModuleResolver};
use std::collections::HashMap;
use std::sync::Arc;

use crate::app::App;
use crate::response::ResponseProto;

pub const RESPONSE_MODULE: &str = "framework/lib/response";
pub const MIME_MODULE: &str = "mime";

/// Anything exposing a response capability slot can receive the integration
pub trait FrameworkModule: Send + Sync {
    fn response(&self) -> &ResponseProto;
}

/// Extension to content type table
#[derive(Debug, Clone)]
pub struct MimeTypes {
    types: HashMap<&'static str, &'static str>,
}

impl Default for MimeTypes {
    fn default() -> Self {
        let types = HashMap::from([
            ("html", "text/html; charset=utf-8"),
            ("json", "application/json"),
            ("txt", "text/plain; charset=utf-8"),
            ("css", "text/css"),
            ("js", "application/javascript"),
        ]);
        Self { types }
    }
}

impl MimeTypes {
    pub fn lookup(&self, ext: &str) -> &'static str {
        self.types
            .get(ext.trim_start_matches('.'))
            .copied()
            .unwrap_or("application/octet-stream")
    }
}

/// The web framework module
#[derive(Debug, Clone, Default)]
pub struct Framework {
    response: ResponseProto,
    mime: Arc<MimeTypes>,
}

impl Framework {
    /// A standalone framework instance, not registered in any cache
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(response: ResponseProto, mime: Arc<MimeTypes>) -> Self {
        Self { response, mime }
    }

    pub fn mime(&self) -> Arc<MimeTypes> {
        self.mime.clone()
    }

    /// Create a new application bound to this framework's responses
    pub fn app(&self) -> App {
        App::new(self.response.clone(), self.mime.clone())
    }
}

impl FrameworkModule for Framework {
    fn response(&self) -> &ResponseProto {
        &self.response
    }
}

/// Load (or fetch from cache) the framework module registered under `id`
pub fn require_framework(
    cache: &ModuleCache,
    resolver: &dyn ModuleResolver,
    id: &str,
) -> autotest_common::Result<Arc<Framework>> {
    cache.require_as::<Framework, _>(id, resolver, |_| {
        let mime_path = resolver.resolve(MIME_MODULE)?;
        let response_path = resolver.resolve(RESPONSE_MODULE)?;

        let mime = cache.require_as::<MimeTypes, _>(MIME_MODULE, resolver, |_| {
            Ok(Loaded::new(MimeTypes::default()))
        })?;
        let response = cache.require_as::<ResponseProto, _>(RESPONSE_MODULE, resolver, |_| {
            Ok(Loaded::new(ResponseProto::new()).with_children(vec![mime_path.clone()]))
        })?;

        let framework = Framework::from_parts(ResponseProto::clone(&response), mime);
        Ok(Loaded::new(framework).with_children(vec![response_path, mime_path]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotest_common::{InstallTree, Purger};

    fn tree() -> InstallTree {
        InstallTree::new("/suite").with_package("framework").with_package("mime")
    }

    #[test]
    fn test_mime_lookup() {
        let mime = MimeTypes::default();
        assert_eq!(mime.lookup("html"), "text/html; charset=utf-8");
        assert_eq!(mime.lookup(".json"), "application/json");
        assert_eq!(mime.lookup("bin"), "application/octet-stream");
    }

    #[test]
    fn test_require_framework_is_cached() {
        let cache = ModuleCache::new();
        let tree = tree();

        let a = require_framework(&cache, &tree, "framework").unwrap();
        let b = require_framework(&cache, &tree, "framework").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(
            cache.keys(),
            vec![
                "/suite/deps/framework/index".to_string(),
                "/suite/deps/framework/lib/response".to_string(),
                "/suite/deps/mime/index".to_string(),
            ]
        );
    }

    #[test]
    fn test_purge_yields_fresh_response_table() {
        let cache = ModuleCache::new();
        let tree = tree();

        let before = require_framework(&cache, &tree, "framework").unwrap();
        let evicted = Purger::default().purge(&cache, &tree, None);
        assert_eq!(evicted, 2);
        assert!(cache.contains("/suite/deps/mime/index"));

        let after = require_framework(&cache, &tree, "framework").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(!before.response().same_table(after.response()));
        // the hoisted dependency survived and is shared
        assert!(Arc::ptr_eq(&before.mime(), &after.mime()));
    }

    #[test]
    fn test_require_unknown_framework() {
        let cache = ModuleCache::new();
        let err = require_framework(&cache, &tree(), "missing-framework").unwrap_err();
        assert_eq!(err.to_string(), "Module not found: missing-framework");
        assert!(cache.is_empty());
    }
}
