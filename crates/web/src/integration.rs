//! Integration entry point: installs template rendering onto a framework's
//! response capability table.
//!
//! Installation is idempotent. A framework that already carries a `render`
//! capability keeps the function it has, so every response created before
//! and after a second installation observes the same function.

use autotest_common::{ModuleCache, ModuleResolver, FRAMEWORK_MODULE};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::WebResult;
use crate::framework::{require_framework, Framework, FrameworkModule};
use crate::response::{render_fn, RenderFn};

/// Name of the capability installed on responses
pub const RENDER_SLOT: &str = "render";

/// Resolves a framework module id to the instance the integration targets
pub trait FrameworkResolver: Send + Sync {
    fn resolve_framework(&self, id: &str) -> WebResult<Arc<dyn FrameworkModule>>;
}

impl<F> FrameworkResolver for F
where
    F: Fn(&str) -> WebResult<Arc<dyn FrameworkModule>> + Send + Sync,
{
    fn resolve_framework(&self, id: &str) -> WebResult<Arc<dyn FrameworkModule>> {
        self(id)
    }
}

/// Wrap a closure as a shared [`FrameworkResolver`]
pub fn resolver_fn<F>(f: F) -> Arc<dyn FrameworkResolver>
where
    F: Fn(&str) -> WebResult<Arc<dyn FrameworkModule>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Default resolver: loads the framework through the module cache
#[derive(Clone)]
pub struct CacheResolver {
    cache: ModuleCache,
    modules: Arc<dyn ModuleResolver>,
}

impl CacheResolver {
    pub fn new(cache: ModuleCache, modules: Arc<dyn ModuleResolver>) -> Self {
        Self { cache, modules }
    }

    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    pub fn modules(&self) -> &dyn ModuleResolver {
        self.modules.as_ref()
    }

    /// Concrete framework instance for `id`
    pub fn framework(&self, id: &str) -> WebResult<Arc<Framework>> {
        Ok(require_framework(&self.cache, self.modules.as_ref(), id)?)
    }
}

impl FrameworkResolver for CacheResolver {
    fn resolve_framework(&self, id: &str) -> WebResult<Arc<dyn FrameworkModule>> {
        let framework: Arc<dyn FrameworkModule> = self.framework(id)?;
        Ok(framework)
    }
}

/// Resolver that consults temporary substitutions before its base.
///
/// Substitutions live as long as the returned [`OverrideGuard`]; dropping the
/// guard restores whatever was substituted before it.
#[derive(Clone)]
pub struct OverridableResolver {
    base: Arc<dyn FrameworkResolver>,
    overrides: Arc<RwLock<HashMap<String, Arc<dyn FrameworkModule>>>>,
}

impl OverridableResolver {
    pub fn new(base: Arc<dyn FrameworkResolver>) -> Self {
        Self {
            base,
            overrides: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Substitute `module` for `id` until the guard is dropped
    pub fn substitute(&self, id: &str, module: Arc<dyn FrameworkModule>) -> OverrideGuard {
        let previous = self.overrides.write().insert(id.to_string(), module);
        OverrideGuard {
            id: id.to_string(),
            previous,
            overrides: self.overrides.clone(),
        }
    }

    pub fn is_substituted(&self, id: &str) -> bool {
        self.overrides.read().contains_key(id)
    }
}

impl FrameworkResolver for OverridableResolver {
    fn resolve_framework(&self, id: &str) -> WebResult<Arc<dyn FrameworkModule>> {
        if let Some(module) = self.overrides.read().get(id) {
            return Ok(module.clone());
        }
        self.base.resolve_framework(id)
    }
}

pub struct OverrideGuard {
    id: String,
    previous: Option<Arc<dyn FrameworkModule>>,
    overrides: Arc<RwLock<HashMap<String, Arc<dyn FrameworkModule>>>>,
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        let mut overrides = self.overrides.write();
        match self.previous.take() {
            Some(previous) => {
                overrides.insert(self.id.clone(), previous);
            }
            None => {
                overrides.remove(&self.id);
            }
        }
    }
}

/// The installable integration
#[derive(Clone)]
pub struct Integration {
    resolver: Arc<dyn FrameworkResolver>,
}

impl Integration {
    pub fn new(resolver: Arc<dyn FrameworkResolver>) -> Self {
        Self { resolver }
    }

    /// Install onto the default framework module
    pub fn install(&self) -> WebResult<Arc<dyn FrameworkModule>> {
        self.install_into(FRAMEWORK_MODULE)
    }

    /// Install onto whatever `id` resolves to
    pub fn install_into(&self, id: &str) -> WebResult<Arc<dyn FrameworkModule>> {
        let module = self.resolver.resolve_framework(id)?;
        install_on(module.as_ref());
        Ok(module)
    }
}

/// Attach the render capability unless one is already installed.
/// Returns whether this call installed it.
pub fn install_on(module: &dyn FrameworkModule) -> bool {
    let installed = module.response().install_if_absent(RENDER_SLOT, render);
    debug!(installed, "render capability registration");
    installed
}

fn render() -> RenderFn {
    render_fn(|res, template, data| {
        let html = template.render(data)?;
        res.set_type("html")?;
        res.end(html);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Res, ResponseProto};
    use crate::template::{LoadOptions, Template};
    use serde_json::json;

    #[test]
    fn test_install_on_is_idempotent() {
        let framework = Framework::new();
        assert!(install_on(&framework));
        let first = framework.response().get(RENDER_SLOT).unwrap();

        assert!(!install_on(&framework));
        let second = framework.response().get(RENDER_SLOT).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_installed_render_writes_html() {
        let framework = Framework::new();
        install_on(&framework);

        let template = Template::compile("hello", "<p>{{name}}</p>", &LoadOptions::default()).unwrap();
        let mut res = Res::new(framework.response().clone(), framework.mime());
        res.render(&template, &json!({ "name": "World" })).unwrap();

        assert_eq!(res.body(), b"<p>World</p>");
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
        assert!(res.is_finished());
    }

    #[test]
    fn test_install_through_custom_resolver() {
        struct Shaped {
            response: ResponseProto,
        }
        impl FrameworkModule for Shaped {
            fn response(&self) -> &ResponseProto {
                &self.response
            }
        }

        let target = Arc::new(Shaped { response: ResponseProto::new() });
        let module: Arc<dyn FrameworkModule> = target.clone();
        let integration = Integration::new(resolver_fn(move |_| Ok(module.clone())));

        integration.install().unwrap();
        assert!(target.response.contains(RENDER_SLOT));
    }

    #[test]
    fn test_nested_substitutions_restore_in_order() {
        let real: Arc<dyn FrameworkModule> = Arc::new(Framework::new());
        let base = real.clone();
        let resolver = OverridableResolver::new(resolver_fn(move |_| Ok(base.clone())));

        let outer: Arc<dyn FrameworkModule> = Arc::new(Framework::new());
        let inner: Arc<dyn FrameworkModule> = Arc::new(Framework::new());

        let resolved = |r: &OverridableResolver| r.resolve_framework(FRAMEWORK_MODULE).unwrap();
        {
            let _outer = resolver.substitute(FRAMEWORK_MODULE, outer.clone());
            {
                let _inner = resolver.substitute(FRAMEWORK_MODULE, inner.clone());
                assert!(Arc::ptr_eq(&resolved(&resolver), &inner));
            }
            assert!(Arc::ptr_eq(&resolved(&resolver), &outer));
        }
        assert!(!resolver.is_substituted(FRAMEWORK_MODULE));
        assert!(Arc::ptr_eq(&resolved(&resolver), &real));
    }
}
