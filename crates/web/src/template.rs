//! Template loading and rendering (handlebars)

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{WebError, WebResult};

/// Options handed to the template loader, opaque to the harness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Fail rendering when a referenced field is missing
    #[serde(default)]
    pub strict: bool,

    /// HTML-escape `{{ }}` expressions
    #[serde(default = "default_escape_html")]
    pub escape_html: bool,
}

fn default_escape_html() -> bool {
    true
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            strict: false,
            escape_html: true,
        }
    }
}

/// A compiled template
#[derive(Clone)]
pub struct Template {
    name: String,
    path: Option<PathBuf>,
    registry: Arc<Handlebars<'static>>,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl Template {
    /// Load and compile a template file
    pub fn load(path: &Path, options: &LoadOptions) -> WebResult<Self> {
        if !path.is_file() {
            return Err(WebError::TemplateNotFound(path.display().to_string()));
        }

        let source = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "template".to_string());

        debug!("Compiling template {}", path.display());
        let mut template = Self::compile(&name, &source, options)?;
        template.path = Some(path.to_path_buf());
        Ok(template)
    }

    /// Compile a template from source
    pub fn compile(name: &str, source: &str, options: &LoadOptions) -> WebResult<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(options.strict);
        if !options.escape_html {
            registry.register_escape_fn(handlebars::no_escape);
        }

        registry
            .register_template_string(name, source)
            .map_err(|e| WebError::TemplateParse {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            path: None,
            registry: Arc::new(registry),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn render(&self, data: &serde_json::Value) -> WebResult<String> {
        self.registry
            .render(&self.name, data)
            .map_err(|e| WebError::Render {
                name: self.name.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_escapes_by_default() {
        let template = Template::compile("t", "<p>{{msg}}</p>", &LoadOptions::default()).unwrap();
        let html = template.render(&json!({ "msg": "<b>hi</b>" })).unwrap();
        assert_eq!(html, "<p>&lt;b&gt;hi&lt;/b&gt;</p>");
    }

    #[test]
    fn test_render_without_escaping() {
        let options = LoadOptions {
            escape_html: false,
            ..Default::default()
        };
        let template = Template::compile("t", "<p>{{msg}}</p>", &options).unwrap();
        let html = template.render(&json!({ "msg": "<b>hi</b>" })).unwrap();
        assert_eq!(html, "<p><b>hi</b></p>");
    }

    #[test]
    fn test_strict_mode_rejects_missing_fields() {
        let options = LoadOptions {
            strict: true,
            ..Default::default()
        };
        let template = Template::compile("t", "{{missing}}", &options).unwrap();
        let err = template.render(&json!({})).unwrap_err();
        assert!(matches!(err, WebError::Render { .. }));
        assert!(err.to_string().starts_with("Failed to render template 't'"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Template::load(Path::new("/nonexistent/template.hbs"), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, WebError::TemplateNotFound(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.hbs");
        std::fs::write(&path, "<h1>{{title}}</h1>").unwrap();

        let template = Template::load(&path, &LoadOptions::default()).unwrap();
        assert_eq!(template.name(), "template");
        assert_eq!(template.path(), Some(path.as_path()));
        assert_eq!(template.render(&json!({ "title": "Hi" })).unwrap(), "<h1>Hi</h1>");
    }

    #[test]
    fn test_parse_error() {
        let err = Template::compile("broken", "{{#if}}", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, WebError::TemplateParse { .. }));
    }

    #[test]
    fn test_load_options_defaults() {
        let options: LoadOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, LoadOptions::default());
    }
}
