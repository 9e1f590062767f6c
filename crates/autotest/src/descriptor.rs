//! Case descriptors: how a case builds its app and validates the result

use anyhow::{anyhow, bail, ensure};
use autotest_common::{RunResult, FRAMEWORK_MODULE};
use autotest_web::{controller, App, Controller, Framework, Integration, LoadOptions, Template};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::error::{AutotestError, AutotestResult};
use crate::helpers::Helpers;

/// Everything a case can customise. Every method has a default, so an empty
/// impl describes a case that renders its template with `{}` and compares
/// the body against `expected.html`.
pub trait CaseDescriptor: Send + Sync {
    /// Build the application under test
    fn create_app(&self, framework: Arc<Framework>, integration: &Integration) -> anyhow::Result<App> {
        integration.install()?;
        Ok(framework.app())
    }

    /// Build the handler mounted at the test endpoint
    fn create_controller(&self, template: Template) -> Controller {
        controller(move |_req, res| res.render(&template, &Value::Object(Default::default())))
    }

    /// Whether `create_app` is expected to fail
    fn expects_error(&self) -> bool {
        false
    }

    /// Inspect the failure raised by `create_app`
    fn check_error(&self, _err: &anyhow::Error) -> anyhow::Result<()> {
        Ok(())
    }

    /// Custom response validation; `None` selects the default
    /// (2xx status, body equal to `expected.html`)
    fn check_response(&self, _response: &RunResult, _helpers: &Helpers) -> Option<anyhow::Result<()>> {
        None
    }

    /// Options passed through to the template loader
    fn load_options(&self) -> LoadOptions {
        LoadOptions::default()
    }
}

/// Descriptor for cases that ship none
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDescriptor;

impl CaseDescriptor for DefaultDescriptor {}

/// Declarative descriptor parsed from `case.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlDescriptor {
    /// Module id the integration is installed into
    #[serde(default)]
    pub framework: Option<String>,

    /// Data the controller renders the template with
    #[serde(default)]
    pub data: Option<Value>,

    /// Status the controller sets before rendering
    #[serde(default)]
    pub status: Option<u16>,

    /// `create_app` must fail with a message containing this text
    #[serde(default)]
    pub expect_error: Option<String>,

    #[serde(default)]
    pub response: Option<ResponseCheck>,

    #[serde(default)]
    pub load_options: Option<LoadOptions>,
}

/// Declarative response checks
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseCheck {
    #[serde(default)]
    pub status: Option<u16>,

    #[serde(default)]
    pub body_contains: Option<String>,

    #[serde(default)]
    pub body_equals: Option<String>,

    /// Also compare the body against `expected<fixture>`
    #[serde(default)]
    pub fixture: Option<String>,
}

impl YamlDescriptor {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file is a descriptor with every default
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    pub fn from_file(path: &Path) -> AutotestResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| AutotestError::Descriptor {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl CaseDescriptor for YamlDescriptor {
    fn create_app(&self, framework: Arc<Framework>, integration: &Integration) -> anyhow::Result<App> {
        let id = self.framework.as_deref().unwrap_or(FRAMEWORK_MODULE);
        integration.install_into(id)?;
        Ok(framework.app())
    }

    fn create_controller(&self, template: Template) -> Controller {
        let data = self
            .data
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let status = self.status;
        controller(move |_req, res| {
            if let Some(status) = status {
                res.status(status)?;
            }
            res.render(&template, &data)
        })
    }

    fn expects_error(&self) -> bool {
        self.expect_error.is_some()
    }

    fn check_error(&self, err: &anyhow::Error) -> anyhow::Result<()> {
        let Some(expected) = &self.expect_error else {
            return Ok(());
        };
        let message = format!("{:#}", err);
        ensure!(
            message.contains(expected.as_str()),
            "expected error containing {:?}, got {:?}",
            expected,
            message
        );
        Ok(())
    }

    fn check_response(&self, response: &RunResult, helpers: &Helpers) -> Option<anyhow::Result<()>> {
        let check = self.response.as_ref()?;
        Some(check.apply(response, helpers))
    }

    fn load_options(&self) -> LoadOptions {
        self.load_options.clone().unwrap_or_default()
    }
}

impl ResponseCheck {
    fn apply(&self, response: &RunResult, helpers: &Helpers) -> anyhow::Result<()> {
        if let Some(error) = &response.error {
            bail!("request failed: {}", error);
        }
        if let Some(status) = self.status {
            ensure!(
                response.status == status,
                "expected status {}, got {}",
                status,
                response.status
            );
        }
        if let Some(needle) = &self.body_contains {
            ensure!(
                response.body.contains(needle.as_str()),
                "expected body to contain {:?}, got {:?}",
                needle,
                response.body
            );
        }
        if let Some(expected) = &self.body_equals {
            ensure!(
                &response.body == expected,
                "expected body {:?}, got {:?}",
                expected,
                response.body
            );
        }
        if let Some(ext) = &self.fixture {
            helpers
                .compare(&response.body, ext)
                .map_err(|e| anyhow!(e))?;
        }
        Ok(())
    }
}
