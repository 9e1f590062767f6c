//! Suite runner: executes every discovered case against its own app and server

use autotest_common::{
    CaseResult, InstallTree, ModuleCache, Purger, RunResult, SuiteResult, TestCase, FRAMEWORK_MODULE,
};
use autotest_web::{
    catch_all, App, CacheResolver, Integration, OverridableResolver, ServerEvents, ServerHandle,
    Template,
};
use reqwest::StatusCode;
use serde::Deserialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::descriptor::{CaseDescriptor, DefaultDescriptor, YamlDescriptor};
use crate::error::{AutotestError, AutotestResult};
use crate::helpers::Helpers;
use crate::scan::{scan_dir, CaseSet};

/// The single endpoint every case app exposes
pub const TEST_PATH: &str = "/test";

/// Extension of the default response fixture
pub const DEFAULT_FIXTURE_EXT: &str = ".html";

/// Packages installed in every suite's dependency tree
const INSTALLED_PACKAGES: [&str; 2] = [FRAMEWORK_MODULE, "mime"];

/// Configuration for the test runner
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Directory whose subdirectories are the cases
    pub root: PathBuf,

    /// Run only the case with this name
    pub case_filter: Option<String>,

    /// Create missing fixtures from actual output
    pub update_fixtures: bool,

    /// Where mismatching output and suite results are written
    pub output_dir: PathBuf,

    /// Purge the framework from the module cache before each case
    pub isolate_framework: bool,

    /// Timeout for the per-case request; none by default
    pub request_timeout_ms: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tests/autotests/express"),
            case_filter: None,
            update_fixtures: false,
            output_dir: PathBuf::from("test-results"),
            isolate_framework: false,
            request_timeout_ms: None,
        }
    }
}

impl RunnerConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_file(path: &Path) -> AutotestResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| AutotestError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Runs cases one at a time. Each case gets its own app, server and port,
/// and the next case starts only after the previous server was closed.
pub struct TestRunner {
    config: RunnerConfig,

    /// Programmatic descriptors, taking precedence over `case.yaml`
    descriptors: HashMap<String, Arc<dyn CaseDescriptor>>,

    cache: ModuleCache,
    modules: Arc<InstallTree>,
    frameworks: CacheResolver,
    resolver: OverridableResolver,
    integration: Integration,
    purger: Purger,

    events: Option<ServerEvents>,
}

impl TestRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let cache = ModuleCache::new();
        let modules = Arc::new(
            INSTALLED_PACKAGES
                .iter()
                .fold(InstallTree::new(&config.root), |tree, pkg| tree.with_package(pkg)),
        );
        let frameworks = CacheResolver::new(cache.clone(), modules.clone());
        let resolver = OverridableResolver::new(Arc::new(frameworks.clone()));
        let integration = Integration::new(Arc::new(resolver.clone()));

        Self {
            config,
            descriptors: HashMap::new(),
            cache,
            modules,
            frameworks,
            resolver,
            integration,
            purger: Purger::default(),
            events: None,
        }
    }

    /// Use `descriptor` for the case called `name`
    pub fn register(&mut self, name: &str, descriptor: Arc<dyn CaseDescriptor>) -> &mut Self {
        self.descriptors.insert(name.to_string(), descriptor);
        self
    }

    /// Record server open/close events into `events`
    pub fn with_server_events(mut self, events: ServerEvents) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Resolver the integration installs through; supports scoped substitution
    pub fn resolver(&self) -> &OverridableResolver {
        &self.resolver
    }

    /// Evict the framework and its installed children from the module cache
    pub fn purge_framework(&self) -> usize {
        self.purger.purge(&self.cache, self.modules.as_ref(), None)
    }

    /// Discover and run every case under the configured root
    pub async fn run_all(&self) -> AutotestResult<SuiteResult> {
        let mut cases = scan_dir(&self.config.root)?;
        if let Some(name) = &self.config.case_filter {
            cases = cases.filter(name);
        }
        Ok(self.run_cases(&cases).await)
    }

    /// Run `cases` sequentially, recording one result each
    pub async fn run_cases(&self, cases: &CaseSet) -> SuiteResult {
        let start = Instant::now();
        let mut suite = SuiteResult::new(chrono::Utc::now());

        info!("Running {} case(s) from {}...", cases.len(), cases.root().display());

        for case in cases {
            let case_start = Instant::now();
            let outcome = self.run_case(case).await;
            let duration_ms = case_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => {
                    info!("✓ {} ({} ms)", case.name, duration_ms);
                    suite.record(CaseResult::passed(&case.name, duration_ms));
                }
                Err(e) => {
                    error!("✗ {} - {}", case.name, e);
                    suite.record(CaseResult::failed(&case.name, duration_ms, e));
                }
            }
        }

        suite.duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            suite.passed, suite.failed, suite.duration_ms
        );

        suite
    }

    /// Run a single case
    pub async fn run_case(&self, case: &TestCase) -> AutotestResult<()> {
        debug!("Running case: {}", case.name);
        let descriptor = self.descriptor_for(case)?;

        if self.config.isolate_framework {
            let purged = self.purge_framework();
            debug!("Purged {} framework module(s) before {}", purged, case.name);
        }
        let framework = self.frameworks.framework(FRAMEWORK_MODULE)?;

        if descriptor.expects_error() {
            let built = guard(&case.name, || {
                descriptor.create_app(framework.clone(), &self.integration)
            })?;
            return match built {
                Ok(_) => Err(AutotestError::ErrorExpected),
                Err(err) => {
                    debug!("Case {} failed as expected: {:#}", case.name, err);
                    guard(&case.name, || descriptor.check_error(&err))??;
                    Ok(())
                }
            };
        }

        let mut app = guard(&case.name, || descriptor.create_app(framework, &self.integration))??;

        let template_path = case
            .template_path
            .as_deref()
            .ok_or_else(|| AutotestError::MissingTemplate(case.name.clone()))?;
        let template = Template::load(template_path, &descriptor.load_options())?;
        let controller = guard(&case.name, || descriptor.create_controller(template))?;

        app.get(TEST_PATH, controller);
        app.use_error(catch_all());

        let server = self.listen(app).await?;
        let response = self.request(&server.url(TEST_PATH)).await;
        let outcome = self.validate(case, descriptor.as_ref(), &response);
        server.close().await;
        outcome
    }

    async fn listen(&self, app: App) -> AutotestResult<ServerHandle> {
        let bound = match &self.events {
            Some(events) => app.listen_tracked(0, events.clone()).await,
            None => app.listen(0).await,
        };
        bound.map_err(|e| AutotestError::ServerStartup(e.to_string()))
    }

    /// Issue the case's one GET. Transport failures land in `RunResult::error`.
    async fn request(&self, url: &str) -> RunResult {
        let mut builder = reqwest::Client::builder().pool_max_idle_per_host(0);
        if let Some(ms) = self.config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        let result = match builder.build() {
            Ok(client) => {
                debug!("GET {}", url);
                let result = async {
                    let response = client.get(url).send().await?;
                    let status = response.status().as_u16();
                    let body = response.text().await?;
                    Ok::<_, reqwest::Error>((status, body))
                }
                .await;
                // Release pooled connections before the server drains
                drop(client);
                result
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((status, body)) => RunResult { status, body, error: None },
            Err(e) => RunResult {
                status: 0,
                body: String::new(),
                error: Some(e.to_string()),
            },
        }
    }

    fn validate(
        &self,
        case: &TestCase,
        descriptor: &dyn CaseDescriptor,
        response: &RunResult,
    ) -> AutotestResult<()> {
        let helpers = Helpers::new(
            case,
            self.config.update_fixtures,
            Some(self.config.output_dir.clone()),
        );

        guard(&case.name, || {
            descriptor
                .check_response(response, &helpers)
                .map(|r| r.map_err(AutotestError::from))
                .unwrap_or_else(|| default_check(response, &helpers))
        })?
    }

    fn descriptor_for(&self, case: &TestCase) -> AutotestResult<Arc<dyn CaseDescriptor>> {
        if let Some(descriptor) = self.descriptors.get(&case.name) {
            return Ok(descriptor.clone());
        }
        match &case.descriptor_path {
            Some(path) => Ok(Arc::new(YamlDescriptor::from_file(path)?)),
            None => Ok(Arc::new(DefaultDescriptor)),
        }
    }

    /// Write suite results as `test-results.json` in the output directory
    pub fn write_results(&self, results: &SuiteResult) -> AutotestResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Success status and a body equal to the stored fixture
fn default_check(response: &RunResult, helpers: &Helpers) -> AutotestResult<()> {
    if let Some(error) = &response.error {
        return Err(AutotestError::AssertionFailed(format!("request failed: {}", error)));
    }
    if response.status != StatusCode::OK.as_u16() {
        return Err(AutotestError::AssertionFailed(format!(
            "expected status 200, got {}: {}",
            response.status, response.body
        )));
    }
    helpers.compare(&response.body, DEFAULT_FIXTURE_EXT)
}

/// Run descriptor code, turning a panic into a case failure
fn guard<T>(case: &str, f: impl FnOnce() -> T) -> AutotestResult<T> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| AutotestError::Panicked {
        case: case.to_string(),
        message: panic_message(&*payload),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
