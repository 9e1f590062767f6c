//! Error types for the autotest runner

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutotestError {
    #[error("Autotest root not found: {0}")]
    ScanRoot(String),

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Error expected")]
    ErrorExpected,

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Case {case} panicked: {message}")]
    Panicked { case: String, message: String },

    #[error("Descriptor error in {path}: {reason}")]
    Descriptor { path: String, reason: String },

    #[error("Case {0} has no template")]
    MissingTemplate(String),

    #[error("Fixture not found: {0}")]
    FixtureNotFound(String),

    #[error("Fixture mismatch for {case} (expected{ext}): expected sha256 {expected_hash}, actual sha256 {actual_hash}\n{diff}")]
    FixtureMismatch {
        case: String,
        ext: String,
        expected_hash: String,
        actual_hash: String,
        diff: String,
    },

    #[error("Widget error: {0}")]
    Widget(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Web(#[from] autotest_web::WebError),

    #[error(transparent)]
    Case(#[from] anyhow::Error),
}

pub type AutotestResult<T> = Result<T, AutotestError>;
