//! Core types for autotest

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A single test case discovered as a subdirectory of the autotest root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Directory name, also the identity of the case
    pub name: String,

    /// Absolute path of the case directory
    pub dir: PathBuf,

    /// Case descriptor (`case.yaml`), if present
    pub descriptor_path: Option<PathBuf>,

    /// Template fixture (`template.hbs`), if present
    pub template_path: Option<PathBuf>,
}

impl TestCase {
    /// Path of a stored fixture for this case, e.g. `expected.html`
    pub fn fixture_path(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("expected{}", ext))
    }
}

/// Outcome of the single request issued for a case
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// HTTP status, 0 when the transport failed before a response arrived
    pub status: u16,

    /// Response body
    pub body: String,

    /// Transport-level error, if any
    pub error: Option<String>,
}

/// Result of running a single case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl CaseResult {
    pub fn passed(name: &str, duration_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            duration_ms,
            error: None,
        }
    }

    pub fn failed(name: &str, duration_ms: u64, error: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            duration_ms,
            error: Some(error.to_string()),
        }
    }
}

/// Result of running every case of a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub run_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<CaseResult>,
}

impl SuiteResult {
    pub fn new(started_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            total: 0,
            passed: 0,
            failed: 0,
            duration_ms: 0,
            results: Vec::new(),
        }
    }

    /// Record a case result and update the counters
    pub fn record(&mut self, result: CaseResult) {
        self.total += 1;
        if result.success {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results.iter().filter(|r| !r.success)
    }
}
