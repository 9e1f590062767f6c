//! Fixture comparison helpers handed to every case

use autotest_common::TestCase;
use sha2::{Digest, Sha256};
use similar::TextDiff;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{AutotestError, AutotestResult};

/// Helpers bound to one case
#[derive(Debug, Clone)]
pub struct Helpers {
    case: TestCase,

    /// Create missing fixtures from the actual output instead of failing
    update_fixtures: bool,

    /// Where mismatching output is written, if anywhere
    output_dir: Option<PathBuf>,
}

impl Helpers {
    pub fn new(case: &TestCase, update_fixtures: bool, output_dir: Option<PathBuf>) -> Self {
        Self {
            case: case.clone(),
            update_fixtures,
            output_dir,
        }
    }

    pub fn case(&self) -> &TestCase {
        &self.case
    }

    pub fn case_dir(&self) -> &Path {
        &self.case.dir
    }

    /// Compare `actual` against the stored fixture `expected<ext>`
    pub fn compare(&self, actual: &str, ext: &str) -> AutotestResult<()> {
        let fixture = self.case.fixture_path(ext);

        if !fixture.exists() {
            if self.update_fixtures {
                info!("Creating fixture {} (update enabled)", fixture.display());
                std::fs::write(&fixture, actual)?;
                return Ok(());
            }
            return Err(AutotestError::FixtureNotFound(fixture.display().to_string()));
        }

        let expected = std::fs::read_to_string(&fixture)?;
        let expected = normalize(&expected);
        let actual = normalize(actual);

        let expected_hash = hash(expected);
        let actual_hash = hash(actual);
        if expected_hash == actual_hash {
            debug!("Fixture {} matches", fixture.display());
            return Ok(());
        }

        if let Some(path) = self.write_actual(actual, ext)? {
            warn!("Actual output for {} written to {}", self.case.name, path.display());
        }

        let diff = TextDiff::from_lines(expected, actual)
            .unified_diff()
            .header(&format!("expected{}", ext), &format!("actual{}", ext))
            .to_string();

        Err(AutotestError::FixtureMismatch {
            case: self.case.name.clone(),
            ext: ext.to_string(),
            expected_hash,
            actual_hash,
            diff,
        })
    }

    fn write_actual(&self, actual: &str, ext: &str) -> AutotestResult<Option<PathBuf>> {
        let Some(output_dir) = &self.output_dir else {
            return Ok(None);
        };
        let dir = output_dir.join(&self.case.name);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("actual{}", ext));
        std::fs::write(&path, actual)?;
        Ok(Some(path))
    }
}

/// Fixture files usually end with a newline the output lacks
fn normalize(s: &str) -> &str {
    s.trim_end()
}

fn hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}
