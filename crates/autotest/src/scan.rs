//! Case discovery: every subdirectory of the autotest root is one case

use autotest_common::TestCase;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{AutotestError, AutotestResult};

/// Per-case descriptor file
pub const DESCRIPTOR_FILE: &str = "case.yaml";

/// Per-case template fixture
pub const TEMPLATE_FILE: &str = "template.hbs";

/// One entry of a directory listing, relative to the scanned root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl ListingEntry {
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), is_dir: true }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), is_dir: false }
    }
}

/// The cases found under one root, in name order
#[derive(Debug, Clone)]
pub struct CaseSet {
    root: PathBuf,
    cases: Vec<TestCase>,
}

impl CaseSet {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Iterate the cases; every call starts from the first case again
    pub fn iter(&self) -> std::slice::Iter<'_, TestCase> {
        self.cases.iter()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.cases.iter().map(|c| c.name.as_str()).collect()
    }

    /// Narrow the set to the case called `name`
    pub fn filter(self, name: &str) -> Self {
        Self {
            root: self.root,
            cases: self.cases.into_iter().filter(|c| c.name == name).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CaseSet {
    type Item = &'a TestCase;
    type IntoIter = std::slice::Iter<'a, TestCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Scan `root` for cases. A missing root is an error; a case without a
/// descriptor is not.
pub fn scan_dir(root: &Path) -> AutotestResult<CaseSet> {
    if !root.is_dir() {
        return Err(AutotestError::ScanRoot(root.display().to_string()));
    }

    let listing = WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let rel = e.path().strip_prefix(root).ok()?.to_path_buf();
            Some(ListingEntry {
                path: rel,
                is_dir: e.file_type().is_dir(),
            })
        });

    let cases = cases_from_listing(root, listing);
    debug!("Discovered {} case(s) under {}", cases.len(), root.display());

    Ok(CaseSet {
        root: root.to_path_buf(),
        cases,
    })
}

/// Build sorted cases from a flat listing of paths relative to `root`.
/// Hidden directories and top-level files are skipped.
pub fn cases_from_listing<I>(root: &Path, listing: I) -> Vec<TestCase>
where
    I: IntoIterator<Item = ListingEntry>,
{
    let mut dirs: BTreeMap<String, (bool, bool)> = BTreeMap::new();
    let mut files: Vec<(String, String)> = Vec::new();

    for entry in listing {
        let parts: Vec<String> = entry
            .path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();

        match (parts.as_slice(), entry.is_dir) {
            ([name], true) if !name.starts_with('.') => {
                dirs.entry(name.clone()).or_default();
            }
            ([name, file], false) => files.push((name.clone(), file.clone())),
            _ => {}
        }
    }

    for (name, file) in files {
        if let Some((descriptor, template)) = dirs.get_mut(&name) {
            match file.as_str() {
                DESCRIPTOR_FILE => *descriptor = true,
                TEMPLATE_FILE => *template = true,
                _ => {}
            }
        }
    }

    dirs.into_iter()
        .map(|(name, (descriptor, template))| {
            let dir = root.join(&name);
            TestCase {
                descriptor_path: descriptor.then(|| dir.join(DESCRIPTOR_FILE)),
                template_path: template.then(|| dir.join(TEMPLATE_FILE)),
                name,
                dir,
            }
        })
        .collect()
}
