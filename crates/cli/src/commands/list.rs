//! `autotest list`: show the cases discovered under a root

use autotest::scan_dir;
use autotest_common::TestCase;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Autotest root directory
    #[arg(short, long, env = "AUTOTEST_DIR", default_value = "tests/autotests/express")]
    pub dir: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct CaseRow {
    pub name: String,
    pub descriptor: bool,
    pub template: bool,
    pub dir: String,
}

impl From<&TestCase> for CaseRow {
    fn from(case: &TestCase) -> Self {
        Self {
            name: case.name.clone(),
            descriptor: case.descriptor_path.is_some(),
            template: case.template_path.is_some(),
            dir: case.dir.display().to_string(),
        }
    }
}

impl TableDisplay for CaseRow {
    fn headers() -> Vec<&'static str> {
        vec!["Case", "Descriptor", "Template", "Directory"]
    }

    fn row(&self) -> Vec<String> {
        let mark = |present: bool| if present { "yes" } else { "-" }.to_string();
        vec![
            self.name.clone(),
            mark(self.descriptor),
            mark(self.template),
            self.dir.clone(),
        ]
    }
}

pub fn execute(args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let cases = scan_dir(&args.dir)?;
    let rows: Vec<CaseRow> = cases.iter().map(CaseRow::from).collect();
    print_list(&rows, format);
    Ok(())
}
