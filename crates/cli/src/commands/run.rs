//! `autotest run`: execute every case under a root

use autotest::{RunnerConfig, TestRunner};
use clap::Args;
use std::path::PathBuf;
use tracing::debug;

use crate::output::{print_error, print_list, print_success, OutputFormat};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Autotest root directory
    #[arg(short, long, env = "AUTOTEST_DIR")]
    pub dir: Option<PathBuf>,

    /// Run only the case with this name
    #[arg(short, long)]
    pub case: Option<String>,

    /// Create missing fixtures from actual output
    #[arg(long, env = "AUTOTEST_UPDATE_FIXTURES")]
    pub update_fixtures: bool,

    /// Output directory for results and mismatching output
    #[arg(short, long, env = "AUTOTEST_OUTPUT_DIR")]
    pub output: Option<PathBuf>,

    /// TOML file with runner configuration; flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Purge the framework from the module cache before each case
    #[arg(long)]
    pub isolate: bool,

    /// Per-case request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl RunArgs {
    /// Runner configuration: the config file (or defaults) overlaid with flags
    pub fn into_config(self) -> anyhow::Result<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::from_toml_file(path)?,
            None => RunnerConfig::default(),
        };

        if let Some(dir) = self.dir {
            config.root = dir;
        }
        if let Some(case) = self.case {
            config.case_filter = Some(case);
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(ms) = self.timeout_ms {
            config.request_timeout_ms = Some(ms);
        }
        config.update_fixtures |= self.update_fixtures;
        config.isolate_framework |= self.isolate;

        debug!("Runner configuration: {:?}", config);
        Ok(config)
    }
}

/// Run the suite; returns whether every case passed
pub async fn execute(args: RunArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let runner = TestRunner::new(args.into_config()?);

    let suite = runner.run_all().await?;
    runner.write_results(&suite)?;

    print_list(&suite.results, format);
    if suite.all_passed() {
        print_success(&format!("{} case(s) passed", suite.passed));
    } else {
        print_error(&format!("{} of {} case(s) failed", suite.failed, suite.total));
    }

    Ok(suite.all_passed())
}
