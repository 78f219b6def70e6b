//! Multi-test orchestration
//!
//! Runs each selected test against a fresh [`Env`], with its own progress log
//! and engine directory, and collects the outcome. A failing test is logged
//! and recorded; the remaining tests still run.

use std::fs::{self, File};
use std::io::BufWriter;
use std::time::Instant;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::bench::{Registry, Strategy};
use crate::config::BenchmarkConfig;
use crate::engine::Backend;
use crate::models::{BenchmarkResult, RunReport};
use crate::util::{format_bytes, format_duration, format_throughput};
use crate::workload::{Env, Progress};
use crate::Result;

const BAR_TEMPLATE: &str = "{spinner} {prefix} {bytes}/{total_bytes} ({eta}) {msg}";

/// Runs the configured tests against engines opened through `B`
pub struct Runner<B> {
    backend: B,
    registry: Registry,
    config: BenchmarkConfig,
    progress_bar: bool,
}

impl<B: Backend> Runner<B> {
    pub fn new(backend: B, registry: Registry, config: BenchmarkConfig) -> Self {
        Self {
            backend,
            registry,
            config,
            progress_bar: false,
        }
    }

    /// Show a terminal progress bar per test
    pub fn with_progress_bar(mut self, enabled: bool) -> Self {
        self.progress_bar = enabled;
        self
    }

    /// Run every selected test in order.
    ///
    /// Fails without running anything when the configuration is invalid or a
    /// test name is unknown; individual test failures are reported in the
    /// returned [`RunReport`].
    pub async fn run(&self) -> Result<RunReport> {
        self.config.validate()?;
        let selected = self.registry.select(&self.config.tests)?;

        let mut report = RunReport::default();
        for (name, strategy) in &selected {
            let result = self.run_test(name, strategy).await;
            match &result.error {
                None => info!(
                    test = %name,
                    "wrote {} in {} ({})",
                    format_bytes(result.bytes_written),
                    format_duration(result.elapsed),
                    format_throughput(result.throughput_mbps)
                ),
                Some(e) => error!("test {:?} failed: {}", name, e),
            }
            report.push(result);
        }
        Ok(report)
    }

    /// Run one test and turn its outcome into a result record.
    pub async fn run_test(&self, name: &str, strategy: &Strategy) -> BenchmarkResult {
        let timestamp = Utc::now();
        let started = Instant::now();
        info!("== running {:?} ({})", name, strategy.description());

        let mut written = 0;
        let outcome = match self.prepare(name) {
            Ok(mut env) => {
                let progress = env.progress();
                let dir = self.config.engine_dir(name);
                let outcome = strategy.benchmark(&self.backend, &dir, &mut env).await;
                written = progress.written();
                outcome
            }
            Err(e) => Err(e),
        };

        BenchmarkResult::new(
            name,
            timestamp,
            written,
            started.elapsed(),
            outcome.err().map(|e| e.to_string()),
        )
    }

    /// Create the progress log and the workload driver of one test.
    fn prepare(&self, name: &str) -> Result<Env> {
        let workload = self.config.workload();
        workload.validate()?;

        if !self.config.log_dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.config.log_dir)?;
        }
        let log = BufWriter::new(File::create(self.config.log_file(name))?);

        let mut progress = Progress::new(workload.size, workload.log_percent, Box::new(log));
        if self.progress_bar {
            progress = progress.with_bar(progress_bar(name, workload.size));
        }
        Ok(Env::with_progress(workload, progress))
    }
}

fn progress_bar(name: &str, total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        bar.set_style(style);
    }
    bar.set_prefix(name.to_string());
    bar
}
