use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use kvwritebench::bench::Registry;
use kvwritebench::config::BenchmarkConfig;
use kvwritebench::engine::RocksBackend;
use kvwritebench::error::user_friendly_message;
use kvwritebench::logging::LogConfig;
use kvwritebench::runner::Runner;
use kvwritebench::util::parse_size;
use kvwritebench::Result;

/// Key-value store write benchmark
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma separated tests to run (see --list)
    #[arg(long)]
    test: Option<String>,
    /// Total amount of value data to write, e.g. 500mb
    #[arg(long)]
    size: Option<String>,
    /// Size of each value, e.g. 100b
    #[arg(long = "valuesize")]
    value_size: Option<String>,
    /// Size of each key, e.g. 32b
    #[arg(long = "keysize")]
    key_size: Option<String>,
    /// Test database directory
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Test log output directory
    #[arg(long = "logdir")]
    log_dir: Option<PathBuf>,
    /// Progress record interval in percent of --size
    #[arg(long = "logpercent")]
    log_percent: Option<u8>,
    /// Seed for reproducible keys and values
    #[arg(long)]
    seed: Option<u64>,
    /// TOML file with defaults for the options above
    #[arg(long)]
    config: Option<PathBuf>,
    /// List the available tests and exit
    #[arg(long, default_value_t = false)]
    list: bool,
    /// Hide the progress bar
    #[arg(long, default_value_t = false)]
    quiet: bool,
    /// Debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    /// Start from the config file (or defaults) and apply the flags on top.
    fn benchmark_config(&self) -> Result<BenchmarkConfig> {
        let mut config = match &self.config {
            Some(path) => BenchmarkConfig::load(path)?,
            None => BenchmarkConfig::default(),
        };
        if let Some(test) = &self.test {
            config = config.with_tests(Registry::parse_selection(test));
        }
        if let Some(size) = &self.size {
            config = config.with_size(parse_size(size)?);
        }
        if let Some(size) = &self.value_size {
            config = config.with_value_size(parse_size(size)?);
        }
        if let Some(size) = &self.key_size {
            config = config.with_key_size(parse_size(size)?);
        }
        if let Some(dir) = &self.dir {
            config = config.with_dir(dir);
        }
        if let Some(dir) = &self.log_dir {
            config = config.with_log_dir(dir);
        }
        if let Some(percent) = self.log_percent {
            config = config.with_log_percent(percent);
        }
        if self.seed.is_some() {
            config = config.with_seed(self.seed);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = LogConfig::verbosity(args.verbose).init() {
        eprintln!("{}", e);
    }

    let registry = Registry::standard();
    if args.list {
        for name in registry.names() {
            if let Ok(strategy) = registry.get(name) {
                println!("{:<20} {}", name, strategy.description());
            }
        }
        return ExitCode::SUCCESS;
    }

    let config = match args.benchmark_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", user_friendly_message(&e));
            return ExitCode::FAILURE;
        }
    };

    let runner = Runner::new(RocksBackend, registry, config).with_progress_bar(!args.quiet);
    let report = match runner.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("{}", user_friendly_message(&e));
            return ExitCode::FAILURE;
        }
    };

    println!("{}", report.summary());
    if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        error!("{} of {} tests failed", report.failed().len(), report.results.len());
        ExitCode::FAILURE
    }
}
