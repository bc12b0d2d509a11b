//! `threadfence` command line runner

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use threadfence_conformance::harness::{self, Harness};
use threadfence_conformance::{ConformanceConfig, Result};

const EXIT_CONFIG_ERROR: u8 = 2;

/// Check that scoped memory fences order writes for other devices and the host.
#[derive(Parser, Debug)]
#[command(name = "threadfence")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Only run cases whose name contains this string
    #[arg(value_name = "FILTER")]
    filter: Option<String>,

    /// Protocol iterations per case
    #[arg(short = 'n', long)]
    iterations: Option<u32>,

    /// Number of emulated devices
    #[arg(short, long)]
    devices: Option<usize>,

    /// Emulate devices that cannot access each other's memory
    #[arg(long)]
    no_peer_access: bool,

    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List test cases and exit
    #[arg(long)]
    list: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn load_config(&self) -> Result<ConformanceConfig> {
        let mut config = match &self.config {
            Some(path) => ConformanceConfig::from_json_file(path)?,
            None => ConformanceConfig::default(),
        };
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(devices) = self.devices {
            config.topology.device_count = devices;
        }
        if self.no_peer_access {
            config.topology.peer_access = false;
        }
        Ok(config)
    }

    /// Config errors here map to exit status 2
    fn build_harness(&self) -> Result<Harness> {
        self.load_config().and_then(Harness::new)
    }

    fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    if cli.list {
        for case in harness::registry() {
            println!("{:<42} {}", case.name, case.description);
        }
        return ExitCode::SUCCESS;
    }

    let harness = match cli.build_harness() {
        Ok(harness) => harness,
        Err(e) => {
            eprintln!("threadfence: {}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let summary = harness.run(cli.filter.as_deref());
    for report in &summary.reports {
        println!("{}", report.summary_line());
    }
    println!(
        "{} passed, {} skipped, {} failed",
        summary.passed(),
        summary.skipped(),
        summary.failed()
    );

    ExitCode::from(summary.exit_code() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadfence_conformance::ConformanceError;

    fn config_file(name: &str, json: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "threadfence-{}-{}.json",
            name,
            std::process::id()
        ));
        std::fs::write(&path, json).unwrap();
        path
    }

    const FILE_CONFIG: &str = r#"{
        "iterations": 7,
        "topology": { "device_count": 4, "peer_access": true, "device_memory_bytes": 4096 }
    }"#;

    #[test]
    fn test_file_values_used_without_flags() {
        let path = config_file("file-only", FILE_CONFIG);
        let cli = Cli::try_parse_from(["threadfence", "--config", path.to_str().unwrap()]).unwrap();
        let config = cli.load_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.iterations, 7);
        assert_eq!(config.topology.device_count, 4);
        assert!(config.topology.peer_access);
        assert_eq!(config.topology.device_memory_bytes, 4096);
    }

    #[test]
    fn test_flags_override_config_file() {
        let path = config_file("override", FILE_CONFIG);
        let cli = Cli::try_parse_from([
            "threadfence",
            "--config",
            path.to_str().unwrap(),
            "--iterations",
            "3",
            "--devices",
            "1",
            "--no-peer-access",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.iterations, 3);
        assert_eq!(config.topology.device_count, 1);
        assert!(!config.topology.peer_access);
        // Not overridden by any flag.
        assert_eq!(config.topology.device_memory_bytes, 4096);
    }

    #[test]
    fn test_zero_iterations_is_a_config_error() {
        let cli = Cli::try_parse_from(["threadfence", "--iterations", "0"]).unwrap();
        assert!(matches!(
            cli.build_harness(),
            Err(ConformanceError::Config(_))
        ));
    }

    #[test]
    fn test_missing_config_file_is_a_config_error() {
        let cli = Cli::try_parse_from(["threadfence", "--config", "/nonexistent/threadfence.json"])
            .unwrap();
        assert!(matches!(cli.build_harness(), Err(ConformanceError::Io(_))));
    }

    #[test]
    fn test_bad_arguments_exit_with_config_status() {
        let err = Cli::try_parse_from(["threadfence", "--iterations", "many"]).unwrap_err();
        assert_eq!(err.exit_code(), i32::from(EXIT_CONFIG_ERROR));
    }

    #[test]
    fn test_verbosity_levels() {
        let cli = Cli::try_parse_from(["threadfence", "-vv"]).unwrap();
        assert_eq!(cli.log_level(), log::LevelFilter::Debug);
        let cli = Cli::try_parse_from(["threadfence"]).unwrap();
        assert_eq!(cli.log_level(), log::LevelFilter::Warn);
    }
}
