//! Command-line interface for autoprice.

use crate::config::PriceConfig;
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Vehicle price prediction: serving, evaluation and encoding diagnostics.
#[derive(Parser)]
#[command(name = "autoprice")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long, env = "AUTOPRICE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory relative paths are resolved against
    #[arg(long, env = "AUTOPRICE_PROJECT_ROOT")]
    pub project_root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, env = "AUTOPRICE_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the prediction service, metrics endpoint and resource sampler
    Serve {
        /// Bind address for the prediction API
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Bind address for the metrics endpoint
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },

    /// Score a model version against a labelled JSON-lines dataset
    Evaluate {
        /// Model version tag (v1, v2, ...)
        #[arg(short = 'm', long)]
        model_version: String,

        /// Dataset file, one JSON object per line with a `price` field
        #[arg(short, long)]
        dataset: PathBuf,

        /// Keep serving the metrics endpoint after scoring until interrupted
        #[arg(long)]
        hold_metrics: bool,
    },

    /// Print the encoded vector of a raw record for a model version
    Encode {
        /// Model version tag (v1, v2, ...)
        #[arg(short = 'm', long)]
        model_version: String,

        /// Raw record as a JSON object
        #[arg(short, long)]
        record: String,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load the configuration, apply command-line overrides and validate the result.
    pub fn load_config(&self) -> Result<PriceConfig> {
        let mut config = match &self.config {
            Some(path) => PriceConfig::from_file(path, self.project_root.as_deref())?,
            None => {
                let mut config = PriceConfig::default();
                if let Some(root) = &self.project_root {
                    config.resolve_paths(root);
                }
                config
            }
        };

        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Commands::Serve { bind, metrics_addr } = &self.command {
            if let Some(bind) = bind {
                config.service.bind_addr = *bind;
            }
            if let Some(addr) = metrics_addr {
                config.monitor.metrics_addr = *addr;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::parse_from([
            "autoprice",
            "--config",
            "conf.json",
            "serve",
            "--bind",
            "0.0.0.0:9999",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("conf.json")));
        match cli.command {
            Commands::Serve { bind, metrics_addr } => {
                assert_eq!(bind, Some("0.0.0.0:9999".parse().unwrap()));
                assert!(metrics_addr.is_none());
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_evaluate() {
        let cli = Cli::parse_from([
            "autoprice",
            "evaluate",
            "-m",
            "v2",
            "--dataset",
            "test.jsonl",
        ]);
        match cli.command {
            Commands::Evaluate {
                model_version,
                dataset,
                hold_metrics,
            } => {
                assert_eq!(model_version, "v2");
                assert_eq!(dataset, PathBuf::from("test.jsonl"));
                assert!(!hold_metrics);
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let cli = Cli::parse_from([
            "autoprice",
            "--log-level",
            "warn",
            "--project-root",
            "/srv/prices",
            "serve",
            "--bind",
            "0.0.0.0:9000",
        ]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.service.bind_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.observability.log_level, "warn");
        assert_eq!(config.registry.model_dir, PathBuf::from("/srv/prices/models"));
    }

    #[test]
    fn test_load_config_validates_without_file() {
        let cli = Cli::parse_from([
            "autoprice",
            "serve",
            "--bind",
            "127.0.0.1:8002",
            "--metrics-addr",
            "127.0.0.1:8002",
        ]);
        let err = cli.load_config().unwrap_err();
        assert!(err.to_string().contains("monitor.metrics_addr"), "{}", err);
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"registry": {"versions": []}}"#).unwrap();
        let cli = Cli::parse_from([
            "autoprice",
            "--config",
            path.to_str().unwrap(),
            "encode",
            "-m",
            "v1",
            "-r",
            "{}",
        ]);
        assert!(cli.load_config().is_err());
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(Cli::try_parse_from(["autoprice", "serve", "--bind", "nope"]).is_err());
    }
}
