//! CLI configuration module
//!
//! Manages configuration for the CLI application.

use crate::cli::args::CliArgs;
use std::path::PathBuf;
use anyhow::Result;

/// Configuration for a download run
#[derive(Debug, Clone)]
pub struct Config {
    /// Download directory
    pub output_dir: PathBuf,
    /// Port reported to the tracker
    pub port: u16,
    /// Maximum number of peer connections
    pub max_peers: usize,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        let output_dir = args
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./downloads"));

        Self {
            output_dir,
            port: args.port,
            max_peers: args.max_peers,
            verbose: args.verbose,
            quiet: args.quiet,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow::anyhow!("Port cannot be 0"));
        }

        if self.max_peers == 0 {
            return Err(anyhow::anyhow!("max_peers must be at least 1"));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("output_dir cannot be empty"));
        }

        Ok(())
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_config_from_args() {
        let args = CliArgs::parse_from([
            "rust-torrent-fetcher",
            "download",
            "test.torrent",
            "--output-dir",
            "/tmp/downloads",
            "--port",
            "6882",
            "--max-peers",
            "10",
        ]);

        let config = Config::from_args(&args);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/downloads"));
        assert_eq!(config.port, 6882);
        assert_eq!(config.max_peers, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_default_output_dir() {
        let args = CliArgs::parse_from(["rust-torrent-fetcher", "download", "test.torrent"]);
        let config = Config::from_args(&args);
        assert_eq!(config.output_dir, PathBuf::from("./downloads"));
    }

    #[test]
    fn test_config_validate_invalid_port() {
        let config = Config {
            output_dir: PathBuf::from("./downloads"),
            port: 0,
            max_peers: 30,
            verbose: false,
            quiet: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_zero_peers() {
        let config = Config {
            output_dir: PathBuf::from("./downloads"),
            port: 6881,
            max_peers: 0,
            verbose: false,
            quiet: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_empty_output_dir() {
        let config = Config {
            output_dir: PathBuf::new(),
            port: 6881,
            max_peers: 30,
            verbose: false,
            quiet: false,
        };
        assert!(config.validate().is_err());
    }
}
