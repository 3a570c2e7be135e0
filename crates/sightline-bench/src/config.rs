//! Configuration for the load driver.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Defaults sized for a quick local run

use clap::Parser;

/// sightline-bench: drives nested observations across threads and tasks.
#[derive(Parser, Debug, Clone)]
#[command(name = "sightline-bench")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Number of OS worker threads
    #[arg(long, env = "SIGHTLINE_THREADS", default_value_t = 4)]
    pub threads: usize,

    /// Number of tokio tasks
    #[arg(long, env = "SIGHTLINE_TASKS", default_value_t = 16)]
    pub tasks: usize,

    /// Observation trees each worker builds
    #[arg(short, long, env = "SIGHTLINE_ITERATIONS", default_value_t = 1000)]
    pub iterations: usize,

    /// Nesting depth of each observation tree
    #[arg(short, long, env = "SIGHTLINE_DEPTH", default_value_t = 4)]
    pub depth: usize,

    /// Handlers to register (logging, tracing, metrics, none)
    #[arg(
        long,
        env = "SIGHTLINE_HANDLERS",
        value_delimiter = ',',
        default_value = "none"
    )]
    pub handlers: Vec<HandlerKind>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "warn")]
    pub log_level: String,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub output: OutputFormat,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// A small configuration for tests.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            threads: 2,
            tasks: 4,
            iterations: 10,
            depth: 3,
            handlers: vec![HandlerKind::None],
            log_level: "error".into(),
            output: OutputFormat::Json,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 4,
            tasks: 16,
            iterations: 1000,
            depth: 4,
            handlers: vec![HandlerKind::None],
            log_level: "warn".into(),
            output: OutputFormat::Text,
        }
    }
}

/// Handler backends the driver can register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    Logging,
    Tracing,
    Metrics,
    /// A handler that accepts every context and does nothing, so the
    /// registry still hands out enabled observations.
    None,
}

impl std::str::FromStr for HandlerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "logging" => Ok(Self::Logging),
            "tracing" => Ok(Self::Tracing),
            "metrics" => Ok(Self::Metrics),
            "none" => Ok(Self::None),
            _ => Err(format!("unknown handler: {}", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.threads, 4);
        assert_eq!(config.handlers, vec![HandlerKind::None]);
    }

    #[test]
    fn test_parse_handler_list() {
        let config = Config::parse_from([
            "sightline-bench",
            "--handlers",
            "logging,metrics",
            "--output",
            "json",
        ]);
        assert_eq!(
            config.handlers,
            vec![HandlerKind::Logging, HandlerKind::Metrics]
        );
        assert_eq!(config.output, OutputFormat::Json);
    }

    #[test]
    fn test_unknown_handler_rejected() {
        let result = Config::try_parse_from(["sightline-bench", "--handlers", "zipkin"]);
        assert!(result.is_err());
    }
}
