//! Server configuration and CLI argument parsing
//!
//! Settings come from command-line arguments with environment variable
//! fallbacks (`TURNSTILE_` prefix).
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Using CLI arguments
//! turnstile --http-port 9090 --limit 120
//!
//! # Using environment variables
//! export TURNSTILE_STORE=redis
//! export TURNSTILE_REDIS_URL=redis://cache:6379/
//! turnstile
//!
//! # Mixed (CLI overrides env)
//! export TURNSTILE_HTTP_PORT=8080
//! turnstile --http-port 9090  # Uses port 9090
//! ```

use anyhow::{Result, anyhow};
use clap::Parser;
use serde::Deserialize;
use std::time::Duration;
use turnstile::LimiterConfig;

/// Main configuration structure for the server
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP listener
    pub http: HttpConfig,
    /// Backing store
    pub store: StoreConfig,
    /// Admission parameters shared by every request
    pub limiter: LimiterConfig,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Type of store to use
    pub store_type: StoreType,
    /// Connection URL, required for the redis store
    pub redis_url: Option<String>,
    /// Initial capacity of the memory store
    pub capacity: usize,
    /// Sweep interval of the memory store (seconds)
    pub cleanup_interval: u64,
}

/// Available backing stores
///
/// - **Memory**: Single-process; state is lost on restart
/// - **Redis**: Shared by every instance pointing at the same server
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    Memory,
    Redis,
}

impl std::str::FromStr for StoreType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreType::Memory),
            "redis" => Ok(StoreType::Redis),
            _ => Err(anyhow!(
                "Invalid store type: {}. Valid options are: memory, redis",
                s
            )),
        }
    }
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// TURNSTILE_ prefix. CLI arguments take precedence over environment variables.
///
/// # Examples
///
/// In-memory store for a single instance:
/// ```bash
/// turnstile --limit 100 --window 60
/// ```
///
/// Shared Redis store with debug logging:
/// ```bash
/// turnstile --store redis --redis-url redis://127.0.0.1:6379/ --log-level debug
/// ```
#[derive(Parser, Debug)]
#[command(
    name = "turnstile",
    about = "Admission control service",
    long_about = "Fixed-window admission control with bans and usage statistics.\n\nEnvironment variables with TURNSTILE_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // HTTP Transport
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP host",
        default_value = "127.0.0.1",
        env = "TURNSTILE_HTTP_HOST"
    )]
    pub http_host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 8080,
        env = "TURNSTILE_HTTP_PORT"
    )]
    pub http_port: u16,

    // Store Configuration
    #[arg(
        long,
        value_name = "TYPE",
        help = "Store type: memory, redis",
        default_value = "memory",
        env = "TURNSTILE_STORE"
    )]
    pub store: StoreType,
    #[arg(
        long,
        value_name = "URL",
        help = "Redis connection URL (required with --store redis)",
        env = "TURNSTILE_REDIS_URL"
    )]
    pub redis_url: Option<String>,
    #[arg(
        long,
        value_name = "SIZE",
        help = "Initial memory store capacity",
        default_value_t = 100_000,
        env = "TURNSTILE_STORE_CAPACITY"
    )]
    pub store_capacity: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Cleanup interval for the memory store (seconds)",
        default_value_t = 300,
        env = "TURNSTILE_STORE_CLEANUP_INTERVAL"
    )]
    pub store_cleanup_interval: u64,

    // Limiter
    #[arg(
        long,
        value_name = "N",
        help = "Requests admitted per identity per window",
        default_value_t = 60,
        env = "TURNSTILE_LIMIT"
    )]
    pub limit: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Window length (seconds)",
        default_value_t = 60,
        env = "TURNSTILE_WINDOW"
    )]
    pub window: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Retention of the per-endpoint counters, 0 keeps them forever (seconds)",
        default_value_t = 7_776_000,
        env = "TURNSTILE_RETENTION"
    )]
    pub retention: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Lifetime of each hourly statistics bucket (seconds)",
        default_value_t = 2_592_000,
        env = "TURNSTILE_HOURLY_TTL"
    )]
    pub hourly_ttl: u64,
    #[arg(
        long,
        value_name = "PREFIX",
        help = "Namespace for every stored key",
        default_value = "turnstile",
        env = "TURNSTILE_KEY_PREFIX"
    )]
    pub key_prefix: String,
    #[arg(
        long,
        value_name = "MS",
        help = "Upper bound on a single store call (milliseconds)",
        default_value_t = 250,
        env = "TURNSTILE_COMMAND_TIMEOUT_MS"
    )]
    pub command_timeout_ms: u64,

    // General options
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "TURNSTILE_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The redis store is selected without a URL
    /// - A limiter parameter is out of range
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    /// Build and validate configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let limiter = LimiterConfig {
            limit: args.limit,
            window: Duration::from_secs(args.window),
            retention: Duration::from_secs(args.retention),
            hourly_ttl: Duration::from_secs(args.hourly_ttl),
            key_prefix: args.key_prefix,
            command_timeout: Duration::from_millis(args.command_timeout_ms),
        };

        let config = Config {
            http: HttpConfig {
                host: args.http_host,
                port: args.http_port,
            },
            store: StoreConfig {
                store_type: args.store,
                redis_url: args.redis_url,
                capacity: args.store_capacity,
                cleanup_interval: args.store_cleanup_interval,
            },
            limiter,
            log_level: args.log_level,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    fn validate(&self) -> Result<()> {
        if self.store.store_type == StoreType::Redis && self.store.redis_url.is_none() {
            return Err(anyhow!(
                "The redis store needs a connection URL.\n\n\
                Example:\n  \
                turnstile --store redis --redis-url redis://127.0.0.1:6379/\n\n\
                For more information, try '--help'"
            ));
        }

        if self.store.store_type == StoreType::Memory && self.store.cleanup_interval == 0 {
            return Err(anyhow!("--store-cleanup-interval must be at least 1 second"));
        }

        self.limiter.validate()?;

        Ok(())
    }

    /// Print all available environment variables and their descriptions
    fn print_env_vars() {
        println!("Turnstile Environment Variables");
        println!("===============================");
        println!();
        println!("All environment variables use the TURNSTILE_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("Transport Configuration:");
        println!("  TURNSTILE_HTTP_HOST=<host>            HTTP host [default: 127.0.0.1]");
        println!("  TURNSTILE_HTTP_PORT=<port>            HTTP port [default: 8080]");
        println!();

        println!("Store Configuration:");
        println!(
            "  TURNSTILE_STORE=<type>                Store type: memory, redis [default: memory]"
        );
        println!("  TURNSTILE_REDIS_URL=<url>             Redis connection URL");
        println!(
            "  TURNSTILE_STORE_CAPACITY=<size>       Initial memory store capacity [default: 100000]"
        );
        println!(
            "  TURNSTILE_STORE_CLEANUP_INTERVAL=<s>  Memory store sweep interval [default: 300]"
        );
        println!();

        println!("Limiter Configuration:");
        println!("  TURNSTILE_LIMIT=<n>                   Requests per window [default: 60]");
        println!("  TURNSTILE_WINDOW=<secs>               Window length [default: 60]");
        println!(
            "  TURNSTILE_RETENTION=<secs>            Endpoint counter retention, 0 = forever [default: 7776000]"
        );
        println!(
            "  TURNSTILE_HOURLY_TTL=<secs>           Hourly bucket lifetime [default: 2592000]"
        );
        println!("  TURNSTILE_KEY_PREFIX=<prefix>         Key namespace [default: turnstile]");
        println!(
            "  TURNSTILE_COMMAND_TIMEOUT_MS=<ms>     Store call timeout [default: 250]"
        );
        println!();

        println!("General Configuration:");
        println!(
            "  TURNSTILE_LOG_LEVEL=<level>           Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # Share state between instances through Redis");
        println!("  export TURNSTILE_STORE=redis");
        println!("  export TURNSTILE_REDIS_URL=redis://127.0.0.1:6379/");
        println!();
        println!("  # Run server (CLI args override env vars)");
        println!("  turnstile --http-port 9090 --limit 120");
    }
}
