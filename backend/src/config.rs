//! Configuration management.

use crate::mcp::session::DEFAULT_CHANNEL_CAPACITY;
use crate::reddit::{RedditConfig, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use anyhow::Context;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reddit_mcp_types::{DEFAULT_PORT, DEFAULT_SERVER_NAME};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    reddit: RedditSection,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            name: default_name(),
            version: default_version(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionConfig {
    /// Close sessions idle for this long. Unset disables the sweep.
    idle_timeout_secs: Option<u64>,
    #[serde(default = "default_channel_capacity")]
    channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RedditSection {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default = "default_user_agent")]
    user_agent: String,
}

impl Default for RedditSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Values given on the command line. `None` leaves lower layers untouched.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub server_name: Option<String>,
    pub server_version: Option<String>,
    pub user_agent: Option<String>,
    pub idle_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Name reported in `serverInfo` and `/health`
    pub server_name: String,
    /// Version reported in `serverInfo` and `/health`
    pub server_version: String,
    /// Allowed CORS origins (empty allows any origin)
    pub cors_allowed_origins: Vec<String>,
    /// Idle timeout for the session sweep (None disables it)
    pub idle_timeout: Option<Duration>,
    /// Capacity of each session's inbound queue
    pub channel_capacity: usize,
    /// Upstream Reddit API settings
    pub reddit: RedditConfig,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, overrides RUST_LOG environment variable)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `.reddit-mcp.toml` in current directory
    /// 2. `config.toml` in user config directory (~/.config/reddit-mcp/ on Linux)
    pub fn from_figment(cli: CliOverrides) -> anyhow::Result<Self> {
        let local_config = env::current_dir()
            .ok()
            .map(|d| d.join(".reddit-mcp.toml"));
        let user_config = directories::ProjectDirs::from("", "", "reddit-mcp")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        // Priority: defaults < user config < local config < env vars < CLI args
        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile::default()));

        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // REDDIT_MCP_SERVER_PORT -> server.port,
        // REDDIT_MCP_SESSION_IDLE_TIMEOUT_SECS -> session.idle_timeout_secs,
        // REDDIT_MCP_SESSION__IDLE_TIMEOUT_SECS also works.
        figment = figment.merge(Env::prefixed("REDDIT_MCP_").map(|key| {
            let key = key.as_str();
            if key.contains("__") {
                key.replace("__", ".").into()
            } else {
                key.replacen('_', ".", 1).into()
            }
        }));

        if let Some(p) = cli.port {
            figment = figment.merge(Serialized::default("server.port", p));
        }
        if let Some(ref name) = cli.server_name {
            figment = figment.merge(Serialized::default("server.name", name));
        }
        if let Some(ref version) = cli.server_version {
            figment = figment.merge(Serialized::default("server.version", version));
        }
        if let Some(ref agent) = cli.user_agent {
            figment = figment.merge(Serialized::default("reddit.user_agent", agent));
        }
        if let Some(secs) = cli.idle_timeout_secs {
            figment = figment.merge(Serialized::default("session.idle_timeout_secs", secs));
        }
        if let Some(ref level) = cli.log_level {
            figment = figment.merge(Serialized::default("logging.log_level", level));
        }

        let config_file: ConfigFile = figment.extract()?;
        Ok(config_file.into())
    }

    /// Load configuration from plain environment variables only.
    ///
    /// Honors `PORT`, `MCP_SERVER_NAME`, `MCP_SERVER_VERSION` and
    /// `REDDIT_USER_AGENT`; everything else takes its default.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut file = ConfigFile::default();

        if let Ok(port) = env::var("PORT") {
            file.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        if let Ok(name) = env::var("MCP_SERVER_NAME") {
            file.server.name = name;
        }
        if let Ok(version) = env::var("MCP_SERVER_VERSION") {
            file.server.version = version;
        }
        if let Ok(agent) = env::var("REDDIT_USER_AGENT") {
            file.reddit.user_agent = agent;
        }

        Ok(file.into())
    }
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        Self {
            port: file.server.port,
            server_name: file.server.name,
            server_version: file.server.version,
            cors_allowed_origins: file.server.cors_allowed_origins,
            idle_timeout: file
                .session
                .idle_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            channel_capacity: file.session.channel_capacity.max(1),
            reddit: RedditConfig {
                base_url: file.reddit.base_url,
                user_agent: file.reddit.user_agent,
            },
            log_file: file.logging.log_file,
            log_level: file.logging.log_level,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env().unwrap_or_else(|_| ConfigFile::default().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "REDDIT_MCP_SERVER_PORT",
        "REDDIT_MCP_SERVER_NAME",
        "REDDIT_MCP_SESSION_IDLE_TIMEOUT_SECS",
        "REDDIT_MCP_SESSION__CHANNEL_CAPACITY",
        "PORT",
        "MCP_SERVER_NAME",
        "MCP_SERVER_VERSION",
        "REDDIT_USER_AGENT",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    /// Run `f` with the current directory set to a fresh temp dir.
    fn in_temp_dir<T>(setup: impl FnOnce(&TempDir), f: impl FnOnce() -> T) -> T {
        let temp_dir = TempDir::new().unwrap();
        setup(&temp_dir);
        let original_dir = env::current_dir().unwrap();
        env::set_current_dir(&temp_dir).unwrap();
        let result = f();
        let _ = env::set_current_dir(original_dir);
        result
    }

    #[test]
    #[serial]
    fn test_from_figment_defaults() {
        clear_env();
        let config = in_temp_dir(|_| {}, || Config::from_figment(CliOverrides::default()))
            .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.server_name, "reddit-mcp");
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.idle_timeout.is_none());
        assert_eq!(config.reddit.user_agent, "RedditMCP/1.0.0");
        assert!(config.cors_allowed_origins.is_empty());
    }

    #[test]
    #[serial]
    fn test_from_figment_config_file() {
        clear_env();
        let config = in_temp_dir(
            |dir| {
                fs::write(
                    dir.path().join(".reddit-mcp.toml"),
                    r#"
[server]
port = 7777
name = "my-reddit"
cors_allowed_origins = ["http://localhost:5173"]

[session]
idle_timeout_secs = 600

[reddit]
user_agent = "MyBot/2.0"
"#,
                )
                .unwrap();
            },
            || Config::from_figment(CliOverrides::default()),
        )
        .unwrap();

        assert_eq!(config.port, 7777);
        assert_eq!(config.server_name, "my-reddit");
        assert_eq!(config.cors_allowed_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.reddit.user_agent, "MyBot/2.0");
        assert_eq!(config.reddit.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    #[serial]
    fn test_from_figment_env_vars_override_config_file() {
        clear_env();
        env::set_var("REDDIT_MCP_SERVER_PORT", "8888");
        env::set_var("REDDIT_MCP_SESSION_IDLE_TIMEOUT_SECS", "30");
        env::set_var("REDDIT_MCP_SESSION__CHANNEL_CAPACITY", "8");

        let config = in_temp_dir(
            |dir| fs::write(dir.path().join(".reddit-mcp.toml"), "[server]\nport = 7777").unwrap(),
            || Config::from_figment(CliOverrides::default()),
        );
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.port, 8888);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.channel_capacity, 8);
    }

    #[test]
    #[serial]
    fn test_from_figment_cli_overrides_env_and_config() {
        clear_env();
        env::set_var("REDDIT_MCP_SERVER_PORT", "8888");

        let config = in_temp_dir(
            |dir| fs::write(dir.path().join(".reddit-mcp.toml"), "[server]\nport = 7777").unwrap(),
            || {
                Config::from_figment(CliOverrides {
                    port: Some(9999),
                    server_name: Some("cli-name".to_string()),
                    log_level: Some("debug".to_string()),
                    ..Default::default()
                })
            },
        );
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.port, 9999);
        assert_eq!(config.server_name, "cli-name");
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    #[serial]
    fn test_zero_idle_timeout_disables_sweep() {
        clear_env();
        let config = in_temp_dir(
            |_| {},
            || {
                Config::from_figment(CliOverrides {
                    idle_timeout_secs: Some(0),
                    ..Default::default()
                })
            },
        )
        .unwrap();
        assert!(config.idle_timeout.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_plain_variables() {
        clear_env();
        env::set_var("PORT", "4000");
        env::set_var("MCP_SERVER_NAME", "env-name");
        env::set_var("MCP_SERVER_VERSION", "9.9.9");
        env::set_var("REDDIT_USER_AGENT", "EnvBot/1.0");

        let config = Config::from_env();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.server_name, "env-name");
        assert_eq!(config.server_version, "9.9.9");
        assert_eq!(config.reddit.user_agent, "EnvBot/1.0");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_port() {
        clear_env();
        env::set_var("PORT", "not-a-port");
        let result = Config::from_env();
        clear_env();
        assert!(result.is_err());
    }
}
