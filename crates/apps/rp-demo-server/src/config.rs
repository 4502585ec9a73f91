//! Configuration for the demo relying party.
//!
//! Values come from an optional TOML file and from `RP__`-prefixed environment
//! variables, the latter taking precedence:
//! - `RP__SERVER__PORT=8081`
//! - `RP__OIDC__CLIENT_ID=demo-client`
//! - `RP__LOGGING__LEVEL=debug`

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use rp_oidc::OidcClientConfig;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "rp-demo.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// The IdP registration this relying party logs users in with.
    pub oidc: OidcClientConfig,

    #[serde(default)]
    pub autologin: AutologinConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shown on the landing page and in `/health`.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Directory served under `/static`.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// How often abandoned login attempts are purged.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutologinConfig {
    /// Subject `/autologin` asks for when the request names none.
    #[serde(default = "default_autologin_subject")]
    pub default_subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8081
}

fn default_app_name() -> String {
    "OIDC demo relying party".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_autologin_subject() -> String {
    "36107120334".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            app_name: default_app_name(),
            static_dir: default_static_dir(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for AutologinConfig {
    fn default() -> Self {
        Self {
            default_subject: default_autologin_subject(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `path`, or from `RP_CONFIG_FILE` / `rp-demo.toml` when present,
    /// then overlay the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                let fallback = std::env::var("RP_CONFIG_FILE")
                    .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
                builder = builder.add_source(File::with_name(&fallback).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("RP")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Config = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.server.cleanup_interval_seconds == 0 {
            anyhow::bail!("Cleanup interval must be positive");
        }

        if self.autologin.default_subject.trim().is_empty() {
            anyhow::bail!("Default autologin subject cannot be empty");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        self.oidc
            .validate()
            .context("Invalid OIDC client configuration")?;

        Ok(())
    }
}
