//! Configuration module
//!
//! Focused config types for each subsystem (agent loop, LLM provider,
//! sandbox, gateway server), loaded from an optional TOML file with
//! `REAGENT_*` environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent loop settings
    pub agent: AgentConfig,
    /// LLM provider settings
    pub provider: ProviderConfig,
    /// Sandbox/workspace settings
    pub sandbox: SandboxConfig,
    /// Gateway server settings
    pub server: ServerConfig,
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum ReAct iterations per task
    pub max_iterations: u32,
    /// Per-call LLM timeout
    #[serde(with = "humantime_serde")]
    pub llm_call_timeout: Duration,
    /// Per-call tool timeout
    #[serde(with = "humantime_serde")]
    pub tool_call_timeout: Duration,
    /// Repeated-action count that triggers a warning observation
    pub loop_detection_threshold: u32,
    /// Recovery attempts allowed per normalized error hash
    pub recovery_max_retries: u32,
    /// Persist the conversation context after every mutation
    pub context_autosave: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_iterations: 100,
            llm_call_timeout: Duration::from_secs(120),
            tool_call_timeout: Duration::from_secs(300),
            loop_detection_threshold: 2,
            recovery_max_retries: 3,
            context_autosave: true,
        }
    }
}

/// LLM provider configuration (OpenRouter-compatible chat endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key (never logged)
    #[serde(skip_serializing)]
    pub api_key: SecretString,
    /// Base URL of the chat completions API
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// HTTP request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Sampling temperature
    pub temperature: f32,
    /// Optional completion token cap
    pub max_tokens: Option<u32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            api_key: SecretString::from(""),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "anthropic/claude-3.5-sonnet".to_string(),
            request_timeout: Duration::from_secs(120),
            temperature: 0.2,
            max_tokens: None,
        }
    }
}

/// Sandbox and workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Docker image for session containers
    pub image: String,
    /// Path the workspace is mounted at inside the container
    pub mount_path: String,
    /// Root directory holding per-session state on the host
    pub workspace_root: PathBuf,
    /// Remove the session workspace on cleanup
    pub auto_cleanup: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            image: "python:3.11-slim".to_string(),
            mount_path: "/workspace".to_string(),
            workspace_root: PathBuf::from("./workspace"),
            auto_cleanup: false,
        }
    }
}

impl SandboxConfig {
    /// Directory holding all session state
    pub fn sessions_dir(&self) -> PathBuf {
        self.workspace_root.join("sessions")
    }
}

/// Gateway server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,
    /// Port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment.
    ///
    /// Environment variables use `REAGENT_` prefix with `__` as the
    /// section separator, e.g. `REAGENT_PROVIDER__API_KEY`.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        } else {
            if let Some(config_dir) = dirs::config_dir() {
                builder = builder.add_source(
                    config::File::from(config_dir.join("reagent").join("reagent.toml"))
                        .required(false),
                );
            }
            builder = builder.add_source(
                config::File::with_name("reagent").required(false),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("REAGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Render the configuration as TOML (the api key is never serialized).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validate settings that have no sensible fallback.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_iterations == 0 {
            return Err(Error::Config(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.agent.loop_detection_threshold == 0 {
            return Err(Error::Config(
                "agent.loop_detection_threshold must be at least 1".to_string(),
            ));
        }
        if !self.sandbox.mount_path.starts_with('/') {
            return Err(Error::Config(format!(
                "sandbox.mount_path must be absolute, got {}",
                self.sandbox.mount_path
            )));
        }
        if self.provider.base_url.is_empty() {
            return Err(Error::Config("provider.base_url is empty".to_string()));
        }
        Ok(())
    }
}
