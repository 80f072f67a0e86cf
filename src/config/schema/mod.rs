use crate::errors::HostbridgeError;
use crate::providers::openai::DEFAULT_API_BASE;
use crate::utils::{expand_home, get_hostbridge_home};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Implements `Debug` for a config struct, masking the named secret fields.
///
/// - `redact(field)`: `String` field, shows `[empty]` or `[REDACTED]`
/// - `redact_option(field)`: `Option<String>` field, shows `None` or `Some("[REDACTED]")`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, redact_option($field:ident)) => {
        $builder.field(
            stringify!($field),
            &$self.$field.as_ref().map(|_| "[REDACTED]"),
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, redact_option($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact_option($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> String {
    get_hostbridge_home()
        .map(|home| home.join("data").to_string_lossy().into_owned())
        .unwrap_or_else(|_| "~/.hostbridge/data".to_string())
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Defaults to `{dataDir}/mappings.json`.
    #[serde(default, rename = "mappingsFile")]
    pub mappings_file: Option<String>,
    /// Reload the mapping file when it changes on disk.
    #[serde(default = "default_true")]
    pub watch: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mappings_file: None,
            watch: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_result_timeout_ms() -> u64 {
    30_000
}

fn default_host_scan_interval_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Agent-side poll period while waiting for a result.
    #[serde(default = "default_poll_interval_ms", rename = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_result_timeout_ms", rename = "resultTimeoutMs")]
    pub result_timeout_ms: u64,
    /// Host-side period between scans of every group's task directory.
    #[serde(
        default = "default_host_scan_interval_ms",
        rename = "hostScanIntervalMs"
    )]
    pub host_scan_interval_ms: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            result_timeout_ms: default_result_timeout_ms(),
            host_scan_interval_ms: default_host_scan_interval_ms(),
        }
    }
}

impl IpcConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }

    pub fn host_scan_interval(&self) -> Duration {
        Duration::from_millis(self.host_scan_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Overrides `provider.model` for agent invocations.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens", rename = "maxTokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, rename = "systemPrompt")]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default = "default_api_base", rename = "apiBase")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(
        default = "default_request_timeout_secs",
        rename = "requestTimeoutSecs"
    )]
    pub request_timeout_secs: u64,
}

redact_debug!(
    ProviderConfig,
    redact(api_key),
    api_base,
    model,
    request_timeout_secs,
);

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

fn default_webhook_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Delivery endpoint for `channel_send` and `message` requests. The URL may embed a token.
    #[serde(default, rename = "webhookUrl")]
    pub webhook_url: Option<String>,
    #[serde(
        default = "default_webhook_timeout_secs",
        rename = "webhookTimeoutSecs"
    )]
    pub webhook_timeout_secs: u64,
}

redact_debug!(
    ChannelsConfig,
    redact_option(webhook_url),
    webhook_timeout_secs,
);

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir", rename = "dataDir")]
    pub data_dir: String,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            registry: RegistryConfig::default(),
            ipc: IpcConfig::default(),
            agent: AgentConfig::default(),
            provider: ProviderConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl Config {
    pub fn data_dir_path(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }

    pub fn mappings_path(&self) -> PathBuf {
        match &self.registry.mappings_file {
            Some(file) => expand_home(file),
            None => self.data_dir_path().join("mappings.json"),
        }
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir_path().join("sessions")
    }

    pub fn scheduled_tasks_path(&self) -> PathBuf {
        self.data_dir_path().join("scheduled_tasks.json")
    }

    pub fn validate(&self) -> Result<(), HostbridgeError> {
        self.validate_paths()?;
        self.validate_ipc()?;
        self.validate_agent()?;
        self.validate_provider()?;
        self.validate_channels()?;
        Ok(())
    }

    fn validate_paths(&self) -> Result<(), HostbridgeError> {
        if self.data_dir.trim().is_empty() {
            return Err(HostbridgeError::Config("dataDir must not be empty".into()));
        }
        if let Some(file) = &self.registry.mappings_file
            && file.trim().is_empty()
        {
            return Err(HostbridgeError::Config(
                "registry.mappingsFile must not be empty when set".into(),
            ));
        }
        Ok(())
    }

    fn validate_ipc(&self) -> Result<(), HostbridgeError> {
        let ipc = &self.ipc;
        if ipc.poll_interval_ms == 0 {
            return Err(HostbridgeError::Config(
                "ipc.pollIntervalMs must be > 0".into(),
            ));
        }
        if ipc.host_scan_interval_ms == 0 {
            return Err(HostbridgeError::Config(
                "ipc.hostScanIntervalMs must be > 0".into(),
            ));
        }
        if ipc.result_timeout_ms < ipc.poll_interval_ms {
            return Err(HostbridgeError::Config(format!(
                "ipc.resultTimeoutMs ({}) must be at least ipc.pollIntervalMs ({})",
                ipc.result_timeout_ms, ipc.poll_interval_ms
            )));
        }
        Ok(())
    }

    fn validate_agent(&self) -> Result<(), HostbridgeError> {
        let a = &self.agent;
        if a.max_tokens == 0 {
            return Err(HostbridgeError::Config("agent.maxTokens must be > 0".into()));
        }
        if a.max_tokens > 1_000_000 {
            return Err(HostbridgeError::Config(
                "agent.maxTokens is unreasonably large (> 1,000,000)".into(),
            ));
        }
        if !a.temperature.is_finite() || !(0.0..=2.0).contains(&a.temperature) {
            return Err(HostbridgeError::Config(
                "agent.temperature must be a finite number between 0.0 and 2.0".into(),
            ));
        }
        if a.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(HostbridgeError::Config(
                "agent.model must not be empty when set".into(),
            ));
        }
        Ok(())
    }

    fn validate_provider(&self) -> Result<(), HostbridgeError> {
        let p = &self.provider;
        if !is_http_url(&p.api_base) {
            return Err(HostbridgeError::Config(format!(
                "provider.apiBase must be an http(s) URL, got '{}'",
                p.api_base
            )));
        }
        if p.model.trim().is_empty() {
            return Err(HostbridgeError::Config(
                "provider.model must not be empty".into(),
            ));
        }
        if p.request_timeout_secs == 0 {
            return Err(HostbridgeError::Config(
                "provider.requestTimeoutSecs must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_channels(&self) -> Result<(), HostbridgeError> {
        let c = &self.channels;
        // The URL itself is secret; keep it out of the message.
        if let Some(url) = &c.webhook_url
            && !is_http_url(url)
        {
            return Err(HostbridgeError::Config(
                "channels.webhookUrl must be an http(s) URL".into(),
            ));
        }
        if c.webhook_timeout_secs == 0 {
            return Err(HostbridgeError::Config(
                "channels.webhookTimeoutSecs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

#[cfg(test)]
mod tests;
