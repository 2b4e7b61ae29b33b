//! Declarative toolkit configuration.
//!
//! The configuration file is YAML. Every security server entry describes the
//! desired state of one server; the engine only reads it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use ss_admin::RateLimitConfig;
use thiserror::Error;

use crate::poll::PollConfig;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/sstk.yaml";

/// Structural configuration errors detected at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two server entries share a name.
    #[error("Duplicate security server name: {0}")]
    DuplicateServerName(String),

    /// A server entry has no name.
    #[error("Security server entry #{0} has no name")]
    MissingServerName(usize),
}

/// Full toolkit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Connection settings shared by all servers.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Outgoing call thresholds per host.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Auto-configuration settings.
    #[serde(default)]
    pub auto: AutoSettings,
    /// Servers to configure.
    #[serde(default)]
    pub security_server: Vec<SecurityServerConfig>,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `sstk_cli=debug`.
    pub level: Option<String>,
}

/// Connection settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Reachability check timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Verify server TLS certificates.
    pub verify_tls: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: ss_admin::client::DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: 5,
            verify_tls: false,
        }
    }
}

/// How the engine treats a step whose effect is not yet observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkMode {
    /// Stop the server's walk; the next invocation retries.
    #[default]
    SingleShot,
    /// Re-probe with bounded backoff before stopping.
    Poll,
}

/// Auto-configuration settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSettings {
    /// Walk mode.
    pub mode: WalkMode,
    /// Poll settings, used in [`WalkMode::Poll`].
    pub poll: PollConfig,
}

/// Desired state of one security server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityServerConfig {
    /// Unique name, also used in key labels.
    pub name: String,
    /// Admin API base URL, e.g. `https://ss1:4000/api/v1`.
    pub url: Option<String>,
    /// API key (may be `${ENV_VAR}`).
    #[serde(deserialize_with = "scalar_string")]
    pub api_key: Option<String>,
    /// Path to the configuration anchor file.
    pub configuration_anchor: Option<PathBuf>,
    /// Owner organization country code for CSR subjects.
    #[serde(deserialize_with = "scalar_string")]
    pub owner_dn_country: Option<String>,
    /// Owner organization name for CSR subjects.
    #[serde(deserialize_with = "scalar_string")]
    pub owner_dn_org: Option<String>,
    /// Owner member class.
    #[serde(deserialize_with = "scalar_string")]
    pub owner_member_class: Option<String>,
    /// Owner member code.
    #[serde(deserialize_with = "scalar_string")]
    pub owner_member_code: Option<String>,
    /// Security server code.
    #[serde(deserialize_with = "scalar_string")]
    pub security_server_code: Option<String>,
    /// Software token identifier.
    pub software_token_id: u32,
    /// Software token PIN.
    #[serde(deserialize_with = "scalar_string")]
    pub software_token_pin: Option<String>,
    /// Public address used when registering the auth certificate.
    #[serde(deserialize_with = "scalar_string")]
    pub fqdn: Option<String>,
    /// Signed certificate files to import.
    pub certificates: Option<Vec<PathBuf>>,
    /// Timestamping service names; the first approved one when unset.
    pub timestamping_services: Option<Vec<String>>,
    /// Clients (members or subsystems) to add.
    pub clients: Option<Vec<ClientConfig>>,
}

/// Client to add to a security server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(deserialize_with = "scalar_string")]
    pub member_class: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub member_code: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub subsystem_code: Option<String>,
    /// `HTTP`, `HTTPS` or `HTTPS_NO_AUTH`.
    pub connection_type: Option<String>,
    pub service_descriptions: Option<Vec<ServiceDescriptionConfig>>,
}

/// Service description of a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDescriptionConfig {
    pub url: Option<String>,
    /// `WSDL`, `REST` or `OPENAPI3`.
    #[serde(rename = "type")]
    pub description_type: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub rest_service_code: Option<String>,
    /// Subjects granted access to every service of the description.
    pub access: Option<Vec<String>>,
    pub services: Option<Vec<ServiceConfig>>,
    pub endpoints: Option<Vec<EndpointConfig>>,
}

/// Per-service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    #[serde(deserialize_with = "scalar_string")]
    pub service_code: Option<String>,
    pub access: Option<Vec<String>>,
}

/// REST endpoint of a service description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub path: Option<String>,
    pub method: Option<String>,
    pub access: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or is structurally invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML or server names are missing or duplicated.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        config.resolve_env();
        config.check_names()?;
        Ok(config)
    }

    fn resolve_env(&mut self) {
        for server in &mut self.security_server {
            server.api_key = server.api_key.take().map(|key| resolve_env_ref(&key));
        }
    }

    fn check_names(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (i, server) in self.security_server.iter().enumerate() {
            if server.name.trim().is_empty() {
                return Err(ConfigError::MissingServerName(i));
            }
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::DuplicateServerName(server.name.clone()));
            }
        }
        Ok(())
    }

    /// A copy of this configuration restricted to one server.
    ///
    /// Each server is processed against its own view so nothing from one
    /// server's pass can be observed by another's.
    #[must_use]
    pub fn single_server_view(&self, name: &str) -> Option<Self> {
        let server = self.security_server.iter().find(|s| s.name == name)?;
        Some(Self {
            logging: self.logging.clone(),
            connection: self.connection,
            rate_limit: self.rate_limit,
            auto: self.auto,
            security_server: vec![server.clone()],
        })
    }

    /// Server names in declaration order.
    #[must_use]
    pub fn server_names(&self) -> Vec<String> {
        self.security_server.iter().map(|s| s.name.clone()).collect()
    }
}

impl SecurityServerConfig {
    /// Non-blank API key.
    #[must_use]
    pub fn credential(&self) -> Option<&str> {
        non_blank(self.api_key.as_deref())
    }

    /// Non-blank admin API URL.
    #[must_use]
    pub fn api_url(&self) -> Option<&str> {
        non_blank(self.url.as_deref())
    }

    /// Label of the authentication key this toolkit generates.
    #[must_use]
    pub fn auth_key_label(&self) -> String {
        format!("{}-default-auth-key", self.name)
    }

    /// Label of the signing key this toolkit generates.
    #[must_use]
    pub fn sign_key_label(&self) -> String {
        format!("{}-default-sign-key", self.name)
    }

    /// Declared clients, empty when the section is absent.
    #[must_use]
    pub fn clients(&self) -> &[ClientConfig] {
        self.clients.as_deref().unwrap_or_default()
    }
}

impl ClientConfig {
    /// Declared service descriptions, empty when absent.
    #[must_use]
    pub fn service_descriptions(&self) -> &[ServiceDescriptionConfig] {
        self.service_descriptions.as_deref().unwrap_or_default()
    }
}

/// Trimmed value, `None` when blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolve `${NAME}` to the environment variable's value (blank when unset).
fn resolve_env_ref(value: &str) -> String {
    let trimmed = value.trim();
    match trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(var) => std::env::var(var).unwrap_or_default(),
        None => value.to_string(),
    }
}

/// Accept YAML strings, numbers and booleans as strings.
///
/// Member codes and PINs are often written unquoted (`owner_member_code: 1234`).
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
        Scalar::Str(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Bool(b) => b.to_string(),
    }))
}
