// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration Types
//
// Defines the configuration schema for a Loom orchestrator node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Platform admin lookup
// - Registry reaping and approval timeouts
// - Resource allocator tiers for child swarms
// - Event bus, HTTP server and metrics exporter settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "loom/v1";
pub const KIND: &str = "OrchestratorConfig";

/// Top-level Kubernetes-style orchestrator configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "loom/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "OrchestratorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: NodeConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub approvals: ApprovalConfig,

    #[serde(default)]
    pub allocator: AllocatorConfig,

    #[serde(default)]
    pub event_bus: EventBusConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// User id granted admin privilege regardless of the caller's admin flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// How long a terminal run stays resolvable before it is deregistered
    #[serde(with = "humantime_serde", default = "default_run_reap_grace")]
    pub run_reap_grace: Duration,

    #[serde(with = "humantime_serde", default = "default_swarm_reap_grace")]
    pub swarm_reap_grace: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(with = "humantime_serde", default = "default_approval_timeout")]
    pub default_timeout: Duration,

    /// Tool names that must be confirmed by a human before dispatch
    #[serde(default)]
    pub require_approval_for: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default = "default_root_max_credits")]
    pub root_max_credits: u64,

    #[serde(with = "humantime_serde", default = "default_root_max_duration")]
    pub root_max_duration: Duration,

    /// Floor for a child allocation, still capped by the parent's remaining budget
    #[serde(default = "default_min_child_credits")]
    pub min_child_credits: u64,

    #[serde(default)]
    pub tiers: TierTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTable {
    #[serde(default = "TierConfig::basic")]
    pub basic: TierConfig,
    #[serde(default = "TierConfig::enhanced")]
    pub enhanced: TierConfig,
    #[serde(default = "TierConfig::rich")]
    pub rich: TierConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Fraction of the parent's remaining budget granted to a child
    pub share: f64,

    /// Absolute credit ceiling for the tier
    pub credit_ceiling: u64,

    #[serde(with = "humantime_serde")]
    pub duration_ceiling: Duration,

    pub model: String,

    pub parallelism: u32,
}

impl TierConfig {
    pub fn basic() -> Self {
        Self {
            share: 0.25,
            credit_ceiling: 2_500,
            duration_ceiling: Duration::from_secs(15 * 60),
            model: "gpt-4o-mini".to_string(),
            parallelism: 1,
        }
    }

    pub fn enhanced() -> Self {
        Self {
            share: 0.4,
            credit_ceiling: 10_000,
            duration_ceiling: Duration::from_secs(45 * 60),
            model: "gpt-4o".to_string(),
            parallelism: 3,
        }
    }

    pub fn rich() -> Self {
        Self {
            share: 0.5,
            credit_ceiling: 25_000,
            duration_ceiling: Duration::from_secs(2 * 60 * 60),
            model: "gpt-4.1".to_string(),
            parallelism: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_run_reap_grace() -> Duration {
    Duration::from_secs(30)
}

fn default_swarm_reap_grace() -> Duration {
    Duration::from_secs(60)
}

fn default_approval_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_root_max_credits() -> u64 {
    100_000
}

fn default_root_max_duration() -> Duration {
    Duration::from_secs(2 * 60 * 60)
}

fn default_min_child_credits() -> u64 {
    1
}

fn default_event_capacity() -> usize {
    1024
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            run_reap_grace: default_run_reap_grace(),
            swarm_reap_grace: default_swarm_reap_grace(),
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_approval_timeout(),
            require_approval_for: vec![],
        }
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            root_max_credits: default_root_max_credits(),
            root_max_duration: default_root_max_duration(),
            min_child_credits: default_min_child_credits(),
            tiers: TierTable::default(),
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            basic: TierConfig::basic(),
            enhanced: TierConfig::enhanced(),
            rich: TierConfig::rich(),
        }
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "loom-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. LOOM_CONFIG_PATH environment variable
    /// 2. ./loom-config.yaml (working directory)
    /// 3. ~/.loom/config.yaml (user home)
    /// 4. /etc/loom/config.yaml (system, Unix) or C:\ProgramData\Loom\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("LOOM_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./loom-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".loom").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/loom/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Loom\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LOOM_ADMIN_USER_ID") {
            if val.trim().is_empty() {
                tracing::warn!("Ignoring empty LOOM_ADMIN_USER_ID");
            } else {
                tracing::info!("Environment override: LOOM_ADMIN_USER_ID");
                self.spec.platform.admin_user_id = Some(val);
            }
        }

        if let Ok(val) = std::env::var("LOOM_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: LOOM_PORT={}", port);
                    self.spec.server.port = port;
                }
                Err(_) => tracing::warn!("Invalid value for LOOM_PORT: '{}'. Ignoring.", val),
            }
        }

        if let Ok(val) = std::env::var("LOOM_APPROVAL_TIMEOUT") {
            match humantime::parse_duration(&val) {
                Ok(timeout) => {
                    tracing::info!("Environment override: LOOM_APPROVAL_TIMEOUT={}", val);
                    self.spec.approvals.default_timeout = timeout;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for LOOM_APPROVAL_TIMEOUT: '{}'. Expected a duration like 90s. Ignoring.",
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let allocator = &self.spec.allocator;
        if allocator.root_max_credits == 0 {
            anyhow::bail!("spec.allocator.root_max_credits must be greater than zero");
        }

        for (name, tier) in [
            ("basic", &allocator.tiers.basic),
            ("enhanced", &allocator.tiers.enhanced),
            ("rich", &allocator.tiers.rich),
        ] {
            if !(tier.share > 0.0 && tier.share <= 1.0) {
                anyhow::bail!(
                    "spec.allocator.tiers.{}.share must be in (0, 1], got {}",
                    name,
                    tier.share
                );
            }
            if tier.parallelism == 0 {
                anyhow::bail!("spec.allocator.tiers.{}.parallelism cannot be zero", name);
            }
            if tier.model.trim().is_empty() {
                anyhow::bail!("spec.allocator.tiers.{}.model cannot be empty", name);
            }
        }

        if self.spec.event_bus.capacity == 0 {
            anyhow::bail!("spec.event_bus.capacity must be greater than zero");
        }

        Ok(())
    }
}
