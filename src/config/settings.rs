//! `GatewaySettings`: TOML-backed startup configuration, layered under
//! environment-variable overrides via the `config` crate. Generalizes the
//! teacher's `Settings { devices, tags }` to also seed the `Manager`'s
//! registries, since a real gateway does not start from an empty control
//! plane every run.

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::drivers::traits::DriverConfig;
use crate::value::TypeTag;

#[derive(Debug, Clone, Deserialize)]
pub struct TagConfig {
    pub path: String,
    pub driver_id: String,
    pub address: String,
    #[serde(default)]
    pub type_tag: Option<TypeTag>,
    #[serde(default)]
    pub precision: u8,
    #[serde(default = "default_poll_rate_ms")]
    pub poll_rate_ms: u64,
}

fn default_poll_rate_ms() -> u64 {
    1000
}

/// One node to bring up automatically after the manager starts.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeBootstrap {
    pub name: String,
    pub plugin: String,
    #[serde(default)]
    pub start: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateGroupBootstrap {
    pub name: String,
    pub interval: u32,
    #[serde(default)]
    pub tags: Vec<TagConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateBootstrap {
    pub name: String,
    pub plugin: String,
    #[serde(default)]
    pub groups: Vec<TemplateGroupBootstrap>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionBootstrap {
    pub app: String,
    pub driver: String,
    pub group: String,
    #[serde(default)]
    pub params: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    3000
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub devices: Vec<DriverConfig>,
    #[serde(default)]
    pub tags: Vec<TagConfig>,
    #[serde(default)]
    pub bootstrap_nodes: Vec<NodeBootstrap>,
    #[serde(default)]
    pub bootstrap_templates: Vec<TemplateBootstrap>,
    #[serde(default)]
    pub bootstrap_subscriptions: Vec<SubscriptionBootstrap>,
    #[serde(default)]
    pub http: HttpSettings,
}

impl GatewaySettings {
    /// Loads `path`, then layers `GATEWAY__*` environment variables on top
    /// (e.g. `GATEWAY__HTTP__PORT=8080`) — the same override mechanism the
    /// teacher's own `Settings::load` left commented out as a TODO.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("GATEWAY").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}
