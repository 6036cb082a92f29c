//! Connection configuration shared by the bundled driver plugins. The
//! plugin ABI itself (`Plugin`, `DriverIo`) lives in `crate::plugin`; this
//! module only holds the config DTO a driver plugin's constructor takes.

use serde::{Deserialize, Serialize};

/// Connection parameters for one device instance, deserialized straight out
/// of `GatewaySettings.devices`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub application_uri: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub max_message_size: Option<usize>,
    #[serde(default)]
    pub max_chunk_count: Option<usize>,
    #[serde(default)]
    pub connect_retry_attempts: Option<u32>,
    #[serde(default)]
    pub connect_retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub connect_retry_backoff: Option<f64>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}
