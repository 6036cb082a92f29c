//! Reference driver plugin: binds an OPC UA endpoint to the `Plugin` /
//! `DriverIo` ABI, used to exercise the driver-node lifecycle end to end.
//! Connection handling follows the teacher's original `OpcUaDriver`: the
//! client is constructed eagerly but the session is only activated lazily,
//! on the first `read_group` call, since `async-opcua`'s connect is async
//! and `Plugin::open` is not.

use std::sync::Arc;

use async_trait::async_trait;
use opcua::client::Client;
use opcua::types::{DataValue, NodeId, ReadValueId, Variant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::drivers::traits::DriverConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::plugin::{DriverIo, ModuleDescriptor, NodeKind, Plugin};
use crate::tags::group::TagDef;
use crate::value::TagValue;

pub struct OpcUaPlugin {
    config: DriverConfig,
    client: AsyncMutex<Option<Client>>,
}

impl OpcUaPlugin {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            client: AsyncMutex::new(None),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Parses `ns=<ns>;s=<string>` / `ns=<ns>;i=<numeric>` node IDs, the
    /// addressing scheme a `TagDef.address` carries for this driver.
    fn parse_node_id(address: &str) -> GatewayResult<NodeId> {
        let invalid = || GatewayError::TagInvalid(format!("invalid OPC UA node id: {address}"));
        let (ns_part, id_part) = address.split_once(';').ok_or_else(invalid)?;
        let ns = ns_part
            .strip_prefix("ns=")
            .ok_or_else(invalid)?
            .parse::<u16>()
            .map_err(|_| invalid())?;
        if let Some(s) = id_part.strip_prefix("s=") {
            Ok(NodeId::new_string(ns, s.to_string()))
        } else if let Some(i) = id_part.strip_prefix("i=") {
            Ok(NodeId::new_numeric(
                ns,
                i.parse::<u32>().map_err(|_| invalid())?,
            ))
        } else {
            Err(invalid())
        }
    }

    fn variant_to_tag_value(tag: &TagDef, value: Option<&Variant>, good: bool) -> TagValue {
        if !good {
            return TagValue::Error(-1);
        }
        let Some(variant) = value else {
            return TagValue::Error(-2);
        };
        let as_f64 = match variant {
            Variant::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Variant::SByte(v) => Some(*v as f64),
            Variant::Byte(v) => Some(*v as f64),
            Variant::Int16(v) => Some(*v as f64),
            Variant::UInt16(v) => Some(*v as f64),
            Variant::Int32(v) => Some(*v as f64),
            Variant::UInt32(v) => Some(*v as f64),
            Variant::Int64(v) => Some(*v as f64),
            Variant::UInt64(v) => Some(*v as f64),
            Variant::Float(v) => Some(*v as f64),
            Variant::Double(v) => Some(*v),
            _ => None,
        };

        use crate::value::TypeTag;
        match (tag.type_tag, variant, as_f64) {
            (TypeTag::String, Variant::String(s), _) => TagValue::String(s.to_string()),
            (_, _, Some(v)) => match tag.type_tag {
                TypeTag::Int8 => TagValue::Int8(v as i8),
                TypeTag::UInt8 => TagValue::UInt8(v as u8),
                TypeTag::Int16 => TagValue::Int16(v as i16),
                TypeTag::UInt16 | TypeTag::Word => TagValue::UInt16(v as u16),
                TypeTag::Int32 => TagValue::Int32(v as i32),
                TypeTag::UInt32 | TypeTag::DWord => TagValue::UInt32(v as u32),
                TypeTag::Int64 => TagValue::Int64(v as i64),
                TypeTag::UInt64 | TypeTag::LWord => TagValue::UInt64(v as u64),
                TypeTag::Bit => TagValue::Bit(if v != 0.0 { 1 } else { 0 }),
                TypeTag::Bool => TagValue::Bool(v != 0.0),
                TypeTag::Float => TagValue::Float {
                    value: v as f32,
                    precision: tag.precision,
                },
                TypeTag::Double => TagValue::Double {
                    value: v,
                    precision: tag.precision,
                },
                _ => TagValue::Error(-3),
            },
            _ => TagValue::Error(-3),
        }
    }
}

impl Plugin for OpcUaPlugin {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor {
            name: "opcua".to_string(),
            kind: NodeKind::Driver,
            single: false,
        }
    }

    fn tag_validator(&self, tag: &TagDef) -> GatewayResult<()> {
        Self::parse_node_id(&tag.address).map(|_| ())
    }

    fn open(&self) -> GatewayResult<()> {
        debug!(driver = self.config.id, "opc ua plugin ready, session activation deferred");
        Ok(())
    }

    fn as_driver_io(&self) -> Option<&dyn DriverIo> {
        Some(self)
    }
}

#[async_trait]
impl DriverIo for OpcUaPlugin {
    async fn read_group(
        &self,
        group: &str,
        tags: &[TagDef],
    ) -> GatewayResult<Vec<(String, TagValue)>> {
        let mut guard = self.client.lock().await;
        if guard.is_none() {
            let client = Client::new(&self.config.address, None, None).map_err(|e| {
                GatewayError::Internal(format!("opc ua client init failed: {e}"))
            })?;
            *guard = Some(client);
        }
        let client = guard.as_mut().expect("populated above");

        let mut read_requests = Vec::with_capacity(tags.len());
        for tag in tags {
            let node_id = Self::parse_node_id(&tag.address)?;
            read_requests.push(ReadValueId {
                node_id,
                attribute_id: 13,
                index_range: None,
                data_encoding: None,
            });
        }

        let results: Vec<DataValue> = match client.read(&read_requests, 0.0).await {
            Ok(results) => results,
            Err(e) => {
                warn!(group, error = %e, "opc ua read failed, reporting error per tag");
                return Ok(tags
                    .iter()
                    .map(|t| (t.name.clone(), TagValue::Error(-1)))
                    .collect());
            }
        };

        Ok(tags
            .iter()
            .zip(results.iter())
            .map(|(tag, dv)| {
                let good = dv.status_code().is_good();
                let value = Self::variant_to_tag_value(tag, dv.value(), good);
                (tag.name.clone(), value)
            })
            .collect())
    }
}

/// Registers one bundled OPC UA plugin instance under `builtin://{name}`, so
/// `Manager::add_plugin("builtin://{name}")` can bring it up without a real
/// shared object on disk. Callers bind one registration per configured
/// device (`name` is typically derived from the device id), since each
/// carries its own endpoint address.
pub fn register(name: &str, config: DriverConfig) {
    let config = Arc::new(config);
    crate::plugin::loader::register_builtin(
        name,
        ModuleDescriptor {
            name: name.to_string(),
            kind: NodeKind::Driver,
            single: false,
        },
        move || Ok(Box::new(OpcUaPlugin::new((*config).clone())) as Box<dyn Plugin>),
    );
}
