//! Bootstraps a `Manager` from `config.toml`, brings up the bundled OPC UA
//! driver for every configured device, replays the bootstrap nodes/
//! templates/subscriptions, spawns one polling worker per driver node, and
//! serves the control-plane HTTP API over the same `Manager` handle.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use gateway_server::api::{create_api_routes, SharedAppState};
use gateway_server::config::settings::{GatewaySettings, TagConfig};
use gateway_server::drivers;
use gateway_server::logging;
use gateway_server::manager::{Manager, TemplateGroupSpec};
use gateway_server::plugin::NodeKind;
use gateway_server::tags::group::TagDef;
use gateway_server::transport::{InMemoryTransport, Transport};
use gateway_server::worker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(None);
    info!("gateway server starting");

    let config_path = Path::new("config.toml");
    let settings = match GatewaySettings::load(config_path) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, path = %config_path.display(), "failed to load configuration");
            std::process::exit(1);
        }
    };
    info!(
        devices = settings.devices.len(),
        tags = settings.tags.len(),
        "configuration loaded"
    );

    let transport: Arc<dyn Transport> = Arc::new(InMemoryTransport::new());
    let manager = Arc::new(Manager::new(transport));

    register_devices(&manager, &settings.devices);
    bootstrap_nodes(&manager, &settings);
    bootstrap_driver_tags(&manager, &settings.tags);
    bootstrap_templates(&manager, &settings);
    bootstrap_subscriptions(&manager, &settings);

    let mut workers = Vec::new();
    for node in manager.get_nodes(Some(NodeKind::Driver), None, None) {
        info!(driver = node.name, "spawning poll worker");
        workers.push(worker::spawn(Arc::clone(&manager), node.name));
    }

    let state = SharedAppState { manager: Arc::clone(&manager) };
    let app = create_api_routes().with_state(state);

    let addr: SocketAddr = format!("{}:{}", settings.http.host, settings.http.port)
        .parse()
        .map_err(|e| format!("invalid http.host/http.port in configuration: {e}"))?;
    info!(%addr, "control-plane API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    // Unreachable under normal operation (`axum::serve` runs until the
    // process is killed); keeps every worker's `JoinHandle` alive for the
    // life of the binary instead of being dropped (and detached) early.
    drop(workers);
    Ok(())
}

fn register_devices(manager: &Manager, devices: &[gateway_server::drivers::traits::DriverConfig]) {
    for device in devices {
        let plugin_name = format!("opcua-{}", device.id);
        drivers::opcua::register(&plugin_name, device.clone());
        match manager.add_plugin(&format!("builtin://{plugin_name}")) {
            Ok(_) => info!(device = device.id, plugin = plugin_name, "driver plugin registered"),
            Err(e) => error!(device = device.id, error = %e, "failed to register driver plugin"),
        }
    }
}

fn bootstrap_nodes(manager: &Manager, settings: &GatewaySettings) {
    for node in &settings.bootstrap_nodes {
        match manager.add_node(&node.name, &node.plugin, node.start) {
            Ok(()) => info!(node = node.name, plugin = node.plugin, "bootstrap node added"),
            Err(e) => error!(node = node.name, error = %e, "failed to add bootstrap node"),
        }
    }
}

fn tag_config_to_def(tag: &TagConfig) -> Option<TagDef> {
    let Some(type_tag) = tag.type_tag else {
        warn!(tag = tag.path, "skipping tag with no type_tag configured");
        return None;
    };
    Some(TagDef {
        name: tag.path.clone(),
        type_tag,
        precision: tag.precision,
        address: tag.address.clone(),
        readable: true,
        writable: false,
        description: None,
    })
}

/// Groups the flat `tags` settings list by `(driver_id, poll_rate_ms)` and
/// materializes one group per combination on the already-running driver
/// node, the same grouping the teacher's original polling loop derived by
/// hand from individual tag records.
fn bootstrap_driver_tags(manager: &Manager, tags: &[TagConfig]) {
    let mut by_group: HashMap<(String, u64), Vec<&TagConfig>> = HashMap::new();
    for tag in tags {
        by_group
            .entry((tag.driver_id.clone(), tag.poll_rate_ms))
            .or_default()
            .push(tag);
    }

    for ((driver_id, poll_rate_ms), tag_configs) in by_group {
        if !manager.nodes().is_driver(&driver_id) {
            warn!(driver = driver_id, "skipping tags for unknown or non-driver node");
            continue;
        }
        let group_name = format!("poll-{poll_rate_ms}ms");
        let interval = poll_rate_ms.max(1) as u32;
        let result = manager.nodes().with_adapter_mut(&driver_id, |adapter| {
            let Some(driver) = adapter.driver_mut() else {
                return Err(gateway_server::GatewayError::GroupNotAllow(driver_id.clone()));
            };
            if !driver.group_exists(&group_name) {
                driver.add_group(&group_name, interval)?;
            }
            for tag in &tag_configs {
                if let Some(def) = tag_config_to_def(tag) {
                    if let Err(e) = driver.add_tag(&group_name, def) {
                        warn!(tag = tag.path, error = %e, "failed to add bootstrap tag");
                    }
                }
            }
            Ok(())
        });
        match result {
            Some(Ok(())) => info!(driver = driver_id, group = group_name, "bootstrap tags added"),
            Some(Err(e)) => error!(driver = driver_id, error = %e, "failed to create bootstrap group"),
            None => warn!(driver = driver_id, "driver node disappeared during tag bootstrap"),
        }
    }
}

fn bootstrap_templates(manager: &Manager, settings: &GatewaySettings) {
    for tmpl in &settings.bootstrap_templates {
        let groups: Vec<TemplateGroupSpec> = tmpl
            .groups
            .iter()
            .map(|g| TemplateGroupSpec {
                name: g.name.clone(),
                interval: g.interval,
                tags: g.tags.iter().filter_map(tag_config_to_def).collect(),
            })
            .collect();
        match manager.add_template(&tmpl.name, &tmpl.plugin, groups) {
            Ok(()) => info!(template = tmpl.name, "bootstrap template added"),
            Err(e) => error!(template = tmpl.name, error = %e, "failed to add bootstrap template"),
        }
    }
}

fn bootstrap_subscriptions(manager: &Manager, settings: &GatewaySettings) {
    for sub in &settings.bootstrap_subscriptions {
        match manager.subscribe(&sub.app, &sub.driver, &sub.group, sub.params.clone()) {
            Ok(()) => {
                info!(app = sub.app, driver = sub.driver, group = sub.group, "bootstrap subscription added");
                if let Err(e) = manager.send_subscribe(&sub.app, &sub.driver, &sub.group, sub.params.clone()) {
                    warn!(app = sub.app, error = %e, "send_subscribe failed for bootstrap subscription");
                }
            }
            Err(e) => error!(app = sub.app, error = %e, "failed to add bootstrap subscription"),
        }
    }
}
