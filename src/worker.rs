//! Per-driver polling worker: the "living producer" that exercises the
//! `TagCache` and `SubscriptionRegistry` against a bound `DriverIo` plugin.
//!
//! Grounded in the teacher's own `main.rs` polling loop, generalized from a
//! single hardcoded device to one task per driver `Adapter`. Scheduling
//! fidelity is explicitly out of scope: this is a tick-loop approximation,
//! not a microsecond-accurate group scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, warn};

use crate::manager::Manager;
use crate::tags::group::TagDef;
use crate::value::TagValue;

/// Base scheduling granularity, matching `GROUP_INTERVAL_LIMIT`: no group
/// can be due more often than this, so ticking faster buys nothing.
const BASE_TICK_MS: u64 = 100;

/// A running worker's cooperative shutdown handle.
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signals the worker to stop and waits for its current tick to finish.
    pub async fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.task.await;
    }
}

/// Spawns the polling task for one driver `Adapter`. The task only ever
/// touches the driver through `Manager`'s public surface, the same boundary
/// the HTTP API uses, so it holds no registry lock across an `await`.
pub fn spawn(manager: Arc<Manager>, driver: String) -> WorkerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let task_stop = Arc::clone(&stop);
    let task = tokio::spawn(async move {
        run(manager, driver, task_stop).await;
    });
    WorkerHandle { stop, task }
}

async fn run(manager: Arc<Manager>, driver: String, stop: Arc<AtomicBool>) {
    let mut last_poll: HashMap<String, Instant> = HashMap::new();
    let mut ticker = time::interval(Duration::from_millis(BASE_TICK_MS));

    while !stop.load(Ordering::Relaxed) {
        ticker.tick().await;

        let Some(plugin) = manager.nodes().with_adapter(&driver, |a| a.plugin_arc()) else {
            debug!(driver, "worker stopping: node no longer exists");
            break;
        };
        let Some(driver_io) = plugin.as_driver_io() else {
            warn!(driver, "worker stopping: bound plugin exposes no driver I/O");
            break;
        };

        let now = Instant::now();
        let due: Vec<(String, Vec<TagDef>)> = manager
            .nodes()
            .with_adapter(&driver, |a| {
                a.driver()
                    .map(|state| {
                        state
                            .groups()
                            .iter()
                            .filter(|(name, group)| {
                                last_poll
                                    .get(name)
                                    .map(|at| {
                                        now.duration_since(*at).as_millis()
                                            >= group.get_interval() as u128
                                    })
                                    .unwrap_or(true)
                            })
                            .map(|(name, group)| (name.clone(), group.get_tags()))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default();

        for (group, tags) in due {
            if tags.is_empty() {
                last_poll.insert(group, now);
                continue;
            }

            let values = match driver_io.read_group(&group, &tags).await {
                Ok(values) => values,
                Err(e) => {
                    error!(driver, group, error = %e, "group read failed, latching error on every tag");
                    tags.iter()
                        .map(|t| (t.name.clone(), TagValue::Error(-1)))
                        .collect()
                }
            };

            let timestamp = epoch_millis();
            manager.nodes().with_adapter_mut(&driver, |a| {
                let Some(state) = a.driver_mut() else {
                    return;
                };
                for (tag_name, value) in &values {
                    if state.cache.get(&group, tag_name).is_some() {
                        state.cache.update(&group, tag_name, timestamp, value.clone());
                    } else {
                        state.cache.add(&group, tag_name, value.clone());
                    }
                }
            });

            manager.report_group(&driver, &group, &tags);
            last_poll.insert(group, now);
        }
    }
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
