//! Publishes each new snapshot on the MQTT bus (optional).

use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::snapshot::Snapshot;
use rumqttc::{AsyncClient, ClientError, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task;
use tracing::{debug, error, info, warn};

pub const SNAPSHOT_TOPIC: &str = "hearth/clock/snapshot@v1";

#[derive(Debug, Serialize)]
pub struct SnapshotSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub taken_at: OffsetDateTime,
    pub people: Vec<PersonSummary>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct PersonSummary {
    pub name: String,
    pub category: String,
}

impl SnapshotSummary {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut people: Vec<PersonSummary> = snapshot
            .people
            .iter()
            .map(|p| PersonSummary {
                name: p.subject.name.clone(),
                category: p.category.to_string(),
            })
            .collect();
        people.sort();
        Self {
            taken_at: snapshot.taken_at,
            people,
            errors: snapshot.error_lines(),
        }
    }
}

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Publishes every snapshot seen on `snapshots` until the sender goes away.
pub fn spawn_snapshot_publisher(
    conf: MqttConf,
    snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
    health: HealthTracker,
) {
    task::spawn(run_publisher(conf, snapshots, health, RECONNECT_DELAY));
}

async fn run_publisher(
    conf: MqttConf,
    mut snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
    health: HealthTracker,
    reconnect_delay: Duration,
) {
    let mut opts = MqttOptions::new("hearth-kernel", &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(15));
    let (client, mut eventloop) = AsyncClient::new(opts, 10);
    info!("publishing snapshots to mqtt://{}:{}/{}", conf.host, conf.port, SNAPSHOT_TOPIC);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    debug!("snapshot store closed, stopping MQTT publisher");
                    break;
                }
                let latest = snapshots.borrow_and_update().clone();
                let Some(snapshot) = latest else { continue };

                match serde_json::to_string(&SnapshotSummary::from_snapshot(&snapshot)) {
                    // never await here: the eventloop is only polled by this loop
                    Ok(payload) => match client.try_publish(SNAPSHOT_TOPIC, QoS::AtLeastOnce, false, payload) {
                        Ok(()) => {}
                        Err(ClientError::TryRequest(_)) => {
                            warn!("MQTT request queue full, dropping snapshot of {}", snapshot.taken_at);
                        }
                        Err(e) => warn!("failed to publish snapshot: {:?}", e),
                    },
                    Err(e) => error!("failed to serialize snapshot summary: {}", e),
                }
            },
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => health.mark_mqtt_connected(),
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT error: {:?}", e);
                        health.increment_reconnects();
                        tokio::time::sleep(reconnect_delay).await;
                    }
                }
            }
        }
    }
}
