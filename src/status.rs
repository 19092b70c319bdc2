//! Role announcements over MQTT.
//!
//! Optional diagnostics for launchers: publishes this process's current role
//! for a stream as a retained message on `<prefix>/<name>/role`, with a last
//! will of `offline` so a crashed process does not stay listed as Owner.
//!
//! Not used by `SharedCamera` itself; the caller decides when to announce.

use anyhow::{anyhow, Context, Result};
use rumqttc::{Client, Connection, Event, LastWill, MqttOptions, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::camera::Role;

pub const DEFAULT_TOPIC_PREFIX: &str = "shared_camera";
pub const PAYLOAD_OFFLINE: &str = "offline";

const KEEP_ALIVE: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 16;
const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Publishes role changes for one stream name.
pub struct RoleAnnouncer {
    client: Client,
    topic: String,
    announced: Option<Role>,
    shutdown: Arc<AtomicBool>,
    connection_handle: Option<JoinHandle<()>>,
}

impl RoleAnnouncer {
    /// Connect to `broker` (`host:port`) and prepare `<prefix>/<name>/role`.
    pub fn connect(broker: &str, prefix: &str, name: &str) -> Result<Self> {
        let (host, port) = parse_broker_addr(broker)?;
        let topic = role_topic(prefix, name);
        let client_id = format!("shared_cam_{}", hex::encode(rand::random::<[u8; 4]>()));

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_last_will(LastWill::new(
            topic.clone(),
            PAYLOAD_OFFLINE,
            QoS::AtLeastOnce,
            true,
        ));
        let (client, connection) = Client::new(options, REQUEST_CAPACITY);

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();
        let connection_handle = std::thread::Builder::new()
            .name("shared-camera-status".to_string())
            .spawn(move || drive_connection(connection, thread_shutdown))
            .context("spawn MQTT connection thread")?;

        log::info!("RoleAnnouncer: connecting to {}", broker);
        Ok(Self {
            client,
            topic,
            announced: None,
            shutdown,
            connection_handle: Some(connection_handle),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish `role` if it differs from the last announcement. Never blocks.
    pub fn announce(&mut self, role: Role) {
        if self.announced == Some(role) {
            return;
        }
        match self
            .client
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, true, role.to_string())
        {
            Ok(()) => self.announced = Some(role),
            Err(err) => log::debug!("RoleAnnouncer: announce {} failed: {}", role, err),
        }
    }

    /// Announce `offline`, disconnect, and join the connection thread.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Err(err) =
            self.client
                .try_publish(self.topic.as_str(), QoS::AtLeastOnce, true, PAYLOAD_OFFLINE)
        {
            log::debug!("RoleAnnouncer: offline announcement failed: {}", err);
        }
        self.client.disconnect()?;
        if let Some(handle) = self.connection_handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("MQTT connection thread panicked"))?;
        }
        Ok(())
    }
}

fn drive_connection(mut connection: Connection, shutdown: Arc<AtomicBool>) {
    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
            Err(e) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                log::warn!("RoleAnnouncer: MQTT connection error: {}", e);
                std::thread::sleep(RETRY_PAUSE);
            }
        }
    }
}

/// `<prefix>/<name>/role`, with surrounding slashes trimmed from the prefix.
pub fn role_topic(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/role", name)
    } else {
        format!("{}/{}/role", prefix, name)
    }
}

/// Split `host:port`; a bare host gets the standard MQTT port.
pub fn parse_broker_addr(addr: &str) -> Result<(String, u16)> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(anyhow!("MQTT broker address is empty"));
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| anyhow!("invalid MQTT broker port in '{}'", addr))?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(anyhow!("MQTT broker address '{}' has no host", addr)),
        None => Ok((addr.to_string(), 1883)),
    }
}
