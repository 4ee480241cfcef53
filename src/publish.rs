//! Event publishing over MQTT.
//!
//! Occupancy and entry totals go to the `person` topic, presence-interval
//! durations to `person/duration`, with an availability topic maintained via
//! a retained Last Will message.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use rumqttc::Transport;
use serde::Serialize;
use std::time::Duration;

use crate::track::TrackEvent;

pub const TOPIC_PERSON: &str = "person";
pub const TOPIC_DURATION: &str = "person/duration";
pub const TOPIC_STATUS: &str = "person/status";
const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";

/// Transport seam between the stream driver and the broker. Tests inject a
/// recording implementation.
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()>;
}

#[derive(Serialize)]
struct CountPayload {
    count: u32,
}

#[derive(Serialize)]
struct TotalPayload {
    total: u64,
}

#[derive(Serialize)]
struct DurationPayload {
    /// Presence-interval length in whole seconds.
    duration: u64,
}

/// Publish one tracker event to its topic.
pub fn publish_event(publisher: &mut dyn Publisher, event: &TrackEvent) -> Result<()> {
    match event {
        TrackEvent::OccupancyChanged { count } => publisher.publish(
            TOPIC_PERSON,
            &serde_json::to_vec(&CountPayload { count: *count })?,
        ),
        TrackEvent::PersonEntered { total } => publisher.publish(
            TOPIC_PERSON,
            &serde_json::to_vec(&TotalPayload { total: *total })?,
        ),
        TrackEvent::PersonExited { duration } => publisher.publish(
            TOPIC_DURATION,
            &serde_json::to_vec(&DurationPayload {
                duration: duration.as_secs(),
            })?,
        ),
    }
}

// ----------------------------------------------------------------------------
// MQTT publisher (rumqttc)
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct MqttEndpoint {
    host: String,
    port: u16,
    use_tls: bool,
}

/// MQTT publisher with a dedicated connection-driving thread.
///
/// The broker marks this client `offline` on the status topic via Last Will
/// if the process dies; a clean [`MqttPublisher::disconnect`] joins the
/// connection thread after teardown.
pub struct MqttPublisher {
    client: Client,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttPublisher {
    /// Connect to `addr` (`host:port`, optionally prefixed with `mqtt://`,
    /// `tcp://`, `mqtts://` or `ssl://`) and announce availability.
    pub fn connect(
        addr: &str,
        client_id: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(addr)?;

        let mut options = MqttOptions::new(client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = username {
            options.set_credentials(user, password.unwrap_or_default());
        }
        let will = rumqttc::v5::mqttbytes::v5::LastWill::new(
            TOPIC_STATUS,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        );
        options.set_last_will(will);
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        } else {
            options.set_transport(Transport::tcp());
        }

        let (client, connection) = Client::new(options, 10);
        log::info!(
            "connected to MQTT broker {}:{} (TLS: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls
        );

        let mut publisher = Self {
            client,
            connection_handle: Some(spawn_connection_thread(connection)),
        };
        publisher.publish_retained(TOPIC_STATUS, PAYLOAD_ONLINE.as_bytes())?;
        Ok(publisher)
    }

    fn publish_retained(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, true, payload.to_vec())?;
        Ok(())
    }

    /// Announce `offline`, disconnect and join the connection thread.
    pub fn disconnect(mut self) -> Result<()> {
        self.publish_retained(TOPIC_STATUS, PAYLOAD_OFFLINE.as_bytes())?;
        self.client.disconnect()?;
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())?;
        Ok(())
    }
}

fn spawn_connection_thread(mut connection: Connection) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("MQTT connection error: {}", e);
                    break;
                }
            }
        }
    })
}

fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}
