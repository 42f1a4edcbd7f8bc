//! Broker connection management.
//!
//! [`BrokerConnection`] owns the MQTT event loop. It re-subscribes after
//! every connect (sessions are clean), forwards matching inbound publishes as
//! [`BrokerEvent`]s and keeps the shared [`Publisher`] informed about
//! connectivity.
//!
//! # Example Configuration
//!
//! ```toml
//! [broker]
//! url = "mqtts://broker.example.com:8883"
//! username = "backend"
//! password = "secret"
//! reconnect_delay = 5
//! ```
//!
//! # Reconnection
//!
//! After a connection error the loop waits `reconnect_delay` and polls
//! again, which makes the client reconnect. There is no cap on attempts and
//! no jitter.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::publisher::Publisher;
use crate::topic::topic_matches;

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 100;

/// How long to wait for the disconnect packet to go out on shutdown.
pub(crate) const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Smallest keep-alive the client accepts.
const MIN_KEEP_ALIVE: u64 = 5;

/// Errors creating a broker connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid broker URL: {0}")]
    InvalidUrl(String),
    #[error("failed to build TLS connector: {0}")]
    Tls(#[from] native_tls::Error),
}

/// Events emitted by the connection loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Connection (re)established and subscriptions issued.
    Connected,
    /// An inbound message on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
    /// The connection dropped. A reconnect is scheduled.
    Disconnected { reason: String },
}

/// A configured, not yet running, broker connection.
pub struct BrokerConnection {
    client: AsyncClient,
    eventloop: EventLoop,
    subscriptions: Vec<String>,
    reconnect_delay: Duration,
    publisher: Arc<Publisher>,
    url: String,
}

impl BrokerConnection {
    /// Configure a connection and attach its client to `publisher`.
    ///
    /// No network traffic happens until [`run`](Self::run) polls the loop.
    pub async fn connect(
        config: &BrokerConfig,
        publisher: Arc<Publisher>,
    ) -> Result<Self, ConnectError> {
        let (host, port, use_tls) =
            parse_broker_url(&config.url).map_err(ConnectError::InvalidUrl)?;

        let client_id = format!("{}_{}", config.client_id_prefix, Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive.max(MIN_KEEP_ALIVE)));
        options.set_clean_session(true);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        if use_tls {
            if config.accept_invalid_certs {
                warn!("TLS certificate validation is disabled for {}", config.url);
                let connector = native_tls::TlsConnector::builder()
                    .danger_accept_invalid_certs(true)
                    .build()?;
                options.set_transport(rumqttc::Transport::tls_with_config(
                    TlsConfiguration::NativeConnector(connector),
                ));
            } else {
                options.set_transport(rumqttc::Transport::tls_with_config(
                    TlsConfiguration::Native,
                ));
            }
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        publisher.attach(Arc::new(client.clone())).await;
        publisher.set_connected(false);

        Ok(Self {
            client,
            eventloop,
            subscriptions: config.subscriptions.clone(),
            reconnect_delay: config.reconnect_delay(),
            publisher,
            url: config.url.clone(),
        })
    }

    /// Issue every configured subscription without waiting on the queue.
    fn subscribe(&self) {
        for filter in &self.subscriptions {
            match self.client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                Ok(()) => debug!("Subscribing to {}", filter),
                Err(e) => error!("Failed to subscribe to {}: {}", filter, e),
            }
        }
    }

    fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|f| topic_matches(f, topic))
    }

    /// Drive the connection until `stop_rx` flips to true or `events` closes.
    pub async fn run(
        mut self,
        events: mpsc::Sender<BrokerEvent>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        info!("Connecting to broker at {}", self.url);

        loop {
            let event = tokio::select! {
                result = self.eventloop.poll() => result,
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        info!("Broker connection received stop signal");
                        break;
                    }
                    continue;
                }
            };

            let forwarded = match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to broker: {:?}", ack.code);
                    self.publisher.set_connected(true);
                    self.subscribe();
                    Some(BrokerEvent::Connected)
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let topic = publish.topic.to_string();
                    if self.is_subscribed(&topic) {
                        Some(BrokerEvent::Message {
                            topic,
                            payload: publish.payload.to_vec(),
                        })
                    } else {
                        debug!("Ignoring message on unsubscribed topic {}", topic);
                        None
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!("Subscription acknowledged: {:?}", ack.return_codes);
                    None
                }
                Ok(Event::Incoming(Packet::PingResp)) => {
                    debug!("Broker ping response received");
                    None
                }
                Ok(_) => None,
                Err(e) => {
                    self.publisher.set_connected(false);
                    warn!(
                        "Broker connection error: {}. Reconnecting in {:?}",
                        e, self.reconnect_delay
                    );
                    let reason = e.to_string();
                    if events
                        .send(BrokerEvent::Disconnected { reason })
                        .await
                        .is_err()
                    {
                        break;
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        changed = stop_rx.changed() => {
                            if changed.is_err() || *stop_rx.borrow() {
                                info!("Broker connection received stop signal");
                                break;
                            }
                        }
                    }
                    None
                }
            };

            if let Some(event) = forwarded
                && events.send(event).await.is_err()
            {
                info!("Event receiver closed, stopping broker connection");
                break;
            }
        }

        self.shutdown().await;
    }

    /// Best-effort disconnect.
    async fn shutdown(mut self) {
        self.publisher.set_connected(false);

        if let Err(e) = self.client.try_disconnect() {
            debug!("Error requesting broker disconnect: {}", e);
            return;
        }
        // One poll sends the queued disconnect packet
        match tokio::time::timeout(DISCONNECT_TIMEOUT, self.eventloop.poll()).await {
            Ok(Ok(_)) | Ok(Err(_)) => {}
            Err(_) => debug!("Timed out sending broker disconnect"),
        }

        info!("Broker connection stopped");
    }
}

/// Parse a broker URL into (host, port, use_tls).
///
/// ```
/// use smarthome_bridge::broker::parse_broker_url;
///
/// assert_eq!(
///     parse_broker_url("mqtts://broker.example.com").unwrap(),
///     ("broker.example.com".to_string(), 8883, true)
/// );
/// ```
pub fn parse_broker_url(url: &str) -> Result<(String, u16, bool), String> {
    let (use_tls, rest) = if let Some(stripped) = url.strip_prefix("mqtt://") {
        (false, stripped)
    } else if let Some(stripped) = url.strip_prefix("mqtts://") {
        (true, stripped)
    } else {
        return Err("Invalid scheme: URL must start with mqtt:// or mqtts://".to_string());
    };

    let default_port = if use_tls { 8883 } else { 1883 };
    let rest = rest.trim_end_matches('/');

    let (host, port) = if let Some((h, p)) = rest.rsplit_once(':') {
        let port = p
            .parse::<u16>()
            .map_err(|_| format!("Invalid port: {}", p))?;
        (h.to_string(), port)
    } else {
        (rest.to_string(), default_port)
    };

    if host.is_empty() {
        return Err("Host cannot be empty".to_string());
    }

    Ok((host, port, use_tls))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url_mqtt() {
        let (host, port, tls) = parse_broker_url("mqtt://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
        assert!(!tls);
    }

    #[test]
    fn test_parse_broker_url_default_ports() {
        assert_eq!(parse_broker_url("mqtt://localhost").unwrap().1, 1883);
        let (host, port, tls) = parse_broker_url("mqtts://abc.s1.eu.hivemq.cloud/").unwrap();
        assert_eq!(host, "abc.s1.eu.hivemq.cloud");
        assert_eq!(port, 8883);
        assert!(tls);
    }

    #[test]
    fn test_parse_broker_url_invalid() {
        assert!(parse_broker_url("http://localhost:1883").is_err());
        assert!(parse_broker_url("localhost:1883").is_err());
        assert!(parse_broker_url("mqtt://:1883").is_err());
        assert!(parse_broker_url("mqtt://localhost:port").is_err());
    }

    #[tokio::test]
    async fn test_connect_attaches_publisher_disconnected() {
        let publisher = Arc::new(Publisher::new());
        let connection = BrokerConnection::connect(&BrokerConfig::default(), publisher.clone())
            .await
            .unwrap();

        assert!(!publisher.is_connected());
        assert!(connection.is_subscribed("devices/esp32_main/data"));
        assert!(connection.is_subscribed("devices/esp32_main/status/door"));
        assert!(!connection.is_subscribed("devices/esp32_main/rfid/response"));
    }

    #[tokio::test]
    async fn test_connect_configures_tls_transports() {
        for accept_invalid_certs in [false, true] {
            let config = BrokerConfig {
                url: "mqtts://broker.example.com".to_string(),
                accept_invalid_certs,
                ..Default::default()
            };
            let publisher = Arc::new(Publisher::new());
            let connection = BrokerConnection::connect(&config, publisher.clone()).await;
            assert!(connection.is_ok());
            assert!(!publisher.is_connected());
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let config = BrokerConfig {
            url: "tcp://localhost".to_string(),
            ..Default::default()
        };
        let result = BrokerConnection::connect(&config, Arc::new(Publisher::new())).await;
        assert!(matches!(result, Err(ConnectError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        // Nothing listens on this port, so the loop sits in its reconnect delay
        let config = BrokerConfig {
            url: "mqtt://127.0.0.1:1".to_string(),
            reconnect_delay: 60,
            ..Default::default()
        };
        let connection = BrokerConnection::connect(&config, Arc::new(Publisher::new()))
            .await
            .unwrap();

        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(connection.run(events_tx, stop_rx));

        let first = events_rx.recv().await.unwrap();
        assert!(matches!(first, BrokerEvent::Disconnected { .. }));

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
