//! MQTT transport backed by rumqttc.
//!
//! Each [`MqttTransport`] owns one broker connection whose event loop runs
//! on its own tokio task. Publishing only enqueues into the client's request
//! channel, so the tick loop never waits on the socket. The task is the only
//! owner of the TCP stream: aborting it drops the socket without sending
//! DISCONNECT, which is how [`Transport::force_disconnect`] triggers the
//! broker's Last-Will.

use async_trait::async_trait;
use hydro_env::{Message, Transport, TransportError, TransportFactory};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, LastWill, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long a clean disconnect may take to flush before the task is aborted.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Broker endpoint and credentials shared by every connection of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    /// Client id of the main telemetry connection
    pub client_id: String,

    pub keep_alive: Duration,

    /// Publishes that may be queued before `publish` starts failing
    pub request_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: "user1".to_string(),
            password: "user1".to_string(),
            client_id: "hydro-simulator".to_string(),
            keep_alive: Duration::from_secs(60),
            request_capacity: 4096,
        }
    }
}

impl BrokerConfig {
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// rumqttc options for one connection.
    pub fn options(&self, client_id: &str, will: Option<&Message>) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if !self.username.is_empty() {
            options.set_credentials(self.username.clone(), self.password.clone());
        }
        if let Some(will) = will {
            options.set_last_will(LastWill::new(
                will.topic.clone(),
                will.payload.clone(),
                QoS::AtMostOnce,
                will.retain,
            ));
        }
        options
    }

    /// Transport for the main telemetry connection.
    pub fn main_transport(&self) -> Arc<MqttTransport> {
        Arc::new(MqttTransport::new(self.clone(), self.client_id.clone()))
    }
}

impl TransportFactory for BrokerConfig {
    fn create(&self, client_id: &str) -> Arc<dyn Transport> {
        Arc::new(MqttTransport::new(self.clone(), client_id))
    }
}

/// A live connection: the request handle plus the task driving its socket.
struct Connection {
    client: AsyncClient,
    task: JoinHandle<()>,
}

/// One MQTT client connection.
pub struct MqttTransport {
    config: BrokerConfig,
    client_id: String,
    connection: Mutex<Option<Connection>>,
    connected: Arc<AtomicBool>,
}

impl MqttTransport {
    pub fn new(config: BrokerConfig, client_id: impl Into<String>) -> Self {
        Self {
            config,
            client_id: client_id.into(),
            connection: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_connection(&self) -> Option<Connection> {
        self.connected.store(false, Ordering::SeqCst);
        self.slot().take()
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(connection) = self.take_connection() {
            connection.task.abort();
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn connect(&self, will: Option<Message>, timeout: Duration) -> Result<(), TransportError> {
        if let Some(stale) = self.take_connection() {
            stale.task.abort();
        }

        let options = self.config.options(&self.client_id, will.as_ref());
        let (client, mut eventloop) = AsyncClient::new(options, self.config.request_capacity.max(1));
        let (ack_tx, ack_rx) = oneshot::channel::<Result<(), TransportError>>();
        let connected = Arc::clone(&self.connected);
        let client_id = self.client_id.clone();

        let task = tokio::spawn(async move {
            let mut ack_tx = Some(ack_tx);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        let accepted = ack.code == ConnectReturnCode::Success;
                        connected.store(accepted, Ordering::SeqCst);
                        let result = if accepted {
                            Ok(())
                        } else {
                            Err(TransportError::connect(format!("{:?}", ack.code)))
                        };
                        if let Some(tx) = ack_tx.take() {
                            let _ = tx.send(result);
                        }
                        if !accepted {
                            break;
                        }
                    }
                    Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                        debug!("{} sent DISCONNECT", client_id);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        connected.store(false, Ordering::SeqCst);
                        match ack_tx.take() {
                            Some(tx) => {
                                let _ = tx.send(Err(TransportError::connect(e.to_string())));
                            }
                            None => warn!("MQTT connection {} lost: {}", client_id, e),
                        }
                        // No automatic reconnect: the caller decides
                        break;
                    }
                }
            }
        });

        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(Ok(Ok(()))) => {
                *self.slot() = Some(Connection { client, task });
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                task.abort();
                Err(e)
            }
            Ok(Err(_)) => {
                task.abort();
                Err(TransportError::connect("event loop ended before CONNACK"))
            }
            Err(_) => {
                task.abort();
                self.connected.store(false, Ordering::SeqCst);
                Err(TransportError::timeout(timeout))
            }
        }
    }

    fn publish(&self, message: Message) -> Result<(), TransportError> {
        let slot = self.slot();
        let connection = slot.as_ref().ok_or(TransportError::NotConnected)?;
        connection
            .client
            .try_publish(message.topic, QoS::AtMostOnce, message.retain, message.payload)
            .map_err(|e| TransportError::publish(e.to_string()))
    }

    fn force_disconnect(&self) {
        if let Some(connection) = self.take_connection() {
            // Dropping the event loop closes the socket without DISCONNECT
            connection.task.abort();
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(connection) = self.take_connection() else {
            return Ok(());
        };
        let sent = connection
            .client
            .disconnect()
            .await
            .map_err(|e| TransportError::publish(e.to_string()));

        let mut task = connection.task;
        if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
            task.abort();
        }
        sent
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let config = BrokerConfig::default();
        assert_eq!((config.host.as_str(), config.port), ("localhost", 1883));
        assert_eq!(config.keep_alive, Duration::from_secs(60));
    }

    #[test]
    fn test_options_carry_will() {
        let config = BrokerConfig::default().with_endpoint("broker", 1884);
        let will = Message::retained("farm/f/coord/c/status/connection", "{}");
        let options = config.options("sim-coord-c", Some(&will));
        assert_eq!(options.client_id(), "sim-coord-c");
        assert_eq!(options.broker_address(), ("broker".to_string(), 1884));
        let last_will = options.last_will().unwrap();
        assert!(last_will.retain);
        assert!(config.options("plain", None).last_will().is_none());
    }

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let transport = MqttTransport::new(BrokerConfig::default(), "t");
        assert!(!transport.is_connected());
        assert_eq!(
            transport.publish(Message::new("a", "b")),
            Err(TransportError::NotConnected)
        );
        // Tearing down an idle transport is a no-op
        transport.force_disconnect();
        assert!(transport.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails_fast() {
        let config = BrokerConfig::default().with_endpoint("127.0.0.1", 1);
        let transport = MqttTransport::new(config, "t");
        let result = transport.connect(None, Duration::from_secs(5)).await;
        assert!(result.is_err());
        assert!(!transport.is_connected());
    }
}
