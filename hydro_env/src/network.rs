//! Transport abstraction for broker connections.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;
use crate::types::Message;

/// One client connection to a publish/subscribe broker.
///
/// # Implementations
///
/// - **Production**: `MqttTransport` (`hydro_sim::mqtt`) - rumqttc client whose
///   event loop runs on its own tokio task
/// - **Simulation**: `LocalTransport` (`hydro_sim::broker`) - in-process broker
///   with Last-Will emulation
///
/// # Connection lifecycle
///
/// ```text
///   connect(will) ──► connected ──► disconnect()        (clean: will discarded)
///                         │
///                         └──────► force_disconnect()   (unclean: broker publishes will)
/// ```
///
/// A transport may be connected again after either teardown; each `connect`
/// registers a fresh will.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Returns the client identifier presented to the broker.
    fn client_id(&self) -> &str;

    /// Connects and registers `will` to be published by the broker if this
    /// connection later terminates without a clean disconnect.
    ///
    /// Blocks until the broker acknowledges or `timeout` elapses. A timed-out
    /// attempt is not retried.
    async fn connect(&self, will: Option<Message>, timeout: Duration) -> Result<(), TransportError>;

    /// Queues a message for delivery.
    ///
    /// Never waits on socket readiness. `Ok` means the message was accepted
    /// by the transport, not that the broker received it.
    fn publish(&self, message: Message) -> Result<(), TransportError>;

    /// Drops the underlying socket without the protocol's clean-shutdown
    /// handshake, leaving the broker to detect the loss and fire the will.
    fn force_disconnect(&self);

    /// Performs a clean protocol disconnect. The registered will is discarded.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Returns whether the broker has acknowledged the current connection.
    fn is_connected(&self) -> bool;
}

/// Creates independent transports, one per client identifier.
///
/// Used wherever the simulator needs a dedicated connection per entity
/// (e.g. one Last-Will link per coordinator).
pub trait TransportFactory: Send + Sync {
    /// Builds a new, not yet connected, transport.
    fn create(&self, client_id: &str) -> Arc<dyn Transport>;
}
