//! In-process publish/subscribe broker with Last-Will emulation.
//!
//! Used by tests and by `--local` runs. It keeps the subset of broker
//! behaviour the simulator relies on:
//!
//! - topic-filter subscriptions (`+` single level, `#` multi level)
//! - retained messages, replayed to new subscribers
//! - one Last-Will per client session, published exactly once when the
//!   session ends uncleanly and discarded on a clean disconnect
//! - fault injection: rejected publishes and refused connections

use async_trait::async_trait;
use hydro_env::{Message, Transport, TransportError, TransportFactory};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Returns whether `topic` matches the subscription `filter`.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut f = filter.split('/');
    let mut t = topic.split('/');
    loop {
        match (f.next(), t.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(a), Some(b)) if a == b => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[derive(Debug)]
struct Subscription {
    filter: String,
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Debug, Default)]
struct BrokerState {
    /// Live sessions: client id -> armed will
    sessions: HashMap<String, Option<Message>>,

    /// Last retained message per topic
    retained: BTreeMap<String, Message>,

    subscriptions: Vec<Subscription>,

    /// Every message routed, in order (publishes and fired wills)
    history: Vec<Message>,

    /// Number of wills fired per client id
    wills_fired: HashMap<String, u64>,

    /// Reject every publish while set
    fail_publishes: bool,

    /// Refuse every connect while set
    refuse_connections: bool,
}

impl BrokerState {
    fn route(&mut self, message: Message) {
        if message.retain {
            if message.payload.is_empty() {
                self.retained.remove(&message.topic);
            } else {
                self.retained.insert(message.topic.clone(), message.clone());
            }
        }
        self.subscriptions.retain(|sub| {
            if topic_matches(&sub.filter, &message.topic) {
                sub.tx.send(message.clone()).is_ok()
            } else {
                !sub.tx.is_closed()
            }
        });
        self.history.push(message);
    }
}

/// Handle to a shared in-process broker. Clones refer to the same broker.
#[derive(Debug, Clone, Default)]
pub struct LocalBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates a client transport bound to this broker.
    pub fn transport(&self, client_id: impl Into<String>) -> Arc<LocalTransport> {
        Arc::new(LocalTransport {
            client_id: client_id.into(),
            broker: self.clone(),
            connected: AtomicBool::new(false),
        })
    }

    /// Subscribes to `filter`. Matching retained messages are delivered first.
    pub fn subscribe(&self, filter: impl Into<String>) -> Subscriber {
        let filter = filter.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        for message in state.retained.values() {
            if topic_matches(&filter, &message.topic) {
                let _ = tx.send(message.clone());
            }
        }
        state.subscriptions.push(Subscription { filter, tx });
        Subscriber { rx }
    }

    /// Returns the retained message on `topic`, if any.
    pub fn retained(&self, topic: &str) -> Option<Message> {
        self.state().retained.get(topic).cloned()
    }

    /// Every routed message whose topic matches `filter`, in order.
    pub fn history(&self, filter: &str) -> Vec<Message> {
        self.state()
            .history
            .iter()
            .filter(|m| topic_matches(filter, &m.topic))
            .cloned()
            .collect()
    }

    /// Total messages routed.
    pub fn message_count(&self) -> usize {
        self.state().history.len()
    }

    /// Number of wills fired on behalf of `client_id`.
    pub fn wills_fired(&self, client_id: &str) -> u64 {
        self.state().wills_fired.get(client_id).copied().unwrap_or(0)
    }

    pub fn is_session_open(&self, client_id: &str) -> bool {
        self.state().sessions.contains_key(client_id)
    }

    /// Makes every subsequent publish fail until cleared.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.state().fail_publishes = fail;
    }

    /// Makes every subsequent connect fail until cleared.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.state().refuse_connections = refuse;
    }

    fn open_session(&self, client_id: &str, will: Option<Message>) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.refuse_connections {
            return Err(TransportError::connect("connection refused"));
        }
        // Reconnecting replaces the previous will
        state.sessions.insert(client_id.to_string(), will);
        Ok(())
    }

    fn close_session(&self, client_id: &str, clean: bool) {
        let mut state = self.state();
        let Some(will) = state.sessions.remove(client_id) else {
            return;
        };
        if clean {
            return;
        }
        if let Some(will) = will {
            debug!("Broker firing will for {} on {}", client_id, will.topic);
            *state.wills_fired.entry(client_id.to_string()).or_default() += 1;
            state.route(will);
        }
    }

    fn publish(&self, client_id: &str, message: Message) -> Result<(), TransportError> {
        let mut state = self.state();
        if !state.sessions.contains_key(client_id) {
            return Err(TransportError::NotConnected);
        }
        if state.fail_publishes {
            return Err(TransportError::publish("rejected by broker"));
        }
        state.route(message);
        Ok(())
    }
}

impl TransportFactory for LocalBroker {
    fn create(&self, client_id: &str) -> Arc<dyn Transport> {
        self.transport(client_id)
    }
}

/// Receiving end of a [`LocalBroker::subscribe`] call.
#[derive(Debug)]
pub struct Subscriber {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Subscriber {
    /// Waits for the next message.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Drains every message delivered so far.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            out.push(message);
        }
        out
    }
}

/// One client connection to a [`LocalBroker`].
#[derive(Debug)]
pub struct LocalTransport {
    client_id: String,
    broker: LocalBroker,
    connected: AtomicBool,
}

#[async_trait]
impl Transport for LocalTransport {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn connect(&self, will: Option<Message>, _timeout: Duration) -> Result<(), TransportError> {
        self.broker.open_session(&self.client_id, will)?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn publish(&self, message: Message) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.broker.publish(&self.client_id, message)
    }

    fn force_disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.broker.close_session(&self.client_id, false);
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.broker.close_session(&self.client_id, true);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
