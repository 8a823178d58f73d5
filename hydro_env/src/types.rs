//! Common types for the hydro environment abstraction.

use serde::{Deserialize, Serialize};

/// A single publish/subscribe message.
///
/// Payloads are opaque bytes at this layer; the simulator encodes them as
/// JSON before handing them to a transport. All telemetry is sent
/// at-most-once, so there is no QoS field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Channel name, e.g. `farm/farm-001/coord/AA:BB:01:01:00:01/reservoir/telemetry`
    pub topic: String,

    /// Raw payload bytes
    pub payload: Vec<u8>,

    /// Whether the broker should keep this as the topic's last known value
    pub retain: bool,
}

impl Message {
    /// Creates a non-retained message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    /// Creates a retained message.
    pub fn retained(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            retain: true,
            ..Self::new(topic, payload)
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Returns the payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retained_flag() {
        let plain = Message::new("a/b", "x");
        let kept = Message::retained("a/b", "x");
        assert!(!plain.retain);
        assert!(kept.retain);
        assert_eq!(plain.topic, kept.topic);
        assert_eq!(kept.payload_str(), Some("x"));
        assert_eq!(kept.size(), 1);
    }
}
