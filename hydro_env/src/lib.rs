//! Hydro Environment Abstraction Layer
//!
//! The simulation engine never talks to a socket or a wall clock directly.
//! Everything that would tie it to a concrete environment goes through two
//! traits defined here:
//!
//! - [`SimClock`]: monotonic time, wall time and async sleep
//! - [`Transport`]: a single publish/subscribe broker connection with
//!   Last-Will support and an abrupt (non-clean) teardown path
//!
//! Production wires these to tokio and a real MQTT broker; tests wire them to
//! a virtual clock and an in-process broker so that hours of simulated
//! telemetry run in milliseconds.
//!
//! # Example
//!
//! ```ignore
//! use hydro_env::{Message, SimClock, Transport};
//!
//! async fn heartbeat<C: SimClock, T: Transport + ?Sized>(clock: &C, link: &T) {
//!     loop {
//!         let _ = link.publish(Message::new("farm/farm-001/heartbeat", "{}"));
//!         clock.sleep(Duration::from_secs(5)).await;
//!     }
//! }
//! ```

mod clock;
mod error;
mod network;
mod tokio_impl;
mod types;

pub use clock::SimClock;
pub use error::TransportError;
pub use network::{Transport, TransportFactory};
pub use tokio_impl::TokioClock;
pub use types::Message;
