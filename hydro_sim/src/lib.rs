//! Hydroponic Fleet Telemetry Simulator
//!
//! Drives a synthetic fleet of farms, coordinators, towers and reservoirs
//! through scripted scenarios and publishes their telemetry to an MQTT
//! broker, so the backend can be exercised without hardware.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Engine                             │
//! │   tick: advance sim time -> scenario hooks -> publish        │
//! │        │                     │                    │          │
//! │  ┌─────▼─────┐        ┌──────▼──────┐     ┌───────▼───────┐  │
//! │  │ Topology  │        │  Scenario   │     │  Telemetry    │  │
//! │  │ (arena)   │◄──────►│  variants   │     │  Publisher    │  │
//! │  └───────────┘        └──────┬──────┘     └───────┬───────┘  │
//! │                              │ per-coordinator    │          │
//! │                       ┌──────▼──────┐     ┌───────▼───────┐  │
//! │                       │ Coordinator │     │   Transport   │  │
//! │                       │ links (LWT) │────►│ MQTT / Local  │  │
//! │                       └─────────────┘     └───────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Time comes from a [`SimClock`](hydro_env::SimClock): tokio in production,
//! [`VirtualClock`] in tests, where sleeping advances time instantly and a
//! [`LocalBroker`] stands in for the real broker.
//!
//! # Usage
//!
//! ```ignore
//! use hydro_sim::{Engine, LocalBroker, RunContext, ScenarioKind, SimConfig, TelemetryPublisher, VirtualClock};
//!
//! let broker = Arc::new(LocalBroker::new());
//! let clock = VirtualClock::shared();
//! let publisher = Arc::new(TelemetryPublisher::new(broker.transport("sim"), clock.clone()));
//! publisher.connect(Duration::from_secs(1)).await?;
//!
//! let ctx = RunContext { publisher, links: broker, clock, connect_timeout: Duration::from_secs(1) };
//! let topology = build_topology(&TopologyConfig::default());
//! let mut engine = Engine::new(ScenarioKind::PhDrift.create(), topology, SimConfig::default(), ctx);
//! let summary = engine.run().await?;
//! ```

pub mod bootstrap;
pub mod broker;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod link;
pub mod mqtt;
pub mod payload;
pub mod publisher;
pub mod scenarios;

pub use bootstrap::{BootstrapReport, RestBootstrapper};
pub use broker::{LocalBroker, LocalTransport};
pub use clock::VirtualClock;
pub use config::SimConfig;
pub use engine::{Engine, EngineState, RunSummary, ShutdownHandle};
pub use error::SimError;
pub use link::CoordinatorLink;
pub use mqtt::{BrokerConfig, MqttTransport};
pub use publisher::TelemetryPublisher;
pub use scenarios::{RunContext, Scenario, ScenarioKind, TickEnv, TickReport};
