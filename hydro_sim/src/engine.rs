//! Tick engine - drives a scenario over a topology.
//!
//! Each tick advances simulated time by `interval × speed`, lets the
//! scenario flip state, runs physics for every online coordinator, then
//! publishes one reservoir message per online coordinator and one
//! telemetry message per connected tower. The remainder of the interval is
//! slept on the [`SimClock`], so a [`VirtualClock`](crate::clock::VirtualClock)
//! runs the same schedule instantly.
//!
//! One tick always completes before the next starts; nothing else mutates
//! the topology while the engine runs.

use hydro_core::{Demand, Noise, Topology};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SimConfig;
use crate::error::SimError;
use crate::scenarios::{RunContext, Scenario, TickEnv, TickReport};

/// Lifecycle of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngineState::NotStarted => "not-started",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
            EngineState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Requests a graceful stop. The current tick finishes first.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Random id tagging this run's logs
    pub run_id: Uuid,
    pub scenario: String,
    pub ticks: u64,
    pub sim_hours: f64,
    pub messages_published: u64,
    pub errors: u64,
    /// Clock time between loop start and stop
    pub real_elapsed_secs: f64,
}

/// Runs one scenario over one topology.
pub struct Engine {
    run_id: Uuid,
    scenario: Box<dyn Scenario>,
    topology: Topology,
    config: SimConfig,
    ctx: RunContext,
    noise: Noise,
    state: EngineState,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    tick: u64,
    /// Simulated seconds since start
    sim_time_s: f64,
    last_report: Option<TickReport>,
}

impl Engine {
    pub fn new(scenario: Box<dyn Scenario>, topology: Topology, config: SimConfig, ctx: RunContext) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            run_id: Uuid::new_v4(),
            scenario,
            topology,
            noise: Noise::new(config.noise_seed()),
            config,
            ctx,
            state: EngineState::NotStarted,
            shutdown_tx: Arc::new(tx),
            shutdown_rx: rx,
            tick: 0,
            sim_time_s: 0.0,
            last_report: None,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    /// Report of the most recent tick.
    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Runs the scenario to completion (duration elapsed or shutdown).
    ///
    /// Only an engine that has never run can run.
    pub async fn run(&mut self) -> Result<RunSummary, SimError> {
        if self.state != EngineState::NotStarted {
            return Err(SimError::InvalidState(self.state.to_string()));
        }
        self.state = EngineState::Running;

        self.scenario.configure_topology(&mut self.topology, &mut self.noise);
        self.log_banner();
        self.scenario.on_start(&mut self.topology, &self.ctx).await?;

        let clock = Arc::clone(&self.ctx.clock);
        let start = clock.now();
        let mut last_status = start;

        loop {
            let tick_start = clock.now();
            if tick_start.saturating_sub(start) >= self.config.duration || self.shutdown_requested() {
                break;
            }

            let report = self.step().await;
            self.scenario.on_tick_complete(&report);

            if clock.now().saturating_sub(last_status) >= self.config.status_every {
                self.log_status(&report);
                last_status = clock.now();
            }
            self.last_report = Some(report);

            let spent = clock.now().saturating_sub(tick_start);
            let remaining = self.config.interval.saturating_sub(spent);
            if !remaining.is_zero() {
                let mut rx = self.shutdown_rx.clone();
                tokio::select! {
                    _ = clock.sleep(remaining) => {}
                    _ = rx.changed() => {}
                }
            }
        }

        self.state = EngineState::Stopping;
        let summary = self.summary(clock.now().saturating_sub(start));
        self.log_final(&summary);

        self.scenario.on_finish(&mut self.topology, &self.ctx).await;
        self.state = EngineState::Stopped;
        Ok(summary)
    }

    /// One tick: advance time, scenario hook, physics, publish.
    async fn step(&mut self) -> TickReport {
        let clock = Arc::clone(&self.ctx.clock);
        let tick_start = clock.now();
        let publisher = Arc::clone(&self.ctx.publisher);
        let messages_before = publisher.messages_published();
        let errors_before = publisher.errors();

        let step_s = self.config.sim_step_secs();
        self.sim_time_s += step_s;
        self.tick += 1;

        let mut env = TickEnv {
            tick: self.tick,
            sim_time_h: self.sim_time_s / 3600.0,
            dt_h: step_s / 3600.0,
            noise: &mut self.noise,
            ctx: &self.ctx,
        };
        self.scenario.on_tick(&mut env, &mut self.topology).await;

        for coord_id in self.topology.coordinator_ids() {
            let Some(parts) = self.topology.coordinator_parts_mut(&coord_id) else {
                continue;
            };
            if !parts.coordinator.online {
                continue;
            }
            let demand = Demand::of(parts.towers.iter().map(|t| &**t));

            let mut reservoir = parts.reservoir;
            if let Some(reservoir) = reservoir.as_deref_mut() {
                self.scenario.update_reservoir(&mut env, parts.coordinator, reservoir, &demand);
            }
            let mut towers = parts.towers;
            for tower in towers.iter_mut().filter(|t| t.is_connected()) {
                self.scenario.update_tower(&mut env, parts.coordinator, tower);
            }

            let towers_online = towers.iter().filter(|t| t.is_connected()).count();
            if let Some(reservoir) = reservoir.as_deref() {
                publisher.publish_reservoir_telemetry(parts.coordinator, reservoir, towers_online);
            }
            for tower in towers.iter().filter(|t| t.is_connected()) {
                publisher.publish_tower_telemetry(tower);
            }
        }

        let report = TickReport {
            tick: self.tick,
            sim_time_h: self.sim_time_s / 3600.0,
            messages: publisher.messages_published() - messages_before,
            errors: publisher.errors() - errors_before,
            coordinators_online: self.topology.online_coordinator_count(),
            towers_online: self.topology.online_tower_count(),
            duration: clock.now().saturating_sub(tick_start),
        };
        debug!(
            "tick={} sim={:.3}h msgs={} errors={}",
            report.tick, report.sim_time_h, report.messages, report.errors
        );
        report
    }

    fn summary(&self, elapsed: Duration) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            scenario: self.scenario.kind().name().to_string(),
            ticks: self.tick,
            sim_hours: self.sim_time_s / 3600.0,
            messages_published: self.ctx.publisher.messages_published(),
            errors: self.ctx.publisher.errors(),
            real_elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    fn log_banner(&self) {
        let stats = self.topology.stats();
        let kind = self.scenario.kind();
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("Scenario: {} - {}", kind.name(), kind.description());
        info!("Run: {}", self.run_id);
        info!(
            "Topology: {} farms, {} coordinators, {} towers",
            stats.farms, stats.coordinators, stats.towers
        );
        info!(
            "Pacing: speed={}x interval={:.1}s duration={:.0}s ({:.2} sim-h per tick)",
            self.config.speed,
            self.config.interval.as_secs_f64(),
            self.config.duration.as_secs_f64(),
            self.config.sim_step_secs() / 3600.0
        );
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    fn log_final(&self, summary: &RunSummary) {
        let rate = summary.messages_published as f64 / summary.real_elapsed_secs.max(0.1);
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "FINAL | real={:.1}s sim={:.2}h | ticks={} msgs={} ({:.1} msg/s) errors={}",
            summary.real_elapsed_secs, summary.sim_hours, summary.ticks, summary.messages_published, rate, summary.errors
        );
        let sample = self
            .topology
            .coordinator_ids()
            .first()
            .and_then(|id| self.topology.reservoir_of(id));
        if let Some(r) = sample {
            info!(
                "  Sample reservoir {}: pH={:.2} EC={:.2} level={:.1}%",
                r.coord_id, r.ph, r.ec_ms_cm, r.water_level_pct
            );
        }
    }

    fn log_status(&self, report: &TickReport) {
        let stats = self.topology.stats();
        info!(
            "STATUS | tick={} sim={:.2}h | coords={}/{} towers={}/{} | msgs={} errors={}",
            report.tick,
            report.sim_time_h,
            report.coordinators_online,
            stats.coordinators,
            report.towers_online,
            stats.towers,
            self.ctx.publisher.messages_published(),
            self.ctx.publisher.errors()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::LocalBroker;
    use crate::clock::VirtualClock;
    use crate::payload::topics;
    use crate::publisher::TelemetryPublisher;
    use crate::scenarios::{PhDrift, Reconnection, ScaleTest, SteadyState, TowerPairing};
    use hydro_core::{build_topology, TopologyConfig};

    async fn context(broker: &Arc<LocalBroker>) -> RunContext {
        let clock = VirtualClock::shared();
        let publisher = Arc::new(TelemetryPublisher::new(broker.transport("sim"), clock.clone()));
        publisher.connect(Duration::from_secs(1)).await.unwrap();
        RunContext {
            publisher,
            links: broker.clone(),
            clock,
            connect_timeout: Duration::from_secs(1),
        }
    }

    fn topology(farms: usize, coords: usize, towers: usize) -> Topology {
        build_topology(
            &TopologyConfig::default()
                .with_farms(farms)
                .with_coordinators_per_farm(coords)
                .with_towers_per_coordinator(towers)
                .with_randomize_crops(false),
        )
    }

    fn config(speed: f64, interval: f64, duration: f64) -> SimConfig {
        SimConfig::default()
            .with_speed(speed)
            .with_interval_secs(interval)
            .with_duration_secs(duration)
    }

    #[tokio::test]
    async fn test_steady_state_publishes_every_tick() {
        let broker = Arc::new(LocalBroker::new());
        let ctx = context(&broker).await;
        let mut engine = Engine::new(Box::new(SteadyState), topology(1, 2, 3), config(1.0, 5.0, 30.0), ctx);

        let summary = engine.run().await.unwrap();
        assert_eq!(summary.ticks, 6);
        assert_eq!(summary.messages_published, 6 * (2 + 6));
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.real_elapsed_secs, 30.0);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.last_report().unwrap().messages, 8);
    }

    #[tokio::test]
    async fn test_ph_drift_crosses_crisis_threshold() {
        let broker = Arc::new(LocalBroker::new());
        let ctx = context(&broker).await;
        let mut engine = Engine::new(Box::new(PhDrift::new()), topology(1, 1, 3), config(360.0, 5.0, 60.0), ctx);

        let summary = engine.run().await.unwrap();
        assert_eq!(summary.ticks, 12);
        assert!((summary.sim_hours - 6.0).abs() < 1e-9);
        let coord_id = engine.topology().coordinator_ids()[0].clone();
        assert!(engine.topology().reservoir_of(&coord_id).unwrap().ph < 5.0);
    }

    #[tokio::test]
    async fn test_tower_pairing_schedule() {
        let broker = Arc::new(LocalBroker::new());
        let ctx = context(&broker).await;
        let mut engine = Engine::new(Box::new(TowerPairing::new()), topology(1, 1, 5), config(1.0, 5.0, 25.0), ctx);
        engine.run().await.unwrap();
        assert_eq!(engine.topology().online_tower_count(), 0);

        let broker = Arc::new(LocalBroker::new());
        let ctx = context(&broker).await;
        let mut engine = Engine::new(Box::new(TowerPairing::new()), topology(1, 1, 5), config(1.0, 5.0, 150.0), ctx);
        engine.run().await.unwrap();
        assert_eq!(engine.topology().online_tower_count(), 5);
        assert_eq!(broker.history("farm/+/coord/+/pairing/request").len(), 5);
        assert_eq!(broker.history("farm/+/coord/+/pairing/complete").len(), 5);
    }

    #[tokio::test]
    async fn test_zero_online_towers_still_reports_reservoirs() {
        let broker = Arc::new(LocalBroker::new());
        let ctx = context(&broker).await;
        let scenario = TowerPairing::new().with_interval_secs(1.0e9);
        let mut engine = Engine::new(Box::new(scenario), topology(1, 2, 4), config(1.0, 5.0, 20.0), ctx);

        let summary = engine.run().await.unwrap();
        assert_eq!(summary.ticks, 4);
        assert_eq!(summary.messages_published, 4 * 2);
        assert_eq!(broker.history("farm/+/coord/+/tower/+/telemetry").len(), 0);
    }

    #[tokio::test]
    async fn test_scale_thousand_towers() {
        let broker = Arc::new(LocalBroker::new());
        let ctx = context(&broker).await;
        let topology = build_topology(&TopologyConfig::for_total_towers(1000, 10, 42));
        assert_eq!(topology.stats().coordinators, 100);
        let mut engine = Engine::new(Box::new(ScaleTest::new()), topology, config(1.0, 1.0, 3.0), ctx);

        let summary = engine.run().await.unwrap();
        assert_eq!(summary.ticks, 3);
        assert_eq!(engine.last_report().unwrap().messages, 1100);
        assert_eq!(summary.messages_published, 3300);
    }

    #[tokio::test]
    async fn test_publish_failures_are_counted_not_fatal() {
        let broker = Arc::new(LocalBroker::new());
        let ctx = context(&broker).await;
        broker.set_fail_publishes(true);
        let mut engine = Engine::new(Box::new(SteadyState), topology(1, 1, 2), config(1.0, 5.0, 15.0), ctx);

        let summary = engine.run().await.unwrap();
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.messages_published, 0);
        assert_eq!(summary.errors, 3 * 3);
    }

    #[tokio::test]
    async fn test_outcome_independent_of_speed() {
        // Same sim step (5 s) reached with different speed/interval pairs
        let mut finals = Vec::new();
        for (speed, interval, duration) in [(1.0, 5.0, 480.0), (10.0, 0.5, 48.0)] {
            let broker = Arc::new(LocalBroker::new());
            let ctx = context(&broker).await;
            let mut engine = Engine::new(Box::new(Reconnection::new()), topology(2, 2, 2), config(speed, interval, duration), ctx);
            let summary = engine.run().await.unwrap();
            assert_eq!(summary.ticks, 96);
            assert_eq!(engine.topology().online_coordinator_count(), 4);
            finals.push(engine.topology().clone());
        }
        assert_eq!(finals[0], finals[1]);
    }

    #[tokio::test]
    async fn test_ph_phase_reached_at_any_speed() {
        // Same interval, sim step of 0.5 h vs 1 h; both end at hour 6
        let mut finals = Vec::new();
        for (speed, duration) in [(360.0, 60.0), (720.0, 30.0)] {
            let broker = Arc::new(LocalBroker::new());
            let ctx = context(&broker).await;
            let mut engine = Engine::new(Box::new(PhDrift::new()), topology(1, 1, 3), config(speed, 5.0, duration), ctx);
            let summary = engine.run().await.unwrap();
            assert!((summary.sim_hours - 6.0).abs() < 1e-9);

            let coord_id = engine.topology().coordinator_ids()[0].clone();
            let ph = engine.topology().reservoir_of(&coord_id).unwrap().ph;
            assert!(ph < 5.0, "speed {speed}: pH {ph}");
            finals.push(ph);
        }
        assert!((finals[0] - finals[1]).abs() < 0.3);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let broker = Arc::new(LocalBroker::new());
        let ctx = context(&broker).await;
        let mut engine = Engine::new(Box::new(SteadyState), topology(1, 1, 1), config(1.0, 5.0, 3600.0), ctx);
        engine.shutdown_handle().trigger();

        let summary = engine.run().await.unwrap();
        assert_eq!(summary.ticks, 0);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(matches!(engine.run().await, Err(SimError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_reservoir_topic_per_coordinator() {
        let broker = Arc::new(LocalBroker::new());
        let ctx = context(&broker).await;
        let topology = topology(1, 1, 1);
        let coordinator = topology.coordinators().next().unwrap().clone();
        let mut engine = Engine::new(Box::new(SteadyState), topology, config(1.0, 5.0, 5.0), ctx);
        engine.run().await.unwrap();

        let topic = topics::reservoir_telemetry(&coordinator.farm_id, &coordinator.coord_id);
        assert_eq!(broker.history(&topic).len(), 1);
    }
}
