//! Broker-side disconnect detection through Last-Will.
//!
//! Every coordinator gets its own [`CoordinatorLink`] with a will armed.
//! At 2 simulated minutes half of them (at least one) drop their socket
//! without the clean-shutdown handshake, so the broker publishes their
//! retained `disconnected` status on their behalf. At 7 minutes they
//! reconnect with a fresh will and announce `connected` again.
//!
//! Links are opened, reconnected and closed concurrently; one link failing
//! only takes that coordinator out of the run.

use async_trait::async_trait;
use hydro_core::{Noise, Topology};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::reconnection::{pick_half, DISCONNECT_H, RECONNECT_H};
use super::{Latch, RunContext, Scenario, ScenarioKind, TickEnv};
use crate::error::SimError;
use crate::link::CoordinatorLink;

#[derive(Default)]
pub struct LwtDisconnect {
    targets: Vec<String>,
    links: BTreeMap<String, Arc<CoordinatorLink>>,
    /// Targets that were force-disconnected and await reconnection
    dropped: Vec<String>,
    disconnected: Latch,
    reconnected: Latch,
}

impl LwtDisconnect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinators that will be force-disconnected.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Links currently connected.
    pub fn connected_links(&self) -> usize {
        self.links.values().filter(|l| l.is_connected()).count()
    }

    fn force_disconnect_targets(&mut self, topology: &mut Topology) {
        for coord_id in &self.targets {
            let Some(link) = self.links.get(coord_id) else {
                continue;
            };
            if !link.is_connected() {
                continue;
            }
            link.force_disconnect();
            if topology.set_coordinator_online(coord_id, false).is_ok() {
                self.dropped.push(coord_id.clone());
            }
        }
        warn!(
            "Phase 2: {} coordinators force-disconnected (LWT pending)",
            self.dropped.len()
        );
    }

    async fn reconnect_dropped(&mut self, topology: &mut Topology) {
        let mut tasks = JoinSet::new();
        for coord_id in self.dropped.drain(..) {
            let (Some(link), Some(coordinator)) = (self.links.get(&coord_id), topology.coordinator(&coord_id)) else {
                continue;
            };
            let link = Arc::clone(link);
            let coordinator = coordinator.clone();
            tasks.spawn(async move {
                let result = link.reconnect(&coordinator).await;
                (coordinator.coord_id, result)
            });
        }

        let mut back = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((coord_id, Ok(()))) => {
                    if topology.set_coordinator_online(&coord_id, true).is_ok() {
                        back += 1;
                    }
                }
                // Already logged by the link; the coordinator stays offline
                Ok((_, Err(_))) => {}
                Err(e) => error!("Reconnect task failed: {}", e),
            }
        }
        info!("Phase 3: {} coordinators reconnected (LWT re-armed)", back);
    }
}

#[async_trait]
impl Scenario for LwtDisconnect {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::LwtDisconnect
    }

    fn configure_topology(&mut self, topology: &mut Topology, noise: &mut Noise) {
        self.targets = pick_half(topology, noise);
        info!(
            "LWT disconnect: {} of {} coordinators will force-disconnect",
            self.targets.len(),
            topology.stats().coordinators
        );
    }

    async fn on_start(&mut self, topology: &mut Topology, ctx: &RunContext) -> Result<(), SimError> {
        let coordinators: Vec<_> = topology.coordinators().cloned().collect();
        info!("Creating {} per-coordinator links ...", coordinators.len());

        let mut tasks = JoinSet::new();
        for coordinator in coordinators {
            let link = Arc::new(CoordinatorLink::new(
                &coordinator,
                ctx.links.as_ref(),
                Arc::clone(&ctx.clock),
                ctx.connect_timeout,
            ));
            self.links.insert(coordinator.coord_id.clone(), Arc::clone(&link));
            tasks.spawn(async move { link.connect(&coordinator).await.is_ok() });
        }

        let mut connected = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => connected += 1,
                Ok(false) => {}
                Err(e) => error!("Link connect task failed: {}", e),
            }
        }
        info!(
            "{} of {} coordinator links connected with LWT armed",
            connected,
            self.links.len()
        );
        Ok(())
    }

    async fn on_tick(&mut self, env: &mut TickEnv<'_>, topology: &mut Topology) {
        if env.sim_time_h >= DISCONNECT_H && self.disconnected.fire() {
            self.force_disconnect_targets(topology);
        }
        if env.sim_time_h >= RECONNECT_H && self.disconnected.is_set() && self.reconnected.fire() {
            self.reconnect_dropped(topology).await;
        }
    }

    async fn on_finish(&mut self, _topology: &mut Topology, _ctx: &RunContext) {
        info!("Cleaning up {} coordinator links ...", self.links.len());
        let mut tasks = JoinSet::new();
        for link in std::mem::take(&mut self.links).into_values() {
            tasks.spawn(async move { link.cleanup().await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Link cleanup task failed: {}", e);
            }
        }
    }
}
