//! Backend registration before telemetry starts.
//!
//! The backend drops telemetry from farms and coordinators it does not
//! know, so a run first creates every farm over REST, announces every
//! coordinator on the broker and then approves the pending registrations.
//! Both steps are idempotent: "already exists" answers count as success.

use hydro_core::{Coordinator, Farm, Topology};
use hydro_env::SimClock;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::SimError;
use crate::publisher::TelemetryPublisher;

/// Default backend base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

const HEALTH_PATH: &str = "/health/live";
const FARMS_PATH: &str = "/api/v1/farms";
const APPROVE_PATH: &str = "/api/coordinators/register/approve";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_POLL: Duration = Duration::from_secs(1);

/// Time the backend gets to process announces before approval.
const ANNOUNCE_SETTLE: Duration = Duration::from_secs(2);

/// Pause between approvals.
const APPROVE_SPACING: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize)]
struct CreateFarm<'a> {
    farm_id: &'a str,
    name: &'a str,
    description: String,
}

#[derive(Debug, Serialize)]
struct ApproveCoordinator<'a> {
    coord_id: &'a str,
    farm_id: &'a str,
    name: &'a str,
}

/// What the bootstrap managed to register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub farms_ok: usize,
    pub farms_failed: usize,
    pub coordinators_ok: usize,
    pub coordinators_failed: usize,
}

/// Farm creation succeeded or the farm already existed.
fn farm_accepted(status: StatusCode) -> bool {
    matches!(status, StatusCode::OK | StatusCode::CREATED | StatusCode::CONFLICT)
}

/// Approval succeeded or the coordinator was already registered.
fn approval_accepted(status: StatusCode, body: &str) -> bool {
    status == StatusCode::OK
        || (status == StatusCode::BAD_REQUEST && body.to_lowercase().contains("already registered"))
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((i, _)) => &body[..i],
        None => body,
    }
}

/// REST client for farm creation and coordinator approval.
pub struct RestBootstrapper {
    base_url: String,
    client: Client,
    clock: Arc<dyn SimClock>,
    health_timeout: Duration,
}

impl RestBootstrapper {
    pub fn new(base_url: &str, clock: Arc<dyn SimClock>) -> Result<Self, SimError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            clock,
            health_timeout: Duration::from_secs(30),
        })
    }

    /// Sets how long [`wait_for_backend`](Self::wait_for_backend) polls.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health_check(&self) -> bool {
        match self.client.get(self.url(HEALTH_PATH)).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }

    /// Polls the liveness endpoint once a second until it answers 200.
    pub async fn wait_for_backend(&self) -> Result<(), SimError> {
        info!("Waiting for backend at {} ...", self.base_url);
        let deadline = self.clock.now() + self.health_timeout;
        while self.clock.now() < deadline {
            if self.health_check().await {
                info!("Backend is healthy");
                return Ok(());
            }
            self.clock.sleep(HEALTH_POLL).await;
        }
        Err(SimError::BackendUnavailable {
            url: self.base_url.clone(),
            secs: self.health_timeout.as_secs(),
        })
    }

    /// `POST /api/v1/farms`. Returns whether the farm now exists.
    pub async fn create_farm(&self, farm: &Farm) -> bool {
        let body = CreateFarm {
            farm_id: &farm.farm_id,
            name: &farm.name,
            description: format!("Simulated farm {}", farm.farm_id),
        };
        let response = match self.client.post(self.url(FARMS_PATH)).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("  Farm creation error: {}", e);
                return false;
            }
        };

        let status = response.status();
        if farm_accepted(status) {
            if status == StatusCode::CONFLICT {
                debug!("  Farm {} already exists", farm.farm_id);
            } else {
                info!("  Created farm {}", farm.farm_id);
            }
            return true;
        }
        let text = response.text().await.unwrap_or_default();
        warn!("  Farm creation failed ({}): {}", status.as_u16(), snippet(&text));
        false
    }

    /// `POST /api/coordinators/register/approve`. Returns whether the
    /// coordinator is now registered.
    pub async fn approve_coordinator(&self, coordinator: &Coordinator) -> bool {
        let body = ApproveCoordinator {
            coord_id: &coordinator.coord_id,
            farm_id: &coordinator.farm_id,
            name: &coordinator.name,
        };
        let response = match self.client.post(self.url(APPROVE_PATH)).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("    Approval error: {}", e);
                return false;
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !approval_accepted(status, &text) {
            warn!("    Approval failed ({}): {}", status.as_u16(), snippet(&text));
            return false;
        }
        if status == StatusCode::OK {
            info!("    Approved coordinator {}", coordinator.coord_id);
        } else {
            debug!("    Coordinator {} already registered", coordinator.coord_id);
        }
        true
    }

    /// Full bootstrap: wait for health, create farms, announce and approve
    /// coordinators.
    ///
    /// Only an unreachable backend is an error; individual rejections are
    /// logged and counted.
    pub async fn bootstrap(
        &self,
        topology: &Topology,
        publisher: &TelemetryPublisher,
    ) -> Result<BootstrapReport, SimError> {
        self.wait_for_backend().await?;
        let mut report = BootstrapReport::default();

        info!("--- Bootstrap: creating {} farms ---", topology.farms().len());
        for farm in topology.farms() {
            if self.create_farm(farm).await {
                report.farms_ok += 1;
            } else {
                report.farms_failed += 1;
            }
        }

        info!("--- Bootstrap: announcing & approving coordinators ---");
        for coordinator in topology.coordinators() {
            publisher.announce_coordinator(coordinator);
        }
        self.clock.sleep(ANNOUNCE_SETTLE).await;

        for coordinator in topology.coordinators() {
            if self.approve_coordinator(coordinator).await {
                report.coordinators_ok += 1;
            } else {
                report.coordinators_failed += 1;
            }
            self.clock.sleep(APPROVE_SPACING).await;
        }

        info!(
            "--- Bootstrap complete: {}/{} farms, {}/{} coordinators ---",
            report.farms_ok,
            report.farms_ok + report.farms_failed,
            report.coordinators_ok,
            report.coordinators_ok + report.coordinators_failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;

    #[test]
    fn test_conflict_counts_as_created() {
        assert!(farm_accepted(StatusCode::OK));
        assert!(farm_accepted(StatusCode::CREATED));
        assert!(farm_accepted(StatusCode::CONFLICT));
        assert!(!farm_accepted(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_already_registered_counts_as_approved() {
        assert!(approval_accepted(StatusCode::OK, ""));
        assert!(approval_accepted(StatusCode::BAD_REQUEST, r#"{"detail":"Coordinator Already Registered"}"#));
        assert!(!approval_accepted(StatusCode::BAD_REQUEST, "farm not found"));
        assert!(!approval_accepted(StatusCode::NOT_FOUND, "already registered"));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let bootstrapper = RestBootstrapper::new("http://backend:8000/", VirtualClock::shared()).unwrap();
        assert_eq!(bootstrapper.base_url(), "http://backend:8000");
        assert_eq!(bootstrapper.url(HEALTH_PATH), "http://backend:8000/health/live");
    }

    #[tokio::test]
    async fn test_unreachable_backend_times_out() {
        let clock = VirtualClock::shared();
        let bootstrapper = RestBootstrapper::new("http://127.0.0.1:1", clock.clone())
            .unwrap()
            .with_health_timeout(Duration::from_secs(3));

        let err = bootstrapper.wait_for_backend().await.unwrap_err();
        assert!(matches!(err, SimError::BackendUnavailable { secs: 3, .. }));
        assert!(clock.now() >= Duration::from_secs(3));
    }
}
