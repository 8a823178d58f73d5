//! Hydro Core - Entity Model, Physics and Topology
//!
//! The leaf layers of the fleet simulator:
//! 1. **Entity Model**: plain records for farms, coordinators, towers and
//!    reservoirs held in an id-keyed arena ([`Topology`])
//! 2. **Physics**: stateless `f(state, dt, params) -> value` functions that
//!    evolve sensor readings over simulated time
//! 3. **Topology Builder**: seeded construction of a farm graph from counts
//!
//! Nothing here performs I/O or reads the clock.

pub mod crops;
pub mod error;
pub mod model;
pub mod noise;
pub mod physics;
pub mod topology;

// Re-export key types for convenience
pub use crops::{CropProfile, CropType};
pub use error::CoreError;
pub use model::{Coordinator, CoordinatorParts, Demand, Farm, Reservoir, Topology, Tower};
pub use noise::Noise;
pub use topology::{build_topology, mac_id, TopologyConfig, TopologyStats};
