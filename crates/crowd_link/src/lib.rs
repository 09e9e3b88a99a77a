//! Lets a chat audience drive a simulation.
//!
//! The [`Integration`] is owned by the simulation thread and ticked once per
//! simulation step. It drains what the network produced, keeps track of
//! [`Viewer`]s and their roles, and turns chat commands into values on the
//! simulation's own work queue.
#[allow(clippy::redundant_pub_crate)] // pin-project-lite makes pub(crate) projections
pub mod util;

pub mod error;

mod executor;
pub use executor::Executor;

pub mod config;
pub use config::{Config, Connection};

mod persist;
pub use persist::{Json, Persist, Toml};

mod viewer;
pub use viewer::{ActorId, Roles, Viewer, PLAY_ROLE, REPUTATION_PER_SECOND};

mod roles;
pub use roles::{RoleBook, RoleRule, Transition};

mod registry;
pub use registry::ViewerRegistry;

pub mod transport;
pub use transport::{Connector, Event, State, TcpConnector, Transport};

mod dispatch;
pub use dispatch::{CommandEnvelope, Dispatched, Dispatcher, Throttle, WorkQueue};

mod announce;
pub use announce::AnnounceThrottle;

mod health;
pub use health::{ConfigProbe, HealthCheck, ProbeSlot, ProbeStatus};

mod integration;
pub use integration::Integration;

pub use crowd_message::{Message, Privileges, Scope};

#[cfg(test)]
mod testing;
