//! Gateway: keeps the Discord session alive and owns the process lifecycle.
//!
//! Lifecycle:
//! 1. Load + validate config
//! 2. Open the database, wire [`SpawnServices`]
//! 3. Run the gateway session under the [`ReconnectSupervisor`]
//! 4. Tear down schedulers, expiry watchers, and the outbox on exit
//!
//! All spawn logic lives in `beenbag-spawns`; the Discord adapter lives in
//! `beenbag-discord`.

pub mod error;
pub mod metrics_export;
pub mod server;
pub mod services;
pub mod supervisor;

pub use {
    error::{ConnectionError, Error, Result},
    server::{RunMode, check_config, run, sweep},
    services::{SpawnServices, gate_config, open_database},
    supervisor::{Connector, ReconnectSupervisor, SupervisorConfig},
};
