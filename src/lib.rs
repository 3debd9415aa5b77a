//! linkhook - networkd state-transition hook dispatcher
//!
//! Library behind the `linkhookd` daemon. Tracks per-interface state
//! reported by systemd-networkd over D-Bus and runs operator-provided
//! hook scripts on real state transitions:
//! - Interface directory (ifindex/name resolution, state snapshots)
//! - State dispatcher (transition detection, per-axis hook runs)
//! - Hook selection (permission-filtered, lexicographically ordered)
//! - Status enrichment (`networkctl status`, wireless name, addresses)
//! - Bus subscription and supervisor readiness plumbing

pub mod bus;
pub mod directory;
pub mod dispatcher;
pub mod enrich;
pub mod environment;
pub mod error;
pub mod hooks;
pub mod notify;
pub mod state;

// Re-export commonly used types
pub use bus::{decode_link_index, LinkStateStream, RawLinkEvent};
pub use directory::{InterfaceDirectory, InterfaceRecord, LinkSource, NetworkctlLinkSource};
pub use dispatcher::Dispatcher;
pub use enrich::{partition_addresses, EnrichmentData, NetworkctlEnricher, StatusEnricher};
pub use environment::build_hook_env;
pub use error::{LinkhookError, LinkhookResult};
pub use hooks::{HookRunner, HookSelector, ScriptHookRunner};
pub use state::{AdminState, OperState, StateAxis, StateTransitionEvent};
