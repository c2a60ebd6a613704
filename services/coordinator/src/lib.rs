//! wormhole migration coordinator.
//!
//! Moves a running container from one cluster node to another. One
//! coordinator runs next to each node; whichever one receives `/migrate`
//! acts as the source:
//!
//! ```text
//! source coordinator                          destination coordinator
//!   checkpoint workload
//!   delete source pod
//!   create pod on destination node
//!   wait for pod Running
//!   strip runtime scheme from container id
//!   GET <dest>/restore?id=<container id>  ──▶   run restore executable
//! ```
//!
//! ## Modules
//!
//! - `registry`: the configured destination (peer address and node)
//! - `invoker`: external checkpoint/restore executables
//! - `pods`: pod lifecycle client and its Kubernetes API backend
//! - `peer`: notifications to the destination coordinator
//! - `coordinator`: the migration state machine
//! - `api`: HTTP control surface

pub mod api;
pub mod config;
pub mod coordinator;
pub mod invoker;
pub mod peer;
pub mod pods;
pub mod registry;
pub mod state;

// Re-export commonly used types
pub use coordinator::{MigrationCoordinator, MigrationError, MigrationFailure, MigrationReport};
pub use registry::{DestinationConfig, DestinationRegistry};
pub use state::AppState;
