//! Coordination layer
//!
//! - Debounced triggers for hotkeys and periodic maintenance
//! - Cooperative scheduler driving the looping tasks
//! - Nearby-scan, network-request and server tasks
//! - Role and follower-mode transitions

pub mod debounce;
pub mod role;
pub mod scheduler;
pub mod tasks;

pub use debounce::DebounceRegistry;
pub use role::{RoleController, RoleTransition};
pub use scheduler::{CooperativeScheduler, ScheduledTask, TaskControl};
pub use tasks::{NearbyScanTask, NetworkRequestTask, ServerTask};
