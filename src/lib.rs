pub mod adapters;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod engine;
pub mod error;
pub mod services;
pub mod settings;

pub use config::{AppConfig, FollowerMode, Role};
pub use coordination::{
    CooperativeScheduler, DebounceRegistry, RoleController, RoleTransition, ScheduledTask,
    TaskControl,
};
pub use domain::{ActionKind, FollowerCoordinationState, NetworkActivityObject, TrackedAction};
pub use engine::{Adapters, EngineContext, EngineHandle, FollowerEngine, FrameHooks};
pub use error::{FollowerError, Result};
pub use services::{BroadcastServer, RoleServer, SyncClient, SyncOutcome};
pub use settings::{RuntimeSettings, SharedSettings};
