pub mod broadcast;
pub mod sync_client;

pub use broadcast::{router, BroadcastServer, BroadcastState, RoleServer};
pub use sync_client::{
    InFlight, NetworkRequestStatus, RequestSlot, SkipReason, SyncClient, SyncOutcome,
};
