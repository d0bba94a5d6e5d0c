pub mod action;
pub mod state;
pub mod wire;

pub use action::*;
pub use state::*;
pub use wire::*;
