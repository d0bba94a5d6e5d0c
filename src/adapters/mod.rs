pub mod headless;
pub mod input;
pub mod world;

pub use headless::{HeadlessWorld, LoggingCursor, PlanarProjector};
pub use input::{hover_to, jittered, CursorInput, HotkeyLatch, KeyboardState, ScreenProjector, Vector2};
#[cfg(test)]
pub use world::MockWorldView;
pub use world::{nearby_leader_candidates, EntitySnapshot, WorldView};
