//! Read-only view of the game world.
//!
//! Entity enumeration and component lookup live behind this trait; the
//! coordination core only needs player names, a named lookup and the
//! current area identity.

use crate::domain::Vector3;

/// A player entity resolved by name
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub name: String,
    pub pos: Vector3,
}

#[cfg_attr(test, mockall::automock)]
pub trait WorldView: Send + Sync {
    /// Name of the player this process controls, if the world is loaded
    fn local_player_name(&self) -> Option<String>;

    /// Names of every visible player entity, unfiltered
    fn visible_player_names(&self) -> Vec<String>;

    /// Resolve a player entity by exact name
    fn find_player(&self, name: &str) -> Option<EntitySnapshot>;

    /// Identity of the loaded area; changes on every area transition
    fn current_area_hash(&self) -> u32;
}

/// Visible players that could be picked as leader: no blanks, not ourselves
pub fn nearby_leader_candidates(world: &dyn WorldView) -> Vec<String> {
    let me = world.local_player_name().unwrap_or_default();
    world
        .visible_player_names()
        .into_iter()
        .filter(|name| !name.is_empty() && *name != me)
        .collect()
}
