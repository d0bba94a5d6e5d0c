//! Adapters for running without a game client attached.
//!
//! `HeadlessWorld` is an in-memory world the binary and tests drive by hand;
//! the cursor only logs where it would have moved.

use std::sync::RwLock;
use tracing::info;

use super::input::{CursorInput, ScreenProjector, Vector2};
use super::world::{EntitySnapshot, WorldView};
use crate::domain::Vector3;

#[derive(Debug, Default)]
struct WorldInner {
    local_player: Option<String>,
    players: Vec<EntitySnapshot>,
    area_hash: u32,
}

#[derive(Debug, Default)]
pub struct HeadlessWorld {
    inner: RwLock<WorldInner>,
}

impl HeadlessWorld {
    pub fn new(local_player: Option<String>) -> Self {
        Self {
            inner: RwLock::new(WorldInner {
                local_player,
                ..Default::default()
            }),
        }
    }

    pub fn set_players(&self, players: Vec<EntitySnapshot>) {
        self.write().players = players;
    }

    pub fn enter_area(&self, area_hash: u32) {
        self.write().area_hash = area_hash;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, WorldInner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, WorldInner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }
}

impl WorldView for HeadlessWorld {
    fn local_player_name(&self) -> Option<String> {
        self.read().local_player.clone()
    }

    fn visible_player_names(&self) -> Vec<String> {
        self.read().players.iter().map(|p| p.name.clone()).collect()
    }

    fn find_player(&self, name: &str) -> Option<EntitySnapshot> {
        self.read().players.iter().find(|p| p.name == name).cloned()
    }

    fn current_area_hash(&self) -> u32 {
        self.read().area_hash
    }
}

/// Top-down projection: world x/y map straight to screen pixels
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanarProjector;

impl ScreenProjector for PlanarProjector {
    fn world_to_screen(&self, pos: Vector3) -> Option<Vector2> {
        Some(Vector2::new(pos.x, pos.y))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCursor;

impl CursorInput for LoggingCursor {
    fn move_cursor_to(&self, pos: Vector2) {
        info!(x = pos.x, y = pos.y, "cursor move");
    }
}
